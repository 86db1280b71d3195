use super::{Dataset, Operator};
use crate::cancel::CancellationToken;
use crate::error::DashboardError;
use crate::lapis::LapisClient;

/// Aggregates every run of `window_size` consecutive records, sliding by one.
///
/// There are `max(n - window_size, 0) + 1` windows: a child with fewer
/// records than the window (including none at all) yields a single window
/// holding whatever is available.
pub struct SlidingWindowOperator<C, F> {
    child: C,
    window_size: usize,
    aggregate: F,
}

impl<C, F> SlidingWindowOperator<C, F> {
    pub fn new(child: C, window_size: usize, aggregate: F) -> Self {
        Self {
            child,
            window_size,
            aggregate,
        }
    }
}

impl<C, F, U> Operator for SlidingWindowOperator<C, F>
where
    C: Operator,
    F: Fn(&[C::Item]) -> U + Send + Sync,
    U: Send,
{
    type Item = U;

    fn evaluate(
        &self,
        lapis: &dyn LapisClient,
        cancel: &CancellationToken,
    ) -> Result<Dataset<U>, DashboardError> {
        if self.window_size < 1 {
            return Err(DashboardError::InvalidWindowSize(self.window_size));
        }
        let child = self.child.evaluate(lapis, cancel)?;
        let records = child.content.as_slice();
        let windows = records.len().saturating_sub(self.window_size) + 1;
        let content = (0..windows)
            .map(|start| {
                let end = (start + self.window_size).min(records.len());
                (self.aggregate)(&records[start..end])
            })
            .collect();
        Ok(Dataset::new(content))
    }
}
