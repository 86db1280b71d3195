use std::collections::HashSet;
use std::hash::Hash;

use super::{Dataset, Operator};
use crate::cancel::CancellationToken;
use crate::error::DashboardError;
use crate::lapis::LapisClient;

/// Appends a default record for every key of a generated range that the
/// child did not produce. Existing records are kept as they are, in order.
///
/// * `key` extracts the key of a record
/// * `bounds` derives the `(min, max)` range from the distinct existing keys,
///   or `None` to leave the dataset unchanged
/// * `generate` expands the bounds into every required key
/// * `default` builds the record for a missing key
pub struct FillMissingOperator<C, KF, BF, GF, DF> {
    child: C,
    key: KF,
    bounds: BF,
    generate: GF,
    default: DF,
}

impl<C, KF, BF, GF, DF> FillMissingOperator<C, KF, BF, GF, DF> {
    pub fn new(child: C, key: KF, bounds: BF, generate: GF, default: DF) -> Self {
        Self {
            child,
            key,
            bounds,
            generate,
            default,
        }
    }
}

impl<C, K, KF, BF, GF, DF> Operator for FillMissingOperator<C, KF, BF, GF, DF>
where
    C: Operator,
    K: Hash + Eq + Clone,
    KF: Fn(&C::Item) -> K + Send + Sync,
    BF: Fn(&[K]) -> Option<(K, K)> + Send + Sync,
    GF: Fn(&K, &K) -> Result<Vec<K>, DashboardError> + Send + Sync,
    DF: Fn(&K) -> C::Item + Send + Sync,
{
    type Item = C::Item;

    fn evaluate(
        &self,
        lapis: &dyn LapisClient,
        cancel: &CancellationToken,
    ) -> Result<Dataset<C::Item>, DashboardError> {
        let mut child = self.child.evaluate(lapis, cancel)?;

        let mut existing = HashSet::new();
        let mut distinct = Vec::new();
        for record in &child.content {
            let key = (self.key)(record);
            if existing.insert(key.clone()) {
                distinct.push(key);
            }
        }

        let Some((min, max)) = (self.bounds)(&distinct) else {
            return Ok(child);
        };
        for key in (self.generate)(&min, &max)? {
            if existing.insert(key.clone()) {
                child.content.push((self.default)(&key));
            }
        }
        Ok(child)
    }
}
