//! Sparse two-axis map keyed by domain objects.
//!
//! Keys are addressed through caller-supplied serialisers: two keys denote
//! the same row (or column) iff they serialise to the same string. The first
//! key object seen for a serialised key is kept for enumeration.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use indexmap::{IndexMap, IndexSet};
use serde::Serialize;

use crate::error::DashboardError;

pub type KeySerializer<K> = Arc<dyn Fn(&K) -> String + Send + Sync>;

pub trait Map2d<K1, K2, V> {
    fn get(&self, first: &K1, second: &K2) -> Option<&V>;

    fn set(&mut self, first: K1, second: K2, value: V) -> Result<(), DashboardError>;

    /// One value per known second-axis key, `fill` for absent cells.
    fn get_row(&self, first: &K1, fill: &V) -> Vec<V>;

    fn delete_row(&mut self, first: &K1);

    fn first_axis_keys(&self) -> Vec<&K1>;

    fn second_axis_keys(&self) -> Vec<&K2>;

    /// Dense projection: rows in first-axis order, columns in second-axis order.
    fn get_as_array(&self, fill: &V) -> Vec<Vec<V>>;
}

pub struct Map2dBase<K1, K2, V> {
    first_keys: IndexMap<String, K1>,
    second_keys: IndexMap<String, K2>,
    data: HashMap<String, HashMap<String, V>>,
    serialize_first: KeySerializer<K1>,
    serialize_second: KeySerializer<K2>,
}

impl<K1, K2, V> fmt::Debug for Map2dBase<K1, K2, V>
where
    K1: fmt::Debug,
    K2: fmt::Debug,
    V: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Map2dBase")
            .field("first_keys", &self.first_keys)
            .field("second_keys", &self.second_keys)
            .field("data", &self.data)
            .finish_non_exhaustive()
    }
}

/// Serialisable copy of a map's contents for the rendering layer.
#[derive(Debug, Clone, Serialize)]
pub struct Map2dContents<K1, K2, V> {
    pub first_axis_keys: Vec<K1>,
    pub second_axis_keys: Vec<K2>,
    pub cells: Vec<Vec<Option<V>>>,
}

impl<K1, K2, V> Map2dBase<K1, K2, V>
where
    V: Clone,
{
    pub fn new<F1, F2>(serialize_first: F1, serialize_second: F2) -> Self
    where
        F1: Fn(&K1) -> String + Send + Sync + 'static,
        F2: Fn(&K2) -> String + Send + Sync + 'static,
    {
        Self {
            first_keys: IndexMap::new(),
            second_keys: IndexMap::new(),
            data: HashMap::new(),
            serialize_first: Arc::new(serialize_first),
            serialize_second: Arc::new(serialize_second),
        }
    }

    /// A read-only projection retaining every current key.
    pub fn view(&self) -> Map2dView<'_, K1, K2, V> {
        Map2dView {
            base: self,
            first_keys: self.first_keys.keys().cloned().collect(),
            second_keys: self.second_keys.keys().cloned().collect(),
        }
    }

    fn cell(&self, first_id: &str, second_id: &str) -> Option<&V> {
        self.data.get(first_id)?.get(second_id)
    }

    /// Registers a second-axis key without setting any cell.
    pub fn add_second_axis_key(&mut self, second: K2) {
        let id = (self.serialize_second)(&second);
        self.second_keys.entry(id).or_insert(second);
    }

    pub fn contents(&self) -> Map2dContents<K1, K2, V>
    where
        K1: Clone,
        K2: Clone,
    {
        let cells = self
            .first_keys
            .keys()
            .map(|first_id| {
                self.second_keys
                    .keys()
                    .map(|second_id| self.cell(first_id, second_id).cloned())
                    .collect()
            })
            .collect();
        Map2dContents {
            first_axis_keys: self.first_keys.values().cloned().collect(),
            second_axis_keys: self.second_keys.values().cloned().collect(),
            cells,
        }
    }
}

impl<K1, K2, V> Map2d<K1, K2, V> for Map2dBase<K1, K2, V>
where
    V: Clone,
{
    fn get(&self, first: &K1, second: &K2) -> Option<&V> {
        self.cell(&(self.serialize_first)(first), &(self.serialize_second)(second))
    }

    fn set(&mut self, first: K1, second: K2, value: V) -> Result<(), DashboardError> {
        let first_id = (self.serialize_first)(&first);
        let second_id = (self.serialize_second)(&second);
        self.first_keys.entry(first_id.clone()).or_insert(first);
        self.second_keys.entry(second_id.clone()).or_insert(second);
        self.data
            .entry(first_id)
            .or_default()
            .insert(second_id, value);
        Ok(())
    }

    fn get_row(&self, first: &K1, fill: &V) -> Vec<V> {
        let first_id = (self.serialize_first)(first);
        self.second_keys
            .keys()
            .map(|second_id| {
                self.cell(&first_id, second_id)
                    .cloned()
                    .unwrap_or_else(|| fill.clone())
            })
            .collect()
    }

    fn delete_row(&mut self, first: &K1) {
        let first_id = (self.serialize_first)(first);
        self.data.remove(&first_id);
        self.first_keys.shift_remove(&first_id);
    }

    fn first_axis_keys(&self) -> Vec<&K1> {
        self.first_keys.values().collect()
    }

    fn second_axis_keys(&self) -> Vec<&K2> {
        self.second_keys.values().collect()
    }

    fn get_as_array(&self, fill: &V) -> Vec<Vec<V>> {
        self.first_keys
            .values()
            .map(|first| self.get_row(first, fill))
            .collect()
    }
}

/// Filtered projection over a [`Map2dBase`]. Deleting rows or columns only
/// shrinks the view's own key sets; the base map is never touched.
pub struct Map2dView<'a, K1, K2, V> {
    base: &'a Map2dBase<K1, K2, V>,
    first_keys: IndexSet<String>,
    second_keys: IndexSet<String>,
}

impl<'a, K1, K2, V> Map2dView<'a, K1, K2, V>
where
    V: Clone,
{
    pub fn base(&self) -> &'a Map2dBase<K1, K2, V> {
        self.base
    }

    pub fn delete_column(&mut self, second: &K2) {
        let second_id = (self.base.serialize_second)(second);
        self.second_keys.shift_remove(&second_id);
    }

    fn retains(&self, first_id: &str, second_id: &str) -> bool {
        self.first_keys.contains(first_id) && self.second_keys.contains(second_id)
    }
}

impl<K1, K2, V> Map2d<K1, K2, V> for Map2dView<'_, K1, K2, V>
where
    V: Clone,
{
    fn get(&self, first: &K1, second: &K2) -> Option<&V> {
        let first_id = (self.base.serialize_first)(first);
        let second_id = (self.base.serialize_second)(second);
        if !self.retains(&first_id, &second_id) {
            return None;
        }
        self.base.cell(&first_id, &second_id)
    }

    fn set(&mut self, _first: K1, _second: K2, _value: V) -> Result<(), DashboardError> {
        Err(DashboardError::ReadOnlyView)
    }

    fn get_row(&self, first: &K1, fill: &V) -> Vec<V> {
        let first_id = (self.base.serialize_first)(first);
        if !self.first_keys.contains(&first_id) {
            return Vec::new();
        }
        self.second_keys
            .iter()
            .map(|second_id| {
                self.base
                    .cell(&first_id, second_id)
                    .cloned()
                    .unwrap_or_else(|| fill.clone())
            })
            .collect()
    }

    fn delete_row(&mut self, first: &K1) {
        let first_id = (self.base.serialize_first)(first);
        self.first_keys.shift_remove(&first_id);
    }

    fn first_axis_keys(&self) -> Vec<&K1> {
        self.first_keys
            .iter()
            .filter_map(|id| self.base.first_keys.get(id))
            .collect()
    }

    fn second_axis_keys(&self) -> Vec<&K2> {
        self.second_keys
            .iter()
            .filter_map(|id| self.base.second_keys.get(id))
            .collect()
    }

    fn get_as_array(&self, fill: &V) -> Vec<Vec<V>> {
        self.first_keys
            .iter()
            .map(|first_id| {
                self.second_keys
                    .iter()
                    .map(|second_id| {
                        self.base
                            .cell(first_id, second_id)
                            .cloned()
                            .unwrap_or_else(|| fill.clone())
                    })
                    .collect()
            })
            .collect()
    }
}
