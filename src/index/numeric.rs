//! Ordered range index for numeric fields.

use ordered_float::OrderedFloat;
use roaring::RoaringBitmap;
use std::collections::{BTreeMap, HashMap};
use std::ops::Bound;

#[derive(Debug, Default)]
pub struct NumericIndex {
    values: BTreeMap<OrderedFloat<f64>, RoaringBitmap>,
    doc_values: HashMap<u32, f64>,
}

impl NumericIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the value of a document. The stale entry is removed first.
    pub fn insert(&mut self, doc_id: u32, value: f64) {
        self.remove(doc_id);
        self.values
            .entry(OrderedFloat(value))
            .or_default()
            .insert(doc_id);
        self.doc_values.insert(doc_id, value);
    }

    pub fn remove(&mut self, doc_id: u32) {
        let Some(old) = self.doc_values.remove(&doc_id) else {
            return;
        };
        let key = OrderedFloat(old);
        if let Some(bitmap) = self.values.get_mut(&key) {
            bitmap.remove(doc_id);
            if bitmap.is_empty() {
                self.values.remove(&key);
            }
        }
    }

    pub fn value_of(&self, doc_id: u32) -> Option<f64> {
        self.doc_values.get(&doc_id).copied()
    }

    /// Documents whose value lies within the bounds. Infinite bounds act as sentinels.
    pub fn range(&self, min: Bound<f64>, max: Bound<f64>) -> RoaringBitmap {
        let mut out = RoaringBitmap::new();
        if range_is_empty(min, max) {
            return out;
        }
        let lo = min.map(OrderedFloat);
        let hi = max.map(OrderedFloat);
        for (_, bitmap) in self.values.range((lo, hi)) {
            out |= bitmap;
        }
        out
    }

    pub fn len(&self) -> usize {
        self.doc_values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.doc_values.is_empty()
    }
}

/// BTreeMap::range panics on inverted or empty-exclusive ranges.
fn range_is_empty(min: Bound<f64>, max: Bound<f64>) -> bool {
    match (min, max) {
        (Bound::Included(a), Bound::Included(b)) => a > b,
        (Bound::Included(a), Bound::Excluded(b))
        | (Bound::Excluded(a), Bound::Included(b))
        | (Bound::Excluded(a), Bound::Excluded(b)) => a >= b,
        _ => false,
    }
}
