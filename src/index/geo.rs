//! Geo index: (longitude, latitude) points with radius queries.
//!
//! Points are ordered by latitude so a radius query only inspects the
//! latitude band that can possibly be within range, then confirms each
//! candidate with the haversine distance.

use ordered_float::OrderedFloat;
use roaring::RoaringBitmap;
use std::collections::{BTreeMap, HashMap};

use crate::types::GeoPoint;

/// Earth radius used for great-circle distances, in meters.
pub const EARTH_RADIUS_M: f64 = 6_372_797.560856;

/// Distance units accepted by radius queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GeoUnit {
    Meters,
    Kilometers,
    Miles,
    Feet,
}

impl GeoUnit {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "m" => Some(GeoUnit::Meters),
            "km" => Some(GeoUnit::Kilometers),
            "mi" => Some(GeoUnit::Miles),
            "ft" => Some(GeoUnit::Feet),
            _ => None,
        }
    }

    pub fn to_meters(self, value: f64) -> f64 {
        match self {
            GeoUnit::Meters => value,
            GeoUnit::Kilometers => value * 1000.0,
            GeoUnit::Miles => value * 1609.344,
            GeoUnit::Feet => value * 0.3048,
        }
    }
}

pub fn validate_point(point: &GeoPoint) -> Result<(), String> {
    if !(-180.0..=180.0).contains(&point.lon) {
        return Err(format!("longitude {} outside [-180, 180]", point.lon));
    }
    if !(-90.0..=90.0).contains(&point.lat) {
        return Err(format!("latitude {} outside [-90, 90]", point.lat));
    }
    Ok(())
}

/// Great-circle distance between two points in meters.
pub fn haversine_m(a: &GeoPoint, b: &GeoPoint) -> f64 {
    let lat1 = a.lat.to_radians();
    let lat2 = b.lat.to_radians();
    let dlat = (b.lat - a.lat).to_radians();
    let dlon = (b.lon - a.lon).to_radians();
    let h = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_M * h.sqrt().min(1.0).asin()
}

#[derive(Debug, Default)]
pub struct GeoIndex {
    by_lat: BTreeMap<OrderedFloat<f64>, RoaringBitmap>,
    points: HashMap<u32, GeoPoint>,
}

impl GeoIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, doc_id: u32, point: GeoPoint) {
        self.remove(doc_id);
        self.by_lat
            .entry(OrderedFloat(point.lat))
            .or_default()
            .insert(doc_id);
        self.points.insert(doc_id, point);
    }

    pub fn remove(&mut self, doc_id: u32) {
        let Some(old) = self.points.remove(&doc_id) else {
            return;
        };
        let key = OrderedFloat(old.lat);
        if let Some(bitmap) = self.by_lat.get_mut(&key) {
            bitmap.remove(doc_id);
            if bitmap.is_empty() {
                self.by_lat.remove(&key);
            }
        }
    }

    pub fn point_of(&self, doc_id: u32) -> Option<GeoPoint> {
        self.points.get(&doc_id).copied()
    }

    /// Documents within `radius_m` meters of `center` (inclusive).
    pub fn within_radius(&self, center: &GeoPoint, radius_m: f64) -> RoaringBitmap {
        let mut out = RoaringBitmap::new();
        if radius_m < 0.0 || !radius_m.is_finite() {
            return out;
        }
        let band = (radius_m / EARTH_RADIUS_M).to_degrees();
        let lo = OrderedFloat(center.lat - band);
        let hi = OrderedFloat(center.lat + band);
        for (_, bitmap) in self.by_lat.range(lo..=hi) {
            for doc_id in bitmap {
                if let Some(p) = self.points.get(&doc_id) {
                    if haversine_m(center, p) <= radius_m {
                        out.insert(doc_id);
                    }
                }
            }
        }
        out
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}
