//! Coordinates and the region they must fall inside.

use std::fmt;

use serde::{Deserialize, Serialize};
use tether_core::config::FenceConfig;

/// A latitude/longitude pair in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub lat: f64,
    pub lng: f64,
}

impl Coordinate {
    #[must_use]
    pub const fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    #[must_use]
    pub const fn is_finite(self) -> bool {
        self.lat.is_finite() && self.lng.is_finite()
    }
}

impl fmt::Display for Coordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.6}, {:.6}", self.lat, self.lng)
    }
}

/// Axis-aligned bounding box with inclusive edges.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoFence {
    south: f64,
    west: f64,
    north: f64,
    east: f64,
}

impl GeoFence {
    /// Bounding box of the Philippines.
    pub const PHILIPPINES: Self = Self {
        south: 4.5,
        west: 116.0,
        north: 21.5,
        east: 127.0,
    };

    /// Build a fence, or `None` when an edge is not finite or the box is
    /// inverted.
    #[must_use]
    pub fn new(south: f64, west: f64, north: f64, east: f64) -> Option<Self> {
        let finite = [south, west, north, east].iter().all(|e| e.is_finite());
        (finite && south < north && west < east).then_some(Self {
            south,
            west,
            north,
            east,
        })
    }

    #[must_use]
    pub fn contains(&self, point: Coordinate) -> bool {
        point.is_finite()
            && (self.south..=self.north).contains(&point.lat)
            && (self.west..=self.east).contains(&point.lng)
    }

    /// `west,south,east,north`, the order Nominatim's `viewbox` expects.
    #[must_use]
    pub fn viewbox(&self) -> String {
        format!("{},{},{},{}", self.west, self.south, self.east, self.north)
    }

    #[must_use]
    pub const fn south(&self) -> f64 {
        self.south
    }

    #[must_use]
    pub const fn west(&self) -> f64 {
        self.west
    }

    #[must_use]
    pub const fn north(&self) -> f64 {
        self.north
    }

    #[must_use]
    pub const fn east(&self) -> f64 {
        self.east
    }
}

impl Default for GeoFence {
    fn default() -> Self {
        Self::PHILIPPINES
    }
}

impl From<&FenceConfig> for GeoFence {
    /// Falls back to the default fence when the configured box is invalid;
    /// `ProjectConfig::validate` rejects such boxes at load time.
    fn from(config: &FenceConfig) -> Self {
        Self::new(config.south, config.west, config.north, config.east).unwrap_or_default()
    }
}
