//! Length units.
//!
//! Recipes carry millimetres; the document engine works in decimal feet.
//! The two are distinct types so a value can only cross the boundary through
//! [`Millimeters::to_feet`], which command execution calls exactly once.

use serde::{Deserialize, Serialize};

/// Millimetres per foot.
pub const MM_PER_FOOT: f64 = 304.8;

/// A raw recipe length in millimetres.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Millimeters(pub f64);

/// An internal document length in decimal feet.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Feet(pub f64);

impl Millimeters {
    pub fn to_feet(self) -> Feet {
        Feet(self.0 / MM_PER_FOOT)
    }

    pub fn is_finite(self) -> bool {
        self.0.is_finite()
    }
}

impl Feet {
    pub fn value(self) -> f64 {
        self.0
    }
}

/// A recipe point in millimetres. `z` defaults to zero when omitted.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PointMm {
    pub x: Millimeters,
    pub y: Millimeters,
    #[serde(default)]
    pub z: Millimeters,
}

/// A document point in feet.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Xyz {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl PointMm {
    pub fn to_xyz(self) -> Xyz {
        Xyz {
            x: self.x.to_feet().0,
            y: self.y.to_feet().0,
            z: self.z.to_feet().0,
        }
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite()
    }
}

impl Xyz {
    pub fn distance_to(&self, other: &Xyz) -> f64 {
        let (dx, dy, dz) = (other.x - self.x, other.y - self.y, other.z - self.z);
        (dx * dx + dy * dy + dz * dz).sqrt()
    }
}
