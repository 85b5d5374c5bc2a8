// SPDX-License-Identifier: AGPL-3.0-or-later
// ModelBase - Streaming Building-Model Server
// Copyright (C) 2026 ModelBase Contributors

//! Axis-aligned bounds as an immutable value type.
//!
//! Revision-level bounds are computed by folding [`Bounds::merge`] over all
//! contributing concrete revisions instead of mutating min/max fields in
//! place across nested loops. `EMPTY` is the fold identity.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Vector3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Vector3 {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    fn min(&self, other: &Vector3) -> Vector3 {
        Vector3::new(self.x.min(other.x), self.y.min(other.y), self.z.min(other.z))
    }

    fn max(&self, other: &Vector3) -> Vector3 {
        Vector3::new(self.x.max(other.x), self.y.max(other.y), self.z.max(other.z))
    }

    fn scaled(&self, factor: f64) -> Vector3 {
        Vector3::new(self.x * factor, self.y * factor, self.z * factor)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    pub min: Vector3,
    pub max: Vector3,
}

impl Bounds {
    /// Fold identity: min at +MAX, max at -MAX, so any real bounds win.
    pub const EMPTY: Bounds = Bounds {
        min: Vector3 {
            x: f64::MAX,
            y: f64::MAX,
            z: f64::MAX,
        },
        max: Vector3 {
            x: -f64::MAX,
            y: -f64::MAX,
            z: -f64::MAX,
        },
    };

    pub fn new(min: Vector3, max: Vector3) -> Self {
        Self { min, max }
    }

    /// Pure merge: the smallest bounds enclosing both.
    pub fn merge(&self, other: &Bounds) -> Bounds {
        Bounds {
            min: self.min.min(&other.min),
            max: self.max.max(&other.max),
        }
    }

    /// Bounds with every component multiplied by `factor` (native units to
    /// millimeters). Empty bounds stay empty for non-negative factors.
    pub fn scaled(&self, factor: f64) -> Bounds {
        Bounds {
            min: self.min.scaled(factor),
            max: self.max.scaled(factor),
        }
    }

    /// True if no real bounds were ever folded in.
    pub fn is_empty(&self) -> bool {
        self.min.x > self.max.x
    }
}

impl Default for Bounds {
    fn default() -> Self {
        Bounds::EMPTY
    }
}
