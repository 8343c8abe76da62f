use glam::{DQuat, DVec3};
use serde::{Deserialize, Serialize};

use crate::Containment;

const CONTAIN_EPSILON: f64 = 1e-6;

/// Oriented bounding box in world space.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OrientedBox {
    pub center: DVec3,
    pub half_extents: DVec3,
    pub orientation: DQuat,
}

impl OrientedBox {
    pub fn new(center: DVec3, half_extents: DVec3, orientation: DQuat) -> Self {
        Self {
            center,
            half_extents: half_extents.abs(),
            orientation,
        }
    }

    pub fn axis_aligned(center: DVec3, half_extents: DVec3) -> Self {
        Self::new(center, half_extents, DQuat::IDENTITY)
    }

    fn axes(&self) -> [DVec3; 3] {
        [
            self.orientation * DVec3::X,
            self.orientation * DVec3::Y,
            self.orientation * DVec3::Z,
        ]
    }

    pub fn contains_point(&self, point: DVec3) -> bool {
        let local = self.orientation.inverse() * (point - self.center);
        let slack = self.half_extents + DVec3::splat(CONTAIN_EPSILON);
        local.abs().cmple(slack).all()
    }

    /// Corners in a fixed order: bit 0 selects +x, bit 1 +y, bit 2 +z.
    /// Tool handles of a yard follow the same order.
    pub fn corners(&self) -> [DVec3; 8] {
        let mut out = [DVec3::ZERO; 8];
        for (i, corner) in out.iter_mut().enumerate() {
            let sign = DVec3::new(
                if i & 1 == 0 { -1.0 } else { 1.0 },
                if i & 2 == 0 { -1.0 } else { 1.0 },
                if i & 4 == 0 { -1.0 } else { 1.0 },
            );
            *corner = self.center + self.orientation * (self.half_extents * sign);
        }
        out
    }

    /// Squared length of the full corner-to-corner diagonal.
    pub fn diagonal_sq(&self) -> f64 {
        (self.half_extents * 2.0).length_squared()
    }

    /// Squared radius of the bounding sphere.
    pub fn radius_sq(&self) -> f64 {
        self.half_extents.length_squared()
    }

    /// Separating-axis overlap test over the 15 candidate axes.
    pub fn intersects(&self, other: &OrientedBox) -> bool {
        let a = self.axes();
        let b = other.axes();
        let offset = other.center - self.center;

        let mut candidates = Vec::with_capacity(15);
        candidates.extend_from_slice(&a);
        candidates.extend_from_slice(&b);
        for axis_a in &a {
            for axis_b in &b {
                candidates.push(axis_a.cross(*axis_b));
            }
        }

        for axis in candidates {
            // Parallel edges produce a degenerate cross product.
            if axis.length_squared() < 1e-12 {
                continue;
            }
            let ra: f64 = (0..3)
                .map(|i| a[i].dot(axis).abs() * self.half_extents[i])
                .sum();
            let rb: f64 = (0..3)
                .map(|i| b[i].dot(axis).abs() * other.half_extents[i])
                .sum();
            if offset.dot(axis).abs() > ra + rb {
                return false;
            }
        }
        true
    }

    /// Where `other` sits relative to this volume.
    pub fn classify(&self, other: &OrientedBox) -> Containment {
        if other.corners().iter().all(|c| self.contains_point(*c)) {
            Containment::Contained
        } else if self.intersects(other) {
            Containment::Intersecting
        } else {
            Containment::Outside
        }
    }
}
