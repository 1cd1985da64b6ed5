//! 2D vector used for station positions, waypoints and train kinematics.
//!
//! Operations come in two flavours:
//! - **hard** (`add`, `sub`, `scale`, `div`, `normalize`, `limit`, `set_mag`)
//!   mutate the vector in place,
//! - **soft** (`soft_add`, `soft_sub`, `soft_scale`, `soft_div`) leave it
//!   untouched and return a new value.

use serde::{Deserialize, Serialize};

/// A point or displacement in the 2D plane.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vector {
    pub x: f64,
    pub y: f64,
}

impl Vector {
    pub const ZERO: Vector = Vector { x: 0.0, y: 0.0 };

    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    // Hard operations

    pub fn add(&mut self, other: &Vector) {
        self.x += other.x;
        self.y += other.y;
    }

    pub fn sub(&mut self, other: &Vector) {
        self.x -= other.x;
        self.y -= other.y;
    }

    pub fn scale(&mut self, s: f64) {
        self.x *= s;
        self.y *= s;
    }

    pub fn div(&mut self, d: f64) {
        self.x /= d;
        self.y /= d;
    }

    /// Caps the magnitude at `max`, keeping the direction.
    pub fn limit(&mut self, max: f64) {
        if self.magnitude() > max {
            self.normalize();
            self.scale(max);
        }
    }

    /// Scales to unit length. A zero vector stays zero.
    pub fn normalize(&mut self) {
        let mag = self.magnitude();
        if mag > 0.0 {
            self.div(mag);
        }
    }

    pub fn set_mag(&mut self, mag: f64) {
        self.normalize();
        self.scale(mag);
    }

    // Soft operations

    pub fn soft_add(&self, other: &Vector) -> Vector {
        Vector::new(self.x + other.x, self.y + other.y)
    }

    pub fn soft_sub(&self, other: &Vector) -> Vector {
        Vector::new(self.x - other.x, self.y - other.y)
    }

    pub fn soft_scale(&self, s: f64) -> Vector {
        Vector::new(self.x * s, self.y * s)
    }

    pub fn soft_div(&self, d: f64) -> Vector {
        Vector::new(self.x / d, self.y / d)
    }

    pub fn magnitude(&self) -> f64 {
        self.x.hypot(self.y)
    }

    pub fn dist(&self, other: &Vector) -> f64 {
        (self.x - other.x).hypot(self.y - other.y)
    }

    /// Heading in radians, measured from the positive x axis.
    pub fn angle(&self) -> f64 {
        self.y.atan2(self.x)
    }

    /// True when within `precision` units of `(x, y)`.
    pub fn close_to(&self, x: f64, y: f64, precision: f64) -> bool {
        self.dist(&Vector::new(x, y)) <= precision
    }
}

impl std::fmt::Display for Vector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({:.2}, {:.2})", self.x, self.y)
    }
}

/// Re-maps `value` from the range `[start1, stop1]` onto `[start2, stop2]`.
pub fn map_range(value: f64, start1: f64, stop1: f64, start2: f64, stop2: f64) -> f64 {
    (value - start1) / (stop1 - start1) * (stop2 - start2) + start2
}

/// Length of the polyline `from -> points... -> to`.
pub fn polyline_length(from: &Vector, points: &[Vector], to: &Vector) -> f64 {
    let mut length = 0.0;
    let mut cursor = *from;
    for point in points.iter().chain(std::iter::once(to)) {
        length += cursor.dist(point);
        cursor = *point;
    }
    length
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_hard_operations_mutate() {
        let mut v = Vector::new(2.0, 4.0);
        v.add(&Vector::new(1.0, 1.0));
        assert_eq!(v, Vector::new(3.0, 5.0));

        v.sub(&Vector::new(3.0, 1.0));
        assert_eq!(v, Vector::new(0.0, 4.0));

        v.scale(0.5);
        assert_eq!(v, Vector::new(0.0, 2.0));

        v.div(2.0);
        assert_eq!(v, Vector::new(0.0, 1.0));
    }

    #[test]
    fn test_soft_operations_leave_original() {
        let v = Vector::new(2.0, 4.0);
        assert_eq!(v.soft_add(&Vector::new(1.0, 1.0)), Vector::new(3.0, 5.0));
        assert_eq!(v.soft_sub(&Vector::new(1.0, 1.0)), Vector::new(1.0, 3.0));
        assert_eq!(v.soft_scale(2.0), Vector::new(4.0, 8.0));
        assert_eq!(v.soft_div(2.0), Vector::new(1.0, 2.0));
        assert_eq!(v, Vector::new(2.0, 4.0));
    }

    #[test]
    fn test_normalize_zero_is_noop() {
        let mut v = Vector::ZERO;
        v.normalize();
        assert_eq!(v, Vector::ZERO);

        v.set_mag(5.0);
        assert_eq!(v, Vector::ZERO);
    }

    #[test]
    fn test_normalize_and_set_mag() {
        let mut v = Vector::new(3.0, 4.0);
        assert_relative_eq!(v.magnitude(), 5.0);

        v.normalize();
        assert_relative_eq!(v.magnitude(), 1.0, epsilon = 1e-12);
        assert_relative_eq!(v.x, 0.6, epsilon = 1e-12);

        v.set_mag(10.0);
        assert_relative_eq!(v.y, 8.0, epsilon = 1e-12);
    }

    #[test]
    fn test_limit() {
        let mut fast = Vector::new(30.0, 40.0);
        fast.limit(5.0);
        assert_relative_eq!(fast.magnitude(), 5.0, epsilon = 1e-12);

        let mut slow = Vector::new(1.0, 1.0);
        slow.limit(5.0);
        assert_eq!(slow, Vector::new(1.0, 1.0));
    }

    #[test]
    fn test_dist_and_angle() {
        let a = Vector::new(0.0, 0.0);
        let b = Vector::new(3.0, 4.0);
        assert_relative_eq!(a.dist(&b), 5.0);
        assert_relative_eq!(Vector::new(0.0, 1.0).angle(), std::f64::consts::FRAC_PI_2);
        assert!(b.close_to(3.5, 4.0, 1.0));
        assert!(!b.close_to(10.0, 4.0, 1.0));
    }

    #[test]
    fn test_map_range() {
        assert_relative_eq!(map_range(5.0, 0.0, 10.0, 0.0, 1.0), 0.5);
        assert_relative_eq!(map_range(0.0, 0.0, 10.0, 2.0, 4.0), 2.0);
        assert_relative_eq!(map_range(4.0, 0.0, 6.25, 0.0, 1.0), 0.64);
    }

    #[test]
    fn test_polyline_length() {
        let from = Vector::new(0.0, 0.0);
        let to = Vector::new(100.0, 0.0);
        assert_relative_eq!(polyline_length(&from, &[Vector::new(50.0, 0.0)], &to), 100.0);
        assert_relative_eq!(
            polyline_length(&from, &[Vector::new(0.0, 30.0), Vector::new(40.0, 60.0)], &Vector::new(40.0, 0.0)),
            30.0 + 50.0 + 60.0
        );
    }
}
