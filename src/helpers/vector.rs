use std::ops::{Add, Mul, Sub};

use serde::{Deserialize, Serialize};

/// 2D point/vector.
///
/// Arithmetic, `rotate`, `length` and `distance_to` produce new values while
/// `scale` and `normalize` work in place.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Vector2D {
    pub x: f32,
    pub y: f32,
}
impl Vector2D {
    pub const ZERO: Self = Self { x: 0.0, y: 0.0 };

    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    /**
     * Clockwise rotation:
     * x' = x cos(a) + y sin(a)
     * y' = -x sin(a) + y cos(a)
     */
    pub fn rotate(&self, angle: f32) -> Self {
        let (sin, cos) = angle.sin_cos();
        Self {
            x: self.x * cos + self.y * sin,
            y: -self.x * sin + self.y * cos,
        }
    }

    pub fn length(&self) -> f32 {
        (self.x * self.x + self.y * self.y).sqrt()
    }

    pub fn distance_to(&self, other: Vector2D) -> f32 {
        (*self - other).length()
    }

    pub fn dot(&self, other: Vector2D) -> f32 {
        self.x * other.x + self.y * other.y
    }

    pub fn scale(&mut self, k: f32) {
        self.x *= k;
        self.y *= k;
    }

    // A zero vector stays zero.
    pub fn normalize(&mut self) {
        let len = self.length();
        if len > 0.0 {
            self.scale(1.0 / len);
        }
    }
}
impl Add for Vector2D {
    type Output = Vector2D;

    fn add(self, rhs: Vector2D) -> Self::Output {
        Vector2D::new(self.x + rhs.x, self.y + rhs.y)
    }
}
impl Sub for Vector2D {
    type Output = Vector2D;

    fn sub(self, rhs: Vector2D) -> Self::Output {
        Vector2D::new(self.x - rhs.x, self.y - rhs.y)
    }
}
impl Mul<f32> for Vector2D {
    type Output = Vector2D;

    fn mul(self, k: f32) -> Self::Output {
        Vector2D::new(self.x * k, self.y * k)
    }
}

#[cfg(test)]
mod vector_tests {
    use std::f32::consts::FRAC_PI_2;

    use super::Vector2D;

    fn close(a: Vector2D, b: Vector2D) -> bool {
        (a - b).length() < 1e-5
    }

    #[test]
    fn test_rotate_clockwise() {
        let v = Vector2D::new(1.0, 0.0);
        assert!(close(v.rotate(FRAC_PI_2), Vector2D::new(0.0, -1.0)));
        let v = Vector2D::new(0.0, 1.0);
        assert!(close(v.rotate(FRAC_PI_2), Vector2D::new(1.0, 0.0)));
        // Source is untouched
        assert_eq!(v, Vector2D::new(0.0, 1.0));
    }

    #[test]
    fn test_scale_and_normalize_mutate() {
        let mut v = Vector2D::new(3.0, 4.0);
        assert_eq!(v.length(), 5.0);
        v.normalize();
        assert!(close(v, Vector2D::new(0.6, 0.8)));
        v.scale(10.0);
        assert!(close(v, Vector2D::new(6.0, 8.0)));

        let mut zero = Vector2D::ZERO;
        zero.normalize();
        assert_eq!(zero, Vector2D::ZERO);
    }

    #[test]
    fn test_distance() {
        let a = Vector2D::new(1.0, 1.0);
        let b = Vector2D::new(4.0, 5.0);
        assert_eq!(a.distance_to(b), 5.0);
        assert_eq!(a + b, Vector2D::new(5.0, 6.0));
        assert_eq!(b - a, Vector2D::new(3.0, 4.0));
        assert_eq!(a * 2.0, Vector2D::new(2.0, 2.0));
    }
}
