mod aabb;

pub use aabb::Aabb;

use simba::simd::WideF32x4;

pub type FloatType = f32;
pub type SimdFloatType = WideF32x4;

pub type WorldPoint = nalgebra::Point3<FloatType>;
pub type WorldVector = nalgebra::Vector3<FloatType>;
pub type WorldBox = Aabb<WorldPoint>;
