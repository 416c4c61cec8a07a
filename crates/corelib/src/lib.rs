//! Core shared types: math re-exports, bounds, errors, path lookup and
//! tolerant text helpers used by the asset parsers.

pub use glam::{Mat4, Vec2, Vec3, Vec4, vec3};

pub mod bounds;
pub mod error;
pub mod path;
pub mod text;

pub use bounds::BoundingBox;
pub use error::{CoreError, CoreResult};
pub use path::{FilePathInfo, PathFinder, PathKind};
