//! Geometry asset ingestion: OBJ meshes with their MTL material libraries,
//! a binary mesh cache, tangent frames and texture-map bookkeeping.

pub mod cache;
pub mod export;
pub mod maps;
pub mod material;
pub mod mesh;
pub mod mtl;
pub mod obj;
pub mod tangent;

pub use cache::CacheVersion;
pub use maps::{MapFormat, MapLibrary};
pub use material::Material;
pub use mesh::{Mesh, Surface, SurfaceMode, Vertex};
pub use mtl::MaterialLibrary;
pub use obj::{IndexingMode, ObjOptions, load_obj_from_path, load_obj_with_materials};
