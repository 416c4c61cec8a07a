//! CPU-side mesh representation shared by the text loader and the cache codec.

use std::{collections::BTreeMap, ops::Range};

use bytemuck::{Pod, Zeroable};
use corelib::{BoundingBox, Mat4, Vec3};

/// Fixed-size vertex record. The layout is also the on-disk cache record,
/// so field order and sizes must not change without bumping the cache version.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct Vertex {
    pub position: [f32; 3],
    pub normal: [f32; 3],
    pub texcoord: [f32; 2],
    pub color: [f32; 4],
    pub tangent: [f32; 3],
    pub bitangent: [f32; 3],
    // Skinning and SH slots are carried for layout only.
    pub bone_index: [u8; 4],
    pub bone_weights: [f32; 4],
    pub sh: [f32; 9],
}

const _: () = assert!(std::mem::size_of::<Vertex>() == 128);

impl Vertex {
    /// Size in bytes of one vertex record.
    pub const STRIDE: usize = std::mem::size_of::<Vertex>();

    pub fn new(position: [f32; 3], normal: [f32; 3], texcoord: [f32; 2]) -> Self {
        Self {
            position,
            normal,
            texcoord,
            ..Self::default()
        }
    }

    #[inline]
    pub fn position(&self) -> Vec3 {
        Vec3::from_array(self.position)
    }

    /// Replace every non-finite float with zero.
    pub fn sanitize(&mut self) {
        let fields: [&mut [f32]; 8] = [
            &mut self.position,
            &mut self.normal,
            &mut self.texcoord,
            &mut self.color,
            &mut self.tangent,
            &mut self.bitangent,
            &mut self.bone_weights,
            &mut self.sh,
        ];
        for field in fields {
            for x in field.iter_mut() {
                if !x.is_finite() {
                    *x = 0.0;
                }
            }
        }
    }

    pub fn is_finite(&self) -> bool {
        self.position
            .iter()
            .chain(&self.normal)
            .chain(&self.texcoord)
            .chain(&self.color)
            .chain(&self.tangent)
            .chain(&self.bitangent)
            .chain(&self.bone_weights)
            .chain(&self.sh)
            .all(|x| x.is_finite())
    }
}

impl Default for Vertex {
    fn default() -> Self {
        Self {
            color: [1.0; 4],
            ..Self::zeroed()
        }
    }
}

/// Draw topology; discriminants match the GL primitive enums.
#[repr(u32)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum SurfaceMode {
    Points = 0,
    Lines = 1,
    LineLoop = 2,
    LineStrip = 3,
    #[default]
    Triangles = 4,
    TriangleStrip = 5,
    TriangleFan = 6,
}

impl SurfaceMode {
    #[inline]
    pub fn as_u32(self) -> u32 {
        self as u32
    }

    /// Whether `count` indices form whole primitives for this topology.
    pub fn accepts_count(self, count: u32) -> bool {
        match self {
            SurfaceMode::Triangles => count % 3 == 0,
            SurfaceMode::Lines => count % 2 == 0,
            _ => true,
        }
    }
}

impl TryFrom<u32> for SurfaceMode {
    type Error = u32;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        Ok(match value {
            0 => SurfaceMode::Points,
            1 => SurfaceMode::Lines,
            2 => SurfaceMode::LineLoop,
            3 => SurfaceMode::LineStrip,
            4 => SurfaceMode::Triangles,
            5 => SurfaceMode::TriangleStrip,
            6 => SurfaceMode::TriangleFan,
            other => return Err(other),
        })
    }
}

/// A material-tagged run `[first, first + count)` of the index buffer.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Surface {
    pub mode: SurfaceMode,
    pub first: u32,
    pub count: u32,
    pub material_library: String,
    pub material_name: String,
    pub surface_name: String,
}

impl Surface {
    pub fn new(mode: SurfaceMode, first: u32) -> Self {
        Self {
            mode,
            first,
            ..Self::default()
        }
    }

    #[inline]
    pub fn index_range(&self) -> Range<usize> {
        let first = self.first as usize;
        first..first + self.count as usize
    }

    /// `true` if the run lies inside `index_count` and matches the topology.
    pub fn fits(&self, index_count: usize) -> bool {
        self.index_range().end <= index_count && self.mode.accepts_count(self.count)
    }
}

/// Indexed mesh partitioned into surfaces.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Mesh {
    pub vertices: Vec<Vertex>,
    pub indices: Vec<u32>,
    pub surfaces: Vec<Surface>,
    /// Material library short name -> resolved path.
    pub material_libraries: BTreeMap<String, String>,
    /// Material name -> library short name it came from.
    pub materials: BTreeMap<String, String>,
    pub bounds: BoundingBox,
}

impl Mesh {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` if both vertex and index buffers are non-empty.
    pub fn is_valid(&self) -> bool {
        !self.vertices.is_empty() && !self.indices.is_empty()
    }

    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    pub fn index_count(&self) -> usize {
        self.indices.len()
    }

    pub fn clear(&mut self) {
        self.vertices.clear();
        self.indices.clear();
        self.surfaces.clear();
        self.material_libraries.clear();
        self.materials.clear();
        self.bounds.reset();
    }

    /// Resize the buffers; a zero count leaves that buffer untouched.
    pub fn resize(&mut self, vertex_count: usize, index_count: usize, surface_count: usize) {
        if vertex_count > 0 {
            self.vertices.resize(vertex_count, Vertex::default());
        }
        if index_count > 0 {
            self.indices.resize(index_count, 0);
        }
        if surface_count > 0 {
            self.surfaces.resize(surface_count, Surface::default());
        }
    }

    pub fn create_simple_model(
        &mut self,
        vertex_count: usize,
        index_count: usize,
        surface_count: usize,
    ) {
        self.clear();
        self.resize(vertex_count, index_count, surface_count);
    }

    /// Apply `mat` to every vertex position and refold the bounds.
    pub fn transform(&mut self, mat: &Mat4) {
        for v in &mut self.vertices {
            v.position = mat.transform_point3(v.position()).to_array();
        }
        self.recompute_bounds();
    }

    pub fn recompute_bounds(&mut self) {
        self.bounds = self.vertices.iter().map(Vertex::position).collect();
    }

    pub fn sanitize(&mut self) {
        self.vertices.iter_mut().for_each(Vertex::sanitize);
    }

    /// Rebuild material name -> library from the surfaces. The last surface
    /// naming a material wins; surfaces without a material are skipped.
    pub fn rebuild_material_map(&mut self) {
        self.materials.clear();
        for s in &self.surfaces {
            if !s.material_name.is_empty() {
                self.materials
                    .insert(s.material_name.clone(), s.material_library.clone());
            }
        }
    }

    /// Open a new surface starting at the current end of the index buffer.
    pub fn begin_surface(&mut self, mode: SurfaceMode) -> &mut Surface {
        let first = self.indices.len() as u32;
        self.surfaces.push(Surface::new(mode, first));
        let last = self.surfaces.len() - 1;
        &mut self.surfaces[last]
    }

    /// Append a vertex, optionally indexing it into the current surface.
    pub fn push_vertex(&mut self, vertex: Vertex, add_index: bool) -> u32 {
        let slot = self.vertices.len() as u32;
        self.bounds.add(vertex.position());
        self.vertices.push(vertex);
        if add_index {
            self.add_index(Some(slot));
        }
        slot
    }

    /// Append an index to the last surface. `None` indexes the most recently
    /// pushed vertex. Out-of-range indices are rejected.
    pub fn add_index(&mut self, index: Option<u32>) -> bool {
        let index = match index {
            Some(i) => i,
            None => match self.vertices.len().checked_sub(1) {
                Some(last) => last as u32,
                None => return false,
            },
        };
        if index as usize >= self.vertices.len() {
            return false;
        }
        self.indices.push(index);
        if let Some(surface) = self.surfaces.last_mut() {
            surface.count += 1;
        }
        true
    }

    /// Raw bytes of the vertex buffer.
    pub fn vertex_data(&self) -> &[u8] {
        bytemuck::cast_slice(&self.vertices)
    }

    /// Raw bytes of the index buffer.
    pub fn index_data(&self) -> &[u8] {
        bytemuck::cast_slice(&self.indices)
    }
}
