//! Binary mesh cache.
//!
//! Body layout, sequential and unpadded, integers in native byte order:
//!
//! ```text
//! u32 vertexCount, u32 indexCount, u32 surfaceCount
//! u32 libraryCount, then (string key, string path) per library
//! vertexCount * Vertex (128-byte records)
//! indexCount * u32
//! per surface: u32 mode, u32 first, u32 count,
//!              string material, string library, string surface name
//! ```
//!
//! Strings are a `u32` byte length followed by UTF-8 bytes. Version 1 files
//! prefix the body with `b"MSHC"`, `u32 version` and `u32 vertex stride`;
//! files without the magic are read as the unversioned legacy body.

use std::{
    fs,
    path::{Path, PathBuf},
};

use bytemuck::Zeroable;
use corelib::{CoreError, CoreResult};

use crate::mesh::{Mesh, Surface, SurfaceMode, Vertex};

pub const MAGIC: &[u8; 4] = b"MSHC";
pub const CURRENT_VERSION: u32 = 1;

/// Which header the writer emits.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum CacheVersion {
    /// Bare body, no header.
    Legacy,
    #[default]
    V1,
}

/// Write `mesh` to `dest` with the current header.
pub fn encode(mesh: &Mesh, dest: impl AsRef<Path>) -> CoreResult<()> {
    encode_with(mesh, dest, CacheVersion::default())
}

/// Write `mesh` to `dest`. The bytes go to a sibling temporary file that is
/// renamed into place, so a failed write never leaves a readable cache.
pub fn encode_with(mesh: &Mesh, dest: impl AsRef<Path>, version: CacheVersion) -> CoreResult<()> {
    let dest = dest.as_ref();
    let bytes = to_bytes(mesh, version)?;

    let mut tmp = dest.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    let written = fs::write(&tmp, &bytes).and_then(|()| fs::rename(&tmp, dest));
    if let Err(e) = written {
        let _ = fs::remove_file(&tmp);
        return Err(CoreError::io(dest, e));
    }
    log::debug!("Wrote {} cache bytes to '{}'", bytes.len(), dest.display());
    Ok(())
}

/// Serialize `mesh`. Fails for a mesh without vertices or indices.
pub fn to_bytes(mesh: &Mesh, version: CacheVersion) -> CoreResult<Vec<u8>> {
    if !mesh.is_valid() {
        return Err(CoreError::cache("mesh has no vertices or indices"));
    }

    let mut w = ByteWriter::default();
    if version == CacheVersion::V1 {
        w.bytes(MAGIC);
        w.u32(CURRENT_VERSION);
        w.u32(Vertex::STRIDE as u32);
    }

    w.count(mesh.vertices.len())?;
    w.count(mesh.indices.len())?;
    w.count(mesh.surfaces.len())?;

    w.count(mesh.material_libraries.len())?;
    for (name, path) in &mesh.material_libraries {
        w.string(name)?;
        w.string(path)?;
    }

    w.bytes(bytemuck::cast_slice(&mesh.vertices));
    w.bytes(bytemuck::cast_slice(&mesh.indices));

    for s in &mesh.surfaces {
        w.u32(s.mode.as_u32());
        w.u32(s.first);
        w.u32(s.count);
        w.string(&s.material_name)?;
        w.string(&s.material_library)?;
        w.string(&s.surface_name)?;
    }
    Ok(w.buf)
}

/// Read a cache file written by [`encode`] or by the legacy writer.
pub fn decode(src: impl AsRef<Path>) -> CoreResult<Mesh> {
    let src = src.as_ref();
    let bytes = fs::read(src).map_err(|e| CoreError::io(src, e))?;
    from_bytes(&bytes)
}

/// Parse cache bytes, rejecting anything truncated, trailing or inconsistent.
pub fn from_bytes(bytes: &[u8]) -> CoreResult<Mesh> {
    let mut r = ByteReader::new(bytes);

    if bytes.starts_with(MAGIC) {
        r.take(MAGIC.len(), "magic")?;
        let version = r.u32("version")?;
        if version != CURRENT_VERSION {
            return Err(CoreError::cache(format!("unsupported cache version {version}")));
        }
        let stride = r.u32("vertex stride")? as usize;
        if stride != Vertex::STRIDE {
            return Err(CoreError::cache(format!(
                "vertex record is {stride} bytes, expected {}",
                Vertex::STRIDE
            )));
        }
    }

    let vertex_count = r.u32("vertex count")? as usize;
    let index_count = r.u32("index count")? as usize;
    let surface_count = r.u32("surface count")? as usize;
    if vertex_count == 0 || index_count == 0 {
        return Err(CoreError::cache("mesh has no vertices or indices"));
    }

    let mut mesh = Mesh::new();
    let library_count = r.u32("library count")?;
    for _ in 0..library_count {
        let name = r.string("library name")?;
        let path = r.string("library path")?;
        mesh.material_libraries.insert(name, path);
    }

    let mut vertices = vec![Vertex::zeroed(); r.fits(vertex_count, Vertex::STRIDE, "vertices")?];
    bytemuck::cast_slice_mut::<Vertex, u8>(&mut vertices)
        .copy_from_slice(r.take(vertex_count * Vertex::STRIDE, "vertices")?);

    let mut indices = vec![0u32; r.fits(index_count, 4, "indices")?];
    bytemuck::cast_slice_mut::<u32, u8>(&mut indices)
        .copy_from_slice(r.take(index_count * 4, "indices")?);

    if let Some(bad) = indices.iter().find(|&&i| i as usize >= vertex_count) {
        return Err(CoreError::cache(format!(
            "index {bad} out of range for {vertex_count} vertices"
        )));
    }

    let mut surfaces = Vec::with_capacity(surface_count.min(r.remaining() / 24));
    for i in 0..surface_count {
        let raw_mode = r.u32("surface mode")?;
        let mode = SurfaceMode::try_from(raw_mode)
            .map_err(|m| CoreError::cache(format!("surface {i} has unknown mode {m}")))?;
        let surface = Surface {
            mode,
            first: r.u32("surface first")?,
            count: r.u32("surface count")?,
            material_name: r.string("material name")?,
            material_library: r.string("material library")?,
            surface_name: r.string("surface name")?,
        };
        if !surface.fits(index_count) {
            return Err(CoreError::cache(format!(
                "surface {i} [{}, +{}) does not fit {index_count} indices",
                surface.first, surface.count
            )));
        }
        surfaces.push(surface);
    }

    if r.remaining() != 0 {
        return Err(CoreError::cache(format!(
            "{} trailing bytes after last surface",
            r.remaining()
        )));
    }

    mesh.vertices = vertices;
    mesh.indices = indices;
    mesh.surfaces = surfaces;
    mesh.recompute_bounds();
    mesh.rebuild_material_map();
    Ok(mesh)
}

#[derive(Default)]
struct ByteWriter {
    buf: Vec<u8>,
}

impl ByteWriter {
    fn bytes(&mut self, b: &[u8]) {
        self.buf.extend_from_slice(b);
    }

    fn u32(&mut self, v: u32) {
        self.buf.extend_from_slice(&v.to_ne_bytes());
    }

    fn count(&mut self, n: usize) -> CoreResult<()> {
        let n = u32::try_from(n).map_err(|_| CoreError::cache(format!("count {n} exceeds u32")))?;
        self.u32(n);
        Ok(())
    }

    fn string(&mut self, s: &str) -> CoreResult<()> {
        self.count(s.len())?;
        self.bytes(s.as_bytes());
        Ok(())
    }
}

struct ByteReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    /// Check that `count` records of `size` bytes are available.
    fn fits(&self, count: usize, size: usize, what: &str) -> CoreResult<usize> {
        match count.checked_mul(size) {
            Some(n) if n <= self.remaining() => Ok(count),
            _ => Err(CoreError::cache(format!(
                "header claims {count} {what} but only {} bytes remain",
                self.remaining()
            ))),
        }
    }

    fn take(&mut self, n: usize, what: &str) -> CoreResult<&'a [u8]> {
        if n > self.remaining() {
            return Err(CoreError::cache(format!(
                "truncated {what}: need {n} bytes at offset {}, have {}",
                self.pos,
                self.remaining()
            )));
        }
        let out = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(out)
    }

    fn u32(&mut self, what: &str) -> CoreResult<u32> {
        let b = self.take(4, what)?;
        Ok(u32::from_ne_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn string(&mut self, what: &str) -> CoreResult<String> {
        let len = self.u32(what)? as usize;
        let raw = self.take(len, what)?;
        String::from_utf8(raw.to_vec())
            .map_err(|_| CoreError::cache(format!("{what} is not valid UTF-8")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::obj::{ObjOptions, load_obj_from_str};
    use std::env;

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = env::temp_dir().join(format!("asset-cache-{}-{}", name, std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).expect("create scratch dir");
        dir
    }

    fn triangle() -> Mesh {
        load_obj_from_str("v 0 0 0\nv 1 0 0\nv 1 1 0\nf 1 2 3\n", &ObjOptions::default())
            .expect("parse triangle")
    }

    fn tagged_mesh() -> Mesh {
        let mut mesh = triangle();
        mesh.material_libraries
            .insert("stone.mtl".into(), "assets/stone.mtl".into());
        let s = &mut mesh.surfaces[0];
        s.material_name = "granite".into();
        s.material_library = "stone.mtl".into();
        s.surface_name = "wall".into();
        mesh.rebuild_material_map();
        mesh
    }

    fn put_u32(buf: &mut Vec<u8>, v: u32) {
        buf.extend_from_slice(&v.to_ne_bytes());
    }

    #[test]
    fn triangle_round_trips_through_file() {
        let dir = scratch_dir("triangle");
        let path = dir.join("tri.obj.cache");
        let mesh = triangle();
        encode(&mesh, &path).expect("encode");
        let decoded = decode(&path).expect("decode");
        assert_eq!(decoded.vertices, mesh.vertices);
        assert_eq!(decoded.indices, vec![0, 1, 2]);
        assert_eq!(decoded, mesh);
    }

    #[test]
    fn strings_and_libraries_survive() {
        let mesh = tagged_mesh();
        for version in [CacheVersion::Legacy, CacheVersion::V1] {
            let bytes = to_bytes(&mesh, version).expect("encode");
            let decoded = from_bytes(&bytes).expect("decode");
            assert_eq!(decoded.surfaces[0].surface_name, "wall");
            assert_eq!(decoded.materials["granite"], "stone.mtl");
            assert_eq!(decoded.material_libraries["stone.mtl"], "assets/stone.mtl");
            assert_eq!(decoded, mesh);
        }
    }

    #[test]
    fn legacy_layout_is_the_bare_body() {
        let mesh = tagged_mesh();
        let legacy = to_bytes(&mesh, CacheVersion::Legacy).expect("legacy");
        let v1 = to_bytes(&mesh, CacheVersion::V1).expect("v1");

        let mut expected = Vec::new();
        put_u32(&mut expected, 3);
        put_u32(&mut expected, 3);
        put_u32(&mut expected, 1);
        put_u32(&mut expected, 1);
        put_u32(&mut expected, 9);
        expected.extend_from_slice(b"stone.mtl");
        put_u32(&mut expected, 16);
        expected.extend_from_slice(b"assets/stone.mtl");
        expected.extend_from_slice(bytemuck::cast_slice(&mesh.vertices));
        for i in [0u32, 1, 2] {
            put_u32(&mut expected, i);
        }
        put_u32(&mut expected, SurfaceMode::Triangles.as_u32());
        put_u32(&mut expected, 0);
        put_u32(&mut expected, 3);
        for s in ["granite", "stone.mtl", "wall"] {
            put_u32(&mut expected, s.len() as u32);
            expected.extend_from_slice(s.as_bytes());
        }

        assert_eq!(legacy, expected);
        assert_eq!(&v1[..4], MAGIC);
        assert_eq!(&v1[12..], &legacy[..]);
    }

    #[test]
    fn empty_mesh_is_not_written() {
        let dir = scratch_dir("empty");
        let path = dir.join("empty.cache");
        let err = encode(&Mesh::new(), &path).expect_err("empty");
        assert!(matches!(err, CoreError::CacheFormat(_)));
        assert!(!path.exists());
    }

    #[test]
    fn short_vertex_block_is_rejected() {
        let mut bytes = Vec::new();
        put_u32(&mut bytes, 10);
        put_u32(&mut bytes, 3);
        put_u32(&mut bytes, 1);
        put_u32(&mut bytes, 0);
        bytes.extend_from_slice(&[0u8; 2 * Vertex::STRIDE]);
        let err = from_bytes(&bytes).expect_err("truncated");
        assert!(err.to_string().contains("10 vertices"), "{err}");
    }

    #[test]
    fn empty_or_truncated_header_is_rejected() {
        assert!(from_bytes(&[]).is_err());
        assert!(from_bytes(&[3, 0, 0, 0, 3]).is_err());
        let mut zero = Vec::new();
        for _ in 0..4 {
            put_u32(&mut zero, 0);
        }
        assert!(from_bytes(&zero).is_err());
    }

    #[test]
    fn foreign_headers_are_rejected() {
        let good = to_bytes(&triangle(), CacheVersion::V1).expect("encode");

        let mut version = good.clone();
        version[4..8].copy_from_slice(&7u32.to_ne_bytes());
        assert!(from_bytes(&version).is_err());

        let mut stride = good.clone();
        stride[8..12].copy_from_slice(&64u32.to_ne_bytes());
        assert!(from_bytes(&stride).is_err());

        let mut trailing = good;
        trailing.push(0);
        assert!(from_bytes(&trailing).is_err());
    }

    #[test]
    fn inconsistent_body_is_rejected() {
        let mesh = triangle();

        let mut bad_index = mesh.clone();
        bad_index.indices[2] = 3;
        let bytes = to_bytes(&bad_index, CacheVersion::V1).expect("encode");
        assert!(from_bytes(&bytes).is_err());

        let mut bad_surface = mesh.clone();
        bad_surface.surfaces[0].first = 3;
        let bytes = to_bytes(&bad_surface, CacheVersion::V1).expect("encode");
        assert!(from_bytes(&bytes).is_err());

        let mut bad_mode = to_bytes(&mesh, CacheVersion::Legacy).expect("encode");
        let mode_at = 16 + 3 * Vertex::STRIDE + 3 * 4;
        bad_mode[mode_at..mode_at + 4].copy_from_slice(&9u32.to_ne_bytes());
        let err = from_bytes(&bad_mode).expect_err("mode");
        assert!(err.to_string().contains("unknown mode 9"), "{err}");
    }

    #[test]
    fn decoded_bounds_and_materials_are_rebuilt() {
        let mut mesh = tagged_mesh();
        mesh.surfaces.push(Surface {
            material_name: "granite".into(),
            material_library: "other.mtl".into(),
            ..Surface::new(SurfaceMode::Points, 0)
        });
        let decoded = from_bytes(&to_bytes(&mesh, CacheVersion::V1).expect("encode")).expect("decode");
        assert_eq!(decoded.materials["granite"], "other.mtl");
        assert_eq!(decoded.bounds.min.to_array(), [0.0, 0.0, 0.0]);
        assert_eq!(decoded.bounds.max.to_array(), [1.0, 1.0, 0.0]);
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let err = decode("no/such/file.cache").expect_err("io");
        assert!(matches!(err, CoreError::Io { .. }));
    }
}
