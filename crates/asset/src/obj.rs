//! OBJ mesh loader: positions, normals, texture coordinates, groups and
//! material references, emitted as one indexed vertex buffer split into
//! material-tagged surfaces.

use std::{
    collections::HashMap,
    fs::File,
    io::{self, BufRead, BufReader},
    path::{Path, PathBuf},
};

use corelib::{
    CoreError, CoreResult, FilePathInfo,
    text::{read_floats, rest_after_keyword, to_lower_identifier},
};

use crate::{
    cache,
    mesh::{Mesh, Surface, SurfaceMode, Vertex},
    mtl::MaterialLibrary,
    tangent::compute_tangents,
};

/// How face corners become output vertices.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum IndexingMode {
    /// Every corner gets a fresh vertex slot.
    #[default]
    Sequential,
    /// Corners with identical (position, texcoord, normal) share a slot.
    Deduplicate,
}

/// Loader configuration.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ObjOptions {
    pub indexing: IndexingMode,
    /// Read `<source>.cache` when it is not older than the source.
    pub use_cache: bool,
    /// Write `<source>.cache` after a text parse.
    pub write_cache: bool,
}

impl Default for ObjOptions {
    fn default() -> Self {
        Self {
            indexing: IndexingMode::Sequential,
            use_cache: true,
            write_cache: true,
        }
    }
}

/// Sibling cache file for a source path: `model.obj` -> `model.obj.cache`.
pub fn cache_path_for(path: impl AsRef<Path>) -> PathBuf {
    let mut name = path.as_ref().as_os_str().to_owned();
    name.push(".cache");
    PathBuf::from(name)
}

/// Load an OBJ mesh from a file path, going through the binary cache when
/// it is fresh and refreshing it after a text parse.
pub fn load_obj_from_path(path: impl AsRef<Path>, options: &ObjOptions) -> CoreResult<Mesh> {
    let path = path.as_ref();
    let source = FilePathInfo::new(path);
    let cache_file = cache_path_for(path);

    if options.use_cache && source.exists() {
        let cache_info = FilePathInfo::new(&cache_file);
        if cache_info.exists() && cache_info.not_older_than(&source) {
            log::info!("'{}' ... reading cached OBJ '{}'", source.filename(), cache_file.display());
            match cache::decode(&cache_file) {
                Ok(mesh) => return Ok(mesh),
                Err(e) => log::warn!("'{}' ... cache rejected, re-parsing: {}", source.filename(), e),
            }
        }
    }

    log::info!("'{}' ... loading", source.filename());
    let file = File::open(path).map_err(|e| CoreError::io(path, e))?;
    let base_dir = source.parent_path().to_path_buf();
    let mesh = parse_obj(BufReader::new(file), Some(&base_dir), options)?;

    if options.write_cache {
        log::info!("'{}' ... writing cached OBJ '{}'", source.filename(), cache_file.display());
        if let Err(e) = cache::encode(&mesh, &cache_file) {
            log::warn!("'{}' ... failed to write cache: {}", source.filename(), e);
        }
    }
    Ok(mesh)
}

/// Load an OBJ mesh from a [`BufRead`] implementation. `mtllib` references
/// resolve against `base_dir` first, then the working directory.
pub fn load_obj_from_reader<R: BufRead>(
    reader: R,
    base_dir: Option<&Path>,
    options: &ObjOptions,
) -> CoreResult<Mesh> {
    parse_obj(reader, base_dir, options)
}

/// Convenience helper to parse an OBJ string literal.
pub fn load_obj_from_str(contents: &str, options: &ObjOptions) -> CoreResult<Mesh> {
    parse_obj(io::Cursor::new(contents), None, options)
}

/// Load the mesh and every material library it references.
pub fn load_obj_with_materials(
    path: impl AsRef<Path>,
    options: &ObjOptions,
) -> CoreResult<(Mesh, MaterialLibrary)> {
    let mesh = load_obj_from_path(path, options)?;
    let mut library = MaterialLibrary::new();
    if let Err(e) = library.load_libraries(&mesh.material_libraries) {
        log::warn!("Some material libraries failed to load: {}", e);
    }
    Ok((mesh, library))
}

fn parse_obj<R: BufRead>(
    mut reader: R,
    base_dir: Option<&Path>,
    options: &ObjOptions,
) -> CoreResult<Mesh> {
    let mut parser = ObjParser::new(base_dir, options.indexing);
    let mut buf = Vec::new();
    let mut line_no = 0;
    loop {
        buf.clear();
        let read = reader.read_until(b'\n', &mut buf).map_err(|e| CoreError::Parse {
            line: line_no + 1,
            message: format!("unreadable line: {e}"),
        })?;
        if read == 0 {
            break;
        }
        line_no += 1;
        // Stray non-UTF-8 bytes (e.g. Latin-1 comments) must not abort a load.
        let line = String::from_utf8_lossy(&buf);
        parser.handle_line(line_no, &line)?;
    }
    Ok(parser.finish())
}

/// One face corner as written: 1-based or negative indices, `None` if absent.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RawCorner {
    pub position: i64,
    pub texcoord: Option<i64>,
    pub normal: Option<i64>,
}

/// A face corner with 0-based indices checked against the raw arrays.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Corner {
    pub position: u32,
    pub texcoord: Option<u32>,
    pub normal: Option<u32>,
}

impl Corner {
    /// Pack the three indices into one key. Components are stored as
    /// `index + 1` so an absent component never equals index 0.
    ///
    /// Position and normal get 24 bits each, texcoord 16; the key is only
    /// unique when [`Corner::packs_into_key`] holds.
    pub fn composite_key(&self) -> u64 {
        let part = |i: Option<u32>| i.map_or(0, |i| u64::from(i) + 1);
        part(Some(self.position)) | (part(self.texcoord) << 48) | (part(self.normal) << 24)
    }

    /// `true` if every stored component fits its field of the composite key.
    pub fn packs_into_key(&self) -> bool {
        let fits = |i: Option<u32>, bits: u32| i.is_none_or(|i| u64::from(i) + 1 < 1 << bits);
        fits(Some(self.position), 24) && fits(self.normal, 24) && fits(self.texcoord, 16)
    }
}

/// Split `p`, `p/t`, `p//n` or `p/t/n`.
pub fn parse_corner(token: &str, line: usize) -> CoreResult<RawCorner> {
    let mut split = token.split('/');
    let parse = |field: &str| {
        field.parse::<i64>().map_err(|_| CoreError::Parse {
            line,
            message: format!("invalid face index '{}' in '{}'", field, token),
        })
    };
    let optional = |field: Option<&str>| match field {
        Some(f) if !f.is_empty() => parse(f).map(Some),
        _ => Ok(None),
    };

    let position = parse(split.next().unwrap_or_default())?;
    let texcoord = optional(split.next())?;
    let normal = optional(split.next())?;
    Ok(RawCorner {
        position,
        texcoord,
        normal,
    })
}

/// Map a written index to 0-based: `n > 0` -> `n - 1`, `n < 0` -> `len + n`.
pub fn resolve_index(raw: i64, len: usize, kind: &'static str, line: usize) -> CoreResult<u32> {
    let idx = if raw > 0 { raw - 1 } else { len as i64 + raw };
    if raw == 0 || idx < 0 || idx >= len as i64 {
        return Err(CoreError::Geometry {
            line,
            kind,
            index: raw,
            len,
        });
    }
    Ok(idx as u32)
}

/// Raw attribute streams read so far.
#[derive(Clone, Debug, Default)]
pub struct RawAttributes {
    pub positions: Vec<[f32; 3]>,
    pub normals: Vec<[f32; 3]>,
    pub texcoords: Vec<[f32; 2]>,
}

impl RawAttributes {
    pub fn resolve(&self, raw: RawCorner, line: usize) -> CoreResult<Corner> {
        Ok(Corner {
            position: resolve_index(raw.position, self.positions.len(), "position", line)?,
            texcoord: raw
                .texcoord
                .map(|t| resolve_index(t, self.texcoords.len(), "texcoord", line))
                .transpose()?,
            normal: raw
                .normal
                .map(|n| resolve_index(n, self.normals.len(), "normal", line))
                .transpose()?,
        })
    }

    /// Build the vertex for a corner returned by [`RawAttributes::resolve`].
    /// Absent components keep the vertex defaults.
    pub fn vertex(&self, corner: Corner) -> Vertex {
        let mut v = Vertex::default();
        v.position = self.positions[corner.position as usize];
        if let Some(n) = corner.normal {
            v.normal = self.normals[n as usize];
        }
        if let Some(t) = corner.texcoord {
            v.texcoord = self.texcoords[t as usize];
        }
        v
    }
}

/// Corner emission strategy.
#[derive(Debug)]
pub enum CornerIndexer {
    Sequential,
    Deduplicate(HashMap<u64, u32>),
}

impl CornerIndexer {
    pub fn new(mode: IndexingMode) -> Self {
        match mode {
            IndexingMode::Sequential => CornerIndexer::Sequential,
            IndexingMode::Deduplicate => CornerIndexer::Deduplicate(HashMap::new()),
        }
    }

    /// Return the output slot for `corner`, appending a vertex to `mesh`
    /// when the slot is new. Slots are handed out in first-seen order.
    /// Corners too large for the composite key always get a fresh slot.
    pub fn emit_corner(&mut self, attrs: &RawAttributes, corner: Corner, mesh: &mut Mesh) -> u32 {
        match self {
            CornerIndexer::Sequential => mesh.push_vertex(attrs.vertex(corner), false),
            CornerIndexer::Deduplicate(_) if !corner.packs_into_key() => {
                log::debug!("Corner {:?} exceeds the dedup key, not shared", corner);
                mesh.push_vertex(attrs.vertex(corner), false)
            }
            CornerIndexer::Deduplicate(slots) => {
                let next = mesh.vertex_count() as u32;
                let slot = *slots.entry(corner.composite_key()).or_insert(next);
                if slot == next {
                    mesh.push_vertex(attrs.vertex(corner), false);
                }
                slot
            }
        }
    }
}

/// Line-by-line parser state.
struct ObjParser {
    base_dir: Option<PathBuf>,
    attrs: RawAttributes,
    indexer: CornerIndexer,
    mesh: Mesh,
    faces: Vec<[u32; 3]>,
    current_surface: usize,
    material_library: String,
    object_name: String,
}

impl ObjParser {
    fn new(base_dir: Option<&Path>, indexing: IndexingMode) -> Self {
        let mut mesh = Mesh::new();
        mesh.create_simple_model(0, 0, 1);
        Self {
            base_dir: base_dir.map(Path::to_path_buf),
            attrs: RawAttributes::default(),
            indexer: CornerIndexer::new(indexing),
            mesh,
            faces: Vec::new(),
            current_surface: 0,
            material_library: String::new(),
            object_name: String::new(),
        }
    }

    fn handle_line(&mut self, line_no: usize, line: &str) -> CoreResult<()> {
        let trimmed = line.trim();
        let mut parts = trimmed.split_whitespace();
        let Some(tag) = parts.next() else {
            return Ok(());
        };

        match tag {
            "o" => {
                self.object_name = to_lower_identifier(parts.next().unwrap_or_default());
                log::debug!("Adding new object '{}'", self.object_name);
            }
            "g" => {
                let name = to_lower_identifier(parts.next().unwrap_or_default());
                log::debug!("Changing surface name to '{}'", name);
                self.mesh.surfaces[self.current_surface].surface_name = name;
            }
            "usemtl" => self.use_material(parts.next().unwrap_or_default()),
            "mtllib" => self.add_material_library(rest_after_keyword(trimmed, "mtllib")),
            "v" => self.attrs.positions.push(read_floats::<3>(&mut parts)),
            "vn" => self.attrs.normals.push(read_floats::<3>(&mut parts)),
            "vt" => self.attrs.texcoords.push(read_floats::<2>(&mut parts)),
            "f" => self.add_face(parts, line_no)?,
            _ => {
                // Ignore other directives (s/l/comments/etc.)
            }
        }
        Ok(())
    }

    fn add_face<'a>(
        &mut self,
        parts: impl Iterator<Item = &'a str>,
        line_no: usize,
    ) -> CoreResult<()> {
        let tokens: Vec<&str> = parts.collect();
        if tokens.len() < 3 {
            return Err(CoreError::Parse {
                line: line_no,
                message: format!("face needs 3 corners, found {}", tokens.len()),
            });
        }
        if tokens.len() > 3 {
            log::debug!("Line {}: ignoring {} extra face corners", line_no, tokens.len() - 3);
        }

        let mut corners = [Corner {
            position: 0,
            texcoord: None,
            normal: None,
        }; 3];
        for (slot, token) in corners.iter_mut().zip(&tokens) {
            *slot = self.attrs.resolve(parse_corner(token, line_no)?, line_no)?;
        }

        let face = corners.map(|c| self.indexer.emit_corner(&self.attrs, c, &mut self.mesh));
        self.faces.push(face);
        Ok(())
    }

    /// Move pending faces into the current surface.
    fn flush_faces(&mut self) {
        let surface = &mut self.mesh.surfaces[self.current_surface];
        surface.count = (self.faces.len() * 3) as u32;
        log::debug!(
            "Adding {} new faces starting at {} to '{}'",
            self.faces.len(),
            surface.first,
            surface.surface_name
        );
        self.mesh.indices.extend(self.faces.drain(..).flatten());
    }

    fn use_material(&mut self, name: &str) {
        if !self.faces.is_empty() {
            self.flush_faces();
            let first = self.mesh.indices.len() as u32;
            self.mesh.surfaces.push(Surface::new(SurfaceMode::Triangles, first));
            self.current_surface = self.mesh.surfaces.len() - 1;
        }

        let name = to_lower_identifier(name);
        log::debug!("Using material '{}' from '{}'", name, self.material_library);
        let surface = &mut self.mesh.surfaces[self.current_surface];
        surface.material_library = self.material_library.clone();
        surface.material_name = name;
    }

    fn add_material_library(&mut self, reference: &str) {
        let roots: Vec<PathBuf> = self.base_dir.iter().cloned().collect();
        let info = FilePathInfo::search(reference, &roots);
        if !info.exists() {
            log::warn!("mtllib '{}' was not found", reference);
            return;
        }
        let short_name = info.filename().to_string();
        if !self.mesh.material_libraries.contains_key(&short_name) {
            log::info!("Adding mtllib '{}' to load list", short_name);
            self.mesh.material_libraries.insert(
                short_name.clone(),
                info.shortest_path().to_string_lossy().into_owned(),
            );
        }
        self.material_library = short_name;
    }

    fn finish(mut self) -> Mesh {
        self.flush_faces();
        if !self.object_name.is_empty() {
            log::debug!("Last object was '{}'", self.object_name);
        }

        let mut mesh = self.mesh;
        mesh.sanitize();
        compute_tangents(&mut mesh);
        // Bounds were folded before sanitizing.
        mesh.recompute_bounds();
        mesh.rebuild_material_map();
        log::info!(
            "OBJ parsed: {} vertices, {} indices, {} surfaces",
            mesh.vertex_count(),
            mesh.index_count(),
            mesh.surfaces.len()
        );
        mesh
    }
}
