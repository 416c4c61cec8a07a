//! OBJ text writer for meshes built by the loader or the editing API.

use std::{
    fs::File,
    io::{BufWriter, Write},
    path::Path,
};

use corelib::{CoreError, CoreResult};

use crate::mesh::{Mesh, Surface, SurfaceMode, Vertex};

/// Write every vertex, then each triangle surface with its material.
///
/// Faces use the same 1-based index for position, texcoord and normal.
/// Non-triangle surfaces are skipped.
pub fn write_obj<W: Write>(mesh: &Mesh, w: &mut W) -> std::io::Result<()> {
    let mut current_library = "";
    for v in &mesh.vertices {
        write_vertex(w, v)?;
    }
    for surface in &mesh.surfaces {
        if surface.mode != SurfaceMode::Triangles {
            log::warn!("Skipping {:?} surface '{}'", surface.mode, surface.surface_name);
            continue;
        }
        if !surface.material_library.is_empty() && surface.material_library != current_library {
            if let Some(path) = mesh.material_libraries.get(&surface.material_library) {
                writeln!(w, "mtllib {}", path)?;
                current_library = &surface.material_library;
            }
        }
        write_surface_header(w, surface)?;
        let indices = &mesh.indices[surface.index_range()];
        for tri in indices.chunks_exact(3) {
            write_face(w, [tri[0] + 1, tri[1] + 1, tri[2] + 1])?;
        }
    }
    Ok(())
}

/// Write only the surfaces using `material`, each with its own copy of the
/// vertices it references. Returns the number of surfaces written.
pub fn write_obj_by_material<W: Write>(
    mesh: &Mesh,
    w: &mut W,
    mtllib: &str,
    material: &str,
) -> std::io::Result<usize> {
    let mut written = 0;
    let mut next_vertex = 1u32;
    if !mtllib.is_empty() {
        writeln!(w, "mtllib {}", mtllib)?;
    }
    for surface in &mesh.surfaces {
        if surface.material_name != material || surface.mode != SurfaceMode::Triangles {
            continue;
        }
        let indices = &mesh.indices[surface.index_range()];
        let triangles = indices.chunks_exact(3);
        for &i in triangles.clone().flatten() {
            write_vertex(w, &mesh.vertices[i as usize])?;
        }
        write_surface_header(w, surface)?;
        for _ in triangles {
            write_face(w, [next_vertex, next_vertex + 1, next_vertex + 2])?;
            next_vertex += 3;
        }
        written += 1;
    }
    Ok(written)
}

pub fn save_obj(mesh: &Mesh, path: impl AsRef<Path>) -> CoreResult<()> {
    let path = path.as_ref();
    log::info!("Writing OBJ '{}'", path.display());
    let file = File::create(path).map_err(|e| CoreError::io(path, e))?;
    let mut w = BufWriter::new(file);
    write_obj(mesh, &mut w)
        .and_then(|()| w.flush())
        .map_err(|e| CoreError::io(path, e))
}

pub fn save_obj_by_material(
    mesh: &Mesh,
    path: impl AsRef<Path>,
    mtllib: &str,
    material: &str,
) -> CoreResult<usize> {
    let path = path.as_ref();
    let file = File::create(path).map_err(|e| CoreError::io(path, e))?;
    let mut w = BufWriter::new(file);
    let count = write_obj_by_material(mesh, &mut w, mtllib, material)
        .and_then(|n| w.flush().map(|()| n))
        .map_err(|e| CoreError::io(path, e))?;
    log::info!("Wrote {} '{}' surfaces to '{}'", count, material, path.display());
    Ok(count)
}

fn write_vertex<W: Write>(w: &mut W, v: &Vertex) -> std::io::Result<()> {
    let [px, py, pz] = v.position;
    let [nx, ny, nz] = v.normal;
    let [s, t] = v.texcoord;
    writeln!(w, "v {} {} {}", px, py, pz)?;
    writeln!(w, "vn {} {} {}", nx, ny, nz)?;
    writeln!(w, "vt {} {}", s, t)
}

// `usemtl` comes first: it opens the new surface that `g` then renames.
fn write_surface_header<W: Write>(w: &mut W, surface: &Surface) -> std::io::Result<()> {
    writeln!(w, "usemtl {}", surface.material_name)?;
    if !surface.surface_name.is_empty() {
        writeln!(w, "g {}", surface.surface_name)?;
    }
    Ok(())
}

fn write_face<W: Write>(w: &mut W, corners: [u32; 3]) -> std::io::Result<()> {
    let [a, b, c] = corners;
    writeln!(w, "f {a}/{a}/{a} {b}/{b}/{b} {c}/{c}/{c}")
}
