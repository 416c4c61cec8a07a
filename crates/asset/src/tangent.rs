//! Per-vertex tangent frames from triangle topology and texture coordinates.

use corelib::{Vec2, Vec3};

use crate::mesh::Mesh;

/// Tangent and bitangent of one triangle, unnormalized.
///
/// A triangle with zero UV area yields non-finite vectors; callers sanitize.
pub fn triangle_tangents(pos: [Vec3; 3], uv: [Vec2; 3]) -> (Vec3, Vec3) {
    let e1 = pos[1] - pos[0];
    let e2 = pos[2] - pos[0];
    let d1 = uv[1] - uv[0];
    let d2 = uv[2] - uv[0];

    let det = d1.x * d2.y - d2.x * d1.y;
    let coef = 1.0 / det;
    let tangent = (e1 * d2.y - e2 * d1.y) * coef;
    let bitangent = (e2 * d1.x - e1 * d2.x) * coef;
    (tangent, bitangent)
}

/// Recompute every vertex tangent and bitangent in place.
///
/// Contributions from all triangles sharing a vertex are summed, then normal,
/// tangent and bitangent are normalized and non-finite values zeroed.
pub fn compute_tangents(mesh: &mut Mesh) {
    for v in &mut mesh.vertices {
        v.tangent = [0.0; 3];
        v.bitangent = [0.0; 3];
    }

    let vertex_count = mesh.vertices.len();
    for tri in mesh.indices.chunks_exact(3) {
        let ids = [tri[0] as usize, tri[1] as usize, tri[2] as usize];
        if ids.iter().any(|&i| i >= vertex_count) {
            log::debug!("Skipping triangle {:?} with out-of-range index", ids);
            continue;
        }
        let verts = ids.map(|i| mesh.vertices[i]);
        let (t, b) = triangle_tangents(
            verts.map(|v| v.position()),
            verts.map(|v| Vec2::from_array(v.texcoord)),
        );
        for i in ids {
            let v = &mut mesh.vertices[i];
            v.tangent = (Vec3::from_array(v.tangent) + t).to_array();
            v.bitangent = (Vec3::from_array(v.bitangent) + b).to_array();
        }
    }

    for v in &mut mesh.vertices {
        v.normal = Vec3::from_array(v.normal).normalize().to_array();
        v.tangent = Vec3::from_array(v.tangent).normalize().to_array();
        v.bitangent = Vec3::from_array(v.bitangent).normalize().to_array();
        v.sanitize();
    }
}
