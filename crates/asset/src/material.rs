//! Material record filled in by the MTL parser.

use std::collections::BTreeMap;

use corelib::{Vec4, text::to_lower_identifier};

/// Shading parameters of one named material.
///
/// Color channels keep their `w` component as a flag: `1.0` means the
/// channel is driven by a texture map.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Material {
    pub name: String,
    /// Diffuse color (`Kd`).
    pub kd: Vec4,
    /// Specular color (`Ks`).
    pub ks: Vec4,
    /// Emissive color (`Ke`).
    pub ke: Vec4,
    /// Index of refraction: rgb per channel (`ior`, `Ksior`), w diffuse (`Kdior`).
    pub kior: Vec4,
    /// Diffuse roughness, fuzziness, subsurface.
    pub kd_roughness: Vec4,
    /// Specular roughness, GGX gamma, anisotropy.
    pub ks_roughness: Vec4,
    /// Metallic, specular, specular tint, anisotropic rotation.
    pub metallic_specular: Vec4,
    /// Clearcoat, clearcoat roughness, sheen, sheen tint.
    pub clearcoat_sheen: Vec4,
    maps: BTreeMap<String, String>,
}

impl Material {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn has_maps(&self) -> bool {
        !self.maps.is_empty()
    }

    pub fn has_map(&self, slot: &str) -> bool {
        self.maps.contains_key(&to_lower_identifier(slot))
    }

    /// Path of the texture attached to `slot` (e.g. `"map_Kd"`).
    pub fn map_path(&self, slot: &str) -> Option<&str> {
        self.maps.get(&to_lower_identifier(slot)).map(String::as_str)
    }

    /// Slot -> path pairs, slots lower-cased.
    pub fn maps(&self) -> &BTreeMap<String, String> {
        &self.maps
    }

    pub fn add_map(&mut self, slot: &str, path: impl Into<String>) {
        self.maps.insert(to_lower_identifier(slot), path.into());
    }
}

/// Phong exponent to a roughness-like alpha.
pub fn shininess_to_alpha(ns: f32) -> f32 {
    (2.0 / (ns + 2.0)).sqrt()
}

pub fn alpha_to_shininess(alpha: f32) -> f32 {
    2.0 / (alpha * alpha) - 2.0
}
