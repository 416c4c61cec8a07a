//! MTL material library parser and writer.

use std::{
    collections::BTreeMap,
    fmt::Write as _,
    fs,
    path::Path,
};

use corelib::{
    CoreError, CoreResult, FilePathInfo, PathFinder, Vec4,
    text::{lossy_f32, read_floats, rest_after_keyword, to_lower_identifier},
};

use crate::material::{Material, alpha_to_shininess, shininess_to_alpha};

/// Materials from one or more MTL files.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MaterialLibrary {
    pub materials: Vec<Material>,
    /// Lower-cased texture file name -> resolved path, shared by all materials.
    pub maps: BTreeMap<String, String>,
    /// Library short name -> resolved library path.
    pub libraries: BTreeMap<String, String>,
}

impl MaterialLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a single library file into a fresh collection.
    pub fn from_path(path: impl AsRef<Path>) -> CoreResult<Self> {
        let mut library = Self::new();
        library.load_library(path)?;
        Ok(library)
    }

    pub fn clear(&mut self) {
        self.materials.clear();
        self.maps.clear();
        self.libraries.clear();
    }

    /// Load every library of a short name -> path map. All entries are
    /// attempted; the first failure is returned.
    pub fn load_libraries(&mut self, libraries: &BTreeMap<String, String>) -> CoreResult<()> {
        let mut first_error = None;
        for path in libraries.values() {
            if let Err(e) = self.load_library(path) {
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    /// Parse an MTL file. A library whose short name is already loaded is
    /// skipped. Texture maps resolve against the library's directory.
    pub fn load_library(&mut self, path: impl AsRef<Path>) -> CoreResult<()> {
        let path = path.as_ref();
        let info = FilePathInfo::new(path);
        let name = info.filename().to_string();
        if self.libraries.contains_key(&name) {
            return Ok(());
        }

        log::info!("'{}' ... loading '{}'", name, info.shortest_path().display());
        let bytes = fs::read(path).map_err(|e| {
            log::error!("'{}' ... cannot read: {}", name, e);
            CoreError::io(path, e)
        })?;
        let contents = String::from_utf8_lossy(&bytes);
        self.libraries
            .insert(name.clone(), info.shortest_path().to_string_lossy().into_owned());

        let mut finder = PathFinder::new();
        finder.push(info.parent_path());
        self.parse(&name, &contents, &finder);
        Ok(())
    }

    /// Index of `name` in [`Self::materials`].
    ///
    /// Returns `0` both when `name` is the first material and when it is not
    /// present at all; callers that need to tell these apart should use
    /// [`Self::material`].
    pub fn get_material_index(&self, name: &str) -> usize {
        self.materials
            .iter()
            .position(|m| m.name == name)
            .unwrap_or(0)
    }

    pub fn material(&self, name: &str) -> Option<&Material> {
        self.materials.iter().find(|m| m.name == name)
    }

    /// Find or append the material called `name`, returning its index.
    fn set_material(&mut self, name: String) -> usize {
        if let Some(i) = self.materials.iter().position(|m| m.name == name) {
            log::warn!("Duplicate material found '{}'", name);
            return i;
        }
        self.materials.push(Material::new(name));
        self.materials.len() - 1
    }

    fn parse(&mut self, library: &str, contents: &str, finder: &PathFinder) {
        let mut current: Option<usize> = None;

        for line in contents.lines() {
            let mut parts = line.split_whitespace();
            let tag = parts.next().unwrap_or_default();

            if tag == "newmtl" {
                let name = to_lower_identifier(rest_after_keyword(line, "newmtl"));
                log::debug!("'{}' ... newmtl '{}'", library, name);
                current = Some(self.set_material(name));
                continue;
            }
            let Some(index) = current else {
                continue;
            };
            if tag.is_empty() || is_comment(tag) {
                continue;
            }

            if tag.starts_with("map_") {
                self.read_map(library, index, tag, rest_after_keyword(line, tag), finder);
                continue;
            }

            let mtl = &mut self.materials[index];
            let scalar = |parts: &mut std::str::SplitWhitespace<'_>| lossy_f32(parts.next());
            match tag {
                "Kd" => set_rgb(&mut mtl.kd, read_floats(&mut parts)),
                "Ks" => set_rgb(&mut mtl.ks, read_floats(&mut parts)),
                "Ke" => set_rgb(&mut mtl.ke, read_floats(&mut parts)),
                "ior" => set_rgb(&mut mtl.kior, [scalar(&mut parts); 3]),
                "Ns" => mtl.ks_roughness.x = shininess_to_alpha(scalar(&mut parts)),
                "#PBKdm" | "Kdm" => mtl.kd_roughness.x = scalar(&mut parts),
                "#PBKdfuzzydusty" | "Kdfuzzydusty" => mtl.kd_roughness.y = scalar(&mut parts),
                "#PBKdsubsurface" | "Kdsubsurface" => mtl.kd_roughness.z = scalar(&mut parts),
                "#PBKsm" | "Ksm" => mtl.ks_roughness.x = scalar(&mut parts),
                "#PBKsGGXgamma" | "KsGGXgamma" => mtl.ks_roughness.y = scalar(&mut parts),
                "#PBKsaniso" | "Ksaniso" | "aniso" => mtl.ks_roughness.z = scalar(&mut parts),
                "#PBKsior" | "Ksior" => set_rgb(&mut mtl.kior, read_floats(&mut parts)),
                "#PBKdior" | "Kdior" => mtl.kior.w = scalar(&mut parts),
                "#PBKsmetallic" | "Ksmetallic" | "metallic" | "Pm" => {
                    mtl.metallic_specular.x = scalar(&mut parts)
                }
                "#PBKsspecular" | "Ksspecular" | "specular" => {
                    mtl.metallic_specular.y = scalar(&mut parts)
                }
                "#PBKsspeculartint" | "Ksspeculartint" | "speculartint" => {
                    mtl.metallic_specular.z = scalar(&mut parts)
                }
                "#PBKsanisor" | "Ksanisor" | "anisor" => {
                    mtl.metallic_specular.w = scalar(&mut parts)
                }
                "Pc" => mtl.clearcoat_sheen.x = scalar(&mut parts),
                "Pcr" => mtl.clearcoat_sheen.y = scalar(&mut parts),
                "sheen" => mtl.clearcoat_sheen.z = scalar(&mut parts),
                "sheentint" => mtl.clearcoat_sheen.w = scalar(&mut parts),
                _ => {
                    // Unsupported property, ignored.
                }
            }
        }
    }

    fn read_map(
        &mut self,
        library: &str,
        index: usize,
        slot: &str,
        reference: &str,
        finder: &PathFinder,
    ) {
        let Some(info) = finder.find(reference) else {
            log::error!("'{}' ... map '{}' not found", library, reference);
            return;
        };
        let path = info.shortest_path().to_string_lossy().into_owned();
        self.maps
            .entry(info.filename().to_lowercase())
            .or_insert_with(|| path.clone());

        let mtl = &mut self.materials[index];
        mtl.add_map(slot, path);
        // Only the canonical spellings flag a texture-driven channel.
        match slot {
            "map_Kd" => mtl.kd.w = 1.0,
            "map_Ks" => mtl.ks.w = 1.0,
            "map_Ke" => mtl.ke.w = 1.0,
            "map_Kdpbr" => mtl.kd_roughness.w = 1.0,
            "map_Kspbr" => mtl.ks_roughness.w = 1.0,
            _ => {}
        }
    }

    /// Render every material in MTL syntax.
    pub fn to_mtl_string(&self) -> String {
        let mut out = String::new();
        for m in &self.materials {
            let _ = writeln!(out, "newmtl {}", m.name);
            let mut color = |label: &str, c: Vec4| {
                let _ = writeln!(out, "    {} {} {} {}", label, c.x, c.y, c.z);
            };
            color("Kd", m.kd);
            color("Ks", m.ks);
            color("Ke", m.ke);
            color("Ksior", m.kior);
            let scalars = [
                ("Ns", alpha_to_shininess(m.ks_roughness.x)),
                ("Kdior", m.kior.w),
                ("Kdm", m.kd_roughness.x),
                ("Kdfuzzydusty", m.kd_roughness.y),
                ("Kdsubsurface", m.kd_roughness.z),
                ("Ksm", m.ks_roughness.x),
                ("KsGGXgamma", m.ks_roughness.y),
                ("aniso", m.ks_roughness.z),
                ("Pm", m.metallic_specular.x),
                ("specular", m.metallic_specular.y),
                ("speculartint", m.metallic_specular.z),
                ("anisor", m.metallic_specular.w),
                ("Pc", m.clearcoat_sheen.x),
                ("Pcr", m.clearcoat_sheen.y),
                ("sheen", m.clearcoat_sheen.z),
                ("sheentint", m.clearcoat_sheen.w),
            ];
            for (label, value) in scalars {
                let _ = writeln!(out, "    {} {}", label, value);
            }
            for (slot, path) in m.maps() {
                let _ = writeln!(out, "    {} {}", slot, path);
            }
        }
        out
    }

    pub fn save_mtl(&self, path: impl AsRef<Path>) -> CoreResult<()> {
        let path = path.as_ref();
        log::info!("Writing MTL '{}'", path.display());
        fs::write(path, self.to_mtl_string()).map_err(|e| CoreError::io(path, e))
    }
}

/// `#`-prefixed tokens are comments, except the `#PB...` parameter spellings.
fn is_comment(tag: &str) -> bool {
    let b = tag.as_bytes();
    match b {
        [b'#', second, third, ..] => *second != b'P' && *third != b'B',
        [b'#', ..] => true,
        _ => false,
    }
}

/// Overwrite rgb, keeping the texture flag in `w`.
fn set_rgb(c: &mut Vec4, rgb: [f32; 3]) {
    c.x = rgb[0];
    c.y = rgb[1];
    c.z = rgb[2];
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{env, path::PathBuf};

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = env::temp_dir().join(format!("asset-mtl-{}-{}", name, std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).expect("create scratch dir");
        dir
    }

    fn write_library(dir: &Path, name: &str, contents: &str) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, contents).expect("write mtl");
        path
    }

    #[test]
    fn comment_rule_keeps_pb_parameters() {
        assert!(is_comment("#"));
        assert!(is_comment("##"));
        assert!(is_comment("#comment"));
        assert!(!is_comment("#PBKdm"));
        // Only one of the two checks has to fail for the token to survive.
        assert!(!is_comment("#Px"));
        assert!(!is_comment("#xB"));
        assert!(!is_comment("Kd"));
    }

    #[test]
    fn parameters_are_read() {
        let dir = scratch_dir("params");
        let path = write_library(
            &dir,
            "params.mtl",
            "\
Kd 9 9 9
newmtl Shiny Metal
Kd 0.1 0.2 0.3
Ks 1 1 1
Ke 0 0.5 0
ior 1.5
Ns 198
#PBKdm 0.25
# Kdm 0.75
#
Kdfuzzydusty 0.1
Ksaniso 0.4
Kdior 1.33
Pm 1
speculartint 0.2
anisor 0.3
Pc 0.6
Pcr 0.7
sheen 0.8
sheentint 0.9
Tr 0.5
",
        );
        let library = MaterialLibrary::from_path(&path).expect("load");
        assert_eq!(library.materials.len(), 1);
        let m = &library.materials[0];
        assert_eq!(m.name, "shiny_metal");
        assert_eq!(m.kd, Vec4::new(0.1, 0.2, 0.3, 0.0));
        assert_eq!(m.ks.x, 1.0);
        assert_eq!(m.ke.y, 0.5);
        assert_eq!(m.kior, Vec4::new(1.5, 1.5, 1.5, 1.33));
        assert!((m.ks_roughness.x - 0.1).abs() < 1e-4);
        assert_eq!(m.kd_roughness.x, 0.25);
        assert_eq!(m.kd_roughness.y, 0.1);
        assert_eq!(m.ks_roughness.z, 0.4);
        assert_eq!(m.metallic_specular, Vec4::new(1.0, 0.0, 0.2, 0.3));
        assert_eq!(m.clearcoat_sheen, Vec4::new(0.6, 0.7, 0.8, 0.9));
        assert_eq!(library.libraries.len(), 1);
        assert!(library.libraries.contains_key("params.mtl"));
    }

    #[test]
    fn duplicate_newmtl_reuses_record() {
        let dir = scratch_dir("dup");
        let path = write_library(
            &dir,
            "dup.mtl",
            "newmtl a\nKd 1 0 0\nnewmtl b\nnewmtl a\nKs 0 1 0\n",
        );
        let library = MaterialLibrary::from_path(&path).expect("load");
        assert_eq!(library.materials.len(), 2);
        let a = library.material("a").expect("a");
        assert_eq!(a.kd.x, 1.0);
        assert_eq!(a.ks.y, 1.0);
    }

    #[test]
    fn maps_resolve_against_library_directory() {
        let dir = scratch_dir("maps");
        fs::create_dir_all(dir.join("textures")).expect("mkdir");
        fs::write(dir.join("textures").join("Brick.PNG"), b"png").expect("write tex");
        let path = write_library(
            &dir,
            "wall.mtl",
            "\
newmtl wall
map_Kd textures/Brick.PNG
map_Ks textures/missing.png
map_Kdpbr textures/Brick.PNG
newmtl floor
map_bump textures/Brick.PNG
MAP_KD textures/Brick.PNG
",
        );
        let library = MaterialLibrary::from_path(&path).expect("load");
        let wall = library.material("wall").expect("wall");
        assert!(wall.has_map("map_Kd"));
        assert!(!wall.has_map("map_Ks"));
        assert_eq!(wall.kd.w, 1.0);
        assert_eq!(wall.ks.w, 0.0);
        assert_eq!(wall.kd_roughness.w, 1.0);

        let floor = library.material("floor").expect("floor");
        assert!(floor.has_map("map_bump"));
        assert!(floor.has_map("map_kd"));
        assert_eq!(floor.kd.w, 0.0);

        assert_eq!(library.maps.len(), 1);
        let resolved = &library.maps["brick.png"];
        assert!(resolved.ends_with("Brick.PNG"));
        assert_eq!(wall.map_path("map_kd"), Some(resolved.as_str()));
    }

    #[test]
    fn latin1_bytes_do_not_abort_the_load() {
        let dir = scratch_dir("latin1");
        let path = dir.join("cafe.mtl");
        fs::write(&path, b"# caf\xe9 au lait\nnewmtl caf\xe9\nKd 0.4 0.3 0.2\n").expect("write mtl");

        let library = MaterialLibrary::from_path(&path).expect("load");
        assert_eq!(library.materials.len(), 1);
        assert_eq!(library.materials[0].name, "caf_");
        assert_eq!(library.materials[0].kd, Vec4::new(0.4, 0.3, 0.2, 0.0));
    }

    #[test]
    fn material_index_zero_is_ambiguous() {
        let dir = scratch_dir("index");
        let path = write_library(&dir, "idx.mtl", "newmtl foo\nnewmtl bar\n");
        let library = MaterialLibrary::from_path(&path).expect("load");
        assert_eq!(library.get_material_index("foo"), 0);
        assert_eq!(library.get_material_index("bar"), 1);
        assert_eq!(library.get_material_index("missing"), 0);
        assert!(library.material("missing").is_none());
    }

    #[test]
    fn loading_same_library_twice_is_a_no_op() {
        let dir = scratch_dir("twice");
        let path = write_library(&dir, "twice.mtl", "newmtl only\nKd 1 1 1\n");
        let mut library = MaterialLibrary::new();
        library.load_library(&path).expect("first");
        let snapshot = library.clone();

        fs::write(&path, "newmtl other\n").expect("rewrite");
        library.load_library(&path).expect("second");
        assert_eq!(library, snapshot);
        assert_eq!(library.materials.len(), 1);
    }

    #[test]
    fn missing_library_is_not_registered() {
        let mut library = MaterialLibrary::new();
        let err = library.load_library("no/such/lib.mtl").expect_err("io");
        assert!(matches!(err, CoreError::Io { .. }));
        assert!(library.libraries.is_empty());

        let mut refs = BTreeMap::new();
        refs.insert("lib.mtl".to_string(), "no/such/lib.mtl".to_string());
        assert!(library.load_libraries(&refs).is_err());
    }

    #[test]
    fn saved_library_reloads_with_same_parameters() {
        let dir = scratch_dir("save");
        let path = write_library(
            &dir,
            "orig.mtl",
            "newmtl glass\nKd 0.2 0.4 0.6\nior 1.5\nNs 50\nPm 0.5\nsheen 0.25\n",
        );
        let library = MaterialLibrary::from_path(&path).expect("load");
        let saved = dir.join("saved.mtl");
        library.save_mtl(&saved).expect("save");

        let reloaded = MaterialLibrary::from_path(&saved).expect("reload");
        let (a, b) = (&library.materials[0], &reloaded.materials[0]);
        assert_eq!(a.name, b.name);
        assert_eq!(a.kd, b.kd);
        assert_eq!(a.kior, b.kior);
        assert!((a.ks_roughness.x - b.ks_roughness.x).abs() < 1e-5);
        assert_eq!(a.metallic_specular, b.metallic_specular);
        assert_eq!(a.clearcoat_sheen, b.clearcoat_sheen);
    }

    #[test]
    fn clear_empties_everything() {
        let dir = scratch_dir("clear");
        let path = write_library(&dir, "c.mtl", "newmtl x\n");
        let mut library = MaterialLibrary::from_path(&path).expect("load");
        library.clear();
        assert_eq!(library, MaterialLibrary::default());
    }
}
