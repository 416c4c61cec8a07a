//! Texture map references grouped by the pixel layout their file format
//! decodes to. Only the extension is inspected; pixels are never read.

use std::{
    collections::BTreeMap,
    io,
    path::{Path, PathBuf},
};

use corelib::{CoreError, CoreResult, FilePathInfo};
use image::ImageFormat;

use crate::mtl::MaterialLibrary;

/// Pixel layout a texture map decodes to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum MapFormat {
    Rgb8,
    Rgba8,
    Rgb32F,
    Rgba32F,
}

impl MapFormat {
    /// Classify by extension (case-insensitive, no leading dot).
    pub fn from_extension(ext: &str) -> Option<Self> {
        // Portable float maps are not an `image` format.
        if ext.eq_ignore_ascii_case("pfm") {
            return Some(Self::Rgb32F);
        }
        match ImageFormat::from_extension(ext)? {
            ImageFormat::Jpeg | ImageFormat::Pnm => Some(Self::Rgb8),
            ImageFormat::Png => Some(Self::Rgba8),
            ImageFormat::OpenExr => Some(Self::Rgba32F),
            _ => None,
        }
    }

    pub fn channels(self) -> usize {
        match self {
            Self::Rgb8 | Self::Rgb32F => 3,
            Self::Rgba8 | Self::Rgba32F => 4,
        }
    }

    pub fn bytes_per_pixel(self) -> usize {
        match self {
            Self::Rgb8 | Self::Rgba8 => self.channels(),
            Self::Rgb32F | Self::Rgba32F => self.channels() * 4,
        }
    }
}

/// Resolved map paths keyed by lower-cased file name, one bucket per format.
#[derive(Clone, Debug, Default)]
pub struct MapLibrary {
    buckets: BTreeMap<MapFormat, BTreeMap<String, PathBuf>>,
}

impl MapLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register one map file. Re-adding a known file name is a no-op.
    pub fn add_map(&mut self, path: impl AsRef<Path>) -> CoreResult<MapFormat> {
        let path = path.as_ref();
        let info = FilePathInfo::new(path);
        let format = MapFormat::from_extension(info.extension())
            .ok_or_else(|| CoreError::UnsupportedMap(path.to_path_buf()))?;
        if !info.is_file() {
            return Err(CoreError::io(path, io::Error::from(io::ErrorKind::NotFound)));
        }

        let key = info.filename().to_lowercase();
        let bucket = self.buckets.entry(format).or_default();
        if !bucket.contains_key(&key) {
            log::debug!("map '{}' ... {:?}", key, format);
            bucket.insert(key, info.shortest_path().to_path_buf());
        }
        Ok(format)
    }

    /// Register every map a material library resolved. Failures are logged
    /// and skipped; returns how many maps were accepted.
    pub fn add_library_maps(&mut self, library: &MaterialLibrary) -> usize {
        let mut added = 0;
        for path in library.maps.values() {
            match self.add_map(path) {
                Ok(_) => added += 1,
                Err(e) => log::warn!("Skipping map: {}", e),
            }
        }
        added
    }

    pub fn get(&self, format: MapFormat, name: &str) -> Option<&Path> {
        self.buckets
            .get(&format)?
            .get(&name.to_lowercase())
            .map(PathBuf::as_path)
    }

    /// Lookup across all formats.
    pub fn find(&self, name: &str) -> Option<(MapFormat, &Path)> {
        let key = name.to_lowercase();
        self.buckets
            .iter()
            .find_map(|(format, bucket)| bucket.get(&key).map(|p| (*format, p.as_path())))
    }

    pub fn count(&self, format: MapFormat) -> usize {
        self.buckets.get(&format).map_or(0, BTreeMap::len)
    }

    pub fn len(&self) -> usize {
        self.buckets.values().map(BTreeMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&mut self) {
        self.buckets.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{env, fs};

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = env::temp_dir().join(format!("asset-maps-{}-{}", name, std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).expect("create scratch dir");
        dir
    }

    #[test]
    fn extensions_classify_by_pixel_layout() {
        assert_eq!(MapFormat::from_extension("jpg"), Some(MapFormat::Rgb8));
        assert_eq!(MapFormat::from_extension("JPEG"), Some(MapFormat::Rgb8));
        assert_eq!(MapFormat::from_extension("ppm"), Some(MapFormat::Rgb8));
        assert_eq!(MapFormat::from_extension("png"), Some(MapFormat::Rgba8));
        assert_eq!(MapFormat::from_extension("pfm"), Some(MapFormat::Rgb32F));
        assert_eq!(MapFormat::from_extension("exr"), Some(MapFormat::Rgba32F));
        assert_eq!(MapFormat::from_extension("tga"), None);
        assert_eq!(MapFormat::from_extension(""), None);
        assert_eq!(MapFormat::Rgba32F.bytes_per_pixel(), 16);
        assert_eq!(MapFormat::Rgb8.bytes_per_pixel(), 3);
    }

    #[test]
    fn maps_land_in_their_bucket() {
        let dir = scratch_dir("buckets");
        for name in ["albedo.png", "rough.jpg", "sky.exr", "Height.PFM"] {
            fs::write(dir.join(name), b"x").expect("write map");
        }
        let mut maps = MapLibrary::new();
        assert_eq!(maps.add_map(dir.join("albedo.png")).expect("png"), MapFormat::Rgba8);
        assert_eq!(maps.add_map(dir.join("rough.jpg")).expect("jpg"), MapFormat::Rgb8);
        assert_eq!(maps.add_map(dir.join("sky.exr")).expect("exr"), MapFormat::Rgba32F);
        assert_eq!(maps.add_map(dir.join("Height.PFM")).expect("pfm"), MapFormat::Rgb32F);
        maps.add_map(dir.join("albedo.png")).expect("again");

        assert_eq!(maps.len(), 4);
        assert_eq!(maps.count(MapFormat::Rgba8), 1);
        assert!(maps.get(MapFormat::Rgb32F, "height.pfm").is_some());
        assert!(maps.get(MapFormat::Rgb8, "height.pfm").is_none());
        assert_eq!(maps.find("ALBEDO.png").map(|(f, _)| f), Some(MapFormat::Rgba8));

        maps.clear();
        assert!(maps.is_empty());
    }

    #[test]
    fn unsupported_and_missing_maps_are_rejected() {
        let dir = scratch_dir("reject");
        fs::write(dir.join("decal.tga"), b"x").expect("write map");
        let mut maps = MapLibrary::new();

        let err = maps.add_map(dir.join("decal.tga")).expect_err("tga");
        assert!(matches!(err, CoreError::UnsupportedMap(_)));
        let err = maps.add_map(dir.join("gone.png")).expect_err("missing");
        assert!(matches!(err, CoreError::Io { .. }));
        assert!(maps.is_empty());
    }

    #[test]
    fn library_maps_are_collected() {
        let dir = scratch_dir("library");
        fs::write(dir.join("wood.png"), b"x").expect("write map");
        fs::write(dir.join("wood.mtl"), "newmtl wood\nmap_Kd wood.png\n").expect("write mtl");
        let library = MaterialLibrary::from_path(dir.join("wood.mtl")).expect("load");

        let mut maps = MapLibrary::new();
        assert_eq!(maps.add_library_maps(&library), 1);
        assert!(maps.get(MapFormat::Rgba8, "wood.png").is_some());
    }
}
