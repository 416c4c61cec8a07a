//! Command-line front end: load an OBJ mesh (and its materials) and print
//! what was found.

use anyhow::{Context, Result, bail};
use asset::{IndexingMode, MapFormat, MapLibrary, MaterialLibrary, ObjOptions};
use corelib::FilePathInfo;

fn parse_flag(name: &str, default: bool) -> bool {
    // --name[=on|off]
    for arg in std::env::args().skip(1) {
        if arg == format!("--{name}") {
            return true;
        }
        if let Some(val) = arg.strip_prefix(&format!("--{name}=")) {
            return matches!(
                val.to_ascii_lowercase().as_str(),
                "1" | "true" | "on" | "yes"
            );
        }
    }
    default
}

fn parse_options() -> ObjOptions {
    let mut options = ObjOptions::default();
    for arg in std::env::args().skip(1) {
        match arg.as_str() {
            "--dedup" => options.indexing = IndexingMode::Deduplicate,
            "--no-cache" => options.use_cache = false,
            "--no-write-cache" => options.write_cache = false,
            _ => {}
        }
    }
    options
}

fn parse_export_arg() -> Option<String> {
    std::env::args()
        .skip(1)
        .find_map(|arg| arg.strip_prefix("--export=").map(str::to_string))
}

fn parse_input_arg() -> Option<String> {
    std::env::args().skip(1).find(|arg| !arg.starts_with("--"))
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let Some(input) = parse_input_arg() else {
        bail!("usage: app <model.obj> [--dedup] [--no-cache] [--no-write-cache] [--materials[=on|off]] [--export=<out.obj>]");
    };
    let options = parse_options();
    let with_materials = parse_flag("materials", true);
    log::info!("Loading '{}' with {:?}, materials={}", input, options, with_materials);

    let info = FilePathInfo::new(&input);
    if !info.is_file() {
        bail!("'{}' is not a file", info.absolute_path().display());
    }

    let (mesh, library) = if with_materials {
        asset::load_obj_with_materials(&input, &options)
    } else {
        asset::load_obj_from_path(&input, &options).map(|mesh| (mesh, MaterialLibrary::new()))
    }
    .with_context(|| format!("Failed to load '{}'", input))?;

    log::info!(
        "{}: {} vertices, {} indices, {} surfaces, bounds size {:?}",
        info.filename(),
        mesh.vertex_count(),
        mesh.index_count(),
        mesh.surfaces.len(),
        mesh.bounds.size()
    );
    for (i, s) in mesh.surfaces.iter().enumerate() {
        log::info!(
            "  surface {}: '{}' first={} count={} material='{}' ({})",
            i,
            s.surface_name,
            s.first,
            s.count,
            s.material_name,
            s.material_library
        );
    }

    if with_materials {
        let mut maps = MapLibrary::new();
        let added = maps.add_library_maps(&library);
        log::info!(
            "{} materials from {} libraries, {} maps ({} rgb8, {} rgba8, {} rgb32f, {} rgba32f)",
            library.materials.len(),
            library.libraries.len(),
            added,
            maps.count(MapFormat::Rgb8),
            maps.count(MapFormat::Rgba8),
            maps.count(MapFormat::Rgb32F),
            maps.count(MapFormat::Rgba32F)
        );
        for name in mesh.materials.keys() {
            if library.material(name).is_none() {
                log::warn!("Material '{}' is used but not defined", name);
            }
        }
    }

    if let Some(out) = parse_export_arg() {
        asset::export::save_obj(&mesh, &out).with_context(|| format!("Failed to export '{}'", out))?;
    }

    log::info!("Done.");
    Ok(())
}
