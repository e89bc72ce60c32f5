use s4pi_assets::package::resource::{CAS_PART, RLE2_IMAGE, RLES_IMAGE};
use s4pi_assets::{CasPartResource, Package, Resource, TypedResource, TGI};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use walkdir::WalkDir;
use anyhow::{Result, Context, anyhow};
use log::{info, error, warn};
use rayon::prelude::*;

fn is_debug_mode() -> bool {
    std::env::var("S4PI_DEBUG_MODE").map(|v| v == "1").unwrap_or(false)
}

fn print_help(debug: bool) {
    println!("S4PI Asset Tool");
    println!("\nUsage: s4pi-assets <command> [args]");
    println!("\nAvailable commands:");
    println!("  extract     Extract specific resource types (e.g., textures)");
    println!("  mesh        Resolve a CAS part's LOD 0 mesh and summarise it");
    if debug {
        println!("  investigate Decode every resource and report failures (Debug)");
        println!("  diagnostics Dump DBPF metadata (Debug)");
    }
    println!("\nRun 's4pi-assets <command> --help' for more information on a specific command.");
}

fn main() -> Result<()> {
    env_logger::init_from_env(env_logger::Env::default().default_filter_or("info"));

    let args: Vec<String> = std::env::args().collect();
    let debug = is_debug_mode();
    let cmd = args.get(1).map(|s| s.as_str()).unwrap_or("--help");
    let wants_help = args.iter().skip(2).any(|a| a == "--help");

    match cmd {
        "extract" => {
            let subcommand = args.get(2).map(|s| s.as_str()).unwrap_or("");
            if subcommand == "--help" || subcommand.is_empty() {
                println!("Usage: s4pi-assets extract <subcommand> <path>");
                println!("\nAvailable subcommands:");
                println!("  textures    Converts RLE2 textures (0x3453CF95) to .dds files");
                return Ok(());
            }
            match subcommand {
                "textures" => {
                    if wants_help {
                        println!("Usage: s4pi-assets extract textures <path>");
                        println!("\nWrites every RLE2 texture in the package to a 'textures' directory next to it.");
                        println!("\nExample:");
                        println!("  s4pi-assets extract textures ./hair.package");
                        return Ok(());
                    }
                    let path = args.get(3).ok_or_else(|| {
                        anyhow!("Usage: s4pi-assets extract textures <path>\nTry 's4pi-assets extract textures --help' for more information.")
                    })?;
                    run_extract_textures(Path::new(path))?;
                }
                _ => {
                    println!("Unknown extract subcommand: {}", subcommand);
                    println!("Available subcommands: textures");
                }
            }
        }
        "mesh" => {
            if wants_help {
                println!("Usage: s4pi-assets mesh <package> <type:group:instance>");
                println!("\nFollows the CAS part's LOD 0 mesh key and prints vertex and face counts.");
                println!("\nExample:");
                println!("  s4pi-assets mesh ./top.package 034AEECB:00000000:0123456789ABCDEF");
                return Ok(());
            }
            let (Some(path), Some(key)) = (args.get(2), args.get(3)) else {
                return Err(anyhow!("Usage: s4pi-assets mesh <package> <type:group:instance>"));
            };
            let tgi: TGI = key.parse().map_err(|e| anyhow!("Invalid key '{}': {}", key, e))?;
            run_mesh(Path::new(path), &tgi)?;
        }
        "investigate" => {
            if wants_help {
                println!("Usage: s4pi-assets investigate <file|folder>");
                println!("\nDecodes every resource of every package found and reports per-type results.");
                return Ok(());
            }
            let path = args.get(2).ok_or_else(|| anyhow!("Usage: s4pi-assets investigate <file|folder>"))?;
            run_investigate(Path::new(path))?;
        }
        "diagnostics" => {
            if wants_help {
                println!("Usage: s4pi-assets diagnostics <file>");
                println!("\nDumps DBPF header and index entries for structural analysis.");
                return Ok(());
            }
            let path = args.get(2).ok_or_else(|| anyhow!("Usage: s4pi-assets diagnostics <file>"))?;
            run_diagnostics(Path::new(path))?;
        }
        "--help" | "-h" | "help" => print_help(debug),
        _ => {
            println!("Unknown command: {}", cmd);
            println!("Available commands: extract, mesh{}", if debug { ", investigate, diagnostics" } else { "" });
            println!("Run 's4pi-assets --help' for usage information.");
        }
    }
    Ok(())
}

fn run_diagnostics(path: &Path) -> Result<()> {
    info!("Running Diagnostics: {:?}", path);
    let pkg = Package::open(path).with_context(|| format!("Failed to open {}", path.display()))?;

    println!("Package: {}", path.display());
    println!("Header: {:?}", pkg.header);
    println!("Index Flags: 0x{:X} ({} shared fields)", pkg.schema.flags, pkg.schema.shared_field_count());
    println!("Index Count: {}", pkg.entries.len());

    let mut compressed_count = 0;
    let total = pkg.entries.len();
    for (i, entry) in pkg.entries.iter().enumerate() {
        if entry.is_compressed() {
            compressed_count += 1;
        }

        if i < 20 || i + 5 >= total {
            println!("\nEntry {}:", i);
            println!("  TGI: {}", entry.tgi);
            println!("  Offset: 0x{:08X}", entry.offset);
            println!("  Filesize: {} (0x{:08X})", entry.size(), entry.filesize);
            println!("  Memsize: {} (0x{:08X})", entry.memsize, entry.memsize);
            println!("  Compression: 0x{:04X} ({:?})", entry.compression, entry.compression_kind());
            println!("  Committed: 0x{:04X}", entry.committed);

            let start = entry.offset as usize;
            let head = pkg.data().get(start..start.saturating_add(8).min(pkg.data().len())).unwrap_or(&[]);
            println!("  Data Head: {:02X?}", head);
        } else if i == 20 {
            println!("\n... skipping intermediate entries ...");
        }
    }

    if total > 0 {
        println!("\n--- Compression Summary ---");
        println!("Total Entries: {}", total);
        println!("Compressed: {} ({:.2}%)", compressed_count, (compressed_count as f32 / total as f32) * 100.0);
        println!("Uncompressed: {}", total - compressed_count);
    }
    Ok(())
}

#[derive(Default)]
struct TypeReport {
    count: usize,
    decoded: usize,
    generic: usize,
    skipped: usize,
    first_error: Option<String>,
}

fn package_files(root: &Path) -> Vec<PathBuf> {
    if root.is_file() {
        return vec![root.to_path_buf()];
    }
    WalkDir::new(root)
        .into_iter()
        .filter_map(|e| e.ok())
        .map(|e| e.into_path())
        .filter(|p| p.is_file() && p.extension().is_some_and(|ext| ext == "package"))
        .collect()
}

fn run_investigate(root: &Path) -> Result<()> {
    info!("Investigating: {:?}", root);
    let files = package_files(root);
    if files.is_empty() {
        warn!("No .package files found.");
        return Ok(());
    }
    info!("Found {} packages.", files.len());

    let mut report: BTreeMap<u32, TypeReport> = BTreeMap::new();
    let mut failed_packages = 0;

    for path in &files {
        let pkg = match Package::open(path) {
            Ok(pkg) => pkg,
            Err(e) => {
                error!("Failed to open {}: {}", path.display(), e);
                failed_packages += 1;
                continue;
            }
        };

        let results: Vec<_> = pkg
            .entries
            .par_iter()
            .map(|entry| (entry.tgi, pkg.read_resource(entry)))
            .collect();

        for (tgi, result) in results {
            let slot = report.entry(tgi.res_type).or_default();
            slot.count += 1;
            match result {
                Ok(resource) if resource.is_generic() => slot.generic += 1,
                Ok(_) => slot.decoded += 1,
                Err(e) if e.is_recoverable() => slot.skipped += 1,
                Err(e) => {
                    if slot.first_error.is_none() {
                        slot.first_error = Some(format!("{} in {}: {}", tgi, path.display(), e));
                    }
                }
            }
        }
    }

    println!("\nResource Type Summary:");
    for (res_type, slot) in &report {
        let failed = slot.count - slot.decoded - slot.generic - slot.skipped;
        let status = if failed > 0 {
            format!("FAILED ({} errors)", failed)
        } else if slot.generic == slot.count {
            "UNKNOWN".to_string()
        } else if slot.skipped > 0 {
            format!("KNOWN ({} unsupported)", slot.skipped)
        } else {
            "KNOWN".to_string()
        };
        println!("  Type: 0x{:08X} | Count: {:>5} | Status: {}", res_type, slot.count, status);
    }

    let errors: Vec<_> = report.iter().filter_map(|(t, s)| s.first_error.as_ref().map(|e| (t, e))).collect();
    if !errors.is_empty() {
        println!("\nParse Error Samples (one per type):");
        for (res_type, error) in errors {
            println!("  0x{:08X}: {}", res_type, error);
        }
    }
    if failed_packages > 0 {
        println!("\n{} packages could not be opened.", failed_packages);
    }
    Ok(())
}

fn run_extract_textures(path: &Path) -> Result<()> {
    info!("Extracting textures from: {:?}", path);
    let pkg = Package::open(path).with_context(|| format!("Failed to open {}", path.display()))?;

    let entries: Vec<_> = pkg.entries.iter()
        .filter(|e| e.tgi.res_type == RLE2_IMAGE || e.tgi.res_type == RLES_IMAGE)
        .collect();

    if entries.is_empty() {
        info!("No RLE texture resources found in package.");
        return Ok(());
    }
    info!("Found {} textures.", entries.len());

    let output_dir = path.parent().unwrap_or(Path::new(".")).join("textures");
    std::fs::create_dir_all(&output_dir).context("Failed to create textures directory")?;

    let written = AtomicUsize::new(0);
    entries.par_iter().try_for_each(|entry| -> Result<()> {
        let texture = match pkg.read_resource(entry)? {
            TypedResource::Texture(texture) => texture,
            _ => return Err(anyhow!("{} is not a texture", entry.tgi)),
        };
        let dds = match texture.to_dds() {
            Ok(dds) => dds,
            Err(e) if e.is_recoverable() => {
                warn!("Skipping {}: {}", entry.tgi, e);
                return Ok(());
            }
            Err(e) => return Err(e).with_context(|| format!("Failed to convert {}", entry.tgi)),
        };
        let filename = format!("{:08X}_{:08X}_{:016X}.dds", entry.tgi.res_type, entry.tgi.res_group, entry.tgi.instance);
        std::fs::write(output_dir.join(filename), dds)?;
        written.fetch_add(1, Ordering::Relaxed);
        Ok(())
    })?;

    info!("Wrote {} textures to: {:?}", written.into_inner(), output_dir);
    Ok(())
}

fn run_mesh(path: &Path, tgi: &TGI) -> Result<()> {
    if tgi.res_type != CAS_PART {
        warn!("Key {} is not a CAS part type; decoding it as one anyway.", tgi);
    }
    let pkg = Package::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
    let entry = pkg.find(tgi).with_context(|| format!("{} not found in package", tgi))?;
    let data = pkg.read_raw_resource(entry)?;
    let part = CasPartResource::from_bytes(&data)
        .with_context(|| format!("Failed to decode CAS part {}", tgi))?;

    println!("CAS part \"{}\" (version {}), {} LODs", part.name, part.version, part.lods.len());
    let rcol = pkg
        .resolve_lod_mesh(&part, 0)?
        .context("LOD 0 mesh is not stored in this package")?;
    let geom = rcol.geom().context("Mesh container holds no GEOM chunk")?;

    println!("GEOM version {}", geom.version);
    println!("  Vertices: {}", geom.vertex_count());
    println!("  Faces: {}", geom.faces.len() / 3);
    println!("  Vertex formats: {:?}", geom.vertex_formats.iter().map(|f| f.data_type).collect::<Vec<_>>());
    if let Some([a, b, c]) = geom.triangles().next() {
        println!("  First triangle: {} {} {}", a, b, c);
    }
    Ok(())
}
