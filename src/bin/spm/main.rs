//! SPM CLI - inspect, convert and check SPM mesh files.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

use spm::model::{Mesh, VertexAttributes};
use spm::pipeline::{self, needs_overwrite_confirmation};
use spm::scene::{ExportOptions, MeshScene};
use spm::{Error, Result};

/// Inspect and convert SPM mesh files
#[derive(Parser)]
#[command(name = "spm-cli")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Show debug output (-v), trace output (-vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Only print errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print a summary of a file
    Info {
        file: PathBuf,
        /// Print JSON instead of text
        #[arg(short, long)]
        json: bool,
    },

    /// List sub-meshes, materials and joints
    Dump { file: PathBuf },

    /// Re-export a file with different options
    Convert(ConvertArgs),

    /// Resolve the textures referenced by a file
    Textures {
        file: PathBuf,
        /// Extra directory searched recursively
        #[arg(long)]
        tex_path: Option<PathBuf>,
    },
}

#[derive(Args)]
struct ConvertArgs {
    input: PathBuf,
    output: PathBuf,

    /// Export options as JSON; flags below override it
    #[arg(long)]
    options: Option<PathBuf>,

    /// Replace the output file if it exists
    #[arg(long)]
    overwrite: bool,

    /// Split sub-meshes on a spatial grid
    #[arg(long)]
    split: bool,

    /// Grid cell edge length (implies --split)
    #[arg(long)]
    cell_size: Option<f32>,

    /// Target triangles per grid cell (implies --split)
    #[arg(long)]
    cell_triangles: Option<usize>,

    /// Bake the pose at this frame into a static mesh
    #[arg(long)]
    static_frame: Option<i32>,

    /// Resample animation at this frame step instead of keeping keyframes
    #[arg(long)]
    resample: Option<f32>,

    #[arg(long)]
    no_normals: bool,

    #[arg(long)]
    no_colors: bool,

    #[arg(long)]
    no_tangents: bool,

    /// zlib level for the file body (0 = stored)
    #[arg(long, default_value_t = 0, value_parser = clap::value_parser!(u32).range(0..=9))]
    compress: u32,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.quiet);

    let result = match cli.command {
        Commands::Info { file, json } => cmd_info(&file, json),
        Commands::Dump { file } => cmd_dump(&file),
        Commands::Convert(args) => cmd_convert(args),
        Commands::Textures { file, tex_path } => cmd_textures(&file, tex_path.as_deref()),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn init_logging(verbose: u8, quiet: bool) {
    let level = match (quiet, verbose) {
        (true, _) => LevelFilter::ERROR,
        (false, 0) => LevelFilter::INFO,
        (false, 1) => LevelFilter::DEBUG,
        (false, _) => LevelFilter::TRACE,
    };
    let filter = EnvFilter::builder()
        .with_default_directive(level.into())
        .from_env_lossy();
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(verbose >= 2)
        .with_writer(std::io::stderr)
        .init();
}

fn attribute_names(attrs: VertexAttributes) -> Vec<&'static str> {
    attrs.iter_names().map(|(name, _)| name).collect()
}

fn cmd_info(path: &Path, json: bool) -> Result<()> {
    tracing::info!("Opening {}", path.display());
    let mesh = spm::codec::read_file(path)?;
    let bounds = mesh.bounds();
    let joints = mesh.skeleton.as_ref().map_or(0, |s| s.len());
    let keys = mesh.animation.as_ref().map_or(0, |a| a.num_keys());

    if json {
        let value = serde_json::json!({
            "file": path.display().to_string(),
            "materials": mesh.materials.len(),
            "sub_meshes": mesh.sub_meshes.len(),
            "vertices": mesh.num_vertices(),
            "triangles": mesh.num_triangles(),
            "joints": joints,
            "keyframes": keys,
            "frame_range": mesh.animation.as_ref().map(|a| [a.frame_range.0, a.frame_range.1]),
            "bounds": bounds.to_array(),
        });
        println!("{}", serde_json::to_string_pretty(&value).unwrap_or_default());
        return Ok(());
    }

    println!("File: {}", path.display());
    println!("Materials:  {}", mesh.materials.len());
    println!("Sub-meshes: {}", mesh.sub_meshes.len());
    println!("Vertices:   {}", mesh.num_vertices());
    println!("Triangles:  {}", mesh.num_triangles());
    println!("Joints:     {joints}");
    if let Some(anim) = &mesh.animation {
        println!("Animation:  {keys} keys, frames {}..{}", anim.frame_range.0, anim.frame_range.1);
    }
    if !bounds.is_empty() {
        println!("Bounds:     {:?} .. {:?}", bounds.min.to_array(), bounds.max.to_array());
    }
    Ok(())
}

fn cmd_dump(path: &Path) -> Result<()> {
    let mesh = spm::codec::read_file(path)?;

    println!("Materials:");
    for (i, m) in mesh.materials.iter().enumerate() {
        println!("  [{i}] '{}' flags={:#x}", m.texture, m.flags);
    }

    println!("Sub-meshes:");
    for (i, sm) in mesh.sub_meshes.iter().enumerate() {
        let b = sm.bounds();
        println!(
            "  [{i}] material={} attrs={} vertices={} triangles={} bounds={:?}..{:?}",
            sm.material,
            attribute_names(sm.attributes).join("|"),
            sm.num_vertices(),
            sm.num_triangles(),
            b.min.to_array(),
            b.max.to_array(),
        );
    }

    if let Some(skeleton) = &mesh.skeleton {
        println!("Joints:");
        for &j in skeleton.evaluation_order() {
            let joint = &skeleton.joints()[j];
            let depth = depth_of(&mesh, j);
            let keys = mesh.animation.as_ref().and_then(|a| a.tracks.get(j)).map_or(0, |t| t.len());
            println!("  {:indent$}[{j}] {} ({keys} keys)", "", joint.name, indent = depth * 2);
        }
    }
    Ok(())
}

fn depth_of(mesh: &Mesh, joint: usize) -> usize {
    let Some(skeleton) = &mesh.skeleton else {
        return 0;
    };
    let mut depth = 0;
    let mut current = skeleton.joints()[joint].parent;
    while let Some(p) = current {
        depth += 1;
        current = skeleton.joints()[p].parent;
    }
    depth
}

fn convert_options(args: &ConvertArgs) -> Result<ExportOptions> {
    let mut options = match &args.options {
        Some(path) => ExportOptions::load(path)?,
        None => ExportOptions::default(),
    };
    if args.split || args.cell_size.is_some() || args.cell_triangles.is_some() {
        options.do_spatial_split = true;
    }
    if let Some(size) = args.cell_size {
        options.partition.cell_size = Some(size);
    }
    if let Some(n) = args.cell_triangles {
        options.partition.target_triangles_per_cell = n;
    }
    if let Some(frame) = args.static_frame {
        options.static_mesh_frame = frame;
    }
    if let Some(step) = args.resample {
        options.keyframes_only = false;
        options.resample_step = step;
    }
    options.export_normal &= !args.no_normals;
    options.export_vcolor &= !args.no_colors;
    options.export_tangent &= !args.no_tangents;
    if args.compress > 0 {
        options.compression_level = args.compress;
    }
    options.overwrite_without_asking |= args.overwrite;
    Ok(options)
}

fn cmd_convert(args: ConvertArgs) -> Result<()> {
    let options = convert_options(&args)?;
    if needs_overwrite_confirmation(&args.output, &options, None) {
        return Err(Error::invalid_input(format!(
            "{} exists, pass --overwrite to replace it",
            args.output.display()
        )));
    }

    let mesh = spm::codec::read_file(&args.input)?;
    let scene = MeshScene::new(mesh);
    let exported = pipeline::export(&args.output, &scene, &options, None, None)?;

    for d in &exported.diagnostics {
        println!("warning: {d}");
    }
    println!(
        "Wrote {} ({} sub-meshes, {} bytes)",
        args.output.display(),
        exported.mesh.sub_meshes.len(),
        exported.bytes.len()
    );
    Ok(())
}

fn cmd_textures(path: &Path, tex_path: Option<&Path>) -> Result<()> {
    let imported = pipeline::import(path, tex_path)?;
    for (i, (material, found)) in imported.mesh.materials.iter().zip(&imported.textures).enumerate() {
        match found {
            Some(p) => println!("  [{i}] {} -> {}", material.texture, p.display()),
            None if material.texture.is_empty() => println!("  [{i}] (no texture)"),
            None => println!("  [{i}] {} -> NOT FOUND", material.texture),
        }
    }
    if !imported.diagnostics.is_empty() {
        println!("{} texture(s) missing", imported.diagnostics.len());
    }
    Ok(())
}
