use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tvmc_oxide::io::obj;
use tvmc_oxide::prelude::*;

#[derive(Parser)]
#[command(name = "tvmc-cli")]
#[command(about = "A CLI tool for TVM mesh sequence decoding")]
struct Cli {
    /// Print progress while working
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Decode one subsequence directory and write every frame as OBJ
    Decode {
        /// Subsequence directory holding the four sequence artifacts
        #[arg(short, long)]
        input: PathBuf,

        /// Directory the per-frame OBJ files are written into
        #[arg(short, long)]
        output: PathBuf,
    },
    /// Midpoint-subdivide an OBJ mesh
    Subdivide {
        /// Input mesh path (.obj)
        #[arg(short, long)]
        input: PathBuf,

        /// Output mesh path (.obj)
        #[arg(short, long)]
        output: PathBuf,

        /// How many subdivision rounds to apply
        #[arg(long, default_value_t = 1)]
        iterations: usize,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    if cli.verbose {
        tracing_subscriber::fmt().with_target(false).init();
    }

    let result = match cli.command {
        Command::Decode { input, output } => decode_sequence(&input, &output),
        Command::Subdivide {
            input,
            output,
            iterations,
        } => subdivide_mesh(&input, &output, iterations),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::FAILURE
        }
    }
}

fn decode_sequence(input: &Path, output: &Path) -> Result<()> {
    let mut decoder = Decoder::new("cli");
    decoder
        .load(input)
        .map_err(|e| anyhow::anyhow!("failed to load sequence: {e}"))?;
    decoder
        .decode()
        .map_err(|e| anyhow::anyhow!("failed to decode sequence: {e}"))?;

    let paths = decoder
        .write_frame_objs(output)
        .map_err(|e| anyhow::anyhow!("failed to write frames: {e}"))?;

    println!(
        "decoded {} frames x {} vertices into {}",
        decoder.frame_count(),
        decoder.vertex_count(),
        output.display()
    );
    for path in paths {
        println!("  {}", path.display());
    }
    Ok(())
}

fn subdivide_mesh(input: &Path, output: &Path, iterations: usize) -> Result<()> {
    let ext_ok = |p: &Path| p.extension().and_then(|s| s.to_str()) == Some("obj");
    if !ext_ok(input) {
        anyhow::bail!("input file must be a .obj file");
    }
    if !ext_ok(output) {
        anyhow::bail!("output file must be a .obj file");
    }

    let mut mesh =
        obj::load_obj(input).map_err(|e| anyhow::anyhow!("failed to load mesh: {e}"))?;
    for _ in 0..iterations {
        mesh.subdivide_midpoint();
    }
    obj::write_obj(output, &mesh).map_err(|e| anyhow::anyhow!("failed to write mesh: {e}"))?;

    println!(
        "subdivided {iterations}x: {} vertices, {} triangles",
        mesh.vertex_count(),
        mesh.triangle_count()
    );
    Ok(())
}
