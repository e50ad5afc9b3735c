use std::path::{Path, PathBuf};
use std::process;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use artwork_guard::{
    decode_base_image, decode_signature_image, export_file_name, parse_hex_color, stego, text,
    Compositor, ProcessOptions, ProcessResult, SignatureSpec, TileParams, WatermarkEngine,
};

#[derive(Parser)]
#[command(
    name = "protect-artwork",
    about = "Tile a visible signature across artwork and hide a copyright payload",
    version,
    after_help = "Simple usage: protect-artwork <image> --text \"Jane Doe\"\n\n\
                  Output is written as protected-artwork-<unix-ms>.png next to the input\n\
                  unless --output names a directory."
)]
#[allow(clippy::struct_excessive_bools)]
struct Cli {
    /// Input image file or directory
    input: String,

    /// Output directory (default: the input's directory)
    #[arg(short, long)]
    output: Option<String>,

    /// Text signature to tile
    #[arg(long, conflicts_with = "signature")]
    text: Option<String>,

    /// PNG signature image to tile
    #[arg(short, long)]
    signature: Option<String>,

    /// Watermark opacity (0.1-1.0)
    #[arg(long, default_value = "0.5")]
    opacity: f32,

    /// Grid rotation in degrees (0-360)
    #[arg(short, long, default_value = "45")]
    angle: f32,

    /// Tile density (1-5)
    #[arg(short, long, default_value = "3")]
    density: u8,

    /// Image signature width as a percentage of the image width
    #[arg(long, default_value = "30")]
    size: f32,

    /// Text signature font size in pixels
    #[arg(long, default_value = "48")]
    font_size: f32,

    /// Text signature colour (#RGB or #RRGGBB)
    #[arg(long, default_value = "#FFFFFF")]
    color: String,

    /// TrueType/OpenType font for text signatures
    #[arg(long)]
    font: Option<PathBuf>,

    /// Do not hide the copyright payload
    #[arg(long)]
    no_stego: bool,

    /// Print the hidden payload of an exported image and exit
    #[arg(long)]
    reveal: bool,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Suppress all non-error output
    #[arg(short, long)]
    quiet: bool,
}

fn init_tracing(verbose: bool, quiet: bool) {
    let level = if quiet {
        "error"
    } else if verbose {
        "debug"
    } else {
        "info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn fail(msg: &str) -> ! {
    eprintln!("Error: {msg}");
    process::exit(1);
}

fn reveal(input: &Path) {
    let bytes = std::fs::read(input).unwrap_or_else(|e| fail(&format!("{}: {e}", input.display())));
    let img = decode_base_image(&bytes).unwrap_or_else(|e| fail(&e.to_string()));
    match stego::decode(&img) {
        Ok(payload) => println!("{payload}"),
        Err(e) => fail(&format!("no hidden payload: {e}")),
    }
}

fn build_signature(cli: &Cli) -> Option<SignatureSpec> {
    if let Some(path) = &cli.signature {
        let bytes = std::fs::read(path).unwrap_or_else(|e| fail(&format!("{path}: {e}")));
        let img = decode_signature_image(&bytes).unwrap_or_else(|e| fail(&e.to_string()));
        return Some(SignatureSpec::Raster(img));
    }
    let content = cli.text.as_ref()?;
    let color = parse_hex_color(&cli.color).unwrap_or_else(|e| fail(&e.to_string()));
    Some(SignatureSpec::text(content.clone(), cli.font_size, color))
}

fn build_engine(cli: &Cli) -> WatermarkEngine {
    let mut engine = match WatermarkEngine::new() {
        Ok(e) => e,
        Err(e) => {
            eprintln!("Fatal: Failed to initialize engine: {e}");
            process::exit(1);
        }
    };

    if let Some(path) = &cli.font {
        let data = std::fs::read(path)
            .unwrap_or_else(|e| fail(&format!("{}: {e}", path.display())));
        let font = text::load_font(data).unwrap_or_else(|e| fail(&e.to_string()));
        engine = engine.with_compositor(Compositor::with_font(font));
    }
    if cli.no_stego {
        engine = engine.with_payload(None);
    }
    engine
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.quiet);

    let input_path = Path::new(&cli.input);
    if !input_path.exists() {
        fail(&format!("Input path does not exist: {}", cli.input));
    }

    if cli.reveal {
        reveal(input_path);
        return;
    }

    let params = TileParams {
        opacity: cli.opacity,
        angle_degrees: cli.angle,
        density: cli.density,
        size_percent: cli.size,
    };
    if let Err(e) = params.validate() {
        fail(&e.to_string());
    }

    let signature = build_signature(&cli);
    if signature.is_none() && !cli.quiet {
        eprintln!("No signature given: pass --text or --signature to watermark the input.");
    }

    let engine = build_engine(&cli);
    let opts = ProcessOptions {
        signature,
        params,
        // Running the tool is an interactive, human-initiated export.
        verified: true,
    };

    tracing::debug!(?params, payload = ?engine.payload(), "starting");

    let results = if input_path.is_dir() {
        let output_dir = if let Some(o) = &cli.output {
            PathBuf::from(o)
        } else {
            eprintln!("Error: Output directory is required for batch processing");
            eprintln!("Usage: protect-artwork <input_dir> -o <output_dir> --text <signature>");
            process::exit(1);
        };
        engine.process_directory(input_path, &output_dir, &opts)
    } else {
        let output_dir = match &cli.output {
            Some(o) => PathBuf::from(o),
            None => input_path
                .parent()
                .map_or_else(|| PathBuf::from("."), Path::to_path_buf),
        };
        let timestamp = chrono::Utc::now().timestamp_millis();
        let output_path = output_dir.join(export_file_name(timestamp));
        vec![engine.process_file(input_path, &output_path, &opts)]
    };

    let mut success_count = 0u32;
    let mut skip_count = 0u32;
    let mut fail_count = 0u32;

    for r in &results {
        print_result(r, cli.quiet, cli.verbose);
        if r.skipped {
            skip_count += 1;
        } else if r.success {
            success_count += 1;
        } else {
            fail_count += 1;
        }
    }

    if results.len() > 1 && !cli.quiet {
        eprintln!();
        eprint!("[Summary] Protected: {success_count}");
        if skip_count > 0 {
            eprint!(", Skipped: {skip_count}");
        }
        if fail_count > 0 {
            eprint!(", Failed: {fail_count}");
        }
        eprintln!(" (Total: {})", results.len());
    }

    if fail_count > 0 {
        process::exit(1);
    }
}

fn print_result(result: &ProcessResult, quiet: bool, verbose: bool) {
    if quiet && result.success {
        return;
    }

    let filename = result.path.file_name().map_or_else(
        || result.path.display().to_string(),
        |f| f.to_string_lossy().to_string(),
    );

    if result.skipped {
        if !quiet {
            eprintln!("[SKIP] {filename}: {}", result.message);
        }
    } else if result.success {
        if !quiet {
            match &result.output {
                Some(out) => eprintln!("[OK] {filename} -> {}", out.display()),
                None => eprintln!("[OK] {filename}"),
            }
        }
    } else {
        eprintln!("[FAIL] {filename}: {}", result.message);
    }

    if verbose && !result.message.is_empty() {
        eprintln!("  -> {}", result.message);
    }
}
