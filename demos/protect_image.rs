//! Stamp a text signature across a single image and export it.
//!
//! Usage:
//! ```sh
//! cargo run --example protect_image -- input.jpg "Jane Doe" out_dir
//! ```

use std::env;
use std::path::Path;
use std::process;

use artwork_guard::{export_file_name, ProcessOptions, SignatureSpec, TileParams, WatermarkEngine};
use image::Rgb;

fn main() {
    let args: Vec<String> = env::args().collect();
    if args.len() < 4 {
        eprintln!("Usage: {} <input> <signature text> <output dir>", args[0]);
        process::exit(1);
    }

    let input = Path::new(&args[1]);
    let output =
        Path::new(&args[3]).join(export_file_name(chrono::Utc::now().timestamp_millis()));

    let engine = WatermarkEngine::new().expect("failed to initialize engine");
    let opts = ProcessOptions {
        signature: Some(SignatureSpec::text(args[2].clone(), 48.0, Rgb([255, 255, 255]))),
        params: TileParams::default(),
        verified: true,
    };
    let result = engine.process_file(input, &output, &opts);

    if result.skipped {
        println!("Skipped: {}", result.message);
    } else if result.success {
        println!("Done: {} -> {}", result.message, output.display());
    } else {
        eprintln!("Error: {}", result.message);
        process::exit(1);
    }
}
