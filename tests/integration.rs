use std::sync::Arc;

use artwork_guard::blending::Rotation;
use artwork_guard::{
    decode_base_image, encode_png, raster_tile_size, stego, Error, ProcessOptions, SignatureSpec,
    StegoEncoder, StegoError, TileParams, WatermarkEngine,
};
use image::{Rgb, Rgba, RgbaImage};

struct BrokenEncoder;

impl StegoEncoder for BrokenEncoder {
    fn encode(&self, _payload: &str, _image: &RgbaImage) -> Result<RgbaImage, StegoError> {
        Err(StegoError::NoPayload)
    }
}

fn jane_doe() -> SignatureSpec {
    SignatureSpec::text("Jane Doe", 32.0, Rgb([255, 255, 255]))
}

fn black(w: u32, h: u32) -> RgbaImage {
    RgbaImage::from_pixel(w, h, Rgba([0, 0, 0, 255]))
}

#[test]
fn engine_initializes_successfully() {
    let engine = WatermarkEngine::new();
    assert!(engine.is_ok());
    assert!(engine.unwrap().payload().unwrap().starts_with("Copyright "));
}

#[test]
fn text_signature_tiles_at_half_opacity() {
    let engine = WatermarkEngine::new().unwrap();
    let params = TileParams {
        opacity: 0.5,
        angle_degrees: 45.0,
        density: 3,
        size_percent: 30.0,
    };
    let out = engine
        .composite(&black(800, 600), Some(&jane_doe()), &params)
        .unwrap();

    assert_eq!(out.dimensions(), (800, 600));
    let inked = out.pixels().filter(|p| p[0] > 0).count();
    assert!(inked > 1000, "expected visible tiles, got {inked} inked pixels");

    // Text alpha is opacity squared: white at 0.5 over black peaks near 64.
    let brightest = out.pixels().map(|p| p[0]).max().unwrap();
    assert!((40..=64).contains(&brightest), "brightest = {brightest}");
    assert!(out.pixels().all(|p| p[3] == 255));
}

/// Device pixels covering the rotated-space box `x + dx, y - dy` for the
/// given offset ranges, skipping anything off the surface.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
fn rotated_box(
    img: &RgbaImage,
    rotation: Rotation,
    (x, y): (f32, f32),
    dx: std::ops::Range<u32>,
    dy: std::ops::Range<u32>,
) -> Vec<Rgba<u8>> {
    let mut pixels = Vec::new();
    for oy in dy {
        for ox in dx.clone() {
            let (px, py) = rotation.apply(x + ox as f32, y - oy as f32);
            if px >= 0.0 && py >= 0.0 && px < img.width() as f32 && py < img.height() as f32 {
                pixels.push(*img.get_pixel(px as u32, py as u32));
            }
        }
    }
    pixels
}

#[test]
fn rotated_tiles_repeat_at_grid_spacing() {
    let engine = WatermarkEngine::new().unwrap();
    let params = TileParams {
        opacity: 0.5,
        angle_degrees: 45.0,
        density: 3,
        size_percent: 30.0,
    };
    let out = engine
        .composite(&black(800, 600), Some(&jane_doe()), &params)
        .unwrap();

    let spacing = params.spacing(800, 600);
    assert!((spacing - 800.0 / 3.0).abs() < 1e-3);
    let rotation = Rotation::new(params.radians());

    // Two neighbouring pen starts on one baseline of the over-scan grid.
    let baseline = -600.0 + 2.0 * spacing;
    let first = (-800.0 + 4.0 * spacing, baseline);
    let second = (-800.0 + 5.0 * spacing, baseline);

    for origin in [first, second] {
        let glyphs = rotated_box(&out, rotation, origin, 0..60, 2..20);
        assert!(glyphs.len() > 500, "tile at {origin:?} is off the surface");
        assert!(
            glyphs.iter().any(|p| p[0] > 30),
            "no ink at tile {origin:?}"
        );
    }

    // "Jane Doe" at 32px is well under 175px wide, so the rest of the pitch is bare.
    let gap = rotated_box(&out, rotation, first, 175..250, 2..20);
    assert!(!gap.is_empty());
    assert!(gap.iter().all(|p| p[0] == 0), "ink between neighbouring tiles");
}

#[test]
fn raster_signature_scales_to_canvas_width() {
    let signature = RgbaImage::from_pixel(200, 100, Rgba([255, 0, 0, 128]));
    assert_eq!(raster_tile_size(800, &signature, 100.0), (800.0, 400.0));
    assert_eq!(raster_tile_size(800, &signature, 25.0), (200.0, 100.0));

    let engine = WatermarkEngine::new().unwrap();
    let params = TileParams {
        angle_degrees: 0.0,
        size_percent: 100.0,
        ..TileParams::default()
    };
    let out = engine
        .composite(&black(800, 600), Some(&SignatureSpec::Raster(signature)), &params)
        .unwrap();
    assert_eq!(out.dimensions(), (800, 600));
    assert!(out.pixels().any(|p| p[0] > 0 && p[1] == 0));
}

#[test]
fn empty_text_is_a_no_op() {
    let engine = WatermarkEngine::new().unwrap();
    let base = black(64, 48);
    let blank = SignatureSpec::text("", 32.0, Rgb([255, 255, 255]));
    let out = engine
        .composite(&base, Some(&blank), &TileParams::default())
        .unwrap();
    assert_eq!(out, base);
}

#[test]
fn export_with_broken_encoder_still_produces_png() {
    let engine = WatermarkEngine::new()
        .unwrap()
        .with_encoder(Arc::new(BrokenEncoder));
    let params = TileParams::default();
    let base = black(160, 120);

    let exported = engine
        .export(&base, Some(&jane_doe()), &params, true)
        .unwrap();
    let plain = engine.composite(&base, Some(&jane_doe()), &params).unwrap();

    assert_eq!(decode_base_image(&exported.png).unwrap(), plain);
    assert!(exported.file_name.starts_with("protected-artwork-"));
}

#[test]
fn unverified_export_produces_nothing() {
    let engine = WatermarkEngine::new().unwrap();
    let err = engine
        .export(&black(32, 32), Some(&jane_doe()), &TileParams::default(), false)
        .unwrap_err();
    assert!(matches!(err, Error::NotVerified));
}

#[test]
fn process_file_writes_protected_png() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("art.png");
    std::fs::write(&input, encode_png(&black(200, 150)).unwrap()).unwrap();
    let output = dir.path().join("out").join("protected.png");

    let engine = WatermarkEngine::new()
        .unwrap()
        .with_payload(Some("Copyright 2026".to_string()));
    let opts = ProcessOptions {
        signature: Some(jane_doe()),
        verified: true,
        ..ProcessOptions::default()
    };
    let result = engine.process_file(&input, &output, &opts);

    assert!(result.success, "{}", result.message);
    assert!(!result.skipped);
    assert_eq!(result.output.as_deref(), Some(output.as_path()));

    let written = decode_base_image(&std::fs::read(&output).unwrap()).unwrap();
    assert_eq!(written.dimensions(), (200, 150));
    assert_eq!(stego::decode(&written).unwrap(), "Copyright 2026");
}

#[test]
fn process_file_skips_without_signature() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("art.png");
    std::fs::write(&input, encode_png(&black(20, 20)).unwrap()).unwrap();
    let output = dir.path().join("protected.png");

    let engine = WatermarkEngine::new().unwrap();
    let result = engine.process_file(&input, &output, &ProcessOptions::default());

    assert!(result.skipped);
    assert!(!output.exists());
}

#[test]
fn process_file_reports_unverified_and_corrupt_input() {
    let dir = tempfile::tempdir().unwrap();
    let engine = WatermarkEngine::new().unwrap();
    let opts = ProcessOptions {
        signature: Some(jane_doe()),
        verified: true,
        ..ProcessOptions::default()
    };

    let corrupt = dir.path().join("corrupt.png");
    std::fs::write(&corrupt, b"not really a png").unwrap();
    let result = engine.process_file(&corrupt, &dir.path().join("a.png"), &opts);
    assert!(!result.success);
    assert!(result.message.starts_with("Failed to load"));

    let input = dir.path().join("art.png");
    std::fs::write(&input, encode_png(&black(20, 20)).unwrap()).unwrap();
    let unverified = ProcessOptions {
        verified: false,
        ..opts
    };
    let output = dir.path().join("b.png");
    let result = engine.process_file(&input, &output, &unverified);
    assert!(!result.success);
    assert!(!output.exists());
}

#[test]
fn process_directory_handles_supported_files_only() {
    let input_dir = tempfile::tempdir().unwrap();
    let output_dir = tempfile::tempdir().unwrap();
    std::fs::write(
        input_dir.path().join("one.png"),
        encode_png(&black(64, 64)).unwrap(),
    )
    .unwrap();
    std::fs::write(
        input_dir.path().join("two.png"),
        encode_png(&black(48, 80)).unwrap(),
    )
    .unwrap();
    std::fs::write(input_dir.path().join("notes.txt"), b"ignore me").unwrap();

    let engine = WatermarkEngine::new().unwrap();
    let opts = ProcessOptions {
        signature: Some(jane_doe()),
        verified: true,
        ..ProcessOptions::default()
    };
    let results = engine.process_directory(input_dir.path(), output_dir.path(), &opts);

    assert_eq!(results.len(), 2);
    assert!(results.iter().all(|r| r.success), "{results:?}");

    let mut names: Vec<String> = std::fs::read_dir(output_dir.path())
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
        .collect();
    names.sort();
    assert_eq!(names.len(), 2);
    assert!(names[0].starts_with("protected-artwork-") && names[0].ends_with("-one.png.png"));
    assert!(names[1].starts_with("protected-artwork-") && names[1].ends_with("-two.png.png"));
}

#[test]
fn process_directory_keeps_inputs_sharing_a_stem_apart() {
    let input_dir = tempfile::tempdir().unwrap();
    let output_dir = tempfile::tempdir().unwrap();
    let art = black(40, 30);
    std::fs::write(input_dir.path().join("cat.png"), encode_png(&art).unwrap()).unwrap();
    art.save_with_format(input_dir.path().join("cat.bmp"), image::ImageFormat::Bmp)
        .unwrap();

    let engine = WatermarkEngine::new().unwrap();
    let opts = ProcessOptions {
        signature: Some(jane_doe()),
        verified: true,
        ..ProcessOptions::default()
    };
    let results = engine.process_directory(input_dir.path(), output_dir.path(), &opts);

    assert_eq!(results.len(), 2);
    assert!(results.iter().all(|r| r.success), "{results:?}");
    assert_ne!(results[0].output, results[1].output);

    let written = std::fs::read_dir(output_dir.path()).unwrap().count();
    assert_eq!(written, 2);
    for r in &results {
        assert!(r.output.as_ref().unwrap().exists());
    }
}

#[tokio::test]
async fn async_export_matches_sync_export() {
    let engine = WatermarkEngine::new()
        .unwrap()
        .with_payload(Some("Copyright 2026".to_string()));
    let base = black(120, 90);
    let params = TileParams::default();

    let sync = engine
        .export(&base, Some(&jane_doe()), &params, true)
        .unwrap();
    let exported = engine
        .export_async(Arc::new(base), Some(jane_doe()), params, true)
        .await
        .unwrap();

    assert_eq!(exported.image, sync.image);
    assert_eq!(stego::decode(&exported.image).unwrap(), "Copyright 2026");
}

#[test]
#[ignore = "timing test; run with --release --ignored"]
fn large_image_at_max_density_is_sub_second() {
    let engine = WatermarkEngine::new().unwrap();
    let params = TileParams {
        density: 5,
        ..TileParams::default()
    };
    let base = black(4000, 3000);

    let started = std::time::Instant::now();
    let out = engine.composite(&base, Some(&jane_doe()), &params).unwrap();
    let text_elapsed = started.elapsed();
    assert_eq!(out.dimensions(), (4000, 3000));
    assert!(text_elapsed < std::time::Duration::from_secs(1), "text took {text_elapsed:?}");

    // Full-width raster tiles give the largest rotated bounding boxes.
    let raster = SignatureSpec::Raster(RgbaImage::from_pixel(400, 200, Rgba([255, 0, 0, 160])));
    let params = TileParams {
        density: 5,
        size_percent: 100.0,
        ..TileParams::default()
    };
    let started = std::time::Instant::now();
    let out = engine.composite(&base, Some(&raster), &params).unwrap();
    let raster_elapsed = started.elapsed();
    assert_eq!(out.dimensions(), (4000, 3000));
    assert!(
        raster_elapsed < std::time::Duration::from_secs(1),
        "raster took {raster_elapsed:?}"
    );
}
