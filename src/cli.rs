// ============================================================================
// layerkit CLI: headless compositing through subcommands
// ============================================================================
//
// Usage examples:
//   layerkit flatten project.json -o flat.png
//   layerkit combine masks/*.png --op xor -o combined.png
//   layerkit extract photo.png mask.png --invert -o cutout.png
//   layerkit blend bg.png sticker.png --x 40 --y -10 --opacity 0.8 -o out.png
//   layerkit annotate photo.png detections.json --font Inter.ttf -o boxes.png
//   layerkit pack shots/*.jpg -o project.json
//   layerkit new --aspect 16:9 -o blank.json
//
// Output rasters are always PNG. Settings from the config file provide
// defaults; flags override them.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Instant;

use clap::{Parser, Subcommand};
use image::RgbaImage;
use serde::Deserialize;

use crate::canvas::LayerKind;
use crate::error::{EngineError, EngineResult};
use crate::io::{export_png, load_image_file};
use crate::ops::annotate::{annotate, DetectionBox};
use crate::ops::compositor;
use crate::ops::mask::{self, MaskOp};
use crate::ops::text::load_font;
use crate::project::{aspect_ratio_dimensions, Project};
use crate::settings::Settings;

// ============================================================================
// CLI argument definition (clap Derive)
// ============================================================================

/// layerkit headless layer compositor.
#[derive(Parser, Debug)]
#[command(
    name = "layerkit",
    version,
    about = "Layer, mask and annotation compositing without a GUI",
    long_about = "Flatten layered projects, combine selection masks, cut out or remove\n\
                  masked regions, blend images and draw detection boxes.\n\n\
                  Example:\n  \
                  layerkit flatten project.json -o flat.png\n  \
                  layerkit combine a.png b.png --op intersection -o both.png"
)]
pub struct CliArgs {
    #[command(subcommand)]
    pub command: Command,

    /// Print per-command timing and debug-level log output.
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Flatten a saved project's visible layers into one PNG.
    Flatten {
        /// Project JSON file.
        project: PathBuf,
        #[arg(short, long, value_name = "FILE.png")]
        output: PathBuf,
    },

    /// Fold several masks together with one operation.
    Combine {
        /// Mask images, in fold order. Glob patterns accepted.
        #[arg(required = true, num_args = 1..)]
        masks: Vec<String>,
        /// union, intersection, subtract or xor.
        #[arg(long, default_value = "union")]
        op: MaskOp,
        /// Invert the combined result.
        #[arg(long)]
        invert: bool,
        #[arg(short, long, value_name = "FILE.png")]
        output: PathBuf,
    },

    /// Keep (or with --remove, clear) the masked part of an image.
    Extract {
        image: PathBuf,
        mask: PathBuf,
        /// Invert the mask first.
        #[arg(long, conflicts_with = "remove")]
        invert: bool,
        /// Clear the masked area instead of keeping it.
        #[arg(long)]
        remove: bool,
        /// Resize the mask to the image instead of failing on a size mismatch.
        #[arg(long)]
        fit_mask: bool,
        #[arg(short, long, value_name = "FILE.png")]
        output: PathBuf,
    },

    /// Alpha-blend a foreground onto a background.
    Blend {
        background: PathBuf,
        foreground: PathBuf,
        #[arg(long, default_value_t = 0, allow_hyphen_values = true)]
        x: i32,
        #[arg(long, default_value_t = 0, allow_hyphen_values = true)]
        y: i32,
        /// Foreground opacity (0.0–1.0).
        #[arg(long, default_value_t = 1.0)]
        opacity: f32,
        #[arg(short, long, value_name = "FILE.png")]
        output: PathBuf,
    },

    /// Draw detection boxes and labels onto a copy of an image.
    Annotate {
        image: PathBuf,
        /// JSON list of detections, or an object with an "objects" list.
        detections: PathBuf,
        /// Label font (TTF/OTF). Falls back to the configured label_font.
        #[arg(long, value_name = "FONT")]
        font: Option<PathBuf>,
        #[arg(short, long, value_name = "FILE.png")]
        output: PathBuf,
    },

    /// Create an empty project file.
    New {
        /// Aspect ratio preset such as 16:9 or 4:5.
        #[arg(long)]
        aspect: Option<String>,
        /// Longer side in pixels (defaults to the configured canvas size).
        #[arg(long)]
        size: Option<u32>,
        #[arg(long)]
        name: Option<String>,
        #[arg(short, long, value_name = "FILE.json")]
        output: PathBuf,
    },

    /// Build a project file with one layer per input image.
    Pack {
        /// Input images, bottom layer first. Glob patterns accepted.
        #[arg(required = true, num_args = 1..)]
        inputs: Vec<String>,
        /// Project name (defaults to the output file stem).
        #[arg(long)]
        name: Option<String>,
        #[arg(short, long, value_name = "FILE.json")]
        output: PathBuf,
    },
}

/// Detection file layouts accepted by `annotate`.
#[derive(Deserialize)]
#[serde(untagged)]
enum DetectionsDoc {
    List(Vec<DetectionBox>),
    Response { objects: Vec<DetectionBox> },
}

impl DetectionsDoc {
    fn into_boxes(self) -> Vec<DetectionBox> {
        match self {
            DetectionsDoc::List(boxes) | DetectionsDoc::Response { objects: boxes } => boxes,
        }
    }
}

// ============================================================================
// Public entry point
// ============================================================================

/// Run one subcommand and return an OS exit code.
/// `0` = success, `1` = failure (the error is printed to stderr).
pub fn run(args: CliArgs) -> ExitCode {
    let settings = Settings::load();
    let start = Instant::now();

    match run_command(args.command, &settings) {
        Ok(output) => {
            if args.verbose {
                println!(
                    "  → {} ({:.0}ms)",
                    output.display(),
                    start.elapsed().as_secs_f64() * 1000.0
                );
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn run_command(command: Command, settings: &Settings) -> EngineResult<PathBuf> {
    match command {
        Command::Flatten { project, output } => {
            let project = Project::load(&project)?;
            project.export_png(&output)?;
            Ok(output)
        }
        Command::Combine { masks, op, invert, output } => {
            let paths = resolve_inputs(&masks);
            let rasters = paths
                .iter()
                .map(|p| load_image_file(p).map(|img| mask::to_mask(&img)))
                .collect::<EngineResult<Vec<_>>>()?;
            let mut combined = mask::combine(&rasters, op)?;
            if invert {
                combined = mask::invert(&combined);
            }
            export_png(&combined, &output)?;
            Ok(output)
        }
        Command::Extract { image, mask: mask_path, invert, remove, fit_mask, output } => {
            let (image, mask_img) = load_pair(&image, &mask_path)?;
            let mut mask_img = mask::to_mask(&mask_img);
            if fit_mask {
                mask_img = mask::resize_mask(&mask_img, image.width(), image.height());
            }
            let out = if remove {
                compositor::remove(&image, &mask_img)?
            } else {
                compositor::extract(&image, &mask_img, invert)?
            };
            export_png(&out, &output)?;
            Ok(output)
        }
        Command::Blend { background, foreground, x, y, opacity, output } => {
            let (bg, fg) = load_pair(&background, &foreground)?;
            export_png(&compositor::blend_pair(&bg, &fg, x, y, opacity), &output)?;
            Ok(output)
        }
        Command::Annotate { image, detections, font, output } => {
            let img = load_image_file(&image)?;
            let doc: DetectionsDoc = serde_json::from_str(&std::fs::read_to_string(&detections)?)?;
            let boxes = doc.into_boxes();
            let font = match font {
                Some(path) => Some(load_font(&path)?),
                None => settings.label_font_path().and_then(|path| match load_font(&path) {
                    Ok(f) => Some(f),
                    Err(e) => {
                        log::warn!("Configured label font unusable ({}); drawing boxes only", e);
                        None
                    }
                }),
            };
            let out = annotate(&img, &boxes, &settings.annotation_style(), font.as_ref());
            export_png(&out, &output)?;
            Ok(output)
        }
        Command::New { aspect, size, name, output } => {
            let (width, height) = new_canvas_size(settings, aspect.as_deref(), size);
            let mut project = Project::new_untitled(1, width, height).with_tool_settings(settings.tool_settings());
            if let Some(name) = name {
                project.name = name;
            }
            project.save(&output)?;
            Ok(output)
        }
        Command::Pack { inputs, name, output } => {
            let paths = resolve_inputs(&inputs);
            pack(&paths, name, &output)?;
            Ok(output)
        }
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// Canvas size for `new`: an aspect preset scaled to `size`, or the
/// configured canvas size.
fn new_canvas_size(settings: &Settings, aspect: Option<&str>, size: Option<u32>) -> (u32, u32) {
    let base = size.unwrap_or_else(|| settings.canvas_width.max(settings.canvas_height));
    match aspect {
        Some(ratio) => aspect_ratio_dimensions(ratio, base),
        None if size.is_some() => (base, base),
        None => (settings.canvas_width, settings.canvas_height),
    }
}

/// Load two images concurrently; both must succeed.
fn load_pair(a: &Path, b: &Path) -> EngineResult<(RgbaImage, RgbaImage)> {
    let (a, b) = rayon::join(|| load_image_file(a), || load_image_file(b));
    Ok((a?, b?))
}

/// Write a project holding each image as one layer, first input at the
/// bottom. The canvas takes the first image's size.
pub fn pack(paths: &[PathBuf], name: Option<String>, output: &Path) -> EngineResult<()> {
    let rasters = paths
        .iter()
        .map(|p| load_image_file(p))
        .collect::<EngineResult<Vec<_>>>()?;
    let (width, height) = rasters
        .first()
        .map(|r| r.dimensions())
        .ok_or_else(|| EngineError::InvalidProject {
            message: "no input images".to_string(),
        })?;

    let mut project = Project::new_untitled(1, width, height);
    project.name = name.unwrap_or_else(|| {
        output
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "Untitled-1".to_string())
    });
    for (path, raster) in paths.iter().zip(rasters) {
        let layer_name = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "Layer".to_string());
        project.add_image_layer(layer_name, LayerKind::Image, raster);
    }
    project.save(output)
}

/// Expand glob patterns and literal paths into a deduplicated, ordered list.
fn resolve_inputs(patterns: &[String]) -> Vec<PathBuf> {
    let mut result: Vec<PathBuf> = Vec::new();

    for pattern in patterns {
        let as_path = Path::new(pattern);

        if as_path.exists() {
            // Literal path, use directly
            if !result.iter().any(|p| p.as_path() == as_path) {
                result.push(as_path.to_path_buf());
            }
            continue;
        }

        // Treat as glob pattern
        match glob::glob(pattern) {
            Ok(entries) => {
                let mut matched = false;
                for entry in entries.flatten() {
                    if !result.contains(&entry) {
                        result.push(entry);
                    }
                    matched = true;
                }
                if !matched {
                    log::warn!("pattern '{}' matched no files", pattern);
                }
            }
            Err(e) => {
                log::warn!("invalid glob '{}': {}", pattern, e);
            }
        }
    }

    result
}
