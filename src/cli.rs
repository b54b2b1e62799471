// ============================================================================
// layer-merge CLI — headless compositing of image files as layers
// ============================================================================
//
// Usage examples:
//   layer-merge -i base.png overlay.png -o flat.png
//   layer-merge -i shots/*.png --blend multiply --opacity 128 -o out.png
//   layer-merge -i a.png b.png --adjust gaussian_blur:sigma=4 --select 10,10,64,64 -o out.png
//   layer-merge -i a.png b.png --group --region 0,0,256,256 -o tile.png
//
// Inputs are stacked bottom first.  Every layer above the bottom one uses
// --blend and --opacity.  An optional adjustment layer sits on top.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Instant;

use clap::Parser;
use layer_merge::{BlendMode, Document, FilterConfiguration, LayerNode, MergeResult, ParamValue, Rect, SelectionMask};

// ============================================================================
// CLI argument definition (clap Derive)
// ============================================================================

/// Headless layer compositor.
#[derive(Parser, Debug)]
#[command(
    name = "layer-merge",
    about = "Composite image files as layers and write the flattened result",
    long_about = "Load images as raster layers (bottom first), optionally wrap them in\n\
                  a group and add a filter adjustment layer on top, recompute the\n\
                  projection and write it out.\n\n\
                  Example:\n  \
                  layer-merge -i base.png top.png --blend screen -o out.png\n  \
                  layer-merge -i *.png --adjust brightness_contrast:brightness=20 -o out.png"
)]
pub struct CliArgs {
    /// Input file(s), bottom layer first. Glob patterns accepted (e.g. "*.png").
    #[arg(short, long, required = true, num_args = 1..)]
    pub input: Vec<String>,

    /// Output file path. The format is inferred from the extension (png when
    /// there is none).
    #[arg(short, long, value_name = "FILE")]
    pub output: PathBuf,

    /// Blend mode id for every layer above the bottom one
    /// (normal, copy, multiply, screen, overlay, ...).
    #[arg(short, long, default_value = "normal", value_parser = parse_blend_mode)]
    pub blend: BlendMode,

    /// Opacity (0–255) for every layer above the bottom one.
    #[arg(long, default_value_t = 255, value_name = "0-255")]
    pub opacity: u8,

    /// Adjustment layer on top of the stack: `filter:key=value,...`
    /// (e.g. `gaussian_blur:sigma=3`, `invert`).
    #[arg(short, long, value_name = "FILTER", value_parser = parse_filter_spec)]
    pub adjust: Option<FilterConfiguration>,

    /// Restrict the adjustment layer to a rectangle `x,y,w,h`.
    #[arg(long, value_name = "X,Y,W,H", value_parser = parse_rect)]
    pub select: Option<Rect>,

    /// Only recompute this rectangle `x,y,w,h` (default: whole canvas).
    #[arg(short, long, value_name = "X,Y,W,H", value_parser = parse_rect)]
    pub region: Option<Rect>,

    /// Put the image layers inside a group layer.
    #[arg(long)]
    pub group: bool,

    /// Print per-stage timing and log at debug level.
    #[arg(short, long)]
    pub verbose: bool,
}

// ============================================================================
// Public entry point
// ============================================================================

/// Run the compositor and return an OS exit code.
pub fn run(args: CliArgs) -> ExitCode {
    let inputs = resolve_inputs(&args.input);
    if inputs.is_empty() {
        eprintln!("error: no input files matched the given pattern(s).");
        return ExitCode::FAILURE;
    }

    let start = Instant::now();
    match composite_files(&args, &inputs) {
        Ok(()) => {
            if args.verbose {
                println!(
                    "{} layer(s) → {} ({:.0}ms)",
                    inputs.len(),
                    args.output.display(),
                    start.elapsed().as_secs_f64() * 1000.0
                );
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!("{e}");
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

// ============================================================================
// Pipeline
// ============================================================================

fn composite_files(args: &CliArgs, inputs: &[PathBuf]) -> MergeResult<()> {
    let mut doc = build_document(args, inputs)?;
    let bounds = doc.bounds();
    let region = args.region.map_or(bounds, |r| r & bounds);
    tracing::info!(layers = inputs.len(), ?region, "compositing");

    let flat = doc.recompute(region)?.read_rect(bounds);
    if has_extension(&args.output) {
        flat.save(&args.output)?;
    } else {
        flat.save_with_format(&args.output, image::ImageFormat::Png)?;
    }
    tracing::info!(output = %args.output.display(), "written");
    Ok(())
}

/// Stack the inputs (and the optional adjustment layer) into a document.
fn build_document(args: &CliArgs, inputs: &[PathBuf]) -> MergeResult<Document> {
    let mut doc = Document::new("layer-merge", 0, 0);
    let root = doc.tree().root();
    let parent = if args.group { doc.add_layer(root, LayerNode::group("layers"))? } else { root };

    for (idx, path) in inputs.iter().enumerate() {
        let id = doc.add_image_layer(parent, path)?;
        if idx > 0
            && let Some(node) = doc.tree_mut().node_mut(id)
        {
            node.blend_mode = args.blend;
            node.opacity = args.opacity;
        }
    }

    if let Some(config) = &args.adjust {
        let mut adjustment = LayerNode::adjustment(config.name().to_string(), Some(config.clone()));
        if let Some(rect) = args.select {
            adjustment = adjustment.with_selection(SelectionMask::from_rect(rect));
        }
        doc.add_layer(root, adjustment)?;
    }
    Ok(doc)
}

// ============================================================================
// Helpers
// ============================================================================

/// Layer files in command-line order.  An argument naming an existing file
/// is taken literally, anything else is globbed.  A file named twice is
/// stacked once, at its first position.
fn resolve_inputs(patterns: &[String]) -> Vec<PathBuf> {
    let mut layers: Vec<PathBuf> = Vec::with_capacity(patterns.len());
    for path in patterns.iter().flat_map(|p| expand_pattern(p)) {
        if !layers.contains(&path) {
            layers.push(path);
        }
    }
    layers
}

fn expand_pattern(pattern: &str) -> Vec<PathBuf> {
    let literal = Path::new(pattern);
    if literal.exists() {
        return vec![literal.to_path_buf()];
    }
    let paths = match glob::glob(pattern) {
        Ok(paths) => paths,
        Err(e) => {
            tracing::warn!(pattern, "bad glob: {e}");
            eprintln!("warning: skipping '{pattern}' ({e})");
            return Vec::new();
        }
    };
    let found: Vec<PathBuf> = paths.filter_map(Result::ok).collect();
    if found.is_empty() {
        tracing::warn!(pattern, "glob is empty");
        eprintln!("warning: nothing found for '{pattern}'");
    }
    found
}

fn has_extension(path: &Path) -> bool {
    path.extension().is_some_and(|e| !e.is_empty())
}

/// `x,y,w,h` with non-negative size.
fn parse_rect(s: &str) -> Result<Rect, String> {
    let parts: Vec<i32> = s
        .split(',')
        .map(|p| p.trim().parse::<i32>().map_err(|e| format!("'{p}': {e}")))
        .collect::<Result<_, _>>()?;
    match parts[..] {
        [_, _, w, h] if w < 0 || h < 0 => Err("width and height must not be negative".to_string()),
        [x, y, w, h] if x.checked_add(w).is_none() || y.checked_add(h).is_none() => {
            Err(format!("'{s}' reaches past the i32 coordinate range"))
        }
        [x, y, w, h] => Ok(Rect::new(x, y, w, h)),
        _ => Err(format!("expected x,y,w,h but got '{s}'")),
    }
}

fn parse_blend_mode(s: &str) -> Result<BlendMode, String> {
    BlendMode::from_id(s).ok_or_else(|| {
        let known: Vec<&str> = BlendMode::all().iter().map(BlendMode::id).collect();
        format!("unknown blend mode '{s}' (known: {})", known.join(", "))
    })
}

/// `name` or `name:key=value,key=value`.
fn parse_filter_spec(s: &str) -> Result<FilterConfiguration, String> {
    let (name, params) = s.split_once(':').unwrap_or((s, ""));
    if name.trim().is_empty() {
        return Err("missing filter name".to_string());
    }
    let mut config = FilterConfiguration::new(name.trim());
    for pair in params.split(',').filter(|p| !p.trim().is_empty()) {
        let (key, value) = pair
            .split_once('=')
            .ok_or_else(|| format!("expected key=value but got '{pair}'"))?;
        config.set(key.trim(), ParamValue::parse(value.trim()));
    }
    Ok(config)
}
