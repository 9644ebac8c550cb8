use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use image::imageops::{self, FilterType};
use image::{DynamicImage, Rgb, RgbImage};
use nailtry_contracts::catalog::{CatalogSource, StyleCatalog, StyleDescriptor};
use nailtry_contracts::events::EventLog;
use nailtry_contracts::receipts::{build_receipt, write_receipt};
use nailtry_contracts::tier::EntitlementTier;
use nailtry_engine::preprocess::load_source;
use nailtry_engine::{EngineConfig, GenerationError, GenerationRequest, PreviewEngine};
use serde_json::{json, Map, Value};

const EXIT_GENERATION_FAILED: i32 = 2;
const COMPARE_GUTTER: u32 = 8;

#[derive(Debug, Parser)]
#[command(name = "nailtry", version, about = "Preview nail designs on a photo of your hand")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    Preview(PreviewArgs),
    Catalog(CatalogArgs),
}

#[derive(Debug, Parser)]
struct PreviewArgs {
    #[arg(long)]
    hand: PathBuf,
    #[arg(long, conflicts_with = "design", required_unless_present_any = ["design", "reference"])]
    style: Option<String>,
    #[arg(long)]
    design: Option<String>,
    #[arg(long)]
    reference: Option<PathBuf>,
    #[arg(long)]
    premium: bool,
    #[arg(long)]
    out: PathBuf,
    #[arg(long)]
    catalog: Option<PathBuf>,
    #[arg(long)]
    events: Option<PathBuf>,
    #[arg(long)]
    secrets: Option<PathBuf>,
}

#[derive(Debug, Parser)]
struct CatalogArgs {
    #[arg(long)]
    catalog: Option<PathBuf>,
    #[arg(long)]
    featured: bool,
    #[arg(long)]
    category: Option<String>,
}

fn main() {
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("nailtry error: {err:#}");
            std::process::exit(1);
        }
    }
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    match cli.command {
        Command::Preview(args) => run_preview(args),
        Command::Catalog(args) => run_catalog(args),
    }
}

fn load_catalog(path: Option<&Path>) -> StyleCatalog {
    match path {
        Some(path) => StyleCatalog::load(path),
        None => StyleCatalog::samples(),
    }
}

fn run_catalog(args: CatalogArgs) -> Result<i32> {
    let catalog = load_catalog(args.catalog.as_deref());
    if let Some(reason) = catalog.fallback_reason() {
        eprintln!("{reason}");
    }
    let styles: Vec<&StyleDescriptor> = match args.category.as_deref() {
        Some(category) => catalog.by_category(category),
        None => catalog.list().collect(),
    };
    for style in styles
        .into_iter()
        .filter(|style| !args.featured || style.is_featured)
    {
        println!("{}", format_style_row(style));
    }
    Ok(0)
}

fn format_style_row(style: &StyleDescriptor) -> String {
    let mut flags = Vec::new();
    if style.is_premium {
        flags.push("premium");
    }
    if style.is_featured {
        flags.push("featured");
    }
    let flags = if flags.is_empty() {
        String::new()
    } else {
        format!(" [{}]", flags.join(", "))
    };
    format!("{}\t{}\t{}{}", style.id, style.name, style.category, flags)
}

/// Picks the style instruction: explicit text, a catalog design, or (with a
/// reference image only) a neutral note.
fn resolve_style_text(args: &PreviewArgs, tier: EntitlementTier) -> Result<String> {
    if let Some(style) = args.style.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        return Ok(style.to_string());
    }
    if let Some(design_id) = args.design.as_deref() {
        let catalog = load_catalog(args.catalog.as_deref());
        if let Some(reason) = catalog.fallback_reason() {
            eprintln!("{reason}");
        }
        let Some(design) = catalog.get(design_id) else {
            let source = match catalog.source() {
                CatalogSource::File(path) => path.display().to_string(),
                CatalogSource::Samples => "sample designs".to_string(),
            };
            bail!("design {design_id:?} not found in {source}");
        };
        if design.is_premium && !tier.is_elevated() {
            bail!("design {:?} requires a premium account (--premium)", design.name);
        }
        return Ok(design.prompt.clone());
    }
    if args.reference.is_some() {
        return Ok("match the reference design as closely as possible".to_string());
    }
    bail!("either --style or --design is required")
}

fn run_preview(args: PreviewArgs) -> Result<i32> {
    let tier = EntitlementTier::from_premium(args.premium);
    let style_text = resolve_style_text(&args, tier)?;
    let config = EngineConfig::load(args.secrets.as_deref())?;

    let (hand, reference) = match load_inputs(&args) {
        Ok(inputs) => inputs,
        Err(err) => return Ok(report_failure(&err)),
    };
    let mut request = GenerationRequest::new(hand.clone(), style_text, tier);
    if let Some(reference) = reference {
        request = request.with_reference(reference);
    }

    let events = args.events.clone().map(EventLog::with_new_session);
    let engine = PreviewEngine::over_http(config, events);
    if !tier.is_elevated() {
        println!("Standard account: queued for standard processing...");
    }
    let trace = engine.generate_traced(&request);

    let mut artifacts = Map::new();
    if let Ok(generated) = trace.result.as_ref() {
        write_image(&generated.image, &args.out)?;
        let compare_path = compare_path_for(&args.out);
        let strip = before_after_strip(&hand, &generated.image);
        strip
            .save(&compare_path)
            .with_context(|| format!("failed to save {}", compare_path.display()))?;
        artifacts.insert("image_path".to_string(), path_value(&args.out));
        artifacts.insert("compare_path".to_string(), path_value(&compare_path));
        if let Some(text) = generated.text.as_deref() {
            artifacts.insert("model_text".to_string(), json!(text));
        }
    }

    let receipt_path = receipt_path_for(&args.out);
    artifacts.insert("receipt_path".to_string(), path_value(&receipt_path));
    let receipt = build_receipt(
        &trace.summary,
        &trace.provider_request,
        &trace.receipt_outcome(),
        trace.elapsed.as_secs_f64(),
        &artifacts,
    );
    write_receipt(&receipt_path, &receipt)?;

    match trace.result {
        Ok(generated) => {
            println!(
                "Saved {}x{} preview to {} ({:.1}s)",
                generated.width(),
                generated.height(),
                args.out.display(),
                trace.elapsed.as_secs_f64()
            );
            Ok(0)
        }
        Err(err) => Ok(report_failure(&err)),
    }
}

fn load_inputs(
    args: &PreviewArgs,
) -> Result<(DynamicImage, Option<DynamicImage>), GenerationError> {
    let hand = load_source(&args.hand)?;
    let reference = args.reference.as_deref().map(load_source).transpose()?;
    Ok((hand, reference))
}

fn report_failure(err: &GenerationError) -> i32 {
    eprintln!("{}", err.user_message());
    eprintln!("nailtry: {} ({})", err, err.kind());
    EXIT_GENERATION_FAILED
}

fn write_image(image: &DynamicImage, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let is_jpeg = path
        .extension()
        .and_then(|value| value.to_str())
        .map(|value| matches!(value.to_ascii_lowercase().as_str(), "jpg" | "jpeg"))
        .unwrap_or(false);
    let result = if is_jpeg {
        DynamicImage::ImageRgb8(image.to_rgb8()).save(path)
    } else {
        image.save(path)
    };
    result.with_context(|| format!("failed to save {}", path.display()))
}

fn compare_path_for(out: &Path) -> PathBuf {
    let stem = out
        .file_stem()
        .and_then(|value| value.to_str())
        .unwrap_or("preview");
    out.with_file_name(format!("{stem}-compare.png"))
}

fn receipt_path_for(out: &Path) -> PathBuf {
    let stem = out
        .file_stem()
        .and_then(|value| value.to_str())
        .unwrap_or("preview");
    out.with_file_name(format!("{stem}.receipt.json"))
}

fn path_value(path: &Path) -> Value {
    Value::String(path.to_string_lossy().to_string())
}

/// Hand photo on the left, generated preview on the right, both at the generated
/// image's height.
fn before_after_strip(before: &DynamicImage, after: &DynamicImage) -> RgbImage {
    let height = after.height().max(1);
    let before_width = if before.height() == 0 {
        1
    } else {
        ((f64::from(before.width()) * f64::from(height) / f64::from(before.height())).round()
            as u32)
            .max(1)
    };
    let left = before
        .resize_exact(before_width, height, FilterType::Triangle)
        .to_rgb8();
    let right = after.to_rgb8();

    let mut strip = RgbImage::from_pixel(
        before_width + COMPARE_GUTTER + right.width(),
        height,
        Rgb([255, 255, 255]),
    );
    imageops::replace(&mut strip, &left, 0, 0);
    imageops::replace(
        &mut strip,
        &right,
        i64::from(before_width + COMPARE_GUTTER),
        0,
    );
    strip
}
