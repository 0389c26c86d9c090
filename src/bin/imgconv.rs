// src/bin/imgconv.rs
//
// Batch converter: walks a source directory (or takes one file), converts
// every supported image with the configured pipeline and writes the results
// under the destination, mirroring the source tree.

use clap::Parser;
use imgconv::config::BatchConfig;
use imgconv::engine::api::open;
use imgconv::{
    is_supported_input, DecodeOptions, Format, ImgconvError, Options, PngCompression, Result,
    TiffCompression,
};
use rayon::prelude::*;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing_subscriber::fmt::writer::{BoxMakeWriter, MakeWriterExt};
use tracing_subscriber::EnvFilter;
use walkdir::WalkDir;

#[derive(Parser, Debug)]
#[command(name = "imgconv", version)]
#[command(about = "Convert, resize and watermark images in bulk")]
struct Cli {
    /// Source file or directory
    #[arg(long)]
    src: Option<PathBuf>,

    /// Destination file or directory [default: output]
    #[arg(long)]
    dst: Option<PathBuf>,

    /// TOML config file; flags override its values
    #[arg(long)]
    config: Option<PathBuf>,

    /// Output format (jpg, jpeg, png, gif, tif, tiff, bmp, pdf)
    #[arg(long)]
    format: Option<Format>,

    /// JPEG or PDF quality, 1-100
    #[arg(long)]
    quality: Option<u8>,

    /// TIFF compression (none, lzw, deflate, packbits)
    #[arg(long)]
    compression: Option<TiffCompression>,

    /// PNG compression (default, fast, best)
    #[arg(long)]
    png_compression: Option<PngCompression>,

    /// GIF palette size, 1-256
    #[arg(long)]
    gif_colors: Option<u16>,

    /// Dither GIF output
    #[arg(long)]
    gif_dither: bool,

    /// Flatten transparency onto white
    #[arg(long)]
    white_background: bool,

    /// Convert to grayscale
    #[arg(long)]
    gray: bool,

    /// Apply the EXIF orientation tag
    #[arg(long)]
    auto_orientation: bool,

    /// Watermark image
    #[arg(long)]
    watermark: Option<PathBuf>,

    /// Watermark opacity, 0-255 (0 selects 128)
    #[arg(long)]
    opacity: Option<u8>,

    /// Random watermark size, tilt and position
    #[arg(long)]
    random: bool,

    /// Watermark center offset X (fixed placement only)
    #[arg(short = 'x', allow_hyphen_values = true)]
    x: Option<i32>,

    /// Watermark center offset Y (fixed placement only)
    #[arg(short = 'y', allow_hyphen_values = true)]
    y: Option<i32>,

    /// Resize width; 0 keeps the aspect ratio
    #[arg(long)]
    width: Option<i32>,

    /// Resize height; 0 keeps the aspect ratio
    #[arg(long)]
    height: Option<i32>,

    /// Resize percent, used when width and height are both 0
    #[arg(long)]
    percent: Option<f64>,

    /// Files converted at once [default: 5]
    #[arg(long)]
    workers: Option<usize>,

    /// Threads per pixel operation, 0 = all cores
    #[arg(long)]
    max_parallelism: Option<usize>,

    /// Overwrite existing outputs
    #[arg(long)]
    force: bool,

    /// Only check that sources decode
    #[arg(long)]
    test: bool,

    /// Debug logging
    #[arg(long)]
    debug: bool,

    /// Warnings and errors only
    #[arg(short, long)]
    quiet: bool,

    /// Also write the log to this file
    #[arg(long)]
    log_file: Option<PathBuf>,
}

impl Cli {
    /// Overlay the flags on `cfg`.
    fn apply(&self, cfg: &mut BatchConfig) {
        if let Some(src) = &self.src {
            cfg.src = Some(src.clone());
        }
        if let Some(dst) = &self.dst {
            cfg.dst = dst.clone();
        }
        if let Some(format) = self.format {
            cfg.format = format;
        }
        if let Some(quality) = self.quality {
            cfg.quality = quality;
        }
        if let Some(compression) = self.compression {
            cfg.compression = compression;
        }
        if let Some(png) = self.png_compression {
            cfg.png_compression = png;
        }
        if let Some(colors) = self.gif_colors {
            cfg.gif_colors = colors;
        }
        if let Some(workers) = self.workers {
            cfg.workers = workers;
        }
        if let Some(max) = self.max_parallelism {
            cfg.max_parallelism = max;
        }
        cfg.gif_dither |= self.gif_dither;
        cfg.white_background |= self.white_background;
        cfg.gray |= self.gray;
        cfg.auto_orientation |= self.auto_orientation;
        cfg.force |= self.force;
        cfg.test |= self.test;

        if let Some(path) = &self.watermark {
            let mark = cfg.watermark.get_or_insert_with(Default::default);
            mark.path = path.clone();
        }
        if let Some(mark) = cfg.watermark.as_mut() {
            if let Some(opacity) = self.opacity {
                mark.opacity = opacity;
            }
            mark.random |= self.random;
            mark.x = self.x.unwrap_or(mark.x);
            mark.y = self.y.unwrap_or(mark.y);
        }

        if self.width.is_some() || self.height.is_some() || self.percent.is_some() {
            let resize = cfg.resize.get_or_insert_with(Default::default);
            resize.width = self.width.unwrap_or(resize.width);
            resize.height = self.height.unwrap_or(resize.height);
            resize.percent = self.percent.unwrap_or(resize.percent);
        }
    }
}

fn init_logging(cli: &Cli) -> std::io::Result<()> {
    let level = if cli.debug {
        "debug"
    } else if cli.quiet {
        "warn"
    } else {
        "info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let writer = match &cli.log_file {
        Some(path) => {
            let file = Arc::new(fs::File::create(path)?);
            BoxMakeWriter::new(std::io::stderr.and(file))
        }
        None => BoxMakeWriter::new(std::io::stderr),
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_target(false)
        .init();
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Converted,
    Skipped,
}

/// Convert one file. The output is written to a temp file beside it and
/// renamed into place, so a failed conversion never leaves a partial file.
fn convert_file(
    opts: &Options,
    decode: &DecodeOptions,
    input: &Path,
    output: &Path,
    force: bool,
) -> Result<Outcome> {
    if output.exists() && !force {
        return Ok(Outcome::Skipped);
    }
    let dir = match output.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    fs::create_dir_all(&dir)
        .map_err(|e| ImgconvError::file_write_failed(dir.display().to_string(), e))?;

    let img = open(input, decode)?;

    let mut tmp = tempfile::Builder::new()
        .suffix(".tmp")
        .tempfile_in(&dir)
        .map_err(|e| ImgconvError::file_write_failed(dir.display().to_string(), e))?;
    opts.convert(&mut tmp, &img)?;
    tmp.persist(output)
        .map_err(|e| ImgconvError::file_write_failed(output.display().to_string(), e.error))?;
    Ok(Outcome::Converted)
}

fn find_images(root: &Path) -> Vec<PathBuf> {
    let mut images: Vec<PathBuf> = WalkDir::new(root)
        .into_iter()
        .filter_map(|entry| match entry {
            Ok(e) => Some(e),
            Err(err) => {
                tracing::warn!(error = %err, "skipping unreadable entry");
                None
            }
        })
        .filter(|e| e.file_type().is_file() && is_supported_input(e.path()))
        .map(|e| e.into_path())
        .collect();
    images.sort();
    tracing::info!(total = images.len(), root = %root.display(), "found images");
    images
}

fn build_pool(workers: usize) -> Result<rayon::ThreadPool> {
    rayon::ThreadPoolBuilder::new()
        .num_threads(workers)
        .thread_name(|i| format!("imgconv-worker-{i}"))
        .build()
        .map_err(|e| ImgconvError::internal_panic(format!("failed to build worker pool: {e}")))
}

fn check_images(pool: &rayon::ThreadPool, images: &[PathBuf], decode: &DecodeOptions) -> usize {
    let bad = AtomicUsize::new(0);
    pool.install(|| {
        images.par_iter().for_each(|image| {
            if let Err(e) = open(image, decode) {
                tracing::error!(image = %image.display(), error = %e, "bad image");
                bad.fetch_add(1, Ordering::Relaxed);
            }
        })
    });
    bad.into_inner()
}

fn run(cli: Cli) -> Result<()> {
    let mut cfg = match &cli.config {
        Some(path) => BatchConfig::load(path)?,
        None => BatchConfig::default(),
    };
    cli.apply(&mut cfg);
    cfg.validate()?;

    let src = cfg.src.clone().ok_or_else(|| {
        ImgconvError::invalid_argument("src", "", "a source file or directory is required")
    })?;
    let src_meta = fs::metadata(&src).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => ImgconvError::file_not_found(src.display().to_string()),
        _ => ImgconvError::file_read_failed(src.display().to_string(), e),
    })?;
    let decode = cfg.decode_options();
    let pool = build_pool(cfg.workers)?;

    if cfg.test {
        let images = if src_meta.is_dir() {
            find_images(&src)
        } else {
            vec![src.clone()]
        };
        let bad = check_images(&pool, &images, &decode);
        tracing::info!(total = images.len(), bad, "test finished");
        return Ok(());
    }

    let opts = cfg.to_options()?;
    if !cfg.dst.exists() {
        fs::create_dir_all(&cfg.dst)
            .map_err(|e| ImgconvError::file_write_failed(cfg.dst.display().to_string(), e))?;
    }

    if src_meta.is_dir() {
        if !cfg.dst.is_dir() {
            return Err(ImgconvError::invalid_argument(
                "dst",
                cfg.dst.display().to_string(),
                "destination must be a directory when the source is",
            ));
        }
        let images = find_images(&src);
        let converted = AtomicUsize::new(0);
        let skipped = AtomicUsize::new(0);
        let failed = AtomicUsize::new(0);

        pool.install(|| {
            images.par_iter().for_each(|image| {
                let rel = image.strip_prefix(&src).unwrap_or(image);
                let output = opts.convert_ext(&cfg.dst.join(rel));
                match convert_file(&opts, &decode, image, &output, cfg.force) {
                    Ok(Outcome::Converted) => {
                        tracing::debug!(image = %image.display(), "converted");
                        converted.fetch_add(1, Ordering::Relaxed);
                    }
                    Ok(Outcome::Skipped) => {
                        tracing::info!(output = %output.display(), "skip");
                        skipped.fetch_add(1, Ordering::Relaxed);
                    }
                    Err(e) => {
                        tracing::error!(image = %image.display(), error = %e, "failed to convert image");
                        failed.fetch_add(1, Ordering::Relaxed);
                    }
                }
            })
        });
        tracing::info!(
            converted = converted.into_inner(),
            skipped = skipped.into_inner(),
            failed = failed.into_inner(),
            "done"
        );
        return Ok(());
    }

    if !src_meta.is_file() {
        return Err(ImgconvError::invalid_argument(
            "src",
            src.display().to_string(),
            "unknown source type",
        ));
    }
    let output = if cfg.dst.is_dir() {
        let name = src.file_name().map(PathBuf::from).unwrap_or_default();
        opts.convert_ext(&cfg.dst.join(name))
    } else {
        cfg.dst.clone()
    };
    match convert_file(&opts, &decode, &src, &output, cfg.force)? {
        Outcome::Converted => tracing::info!(output = %output.display(), "done"),
        Outcome::Skipped => {
            return Err(ImgconvError::invalid_argument(
                "dst",
                output.display().to_string(),
                "destination already exists (use --force to overwrite)",
            ))
        }
    }
    Ok(())
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    if let Err(e) = init_logging(&cli) {
        eprintln!("failed to open log file: {e}");
        return ExitCode::FAILURE;
    }
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, category = e.category().as_str(), "fatal");
            ExitCode::FAILURE
        }
    }
}
