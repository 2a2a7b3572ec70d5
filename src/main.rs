//! Film Scanner CLI
//!
//! Runs the scanning server, or crops and converts image files offline
//! with the same pipeline.

use clap::{Parser, Subcommand, ValueEnum};
use film_scanner::{
    autocrop::{auto_crop, auto_crop_or_full},
    capture::{FileConfig, Frame},
    preview,
    tiff::{encode_tiff, ByteOrder, Resolution, TiffOptions},
};
use std::error::Error;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "film-scanner")]
#[command(version, about = "Webcam film scanner with automatic cropping", long_about = None)]
struct Cli {
    /// Configuration file (TOML)
    #[arg(short, long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP server with live preview (the default)
    Serve,

    /// Auto-crop the film out of an image file
    Crop {
        /// Input image
        #[arg(value_name = "INPUT")]
        input: PathBuf,

        /// Output file (defaults to <INPUT>-crop.<ext>)
        #[arg(short, long, value_name = "FILE")]
        out: Option<PathBuf>,

        /// Output format
        #[arg(long, value_enum, default_value = "tiff")]
        format: Format,

        /// Fail instead of keeping the whole image when no film is found
        #[arg(long)]
        strict: bool,
    },

    /// Convert an image file to an uncompressed TIFF
    Tiff {
        /// Input image
        #[arg(value_name = "INPUT")]
        input: PathBuf,

        /// Output file (defaults to <INPUT>.tiff)
        #[arg(short, long, value_name = "FILE")]
        out: Option<PathBuf>,

        /// Resolution to record, in dots per inch
        #[arg(long, value_name = "DPI", default_value = "72")]
        dpi: u32,

        /// Write a big-endian (MM) file
        #[arg(long)]
        big_endian: bool,
    },
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Format {
    Tiff,
    Jpeg,
}

impl Format {
    fn extension(self) -> &'static str {
        match self {
            Format::Tiff => "tiff",
            Format::Jpeg => "jpg",
        }
    }
}

fn main() {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => match FileConfig::from_file(path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("Failed to load {}: {}", path.display(), e);
                std::process::exit(1);
            }
        },
        None => FileConfig::default(),
    };

    let result = match cli.command {
        None | Some(Commands::Serve) => serve(config),
        Some(Commands::Crop {
            input,
            out,
            format,
            strict,
        }) => crop(&config, &input, out, format, strict),
        Some(Commands::Tiff {
            input,
            out,
            dpi,
            big_endian,
        }) => convert(&input, out, dpi, big_endian),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

#[cfg(feature = "server")]
fn serve(config: FileConfig) -> Result<(), Box<dyn Error>> {
    use film_scanner::capture::{CommandStill, FrameStream};
    use film_scanner::metrics::ScannerMetrics;
    use film_scanner::server::{command_stills, drive_storage, AppState, Server};
    use film_scanner::session::OAuthClient;
    use film_scanner::storage::LocalCache;
    use std::sync::Arc;

    info!("Film Scanner v{}", film_scanner::VERSION);

    let (stop_tx, stop_rx) = tokio::sync::watch::channel(false);
    ctrlc::set_handler(move || {
        info!("Received Ctrl-C, shutting down");
        let _ = stop_tx.send(true);
    })?;

    let metrics = Arc::new(ScannerMetrics::new()?);
    let cache = LocalCache::open(&config.cache.dir)?;
    let stills = CommandStill::new(config.still.clone())?;
    let oauth = OAuthClient::new(config.oauth.clone());
    if !oauth.is_configured() {
        warn!("No OAuth client configured; drive features are unavailable");
    }

    let stream = match FrameStream::spawn(open_camera, config.capture.clone()) {
        Ok(stream) => Some(Arc::new(stream)),
        Err(e) => {
            warn!("Camera unavailable, preview and capture are disabled: {}", e);
            None
        }
    };

    let state = AppState {
        config,
        stream,
        cache,
        metrics,
        oauth,
        storage: drive_storage(),
        stills: command_stills(stills),
        shutdown: stop_rx,
    };

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    runtime.block_on(Server::new(state).run())?;

    info!("Done");
    Ok(())
}

#[cfg(not(feature = "server"))]
fn serve(_config: FileConfig) -> Result<(), Box<dyn Error>> {
    Err("built without the `server` feature".into())
}

#[cfg(all(feature = "server", feature = "camera"))]
fn open_camera() -> Box<dyn film_scanner::Camera> {
    Box::new(film_scanner::capture::Webcam::new())
}

#[cfg(all(feature = "server", not(feature = "camera")))]
fn open_camera() -> Box<dyn film_scanner::Camera> {
    warn!("Built without the `camera` feature, streaming synthetic frames");
    Box::new(film_scanner::MockCamera::new())
}

fn crop(
    config: &FileConfig,
    input: &Path,
    out: Option<PathBuf>,
    format: Format,
    strict: bool,
) -> Result<(), Box<dyn Error>> {
    let frame = load(input)?;

    let (cropped, region) = if strict {
        let outcome = auto_crop(&frame, &config.crop)?;
        (outcome.frame, Some(outcome.region))
    } else {
        auto_crop_or_full(frame, &config.crop)?.into_parts()
    };
    match region {
        Some(r) => info!(
            x = r.x,
            y = r.y,
            width = r.width,
            height = r.height,
            "Film found"
        ),
        None => warn!("No film found, writing the whole image"),
    }

    let bytes = match format {
        Format::Tiff => encode_tiff(&cropped, &TiffOptions::default())?,
        Format::Jpeg => preview::encode_jpeg(&cropped, config.server.jpeg_quality)?,
    };
    let out = out.unwrap_or_else(|| sibling(input, "-crop", format.extension()));
    std::fs::write(&out, bytes)?;
    info!(path = %out.display(), "Wrote cropped image");
    Ok(())
}

fn convert(
    input: &Path,
    out: Option<PathBuf>,
    dpi: u32,
    big_endian: bool,
) -> Result<(), Box<dyn Error>> {
    let frame = load(input)?;
    let options = TiffOptions {
        byte_order: if big_endian {
            ByteOrder::BigEndian
        } else {
            ByteOrder::LittleEndian
        },
        resolution: Some(Resolution::dpi(dpi)),
    };

    let bytes = encode_tiff(&frame, &options)?;
    let out = out.unwrap_or_else(|| sibling(input, "", "tiff"));
    std::fs::write(&out, bytes)?;
    info!(path = %out.display(), rows = frame.rows(), cols = frame.cols(), "Wrote TIFF");
    Ok(())
}

fn load(path: &Path) -> Result<Frame, Box<dyn Error>> {
    let image = image::open(path)?.to_rgb8();
    Ok(Frame::from_rgb_image(image, 0))
}

/// `dir/stem<suffix>.<extension>` next to `input`.
fn sibling(input: &Path, suffix: &str, extension: &str) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "image".to_string());
    input.with_file_name(format!("{}{}.{}", stem, suffix, extension))
}
