use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use framefit_core::catalog::{Cart, JsonCatalog, ProductCarousel, ProductCatalog};
use framefit_core::render::{self, Renderer};
use framefit_core::{recommend, FaceMeshDetector, FaceShape, FrameAsset, Product};
use framefit_hw::Camera;
use framefit_session::{
    spawn_detector, CaptureMode, CaptureSession, Command, Config, Event, SessionDriver,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "framefit", about = "Virtual eyewear try-on")]
struct Cli {
    /// Config file (overrides FRAMEFIT_CONFIG)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Try a frame on a photo
    Photo {
        /// JPEG or PNG portrait
        image: PathBuf,
        /// Catalog product id
        #[arg(short, long)]
        product: String,
        /// Output PNG (default: framefit-<timestamp>.png in the export dir)
        #[arg(short, long)]
        out: Option<PathBuf>,
        /// Add the product to the cart after rendering
        #[arg(long)]
        add_to_cart: bool,
    },
    /// Stream from the camera, then capture and export
    Live {
        /// Catalog product id (default: first eyewear product)
        #[arg(short, long)]
        product: Option<String>,
        /// Live frames to render before capturing
        #[arg(short, long, default_value_t = 30)]
        frames: usize,
        /// Step to the next eyewear product every N rendered frames
        #[arg(long, value_name = "N")]
        cycle: Option<usize>,
        #[arg(short, long)]
        out: Option<PathBuf>,
    },
    /// List recommended frame shapes and matching products
    Recommend {
        /// oval, round, square or heart
        #[arg(short, long)]
        shape: FaceShape,
        /// Show every eyewear product, not only recommended ones
        #[arg(long)]
        all: bool,
    },
    /// List V4L2 capture devices
    Devices,
}

/// Cart that only records the request in the log.
struct LoggingCart;

impl Cart for LoggingCart {
    fn add_item(&self, product_id: &str) {
        tracing::info!(product = product_id, "added to cart");
        println!("Added {product_id} to cart");
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref()).context("failed to load config")?;

    match cli.command {
        Commands::Photo {
            image,
            product,
            out,
            add_to_cart,
        } => photo(&config, &image, &product, out, add_to_cart).await,
        Commands::Live {
            product,
            frames,
            cycle,
            out,
        } => live(&config, product.as_deref(), frames, cycle, out).await,
        Commands::Recommend { shape, all } => recommend(&config, shape, all),
        Commands::Devices => {
            let devices = Camera::list_devices();
            if devices.is_empty() {
                println!("No V4L2 capture devices found");
            }
            for d in devices {
                println!("{}  {} ({}, {})", d.path, d.name, d.driver, d.bus);
            }
            Ok(())
        }
    }
}

async fn photo(
    config: &Config,
    image: &Path,
    product_id: &str,
    out: Option<PathBuf>,
    add_to_cart: bool,
) -> Result<()> {
    let product = find_product(&mut carousel(config)?, Some(product_id))?;
    let bytes =
        std::fs::read(image).with_context(|| format!("failed to read {}", image.display()))?;
    let bitmap = load_bitmap(config, &product);

    let mut pipeline = Pipeline::start(config)?;
    pipeline.select(&product, bitmap).await?;
    pipeline.send(Command::LoadImage(bytes)).await?;
    pipeline.wait_rendered(1).await?;
    if add_to_cart {
        pipeline.send(Command::AddToCart).await?;
    }
    pipeline.export(config, out).await?;
    pipeline.shutdown().await
}

async fn live(
    config: &Config,
    product_id: Option<&str>,
    frames: usize,
    cycle: Option<usize>,
    out: Option<PathBuf>,
) -> Result<()> {
    let mut carousel = carousel(config)?;
    let product = find_product(&mut carousel, product_id)?;
    let frames = frames.max(1);
    let step = cycle.filter(|&n| n > 0).unwrap_or(frames);

    let mut pipeline = Pipeline::start(config)?;
    pipeline.select(&product, None).await?;
    pipeline.send(Command::Start).await?;

    let mut shown = 0;
    while shown < frames {
        let batch = step.min(frames - shown);
        pipeline.wait_rendered(batch).await?;
        shown += batch;
        if shown < frames {
            let next = carousel.next();
            println!("Trying {} ({})", next.name, next.id);
            pipeline.select(next, None).await?;
        }
    }

    pipeline.send(Command::Capture).await?;
    pipeline.wait_mode(CaptureMode::Captured).await?;
    pipeline.wait_rendered(1).await?;
    pipeline.export(config, out).await?;
    pipeline.shutdown().await
}

fn recommend(config: &Config, shape: FaceShape, all: bool) -> Result<()> {
    println!("{}: {}", shape.name(), shape.description());
    println!(
        "Recommended frames: {}",
        recommend::recommended_shapes(shape).join(", ")
    );

    let catalog = JsonCatalog::load(&config.catalog_path)
        .with_context(|| format!("failed to load catalog {}", config.catalog_path.display()))?;
    let eyewear = catalog.eyewear()?;
    let visible = recommend::visible_products(Some(shape), !all, &eyewear);
    println!("{}", serde_json::to_string_pretty(&visible)?);
    Ok(())
}

/// Eyewear from the configured catalog, starting on the first product.
fn carousel(config: &Config) -> Result<ProductCarousel> {
    let catalog = JsonCatalog::load(&config.catalog_path)
        .with_context(|| format!("failed to load catalog {}", config.catalog_path.display()))?;
    match ProductCarousel::new(catalog.eyewear()?) {
        Some(carousel) => Ok(carousel),
        None => bail!("no eyewear products in {}", config.catalog_path.display()),
    }
}

/// Move the carousel to `id`, or keep its current product when none is given.
fn find_product(carousel: &mut ProductCarousel, id: Option<&str>) -> Result<Product> {
    match id {
        Some(id) => match carousel.select(id) {
            Some(product) => Ok(product.clone()),
            None => bail!("no eyewear product {id}"),
        },
        None => Ok(carousel.current().clone()),
    }
}

/// Product image, resolved relative to the catalog file. Falls back to the
/// drawn frame when missing or undecodable.
fn load_bitmap(config: &Config, product: &Product) -> Option<Arc<image::RgbaImage>> {
    let base = config.catalog_path.parent().unwrap_or(Path::new("."));
    let path = base.join(&product.image);
    match std::fs::read(&path)
        .map_err(|e| e.to_string())
        .and_then(|bytes| render::decode_rgba(&bytes).map_err(|e| e.to_string()))
    {
        Ok(bitmap) => Some(Arc::new(bitmap)),
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "product image unavailable; drawing frame");
            None
        }
    }
}

fn default_export_path(config: &Config) -> PathBuf {
    let stamp = chrono::Local::now().format("%Y%m%d-%H%M%S");
    config.export_dir.join(format!("framefit-{stamp}.png"))
}

/// A running session driver with its command and event channels.
struct Pipeline {
    commands: mpsc::Sender<Command>,
    events: mpsc::Receiver<Event>,
    task: tokio::task::JoinHandle<Result<(), framefit_session::SessionError>>,
}

impl Pipeline {
    fn start(config: &Config) -> Result<Self> {
        let model = config.model_path_str();
        let detector = FaceMeshDetector::load(&model, config.detection_confidence)
            .with_context(|| format!("failed to load face mesh model {model}"))?;
        let handle = spawn_detector(detector)?;

        let renderer = match &config.label_font {
            Some(path) => Renderer::load_font(path)?,
            None => Renderer::new(),
        };

        let (command_tx, command_rx) = mpsc::channel(8);
        let (event_tx, event_rx) = mpsc::channel(32);
        let driver = SessionDriver::new(
            CaptureSession::new(config.device_provider()),
            handle,
            renderer,
            event_tx,
        )
        .with_cart(Arc::new(LoggingCart));

        Ok(Self {
            commands: command_tx,
            events: event_rx,
            task: tokio::spawn(driver.run(command_rx)),
        })
    }

    async fn send(&self, command: Command) -> Result<()> {
        self.commands
            .send(command)
            .await
            .map_err(|_| anyhow::anyhow!("session driver stopped"))
    }

    async fn select(&self, product: &Product, bitmap: Option<Arc<image::RgbaImage>>) -> Result<()> {
        let Some(asset) = FrameAsset::from_product(product) else {
            bail!("{} has no try-on frame", product.id);
        };
        self.send(Command::SelectFrame { asset, bitmap }).await
    }

    async fn wait_rendered(&mut self, count: usize) -> Result<()> {
        let mut rendered = 0;
        self.pump(|event| {
            if matches!(event, Event::Rendered(_)) {
                rendered += 1;
            }
            rendered >= count
        })
        .await
    }

    async fn wait_mode(&mut self, mode: CaptureMode) -> Result<()> {
        self.pump(|event| matches!(event, Event::ModeChanged(m) if *m == mode))
            .await
    }

    /// Print events until `done` returns true. Session errors end the run.
    async fn pump(&mut self, mut done: impl FnMut(&Event) -> bool) -> Result<()> {
        while let Some(event) = self.events.recv().await {
            match &event {
                Event::ModeChanged(mode) => tracing::info!(?mode, "mode changed"),
                Event::FaceShape { shape, recommended } => {
                    println!("Face shape: {} ({})", shape.name(), shape.description());
                    println!("Recommended frames: {}", recommended.join(", "));
                }
                Event::FaceLost => println!("No face detected"),
                Event::Rendered(preview) => {
                    tracing::debug!(width = preview.width(), height = preview.height(), "rendered");
                }
                Event::Error(e) => bail!("session error: {e}"),
            }
            if done(&event) {
                return Ok(());
            }
        }
        bail!("session driver stopped unexpectedly")
    }

    async fn export(&self, config: &Config, out: Option<PathBuf>) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        self.send(Command::Export(tx)).await?;
        let png = rx.await??;
        let path = out.unwrap_or_else(|| default_export_path(config));
        std::fs::write(&path, png).with_context(|| format!("failed to write {}", path.display()))?;
        println!("Saved {}", path.display());
        Ok(())
    }

    async fn shutdown(self) -> Result<()> {
        self.send(Command::Shutdown).await?;
        self.task.await??;
        Ok(())
    }
}
