use std::fs::File;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::Parser;
use log::{error, info};
use simplelog::{Config, LevelFilter, WriteLogger};

use tilepager::document::{Document, DocumentProvider};
use tilepager::synthetic::SyntheticProvider;
use tilepager::{
    CacheRegistry, DocumentOpenFailure, DocumentRegistry, DocumentSource, EngineConfig,
    PagingEngine, Size,
};

/// Scroll through a document and report what the tile cache does.
#[derive(Parser, Debug)]
#[command(name = "tilepager", version, about)]
struct Cli {
    /// PDF file, or `synthetic:N[:WxH]` for a generated document
    document: String,

    #[arg(long)]
    password: Option<String>,

    /// Engine configuration (YAML). Defaults to the user config file if present.
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[arg(long, default_value_t = 1080.0)]
    width: f32,

    #[arg(long, default_value_t = 1920.0)]
    height: f32,

    #[arg(short, long)]
    zoom: Option<f32>,

    /// Scroll steps to simulate after the first pass
    #[arg(short, long, default_value_t = 10)]
    steps: usize,

    /// Distance of one scroll step, as a fraction of the view
    #[arg(long, default_value_t = 0.5)]
    step_fraction: f32,

    #[arg(long, default_value = "tilepager.log")]
    log_file: PathBuf,

    #[arg(short, long)]
    verbose: bool,
}

/// Synthetic sources by name, files through MuPDF when built with it.
struct CliProvider;

impl DocumentProvider for CliProvider {
    fn open(
        &self,
        source: &DocumentSource,
        password: Option<&str>,
    ) -> Result<Arc<dyn Document>, DocumentOpenFailure> {
        match source {
            DocumentSource::Named(_) => SyntheticProvider.open(source, password),
            #[cfg(feature = "pdf")]
            DocumentSource::Path(_) => tilepager::backend::MupdfProvider.open(source, password),
            #[cfg(not(feature = "pdf"))]
            DocumentSource::Path(path) => Err(DocumentOpenFailure::NotFound(path.clone())),
        }
    }
}

fn load_config(cli: &Cli) -> Result<EngineConfig> {
    let path = cli
        .config
        .clone()
        .or_else(|| EngineConfig::default_path().filter(|path| path.exists()));

    let config = match path {
        Some(path) => EngineConfig::load(&path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => EngineConfig::default(),
    };
    config.validate()?;
    Ok(config)
}

fn settle(engine: &mut PagingEngine) {
    let deadline = Instant::now() + Duration::from_secs(30);
    while !engine.is_idle() && Instant::now() < deadline {
        engine.wait_for_events(Duration::from_millis(50));
    }
    engine.poll_events();
}

fn report(label: &str, engine: &PagingEngine) {
    let stats = engine.stats();
    println!(
        "{label:>6}  page {:>4}/{:<4}  submitted {:>5}  promoted {:>5}  rendered {:>5}  \
         discarded {:>4}  failed {:>3}  cache {}+{} thumbs {}",
        engine.current_page() + 1,
        engine.page_count(),
        stats.submitted,
        stats.promoted,
        stats.rendered,
        stats.discarded,
        stats.failed,
        stats.occupancy.active,
        stats.occupancy.passive,
        stats.occupancy.thumbnails,
    );
}

fn run(cli: &Cli) -> Result<()> {
    let config = load_config(cli)?;

    let source = if cli.document.starts_with("synthetic:") {
        DocumentSource::Named(cli.document.clone())
    } else {
        DocumentSource::Path(PathBuf::from(&cli.document))
    };

    let documents = Arc::new(DocumentRegistry::new(CliProvider));
    let caches = CacheRegistry::new();
    let mut engine = PagingEngine::open(
        &documents,
        &source,
        cli.password.as_deref(),
        Size::new(cli.width, cli.height),
        config,
        &caches,
    )
    .with_context(|| format!("Cannot open {source}"))?;

    if let Some(zoom) = cli.zoom {
        engine.zoom_to(zoom);
    }

    engine.request_load();
    settle(&mut engine);
    report("start", &engine);

    let view = engine.viewport().view_size();
    let vertical = engine.viewport().orientation().is_vertical();
    for step in 1..=cli.steps {
        let distance = cli.step_fraction
            * if vertical { view.height } else { view.width };
        if vertical {
            engine.move_relative(0.0, distance);
        } else {
            engine.move_relative(distance, 0.0);
        }
        engine.request_load();
        settle(&mut engine);
        report(&step.to_string(), &engine);
    }

    info!("Final stats: {:?}", engine.stats());
    Ok(())
}

fn main() -> Result<()> {
    better_panic::install();

    let cli = Cli::parse();
    let level = if cli.verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };
    WriteLogger::init(level, Config::default(), File::create(&cli.log_file)?)?;

    info!("Starting tilepager on {}", cli.document);
    let result = run(&cli);
    if let Err(err) = &result {
        error!("tilepager failed: {err:?}");
    }
    info!("Shutting down tilepager");
    result
}
