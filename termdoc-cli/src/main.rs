use std::fs;
use std::io;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use directories::ProjectDirs;
use termdoc_core::{
    ControlChannel, DarkMode, DocumentProvider, DualPageMode, FitMode, ForceMode, LoadedDocument, Viewer, ViewerConfig,
};
use termdoc_render::PdfiumRenderFactory;
use termdoc_tty::{install_panic_hook, GeometryProbe, KittyRenderer, TerminalGuard};
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{prelude::*, EnvFilter};

mod event_loop;

use event_loop::{EventLoop, ViewerExit};

/// Exit status telling a wrapper script to show its file picker again.
const EXIT_BACK: u8 = 3;

#[derive(Debug, Parser)]
#[command(
    name = "termdoc",
    version,
    about = "Terminal document viewer using the kitty graphics protocol",
    after_help = "Documents are opened with pdfium, so only PDF files are supported."
)]
struct Args {
    /// PDF document to open
    file: PathBuf,

    /// Page to open on (1-based, snaps to the nearest page with content)
    #[arg(short = 'p', long = "page")]
    page: Option<usize>,

    /// Fit mode: height, width or auto
    #[arg(long)]
    fit: Option<FitMode>,

    /// Dark mode: off, smart or simple
    #[arg(long)]
    dark: Option<DarkMode>,

    /// Force layout: auto, text or image
    #[arg(long)]
    force: Option<ForceMode>,

    /// Dual-page mode: off, vertical or horizontal
    #[arg(long)]
    dual: Option<DualPageMode>,

    /// Initial zoom between 0.1 and 2.0
    #[arg(long)]
    scale: Option<f32>,

    /// Configuration file (defaults to config.toml in the user config dir)
    #[arg(long)]
    config: Option<PathBuf>,
}

impl Args {
    fn apply_overrides(&self, config: &mut ViewerConfig) {
        if let Some(fit) = self.fit {
            config.fit = fit;
        }
        if let Some(dark) = self.dark {
            config.dark = dark;
        }
        if let Some(force) = self.force {
            config.force = force;
        }
        if let Some(dual) = self.dual {
            config.dual = dual;
        }
        if let Some(scale) = self.scale {
            config.scale = scale;
        }
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let args = Args::parse();
    if !args.file.is_file() {
        return Err(anyhow!("file not found: {}", args.file.display()));
    }

    let project_dirs = ProjectDirs::from("net", "termdoc", "termdoc")
        .ok_or_else(|| anyhow!("unable to resolve platform data directories"))?;
    let _log_guard = init_logging(&project_dirs)?;

    let config_path = args
        .config
        .clone()
        .unwrap_or_else(|| project_dirs.config_dir().join("config.toml"));
    let mut config = ViewerConfig::load_or_default(&config_path)?;
    args.apply_overrides(&mut config);

    let provider = Arc::new(PdfiumRenderFactory::new()?);
    let backend = provider
        .open(&args.file)
        .await
        .with_context(|| format!("failed to open {:?}", args.file))?;
    let sampling = config.sampling;
    let document = tokio::task::spawn_blocking(move || LoadedDocument::load(backend, &sampling))
        .await?
        .with_context(|| format!("nothing to show in {:?}", args.file))?;
    info!(
        path = %document.info().path.display(),
        pages = document.pages.len(),
        "document loaded"
    );

    let mut viewer = Viewer::new(document, config);
    if let Some(page) = args.page {
        viewer.jump_to_document_page(page);
    }

    let control = match ControlChannel::create(&args.file) {
        Ok(control) => {
            info!(path = %control.path().display(), "listening for page requests");
            Some(control)
        }
        Err(err) => {
            warn!(?err, "control channel unavailable");
            None
        }
    };

    install_panic_hook();
    let exit = {
        let _terminal = TerminalGuard::new()?;
        let probe = GeometryProbe::new(viewer.config());
        EventLoop::new(viewer, probe, KittyRenderer::new(io::stdout()))
            .run(provider, control)
            .await?
    };

    Ok(match exit {
        ViewerExit::Quit => ExitCode::SUCCESS,
        ViewerExit::Back => ExitCode::from(EXIT_BACK),
    })
}

/// File-only logging: the terminal belongs to the viewer.
fn init_logging(project_dirs: &ProjectDirs) -> Result<WorkerGuard> {
    let log_dir = project_dirs.data_local_dir().join("logs");
    fs::create_dir_all(&log_dir)?;

    let file_appender = tracing_appender::rolling::never(log_dir, "termdoc.log");
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let file_layer = tracing_subscriber::fmt::layer()
        .with_ansi(false)
        .with_writer(file_writer);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .try_init()
        .map_err(|err| anyhow!(err))?;

    Ok(guard)
}
