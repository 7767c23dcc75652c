pub mod api;
pub mod ingest;
pub mod render;
pub mod results;
pub mod settings;
pub mod translate;
pub mod utils;
pub mod viewer;

use std::{path::PathBuf, sync::Arc};

use anyhow::{bail, Context, Result};
use clap::{ArgAction, Args, Parser, Subcommand};

use api::{ApiClient, HttpTransport};
use render::{ConsoleRenderer, RenderOptions};
use settings::{ClientSettings, SettingsStore};
use translate::{EventEmitter, TranslatorController};

pub(crate) struct AppState {
    pub(crate) translator: TranslatorController,
    pub(crate) settings: SettingsStore,
    /// Stored settings with environment and flag overrides applied.
    pub(crate) effective: ClientSettings,
}

#[derive(Parser, Debug)]
#[command(
    name = "manga-translator",
    version,
    about = "Translate manga pages and galleries through a remote translation API"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,
    /// Base URL of the translation API (overrides settings and MANGA_TRANSLATOR_API_URL)
    #[arg(long, global = true)]
    api_url: Option<String>,
    /// Settings file (default: ./manga-translator.json)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Skip the session handshake and token header
    #[arg(long, global = true, action = ArgAction::SetTrue)]
    no_session: bool,
    /// Attempts per request, including the first
    #[arg(long, global = true)]
    retries: Option<u32>,
    /// Per-attempt request timeout in seconds
    #[arg(long, global = true)]
    timeout_secs: Option<u64>,
    /// Print events as JSON lines
    #[arg(long, global = true, action = ArgAction::SetTrue)]
    json: bool,
    /// Directory for translated pages and manifest.json
    #[arg(long, global = true)]
    out: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Translate local image files one after another
    Upload(UploadArgs),
    /// Stream a whole gallery through the translator
    Gallery(GalleryArgs),
    /// Check that the API is reachable
    Health,
    /// Print the effective settings
    Config(ConfigArgs),
}

#[derive(Args, Debug)]
struct UploadArgs {
    /// Image files, processed in the given order
    #[arg(required = true)]
    files: Vec<PathBuf>,
}

#[derive(Args, Debug)]
struct GalleryArgs {
    /// Gallery URL
    url: String,
    /// Page selection such as "1-5,8" (default from settings, usually "all")
    #[arg(long)]
    pages: Option<String>,
}

#[derive(Args, Debug)]
struct ConfigArgs {
    /// Write the effective settings back to the settings file
    #[arg(long, action = ArgAction::SetTrue)]
    save: bool,
}

impl Cli {
    fn apply_overrides(&self, settings: &mut ClientSettings) {
        if let Some(url) = &self.api_url {
            settings.api_base_url = url.trim().to_string();
        }
        if self.no_session {
            settings.session.enabled = false;
        }
        if let Some(retries) = self.retries {
            settings.retry.max_attempts = retries.max(1);
        }
        if let Some(timeout) = self.timeout_secs {
            settings.request_timeout_secs = timeout;
        }
    }
}

pub fn run() -> Result<()> {
    utils::logging::init_logging();
    let cli = Cli::parse();

    log::info!("manga-translator starting up...");

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to start the async runtime")?;
    runtime.block_on(execute(cli))
}

async fn execute(cli: Cli) -> Result<()> {
    let settings_path = cli.config.clone().unwrap_or_else(SettingsStore::default_path);
    let store = SettingsStore::new(settings_path)?;
    let mut settings = store.settings().with_env_overrides();
    cli.apply_overrides(&mut settings);

    let transport = Arc::new(HttpTransport::new()?);
    let client = ApiClient::new(&settings, transport);
    let translator = TranslatorController::new(client, &settings, EventEmitter::new());
    let state = AppState {
        translator,
        settings: store,
        effective: settings,
    };

    let renderer = ConsoleRenderer::new(
        std::io::stdout(),
        RenderOptions {
            json: cli.json,
            out_dir: cli.out.clone(),
        },
    );
    let render_task = tokio::spawn(renderer.run(
        state.translator.events().subscribe(),
        state.translator.client().status().subscribe(),
    ));

    let outcome = dispatch(&state, &cli.command).await;

    // The renderer exits once the last event sender is gone.
    drop(state);
    let report = render_task.await.context("Renderer task failed")??;
    log::info!(
        "rendered {} events, saved {} files",
        report.events,
        report.saved_files
    );
    outcome
}

async fn dispatch(state: &AppState, command: &Commands) -> Result<()> {
    log::debug!("using API at {}", state.translator.client().base_url());
    match command {
        Commands::Upload(args) => {
            let summary = state.translator.upload_batch(&args.files).await?;
            if summary.succeeded == 0 {
                bail!("none of the {} files could be translated", summary.attempted);
            }
        }
        Commands::Gallery(args) => {
            let summary = state
                .translator
                .translate_gallery(&args.url, args.pages.as_deref())
                .await?;
            if summary.interrupted {
                bail!(
                    "connection lost after {} pages; results so far were kept",
                    summary.results
                );
            }
        }
        Commands::Health => {
            let report = state.translator.health_check().await;
            println!("{}", serde_json::to_string_pretty(&report)?);
            if !report.alive {
                bail!("API at {} is not reachable", report.endpoint);
            }
        }
        Commands::Config(args) => {
            println!("{}", serde_json::to_string_pretty(&state.effective)?);
            if args.save {
                state.settings.update(state.effective.clone())?;
            }
        }
    }
    Ok(())
}
