use std::io::BufRead;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tokio::sync::mpsc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use krishi_advisor::app::{AppEvent, Controller, Services, StartOptions};
use krishi_advisor::clipboard::SystemClipboard;
use krishi_advisor::config::Config;
use krishi_advisor::i18n::Catalog;
use krishi_advisor::location::{ConfiguredPosition, IpApi, IpWho, LocationResolver};
use krishi_advisor::playback::{CommandAudioSink, CommandSpeechEngine};
use krishi_advisor::service::{http_client, AdvisoryBackend, HttpBackend};
use krishi_advisor::storage::{FileStore, KeyValueStore, MemoryStore};
use krishi_advisor::terminal::{parse_command, Command, TerminalView};

#[derive(Parser, Debug)]
#[command(name = "krishi-advisor", version, about = "Crop advisory client for the KrishiGPT backend")]
struct Args {
    /// Configuration file (defaults to ./krishi.toml if present)
    #[arg(short, long)]
    config: Option<String>,

    /// Backend base URL, overriding the configuration
    #[arg(long)]
    backend: Option<String>,

    /// Interface language code
    #[arg(long)]
    lang: Option<String>,

    /// Forget the saved form and last answer
    #[arg(long)]
    fresh: bool,
}

/// Forwards stdin lines as events. Runs on its own thread so a pending read
/// never holds up shutdown.
fn spawn_input(tx: mpsc::UnboundedSender<AppEvent>) {
    std::thread::spawn(move || {
        for line in std::io::stdin().lock().lines() {
            let line = match line {
                Ok(line) => line,
                Err(e) => {
                    tracing::warn!("Failed to read input: {}", e);
                    break;
                }
            };
            match parse_command(&line) {
                None => {}
                Some(Command::Unknown(input)) => println!("Unknown command: {} (type 'help')", input),
                Some(Command::Event(event)) => {
                    let quit = matches!(event, AppEvent::Quit);
                    if tx.send(event).is_err() || quit {
                        return;
                    }
                }
            }
        }
        let _ = tx.send(AppEvent::Quit);
    });
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "krishi_advisor=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = Args::parse();
    let mut config = Config::load(args.config.as_deref())?;
    if let Some(backend) = args.backend {
        config.backend.base_url = backend;
    }

    tracing::info!("Starting krishi-advisor against {}", config.backend.base_url);

    let client = Arc::new(http_client()?);
    let backend: Arc<dyn AdvisoryBackend> = Arc::new(HttpBackend::new(Arc::clone(&client), &config.backend.base_url));
    let resolver = LocationResolver::new(
        Arc::new(ConfiguredPosition::new(config.geolocation.device_position())),
        Arc::new(IpApi::new(Arc::clone(&client), &config.geolocation.ipapi_url)),
        Arc::new(IpWho::new(Arc::clone(&client), &config.geolocation.ipwho_url)),
    );
    let store: Arc<dyn KeyValueStore> = match &config.storage.path {
        Some(path) => Arc::new(FileStore::open(path.clone())),
        None => Arc::new(MemoryStore::default()),
    };

    let services = Services {
        backend,
        resolver: Arc::new(resolver),
        store,
        engine: Arc::new(CommandSpeechEngine::new(
            config.speech.voice_command.clone(),
            &config.speech.voices,
        )),
        sink: Arc::new(CommandAudioSink::new(
            &config.speech.player_command,
            &config.speech.player_args,
        )),
        recognizer: None,
        clipboard: Arc::new(SystemClipboard::spawn()),
        catalog: Arc::new(Catalog::embedded()),
    };

    let (tx, rx) = mpsc::unbounded_channel();
    let mut controller = Controller::new(services, TerminalView::new(std::io::stdout()), tx.clone());
    controller.start(StartOptions {
        fresh: args.fresh,
        default_language: config.ui.language.clone(),
        language_override: args.lang,
    });
    println!("Type 'help' for commands.");

    spawn_input(tx);
    controller.run(rx).await;

    tracing::info!("Shutdown complete");
    Ok(())
}
