use std::io::Read;
use std::sync::Arc;

use clap::Parser;
use color_eyre::eyre::{Result, WrapErr};
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use readmark::application::dto::parse_script;
use readmark::application::use_cases::EntityStore;
use readmark::infrastructure::{
    AppConfig, CliArgs, MemoryMessageCache, StorageManager, TomlReadPositionStore,
};
use readmark::presentation::ReplayRunner;

fn init_logging(config: &AppConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_level.to_string()));

    if let Some(log_path) = config.effective_log_path() {
        if let Some(parent) = log_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_path)?;

        let file_layer = fmt::layer()
            .with_writer(file)
            .with_ansi(false)
            .with_target(true)
            .with_thread_ids(false);

        tracing_subscriber::registry()
            .with(filter)
            .with(file_layer)
            .init();

        info!(path = %log_path.display(), "Logging initialized");
    } else {
        tracing_subscriber::registry().with(filter).init();
    }

    Ok(())
}

async fn read_script(args: &CliArgs) -> Result<String> {
    match &args.script {
        Some(path) => tokio::fs::read_to_string(path)
            .await
            .wrap_err_with(|| format!("Failed to read script {}", path.display())),
        None => {
            let mut input = String::new();
            std::io::stdin()
                .read_to_string(&mut input)
                .wrap_err("Failed to read script from stdin")?;
            Ok(input)
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let args = CliArgs::parse();

    let mut storage = StorageManager::new()?;
    if let Some(data_dir) = &args.data_dir {
        storage = storage.with_data_dir(data_dir.clone());
    }
    let mut config = storage
        .load_config(args.config.as_deref())
        .wrap_err("Failed to load configuration")?;
    config.merge_with_args(&args);

    init_logging(&config)?;

    info!(version = readmark::VERSION, "Starting {}", readmark::NAME);

    let script = read_script(&args).await?;
    let events = parse_script(&script).wrap_err("Invalid script")?;

    let positions = TomlReadPositionStore::open(Arc::new(storage))
        .wrap_err("Failed to open read positions")?;
    let store = EntityStore::new(
        Arc::new(MemoryMessageCache::with_default_capacity()),
        Arc::new(positions),
        config.store_settings(),
    );

    let mut runner = ReplayRunner::new(
        store,
        config.tracker_config(),
        args.viewport_rows,
        std::io::stdout(),
    );
    let stats = runner.run(events).await?;

    info!(
        events = stats.events,
        failures = stats.failures,
        notifications = stats.notifications,
        seen_reports = stats.seen_reports,
        "Replay finished"
    );
    Ok(())
}
