use std::path::PathBuf;
use std::sync::Arc;

use chrono::Utc;
use market_context::MacroSignals;
use signal_core::{EngineConfig, EngineError};
use signal_orchestrator::snapshot::write_snapshot;
use signal_orchestrator::universe::Universe;
use signal_orchestrator::Orchestrator;
use tokio_util::sync::CancellationToken;

mod file_source;
mod report;

use file_source::FilePriceSource;

const EXIT_CONFIG_ERROR: i32 = 1;
const EXIT_EMPTY_UNIVERSE: i32 = 2;
const EXIT_CANCELLED: i32 = 3;
const EXIT_INTERNAL: i32 = 4;

fn env_path(var: &str, default: &str) -> PathBuf {
    std::env::var(var).map(PathBuf::from).unwrap_or_else(|_| PathBuf::from(default))
}

fn macro_signals_from_env() -> MacroSignals {
    let mut signals = MacroSignals::default();
    if let Ok(v) = std::env::var("ENGINE_YIELD_CURVE") {
        if let Ok(parsed) = v.parse() {
            signals.yield_curve_spread = parsed;
        }
    }
    if let Ok(v) = std::env::var("ENGINE_CREDIT_SPREAD") {
        if let Ok(parsed) = v.parse() {
            signals.credit_spread = parsed;
        }
    }
    signals
}

#[tokio::main]
async fn main() {
    // 1. Load .env, init tracing
    dotenvy::dotenv().ok();

    let json_logging = std::env::var("RUST_LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);
    if json_logging {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
            )
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
            )
            .init();
    }

    std::panic::set_hook(Box::new(|info| {
        eprintln!("PANIC: {info}");
        tracing::error!("PANIC: {info}");
    }));

    // 2. Configuration: first CLI argument or ENGINE_CONFIG, validated
    // before any work starts.
    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| env_path("ENGINE_CONFIG", "config/engine.toml"));

    let config = if config_path.exists() {
        match EngineConfig::from_file(&config_path) {
            Ok(config) => config,
            Err(e) => {
                tracing::error!("configuration error: {e}");
                std::process::exit(EXIT_CONFIG_ERROR);
            }
        }
    } else {
        tracing::info!(
            "no config file at {}, using defaults",
            config_path.display()
        );
        let mut config = EngineConfig::default();
        config.apply_env_overrides();
        config
    };
    if let Err(e) = config.validate() {
        tracing::error!("configuration error: {e}");
        std::process::exit(EXIT_CONFIG_ERROR);
    }

    // 3. Universe
    let universe_path = env_path("ENGINE_UNIVERSE", "config/universe.json");
    let universe = match Universe::from_file(&universe_path) {
        Ok(universe) => universe,
        Err(e) => {
            tracing::error!("cannot load universe: {e}");
            std::process::exit(EXIT_CONFIG_ERROR);
        }
    };
    if universe.is_empty() {
        tracing::error!("universe at {} is empty", universe_path.display());
        std::process::exit(EXIT_EMPTY_UNIVERSE);
    }
    tracing::info!(
        "universe loaded: {} instruments from {}",
        universe.len(),
        universe_path.display()
    );

    // 4. Price source and run setup
    let data_dir = env_path("ENGINE_DATA_DIR", "data");
    let source = Arc::new(FilePriceSource::new(data_dir));
    let config_digest = config.digest();
    let universe_digest = universe.digest();
    let run_log_dir = config.run_log_dir.clone();

    let orchestrator = match Orchestrator::new(config, universe, source, macro_signals_from_env()) {
        Ok(orchestrator) => orchestrator,
        Err(e) => {
            tracing::error!("{e}");
            std::process::exit(EXIT_CONFIG_ERROR);
        }
    };

    // 5. Cooperative cancellation on Ctrl-C: in-flight instruments
    // finish, ranking covers the completed subset.
    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("cancellation requested, finishing in-flight instruments");
                cancel.cancel();
            }
        });
    }

    // 6. Run
    let as_of = Utc::now();
    let outcome = match orchestrator.run(as_of, cancel).await {
        Ok(outcome) => outcome,
        Err(EngineError::Config(e)) => {
            tracing::error!("configuration error: {e}");
            std::process::exit(EXIT_CONFIG_ERROR);
        }
        Err(e) => {
            tracing::error!("run failed: {e}");
            std::process::exit(EXIT_INTERNAL);
        }
    };

    // 7. Persist the snapshot, render the report
    if let Some(dir) = run_log_dir {
        let snapshot = outcome.to_snapshot(as_of, config_digest, universe_digest);
        match write_snapshot(&dir, &snapshot) {
            Ok(path) => tracing::info!("snapshot written to {}", path.display()),
            Err(e) => tracing::warn!("could not write snapshot: {e}"),
        }
    }

    println!("{}", report::render(&outcome));

    if outcome.partial {
        std::process::exit(EXIT_CANCELLED);
    }
}
