use clap::{Parser, Subcommand};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use trendscan::api::{start_api_server, AppState};
use trendscan::bot::BotHandler;
use trendscan::config::{AppConfig, LoggingConfig};
use trendscan::error::{Result, ScanError};
use trendscan::evaluator::{Evaluator, TrendTemplateEvaluator, YahooCandleSource};
use trendscan::notify::{CompletionNotifier, Notifier, TelegramNotifier};
use trendscan::scanner::{BatchStepper, ScanDispatcher, StartScanOutcome, StepOutcome};
use trendscan::store::{PostgresSessionStore, SessionStore};
use trendscan::universe::UniverseProvider;

#[derive(Parser)]
#[command(name = "trendscan")]
#[command(version = "0.1.0")]
#[command(about = "Resumable batched equity screener (Minervini trend template)", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Config directory path
    #[arg(short, long, default_value = "config")]
    config: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP API server
    Serve,
    /// Run one scan step and exit
    Step,
    /// Start a full universe scan
    Start {
        /// Bypass the restart cooldown
        #[arg(long)]
        force: bool,
    },
    /// Show scan progress
    Status,
    /// Evaluate symbols against the trend template
    Check {
        /// Tickers, e.g. RELIANCE TCS
        #[arg(required = true)]
        symbols: Vec<String>,
    },
    /// Abandon the running session
    Reset,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = AppConfig::load_from(&cli.config)?;
    if let Err(errors) = config.validate() {
        for e in &errors {
            eprintln!("config error: {e}");
        }
        return Err(ScanError::Internal(format!(
            "invalid configuration ({} errors)",
            errors.len()
        )));
    }

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => {
            init_logging(&config.logging);
            let runtime = Runtime::build(&config).await?;
            let state = AppState::new(
                runtime.dispatcher.clone(),
                runtime.store.clone(),
                runtime.bot.clone(),
            );
            start_api_server(state, config.server.port).await
        }
        Commands::Step => {
            init_logging(&config.logging);
            let runtime = Runtime::build(&config).await?;
            match runtime.dispatcher.continue_scan().await? {
                StepOutcome::NoActiveSession => println!("no active session"),
                StepOutcome::Stale => println!("step superseded by a newer claim"),
                StepOutcome::Committed(summary) => {
                    println!(
                        "committed {} of {} claimed; cursor {}/{}; found {} so far{}",
                        summary.processed,
                        summary.claimed,
                        summary.cursor,
                        summary.total,
                        summary.found_total,
                        if summary.completed { "; scan completed" } else { "" }
                    );
                }
            }
            Ok(())
        }
        Commands::Start { force } => {
            init_logging(&config.logging);
            let runtime = Runtime::build(&config).await?;
            match runtime.dispatcher.start_scan(force).await? {
                StartScanOutcome::Started { session_id, total } => {
                    println!("scan {session_id} started over {total} symbols");
                }
                StartScanOutcome::AlreadyRunning => println!("a scan is already running"),
                StartScanOutcome::CoolingDown { until } => {
                    println!("cooldown active; next unforced start at {until} (use --force)");
                }
            }
            Ok(())
        }
        Commands::Status => {
            init_logging_simple();
            let runtime = Runtime::build(&config).await?;
            let report = runtime.dispatcher.status().await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
            Ok(())
        }
        Commands::Check { symbols } => {
            init_logging_simple();
            // Direct evaluation, no store needed.
            let source = Arc::new(YahooCandleSource::new(&config.market_data)?);
            let evaluator = TrendTemplateEvaluator::new(source, config.screener.clone());
            let mut failures = 0;
            for symbol in symbols {
                match evaluator.evaluate(&symbol.to_uppercase()).await {
                    Ok(report) => println!("{}", serde_json::to_string_pretty(&report)?),
                    Err(err) => {
                        eprintln!("{symbol}: {err}");
                        failures += 1;
                    }
                }
            }
            if failures > 0 {
                std::process::exit(1);
            }
            Ok(())
        }
        Commands::Reset => {
            init_logging_simple();
            let runtime = Runtime::build(&config).await?;
            runtime.dispatcher.reset().await?;
            println!("running session abandoned");
            Ok(())
        }
    }
}

/// Wired-up service graph shared by every command that touches the store.
struct Runtime {
    store: Arc<dyn SessionStore>,
    dispatcher: Arc<ScanDispatcher>,
    bot: Option<Arc<BotHandler>>,
}

impl Runtime {
    async fn build(config: &AppConfig) -> Result<Self> {
        let pg =
            PostgresSessionStore::new(&config.database.url, config.database.max_connections)
                .await?;
        pg.migrate().await?;
        let store: Arc<dyn SessionStore> = Arc::new(pg);

        // Seed the subscriber registry from config; /start and /stop mutate
        // it afterwards.
        for chat_id in &config.telegram.chat_ids {
            if store.add_subscriber(chat_id).await? {
                info!(%chat_id, "Seeded subscriber from config");
            }
        }

        let source = Arc::new(YahooCandleSource::new(&config.market_data)?);
        let evaluator: Arc<dyn Evaluator> = Arc::new(TrendTemplateEvaluator::new(
            source,
            config.screener.clone(),
        ));

        let telegram = TelegramNotifier::from_config(&config.telegram);
        let completion = telegram.clone().map(|notifier| {
            let notifier: Arc<dyn Notifier> = notifier;
            Arc::new(CompletionNotifier::new(notifier, store.clone()))
        });

        let stepper = BatchStepper::new(store.clone(), evaluator.clone(), config.scan.clone());
        let universe = UniverseProvider::new(
            config.scan.universe_file.as_ref().map(Into::into),
        );
        let dispatcher = Arc::new(ScanDispatcher::new(
            store.clone(),
            stepper,
            evaluator,
            universe,
            completion,
            config.scan.clone(),
        ));

        let bot = telegram.map(|notifier| {
            let notifier: Arc<dyn Notifier> = notifier;
            Arc::new(BotHandler::new(
                dispatcher.clone(),
                store.clone(),
                Some(notifier),
            ))
        });
        if bot.is_none() {
            warn!("No Telegram bot token configured; webhook commands will be ignored");
        }

        Ok(Self {
            store,
            dispatcher,
            bot,
        })
    }
}

fn init_logging(config: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!("{},trendscan=debug,sqlx=warn", config.level))
    });

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false);

    if config.json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn init_logging_simple() {
    // Minimal logging for CLI commands
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::WARN)
        .try_init();
}
