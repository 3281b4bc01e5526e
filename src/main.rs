//! Binary entrypoint for the Meshai CLI.
//!
//! Commands:
//! - `start` - run the bot with the JSON-lines console transport on stdin/stdout
//! - `init` - write a starter `config.toml`
//! - `status` - print the configuration summary and stored sessions
//!
//! Exit status is 1 when the bot stops because the radio link was lost.
use anyhow::Result;
use clap::{Parser, Subcommand};
use log::{info, warn};
use std::sync::Arc;

use meshai::bot::{BotContext, EventRouter, RouterExit};
use meshai::config::Config;
use meshai::logutil::redact_secret;
use meshai::mesh::console::ConsoleTransport;
use meshai::provider;
use meshai::storage::SessionStore;

#[derive(Parser)]
#[command(name = "meshai")]
#[command(about = "A conversational assistant for mesh radio networks")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path (can be used before or after subcommand)
    #[arg(short, long, default_value = "config.toml", global = true)]
    config: String,

    /// Verbose logging (-v, -vv for more; may appear before or after subcommand)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the bot
    Start,
    /// Write a default configuration file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
    /// Show configuration and stored sessions
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Start => {
            let config = Config::load(&cli.config).await?;
            init_logging(&Some(config.clone()), cli.verbose);
            info!("Starting Meshai v{}", env!("CARGO_PKG_VERSION"));

            let provider = provider::from_config(&config)?;
            let defaults = config.provider_defaults();
            if defaults.api_key.is_empty() {
                warn!("No default API key configured; users must /set one before /ask");
            }
            let store = SessionStore::load(
                &config.storage.store_file,
                defaults,
                provider,
                config.bot.reply_max_chars,
            )
            .await?;

            let transport = Arc::new(ConsoleTransport::new());
            let ctx = BotContext::new(&config, Arc::new(store), transport);
            let (router, events) = EventRouter::new(ctx, config.transport.event_queue_capacity);
            ConsoleTransport::spawn_reader(events)?;

            match router.with_signal_handling().run().await {
                RouterExit::ConnectionLost(outcome) => {
                    warn!("Exiting after connection loss ({:?})", outcome);
                    std::process::exit(1);
                }
                RouterExit::QueueClosed | RouterExit::Interrupted => info!("Meshai stopped"),
            }
        }
        Commands::Init { force } => {
            init_logging(&None, cli.verbose);
            if !force && tokio::fs::try_exists(&cli.config).await.unwrap_or(false) {
                warn!("{} already exists; use --force to overwrite", cli.config);
                return Ok(());
            }
            Config::create_default(&cli.config).await?;
            info!("Configuration file created at {}", cli.config);
        }
        Commands::Status => {
            let config = Config::load(&cli.config).await?;
            init_logging(&Some(config.clone()), cli.verbose);
            let defaults = config.provider_defaults();
            println!("Meshai v{}", env!("CARGO_PKG_VERSION"));
            println!("Provider: {:?}", config.provider.kind);
            println!("  model:    {}", defaults.model);
            println!("  endpoint: {}", defaults.base_url);
            println!("  api key:  {}", redact_secret(&defaults.api_key));
            println!(
                "Replies: {} chars max, {} byte slices every {} ms",
                config.bot.reply_max_chars, config.transport.max_chunk_bytes, config.transport.chunk_gap_ms
            );
            // Read-only: a legacy file is reported, not migrated.
            let (sessions, legacy) = SessionStore::inspect(&config.storage.store_file).await?;
            println!("Sessions in {}: {}", config.storage.store_file, sessions.len());
            for (user, turns) in sessions {
                println!("  {:<12} {} turns", user, turns);
            }
            if legacy > 0 {
                println!("  ({} in the old history-only layout; rewritten on next start)", legacy);
            }
        }
    }

    Ok(())
}

fn init_logging(config: &Option<Config>, verbosity: u8) {
    use std::io::Write;
    let mut builder = env_logger::Builder::new();
    // CLI verbosity overrides the configured level
    let base_level = match verbosity {
        0 => config
            .as_ref()
            .and_then(|c| c.logging.level.parse().ok())
            .unwrap_or(log::LevelFilter::Info),
        1 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };
    builder.filter_level(base_level);

    let log_file = config.as_ref().and_then(|cfg| cfg.logging.file.as_ref()).and_then(|file| {
        std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(file)
            .ok()
    });

    if let Some(f) = log_file {
        let write_mutex = std::sync::Arc::new(std::sync::Mutex::new(f));
        // stdout carries transport output, so the console copy goes to stderr
        let is_tty = atty::is(atty::Stream::Stderr);
        builder.format(move |fmt, record| {
            let ts = chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ");
            let line = format!("{} [{}] {}", ts, record.level(), record.args());
            if let Ok(mut guard) = write_mutex.lock() {
                let _ = writeln!(guard, "{}", line);
            }
            if is_tty {
                writeln!(fmt, "{}", line)
            } else {
                Ok(())
            }
        });
    } else {
        builder.format(|fmt, record| {
            writeln!(
                fmt,
                "{} [{}] {}",
                chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ"),
                record.level(),
                record.args()
            )
        });
    }
    builder.target(env_logger::Target::Stderr);
    let _ = builder.try_init();
}
