//! Download flags with the configured strategy
//!
//! ```bash
//! cargo run --example flags -- -s DELAY b
//! cargo run --example flags -- --strategy thread-pool -m 10 -e -l 50
//! cargo run --example flags -- --config flags.json -v CN BR
//! RUST_LOG=flag_fetch=debug cargo run --example flags
//! ```
//!
//! Without options the local mirror, the cooperative strategy and the 20 most
//! populous countries are used. Options override a `--config` file.

use clap::{Parser, ValueEnum};
use flag_fetch::{
    BarProgress, Config, Orchestrator, ServerPreset, Strategy, cancel_on_signal, codes,
    initial_report,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "flags")]
#[command(about = "Download flags for country codes", long_about = None)]
struct Args {
    /// Country codes: A to Z expands to that letter's 26 codes, AA to ZZ is literal
    #[arg(value_name = "CC")]
    codes: Vec<String>,

    /// JSON configuration file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Server to download from
    #[arg(short, long, ignore_case = true)]
    server: Option<ServerArg>,

    /// Scheduling strategy
    #[arg(long)]
    strategy: Option<StrategyArg>,

    /// Maximum concurrent requests
    #[arg(short = 'm', long = "max-req", value_parser = clap::value_parser!(u64).range(1..))]
    max_req: Option<u64>,

    /// Limit to the first N codes
    #[arg(short, long)]
    limit: Option<usize>,

    /// Get every code listed in this file
    #[arg(short = 'a', long = "all", value_name = "FILE")]
    all_from: Option<PathBuf>,

    /// Get every code from AA to ZZ
    #[arg(short, long, default_value_t = false)]
    every: bool,

    /// Print one line per flag instead of a progress bar
    #[arg(short, long, default_value_t = false)]
    verbose: bool,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum ServerArg {
    Remote,
    Local,
    Delay,
    Error,
}

impl From<ServerArg> for ServerPreset {
    fn from(arg: ServerArg) -> Self {
        match arg {
            ServerArg::Remote => ServerPreset::Remote,
            ServerArg::Local => ServerPreset::Local,
            ServerArg::Delay => ServerPreset::Delay,
            ServerArg::Error => ServerPreset::Error,
        }
    }
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum StrategyArg {
    Serial,
    ThreadPool,
    Cooperative,
}

impl From<StrategyArg> for Strategy {
    fn from(arg: StrategyArg) -> Self {
        match arg {
            StrategyArg::Serial => Strategy::Serial,
            StrategyArg::ThreadPool => Strategy::ThreadPool,
            StrategyArg::Cooperative => Strategy::Cooperative,
        }
    }
}

impl Args {
    /// Start from the config file, then apply command-line overrides
    fn into_config(self) -> flag_fetch::Result<Config> {
        let mut config = match &self.config {
            Some(path) => Config::from_json_file(path)?,
            None => Config::default(),
        };

        if let Some(server) = self.server {
            config.source.server = server.into();
            config.source.base_url = None;
        }
        if let Some(strategy) = self.strategy {
            config.concurrency.strategy = strategy.into();
        }
        if let Some(max_req) = self.max_req {
            config.concurrency.max_concurrency = Some(max_req as usize);
        }
        if self.limit.is_some() {
            config.selection.limit = self.limit;
        }
        if self.all_from.is_some() {
            config.selection.all_from = self.all_from;
        }
        config.selection.every |= self.every;
        config.output.verbose |= self.verbose;
        if !self.codes.is_empty() {
            config.selection.codes = self.codes;
        }

        config.validate()?;
        Ok(config)
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = Args::parse().into_config()?;

    // Info lines would tear the progress bar
    let default_filter = if config.output.verbose {
        "flag_fetch=info"
    } else {
        "flag_fetch=warn"
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    // Cooperative tasks share one thread; the other strategies bring their own
    let runtime = match config.concurrency.strategy {
        Strategy::Cooperative => tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?,
        Strategy::Serial | Strategy::ThreadPool => tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()?,
    };

    runtime.block_on(async {
        let items = codes::select(&config.selection)?;
        let mut orchestrator = Orchestrator::from_config(&config)?;
        if !config.output.verbose {
            orchestrator = orchestrator.with_progress(Arc::new(BarProgress::new()));
        }

        println!(
            "{}",
            initial_report(
                config.server_label(),
                config.base_url()?.as_str(),
                &items,
                orchestrator.concurrency_for(items.len()),
            )
        );

        let signals = cancel_on_signal(orchestrator.cancel_token());
        let result = orchestrator.run(items).await;
        signals.abort();

        match result {
            Ok(report) => println!("{report}"),
            Err(e) => {
                if let Some(report) = e.partial_report() {
                    println!("{report}");
                }
                return Err(e.into());
            }
        }
        Ok::<_, Box<dyn std::error::Error>>(())
    })
}
