//! SDK Test Harness CLI
//!
//! Serves one mock endpoint described by a YAML file, validating every
//! request it receives, until interrupted. Useful for pointing a real SDK
//! or curl at the harness by hand.

use std::path::PathBuf;
use std::str::FromStr;

use anyhow::{bail, Context};
use clap::Parser;
use tokio::signal;
use tracing::{error, info, Level};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use sdktest_core::{EncodingMode, HarnessConfig, HarnessError, LoggingConfig, MockHarness};

/// Standalone SDK test harness endpoint.
#[derive(Parser, Debug)]
#[command(name = "sdktest", version, about)]
struct Args {
    /// Harness YAML file.
    #[arg(short, long, default_value = "harness.yaml")]
    config: PathBuf,

    /// Socket address to bind instead of the configured one.
    #[arg(long)]
    listen: Option<String>,

    /// Route to serve instead of the configured one.
    #[arg(long)]
    uri: Option<String>,

    /// Request encoding to expect instead of the configured one.
    #[arg(long, value_parser = EncodingMode::from_str)]
    mode: Option<EncodingMode>,

    /// Raise log verbosity; repeat for more.
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

impl Args {
    /// Layer command-line overrides on top of the file config.
    fn apply(&self, config: &mut HarnessConfig) -> anyhow::Result<()> {
        if let Some(listen) = &self.listen {
            config.listen.clone_from(listen);
        }
        if let Some(uri) = &self.uri {
            config.uri.clone_from(uri);
        }
        if let Some(mode) = self.mode {
            config.resp_type = mode;
        }
        config.validate()?;
        Ok(())
    }
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut config = HarnessConfig::from_file(&args.config)
        .with_context(|| format!("loading {}", args.config.display()))?;
    args.apply(&mut config)?;

    init_tracing(log_level(&config.logging, args.verbose), config.logging.json);

    info!(
        version = env!("CARGO_PKG_VERSION"),
        listen = %config.listen,
        uri = %config.uri,
        mode = %config.resp_type,
        "starting sdk test harness"
    );

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(run_harness(config))
}

/// `-v` raises the configured level to at least debug, `-vv` to trace.
fn log_level(logging: &LoggingConfig, verbose: u8) -> Level {
    let configured = match logging.level.to_ascii_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };
    match verbose {
        0 => configured,
        1 if configured < Level::DEBUG => Level::DEBUG,
        1 => configured,
        _ => Level::TRACE,
    }
}

fn init_tracing(level: Level, json: bool) {
    let filter = EnvFilter::from_default_env().add_directive(level.into());
    let registry = tracing_subscriber::registry().with(filter);

    if json {
        registry.with(fmt::layer().json()).init();
    } else {
        registry.with(fmt::layer().with_target(false)).init();
    }
}

async fn run_harness(config: HarnessConfig) -> anyhow::Result<()> {
    let mut harness = MockHarness::start(config).await?;

    info!(endpoint = %harness.endpoint_url(), "harness ready");
    println!("{}", harness.endpoint_url());

    shutdown_signal().await;
    info!("shutdown signal received, closing harness");

    let requests = harness.received_requests().await.len();
    match harness.close() {
        Ok(()) => {
            info!(requests, "all requests matched");
            Ok(())
        }
        Err(HarnessError::Failed(report)) => {
            for failure in &report.failures {
                error!(%failure, "validation failure");
            }
            bail!("{report}")
        }
        Err(e) => Err(e.into()),
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "failed to listen for ctrl+c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
}
