//! The sievefs CLI: parse mount options, wire the dispatcher stack and hand
//! off to the platform mount host.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::layer::SubscriberExt as _;
use tracing_subscriber::util::SubscriberInitExt as _;
use tracing_subscriber::EnvFilter;

use sievefs::config::MountConfig;
use sievefs::dispatch::{Dispatch, Gated, Logged};
use sievefs::fs::SieveFs;
use sievefs::host;
use sievefs::options::MountOptions;

#[derive(Parser)]
#[command(name = "sievefs", about = "Pattern-routed two-backend pass-through filesystem")]
struct Cli {
    /// Mount point for the filesystem.
    mountpoint: PathBuf,
    /// Mount options, `-o key=val,key=val,...`; `root` is required.
    #[arg(short = 'o', long = "options")]
    options: Option<String>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("sievefs: {err}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let raw_options = cli.options.ok_or("at least -o root must be specified")?;
    let options = MountOptions::parse(&raw_options)?;
    let config = options.into_config(cli.mountpoint)?;

    init_tracing(&config)?;
    if !config.patterns.is_empty() {
        info!("excluded patterns: {:?}", config.patterns);
    }
    info!("using cache directory {}", config.cache_dir.display());
    tokio::fs::create_dir_all(&config.cache_dir).await?;

    let fs = SieveFs::new(config.clone())?;
    // Logging wraps the filesystem; the gate wraps both when the host is
    // allowed to deliver concurrent callbacks.
    let dispatcher: Arc<dyn Dispatch> = if config.nothreads {
        Arc::new(Logged::new(fs))
    } else {
        Arc::new(Gated::new(Logged::new(fs)))
    };

    host::mount(dispatcher, &config).await?;
    Ok(())
}

/// A log-file writer sharable across subscriber workers.
struct LogFile(Arc<std::fs::File>);

impl std::io::Write for LogFile {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        (&*self.0).write(buf)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        (&*self.0).flush()
    }
}

fn init_tracing(config: &MountConfig) -> Result<(), Box<dyn std::error::Error>> {
    let default_directive = if config.debug || config.fusedebug {
        "sievefs=debug"
    } else {
        "sievefs=info"
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive));

    // Syslog output is not wired on this build; fall back to the console so
    // the messages still land somewhere.
    let console = config.log_in_console || config.debug || config.log_in_syslog;
    let console_layer =
        console.then(|| tracing_subscriber::fmt::layer().with_writer(std::io::stderr));

    let file_layer = match &config.log_in_file {
        Some(path) => {
            let file = std::fs::OpenOptions::new().create(true).append(true).open(path)?;
            let file = Arc::new(file);
            Some(
                tracing_subscriber::fmt::layer()
                    .with_ansi(false)
                    .with_writer(move || LogFile(file.clone())),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(console_layer)
        .with(file_layer)
        .init();

    if config.log_in_syslog {
        warn!("syslog output is not available on this build; logging to console");
    }
    Ok(())
}
