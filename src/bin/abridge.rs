//! abridge: summarize or mindmap a text file from the command line.

use std::io::{self, IsTerminal, Read};
use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use tracing::info;

use abridge::{Config, GenerationFailure, GenerationRequest, Payload};

/// Abridge CLI
#[derive(Parser)]
#[command(name = "abridge")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Summaries and mindmaps of documents via a rate-limited, budgeted client")]
struct Args {
    /// Path to configuration file.
    #[arg(short, long, env = "ABRIDGE_CONFIG")]
    config: Option<PathBuf>,

    /// Log output format.
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, Copy, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Command {
    /// Summarize a document as bullet points
    Summarize {
        /// Text file (or omit to read from stdin)
        file: Option<PathBuf>,
    },

    /// Generate a mindmap of a document as JSON
    Mindmap {
        /// Text file (or omit to read from stdin)
        file: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    init_tracing(args.log_format);

    let config = Config::load(args.config.as_deref())?;
    let client = config
        .client_builder()
        .shared_generator(config.remote_generator()?)
        .build()?;

    let request = match &args.command {
        Command::Summarize { file } => GenerationRequest::summarize(read_input(file.as_ref()).await?),
        Command::Mindmap { file } => GenerationRequest::mindmap(read_input(file.as_ref()).await?),
    };

    match client.execute(&request).await {
        Ok(generation) => {
            info!(
                attempts = generation.attempts.len(),
                cached = generation.cached,
                spent_today = %client.ledger().daily_spend(),
                "done"
            );
            match generation.output {
                Payload::Summary(summary) => println!("{}", summary.text),
                Payload::Mindmap(mindmap) => {
                    println!("{}", serde_json::to_string_pretty(&mindmap.root)?)
                }
            }
            Ok(())
        }
        Err(failure) => {
            report(&failure);
            std::process::exit(1);
        }
    }
}

fn init_tracing(format: LogFormat) {
    // Default: warn for CLI; override with RUST_LOG.
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr);
    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

async fn read_input(file: Option<&PathBuf>) -> io::Result<String> {
    match file {
        Some(path) => tokio::fs::read_to_string(path).await,
        None => {
            if io::stdin().is_terminal() {
                eprintln!("reading document from stdin (end with Ctrl-D)");
            }
            let mut buf = String::new();
            io::stdin().read_to_string(&mut buf)?;
            Ok(buf)
        }
    }
}

fn report(failure: &GenerationFailure) {
    eprintln!(
        "error [{}]: {} ({} attempt(s){})",
        failure.kind.code(),
        failure.message(),
        failure.attempts.len(),
        if failure.retryable {
            ", may succeed if retried later"
        } else {
            ""
        }
    );
}
