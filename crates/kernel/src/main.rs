//! Sieve command-line driver.
//!
//! Compiles one set of request parameters and prints the query descriptor.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::debug;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use sieve_kernel::config::{CONFIG_ENV, Config};
use sieve_kernel::query::RawParams;

/// Compile request parameters into a query descriptor.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Compiler settings file (TOML, or JSON when it ends in .json)
    #[arg(short, long, env = CONFIG_ENV)]
    config: Option<PathBuf>,

    /// Treat INPUT as a JSON object of parameters instead of a query string
    #[arg(long)]
    json: bool,

    /// Pretty-print the descriptor
    #[arg(long)]
    pretty: bool,

    /// Request parameters, e.g. "page=2&price=<>10|20&sort=-id"
    input: String,
}

fn main() -> Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    init_tracing();

    let args = Args::parse();

    let config = Config {
        settings_path: args.config,
    };
    let compiler = config
        .load_settings()?
        .into_compiler()
        .context("invalid compiler settings")?;
    debug!(whitelist = ?compiler.whitelist(), "compiler ready");

    let params = if args.json {
        serde_json::from_str::<RawParams>(&args.input)
            .context("INPUT must be a JSON object of parameters")?
    } else {
        RawParams::from_query_string(&args.input)
    };

    let descriptor = compiler
        .compile(&params)
        .context("failed to compile parameters")?;

    let output = if args.pretty {
        serde_json::to_string_pretty(&descriptor)?
    } else {
        serde_json::to_string(&descriptor)?
    };
    println!("{output}");

    Ok(())
}

/// Initialize the tracing subscriber; logs go to stderr.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}
