use std::fs::File;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::layer::SubscriberExt as _;
use tracing_subscriber::util::SubscriberInitExt as _;
use tracing_subscriber::EnvFilter;

use grizzly_ls::lsp::{serve_stdio, serve_tcp, ServerOptions};

const LOG_FILE: &str = "grizzly-ls.log";

#[derive(Parser)]
#[command(name = "grizzly-ls")]
#[command(version, about = "Language server for grizzly load-test feature files")]
struct Cli {
    /// Run the server in socket mode.
    #[arg(long, conflicts_with = "stdio")]
    socket: bool,

    /// Run the server over stdio (the default).
    #[arg(long)]
    stdio: bool,

    /// Host to listen on in socket mode.
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// Port to listen on in socket mode.
    #[arg(long, default_value_t = 4444)]
    port: u16,

    /// Verbose output from the server.
    #[arg(long)]
    verbose: bool,

    /// The server runs co-located with the editor.
    #[arg(long)]
    embedded: bool,
}

fn init_logging(cli: &Cli) -> Result<()> {
    let level = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("grizzly_ls={level}")));

    // stdout carries the protocol in stdio mode, so logs go to stderr; a log
    // file is added in verbose stdio mode
    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_ansi(false);

    let file_layer = if cli.verbose && !cli.socket {
        let file = File::create(LOG_FILE)?;
        Some(
            tracing_subscriber::fmt::layer()
                .with_writer(Arc::new(file))
                .with_ansi(false),
        )
    } else {
        None
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(stderr_layer)
        .with(file_layer)
        .init();
    Ok(())
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(err) = init_logging(&cli) {
        eprintln!("failed to initialize logging: {err}");
        std::process::exit(1);
    }

    let options = ServerOptions {
        embedded: cli.embedded,
    };

    if cli.socket {
        if let Err(err) = serve_tcp(&cli.host, cli.port, options).await {
            tracing::error!("server exited with error: {err}");
            std::process::exit(1);
        }
    } else {
        serve_stdio(options).await;
    }
}
