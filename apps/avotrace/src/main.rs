//! # avotrace - Lot Traceability Server
//!
//! The main binary for avotrace.
//!
//! This application provides:
//! - HTTP REST API server (axum-based)
//! - CLI interface for lots, personnel, quality and documents
//! - Sync with a shared server for offline clients
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                    apps/avotrace (THE BINARY)                   │
//! │                                                                 │
//! │  ┌─────────────┐    ┌─────────────┐    ┌──────────────────┐   │
//! │  │   CLI       │    │   HTTP API  │    │  Remote client   │   │
//! │  │  (clap)     │    │   (axum)    │    │  (reqwest)       │   │
//! │  └──────┬──────┘    └──────┬──────┘    └────────┬─────────┘   │
//! │         │                  │                    │              │
//! │         └──────────────────┼────────────────────┘              │
//! │                            ▼                                   │
//! │                    ┌───────────────┐                           │
//! │                    │ avotrace-core │                           │
//! │                    │ (THE LOGIC)   │                           │
//! │                    └───────────────┘                           │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```bash
//! # Start the HTTP server
//! avotrace server --host 0.0.0.0 --port 8080
//!
//! # CLI operations
//! avotrace lot create L-2026-001
//! avotrace lot advance <id> -f harvest.json
//! avotrace sync --remote http://hub:8080
//! ```

use avotrace::cli;
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

// =============================================================================
// APPLICATION ENTRY POINT
// =============================================================================

#[tokio::main]
async fn main() {
    let cli = cli::Cli::parse();

    // AVOTRACE_LOG_FORMAT=json enables machine-parseable output.
    let log_format = std::env::var("AVOTRACE_LOG_FORMAT").unwrap_or_else(|_| "text".to_string());

    let default_filter = if cli.verbose {
        "avotrace=debug,avotrace_core=debug,tower_http=debug"
    } else {
        "avotrace=info,avotrace_core=info,tower_http=debug"
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| default_filter.into());

    match log_format.as_str() {
        "json" => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer())
                .init();
        }
    }

    if !cli.quiet && !cli.json_mode {
        print_banner();
    }

    if let Err(e) = cli::execute(cli).await {
        tracing::error!("Error: {}", e);
        std::process::exit(1);
    }
}

/// Print the startup banner.
fn print_banner() {
    println!(
        r#"
   __ ___   _____ | |_ _ __ __ _  ___ ___
  / _` \ \ / / _ \| __| '__/ _` |/ __/ _ \
 | (_| |\ V / (_) | |_| | | (_| | (_|  __/
  \__,_| \_/ \___/ \__|_|  \__,_|\___\___|

  Lot traceability v{}
"#,
        env!("CARGO_PKG_VERSION")
    );
}
