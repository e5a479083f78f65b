#![cfg_attr(not(test), deny(clippy::unwrap_used))]
use std::io::Write;

use rbkv::cli;
use rbkv::config::StoreConfig;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "rbkv=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let matches = cli::command().get_matches();

    // Load configuration from environment variables
    let config = match StoreConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("rbkv: failed to load configuration: {e}");
            std::process::exit(cli::exit_code::SETUP);
        }
    };

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    let code = match cli::run(&matches, &config, &mut out) {
        Ok(()) => cli::exit_code::SUCCESS,
        Err(e) => {
            tracing::debug!(error = ?e, "command failed");
            eprintln!("rbkv: {e}");
            e.exit_code()
        }
    };

    if let Err(e) = out.flush() {
        eprintln!("rbkv: cannot write output: {e}");
        std::process::exit(cli::exit_code::SETUP);
    }
    std::process::exit(code);
}
