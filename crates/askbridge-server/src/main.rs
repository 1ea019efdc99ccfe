//! askbridge — local answer-streaming broker for ChatGPT and GPT-3.

use std::path::PathBuf;
use std::sync::Arc;

use askbridge_server::{check, routes, start_broker, AppState};
use tracing::info;
use tracing_subscriber::EnvFilter;

fn resolve_data_dir() -> PathBuf {
    std::env::var("ASKBRIDGE_DATA_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let exe_dir = std::env::current_exe()
                .ok()
                .and_then(|p| p.parent().map(|p| p.to_path_buf()));
            if let Some(dir) = exe_dir {
                let parent_data = dir.join("../data");
                if parent_data.exists() {
                    return parent_data;
                }
            }
            PathBuf::from("data")
        })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args: Vec<String> = std::env::args().collect();

    // Handle CLI subcommands
    if args.len() > 1 {
        match args[1].as_str() {
            "--check" | "check" => {
                let data_dir = if args.len() > 2 {
                    PathBuf::from(&args[2])
                } else {
                    resolve_data_dir()
                };
                let report = check::check(&data_dir);
                check::print_report(&report);
                std::process::exit(if report.is_ok() { 0 } else { 1 });
            }
            "--help" | "-h" | "help" => {
                println!("askbridge — answer-streaming broker for ChatGPT and GPT-3");
                println!();
                println!("Usage: askbridge [command]");
                println!();
                println!("Commands:");
                println!("  (none)                   Start the server");
                println!("  check [data-dir]         Show the configured provider selection");
                println!("  help                     Show this help message");
                return Ok(());
            }
            _ => {
                eprintln!("Unknown command: {}. Use 'askbridge help' for usage.", args[1]);
                std::process::exit(1);
            }
        }
    }

    // Normal server startup
    let data_dir = resolve_data_dir();

    info!("Data directory: {}", data_dir.display());

    let config = askbridge_core::BridgeConfig::from_env(&data_dir)?;
    info!(
        "Backends: chatgpt={}, openai={}",
        config.endpoints.chatgpt_base_url, config.endpoints.openai_base_url
    );

    let broker = start_broker(&config);
    let addr = config.bind_addr();

    let state = Arc::new(AppState::new(config, broker.client()));
    let app = routes::build_router(state);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("askbridge listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("Failed to listen for shutdown signal: {}", e);
                std::future::pending::<()>().await;
            }
            info!("Shutting down");
            // Stopping the broker disconnects every port, which closes the
            // open sockets so the server can drain.
            broker.shutdown().await;
        })
        .await?;

    info!("askbridge stopped");
    Ok(())
}
