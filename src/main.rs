use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{info, warn};

use wedding_site::config;
use wedding_site::notify::{Dispatcher, Letterhead};
use wedding_site::purchase::PurchaseWorkflow;
use wedding_site::sheets::{RegistrySheet, SheetsClient};
use wedding_site::title::{HttpTitleResolver, TitleResolver};
use wedding_site::web::{self, AppState};

#[derive(Debug, Parser)]
#[command(author, version, about)]
struct Args {
    /// Path to YAML config file
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,

    /// Listen address, overriding `app.bind`
    #[arg(long)]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .compact()
        .init();

    let args = Args::parse();
    let cfg = config::load(Some(args.config.as_path()))?;

    let sheets = Arc::new(SheetsClient::from_config(&cfg.sheets)?);
    match sheets.check_headers().await {
        Ok(mismatches) => {
            for m in mismatches {
                warn!(
                    column = m.column,
                    expected = m.expected,
                    actual = m.actual.as_deref().unwrap_or("MISSING"),
                    "sheet header does not match registry schema"
                );
            }
        }
        Err(err) => warn!(%err, "could not verify sheet headers"),
    }

    let sheet: Arc<dyn RegistrySheet> = sheets;
    let resolver: Arc<dyn TitleResolver> = Arc::new(HttpTitleResolver::from_config(&cfg.title)?);
    let dispatcher = Arc::new(Dispatcher::from_config(&cfg));
    let purchases = Arc::new(PurchaseWorkflow::new(
        sheet.clone(),
        dispatcher,
        Letterhead::from_config(&cfg),
    ));

    let app = web::build_router(AppState {
        sheet,
        resolver,
        purchases,
    });

    let bind = args.bind.unwrap_or_else(|| cfg.app.bind.clone());
    let listener = TcpListener::bind(&bind)
        .await
        .with_context(|| format!("failed to bind {bind}"))?;
    info!(addr = %listener.local_addr()?, "starting wedding site");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    info!("wedding site stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(?err, "failed to listen for shutdown signal");
    }
}
