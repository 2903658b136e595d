#[cfg(feature = "http_api")]
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    use std::sync::Arc;

    use schedule_board::{Config, Dashboard, build_backend, http_api, telemetry};
    use tracing::{info, warn};

    let config = Config::from_env()?;
    telemetry::init_tracing(&config.log_filter, config.log_json);

    let backend = build_backend(&config)?;
    let dashboard = Arc::new(Dashboard::new(backend, &config));
    match dashboard.initialize().await {
        Ok(outcome) => info!(?outcome, "Initial schedule loaded"),
        Err(err) => warn!(error = %err, "Initial schedule load failed; serving an empty board"),
    }

    println!("schedule-board HTTP API listening on http://{}", config.http_addr);
    http_api::serve(config.http_addr, dashboard).await?;
    Ok(())
}

#[cfg(not(feature = "http_api"))]
fn main() {
    eprintln!("Rebuild with the `http_api` feature to enable the HTTP server.");
}
