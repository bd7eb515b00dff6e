//! Sentinel - Adaptive Trading Parameter Tuner
//!
//! Learns parameter/performance correlations and emits validated parameter
//! recommendations.

use anyhow::Result;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if it exists (SENTINEL_* overrides may live here)
    dotenvy::dotenv().ok();

    let app = sentinel::adapters::cli::init();
    sentinel::adapters::cli::execute(app).await
}
