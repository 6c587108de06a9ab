#![allow(unused_crate_dependencies)]

use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Result;
use headless_agent_client::{Harness, WsConnector};
use observability::init_tracing_with_filter;
use platform_core::HarnessConfig;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let config = HarnessConfig::load()?;
    init_tracing_with_filter(&config.app.service_name, &config.observability.log_filter);
    info!(
        env = config.app.env.as_str(),
        endpoint = %config.server.endpoint,
        agents = config.agents.len(),
        max_hands = ?config.run.max_hands,
        max_duration_secs = ?config.run.max_duration_secs,
        "harness configuration loaded"
    );

    let connector = Arc::new(WsConnector::new(config.server.endpoint.clone()));
    let outcome = Harness::new(config, connector).run().await?;
    info!(stop_reason = ?outcome.stop_reason, "harness finished");

    if outcome.is_healthy() {
        Ok(ExitCode::SUCCESS)
    } else {
        for snapshot in outcome.snapshots.iter().filter(|s| s.status.is_failure()) {
            error!(agent = %snapshot.agent, status = ?snapshot.status, "agent failed");
        }
        Ok(ExitCode::FAILURE)
    }
}
