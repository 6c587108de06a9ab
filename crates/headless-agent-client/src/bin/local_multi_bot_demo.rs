#![allow(unused_crate_dependencies)]

use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use headless_agent_client::{Harness, TableConnector, WsConnector};
use observability::init_tracing_with_filter;
use platform_core::HarnessConfig;
use scripted_table::{TableSettings, serve_ws, spawn_table};
use tokio::net::TcpListener;
use tracing::info;

const DEMO_HANDS: u64 = 5;

/// Runs the configured agents against a scripted table, in process by
/// default or over a loopback WebSocket with `--ws`.
#[tokio::main]
async fn main() -> Result<ExitCode> {
    let mut config = HarnessConfig::load()?;
    init_tracing_with_filter("local-multi-bot-demo", &config.observability.log_filter);
    if config.run.max_hands.is_none() {
        config.run.max_hands = Some(DEMO_HANDS);
    }
    if config.run.max_duration_secs.is_none() {
        config.run.max_duration_secs = Some(120);
    }
    for agent in &mut config.agents {
        agent.think_time_ms.get_or_insert(150);
    }
    config.bootstrap.discovery_delay_ms = 200;
    config.bootstrap.fallback_delay_ms = 500;
    config.report.interval_ms = 2_000;

    let table = spawn_table(TableSettings {
        hand_pause: Duration::from_millis(100),
        max_hands: None,
    });
    let over_ws = std::env::args().any(|arg| arg == "--ws");
    let outcome = if over_ws {
        let server = serve_ws(TcpListener::bind("127.0.0.1:0").await?, table).await?;
        config.server.endpoint = server.endpoint();
        let connector = Arc::new(WsConnector::new(config.server.endpoint.clone()));
        let outcome = Harness::new(config, connector).with_seed(7).run().await?;
        server.shutdown().await;
        outcome
    } else {
        let connector = Arc::new(TableConnector::new(table));
        Harness::new(config, connector).with_seed(7).run().await?
    };

    for snapshot in &outcome.snapshots {
        info!(
            agent = %snapshot.agent,
            hands = snapshot.stats.hands_played,
            wins = snapshot.stats.wins,
            actions = snapshot.stats.total_actions,
            "demo result"
        );
    }
    Ok(if outcome.is_healthy() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}
