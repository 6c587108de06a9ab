#![allow(unused_crate_dependencies)]

use std::sync::Arc;
use std::time::Duration;

use headless_agent_client::audit::AgentStatus;
use headless_agent_client::{Harness, StopReason, TableConnector, WsConnector};
use platform_core::{AppEnv, HarnessConfig};
use poker_domain::ClientCommand;
use scripted_table::{TableSettings, serve_ws, spawn_table};
use tokio::net::TcpListener;

fn quick_config(max_hands: u64) -> HarnessConfig {
    let mut config = HarnessConfig::default_for_env(AppEnv::Test);
    config.bootstrap.discovery_delay_ms = 50;
    config.bootstrap.fallback_delay_ms = 150;
    config.report.interval_ms = 100;
    config.run.max_hands = Some(max_hands);
    for agent in &mut config.agents {
        agent.think_time_ms = Some(0);
    }
    config
}

fn quick_table() -> TableSettings {
    TableSettings {
        hand_pause: Duration::from_millis(10),
        max_hands: None,
    }
}

fn count(journal: &[scripted_table::JournalEntry], name: &str) -> usize {
    journal.iter().filter(|entry| entry.command.name() == name).count()
}

#[tokio::test]
async fn two_agents_play_hands_in_process() {
    let table = spawn_table(quick_table());
    let connector = Arc::new(TableConnector::new(table.clone()));

    let outcome = Harness::new(quick_config(3), connector)
        .with_seed(11)
        .run_until(tokio::time::sleep(Duration::from_secs(30)))
        .await
        .expect("harness run");

    assert_eq!(outcome.stop_reason, StopReason::HandBudget(3));
    assert!(outcome.is_healthy());
    assert_eq!(outcome.snapshots.len(), 2);
    for snapshot in &outcome.snapshots {
        assert_eq!(snapshot.status, AgentStatus::Stopped);
        assert!(snapshot.stats.hands_played >= 3);
        assert!(snapshot.stats.wins <= snapshot.stats.hands_played);
        assert!(snapshot.win_rate <= 1.0);
        assert!(snapshot.recent_actions.len() <= 50);
        assert_eq!(snapshot.stats.protocol_violations, 0);
    }
    let rooms: Vec<_> = outcome.snapshots.iter().map(|s| s.room_id.clone()).collect();
    assert!(rooms[0].is_some());
    assert_eq!(rooms[0], rooms[1]);

    let journal = table.journal().await.expect("journal");
    assert_eq!(count(&journal, "registerDevice"), 2);
    assert_eq!(count(&journal, "createRoom"), 1);
    assert_eq!(count(&journal, "joinRoom"), 1);
    assert_eq!(count(&journal, "startGame"), 1);
    assert!(journal.iter().any(|entry| matches!(
        entry.command,
        ClientCommand::PlayerAction { .. }
    )));
}

#[tokio::test]
async fn two_agents_play_hands_over_loopback_websocket() {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let table = spawn_table(quick_table());
    let server = serve_ws(listener, table.clone()).await.expect("serve");

    let mut config = quick_config(2);
    config.server.endpoint = server.endpoint();
    let connector = Arc::new(WsConnector::new(config.server.endpoint.clone()));
    let outcome = Harness::new(config, connector)
        .with_seed(5)
        .run_until(tokio::time::sleep(Duration::from_secs(30)))
        .await
        .expect("harness run");

    assert_eq!(outcome.stop_reason, StopReason::HandBudget(2));
    assert!(outcome.is_healthy());
    assert!(
        outcome
            .snapshots
            .iter()
            .all(|s| s.stats.hands_played >= 2 && s.stats.commands_sent >= 2)
    );
    let journal = table.journal().await.expect("journal");
    assert_eq!(count(&journal, "joinRoom"), 1);
    server.shutdown().await;
}

#[tokio::test]
async fn time_budget_stops_a_table_that_never_starts() {
    let table = spawn_table(quick_table());
    let connector = Arc::new(TableConnector::new(table));
    let mut config = quick_config(100);
    config.room.min_players_to_start = 3;
    config.run.max_duration_secs = Some(1);

    let outcome = Harness::new(config, connector)
        .run_until(std::future::pending())
        .await
        .expect("harness run");

    assert_eq!(outcome.stop_reason, StopReason::TimeBudget(Duration::from_secs(1)));
    assert!(outcome.is_healthy());
    assert!(outcome.snapshots.iter().all(|s| s.stats.hands_played == 0));
}
