use std::fmt::Write as _;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::audit::AgentSnapshot;

/// Point-in-time copy of every agent's published snapshot.
#[derive(Debug, Clone, Serialize)]
pub struct HarnessSnapshot {
    pub at: DateTime<Utc>,
    pub agents: Vec<AgentSnapshot>,
}

#[must_use]
pub fn collect(watchers: &[watch::Receiver<AgentSnapshot>]) -> HarnessSnapshot {
    HarnessSnapshot {
        at: Utc::now(),
        agents: watchers.iter().map(|w| w.borrow().clone()).collect(),
    }
}

#[must_use]
pub fn render(snapshot: &HarnessSnapshot) -> String {
    let mut out = format!("=== harness report {} ===\n", snapshot.at.format("%H:%M:%S"));
    for agent in &snapshot.agents {
        let stats = &agent.stats;
        let room = agent.room_id.as_ref().map_or("-", |r| r.as_str());
        let cards: Vec<String> = agent.community_cards.iter().map(ToString::to_string).collect();
        let _ = writeln!(
            out,
            "{}{} [{:?}] room={room} phase={} pot={} board=[{}] players={}",
            agent.agent,
            if agent.opener { " (opener)" } else { "" },
            agent.status,
            agent.phase,
            agent.pot,
            cards.join(" "),
            agent.roster_size,
        );
        let _ = writeln!(
            out,
            "  hands={} wins={} win_rate={:.1}% actions={} fold={} call={} raise={} all_in={}",
            stats.hands_played,
            stats.wins,
            agent.win_rate * 100.0,
            stats.total_actions,
            stats.folds,
            stats.calls,
            stats.raises,
            stats.all_ins,
        );
        let _ = writeln!(
            out,
            "  events={} sent={} errors={} violations={}",
            agent.events_seen, stats.commands_sent, stats.protocol_errors, stats.protocol_violations,
        );
        if let Some(last) = agent.recent_actions.last() {
            let action = last.action.map_or("result".to_string(), |a| a.to_string());
            let _ = writeln!(out, "  last: {action} {} ({})", last.amount, last.note);
        }
    }
    out
}

/// Logs a report block every `interval`. Reads published snapshots only.
pub fn spawn_reporter(
    watchers: Vec<watch::Receiver<AgentSnapshot>>,
    interval: Duration,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let period = interval.max(Duration::from_millis(1));
        let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
        loop {
            tokio::select! {
                () = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    info!("\n{}", render(&collect(&watchers)));
                }
            }
        }
    })
}
