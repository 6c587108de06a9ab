use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use poker_domain::{ActionKind, Card, Chips, Phase, ProtocolViolation, RoomId};
use serde::Serialize;
use tracing::{info, warn};

use crate::policy_adapter::Decision;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActionRecord {
    pub at: DateTime<Utc>,
    pub agent: String,
    /// `None` for hand-result entries.
    pub action: Option<ActionKind>,
    pub amount: Chips,
    pub note: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DealingEvent {
    pub at: DateTime<Utc>,
    pub phase: Phase,
    pub cards: Vec<Card>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TraceEntry {
    pub at: DateTime<Utc>,
    pub event: String,
    pub known: bool,
}

/// Append-only sequence that keeps a trailing window of entries while
/// counting everything ever appended.
#[derive(Debug, Clone, Serialize)]
pub struct BoundedLog<T> {
    max_entries: usize,
    total: u64,
    entries: VecDeque<T>,
}

impl<T: Clone> BoundedLog<T> {
    #[must_use]
    pub fn with_max_entries(max_entries: usize) -> Self {
        Self {
            max_entries: max_entries.max(1),
            total: 0,
            entries: VecDeque::new(),
        }
    }

    pub fn push(&mut self, entry: T) {
        self.entries.push_back(entry);
        self.total = self.total.saturating_add(1);
        while self.entries.len() > self.max_entries {
            let _ = self.entries.pop_front();
        }
    }

    #[must_use]
    pub fn total(&self) -> u64 {
        self.total
    }

    #[must_use]
    pub fn last(&self) -> Option<&T> {
        self.entries.back()
    }

    #[must_use]
    pub fn to_vec(&self) -> Vec<T> {
        self.entries.iter().cloned().collect()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Statistics {
    pub hands_played: u64,
    pub wins: u64,
    pub total_actions: u64,
    pub folds: u64,
    pub calls: u64,
    pub raises: u64,
    pub all_ins: u64,
    pub protocol_errors: u64,
    pub protocol_violations: u64,
    pub commands_sent: u64,
}

impl Statistics {
    #[must_use]
    pub fn win_rate(&self) -> f64 {
        if self.hands_played == 0 {
            return 0.0;
        }
        (self.wins as f64 / self.hands_played as f64).min(1.0)
    }

    fn count_action(&mut self, kind: ActionKind) {
        self.total_actions = self.total_actions.saturating_add(1);
        let counter = match kind {
            ActionKind::Fold => &mut self.folds,
            ActionKind::Call => &mut self.calls,
            ActionKind::Raise => &mut self.raises,
            ActionKind::AllIn => &mut self.all_ins,
        };
        *counter = counter.saturating_add(1);
    }
}

/// Per-agent statistics plus the action, dealing and raw-trace logs.
/// Every append is echoed as one console line.
#[derive(Debug, Clone)]
pub struct AgentLedger {
    agent: String,
    stats: Statistics,
    actions: BoundedLog<ActionRecord>,
    dealing: BoundedLog<DealingEvent>,
    trace: BoundedLog<TraceEntry>,
}

impl AgentLedger {
    #[must_use]
    pub fn new(agent: impl Into<String>, window: usize) -> Self {
        Self {
            agent: agent.into(),
            stats: Statistics::default(),
            actions: BoundedLog::with_max_entries(window),
            dealing: BoundedLog::with_max_entries(window),
            trace: BoundedLog::with_max_entries(window),
        }
    }

    pub fn record_decision(&mut self, decision: &Decision) {
        self.stats.count_action(decision.kind);
        info!(
            agent = %self.agent,
            action = %decision.kind,
            amount = decision.amount.as_u64(),
            note = %decision.note,
            "decision"
        );
        self.actions.push(ActionRecord {
            at: Utc::now(),
            agent: self.agent.clone(),
            action: Some(decision.kind),
            amount: decision.amount,
            note: decision.note.clone(),
        });
    }

    /// One entry per observed hand end, winner or not.
    pub fn record_hand_result(&mut self, won: bool, pot: Chips, winners: &[String]) {
        self.stats.hands_played = self.stats.hands_played.saturating_add(1);
        let note = if won {
            self.stats.wins = self.stats.wins.saturating_add(1);
            format!("won pot {pot}")
        } else {
            format!("hand lost to [{}], pot {pot}", winners.join(", "))
        };
        info!(agent = %self.agent, won, pot = pot.as_u64(), hands = self.stats.hands_played, "hand ended");
        self.actions.push(ActionRecord {
            at: Utc::now(),
            agent: self.agent.clone(),
            action: None,
            amount: pot,
            note,
        });
    }

    pub fn record_dealing(&mut self, phase: Phase, cards: Vec<Card>) {
        let rendered: Vec<String> = cards.iter().map(ToString::to_string).collect();
        info!(agent = %self.agent, %phase, cards = ?rendered, "dealing");
        self.dealing.push(DealingEvent {
            at: Utc::now(),
            phase,
            cards,
        });
    }

    pub fn record_trace(&mut self, event: &str, known: bool) {
        if known {
            info!(agent = %self.agent, event, "event received");
        } else {
            warn!(agent = %self.agent, event, "event outside contract");
        }
        self.trace.push(TraceEntry {
            at: Utc::now(),
            event: event.to_string(),
            known,
        });
    }

    pub fn record_protocol_error(&mut self, message: &str) {
        self.stats.protocol_errors = self.stats.protocol_errors.saturating_add(1);
        warn!(agent = %self.agent, message, "protocol error");
    }

    pub fn record_violation(&mut self, violation: &ProtocolViolation) {
        self.stats.protocol_violations = self.stats.protocol_violations.saturating_add(1);
        warn!(agent = %self.agent, %violation, "protocol violation");
    }

    pub fn record_command_sent(&mut self) {
        self.stats.commands_sent = self.stats.commands_sent.saturating_add(1);
    }

    #[must_use]
    pub fn stats(&self) -> Statistics {
        self.stats
    }

    #[must_use]
    pub fn actions(&self) -> &BoundedLog<ActionRecord> {
        &self.actions
    }

    #[must_use]
    pub fn dealing(&self) -> &BoundedLog<DealingEvent> {
        &self.dealing
    }

    #[must_use]
    pub fn trace(&self) -> &BoundedLog<TraceEntry> {
        &self.trace
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "detail", rename_all = "snake_case")]
pub enum AgentStatus {
    Connecting,
    Connected,
    Registered,
    Seated,
    /// `ConnectionError`: the agent stays idle.
    Disconnected(String),
    /// `BootstrapTimeout`: the joiner never joined.
    Degraded(String),
    Stopped,
}

impl AgentStatus {
    #[must_use]
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Disconnected(_) | Self::Degraded(_))
    }
}

/// Immutable per-agent view published after every handler.
#[derive(Debug, Clone, Serialize)]
pub struct AgentSnapshot {
    pub agent: String,
    pub opener: bool,
    pub status: AgentStatus,
    pub room_id: Option<RoomId>,
    pub phase: Phase,
    pub pot: Chips,
    pub community_cards: Vec<Card>,
    pub roster_size: usize,
    pub stats: Statistics,
    pub win_rate: f64,
    pub recent_actions: Vec<ActionRecord>,
    pub recent_dealing: Vec<DealingEvent>,
    /// Raw trace of inbound frames, including ones no handler claimed.
    pub recent_trace: Vec<TraceEntry>,
    pub events_seen: u64,
}

impl AgentSnapshot {
    #[must_use]
    pub fn initial(agent: impl Into<String>, opener: bool) -> Self {
        Self {
            agent: agent.into(),
            opener,
            status: AgentStatus::Connecting,
            room_id: None,
            phase: Phase::Waiting,
            pot: Chips::ZERO,
            community_cards: Vec::new(),
            roster_size: 0,
            stats: Statistics::default(),
            win_rate: 0.0,
            recent_actions: Vec::new(),
            recent_dealing: Vec::new(),
            recent_trace: Vec::new(),
            events_seen: 0,
        }
    }
}
