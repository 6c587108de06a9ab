use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use platform_core::{AgentSpec, ConfigError, HarnessConfig};
use poker_domain::{
    Chips, ClientCommand, DeviceId, EventTag, RawFrame, RoomId, ServerEvent, SocketId,
};
use rand::SeedableRng;
use rand::rngs::StdRng;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::audit::{AgentLedger, AgentSnapshot, AgentStatus};
use crate::bootstrap::{
    BootstrapCoordinator, BootstrapStep, SessionDirectory, SessionPublisher, session_channel,
};
use crate::client::{ChannelClient, ChannelConnection, ChannelError, Connector, EventRouter};
use crate::policy_adapter::{Policy, PolicyKind, TurnContext};
use crate::report::{collect, render, spawn_reporter};
use crate::scheduler::{Continuation, Scheduler};
use crate::state::{SharedGameState, StateNote};

#[derive(Debug, thiserror::Error)]
pub enum HarnessError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("agent task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoomSettings {
    pub max_players: u8,
    pub initial_chips: Chips,
    pub small_blind: Chips,
    pub big_blind: Chips,
    pub min_players_to_start: usize,
}

#[derive(Debug, Clone)]
pub struct AgentSettings {
    pub name: String,
    pub device_id: DeviceId,
    pub policy: PolicyKind,
    pub think_time: Duration,
    pub room: RoomSettings,
    pub discovery_delay: Duration,
    pub fallback_delay: Duration,
    pub window: usize,
    pub seed: Option<u64>,
}

impl AgentSettings {
    #[must_use]
    pub fn from_config(config: &HarnessConfig, spec: &AgentSpec) -> Self {
        let device_id = spec
            .device_id
            .clone()
            .map(DeviceId::from)
            .unwrap_or_else(|| DeviceId::generate(&spec.name.to_lowercase()));
        Self {
            name: spec.name.clone(),
            device_id,
            policy: PolicyKind::from(spec.policy),
            think_time: spec.think_time(),
            room: RoomSettings {
                max_players: config.room.max_players,
                initial_chips: Chips(config.room.initial_chips),
                small_blind: Chips(config.room.small_blind),
                big_blind: Chips(config.room.big_blind),
                min_players_to_start: config.room.min_players_to_start,
            },
            discovery_delay: config.bootstrap.discovery_delay(),
            fallback_delay: config.bootstrap.fallback_delay(),
            window: config.report.window,
            seed: None,
        }
    }
}

/// How an agent takes part in the session bootstrap.
#[derive(Debug)]
pub enum SessionLink {
    Publish(SessionPublisher),
    Discover(SessionDirectory),
}

pub struct AgentHandle {
    pub name: String,
    pub snapshot: watch::Receiver<AgentSnapshot>,
    pub task: JoinHandle<()>,
}

/// Everything one agent owns. Only the agent task touches it; handlers run
/// one at a time in arrival order.
struct AgentCore {
    settings: AgentSettings,
    client: ChannelClient,
    scheduler: Scheduler,
    bootstrap: BootstrapCoordinator,
    publisher: Option<SessionPublisher>,
    state: SharedGameState,
    ledger: AgentLedger,
    status: AgentStatus,
    socket_id: Option<SocketId>,
    joined_room: Option<RoomId>,
    pending_turn: Option<(u64, TurnContext)>,
    turn_seq: u64,
    rng: StdRng,
    events_seen: u64,
}

impl AgentCore {
    fn new(
        settings: AgentSettings,
        link: SessionLink,
        client: ChannelClient,
        scheduler: Scheduler,
    ) -> Self {
        let (bootstrap, publisher) = match link {
            SessionLink::Publish(publisher) => (
                BootstrapCoordinator::opener(settings.room.min_players_to_start),
                Some(publisher),
            ),
            SessionLink::Discover(directory) => (
                BootstrapCoordinator::joiner(
                    directory,
                    settings.discovery_delay,
                    settings.fallback_delay,
                ),
                None,
            ),
        };
        let rng = match settings.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        Self {
            ledger: AgentLedger::new(settings.name.clone(), settings.window),
            settings,
            client,
            scheduler,
            bootstrap,
            publisher,
            state: SharedGameState::default(),
            status: AgentStatus::Connected,
            socket_id: None,
            joined_room: None,
            pending_turn: None,
            turn_seq: 0,
            rng,
            events_seen: 0,
        }
    }

    fn router() -> Result<EventRouter<Self>, ChannelError> {
        let mut router = EventRouter::new();
        router.observe_all(Self::on_frame);
        router.on(EventTag::DeviceRegistered, Self::on_device_registered)?;
        router.on(EventTag::RoomCreated, Self::on_room_created)?;
        router.on(EventTag::GameStateUpdate, Self::on_game_state)?;
        router.on(EventTag::GameStarted, Self::on_table_event)?;
        router.on(EventTag::HandStarted, Self::on_table_event)?;
        router.on(EventTag::FlopDealt, Self::on_table_event)?;
        router.on(EventTag::TurnDealt, Self::on_table_event)?;
        router.on(EventTag::RiverDealt, Self::on_table_event)?;
        router.on(EventTag::YourTurn, Self::on_your_turn)?;
        router.on(EventTag::HandEnded, Self::on_hand_ended)?;
        router.on(EventTag::Error, Self::on_service_error)?;
        Ok(router)
    }

    fn start(&mut self) {
        let device_id = self.settings.device_id.clone();
        self.send(ClientCommand::RegisterDevice { device_id });
    }

    fn handle_frame(&mut self, router: &EventRouter<Self>, frame: &RawFrame) {
        if let Err(err) = router.dispatch(self, frame) {
            self.ledger.record_protocol_error(&err.to_string());
        }
    }

    fn on_frame(&mut self, frame: &RawFrame) {
        self.events_seen = self.events_seen.saturating_add(1);
        let known = EventTag::from_name(&frame.event).is_some();
        self.ledger.record_trace(&frame.event, known);
    }

    fn on_device_registered(&mut self, event: &ServerEvent) {
        let ServerEvent::DeviceRegistered(ack) = event else {
            return;
        };
        if ack.socket_id.is_some() {
            self.socket_id = ack.socket_id.clone();
        }
        if self.status == AgentStatus::Connected {
            self.status = AgentStatus::Registered;
        }
        let step = self.bootstrap.on_registered();
        self.execute(step);
    }

    fn on_room_created(&mut self, event: &ServerEvent) {
        let ServerEvent::RoomCreated(created) = event else {
            return;
        };
        self.apply(event);
        if !self.bootstrap.is_opener() {
            return;
        }
        self.bootstrap.on_room_created(created.room_id.clone());
        if let Some(publisher) = self.publisher.take() {
            info!(agent = %self.settings.name, room_id = %created.room_id, "session published");
            publisher.publish(created.room_id.clone());
        }
        self.status = AgentStatus::Seated;
    }

    fn on_game_state(&mut self, event: &ServerEvent) {
        self.apply(event);
        let seated = self.state.roster().iter().any(|seat| {
            seat.id == self.settings.device_id.as_str() || seat.name == self.settings.name
        });
        if seated && self.status == AgentStatus::Registered {
            self.status = AgentStatus::Seated;
        }
        let step = self
            .bootstrap
            .on_roster(self.state.roster().len(), self.state.game_started());
        self.execute(step);
    }

    fn on_table_event(&mut self, event: &ServerEvent) {
        if matches!(event, ServerEvent::HandStarted) {
            self.pending_turn = None;
        }
        self.apply(event);
    }

    fn on_your_turn(&mut self, event: &ServerEvent) {
        let ServerEvent::YourTurn(turn) = event else {
            return;
        };
        self.turn_seq = self.turn_seq.saturating_add(1);
        self.pending_turn = Some((self.turn_seq, TurnContext::from(turn)));
        self.scheduler.schedule(
            self.settings.think_time,
            Continuation::SendDecision {
                turn: self.turn_seq,
            },
        );
    }

    fn on_hand_ended(&mut self, event: &ServerEvent) {
        let ServerEvent::HandEnded(ended) = event else {
            return;
        };
        self.apply(event);
        self.pending_turn = None;
        let won = ended.winner.iter().any(|winner| self.is_me(winner));
        self.ledger
            .record_hand_result(won, self.state.pot(), &ended.winner);
    }

    fn on_service_error(&mut self, event: &ServerEvent) {
        if let ServerEvent::Error(err) = event {
            self.ledger.record_protocol_error(&err.message);
        }
    }

    fn on_continuation(&mut self, continuation: Continuation) {
        match continuation {
            Continuation::Bootstrap(check) => {
                let step = self.bootstrap.on_check(check);
                self.execute(step);
            }
            Continuation::SendDecision { turn } => self.send_decision(turn),
        }
    }

    /// A newer `yourTurn` supersedes an older one still thinking.
    fn send_decision(&mut self, turn: u64) {
        let ctx = match self.pending_turn.take() {
            Some((seq, ctx)) if seq == turn => ctx,
            other => {
                self.pending_turn = other;
                return;
            }
        };
        let decision = self.settings.policy.decide(&ctx, &mut self.rng);
        self.ledger.record_decision(&decision);
        self.send(ClientCommand::PlayerAction {
            action: decision.kind,
            amount: decision.amount,
        });
    }

    fn apply(&mut self, event: &ServerEvent) {
        for note in self.state.apply_event(event) {
            match note {
                StateNote::PhaseChanged { to, revealed, .. } => {
                    self.ledger.record_dealing(to, revealed);
                }
                StateNote::Violation(violation) => self.ledger.record_violation(&violation),
            }
        }
    }

    fn execute(&mut self, step: BootstrapStep) {
        match step {
            BootstrapStep::CreateRoom => {
                let room = self.settings.room;
                self.send(ClientCommand::CreateRoom {
                    max_players: room.max_players,
                    initial_chips: room.initial_chips,
                    small_blind: room.small_blind,
                    big_blind: room.big_blind,
                });
            }
            BootstrapStep::Join(room_id) => {
                info!(agent = %self.settings.name, %room_id, "joining session");
                self.joined_room = Some(room_id.clone());
                self.send(ClientCommand::JoinRoom {
                    room_id,
                    device_id: self.settings.device_id.clone(),
                    player_name: self.settings.name.clone(),
                });
            }
            BootstrapStep::StartGame(room_id) => {
                info!(agent = %self.settings.name, %room_id, "starting game");
                self.send(ClientCommand::StartGame { room_id });
            }
            BootstrapStep::Schedule(check, delay) => {
                self.scheduler.schedule(delay, Continuation::Bootstrap(check));
            }
            BootstrapStep::TimedOut(timeout) => {
                error!(agent = %self.settings.name, error = %timeout, "bootstrap timed out");
                self.status = AgentStatus::Degraded(timeout.to_string());
            }
            BootstrapStep::Idle => {}
        }
    }

    fn send(&mut self, command: ClientCommand) {
        if self.client.send(command) {
            self.ledger.record_command_sent();
        }
    }

    fn is_me(&self, id: &str) -> bool {
        id == self.settings.device_id.as_str()
            || id == self.settings.name
            || self.socket_id.as_ref().is_some_and(|s| s.as_str() == id)
    }

    fn snapshot(&self) -> AgentSnapshot {
        let stats = self.ledger.stats();
        AgentSnapshot {
            agent: self.settings.name.clone(),
            opener: self.bootstrap.is_opener(),
            status: self.status.clone(),
            room_id: self.state.room_id().cloned().or_else(|| self.joined_room.clone()),
            phase: self.state.current_phase(),
            pot: self.state.pot(),
            community_cards: self.state.current_community_cards().to_vec(),
            roster_size: self.state.roster().len(),
            stats,
            win_rate: stats.win_rate(),
            recent_actions: self.ledger.actions().to_vec(),
            recent_dealing: self.ledger.dealing().to_vec(),
            recent_trace: self.ledger.trace().to_vec(),
            events_seen: self.events_seen,
        }
    }
}

pub fn spawn_agent(
    settings: AgentSettings,
    link: SessionLink,
    connector: Arc<dyn Connector>,
    cancel: CancellationToken,
) -> AgentHandle {
    let name = settings.name.clone();
    let opener = matches!(link, SessionLink::Publish(_));
    let (snapshot_tx, snapshot_rx) = watch::channel(AgentSnapshot::initial(&name, opener));
    let task = tokio::spawn(run_agent(settings, link, connector, cancel, snapshot_tx));
    AgentHandle {
        name,
        snapshot: snapshot_rx,
        task,
    }
}

async fn run_agent(
    settings: AgentSettings,
    link: SessionLink,
    connector: Arc<dyn Connector>,
    cancel: CancellationToken,
    snapshot_tx: watch::Sender<AgentSnapshot>,
) {
    let name = settings.name.clone();
    let connected = tokio::select! {
        () = cancel.cancelled() => {
            snapshot_tx.send_modify(|s| s.status = AgentStatus::Stopped);
            return;
        }
        result = connector.connect(&name) => result,
    };
    let ChannelConnection { client, mut inbound } = match connected {
        Ok(connection) => connection,
        Err(err) => {
            error!(agent = %name, error = %err, "connection failed, agent stays idle");
            snapshot_tx.send_modify(|s| s.status = AgentStatus::Disconnected(err.to_string()));
            return;
        }
    };
    let router = match AgentCore::router() {
        Ok(router) => router,
        Err(err) => {
            error!(agent = %name, error = %err, "event routing setup failed");
            snapshot_tx.send_modify(|s| s.status = AgentStatus::Disconnected(err.to_string()));
            return;
        }
    };

    let (scheduler, mut continuations) = Scheduler::new(cancel.child_token());
    let mut core = AgentCore::new(settings, link, client, scheduler);
    info!(agent = %name, policy = core.settings.policy.name(), opener = core.bootstrap.is_opener(), "agent connected");
    core.start();
    let _ = snapshot_tx.send(core.snapshot());

    loop {
        tokio::select! {
            () = cancel.cancelled() => {
                if !core.status.is_failure() {
                    core.status = AgentStatus::Stopped;
                }
                break;
            }
            frame = inbound.recv() => match frame {
                Some(frame) => core.handle_frame(&router, &frame),
                None => {
                    warn!(agent = %name, "connection closed by remote");
                    core.status = AgentStatus::Disconnected("connection closed".to_string());
                    break;
                }
            },
            Some(continuation) = continuations.recv() => core.on_continuation(continuation),
        }
        let _ = snapshot_tx.send(core.snapshot());
    }

    core.scheduler.cancel_all();
    let _ = snapshot_tx.send(core.snapshot());
    info!(agent = %name, status = ?core.status, "agent finished");
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    HandBudget(u64),
    TimeBudget(Duration),
    Interrupted,
    /// No agent is left running.
    AgentsFinished,
}

#[derive(Debug, Clone)]
pub struct HarnessOutcome {
    pub stop_reason: StopReason,
    pub snapshots: Vec<AgentSnapshot>,
}

impl HarnessOutcome {
    /// False when any agent ended on a connection error or bootstrap timeout.
    #[must_use]
    pub fn is_healthy(&self) -> bool {
        !self.snapshots.iter().any(|s| s.status.is_failure())
    }
}

pub struct Harness {
    config: HarnessConfig,
    connector: Arc<dyn Connector>,
    seed: Option<u64>,
}

impl Harness {
    #[must_use]
    pub fn new(config: HarnessConfig, connector: Arc<dyn Connector>) -> Self {
        Self {
            config,
            connector,
            seed: None,
        }
    }

    /// Agent `i` draws from `StdRng::seed_from_u64(seed + i)`.
    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    #[must_use]
    pub fn agent_settings(&self) -> Vec<AgentSettings> {
        self.config
            .agents
            .iter()
            .enumerate()
            .map(|(index, spec)| {
                let mut settings = AgentSettings::from_config(&self.config, spec);
                settings.seed = self.seed.map(|seed| seed.wrapping_add(index as u64));
                settings
            })
            .collect()
    }

    /// Runs until a budget is exhausted or Ctrl-C.
    pub async fn run(self) -> Result<HarnessOutcome, HarnessError> {
        self.run_until(async {
            if tokio::signal::ctrl_c().await.is_err() {
                std::future::pending::<()>().await;
            }
        })
        .await
    }

    pub async fn run_until<F>(self, interrupt: F) -> Result<HarnessOutcome, HarnessError>
    where
        F: Future<Output = ()>,
    {
        self.config.validate()?;
        let root = CancellationToken::new();
        let (publisher, directory) = session_channel();
        let mut publisher = Some(publisher);
        let opener_index = self.config.opener_index();

        let mut handles = Vec::with_capacity(self.config.agents.len());
        for (index, settings) in self.agent_settings().into_iter().enumerate() {
            let link = match publisher.take_if(|_| index == opener_index) {
                Some(publisher) => SessionLink::Publish(publisher),
                None => SessionLink::Discover(directory.clone()),
            };
            handles.push(spawn_agent(
                settings,
                link,
                Arc::clone(&self.connector),
                root.child_token(),
            ));
        }
        info!(agents = handles.len(), endpoint = %self.config.server.endpoint, "harness started");

        let watchers: Vec<_> = handles.iter().map(|h| h.snapshot.clone()).collect();
        let reporter = spawn_reporter(
            watchers.clone(),
            Duration::from_millis(self.config.report.interval_ms),
            root.child_token(),
        );
        let time_budget = self.config.run.max_duration_secs.map(Duration::from_secs);

        let stop_reason = tokio::select! {
            () = interrupt => StopReason::Interrupted,
            () = sleep_for(time_budget) => match time_budget {
                Some(budget) => StopReason::TimeBudget(budget),
                None => StopReason::Interrupted,
            },
            reason = wait_for_hand_budget(watchers.clone(), self.config.run.max_hands) => reason,
        };
        info!(?stop_reason, "harness stopping");
        root.cancel();
        for handle in handles {
            handle.task.await?;
        }
        reporter.await?;

        let final_report = collect(&watchers);
        info!("final report\n{}", render(&final_report));
        Ok(HarnessOutcome {
            stop_reason,
            snapshots: final_report.agents,
        })
    }
}

async fn sleep_for(limit: Option<Duration>) {
    match limit {
        Some(limit) => tokio::time::sleep(limit).await,
        None => std::future::pending().await,
    }
}

fn is_running(status: &AgentStatus) -> bool {
    !status.is_failure() && *status != AgentStatus::Stopped
}

/// Resolves once every running agent has seen `max_hands` hand ends, or when
/// no agent is running any more. A watcher whose sender is gone (the agent
/// task ended or panicked) counts as finished.
async fn wait_for_hand_budget(
    mut watchers: Vec<watch::Receiver<AgentSnapshot>>,
    max_hands: Option<u64>,
) -> StopReason {
    let mut closed = vec![false; watchers.len()];
    loop {
        let snapshots: Vec<AgentSnapshot> = watchers
            .iter_mut()
            .map(|w| w.borrow_and_update().clone())
            .collect();
        let running: Vec<usize> = snapshots
            .iter()
            .enumerate()
            .filter(|(index, s)| !closed[*index] && is_running(&s.status))
            .map(|(index, _)| index)
            .collect();
        if running.is_empty() {
            return StopReason::AgentsFinished;
        }
        if let Some(max_hands) = max_hands {
            let done = running
                .iter()
                .all(|&index| snapshots[index].stats.hands_played >= max_hands);
            if done {
                return StopReason::HandBudget(max_hands);
            }
        }
        let changes = watchers
            .iter_mut()
            .enumerate()
            .filter(|(index, _)| running.contains(index))
            .map(|(_, w)| Box::pin(w.changed()));
        let (changed, position, _) = futures_util::future::select_all(changes).await;
        if changed.is_err() {
            closed[running[position]] = true;
        }
    }
}
