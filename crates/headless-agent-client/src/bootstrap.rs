use std::time::Duration;

use poker_domain::RoomId;
use thiserror::Error;
use tokio::sync::watch;

/// Single write side of the shared session identifier. Publishing consumes
/// the publisher, so a session id can be written at most once.
#[derive(Debug)]
pub struct SessionPublisher {
    tx: watch::Sender<Option<RoomId>>,
}

impl SessionPublisher {
    pub fn publish(self, room_id: RoomId) {
        let _ = self.tx.send_replace(Some(room_id));
    }
}

/// Read side of the shared session identifier; cheap to clone.
#[derive(Debug, Clone)]
pub struct SessionDirectory {
    rx: watch::Receiver<Option<RoomId>>,
}

impl SessionDirectory {
    #[must_use]
    pub fn current(&self) -> Option<RoomId> {
        self.rx.borrow().clone()
    }
}

#[must_use]
pub fn session_channel() -> (SessionPublisher, SessionDirectory) {
    let (tx, rx) = watch::channel(None);
    (SessionPublisher { tx }, SessionDirectory { rx })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("session id not discovered within {waited:?}")]
pub struct BootstrapTimeout {
    pub waited: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootstrapCheck {
    Discovery,
    Fallback,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BootstrapStep {
    CreateRoom,
    Join(RoomId),
    StartGame(RoomId),
    Schedule(BootstrapCheck, Duration),
    TimedOut(BootstrapTimeout),
    Idle,
}

#[derive(Debug)]
enum Role {
    Opener {
        room_id: Option<RoomId>,
        min_players_to_start: usize,
        start_sent: bool,
    },
    Joiner {
        directory: SessionDirectory,
        has_joined: bool,
        timed_out: bool,
    },
}

/// Startup protocol as a pure state machine; the runtime executes the
/// returned steps (sends and scheduled checks).
#[derive(Debug)]
pub struct BootstrapCoordinator {
    role: Role,
    discovery_delay: Duration,
    fallback_delay: Duration,
    registered: bool,
}

impl BootstrapCoordinator {
    #[must_use]
    pub fn opener(min_players_to_start: usize) -> Self {
        Self {
            role: Role::Opener {
                room_id: None,
                min_players_to_start: min_players_to_start.max(1),
                start_sent: false,
            },
            discovery_delay: Duration::ZERO,
            fallback_delay: Duration::ZERO,
            registered: false,
        }
    }

    #[must_use]
    pub fn joiner(
        directory: SessionDirectory,
        discovery_delay: Duration,
        fallback_delay: Duration,
    ) -> Self {
        Self {
            role: Role::Joiner {
                directory,
                has_joined: false,
                timed_out: false,
            },
            discovery_delay,
            fallback_delay,
            registered: false,
        }
    }

    #[must_use]
    pub fn is_opener(&self) -> bool {
        matches!(self.role, Role::Opener { .. })
    }

    #[must_use]
    pub fn has_joined(&self) -> bool {
        matches!(self.role, Role::Joiner { has_joined: true, .. })
    }

    /// Repeated registrations are ignored.
    pub fn on_registered(&mut self) -> BootstrapStep {
        if self.registered {
            return BootstrapStep::Idle;
        }
        self.registered = true;
        match self.role {
            Role::Opener { .. } => BootstrapStep::CreateRoom,
            Role::Joiner { .. } => {
                BootstrapStep::Schedule(BootstrapCheck::Discovery, self.discovery_delay)
            }
        }
    }

    pub fn on_room_created(&mut self, created: RoomId) {
        if let Role::Opener { room_id, .. } = &mut self.role {
            if room_id.is_none() {
                *room_id = Some(created);
            }
        }
    }

    pub fn on_check(&mut self, check: BootstrapCheck) -> BootstrapStep {
        let waited = self.discovery_delay + self.fallback_delay;
        let fallback_delay = self.fallback_delay;
        let Role::Joiner {
            directory,
            has_joined,
            timed_out,
        } = &mut self.role
        else {
            return BootstrapStep::Idle;
        };
        if *has_joined || *timed_out {
            return BootstrapStep::Idle;
        }
        match (directory.current(), check) {
            (Some(room_id), _) => {
                *has_joined = true;
                BootstrapStep::Join(room_id)
            }
            (None, BootstrapCheck::Discovery) => {
                BootstrapStep::Schedule(BootstrapCheck::Fallback, fallback_delay)
            }
            (None, BootstrapCheck::Fallback) => {
                *timed_out = true;
                BootstrapStep::TimedOut(BootstrapTimeout { waited })
            }
        }
    }

    /// Roster observation. A joiner that sees exactly one seated player joins
    /// right away; the opener starts the game once enough players sit down.
    pub fn on_roster(&mut self, players: usize, game_started: bool) -> BootstrapStep {
        if !self.registered {
            return BootstrapStep::Idle;
        }
        match &mut self.role {
            Role::Joiner {
                directory,
                has_joined,
                timed_out,
            } => {
                if players != 1 || *has_joined || *timed_out {
                    return BootstrapStep::Idle;
                }
                match directory.current() {
                    Some(room_id) => {
                        *has_joined = true;
                        BootstrapStep::Join(room_id)
                    }
                    None => BootstrapStep::Idle,
                }
            }
            Role::Opener {
                room_id,
                min_players_to_start,
                start_sent,
            } => match room_id {
                Some(room_id)
                    if !*start_sent && !game_started && players >= *min_players_to_start =>
                {
                    *start_sent = true;
                    BootstrapStep::StartGame(room_id.clone())
                }
                _ => BootstrapStep::Idle,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const D1: Duration = Duration::from_millis(2_000);
    const D2: Duration = Duration::from_millis(3_000);

    fn joiner() -> (SessionPublisher, BootstrapCoordinator) {
        let (publisher, directory) = session_channel();
        (publisher, BootstrapCoordinator::joiner(directory, D1, D2))
    }

    #[test]
    fn published_session_id_is_visible_to_every_reader() {
        let (publisher, directory) = session_channel();
        let other = directory.clone();
        assert_eq!(directory.current(), None);
        publisher.publish(RoomId::from("room-7"));
        assert_eq!(directory.current(), Some(RoomId::from("room-7")));
        assert_eq!(other.current(), Some(RoomId::from("room-7")));
    }

    #[test]
    fn opener_creates_once_and_starts_once_enough_players_sit() {
        let mut coordinator = BootstrapCoordinator::opener(2);
        assert_eq!(coordinator.on_roster(2, false), BootstrapStep::Idle);
        assert_eq!(coordinator.on_registered(), BootstrapStep::CreateRoom);
        assert_eq!(coordinator.on_registered(), BootstrapStep::Idle);

        assert_eq!(coordinator.on_roster(2, false), BootstrapStep::Idle);
        coordinator.on_room_created(RoomId::from("room-1"));
        assert_eq!(coordinator.on_roster(1, false), BootstrapStep::Idle);
        assert_eq!(
            coordinator.on_roster(2, false),
            BootstrapStep::StartGame(RoomId::from("room-1"))
        );
        assert_eq!(coordinator.on_roster(3, false), BootstrapStep::Idle);
    }

    #[test]
    fn joiner_joins_at_discovery_when_id_is_known() {
        let (publisher, mut coordinator) = joiner();
        assert_eq!(
            coordinator.on_registered(),
            BootstrapStep::Schedule(BootstrapCheck::Discovery, D1)
        );
        publisher.publish(RoomId::from("room-1"));
        assert_eq!(
            coordinator.on_check(BootstrapCheck::Discovery),
            BootstrapStep::Join(RoomId::from("room-1"))
        );
        assert!(coordinator.has_joined());
        assert_eq!(coordinator.on_check(BootstrapCheck::Fallback), BootstrapStep::Idle);
    }

    #[test]
    fn joiner_joins_at_fallback_when_id_arrives_during_the_wait() {
        let (publisher, mut coordinator) = joiner();
        coordinator.on_registered();
        assert_eq!(
            coordinator.on_check(BootstrapCheck::Discovery),
            BootstrapStep::Schedule(BootstrapCheck::Fallback, D2)
        );
        publisher.publish(RoomId::from("late-room"));
        assert_eq!(
            coordinator.on_check(BootstrapCheck::Fallback),
            BootstrapStep::Join(RoomId::from("late-room"))
        );
    }

    #[test]
    fn joiner_times_out_once_and_never_retries() {
        let (_publisher, mut coordinator) = joiner();
        coordinator.on_registered();
        coordinator.on_check(BootstrapCheck::Discovery);
        assert_eq!(
            coordinator.on_check(BootstrapCheck::Fallback),
            BootstrapStep::TimedOut(BootstrapTimeout { waited: D1 + D2 })
        );
        assert_eq!(coordinator.on_check(BootstrapCheck::Fallback), BootstrapStep::Idle);
        assert_eq!(coordinator.on_roster(1, false), BootstrapStep::Idle);
        assert!(!coordinator.has_joined());
    }

    #[test]
    fn roster_signal_and_fallback_never_produce_two_joins() {
        let (publisher, mut coordinator) = joiner();
        coordinator.on_registered();
        coordinator.on_check(BootstrapCheck::Discovery);
        publisher.publish(RoomId::from("room-1"));

        let steps = [
            coordinator.on_roster(1, false),
            coordinator.on_check(BootstrapCheck::Fallback),
            coordinator.on_roster(1, false),
        ];
        let joins = steps
            .iter()
            .filter(|s| matches!(s, BootstrapStep::Join(_)))
            .count();
        assert_eq!(joins, 1);
        assert_eq!(steps[0], BootstrapStep::Join(RoomId::from("room-1")));
    }

    #[test]
    fn roster_signal_needs_a_known_id_and_exactly_one_player() {
        let (publisher, mut coordinator) = joiner();
        coordinator.on_registered();
        assert_eq!(coordinator.on_roster(1, false), BootstrapStep::Idle);
        publisher.publish(RoomId::from("room-1"));
        assert_eq!(coordinator.on_roster(2, false), BootstrapStep::Idle);
        assert_eq!(
            coordinator.on_roster(1, false),
            BootstrapStep::Join(RoomId::from("room-1"))
        );
    }
}
