use poker_domain::{
    Card, CardsDealt, Chips, Phase, PlayerSeat, ProtocolViolation, RoomId, ServerEvent,
};
use serde::Serialize;

/// Side effects of applying one inbound event to the mirror.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StateNote {
    PhaseChanged {
        from: Phase,
        to: Phase,
        revealed: Vec<Card>,
    },
    Violation(ProtocolViolation),
}

/// Local, non-authoritative mirror of the session as seen by one agent.
/// Only [`SharedGameState::apply_event`] mutates it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SharedGameState {
    room_id: Option<RoomId>,
    phase: Phase,
    pot: Chips,
    community_cards: Vec<Card>,
    current_bet: Chips,
    roster: Vec<PlayerSeat>,
    game_started: bool,
}

impl SharedGameState {
    pub fn apply_event(&mut self, event: &ServerEvent) -> Vec<StateNote> {
        let mut notes = Vec::new();
        match event {
            ServerEvent::RoomCreated(created) => {
                self.room_id = Some(created.room_id.clone());
            }
            ServerEvent::GameStateUpdate(update) => {
                if let Some(players) = &update.players {
                    self.roster = players.clone();
                }
                if let Some(pot) = update.pot {
                    self.pot = pot;
                }
                if let Some(bet) = update.current_bet {
                    self.current_bet = bet;
                }
                match update.game_started {
                    Some(true) => self.game_started = true,
                    // Session over: a reset, never a regression.
                    Some(false) => {
                        self.game_started = false;
                        self.community_cards.clear();
                        let from = self.phase;
                        if from != Phase::Waiting {
                            self.phase = Phase::Waiting;
                            notes.push(StateNote::PhaseChanged {
                                from,
                                to: Phase::Waiting,
                                revealed: Vec::new(),
                            });
                        }
                    }
                    None => {}
                }
            }
            ServerEvent::GameStarted => {
                self.game_started = true;
                if self.phase == Phase::Waiting {
                    self.transition(Phase::Preflop, Vec::new(), &mut notes);
                }
            }
            ServerEvent::HandStarted => {
                self.game_started = true;
                self.community_cards.clear();
                self.current_bet = Chips::ZERO;
                self.transition(Phase::Preflop, Vec::new(), &mut notes);
            }
            ServerEvent::FlopDealt(dealt) => self.deal(Phase::Flop, dealt, &mut notes),
            ServerEvent::TurnDealt(dealt) => self.deal(Phase::Turn, dealt, &mut notes),
            ServerEvent::RiverDealt(dealt) => self.deal(Phase::River, dealt, &mut notes),
            ServerEvent::HandEnded(ended) => {
                if let Some(pot) = ended.pot {
                    self.pot = pot;
                }
                self.transition(Phase::HandEnded, Vec::new(), &mut notes);
            }
            ServerEvent::DeviceRegistered(_) | ServerEvent::YourTurn(_) | ServerEvent::Error(_) => {}
        }
        notes
    }

    fn deal(&mut self, phase: Phase, dealt: &CardsDealt, notes: &mut Vec<StateNote>) {
        let cards = &dealt.community_cards;
        if let Some(expected) = phase.board_len() {
            if cards.len() != expected {
                notes.push(StateNote::Violation(ProtocolViolation::BoardLength {
                    phase,
                    expected,
                    actual: cards.len(),
                }));
            }
        }
        let revealed = if cards.starts_with(&self.community_cards) {
            cards[self.community_cards.len()..].to_vec()
        } else {
            cards.clone()
        };
        self.community_cards = cards.clone();
        self.transition(phase, revealed, notes);
    }

    fn transition(&mut self, to: Phase, revealed: Vec<Card>, notes: &mut Vec<StateNote>) {
        let from = self.phase;
        if from == to {
            return;
        }
        if !from.may_advance_to(to) {
            notes.push(StateNote::Violation(ProtocolViolation::PhaseRegression { from, to }));
        }
        self.phase = to;
        notes.push(StateNote::PhaseChanged { from, to, revealed });
    }

    #[must_use]
    pub fn current_phase(&self) -> Phase {
        self.phase
    }

    #[must_use]
    pub fn current_community_cards(&self) -> &[Card] {
        &self.community_cards
    }

    #[must_use]
    pub fn roster(&self) -> &[PlayerSeat] {
        &self.roster
    }

    #[must_use]
    pub fn room_id(&self) -> Option<&RoomId> {
        self.room_id.as_ref()
    }

    #[must_use]
    pub fn pot(&self) -> Chips {
        self.pot
    }

    #[must_use]
    pub fn current_bet(&self) -> Chips {
        self.current_bet
    }

    #[must_use]
    pub fn game_started(&self) -> bool {
        self.game_started
    }
}

#[cfg(test)]
mod tests {
    use poker_domain::{GameStateUpdate, HandEnded, RawFrame, RoomCreated};

    use super::*;

    fn cards(codes: &[&str]) -> Vec<Card> {
        codes.iter().map(|c| Card::Code((*c).to_string())).collect()
    }

    fn seat(id: &str) -> PlayerSeat {
        PlayerSeat {
            id: id.to_string(),
            name: id.to_string(),
            chips: Chips(1000),
        }
    }

    fn phase_changes(notes: &[StateNote]) -> Vec<(Phase, Phase, usize)> {
        notes
            .iter()
            .filter_map(|n| match n {
                StateNote::PhaseChanged { from, to, revealed } => Some((*from, *to, revealed.len())),
                StateNote::Violation(_) => None,
            })
            .collect()
    }

    #[test]
    fn partial_update_leaves_absent_fields_untouched() {
        let mut state = SharedGameState::default();
        state.apply_event(&ServerEvent::GameStateUpdate(GameStateUpdate {
            players: Some(vec![seat("a"), seat("b")]),
            pot: Some(Chips(30)),
            current_bet: Some(Chips(20)),
            game_started: Some(true),
        }));
        state.apply_event(&ServerEvent::GameStateUpdate(GameStateUpdate {
            pot: Some(Chips(60)),
            ..GameStateUpdate::default()
        }));

        assert_eq!(state.pot(), Chips(60));
        assert_eq!(state.current_bet(), Chips(20));
        assert_eq!(state.roster().len(), 2);
        assert!(state.game_started());
    }

    #[test]
    fn a_full_hand_walks_every_phase_with_board_lengths() {
        let mut state = SharedGameState::default();
        state.apply_event(&ServerEvent::RoomCreated(RoomCreated {
            room_id: RoomId::from("room-1"),
        }));
        assert_eq!(state.room_id(), Some(&RoomId::from("room-1")));

        let mut changes = Vec::new();
        changes.extend(phase_changes(&state.apply_event(&ServerEvent::GameStarted)));
        changes.extend(phase_changes(&state.apply_event(&ServerEvent::HandStarted)));
        assert!(state.current_community_cards().is_empty());

        let flop = cards(&["Ah", "Kd", "7c"]);
        let mut turn = flop.clone();
        turn.extend(cards(&["2s"]));
        let mut river = turn.clone();
        river.extend(cards(&["9h"]));

        for (event, len) in [
            (ServerEvent::FlopDealt(CardsDealt { community_cards: flop }), 3),
            (ServerEvent::TurnDealt(CardsDealt { community_cards: turn }), 4),
            (ServerEvent::RiverDealt(CardsDealt { community_cards: river }), 5),
        ] {
            let notes = state.apply_event(&event);
            assert!(!notes.iter().any(|n| matches!(n, StateNote::Violation(_))));
            changes.extend(phase_changes(&notes));
            assert_eq!(state.current_community_cards().len(), len);
        }
        changes.extend(phase_changes(&state.apply_event(&ServerEvent::HandEnded(HandEnded {
            winner: vec!["a".to_string()],
            pot: Some(Chips(150)),
        }))));

        assert_eq!(
            changes,
            vec![
                (Phase::Waiting, Phase::Preflop, 0),
                (Phase::Preflop, Phase::Flop, 3),
                (Phase::Flop, Phase::Turn, 1),
                (Phase::Turn, Phase::River, 1),
                (Phase::River, Phase::HandEnded, 0),
            ]
        );
        assert_eq!(state.pot(), Chips(150));

        let notes = state.apply_event(&ServerEvent::HandStarted);
        assert_eq!(phase_changes(&notes), vec![(Phase::HandEnded, Phase::Preflop, 0)]);
        assert!(state.current_community_cards().is_empty());
    }

    #[test]
    fn phase_regression_is_surfaced_but_mirrored() {
        let mut state = SharedGameState::default();
        state.apply_event(&ServerEvent::HandStarted);
        state.apply_event(&ServerEvent::TurnDealt(CardsDealt {
            community_cards: cards(&["Ah", "Kd", "7c", "2s"]),
        }));
        let notes = state.apply_event(&ServerEvent::FlopDealt(CardsDealt {
            community_cards: cards(&["Ah", "Kd", "7c"]),
        }));

        assert!(notes.contains(&StateNote::Violation(ProtocolViolation::PhaseRegression {
            from: Phase::Turn,
            to: Phase::Flop,
        })));
        assert_eq!(state.current_phase(), Phase::Flop);
    }

    #[test]
    fn wrong_board_length_is_a_violation() {
        let mut state = SharedGameState::default();
        state.apply_event(&ServerEvent::HandStarted);
        let notes = state.apply_event(&ServerEvent::FlopDealt(CardsDealt {
            community_cards: cards(&["Ah", "Kd"]),
        }));
        assert!(notes.contains(&StateNote::Violation(ProtocolViolation::BoardLength {
            phase: Phase::Flop,
            expected: 3,
            actual: 2,
        })));
    }

    #[test]
    fn session_end_returns_to_waiting_after_hand_end() {
        let mut state = SharedGameState::default();
        state.apply_event(&ServerEvent::HandStarted);
        state.apply_event(&ServerEvent::HandEnded(HandEnded {
            winner: Vec::new(),
            pot: Some(Chips(40)),
        }));
        let notes = state.apply_event(&ServerEvent::GameStateUpdate(GameStateUpdate {
            game_started: Some(false),
            ..GameStateUpdate::default()
        }));
        assert_eq!(phase_changes(&notes), vec![(Phase::HandEnded, Phase::Waiting, 0)]);
        assert!(!state.game_started());
    }

    #[test]
    fn session_end_mid_hand_is_not_a_violation() {
        let mut state = SharedGameState::default();
        state.apply_event(&ServerEvent::HandStarted);
        let notes = state.apply_event(&ServerEvent::GameStateUpdate(GameStateUpdate {
            game_started: Some(false),
            ..GameStateUpdate::default()
        }));
        assert_eq!(phase_changes(&notes), vec![(Phase::Preflop, Phase::Waiting, 0)]);
        assert!(!notes.iter().any(|n| matches!(n, StateNote::Violation(_))));
        assert!(state.current_community_cards().is_empty());
    }

    #[test]
    fn hand_end_without_pot_keeps_last_known_pot() {
        let mut state = SharedGameState::default();
        state.apply_event(&ServerEvent::GameStateUpdate(GameStateUpdate {
            pot: Some(Chips(90)),
            ..GameStateUpdate::default()
        }));
        state.apply_event(&ServerEvent::HandStarted);
        let frame = RawFrame::new("handEnded", serde_json::json!({"winner": "x"}));
        let Ok(Some(event)) = ServerEvent::decode(&frame) else {
            panic!("handEnded should decode without a pot");
        };
        let notes = state.apply_event(&event);
        assert_eq!(phase_changes(&notes), vec![(Phase::Preflop, Phase::HandEnded, 0)]);
        assert_eq!(state.pot(), Chips(90));
    }
}
