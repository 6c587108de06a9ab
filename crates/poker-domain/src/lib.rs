pub mod action;
pub mod errors;
pub mod events;
pub mod game;
pub mod ids;
pub mod money;

pub use action::ActionKind;
pub use errors::{ProtocolError, ProtocolViolation};
pub use events::{
    CardsDealt, ClientCommand, DeviceRegistered, EventTag, GameStateUpdate, HandEnded, RawFrame,
    RoomCreated, ServerEvent, ServiceError, YourTurn,
};
pub use game::{Card, Phase, PlayerSeat};
pub use ids::{DeviceId, RoomId, SocketId};
pub use money::Chips;

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn client_commands_use_contract_names_and_camel_case_fields() {
        let cmd = ClientCommand::CreateRoom {
            max_players: 6,
            initial_chips: Chips(1000),
            small_blind: Chips(10),
            big_blind: Chips(20),
        };
        assert_eq!(
            serde_json::to_value(&cmd).expect("serialize"),
            json!({
                "event": "createRoom",
                "data": {"maxPlayers": 6, "initialChips": 1000, "smallBlind": 10, "bigBlind": 20}
            })
        );

        let join = ClientCommand::JoinRoom {
            room_id: RoomId::from("r1"),
            device_id: DeviceId::from("d1"),
            player_name: "SafeBot".to_string(),
        };
        let value = serde_json::to_value(&join).expect("serialize");
        assert_eq!(value["event"], json!("joinRoom"));
        assert_eq!(value["data"]["roomId"], json!("r1"));
        assert_eq!(value["data"]["playerName"], json!("SafeBot"));
        assert_eq!(join.name(), "joinRoom");
    }

    #[test]
    fn player_action_serializes_all_in_as_camel_case() {
        let cmd = ClientCommand::PlayerAction {
            action: ActionKind::AllIn,
            amount: Chips(500),
        };
        let value = serde_json::to_value(&cmd).expect("serialize");
        assert_eq!(value["event"], json!("playerAction"));
        assert_eq!(value["data"]["action"], json!("allIn"));
    }

    #[test]
    fn your_turn_maps_check_to_call_and_drops_unknown_actions() {
        let frame = RawFrame::new(
            "yourTurn",
            json!({"availableActions": ["fold", "check", "call", "dance"], "callAmount": 0, "minRaise": 20}),
        );
        let Some(ServerEvent::YourTurn(turn)) = ServerEvent::decode(&frame).expect("decode") else {
            panic!("expected yourTurn");
        };
        assert_eq!(turn.available_actions, vec![ActionKind::Fold, ActionKind::Call]);
        assert_eq!(turn.call_amount, Chips::ZERO);
        assert_eq!(turn.min_raise, Chips(20));
    }

    #[test]
    fn hand_ended_accepts_winner_in_several_shapes() {
        for (winner, expected) in [
            (json!(["d1"]), vec!["d1".to_string()]),
            (json!("d2"), vec!["d2".to_string()]),
            (json!({"id": "d3", "name": "x"}), vec!["d3".to_string()]),
            (json!([{"name": "AggroBot"}, "d4"]), vec!["AggroBot".to_string(), "d4".to_string()]),
        ] {
            let frame = RawFrame::new("handEnded", json!({"winner": winner, "pot": 150}));
            let Some(ServerEvent::HandEnded(ended)) = ServerEvent::decode(&frame).expect("decode")
            else {
                panic!("expected handEnded");
            };
            assert_eq!(ended.winner, expected);
            assert_eq!(ended.pot, Some(Chips(150)));
        }
    }

    #[test]
    fn unknown_event_names_decode_to_none() {
        let frame = RawFrame::new("chatMessage", json!({"text": "gg"}));
        assert_eq!(ServerEvent::decode(&frame).expect("decode"), None);
    }

    #[test]
    fn partial_game_state_update_leaves_missing_fields_unset() {
        let frame = RawFrame::new("gameStateUpdate", json!({"pot": 30}));
        let Some(ServerEvent::GameStateUpdate(update)) =
            ServerEvent::decode(&frame).expect("decode")
        else {
            panic!("expected gameStateUpdate");
        };
        assert_eq!(update.pot, Some(Chips(30)));
        assert!(update.players.is_none());
        assert!(update.current_bet.is_none());
        assert!(update.game_started.is_none());
    }

    #[test]
    fn cards_decode_from_codes_or_parts() {
        let frame = RawFrame::new(
            "flopDealt",
            json!({"communityCards": ["Ah", {"rank": "K", "suit": "s"}, "2c"]}),
        );
        let Some(ServerEvent::FlopDealt(dealt)) = ServerEvent::decode(&frame).expect("decode")
        else {
            panic!("expected flopDealt");
        };
        let rendered: Vec<String> = dealt.community_cards.iter().map(ToString::to_string).collect();
        assert_eq!(rendered, vec!["Ah", "Ks", "2c"]);
    }

    #[test]
    fn phase_order_allows_only_hand_end_wraparound() {
        assert!(Phase::Waiting.may_advance_to(Phase::Preflop));
        assert!(Phase::Flop.may_advance_to(Phase::Flop));
        assert!(Phase::River.may_advance_to(Phase::HandEnded));
        assert!(Phase::HandEnded.may_advance_to(Phase::Preflop));
        assert!(Phase::HandEnded.may_advance_to(Phase::Waiting));
        assert!(!Phase::Turn.may_advance_to(Phase::Flop));
        assert!(!Phase::River.may_advance_to(Phase::Preflop));
    }

    #[test]
    fn server_event_frame_names_match_tags() {
        let event = ServerEvent::RoomCreated(RoomCreated {
            room_id: RoomId::from("room-9"),
        });
        let frame = event.to_frame().expect("frame");
        assert_eq!(frame.event, "roomCreated");
        assert_eq!(frame.data, json!({"roomId": "room-9"}));
        assert_eq!(EventTag::from_name("handEnded"), Some(EventTag::HandEnded));
    }
}
