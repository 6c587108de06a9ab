//! Scripted stand-in for the remote poker service. It speaks the same event
//! contract but deals canned boards and rotates the winner instead of
//! evaluating hands.

pub mod ws;

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use poker_domain::{
    ActionKind, Card, CardsDealt, Chips, ClientCommand, DeviceId, DeviceRegistered,
    GameStateUpdate, HandEnded, PlayerSeat, RawFrame, RoomCreated, RoomId, ServerEvent,
    ServiceError, SocketId, YourTurn,
};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

pub use ws::serve_ws;

type ConnId = u64;

const DECK: [&str; 26] = [
    "Ah", "Kd", "7c", "2s", "Jh", "9d", "Qs", "3c", "Tc", "5h", "8s", "4d", "6c", "Ad", "Ks",
    "2h", "Jc", "9s", "Qh", "3d", "Td", "5s", "8h", "4c", "6s", "7d",
];

#[derive(Debug, Clone)]
pub struct TableSettings {
    /// Pause between a hand end and the next hand start.
    pub hand_pause: Duration,
    /// Stop dealing after this many hands per room.
    pub max_hands: Option<u64>,
}

impl Default for TableSettings {
    fn default() -> Self {
        Self {
            hand_pause: Duration::from_millis(200),
            max_hands: None,
        }
    }
}

/// One command as the table received it.
#[derive(Debug, Clone)]
pub struct JournalEntry {
    pub connection: String,
    pub command: ClientCommand,
}

#[derive(Debug)]
enum TableInput {
    Attach {
        conn: ConnId,
        label: String,
        events: mpsc::UnboundedSender<RawFrame>,
    },
    Command {
        conn: ConnId,
        command: ClientCommand,
    },
    Detach {
        conn: ConnId,
    },
    NextHand {
        room_id: RoomId,
    },
    Journal {
        reply: oneshot::Sender<Vec<JournalEntry>>,
    },
}

#[derive(Debug, Clone)]
pub struct TableHandle {
    sender: mpsc::UnboundedSender<TableInput>,
    next_conn: Arc<AtomicU64>,
}

impl TableHandle {
    /// Opens a connection: commands go in through the sender, events come out
    /// of the receiver in the order the table emitted them.
    pub fn attach(
        &self,
        label: &str,
    ) -> (
        mpsc::UnboundedSender<ClientCommand>,
        mpsc::UnboundedReceiver<RawFrame>,
    ) {
        let conn = self.next_conn.fetch_add(1, Ordering::Relaxed);
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (command_tx, mut command_rx) = mpsc::unbounded_channel();
        let _ = self.sender.send(TableInput::Attach {
            conn,
            label: label.to_string(),
            events: event_tx,
        });
        let sender = self.sender.clone();
        tokio::spawn(async move {
            while let Some(command) = command_rx.recv().await {
                if sender.send(TableInput::Command { conn, command }).is_err() {
                    return;
                }
            }
            let _ = sender.send(TableInput::Detach { conn });
        });
        (command_tx, event_rx)
    }

    pub async fn journal(&self) -> Result<Vec<JournalEntry>, String> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(TableInput::Journal { reply: tx })
            .map_err(|_| "table stopped".to_string())?;
        rx.await.map_err(|_| "table dropped reply".to_string())
    }
}

#[derive(Debug)]
struct Connection {
    label: String,
    socket_id: SocketId,
    events: mpsc::UnboundedSender<RawFrame>,
    device_id: Option<DeviceId>,
    room_id: Option<RoomId>,
}

#[derive(Debug)]
struct Seat {
    conn: ConnId,
    device_id: DeviceId,
    name: String,
    chips: Chips,
    folded: bool,
}

#[derive(Debug)]
struct HandProgress {
    street: u8,
    to_act: VecDeque<usize>,
    awaiting: Option<usize>,
    pot: Chips,
    current_bet: Chips,
    board: Vec<Card>,
}

#[derive(Debug)]
struct Room {
    id: RoomId,
    max_players: usize,
    initial_chips: Chips,
    small_blind: Chips,
    big_blind: Chips,
    seats: Vec<Seat>,
    started: bool,
    hands_dealt: u64,
    hand: Option<HandProgress>,
}

struct Table {
    settings: TableSettings,
    inbox: mpsc::WeakUnboundedSender<TableInput>,
    connections: HashMap<ConnId, Connection>,
    rooms: HashMap<RoomId, Room>,
    journal: Vec<JournalEntry>,
    next_room: u64,
}

pub fn spawn_table(settings: TableSettings) -> TableHandle {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let mut table = Table {
        settings,
        inbox: tx.downgrade(),
        connections: HashMap::new(),
        rooms: HashMap::new(),
        journal: Vec::new(),
        next_room: 1,
    };

    tokio::spawn(async move {
        while let Some(input) = rx.recv().await {
            match input {
                TableInput::Attach {
                    conn,
                    label,
                    events,
                } => {
                    debug!(conn, %label, "connection attached");
                    table.connections.insert(
                        conn,
                        Connection {
                            label,
                            socket_id: SocketId::from(format!("socket-{conn}")),
                            events,
                            device_id: None,
                            room_id: None,
                        },
                    );
                }
                TableInput::Command { conn, command } => table.on_command(conn, command),
                TableInput::Detach { conn } => table.on_detach(conn),
                TableInput::NextHand { room_id } => table.start_hand(&room_id),
                TableInput::Journal { reply } => {
                    let _ = reply.send(table.journal.clone());
                }
            }
        }
    });

    TableHandle {
        sender: tx,
        next_conn: Arc::new(AtomicU64::new(1)),
    }
}

impl Table {
    fn on_command(&mut self, conn: ConnId, command: ClientCommand) {
        let Some(connection) = self.connections.get(&conn) else {
            return;
        };
        self.journal.push(JournalEntry {
            connection: connection.label.clone(),
            command: command.clone(),
        });
        match command {
            ClientCommand::RegisterDevice { device_id } => {
                let socket_id = connection.socket_id.clone();
                if let Some(connection) = self.connections.get_mut(&conn) {
                    connection.device_id = Some(device_id.clone());
                }
                self.send_to(
                    conn,
                    &ServerEvent::DeviceRegistered(DeviceRegistered {
                        device_id,
                        socket_id: Some(socket_id),
                    }),
                );
            }
            ClientCommand::CreateRoom {
                max_players,
                initial_chips,
                small_blind,
                big_blind,
            } => self.create_room(conn, max_players, initial_chips, small_blind, big_blind),
            ClientCommand::JoinRoom {
                room_id,
                device_id,
                player_name,
            } => self.join_room(conn, &room_id, device_id, player_name),
            ClientCommand::StartGame { room_id } => self.start_game(conn, &room_id),
            ClientCommand::PlayerAction { action, amount } => {
                self.player_action(conn, action, amount);
            }
        }
    }

    fn on_detach(&mut self, conn: ConnId) {
        let Some(connection) = self.connections.remove(&conn) else {
            return;
        };
        debug!(conn, label = %connection.label, "connection detached");
        let Some(room_id) = connection.room_id else {
            return;
        };
        let awaiting_detached = match self.rooms.get_mut(&room_id) {
            Some(room) => {
                let seat = room.seats.iter().position(|s| s.conn == conn);
                if let Some(index) = seat {
                    room.seats[index].folded = true;
                }
                room.hand
                    .as_ref()
                    .is_some_and(|hand| seat.is_some() && hand.awaiting == seat)
            }
            None => false,
        };
        if awaiting_detached {
            self.prompt_next(&room_id);
        }
    }

    fn create_room(
        &mut self,
        conn: ConnId,
        max_players: u8,
        initial_chips: Chips,
        small_blind: Chips,
        big_blind: Chips,
    ) {
        let Some(device_id) = self.connections.get(&conn).and_then(|c| c.device_id.clone())
        else {
            self.send_error(conn, "register the device before creating a room");
            return;
        };
        let room_id = RoomId::from(format!("room-{}", self.next_room));
        self.next_room += 1;
        let seat = Seat {
            conn,
            name: device_id.as_str().to_string(),
            device_id,
            chips: initial_chips,
            folded: false,
        };
        self.rooms.insert(
            room_id.clone(),
            Room {
                id: room_id.clone(),
                max_players: usize::from(max_players.max(2)),
                initial_chips,
                small_blind,
                big_blind,
                seats: vec![seat],
                started: false,
                hands_dealt: 0,
                hand: None,
            },
        );
        if let Some(connection) = self.connections.get_mut(&conn) {
            connection.room_id = Some(room_id.clone());
        }
        info!(%room_id, conn, "room created");
        self.send_to(
            conn,
            &ServerEvent::RoomCreated(RoomCreated {
                room_id: room_id.clone(),
            }),
        );
        self.broadcast_roster(&room_id);
    }

    fn join_room(&mut self, conn: ConnId, room_id: &RoomId, device_id: DeviceId, name: String) {
        let Some(room) = self.rooms.get_mut(room_id) else {
            self.send_error(conn, &format!("room {room_id} not found"));
            return;
        };
        if room.seats.iter().any(|s| s.conn == conn) {
            self.send_error(conn, "already seated");
            return;
        }
        if room.seats.len() >= room.max_players {
            self.send_error(conn, "room is full");
            return;
        }
        room.seats.push(Seat {
            conn,
            device_id,
            name,
            chips: room.initial_chips,
            folded: room.hand.is_some(),
        });
        if let Some(connection) = self.connections.get_mut(&conn) {
            connection.room_id = Some(room_id.clone());
        }
        info!(%room_id, conn, "player joined");
        self.broadcast_roster(room_id);
    }

    fn start_game(&mut self, conn: ConnId, room_id: &RoomId) {
        let Some(room) = self.rooms.get_mut(room_id) else {
            self.send_error(conn, &format!("room {room_id} not found"));
            return;
        };
        if room.started {
            self.send_error(conn, "game already started");
            return;
        }
        if room.seats.len() < 2 {
            self.send_error(conn, "need at least two players");
            return;
        }
        room.started = true;
        info!(%room_id, players = room.seats.len(), "game started");
        self.broadcast(room_id, &ServerEvent::GameStarted);
        self.start_hand(room_id);
    }

    fn start_hand(&mut self, room_id: &RoomId) {
        let Some(room) = self.rooms.get_mut(room_id) else {
            return;
        };
        if !room.started || room.hand.is_some() {
            return;
        }
        for seat in &mut room.seats {
            seat.folded = false;
        }
        let number = room.hands_dealt;
        room.hands_dealt += 1;
        let offset = (number as usize * 5) % DECK.len();
        let board = (0..5)
            .map(|i| Card::Code(DECK[(offset + i) % DECK.len()].to_string()))
            .collect();
        let seats = room.seats.len();
        let first = (number as usize) % seats;
        room.hand = Some(HandProgress {
            street: 0,
            to_act: (0..seats).map(|i| (first + i) % seats).collect(),
            awaiting: None,
            pot: room.small_blind.saturating_add(room.big_blind),
            current_bet: room.big_blind,
            board,
        });
        debug!(room_id = %room.id, hand = number + 1, "hand started");
        self.broadcast(room_id, &ServerEvent::HandStarted);
        self.broadcast_roster(room_id);
        self.prompt_next(room_id);
    }

    fn prompt_next(&mut self, room_id: &RoomId) {
        let Some(room) = self.rooms.get_mut(room_id) else {
            return;
        };
        let Some(hand) = room.hand.as_mut() else {
            return;
        };
        let live: Vec<usize> = (0..room.seats.len())
            .filter(|i| !room.seats[*i].folded)
            .collect();
        if live.len() <= 1 {
            let winner = live.first().copied();
            self.end_hand(room_id, winner);
            return;
        }
        let next = loop {
            match hand.to_act.pop_front() {
                Some(index) if room.seats.get(index).is_some_and(|s| !s.folded) => {
                    break Some(index);
                }
                Some(_) => continue,
                None => break None,
            }
        };
        let Some(index) = next else {
            self.advance_street(room_id);
            return;
        };
        hand.awaiting = Some(index);
        let big_blind = room.big_blind;
        let turn = ServerEvent::YourTurn(YourTurn {
            available_actions: ActionKind::ALL.to_vec(),
            call_amount: hand.current_bet,
            min_raise: Chips(hand.current_bet.as_u64().max(big_blind.as_u64()) * 2),
        });
        let conn = room.seats[index].conn;
        self.send_to(conn, &turn);
    }

    fn advance_street(&mut self, room_id: &RoomId) {
        let Some(room) = self.rooms.get_mut(room_id) else {
            return;
        };
        let Some(hand) = room.hand.as_mut() else {
            return;
        };
        hand.street += 1;
        hand.current_bet = Chips::ZERO;
        let dealt = match hand.street {
            1 => ServerEvent::FlopDealt(CardsDealt {
                community_cards: hand.board[..3].to_vec(),
            }),
            2 => ServerEvent::TurnDealt(CardsDealt {
                community_cards: hand.board[..4].to_vec(),
            }),
            3 => ServerEvent::RiverDealt(CardsDealt {
                community_cards: hand.board.clone(),
            }),
            _ => {
                let live: Vec<usize> = (0..room.seats.len())
                    .filter(|i| !room.seats[*i].folded)
                    .collect();
                let winner = if live.is_empty() {
                    None
                } else {
                    Some(live[(room.hands_dealt as usize) % live.len()])
                };
                self.end_hand(room_id, winner);
                return;
            }
        };
        let seats = room.seats.len();
        hand.to_act = (0..seats).filter(|i| !room.seats[*i].folded).collect();
        self.broadcast(room_id, &dealt);
        self.prompt_next(room_id);
    }

    fn player_action(&mut self, conn: ConnId, action: ActionKind, amount: Chips) {
        let Some(room_id) = self.connections.get(&conn).and_then(|c| c.room_id.clone()) else {
            self.send_error(conn, "not seated");
            return;
        };
        let Some(room) = self.rooms.get_mut(&room_id) else {
            return;
        };
        let seat_index = room.seats.iter().position(|s| s.conn == conn);
        let Some(hand) = room.hand.as_mut().filter(|h| h.awaiting.is_some() && h.awaiting == seat_index)
        else {
            self.send_error(conn, "not your turn");
            return;
        };
        hand.awaiting = None;
        match action {
            ActionKind::Fold => {
                if let Some(index) = seat_index {
                    room.seats[index].folded = true;
                }
            }
            ActionKind::Call => hand.pot = hand.pot.saturating_add(hand.current_bet),
            ActionKind::Raise | ActionKind::AllIn => {
                hand.pot = hand.pot.saturating_add(amount);
                hand.current_bet = hand.current_bet.max(amount);
            }
        }
        let update = ServerEvent::GameStateUpdate(GameStateUpdate {
            pot: Some(hand.pot),
            current_bet: Some(hand.current_bet),
            ..GameStateUpdate::default()
        });
        self.broadcast(&room_id, &update);
        self.prompt_next(&room_id);
    }

    fn end_hand(&mut self, room_id: &RoomId, winner: Option<usize>) {
        let Some(room) = self.rooms.get_mut(room_id) else {
            return;
        };
        let Some(hand) = room.hand.take() else {
            return;
        };
        let winners = match winner.and_then(|i| room.seats.get_mut(i)) {
            Some(seat) => {
                seat.chips = seat.chips.saturating_add(hand.pot);
                vec![seat.device_id.as_str().to_string()]
            }
            None => Vec::new(),
        };
        let finished = self
            .settings
            .max_hands
            .is_some_and(|max| room.hands_dealt >= max);
        if finished {
            room.started = false;
        }
        debug!(%room_id, ?winners, pot = hand.pot.as_u64(), "hand ended");
        self.broadcast(
            room_id,
            &ServerEvent::HandEnded(HandEnded {
                winner: winners,
                pot: Some(hand.pot),
            }),
        );
        if finished {
            info!(%room_id, "hand budget reached, game over");
            self.broadcast(
                room_id,
                &ServerEvent::GameStateUpdate(GameStateUpdate {
                    game_started: Some(false),
                    ..GameStateUpdate::default()
                }),
            );
            return;
        }
        let Some(inbox) = self.inbox.upgrade() else {
            return;
        };
        let room_id = room_id.clone();
        let pause = self.settings.hand_pause;
        tokio::spawn(async move {
            tokio::time::sleep(pause).await;
            let _ = inbox.send(TableInput::NextHand { room_id });
        });
    }

    fn broadcast_roster(&self, room_id: &RoomId) {
        let Some(room) = self.rooms.get(room_id) else {
            return;
        };
        let update = ServerEvent::GameStateUpdate(GameStateUpdate {
            players: Some(
                room.seats
                    .iter()
                    .map(|seat| PlayerSeat {
                        id: seat.device_id.as_str().to_string(),
                        name: seat.name.clone(),
                        chips: seat.chips,
                    })
                    .collect(),
            ),
            pot: room.hand.as_ref().map(|h| h.pot),
            current_bet: room.hand.as_ref().map(|h| h.current_bet),
            game_started: Some(room.started),
        });
        self.broadcast(room_id, &update);
    }

    fn broadcast(&self, room_id: &RoomId, event: &ServerEvent) {
        let Some(room) = self.rooms.get(room_id) else {
            return;
        };
        for seat in &room.seats {
            self.send_to(seat.conn, event);
        }
    }

    fn send_to(&self, conn: ConnId, event: &ServerEvent) {
        let Some(connection) = self.connections.get(&conn) else {
            return;
        };
        match event.to_frame() {
            Ok(frame) => {
                let _ = connection.events.send(frame);
            }
            Err(err) => warn!(conn, error = %err, "event failed to encode"),
        }
    }

    fn send_error(&self, conn: ConnId, message: &str) {
        self.send_to(
            conn,
            &ServerEvent::Error(ServiceError {
                message: message.to_string(),
            }),
        );
    }
}
