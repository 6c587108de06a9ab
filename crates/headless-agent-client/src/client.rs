use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use poker_domain::{ClientCommand, EventTag, RawFrame, ServerEvent};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, warn};

#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("connection error: {0}")]
    Connection(String),
    #[error("handler already registered for {0}")]
    DuplicateHandler(&'static str),
    #[error("payload of {event} failed to decode: {source}")]
    Decode {
        event: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Outbound half of one agent's connection. Sending never fails loudly:
/// a closed connection drops the command with a warning.
#[derive(Debug, Clone)]
pub struct ChannelClient {
    label: String,
    outbound: mpsc::UnboundedSender<ClientCommand>,
}

impl ChannelClient {
    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn send(&self, command: ClientCommand) -> bool {
        let name = command.name();
        match self.outbound.send(command) {
            Ok(()) => {
                debug!(agent = %self.label, command = name, "command sent");
                true
            }
            Err(_) => {
                warn!(agent = %self.label, command = name, "connection closed, command dropped");
                false
            }
        }
    }
}

/// An established connection: the command sender plus the ordered stream of
/// inbound frames.
#[derive(Debug)]
pub struct ChannelConnection {
    pub client: ChannelClient,
    pub inbound: mpsc::UnboundedReceiver<RawFrame>,
}

/// The far side of an in-memory connection.
#[derive(Debug)]
pub struct RemoteEnd {
    pub commands: mpsc::UnboundedReceiver<ClientCommand>,
    pub events: mpsc::UnboundedSender<RawFrame>,
}

impl RemoteEnd {
    pub fn emit(&self, event: &ServerEvent) -> bool {
        match event.to_frame() {
            Ok(frame) => self.emit_raw(frame),
            Err(err) => {
                warn!(error = %err, event = event.tag().name(), "event failed to encode");
                false
            }
        }
    }

    pub fn emit_raw(&self, frame: RawFrame) -> bool {
        self.events.send(frame).is_ok()
    }
}

impl ChannelConnection {
    #[must_use]
    pub fn from_parts(
        label: impl Into<String>,
        outbound: mpsc::UnboundedSender<ClientCommand>,
        inbound: mpsc::UnboundedReceiver<RawFrame>,
    ) -> Self {
        Self {
            client: ChannelClient {
                label: label.into(),
                outbound,
            },
            inbound,
        }
    }

    #[must_use]
    pub fn in_memory(label: impl Into<String>) -> (Self, RemoteEnd) {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        (
            Self::from_parts(label, command_tx, event_rx),
            RemoteEnd {
                commands: command_rx,
                events: event_tx,
            },
        )
    }
}

#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, label: &str) -> Result<ChannelConnection, ChannelError>;
}

/// One WebSocket per agent; every text frame carries a `{event, data}` JSON
/// object.
#[derive(Debug, Clone)]
pub struct WsConnector {
    endpoint: String,
}

impl WsConnector {
    #[must_use]
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
        }
    }
}

#[async_trait]
impl Connector for WsConnector {
    async fn connect(&self, label: &str) -> Result<ChannelConnection, ChannelError> {
        let (stream, _response) = tokio_tungstenite::connect_async(self.endpoint.as_str())
            .await
            .map_err(|e| ChannelError::Connection(format!("{}: {e}", self.endpoint)))?;
        let (mut sink, mut source) = stream.split();
        let (command_tx, mut command_rx) = mpsc::unbounded_channel::<ClientCommand>();
        let (frame_tx, frame_rx) = mpsc::unbounded_channel::<RawFrame>();

        let writer_label = label.to_string();
        tokio::spawn(async move {
            while let Some(command) = command_rx.recv().await {
                let text = match serde_json::to_string(&command) {
                    Ok(text) => text,
                    Err(err) => {
                        warn!(agent = %writer_label, error = %err, "command failed to encode");
                        continue;
                    }
                };
                if let Err(err) = sink.send(Message::Text(text)).await {
                    warn!(agent = %writer_label, error = %err, "websocket write failed");
                    break;
                }
            }
            let _ = sink.close().await;
        });

        let reader_label = label.to_string();
        tokio::spawn(async move {
            while let Some(message) = source.next().await {
                match message {
                    Ok(Message::Text(text)) => match serde_json::from_str::<RawFrame>(&text) {
                        Ok(frame) => {
                            if frame_tx.send(frame).is_err() {
                                break;
                            }
                        }
                        Err(err) => {
                            warn!(agent = %reader_label, error = %err, "non-frame text dropped");
                        }
                    },
                    Ok(Message::Close(_)) => break,
                    Ok(_) => {}
                    Err(err) => {
                        warn!(agent = %reader_label, error = %err, "websocket read failed");
                        break;
                    }
                }
            }
            debug!(agent = %reader_label, "websocket reader finished");
        });

        Ok(ChannelConnection::from_parts(label, command_tx, frame_rx))
    }
}

/// Hands out prepared connections in order, then refuses.
#[derive(Debug, Default)]
pub struct InMemoryConnector {
    prepared: Mutex<VecDeque<ChannelConnection>>,
}

impl InMemoryConnector {
    #[must_use]
    pub fn new(connections: impl IntoIterator<Item = ChannelConnection>) -> Self {
        Self {
            prepared: Mutex::new(connections.into_iter().collect()),
        }
    }
}

#[async_trait]
impl Connector for InMemoryConnector {
    async fn connect(&self, label: &str) -> Result<ChannelConnection, ChannelError> {
        let mut prepared = self
            .prepared
            .lock()
            .map_err(|_| ChannelError::Connection("connector lock poisoned".to_string()))?;
        let mut connection = prepared
            .pop_front()
            .ok_or_else(|| ChannelError::Connection(format!("no connection prepared for {label}")))?;
        connection.client.label = label.to_string();
        Ok(connection)
    }
}

pub type EventHandler<S> = fn(&mut S, &ServerEvent);
pub type FrameObserver<S> = fn(&mut S, &RawFrame);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dispatch {
    Handled(EventTag),
    NoHandler(EventTag),
    Unknown,
}

/// Named-event dispatch table with a catch-all observer that sees every raw
/// frame before decoding.
pub struct EventRouter<S> {
    handlers: HashMap<EventTag, EventHandler<S>>,
    observers: Vec<FrameObserver<S>>,
}

impl<S> Default for EventRouter<S> {
    fn default() -> Self {
        Self {
            handlers: HashMap::new(),
            observers: Vec::new(),
        }
    }
}

impl<S> EventRouter<S> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on(&mut self, tag: EventTag, handler: EventHandler<S>) -> Result<(), ChannelError> {
        if self.handlers.contains_key(&tag) {
            return Err(ChannelError::DuplicateHandler(tag.name()));
        }
        self.handlers.insert(tag, handler);
        Ok(())
    }

    pub fn observe_all(&mut self, observer: FrameObserver<S>) {
        self.observers.push(observer);
    }

    pub fn dispatch(&self, state: &mut S, frame: &RawFrame) -> Result<Dispatch, ChannelError> {
        for observer in &self.observers {
            observer(state, frame);
        }
        let event = ServerEvent::decode(frame).map_err(|source| ChannelError::Decode {
            event: frame.event.clone(),
            source,
        })?;
        let Some(event) = event else {
            return Ok(Dispatch::Unknown);
        };
        let tag = event.tag();
        match self.handlers.get(&tag) {
            Some(handler) => {
                handler(state, &event);
                Ok(Dispatch::Handled(tag))
            }
            None => Ok(Dispatch::NoHandler(tag)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use poker_domain::{ActionKind, Chips, RoomCreated, RoomId};
    use serde_json::json;

    #[derive(Default)]
    struct Seen {
        frames: Vec<String>,
        rooms: Vec<RoomId>,
    }

    fn record_frame(seen: &mut Seen, frame: &RawFrame) {
        seen.frames.push(frame.event.clone());
    }

    fn record_room(seen: &mut Seen, event: &ServerEvent) {
        if let ServerEvent::RoomCreated(created) = event {
            seen.rooms.push(created.room_id.clone());
        }
    }

    #[test]
    fn second_handler_for_same_event_is_rejected() {
        let mut router = EventRouter::<Seen>::new();
        router.on(EventTag::RoomCreated, record_room).expect("first");
        let err = router
            .on(EventTag::RoomCreated, record_room)
            .expect_err("duplicate");
        assert!(matches!(err, ChannelError::DuplicateHandler("roomCreated")));
    }

    #[test]
    fn observer_sees_unknown_and_malformed_frames_handlers_do_not() {
        let mut router = EventRouter::<Seen>::new();
        router.on(EventTag::RoomCreated, record_room).expect("register");
        router.observe_all(record_frame);
        let mut seen = Seen::default();

        let unknown = RawFrame::new("chatMessage", json!({"text": "hi"}));
        assert_eq!(router.dispatch(&mut seen, &unknown).expect("unknown"), Dispatch::Unknown);

        let malformed = RawFrame::new("roomCreated", json!({"roomId": 42}));
        assert!(matches!(
            router.dispatch(&mut seen, &malformed),
            Err(ChannelError::Decode { .. })
        ));

        let ok = ServerEvent::RoomCreated(RoomCreated {
            room_id: RoomId::from("room-1"),
        })
        .to_frame()
        .expect("frame");
        assert_eq!(
            router.dispatch(&mut seen, &ok).expect("handled"),
            Dispatch::Handled(EventTag::RoomCreated)
        );

        let unhandled = RawFrame::new("gameStarted", json!({}));
        assert_eq!(
            router.dispatch(&mut seen, &unhandled).expect("no handler"),
            Dispatch::NoHandler(EventTag::GameStarted)
        );

        assert_eq!(seen.frames, ["chatMessage", "roomCreated", "roomCreated", "gameStarted"]);
        assert_eq!(seen.rooms, [RoomId::from("room-1")]);
    }

    #[tokio::test]
    async fn in_memory_pair_carries_commands_and_events_in_order() {
        let (mut connection, mut remote) = ChannelConnection::in_memory("agent-a");
        assert!(connection.client.send(ClientCommand::PlayerAction {
            action: ActionKind::Call,
            amount: Chips(20),
        }));
        let command = remote.commands.recv().await.expect("command");
        assert_eq!(command.name(), "playerAction");

        assert!(remote.emit(&ServerEvent::GameStarted));
        assert!(remote.emit(&ServerEvent::HandStarted));
        assert_eq!(connection.inbound.recv().await.expect("first").event, "gameStarted");
        assert_eq!(connection.inbound.recv().await.expect("second").event, "handStarted");
    }

    #[tokio::test]
    async fn send_after_remote_drop_reports_closed() {
        let (connection, remote) = ChannelConnection::in_memory("agent-a");
        drop(remote);
        assert!(!connection.client.send(ClientCommand::StartGame {
            room_id: RoomId::from("room-1"),
        }));
    }

    #[tokio::test]
    async fn in_memory_connector_hands_out_prepared_connections_once() {
        let (connection, _remote) = ChannelConnection::in_memory("prepared");
        let connector = InMemoryConnector::new([connection]);
        let first = connector.connect("agent-a").await.expect("first");
        assert_eq!(first.client.label(), "agent-a");
        assert!(matches!(
            connector.connect("agent-b").await,
            Err(ChannelError::Connection(_))
        ));
    }

    #[tokio::test]
    async fn unreachable_endpoint_is_a_connection_error() {
        let connector = WsConnector::new("ws://127.0.0.1:1/ws");
        assert!(matches!(
            connector.connect("agent-a").await,
            Err(ChannelError::Connection(_))
        ));
    }
}
