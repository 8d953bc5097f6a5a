//! Per-connection session: lifecycle state machine and frame dispatch

use std::net::SocketAddr;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::app::AppState;
use crate::game::GameRoom;
use crate::net::frame::{read_frame, write_frame, FrameError};
use crate::net::protocol::{Message, MessageKind};
use crate::store::PlayerId;
use crate::util::rate_limit::SessionRateLimiter;

/// Outbound frames buffered per session; a slow client only stalls its own room
const OUTBOX_CAPACITY: usize = 64;

/// Nickname length bounds, in characters
const NICKNAME_MIN_CHARS: usize = 2;
const NICKNAME_MAX_CHARS: usize = 10;

/// Session lifecycle. Disconnect can reach `Ended` from any state; a closed
/// room returns its sessions to `NicknameSet` so a rematch re-enqueues fresh.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Connected,
    NicknameSet,
    Queued,
    InRoom,
    Ended,
}

/// Resolved player record behind this connection
#[derive(Debug, Clone)]
pub struct PlayerIdentity {
    pub player_id: PlayerId,
    pub name: String,
}

struct SessionInner {
    state: SessionState,
    player: Option<PlayerIdentity>,
    room: Option<Arc<GameRoom>>,
}

/// Server-side representative of one connected client
///
/// Queue and room membership are mutually exclusive: the state machine only
/// reaches `InRoom` from `Queued` and only re-enters `Queued` from
/// `NicknameSet`. All side effects go through the matchmaker or the room;
/// sessions never touch each other directly.
pub struct Session {
    pub id: Uuid,
    outbox: mpsc::Sender<Message>,
    inner: Mutex<SessionInner>,
}

/// State handed back by the first (and only effective) disconnect call
struct Parting {
    room: Option<Arc<GameRoom>>,
    name: Option<String>,
}

impl Session {
    pub fn new(outbox: mpsc::Sender<Message>) -> Arc<Self> {
        Arc::new(Self {
            id: Uuid::new_v4(),
            outbox,
            inner: Mutex::new(SessionInner {
                state: SessionState::Connected,
                player: None,
                room: None,
            }),
        })
    }

    pub fn state(&self) -> SessionState {
        self.inner.lock().state
    }

    pub fn is_ended(&self) -> bool {
        self.state() == SessionState::Ended
    }

    pub fn player(&self) -> Option<PlayerIdentity> {
        self.inner.lock().player.clone()
    }

    pub fn current_room(&self) -> Option<Arc<GameRoom>> {
        self.inner.lock().room.clone()
    }

    /// Queue an outbound frame. Errors only when the writer is gone, i.e.
    /// the connection already dropped; the disconnect path handles that.
    pub async fn send(&self, msg: Message) {
        if self.outbox.send(msg).await.is_err() {
            debug!(session_id = %self.id, "Dropping frame for closed connection");
        }
    }

    /// `Connected -> NicknameSet` with the resolved identity
    pub(crate) fn adopt_identity(&self, player_id: PlayerId, name: &str) -> bool {
        let mut inner = self.inner.lock();
        if inner.state != SessionState::Connected {
            return false;
        }
        inner.state = SessionState::NicknameSet;
        inner.player = Some(PlayerIdentity {
            player_id,
            name: name.to_string(),
        });
        true
    }

    /// `NicknameSet -> Queued`; false when the session is not eligible,
    /// which also covers the session-already-in-a-room case
    pub(crate) fn mark_queued(&self) -> bool {
        let mut inner = self.inner.lock();
        if inner.state != SessionState::NicknameSet || inner.room.is_some() {
            return false;
        }
        inner.state = SessionState::Queued;
        true
    }

    /// `Queued -> InRoom`, binding the room reference
    pub(crate) fn attach_room(&self, room: &Arc<GameRoom>) -> bool {
        let mut inner = self.inner.lock();
        if inner.state != SessionState::Queued || inner.room.is_some() {
            return false;
        }
        inner.state = SessionState::InRoom;
        inner.room = Some(room.clone());
        true
    }

    /// Release the room reference when that room closes. Survivors return to
    /// `NicknameSet`; an ended session stays ended.
    pub(crate) fn detach_room(&self, room_id: Uuid) {
        let mut inner = self.inner.lock();
        let Some(room) = &inner.room else { return };
        if room.id != room_id {
            return;
        }
        inner.room = None;
        if inner.state == SessionState::InRoom {
            inner.state = SessionState::NicknameSet;
        }
    }

    /// First caller wins; everyone else sees `None`
    fn begin_disconnect(&self) -> Option<Parting> {
        let mut inner = self.inner.lock();
        if inner.state == SessionState::Ended {
            return None;
        }
        inner.state = SessionState::Ended;
        Some(Parting {
            room: inner.room.take(),
            name: inner.player.as_ref().map(|p| p.name.clone()),
        })
    }
}

/// Drive one client connection to completion
pub async fn handle_connection(stream: TcpStream, addr: SocketAddr, state: AppState) {
    let (mut read_half, write_half) = stream.into_split();
    let (outbox_tx, outbox_rx) = mpsc::channel(OUTBOX_CAPACITY);
    let session = Session::new(outbox_tx);

    info!(session_id = %session.id, %addr, "Client connected");

    let writer = tokio::spawn(write_loop(write_half, outbox_rx, session.id));

    let rate_limiter = SessionRateLimiter::new();
    loop {
        match read_frame(&mut read_half).await {
            Ok(Some(msg)) => {
                if msg.kind == MessageKind::PlayerPosition && !rate_limiter.check_gameplay() {
                    warn!(session_id = %session.id, "Rate limited position frame");
                    continue;
                }
                dispatch(&state, &session, msg).await;
            }
            Ok(None) => {
                debug!(session_id = %session.id, "Client closed the stream");
                break;
            }
            Err(FrameError::Decode(e)) => {
                // Malformed frame: drop it, keep the connection open.
                warn!(session_id = %session.id, error = %e, "Undecodable frame");
            }
            Err(FrameError::Oversize(len)) => {
                warn!(session_id = %session.id, len, "Oversized frame, closing connection");
                break;
            }
            Err(FrameError::Io(e)) => {
                debug!(session_id = %session.id, error = %e, "Stream error");
                break;
            }
        }
    }

    disconnect(&state, &session).await;
    writer.abort();
}

/// Writer task: drain the outbox onto the TCP write half
async fn write_loop(mut half: OwnedWriteHalf, mut outbox: mpsc::Receiver<Message>, id: Uuid) {
    while let Some(msg) = outbox.recv().await {
        if let Err(e) = write_frame(&mut half, &msg).await {
            debug!(session_id = %id, error = %e, "Write failed");
            break;
        }
    }
}

/// Route one inbound frame by kind and current state. Kinds that are invalid
/// for the current state are ignored, never fatal.
async fn dispatch(state: &AppState, session: &Arc<Session>, msg: Message) {
    match msg.kind {
        MessageKind::SetNickname => set_nickname(state, session, msg.payload.trim()).await,

        MessageKind::JoinQueue | MessageKind::RequestRematch => {
            state.matchmaking.enqueue(session).await;
        }

        MessageKind::PlayerPosition => match session.current_room() {
            Some(room) => room.relay_position(session.id, &msg.payload).await,
            None => debug!(session_id = %session.id, "Position frame outside a room"),
        },

        MessageKind::PlayerDied => match session.current_room() {
            Some(room) => room.report_death(session.id, &msg.payload).await,
            None => debug!(session_id = %session.id, "Death frame outside a room"),
        },

        other => {
            warn!(session_id = %session.id, kind = ?other, "Ignoring server-only kind from client");
        }
    }
}

/// Validate, claim, and resolve a nickname through the store
async fn set_nickname(state: &AppState, session: &Arc<Session>, name: &str) {
    if session.state() != SessionState::Connected {
        debug!(session_id = %session.id, "SetNickname in non-initial state ignored");
        return;
    }

    let chars = name.chars().count();
    if !(NICKNAME_MIN_CHARS..=NICKNAME_MAX_CHARS).contains(&chars) {
        session
            .send(Message::new(
                MessageKind::ConnectionError,
                "Nickname must be 2-10 characters.",
            ))
            .await;
        return;
    }

    // Duplicate means claimed by another live connection; an offline name
    // resolves to its historical record below.
    if !state.names.claim(name, session.id) {
        session.send(Message::empty(MessageKind::NicknameDuplicate)).await;
        return;
    }

    match state.store.upsert_player(name).await {
        Ok(player_id) => {
            if session.adopt_identity(player_id, name) {
                info!(session_id = %session.id, player = name, "Nickname set");
                session
                    .send(Message::new(MessageKind::NicknameAccepted, "Nickname accepted."))
                    .await;
            } else {
                // Lost a race with disconnect; nothing to reply to.
                state.names.release(name, session.id);
            }
        }
        Err(e) => {
            error!(session_id = %session.id, error = %e, "Failed to resolve player record");
            state.names.release(name, session.id);
            session
                .send(Message::new(
                    MessageKind::ConnectionError,
                    "Server error, try again.",
                ))
                .await;
        }
    }
}

/// Tear a session down. Idempotent; the first call removes the session from
/// the queue, notifies its room, and releases the nickname claim, all before
/// the connection task exits.
pub async fn disconnect(state: &AppState, session: &Arc<Session>) {
    let Some(parting) = session.begin_disconnect() else {
        return;
    };

    state.matchmaking.remove(session.id).await;

    if let Some(room) = parting.room {
        room.player_disconnected(session.id).await;
    }

    if let Some(name) = parting.name {
        state.names.release(&name, session.id);
    }

    info!(session_id = %session.id, "Session ended");
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_session() -> (Arc<Session>, mpsc::Receiver<Message>) {
        let (tx, rx) = mpsc::channel(OUTBOX_CAPACITY);
        (Session::new(tx), rx)
    }

    #[test]
    fn lifecycle_transitions() {
        let (session, _rx) = test_session();
        assert_eq!(session.state(), SessionState::Connected);

        assert!(!session.mark_queued()); // no nickname yet
        assert!(session.adopt_identity(Uuid::new_v4(), "Rex"));
        assert_eq!(session.state(), SessionState::NicknameSet);

        assert!(!session.adopt_identity(Uuid::new_v4(), "Rexy")); // only from Connected
        assert!(session.mark_queued());
        assert_eq!(session.state(), SessionState::Queued);
        assert!(!session.mark_queued()); // idempotent guard
    }

    #[test]
    fn disconnect_is_idempotent() {
        let (session, _rx) = test_session();
        session.adopt_identity(Uuid::new_v4(), "Rex");

        let first = session.begin_disconnect();
        assert!(first.is_some());
        assert_eq!(first.unwrap().name.as_deref(), Some("Rex"));
        assert!(session.begin_disconnect().is_none());
        assert_eq!(session.state(), SessionState::Ended);
    }
}
