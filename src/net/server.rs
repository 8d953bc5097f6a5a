//! TCP accept loop

use tokio::net::TcpListener;
use tracing::{error, warn};

use crate::app::AppState;
use crate::net::session;

/// Accept connections forever, one session task per client
pub async fn run(listener: TcpListener, state: AppState) {
    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                if let Err(e) = stream.set_nodelay(true) {
                    warn!(%addr, error = %e, "Could not set TCP_NODELAY");
                }
                let state = state.clone();
                tokio::spawn(async move {
                    session::handle_connection(stream, addr, state).await;
                });
            }
            Err(e) => {
                error!(error = %e, "Failed to accept connection");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::net::frame::{read_frame, write_frame};
    use crate::net::protocol::{Message, MessageKind};
    use std::net::SocketAddr;
    use std::time::Duration;
    use tokio::net::TcpStream;

    /// Protocol-speaking test client
    struct Client {
        stream: TcpStream,
    }

    impl Client {
        async fn connect(addr: SocketAddr) -> Self {
            let stream = TcpStream::connect(addr).await.unwrap();
            Self { stream }
        }

        async fn send(&mut self, kind: MessageKind, payload: &str) {
            write_frame(&mut self.stream, &Message::new(kind, payload))
                .await
                .unwrap();
        }

        async fn recv(&mut self) -> Message {
            tokio::time::timeout(Duration::from_secs(5), read_frame(&mut self.stream))
                .await
                .expect("timed out waiting for a frame")
                .unwrap()
                .expect("server closed the stream")
        }

        async fn expect(&mut self, kind: MessageKind) -> Message {
            let msg = self.recv().await;
            assert_eq!(msg.kind, kind, "unexpected message: {msg:?}");
            msg
        }
    }

    /// Poll a condition with a deadline instead of hanging the test run
    async fn wait_until(what: &str, mut cond: impl FnMut() -> bool) {
        for _ in 0..400 {
            if cond() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("never observed: {what}");
    }

    async fn start_server() -> (SocketAddr, AppState) {
        let config = Config {
            server_addr: "127.0.0.1:0".parse().unwrap(),
            log_level: "info".to_string(),
            match_tick_ms: 20,
            store_snapshot: None,
        };
        let state = AppState::new(config).unwrap();

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let matchmaking = state.matchmaking.clone();
        tokio::spawn(async move { matchmaking.run().await });
        tokio::spawn(run(listener, state.clone()));

        (addr, state)
    }

    /// One named client, ready to queue
    async fn named_client(addr: SocketAddr, name: &str) -> Client {
        let mut client = Client::connect(addr).await;
        client.send(MessageKind::SetNickname, name).await;
        client.expect(MessageKind::NicknameAccepted).await;
        client
    }

    #[tokio::test]
    async fn nickname_validation_and_duplicates() {
        let (addr, _state) = start_server().await;

        let mut client = Client::connect(addr).await;
        client.send(MessageKind::SetNickname, "A").await;
        client.expect(MessageKind::ConnectionError).await;

        // Too short is retryable on the same connection.
        client.send(MessageKind::SetNickname, "Al").await;
        client.expect(MessageKind::NicknameAccepted).await;

        let mut rival = Client::connect(addr).await;
        rival.send(MessageKind::SetNickname, "Al").await;
        rival.expect(MessageKind::NicknameDuplicate).await;

        rival.send(MessageKind::SetNickname, "Bo").await;
        rival.expect(MessageKind::NicknameAccepted).await;
    }

    #[tokio::test]
    async fn full_match_flow() {
        let (addr, state) = start_server().await;

        let mut rex = named_client(addr, "Rex").await;
        let mut dina = named_client(addr, "Dina").await;

        rex.send(MessageKind::JoinQueue, "").await;
        dina.send(MessageKind::JoinQueue, "").await;

        rex.expect(MessageKind::WaitingForMatch).await;
        dina.expect(MessageKind::WaitingForMatch).await;

        rex.expect(MessageKind::MatchFound).await;
        dina.expect(MessageKind::MatchFound).await;

        let rex_map = rex.expect(MessageKind::GameStart).await;
        let dina_map = dina.expect(MessageKind::GameStart).await;
        assert_eq!(rex_map.payload, dina_map.payload);

        // Positions cross over verbatim.
        rex.send(MessageKind::PlayerPosition, "200,15,false").await;
        let at_dina = dina.expect(MessageKind::OpponentPosition).await;
        assert_eq!(at_dina.payload, "200,15,false");

        dina.send(MessageKind::PlayerPosition, "180,57,true").await;
        let at_rex = rex.expect(MessageKind::OpponentPosition).await;
        assert_eq!(at_rex.payload, "180,57,true");

        // Rex dies at 42; Dina wins with her last reported score.
        rex.send(MessageKind::PlayerDied, "42").await;
        let died = dina.expect(MessageKind::OpponentDied).await;
        assert_eq!(died.payload, "42");

        // Exactly one record, scored from both sides' reports.
        let mut stats = state.store.get_stats("Dina").await.unwrap().unwrap();
        for _ in 0..400 {
            if stats.total_games > 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
            stats = state.store.get_stats("Dina").await.unwrap().unwrap();
        }
        assert_eq!((stats.wins, stats.highest_score), (1, 57));
        let rex_stats = state.store.get_stats("Rex").await.unwrap().unwrap();
        assert_eq!((rex_stats.losses, rex_stats.highest_score), (1, 42));

        // Both players can rematch into a fresh game once the room is gone.
        wait_until("room closed", || state.rooms.is_empty()).await;
        rex.send(MessageKind::RequestRematch, "").await;
        dina.send(MessageKind::RequestRematch, "").await;
        rex.expect(MessageKind::WaitingForMatch).await;
        dina.expect(MessageKind::WaitingForMatch).await;
        rex.expect(MessageKind::MatchFound).await;
        dina.expect(MessageKind::MatchFound).await;
    }

    #[tokio::test]
    async fn disconnect_mid_match_notifies_opponent_without_a_record() {
        let (addr, state) = start_server().await;

        let mut gone = named_client(addr, "Gone").await;
        let mut left = named_client(addr, "Left").await;

        gone.send(MessageKind::JoinQueue, "").await;
        left.send(MessageKind::JoinQueue, "").await;
        gone.expect(MessageKind::WaitingForMatch).await;
        left.expect(MessageKind::WaitingForMatch).await;
        gone.expect(MessageKind::MatchFound).await;
        left.expect(MessageKind::MatchFound).await;
        gone.expect(MessageKind::GameStart).await;
        left.expect(MessageKind::GameStart).await;

        drop(gone);

        left.expect(MessageKind::ConnectionError).await;
        wait_until("room closed", || state.rooms.is_empty()).await;

        let stats = state.store.get_stats("Left").await.unwrap().unwrap();
        assert_eq!(stats.total_games, 0);
    }

    #[tokio::test]
    async fn malformed_frames_do_not_kill_the_connection() {
        let (addr, _state) = start_server().await;

        let mut client = Client::connect(addr).await;

        // Unknown tag: logged and dropped.
        let body = b"99|junk";
        use tokio::io::AsyncWriteExt;
        client
            .stream
            .write_all(&(body.len() as u32).to_be_bytes())
            .await
            .unwrap();
        client.stream.write_all(body).await.unwrap();

        // The connection is still good for a real exchange.
        client.send(MessageKind::SetNickname, "Zed").await;
        client.expect(MessageKind::NicknameAccepted).await;
    }

    #[tokio::test]
    async fn session_that_drops_while_queued_never_matches() {
        let (addr, state) = start_server().await;

        let mut ghost = named_client(addr, "Ghost").await;
        ghost.send(MessageKind::JoinQueue, "").await;
        ghost.expect(MessageKind::WaitingForMatch).await;
        drop(ghost);

        // Wait for the disconnect to drain the queue.
        for attempt in 0.. {
            if state.matchmaking.queue_len().await == 0 {
                break;
            }
            assert!(attempt < 400, "queue never drained");
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        // The next player waits alone instead of being paired with a ghost.
        let mut one = named_client(addr, "One").await;
        one.send(MessageKind::JoinQueue, "").await;
        one.expect(MessageKind::WaitingForMatch).await;

        let lone = tokio::time::timeout(Duration::from_millis(300), one.recv()).await;
        assert!(lone.is_err(), "lone session was matched: {lone:?}");

        let mut two = named_client(addr, "Two").await;
        two.send(MessageKind::JoinQueue, "").await;
        two.expect(MessageKind::WaitingForMatch).await;

        one.expect(MessageKind::MatchFound).await;
        two.expect(MessageKind::MatchFound).await;
    }
}
