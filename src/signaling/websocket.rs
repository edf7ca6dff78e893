use crate::error::{CallError, Result};
use crate::signaling::{SignalingChannel, SignalingMessage, Subscription};
use crate::utils::lock;
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, info, warn};

const CLOSE_FLUSH_TIMEOUT: Duration = Duration::from_secs(1);

struct Connection {
    room_id: String,
    participant_id: String,
    outgoing: mpsc::UnboundedSender<Message>,
    writer: JoinHandle<()>,
    reader: JoinHandle<()>,
}

/// Signaling over a WebSocket relay, one socket per joined room.
///
/// Connects to `{base_url}/{room_id}` and exchanges JSON envelopes as text frames.
pub struct WebSocketSignaling {
    base_url: String,
    conn: Mutex<Option<Connection>>,
}

impl WebSocketSignaling {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            conn: Mutex::new(None),
        }
    }

    fn room_url(&self, room_id: &str) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), room_id)
    }

    fn push(&self, message: &SignalingMessage) -> Result<()> {
        let text = serde_json::to_string(message)
            .map_err(|e| CallError::SignalingUnavailable(format!("encode: {e}")))?;
        let conn = lock(&self.conn);
        let Some(conn) = conn.as_ref() else {
            return Err(CallError::SignalingUnavailable("not joined to a room".into()));
        };
        conn.outgoing
            .send(Message::Text(text))
            .map_err(|_| CallError::SignalingUnavailable("socket closed".into()))
    }

    async fn shutdown(conn: Connection) {
        let _ = conn
            .outgoing
            .send(Message::Text(
                serde_json::to_string(&SignalingMessage::leave(
                    &conn.room_id,
                    &conn.participant_id,
                ))
                .unwrap_or_default(),
            ));
        let _ = conn.outgoing.send(Message::Close(None));
        drop(conn.outgoing);

        if tokio::time::timeout(CLOSE_FLUSH_TIMEOUT, conn.writer)
            .await
            .is_err()
        {
            debug!("socket writer did not drain in time");
        }
        conn.reader.abort();
        info!(room_id = %conn.room_id, "left signaling room");
    }
}

#[async_trait]
impl SignalingChannel for WebSocketSignaling {
    async fn join(&self, room_id: &str, participant_id: &str) -> Result<Subscription> {
        let previous = lock(&self.conn).take();
        if let Some(previous) = previous {
            Self::shutdown(previous).await;
        }

        let url = self.room_url(room_id);
        let (ws_stream, _) = connect_async(url.as_str()).await.map_err(|e| {
            warn!(url = %url, error = %e, "signaling connect failed");
            CallError::SignalingUnavailable(format!("connect {url}: {e}"))
        })?;
        info!(url = %url, participant_id, "signaling socket connected");

        let (mut ws_write, mut ws_read) = ws_stream.split();
        let (out_tx, mut out_rx) = mpsc::unbounded_channel::<Message>();
        let (in_tx, in_rx) = mpsc::unbounded_channel();

        let writer = tokio::spawn(async move {
            while let Some(frame) = out_rx.recv().await {
                let closing = matches!(frame, Message::Close(_));
                if ws_write.send(frame).await.is_err() || closing {
                    break;
                }
            }
        });

        let room = room_id.to_owned();
        let me = participant_id.to_owned();
        let reader = tokio::spawn(async move {
            while let Some(frame) = ws_read.next().await {
                match frame {
                    Ok(Message::Text(text)) => match serde_json::from_str::<SignalingMessage>(&text) {
                        Ok(msg) if msg.room_id == room && msg.sender_id != me => {
                            if in_tx.send(msg).is_err() {
                                break;
                            }
                        }
                        Ok(msg) => debug!(kind = msg.kind(), "ignoring message for another room or from self"),
                        Err(e) => warn!(error = %e, "malformed signaling frame"),
                    },
                    Ok(Message::Close(_)) => break,
                    Ok(_) => {}
                    Err(e) => {
                        warn!(error = %e, "signaling socket error");
                        break;
                    }
                }
            }
            debug!(room_id = %room, "signaling reader finished");
        });

        *lock(&self.conn) = Some(Connection {
            room_id: room_id.to_owned(),
            participant_id: participant_id.to_owned(),
            outgoing: out_tx,
            writer,
            reader,
        });

        self.push(&SignalingMessage::join(room_id, participant_id))?;
        Ok(Subscription::new(room_id, in_rx))
    }

    async fn send(&self, message: SignalingMessage) -> Result<()> {
        self.push(&message)
    }

    async fn leave(&self) -> Result<()> {
        let conn = lock(&self.conn).take();
        if let Some(conn) = conn {
            Self::shutdown(conn).await;
        }
        Ok(())
    }
}

impl Drop for WebSocketSignaling {
    fn drop(&mut self) {
        if let Some(conn) = lock(&self.conn).take() {
            conn.writer.abort();
            conn.reader.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signaling::SignalBody;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_join_send_and_filter() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();

            let Some(Ok(Message::Text(first))) = ws.next().await else {
                panic!("expected join frame");
            };
            let join: SignalingMessage = serde_json::from_str(&first).unwrap();
            assert_eq!(join.body, SignalBody::Join);

            for msg in [
                SignalingMessage::join("other-room", "bob"),
                SignalingMessage::join("room-1", "alice"),
                SignalingMessage::join("room-1", "bob"),
            ] {
                let text = serde_json::to_string(&msg).unwrap();
                ws.send(Message::Text(text)).await.unwrap();
            }

            let mut received = Vec::new();
            while let Some(Ok(frame)) = ws.next().await {
                if let Message::Text(text) = frame {
                    let msg: SignalingMessage = serde_json::from_str(&text).unwrap();
                    received.push(msg.kind());
                }
            }
            received
        });

        let signaling = WebSocketSignaling::new(format!("ws://{addr}/"));
        let mut sub = signaling.join("room-1", "alice").await.unwrap();

        let msg = sub.recv().await.unwrap();
        assert_eq!(msg.sender_id, "bob");
        assert_eq!(msg.room_id, "room-1");

        signaling
            .send(SignalingMessage::join("room-1", "alice"))
            .await
            .unwrap();
        signaling.leave().await.unwrap();
        signaling.leave().await.unwrap();

        assert_eq!(server.await.unwrap(), vec!["join", "leave"]);
    }

    #[tokio::test]
    async fn test_unreachable_relay() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let signaling = WebSocketSignaling::new(format!("ws://{addr}"));
        assert!(matches!(
            signaling.join("room-1", "alice").await,
            Err(CallError::SignalingUnavailable(_))
        ));
        assert!(signaling
            .send(SignalingMessage::join("room-1", "alice"))
            .await
            .is_err());
    }
}
