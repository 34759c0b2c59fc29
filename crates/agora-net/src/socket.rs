//! Realtime WebSocket connection task.
//!
//! `spawn_socket` starts a background task that owns the connection for its
//! whole lifetime: dialing, reading frames, writing frames, and reconnecting
//! with exponential backoff when the connection drops. Consumers talk to it
//! through a command channel and listen on a notification channel.
//!
//! Authentication failures are final: a rejected upgrade or an auth close
//! code means the session cookie is no longer good, and retrying would only
//! produce the same answer. Exhausting the retry budget parks the task in a
//! dormant state that only `SocketCommand::Reconnect` leaves.

use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use reqwest::cookie::{CookieStore, Jar};
use reqwest::Url;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::header::COOKIE;
use tokio_tungstenite::tungstenite::http::StatusCode;
use tokio_tungstenite::tungstenite::{Error as WsError, Message as WsMessage};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, error, info, warn};

use agora_shared::constants::CHANNEL_CAPACITY;
use agora_shared::protocol::{ClientFrame, ServerFrame};

use crate::backoff::ReconnectPolicy;
use crate::error::{NetError, Result};

// ---------------------------------------------------------------------------
// Commands and notifications
// ---------------------------------------------------------------------------

/// Commands accepted by the socket task.
#[derive(Debug)]
pub enum SocketCommand {
    /// Send a frame to the server.
    Send(ClientFrame),
    /// Leave the dormant state (or cycle a live connection) and dial again
    /// with a fresh retry budget.
    Reconnect,
    /// Close the connection and end the task.
    Shutdown,
}

/// Notifications emitted by the socket task.
#[derive(Debug, Clone)]
pub enum SocketNotification {
    /// A connection attempt is starting.
    Connecting { attempt: u32 },
    /// The connection is open and frames are flowing.
    Open,
    /// A frame arrived from the server.
    Frame(ServerFrame),
    /// The connection dropped; retry number `attempt` follows after
    /// `retry_in`.
    ConnectionLost { attempt: u32, retry_in: Duration },
    /// The server refused us for authentication reasons. The task ends;
    /// a fresh login is required.
    AuthRejected,
    /// The retry budget is exhausted. The task stays dormant until a
    /// `Reconnect` command arrives.
    Terminal,
}

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

/// Everything the socket task needs to dial the realtime endpoint.
#[derive(Debug, Clone)]
pub struct SocketConfig {
    /// Fully qualified WebSocket URL (`ws://` or `wss://`).
    pub ws_url: String,
    /// HTTP origin of the backend, used to look the session cookie up in
    /// the jar.
    pub http_origin: Url,
    /// Cookie jar shared with the REST client.
    pub cookies: Arc<Jar>,
    /// Backoff policy for reconnect attempts.
    pub policy: ReconnectPolicy,
}

// ---------------------------------------------------------------------------
// Spawn and event loop
// ---------------------------------------------------------------------------

/// Spawn the socket task.
///
/// Returns the command sender and the notification receiver. Dropping the
/// sender shuts the task down.
pub fn spawn_socket(
    config: SocketConfig,
) -> (
    mpsc::Sender<SocketCommand>,
    mpsc::Receiver<SocketNotification>,
) {
    let (cmd_tx, cmd_rx) = mpsc::channel::<SocketCommand>(CHANNEL_CAPACITY);
    let (notif_tx, notif_rx) = mpsc::channel::<SocketNotification>(CHANNEL_CAPACITY);

    tokio::spawn(run_socket(config, cmd_rx, notif_tx));

    (cmd_tx, notif_rx)
}

/// How one connection (or connection attempt) ended.
enum ConnectionEnd {
    /// Lost involuntarily; retry with backoff.
    Dropped,
    /// A `Reconnect` command asked for a fresh cycle.
    ManualReconnect,
    /// The server told us our session is no longer good.
    AuthRejected,
    /// A `Shutdown` command arrived or all senders are gone.
    Shutdown,
}

async fn run_socket(
    config: SocketConfig,
    mut cmd_rx: mpsc::Receiver<SocketCommand>,
    notif_tx: mpsc::Sender<SocketNotification>,
) {
    let mut attempt: u32 = 0;

    'outer: loop {
        let _ = notif_tx
            .send(SocketNotification::Connecting { attempt })
            .await;
        debug!(url = %config.ws_url, attempt, "Dialing realtime endpoint");

        let end = match connect(&config).await {
            Ok(stream) => {
                attempt = 0;
                info!(url = %config.ws_url, "Realtime connection open");
                let _ = notif_tx.send(SocketNotification::Open).await;
                drive_connection(stream, &mut cmd_rx, &notif_tx).await
            }
            Err(ref e) if is_auth_rejection(e) => ConnectionEnd::AuthRejected,
            Err(e) => {
                warn!(error = %e, "Connection attempt failed");
                ConnectionEnd::Dropped
            }
        };

        match end {
            ConnectionEnd::Dropped => {}
            ConnectionEnd::ManualReconnect => {
                attempt = 0;
                continue 'outer;
            }
            ConnectionEnd::AuthRejected => {
                warn!("Authentication rejected by server; not retrying");
                let _ = notif_tx.send(SocketNotification::AuthRejected).await;
                break 'outer;
            }
            ConnectionEnd::Shutdown => break 'outer,
        }

        if config.policy.exhausted(attempt) {
            error!(attempts = attempt, "Reconnect attempts exhausted, going dormant");
            let _ = notif_tx.send(SocketNotification::Terminal).await;
            loop {
                match cmd_rx.recv().await {
                    Some(SocketCommand::Reconnect) => {
                        info!("Manual reconnect requested");
                        attempt = 0;
                        continue 'outer;
                    }
                    Some(SocketCommand::Send(_)) => {
                        warn!("Connection is down, dropping outbound frame");
                    }
                    Some(SocketCommand::Shutdown) | None => break 'outer,
                }
            }
        }

        let delay = config.policy.delay_for(attempt);
        attempt += 1;
        let _ = notif_tx
            .send(SocketNotification::ConnectionLost {
                attempt,
                retry_in: delay,
            })
            .await;
        debug!(attempt, delay_ms = delay.as_millis() as u64, "Backing off before reconnect");

        match backoff_wait(delay, &mut cmd_rx).await {
            WaitOutcome::Elapsed => {}
            WaitOutcome::Reconnect => attempt = 0,
            WaitOutcome::Shutdown => break 'outer,
        }
    }

    info!("Socket task terminated");
}

/// Dial the endpoint, attaching the session cookie to the upgrade request.
async fn connect(config: &SocketConfig) -> Result<WebSocketStream<MaybeTlsStream<TcpStream>>> {
    let mut request = config.ws_url.as_str().into_client_request()?;

    if let Some(cookie) = config.cookies.cookies(&config.http_origin) {
        request.headers_mut().insert(COOKIE, cookie);
    }

    let (stream, response) = connect_async(request).await?;
    debug!(status = %response.status(), "WebSocket handshake complete");
    Ok(stream)
}

/// Pump one live connection until it ends, forwarding frames both ways.
async fn drive_connection(
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
    cmd_rx: &mut mpsc::Receiver<SocketCommand>,
    notif_tx: &mpsc::Sender<SocketNotification>,
) -> ConnectionEnd {
    let (mut write, mut read) = stream.split();

    loop {
        tokio::select! {
            cmd = cmd_rx.recv() => match cmd {
                Some(SocketCommand::Send(frame)) => {
                    let text = match frame.to_json() {
                        Ok(text) => text,
                        Err(e) => {
                            error!(error = %e, "Failed to encode outbound frame");
                            continue;
                        }
                    };
                    if let Err(e) = write.send(WsMessage::Text(text)).await {
                        warn!(error = %e, "Socket write failed");
                        return ConnectionEnd::Dropped;
                    }
                }
                Some(SocketCommand::Reconnect) => {
                    info!("Reconnect requested, cycling the connection");
                    let _ = write.close().await;
                    return ConnectionEnd::ManualReconnect;
                }
                Some(SocketCommand::Shutdown) | None => {
                    let _ = write.close().await;
                    return ConnectionEnd::Shutdown;
                }
            },

            msg = read.next() => match msg {
                Some(Ok(WsMessage::Text(text))) => match ServerFrame::from_json(&text) {
                    Ok(frame) => {
                        let _ = notif_tx.send(SocketNotification::Frame(frame)).await;
                    }
                    Err(e) => warn!(error = %e, "Dropping malformed server frame"),
                },
                Some(Ok(WsMessage::Close(frame))) => {
                    let code = frame.map(|f| u16::from(f.code)).unwrap_or(1005);
                    if is_auth_close(code) {
                        return ConnectionEnd::AuthRejected;
                    }
                    info!(code, "Server closed the connection");
                    return ConnectionEnd::Dropped;
                }
                // Ping and pong are handled by tungstenite itself.
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    warn!(error = %e, "Socket read error");
                    return ConnectionEnd::Dropped;
                }
                None => {
                    info!("Socket stream ended");
                    return ConnectionEnd::Dropped;
                }
            },
        }
    }
}

enum WaitOutcome {
    Elapsed,
    Reconnect,
    Shutdown,
}

/// Sleep out the backoff delay while staying responsive to commands.
async fn backoff_wait(delay: Duration, cmd_rx: &mut mpsc::Receiver<SocketCommand>) -> WaitOutcome {
    let sleep = tokio::time::sleep(delay);
    tokio::pin!(sleep);

    loop {
        tokio::select! {
            _ = &mut sleep => return WaitOutcome::Elapsed,
            cmd = cmd_rx.recv() => match cmd {
                Some(SocketCommand::Reconnect) => return WaitOutcome::Reconnect,
                Some(SocketCommand::Send(_)) => {
                    warn!("Connection is down, dropping outbound frame");
                }
                Some(SocketCommand::Shutdown) | None => return WaitOutcome::Shutdown,
            },
        }
    }
}

/// Upgrade rejections that mean the session cookie is bad.
fn is_auth_rejection(err: &NetError) -> bool {
    match err {
        NetError::Socket(WsError::Http(response)) => {
            let status = response.status();
            status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN
        }
        _ => false,
    }
}

/// Close codes that mean the session is no longer accepted: 1008 is the
/// standard policy violation, 4401 the backend's own unauthorized code.
fn is_auth_close(code: u16) -> bool {
    matches!(code, 1008 | 4401)
}

#[cfg(test)]
mod tests {
    use super::*;

    use agora_shared::types::UserId;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
    use tokio_tungstenite::tungstenite::protocol::CloseFrame;
    use tokio_tungstenite::{accept_async, accept_hdr_async};

    fn test_policy() -> ReconnectPolicy {
        ReconnectPolicy {
            base_delay: Duration::from_millis(5),
            max_delay: Duration::from_millis(20),
            max_attempts: 2,
        }
    }

    fn test_config(url: String, policy: ReconnectPolicy) -> SocketConfig {
        SocketConfig {
            ws_url: url,
            http_origin: Url::parse("http://127.0.0.1").unwrap(),
            cookies: Arc::new(Jar::default()),
            policy,
        }
    }

    async fn bind() -> (TcpListener, String) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("ws://{}/ws", listener.local_addr().unwrap());
        (listener, url)
    }

    async fn next_notif(rx: &mut mpsc::Receiver<SocketNotification>) -> SocketNotification {
        tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("timed out waiting for a socket notification")
            .expect("socket task ended unexpectedly")
    }

    #[tokio::test]
    async fn test_frames_flow_both_ways() {
        let (listener, url) = bind().await;

        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = accept_async(stream).await.unwrap();

            ws.send(WsMessage::Text(
                r#"{"type":"user_status","payload":{"userId":3,"isOnline":true}}"#.into(),
            ))
            .await
            .unwrap();

            let mut outbound = None;
            while let Some(msg) = ws.next().await {
                match msg {
                    Ok(WsMessage::Text(text)) => outbound = Some(text),
                    Ok(WsMessage::Close(_)) | Err(_) => break,
                    Ok(_) => {}
                }
            }
            outbound
        });

        let (cmd_tx, mut notif_rx) = spawn_socket(test_config(url, test_policy()));

        assert!(matches!(
            next_notif(&mut notif_rx).await,
            SocketNotification::Connecting { attempt: 0 }
        ));
        assert!(matches!(
            next_notif(&mut notif_rx).await,
            SocketNotification::Open
        ));
        match next_notif(&mut notif_rx).await {
            SocketNotification::Frame(ServerFrame::UserStatus { user_id, is_online }) => {
                assert_eq!(user_id, UserId(3));
                assert!(is_online);
            }
            other => panic!("expected a user_status frame, got {other:?}"),
        }

        cmd_tx
            .send(SocketCommand::Send(ClientFrame::PrivateMessage {
                recipient_id: UserId(7),
                content: "hello".into(),
            }))
            .await
            .unwrap();
        cmd_tx.send(SocketCommand::Shutdown).await.unwrap();

        let outbound = server.await.unwrap().expect("server saw no outbound frame");
        let value: serde_json::Value = serde_json::from_str(&outbound).unwrap();
        assert_eq!(value["type"], "private_message");
        assert_eq!(value["payload"]["recipientId"], 7);

        // Task ends after shutdown.
        assert!(notif_rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_malformed_frames_are_dropped() {
        let (listener, url) = bind().await;

        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = accept_async(stream).await.unwrap();
            ws.send(WsMessage::Text("this is not json".into())).await.unwrap();
            ws.send(WsMessage::Text(r#"{"type":"presence_blip"}"#.into()))
                .await
                .unwrap();
            ws.send(WsMessage::Text(
                r#"{"type":"user_status","payload":{"userId":9,"isOnline":false}}"#.into(),
            ))
            .await
            .unwrap();
            while ws.next().await.is_some() {}
        });

        let (cmd_tx, mut notif_rx) = spawn_socket(test_config(url, test_policy()));

        loop {
            match next_notif(&mut notif_rx).await {
                SocketNotification::Frame(frame) => {
                    assert_eq!(
                        frame,
                        ServerFrame::UserStatus {
                            user_id: UserId(9),
                            is_online: false,
                        }
                    );
                    break;
                }
                SocketNotification::Connecting { .. } | SocketNotification::Open => {}
                other => panic!("unexpected notification {other:?}"),
            }
        }

        cmd_tx.send(SocketCommand::Shutdown).await.unwrap();
    }

    #[tokio::test]
    async fn test_auth_close_code_is_fatal() {
        let (listener, url) = bind().await;

        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = accept_async(stream).await.unwrap();
            ws.close(Some(CloseFrame {
                code: CloseCode::from(4401),
                reason: "session expired".into(),
            }))
            .await
            .unwrap();
            while ws.next().await.is_some() {}
        });

        let (_cmd_tx, mut notif_rx) = spawn_socket(test_config(url, test_policy()));

        assert!(matches!(
            next_notif(&mut notif_rx).await,
            SocketNotification::Connecting { .. }
        ));
        assert!(matches!(
            next_notif(&mut notif_rx).await,
            SocketNotification::Open
        ));
        assert!(matches!(
            next_notif(&mut notif_rx).await,
            SocketNotification::AuthRejected
        ));

        // No retries follow an auth rejection.
        assert!(notif_rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_rejected_upgrade_is_fatal() {
        let (listener, url) = bind().await;

        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut buf = vec![0u8; 4096];
            let mut read = 0;
            loop {
                let n = stream.read(&mut buf[read..]).await.unwrap();
                read += n;
                if n == 0 || buf[..read].windows(4).any(|w| w == b"\r\n\r\n") {
                    break;
                }
            }
            stream
                .write_all(b"HTTP/1.1 401 Unauthorized\r\nContent-Length: 0\r\nConnection: close\r\n\r\n")
                .await
                .unwrap();
        });

        let (_cmd_tx, mut notif_rx) = spawn_socket(test_config(url, test_policy()));

        assert!(matches!(
            next_notif(&mut notif_rx).await,
            SocketNotification::Connecting { .. }
        ));
        assert!(matches!(
            next_notif(&mut notif_rx).await,
            SocketNotification::AuthRejected
        ));
        assert!(notif_rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_retries_until_terminal_then_manual_reconnect() {
        // Reserve a port, then free it so every dial is refused.
        let (listener, url) = bind().await;
        drop(listener);

        let (cmd_tx, mut notif_rx) = spawn_socket(test_config(url, test_policy()));

        assert!(matches!(
            next_notif(&mut notif_rx).await,
            SocketNotification::Connecting { attempt: 0 }
        ));
        match next_notif(&mut notif_rx).await {
            SocketNotification::ConnectionLost { attempt, retry_in } => {
                assert_eq!(attempt, 1);
                assert_eq!(retry_in, Duration::from_millis(5));
            }
            other => panic!("expected a lost notification, got {other:?}"),
        }
        assert!(matches!(
            next_notif(&mut notif_rx).await,
            SocketNotification::Connecting { attempt: 1 }
        ));
        match next_notif(&mut notif_rx).await {
            SocketNotification::ConnectionLost { attempt, retry_in } => {
                assert_eq!(attempt, 2);
                assert_eq!(retry_in, Duration::from_millis(10));
            }
            other => panic!("expected a lost notification, got {other:?}"),
        }
        assert!(matches!(
            next_notif(&mut notif_rx).await,
            SocketNotification::Connecting { attempt: 2 }
        ));
        assert!(matches!(
            next_notif(&mut notif_rx).await,
            SocketNotification::Terminal
        ));

        // Dormant until asked to try again, with a fresh budget.
        cmd_tx.send(SocketCommand::Reconnect).await.unwrap();
        assert!(matches!(
            next_notif(&mut notif_rx).await,
            SocketNotification::Connecting { attempt: 0 }
        ));

        cmd_tx.send(SocketCommand::Shutdown).await.unwrap();
        loop {
            match tokio::time::timeout(Duration::from_secs(5), notif_rx.recv())
                .await
                .expect("timed out waiting for the task to end")
            {
                Some(_) => continue,
                None => break,
            }
        }
    }

    #[tokio::test]
    async fn test_upgrade_request_carries_session_cookie() {
        let (listener, url) = bind().await;
        let (cookie_tx, cookie_rx) = tokio::sync::oneshot::channel();

        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = accept_hdr_async(stream, |req: &tokio_tungstenite::tungstenite::handshake::server::Request, resp| {
                let cookie = req
                    .headers()
                    .get("cookie")
                    .and_then(|v| v.to_str().ok())
                    .map(str::to_owned);
                let _ = cookie_tx.send(cookie);
                Ok(resp)
            })
            .await
            .unwrap();
            while ws.next().await.is_some() {}
        });

        let config = test_config(url, test_policy());
        config
            .cookies
            .add_cookie_str("session_id=abc123; Path=/", &config.http_origin);

        let (cmd_tx, mut notif_rx) = spawn_socket(config);

        assert!(matches!(
            next_notif(&mut notif_rx).await,
            SocketNotification::Connecting { .. }
        ));
        assert!(matches!(
            next_notif(&mut notif_rx).await,
            SocketNotification::Open
        ));

        let cookie = cookie_rx.await.unwrap();
        assert_eq!(cookie.as_deref(), Some("session_id=abc123"));

        cmd_tx.send(SocketCommand::Shutdown).await.unwrap();
    }
}
