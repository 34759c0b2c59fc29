//! The chat session task.
//!
//! `spawn_session` starts the actor that owns all conversation state: which
//! peer is active, per-peer pagination cursors, the presence roster, and
//! the scroll throttle. It listens on three sources at once: commands from
//! the consumer, notifications from the socket task, and the outcomes of
//! the REST fetches it spawned. Consumers only ever see `SessionEvent`s.
//!
//! History responses are checked against the conversation state before they
//! are applied: a page that was requested for a peer who is no longer
//! active, or at an offset the pagination no longer expects, is discarded.
//! If that happens while the active transcript is still empty, the initial
//! fetch is issued again for the right peer.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use agora_net::{ApiClient, NetError, SocketCommand, SocketNotification};
use agora_shared::constants::CHANNEL_CAPACITY;
use agora_shared::protocol::{ClientFrame, ServerFrame};
use agora_shared::types::{Message, PresenceEntry, UserId};

use crate::auth::SessionHandle;
use crate::config::ClientConfig;
use crate::history::{ConversationPager, PendingFetch};
use crate::presence::PresenceRoster;
use crate::throttle::ScrollThrottle;

// ---------------------------------------------------------------------------
// Commands and events
// ---------------------------------------------------------------------------

/// Commands accepted by the session task.
#[derive(Debug)]
pub enum SessionCommand {
    /// Make `peer` the active conversation and load its newest page.
    OpenConversation { peer: UserId },
    /// Scroll-to-top signal: fetch the next older page for the active
    /// conversation.
    LoadOlderMessages,
    /// Send a private message to the active peer.
    SendMessage { content: String },
    /// Re-fetch the presence roster.
    RefreshPresence,
    /// Leave the terminal connection-lost state and dial again.
    ReconnectSocket,
    /// End the session, closing the socket.
    Shutdown,
}

/// Events emitted by the session task.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// A conversation became active. Its transcript starts empty and the
    /// peer's unread badge is zeroed; the first history page follows.
    ConversationOpened { peer: UserId },
    /// A history page, oldest message first, ready to prepend to the
    /// transcript.
    HistoryLoaded {
        peer: UserId,
        messages: Vec<Message>,
        /// This page is the start of the conversation; no more will come.
        reached_beginning: bool,
        /// First page since the conversation was opened.
        initial: bool,
    },
    /// A history fetch failed. The cursor is unchanged, so the same page
    /// can be requested again.
    HistoryFailed { peer: UserId },
    /// A realtime message involving the active conversation, in arrival
    /// order. Includes the echo of our own sends.
    MessageReceived(Message),
    /// The roster changed: a wholesale refresh or an in-place patch.
    PresenceUpdated(Vec<PresenceEntry>),
    /// The socket is dialing.
    SocketConnecting { attempt: u32 },
    /// The socket is open and realtime frames are flowing.
    SocketOpen,
    /// The socket dropped; retry number `attempt` follows after `retry_in`.
    SocketLost { attempt: u32, retry_in: Duration },
    /// All reconnect attempts failed; `ReconnectSocket` is required.
    SocketTerminal,
    /// The backend no longer accepts our session. Log in again.
    SessionExpired,
}

// ---------------------------------------------------------------------------
// REST seam
// ---------------------------------------------------------------------------

/// The two REST calls the session loop issues on its own.
#[async_trait]
pub trait ChatApi: Send + Sync {
    /// One history page for the conversation with `peer`, newest first.
    async fn messages(
        &self,
        peer: UserId,
        offset: u32,
        limit: u32,
    ) -> Result<Vec<Message>, NetError>;

    /// The presence roster, unsorted.
    async fn users(&self) -> Result<Vec<PresenceEntry>, NetError>;
}

#[async_trait]
impl ChatApi for ApiClient {
    async fn messages(
        &self,
        peer: UserId,
        offset: u32,
        limit: u32,
    ) -> Result<Vec<Message>, NetError> {
        ApiClient::messages(self, peer, offset, limit).await
    }

    async fn users(&self) -> Result<Vec<PresenceEntry>, NetError> {
        ApiClient::users(self).await
    }
}

// ---------------------------------------------------------------------------
// Spawn and event loop
// ---------------------------------------------------------------------------

/// Outcomes of the REST tasks the session spawns.
enum TaskOutcome {
    History {
        fetch: PendingFetch,
        result: Result<Vec<Message>, NetError>,
    },
    Presence {
        result: Result<Vec<PresenceEntry>, NetError>,
    },
}

/// Spawn the session task for the logged-in `local_user`.
///
/// Returns the command sender and the event receiver. Dropping the sender
/// shuts the session down.
pub fn spawn_session<A>(
    api: Arc<A>,
    auth: SessionHandle,
    socket_tx: mpsc::Sender<SocketCommand>,
    mut socket_rx: mpsc::Receiver<SocketNotification>,
    local_user: UserId,
    config: ClientConfig,
) -> (mpsc::Sender<SessionCommand>, mpsc::Receiver<SessionEvent>)
where
    A: ChatApi + 'static,
{
    let (cmd_tx, mut cmd_rx) = mpsc::channel::<SessionCommand>(CHANNEL_CAPACITY);
    let (event_tx, event_rx) = mpsc::channel::<SessionEvent>(CHANNEL_CAPACITY);

    tokio::spawn(async move {
        let (outcome_tx, mut outcome_rx) = mpsc::channel::<TaskOutcome>(CHANNEL_CAPACITY);

        let mut pager = ConversationPager::new();
        let mut roster = PresenceRoster::new(local_user);
        let mut throttle = ScrollThrottle::new(config.scroll_throttle);
        let mut active_peer: Option<UserId> = None;
        // Whether the active conversation has received its initial page.
        let mut transcript_loaded = false;
        let mut presence_inflight = false;
        let mut presence_dirty = false;
        let page_size = config.page_size;

        info!(user = %local_user, "Chat session started");

        loop {
            tokio::select! {
                cmd = cmd_rx.recv() => match cmd {
                    Some(SessionCommand::OpenConversation { peer }) => {
                        if active_peer == Some(peer) {
                            debug!(peer = %peer, "Conversation already active");
                            continue;
                        }

                        active_peer = Some(peer);
                        transcript_loaded = false;
                        pager.reset(peer);
                        roster.clear_unread(peer);
                        let _ = event_tx.send(SessionEvent::ConversationOpened { peer }).await;

                        match pager.begin(peer) {
                            Some(fetch) => {
                                spawn_history_fetch(&api, &outcome_tx, fetch, page_size);
                            }
                            // A fetch for the previous conversation still holds
                            // the slot; the initial load happens once it lands.
                            None => debug!(peer = %peer, "Deferring initial load behind in-flight fetch"),
                        }
                    }

                    Some(SessionCommand::LoadOlderMessages) => {
                        let peer = match active_peer {
                            Some(peer) => peer,
                            None => continue,
                        };
                        if !throttle.allow() {
                            debug!(peer = %peer, "Scroll trigger throttled");
                            continue;
                        }
                        if let Some(fetch) = pager.begin(peer) {
                            spawn_history_fetch(&api, &outcome_tx, fetch, page_size);
                        }
                    }

                    Some(SessionCommand::SendMessage { content }) => {
                        let peer = match active_peer {
                            Some(peer) => peer,
                            None => {
                                warn!("No active conversation, dropping outbound message");
                                continue;
                            }
                        };
                        let frame = ClientFrame::PrivateMessage {
                            recipient_id: peer,
                            content,
                        };
                        if socket_tx.send(SocketCommand::Send(frame)).await.is_err() {
                            warn!("Socket task is gone, dropping outbound message");
                        }
                    }

                    Some(SessionCommand::RefreshPresence) => {
                        schedule_presence_refresh(
                            &api,
                            &outcome_tx,
                            &mut presence_inflight,
                            &mut presence_dirty,
                        );
                    }

                    Some(SessionCommand::ReconnectSocket) => {
                        let _ = socket_tx.send(SocketCommand::Reconnect).await;
                    }

                    Some(SessionCommand::Shutdown) | None => {
                        let _ = socket_tx.send(SocketCommand::Shutdown).await;
                        break;
                    }
                },

                notif = socket_rx.recv() => match notif {
                    Some(SocketNotification::Frame(ServerFrame::NewMessage(message))) => {
                        let involves_active = active_peer
                            .map(|peer| message.sender_id == peer || message.recipient_id == peer)
                            .unwrap_or(false);

                        if involves_active {
                            let _ = event_tx.send(SessionEvent::MessageReceived(message)).await;
                        } else if message.sender_id != local_user {
                            roster.note_unread(
                                message.sender_id,
                                &message.content,
                                message.timestamp,
                            );
                            let _ = event_tx
                                .send(SessionEvent::PresenceUpdated(roster.snapshot()))
                                .await;
                        }

                        // The roster's recency and previews changed either way.
                        schedule_presence_refresh(
                            &api,
                            &outcome_tx,
                            &mut presence_inflight,
                            &mut presence_dirty,
                        );
                    }

                    Some(SocketNotification::Frame(ServerFrame::UserStatus { user_id, is_online })) => {
                        roster.set_online(user_id, is_online);
                        let _ = event_tx
                            .send(SessionEvent::PresenceUpdated(roster.snapshot()))
                            .await;
                        schedule_presence_refresh(
                            &api,
                            &outcome_tx,
                            &mut presence_inflight,
                            &mut presence_dirty,
                        );
                    }

                    Some(SocketNotification::Connecting { attempt }) => {
                        let _ = event_tx.send(SessionEvent::SocketConnecting { attempt }).await;
                    }

                    Some(SocketNotification::Open) => {
                        let _ = event_tx.send(SessionEvent::SocketOpen).await;
                        schedule_presence_refresh(
                            &api,
                            &outcome_tx,
                            &mut presence_inflight,
                            &mut presence_dirty,
                        );
                    }

                    Some(SocketNotification::ConnectionLost { attempt, retry_in }) => {
                        let _ = event_tx
                            .send(SessionEvent::SocketLost { attempt, retry_in })
                            .await;
                    }

                    Some(SocketNotification::Terminal) => {
                        let _ = event_tx.send(SessionEvent::SocketTerminal).await;
                    }

                    Some(SocketNotification::AuthRejected) => {
                        warn!("Realtime connection rejected, session expired");
                        auth.clear();
                        let _ = event_tx.send(SessionEvent::SessionExpired).await;
                    }

                    None => {
                        warn!("Socket notification channel closed");
                        break;
                    }
                },

                outcome = outcome_rx.recv() => match outcome {
                    Some(TaskOutcome::History { fetch, result }) => {
                        pager.finish();

                        let active = match active_peer {
                            Some(peer) => peer,
                            None => {
                                debug!("No active conversation, discarding history page");
                                continue;
                            }
                        };

                        if !pager.is_current(&fetch, active) {
                            debug!(
                                peer = %fetch.peer,
                                offset = fetch.offset,
                                "Discarding stale history response"
                            );
                            if !transcript_loaded {
                                if let Some(next) = pager.begin(active) {
                                    spawn_history_fetch(&api, &outcome_tx, next, page_size);
                                }
                            }
                            continue;
                        }

                        match result {
                            Ok(mut page) => {
                                let initial = !transcript_loaded;
                                transcript_loaded = true;
                                let reached_beginning = pager.advance(active, page.len(), page_size);
                                // The backend answers newest first; the
                                // transcript wants oldest first.
                                page.reverse();
                                debug!(
                                    peer = %active,
                                    count = page.len(),
                                    reached_beginning,
                                    "History page applied"
                                );
                                let _ = event_tx
                                    .send(SessionEvent::HistoryLoaded {
                                        peer: active,
                                        messages: page,
                                        reached_beginning,
                                        initial,
                                    })
                                    .await;
                            }
                            Err(NetError::Unauthorized) => {
                                warn!("History fetch unauthorized, session expired");
                                auth.clear();
                                let _ = event_tx.send(SessionEvent::SessionExpired).await;
                            }
                            Err(e) => {
                                warn!(peer = %active, error = %e, "History fetch failed");
                                let _ = event_tx
                                    .send(SessionEvent::HistoryFailed { peer: active })
                                    .await;
                            }
                        }
                    }

                    Some(TaskOutcome::Presence { result }) => {
                        presence_inflight = false;
                        match result {
                            Ok(entries) => {
                                roster.replace_all(entries);
                                let _ = event_tx
                                    .send(SessionEvent::PresenceUpdated(roster.snapshot()))
                                    .await;
                            }
                            Err(NetError::Unauthorized) => {
                                warn!("Presence refresh unauthorized, session expired");
                                auth.clear();
                                let _ = event_tx.send(SessionEvent::SessionExpired).await;
                            }
                            Err(e) => warn!(error = %e, "Presence refresh failed"),
                        }

                        // Realtime events that arrived mid-refresh marked the
                        // roster dirty; catch up now.
                        if presence_dirty {
                            presence_dirty = false;
                            schedule_presence_refresh(
                                &api,
                                &outcome_tx,
                                &mut presence_inflight,
                                &mut presence_dirty,
                            );
                        }
                    }

                    // The loop holds its own sender, so this arm is unreachable
                    // until shutdown.
                    None => break,
                },
            }
        }

        info!("Chat session terminated");
    });

    (cmd_tx, event_rx)
}

fn spawn_history_fetch<A>(
    api: &Arc<A>,
    outcome_tx: &mpsc::Sender<TaskOutcome>,
    fetch: PendingFetch,
    page_size: u32,
) where
    A: ChatApi + 'static,
{
    debug!(peer = %fetch.peer, offset = fetch.offset, limit = page_size, "Fetching history page");
    let api = api.clone();
    let outcome_tx = outcome_tx.clone();
    tokio::spawn(async move {
        let result = api.messages(fetch.peer, fetch.offset, page_size).await;
        let _ = outcome_tx.send(TaskOutcome::History { fetch, result }).await;
    });
}

fn schedule_presence_refresh<A>(
    api: &Arc<A>,
    outcome_tx: &mpsc::Sender<TaskOutcome>,
    inflight: &mut bool,
    dirty: &mut bool,
) where
    A: ChatApi + 'static,
{
    if *inflight {
        *dirty = true;
        return;
    }
    *inflight = true;

    let api = api.clone();
    let outcome_tx = outcome_tx.clone();
    tokio::spawn(async move {
        let result = api.users().await;
        let _ = outcome_tx.send(TaskOutcome::Presence { result }).await;
    });
}
