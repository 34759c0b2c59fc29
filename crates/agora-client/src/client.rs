//! High-level entry point: log in, start the socket and session tasks,
//! and expose the forum REST surface behind one handle.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::info;

use agora_net::{spawn_socket, ApiClient, NetError};
use agora_shared::forum::{
    Category, Comment, NewPost, Post, PostFilter, ReactionKind, ReactionTally,
};
use agora_shared::types::{Credentials, Registration, Session, UserId};

use crate::auth::SessionHandle;
use crate::config::ClientConfig;
use crate::session::{spawn_session, SessionCommand, SessionEvent};

/// A logged-in client.
///
/// Chat flows through the background session task: commands go in through
/// the methods here, everything that happens comes back on the stream
/// handed out by [`events`](ChatClient::events). Forum calls are plain
/// request/response and can be made from anywhere.
#[derive(Debug)]
pub struct ChatClient {
    api: Arc<ApiClient>,
    auth: SessionHandle,
    session_tx: mpsc::Sender<SessionCommand>,
    events: Option<mpsc::Receiver<SessionEvent>>,
}

impl ChatClient {
    /// Log in and start the realtime machinery.
    ///
    /// The socket task begins dialing immediately; progress arrives as
    /// [`SessionEvent`]s.
    pub async fn connect(config: ClientConfig, credentials: &Credentials) -> anyhow::Result<Self> {
        let api = Arc::new(ApiClient::new(&config.base_url)?);

        let session = api.login(credentials).await?;
        info!(user = %session.user_id, username = %session.username, "Logged in");

        let auth = SessionHandle::new();
        let local_user = session.user_id;
        auth.set(session);

        let socket_config = api.socket_config(config.reconnect.clone())?;
        let (socket_tx, socket_rx) = spawn_socket(socket_config);
        let (session_tx, events) = spawn_session(
            api.clone(),
            auth.clone(),
            socket_tx,
            socket_rx,
            local_user,
            config,
        );

        Ok(Self {
            api,
            auth,
            session_tx,
            events: Some(events),
        })
    }

    /// Create an account. Registration does not log in; call
    /// [`connect`](ChatClient::connect) afterwards.
    pub async fn register(base_url: &str, form: &Registration) -> Result<(), NetError> {
        let api = ApiClient::new(base_url)?;
        api.register(form).await
    }

    /// Take the event stream. Returns `None` after the first call.
    pub fn events(&mut self) -> Option<mpsc::Receiver<SessionEvent>> {
        self.events.take()
    }

    /// The logged-in identity, if the session is still live.
    pub fn session(&self) -> Option<Session> {
        self.auth.current()
    }

    pub fn is_authenticated(&self) -> bool {
        self.auth.is_authenticated()
    }

    /// Ask the backend whether the session cookie is still accepted,
    /// refreshing the cached identity either way.
    pub async fn validate_session(&self) -> Result<Option<Session>, NetError> {
        let session = self.api.validate_session().await?;
        match &session {
            Some(session) => self.auth.set(session.clone()),
            None => self.auth.clear(),
        }
        Ok(session)
    }

    // -----------------------------------------------------------------------
    // Chat commands
    // -----------------------------------------------------------------------

    /// Make `peer` the active conversation.
    pub async fn open_conversation(&self, peer: UserId) -> anyhow::Result<()> {
        self.send_command(SessionCommand::OpenConversation { peer })
            .await
    }

    /// Signal that the transcript was scrolled to its top.
    pub async fn load_older_messages(&self) -> anyhow::Result<()> {
        self.send_command(SessionCommand::LoadOlderMessages).await
    }

    /// Send a private message to the active peer.
    pub async fn send_message(&self, content: String) -> anyhow::Result<()> {
        self.send_command(SessionCommand::SendMessage { content })
            .await
    }

    /// Re-fetch the presence roster.
    pub async fn refresh_presence(&self) -> anyhow::Result<()> {
        self.send_command(SessionCommand::RefreshPresence).await
    }

    /// Dial again after the socket gave up reconnecting.
    pub async fn reconnect(&self) -> anyhow::Result<()> {
        self.send_command(SessionCommand::ReconnectSocket).await
    }

    /// End the session: close the socket, invalidate the backend session,
    /// drop the login.
    pub async fn logout(self) -> Result<(), NetError> {
        let _ = self.session_tx.send(SessionCommand::Shutdown).await;
        self.api.logout().await?;
        self.auth.clear();
        info!("Logged out");
        Ok(())
    }

    async fn send_command(&self, command: SessionCommand) -> anyhow::Result<()> {
        self.session_tx
            .send(command)
            .await
            .map_err(|_| anyhow::anyhow!("Session command channel closed"))
    }

    // -----------------------------------------------------------------------
    // Forum
    // -----------------------------------------------------------------------

    pub async fn posts(&self, filter: &PostFilter) -> Result<Vec<Post>, NetError> {
        self.api.posts(filter).await
    }

    pub async fn categories(&self) -> Result<Vec<Category>, NetError> {
        self.api.categories().await
    }

    /// Publish a post. Returns its id.
    pub async fn create_post(&self, post: &NewPost) -> Result<i64, NetError> {
        self.api.create_post(post).await
    }

    pub async fn comments(&self, post_id: i64) -> Result<Vec<Comment>, NetError> {
        self.api.comments(post_id).await
    }

    pub async fn create_comment(&self, post_id: i64, content: &str) -> Result<Comment, NetError> {
        self.api.create_comment(post_id, content).await
    }

    pub async fn react_to_post(
        &self,
        post_id: i64,
        reaction: ReactionKind,
    ) -> Result<ReactionTally, NetError> {
        let user = self.auth.current_user_id().ok_or(NetError::Unauthorized)?;
        self.api.react_to_post(user, post_id, reaction).await
    }

    pub async fn react_to_comment(
        &self,
        comment_id: i64,
        reaction: ReactionKind,
    ) -> Result<ReactionTally, NetError> {
        let user = self.auth.current_user_id().ok_or(NetError::Unauthorized)?;
        self.api.react_to_comment(user, comment_id, reaction).await
    }
}
