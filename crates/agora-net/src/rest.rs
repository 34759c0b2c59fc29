//! Typed client for the forum's HTTP API.
//!
//! All endpoints share one `reqwest` client and one cookie jar. The session
//! cookie issued at login then authenticates every later call, including
//! the WebSocket upgrade (see [`crate::socket`]).
//!
//! Two quirks of the backend are absorbed here so the rest of the
//! workspace sees clean types: the login endpoint encodes the user id as a
//! JSON string, and list endpoints may answer with JSON `null` instead of
//! an empty array.

use std::collections::HashMap;
use std::sync::Arc;

use reqwest::cookie::Jar;
use reqwest::{multipart, redirect, Client, Response, StatusCode, Url};
use serde::Deserialize;
use tracing::debug;

use agora_shared::constants::WS_PATH;
use agora_shared::forum::{
    Category, Comment, NewPost, Post, PostFilter, ReactionKind, ReactionTally,
};
use agora_shared::types::{Credentials, Message, PresenceEntry, Registration, Session, UserId};

use crate::backoff::ReconnectPolicy;
use crate::error::{NetError, Result};
use crate::socket::SocketConfig;

/// HTTP client bound to one forum backend.
#[derive(Debug, Clone)]
pub struct ApiClient {
    http: Client,
    base_url: Url,
    cookies: Arc<Jar>,
}

impl ApiClient {
    /// Create a client for the backend at `base_url`, e.g.
    /// `http://localhost:8082`.
    ///
    /// Redirects are not followed: the backend answers browser-style
    /// redirects on some endpoints and those count as success here.
    pub fn new(base_url: &str) -> Result<Self> {
        let base_url =
            Url::parse(base_url).map_err(|e| NetError::InvalidUrl(format!("{base_url}: {e}")))?;

        let cookies = Arc::new(Jar::default());
        let http = Client::builder()
            .cookie_provider(cookies.clone())
            .redirect(redirect::Policy::none())
            .build()?;

        Ok(Self {
            http,
            base_url,
            cookies,
        })
    }

    /// Log in. On success the session cookie lands in the shared jar and
    /// the confirmed identity is returned.
    pub async fn login(&self, credentials: &Credentials) -> Result<Session> {
        let response = self
            .http
            .post(self.endpoint("/login"))
            .json(credentials)
            .send()
            .await?;

        match response.status() {
            StatusCode::OK => {
                let body: LoginResponse = response.json().await?;
                let user = body.user.ok_or_else(|| NetError::MalformedResponse {
                    endpoint: "/login".into(),
                    detail: "missing user object".into(),
                })?;
                let session = user.into_session()?;
                debug!(user = %session.user_id, "Login accepted");
                Ok(session)
            }
            StatusCode::UNAUTHORIZED => Err(NetError::InvalidCredentials),
            status => Err(NetError::Status {
                endpoint: "/login".into(),
                status: status.as_u16(),
            }),
        }
    }

    /// Register a new account. The backend validates every field and
    /// answers 400 with a field-to-reason map when something is off.
    pub async fn register(&self, form: &Registration) -> Result<()> {
        let response = self
            .http
            .post(self.endpoint("/register"))
            .form(form)
            .send()
            .await?;

        match response.status() {
            StatusCode::OK => Ok(()),
            StatusCode::BAD_REQUEST => {
                let errors: HashMap<String, String> = response.json().await.unwrap_or_default();
                Err(NetError::Validation(errors))
            }
            status => Err(NetError::Status {
                endpoint: "/register".into(),
                status: status.as_u16(),
            }),
        }
    }

    /// Log out. The backend expires the session cookie and answers with a
    /// redirect, which counts as success.
    pub async fn logout(&self) -> Result<()> {
        let response = self.http.post(self.endpoint("/logout")).send().await?;
        let status = response.status();
        if status.is_client_error() || status.is_server_error() {
            return Err(NetError::Status {
                endpoint: "/logout".into(),
                status: status.as_u16(),
            });
        }
        Ok(())
    }

    /// Ask the backend whether the stored cookie is still good.
    ///
    /// Returns `None` when the session is missing or expired.
    pub async fn validate_session(&self) -> Result<Option<Session>> {
        let response = self
            .http
            .get(self.endpoint("/api/validate-session"))
            .send()
            .await?;

        if !response.status().is_success() {
            return Ok(None);
        }

        let body: ValidateResponse = response.json().await?;
        match body.user {
            Some(user) if body.valid => Ok(Some(user.into_session()?)),
            _ => Ok(None),
        }
    }

    /// One history page for the conversation with `peer`, newest first.
    pub async fn messages(&self, peer: UserId, offset: u32, limit: u32) -> Result<Vec<Message>> {
        let response = self
            .http
            .get(self.endpoint("/api/messages"))
            .query(&[
                ("with", peer.to_string()),
                ("offset", offset.to_string()),
                ("limit", limit.to_string()),
            ])
            .send()
            .await?;

        let response = check(response, "/api/messages")?;
        let page: Option<Vec<Message>> = response.json().await?;
        Ok(page.unwrap_or_default())
    }

    /// The presence roster, unsorted and including the caller.
    pub async fn users(&self) -> Result<Vec<PresenceEntry>> {
        let response = self.http.get(self.endpoint("/api/users")).send().await?;
        let response = check(response, "/api/users")?;
        let roster: Option<Vec<PresenceEntry>> = response.json().await?;
        Ok(roster.unwrap_or_default())
    }

    /// List posts, newest first, with optional filters.
    pub async fn posts(&self, filter: &PostFilter) -> Result<Vec<Post>> {
        let mut request = self.http.get(self.endpoint("/api/posts"));
        if let Some(ref category) = filter.category {
            request = request.query(&[("category", category.as_str())]);
        }
        if filter.mine_only {
            request = request.query(&[("my_posts_only", "true")]);
        }
        if filter.liked_only {
            request = request.query(&[("liked_posts_only", "true")]);
        }

        let response = check(request.send().await?, "/api/posts")?;
        let posts: Option<Vec<Post>> = response.json().await?;
        Ok(posts.unwrap_or_default())
    }

    /// All forum categories.
    pub async fn categories(&self) -> Result<Vec<Category>> {
        let response = self
            .http
            .get(self.endpoint("/api/categories"))
            .send()
            .await?;
        let response = check(response, "/api/categories")?;
        let categories: Option<Vec<Category>> = response.json().await?;
        Ok(categories.unwrap_or_default())
    }

    /// Create a post, returning its id. The backend takes a multipart form
    /// with one `category` part per selected category.
    pub async fn create_post(&self, post: &NewPost) -> Result<i64> {
        let mut form = multipart::Form::new()
            .text("title", post.title.clone())
            .text("content", post.content.clone());
        for category in &post.categories {
            form = form.text("category", category.to_string());
        }

        let response = self
            .http
            .post(self.endpoint("/post/create"))
            .multipart(form)
            .send()
            .await?;
        let response = check(response, "/post/create")?;
        let body: CreatePostResponse = response.json().await?;
        Ok(body.post_id)
    }

    /// All comments on a post, oldest first.
    pub async fn comments(&self, post_id: i64) -> Result<Vec<Comment>> {
        let response = self
            .http
            .get(self.endpoint("/comments"))
            .query(&[("post_id", post_id.to_string())])
            .send()
            .await?;
        let response = check(response, "/comments")?;
        let comments: Option<Vec<Comment>> = response.json().await?;
        Ok(comments.unwrap_or_default())
    }

    /// Comment on a post, returning the stored comment.
    pub async fn create_comment(&self, post_id: i64, content: &str) -> Result<Comment> {
        let response = self
            .http
            .post(self.endpoint("/comment/create"))
            .form(&[("post_id", post_id.to_string()), ("content", content.into())])
            .send()
            .await?;
        let response = check(response, "/comment/create")?;
        Ok(response.json().await?)
    }

    /// Toggle the caller's reaction on a post.
    pub async fn react_to_post(
        &self,
        user: UserId,
        post_id: i64,
        kind: ReactionKind,
    ) -> Result<ReactionTally> {
        let body = serde_json::json!({
            "user_id": user.0,
            "post_id": post_id,
            "like_type": kind.as_str(),
        });

        let response = self
            .http
            .post(self.endpoint("/like"))
            .json(&body)
            .send()
            .await?;
        let response = check(response, "/like")?;
        Ok(response.json().await?)
    }

    /// Toggle the caller's reaction on a comment. Unlike the post variant,
    /// the backend expects the ids here as JSON strings.
    pub async fn react_to_comment(
        &self,
        user: UserId,
        comment_id: i64,
        kind: ReactionKind,
    ) -> Result<ReactionTally> {
        let body = serde_json::json!({
            "user_id": user.to_string(),
            "comment_id": comment_id.to_string(),
            "like_type": kind.as_str(),
        });

        let response = self
            .http
            .post(self.endpoint("/comment/like"))
            .json(&body)
            .send()
            .await?;
        let response = check(response, "/comment/like")?;
        Ok(response.json().await?)
    }

    /// The WebSocket URL for the realtime endpoint, derived from the base
    /// URL by swapping the scheme.
    pub fn ws_url(&self) -> Result<String> {
        let mut url = self.base_url.clone();
        let scheme = match url.scheme() {
            "https" => "wss",
            _ => "ws",
        };
        url.set_scheme(scheme)
            .map_err(|_| NetError::InvalidUrl(format!("cannot derive ws scheme for {url}")))?;
        url.set_path(WS_PATH);
        Ok(url.to_string())
    }

    /// Configuration for [`crate::socket::spawn_socket`], sharing this
    /// client's cookie jar so the upgrade request carries the session
    /// cookie.
    pub fn socket_config(&self, policy: ReconnectPolicy) -> Result<SocketConfig> {
        Ok(SocketConfig {
            ws_url: self.ws_url()?,
            http_origin: self.base_url.clone(),
            cookies: self.cookies.clone(),
            policy,
        })
    }

    fn endpoint(&self, path: &str) -> Url {
        let mut url = self.base_url.clone();
        url.set_path(path);
        url
    }
}

/// Map error statuses shared by the authenticated endpoints.
fn check(response: Response, endpoint: &str) -> Result<Response> {
    match response.status() {
        status if status.is_success() => Ok(response),
        StatusCode::UNAUTHORIZED => Err(NetError::Unauthorized),
        status => Err(NetError::Status {
            endpoint: endpoint.into(),
            status: status.as_u16(),
        }),
    }
}

#[derive(Debug, Deserialize)]
struct LoginResponse {
    user: Option<WireUser>,
}

#[derive(Debug, Deserialize)]
struct ValidateResponse {
    #[serde(default)]
    valid: bool,
    user: Option<WireUser>,
}

/// User object as the auth endpoints encode it, id as a string.
#[derive(Debug, Deserialize)]
struct WireUser {
    id: String,
    username: String,
    email: String,
}

impl WireUser {
    fn into_session(self) -> Result<Session> {
        let id = self
            .id
            .parse::<i64>()
            .map_err(|_| NetError::MalformedResponse {
                endpoint: "/login".into(),
                detail: format!("non-numeric user id: {}", self.id),
            })?;
        Ok(Session {
            user_id: UserId(id),
            username: self.username,
            email: self.email,
        })
    }
}

#[derive(Debug, Deserialize)]
struct CreatePostResponse {
    post_id: i64,
}
