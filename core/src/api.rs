/// REST client for the chat backend
///
/// Endpoints (relative to `Config::api_base_url`):
///   POST   /auth/login                 body: {"identifier":"...","password":"..."}
///   POST   /auth/register              body: {"username","email","password"}
///   GET    /auth/check-username        ?username=
///   POST   /auth/logout
///   GET    /chat                       conversation list
///   POST   /chat                       body: {"userId":"..."}  create or open
///   GET    /chat/:id
///   GET    /message/:chatId            ?page=N&limit=N  oldest-to-newest
///   POST   /message                    body: {"content":"...","chatId":"..."}
///   PATCH  /message/read/:chatId
///   GET    /users/search               ?query=
///   POST   /users/follow|accept|reject/:id
///   GET    /users/profile
///   PUT    /users/profile/update       body: {"name":"..."}
///   PUT    /users/profile/password     body: {"currentPassword","newPassword"}
///   GET    /notifications
///   PATCH  /notifications/:id
///   DELETE /notifications/:id
use crate::config::Config;
use crate::error::{Result, VibeError};
use crate::types::{AuthSession, Conversation, Message, Notification, User};
use async_trait::async_trait;
use reqwest::{Method, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Backend operations the chat session depends on
#[async_trait]
pub trait ChatBackend: Send + Sync {
    /// One page of a conversation's history, oldest first
    async fn fetch_messages(&self, chat_id: &str, page: u32, limit: u32) -> Result<Vec<Message>>;

    /// Conversation with resolved participants
    async fn get_chat(&self, chat_id: &str) -> Result<Conversation>;

    /// Create a message; the backend assigns id and timestamp
    async fn send_message(&self, chat_id: &str, content: &str) -> Result<Message>;

    /// Mark every message of the conversation read for the caller
    async fn mark_read(&self, chat_id: &str) -> Result<()>;
}

#[derive(Debug, Serialize)]
struct LoginRequest<'a> {
    identifier: &'a str,
    password: &'a str,
}

#[derive(Debug, Serialize)]
struct RegisterRequest<'a> {
    username: &'a str,
    email: &'a str,
    password: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct AccessChatRequest<'a> {
    user_id: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SendMessageRequest<'a> {
    content: &'a str,
    chat_id: &'a str,
}

#[derive(Debug, Serialize)]
struct UpdateProfileRequest<'a> {
    name: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ChangePasswordRequest<'a> {
    current_password: &'a str,
    new_password: &'a str,
}

/// Error body the backend sends with non-success statuses
#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct UsernameAvailability {
    #[serde(default)]
    available: bool,
}

/// HTTP client bound to one backend and (optionally) one bearer token
#[derive(Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl ApiClient {
    pub fn new(config: &Config) -> Result<Self> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = config.request_timeout {
            builder = builder.timeout(timeout);
        }
        Ok(Self {
            http: builder.build()?,
            base_url: config.api_base_url.trim_end_matches('/').to_string(),
            token: config.auth_token.clone(),
        })
    }

    /// Same client, different credentials
    pub fn with_token(&self, token: impl Into<String>) -> Self {
        Self {
            http: self.http.clone(),
            base_url: self.base_url.clone(),
            token: Some(token.into()),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = format!("{}{}", self.base_url, path);
        debug!("{} {}", method, url);
        let builder = self.http.request(method, url);
        match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn check(response: Response) -> Result<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let text = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ErrorBody>(&text)
            .ok()
            .and_then(|b| b.message)
            .unwrap_or_else(|| {
                status
                    .canonical_reason()
                    .unwrap_or("request failed")
                    .to_string()
            });
        Err(VibeError::Api {
            status: status.as_u16(),
            message,
        })
    }

    async fn json<T: DeserializeOwned>(builder: RequestBuilder) -> Result<T> {
        let response = Self::check(builder.send().await?).await?;
        Ok(response.json::<T>().await?)
    }

    async fn empty(builder: RequestBuilder) -> Result<()> {
        Self::check(builder.send().await?).await?;
        Ok(())
    }

    // ─── Auth ────────────────────────────────────────────────────────────────

    pub async fn login(&self, identifier: &str, password: &str) -> Result<AuthSession> {
        Self::json(
            self.request(Method::POST, "/auth/login")
                .json(&LoginRequest { identifier, password }),
        )
        .await
    }

    pub async fn register(&self, username: &str, email: &str, password: &str) -> Result<()> {
        Self::empty(self.request(Method::POST, "/auth/register").json(&RegisterRequest {
            username,
            email,
            password,
        }))
        .await
    }

    pub async fn check_username(&self, username: &str) -> Result<bool> {
        let path = format!("/auth/check-username?username={}", urlencoding::encode(username));
        let body: UsernameAvailability = Self::json(self.request(Method::GET, &path)).await?;
        Ok(body.available)
    }

    pub async fn logout(&self) -> Result<()> {
        Self::empty(self.request(Method::POST, "/auth/logout")).await
    }

    // ─── Conversations ───────────────────────────────────────────────────────

    pub async fn list_chats(&self) -> Result<Vec<Conversation>> {
        Self::json(self.request(Method::GET, "/chat")).await
    }

    /// Create a conversation with `user_id`, or return the existing one
    pub async fn access_chat(&self, user_id: &str) -> Result<Conversation> {
        Self::json(
            self.request(Method::POST, "/chat")
                .json(&AccessChatRequest { user_id }),
        )
        .await
    }

    pub async fn get_chat(&self, chat_id: &str) -> Result<Conversation> {
        let path = format!("/chat/{}", urlencoding::encode(chat_id));
        Self::json(self.request(Method::GET, &path)).await
    }

    // ─── Messages ────────────────────────────────────────────────────────────

    pub async fn fetch_messages(&self, chat_id: &str, page: u32, limit: u32) -> Result<Vec<Message>> {
        let path = format!(
            "/message/{}?page={}&limit={}",
            urlencoding::encode(chat_id),
            page,
            limit
        );
        Self::json(self.request(Method::GET, &path)).await
    }

    pub async fn send_message(&self, chat_id: &str, content: &str) -> Result<Message> {
        Self::json(
            self.request(Method::POST, "/message")
                .json(&SendMessageRequest { content, chat_id }),
        )
        .await
    }

    pub async fn mark_read(&self, chat_id: &str) -> Result<()> {
        let path = format!("/message/read/{}", urlencoding::encode(chat_id));
        Self::empty(self.request(Method::PATCH, &path)).await
    }

    // ─── Users ───────────────────────────────────────────────────────────────

    pub async fn search_users(&self, query: &str) -> Result<Vec<User>> {
        if query.trim().is_empty() {
            return Ok(Vec::new());
        }
        let path = format!("/users/search?query={}", urlencoding::encode(query));
        Self::json(self.request(Method::GET, &path)).await
    }

    pub async fn follow(&self, user_id: &str) -> Result<()> {
        self.user_action("follow", user_id).await
    }

    pub async fn accept(&self, user_id: &str) -> Result<()> {
        self.user_action("accept", user_id).await
    }

    pub async fn reject(&self, user_id: &str) -> Result<()> {
        self.user_action("reject", user_id).await
    }

    async fn user_action(&self, action: &str, user_id: &str) -> Result<()> {
        let path = format!("/users/{}/{}", action, urlencoding::encode(user_id));
        Self::empty(self.request(Method::POST, &path)).await
    }

    pub async fn profile(&self) -> Result<User> {
        Self::json(self.request(Method::GET, "/users/profile")).await
    }

    pub async fn update_profile(&self, name: &str) -> Result<User> {
        Self::json(
            self.request(Method::PUT, "/users/profile/update")
                .json(&UpdateProfileRequest { name }),
        )
        .await
    }

    pub async fn change_password(&self, current_password: &str, new_password: &str) -> Result<()> {
        Self::empty(
            self.request(Method::PUT, "/users/profile/password")
                .json(&ChangePasswordRequest {
                    current_password,
                    new_password,
                }),
        )
        .await
    }

    // ─── Notifications ───────────────────────────────────────────────────────

    pub async fn notifications(&self) -> Result<Vec<Notification>> {
        Self::json(self.request(Method::GET, "/notifications")).await
    }

    pub async fn mark_notification_read(&self, id: &str) -> Result<()> {
        let path = format!("/notifications/{}", urlencoding::encode(id));
        Self::empty(self.request(Method::PATCH, &path)).await
    }

    pub async fn delete_notification(&self, id: &str) -> Result<()> {
        let path = format!("/notifications/{}", urlencoding::encode(id));
        Self::empty(self.request(Method::DELETE, &path)).await
    }
}

#[async_trait]
impl ChatBackend for ApiClient {
    async fn fetch_messages(&self, chat_id: &str, page: u32, limit: u32) -> Result<Vec<Message>> {
        ApiClient::fetch_messages(self, chat_id, page, limit).await
    }

    async fn get_chat(&self, chat_id: &str) -> Result<Conversation> {
        ApiClient::get_chat(self, chat_id).await
    }

    async fn send_message(&self, chat_id: &str, content: &str) -> Result<Message> {
        ApiClient::send_message(self, chat_id, content).await
    }

    async fn mark_read(&self, chat_id: &str) -> Result<()> {
        ApiClient::mark_read(self, chat_id).await
    }
}
