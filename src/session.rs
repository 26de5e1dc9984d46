//! Authenticated sessions
//!
//! Handlers never take sync credentials from a request body; they come from
//! the caller's session. Sessions are looked up by the token presented as
//! `Authorization: Bearer <token>` or as the `session` cookie.

use std::collections::HashMap;
use std::fmt;

use async_trait::async_trait;
use axum::http::{HeaderMap, header};

use crate::config::AuthConfig;
use crate::queue::Credentials;

const SESSION_COOKIE: &str = "session";

/// The user behind a request
#[derive(Clone, PartialEq, Eq)]
pub struct SessionUser {
    pub email: String,
    pub client_id: String,
    pub encryption_secret: String,
}

impl SessionUser {
    pub fn credentials(&self) -> Credentials {
        Credentials {
            email: self.email.clone(),
            client_id: self.client_id.clone(),
            encryption_secret: self.encryption_secret.clone(),
        }
    }
}

impl fmt::Debug for SessionUser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionUser")
            .field("email", &self.email)
            .field("client_id", &self.client_id)
            .finish_non_exhaustive()
    }
}

/// Resolves session tokens to users
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn resolve(&self, token: &str) -> Option<SessionUser>;
}

/// Session token carried by a request, bearer token first
pub fn session_token(headers: &HeaderMap) -> Option<&str> {
    let bearer = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty());

    bearer.or_else(|| {
        headers
            .get_all(header::COOKIE)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .flat_map(|cookies| cookies.split(';'))
            .filter_map(|pair| pair.trim().split_once('='))
            .find(|(name, value)| *name == SESSION_COOKIE && !value.is_empty())
            .map(|(_, value)| value)
    })
}

/// Fixed sessions seeded from configuration
#[derive(Default)]
pub struct InMemorySessions {
    sessions: HashMap<String, SessionUser>,
}

impl InMemorySessions {
    pub fn from_config(config: &AuthConfig) -> Self {
        let sessions = config
            .sessions
            .iter()
            .map(|(token, session)| {
                (
                    token.clone(),
                    SessionUser {
                        email: session.email.clone(),
                        client_id: session.client_id.clone(),
                        encryption_secret: session.encryption_secret.clone(),
                    },
                )
            })
            .collect::<HashMap<_, _>>();

        tracing::info!(sessions = sessions.len(), "Loaded static sessions");
        Self {
            sessions,
        }
    }
}

#[async_trait]
impl SessionStore for InMemorySessions {
    async fn resolve(&self, token: &str) -> Option<SessionUser> {
        self.sessions.get(token).cloned()
    }
}
