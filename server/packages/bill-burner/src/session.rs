//! Explicit session context: tokens plus the profile derived from them.
//!
//! A [`Session`] is built around a [`KeyValueStore`], populated with
//! [`Session::restore`] and torn down with [`Session::clear`]. Share it behind
//! an `Arc`; reads and writes go through an internal lock.

use std::sync::{Arc, RwLock};

use thiserror::Error;

use crate::jwt::{JwtError, UserProfile};
use crate::storage::{
    KeyValueStore, StorageError, ACCESS_TOKEN_KEY, IDENTITY_TOKEN_KEY, USER_PROFILE_KEY,
};

#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error("identity token is malformed: {0}")]
    MalformedIdentityToken(#[from] JwtError),
    #[error("failed to encode user profile: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("session lock poisoned")]
    Poisoned,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionState {
    pub access_token: Option<String>,
    pub identity_token: Option<String>,
    pub user: Option<UserProfile>,
}

impl SessionState {
    fn from_tokens(access_token: String, identity_token: Option<String>) -> Result<Self, JwtError> {
        let user = identity_token
            .as_deref()
            .map(UserProfile::from_identity_token)
            .transpose()?;
        Ok(Self {
            access_token: Some(access_token),
            identity_token,
            user,
        })
    }
}

pub struct Session {
    store: Arc<dyn KeyValueStore>,
    state: RwLock<SessionState>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("authenticated", &self.is_authenticated())
            .finish()
    }
}

impl Session {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self {
            store,
            state: RwLock::new(SessionState::default()),
        }
    }

    /// Loads tokens from storage. A stored identity token that no longer
    /// decodes wipes the stored session instead of failing startup.
    pub fn restore(&self) -> Result<(), SessionError> {
        let Some(access_token) = self.store.get(ACCESS_TOKEN_KEY)? else {
            self.replace(SessionState::default())?;
            return Ok(());
        };
        let identity_token = self.store.get(IDENTITY_TOKEN_KEY)?;
        match SessionState::from_tokens(access_token, identity_token) {
            Ok(state) => {
                tracing::debug!(has_user = state.user.is_some(), "session restored");
                self.replace(state)
            }
            Err(err) => {
                tracing::warn!(error = %err, "discarding stored session");
                self.clear()
            }
        }
    }

    /// Persists freshly issued tokens. Nothing changes if the identity token
    /// cannot be decoded.
    pub fn store_tokens(
        &self,
        access_token: &str,
        identity_token: Option<&str>,
    ) -> Result<(), SessionError> {
        let state =
            SessionState::from_tokens(access_token.to_string(), identity_token.map(str::to_string))?;

        self.store.set(ACCESS_TOKEN_KEY, access_token)?;
        match identity_token {
            Some(token) => self.store.set(IDENTITY_TOKEN_KEY, token)?,
            None => self.store.remove(IDENTITY_TOKEN_KEY)?,
        }
        match &state.user {
            Some(user) => {
                self.store
                    .set(USER_PROFILE_KEY, &serde_json::to_string(user)?)?;
            }
            None => self.store.remove(USER_PROFILE_KEY)?,
        }

        self.replace(state)
    }

    pub fn clear(&self) -> Result<(), SessionError> {
        self.replace(SessionState::default())?;
        self.store.remove(ACCESS_TOKEN_KEY)?;
        self.store.remove(IDENTITY_TOKEN_KEY)?;
        self.store.remove(USER_PROFILE_KEY)?;
        Ok(())
    }

    pub fn snapshot(&self) -> SessionState {
        self.state
            .read()
            .map(|state| state.clone())
            .unwrap_or_default()
    }

    pub fn access_token(&self) -> Option<String> {
        self.snapshot().access_token
    }

    pub fn identity_token(&self) -> Option<String> {
        self.snapshot().identity_token
    }

    pub fn user(&self) -> Option<UserProfile> {
        self.snapshot().user
    }

    pub fn is_authenticated(&self) -> bool {
        self.state
            .read()
            .map(|state| state.access_token.is_some())
            .unwrap_or(false)
    }

    fn replace(&self, next: SessionState) -> Result<(), SessionError> {
        let mut state = self.state.write().map_err(|_| SessionError::Poisoned)?;
        *state = next;
        Ok(())
    }
}
