//! Signed-in user state backed by the local state file.

use super::client::{CloudClient, CloudError, CloudResult};
use super::models::User;
use crate::cache::LocalState;
use anyhow::Context;
use std::path::PathBuf;
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserInfo {
    pub email: Option<String>,
    pub name: Option<String>,
}

pub struct AuthManager {
    client: CloudClient,
    state: LocalState,
    state_root: PathBuf,
}

impl AuthManager {
    /// Restore the session persisted under `state_root`.
    pub fn initialize(client: CloudClient, state_root: PathBuf) -> Self {
        let state = LocalState::load_from(&state_root);
        let client = client.with_token(state.auth_token.clone());
        Self {
            client,
            state,
            state_root,
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.state.is_signed_in()
    }

    pub fn user_info(&self) -> UserInfo {
        UserInfo {
            email: self.state.user_email.clone(),
            name: self.state.user_name.clone(),
        }
    }

    /// Exchange credentials for a token, then look up the display name.
    pub fn login(&mut self, email: &str, password: &str) -> anyhow::Result<UserInfo> {
        let token = self.client.login(email, password)?;
        self.client.set_token(Some(token.access_token.clone()));
        self.state.auth_token = Some(token.access_token);
        self.state.user_email = Some(email.to_string());
        self.state.user_name = match self.client.me() {
            Ok(user) => user.name,
            Err(err) => {
                warn!("Signed in but could not load profile: {err}");
                None
            }
        };
        self.persist()?;
        info!(email, "Signed in");
        Ok(self.user_info())
    }

    pub fn register(
        &mut self,
        email: &str,
        password: &str,
        name: Option<&str>,
    ) -> anyhow::Result<UserInfo> {
        let user = self.client.register(email, password, name)?;
        info!(email = %user.email, "Registered account");
        self.login(email, password)
    }

    pub fn logout(&mut self) -> anyhow::Result<()> {
        self.client.set_token(None);
        self.state.clear_auth();
        self.persist()?;
        info!("Signed out");
        Ok(())
    }

    /// Validate the stored token. An unauthorized answer signs the user out.
    pub fn whoami(&mut self) -> anyhow::Result<Option<User>> {
        if !self.is_authenticated() {
            return Ok(None);
        }
        match self.client.me() {
            Ok(user) => {
                if user.name.is_some() && user.name != self.state.user_name {
                    self.state.user_name = user.name.clone();
                    self.persist()?;
                }
                Ok(Some(user))
            }
            Err(err) if err.is_unauthorized() => {
                warn!("Stored token rejected; signing out");
                self.logout()?;
                Ok(None)
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Record a successful sync.
    pub fn touch_last_sync(&mut self, at: chrono::DateTime<chrono::Utc>) -> anyhow::Result<()> {
        self.state.last_sync = Some(at.to_rfc3339());
        self.persist()
    }

    pub fn require_auth(&self) -> CloudResult<&CloudClient> {
        if self.is_authenticated() {
            Ok(&self.client)
        } else {
            Err(CloudError::NotAuthenticated)
        }
    }

    fn persist(&self) -> anyhow::Result<()> {
        self.state
            .save_to(&self.state_root)
            .context("Persisting sign-in state")
    }
}
