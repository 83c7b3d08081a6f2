//! User accounts and sessions.
//!
//! A [`Session`] is an explicit capability object: the issue store takes one
//! as an argument wherever an operation depends on who is asking. Accounts
//! and the current session are kept in the same key-value store as the
//! snapshot.
//!
//! Passwords are stored as SHA-256 digests. This is a convenience check for
//! a shared machine, not a security boundary.

use crate::domain::UserId;
use crate::error::{Error, Result, ValidationError};
use crate::storage::KeyValueStore;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::sync::Arc;

/// Key holding the account list
pub const ACCOUNTS_KEY: &str = "taskflow.accounts";

/// Key holding the signed-in session
pub const SESSION_KEY: &str = "taskflow.session";

/// Capability level of a user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// May delete issues
    Admin,
    /// Everything else
    Member,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Admin => "admin",
            Self::Member => "member",
        })
    }
}

/// A signed-in user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    /// Account name
    pub user: UserId,
    /// Capability level
    pub role: Role,
    /// When the session started
    pub started_at: DateTime<Utc>,
}

impl Session {
    /// Starts a session for `user`.
    pub fn new(user: impl Into<UserId>, role: Role) -> Self {
        Self {
            user: user.into(),
            role,
            started_at: Utc::now(),
        }
    }

    /// Whether destructive operations are allowed.
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Account {
    name: UserId,
    role: Role,
    password_sha256: String,
}

fn digest(password: &str) -> String {
    let hash = Sha256::digest(password.as_bytes());
    hash.iter().map(|b| format!("{b:02x}")).collect()
}

/// Account registry and session persistence.
#[derive(Clone)]
pub struct Accounts {
    store: Arc<dyn KeyValueStore>,
}

impl Accounts {
    /// Registry backed by `store`.
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    async fn load(&self) -> Result<Vec<Account>> {
        match self.store.get(ACCOUNTS_KEY).await? {
            Some(bytes) => Ok(serde_json::from_slice(&bytes)?),
            None => Ok(Vec::new()),
        }
    }

    /// Names and roles of all accounts.
    ///
    /// # Errors
    ///
    /// Returns an error if the account list cannot be read.
    pub async fn list(&self) -> Result<Vec<(UserId, Role)>> {
        Ok(self
            .load()
            .await?
            .into_iter()
            .map(|a| (a.name, a.role))
            .collect())
    }

    /// Adds an account.
    ///
    /// The first account may be created by anyone and with any role. After
    /// that, only an admin session may create further admins.
    ///
    /// # Errors
    ///
    /// Returns a validation error for an empty name or password or a taken
    /// name, and [`Error::Authorization`] when an admin is requested without
    /// an admin session.
    pub async fn register(
        &self,
        name: &str,
        password: &str,
        role: Role,
        by: Option<&Session>,
    ) -> Result<UserId> {
        let name = name.trim();
        if name.is_empty() {
            return Err(ValidationError::EmptyUserName.into());
        }
        if password.is_empty() {
            return Err(ValidationError::EmptyPassword.into());
        }

        let mut accounts = self.load().await?;
        if accounts.iter().any(|a| a.name.as_str() == name) {
            return Err(ValidationError::DuplicateUser(name.to_string()).into());
        }
        if role == Role::Admin && !accounts.is_empty() && !by.is_some_and(Session::is_admin) {
            return Err(Error::Authorization(
                "only an admin can create another admin".to_string(),
            ));
        }

        let user = UserId::new(name);
        accounts.push(Account {
            name: user.clone(),
            role,
            password_sha256: digest(password),
        });
        self.store
            .set(ACCOUNTS_KEY, serde_json::to_vec(&accounts)?)
            .await?;
        tracing::info!(user = %user, %role, "Registered account");
        Ok(user)
    }

    /// Checks credentials and records the new session.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Authorization`] for an unknown name or wrong password.
    pub async fn login(&self, name: &str, password: &str) -> Result<Session> {
        let accounts = self.load().await?;
        let account = accounts
            .iter()
            .find(|a| a.name.as_str() == name.trim() && a.password_sha256 == digest(password))
            .ok_or_else(|| Error::Authorization("invalid name or password".to_string()))?;

        let session = Session::new(account.name.clone(), account.role);
        self.store
            .set(SESSION_KEY, serde_json::to_vec(&session)?)
            .await?;
        Ok(session)
    }

    /// Ends `session` if it is the current one.
    ///
    /// # Errors
    ///
    /// Returns an error if the stored session cannot be read or removed.
    pub async fn logout(&self, session: &Session) -> Result<()> {
        if self.current().await?.is_some_and(|s| s.user == session.user) {
            self.store.remove(SESSION_KEY).await?;
        }
        Ok(())
    }

    /// The signed-in session, if any.
    ///
    /// An unreadable session record counts as signed out.
    ///
    /// # Errors
    ///
    /// Returns an error if the store itself fails.
    pub async fn current(&self) -> Result<Option<Session>> {
        let Some(bytes) = self.store.get(SESSION_KEY).await? else {
            return Ok(None);
        };
        match serde_json::from_slice(&bytes) {
            Ok(session) => Ok(Some(session)),
            Err(e) => {
                tracing::warn!(error = %e, "Ignoring unreadable session record");
                Ok(None)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryKvStore;
    use rstest::{fixture, rstest};

    #[fixture]
    fn accounts() -> Accounts {
        Accounts::new(Arc::new(MemoryKvStore::new()))
    }

    #[rstest]
    #[tokio::test]
    async fn login_logout_cycle(accounts: Accounts) {
        accounts
            .register("alice", "pw", Role::Admin, None)
            .await
            .unwrap();
        assert!(accounts.current().await.unwrap().is_none());

        let session = accounts.login("alice", "pw").await.unwrap();
        assert!(session.is_admin());
        assert_eq!(accounts.current().await.unwrap(), Some(session.clone()));

        accounts.logout(&session).await.unwrap();
        assert!(accounts.current().await.unwrap().is_none());
    }

    #[rstest]
    #[tokio::test]
    async fn wrong_password_is_unauthorized(accounts: Accounts) {
        accounts
            .register("bob", "right", Role::Member, None)
            .await
            .unwrap();
        let err = accounts.login("bob", "wrong").await.unwrap_err();
        assert!(matches!(err, Error::Authorization(_)));
    }

    #[rstest]
    #[tokio::test]
    async fn only_admins_mint_admins(accounts: Accounts) {
        accounts
            .register("root", "pw", Role::Admin, None)
            .await
            .unwrap();
        let member = Session::new("bob", Role::Member);
        let admin = Session::new("root", Role::Admin);

        let err = accounts
            .register("eve", "pw", Role::Admin, Some(&member))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Authorization(_)));

        accounts
            .register("carol", "pw", Role::Admin, Some(&admin))
            .await
            .unwrap();
        accounts
            .register("dave", "pw", Role::Member, None)
            .await
            .unwrap();
        assert_eq!(accounts.list().await.unwrap().len(), 3);
    }

    #[rstest]
    #[tokio::test]
    async fn duplicate_names_are_rejected(accounts: Accounts) {
        accounts
            .register("alice", "pw", Role::Member, None)
            .await
            .unwrap();
        let err = accounts
            .register(" alice ", "pw", Role::Member, None)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Validation(ValidationError::DuplicateUser(_))
        ));
    }

    #[test]
    fn passwords_are_not_stored_in_clear() {
        let hashed = digest("hunter2");
        assert_eq!(hashed.len(), 64);
        assert_ne!(hashed, "hunter2");
    }
}
