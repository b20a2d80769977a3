use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use sqlx::PgPool;

use crate::error::Error;
use crate::models::User;

/// CredentialStore
///
/// Persists user records and owns the password contract: hashes on `add`,
/// compares on `authorize`. The "no such user" and "wrong password" failures
/// stay distinct so clients get precise messaging.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn by_id(&self, id: i64) -> Result<Option<User>, Error>;
    async fn by_username(&self, username: &str) -> Result<Option<User>, Error>;
    async fn add(&self, username: &str, password: &str) -> Result<User, Error>;
    async fn authorize(&self, username: &str, password: &str) -> Result<User, Error>;
}

/// The concrete type used to share credential store access across the
/// application state.
pub type CredentialState = Arc<dyn CredentialStore>;

/// PostgresCredentialStore
///
/// Users as relational rows; ids come from the BIGSERIAL column. The UNIQUE
/// constraint on username closes the window between the existence check and
/// the insert under concurrent registration.
pub struct PostgresCredentialStore {
    pool: PgPool,
}

impl PostgresCredentialStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CredentialStore for PostgresCredentialStore {
    async fn by_id(&self, id: i64) -> Result<Option<User>, Error> {
        let user =
            sqlx::query_as::<_, User>("SELECT id, username, password FROM users WHERE id = $1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(user)
    }

    async fn by_username(&self, username: &str) -> Result<Option<User>, Error> {
        let user = sqlx::query_as::<_, User>(
            "SELECT id, username, password FROM users WHERE username = $1",
        )
        .bind(username)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }

    async fn add(&self, username: &str, password: &str) -> Result<User, Error> {
        if self.by_username(username).await?.is_some() {
            return Err(Error::UserExists {
                username: username.to_string(),
            });
        }
        let hash = bcrypt::hash(password, bcrypt::DEFAULT_COST)?;
        let id = sqlx::query_scalar::<_, i64>(
            "INSERT INTO users (username, password) VALUES ($1, $2) RETURNING id",
        )
        .bind(username)
        .bind(&hash)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match &e {
            sqlx::Error::Database(db) if db.is_unique_violation() => Error::UserExists {
                username: username.to_string(),
            },
            _ => Error::Store(e),
        })?;
        Ok(User {
            id,
            username: username.to_string(),
            password: hash,
        })
    }

    async fn authorize(&self, username: &str, password: &str) -> Result<User, Error> {
        let user = self.by_username(username).await?.ok_or(Error::NoUser)?;
        if bcrypt::verify(password, &user.password)? {
            Ok(user)
        } else {
            Err(Error::BadPassword)
        }
    }
}

/// MemoryCredentialStore
///
/// In-memory drop-in used by tests; ids are assigned from an incrementing
/// counter like the serial column would.
#[derive(Default)]
pub struct MemoryCredentialStore {
    users: Mutex<Vec<User>>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CredentialStore for MemoryCredentialStore {
    async fn by_id(&self, id: i64) -> Result<Option<User>, Error> {
        Ok(self
            .users
            .lock()
            .unwrap()
            .iter()
            .find(|u| u.id == id)
            .cloned())
    }

    async fn by_username(&self, username: &str) -> Result<Option<User>, Error> {
        Ok(self
            .users
            .lock()
            .unwrap()
            .iter()
            .find(|u| u.username == username)
            .cloned())
    }

    async fn add(&self, username: &str, password: &str) -> Result<User, Error> {
        let hash = bcrypt::hash(password, bcrypt::DEFAULT_COST)?;
        let mut users = self.users.lock().unwrap();
        if users.iter().any(|u| u.username == username) {
            return Err(Error::UserExists {
                username: username.to_string(),
            });
        }
        let user = User {
            id: users.len() as i64 + 1,
            username: username.to_string(),
            password: hash,
        };
        users.push(user.clone());
        Ok(user)
    }

    async fn authorize(&self, username: &str, password: &str) -> Result<User, Error> {
        let user = self.by_username(username).await?.ok_or(Error::NoUser)?;
        if bcrypt::verify(password, &user.password)? {
            Ok(user)
        } else {
            Err(Error::BadPassword)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn add_hashes_and_authorize_verifies() {
        let store = MemoryCredentialStore::new();
        let user = store.add("alice", "pw1").await.unwrap();
        assert_eq!(user.id, 1);
        // The stored value is a hash, never the plaintext.
        assert_ne!(user.password, "pw1");

        let authorized = store.authorize("alice", "pw1").await.unwrap();
        assert_eq!(authorized.id, user.id);
    }

    #[tokio::test]
    async fn duplicate_username_is_rejected() {
        let store = MemoryCredentialStore::new();
        store.add("alice", "pw1").await.unwrap();
        let err = store.add("alice", "other").await.unwrap_err();
        assert!(matches!(err, Error::UserExists { .. }));
    }

    #[tokio::test]
    async fn authorize_splits_no_user_from_bad_password() {
        let store = MemoryCredentialStore::new();
        store.add("alice", "pw1").await.unwrap();

        let err = store.authorize("bob", "pw1").await.unwrap_err();
        assert!(matches!(err, Error::NoUser));

        let err = store.authorize("alice", "wrong").await.unwrap_err();
        assert!(matches!(err, Error::BadPassword));
    }
}
