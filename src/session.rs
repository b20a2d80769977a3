use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::http::{HeaderMap, header};
use rand::{Rng, distributions::Alphanumeric};
use sqlx::{FromRow, PgPool};

use crate::error::Error;

/// Cookie carrying the session token.
pub const SESSION_COOKIE: &str = "sess_id";

// 90 days, root path scope.
const SESSION_TTL_SECS: u64 = 90 * 24 * 60 * 60;
const TOKEN_LEN: usize = 16;

/// Session
///
/// An opaque token bound to a user id. Many sessions may reference one user;
/// expiry is tracked client-side by the cookie, the server only checks
/// existence.
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct Session {
    pub token: String,
    pub user_id: i64,
}

impl Session {
    pub fn new(user_id: i64) -> Self {
        Self {
            token: random_token(),
            user_id,
        }
    }
}

// Uniform random alphanumeric token. Collisions are negligible at this
// length and the store's primary key rejects them outright.
fn random_token() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(TOKEN_LEN)
        .map(char::from)
        .collect()
}

/// Renders the Set-Cookie value for a freshly created session.
pub fn session_cookie(session: &Session) -> String {
    format!(
        "{}={}; HttpOnly; Path=/; Max-Age={}",
        SESSION_COOKIE, session.token, SESSION_TTL_SECS
    )
}

/// Walks the Cookie headers for a named value.
pub fn cookie_value<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|s| s.split(';'))
        .map(|s| s.trim())
        .find_map(|cookie| {
            let mut split = cookie.splitn(2, '=');
            let key = split.next()?.trim();
            let val = split.next()?.trim();
            if key == name { Some(val) } else { None }
        })
}

/// SessionStore
///
/// Creates and validates session tokens. `check` has three outcomes: a valid
/// session, `Ok(None)` when no cookie is presented at all, and an error when
/// either the lookup fails or the presented token matches no record (a stale
/// token is not the same thing as an anonymous request).
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn create(&self, user_id: i64) -> Result<Session, Error>;
    async fn check(&self, headers: &HeaderMap) -> Result<Option<Session>, Error>;
}

/// The concrete type used to share session store access across the
/// application state.
pub type SessionState = Arc<dyn SessionStore>;

/// PostgresSessionStore
///
/// Sessions as plain rows keyed by the token. The primary key on the token
/// column guarantees no two sessions share a token.
pub struct PostgresSessionStore {
    pool: PgPool,
}

impl PostgresSessionStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SessionStore for PostgresSessionStore {
    async fn create(&self, user_id: i64) -> Result<Session, Error> {
        let session = Session::new(user_id);
        sqlx::query("INSERT INTO sessions (token, user_id) VALUES ($1, $2)")
            .bind(&session.token)
            .bind(session.user_id)
            .execute(&self.pool)
            .await?;
        Ok(session)
    }

    async fn check(&self, headers: &HeaderMap) -> Result<Option<Session>, Error> {
        let Some(token) = cookie_value(headers, SESSION_COOKIE) else {
            return Ok(None);
        };
        let session =
            sqlx::query_as::<_, Session>("SELECT token, user_id FROM sessions WHERE token = $1")
                .bind(token)
                .fetch_optional(&self.pool)
                .await?;
        match session {
            Some(session) => Ok(Some(session)),
            None => Err(Error::SessionNotFound),
        }
    }
}

/// MemorySessionStore
///
/// In-memory drop-in used by tests, mirroring the Postgres semantics.
#[derive(Default)]
pub struct MemorySessionStore {
    sessions: Mutex<HashMap<String, i64>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn create(&self, user_id: i64) -> Result<Session, Error> {
        let session = Session::new(user_id);
        self.sessions
            .lock()
            .unwrap()
            .insert(session.token.clone(), session.user_id);
        Ok(session)
    }

    async fn check(&self, headers: &HeaderMap) -> Result<Option<Session>, Error> {
        let Some(token) = cookie_value(headers, SESSION_COOKIE) else {
            return Ok(None);
        };
        let sessions = self.sessions.lock().unwrap();
        match sessions.get(token) {
            Some(&user_id) => Ok(Some(Session {
                token: token.to_string(),
                user_id,
            })),
            None => Err(Error::SessionNotFound),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn token_is_16_alphanumerics() {
        let token = random_token();
        assert_eq!(token.len(), 16);
        assert!(token.chars().all(|c| c.is_ascii_alphanumeric()));
    }

    #[test]
    fn tokens_are_unique() {
        let t1 = random_token();
        let t2 = random_token();
        assert_ne!(t1, t2);
    }

    #[test]
    fn cookie_value_finds_named_cookie() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::COOKIE,
            HeaderValue::from_static("theme=dark; sess_id=abcDEF0123456789; lang=en"),
        );
        assert_eq!(
            cookie_value(&headers, SESSION_COOKIE),
            Some("abcDEF0123456789")
        );
        assert_eq!(cookie_value(&headers, "missing"), None);
    }

    #[tokio::test]
    async fn check_distinguishes_no_cookie_from_stale_token() {
        let store = MemorySessionStore::new();
        let session = store.create(7).await.unwrap();

        // No cookie at all: a valid "no session" outcome.
        let empty = HeaderMap::new();
        assert_eq!(store.check(&empty).await.unwrap(), None);

        // Valid cookie: resolved session.
        let mut headers = HeaderMap::new();
        headers.insert(
            header::COOKIE,
            session_cookie(&session).parse::<HeaderValue>().unwrap(),
        );
        let found = store.check(&headers).await.unwrap().unwrap();
        assert_eq!(found.user_id, 7);

        // Cookie with no matching record: an error, not "no session".
        let mut stale = HeaderMap::new();
        stale.insert(
            header::COOKIE,
            HeaderValue::from_static("sess_id=0000000000000000"),
        );
        let err = store.check(&stale).await.unwrap_err();
        assert!(matches!(err, Error::SessionNotFound));
    }
}
