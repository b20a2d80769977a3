use axum::{
    extract::{FromRequestParts, MatchedPath, Request, State},
    http::{Method, request::Parts},
    middleware::Next,
    response::{IntoResponse, Response},
};
use jsonwebtoken::{EncodingKey, Header, encode};
use serde::{Deserialize, Serialize};

use crate::{AppState, error::Error, models::User, session::Session};

/// AuthRule
///
/// One entry of the closed protected-operation table: an HTTP method paired
/// with the route template the router resolves requests against. Matching is
/// an exact string comparison on the template, never on the literal URL, so
/// path-parameter routes stay generic.
#[derive(Debug, Clone)]
pub struct AuthRule {
    pub method: Method,
    pub pattern: &'static str,
}

impl AuthRule {
    pub fn new(method: Method, pattern: &'static str) -> Self {
        Self { method, pattern }
    }
}

/// session_gate
///
/// The authorization gate, applied as a router-wide middleware layer. Per
/// request it resolves the matched route template and decides whether a
/// valid session is mandatory before the handler runs:
///
/// - no resolved template (nothing matched routing): fail open, forward
///   unchanged;
/// - `(method, template)` not in the rule table: forward unchanged, no
///   session attached;
/// - rule matched, no session cookie: unauthorized, request stops here;
/// - rule matched, session check failed (store fault or stale token):
///   internal error, request stops here;
/// - rule matched, valid session: the resolved `Session` is attached to the
///   request extensions for downstream handlers.
pub async fn session_gate(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    let Some(template) = request
        .extensions()
        .get::<MatchedPath>()
        .map(|m| m.as_str().to_owned())
    else {
        return next.run(request).await;
    };

    let gated = state
        .rules
        .iter()
        .any(|rule| rule.method == *request.method() && rule.pattern == template);
    if !gated {
        return next.run(request).await;
    }

    match state.sessions.check(request.headers()).await {
        Ok(Some(session)) => {
            request.extensions_mut().insert(session);
            next.run(request).await
        }
        Ok(None) => Error::NoSession.into_response(),
        Err(err) => err.into_response(),
    }
}

/// Session Extractor
///
/// Lets gated handlers take the resolved session as a plain argument. The
/// gate is the only writer of the extension, so a missing value means the
/// route was reached without passing the gate and the request is rejected.
impl<S> FromRequestParts<S> for Session
where
    S: Send + Sync,
{
    type Rejection = Error;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts.extensions.get::<Session>().cloned().ok_or(Error::NoSession)
    }
}

// --- Claim token issuing ---

/// Claims
///
/// Payload of the signed token returned to the client at register/login:
/// the username and user id under a `user` key. The token is a client-side
/// credential only and is never re-validated by the gate; the session cookie
/// is what drives server-side authorization.
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub user: TokenUser,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TokenUser {
    pub username: String,
    pub id: i64,
}

/// Signs a claim token for the given user with the configured secret
/// (HS256).
pub fn issue_token(secret: &str, user: &User) -> Result<String, Error> {
    let claims = Claims {
        user: TokenUser {
            username: user.username.clone(),
            id: user.id,
        },
    };
    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )?;
    Ok(token)
}
