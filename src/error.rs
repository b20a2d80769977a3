use axum::{
    Json,
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

/// Error
///
/// The crate-wide error taxonomy. Store-layer failures propagate unchanged to
/// the handler boundary; the `IntoResponse` impl below translates each domain
/// error into the narrowest applicable client-visible outcome and fails
/// closed (server error) on anything infrastructural.
#[derive(Debug, Error)]
pub enum Error {
    #[error("post not found")]
    PostNotFound,

    #[error("comment is not found")]
    CommentNotFound,

    #[error("permission denied")]
    PermissionDenied,

    /// Duplicate username at registration. Carries the offending value so the
    /// response can echo it back in the structured error list.
    #[error("username already exists")]
    UserExists { username: String },

    #[error("user not found")]
    NoUser,

    #[error("invalid password")]
    BadPassword,

    /// No session cookie was presented. A valid outcome on public routes, a
    /// rejection on gated ones.
    #[error("no session found")]
    NoSession,

    /// A session cookie was presented but no matching record exists. Kept
    /// distinct from `NoSession` so a stale token is never mistaken for an
    /// anonymous request.
    #[error("session is not found")]
    SessionNotFound,

    #[error("storage failure: {0}")]
    Store(#[from] sqlx::Error),

    #[error("json encoding failure: {0}")]
    Json(#[from] serde_json::Error),

    #[error("token signing failure: {0}")]
    Token(#[from] jsonwebtoken::errors::Error),

    #[error("password hashing failure: {0}")]
    Hash(#[from] bcrypt::BcryptError),
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        match self {
            Error::PostNotFound | Error::CommentNotFound => {
                (StatusCode::NOT_FOUND, self.to_string()).into_response()
            }
            Error::PermissionDenied => (StatusCode::FORBIDDEN, self.to_string()).into_response(),
            Error::UserExists { username } => (
                StatusCode::UNPROCESSABLE_ENTITY,
                Json(json!({
                    "errors": [{
                        "location": "body",
                        "param": "username",
                        "value": username,
                        "msg": "already exists",
                    }]
                })),
            )
                .into_response(),
            Error::NoUser | Error::BadPassword => (
                StatusCode::UNAUTHORIZED,
                Json(json!({ "message": self.to_string() })),
            )
                .into_response(),
            // Unauthenticated access to a gated route bounces the client back
            // to the landing page.
            Error::NoSession => {
                (StatusCode::UNAUTHORIZED, [(header::LOCATION, "/")], "no session found")
                    .into_response()
            }
            Error::SessionNotFound
            | Error::Store(_)
            | Error::Json(_)
            | Error::Token(_)
            | Error::Hash(_) => {
                tracing::error!("internal error: {:?}", self);
                (StatusCode::INTERNAL_SERVER_ERROR, "internal error").into_response()
            }
        }
    }
}
