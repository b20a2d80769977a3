use axum::{
    Router,
    http::Method,
    routing::{get, post},
};

use crate::{AppState, auth::AuthRule, handlers};

/// API Router
///
/// The full route table. Access control is not wired per route here; the
/// authorization gate layered over this router checks each request's
/// resolved template against `protected()` instead, so the table below stays
/// a plain description of the HTTP surface.
///
/// Axum resolves one template per path shape, which is why voting (GET) and
/// comment deletion (DELETE) share `/api/post/{post_id}/{action}`.
pub fn api() -> Router<AppState> {
    Router::new()
        // GET /health
        // Unauthenticated liveness probe for monitors and load balancers.
        .route("/health", get(|| async { "ok" }))
        // POST /api/register | /api/login
        // The identity flow: both return the signed claim token and set the
        // session cookie.
        .route("/api/register", post(handlers::register))
        .route("/api/login", post(handlers::login))
        // GET /api/posts: full listing. POST /api/posts: submission (gated).
        .route(
            "/api/posts",
            get(handlers::list_posts).post(handlers::add_post),
        )
        // GET /api/posts/{category}: category listing.
        .route("/api/posts/{category}", get(handlers::posts_by_category))
        // Single-post surface: display read (bumps views), commenting
        // (gated) and deletion by the author (gated).
        .route(
            "/api/post/{post_id}",
            get(handlers::get_post)
                .post(handlers::add_comment)
                .delete(handlers::delete_post),
        )
        // Voting (gated) and own-comment deletion (gated).
        .route(
            "/api/post/{post_id}/{action}",
            get(handlers::vote_post).delete(handlers::delete_comment),
        )
        // GET /api/user/{username}: posts by author.
        .route("/api/user/{username}", get(handlers::user_posts))
}

/// Protected Rules
///
/// The closed, ordered table of operations that require a valid session.
/// Entries match the router's resolved route templates exactly; the first
/// matching entry wins. Built at startup and handed to the application
/// state, never a package-level constant.
pub fn protected() -> Vec<AuthRule> {
    vec![
        AuthRule::new(Method::POST, "/api/posts"),
        AuthRule::new(Method::POST, "/api/post/{post_id}"),
        AuthRule::new(Method::DELETE, "/api/post/{post_id}/{action}"),
        AuthRule::new(Method::GET, "/api/post/{post_id}/{action}"),
        AuthRule::new(Method::DELETE, "/api/post/{post_id}"),
    ]
}
