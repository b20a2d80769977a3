use axum::{
    Json,
    extract::{Path, State},
    http::{StatusCode, header},
    response::IntoResponse,
};
use serde_json::json;
use uuid::Uuid;

use crate::{
    AppState, auth,
    error::Error,
    models::{
        Author, Comment, CreateCommentRequest, CreatePostRequest, Credentials, Post, Token, User,
    },
    session::{Session, session_cookie},
};

// Resolves the session's user against the credential store. A session whose
// user vanished is treated the same as an unknown user at login.
async fn session_user(state: &AppState, session: &Session) -> Result<User, Error> {
    state
        .users
        .by_id(session.user_id)
        .await?
        .ok_or(Error::NoUser)
}

// --- Identity Handlers ---

/// register
///
/// [Public Route] Creates a user, opens a session (Set-Cookie) and returns
/// the signed claim token. A duplicate username yields 422 with a structured
/// error list.
#[utoipa::path(
    post,
    path = "/api/register",
    request_body = Credentials,
    responses(
        (status = 200, description = "Registered", body = Token),
        (status = 422, description = "Username taken")
    )
)]
pub async fn register(
    State(state): State<AppState>,
    Json(creds): Json<Credentials>,
) -> Result<impl IntoResponse, Error> {
    let user = state.users.add(&creds.username, &creds.password).await?;
    let token = auth::issue_token(&state.config.secret_key, &user)?;
    let session = state.sessions.create(user.id).await?;
    tracing::info!(user_id = session.user_id, "created session");
    Ok((
        [(header::SET_COOKIE, session_cookie(&session))],
        Json(Token { token }),
    ))
}

/// login
///
/// [Public Route] Authenticates a username/password pair. Unknown users and
/// wrong passwords are reported distinctly, both as 401.
#[utoipa::path(
    post,
    path = "/api/login",
    request_body = Credentials,
    responses(
        (status = 200, description = "Logged in", body = Token),
        (status = 401, description = "Unknown user or wrong password")
    )
)]
pub async fn login(
    State(state): State<AppState>,
    Json(creds): Json<Credentials>,
) -> Result<impl IntoResponse, Error> {
    let user = state
        .users
        .authorize(&creds.username, &creds.password)
        .await?;
    let token = auth::issue_token(&state.config.secret_key, &user)?;
    let session = state.sessions.create(user.id).await?;
    tracing::info!(user_id = session.user_id, "created session");
    Ok((
        [(header::SET_COOKIE, session_cookie(&session))],
        Json(Token { token }),
    ))
}

// --- Post Handlers ---

/// list_posts
///
/// [Public Route] Lists every post in storage order.
#[utoipa::path(
    get,
    path = "/api/posts",
    responses((status = 200, description = "All posts", body = [Post]))
)]
pub async fn list_posts(State(state): State<AppState>) -> Result<Json<Vec<Post>>, Error> {
    Ok(Json(state.content.all().await?))
}

/// posts_by_category
///
/// [Public Route] Lists the posts of one category, storage order.
#[utoipa::path(
    get,
    path = "/api/posts/{category}",
    params(("category" = String, Path, description = "Category name")),
    responses((status = 200, description = "Posts in category", body = [Post]))
)]
pub async fn posts_by_category(
    State(state): State<AppState>,
    Path(category): Path<String>,
) -> Result<Json<Vec<Post>>, Error> {
    Ok(Json(state.content.by_category(&category).await?))
}

/// get_post
///
/// [Public Route] Fetches a single post for display. Each successful read
/// bumps the view counter as an observable side effect.
#[utoipa::path(
    get,
    path = "/api/post/{post_id}",
    params(("post_id" = Uuid, Path, description = "Post ID")),
    responses(
        (status = 200, description = "Found", body = Post),
        (status = 404, description = "No such post")
    )
)]
pub async fn get_post(
    State(state): State<AppState>,
    Path(post_id): Path<Uuid>,
) -> Result<Json<Post>, Error> {
    Ok(Json(state.content.one(post_id).await?))
}

/// add_post
///
/// [Gated Route] Submits a new post. The author snapshot is captured from
/// the session's user at creation time; the post starts with the author's
/// own upvote already applied.
#[utoipa::path(
    post,
    path = "/api/posts",
    request_body = CreatePostRequest,
    responses((status = 201, description = "Created", body = Post))
)]
pub async fn add_post(
    session: Session,
    State(state): State<AppState>,
    Json(payload): Json<CreatePostRequest>,
) -> Result<impl IntoResponse, Error> {
    let user = session_user(&state, &session).await?;
    let mut post = Post::compose(Author::from(&user), payload);
    state.content.add(&mut post).await?;
    Ok((StatusCode::CREATED, Json(post)))
}

/// user_posts
///
/// [Public Route] Lists all posts authored by the given username.
#[utoipa::path(
    get,
    path = "/api/user/{username}",
    params(("username" = String, Path, description = "Author username")),
    responses((status = 200, description = "The user's posts", body = [Post]))
)]
pub async fn user_posts(
    State(state): State<AppState>,
    Path(username): Path<String>,
) -> Result<Json<Vec<Post>>, Error> {
    Ok(Json(state.content.by_author(&username).await?))
}

/// delete_post
///
/// [Gated Route] Deletes a post after checking the requester against the
/// author snapshot. Non-authors get 403 and the post stays retrievable.
#[utoipa::path(
    delete,
    path = "/api/post/{post_id}",
    params(("post_id" = Uuid, Path, description = "Post ID")),
    responses(
        (status = 200, description = "Deleted"),
        (status = 403, description = "Not the author"),
        (status = 404, description = "No such post")
    )
)]
pub async fn delete_post(
    session: Session,
    State(state): State<AppState>,
    Path(post_id): Path<Uuid>,
) -> Result<impl IntoResponse, Error> {
    let user = session_user(&state, &session).await?;
    state.content.delete(post_id, &user).await?;
    Ok(Json(json!({ "message": "success" })))
}

// --- Comment Handlers ---

/// add_comment
///
/// [Gated Route] Appends a comment to a post and echoes the updated post.
#[utoipa::path(
    post,
    path = "/api/post/{post_id}",
    params(("post_id" = Uuid, Path, description = "Post ID")),
    request_body = CreateCommentRequest,
    responses(
        (status = 200, description = "Updated post", body = Post),
        (status = 404, description = "No such post")
    )
)]
pub async fn add_comment(
    session: Session,
    State(state): State<AppState>,
    Path(post_id): Path<Uuid>,
    Json(payload): Json<CreateCommentRequest>,
) -> Result<Json<Post>, Error> {
    let user = session_user(&state, &session).await?;
    let mut post = state.content.get(post_id).await?;
    let comment = Comment::compose(Author::from(&user), payload.comment);
    state.content.add_comment(&mut post, comment).await?;
    Ok(Json(post))
}

/// delete_comment
///
/// [Gated Route] Removes the requester's own comment from a post; order of
/// the remaining comments is preserved. Echoes the updated post.
#[utoipa::path(
    delete,
    path = "/api/post/{post_id}/{action}",
    params(
        ("post_id" = Uuid, Path, description = "Post ID"),
        ("action" = Uuid, Path, description = "Comment ID")
    ),
    responses(
        (status = 200, description = "Updated post", body = Post),
        (status = 403, description = "Not the comment author"),
        (status = 404, description = "No such post or comment")
    )
)]
pub async fn delete_comment(
    session: Session,
    State(state): State<AppState>,
    Path((post_id, comment_id)): Path<(Uuid, Uuid)>,
) -> Result<Json<Post>, Error> {
    let mut post = state.content.get(post_id).await?;
    state
        .content
        .delete_comment(&mut post, comment_id, session.user_id)
        .await?;
    Ok(Json(post))
}

// --- Vote Handler ---

/// vote_post
///
/// [Gated Route] Casts a vote. The direction string maps "upvote" to +1 and
/// "downvote" to -1; anything else is value 0, which combined with the
/// retract step acts as a pure un-vote. The retract-then-apply pair keeps at
/// most one vote per user on the post.
#[utoipa::path(
    get,
    path = "/api/post/{post_id}/{action}",
    params(
        ("post_id" = Uuid, Path, description = "Post ID"),
        ("action" = String, Path, description = "Vote direction: upvote or downvote")
    ),
    responses(
        (status = 200, description = "Updated post", body = Post),
        (status = 404, description = "No such post")
    )
)]
pub async fn vote_post(
    session: Session,
    State(state): State<AppState>,
    Path((post_id, action)): Path<(Uuid, String)>,
) -> Result<Json<Post>, Error> {
    let value = match action.as_str() {
        "upvote" => 1,
        "downvote" => -1,
        _ => 0,
    };
    let mut post = state.content.get(post_id).await?;
    state.content.retract_vote(&mut post, session.user_id).await?;
    state.content.vote(&mut post, session.user_id, value).await?;
    Ok(Json(post))
}
