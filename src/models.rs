use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use ts_rs::TS;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::error::Error;

// --- Core Application Schemas ---

/// User
///
/// The canonical identity record owned by the credential store. Never
/// serialized to clients directly; the wire-visible projection is `Author`.
#[derive(Debug, Clone, FromRow)]
pub struct User {
    pub id: i64,
    pub username: String,
    // bcrypt hash, set by the credential store on registration.
    pub password: String,
}

/// Author
///
/// The denormalized snapshot of a user embedded in posts and comments.
/// Captured at creation time; later changes to the user record do not
/// retroactively update past posts or comments.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct Author {
    pub username: String,
    pub id: i64,
}

impl From<&User> for Author {
    fn from(user: &User) -> Self {
        Self {
            username: user.username.clone(),
            id: user.id,
        }
    }
}

/// Vote
///
/// A single vote inside a post's vote set. At most one entry per user id,
/// maintained by the retract-then-apply convention (see `Post`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct Vote {
    pub user: i64,
    pub vote: i64,
}

/// Comment
///
/// Owned exclusively by its parent post; created and deleted only through
/// post mutations.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct Comment {
    pub id: Uuid,
    #[ts(type = "string")]
    pub created: DateTime<Utc>,
    pub author: Author,
    pub body: String,
}

impl Comment {
    /// A comment as composed by the handler. The content store assigns the
    /// canonical id and timestamp when the comment is appended.
    pub fn compose(author: Author, body: String) -> Self {
        Self {
            id: Uuid::new_v4(),
            created: Utc::now(),
            author,
            body,
        }
    }
}

/// Post
///
/// The post document, embedding its comment list and vote set. The mutation
/// methods below are the single implementation of the scoring and comment
/// invariants; every store backend calls them and then persists the whole
/// document.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct Post {
    pub id: Uuid,
    pub author: Author,
    pub category: String,
    pub title: String,
    // "text" or "link"; decides which of `text`/`url` carries the content.
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[ts(type = "string")]
    pub created: DateTime<Utc>,
    pub views: i64,
    pub score: i64,
    pub upvote_percentage: i64,
    pub comments: Vec<Comment>,
    pub votes: Vec<Vote>,
}

impl Post {
    /// Builds a new post from the submission payload, seeded with the
    /// author's own upvote: score 1, upvote percentage 100, zero views, no
    /// comments. The content store assigns the canonical id on insert.
    pub fn compose(author: Author, req: CreatePostRequest) -> Self {
        Self {
            id: Uuid::new_v4(),
            votes: vec![Vote {
                user: author.id,
                vote: 1,
            }],
            score: 1,
            upvote_percentage: 100,
            views: 0,
            comments: Vec::new(),
            created: Utc::now(),
            author,
            category: req.category,
            title: req.title,
            kind: req.kind,
            text: req.text,
            url: req.url,
        }
    }

    /// Appends a comment, preserving append order.
    pub fn push_comment(&mut self, comment: Comment) {
        self.comments.push(comment);
    }

    /// Removes the comment with the given id if the requester authored it.
    /// Relative order of the remaining comments is preserved.
    pub fn remove_comment(&mut self, comment_id: Uuid, requester: i64) -> Result<(), Error> {
        let pos = self
            .comments
            .iter()
            .position(|c| c.id == comment_id)
            .ok_or(Error::CommentNotFound)?;
        if self.comments[pos].author.id != requester {
            return Err(Error::PermissionDenied);
        }
        self.comments.remove(pos);
        Ok(())
    }

    /// Idempotent pre-step of the retract-then-apply voting convention: if
    /// the user has an existing vote, subtract its value from the score and
    /// drop it from the vote set. Returns whether anything changed, so the
    /// caller knows whether a persist is due.
    pub fn retract_vote(&mut self, user_id: i64) -> bool {
        match self.votes.iter().position(|v| v.user == user_id) {
            Some(pos) => {
                self.score -= self.votes[pos].vote;
                self.votes.remove(pos);
                true
            }
            None => false,
        }
    }

    /// Applies a vote value. A zero value appends no record and leaves the
    /// score unchanged, which together with `retract_vote` acts as a pure
    /// retraction. The upvote percentage is always recomputed from scratch.
    pub fn apply_vote(&mut self, user_id: i64, value: i64) {
        if value != 0 {
            self.votes.push(Vote {
                user: user_id,
                vote: value,
            });
        }
        self.score += value;
        self.recompute_upvote_percentage();
    }

    // upvote_percentage = floor(100 * upvotes / total), 0 for an empty set.
    fn recompute_upvote_percentage(&mut self) {
        if self.votes.is_empty() {
            self.upvote_percentage = 0;
            return;
        }
        let upvotes = self.votes.iter().filter(|v| v.vote == 1).count() as i64;
        self.upvote_percentage = 100 * upvotes / self.votes.len() as i64;
    }
}

// --- Request Payloads (Input Schemas) ---

/// Credentials
///
/// Input payload for both registration and login.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

/// CreatePostRequest
///
/// Input payload for submitting a new post (POST /api/posts). Exactly one of
/// `text`/`url` is expected to carry content, selected by `type`.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct CreatePostRequest {
    pub category: String,
    pub title: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

/// CreateCommentRequest
///
/// Input payload for posting a new comment.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct CreateCommentRequest {
    pub comment: String,
}

// --- Response Payloads ---

/// Token
///
/// The signed claim blob handed to the client at register/login. Independent
/// from the session cookie; the server never re-validates it.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct Token {
    pub token: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn author(id: i64) -> Author {
        Author {
            username: format!("user{id}"),
            id,
        }
    }

    fn text_post() -> Post {
        Post::compose(
            author(1),
            CreatePostRequest {
                category: "programming".into(),
                title: "hello".into(),
                kind: "text".into(),
                text: Some("body".into()),
                url: None,
            },
        )
    }

    #[test]
    fn fresh_post_is_seeded_with_author_upvote() {
        let post = text_post();
        assert_eq!(post.score, 1);
        assert_eq!(post.upvote_percentage, 100);
        assert_eq!(post.views, 0);
        assert!(post.comments.is_empty());
        assert_eq!(post.votes, vec![Vote { user: 1, vote: 1 }]);
    }

    #[test]
    fn retract_then_apply_keeps_one_vote_per_user() {
        let mut post = text_post();

        // Second user upvotes.
        post.retract_vote(2);
        post.apply_vote(2, 1);
        assert_eq!(post.score, 2);
        assert_eq!(post.upvote_percentage, 100);

        // Same user switches to a downvote; still exactly one entry.
        post.retract_vote(2);
        post.apply_vote(2, -1);
        assert_eq!(post.votes.iter().filter(|v| v.user == 2).count(), 1);
        assert_eq!(post.score, 0);
        assert_eq!(post.upvote_percentage, 50);

        // Re-issuing the same vote does not accumulate.
        post.retract_vote(2);
        post.apply_vote(2, -1);
        assert_eq!(post.votes.len(), 2);
        assert_eq!(post.score, 0);
    }

    #[test]
    fn score_always_equals_vote_sum() {
        let mut post = text_post();
        for (user, value) in [(2, 1), (3, -1), (4, 1), (2, -1), (3, -1)] {
            post.retract_vote(user);
            post.apply_vote(user, value);
            let sum: i64 = post.votes.iter().map(|v| v.vote).sum();
            assert_eq!(post.score, sum);
        }
    }

    #[test]
    fn zero_vote_is_a_pure_retraction() {
        let mut post = text_post();
        post.retract_vote(2);
        post.apply_vote(2, 1);

        // "unvote": retract, then apply value 0.
        post.retract_vote(2);
        post.apply_vote(2, 0);
        assert!(post.votes.iter().all(|v| v.user != 2));
        assert_eq!(post.score, 1);
        assert_eq!(post.upvote_percentage, 100);
    }

    #[test]
    fn percentage_is_floored_and_zero_when_empty() {
        let mut post = text_post();
        post.retract_vote(1);
        post.apply_vote(1, 0);
        assert!(post.votes.is_empty());
        assert_eq!(post.upvote_percentage, 0);

        // Two up, one down: floor(100 * 2 / 3) = 66.
        for (user, value) in [(1, 1), (2, 1), (3, -1)] {
            post.retract_vote(user);
            post.apply_vote(user, value);
        }
        assert_eq!(post.upvote_percentage, 66);
    }

    #[test]
    fn remove_comment_checks_author_and_preserves_order() {
        let mut post = text_post();
        let second = Comment::compose(author(3), "second".into());
        let second_id = second.id;
        post.push_comment(Comment::compose(author(2), "first".into()));
        post.push_comment(second);
        post.push_comment(Comment::compose(author(2), "third".into()));

        // Wrong author: rejected, list untouched.
        let err = post.remove_comment(second_id, 2).unwrap_err();
        assert!(matches!(err, Error::PermissionDenied));
        assert_eq!(post.comments.len(), 3);

        // Right author: removed, remaining order intact.
        post.remove_comment(second_id, 3).unwrap();
        let bodies: Vec<&str> = post.comments.iter().map(|c| c.body.as_str()).collect();
        assert_eq!(bodies, vec!["first", "third"]);

        // Unknown id is its own failure kind.
        let err = post.remove_comment(second_id, 3).unwrap_err();
        assert!(matches!(err, Error::CommentNotFound));
    }
}
