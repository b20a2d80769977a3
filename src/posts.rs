use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::Error;
use crate::models::{Comment, Post, User};

/// ContentStore
///
/// Owns posts together with their embedded comment lists and vote sets.
/// Every mutation follows the same discipline: the caller fetches a post
/// snapshot, the store mutates it in memory through the `Post` methods, and
/// the whole document is persisted back. The persist is conditional on the
/// post still existing; it is not guarded against concurrent writers, so the
/// last persist on a contested post wins (a documented property of the
/// design, not an accident).
#[async_trait]
pub trait ContentStore: Send + Sync {
    // --- Queries, returned in storage order ---
    async fn all(&self) -> Result<Vec<Post>, Error>;
    async fn by_category(&self, category: &str) -> Result<Vec<Post>, Error>;
    async fn by_author(&self, username: &str) -> Result<Vec<Post>, Error>;

    /// Plain fetch by id, used to obtain the snapshot a mutation starts from.
    async fn get(&self, id: Uuid) -> Result<Post, Error>;

    /// Display read: bumps the view counter as an observable side effect.
    /// The bump is persisted best-effort; concurrent readers may lose
    /// increments.
    async fn one(&self, id: Uuid) -> Result<Post, Error>;

    /// Inserts a new post, assigning it a fresh canonical id. Returns the id.
    async fn add(&self, post: &mut Post) -> Result<Uuid, Error>;

    /// Assigns the comment a fresh id and timestamp, appends it, persists the
    /// post. Fails with `PostNotFound` if the post vanished before the
    /// persist landed.
    async fn add_comment(&self, post: &mut Post, comment: Comment) -> Result<Uuid, Error>;

    /// Removes the requester's own comment, preserving the order of the
    /// rest. `CommentNotFound` if absent, `PermissionDenied` for non-authors.
    async fn delete_comment(
        &self,
        post: &mut Post,
        comment_id: Uuid,
        requester: i64,
    ) -> Result<(), Error>;

    /// Idempotent pre-step of retract-then-apply: drops any existing vote by
    /// the user and persists. A no-op (no persist) when the user holds none.
    async fn retract_vote(&self, post: &mut Post, user_id: i64) -> Result<(), Error>;

    /// Applies a vote value (0 appends nothing), recomputes the upvote
    /// percentage, and always persists.
    async fn vote(&self, post: &mut Post, user_id: i64, value: i64) -> Result<(), Error>;

    /// Deletes a post after checking the requester against the author
    /// snapshot.
    async fn delete(&self, id: Uuid, requester: &User) -> Result<(), Error>;
}

/// The concrete type used to share content store access across the
/// application state.
pub type ContentState = Arc<dyn ContentStore>;

/// PostgresContentStore
///
/// One JSONB document per post, with the category and author username
/// denormalized into filter columns. `seq` preserves insertion order for the
/// listing queries.
pub struct PostgresContentStore {
    pool: PgPool,
}

impl PostgresContentStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    // Whole-document write. Zero rows affected means the post was deleted
    // between fetch and persist.
    async fn persist(&self, post: &Post) -> Result<(), Error> {
        let doc = serde_json::to_value(post)?;
        let result =
            sqlx::query("UPDATE posts SET category = $2, author_name = $3, doc = $4 WHERE id = $1")
                .bind(post.id)
                .bind(&post.category)
                .bind(&post.author.username)
                .bind(doc)
                .execute(&self.pool)
                .await?;
        if result.rows_affected() == 0 {
            return Err(Error::PostNotFound);
        }
        Ok(())
    }
}

// Decodes a batch of JSONB documents back into posts.
fn decode_docs(docs: Vec<serde_json::Value>) -> Result<Vec<Post>, Error> {
    docs.into_iter()
        .map(|doc| serde_json::from_value(doc).map_err(Error::from))
        .collect()
}

#[async_trait]
impl ContentStore for PostgresContentStore {
    async fn all(&self) -> Result<Vec<Post>, Error> {
        let docs =
            sqlx::query_scalar::<_, serde_json::Value>("SELECT doc FROM posts ORDER BY seq")
                .fetch_all(&self.pool)
                .await?;
        decode_docs(docs)
    }

    async fn by_category(&self, category: &str) -> Result<Vec<Post>, Error> {
        let docs = sqlx::query_scalar::<_, serde_json::Value>(
            "SELECT doc FROM posts WHERE category = $1 ORDER BY seq",
        )
        .bind(category)
        .fetch_all(&self.pool)
        .await?;
        decode_docs(docs)
    }

    async fn by_author(&self, username: &str) -> Result<Vec<Post>, Error> {
        let docs = sqlx::query_scalar::<_, serde_json::Value>(
            "SELECT doc FROM posts WHERE author_name = $1 ORDER BY seq",
        )
        .bind(username)
        .fetch_all(&self.pool)
        .await?;
        decode_docs(docs)
    }

    async fn get(&self, id: Uuid) -> Result<Post, Error> {
        let doc =
            sqlx::query_scalar::<_, serde_json::Value>("SELECT doc FROM posts WHERE id = $1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?
                .ok_or(Error::PostNotFound)?;
        Ok(serde_json::from_value(doc)?)
    }

    async fn one(&self, id: Uuid) -> Result<Post, Error> {
        let mut post = self.get(id).await?;
        post.views += 1;
        if let Err(err) = self.persist(&post).await {
            tracing::warn!(post_id = %id, "view counter persist failed: {err}");
        }
        Ok(post)
    }

    async fn add(&self, post: &mut Post) -> Result<Uuid, Error> {
        // The store owns id assignment.
        post.id = Uuid::new_v4();
        let doc = serde_json::to_value(&*post)?;
        sqlx::query("INSERT INTO posts (id, category, author_name, doc) VALUES ($1, $2, $3, $4)")
            .bind(post.id)
            .bind(&post.category)
            .bind(&post.author.username)
            .bind(doc)
            .execute(&self.pool)
            .await?;
        Ok(post.id)
    }

    async fn add_comment(&self, post: &mut Post, mut comment: Comment) -> Result<Uuid, Error> {
        comment.id = Uuid::new_v4();
        comment.created = Utc::now();
        let id = comment.id;
        post.push_comment(comment);
        self.persist(post).await?;
        Ok(id)
    }

    async fn delete_comment(
        &self,
        post: &mut Post,
        comment_id: Uuid,
        requester: i64,
    ) -> Result<(), Error> {
        post.remove_comment(comment_id, requester)?;
        self.persist(post).await
    }

    async fn retract_vote(&self, post: &mut Post, user_id: i64) -> Result<(), Error> {
        if post.retract_vote(user_id) {
            self.persist(post).await?;
        }
        Ok(())
    }

    async fn vote(&self, post: &mut Post, user_id: i64, value: i64) -> Result<(), Error> {
        post.apply_vote(user_id, value);
        self.persist(post).await
    }

    async fn delete(&self, id: Uuid, requester: &User) -> Result<(), Error> {
        let post = self.get(id).await?;
        if post.author.id != requester.id {
            return Err(Error::PermissionDenied);
        }
        sqlx::query("DELETE FROM posts WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

/// MemoryContentStore
///
/// In-memory drop-in used by tests. A Vec keeps storage order; "persist" is
/// a whole-document replacement keyed by id, reproducing the conditional
/// UPDATE semantics of the Postgres store.
#[derive(Default)]
pub struct MemoryContentStore {
    posts: Mutex<Vec<Post>>,
}

impl MemoryContentStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn persist(&self, post: &Post) -> Result<(), Error> {
        let mut posts = self.posts.lock().unwrap();
        let slot = posts
            .iter_mut()
            .find(|p| p.id == post.id)
            .ok_or(Error::PostNotFound)?;
        *slot = post.clone();
        Ok(())
    }
}

#[async_trait]
impl ContentStore for MemoryContentStore {
    async fn all(&self) -> Result<Vec<Post>, Error> {
        Ok(self.posts.lock().unwrap().clone())
    }

    async fn by_category(&self, category: &str) -> Result<Vec<Post>, Error> {
        Ok(self
            .posts
            .lock()
            .unwrap()
            .iter()
            .filter(|p| p.category == category)
            .cloned()
            .collect())
    }

    async fn by_author(&self, username: &str) -> Result<Vec<Post>, Error> {
        Ok(self
            .posts
            .lock()
            .unwrap()
            .iter()
            .filter(|p| p.author.username == username)
            .cloned()
            .collect())
    }

    async fn get(&self, id: Uuid) -> Result<Post, Error> {
        self.posts
            .lock()
            .unwrap()
            .iter()
            .find(|p| p.id == id)
            .cloned()
            .ok_or(Error::PostNotFound)
    }

    async fn one(&self, id: Uuid) -> Result<Post, Error> {
        let mut post = self.get(id).await?;
        post.views += 1;
        if let Err(err) = self.persist(&post) {
            tracing::warn!(post_id = %id, "view counter persist failed: {err}");
        }
        Ok(post)
    }

    async fn add(&self, post: &mut Post) -> Result<Uuid, Error> {
        post.id = Uuid::new_v4();
        self.posts.lock().unwrap().push(post.clone());
        Ok(post.id)
    }

    async fn add_comment(&self, post: &mut Post, mut comment: Comment) -> Result<Uuid, Error> {
        comment.id = Uuid::new_v4();
        comment.created = Utc::now();
        let id = comment.id;
        post.push_comment(comment);
        self.persist(post)?;
        Ok(id)
    }

    async fn delete_comment(
        &self,
        post: &mut Post,
        comment_id: Uuid,
        requester: i64,
    ) -> Result<(), Error> {
        post.remove_comment(comment_id, requester)?;
        self.persist(post)
    }

    async fn retract_vote(&self, post: &mut Post, user_id: i64) -> Result<(), Error> {
        if post.retract_vote(user_id) {
            self.persist(post)?;
        }
        Ok(())
    }

    async fn vote(&self, post: &mut Post, user_id: i64, value: i64) -> Result<(), Error> {
        post.apply_vote(user_id, value);
        self.persist(post)
    }

    async fn delete(&self, id: Uuid, requester: &User) -> Result<(), Error> {
        let mut posts = self.posts.lock().unwrap();
        let pos = posts
            .iter()
            .position(|p| p.id == id)
            .ok_or(Error::PostNotFound)?;
        if posts[pos].author.id != requester.id {
            return Err(Error::PermissionDenied);
        }
        posts.remove(pos);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Author, CreatePostRequest};

    fn author(id: i64) -> Author {
        Author {
            username: format!("user{id}"),
            id,
        }
    }

    fn user(id: i64) -> User {
        User {
            id,
            username: format!("user{id}"),
            password: String::new(),
        }
    }

    async fn seeded(store: &MemoryContentStore) -> Uuid {
        let mut post = Post::compose(
            author(1),
            CreatePostRequest {
                category: "news".into(),
                title: "t".into(),
                kind: "text".into(),
                text: Some("body".into()),
                url: None,
            },
        );
        store.add(&mut post).await.unwrap()
    }

    #[tokio::test]
    async fn vote_pair_persists_exactly_one_entry_per_user() {
        let store = MemoryContentStore::new();
        let id = seeded(&store).await;

        let mut post = store.get(id).await.unwrap();
        store.retract_vote(&mut post, 2).await.unwrap();
        store.vote(&mut post, 2, 1).await.unwrap();

        let stored = store.get(id).await.unwrap();
        assert_eq!(stored.score, 2);
        assert_eq!(stored.votes.iter().filter(|v| v.user == 2).count(), 1);

        // Switch direction through the same pair.
        let mut post = store.get(id).await.unwrap();
        store.retract_vote(&mut post, 2).await.unwrap();
        store.vote(&mut post, 2, -1).await.unwrap();

        let stored = store.get(id).await.unwrap();
        assert_eq!(stored.score, 0);
        assert_eq!(stored.upvote_percentage, 50);
        assert_eq!(stored.votes.iter().filter(|v| v.user == 2).count(), 1);
    }

    #[tokio::test]
    async fn zero_vote_still_persists_the_recompute() {
        let store = MemoryContentStore::new();
        let id = seeded(&store).await;

        let mut post = store.get(id).await.unwrap();
        store.retract_vote(&mut post, 1).await.unwrap();
        store.vote(&mut post, 1, 0).await.unwrap();

        let stored = store.get(id).await.unwrap();
        assert!(stored.votes.is_empty());
        assert_eq!(stored.score, 0);
        assert_eq!(stored.upvote_percentage, 0);
    }

    #[tokio::test]
    async fn display_read_bumps_views_durably() {
        let store = MemoryContentStore::new();
        let id = seeded(&store).await;

        assert_eq!(store.one(id).await.unwrap().views, 1);
        assert_eq!(store.one(id).await.unwrap().views, 2);
        // Plain fetches do not count as display reads.
        assert_eq!(store.get(id).await.unwrap().views, 2);
    }

    #[tokio::test]
    async fn failed_comment_delete_leaves_the_post_unchanged() {
        let store = MemoryContentStore::new();
        let id = seeded(&store).await;

        let mut post = store.get(id).await.unwrap();
        let comment_id = store
            .add_comment(&mut post, Comment::compose(author(2), "hi".into()))
            .await
            .unwrap();

        let mut post = store.get(id).await.unwrap();
        let err = store
            .delete_comment(&mut post, comment_id, 1)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::PermissionDenied));
        assert_eq!(store.get(id).await.unwrap().comments.len(), 1);

        let mut post = store.get(id).await.unwrap();
        store.delete_comment(&mut post, comment_id, 2).await.unwrap();
        assert!(store.get(id).await.unwrap().comments.is_empty());
    }

    #[tokio::test]
    async fn delete_checks_the_author_snapshot() {
        let store = MemoryContentStore::new();
        let id = seeded(&store).await;

        let err = store.delete(id, &user(2)).await.unwrap_err();
        assert!(matches!(err, Error::PermissionDenied));
        assert!(store.get(id).await.is_ok());

        store.delete(id, &user(1)).await.unwrap();
        let err = store.get(id).await.unwrap_err();
        assert!(matches!(err, Error::PostNotFound));
    }

    #[tokio::test]
    async fn persist_after_deletion_surfaces_post_not_found() {
        let store = MemoryContentStore::new();
        let id = seeded(&store).await;

        let mut post = store.get(id).await.unwrap();
        store.delete(id, &user(1)).await.unwrap();

        let err = store
            .add_comment(&mut post, Comment::compose(author(2), "late".into()))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::PostNotFound));
    }
}
