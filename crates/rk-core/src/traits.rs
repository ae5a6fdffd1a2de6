//! # Core Traits (Ports)
//!
//! Any plugin must implement these traits to be used by the binary.

use async_trait::async_trait;
use uuid::Uuid;

use crate::models::{AuthoredComment, Comment, NewComment, NewPost, Post, PostQuery, SeekKey, User};
use crate::rating::RatingUpdate;
use crate::votes::{VoteCast, VoteOutcome, VoteRecord};

/// Data persistence contract for posts, comments and votes.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait PostRepo: Send + Sync {
    // Post Operations

    /// Stores a post. The store assigns the id and a monotonic timestamp.
    async fn insert_post(&self, post: NewPost) -> anyhow::Result<Post>;
    async fn get_post(&self, id: Uuid) -> anyhow::Result<Option<Post>>;
    /// Position of `id` in the newest-first order, if it exists.
    async fn seek_key(&self, id: Uuid) -> anyhow::Result<Option<SeekKey>>;
    /// Newest first, strictly after `after` when given.
    async fn list_posts(&self, query: &PostQuery, after: Option<SeekKey>, limit: u32) -> anyhow::Result<Vec<Post>>;
    async fn list_posts_by_author(&self, author_id: &str) -> anyhow::Result<Vec<Post>>;
    /// Removes the post, its comments and every vote pointing at either, atomically.
    /// Returns false when the post did not exist.
    async fn delete_post(&self, id: Uuid) -> anyhow::Result<bool>;

    // Comment Operations

    /// Writes the comment and the post's new rating fields in one transaction.
    async fn insert_comment(&self, comment: NewComment, ratings: RatingUpdate) -> anyhow::Result<Comment>;
    /// Newest first.
    async fn list_comments(&self, post_id: Uuid) -> anyhow::Result<Vec<Comment>>;
    async fn list_comments_by_author(&self, author_id: &str) -> anyhow::Result<Vec<AuthoredComment>>;

    // Vote Operations

    /// Applies the vote ledger transition for `cast` atomically: reads the
    /// current record, moves the counter by the delta and writes or deletes
    /// the record. Returns `None` when the target does not exist.
    async fn apply_vote(&self, cast: &VoteCast) -> anyhow::Result<Option<VoteOutcome>>;
    async fn list_post_votes(&self, user_id: &str) -> anyhow::Result<Vec<VoteRecord>>;
    async fn list_comment_votes(&self, user_id: &str) -> anyhow::Result<Vec<VoteRecord>>;
}

/// Account persistence contract.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait UserRepo: Send + Sync {
    /// Returns `None` if the email is already registered.
    async fn create_user(&self, email: &str, password_hash: &str) -> anyhow::Result<Option<User>>;
    async fn find_user_by_email(&self, email: &str) -> anyhow::Result<Option<User>>;
}

/// Media storage contract for image uploads.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait MediaStore: Send + Sync {
    /// Saves raw bytes and returns a media_id.
    async fn save_upload(&self, data: Vec<u8>, content_type: &str) -> anyhow::Result<String>;
    /// Returns the public URL of a stored upload.
    fn get_url(&self, media_id: &str) -> String;
}

/// Credential hashing contract.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait AuthProvider: Send + Sync {
    /// Produces a self-describing (PHC) hash of `password`.
    async fn hash_password(&self, password: &str) -> anyhow::Result<String>;
    /// Verifies `password` against a stored hash. Malformed hashes never verify.
    async fn verify_password(&self, password: &str, hash: &str) -> bool;
}
