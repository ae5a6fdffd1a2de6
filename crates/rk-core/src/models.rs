//! # Domain Models
//!
//! These structs represent the core entities of RankIt.
//! Ids are UUID v7 so they sort by creation time as a tie-breaker.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::rating::Rating;

pub const DEFAULT_PAGE_SIZE: u32 = 10;
pub const MAX_PAGE_SIZE: u32 = 100;

/// A ranked item: a course, a restaurant, a building...
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Post {
    pub id: Uuid,
    pub title: String,
    pub description: String,
    pub category: Option<String>,
    /// Public URL handed out by the MediaStore
    pub image_url: Option<String>,
    pub author_id: String,
    pub author_name: String,
    pub author_rating: f64,
    /// One entry per comment, in insertion order
    pub comment_ratings: Vec<f64>,
    pub average_rating: f64,
    pub upvotes: i64,
    /// Assigned by the store, strictly increasing
    #[serde(rename = "timestamp")]
    pub created_at: DateTime<Utc>,
}

impl Post {
    /// The author's rating plus one per comment.
    pub fn total_ratings(&self) -> usize {
        self.comment_ratings.len() + 1
    }
}

/// A reply to a post carrying its own rating.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    pub id: Uuid,
    pub post_id: Uuid,
    pub content: String,
    pub author_id: String,
    pub author_name: String,
    pub rating: f64,
    pub upvotes: i64,
    #[serde(rename = "timestamp")]
    pub created_at: DateTime<Utc>,
}

/// A comment listed in its author's history.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthoredComment {
    #[serde(flatten)]
    pub comment: Comment,
    pub post_title: String,
}

/// A post with its comments, newest comment first.
#[derive(Debug, Clone, PartialEq)]
pub struct PostThread {
    pub post: Post,
    pub comments: Vec<Comment>,
}

/// A validated post, ready to be stored. The store assigns id and timestamp.
#[derive(Debug, Clone, PartialEq)]
pub struct NewPost {
    pub title: String,
    pub description: String,
    pub category: Option<String>,
    pub image_url: Option<String>,
    pub author_id: String,
    pub author_name: String,
    pub author_rating: Rating,
}

/// A validated comment, ready to be stored.
#[derive(Debug, Clone, PartialEq)]
pub struct NewComment {
    pub post_id: Uuid,
    pub content: String,
    pub author_id: String,
    pub author_name: String,
    pub rating: Rating,
}

/// A registered account. The hash never leaves the process.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
}

/// Which posts a listing covers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PostQuery {
    All,
    /// Exact category match
    Category(String),
    /// Case-insensitive substring of the title
    TitleContains(String),
}

/// One page of a newest-first listing. `cursor` is the id of the last post
/// the caller has already seen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub limit: u32,
    pub cursor: Option<Uuid>,
}

impl Default for PageRequest {
    fn default() -> Self {
        Self {
            limit: DEFAULT_PAGE_SIZE,
            cursor: None,
        }
    }
}

/// Position of a post in the newest-first order. Resolved from a cursor id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct SeekKey {
    pub created_at: DateTime<Utc>,
    pub id: Uuid,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatedPost {
    pub post_id: Uuid,
    pub average_rating: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatedComment {
    pub comment_id: Uuid,
    pub average_rating: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VoteTally {
    pub current_votes: i64,
}
