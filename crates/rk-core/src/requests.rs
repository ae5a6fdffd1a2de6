//! # Request Contracts
//!
//! Typed bodies accepted at the HTTP boundary. Missing strings deserialize to
//! empty ones so the services can report every missing field the same way.

use serde::Deserialize;

use crate::rating::RatingInput;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CreatePostRequest {
    pub title: String,
    pub description: String,
    pub author_id: String,
    pub author_name: String,
    pub author_rating: Option<RatingInput>,
    pub category: Option<String>,
    pub image_url: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AddCommentRequest {
    pub post_id: String,
    pub content: String,
    pub author_id: String,
    pub author_name: String,
    pub rating: Option<RatingInput>,
}

/// Body of the legacy upvote endpoint.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UserRef {
    pub user_id: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct VoteRequest {
    pub user_id: String,
    pub vote: Option<i64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}
