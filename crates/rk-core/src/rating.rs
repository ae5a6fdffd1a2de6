//! # Rating Aggregator
//!
//! A post's average is the mean of two values: the author's own rating and
//! the collective mean of every comment rating. The author therefore weighs
//! as much as all commenters together.

use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};

pub const MIN_RATING: f64 = 1.0;
pub const MAX_RATING: f64 = 5.0;

/// A rating that has passed validation: finite and within `[1, 5]`.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize)]
#[serde(transparent)]
pub struct Rating(f64);

impl Rating {
    pub fn new(value: f64) -> Result<Self> {
        if !value.is_finite() || !(MIN_RATING..=MAX_RATING).contains(&value) {
            return Err(AppError::ValidationError(format!(
                "rating must be between {MIN_RATING} and {MAX_RATING}"
            )));
        }
        Ok(Self(value))
    }

    pub fn value(self) -> f64 {
        self.0
    }
}

/// A rating as it arrives over the wire. Clients send either a JSON number or
/// a numeric string, so both are accepted here and checked by [`Rating`].
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum RatingInput {
    Number(f64),
    Text(String),
}

impl RatingInput {
    pub fn parse(&self) -> Result<Rating> {
        match self {
            RatingInput::Number(n) => Rating::new(*n),
            RatingInput::Text(raw) => {
                let n: f64 = raw.trim().parse().map_err(|_| {
                    AppError::ValidationError(format!("rating must be a number, got {raw:?}"))
                })?;
                Rating::new(n)
            }
        }
    }
}

impl From<f64> for RatingInput {
    fn from(n: f64) -> Self {
        RatingInput::Number(n)
    }
}

/// Returns the two-level mean of `author_rating` and `comment_ratings`.
///
/// With no comment ratings the author's rating is returned unchanged.
pub fn compute_average(author_rating: f64, comment_ratings: &[f64]) -> f64 {
    if comment_ratings.is_empty() {
        return author_rating;
    }
    let comments_mean = comment_ratings.iter().sum::<f64>() / comment_ratings.len() as f64;
    (author_rating + comments_mean) / 2.0
}

/// The post fields written together with a new comment.
#[derive(Debug, Clone, PartialEq)]
pub struct RatingUpdate {
    pub comment_ratings: Vec<f64>,
    pub average_rating: f64,
}

impl RatingUpdate {
    /// Appends `rating` to the current ratings and recomputes the average from
    /// scratch.
    pub fn append(author_rating: f64, current: &[f64], rating: Rating) -> Self {
        let mut comment_ratings = Vec::with_capacity(current.len() + 1);
        comment_ratings.extend_from_slice(current);
        comment_ratings.push(rating.value());
        let average_rating = compute_average(author_rating, &comment_ratings);
        Self {
            comment_ratings,
            average_rating,
        }
    }
}

/// Output of the rating lookup for a single post.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RatingSummary {
    pub average_rating: f64,
    pub author_rating: f64,
    pub comment_ratings: Vec<f64>,
    pub total_ratings: usize,
}
