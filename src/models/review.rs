// src/models/review.rs
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Review {
    pub id: i64,
    pub book_id: i64,            // Book the review belongs to
    pub review: String,          // Free-text body
    pub rating: u8,              // 1..=5
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct NewReview {
    pub review: String,
    pub rating: i64,
}

pub const MIN_RATING: i64 = 1;
pub const MAX_RATING: i64 = 5;
