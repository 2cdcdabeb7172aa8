use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::review::Review;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Book {
    pub id: i64,
    pub title: String,
    pub author: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A book row as returned by a composed query.
///
/// The aggregate fields are only present when the matching step was applied
/// to the query. `reviews_avg_rating` is `None` both when the average was not
/// requested and when no review fell inside the window.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct BookSummary {
    #[serde(flatten)]
    pub book: Book,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reviews_count: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reviews_avg_rating: Option<f64>,
}

/// Book page payload: the book, its aggregates over all reviews, and the reviews themselves.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct BookDetails {
    #[serde(flatten)]
    pub summary: BookSummary,
    pub reviews: Vec<Review>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct BookUpdate {
    pub title: String,
    pub author: String,
}
