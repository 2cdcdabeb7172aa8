//! Read and write paths over the book store.
//!
//! Reads go through the cache. Book updates and deletes drop the book's cache
//! entry right after the write succeeds; review writes leave it alone.
//!
//! Every book write also bumps a write epoch. A read only stores its result
//! if no book write happened while it was running, so a read that started
//! before an update cannot put the old page back after the entry was dropped.

use chrono::{DateTime, Utc};
use leptos::logging::log;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::cache::{book_cache_key, books_cache_key, Cache};
use crate::db::Database;
use crate::error::{AppError, AppResult};
use crate::models::book::{Book, BookDetails, BookSummary, BookUpdate};
use crate::models::review::{NewReview, Review, MAX_RATING, MIN_RATING};
use crate::query::{BookFilter, BookQuery};

const MAX_REVIEW_LEN: usize = 1000;

pub struct BookService {
    db: Arc<Database>,
    cache: Arc<dyn Cache>,
    ttl: Duration,
    writes: AtomicU64,
}

impl BookService {
    pub fn new(db: Arc<Database>, cache: Arc<dyn Cache>, ttl: Duration) -> Self {
        Self {
            db,
            cache,
            ttl,
            writes: AtomicU64::new(0),
        }
    }

    pub async fn list_books(&self, filter: BookFilter, title: &str) -> AppResult<Vec<BookSummary>> {
        self.list_books_at(filter, title, Utc::now()).await
    }

    /// Lists books for `filter`, with preset windows ending at `now`.
    pub async fn list_books_at(
        &self,
        filter: BookFilter,
        title: &str,
        now: DateTime<Utc>,
    ) -> AppResult<Vec<BookSummary>> {
        let key = books_cache_key(filter, title);
        if let Some(books) = self.cached(&key)? {
            return Ok(books);
        }

        let epoch = self.write_epoch();
        let query = filter.apply(BookQuery::new().filter_by_title(title), now);
        let books = self.db.query_books(&query).await?;
        log!("[SERVICE] {} books for filter '{}'", books.len(), filter);
        self.remember_if_current(&key, &books, epoch)?;
        Ok(books)
    }

    /// One book with all of its reviews, newest first.
    pub async fn show_book(&self, id: i64) -> AppResult<BookDetails> {
        let key = book_cache_key(id);
        if let Some(details) = self.cached(&key)? {
            return Ok(details);
        }

        let epoch = self.write_epoch();
        let query = BookQuery::new()
            .where_id(id)
            .with_reviews_count(None, None)
            .with_avg_rating(None, None);
        let summary = self
            .db
            .query_books(&query)
            .await?
            .into_iter()
            .next()
            .ok_or(AppError::BookNotFound(id))?;
        let reviews = self.db.reviews_for_book(id).await?;
        let details = BookDetails { summary, reviews };
        self.remember_if_current(&key, &details, epoch)?;
        Ok(details)
    }

    pub async fn create_book(&self, update: BookUpdate) -> AppResult<Book> {
        let (title, author) = validate_book(&update)?;
        Ok(self.db.insert_book(title, author, Utc::now()).await?)
    }

    pub async fn update_book(&self, id: i64, update: BookUpdate) -> AppResult<Book> {
        let (title, author) = validate_book(&update)?;
        if !self.db.update_book(id, title, author, Utc::now()).await? {
            return Err(AppError::BookNotFound(id));
        }
        self.invalidate(id);

        self.db.find_book(id).await?.ok_or(AppError::BookNotFound(id))
    }

    pub async fn delete_book(&self, id: i64) -> AppResult<()> {
        if !self.db.delete_book(id).await? {
            return Err(AppError::BookNotFound(id));
        }
        self.invalidate(id);
        Ok(())
    }

    pub async fn add_review(&self, book_id: i64, review: NewReview) -> AppResult<Review> {
        if !(MIN_RATING..=MAX_RATING).contains(&review.rating) {
            return Err(AppError::InvalidRating(review.rating));
        }
        let body = review.review.trim();
        if body.is_empty() || body.chars().count() > MAX_REVIEW_LEN {
            return Err(AppError::InvalidInput(format!(
                "review must be 1 to {} characters",
                MAX_REVIEW_LEN
            )));
        }
        if self.db.find_book(book_id).await?.is_none() {
            return Err(AppError::BookNotFound(book_id));
        }

        let rating = review.rating as u8;
        Ok(self.db.insert_review(book_id, body, rating, Utc::now()).await?)
    }

    fn cached<T: DeserializeOwned>(&self, key: &str) -> AppResult<Option<T>> {
        match self.cache.get(key) {
            Some(value) => {
                log!("[SERVICE] Cache hit {}", key);
                Ok(Some(serde_json::from_value(value)?))
            }
            None => Ok(None),
        }
    }

    fn write_epoch(&self) -> u64 {
        self.writes.load(Ordering::Acquire)
    }

    // The epoch moves before the entry is dropped, so a read that snapshotted
    // the old epoch can no longer store its result.
    fn invalidate(&self, id: i64) {
        self.writes.fetch_add(1, Ordering::AcqRel);
        self.cache.forget(&book_cache_key(id));
    }

    /// Stores `value` unless a book write happened since `epoch` was taken.
    fn remember_if_current<T: Serialize>(&self, key: &str, value: &T, epoch: u64) -> AppResult<()> {
        let value = serde_json::to_value(value)?;
        if self.write_epoch() != epoch {
            log!("[SERVICE] Skipping cache fill for {} after a concurrent write", key);
            return Ok(());
        }
        self.cache.put(key, value, self.ttl);
        // A write that bumped and forgot between the check and the put.
        if self.write_epoch() != epoch {
            self.cache.forget(key);
        }
        Ok(())
    }
}

fn validate_book(update: &BookUpdate) -> AppResult<(&str, &str)> {
    let title = update.title.trim();
    let author = update.author.trim();
    if title.is_empty() || author.is_empty() {
        return Err(AppError::InvalidInput("title and author are required".into()));
    }
    Ok((title, author))
}
