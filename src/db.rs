#[cfg(feature = "ssr")]
mod db_impl {
    use crate::models::book::{Book, BookSummary};
    use crate::models::review::Review;
    use crate::query::{BookQuery, SqlParam};
    use chrono::{DateTime, Utc};
    use leptos::logging;
    use leptos::logging::log;
    use rusqlite::types::ToSqlOutput;
    use rusqlite::{params, Connection, Error, OptionalExtension, Row, ToSql};
    use std::sync::Arc;
    use tokio::sync::Mutex;

    #[cfg(test)]
    mod tests {
        use super::*;
        use chrono::{Duration, TimeZone};

        fn now() -> DateTime<Utc> {
            Utc.with_ymd_and_hms(2024, 6, 15, 12, 0, 0).unwrap()
        }

        // Helper function to create test database
        async fn create_test_db() -> Database {
            log!("[TEST] Creating in-memory test database");
            let db = Database::new(":memory:").unwrap();
            db.create_schema().await.unwrap();
            log!("[TEST] Database schema created");
            db
        }

        async fn book_with_ratings(
            db: &Database,
            title: &str,
            ratings: &[u8],
            at: DateTime<Utc>,
        ) -> Book {
            let book = db.insert_book(title, "Anon", at).await.unwrap();
            for rating in ratings {
                db.insert_review(book.id, "review", *rating, at).await.unwrap();
            }
            book
        }

        async fn first_count(db: &Database, query: BookQuery) -> i64 {
            db.query_books(&query).await.unwrap()[0].reviews_count.unwrap()
        }

        #[tokio::test]
        async fn test_schema_creation() {
            log!("[TEST] Starting test_schema_creation");
            let db = create_test_db().await;

            let conn = db.conn.lock().await;
            let mut stmt = conn
                .prepare("SELECT name FROM sqlite_master WHERE type='table'")
                .unwrap();
            let tables: Vec<String> = stmt
                .query_map([], |row| row.get(0))
                .unwrap()
                .collect::<Result<_, _>>()
                .unwrap();

            assert!(tables.contains(&"books".to_string()));
            assert!(tables.contains(&"reviews".to_string()));
        }

        #[tokio::test]
        async fn test_book_lifecycle() {
            log!("[TEST] Starting test_book_lifecycle");
            let db = create_test_db().await;

            let book = db.insert_book("Dune", "Frank Herbert", now()).await.unwrap();
            assert!(book.id > 0);
            assert_eq!(db.find_book(book.id).await.unwrap(), Some(book.clone()));
            log!("[TEST] Book insertion - PASSED");

            let later = now() + Duration::days(1);
            assert!(db.update_book(book.id, "Dune Messiah", "F. Herbert", later).await.unwrap());
            let updated = db.find_book(book.id).await.unwrap().unwrap();
            assert_eq!(updated.title, "Dune Messiah");
            assert_eq!(updated.created_at, book.created_at);
            assert_eq!(updated.updated_at, later);
            assert!(!db.update_book(9999, "x", "y", later).await.unwrap());
            log!("[TEST] Book update - PASSED");

            db.insert_review(book.id, "Great", 5, now()).await.unwrap();
            assert!(db.delete_book(book.id).await.unwrap());
            assert!(db.find_book(book.id).await.unwrap().is_none());
            assert!(!db.delete_book(book.id).await.unwrap());
            // reviews are not cascaded
            assert_eq!(db.reviews_for_book(book.id).await.unwrap().len(), 1);
            log!("[TEST] test_book_lifecycle completed successfully");
        }

        #[tokio::test]
        async fn test_reviews_newest_first() {
            let db = create_test_db().await;
            let book = db.insert_book("Emma", "Jane Austen", now()).await.unwrap();
            db.insert_review(book.id, "old", 3, now() - Duration::days(3)).await.unwrap();
            db.insert_review(book.id, "new", 4, now()).await.unwrap();

            let reviews = db.reviews_for_book(book.id).await.unwrap();
            assert_eq!(reviews.len(), 2);
            assert_eq!(reviews[0].review, "new");
            assert_eq!(reviews[0].rating, 4);
            assert_eq!(reviews[1].review, "old");
        }

        #[tokio::test]
        async fn test_zero_reviews_yield_zero_count_and_no_average() {
            let db = create_test_db().await;
            book_with_ratings(&db, "Lonely", &[], now()).await;
            book_with_ratings(&db, "Old News", &[5], now() - Duration::days(90)).await;

            let since = now() - Duration::days(30);
            let rows = db
                .query_books(
                    &BookQuery::new()
                        .with_reviews_count(Some(since), None)
                        .with_avg_rating(Some(since), None),
                )
                .await
                .unwrap();

            assert_eq!(rows.len(), 2);
            for row in rows {
                assert_eq!(row.reviews_count, Some(0));
                assert_eq!(row.reviews_avg_rating, None);
            }
        }

        #[tokio::test]
        async fn test_unrequested_aggregates_are_absent() {
            let db = create_test_db().await;
            book_with_ratings(&db, "Plain", &[4], now()).await;

            let rows = db.query_books(&BookQuery::new()).await.unwrap();
            assert_eq!(rows.len(), 1);
            assert_eq!(rows[0].reviews_count, None);
            assert_eq!(rows[0].reviews_avg_rating, None);
        }

        #[tokio::test]
        async fn test_min_reviews_boundary() {
            let db = create_test_db().await;
            book_with_ratings(&db, "One", &[3], now()).await;
            book_with_ratings(&db, "Two", &[3, 4], now()).await;
            book_with_ratings(&db, "Three", &[3, 4, 5], now()).await;

            let rows = db
                .query_books(&BookQuery::new().with_reviews_count(None, None).min_reviews(2))
                .await
                .unwrap();
            let titles: Vec<&str> = rows.iter().map(|r| r.book.title.as_str()).collect();
            assert_eq!(titles, vec!["Two", "Three"]);
            assert!(rows.iter().all(|r| r.reviews_count.unwrap() >= 2));
        }

        #[tokio::test]
        async fn test_window_edges_are_inclusive() {
            let db = create_test_db().await;
            let from = now() - Duration::days(10);
            let to = now();
            let book = db.insert_book("Edges", "Anon", from).await.unwrap();
            db.insert_review(book.id, "at from", 2, from).await.unwrap();
            db.insert_review(book.id, "at to", 4, to).await.unwrap();
            db.insert_review(book.id, "before", 1, from - Duration::seconds(1)).await.unwrap();
            db.insert_review(book.id, "after", 5, to + Duration::seconds(1)).await.unwrap();

            let q = BookQuery::new();
            assert_eq!(first_count(&db, q.clone().with_reviews_count(Some(from), None)).await, 3);
            assert_eq!(first_count(&db, q.clone().with_reviews_count(None, Some(to))).await, 3);
            assert_eq!(first_count(&db, q.clone().with_reviews_count(Some(from), Some(to))).await, 2);
            assert_eq!(first_count(&db, q.clone().with_reviews_count(None, None)).await, 4);
            assert_eq!(first_count(&db, q.with_reviews_count(Some(to), Some(from))).await, 0);

            let rows = db
                .query_books(&BookQuery::new().with_avg_rating(Some(from), Some(to)))
                .await
                .unwrap();
            assert_eq!(rows[0].reviews_avg_rating, Some(3.0));
        }

        #[tokio::test]
        async fn test_popular_sorts_descending_by_count() {
            let db = create_test_db().await;
            book_with_ratings(&db, "Few", &[5], now()).await;
            book_with_ratings(&db, "Many", &[1, 2, 3, 4], now()).await;
            book_with_ratings(&db, "Some", &[2, 2], now()).await;

            let rows = db.query_books(&BookQuery::new().popular(None, None)).await.unwrap();
            let counts: Vec<i64> = rows.iter().map(|r| r.reviews_count.unwrap()).collect();
            assert_eq!(counts, vec![4, 2, 1]);
            assert!(rows.iter().all(|r| r.reviews_avg_rating.is_none()));
        }

        #[tokio::test]
        async fn test_highest_rated_puts_unreviewed_last() {
            let db = create_test_db().await;
            book_with_ratings(&db, "Unreviewed", &[], now()).await;
            book_with_ratings(&db, "Good", &[4, 4], now()).await;
            book_with_ratings(&db, "Best", &[5], now()).await;

            let rows = db
                .query_books(&BookQuery::new().highest_rated(None, None))
                .await
                .unwrap();
            let titles: Vec<&str> = rows.iter().map(|r| r.book.title.as_str()).collect();
            assert_eq!(titles, vec!["Best", "Good", "Unreviewed"]);
        }

        #[tokio::test]
        async fn test_title_filter_is_case_insensitive_substring() {
            let db = create_test_db().await;
            for title in ["War and Peace", "Warcraft", "Anna Karenina", "Cold war"] {
                db.insert_book(title, "Anon", now()).await.unwrap();
            }

            let all = db.query_books(&BookQuery::new().filter_by_title("")).await.unwrap();
            assert_eq!(all.len(), 4);

            let rows = db
                .query_books(&BookQuery::new().filter_by_title("War"))
                .await
                .unwrap();
            let titles: Vec<&str> = rows.iter().map(|r| r.book.title.as_str()).collect();
            assert_eq!(titles, vec!["War and Peace", "Warcraft", "Cold war"]);

            let rows = db
                .query_books(&BookQuery::new().filter_by_title("wARCRAFT"))
                .await
                .unwrap();
            assert_eq!(rows.len(), 1);

            let rows = db
                .query_books(&BookQuery::new().filter_by_title("%"))
                .await
                .unwrap();
            assert!(rows.is_empty());
        }

        #[tokio::test]
        async fn test_title_filter_folds_non_ascii_case() {
            let db = create_test_db().await;
            let zola = db.insert_book("Émile Zola: Germinal", "Anon", now()).await.unwrap();
            let tolstoy = db.insert_book("ВОЙНА и мир", "Anon", now()).await.unwrap();
            db.insert_book("Emile", "Anon", now()).await.unwrap();

            for needle in ["émile", "ÉMILE", "Émile"] {
                let rows = db
                    .query_books(&BookQuery::new().filter_by_title(needle))
                    .await
                    .unwrap();
                assert_eq!(rows.len(), 1, "needle {needle}");
                assert_eq!(rows[0].book.id, zola.id);
                assert_eq!(rows[0].book.title, "Émile Zola: Germinal");
            }

            let rows = db
                .query_books(&BookQuery::new().filter_by_title("война"))
                .await
                .unwrap();
            assert_eq!(rows.len(), 1);
            assert_eq!(rows[0].book.id, tolstoy.id);

            // renaming refreshes the folded copy
            db.update_book(tolstoy.id, "Анна Каренина", "Anon", now()).await.unwrap();
            let rows = db
                .query_books(&BookQuery::new().filter_by_title("АННА"))
                .await
                .unwrap();
            assert_eq!(rows.len(), 1);
            assert!(db
                .query_books(&BookQuery::new().filter_by_title("война"))
                .await
                .unwrap()
                .is_empty());
        }

        #[tokio::test]
        async fn test_where_id_selects_one_book_with_aggregates() {
            let db = create_test_db().await;
            let first = book_with_ratings(&db, "First", &[2, 5], now()).await;
            book_with_ratings(&db, "Second", &[1], now()).await;

            let query = BookQuery::new()
                .where_id(first.id)
                .with_reviews_count(None, None)
                .with_avg_rating(None, None);
            let rows = db.query_books(&query).await.unwrap();
            assert_eq!(rows.len(), 1);
            assert_eq!(rows[0].book, first);
            assert_eq!(rows[0].reviews_count, Some(2));
            assert_eq!(rows[0].reviews_avg_rating, Some(3.5));

            let rows = db.query_books(&BookQuery::new().where_id(999)).await.unwrap();
            assert!(rows.is_empty());
        }

        #[tokio::test]
        async fn test_popular_last_month_scenario() {
            log!("[TEST] Starting test_popular_last_month_scenario");
            let db = create_test_db().await;
            let recent = now() - Duration::days(5);
            let a = book_with_ratings(&db, "Book A", &[4, 5, 3], recent).await;
            book_with_ratings(&db, "Book B", &[5], recent).await;

            let rows = db
                .query_books(&BookQuery::new().popular_last_month(now()))
                .await
                .unwrap();
            assert_eq!(rows.len(), 1);
            assert_eq!(rows[0].book.id, a.id);
            assert_eq!(rows[0].reviews_count, Some(3));
            assert_eq!(rows[0].reviews_avg_rating, Some(4.0));
            log!("[TEST] test_popular_last_month_scenario completed successfully");
        }

        #[tokio::test]
        async fn test_six_month_presets_need_five_reviews() {
            let db = create_test_db().await;
            let in_window = now() - Duration::days(100);
            book_with_ratings(&db, "Four", &[5, 5, 5, 5], in_window).await;
            book_with_ratings(&db, "Five", &[3, 3, 3, 3, 3], in_window).await;
            book_with_ratings(&db, "Ancient", &[5, 5, 5, 5, 5, 5], now() - Duration::days(400)).await;

            for query in [
                BookQuery::new().popular_last_6_months(now()),
                BookQuery::new().highest_rated_last_6_months(now()),
            ] {
                let rows = db.query_books(&query).await.unwrap();
                assert_eq!(rows.len(), 1);
                assert_eq!(rows[0].book.title, "Five");
                assert_eq!(rows[0].reviews_count, Some(5));
            }
        }
    }

    impl ToSql for SqlParam {
        fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
            Ok(match self {
                SqlParam::Int(v) => ToSqlOutput::from(*v),
                SqlParam::Text(s) => ToSqlOutput::from(s.as_str()),
            })
        }
    }

    // Timestamps are stored as unix milliseconds.
    fn to_millis(at: DateTime<Utc>) -> i64 {
        at.timestamp_millis()
    }

    // SQLite's LIKE only folds ASCII, so titles are also stored lowercased.
    fn fold(title: &str) -> String {
        title.to_lowercase()
    }

    fn timestamp_at(row: &Row<'_>, idx: usize) -> Result<DateTime<Utc>, Error> {
        let millis: i64 = row.get(idx)?;
        DateTime::from_timestamp_millis(millis).ok_or(Error::IntegralValueOutOfRange(idx, millis))
    }

    fn book_from_row(row: &Row<'_>) -> Result<Book, Error> {
        Ok(Book {
            id: row.get(0)?,
            title: row.get(1)?,
            author: row.get(2)?,
            created_at: timestamp_at(row, 3)?,
            updated_at: timestamp_at(row, 4)?,
        })
    }

    fn review_from_row(row: &Row<'_>) -> Result<Review, Error> {
        let rating: i64 = row.get(3)?;
        Ok(Review {
            id: row.get(0)?,
            book_id: row.get(1)?,
            review: row.get(2)?,
            rating: u8::try_from(rating).map_err(|_| Error::IntegralValueOutOfRange(3, rating))?,
            created_at: timestamp_at(row, 4)?,
            updated_at: timestamp_at(row, 5)?,
        })
    }

    #[derive(Debug)]
    pub struct Database {
        conn: Arc<Mutex<Connection>>,
    }

    impl Database {
        pub fn new(db_path: &str) -> Result<Self, Error> {
            let conn = Connection::open(db_path)?;
            logging::log!("Database connection established at: {}", db_path);
            Ok(Database {
                conn: Arc::new(Mutex::new(conn)),
            })
        }

        pub async fn create_schema(&self) -> Result<(), Error> {
            let conn = self.conn.lock().await;

            conn.execute_batch(
                "CREATE TABLE IF NOT EXISTS books (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    title TEXT NOT NULL,
                    title_folded TEXT NOT NULL,
                    author TEXT NOT NULL,
                    created_at INTEGER NOT NULL,
                    updated_at INTEGER NOT NULL
                );",
            )
            .map_err(|e| {
                logging::error!("Failed creating books table: {}", e);
                e
            })?;

            // No foreign key: deleting a book leaves its reviews in place.
            conn.execute_batch(
                "CREATE TABLE IF NOT EXISTS reviews (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    book_id INTEGER NOT NULL,
                    review TEXT NOT NULL,
                    rating INTEGER NOT NULL,
                    created_at INTEGER NOT NULL,
                    updated_at INTEGER NOT NULL
                );
                CREATE INDEX IF NOT EXISTS reviews_book_created
                    ON reviews (book_id, created_at);",
            )
            .map_err(|e| {
                logging::error!("Failed creating reviews table: {}", e);
                e
            })?;
            Ok(())
        }

        pub async fn insert_book(
            &self,
            title: &str,
            author: &str,
            at: DateTime<Utc>,
        ) -> Result<Book, Error> {
            let conn = self.conn.lock().await;
            conn.execute(
                "INSERT INTO books (title, title_folded, author, created_at, updated_at)
                VALUES (?, ?, ?, ?, ?)",
                params![title, fold(title), author, to_millis(at), to_millis(at)],
            )?;
            let id = conn.last_insert_rowid();
            log!("[DB] Book inserted: {} ({})", id, title);
            conn.query_row(
                "SELECT id, title, author, created_at, updated_at FROM books WHERE id = ?",
                [id],
                book_from_row,
            )
        }

        pub async fn find_book(&self, id: i64) -> Result<Option<Book>, Error> {
            let conn = self.conn.lock().await;
            conn.query_row(
                "SELECT id, title, author, created_at, updated_at FROM books WHERE id = ?",
                [id],
                book_from_row,
            )
            .optional()
        }

        /// Returns whether a row was changed.
        pub async fn update_book(
            &self,
            id: i64,
            title: &str,
            author: &str,
            at: DateTime<Utc>,
        ) -> Result<bool, Error> {
            let conn = self.conn.lock().await;
            let changed = conn.execute(
                "UPDATE books SET title = ?, title_folded = ?, author = ?, updated_at = ?
                WHERE id = ?",
                params![title, fold(title), author, to_millis(at), id],
            )?;
            log!("[DB] Book {} updated ({} rows)", id, changed);
            Ok(changed > 0)
        }

        /// Returns whether a row was deleted. Reviews are left untouched.
        pub async fn delete_book(&self, id: i64) -> Result<bool, Error> {
            let conn = self.conn.lock().await;
            let changed = conn.execute("DELETE FROM books WHERE id = ?", [id])?;
            log!("[DB] Book {} deleted ({} rows)", id, changed);
            Ok(changed > 0)
        }

        pub async fn insert_review(
            &self,
            book_id: i64,
            review: &str,
            rating: u8,
            at: DateTime<Utc>,
        ) -> Result<Review, Error> {
            let conn = self.conn.lock().await;
            conn.execute(
                "INSERT INTO reviews (book_id, review, rating, created_at, updated_at)
                VALUES (?, ?, ?, ?, ?)",
                params![book_id, review, rating, to_millis(at), to_millis(at)],
            )?;
            let id = conn.last_insert_rowid();
            log!("[DB] Review {} inserted for book {}", id, book_id);
            conn.query_row(
                "SELECT id, book_id, review, rating, created_at, updated_at
                FROM reviews WHERE id = ?",
                [id],
                review_from_row,
            )
        }

        // Newest first
        pub async fn reviews_for_book(&self, book_id: i64) -> Result<Vec<Review>, Error> {
            let conn = self.conn.lock().await;
            let mut stmt = conn.prepare(
                "SELECT id, book_id, review, rating, created_at, updated_at
                FROM reviews
                WHERE book_id = ?
                ORDER BY created_at DESC, id DESC",
            )?;
            let reviews = stmt.query_map([book_id], review_from_row)?;
            reviews.collect()
        }

        /// Runs a composed query. Storage errors are returned as-is.
        pub async fn query_books(&self, query: &BookQuery) -> Result<Vec<BookSummary>, Error> {
            let (sql, params) = query.to_sql();
            log!("[DB] Running book query: {} ({} params)", sql, params.len());

            let conn = self.conn.lock().await;
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(rusqlite::params_from_iter(params.iter()), |row| {
                Ok(BookSummary {
                    book: book_from_row(row)?,
                    reviews_count: row.get(5)?,
                    reviews_avg_rating: row.get(6)?,
                })
            })?;

            let mut result = Vec::new();
            for row in rows {
                result.push(row?);
            }
            log!("[DB] Book query returned {} rows", result.len());
            Ok(result)
        }
    }
}

#[cfg(feature = "ssr")]
pub use db_impl::Database;
