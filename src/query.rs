//! Composable book queries.
//!
//! A [`BookQuery`] accumulates filter, aggregate, sort and threshold steps and
//! is only turned into SQL when executed. Aggregates over reviews are always
//! derived at query time; nothing here is stored on the book rows.

use chrono::{DateTime, Months, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Inclusive timestamp range with either bound optional.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DateWindow {
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

impl DateWindow {
    pub fn new(from: Option<DateTime<Utc>>, to: Option<DateTime<Utc>>) -> Self {
        Self { from, to }
    }

    pub fn unbounded() -> Self {
        Self::default()
    }

    /// `[now - months, now]`, using calendar months.
    pub fn last_months(now: DateTime<Utc>, months: u32) -> Self {
        let from = now
            .checked_sub_months(Months::new(months))
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        Self::new(Some(from), Some(now))
    }

    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        match (self.from, self.to) {
            (None, None) => true,
            (None, Some(to)) => at <= to,
            (Some(from), None) => at >= from,
            (Some(from), Some(to)) => from <= at && at <= to,
        }
    }

    // Appends the predicate for `column` and its params; None when unbounded.
    fn predicate(&self, column: &str, params: &mut Vec<SqlParam>) -> Option<String> {
        match (self.from, self.to) {
            (None, None) => None,
            (None, Some(to)) => {
                params.push(SqlParam::Int(to.timestamp_millis()));
                Some(format!("{column} <= ?"))
            }
            (Some(from), None) => {
                params.push(SqlParam::Int(from.timestamp_millis()));
                Some(format!("{column} >= ?"))
            }
            (Some(from), Some(to)) => {
                params.push(SqlParam::Int(from.timestamp_millis()));
                params.push(SqlParam::Int(to.timestamp_millis()));
                Some(format!("{column} BETWEEN ? AND ?"))
            }
        }
    }
}

/// A value derived per book from its reviews.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Aggregate {
    ReviewsCount,
    AvgRating,
}

impl Aggregate {
    pub fn column(&self) -> &'static str {
        match self {
            Aggregate::ReviewsCount => "reviews_count",
            Aggregate::AvgRating => "reviews_avg_rating",
        }
    }

    fn expression(&self) -> &'static str {
        match self {
            Aggregate::ReviewsCount => "COUNT(*)",
            Aggregate::AvgRating => "AVG(r.rating)",
        }
    }
}

/// Sort keys. All of them sort descending.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SortKey {
    ReviewsCount,
    AvgRating,
    CreatedAt,
}

impl SortKey {
    pub fn column(&self) -> &'static str {
        match self {
            SortKey::ReviewsCount => Aggregate::ReviewsCount.column(),
            SortKey::AvgRating => Aggregate::AvgRating.column(),
            SortKey::CreatedAt => "created_at",
        }
    }
}

/// Positional parameter bound to a `?` placeholder, in textual order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SqlParam {
    Int(i64),
    Text(String),
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct BookQuery {
    id: Option<i64>,
    title: Option<String>,
    aggregates: Vec<(Aggregate, DateWindow)>,
    sorts: Vec<SortKey>,
    min_reviews: Option<i64>,
}

impl BookQuery {
    pub fn new() -> Self {
        Self::default()
    }

    /// Restricts the query to the book with `id`.
    pub fn where_id(mut self, id: i64) -> Self {
        self.id = Some(id);
        self
    }

    /// Case-insensitive substring match on the title. Blank input is ignored,
    /// surrounding whitespace is trimmed.
    pub fn filter_by_title(mut self, title: impl AsRef<str>) -> Self {
        let title = title.as_ref().trim();
        if !title.is_empty() {
            self.title = Some(title.to_string());
        }
        self
    }

    pub fn with_reviews_count(
        self,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
    ) -> Self {
        self.with_aggregate(Aggregate::ReviewsCount, DateWindow::new(from, to))
    }

    pub fn with_avg_rating(self, from: Option<DateTime<Utc>>, to: Option<DateTime<Utc>>) -> Self {
        self.with_aggregate(Aggregate::AvgRating, DateWindow::new(from, to))
    }

    /// Keeps books whose review count is at least `min_count`.
    ///
    /// Applied after aggregation. If no count was attached, an unrestricted
    /// one is used when the query is compiled.
    pub fn min_reviews(mut self, min_count: i64) -> Self {
        self.min_reviews = Some(min_count);
        self
    }

    pub fn popular(self, from: Option<DateTime<Utc>>, to: Option<DateTime<Utc>>) -> Self {
        self.with_reviews_count(from, to)
            .order_by(SortKey::ReviewsCount)
    }

    pub fn highest_rated(self, from: Option<DateTime<Utc>>, to: Option<DateTime<Utc>>) -> Self {
        self.with_avg_rating(from, to).order_by(SortKey::AvgRating)
    }

    pub fn latest(self) -> Self {
        self.order_by(SortKey::CreatedAt)
    }

    pub fn popular_last_month(self, now: DateTime<Utc>) -> Self {
        BookFilter::PopularLastMonth.apply(self, now)
    }

    pub fn popular_last_6_months(self, now: DateTime<Utc>) -> Self {
        BookFilter::PopularLast6Months.apply(self, now)
    }

    pub fn highest_rated_last_month(self, now: DateTime<Utc>) -> Self {
        BookFilter::HighestRatedLastMonth.apply(self, now)
    }

    pub fn highest_rated_last_6_months(self, now: DateTime<Utc>) -> Self {
        BookFilter::HighestRatedLast6Months.apply(self, now)
    }

    // Re-applying an aggregate replaces its window in place.
    fn with_aggregate(mut self, aggregate: Aggregate, window: DateWindow) -> Self {
        match self.aggregates.iter_mut().find(|(a, _)| *a == aggregate) {
            Some(entry) => entry.1 = window,
            None => self.aggregates.push((aggregate, window)),
        }
        self
    }

    // A key keeps the position it was first applied at.
    fn order_by(mut self, key: SortKey) -> Self {
        if !self.sorts.contains(&key) {
            self.sorts.push(key);
        }
        self
    }

    pub fn title(&self) -> Option<&str> {
        self.title.as_deref()
    }

    pub fn threshold(&self) -> Option<i64> {
        self.min_reviews
    }

    pub fn window_for(&self, aggregate: Aggregate) -> Option<DateWindow> {
        self.aggregates
            .iter()
            .find(|(a, _)| *a == aggregate)
            .map(|(_, w)| *w)
    }

    /// Sort keys in `ORDER BY` priority, which is the order they were applied
    /// in: the first sort is primary, later ones break ties.
    pub fn effective_order(&self) -> Vec<SortKey> {
        self.sorts.clone()
    }

    fn effective_aggregates(&self) -> Vec<(Aggregate, DateWindow)> {
        let mut aggregates = self.aggregates.clone();
        if self.min_reviews.is_some() && self.window_for(Aggregate::ReviewsCount).is_none() {
            aggregates.push((Aggregate::ReviewsCount, DateWindow::unbounded()));
        }
        aggregates
    }

    /// Compiles to a SQLite statement over `books` / `reviews`.
    ///
    /// Columns are always `id, title, author, created_at, updated_at,
    /// reviews_count, reviews_avg_rating`; aggregates that were not requested
    /// come back as NULL.
    pub fn to_sql(&self) -> (String, Vec<SqlParam>) {
        let mut params = Vec::new();
        let aggregates = self.effective_aggregates();

        let mut columns = vec![
            "b.id".to_string(),
            "b.title".to_string(),
            "b.author".to_string(),
            "b.created_at".to_string(),
            "b.updated_at".to_string(),
        ];
        for aggregate in [Aggregate::ReviewsCount, Aggregate::AvgRating] {
            let column = match aggregates.iter().find(|(a, _)| *a == aggregate) {
                Some((_, window)) => {
                    let mut sub = format!(
                        "(SELECT {} FROM reviews r WHERE r.book_id = b.id",
                        aggregate.expression()
                    );
                    if let Some(predicate) = window.predicate("r.created_at", &mut params) {
                        sub.push_str(" AND ");
                        sub.push_str(&predicate);
                    }
                    sub.push(')');
                    format!("{sub} AS {}", aggregate.column())
                }
                None => format!("NULL AS {}", aggregate.column()),
            };
            columns.push(column);
        }

        let mut conditions = Vec::new();
        if let Some(id) = self.id {
            conditions.push("b.id = ?");
            params.push(SqlParam::Int(id));
        }
        if let Some(title) = &self.title {
            // `title_folded` is the stored title lowercased the same way.
            conditions.push("b.title_folded LIKE ? ESCAPE '\\'");
            params.push(SqlParam::Text(format!(
                "%{}%",
                escape_like(&title.to_lowercase())
            )));
        }
        let mut inner = format!("SELECT {} FROM books b", columns.join(", "));
        if !conditions.is_empty() {
            inner.push_str(" WHERE ");
            inner.push_str(&conditions.join(" AND "));
        }

        let mut sql = format!(
            "SELECT id, title, author, created_at, updated_at, reviews_count, reviews_avg_rating \
             FROM ({inner}) AS books_view"
        );
        if let Some(min) = self.min_reviews {
            sql.push_str(" WHERE reviews_count >= ?");
            params.push(SqlParam::Int(min));
        }

        let mut order: Vec<String> = self
            .effective_order()
            .iter()
            .map(|key| format!("{} DESC", key.column()))
            .collect();
        order.push("id ASC".to_string());
        sql.push_str(" ORDER BY ");
        sql.push_str(&order.join(", "));

        (sql, params)
    }
}

fn escape_like(input: &str) -> String {
    let mut escaped = String::with_capacity(input.len());
    for c in input.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// Named listing presets, keyed by the `filter` request parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum BookFilter {
    #[default]
    Latest,
    PopularLastMonth,
    PopularLast6Months,
    HighestRatedLastMonth,
    HighestRatedLast6Months,
}

impl BookFilter {
    pub const ALL: [BookFilter; 5] = [
        BookFilter::Latest,
        BookFilter::PopularLastMonth,
        BookFilter::PopularLast6Months,
        BookFilter::HighestRatedLastMonth,
        BookFilter::HighestRatedLast6Months,
    ];

    /// Unknown or missing values fall back to [`BookFilter::Latest`].
    pub fn from_param(param: Option<&str>) -> Self {
        param
            .and_then(|p| p.parse().ok())
            .unwrap_or_default()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            BookFilter::Latest => "",
            BookFilter::PopularLastMonth => "popular_last_month",
            BookFilter::PopularLast6Months => "popular_last_6months",
            BookFilter::HighestRatedLastMonth => "highest_rated_last_month",
            BookFilter::HighestRatedLast6Months => "highest_rated_last_6months",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            BookFilter::Latest => "Latest",
            BookFilter::PopularLastMonth => "Popular Last Month",
            BookFilter::PopularLast6Months => "Popular Last 6 Months",
            BookFilter::HighestRatedLastMonth => "Highest Rated Last Month",
            BookFilter::HighestRatedLast6Months => "Highest Rated Last 6 Months",
        }
    }

    pub fn apply(&self, query: BookQuery, now: DateTime<Utc>) -> BookQuery {
        match self {
            BookFilter::Latest => query
                .latest()
                .with_reviews_count(None, None)
                .with_avg_rating(None, None),
            BookFilter::PopularLastMonth => {
                let w = DateWindow::last_months(now, 1);
                query
                    .popular(w.from, w.to)
                    .highest_rated(w.from, w.to)
                    .min_reviews(2)
            }
            BookFilter::PopularLast6Months => {
                let w = DateWindow::last_months(now, 6);
                query
                    .popular(w.from, w.to)
                    .highest_rated(w.from, w.to)
                    .min_reviews(5)
            }
            BookFilter::HighestRatedLastMonth => {
                let w = DateWindow::last_months(now, 1);
                query
                    .highest_rated(w.from, w.to)
                    .popular(w.from, w.to)
                    .min_reviews(2)
            }
            BookFilter::HighestRatedLast6Months => {
                let w = DateWindow::last_months(now, 6);
                query
                    .highest_rated(w.from, w.to)
                    .popular(w.from, w.to)
                    .min_reviews(5)
            }
        }
    }
}

impl FromStr for BookFilter {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        BookFilter::ALL
            .into_iter()
            .find(|f| f.as_str() == s)
            .ok_or_else(|| format!("unknown book filter: {s}"))
    }
}

impl fmt::Display for BookFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
