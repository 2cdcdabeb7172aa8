#[cfg(feature = "ssr")]
use actix_web::{web, HttpResponse};
#[cfg(feature = "ssr")]
use crate::error::AppError;
#[cfg(feature = "ssr")]
use crate::models::book::BookUpdate;
#[cfg(feature = "ssr")]
use crate::models::review::NewReview;
#[cfg(feature = "ssr")]
use crate::query::BookFilter;
#[cfg(feature = "ssr")]
use crate::service::BookService;
#[cfg(feature = "ssr")]
use leptos::logging::log;

#[cfg(feature = "ssr")]
use serde::{Deserialize, Serialize};

/// Query string of `GET /api/books`.
#[cfg(feature = "ssr")]
#[derive(Serialize, Deserialize, Debug, Default)]
pub struct ListParams {
    pub filter: Option<String>,
    pub title: Option<String>,
}

#[cfg(feature = "ssr")]
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api")
            .route("/books", web::get().to(list_books)) // GET /api/books?filter=&title=
            .route("/books", web::post().to(create_book))
            .route("/books/{id}", web::get().to(show_book))
            .route("/books/{id}", web::put().to(update_book))
            .route("/books/{id}", web::delete().to(delete_book))
            .route("/books/{id}/reviews", web::post().to(create_review)),
    );
}

#[cfg(feature = "ssr")]
fn error_response(err: &AppError) -> HttpResponse {
    match err {
        AppError::BookNotFound(_) => HttpResponse::NotFound().body(err.to_string()),
        AppError::InvalidRating(_) | AppError::InvalidInput(_) => {
            HttpResponse::UnprocessableEntity().body(err.to_string())
        }
        AppError::Database(_) | AppError::Serialization(_) => {
            leptos::logging::error!("[API] Internal error: {:?}", err);
            HttpResponse::InternalServerError().body("Internal server error")
        }
    }
}

#[cfg(feature = "ssr")]
pub async fn list_books(
    service: web::Data<BookService>,
    params: web::Query<ListParams>,
) -> HttpResponse {
    let filter = BookFilter::from_param(params.filter.as_deref());
    let title = params.title.clone().unwrap_or_default();
    log!("[API] Listing books - filter: '{}', title: '{}'", filter, title);

    match service.list_books(filter, &title).await {
        Ok(books) => HttpResponse::Ok().json(books),
        Err(err) => error_response(&err),
    }
}

#[cfg(feature = "ssr")]
pub async fn show_book(service: web::Data<BookService>, id: web::Path<i64>) -> HttpResponse {
    match service.show_book(id.into_inner()).await {
        Ok(details) => HttpResponse::Ok().json(details),
        Err(err) => error_response(&err),
    }
}

#[cfg(feature = "ssr")]
pub async fn create_book(
    service: web::Data<BookService>,
    book: web::Json<BookUpdate>,
) -> HttpResponse {
    match service.create_book(book.into_inner()).await {
        Ok(book) => {
            log!("[API] Created book {}", book.id);
            HttpResponse::Created().json(book)
        }
        Err(err) => error_response(&err),
    }
}

#[cfg(feature = "ssr")]
pub async fn update_book(
    service: web::Data<BookService>,
    id: web::Path<i64>,
    book: web::Json<BookUpdate>,
) -> HttpResponse {
    let id = id.into_inner();
    match service.update_book(id, book.into_inner()).await {
        Ok(book) => {
            log!("[API] Updated book {}", id);
            HttpResponse::Ok().json(book)
        }
        Err(err) => error_response(&err),
    }
}

#[cfg(feature = "ssr")]
pub async fn delete_book(service: web::Data<BookService>, id: web::Path<i64>) -> HttpResponse {
    let id = id.into_inner();
    match service.delete_book(id).await {
        Ok(()) => {
            log!("[API] Deleted book {}", id);
            HttpResponse::NoContent().finish()
        }
        Err(err) => error_response(&err),
    }
}

#[cfg(feature = "ssr")]
pub async fn create_review(
    service: web::Data<BookService>,
    id: web::Path<i64>,
    review: web::Json<NewReview>,
) -> HttpResponse {
    let book_id = id.into_inner();
    match service.add_review(book_id, review.into_inner()).await {
        Ok(review) => {
            log!("[API] Review {} added to book {}", review.id, book_id);
            HttpResponse::Created().json(review)
        }
        Err(err) => error_response(&err),
    }
}
