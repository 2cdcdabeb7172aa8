/// Book listing page.
/// Fetches from the JSON API in the browser whenever the filter or title changes.
use leptos::*;
use gloo_net::http::Request;
use crate::components::{book_filters::BookFilters, books_list::BooksList};
use crate::models::book::BookSummary;
use crate::query::BookFilter;

fn books_url(filter: BookFilter, title: &str) -> String {
    format!(
        "/api/books?filter={}&title={}",
        urlencoding::encode(filter.as_str()),
        urlencoding::encode(title.trim())
    )
}

async fn fetch_books(filter: BookFilter, title: String) -> Result<Vec<BookSummary>, String> {
    let response = Request::get(&books_url(filter, &title))
        .send()
        .await
        .map_err(|e| e.to_string())?;
    if !response.ok() {
        return Err(format!("Failed to load books (HTTP {})", response.status()));
    }
    response
        .json::<Vec<BookSummary>>()
        .await
        .map_err(|e| e.to_string())
}

#[component]
pub fn BooksPage() -> impl IntoView {
    let (filter, set_filter) = create_signal(BookFilter::default());
    let (title, set_title) = create_signal(String::new());

    let books = create_local_resource(
        move || (filter.get(), title.get()),
        |(filter, title)| fetch_books(filter, title),
    );

    view! {
        <div>
            <h1>{ "Books" }</h1>
            <input
                type="text"
                placeholder="Search by title"
                prop:value=title
                on:input=move |e| set_title.set(event_target_value(&e))
            />
            <BookFilters selected=filter on_select=set_filter />
            <Transition fallback=move || view! { <p>{ "Loading..." }</p> }>
                {move || books.get().map(|result| match result {
                    Ok(books) => view! { <BooksList books=books /> }.into_view(),
                    Err(err) => view! { <p class="error">{ err }</p> }.into_view(),
                })}
            </Transition>
        </div>
    }
}
