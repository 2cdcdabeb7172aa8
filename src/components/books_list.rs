use leptos::*;
use crate::models::book::BookSummary;

fn rating_text(book: &BookSummary) -> String {
    match book.reviews_avg_rating {
        Some(avg) => format!("{:.1} / 5", avg),
        None => "No rating yet".to_string(),
    }
}

#[component]
pub fn BooksList(books: Vec<BookSummary>) -> impl IntoView {
    if books.is_empty() {
        return view! { <p>{ "No books found" }</p> }.into_view();
    }

    view! {
        <ul class="books">
            {
                books.into_iter().map(|book| {
                    let rating = rating_text(&book);
                    let reviews = format!("out of {} reviews", book.reviews_count.unwrap_or(0));
                    let key = book.book.id.to_string();
                    let by = format!(" by {}", book.book.author);
                    view! {
                        <li key={key}>
                            <div>
                                <strong>{ book.book.title }</strong>
                                <span>{ by }</span>
                            </div>
                            <div>
                                <span>{ rating }</span>
                                <span>{ reviews }</span>
                            </div>
                        </li>
                    }
                }).collect::<Vec<_>>()
            }
        </ul>
    }
    .into_view()
}
