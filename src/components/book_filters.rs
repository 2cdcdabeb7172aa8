use leptos::*;
use crate::query::BookFilter;

/// One tab per listing preset; the active one is highlighted.
#[component]
pub fn BookFilters(selected: ReadSignal<BookFilter>, on_select: WriteSignal<BookFilter>) -> impl IntoView {
    view! {
        <div class="filters">
            {
                BookFilter::ALL.into_iter().map(|filter| view! {
                    <button
                        type="button"
                        class:active=move || selected.get() == filter
                        on:click=move |_| on_select.set(filter)
                    >
                        { filter.label() }
                    </button>
                }).collect::<Vec<_>>()
            }
        </div>
    }
}
