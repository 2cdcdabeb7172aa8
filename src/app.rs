/// Root component: a single page listing books with filter tabs and a title search.
use leptos::*;
use leptos_meta::*;
use leptos_router::*;
use crate::components::books_page::BooksPage;

#[component]
pub fn App() -> impl IntoView {
    provide_meta_context();

    view! {
        <Title text="Book Reviews"/>
        <Router>
            <main>
                <Routes>
                    <Route path="" view=BooksPage/>
                </Routes>
            </main>
        </Router>
    }
}
