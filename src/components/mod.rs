pub mod book_filters;
pub mod books_list;
pub mod books_page;
