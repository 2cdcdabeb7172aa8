#[cfg(feature = "ssr")]
#[actix_web::main]
async fn main() -> std::io::Result<()> {
    use actix_files::Files;
    use actix_web::{web, App, HttpServer};
    use bookreview::api;
    use bookreview::app::App as BookReviewApp;
    use bookreview::cache::MemoryCache;
    use bookreview::config::AppConfig;
    use bookreview::db::Database;
    use bookreview::service::BookService;
    use leptos::get_configuration;
    use leptos::logging::log;
    use leptos_actix::{generate_route_list, LeptosRoutes};
    use std::io::Error;
    use std::sync::Arc;

    let config = AppConfig::from_env();

    // Initialize the database
    let db = Database::new(&config.database_path).map_err(Error::other)?;
    db.create_schema().await.map_err(Error::other)?;
    log!("Schema created successfully!");

    let service = web::Data::new(BookService::new(
        Arc::new(db),
        Arc::new(MemoryCache::new(config.cache_capacity)),
        config.cache_ttl,
    ));

    // Load configuration
    let conf = get_configuration(None).await.map_err(Error::other)?;
    let addr = conf.leptos_options.site_addr;

    // Generate the list of routes in your Leptos App
    let routes = generate_route_list(BookReviewApp);
    log!("listening on http://{}", &addr);

    HttpServer::new(move || {
        let leptos_options = &conf.leptos_options;
        let site_root = &leptos_options.site_root;

        App::new()
            .app_data(service.clone())
            // Register API routes BEFORE Leptos routes
            .configure(api::configure)
            // Serve JS/WASM/CSS from `pkg`
            .service(Files::new("/pkg", format!("{site_root}/pkg")))
            // Serve other assets from the `assets` directory
            .service(Files::new("/assets", site_root))
            // Serve the favicon from /favicon.ico
            .service(favicon)
            .leptos_routes(leptos_options.to_owned(), routes.to_owned(), BookReviewApp)
            .app_data(web::Data::new(leptos_options.to_owned()))
    })
    .bind(&addr)?
    .run()
    .await
}

#[cfg(feature = "ssr")]
#[actix_web::get("favicon.ico")]
async fn favicon(
    leptos_options: actix_web::web::Data<leptos::LeptosOptions>,
) -> actix_web::Result<actix_files::NamedFile> {
    let leptos_options = leptos_options.into_inner();
    let site_root = &leptos_options.site_root;
    Ok(actix_files::NamedFile::open(format!(
        "{site_root}/favicon.ico"
    ))?)
}

#[cfg(not(any(feature = "ssr", feature = "csr")))]
pub fn main() {
    // no client-side main function
    // see lib.rs for hydration function instead
}

#[cfg(all(not(feature = "ssr"), feature = "csr"))]
pub fn main() {
    // to run: `trunk serve --open --features csr`
    use bookreview::app::*;

    console_error_panic_hook::set_once();

    leptos::mount_to_body(App);
}
