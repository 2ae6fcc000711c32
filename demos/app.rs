//! A small service wired end to end: config, cache, repository, middleware,
//! router, and server.
//!
//! ```sh
//! RUST_LOG=routegate=debug cargo run --example app
//! curl -H 'X-User: ada' localhost:8080/api/books/1
//! ```

use std::sync::Arc;

use routegate::cache::{self, KeyNamespace};
use routegate::config::AppConfig;
use routegate::context::Context;
use routegate::middleware::{BoxError, Middleware, MiddlewareRegistry, Verdict};
use routegate::repository::{CachedRepository, Criteria, Entity, InMemoryStore, OrderBy};
use routegate::router::{RouteDefinition, RouterBuilder};
use routegate::server::Server;
use routegate::{Response, StatusCode};
use serde::{Deserialize, Serialize};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Book {
    id: u64,
    title: String,
    genre: String,
}

impl Entity for Book {
    const NAME: &'static str = "book";
    type Id = u64;

    fn id(&self) -> u64 {
        self.id
    }
}

type Books = CachedRepository<Book, InMemoryStore<Book>>;

/// The authenticated user name, taken from `X-User`.
struct User(String);

struct Authenticated;

impl Middleware for Authenticated {
    fn check(&mut self, ctx: &mut Context) -> Result<Verdict, BoxError> {
        let Some(name) = ctx.request().headers().get("X-User").map(str::to_owned) else {
            return Ok(Verdict::Fail);
        };
        ctx.extensions_mut().insert(User(name));
        Ok(Verdict::Pass)
    }
}

struct Librarian;

impl Middleware for Librarian {
    fn check(&mut self, ctx: &mut Context) -> Result<Verdict, BoxError> {
        Ok(ctx
            .extensions()
            .get::<User>()
            .is_some_and(|user| user.0 == "ada")
            .into())
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let config = AppConfig::default().with_process_env()?;
    let namespace = KeyNamespace::from_config(&config);
    let cache = cache::connect(&config.cache, &namespace);

    let store = InMemoryStore::with_rows(vec![
        Book { id: 1, title: "Dune".into(), genre: "sf".into() },
        Book { id: 2, title: "Emma".into(), genre: "classic".into() },
    ]);
    let books: Arc<Books> = Arc::new(CachedRepository::from_config(
        store,
        Arc::clone(&cache),
        &config.cache,
    ));

    let mut registry = MiddlewareRegistry::new();
    registry
        .register("auth", || Authenticated)
        .register("librarian", || Librarian);

    let show = Arc::clone(&books);
    let by_genre = Arc::clone(&books);
    let create = Arc::clone(&books);

    let router = RouterBuilder::new(config)
        .cache(cache)
        .middleware(registry)
        .route(
            RouteDefinition::get("/", "HomeController::index"),
            |_ctx| async { Response::new(StatusCode::Ok).body("routegate demo") },
        )
        .route(
            RouteDefinition::get("/access-denied", "HomeController::denied"),
            |_ctx| async { Response::new(StatusCode::Forbidden).body("access denied") },
        )
        .route(
            RouteDefinition::get("/api/books/{id}", "BookController::show")
                .name("book_show")
                .param("id", "int")
                .middleware("auth"),
            move |ctx: Context| {
                let books = Arc::clone(&show);
                async move {
                    let id = ctx.params().get_int("id").unwrap_or_default() as u64;
                    match books.find(&id) {
                        Ok(Some(book)) => Response::json(StatusCode::Ok, &book),
                        Ok(None) => Response::api_error(StatusCode::NotFound, "no such book"),
                        Err(err) => Response::api_error(StatusCode::InternalServerError, err.to_string()),
                    }
                }
            },
        )
        .route(
            RouteDefinition::get("/api/genres/{genre}", "BookController::byGenre")
                .middleware_declaration(serde_json::json!(["auth"])),
            move |ctx: Context| {
                let books = Arc::clone(&by_genre);
                async move {
                    let genre = ctx.params().get_str("genre").unwrap_or_default().to_owned();
                    let criteria = Criteria::new().with("genre", genre);
                    match books.find_by(&criteria, &OrderBy::new().asc("title"), None, None) {
                        Ok(list) => Response::json(StatusCode::Ok, &list),
                        Err(err) => Response::api_error(StatusCode::InternalServerError, err.to_string()),
                    }
                }
            },
        )
        .route(
            RouteDefinition::post("/api/books", "BookController::create")
                .middleware_declaration(serde_json::json!({"all": ["auth"], "any": ["librarian"]})),
            move |ctx: Context| {
                let books = Arc::clone(&create);
                async move {
                    let book: Book = match ctx.json() {
                        Ok(book) => book,
                        Err(err) => return Response::api_error(StatusCode::BadRequest, err.to_string()),
                    };
                    match books.add(book) {
                        Ok(()) => Response::new(StatusCode::Created),
                        Err(err) => Response::api_error(StatusCode::InternalServerError, err.to_string()),
                    }
                }
            },
        )
        .build()?;

    Server::bind("127.0.0.1:8080")
        .await?
        .serve(Arc::new(router))
        .await?;
    Ok(())
}
