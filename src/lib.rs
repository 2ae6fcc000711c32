//! # routegate
//!
//! Routing, middleware gating, and cached entity repositories for HTTP/1.1
//! services.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use routegate::config::AppConfig;
//! use routegate::context::Context;
//! use routegate::router::{RouteDefinition, RouterBuilder};
//! use routegate::server::Server;
//! use routegate::{Response, StatusCode};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = AppConfig::default().with_process_env()?;
//!     let router = RouterBuilder::new(config)
//!         .route(
//!             RouteDefinition::get("/users/{id}", "UserController::show")
//!                 .name("user_show")
//!                 .param("id", "int"),
//!             |ctx: Context| async move {
//!                 let id = ctx.params().get_int("id").unwrap_or_default();
//!                 Response::new(StatusCode::Ok).body(format!("user {id}"))
//!             },
//!         )
//!         .build()?;
//!
//!     Server::bind("127.0.0.1:8080").await?.serve(Arc::new(router)).await?;
//!     Ok(())
//! }
//! ```

// ── Request boundary ──────────────────────────────────────────────────────────
pub mod context;
pub mod http;
pub mod server;

// ── Routing and gating ────────────────────────────────────────────────────────
pub mod middleware;
pub mod router;

// ── Storage ───────────────────────────────────────────────────────────────────
pub mod cache;
pub mod config;
pub mod repository;

// ── Convenience re-exports ────────────────────────────────────────────────────
pub use http::{Headers, Method, Request, Response, StatusCode};
pub use router::{Router, RouterBuilder};
pub use server::{Server, ServerError};
