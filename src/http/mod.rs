//! HTTP API surface: REST endpoints for job submission, inspection,
//! cancellation, result download, and an SSE stream of progress events.

pub mod auth;
pub mod handlers;
pub mod routes;
pub mod server;
pub mod types;

pub use server::HttpServer;
