//! HTTP ingestion surface

pub mod routes;
mod server;

pub use server::{ApiServer, build_router};
