//! HTTP front door
//!
//! Accepts game-round random number requests from the frontend and hands
//! them to the worker pool.

pub mod handlers;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod server;

pub use handlers::AppState;
pub use server::ApiServer;
