//! HTTP and WebSocket surface
//!
//! Mutation routes turn an authenticated request into a queued job and reply
//! `202 Accepted` at once; progress is reported over `/ws`.

mod error;
mod extract;
mod middleware;
pub mod models;
mod server;
pub mod services;
pub mod state;
pub(crate) mod utils;
mod validation;
mod ws;

pub use error::ApiError;
pub use extract::{AllowedOrigin, origin_allowed};
pub use server::{router, run};
pub use state::AppState;
