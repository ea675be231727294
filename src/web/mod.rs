//! HTTP surface: ad-hoc probe endpoints and liveness.

mod handlers;
mod server;

pub use server::{build_router, start_web_server, AppState};
