/// Command line and environment configuration
pub mod config;
/// Bookkeeping of which connections are members of which room
pub mod registry;
mod routes;
/// Per connection session relaying chat messages to the rest of the room
pub mod session;

pub use self::routes::{app, serve, AppState};
