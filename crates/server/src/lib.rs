//! HTTP surface of Shelfgate: axum adapters over `shelfgate_core`, the application router
//! and its handlers.

pub mod error;
pub mod middleware;
pub mod router;
pub mod users;
