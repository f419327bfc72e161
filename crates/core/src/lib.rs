pub mod announce;
pub mod auth;
pub mod config;
pub mod draw;
pub mod error;
pub mod gateway;
pub mod lifecycle;
pub mod participation;
pub mod render;
pub mod selection;
pub mod store;
pub mod telegram;
pub mod types;

#[cfg(any(test, feature = "testing"))]
pub mod testing;
