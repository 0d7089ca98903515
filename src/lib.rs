//! Real-time collaboration session layer.
//!
//! Clients open a websocket per document; authorized connections join the
//! document's session group and every edit or typing event is relayed to the
//! other members. Content is last-write-wins: each edit carries the full text.

pub mod auth;
pub mod config;
pub mod db;
pub mod docs;
pub mod handlers;
pub mod models;
pub mod routes;
pub mod services;
pub mod state;
pub mod websocket;
pub mod ws;

pub use config::Config;
pub use state::AppState;
