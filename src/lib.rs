//! Realtime presence, collaboration and rate limiting for Colabri.
//!
//! Clients connect over a websocket, announce presence, join per-document
//! collaboration sessions and exchange cursors, advisory locks and typing
//! indicators. Events fan out to local sockets and, through a shared
//! pub/sub channel, to every other instance.

pub mod auth;
pub mod broadcast;
pub mod collab;
pub mod config;
pub mod db;
pub mod docs;
pub mod error;
pub mod handlers;
pub mod models;
pub mod presence;
pub mod ratelimit;
pub mod routes;
pub mod services;
pub mod state;
pub mod utils;
pub mod websocket;

pub use state::AppState;
