//! kino-gate: a Telegram bot distributing video content behind mandatory
//! channel-subscription checks.
//!
//! The interesting pieces live in four modules: [`store`] (pooled PostgreSQL
//! persistence), [`subscription`] (the fail-closed gate), [`caption`] (link
//! and mention scrubbing) and [`bot`] (the admin conversation state machine
//! plus user-facing handlers). Everything else is teloxide plumbing in
//! `main.rs`.

/// Telegram handlers and dialogue states
pub mod bot;
/// Caption sanitizing and message formatting
pub mod caption;
/// Configuration and settings management
pub mod config;
/// PostgreSQL persistence for movies, users and channels
pub mod store;
/// Mandatory channel-subscription gate
pub mod subscription;
