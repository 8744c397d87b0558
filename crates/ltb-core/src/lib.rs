//! Core domain + application logic for the Link Tracker Bot.
//!
//! This crate is intentionally framework-agnostic. Telegram lives behind ports
//! (traits) implemented in the adapter crate; SQLite lives behind the storage layer.

pub mod bot;
pub mod config;
pub mod destination;
pub mod domain;
pub mod errors;
pub mod export;
pub mod formatting;
pub mod link_service;
pub mod logging;
pub mod messaging;
pub mod ports;
pub mod shortcode;
pub mod storage;
pub mod utils;

pub use errors::{Error, Result};
