//! Messenger abstractions. Telegram implements the port in `ltb-telegram`.

pub mod port;
pub mod throttled;
pub mod types;

#[cfg(test)]
pub(crate) mod fake;
