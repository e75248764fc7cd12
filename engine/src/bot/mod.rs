//! Messaging channel integrations

pub mod telegram;

pub use telegram::{TelegramApi, TelegramBot};
