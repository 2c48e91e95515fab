//! Persona bot: relays chat messages to a persona-driven text generator.

pub mod backends;
pub mod bot;
pub mod channels;
pub mod commands;
pub mod config;
pub mod conversation;
pub mod error;
pub mod parsing;
pub mod reply;
