pub mod cli;
pub mod client;
pub mod commands;
pub mod config;
pub mod error;
pub mod format;
pub mod models;
pub mod poll;
pub mod schema;

#[cfg(test)]
mod testing;
