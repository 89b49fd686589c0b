//! Front end for codecap: the HTTP capture endpoint and the one-shot CLI.

pub mod cli;
pub mod commands;
pub mod config;
pub mod error;
pub mod logging;
pub mod server;
