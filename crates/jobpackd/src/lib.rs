//! `jobpackd` server and `send-task` client.

pub mod cli;
pub mod client;
pub mod server;
