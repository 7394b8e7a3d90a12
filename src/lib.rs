//! Repodoc
//!
//! Command-line client and reference store server for documents kept on a
//! versioned contents store.

pub mod config;
pub mod server;
