//! Side-effecting adapters: files, child processes and remote tag access.

pub mod bridge;
pub mod config;
pub mod process;
pub mod record_file;
pub mod remote;
pub mod tag_json;
pub mod tag_store;
