//! permadeploy
//!
//! Builds static sites from git repositories in disposable sandboxes and
//! publishes them to content-addressed storage behind a path manifest.

pub mod app;
pub mod coordinator;
pub mod deploy;
pub mod errors;
pub mod filesys;
pub mod github;
pub mod http;
pub mod logs;
pub mod models;
pub mod publish;
pub mod queue;
pub mod server;
pub mod storage;
pub mod utils;
