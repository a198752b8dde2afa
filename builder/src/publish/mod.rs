//! Artifact publication to content-addressed storage

pub mod client;
pub mod local;
pub mod manifest;
pub mod mime;
pub mod publisher;
