//! Local persistence: data directory layout and settings

pub mod layout;
pub mod settings;
