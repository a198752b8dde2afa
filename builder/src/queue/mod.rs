//! Build admission queue

pub mod admission;
pub mod store;
