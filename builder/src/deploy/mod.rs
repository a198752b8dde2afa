//! Sandboxed build pipeline

pub mod docker;
pub mod executor;
pub mod fsm;
pub mod log;
pub mod plan;
pub mod sandbox;
