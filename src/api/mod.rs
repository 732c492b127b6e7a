//! API Module
//!
//! REST API over the topology executor, plus health and metrics endpoints.

pub mod rest;
pub mod server;

pub use rest::*;
pub use server::*;
