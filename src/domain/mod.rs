//! Domain layer - Port definitions
//!
//! This module defines the traits (ports) the topology core implements and
//! the records that cross its boundary.

pub mod ports;

pub use ports::*;
