//! CLI Commands

pub mod pings;
pub mod wait;
