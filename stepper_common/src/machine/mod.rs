//! Machine level definitions: axis configuration, faults and events.

pub mod config;
pub mod error;
pub mod event;
