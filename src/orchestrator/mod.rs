//! Inter-component messaging

pub mod bus;

pub use bus::{BroadcastBus, BusEvent, EventBus};
