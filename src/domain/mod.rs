//! Domain layer: the transaction model, the provider protocol contract and
//! the ports the core consumes from surrounding infrastructure.

pub mod callback;
pub mod ports;
pub mod protocol;
pub mod transaction;
