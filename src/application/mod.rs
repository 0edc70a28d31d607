//! Application layer orchestrating the payment lifecycle.
//!
//! `ProviderAdapter` runs authorize, redirect and settle for one provider on
//! top of its protocol. `GatewayManager` owns the configured providers and
//! turns inbound callbacks into bound adapters.

pub mod adapter;
pub mod manager;
