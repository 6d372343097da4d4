//! parlor chat relay.
//!
//! A WebSocket relay that broadcasts chat, delivers whispers to a single
//! named participant, and lets one administrator ban origin addresses.

pub mod api;
pub mod config;
pub mod relay;
pub mod router;
pub mod storage;

pub use router::{Outbound, RelayOptions, RelayState};
pub use storage::BanStore;
