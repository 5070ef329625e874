//! Kernel extension lifecycle management
//!
//! This crate is the privileged resource manager built on the safe handle
//! layer:
//! - Platform-style status codes for broker outcomes
//! - The broker contract and a simulated in-process broker
//! - The manager: load, unload and introspection with typed handles as the
//!   data currency
//! - Introspection records rendered under the platform info keys

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod broker;
pub mod info;
pub mod logging;
pub mod manager;
pub mod status;

pub use broker::{Broker, BrokerOptions, KextSpec, SimulatedBroker};
pub use info::{
    LoadedKextInfo, KEY_BUNDLE_IDENTIFIER, KEY_BUNDLE_VERSION, KEY_DEPENDENCIES, KEY_LOAD_ADDRESS,
    KEY_LOAD_SIZE, KEY_RETAIN_COUNT, KEY_STARTED,
};
pub use manager::{KextManager, QueryError};
pub use status::Status;
