//! Reusable test utilities:
//! - Scripted transport with per-endpoint behaviour and call recording
//! - Counting resolver
//! - Manager builders and common addresses

// Allow unused code in test fixtures - not every test binary uses every helper
#![allow(dead_code)]
#![allow(unused_imports)]

pub mod scripted_transport;
pub mod test_data;

pub use scripted_transport::{Behavior, CountingResolver, ScriptedTransport};
pub use test_data::*;
