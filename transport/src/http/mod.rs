//! HTTP communication with the management server
//!
//! The transport manager never talks to reqwest directly. It goes through the
//! [`HttpTransport`] trait so tests can script endpoint behaviour and so the
//! client setup (timeouts, proxy, connection reuse) stays in one place.
//!
//! # Architecture
//!
//! ```text
//! ServerClient → ServersManager → Endpoint → HttpTransport (reqwest)
//!                     ↓               ↓
//!               breaker/sticky    liveness window
//! ```

pub mod transport;

pub use transport::{HttpTransport, ReqwestTransport};
