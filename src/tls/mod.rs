//! TLS engine boundary, rustls-backed implementation, session cache, and
//! the per-connection handshake/record submachine (spec §4.A/§4.F).

mod connection;
mod engine;
mod rustls_engine;
mod session_cache;

pub use connection::{State, StepOutcome, TlsConnection};
pub use engine::{build_engine, EngineStep, TlsEngine};
pub use rustls_engine::RustlsEngine;
pub use session_cache::{SessionCache, SessionTicket};
