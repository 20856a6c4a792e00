//! HTTP/1.1 request serialization and streaming response parsing (spec §4.G).

mod session;

pub use session::{Http1Session, Response, State};
