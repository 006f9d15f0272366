//! sysdash: samples local host metrics and streams them to a browser
//! dashboard as server-sent events.

pub mod config;
pub mod encoder;
pub mod metrics;
pub mod multiplexer;
pub mod probe;
pub mod rate;
pub mod server;
pub mod sse;
pub mod state;
pub mod types;
