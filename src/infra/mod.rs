//! Infrastructure adapters and runtime bootstrap.

pub mod error;
pub mod http;
pub mod mail;
pub mod telemetry;
pub mod tls;
