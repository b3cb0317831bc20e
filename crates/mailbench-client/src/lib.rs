//! Client for a remote mail service.

pub mod http;

pub use http::{HttpMailGateway, DEFAULT_TIMEOUT};
