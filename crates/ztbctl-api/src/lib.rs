// ztbctl-api: Async Rust client for the ZTB site management API

pub mod auth;
pub mod client;
pub mod endpoints;
pub mod error;
pub mod transport;
pub mod types;

pub use auth::{Credentials, Token, TokenProvider};
pub use client::{ApiResponse, ClientConfig, Transport, ZtbClient};
pub use error::Error;
pub use reqwest::Method;
pub use transport::{TlsMode, TransportConfig};
