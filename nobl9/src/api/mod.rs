pub mod auth;
pub mod client;
pub mod error;
pub mod pool;

pub use client::{Client, ClientConfig, RetryConfig};
pub use error::ApiError;
pub use pool::ConnectionPoolConfig;
