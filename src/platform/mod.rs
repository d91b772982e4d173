//! Client for the survey platform's management REST API.

pub mod client;
pub mod transport;

pub use client::{parse_retry_after, PlatformClient};
pub use transport::{HttpTransport, PlatformRequest, PlatformTransport, RawResponse};
