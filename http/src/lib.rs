//! # API Dispatch HTTP Transport
//!
//! `reqwest`-backed implementation of the dispatch layer's
//! [`Transport`](api_dispatch_core::Transport) collaborator.
//!
//! ## Example
//!
//! ```no_run
//! use api_dispatch_http::{ReqwestTransport, DEFAULT_TIMEOUT};
//! use api_dispatch_core::{HttpMethod, ParameterEncoding, Transport, TransportRequest};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let transport = ReqwestTransport::new(DEFAULT_TIMEOUT)?;
//!
//!     let response = transport
//!         .send(TransportRequest {
//!             url: "https://api.example.com/api/banner".to_string(),
//!             method: HttpMethod::Get,
//!             headers: Vec::new(),
//!             parameters: None,
//!             encoding: ParameterEncoding::Url,
//!         })
//!         .await?;
//!
//!     println!("status {}", response.status);
//!     Ok(())
//! }
//! ```
//!
//! ## Features
//!
//! - URL (query or form body) and JSON parameter encoding
//! - Multipart uploads streamed in chunks with progress reporting
//! - Per-exchange timeout
//! - Dropping the returned future aborts the exchange

pub mod client;
pub mod error;

// Re-export main types for convenience
pub use client::{ReqwestTransport, DEFAULT_TIMEOUT, UPLOAD_CHUNK_SIZE};
pub use error::HttpError;
