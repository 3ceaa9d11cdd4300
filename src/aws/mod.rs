//! Cloud API collaborator over HTTP
//!
//! Every kind is reached through a resource gateway speaking JSON. Requests
//! carry a bearer token; role assumption exchanges it for a session token.
//!
//! # Module Structure
//!
//! - [`credentials`] - base token and cached role sessions
//! - [`client`] - per-context client and the client registry
//! - [`http`] - HTTP utilities and error formatting
//! - [`dispatch`] - `ResourceApi` implementation driven by kind definitions
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use cloud_reaper::aws::{client::ClientRegistry, dispatch::gateway_factory};
//!
//! let clients = Arc::new(ClientRegistry::new("https://gw.{region}.example.com", "token")?);
//! let factory = gateway_factory(clients);
//! let queues = factory.get(ResourceKind::Queue)?;
//! ```

pub mod client;
pub mod credentials;
pub mod dispatch;
pub mod http;

pub use client::{AwsClient, ClientRegistry};
pub use dispatch::{gateway_factory, GatewayApi};
pub use http::format_api_error;
