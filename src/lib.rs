//! OpenManage Enterprise provider plugin.
//!
//! Manages configuration compliance baselines on a Dell OpenManage
//! Enterprise (OME) appliance from a declarative infrastructure tool. The
//! host spawns the `ome-provider` binary, reads the handshake line from its
//! stdout and talks to it over gRPC.
//!
//! # Overview
//!
//! - **Resource** `ome_configuration_baseline`: a named baseline binding a
//!   compliance template to target devices, with optional scheduled
//!   notifications. See [`baseline`].
//! - **Data source** `ome_configuration_report_info`: per-device compliance
//!   of a baseline. See [`report`].
//! - **Server**: the [`ProviderService`] trait and [`serve`], which run the
//!   plugin protocol.
//! - **OME client**: the [`client::OmeApi`] seam, implemented over HTTP by
//!   [`client::http`] and in memory by [`client::fake`].
//!
//! # Handshake Protocol
//!
//! Once listening, the provider prints:
//!
//! ```text
//! HEMMER_PROVIDER|1|127.0.0.1:50051
//! ```
//!
//! Format: `HEMMER_PROVIDER|<protocol_version>|<address>`
//!
//! # Example
//!
//! ```ignore
//! use ome_provider::{init_logging, serve, OmeProvider};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     init_logging();
//!     serve(OmeProvider::new()).await
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod baseline;
pub mod client;
pub mod config;
pub mod error;
pub mod logging;
pub mod provider;
pub mod report;
pub mod schema;
pub mod server;
pub mod session;
pub mod testing;
pub mod types;
pub mod validation;

/// Protocol types and the gRPC service trait generated from
/// `proto/provider.proto`.
#[allow(missing_docs)]
#[allow(clippy::all)]
pub mod generated {
    include!(concat!(env!("OUT_DIR"), "/hemmer.provider.v1.rs"));
}

pub use config::ProviderConfig;
pub use error::{OmeError, ProviderError};
pub use logging::{init_logging, init_logging_with_default, try_init_logging};
pub use provider::OmeProvider;
pub use schema::ProviderSchema;
pub use server::{
    serve, serve_on, serve_on_with_options, serve_with_options, ProviderService, ServeOptions,
};
pub use types::{
    AttributeChange, ImportedResource, PlanResult, ProviderMetadata, ResourceState,
    ServerCapabilities, HANDSHAKE_PREFIX, PROTOCOL_VERSION,
};
pub use validation::validate;

pub use async_trait::async_trait;
pub use serde_json;
