//! # onesdk-runtime
//!
//! Host-side runtime that embeds a sandboxed WebAssembly "core" module and
//! exposes it to end-user code through a small façade:
//! `Client → Profile → UseCase.perform(...)`.
//!
//! The runtime owns the wasm engine/store/instance, the message-exchange ABI
//! the guest uses to call back into the host (`sf_host_unstable`), the
//! handle-based resource registries for streams and deferred HTTP requests,
//! and the perform-state machine that threads call parameters and results
//! through the guest's synchronous callbacks.
//!
//! # Example
//! ```no_run
//! use onesdk_runtime::{Client, ClientConfig};
//! use serde_json::json;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let client = Client::new(ClientConfig::new("superface"));
//! let profile = client.get_profile("example");
//! let usecase = profile.get_usecase("Example");
//! let result = usecase.perform(json!({"id": 1}), "my-provider", json!({}), json!({}))?;
//! println!("{result}");
//! # Ok(())
//! # }
//! ```

#[macro_use]
extern crate log;

pub mod abi;
mod app;
mod client;
pub mod errors;
mod handle_map;
mod host_exports;
mod memory;
mod message;
pub mod platform;
mod stream;

pub use app::WasiApp;
pub use client::{Client, ClientConfig, Profile, UseCase};
pub use errors::RuntimeError;
pub use handle_map::HandleMap;
pub use stream::Stream;
