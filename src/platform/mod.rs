//! Capability interfaces the runtime consumes but does not implement itself:
//! filesystem access, deferred HTTP, and metrics/dump persistence.
//!
//! Default, production-grade implementations live in the sibling modules
//! ([`fs`], [`network`], [`persistence`]); tests substitute fakes behind the
//! same trait objects.

mod fs;
mod network;
mod persistence;

pub use fs::StdFilesystem;
pub use network::{DeferredResponse, HttpResponse, ReqwestNetwork};
pub use persistence::HttpPersistence;

use crate::errors::{HostError, WasiError};
use std::collections::BTreeMap;

/// Multi-valued HTTP headers keyed by lowercase header name, matching the
/// wire representation used in `http-call`/`http-call-head` messages.
pub type Headers = BTreeMap<String, Vec<String>>;

/// The `{create_new, create, truncate, append, write, read}` flag set a
/// `file-open` message carries.
#[derive(Debug, Clone, Copy, Default, serde::Deserialize)]
pub struct OpenFlags {
	#[serde(default)]
	pub create_new: bool,
	#[serde(default)]
	pub create: bool,
	#[serde(default)]
	pub truncate: bool,
	#[serde(default)]
	pub append: bool,
	#[serde(default)]
	pub write: bool,
	#[serde(default)]
	pub read: bool,
}

/// File access, injected so the dispatcher never touches `std::fs` directly.
pub trait Filesystem: Send {
	fn open(&self, path: &str, flags: OpenFlags) -> Result<Box<dyn crate::stream::Stream>, WasiError>;
}

/// Outbound HTTP, injected so the dispatcher never performs I/O directly.
///
/// `fetch` performs the request eagerly (see DESIGN.md open question 4) and
/// returns an already-resolved [`DeferredResponse`]; `http-call-head`
/// consumes it.
pub trait Network: Send {
	fn fetch(
		&self,
		url: &str,
		method: &str,
		headers: &Headers,
		body: Option<Vec<u8>>,
	) -> Result<Box<dyn DeferredResponse>, HostError>;
}

/// Metrics batch and developer-dump sink.
pub trait Persistence: Send {
	fn persist_metrics(&self, events: &[String]) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
	fn persist_developer_dump(&self, events: &[String]) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
}
