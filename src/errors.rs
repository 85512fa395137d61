//! The user-visible error taxonomy and the internal error types platform
//! collaborators raise during message dispatch.

use crate::abi::Errno;
use serde_json::Value;
use thiserror::Error;

/// Errors that can escape [`crate::app::WasiApp::perform`] or
/// [`crate::client::UseCase::perform`].
#[derive(Debug, Error)]
pub enum RuntimeError {
	/// The guest's use case completed with a modelled error. Carries the
	/// guest-supplied payload verbatim.
	#[error("PerformError: {0}")]
	Perform(Value),

	/// The guest rejected the input against its schema.
	#[error("ValidationError: {0}")]
	Validation(String),

	/// Any host or guest malfunction: traps, missing core, exceptions other
	/// than `InputValidationError`.
	#[error("{name}: {message}")]
	Unexpected {
		name: String,
		message: String,
		#[source]
		source: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
	},

	/// `perform` was called before the runtime was initialized.
	#[error("Uninitialized: OneClient isn't initialized.")]
	Uninitialized,
}

impl RuntimeError {
	pub fn unexpected(name: impl Into<String>, message: impl Into<String>) -> Self {
		RuntimeError::Unexpected {
			name: name.into(),
			message: message.into(),
			source: None,
		}
	}

	pub fn unexpected_with_source(
		name: impl Into<String>,
		message: impl Into<String>,
		source: impl std::error::Error + Send + Sync + 'static,
	) -> Self {
		RuntimeError::Unexpected {
			name: name.into(),
			message: message.into(),
			source: Some(Box::new(source)),
		}
	}

	/// The name under which this error would be reported to the façade's
	/// re-initialization check (`"WebAssemblyRuntimeError"` etc).
	pub fn name(&self) -> &str {
		match self {
			RuntimeError::Perform(_) => "PerformError",
			RuntimeError::Validation(_) => "ValidationError",
			RuntimeError::Unexpected { name, .. } => name,
			RuntimeError::Uninitialized => "Uninitialized",
		}
	}
}

/// String constants used as `error_code` for network failures reported back
/// to the guest over the message protocol.
pub mod network_error_code {
	pub const ERROR: &str = "network:error";
	pub const CONNECTION_REFUSED: &str = "network:ECONNREFUSED";
	pub const HOST_NOT_FOUND: &str = "network:ENOTFOUND";
	pub const INVALID_URL: &str = "network:invalid_url";
}

/// Errors raised by platform collaborators (`Filesystem`, `Network`). Never
/// escapes the dispatcher as-is: it is always converted into an `err` reply
/// sent back to the guest.
#[derive(Debug, Error)]
pub enum HostError {
	#[error("{message}")]
	Network { code: &'static str, message: String },
}

impl HostError {
	pub fn network_connection_refused(message: impl Into<String>) -> Self {
		HostError::Network {
			code: network_error_code::CONNECTION_REFUSED,
			message: message.into(),
		}
	}

	pub fn network_host_not_found(message: impl Into<String>) -> Self {
		HostError::Network {
			code: network_error_code::HOST_NOT_FOUND,
			message: message.into(),
		}
	}

	pub fn network_error(message: impl Into<String>) -> Self {
		HostError::Network {
			code: network_error_code::ERROR,
			message: message.into(),
		}
	}

	pub fn network_invalid_url(message: impl Into<String>) -> Self {
		HostError::Network {
			code: network_error_code::INVALID_URL,
			message: message.into(),
		}
	}

	pub fn code(&self) -> &'static str {
		match self {
			HostError::Network { code, .. } => code,
		}
	}

	pub fn message(&self) -> &str {
		match self {
			HostError::Network { message, .. } => message,
		}
	}
}

/// A WASI preview-1 errno failure raised by the `Filesystem`/stream
/// collaborators, carried until it can be encoded as an [`Errno`] in an ABI
/// return word.
#[derive(Debug, Error)]
#[error("WASI error: {errno:?}")]
pub struct WasiError {
	pub errno: Errno,
}

impl WasiError {
	pub fn new(errno: Errno) -> Self {
		WasiError { errno }
	}
}
