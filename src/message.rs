//! The tagged JSON message protocol exchanged with the guest over
//! `message_exchange`, and the dispatcher that answers it.
//!
//! The protocol is a closed sum over the kinds below, but the wire format
//! stays liberal: an unrecognized `kind` produces an `err` reply instead of
//! refusing to decode.

use crate::errors::{HostError, RuntimeError};
use crate::platform::{Filesystem, Headers, Network, OpenFlags, Persistence};
use crate::stream::Stream;
use crate::HandleMap;
use serde::Deserialize;
use serde_json::{json, Value};

#[derive(Debug, Deserialize)]
#[serde(tag = "kind")]
enum InboundMessage {
	#[serde(rename = "perform-input")]
	PerformInput,
	#[serde(rename = "perform-output-result")]
	PerformOutputResult { result: Value },
	#[serde(rename = "perform-output-error")]
	PerformOutputError { error: Value },
	#[serde(rename = "perform-output-exception")]
	PerformOutputException { exception: ExceptionPayload },
	#[serde(rename = "file-open")]
	FileOpen {
		path: String,
		#[serde(flatten)]
		flags: OpenFlags,
	},
	#[serde(rename = "http-call")]
	HttpCall {
		url: String,
		method: String,
		headers: Headers,
		body: Option<Vec<u8>>,
	},
	#[serde(rename = "http-call-head")]
	HttpCallHead { handle: u32 },
}

#[derive(Debug, Deserialize)]
struct ExceptionPayload {
	error_code: String,
	message: String,
}

/// Present exactly between entry and exit of `perform()`.
#[derive(Debug, Default)]
pub struct PerformState {
	pub profile_url: String,
	pub provider_url: String,
	pub map_url: String,
	pub usecase: String,
	pub input: Value,
	pub parameters: Value,
	pub security: Value,
	pub result: Option<Value>,
	pub error: Option<Value>,
	pub exception: Option<RuntimeError>,
}

impl PerformState {
	pub fn new(
		profile_url: String,
		provider_url: String,
		map_url: String,
		usecase: String,
		input: Value,
		parameters: Value,
		security: Value,
	) -> Self {
		PerformState {
			profile_url,
			provider_url,
			map_url,
			usecase,
			input,
			parameters,
			security,
			result: None,
			error: None,
			exception: None,
		}
	}
}

/// Owns the handle registries and platform collaborators the dispatcher
/// needs; borrowed mutably by [`crate::app::WasiApp`] for the duration of a
/// `message_exchange` call.
pub struct Dispatcher {
	pub streams: HandleMap<Box<dyn Stream>>,
	pub requests: HandleMap<Box<dyn crate::platform::DeferredResponse>>,
	pub filesystem: Box<dyn Filesystem>,
	pub network: Box<dyn Network>,
	pub persistence: Box<dyn Persistence>,
}

impl Dispatcher {
	pub fn new(
		filesystem: Box<dyn Filesystem>,
		network: Box<dyn Network>,
		persistence: Box<dyn Persistence>,
	) -> Self {
		Dispatcher {
			streams: HandleMap::new(),
			requests: HandleMap::new(),
			filesystem,
			network,
			persistence,
		}
	}

	/// Handles one decoded JSON message, given the perform state in progress
	/// (if any). `perform-input`/`perform-output-*` messages require a
	/// perform to be in progress; failing to find one is an unexpected
	/// error, per spec invariant 3.
	pub fn handle_message(&mut self, perform_state: &mut Option<PerformState>, message: Value) -> Value {
		let kind = message
			.get("kind")
			.and_then(Value::as_str)
			.unwrap_or("")
			.to_string();

		let parsed: Result<InboundMessage, _> = serde_json::from_value(message);
		let parsed = match parsed {
			Ok(m) => m,
			Err(_) => {
				return json!({ "kind": "err", "error": format!("Unknown message {kind}") });
			}
		};

		match parsed {
			InboundMessage::PerformInput => self.handle_perform_input(perform_state),
			InboundMessage::PerformOutputResult { result } => {
				self.handle_perform_output_result(perform_state, result)
			}
			InboundMessage::PerformOutputError { error } => {
				self.handle_perform_output_error(perform_state, error)
			}
			InboundMessage::PerformOutputException { exception } => {
				self.handle_perform_output_exception(perform_state, exception)
			}
			InboundMessage::FileOpen { path, flags } => self.handle_file_open(&path, flags),
			InboundMessage::HttpCall {
				url,
				method,
				headers,
				body,
			} => self.handle_http_call(&url, &method, &headers, body),
			InboundMessage::HttpCallHead { handle } => self.handle_http_call_head(handle),
		}
	}

	fn handle_perform_input(&self, perform_state: &mut Option<PerformState>) -> Value {
		let Some(state) = perform_state else {
			return unexpected_no_perform();
		};
		json!({
			"kind": "ok",
			"profile_url": state.profile_url,
			"provider_url": state.provider_url,
			"map_url": state.map_url,
			"usecase": state.usecase,
			"map_input": state.input,
			"map_parameters": state.parameters,
			"map_security": state.security,
		})
	}

	fn handle_perform_output_result(&self, perform_state: &mut Option<PerformState>, result: Value) -> Value {
		let Some(state) = perform_state else {
			return unexpected_no_perform();
		};
		state.result = Some(result);
		json!({ "kind": "ok" })
	}

	fn handle_perform_output_error(&self, perform_state: &mut Option<PerformState>, error: Value) -> Value {
		let Some(state) = perform_state else {
			return unexpected_no_perform();
		};
		state.error = Some(error);
		json!({ "kind": "ok" })
	}

	fn handle_perform_output_exception(
		&self,
		perform_state: &mut Option<PerformState>,
		exception: ExceptionPayload,
	) -> Value {
		let Some(state) = perform_state else {
			return unexpected_no_perform();
		};
		state.exception = Some(if exception.error_code == "InputValidationError" {
			RuntimeError::Validation(exception.message)
		} else {
			RuntimeError::unexpected(exception.error_code, exception.message)
		});
		json!({ "kind": "ok" })
	}

	fn handle_file_open(&mut self, path: &str, flags: OpenFlags) -> Value {
		match self.filesystem.open(path, flags) {
			Ok(stream) => {
				let handle = self.streams.insert(stream);
				json!({ "kind": "ok", "stream": handle })
			}
			Err(err) => json!({ "kind": "err", "errno": err.errno as i32 }),
		}
	}

	fn handle_http_call(&mut self, url: &str, method: &str, headers: &Headers, body: Option<Vec<u8>>) -> Value {
		match self.network.fetch(url, method, headers, body) {
			Ok(deferred) => {
				let handle = self.requests.insert(deferred);
				json!({ "kind": "ok", "handle": handle })
			}
			Err(err) => host_error_reply(&err),
		}
	}

	fn handle_http_call_head(&mut self, handle: u32) -> Value {
		let Some(deferred) = self.requests.remove(handle) else {
			return host_error_reply(&HostError::network_error("Invalid http call handle"));
		};

		match deferred.resolve() {
			Ok(response) => {
				let status = response.status();
				let headers = response.headers();
				let body_stream = self.streams.insert(response.into_body_stream());
				json!({
					"kind": "ok",
					"status": status,
					"headers": headers,
					"body_stream": body_stream,
				})
			}
			Err(err) => host_error_reply(&err),
		}
	}
}

fn unexpected_no_perform() -> Value {
	json!({ "kind": "err", "error": "Unexpected perform state" })
}

fn host_error_reply(err: &HostError) -> Value {
	json!({ "kind": "err", "error_code": err.code(), "message": err.message() })
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::errors::WasiError;

	struct FailingFilesystem;
	impl Filesystem for FailingFilesystem {
		fn open(&self, _path: &str, _flags: OpenFlags) -> Result<Box<dyn Stream>, WasiError> {
			Err(WasiError::new(crate::abi::Errno::NoEnt))
		}
	}

	struct NoopNetwork;
	impl Network for NoopNetwork {
		fn fetch(
			&self,
			_url: &str,
			_method: &str,
			_headers: &Headers,
			_body: Option<Vec<u8>>,
		) -> Result<Box<dyn crate::platform::DeferredResponse>, HostError> {
			Err(HostError::network_error("no network in this test"))
		}
	}

	struct NoopPersistence;
	impl Persistence for NoopPersistence {
		fn persist_metrics(&self, _events: &[String]) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
			Ok(())
		}
		fn persist_developer_dump(
			&self,
			_events: &[String],
		) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
			Ok(())
		}
	}

	fn dispatcher() -> Dispatcher {
		Dispatcher::new(Box::new(FailingFilesystem), Box::new(NoopNetwork), Box::new(NoopPersistence))
	}

	fn seeded_state() -> Option<PerformState> {
		Some(PerformState::new(
			"file:///p".into(),
			"file:///prov".into(),
			"file:///map".into(),
			"U".into(),
			json!({"id": 1}),
			json!({"P": "v"}),
			json!({}),
		))
	}

	#[test]
	fn perform_input_echoes_seeded_state() {
		let mut d = dispatcher();
		let mut state = seeded_state();
		let reply = d.handle_message(&mut state, json!({ "kind": "perform-input" }));
		assert_eq!(reply["kind"], "ok");
		assert_eq!(reply["usecase"], "U");
		assert_eq!(reply["map_input"], json!({"id": 1}));
		assert_eq!(reply["map_parameters"], json!({"P": "v"}));
	}

	#[test]
	fn perform_input_without_perform_in_progress_is_unexpected() {
		let mut d = dispatcher();
		let mut state = None;
		let reply = d.handle_message(&mut state, json!({ "kind": "perform-input" }));
		assert_eq!(reply["kind"], "err");
	}

	#[test]
	fn perform_output_result_sets_result_slot() {
		let mut d = dispatcher();
		let mut state = seeded_state();
		let reply = d.handle_message(&mut state, json!({ "kind": "perform-output-result", "result": 42 }));
		assert_eq!(reply["kind"], "ok");
		assert_eq!(state.unwrap().result, Some(json!(42)));
	}

	#[test]
	fn perform_output_error_sets_error_slot() {
		let mut d = dispatcher();
		let mut state = seeded_state();
		let reply = d.handle_message(
			&mut state,
			json!({ "kind": "perform-output-error", "error": {"code": "NotFound"} }),
		);
		assert_eq!(reply["kind"], "ok");
		assert_eq!(state.unwrap().error, Some(json!({"code": "NotFound"})));
	}

	#[test]
	fn perform_output_exception_validation_error() {
		let mut d = dispatcher();
		let mut state = seeded_state();
		d.handle_message(
			&mut state,
			json!({
				"kind": "perform-output-exception",
				"exception": {"error_code": "InputValidationError", "message": "id must be int"}
			}),
		);
		match state.unwrap().exception.unwrap() {
			RuntimeError::Validation(msg) => assert_eq!(msg, "id must be int"),
			other => panic!("expected Validation, got {other:?}"),
		}
	}

	#[test]
	fn perform_output_exception_other_code_is_unexpected() {
		let mut d = dispatcher();
		let mut state = seeded_state();
		d.handle_message(
			&mut state,
			json!({
				"kind": "perform-output-exception",
				"exception": {"error_code": "SomeOtherError", "message": "oops"}
			}),
		);
		match state.unwrap().exception.unwrap() {
			RuntimeError::Unexpected { name, .. } => assert_eq!(name, "SomeOtherError"),
			other => panic!("expected Unexpected, got {other:?}"),
		}
	}

	#[test]
	fn file_open_missing_path_is_noent_errno() {
		let mut d = dispatcher();
		let mut state = None;
		let reply = d.handle_message(
			&mut state,
			json!({
				"kind": "file-open",
				"path": "/nope",
				"create_new": false, "create": false, "truncate": false,
				"append": false, "write": false, "read": true
			}),
		);
		assert_eq!(reply["kind"], "err");
		assert_eq!(reply["errno"], crate::abi::Errno::NoEnt as i32);
	}

	#[test]
	fn http_call_network_failure_is_err_reply() {
		let mut d = dispatcher();
		let mut state = None;
		let reply = d.handle_message(
			&mut state,
			json!({ "kind": "http-call", "url": "http://x", "method": "GET", "headers": {}, "body": null }),
		);
		assert_eq!(reply["kind"], "err");
		assert_eq!(reply["error_code"], "network:error");
	}

	#[test]
	fn http_call_head_unknown_handle_is_err_reply() {
		let mut d = dispatcher();
		let mut state = None;
		let reply = d.handle_message(&mut state, json!({ "kind": "http-call-head", "handle": 999 }));
		assert_eq!(reply["kind"], "err");
	}

	#[test]
	fn unknown_kind_is_err_reply() {
		let mut d = dispatcher();
		let mut state = None;
		let reply = d.handle_message(&mut state, json!({ "kind": "something-else" }));
		assert_eq!(reply["kind"], "err");
		assert_eq!(reply["error"], "Unknown message something-else");
	}
}
