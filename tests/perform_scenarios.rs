//! End-to-end tests driving [`WasiApp`] against small inline WebAssembly
//! guests built with `wat`, instead of the real sandboxed core. Each guest
//! only implements enough of the required exports to drive one scenario
//! from the spec (happy-path result, modelled error, a trap, and an
//! oversized message-exchange reply resolved through
//! `message_exchange_retrieve`).

use onesdk_runtime::errors::{HostError, WasiError};
use onesdk_runtime::platform::{DeferredResponse, Filesystem, Network, OpenFlags, Persistence};
use onesdk_runtime::{RuntimeError, Stream, WasiApp};
use serde_json::json;

struct NoFilesystem;
impl Filesystem for NoFilesystem {
	fn open(&self, _path: &str, _flags: OpenFlags) -> Result<Box<dyn Stream>, WasiError> {
		Err(WasiError::new(onesdk_runtime::abi::Errno::NoEnt))
	}
}

struct NoNetwork;
impl Network for NoNetwork {
	fn fetch(
		&self,
		_url: &str,
		_method: &str,
		_headers: &onesdk_runtime::platform::Headers,
		_body: Option<Vec<u8>>,
	) -> Result<Box<dyn DeferredResponse>, HostError> {
		Err(HostError::network_error("no network in this test"))
	}
}

struct NoPersistence;
impl Persistence for NoPersistence {
	fn persist_metrics(&self, _events: &[String]) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
		Ok(())
	}
	fn persist_developer_dump(&self, _events: &[String]) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
		Ok(())
	}
}

fn new_app() -> WasiApp {
	WasiApp::new(Box::new(NoFilesystem), Box::new(NoNetwork), Box::new(NoPersistence))
}

/// Escapes `s` for embedding as a WAT string-literal data segment.
fn wat_escape(s: &str) -> String {
	s.replace('\\', "\\\\").replace('"', "\\\"")
}

/// Builds the boilerplate every fixture guest needs: the required metrics
/// and dump exports pointing at a zeroed arena (so no events are ever
/// reported to Persistence), plus setup/teardown/clear_metrics as no-ops.
fn guest_boilerplate() -> &'static str {
	r#"
	(func (export "oneclient_core_setup"))
	(func (export "oneclient_core_teardown"))
	(func (export "oneclient_core_clear_metrics"))
	(func (export "oneclient_core_get_metrics") (result i32) (i32.const 65536))
	(func (export "oneclient_core_get_developer_dump") (result i32) (i32.const 65536))
	"#
}

fn compile(app: &mut WasiApp, wat: &str) {
	let wasm = wat::parse_str(wat).expect("fixture wat must parse");
	app.load_core(&wasm).expect("fixture wasm must load");
	app.init().expect("fixture core must initialize");
}

fn empty_perform(app: &mut WasiApp) -> Result<serde_json::Value, RuntimeError> {
	app.perform(
		"file:///p".into(),
		"file:///prov".into(),
		"file:///map".into(),
		"TestUseCase".into(),
		json!({}),
		json!({}),
		json!({}),
	)
}

#[test]
fn perform_output_result_reaches_the_caller() {
	let reply = r#"{"kind":"perform-output-result","result":42}"#;
	let escaped = wat_escape(reply);
	let len = reply.len();

	let wat = format!(
		r#"
		(module
			(import "sf_host_unstable" "message_exchange"
				(func $message_exchange (param i32 i32 i32 i32 i32) (result i32)))
			(memory (export "memory") 2)
			(data (i32.const 0) "{escaped}")
			{boilerplate}
			(func (export "oneclient_core_perform")
				(drop (call $message_exchange
					(i32.const 0) (i32.const {len})
					(i32.const 4096) (i32.const 256)
					(i32.const 8192))))
		)
		"#,
		boilerplate = guest_boilerplate(),
	);

	let mut app = new_app();
	compile(&mut app, &wat);

	let result = empty_perform(&mut app).expect("perform should succeed");
	assert_eq!(result, json!(42));
}

#[test]
fn perform_output_error_becomes_perform_error() {
	let reply = r#"{"kind":"perform-output-error","error":{"code":"NotFound"}}"#;
	let escaped = wat_escape(reply);
	let len = reply.len();

	let wat = format!(
		r#"
		(module
			(import "sf_host_unstable" "message_exchange"
				(func $message_exchange (param i32 i32 i32 i32 i32) (result i32)))
			(memory (export "memory") 2)
			(data (i32.const 0) "{escaped}")
			{boilerplate}
			(func (export "oneclient_core_perform")
				(drop (call $message_exchange
					(i32.const 0) (i32.const {len})
					(i32.const 4096) (i32.const 256)
					(i32.const 8192))))
		)
		"#,
		boilerplate = guest_boilerplate(),
	);

	let mut app = new_app();
	compile(&mut app, &wat);

	match empty_perform(&mut app) {
		Err(RuntimeError::Perform(payload)) => assert_eq!(payload, json!({"code": "NotFound"})),
		other => panic!("expected PerformError, got {other:?}"),
	}
}

#[test]
fn perform_with_no_output_slot_set_is_synthesized_as_unexpected() {
	let wat = format!(
		r#"
		(module
			(memory (export "memory") 1)
			{boilerplate}
			(func (export "oneclient_core_perform"))
		)
		"#,
		boilerplate = guest_boilerplate(),
	);

	let mut app = new_app();
	compile(&mut app, &wat);

	match empty_perform(&mut app) {
		Err(RuntimeError::Unexpected { name, .. }) => assert_eq!(name, "UnexpectedError"),
		other => panic!("expected synthesized UnexpectedError, got {other:?}"),
	}
}

#[test]
fn guest_trap_is_reported_as_webassembly_runtime_error_and_core_reinitializes() {
	let wat = format!(
		r#"
		(module
			(memory (export "memory") 1)
			{boilerplate}
			(func (export "oneclient_core_perform") unreachable)
		)
		"#,
		boilerplate = guest_boilerplate(),
	);

	let mut app = new_app();
	compile(&mut app, &wat);

	match empty_perform(&mut app) {
		Err(RuntimeError::Unexpected { name, .. }) => assert_eq!(name, "WebAssemblyRuntimeError"),
		other => panic!("expected WebAssemblyRuntimeError, got {other:?}"),
	}
	assert!(!app.is_initialized(), "a trapped core must be discarded");

	// The façade re-initializes transparently on the next perform; at the
	// WasiApp level that's an explicit `init()` (the module bytes are still
	// cached from `load_core`).
	app.init().expect("re-initializing after a trap must succeed");
	assert!(app.is_initialized());

	// This fixture always traps, so the second perform traps again, but
	// critically with the *same* well-formed error rather than e.g.
	// `CoreNotLoaded` -- proof the re-init left the app usable.
	match empty_perform(&mut app) {
		Err(RuntimeError::Unexpected { name, .. }) => assert_eq!(name, "WebAssemblyRuntimeError"),
		other => panic!("expected WebAssemblyRuntimeError again, got {other:?}"),
	}
}

#[test]
fn oversized_reply_is_resolved_through_message_exchange_retrieve() {
	// `perform-input` is echoed back with the seeded large input, producing
	// a reply far bigger than a deliberately tiny `out_len`.
	let big_input = "x".repeat(2000);
	let perform_input = r#"{"kind":"perform-input"}"#;
	let perform_input_escaped = wat_escape(perform_input);
	let perform_input_len = perform_input.len();

	let ok_reply = r#"{"kind":"perform-output-result","result":42}"#;
	let ok_reply_escaped = wat_escape(ok_reply);
	let ok_reply_len = ok_reply.len();

	let wat = format!(
		r#"
		(module
			(import "sf_host_unstable" "message_exchange"
				(func $message_exchange (param i32 i32 i32 i32 i32) (result i32)))
			(import "sf_host_unstable" "message_exchange_retrieve"
				(func $retrieve (param i32 i32 i32) (result i32)))
			(memory (export "memory") 4)
			(data (i32.const 0) "{perform_input_escaped}")
			(data (i32.const 60000) "{ok_reply_escaped}")
			{boilerplate}
			(func (export "oneclient_core_perform")
				(local $first_size i32)
				(local $handle i32)
				(local $second_size i32)
				;; out_len of 16 is far smaller than the echoed-input reply.
				(local.set $first_size
					(call $message_exchange
						(i32.const 0) (i32.const {perform_input_len})
						(i32.const 4096) (i32.const 16)
						(i32.const 8192)))
				(local.set $handle (i32.load (i32.const 8192)))
				(local.set $second_size
					(call $retrieve (local.get $handle) (i32.const 20000) (i32.const 20000)))
				(if (i32.eq (local.get $first_size) (local.get $second_size))
					(then
						(drop (call $message_exchange
							(i32.const 60000) (i32.const {ok_reply_len})
							(i32.const 100000) (i32.const 256)
							(i32.const 108192))))))
		)
		"#,
		boilerplate = guest_boilerplate(),
	);

	let mut app = new_app();
	compile(&mut app, &wat);

	let result = app
		.perform(
			"file:///p".into(),
			"file:///prov".into(),
			"file:///map".into(),
			"TestUseCase".into(),
			json!({ "data": big_input }),
			json!({}),
			json!({}),
		)
		.expect("perform should succeed once the oversized reply round-trips");
	assert_eq!(result, json!(42));
}
