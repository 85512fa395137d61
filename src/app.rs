//! `WasiApp`: the runtime core. Owns the engine/store/instance, the
//! perform-state machine, lifecycle (load, init, perform, destroy), trap
//! recovery, and metrics/developer-dump extraction.

use crate::errors::RuntimeError;
use crate::handle_map::HandleMap;
use crate::message::{Dispatcher, PerformState};
use crate::platform::{Filesystem, Network, Persistence};
use serde_json::Value;
use wasmtime::{Engine, Instance, Linker, Memory, Module, Store, TypedFunc};
use wasmtime_wasi::preview1::{self, WasiP1Ctx};
use wasmtime_wasi::WasiCtxBuilder;

const GUEST_SETUP: &str = "oneclient_core_setup";
const GUEST_TEARDOWN: &str = "oneclient_core_teardown";
const GUEST_PERFORM: &str = "oneclient_core_perform";
const GUEST_GET_METRICS: &str = "oneclient_core_get_metrics";
const GUEST_CLEAR_METRICS: &str = "oneclient_core_clear_metrics";
const GUEST_GET_DEVELOPER_DUMP: &str = "oneclient_core_get_developer_dump";

/// Shared, mutable state reachable both from [`WasiApp`]'s own methods and
/// from host-export closures running while a guest export is on the stack.
pub(crate) struct StoreState {
	pub wasi: WasiP1Ctx,
	pub dispatcher: Dispatcher,
	pub perform_state: Option<PerformState>,
	pub message_store: HandleMap<Vec<u8>>,
}

struct AppCore {
	instance: Instance,
	setup_fn: TypedFunc<(), ()>,
	teardown_fn: TypedFunc<(), ()>,
	perform_fn: TypedFunc<(), ()>,
	get_metrics_fn: TypedFunc<(), i32>,
	clear_metrics_fn: TypedFunc<(), ()>,
	get_developer_dump_fn: TypedFunc<(), i32>,
}

/// The host-side runtime embedding one sandboxed core module.
///
/// A `WasiApp` is single-threaded and performs at most one `perform` at a
/// time; see the crate's concurrency notes in the README.
pub struct WasiApp {
	engine: Engine,
	linker: Linker<StoreState>,
	store: Store<StoreState>,
	module: Option<Module>,
	core: Option<AppCore>,
}

/// A small wrapper so a `wasmtime::Error` (which intentionally does not
/// implement `std::error::Error` itself) can be chained as a `source()`.
#[derive(Debug)]
struct WasmError(wasmtime::Error);

impl std::fmt::Display for WasmError {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "{:#}", self.0)
	}
}

impl std::error::Error for WasmError {}

impl WasiApp {
	pub fn new(filesystem: Box<dyn Filesystem>, network: Box<dyn Network>, persistence: Box<dyn Persistence>) -> Self {
		let engine = Engine::default();
		let mut linker = Linker::new(&engine);

		preview1::add_to_linker_sync(&mut linker, |state: &mut StoreState| &mut state.wasi)
			.expect("wiring WASI preview1 into the linker must not fail");
		crate::host_exports::link(&mut linker).expect("wiring sf_host_unstable into the linker must not fail");

		let wasi = WasiCtxBuilder::new()
			.inherit_stdio()
			.envs(&std::env::vars().collect::<Vec<_>>())
			.env("ONESDK_DEFAULT_USERAGENT", &WasiApp::user_agent())
			.build_p1();

		let state = StoreState {
			wasi,
			dispatcher: Dispatcher::new(filesystem, network, persistence),
			perform_state: None,
			message_store: HandleMap::new(),
		};

		WasiApp {
			store: Store::new(&engine, state),
			engine,
			linker,
			module: None,
			core: None,
		}
	}

	/// A product-identifying user agent, passed to the guest and used for
	/// the Persistence collaborator's own HTTP requests.
	pub fn user_agent() -> String {
		format!(
			"onesdk-runtime-rust/{} ({} {})",
			env!("CARGO_PKG_VERSION"),
			std::env::consts::OS,
			std::env::consts::ARCH,
		)
	}

	pub fn is_initialized(&self) -> bool {
		self.core.is_some()
	}

	/// Compiles the wasm bytes for later use by [`WasiApp::init`]. Does not
	/// instantiate; `init` is idempotent and does the instantiation.
	pub fn load_core(&mut self, wasm: &[u8]) -> Result<(), RuntimeError> {
		let module = Module::new(&self.engine, wasm)
			.map_err(|e| RuntimeError::unexpected_with_source("UnexpectedError", "failed to compile core module", WasmError(e)))?;
		self.module = Some(module);
		Ok(())
	}

	/// Instantiates the loaded core and calls its `setup` export. A no-op if
	/// already initialized.
	pub fn init(&mut self) -> Result<(), RuntimeError> {
		if self.core.is_some() {
			return Ok(());
		}

		let module = self
			.module
			.clone()
			.ok_or_else(|| RuntimeError::unexpected("CoreNotLoaded", "Call load_core first"))?;

		let instance = self
			.linker
			.instantiate(&mut self.store, &module)
			.map_err(|e| RuntimeError::unexpected_with_source("UnexpectedError", "failed to instantiate core", WasmError(e)))?;

		let core = AppCore {
			instance,
			setup_fn: self.typed_export(&instance, GUEST_SETUP)?,
			teardown_fn: self.typed_export(&instance, GUEST_TEARDOWN)?,
			perform_fn: self.typed_export(&instance, GUEST_PERFORM)?,
			get_metrics_fn: self.typed_export(&instance, GUEST_GET_METRICS)?,
			clear_metrics_fn: self.typed_export(&instance, GUEST_CLEAR_METRICS)?,
			get_developer_dump_fn: self.typed_export(&instance, GUEST_GET_DEVELOPER_DUMP)?,
		};
		self.core = Some(core);

		let setup_fn = self.core.as_ref().unwrap().setup_fn.clone();
		self.call_export(|store| setup_fn.call(store, ()))?;

		log::info!("core initialized");
		Ok(())
	}

	fn typed_export<Params, Results>(&mut self, instance: &Instance, name: &str) -> Result<TypedFunc<Params, Results>, RuntimeError>
	where
		Params: wasmtime::WasmParams,
		Results: wasmtime::WasmResults,
	{
		instance
			.get_typed_func(&mut self.store, name)
			.map_err(|e| RuntimeError::unexpected_with_source("UnexpectedError", format!("guest is missing export `{name}`"), WasmError(e)))
	}

	/// Runs one perform: seeds perform-state, invokes the guest `perform`
	/// export (during which the guest may issue any number of message
	/// exchanges and stream operations), then resolves the outcome.
	#[allow(clippy::too_many_arguments)]
	pub fn perform(
		&mut self,
		profile_url: String,
		provider_url: String,
		map_url: String,
		usecase: String,
		input: Value,
		parameters: Value,
		security: Value,
	) -> Result<Value, RuntimeError> {
		let Some(core) = self.core.as_ref() else {
			return Err(RuntimeError::Uninitialized);
		};
		let perform_fn = core.perform_fn.clone();

		self.store.data_mut().perform_state = Some(PerformState::new(
			profile_url,
			provider_url,
			map_url,
			usecase,
			input,
			parameters,
			security,
		));

		let call_result = self.call_export(|store| perform_fn.call(store, ()));
		let state = self.store.data_mut().perform_state.take();
		call_result?;

		let state = state.expect("perform_state was set at the start of perform()");
		if let Some(exception) = state.exception {
			return Err(exception);
		}
		if let Some(error) = state.error {
			return Err(RuntimeError::Perform(error));
		}
		match state.result {
			Some(result) => Ok(result),
			// Invariant (spec §3): if the guest returns without setting any
			// output slot, the runtime synthesises an "unexpected" exception
			// rather than silently treating it as a null result.
			None => Err(RuntimeError::unexpected("UnexpectedError", "perform returned without setting a result, error or exception")),
		}
	}

	/// Sends any pending metrics and calls the guest `teardown` export. A
	/// no-op if not initialized.
	pub fn destroy(&mut self) -> Result<(), RuntimeError> {
		if self.core.is_none() {
			return Ok(());
		}

		self.send_metrics()?;

		let teardown_fn = self.core.as_ref().unwrap().teardown_fn.clone();
		self.call_export(|store| teardown_fn.call(store, ()))?;
		self.core = None;
		Ok(())
	}

	/// Extracts pending metrics events from the guest and hands them to the
	/// Persistence collaborator. A no-op if not initialized.
	pub fn send_metrics(&mut self) -> Result<(), RuntimeError> {
		let Some(core) = self.core.as_ref() else {
			return Ok(());
		};
		let get_metrics_fn = core.get_metrics_fn.clone();
		let clear_metrics_fn = core.clear_metrics_fn.clone();

		let arena_ptr = self.call_export(|store| get_metrics_fn.call(store, ()))?;
		let memory = self.memory_handle();
		let events = self.tracing_events(memory, arena_ptr);
		self.call_export(|store| clear_metrics_fn.call(store, ()))?;

		if !events.is_empty() {
			self.persist_metrics(&events)?;
		}
		Ok(())
	}

	fn persist_metrics(&mut self, events: &[String]) -> Result<(), RuntimeError> {
		self.store
			.data()
			.dispatcher
			.persistence
			.persist_metrics(events)
			.map_err(|e| RuntimeError::unexpected_with_source("UnexpectedError", "failed to persist metrics", StringError(e.to_string())))
	}

	fn persist_developer_dump(&mut self, events: &[String]) -> Result<(), RuntimeError> {
		self.store
			.data()
			.dispatcher
			.persistence
			.persist_developer_dump(events)
			.map_err(|e| RuntimeError::unexpected_with_source("UnexpectedError", "failed to persist developer dump", StringError(e.to_string())))
	}

	fn memory_handle(&mut self) -> Memory {
		let instance = self.core.as_ref().expect("memory_handle requires an initialized core").instance;
		instance
			.get_memory(&mut self.store, "memory")
			.expect("guest must export `memory`")
	}

	fn tracing_events(&mut self, memory: Memory, arena_ptr: i32) -> Vec<String> {
		let b1_ptr = crate::memory::read_i32(memory, &self.store, arena_ptr);
		let b1_len = crate::memory::read_i32(memory, &self.store, arena_ptr + 4);
		let b2_ptr = crate::memory::read_i32(memory, &self.store, arena_ptr + 8);
		let b2_len = crate::memory::read_i32(memory, &self.store, arena_ptr + 12);

		let mut buffer = crate::memory::read_bytes(memory, &self.store, b1_ptr, b1_len);
		buffer.extend(crate::memory::read_bytes(memory, &self.store, b2_ptr, b2_len));

		split_nul_terminated_utf8(&buffer)
	}

	/// Calls a guest export through `call`, recovering from a trap per spec
	/// §4.6: the instance is discarded, a developer dump and final metrics
	/// are pulled from its still-valid memory, and an `UnexpectedError` is
	/// raised chained from the underlying failure.
	fn call_export<T>(&mut self, call: impl FnOnce(&mut Store<StoreState>) -> wasmtime::Result<T>) -> Result<T, RuntimeError> {
		match call(&mut self.store) {
			Ok(value) => Ok(value),
			Err(err) => {
				let err_name = if err.downcast_ref::<wasmtime::Trap>().is_some() {
					"WebAssemblyRuntimeError"
				} else {
					"UnexpectedError"
				};

				if let Some(core) = self.core.take() {
					if let Err(dump_err) = self.dump_on_panic(&core) {
						return Err(RuntimeError::unexpected_with_source("UnexpectedError", "Error during dumping", dump_err));
					}
				}

				Err(RuntimeError::unexpected_with_source(err_name, "Error while executing WebAssembly", WasmError(err)))
			}
		}
	}

	/// Best-effort developer-dump + metrics flush from a poisoned instance's
	/// still-valid memory. Does not recurse into `call_export` on further
	/// trap, matching the single-level recovery the reference host performs.
	fn dump_on_panic(&mut self, core: &AppCore) -> Result<(), RuntimeError> {
		let dump_ptr = core
			.get_developer_dump_fn
			.call(&mut self.store, ())
			.map_err(|e| RuntimeError::unexpected_with_source("UnexpectedError", "developer dump export trapped", WasmError(e)))?;
		let memory = core
			.instance
			.get_memory(&mut self.store, "memory")
			.expect("guest must export `memory`");
		let dump_events = self.tracing_events(memory, dump_ptr);
		if !dump_events.is_empty() {
			self.persist_developer_dump(&dump_events)?;
		}

		let metrics_ptr = core
			.get_metrics_fn
			.call(&mut self.store, ())
			.map_err(|e| RuntimeError::unexpected_with_source("UnexpectedError", "get_metrics export trapped", WasmError(e)))?;
		let metrics_events = self.tracing_events(memory, metrics_ptr);
		if !metrics_events.is_empty() {
			self.persist_metrics(&metrics_events)?;
		}

		Ok(())
	}
}

#[derive(Debug)]
struct StringError(String);

impl std::fmt::Display for StringError {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "{}", self.0)
	}
}

impl std::error::Error for StringError {}

/// Splits `buffer` on NUL bytes, keeping only complete (NUL-terminated,
/// non-empty) UTF-8 segments. A trailing unterminated chunk is discarded,
/// matching the reference host's scanning loop.
fn split_nul_terminated_utf8(buffer: &[u8]) -> Vec<String> {
	let mut events = Vec::new();
	let mut start = 0;
	while let Some(rel_idx) = buffer[start..].iter().position(|&b| b == 0) {
		let idx = start + rel_idx;
		if idx > start {
			events.push(String::from_utf8_lossy(&buffer[start..idx]).into_owned());
		}
		start = idx + 1;
	}
	events
}
