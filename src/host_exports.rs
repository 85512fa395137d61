//! Registers the five `sf_host_unstable` host functions on the [`Linker`]:
//! `message_exchange`, `message_exchange_retrieve`, `stream_read`,
//! `stream_write`, `stream_close`.
//!
//! Grounded on the teacher's `callbacks.rs` (`linker.func_new`/`func_wrap`
//! per named host function, one closure each); the wire behavior of each
//! function follows `original_source/host/python/src/one_sdk/sf_host.py`.

use crate::abi::{abi_err, abi_ok, AbiWord, Errno};
use crate::app::StoreState;
use wasmtime::{Caller, Linker, Memory};

const HOST_NAMESPACE: &str = "sf_host_unstable";

/// Wires all five host exports into `linker`.
pub fn link(linker: &mut Linker<StoreState>) -> wasmtime::Result<()> {
	linker.func_wrap(HOST_NAMESPACE, "message_exchange", message_exchange)?;
	linker.func_wrap(HOST_NAMESPACE, "message_exchange_retrieve", message_exchange_retrieve)?;
	linker.func_wrap(HOST_NAMESPACE, "stream_read", stream_read)?;
	linker.func_wrap(HOST_NAMESPACE, "stream_write", stream_write)?;
	linker.func_wrap(HOST_NAMESPACE, "stream_close", stream_close)?;
	Ok(())
}

/// A memory view must be re-acquired fresh on every host-export entry: any
/// guest export call can grow linear memory and invalidate prior pointers.
fn caller_memory(caller: &mut Caller<'_, StoreState>) -> Memory {
	caller
		.get_export("memory")
		.and_then(|e| e.into_memory())
		.expect("guest must export `memory`")
}

fn message_exchange(
	mut caller: Caller<'_, StoreState>,
	msg_ptr: i32,
	msg_len: i32,
	out_ptr: i32,
	out_len: i32,
	ret_handle_ptr: i32,
) -> AbiWord {
	let memory = caller_memory(&mut caller);
	let msg_bytes = crate::memory::read_bytes(memory, &caller, msg_ptr, msg_len);

	let reply = match std::str::from_utf8(&msg_bytes)
		.ok()
		.and_then(|s| serde_json::from_str::<serde_json::Value>(s).ok())
	{
		Some(message) => {
			log::trace!("message_exchange: {}", message.get("kind").and_then(|v| v.as_str()).unwrap_or("?"));
			let state = caller.data_mut();
			state.dispatcher.handle_message(&mut state.perform_state, message)
		}
		None => serde_json::json!({ "kind": "err", "error": "malformed message_exchange payload" }),
	};
	log::trace!("message_exchange reply: {}", reply.get("kind").and_then(|v| v.as_str()).unwrap_or("?"));

	let reply_bytes = serde_json::to_vec(&reply).expect("a JSON Value always serializes");
	let reply_size = reply_bytes.len() as i32;

	if reply_bytes.len() <= out_len as usize {
		crate::memory::write_bytes(memory, &mut caller, out_ptr, out_len, &reply_bytes);
		crate::memory::write_i32(memory, &mut caller, ret_handle_ptr, 0);
	} else {
		let handle = caller.data_mut().message_store.insert(reply_bytes);
		crate::memory::write_i32(memory, &mut caller, ret_handle_ptr, handle as i32);
	}

	abi_ok(reply_size)
}

fn message_exchange_retrieve(mut caller: Caller<'_, StoreState>, handle: i32, out_ptr: i32, out_len: i32) -> AbiWord {
	log::trace!("message_exchange_retrieve: handle={handle} out_len={out_len}");

	let Some(reply_bytes) = caller.data_mut().message_store.remove(handle as u32) else {
		log::trace!("message_exchange_retrieve: unknown handle {handle}");
		return abi_err(Errno::Badf);
	};

	if reply_bytes.len() > out_len as usize {
		log::trace!("message_exchange_retrieve: reply {} bytes exceeds out_len {out_len}", reply_bytes.len());
		return abi_err(Errno::Range);
	}

	let memory = caller_memory(&mut caller);
	let n = crate::memory::write_bytes(memory, &mut caller, out_ptr, out_len, &reply_bytes);
	log::trace!("message_exchange_retrieve: wrote {n} bytes");
	abi_ok(n)
}

fn stream_read(mut caller: Caller<'_, StoreState>, handle: i32, out_ptr: i32, out_len: i32) -> AbiWord {
	log::trace!("stream_read: handle={handle} out_len={out_len}");

	let Some(stream) = caller.data_mut().dispatcher.streams.get_mut(handle as u32) else {
		log::trace!("stream_read: unknown handle {handle}");
		return abi_err(Errno::Badf);
	};
	match stream.read(out_len as usize) {
		Ok(bytes) => {
			let memory = caller_memory(&mut caller);
			let n = crate::memory::write_bytes(memory, &mut caller, out_ptr, out_len, &bytes);
			log::trace!("stream_read: read {n} bytes from handle {handle}");
			abi_ok(n)
		}
		Err(err) => {
			log::trace!("stream_read: handle {handle} failed with {:?}", err.errno);
			abi_err(err.errno)
		}
	}
}

fn stream_write(mut caller: Caller<'_, StoreState>, handle: i32, in_ptr: i32, in_len: i32) -> AbiWord {
	log::trace!("stream_write: handle={handle} in_len={in_len}");

	let memory = caller_memory(&mut caller);
	let bytes = crate::memory::read_bytes(memory, &caller, in_ptr, in_len);

	let Some(stream) = caller.data_mut().dispatcher.streams.get_mut(handle as u32) else {
		log::trace!("stream_write: unknown handle {handle}");
		return abi_err(Errno::Badf);
	};
	match stream.write(&bytes) {
		Ok(n) => {
			log::trace!("stream_write: wrote {n} bytes to handle {handle}");
			abi_ok(n as i32)
		}
		Err(err) => {
			log::trace!("stream_write: handle {handle} failed with {:?}", err.errno);
			abi_err(err.errno)
		}
	}
}

fn stream_close(mut caller: Caller<'_, StoreState>, handle: i32) -> AbiWord {
	log::trace!("stream_close: handle={handle}");

	let Some(mut stream) = caller.data_mut().dispatcher.streams.remove(handle as u32) else {
		log::trace!("stream_close: unknown handle {handle}");
		return abi_err(Errno::Badf);
	};
	match stream.close() {
		Ok(()) => {
			log::trace!("stream_close: closed handle {handle}");
			abi_ok(0)
		}
		Err(err) => {
			log::trace!("stream_close: handle {handle} failed with {:?}", err.errno);
			abi_err(err.errno)
		}
	}
}
