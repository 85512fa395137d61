//! A short-lived view into the guest's linear memory.
//!
//! A [`GuestMemory`] must never be retained across a call into the guest: any
//! exported guest function call can grow linear memory and invalidate the
//! base pointer. Host exports re-acquire one on every entry.

use wasmtime::{AsContext, AsContextMut, Memory};

/// Reads exactly `len` bytes at `ptr` out of `memory`.
pub fn read_bytes(memory: Memory, store: impl AsContext, ptr: i32, len: i32) -> Vec<u8> {
	let data = memory.data(&store);
	let start = ptr as usize;
	let end = start + len as usize;
	data[start..end].to_vec()
}

/// Writes `min(max_len, data.len())` bytes of `data` to `ptr`, returning the
/// number of bytes actually written.
pub fn write_bytes(
	memory: Memory,
	mut store: impl AsContextMut,
	ptr: i32,
	max_len: i32,
	data: &[u8],
) -> i32 {
	let count = std::cmp::min(max_len as usize, data.len());
	let dst = memory.data_mut(store.as_context_mut());
	let start = ptr as usize;
	dst[start..start + count].copy_from_slice(&data[..count]);
	count as i32
}

/// Reads a little-endian signed 32-bit integer at `ptr`.
pub fn read_i32(memory: Memory, store: impl AsContext, ptr: i32) -> i32 {
	let bytes = read_bytes(memory, store, ptr, 4);
	i32::from_le_bytes(bytes.try_into().expect("read_bytes returned 4 bytes"))
}

/// Writes a little-endian signed 32-bit integer at `ptr`.
pub fn write_i32(memory: Memory, store: impl AsContextMut, ptr: i32, value: i32) {
	write_bytes(memory, store, ptr, 4, &value.to_le_bytes());
}
