//! A stream is a capability set `{read, write, close}`. Files and HTTP
//! response bodies implement it via adapters rather than being exposed as a
//! union type, per the spec's stream-duck-typing note.

use crate::errors::WasiError;

pub trait Stream: Send + std::fmt::Debug {
	fn read(&mut self, max_len: usize) -> Result<Vec<u8>, WasiError>;
	fn write(&mut self, data: &[u8]) -> Result<usize, WasiError>;
	fn close(&mut self) -> Result<(), WasiError>;
}
