//! `std::fs`-backed [`Filesystem`](super::Filesystem) implementation.

use super::{Filesystem, OpenFlags};
use crate::abi::Errno;
use crate::errors::WasiError;
use crate::stream::Stream;
use std::fs::{File, OpenOptions};
use std::io::{self, Read, Write};

/// The default, production `Filesystem` collaborator.
#[derive(Debug, Default)]
pub struct StdFilesystem;

impl StdFilesystem {
	pub fn new() -> Self {
		StdFilesystem
	}
}

/// Translates `file-open` flags into `std::fs::OpenOptions`, per the
/// priority rule in spec §4.5: always binary (implicit on every OS `std::fs`
/// targets), exclusive-create wins over plain create, and among
/// truncate/append/write/read the first set wins.
fn open_options(flags: OpenFlags) -> OpenOptions {
	let mut options = OpenOptions::new();

	if flags.create_new {
		options.create_new(true);
	} else if flags.create {
		options.create(true);
	}

	if flags.truncate {
		options.write(true).truncate(true).create(flags.create || flags.create_new);
	} else if flags.append {
		options.append(true).create(flags.create || flags.create_new);
	} else if flags.write {
		options.write(true).create(flags.create || flags.create_new);
	} else if flags.read {
		options.read(true);
	}

	options
}

fn map_open_error(err: io::Error) -> WasiError {
	match err.kind() {
		io::ErrorKind::NotFound => WasiError::new(Errno::NoEnt),
		_ => WasiError::new(Errno::Inval),
	}
}

impl Filesystem for StdFilesystem {
	fn open(&self, path: &str, flags: OpenFlags) -> Result<Box<dyn Stream>, WasiError> {
		let file = open_options(flags).open(path).map_err(map_open_error)?;
		Ok(Box::new(FileStream { file }))
	}
}

#[derive(Debug)]
struct FileStream {
	file: File,
}

impl Stream for FileStream {
	fn read(&mut self, max_len: usize) -> Result<Vec<u8>, WasiError> {
		let mut buf = vec![0u8; max_len];
		let n = self
			.file
			.read(&mut buf)
			.map_err(|_| WasiError::new(Errno::Inval))?;
		buf.truncate(n);
		Ok(buf)
	}

	fn write(&mut self, data: &[u8]) -> Result<usize, WasiError> {
		self.file.write(data).map_err(|_| WasiError::new(Errno::Inval))
	}

	fn close(&mut self) -> Result<(), WasiError> {
		// File is closed on drop; nothing else to release explicitly.
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn open_missing_file_for_read_is_noent() {
		let fs = StdFilesystem::new();
		let err = fs
			.open(
				"/definitely/does/not/exist/onesdk-test",
				OpenFlags {
					read: true,
					..Default::default()
				},
			)
			.unwrap_err();
		assert_eq!(err.errno, Errno::NoEnt);
	}

	#[test]
	fn write_then_read_round_trips() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("roundtrip.txt");
		let path_str = path.to_str().unwrap();

		let fs = StdFilesystem::new();
		let mut writer = fs
			.open(
				path_str,
				OpenFlags {
					write: true,
					create: true,
					..Default::default()
				},
			)
			.unwrap();
		writer.write(b"hello world").unwrap();
		writer.close().unwrap();

		let mut reader = fs
			.open(
				path_str,
				OpenFlags {
					read: true,
					..Default::default()
				},
			)
			.unwrap();
		let data = reader.read(1024).unwrap();
		assert_eq!(data, b"hello world");
	}

	#[test]
	fn create_new_fails_if_file_exists() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("exists.txt");
		std::fs::write(&path, b"x").unwrap();

		let fs = StdFilesystem::new();
		let err = fs
			.open(
				path.to_str().unwrap(),
				OpenFlags {
					create_new: true,
					write: true,
					..Default::default()
				},
			)
			.unwrap_err();
		assert_eq!(err.errno, Errno::Inval);
	}
}
