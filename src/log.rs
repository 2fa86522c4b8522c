// Copyright 2015-2020 Parity Technologies (UK) Ltd.
// This file is part of Parity.

// Parity is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.

// Parity is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.

// You should have received a copy of the GNU General Public License
// along with Parity.  If not, see <http://www.gnu.org/licenses/>.

// On disk data layout for the log file.
//
// Record:
// [ID: 8][SIZE: 8][VALUE: SIZE]
// ID - 64-bit id the record belongs to.
// SIZE - 64-bit value size. Always > 0 for a live record.
// VALUE - SIZE payload bytes.
//
// Tombstone record:
// [ID: 8][SIZE: 8]
// SIZE - 0. No payload follows.
//
// Records are concatenated with no padding. The log is append-only; records
// superseded by a later put or remove stay in place and are simply no longer
// referenced by the index.

use std::convert::TryInto;
use std::path::Path;
use crate::error::{Error, Result};
use crate::index::Id;

pub type Value = Vec<u8>;

pub const RECORD_HEADER_SIZE: u64 = 16;

const ID_SIZE: usize = 8;

#[cfg(target_os = "macos")]
fn disable_read_ahead(file: &std::fs::File) -> Result<()> {
	use std::os::unix::io::AsRawFd;
	if unsafe { libc::fcntl(file.as_raw_fd(), libc::F_RDAHEAD, 0) } != 0 {
		Err(std::io::Error::last_os_error())?
	} else {
		Ok(())
	}
}

#[cfg(not(target_os = "macos"))]
fn disable_read_ahead(_file: &std::fs::File) -> Result<()> {
	Ok(())
}

#[derive(Default, Clone, Copy)]
pub struct RecordHeader([u8; RECORD_HEADER_SIZE as usize]);

impl RecordHeader {
	fn new(id: Id, size: u64) -> RecordHeader {
		let mut header = RecordHeader::default();
		header.set_id(id);
		header.set_size(size);
		header
	}

	pub fn id(&self) -> Id {
		u64::from_le_bytes(self.0[0..ID_SIZE].try_into().unwrap())
	}
	fn set_id(&mut self, id: Id) {
		self.0[0..ID_SIZE].copy_from_slice(&id.to_le_bytes());
	}
	pub fn size(&self) -> u64 {
		u64::from_le_bytes(self.0[ID_SIZE..].try_into().unwrap())
	}
	fn set_size(&mut self, size: u64) {
		self.0[ID_SIZE..].copy_from_slice(&size.to_le_bytes());
	}

	// Tombstones were written with size 0 or all ones depending on the format
	// revision; both read back as removed.
	pub fn is_tombstone(&self) -> bool {
		self.size() == 0 || self.size() == !0u64
	}
}

pub struct Log {
	file: std::fs::File,
	size: u64,
}

impl Log {
	pub fn open(path: &Path) -> Result<Log> {
		let file = std::fs::OpenOptions::new()
			.create(true)
			.read(true)
			.append(true)
			.open(path)?;
		disable_read_ahead(&file)?;
		let size = file.metadata()?.len();
		log::debug!(target: "logstore", "Opened log {:?}: {} bytes", path, size);
		Ok(Log { file, size })
	}

	/// Current log tail. This is where the next record will be appended, and
	/// the offset recorded in the index for it.
	pub fn size(&self) -> u64 {
		self.size
	}

	/// Append a record as a single vectored write and return the offset of
	/// its header. The cached size advances even if the caller later fails to
	/// update the index; the orphaned record is never referenced.
	pub fn append(&mut self, id: Id, value: &[u8]) -> Result<u64> {
		let offset = self.size;
		let header = RecordHeader::new(id, value.len() as u64);
		self.append_vectored(&header.0, value)?;
		self.size += RECORD_HEADER_SIZE + value.len() as u64;
		log::trace!(
			target: "logstore",
			"Appended record for id {}: {} bytes at {}",
			id,
			value.len(),
			offset,
		);
		Ok(offset)
	}

	pub fn append_tombstone(&mut self, id: Id) -> Result<u64> {
		let offset = self.size;
		let header = RecordHeader::new(id, 0);
		self.append_vectored(&header.0, &[])?;
		self.size += RECORD_HEADER_SIZE;
		log::trace!(target: "logstore", "Appended tombstone for id {} at {}", id, offset);
		Ok(offset)
	}

	// The file is opened in append mode, so every write lands at the end even
	// after a partial write. Interrupted writes are retried.
	fn append_vectored(&self, header: &[u8], value: &[u8]) -> Result<()> {
		use std::io::{IoSlice, Write};
		let mut file = &self.file;
		let total = header.len() + value.len();
		let mut written = 0;
		while written < total {
			let result = if written < header.len() {
				file.write_vectored(&[IoSlice::new(&header[written..]), IoSlice::new(value)])
			} else {
				file.write(&value[written - header.len()..])
			};
			match result {
				Ok(0) => {
					return Err(Error::Io(std::io::Error::new(
						std::io::ErrorKind::WriteZero,
						"failed to append whole record",
					)))
				}
				Ok(n) => written += n,
				Err(ref e) if e.kind() == std::io::ErrorKind::Interrupted => (),
				Err(e) => return Err(e.into()),
			}
		}
		Ok(())
	}

	pub fn read_header(&self, offset: u64) -> Result<RecordHeader> {
		let mut header = RecordHeader::default();
		self.read_at(&mut header.0, offset)?;
		Ok(header)
	}

	pub fn read_value(&self, offset: u64, size: u64) -> Result<Value> {
		let mut value = Value::new();
		value.try_reserve_exact(size as usize).map_err(|_| Error::OutOfMemory)?;
		value.resize(size as usize, 0);
		self.read_at(&mut value, offset + RECORD_HEADER_SIZE)?;
		Ok(value)
	}

	#[cfg(unix)]
	fn read_at(&self, buf: &mut [u8], offset: u64) -> Result<()> {
		use std::os::unix::fs::FileExt;
		Ok(self.file.read_exact_at(buf, offset)?)
	}

	#[cfg(windows)]
	fn read_at(&self, buf: &mut [u8], offset: u64) -> Result<()> {
		use std::os::windows::fs::FileExt;
		self.file.seek_read(buf, offset)?;
		Ok(())
	}

	pub fn sync(&self) -> Result<()> {
		Ok(self.file.sync_all()?)
	}
}
