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

// On disk data layout for the index file.
//
// Header (8 bytes)
// [COUNT: 8]
// COUNT - 64-bit number of ids ever allocated. The next make_id returns COUNT.
//
// Entry array, one 8-byte entry per id. Entry for id i lives at byte 8 + 8*i.
// [REV: 16 bits][OFFSET: 48 bits]
// REV - current revision of the id. 0 only for ids that were allocated but
// never written.
// OFFSET - byte offset into the log file of the record header for the current
// revision.
//
// An entry of all ones marks a removed id. Ids are never reused.
//
// The file is kept sparse: it is extended by writing a single zero byte past
// the end and entries for unwritten ids read back as zero. Capacity grows by
// a fixed increment because a live mmap cannot be resized; growth unmaps,
// extends, and remaps.

use std::convert::TryInto;
use std::path::Path;
use fs2::FileExt as _;
use crate::error::{Error, Result};

pub type Id = u64;
pub type Revision = u16;

pub const HEADER_SIZE: u64 = 8;
pub const ENTRY_SIZE: u64 = 8;
pub const GROW_BY: u64 = 10_000;

const OFFSET_BITS: u8 = 48;
const OFFSET_MASK: u64 = (1u64 << OFFSET_BITS) - 1;
const TOMBSTONE: u64 = !0u64;

#[derive(Clone, Copy, Eq, PartialEq)]
pub struct Entry(u64);

impl Entry {
	pub fn new(offset: u64, rev: Revision) -> Entry {
		debug_assert!(offset <= OFFSET_MASK);
		Entry(((rev as u64) << OFFSET_BITS) | (offset & OFFSET_MASK))
	}

	pub fn tombstone() -> Entry {
		Entry(TOMBSTONE)
	}

	pub fn from_u64(e: u64) -> Entry {
		Entry(e)
	}

	pub fn as_u64(&self) -> u64 {
		self.0
	}

	pub fn offset(&self) -> u64 {
		self.0 & OFFSET_MASK
	}

	pub fn revision(&self) -> Revision {
		(self.0 >> OFFSET_BITS) as Revision
	}

	pub fn is_tombstone(&self) -> bool {
		self.0 == TOMBSTONE
	}

	// An allocated id that was never put. Valid puts always set rev >= 1 so
	// a live entry is never all zero.
	pub fn is_empty(&self) -> bool {
		self.0 == 0
	}
}

impl std::fmt::Display for Entry {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "entry {}@{}", self.revision(), self.offset())
	}
}

pub struct Index {
	file: std::fs::File,
	map: Option<memmap2::MmapMut>,
	capacity: u64,
	count: u64,
	growths: u64,
}

impl Index {
	pub fn open(path: &Path) -> Result<Index> {
		let file = std::fs::OpenOptions::new()
			.create(true)
			.read(true)
			.write(true)
			.open(path)?;
		// Concurrent opens of the same store are unsupported.
		file.try_lock_exclusive()?;

		let len = file.metadata()?.len();
		let mut index = Index {
			file,
			map: None,
			capacity: len.saturating_sub(HEADER_SIZE) / ENTRY_SIZE,
			count: 0,
			growths: 0,
		};

		if index.capacity == 0 {
			index.grow()?;
		}

		let mut count = [0u8; HEADER_SIZE as usize];
		index.read_at(&mut count, 0)?;
		index.count = u64::from_le_bytes(count);

		index.map = Self::try_map(&index.file);
		log::debug!(
			target: "logstore",
			"Opened index {:?}: {} ids, capacity {}, mapped: {}",
			path,
			index.count,
			index.capacity,
			index.map.is_some(),
		);
		Ok(index)
	}

	pub fn count(&self) -> u64 {
		self.count
	}

	pub fn capacity(&self) -> u64 {
		self.capacity
	}

	pub fn growths(&self) -> u64 {
		self.growths
	}

	fn try_map(file: &std::fs::File) -> Option<memmap2::MmapMut> {
		match unsafe { memmap2::MmapMut::map_mut(file) } {
			Ok(map) => Some(map),
			Err(e) => {
				log::warn!(
					target: "logstore",
					"Failed to map index file, falling back to file i/o: {}",
					e,
				);
				None
			}
		}
	}

	#[cfg(unix)]
	fn read_at(&self, buf: &mut [u8], offset: u64) -> Result<()> {
		use std::os::unix::fs::FileExt;
		Ok(self.file.read_exact_at(buf, offset)?)
	}

	#[cfg(unix)]
	fn write_at(&self, buf: &[u8], offset: u64) -> Result<()> {
		use std::os::unix::fs::FileExt;
		Ok(self.file.write_all_at(buf, offset)?)
	}

	#[cfg(windows)]
	fn read_at(&self, buf: &mut [u8], offset: u64) -> Result<()> {
		use std::os::windows::fs::FileExt;
		self.file.seek_read(buf, offset)?;
		Ok(())
	}

	#[cfg(windows)]
	fn write_at(&self, buf: &[u8], offset: u64) -> Result<()> {
		use std::os::windows::fs::FileExt;
		self.file.seek_write(buf, offset)?;
		Ok(())
	}

	fn entry_offset(id: Id) -> u64 {
		HEADER_SIZE + id * ENTRY_SIZE
	}

	pub fn entry(&self, id: Id) -> Result<Entry> {
		if id >= self.capacity {
			return Err(Error::InvalidParameter("id out of range"));
		}
		let offset = Self::entry_offset(id);
		let raw = match &self.map {
			Some(map) => {
				let offset = offset as usize;
				u64::from_le_bytes(map[offset..offset + ENTRY_SIZE as usize].try_into().unwrap())
			}
			None => {
				let mut buf = [0u8; ENTRY_SIZE as usize];
				self.read_at(&mut buf, offset)?;
				u64::from_le_bytes(buf)
			}
		};
		Ok(Entry::from_u64(raw))
	}

	pub fn write_entry(&mut self, id: Id, entry: Entry) -> Result<()> {
		if id >= self.capacity {
			return Err(Error::InvalidParameter("id out of range"));
		}
		let offset = Self::entry_offset(id);
		match &mut self.map {
			Some(map) => {
				let offset = offset as usize;
				map[offset..offset + ENTRY_SIZE as usize]
					.copy_from_slice(&entry.as_u64().to_le_bytes());
			}
			None => self.write_at(&entry.as_u64().to_le_bytes(), offset)?,
		}
		Ok(())
	}

	/// Allocate the next id and persist the new count in the file header.
	pub fn make_id(&mut self) -> Result<Id> {
		let id = self.count;
		self.count += 1;
		match &mut self.map {
			Some(map) => map[0..HEADER_SIZE as usize].copy_from_slice(&self.count.to_le_bytes()),
			None => self.write_at(&self.count.to_le_bytes(), 0)?,
		}
		if self.count == self.capacity {
			self.grow()?;
		}
		Ok(id)
	}

	// Extend the sparse file by a fixed number of entries. The old mapping, if
	// any, must be released before the file changes size underneath it.
	fn grow(&mut self) -> Result<()> {
		let was_mapped = self.map.take().is_some();
		self.capacity += GROW_BY;
		let new_len = HEADER_SIZE + self.capacity * ENTRY_SIZE;
		self.write_at(&[0u8], new_len - 1)?;
		self.growths += 1;
		log::debug!(
			target: "logstore",
			"Grew index to {} entries ({} bytes), growth {}",
			self.capacity,
			new_len,
			self.growths,
		);
		if was_mapped {
			self.map = Self::try_map(&self.file);
		}
		Ok(())
	}

	pub fn sync(&self) -> Result<()> {
		match &self.map {
			Some(map) => map.flush()?,
			None => self.file.sync_all()?,
		}
		Ok(())
	}
}
