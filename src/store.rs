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

use std::path::Path;
use parking_lot::Mutex;
use crate::{
	error::{Error, Result},
	index::{Entry, Id, Index, Revision},
	log::{Log, Value},
	options::Options,
};

/// Largest value size that still leaves the log offset encodable in the low
/// 48 bits of an index entry.
pub const MAX_VALUE_SIZE: u64 = (1u64 << 48) - 1;

/// An append-only store of opaque values keyed by store-assigned ids.
///
/// Each value carries a revision, incremented on every successful [`put`];
/// a put with a stale revision fails with [`Error::Conflict`]. All operations
/// serialize on one internal mutex, so a `Store` can be shared between
/// threads directly or behind an `Arc`.
///
/// [`put`]: Store::put
pub struct Store {
	inner: Mutex<StoreInner>,
	sync_on_close: bool,
}

struct StoreInner {
	log: Log,
	index: Index,
}

impl Store {
	/// Open the store at `path`, creating the log and its sister index file
	/// if they do not exist yet.
	pub fn open(path: &Path) -> Result<Store> {
		Self::open_with_options(&Options::with_path(path))
	}

	pub fn open_with_options(options: &Options) -> Result<Store> {
		let log = Log::open(&options.path)?;
		let index = Index::open(&options.index_path())?;
		log::debug!(
			target: "logstore",
			"Opened store {:?}: {} ids, log size {}",
			options.path,
			index.count(),
			log.size(),
		);
		Ok(Store {
			inner: Mutex::new(StoreInner { log, index }),
			sync_on_close: options.sync_on_close,
		})
	}

	/// Allocate the next id. Ids start at 0, are handed out in order, and are
	/// never reused. The id stays unwritten until the first `put` with
	/// revision 0.
	pub fn make_id(&self) -> Result<Id> {
		let mut inner = self.inner.lock();
		inner.index.make_id()
	}

	/// Append a new revision of `id`. `rev` must match the currently stored
	/// revision: 0 for a never-written id, the revision returned by the last
	/// `get` or `put` otherwise.
	pub fn put(&self, id: Id, value: &[u8], rev: Revision) -> Result<Revision> {
		if value.is_empty() {
			return Err(Error::InvalidParameter("empty value"));
		}
		if value.len() as u64 > MAX_VALUE_SIZE {
			return Err(Error::InvalidParameter("value too large"));
		}
		let mut inner = self.inner.lock();
		let entry = inner.index.entry(id)?;
		if entry.revision() != rev {
			return Err(Error::Conflict);
		}
		let offset = inner.log.append(id, value)?;
		let new_rev = rev.wrapping_add(1);
		inner.index.write_entry(id, Entry::new(offset, new_rev))?;
		Ok(new_rev)
	}

	/// Read the current value and revision of `id`.
	pub fn get(&self, id: Id) -> Result<(Value, Revision)> {
		let inner = self.inner.lock();
		let entry = inner.index.entry(id)?;
		if entry.is_tombstone() {
			return Err(Error::NotFound);
		}
		// Allocated but never written.
		if entry.is_empty() {
			return Err(Error::NotFound);
		}
		let header = inner.log.read_header(entry.offset())?;
		if header.id() != id {
			log::warn!(
				target: "logstore",
				"Log record at {} belongs to id {}, expected {}",
				entry.offset(),
				header.id(),
				id,
			);
			return Err(Error::Tampered);
		}
		if header.is_tombstone() {
			return Err(Error::NotFound);
		}
		let value = inner.log.read_value(entry.offset(), header.size())?;
		Ok((value, entry.revision()))
	}

	/// Remove `id`. The id is not freed for reuse and the log space of its
	/// records is not reclaimed; the slot is marked removed and a tombstone
	/// record is appended.
	pub fn remove(&self, id: Id) -> Result<()> {
		let mut inner = self.inner.lock();
		inner.index.write_entry(id, Entry::tombstone())?;
		inner.log.append_tombstone(id)?;
		Ok(())
	}

	/// Force both files to durable storage: fsync on the log, msync over the
	/// index mapping (or fsync when running unmapped).
	pub fn sync(&self) -> Result<()> {
		let inner = self.inner.lock();
		inner.log.sync()?;
		inner.index.sync()?;
		Ok(())
	}

	/// Close the store, syncing first unless [`Options::sync_on_close`] was
	/// turned off. Dropping a `Store` without `close` releases the files
	/// without a final sync.
	pub fn close(self) -> Result<()> {
		if self.sync_on_close {
			self.sync()?;
		}
		let inner = self.inner.into_inner();
		drop(inner);
		Ok(())
	}

	/// Number of ids allocated so far; the next `make_id` returns this.
	pub fn id_count(&self) -> u64 {
		self.inner.lock().index.count()
	}

	/// Current index capacity in ids.
	pub fn capacity(&self) -> u64 {
		self.inner.lock().index.capacity()
	}

	/// Cached log file length in bytes.
	pub fn log_size(&self) -> u64 {
		self.inner.lock().log.size()
	}

	/// Number of times the index file was extended since open, including the
	/// initial extension of a fresh index.
	pub fn index_growth_count(&self) -> u64 {
		self.inner.lock().index.growths()
	}
}

#[cfg(test)]
mod test {
	use super::*;
	use crate::index::GROW_BY;

	struct TempDir(std::path::PathBuf);

	impl TempDir {
		fn new(name: &'static str) -> TempDir {
			env_logger::try_init().ok();
			let mut path = std::env::temp_dir();
			path.push("logstore-test");
			path.push("store");
			path.push(name);

			if path.exists() {
				std::fs::remove_dir_all(&path).unwrap();
			}
			std::fs::create_dir_all(&path).unwrap();
			TempDir(path)
		}

		fn store(&self) -> Store {
			Store::open(&self.0.join("log")).unwrap()
		}

		fn log_file_size(&self) -> u64 {
			std::fs::metadata(self.0.join("log")).unwrap().len()
		}
	}

	impl Drop for TempDir {
		fn drop(&mut self) {
			if self.0.exists() {
				std::fs::remove_dir_all(&self.0).unwrap();
			}
		}
	}

	fn value(size: usize) -> Vec<u8> {
		use rand::RngCore;
		let mut result = vec![0u8; size];
		rand::thread_rng().fill_bytes(&mut result);
		result
	}

	#[test]
	fn open_fresh() {
		let dir = TempDir::new("open_fresh");
		let store = dir.store();
		assert_eq!(store.id_count(), 0);
		assert_eq!(store.log_size(), 0);
		assert!(store.capacity() > 0);
		assert_eq!(store.index_growth_count(), 1);
		store.close().unwrap();
	}

	#[test]
	fn put_get_roundtrip() {
		let dir = TempDir::new("put_get_roundtrip");
		let store = dir.store();
		assert_eq!(store.make_id().unwrap(), 0);
		assert_eq!(store.put(0, &[0x01, 0x02, 0x03, 0x04], 0).unwrap(), 1);

		let (bytes, rev) = store.get(0).unwrap();
		assert_eq!(bytes, vec![0x01, 0x02, 0x03, 0x04]);
		assert_eq!(rev, 1);
		assert_eq!(store.log_size(), 20);
		store.close().unwrap();
		assert_eq!(dir.log_file_size(), 20);
	}

	#[test]
	fn conflict_detection() {
		let dir = TempDir::new("conflict_detection");
		let store = dir.store();
		store.make_id().unwrap();
		store.put(0, &[1, 2, 3, 4], 0).unwrap();

		let (a_bytes, a_rev) = store.get(0).unwrap();
		let (b_bytes, b_rev) = store.get(0).unwrap();
		assert_eq!(a_rev, 1);
		assert_eq!(b_rev, 1);

		assert_eq!(store.put(0, &a_bytes, a_rev).unwrap(), 2);
		let size_after = store.log_size();
		assert!(matches!(store.put(0, &b_bytes, b_rev), Err(Error::Conflict)));
		// The conflicting put must not have appended anything.
		assert_eq!(store.log_size(), size_after);
		assert_eq!(store.get(0).unwrap().1, 2);
	}

	#[test]
	fn persists_across_reopen() {
		let dir = TempDir::new("persists_across_reopen");
		let store = dir.store();
		for i in 0u32..1000 {
			let id = store.make_id().unwrap();
			assert_eq!(id as u32, i);
			store.put(id, &i.to_le_bytes(), 0).unwrap();
		}
		assert_eq!(store.log_size(), 1000 * 20);
		store.close().unwrap();

		let store = dir.store();
		assert_eq!(store.id_count(), 1000);
		assert!(store.capacity() >= 1000);
		assert_eq!(store.log_size(), 20_000);
		for i in 0u32..1000 {
			let (bytes, rev) = store.get(i as Id).unwrap();
			assert_eq!(bytes, i.to_le_bytes().to_vec());
			assert_eq!(rev, 1);
		}
		store.close().unwrap();
	}

	#[test]
	fn remove() {
		let dir = TempDir::new("remove");
		let store = dir.store();
		store.make_id().unwrap();
		store.make_id().unwrap();
		store.put(0, &[1], 0).unwrap();
		store.put(1, &[2], 0).unwrap();

		store.remove(0).unwrap();
		assert!(matches!(store.get(0), Err(Error::NotFound)));
		// Removing an id twice is allowed and must not disturb its neighbors.
		store.remove(0).unwrap();
		assert_eq!(store.get(1).unwrap().0, vec![2]);

		assert!(matches!(store.remove(u64::MAX), Err(Error::InvalidParameter(_))));

		// Removed ids stay removed after reopen and are never handed out again.
		store.close().unwrap();
		let store = dir.store();
		assert!(matches!(store.get(0), Err(Error::NotFound)));
		assert_eq!(store.make_id().unwrap(), 2);
	}

	#[test]
	fn put_after_remove_conflicts() {
		let dir = TempDir::new("put_after_remove_conflicts");
		let store = dir.store();
		store.make_id().unwrap();
		store.put(0, &[1], 0).unwrap();
		store.remove(0).unwrap();
		// The tombstone entry decodes to the all-ones revision, so no caller
		// revision can match it.
		assert!(matches!(store.put(0, &[2], 1), Err(Error::Conflict)));
	}

	#[test]
	fn get_unwritten_id() {
		let dir = TempDir::new("get_unwritten_id");
		let store = dir.store();
		store.make_id().unwrap();
		assert!(matches!(store.get(0), Err(Error::NotFound)));
		// Same for ids inside capacity that were never allocated.
		assert!(matches!(store.get(5), Err(Error::NotFound)));
	}

	#[test]
	fn invalid_put() {
		let dir = TempDir::new("invalid_put");
		let store = dir.store();
		store.make_id().unwrap();
		assert!(matches!(store.put(0, &[], 0), Err(Error::InvalidParameter(_))));
		assert!(matches!(
			store.put(u64::MAX, &[1], 0),
			Err(Error::InvalidParameter(_))
		));
	}

	#[test]
	fn growth_accounting() {
		let dir = TempDir::new("growth_accounting");
		let store = dir.store();
		assert_eq!(store.index_growth_count(), 1);
		for _ in 0..GROW_BY {
			store.make_id().unwrap();
		}
		assert_eq!(store.index_growth_count(), 2);
		assert_eq!(store.capacity(), 2 * GROW_BY);
		let index_size = std::fs::metadata(dir.0.join("log-index")).unwrap().len();
		assert_eq!(index_size, 8 + 2 * GROW_BY * 8);
	}

	#[test]
	#[cfg(unix)]
	fn detects_tampering() {
		use std::os::unix::fs::FileExt;

		let dir = TempDir::new("detects_tampering");
		let store = dir.store();
		store.make_id().unwrap();
		store.put(0, &value(32), 0).unwrap();
		store.sync().unwrap();

		// Rewrite the id field of the record header behind the store's back.
		let file = std::fs::OpenOptions::new()
			.write(true)
			.open(dir.0.join("log"))
			.unwrap();
		file.write_all_at(&7u64.to_le_bytes(), 0).unwrap();

		assert!(matches!(store.get(0), Err(Error::Tampered)));
	}

	#[test]
	fn larger_values_roundtrip() {
		let dir = TempDir::new("larger_values_roundtrip");
		let store = dir.store();
		let mut expected = Vec::new();
		for size in [1usize, 100, 4096, 1024 * 1024].iter() {
			let id = store.make_id().unwrap();
			let val = value(*size);
			store.put(id, &val, 0).unwrap();
			expected.push((id, val));
		}
		for (id, val) in &expected {
			let (bytes, rev) = store.get(*id).unwrap();
			assert_eq!(&bytes, val);
			assert_eq!(rev, 1);
		}
	}

	#[test]
	fn revisions_accumulate() {
		let dir = TempDir::new("revisions_accumulate");
		let store = dir.store();
		let id = store.make_id().unwrap();
		let mut expected_size = 0;
		for rev in 0u16..10 {
			let val = value(8);
			assert_eq!(store.put(id, &val, rev).unwrap(), rev + 1);
			expected_size += 16 + 8;
			assert_eq!(store.get(id).unwrap(), (val, rev + 1));
		}
		assert_eq!(store.log_size(), expected_size);
	}

	#[test]
	fn concurrent_writers() {
		use std::sync::Arc;

		let dir = TempDir::new("concurrent_writers");
		let store = Arc::new(dir.store());
		let threads: Vec<_> = (0..4u8)
			.map(|tag| {
				let store = store.clone();
				std::thread::spawn(move || {
					for _ in 0..250 {
						let id = store.make_id().unwrap();
						store.put(id, &[tag; 16], 0).unwrap();
					}
				})
			})
			.collect();
		for t in threads {
			t.join().unwrap();
		}

		assert_eq!(store.id_count(), 1000);
		assert_eq!(store.log_size(), 1000 * 32);
		for id in 0..1000 {
			let (bytes, rev) = store.get(id).unwrap();
			assert_eq!(rev, 1);
			assert_eq!(bytes.len(), 16);
			assert!(bytes.iter().all(|b| *b == bytes[0]));
		}
	}

	#[test]
	fn sync_policies() {
		let dir = TempDir::new("sync_policies");
		let mut options = Options::with_path(&dir.0.join("log"));
		options.sync_on_close = false;
		let store = Store::open_with_options(&options).unwrap();
		let id = store.make_id().unwrap();
		store.put(id, &[1, 2, 3], 0).unwrap();
		store.sync().unwrap();
		store.close().unwrap();

		let store = dir.store();
		assert_eq!(store.get(id).unwrap().0, vec![1, 2, 3]);
	}
}
