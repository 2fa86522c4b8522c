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
use logstore::Store;

#[cfg(all(not(windows), not(target_env = "musl")))]
#[global_allocator]
static ALLOC: jemallocator::Jemalloc = jemallocator::Jemalloc;

struct BenchStore(Store);

impl store_bench::Db for BenchStore {
	fn make_id(&self) -> u64 {
		self.0.make_id().unwrap()
	}

	fn put(&self, id: u64, value: &[u8], rev: u16) {
		self.0.put(id, value, rev).unwrap();
	}

	fn get(&self, id: u64) -> Vec<u8> {
		self.0.get(id).unwrap().0
	}

	fn sync(&self) {
		self.0.sync().unwrap();
	}
}

fn main() {
	store_bench::init_logging();
	let args = store_bench::Args::from_env();

	let path = Path::new("stress-log");
	let _ = std::fs::remove_file(path);
	let _ = std::fs::remove_file("stress-log-index");

	let db = BenchStore(Store::open(path).unwrap());
	let written = store_bench::run_puts(&db, &args);
	store_bench::run_gets(&db, &args, written);
	println!("{} index file growths performed", db.0.index_growth_count());
	db.0.close().unwrap();
}
