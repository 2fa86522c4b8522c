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

// Store-agnostic stress workload: timed put and get loops over opaque values
// with a configurable sync policy. The binary supplies the store behind the
// `Db` trait.

use std::time::{Duration, Instant};
use rand::rngs::SmallRng;
use rand::{Rng, RngCore, SeedableRng};

/// Minimal surface the workload needs from a store. Errors are fatal in a
/// benchmark, so the adapter is expected to panic on them.
pub trait Db {
	fn make_id(&self) -> u64;
	fn put(&self, id: u64, value: &[u8], rev: u16);
	fn get(&self, id: u64) -> Vec<u8>;
	fn sync(&self);
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum SyncPolicy {
	Never,
	EveryPut,
	EverySecond,
}

#[derive(Clone, Debug)]
pub struct Args {
	pub puts: u64,
	pub gets: u64,
	pub value_size: usize,
	pub sync: SyncPolicy,
	pub seed: u64,
}

impl Default for Args {
	fn default() -> Args {
		Args {
			puts: 2_000_000,
			gets: 1_000_000,
			value_size: 1024,
			sync: SyncPolicy::Never,
			seed: 91,
		}
	}
}

impl Args {
	/// Parse `--puts N --gets N --size N --sync never|put|second --seed N`
	/// from the process arguments, falling back to the defaults above.
	pub fn from_env() -> Args {
		let mut args = Args::default();
		let mut iter = std::env::args().skip(1);
		while let Some(flag) = iter.next() {
			let value = iter.next().unwrap_or_else(|| {
				panic!("missing value for {}", flag);
			});
			match flag.as_str() {
				"--puts" => args.puts = value.parse().expect("--puts expects a number"),
				"--gets" => args.gets = value.parse().expect("--gets expects a number"),
				"--size" => args.value_size = value.parse().expect("--size expects a number"),
				"--seed" => args.seed = value.parse().expect("--seed expects a number"),
				"--sync" => {
					args.sync = match value.as_str() {
						"never" => SyncPolicy::Never,
						"put" => SyncPolicy::EveryPut,
						"second" => SyncPolicy::EverySecond,
						other => panic!("unknown sync policy: {}", other),
					}
				}
				other => panic!("unknown argument: {}", other),
			}
		}
		args
	}
}

pub fn init_logging() {
	env_logger::init();
}

fn rate(ops: u64, elapsed: Duration) -> u64 {
	(ops as f64 / elapsed.as_secs_f64()) as u64
}

/// Allocate and put `args.puts` fresh ids, applying the sync policy. Returns
/// the number of ids written.
pub fn run_puts(db: &dyn Db, args: &Args) -> u64 {
	log::info!("Starting put workload: {:?}", args);
	let mut rng = SmallRng::seed_from_u64(args.seed);
	let mut value = vec![0u8; args.value_size];
	rng.fill_bytes(&mut value);

	let mut syncs = 0u64;
	let mut last_sync = Instant::now();
	let start = Instant::now();
	for _ in 0..args.puts {
		let id = db.make_id();
		db.put(id, &value, 0);
		match args.sync {
			SyncPolicy::Never => (),
			SyncPolicy::EveryPut => {
				db.sync();
				syncs += 1;
			}
			SyncPolicy::EverySecond => {
				if last_sync.elapsed() >= Duration::from_secs(1) {
					db.sync();
					last_sync = Instant::now();
					syncs += 1;
				}
			}
		}
	}
	let elapsed = start.elapsed();
	println!("{} puts / second ({} puts, {} syncs)", rate(args.puts, elapsed), args.puts, syncs);
	args.puts
}

/// Random gets over the id range written by `run_puts`.
pub fn run_gets(db: &dyn Db, args: &Args, id_range: u64) {
	let mut rng = SmallRng::seed_from_u64(args.seed.wrapping_add(1));
	let start = Instant::now();
	for _ in 0..args.gets {
		let id = rng.gen_range(0, id_range);
		let value = db.get(id);
		assert_eq!(value.len(), args.value_size);
	}
	let elapsed = start.elapsed();
	println!("{} gets / second ({} gets)", rate(args.gets, elapsed), args.gets);
}
