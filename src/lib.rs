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

//! Append-only key-value store for values keyed by store-assigned ids.
//!
//! A store is a pair of files: an append-only log holding the values and a
//! sparse index file mapping each id to the revision and log offset of its
//! current record. The index is memory-mapped when possible and falls back
//! to positional file i/o when mapping fails. Writes append to the log and
//! update one index slot; reads follow the slot into the log. Durability is
//! opt-in through [`Store::sync`].

mod error;
mod index;
mod log;
mod options;
mod store;

pub use crate::error::{Error, Result};
pub use crate::index::{Id, Revision};
pub use crate::log::Value;
pub use crate::options::Options;
pub use crate::store::{Store, MAX_VALUE_SIZE};
