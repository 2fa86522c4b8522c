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

/// Outcome of every public store operation. One variant per error code;
/// `Display` yields the short human-readable description of each.
#[derive(Debug)]
pub enum Error {
	/// Filesystem or mmap failure, after transparent EINTR retry.
	Io(std::io::Error),
	/// Allocation failure for a value buffer.
	OutOfMemory,
	/// Malformed argument: empty or oversized value, out-of-range id.
	InvalidParameter(&'static str),
	/// Lookup of a never-written or removed id.
	NotFound,
	/// Put with a stale revision.
	Conflict,
	/// Log header id does not match the id the index pointed at.
	Tampered,
}

pub type Result<T> = std::result::Result<T, Error>;

impl From<std::io::Error> for Error {
	fn from(e: std::io::Error) -> Error {
		Error::Io(e)
	}
}

impl std::fmt::Display for Error {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self {
			Error::Io(e) => write!(f, "input/output error: {}", e),
			Error::OutOfMemory => write!(f, "out of memory"),
			Error::InvalidParameter(what) => write!(f, "bad argument(s): {}", what),
			Error::NotFound => write!(f, "no such entity"),
			Error::Conflict => write!(f, "revision conflict"),
			Error::Tampered => write!(f, "data was tampered with"),
		}
	}
}

impl std::error::Error for Error {
	fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
		match self {
			Error::Io(e) => Some(e),
			_ => None,
		}
	}
}
