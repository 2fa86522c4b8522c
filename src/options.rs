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

use std::path::{Path, PathBuf};

/// Store configuration.
#[derive(Clone, Debug)]
pub struct Options {
	/// Path of the log file. The index file lives next to it at
	/// `path + "-index"`.
	pub path: PathBuf,
	/// Sync both files before closing. Defaults to on; callers that sync on
	/// their own schedule can turn it off.
	pub sync_on_close: bool,
}

impl Options {
	pub fn with_path(path: &Path) -> Options {
		Options {
			path: path.into(),
			sync_on_close: true,
		}
	}

	pub fn index_path(&self) -> PathBuf {
		let mut name = self.path.file_name().unwrap_or_default().to_os_string();
		name.push("-index");
		self.path.with_file_name(name)
	}
}
