// SPDX-License-Identifier: Apache-2.0 OR MIT
use serde::de::Error as DeError;
use serde_json::Error as JsonError;
use std::{io::Error as IoError, path::PathBuf};
use thiserror::Error as ThisError;

#[derive(Debug, ThisError)]
pub enum Error {
	#[error("I/O error: {0}")]
	Io(#[from] IoError),
	#[error("JSON error: {0}")]
	Json(#[from] JsonError),
	/// The archive framing or header JSON is malformed. No partial tree is
	/// produced once this is raised.
	#[error("corrupt header: {0}")]
	CorruptHeader(String),
	/// A file's recorded byte range extends past the end of the archive.
	#[error("archive is truncated")]
	Truncated,
	/// The path does not exist in the archive, or names a directory or
	/// symlink where a regular file is required.
	#[error("no such entry in archive: {}", .0.display())]
	EntryNotFound(PathBuf),
	/// A stored digest did not match the actual contents. `block` is the
	/// 1-based index of the failing block, or `None` for the whole-file
	/// hash.
	#[error(
		"hash mismatch for {}{}: expected {}, got {}",
		file.display(),
		block.map(|idx| format!(" (block {idx})")).unwrap_or_default(),
		hex::encode(expected),
		hex::encode(actual)
	)]
	IntegrityMismatch {
		file: PathBuf,
		block: Option<usize>,
		expected: Vec<u8>,
		actual: Vec<u8>,
	},
	#[error("source directory not found: {}", .0.display())]
	SourceNotFound(PathBuf),
	#[error("directory cycle detected at {}", .0.display())]
	SymlinkLoop(PathBuf),
	#[error("invalid pattern: {0}")]
	InvalidPattern(String),
}

impl Clone for Error {
	fn clone(&self) -> Self {
		match self {
			Self::Io(io_err) => Self::Io(IoError::new(io_err.kind(), io_err.to_string())),
			Self::Json(json_err) => Self::Json(JsonError::custom(json_err.to_string())),
			Self::CorruptHeader(reason) => Self::CorruptHeader(reason.clone()),
			Self::Truncated => Self::Truncated,
			Self::EntryNotFound(path) => Self::EntryNotFound(path.clone()),
			Self::IntegrityMismatch {
				file,
				block,
				expected,
				actual,
			} => Self::IntegrityMismatch {
				file: file.clone(),
				block: *block,
				expected: expected.clone(),
				actual: actual.clone(),
			},
			Self::SourceNotFound(path) => Self::SourceNotFound(path.clone()),
			Self::SymlinkLoop(path) => Self::SymlinkLoop(path.clone()),
			Self::InvalidPattern(reason) => Self::InvalidPattern(reason.clone()),
		}
	}
}

impl PartialEq for Error {
	fn eq(&self, other: &Self) -> bool {
		match (self, other) {
			(Self::Io(io_err), Self::Io(other_io_err)) => {
				io_err.kind() == other_io_err.kind()
					&& io_err.raw_os_error() == other_io_err.raw_os_error()
					&& io_err.to_string() == other_io_err.to_string()
			}
			(Self::Json(json_err), Self::Json(other_json_err)) => {
				json_err.line() == other_json_err.line()
					&& json_err.column() == other_json_err.column()
					&& json_err.classify() == other_json_err.classify()
					&& json_err.to_string() == other_json_err.to_string()
			}
			(Self::CorruptHeader(reason), Self::CorruptHeader(other_reason)) => {
				reason == other_reason
			}
			(Self::Truncated, Self::Truncated) => true,
			(Self::EntryNotFound(path), Self::EntryNotFound(other_path)) => path == other_path,
			(
				Self::IntegrityMismatch {
					file,
					block,
					expected,
					actual,
				},
				Self::IntegrityMismatch {
					file: other_file,
					block: other_block,
					expected: other_expected,
					actual: other_actual,
				},
			) => {
				file == other_file
					&& block == other_block
					&& expected == other_expected
					&& actual == other_actual
			}
			(Self::SourceNotFound(path), Self::SourceNotFound(other_path)) => path == other_path,
			(Self::SymlinkLoop(path), Self::SymlinkLoop(other_path)) => path == other_path,
			(Self::InvalidPattern(reason), Self::InvalidPattern(other_reason)) => {
				reason == other_reason
			}
			_ => false,
		}
	}
}

pub type Result<T> = std::result::Result<T, Error>;
