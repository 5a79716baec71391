// SPDX-License-Identifier: Apache-2.0 OR MIT
use crate::{
	error::{Error, Result},
	pickle,
};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_with::{hex::Hex, serde_as, DisplayFromStr};
use std::{
	io::Read,
	path::{Component, Path, PathBuf},
};

/// Deepest directory nesting accepted from an archive. Anything deeper is
/// treated as a corrupt header rather than recursed into.
const MAX_DEPTH: usize = 64;

/// Largest block size accepted in an integrity record.
const MAX_BLOCK_SIZE: usize = 512 * 1024 * 1024;

/// A node in the archive tree: a regular file, a directory of named
/// children, or a symbolic link recorded as metadata.
///
/// Directory children keep their stored order. That order determines the
/// payload layout, so re-serializing a parsed header reproduces it
/// verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Header {
	Directory { files: IndexMap<String, Self> },
	File(File),
	Link { link: String },
}

impl Header {
	pub(crate) fn new_directory() -> Self {
		Self::Directory {
			files: IndexMap::new(),
		}
	}

	/// Reads the framed header from the start of an archive, returning the
	/// validated tree and the payload base offset.
	pub fn read<R: Read>(data: &mut R) -> Result<(Self, u64)> {
		let (json, payload_base) = pickle::decode(data)?;
		Ok((Self::parse(&json)?, payload_base))
	}

	/// Parses and validates a header JSON string.
	///
	/// Validation is done once, here; everything downstream works on a
	/// well-formed tree. Rejected as corrupt: a non-directory root, entry
	/// names that are empty, `.`/`..`, or contain a path separator, packed
	/// files without an offset, integrity records with a zero, oversized,
	/// or inconsistent block layout, and nesting deeper than [`MAX_DEPTH`].
	pub fn parse(json: &str) -> Result<Self> {
		let header = serde_json::from_str::<Self>(json)
			.map_err(|err| Error::CorruptHeader(format!("invalid header JSON: {err}")))?;
		if !matches!(header, Self::Directory { .. }) {
			return Err(Error::CorruptHeader(
				"root entry must be a directory".to_owned(),
			));
		}
		header.validate(&PathBuf::new(), 0)?;
		Ok(header)
	}

	/// Serializes the tree back to its compact JSON form, preserving child
	/// order and the decimal-string encoding of sizes and offsets.
	pub fn to_json(&self) -> Result<String> {
		serde_json::to_string(self).map_err(Error::from)
	}

	fn validate(&self, path: &Path, depth: usize) -> Result<()> {
		if depth > MAX_DEPTH {
			return Err(Error::CorruptHeader(format!(
				"directory nesting exceeds {MAX_DEPTH} levels"
			)));
		}
		match self {
			Self::Directory { files } => {
				for (name, child) in files {
					if name.is_empty()
						|| name == "." || name == ".."
						|| name.contains(['/', '\\'])
					{
						return Err(Error::CorruptHeader(format!(
							"illegal entry name {name:?} in {}",
							path.display()
						)));
					}
					child.validate(&path.join(name), depth + 1)?;
				}
			}
			Self::File(file) => {
				if !file.unpacked && file.offset.is_none() {
					return Err(Error::CorruptHeader(format!(
						"packed file {} has no offset",
						path.display()
					)));
				}
				if let Some(integrity) = &file.integrity {
					if integrity.block_size == 0 || integrity.block_size > MAX_BLOCK_SIZE {
						return Err(Error::CorruptHeader(format!(
							"unreasonable block size {} for {}",
							integrity.block_size,
							path.display()
						)));
					}
					let expected = file.size.div_ceil(integrity.block_size as u64);
					if integrity.blocks.len() as u64 != expected {
						return Err(Error::CorruptHeader(format!(
							"{} declares {} blocks, expected {expected}",
							path.display(),
							integrity.blocks.len()
						)));
					}
				}
			}
			Self::Link { .. } => {}
		}
		Ok(())
	}

	/// Resolves a relative path to a node. Symlinks are leaves and are
	/// never traversed, so a path through one resolves to nothing.
	pub fn get(&self, path: impl AsRef<Path>) -> Option<&Self> {
		let mut node = self;
		for component in path.as_ref().components() {
			let name = match component {
				Component::Normal(name) => name.to_str()?,
				Component::CurDir => continue,
				_ => return None,
			};
			node = match node {
				Self::Directory { files } => files.get(name)?,
				_ => return None,
			};
		}
		Some(node)
	}

	pub(crate) fn get_mut(&mut self, path: &Path) -> Option<&mut Self> {
		let mut node = self;
		for component in path.components() {
			let name = match component {
				Component::Normal(name) => name.to_str()?,
				Component::CurDir => continue,
				_ => return None,
			};
			node = match node {
				Self::Directory { files } => files.get_mut(name)?,
				_ => return None,
			};
		}
		Some(node)
	}

	/// Lazily walks the tree in pre-order: a directory is yielded before
	/// its children, children in stored map order. This is exactly the
	/// order payload bytes are laid out in during a build.
	pub fn entries(&self) -> Entries<'_> {
		let stack = match self {
			Self::Directory { files } => vec![(PathBuf::new(), files.iter())],
			_ => Vec::new(),
		};
		Entries { stack }
	}
}

/// Pre-order iterator over `(relative path, node)` pairs, returned by
/// [`Header::entries`].
pub struct Entries<'a> {
	stack: Vec<(PathBuf, indexmap::map::Iter<'a, String, Header>)>,
}

impl<'a> Iterator for Entries<'a> {
	type Item = (PathBuf, &'a Header);

	fn next(&mut self) -> Option<Self::Item> {
		loop {
			let (path, node) = {
				let (dir, iter) = self.stack.last_mut()?;
				match iter.next() {
					Some((name, node)) => (dir.join(name), node),
					None => {
						self.stack.pop();
						continue;
					}
				}
			};
			if let Header::Directory { files } = node {
				self.stack.push((path.clone(), files.iter()));
			}
			return Some((path, node));
		}
	}
}

/// A regular file entry.
///
/// `size` and `offset` travel as decimal strings in the JSON so archives
/// past safe-integer magnitudes survive without precision loss. `offset`
/// is absent on unpacked entries, whose bytes live in the sidecar
/// directory next to the archive.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct File {
	#[serde_as(as = "DisplayFromStr")]
	pub(crate) size: u64,
	#[serde_as(as = "Option<DisplayFromStr>")]
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub(crate) offset: Option<u64>,
	#[serde(default = "default_false", skip_serializing_if = "is_false")]
	pub(crate) executable: bool,
	#[serde(default = "default_false", skip_serializing_if = "is_false")]
	pub(crate) unpacked: bool,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub(crate) integrity: Option<FileIntegrity>,
}

impl File {
	pub(crate) const fn new(size: u64, executable: bool) -> Self {
		Self {
			size,
			offset: None,
			executable,
			unpacked: false,
			integrity: None,
		}
	}

	/// The total size of the file in bytes.
	#[inline]
	pub const fn size(&self) -> u64 {
		self.size
	}

	/// The offset into the payload region, absent for unpacked files.
	#[inline]
	pub const fn offset(&self) -> Option<u64> {
		self.offset
	}

	/// Whether this file is executable or not.
	#[inline]
	pub const fn executable(&self) -> bool {
		self.executable
	}

	/// Whether the file's bytes are stored outside the archive, in the
	/// sidecar directory.
	#[inline]
	pub const fn unpacked(&self) -> bool {
		self.unpacked
	}

	/// Integrity details of the file, such as hashes.
	#[inline]
	pub const fn integrity(&self) -> Option<&FileIntegrity> {
		self.integrity.as_ref()
	}
}

/// Content digests stored with a file entry: a whole-file hash plus one
/// hash per fixed-size block.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileIntegrity {
	pub(crate) algorithm: HashAlgorithm,
	#[serde_as(as = "Hex")]
	pub(crate) hash: Vec<u8>,
	pub(crate) block_size: usize,
	#[serde_as(as = "Vec<Hex>")]
	pub(crate) blocks: Vec<Vec<u8>>,
}

impl FileIntegrity {
	/// The hashing algorithm used to calculate the hashes.
	#[inline]
	pub const fn algorithm(&self) -> HashAlgorithm {
		self.algorithm
	}

	/// The hash of the whole file.
	#[inline]
	pub fn hash(&self) -> &[u8] {
		&self.hash
	}

	/// The size of each hashed block.
	#[inline]
	pub const fn block_size(&self) -> usize {
		self.block_size
	}

	/// The hash of each block, in file order.
	#[inline]
	pub fn blocks(&self) -> &[Vec<u8>] {
		&self.blocks
	}
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[non_exhaustive]
pub enum HashAlgorithm {
	/// The SHA-256 hashing algorithm
	#[serde(rename = "SHA256")]
	Sha256,
}

const fn is_false(b: &bool) -> bool {
	!*b
}

const fn default_false() -> bool {
	false
}
