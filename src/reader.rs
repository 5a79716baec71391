// SPDX-License-Identifier: Apache-2.0 OR MIT
use crate::{
	error::{Error, Result},
	header::{Entries, File as FileEntry, Header},
	pickle,
};
use log::{info, warn};
use std::{
	fs,
	io::{self, BufReader},
	path::{Path, PathBuf},
	sync::{
		atomic::{AtomicBool, Ordering},
		Arc,
	},
};

/// An opened archive: the parsed header, the payload base, and the
/// underlying store.
///
/// Only the framing and header JSON are read at open time; file contents
/// are fetched on demand with positional reads. There is no shared read
/// cursor, so any number of threads may extract entries from the same
/// reader concurrently.
///
/// ```rust,no_run
/// use asarkit::{AsarReader, Result};
///
/// fn main() -> Result<()> {
/// 	let asar = AsarReader::open("archive.asar")?;
/// 	for (path, _) in asar.entries() {
/// 		println!("{}", path.display());
/// 	}
/// 	Ok(())
/// }
/// ```
#[derive(Debug)]
pub struct AsarReader {
	path: PathBuf,
	store: fs::File,
	header: Header,
	payload_base: u64,
	header_json_len: usize,
	unpacked_dir: PathBuf,
}

impl AsarReader {
	/// Opens an archive and parses its header. The sidecar root for
	/// unpacked entries is derived here, once, from the archive path:
	/// `<archive>.unpacked`.
	pub fn open(path: impl AsRef<Path>) -> Result<Self> {
		let path = path.as_ref();
		let store = fs::File::open(path)?;
		let mut data = BufReader::new(store);
		let (json, payload_base) = pickle::decode(&mut data)?;
		let header = Header::parse(&json)?;
		Ok(Self {
			unpacked_dir: sidecar_path(path),
			path: path.to_path_buf(),
			store: data.into_inner(),
			header,
			payload_base,
			header_json_len: json.len(),
		})
	}

	/// The parsed archive tree.
	#[inline]
	pub const fn header(&self) -> &Header {
		&self.header
	}

	/// Byte offset in the store where file offset 0 begins.
	#[inline]
	pub const fn payload_base(&self) -> u64 {
		self.payload_base
	}

	/// The path the archive was opened from.
	#[inline]
	pub fn path(&self) -> &Path {
		&self.path
	}

	/// The sidecar directory holding unpacked entries.
	#[inline]
	pub fn unpacked_dir(&self) -> &Path {
		&self.unpacked_dir
	}

	#[inline]
	pub(crate) const fn header_json_len(&self) -> usize {
		self.header_json_len
	}

	#[inline]
	pub(crate) const fn store(&self) -> &fs::File {
		&self.store
	}

	/// All entries, lazily, in payload layout order.
	pub fn entries(&self) -> Entries<'_> {
		self.header.entries()
	}

	/// Reads one file entry's contents into memory.
	pub fn read(&self, path: impl AsRef<Path>) -> Result<Vec<u8>> {
		let path = path.as_ref();
		let file = self.file_entry(path)?;
		self.read_file(path, file)
	}

	/// Extracts a single entry to `destination`. Files keep their
	/// executable bit (as a mode bit, where the platform has one), links
	/// are materialized as symlinks, and stored digests are verified when
	/// the options ask for it.
	pub fn extract_entry(
		&self,
		path: impl AsRef<Path>,
		destination: impl AsRef<Path>,
		options: &ExtractOptions,
	) -> Result<()> {
		let path = path.as_ref();
		match self.header.get(path) {
			Some(Header::File(file)) => {
				self.extract_file(path, file, destination.as_ref(), options)
			}
			Some(Header::Link { link }) => extract_link(link, destination.as_ref()),
			_ => Err(Error::EntryNotFound(path.to_path_buf())),
		}
	}

	/// Extracts every entry under `destination`.
	///
	/// A failing entry is recorded in the report and extraction moves on;
	/// only opening the archive itself is fatal. The options' cancellation
	/// token is checked between entries, and a cancelled run returns the
	/// partial report accumulated so far.
	pub fn extract_all(
		&self,
		destination: impl AsRef<Path>,
		options: &ExtractOptions,
	) -> Result<ExtractReport> {
		let destination = destination.as_ref();
		fs::create_dir_all(destination)?;
		let mut report = ExtractReport::default();
		for (path, node) in self.entries() {
			if options.is_cancelled() {
				report.cancelled = true;
				break;
			}
			let out_path = destination.join(&path);
			let result = match node {
				Header::Directory { .. } => fs::create_dir_all(&out_path).map_err(Error::from),
				Header::File(file) => self.extract_file(&path, file, &out_path, options),
				Header::Link { link } => extract_link(link, &out_path),
			};
			match result {
				Ok(()) => {
					info!("extracted {}", path.display());
					report.extracted.push(path);
				}
				Err(err) => {
					warn!("failed to extract {}: {err}", path.display());
					report.failed.push((path, err));
				}
			}
		}
		Ok(report)
	}

	fn file_entry(&self, path: &Path) -> Result<&FileEntry> {
		match self.header.get(path) {
			Some(Header::File(file)) => Ok(file),
			_ => Err(Error::EntryNotFound(path.to_path_buf())),
		}
	}

	fn read_file(&self, path: &Path, file: &FileEntry) -> Result<Vec<u8>> {
		if file.unpacked() {
			return fs::read(self.unpacked_dir.join(path)).map_err(Error::from);
		}
		let offset = file.offset().ok_or_else(|| {
			Error::CorruptHeader(format!("packed file {} has no offset", path.display()))
		})?;
		let start = self.payload_base + offset;
		let end = start.checked_add(file.size()).ok_or(Error::Truncated)?;
		if end > self.store.metadata()?.len() {
			return Err(Error::Truncated);
		}
		let mut data = vec![0_u8; file.size() as usize];
		read_exact_at(&self.store, &mut data, start)?;
		Ok(data)
	}

	fn extract_file(
		&self,
		path: &Path,
		file: &FileEntry,
		destination: &Path,
		options: &ExtractOptions,
	) -> Result<()> {
		let data = self.read_file(path, file)?;
		if options.check_integrity {
			if let Some(integrity) = file.integrity() {
				integrity.verify(path, &data)?;
			}
		}
		if let Some(parent) = destination.parent() {
			fs::create_dir_all(parent)?;
		}
		fs::write(destination, &data)?;
		#[cfg(unix)]
		if file.executable() {
			use std::os::unix::fs::PermissionsExt;
			let mut permissions = fs::metadata(destination)?.permissions();
			permissions.set_mode(permissions.mode() | 0o111);
			fs::set_permissions(destination, permissions)?;
		}
		Ok(())
	}
}

/// Options for extraction.
#[derive(Debug, Clone, Default)]
pub struct ExtractOptions {
	/// Verify stored digests while extracting; a mismatch fails the entry.
	pub check_integrity: bool,
	/// Cooperative cancellation token, checked at each entry boundary.
	pub cancel: Option<Arc<AtomicBool>>,
}

impl ExtractOptions {
	fn is_cancelled(&self) -> bool {
		self.cancel
			.as_ref()
			.is_some_and(|token| token.load(Ordering::Relaxed))
	}
}

/// What an [`AsarReader::extract_all`] run accomplished.
#[derive(Debug, Clone, Default)]
pub struct ExtractReport {
	/// Entries written out, in extraction order.
	pub extracted: Vec<PathBuf>,
	/// Entries that failed, with the error that stopped each one.
	pub failed: Vec<(PathBuf, Error)>,
	/// Whether the run stopped early on the cancellation token.
	pub cancelled: bool,
}

impl ExtractReport {
	/// True when every entry was extracted and the run was not cancelled.
	pub fn is_complete(&self) -> bool {
		self.failed.is_empty() && !self.cancelled
	}
}

/// The sidecar directory tied to an archive path by naming convention:
/// `<archive>.unpacked`.
pub(crate) fn sidecar_path(archive: &Path) -> PathBuf {
	let mut path = archive.as_os_str().to_os_string();
	path.push(".unpacked");
	PathBuf::from(path)
}

#[cfg(unix)]
pub(crate) fn read_exact_at(file: &fs::File, buf: &mut [u8], offset: u64) -> io::Result<()> {
	use std::os::unix::fs::FileExt;
	file.read_exact_at(buf, offset)
}

#[cfg(windows)]
pub(crate) fn read_exact_at(
	file: &fs::File,
	mut buf: &mut [u8],
	mut offset: u64,
) -> io::Result<()> {
	use std::os::windows::fs::FileExt;
	while !buf.is_empty() {
		match file.seek_read(buf, offset)? {
			0 => {
				return Err(io::Error::new(
					io::ErrorKind::UnexpectedEof,
					"failed to fill whole buffer",
				))
			}
			n => {
				buf = &mut buf[n..];
				offset += n as u64;
			}
		}
	}
	Ok(())
}

#[cfg(unix)]
fn extract_link(target: &str, destination: &Path) -> Result<()> {
	if let Some(parent) = destination.parent() {
		fs::create_dir_all(parent)?;
	}
	if destination.symlink_metadata().is_ok() {
		fs::remove_file(destination)?;
	}
	std::os::unix::fs::symlink(target, destination).map_err(Error::from)
}

#[cfg(not(unix))]
fn extract_link(_target: &str, destination: &Path) -> Result<()> {
	Err(Error::Io(io::Error::new(
		io::ErrorKind::Unsupported,
		format!("cannot materialize symlink at {}", destination.display()),
	)))
}
