// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Targeted replacement of one entry's contents in an existing archive.
//!
//! Content of the same byte length is overwritten in place, which touches
//! only the affected payload range (plus the header when digests must be
//! refreshed). Content of a different length forces a full rewrite: every
//! packed file laid out after the target shifts by the size delta and the
//! whole container is rebuilt through a temporary file.

use crate::{
	error::{Error, Result},
	header::{FileIntegrity, Header},
	pickle,
	reader::{read_exact_at, AsarReader},
};
use log::info;
use std::{
	collections::HashMap,
	fs,
	io::{self, BufWriter, Seek, SeekFrom, Write},
	path::{Path, PathBuf},
};
use tempfile::NamedTempFile;

const COPY_CHUNK: usize = 4 * 1024 * 1024;

/// How [`replace_entry`] carried out a replacement, so callers can tell
/// the cheap outcome from the expensive one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplaceOutcome {
	/// Only the affected byte range (and at most the header) was
	/// overwritten.
	InPlace,
	/// The container was rewritten with shifted offsets.
	Rewritten,
}

/// Replaces the contents of the file entry at `relative_path` inside the
/// archive at `archive_path` with the bytes of `new_content_path`.
///
/// Every other entry's content is left byte-identical; only offsets may
/// move, and only on the rewrite path. Fails with [`Error::EntryNotFound`]
/// when the path is absent or names a directory or link.
pub fn replace_entry(
	archive_path: impl AsRef<Path>,
	relative_path: impl AsRef<Path>,
	new_content_path: impl AsRef<Path>,
) -> Result<ReplaceOutcome> {
	let archive_path = archive_path.as_ref();
	let rel = relative_path.as_ref();
	let asar = AsarReader::open(archive_path)?;
	let entry = match asar.header().get(rel) {
		Some(Header::File(file)) => file.clone(),
		_ => return Err(Error::EntryNotFound(rel.to_path_buf())),
	};
	let data = fs::read(new_content_path.as_ref())?;
	let new_len = data.len() as u64;
	let delta = new_len as i128 - entry.size() as i128;

	// Updated tree value; the reader's own tree is never mutated.
	let mut root = asar.header().clone();
	let Some(Header::File(node)) = root.get_mut(rel) else {
		return Err(Error::EntryNotFound(rel.to_path_buf()));
	};
	node.size = new_len;
	if let Some(old_integrity) = entry.integrity() {
		node.integrity = Some(FileIntegrity::compute(&data, old_integrity.block_size()));
	}

	if entry.unpacked() {
		return replace_unpacked(&asar, rel, &root, &data);
	}

	if delta != 0 {
		let mut seen = false;
		shift_after(&mut root, &PathBuf::new(), rel, delta, &mut seen);
		rewrite_container(&asar, &root, Some((rel, &data)))?;
		info!(
			"replaced {} in {} (rewrite, {delta:+} bytes)",
			rel.display(),
			archive_path.display()
		);
		return Ok(ReplaceOutcome::Rewritten);
	}

	let offset = entry.offset().ok_or_else(|| {
		Error::CorruptHeader(format!("packed file {} has no offset", rel.display()))
	})?;
	let json = root.to_json()?;
	let header_untouched = entry.integrity().is_none();
	if header_untouched || json.len() == asar.header_json_len() {
		let store = open_rw(archive_path)?;
		write_all_at(&store, &data, asar.payload_base() + offset)?;
		if !header_untouched {
			// Fixed-length hex digests keep the header's byte length
			// stable, so the JSON region can be overwritten too.
			write_all_at(&store, json.as_bytes(), pickle::FRAMING_LEN)?;
		}
		store.sync_all()?;
		info!(
			"replaced {} in {} (in place)",
			rel.display(),
			archive_path.display()
		);
		return Ok(ReplaceOutcome::InPlace);
	}

	rewrite_container(&asar, &root, Some((rel, &data)))?;
	info!(
		"replaced {} in {} (rewrite, header resized)",
		rel.display(),
		archive_path.display()
	);
	Ok(ReplaceOutcome::Rewritten)
}

/// Unpacked entries live in the sidecar, so the payload region is never
/// touched; only the header may need a refresh.
fn replace_unpacked(
	asar: &AsarReader,
	rel: &Path,
	root: &Header,
	data: &[u8],
) -> Result<ReplaceOutcome> {
	let out = asar.unpacked_dir().join(rel);
	let dir = match out.parent() {
		Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
		_ => PathBuf::from("."),
	};
	fs::create_dir_all(&dir)?;
	let mut tmp = NamedTempFile::new_in(&dir)?;
	tmp.write_all(data)?;
	tmp.as_file().sync_all()?;
	tmp.persist(&out).map_err(|err| Error::Io(err.error))?;

	let json = root.to_json()?;
	if json.len() == asar.header_json_len() {
		let store = open_rw(asar.path())?;
		write_all_at(&store, json.as_bytes(), pickle::FRAMING_LEN)?;
		store.sync_all()?;
		info!(
			"replaced unpacked {} beside {}",
			rel.display(),
			asar.path().display()
		);
		return Ok(ReplaceOutcome::InPlace);
	}
	rewrite_container(asar, root, None)?;
	info!(
		"replaced unpacked {} beside {} (header resized)",
		rel.display(),
		asar.path().display()
	);
	Ok(ReplaceOutcome::Rewritten)
}

/// Shifts the offset of every packed file visited after `target` in walk
/// order by `delta`. The target itself keeps its offset.
fn shift_after(node: &mut Header, path: &Path, target: &Path, delta: i128, seen: &mut bool) {
	match node {
		Header::Directory { files } => {
			for (name, child) in files.iter_mut() {
				shift_after(child, &path.join(name), target, delta, seen);
			}
		}
		Header::File(file) => {
			if *seen && !file.unpacked() {
				if let Some(offset) = file.offset() {
					file.offset = Some((offset as i128 + delta) as u64);
				}
			}
			if path == target {
				*seen = true;
			}
		}
		Header::Link { .. } => {}
	}
}

/// Rebuilds the whole container into a temporary file next to the archive
/// and atomically replaces it. `replaced` supplies the new bytes for one
/// path; everything else is copied positionally from the old store.
fn rewrite_container(
	asar: &AsarReader,
	root: &Header,
	replaced: Option<(&Path, &[u8])>,
) -> Result<()> {
	let framed = pickle::encode(&root.to_json()?)?;
	let payload_base = framed.len() as u64;
	let old_layout: HashMap<PathBuf, u64> = asar
		.entries()
		.filter_map(|(path, node)| match node {
			Header::File(file) if !file.unpacked() => {
				file.offset().map(|offset| (path, offset))
			}
			_ => None,
		})
		.collect();

	let parent = match asar.path().parent() {
		Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
		_ => PathBuf::from("."),
	};
	let mut tmp = NamedTempFile::new_in(&parent)?;
	{
		let mut out = BufWriter::new(tmp.as_file_mut());
		out.write_all(&framed)?;
		for (path, node) in root.entries() {
			let file = match node {
				Header::File(file) if !file.unpacked() => file,
				_ => continue,
			};
			let offset = file.offset().ok_or_else(|| {
				Error::CorruptHeader(format!("packed file {} has no offset", path.display()))
			})?;
			out.seek(SeekFrom::Start(payload_base + offset))?;
			match replaced {
				Some((target, data)) if path == target => out.write_all(data)?,
				_ => {
					let old_offset = *old_layout
						.get(&path)
						.ok_or_else(|| Error::EntryNotFound(path.clone()))?;
					copy_range(
						asar.store(),
						asar.payload_base() + old_offset,
						file.size(),
						&mut out,
					)?;
				}
			}
		}
		out.flush()?;
	}
	tmp.as_file().sync_all()?;
	tmp.persist(asar.path())
		.map_err(|err| Error::Io(err.error))?;
	Ok(())
}

fn copy_range(
	store: &fs::File,
	mut offset: u64,
	mut remaining: u64,
	out: &mut impl Write,
) -> Result<()> {
	let mut buf = vec![0_u8; remaining.min(COPY_CHUNK as u64) as usize];
	while remaining > 0 {
		let len = remaining.min(buf.len() as u64) as usize;
		read_exact_at(store, &mut buf[..len], offset).map_err(|err| {
			if err.kind() == io::ErrorKind::UnexpectedEof {
				Error::Truncated
			} else {
				Error::Io(err)
			}
		})?;
		out.write_all(&buf[..len])?;
		offset += len as u64;
		remaining -= len as u64;
	}
	Ok(())
}

fn open_rw(path: &Path) -> Result<fs::File> {
	fs::OpenOptions::new()
		.read(true)
		.write(true)
		.open(path)
		.map_err(Error::from)
}

#[cfg(unix)]
fn write_all_at(file: &fs::File, buf: &[u8], offset: u64) -> Result<()> {
	use std::os::unix::fs::FileExt;
	file.write_all_at(buf, offset).map_err(Error::from)
}

#[cfg(windows)]
fn write_all_at(file: &fs::File, mut buf: &[u8], mut offset: u64) -> Result<()> {
	use std::os::windows::fs::FileExt;
	while !buf.is_empty() {
		match file.seek_write(buf, offset)? {
			0 => {
				return Err(Error::Io(io::Error::new(
					io::ErrorKind::WriteZero,
					"failed to write whole buffer",
				)))
			}
			n => {
				buf = &buf[n..];
				offset += n as u64;
			}
		}
	}
	Ok(())
}
