// SPDX-License-Identifier: Apache-2.0 OR MIT
use crate::{
	error::{Error, Result},
	header::{File as FileEntry, FileIntegrity, Header},
	integrity,
	pickle,
	reader::sidecar_path,
};
use log::{debug, info};
use regex::Regex;
use std::{
	collections::{HashSet, VecDeque},
	fs,
	io::{self, BufWriter, Write},
	path::{Component, Path, PathBuf},
};
use tempfile::NamedTempFile;
use walkdir::WalkDir;
use wax::{Glob, Pattern};

/// Entry names skipped by the junk filter: OS and editor metadata that has
/// no business inside an archive.
const JUNK_PATTERNS: &[&str] = &[
	"desktop.ini",
	".DS_Store",
	"Thumbs.db",
	"._*",
	"~$*",
	"*.tmp",
	"*.temp",
	"*.bak",
	"*.old",
	".vs",
	"__pycache__",
	".git",
];

/// Policy knobs for [`AsarBuilder::build`].
#[derive(Debug, Clone)]
pub struct BuildOptions {
	/// Compute whole-file and block digests for every file.
	pub compute_integrity: bool,
	/// Block size for computed digests; 0 means the 4 MiB default.
	pub block_size: usize,
	/// Entries whose `/`-joined relative path matches are stored outside
	/// the archive, in the `<archive>.unpacked` sidecar, regardless of
	/// content.
	pub externalize: Option<Regex>,
	/// Skip OS metadata entries ([`JUNK_PATTERNS`]); junk directories are
	/// pruned whole.
	pub exclude_junk: bool,
}

impl Default for BuildOptions {
	fn default() -> Self {
		Self {
			compute_integrity: false,
			block_size: integrity::BLOCK_SIZE,
			externalize: None,
			exclude_junk: false,
		}
	}
}

/// Builds an archive from a directory tree.
///
/// [`build`](Self::build) walks the source and produces the in-memory
/// tree; [`write_to`](Self::write_to) lays out offsets and writes the
/// container. Children are ordered by lexicographic byte order of their
/// names at every level, so the same tree always produces the same bytes.
///
/// ```rust,no_run
/// use asarkit::{AsarBuilder, BuildOptions, Result};
///
/// fn main() -> Result<()> {
/// 	let builder = AsarBuilder::build("app", BuildOptions::default())?;
/// 	builder.write_to("app.asar")?;
/// 	Ok(())
/// }
/// ```
pub struct AsarBuilder {
	source: PathBuf,
	root: Header,
}

impl AsarBuilder {
	/// Walks `source_dir` and builds the archive tree: regular files with
	/// their size and executable bit, directories (empty ones included),
	/// symlinks as metadata-only link entries. Directory cycles are
	/// rejected via a visited device+inode set.
	pub fn build(source_dir: impl AsRef<Path>, options: BuildOptions) -> Result<Self> {
		let source = source_dir.as_ref();
		if !source.is_dir() {
			return Err(Error::SourceNotFound(source.to_path_buf()));
		}
		let block_size = if options.block_size == 0 {
			integrity::BLOCK_SIZE
		} else {
			options.block_size
		};
		let junk = if options.exclude_junk {
			junk_globs()?
		} else {
			Vec::new()
		};

		let mut root = Header::new_directory();
		let mut visited = HashSet::new();
		let mut walker = WalkDir::new(source)
			.follow_links(false)
			.sort_by_file_name()
			.into_iter();
		while let Some(entry) = walker.next() {
			let entry = entry.map_err(walk_error)?;
			let path = entry.path();
			if entry.depth() == 0 {
				check_identity(&mut visited, path)?;
				continue;
			}
			let name = entry.file_name().to_string_lossy();
			if is_junk(&junk, &name) {
				if entry.file_type().is_dir() {
					walker.skip_current_dir();
				}
				debug!("skipping junk entry {}", path.display());
				continue;
			}
			let rel = path.strip_prefix(source).map_err(|_| {
				Error::Io(io::Error::new(
					io::ErrorKind::InvalidInput,
					format!("'{}' escapes the source directory", path.display()),
				))
			})?;

			let file_type = entry.file_type();
			let node = if file_type.is_symlink() {
				Header::Link {
					link: link_target(source, path)?,
				}
			} else if file_type.is_dir() {
				check_identity(&mut visited, path)?;
				Header::new_directory()
			} else {
				let metadata = entry.metadata().map_err(walk_error)?;
				let mut file = FileEntry::new(metadata.len(), is_executable::is_executable(path));
				if let Some(pattern) = &options.externalize {
					if pattern.is_match(&slash_path(rel)) {
						file.unpacked = true;
					}
				}
				if options.compute_integrity {
					let data = fs::read(path)?;
					file.integrity = Some(FileIntegrity::compute(&data, block_size));
				}
				Header::File(file)
			};
			insert_node(&mut root, path_to_reverse_components(rel), node);
		}
		Ok(Self {
			source: source.to_path_buf(),
			root,
		})
	}

	/// The tree built from the source directory. Packed files have no
	/// offsets yet; those are assigned on write.
	#[inline]
	pub const fn header(&self) -> &Header {
		&self.root
	}

	/// Writes the container: header framing, then every packed file's
	/// bytes at its assigned offset, in walk order. Externalized entries
	/// are copied into `<destination>.unpacked/` instead.
	///
	/// Output goes to a temporary file in the destination's directory and
	/// is renamed over the destination only once complete and synced, so
	/// a crash or failure never leaves a partial archive visible.
	pub fn write_to(&self, destination: impl AsRef<Path>) -> Result<()> {
		let destination = destination.as_ref();
		let mut root = self.root.clone();
		assign_offsets(&mut root, &mut 0);
		let framed = pickle::encode(&root.to_json()?)?;

		let parent = match destination.parent() {
			Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
			_ => PathBuf::from("."),
		};
		fs::create_dir_all(&parent)?;

		// Sidecar bytes land before the archive itself becomes visible.
		let unpacked_dir = sidecar_path(destination);
		for (rel, node) in root.entries() {
			if let Header::File(file) = node {
				if file.unpacked() {
					let out = unpacked_dir.join(&rel);
					if let Some(dir) = out.parent() {
						fs::create_dir_all(dir)?;
					}
					fs::copy(self.source.join(&rel), &out)?;
					info!("externalized {}", rel.display());
				}
			}
		}

		let mut tmp = NamedTempFile::new_in(&parent)?;
		{
			let mut out = BufWriter::new(tmp.as_file_mut());
			out.write_all(&framed)?;
			for (rel, node) in root.entries() {
				let file = match node {
					Header::File(file) if !file.unpacked() => file,
					_ => continue,
				};
				let source_path = self.source.join(&rel);
				let mut input = fs::File::open(&source_path)?;
				let copied = io::copy(&mut input, &mut out)?;
				if copied != file.size() {
					return Err(Error::Io(io::Error::new(
						io::ErrorKind::InvalidData,
						format!("{} changed size during packing", source_path.display()),
					)));
				}
				info!("packed {} ({copied} bytes)", rel.display());
			}
			out.flush()?;
		}
		tmp.as_file().sync_all()?;
		tmp.persist(destination).map_err(|err| Error::Io(err.error))?;
		debug!("wrote archive to {}", destination.display());
		Ok(())
	}
}

/// Offsets accumulate in walk order from 0; unpacked files get none.
fn assign_offsets(node: &mut Header, next: &mut u64) {
	match node {
		Header::Directory { files } => {
			for child in files.values_mut() {
				assign_offsets(child, next);
			}
		}
		Header::File(file) if !file.unpacked() => {
			file.offset = Some(*next);
			*next += file.size();
		}
		_ => {}
	}
}

fn junk_globs() -> Result<Vec<Glob<'static>>> {
	JUNK_PATTERNS
		.iter()
		.map(|pattern| Glob::new(pattern).map_err(|err| Error::InvalidPattern(err.to_string())))
		.collect()
}

fn is_junk(globs: &[Glob<'static>], name: &str) -> bool {
	globs.iter().any(|glob| glob.is_match(Path::new(name)))
}

/// Relative path joined with `/` regardless of platform, the form
/// externalize patterns are matched against.
fn slash_path(rel: &Path) -> String {
	rel.components()
		.filter_map(|component| match component {
			Component::Normal(name) => Some(name.to_string_lossy()),
			_ => None,
		})
		.collect::<Vec<_>>()
		.join("/")
}

fn link_target(source: &Path, path: &Path) -> Result<String> {
	let target = fs::read_link(path)?;
	let target = if target.is_absolute() {
		target
			.strip_prefix(source)
			.map(Path::to_path_buf)
			.map_err(|_| {
				Error::Io(io::Error::new(
					io::ErrorKind::InvalidInput,
					format!(
						"symlink {} points outside the source directory",
						path.display()
					),
				))
			})?
	} else {
		target
	};
	Ok(slash_path(&target))
}

#[cfg(unix)]
fn check_identity(visited: &mut HashSet<(u64, u64)>, path: &Path) -> Result<()> {
	use std::os::unix::fs::MetadataExt;
	let metadata = fs::symlink_metadata(path)?;
	if !visited.insert((metadata.dev(), metadata.ino())) {
		return Err(Error::SymlinkLoop(path.to_path_buf()));
	}
	Ok(())
}

#[cfg(not(unix))]
fn check_identity(_visited: &mut HashSet<(u64, u64)>, _path: &Path) -> Result<()> {
	Ok(())
}

fn walk_error(err: walkdir::Error) -> Error {
	let path = err.path().map(Path::to_path_buf);
	if err.loop_ancestor().is_some() {
		return Error::SymlinkLoop(path.unwrap_or_default());
	}
	match err.into_io_error() {
		Some(io_err) => Error::Io(io_err),
		None => Error::Io(io::Error::new(
			io::ErrorKind::Other,
			"directory walk failed",
		)),
	}
}

fn path_to_reverse_components(path: &Path) -> VecDeque<String> {
	path.components()
		.filter_map(|component| match component {
			Component::Normal(name) => Some(
				name.to_str()
					.map(str::to_string)
					.unwrap_or_else(|| name.to_string_lossy().into_owned()),
			),
			_ => None,
		})
		.collect()
}

fn insert_node(root: &mut Header, mut path: VecDeque<String>, node: Header) {
	let files = match root {
		Header::Directory { files } => files,
		_ => return,
	};
	match path.pop_front() {
		Some(name) if path.is_empty() => {
			files.insert(name, node);
		}
		Some(name) => {
			let child = files.entry(name).or_insert_with(Header::new_directory);
			insert_node(child, path, node);
		}
		None => {
			unreachable!("path must have at least one component");
		}
	};
}

#[cfg(test)]
mod test {
	use super::{AsarBuilder, BuildOptions};
	use crate::{
		error::Error,
		header::Header,
		reader::{AsarReader, ExtractOptions},
	};
	use regex::Regex;
	use std::{fs, path::Path};
	use tempfile::TempDir;

	fn fill(dir: &Path, entries: &[(&str, &[u8])]) {
		for (rel, data) in entries {
			let path = dir.join(rel);
			fs::create_dir_all(path.parent().expect("entry must have a parent"))
				.expect("failed to create parents");
			fs::write(&path, data).expect("failed to write fixture file");
		}
	}

	fn packed_layout(header: &Header) -> Vec<(String, u64, u64)> {
		header
			.entries()
			.filter_map(|(path, node)| match node {
				Header::File(file) if !file.unpacked() => Some((
					path.to_string_lossy().into_owned(),
					file.offset().expect("packed file must have an offset"),
					file.size(),
				)),
				_ => None,
			})
			.collect()
	}

	#[test]
	fn round_trip_reproduces_the_source() {
		let dir = TempDir::new().expect("failed to create tempdir");
		let source = dir.path().join("app");
		fill(&source, &[
			("readme.md", b"hello there".as_slice()),
			("src/main.js", b"console.log(1);\n".as_slice()),
			("src/util/x.js", b"".as_slice()),
		]);
		let archive = dir.path().join("app.asar");
		AsarBuilder::build(&source, BuildOptions::default())
			.expect("failed to build")
			.write_to(&archive)
			.expect("failed to write");

		let asar = AsarReader::open(&archive).expect("failed to open");
		let out = dir.path().join("out");
		let report = asar
			.extract_all(&out, &ExtractOptions::default())
			.expect("extract_all failed");
		assert!(report.is_complete(), "failures: {:?}", report.failed);
		for (rel, data) in [
			("readme.md", b"hello there".as_slice()),
			("src/main.js", b"console.log(1);\n".as_slice()),
			("src/util/x.js", b"".as_slice()),
		] {
			assert_eq!(
				fs::read(out.join(rel)).unwrap_or_else(|_| panic!("missing {rel}")),
				data
			);
		}
	}

	#[test]
	fn offsets_are_contiguous_in_sorted_walk_order() {
		let dir = TempDir::new().expect("failed to create tempdir");
		let source = dir.path().join("app");
		// Created out of order on purpose; layout must sort per level.
		fill(&source, &[
			("zz.txt", b"4444".as_slice()),
			("aa.txt", b"1".as_slice()),
			("mid/b.txt", b"22".as_slice()),
			("mid/a.txt", b"333".as_slice()),
		]);
		let archive = dir.path().join("app.asar");
		AsarBuilder::build(&source, BuildOptions::default())
			.expect("failed to build")
			.write_to(&archive)
			.expect("failed to write");

		let asar = AsarReader::open(&archive).expect("failed to open");
		let layout = packed_layout(asar.header());
		assert_eq!(layout, vec![
			("aa.txt".to_owned(), 0, 1),
			("mid/a.txt".to_owned(), 1, 3),
			("mid/b.txt".to_owned(), 4, 2),
			("zz.txt".to_owned(), 6, 4),
		]);
		// Payload spans exactly the summed sizes, no gaps, no tail.
		let total: u64 = layout.iter().map(|(_, _, size)| size).sum();
		let stored = fs::metadata(&archive).expect("failed to stat").len();
		assert_eq!(stored, asar.payload_base() + total);
	}

	#[test]
	fn builds_are_deterministic() {
		let dir = TempDir::new().expect("failed to create tempdir");
		let source = dir.path().join("app");
		fill(&source, &[
			("b.txt", b"bb".as_slice()),
			("a.txt", b"a".as_slice()),
			("c/d.txt", b"d".as_slice()),
		]);
		let first = dir.path().join("first.asar");
		let second = dir.path().join("second.asar");
		AsarBuilder::build(&source, BuildOptions::default())
			.expect("failed to build")
			.write_to(&first)
			.expect("failed to write");
		AsarBuilder::build(&source, BuildOptions::default())
			.expect("failed to build")
			.write_to(&second)
			.expect("failed to write");
		assert_eq!(
			fs::read(&first).expect("failed to read first"),
			fs::read(&second).expect("failed to read second")
		);
	}

	#[test]
	fn junk_entries_are_skipped_on_request() {
		let dir = TempDir::new().expect("failed to create tempdir");
		let source = dir.path().join("app");
		fill(&source, &[
			("keep.txt", b"k".as_slice()),
			(".DS_Store", b"junk".as_slice()),
			("sub/Thumbs.db", b"junk".as_slice()),
			(".git/HEAD", b"ref: refs/heads/main".as_slice()),
		]);
		let options = BuildOptions {
			exclude_junk: true,
			..BuildOptions::default()
		};
		let builder = AsarBuilder::build(&source, options).expect("failed to build");
		let paths = builder
			.header()
			.entries()
			.map(|(path, _)| path.to_string_lossy().into_owned())
			.collect::<Vec<_>>();
		assert_eq!(paths, vec!["keep.txt".to_owned(), "sub".to_owned()]);

		// Without the option the junk stays.
		let builder = AsarBuilder::build(&source, BuildOptions::default())
			.expect("failed to build");
		assert!(builder.header().get(".DS_Store").is_some());
		assert!(builder.header().get(".git/HEAD").is_some());
	}

	#[test]
	fn externalized_entries_skip_the_payload() {
		let dir = TempDir::new().expect("failed to create tempdir");
		let source = dir.path().join("app");
		fill(&source, &[
			("index.js", b"require('./addon.unpacked-me.js');".as_slice()),
			("lib/addon.unpacked-me.js", b"binary-ish payload".as_slice()),
		]);
		let options = BuildOptions {
			externalize: Some(Regex::new(r".*\.unpacked-me\.js").expect("valid pattern")),
			..BuildOptions::default()
		};
		let archive = dir.path().join("app.asar");
		AsarBuilder::build(&source, options)
			.expect("failed to build")
			.write_to(&archive)
			.expect("failed to write");

		let asar = AsarReader::open(&archive).expect("failed to open");
		let node = asar
			.header()
			.get("lib/addon.unpacked-me.js")
			.expect("entry missing");
		match node {
			Header::File(file) => {
				assert!(file.unpacked());
				assert_eq!(file.offset(), None);
			}
			other => panic!("expected a file, got {other:?}"),
		}
		// Payload only holds index.js; the externalized bytes live in the
		// sidecar.
		let packed: u64 = packed_layout(asar.header())
			.iter()
			.map(|(_, _, size)| size)
			.sum();
		let stored = fs::metadata(&archive).expect("failed to stat").len();
		assert_eq!(stored, asar.payload_base() + packed);
		assert_eq!(
			fs::read(dir.path().join("app.asar.unpacked/lib/addon.unpacked-me.js"))
				.expect("sidecar file missing"),
			b"binary-ish payload"
		);
		assert_eq!(
			asar.read("lib/addon.unpacked-me.js")
				.expect("failed to read unpacked entry"),
			b"binary-ish payload"
		);
	}

	#[test]
	fn integrity_digests_cover_the_contents() {
		let dir = TempDir::new().expect("failed to create tempdir");
		let source = dir.path().join("app");
		fill(&source, &[("data.bin", b"0123456789".as_slice())]);
		let options = BuildOptions {
			compute_integrity: true,
			block_size: 4,
			..BuildOptions::default()
		};
		let archive = dir.path().join("app.asar");
		AsarBuilder::build(&source, options)
			.expect("failed to build")
			.write_to(&archive)
			.expect("failed to write");

		let asar = AsarReader::open(&archive).expect("failed to open");
		match asar.header().get("data.bin") {
			Some(Header::File(file)) => {
				let integrity = file.integrity().expect("integrity missing");
				assert_eq!(integrity.block_size(), 4);
				assert_eq!(integrity.blocks().len(), 3);
				integrity
					.verify(Path::new("data.bin"), b"0123456789")
					.expect("digests must match the contents");
			}
			other => panic!("expected a file, got {other:?}"),
		}
		let strict = ExtractOptions {
			check_integrity: true,
			..ExtractOptions::default()
		};
		asar.extract_entry("data.bin", dir.path().join("data.bin"), &strict)
			.expect("verified extraction must pass");
	}

	#[test]
	fn empty_directories_survive() {
		let dir = TempDir::new().expect("failed to create tempdir");
		let source = dir.path().join("app");
		fs::create_dir_all(source.join("empty/nested")).expect("failed to create dirs");
		let archive = dir.path().join("app.asar");
		AsarBuilder::build(&source, BuildOptions::default())
			.expect("failed to build")
			.write_to(&archive)
			.expect("failed to write");
		let asar = AsarReader::open(&archive).expect("failed to open");
		assert!(matches!(
			asar.header().get("empty/nested"),
			Some(Header::Directory { .. })
		));
		let out = dir.path().join("out");
		let report = asar
			.extract_all(&out, &ExtractOptions::default())
			.expect("extract_all failed");
		assert!(report.is_complete(), "failures: {:?}", report.failed);
		assert!(out.join("empty/nested").is_dir());
	}

	#[cfg(unix)]
	#[test]
	fn executable_bit_survives_the_round_trip() {
		use std::os::unix::fs::PermissionsExt;
		let dir = TempDir::new().expect("failed to create tempdir");
		let source = dir.path().join("app");
		fill(&source, &[("run.sh", b"#!/bin/sh\n".as_slice()), ("plain.txt", b"p".as_slice())]);
		fs::set_permissions(
			source.join("run.sh"),
			fs::Permissions::from_mode(0o755),
		)
		.expect("failed to chmod");

		let archive = dir.path().join("app.asar");
		AsarBuilder::build(&source, BuildOptions::default())
			.expect("failed to build")
			.write_to(&archive)
			.expect("failed to write");
		let asar = AsarReader::open(&archive).expect("failed to open");
		match asar.header().get("run.sh") {
			Some(Header::File(file)) => assert!(file.executable()),
			other => panic!("expected a file, got {other:?}"),
		}
		let out = dir.path().join("out");
		let report = asar
			.extract_all(&out, &ExtractOptions::default())
			.expect("extract_all failed");
		assert!(report.is_complete(), "failures: {:?}", report.failed);
		let mode = fs::metadata(out.join("run.sh"))
			.expect("missing run.sh")
			.permissions()
			.mode();
		assert_ne!(mode & 0o111, 0, "executable bit must be preserved");
		let mode = fs::metadata(out.join("plain.txt"))
			.expect("missing plain.txt")
			.permissions()
			.mode();
		assert_eq!(mode & 0o111, 0, "plain file must stay non-executable");
	}

	#[cfg(unix)]
	#[test]
	fn symlinks_become_link_entries() {
		let dir = TempDir::new().expect("failed to create tempdir");
		let source = dir.path().join("app");
		fill(&source, &[("versions/1.0/bin", b"binary".as_slice())]);
		std::os::unix::fs::symlink("versions/1.0", source.join("current"))
			.expect("failed to create symlink");

		let builder = AsarBuilder::build(&source, BuildOptions::default())
			.expect("failed to build");
		assert!(matches!(
			builder.header().get("current"),
			Some(Header::Link { link }) if link == "versions/1.0"
		));
	}

	#[test]
	fn missing_source_is_reported() {
		let dir = TempDir::new().expect("failed to create tempdir");
		assert!(matches!(
			AsarBuilder::build(dir.path().join("nope"), BuildOptions::default()),
			Err(Error::SourceNotFound(_))
		));
	}
}
