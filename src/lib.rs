// SPDX-License-Identifier: Apache-2.0 OR MIT
#![forbid(unsafe_code)]
#![warn(
	clippy::perf,
	clippy::complexity,
	clippy::style,
	clippy::correctness,
	clippy::missing_const_for_fn
)]
#![allow(clippy::tabs_in_doc_comments, clippy::too_many_arguments)]

//! This crate reads, builds, and patches [asar](https://github.com/electron/asar) archives,
//! the container format used by [Electron](https://www.electronjs.org/)-based applications:
//! a framed JSON header describing the directory tree, followed by the
//! concatenated file contents.
//!
//! # Examples
//!
//! ## Listing the contents of an asar archive
//! ```rust,no_run
//! use asarkit::{AsarReader, Result};
//!
//! fn main() -> Result<()> {
//! 	let asar = AsarReader::open("archive.asar")?;
//! 	for (path, _) in asar.entries() {
//! 		println!("{}", path.display());
//! 	}
//! 	Ok(())
//! }
//! ```
//!
//! ## Reading a file from an asar archive
//! ```rust,no_run
//! use asarkit::{AsarReader, Result};
//!
//! fn main() -> Result<()> {
//! 	let asar = AsarReader::open("archive.asar")?;
//! 	let contents = asar.read("hello.txt")?;
//! 	assert_eq!(contents, b"Hello, World!");
//! 	Ok(())
//! }
//! ```
//!
//! ## Packing a directory into an asar archive
//! ```rust,no_run
//! use asarkit::{AsarBuilder, BuildOptions, Result};
//!
//! fn main() -> Result<()> {
//! 	let options = BuildOptions {
//! 		compute_integrity: true,
//! 		..BuildOptions::default()
//! 	};
//! 	AsarBuilder::build("app", options)?.write_to("app.asar")?;
//! 	Ok(())
//! }
//! ```
//!
//! ## Replacing one file without unpacking
//! ```rust,no_run
//! use asarkit::{replace_entry, ReplaceOutcome, Result};
//!
//! fn main() -> Result<()> {
//! 	match replace_entry("app.asar", "lib/config.json", "config.json")? {
//! 		ReplaceOutcome::InPlace => println!("patched in place"),
//! 		ReplaceOutcome::Rewritten => println!("archive rewritten"),
//! 	}
//! 	Ok(())
//! }
//! ```
//!
//! # License
//!
//! `asarkit` is licensed under either the [MIT license](LICENSE-MIT) or the
//! [Apache License 2.0](LICENSE-APACHE), at the choice of the user.

/// Error handling for parsing, reading, and writing asar archives.
pub mod error;
/// The archive tree: directories, files, links, and their JSON shape.
pub mod header;
/// Whole-file and block-level content digests.
pub mod integrity;
/// Replacing a single entry in an existing archive.
pub mod patch;
/// The length-prefixed framing around the header JSON.
pub mod pickle;
/// Reading and extracting asar archives.
pub mod reader;
/// Building asar archives from a directory tree.
pub mod writer;

pub use error::{Error, Result};
pub use header::{Entries, File, FileIntegrity, HashAlgorithm, Header};
pub use patch::{replace_entry, ReplaceOutcome};
pub use reader::{AsarReader, ExtractOptions, ExtractReport};
pub use writer::{AsarBuilder, BuildOptions};
