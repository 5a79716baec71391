// SPDX-License-Identifier: Apache-2.0 OR MIT
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[clap(author, version, about, long_about = None, propagate_version = true)]
pub struct AppArgs {
	#[clap(subcommand)]
	pub subcommand: AppSubcommand,
}

#[derive(Subcommand)]
pub enum AppSubcommand {
	Pack(PackArgs),
	List(ListArgs),
	Extract(ExtractArgs),
	ExtractFile(ExtractFileArgs),
	Replace(ReplaceArgs),
}

/// Pack a directory into an asar archive
#[derive(Args)]
pub struct PackArgs {
	/// Add whole-file and block hashes to the header
	#[clap(long)]
	pub integrity: bool,
	/// Skip common OS junk entries (.DS_Store, Thumbs.db, ...)
	#[clap(long)]
	pub no_junk: bool,
	/// Store entries whose relative path matches this regular expression
	/// outside the archive, in the .unpacked sidecar directory
	#[clap(long, value_name = "REGEX")]
	pub externalize: Option<String>,
	/// The directory to pack
	#[clap(value_parser)]
	pub dir: PathBuf,
	/// The output asar archive
	#[clap(value_parser)]
	pub output: PathBuf,
}

/// List the entries of an asar archive
#[derive(Args)]
pub struct ListArgs {
	/// The asar archive to list
	#[clap(value_parser)]
	pub archive: PathBuf,
}

/// Extract an asar archive
#[derive(Args)]
pub struct ExtractArgs {
	/// Verify stored hashes while extracting
	#[clap(long)]
	pub check_integrity: bool,
	/// Archive to extract
	#[clap(value_parser)]
	pub archive: PathBuf,
	/// The directory to extract to
	#[clap(value_parser)]
	pub destination: PathBuf,
}

/// Extract one file from an asar archive
#[derive(Args)]
pub struct ExtractFileArgs {
	/// Archive to extract
	#[clap(value_parser)]
	pub archive: PathBuf,
	/// The file to extract from the archive
	#[clap(value_parser)]
	pub filename: PathBuf,
	/// Where to write the file (defaults to the entry's own file name)
	#[clap(short, long)]
	pub output: Option<PathBuf>,
}

/// Replace one entry's contents in an existing archive
#[derive(Args)]
pub struct ReplaceArgs {
	/// The asar archive to patch
	#[clap(value_parser)]
	pub archive: PathBuf,
	/// The entry to replace
	#[clap(value_parser)]
	pub path: PathBuf,
	/// File holding the new contents
	#[clap(value_parser)]
	pub content: PathBuf,
}
