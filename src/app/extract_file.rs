// SPDX-License-Identifier: Apache-2.0 OR MIT
use super::args::ExtractFileArgs;
use asarkit::AsarReader;
use color_eyre::{
	eyre::{eyre, WrapErr},
	Result,
};
use std::{ffi::OsStr, fs, path::{Path, PathBuf}};

pub fn extract_file(args: ExtractFileArgs) -> Result<()> {
	let reader = AsarReader::open(&args.archive)
		.wrap_err_with(|| format!("failed to open archive {}", args.archive.display()))?;
	let path = args
		.filename
		.strip_prefix("/")
		.map(Path::to_path_buf)
		.unwrap_or_else(|_| args.filename.clone());
	let output = match args.output {
		Some(output) => output,
		None => PathBuf::from(
			path.file_name()
				.map(OsStr::to_string_lossy)
				.ok_or_else(|| eyre!("failed to get file name for {}", path.display()))?
				.into_owned(),
		),
	};
	let contents = reader
		.read(&path)
		.wrap_err_with(|| format!("failed to read {} from archive", path.display()))?;

	fs::write(&output, contents)
		.wrap_err_with(|| format!("failed to write contents to {}", output.display()))?;

	Ok(())
}
