// SPDX-License-Identifier: Apache-2.0 OR MIT
use super::args::ListArgs;
use asarkit::AsarReader;
use color_eyre::{eyre::WrapErr, Result};
use std::path::{PathBuf, MAIN_SEPARATOR};

pub fn list(args: ListArgs) -> Result<()> {
	let reader = AsarReader::open(&args.archive)
		.wrap_err_with(|| format!("failed to read archive {}", args.archive.display()))?;
	let root = PathBuf::from(MAIN_SEPARATOR.to_string());
	for (path, _) in reader.entries() {
		println!("{}", root.join(path).display());
	}

	Ok(())
}
