// SPDX-License-Identifier: Apache-2.0 OR MIT
use super::args::ExtractArgs;
use asarkit::{AsarReader, ExtractOptions};
use color_eyre::{
	eyre::{eyre, WrapErr},
	Result,
};
use std::sync::{
	atomic::{AtomicBool, Ordering},
	Arc,
};

pub fn extract(args: ExtractArgs) -> Result<()> {
	let reader = AsarReader::open(&args.archive)
		.wrap_err_with(|| format!("failed to open archive {}", args.archive.display()))?;
	let cancel = Arc::new(AtomicBool::new(false));
	let handler_token = Arc::clone(&cancel);
	ctrlc::set_handler(move || handler_token.store(true, Ordering::Relaxed))
		.wrap_err("failed to install interrupt handler")?;
	let options = ExtractOptions {
		check_integrity: args.check_integrity,
		cancel: Some(cancel),
	};
	let report = reader
		.extract_all(&args.destination, &options)
		.wrap_err("failed to extract archive")?;
	for (path, err) in &report.failed {
		eprintln!("failed to extract {}: {err}", path.display());
	}
	if report.cancelled {
		return Err(eyre!(
			"extraction interrupted after {} entries",
			report.extracted.len()
		));
	}
	if !report.failed.is_empty() {
		return Err(eyre!(
			"{} of {} entries failed to extract",
			report.failed.len(),
			report.failed.len() + report.extracted.len()
		));
	}

	Ok(())
}
