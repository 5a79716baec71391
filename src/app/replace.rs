// SPDX-License-Identifier: Apache-2.0 OR MIT
use super::args::ReplaceArgs;
use asarkit::{replace_entry, ReplaceOutcome};
use color_eyre::{eyre::WrapErr, Result};

pub fn replace(args: ReplaceArgs) -> Result<()> {
	let outcome = replace_entry(&args.archive, &args.path, &args.content).wrap_err_with(|| {
		format!(
			"failed to replace {} in {}",
			args.path.display(),
			args.archive.display()
		)
	})?;
	match outcome {
		ReplaceOutcome::InPlace => println!("replaced {} in place", args.path.display()),
		ReplaceOutcome::Rewritten => {
			println!("replaced {} (archive rewritten)", args.path.display())
		}
	}

	Ok(())
}
