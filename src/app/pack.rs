// SPDX-License-Identifier: Apache-2.0 OR MIT
use super::args::PackArgs;
use asarkit::{AsarBuilder, BuildOptions};
use color_eyre::{
	eyre::{eyre, WrapErr},
	Result,
};
use regex::Regex;

pub fn pack(args: PackArgs) -> Result<()> {
	let externalize = args
		.externalize
		.as_deref()
		.map(Regex::new)
		.transpose()
		.map_err(|err| eyre!("failed to parse --externalize pattern: {}", err))?;
	let options = BuildOptions {
		compute_integrity: args.integrity,
		exclude_junk: args.no_junk,
		externalize,
		..BuildOptions::default()
	};
	let builder = AsarBuilder::build(&args.dir, options)
		.wrap_err_with(|| format!("failed to scan {}", args.dir.display()))?;
	builder
		.write_to(&args.output)
		.wrap_err_with(|| format!("failed to write asar to {}", args.output.display()))?;
	Ok(())
}
