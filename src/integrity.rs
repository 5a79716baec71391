// SPDX-License-Identifier: Apache-2.0 OR MIT
use crate::{
	error::{Error, Result},
	header::{FileIntegrity, HashAlgorithm},
};
use sha2::{digest::FixedOutputReset, Digest, Sha256};
use std::{cell::RefCell, path::Path};

/// Block size used for newly computed integrity records: 4 MiB.
pub const BLOCK_SIZE: usize = 4 * 1024 * 1024;

thread_local! {
	static SHA256: RefCell<Sha256> = RefCell::new(Sha256::new());
}

impl HashAlgorithm {
	pub fn hash(&self, data: &[u8]) -> Vec<u8> {
		match self {
			Self::Sha256 => SHA256.with(|hasher| {
				let mut hasher = hasher.borrow_mut();
				hasher.update(data);
				hasher.finalize_fixed_reset().to_vec()
			}),
		}
	}

	/// Hashes each consecutive `block_size` chunk of `data`, in order. The
	/// final chunk may be shorter; empty input yields no blocks.
	pub fn hash_blocks(&self, block_size: usize, data: &[u8]) -> Vec<Vec<u8>> {
		data.chunks(block_size)
			.map(|block| self.hash(block))
			.collect()
	}
}

impl FileIntegrity {
	/// Computes the whole-file and per-block digests of `data`.
	pub fn compute(data: &[u8], block_size: usize) -> Self {
		let algorithm = HashAlgorithm::Sha256;
		Self {
			algorithm,
			hash: algorithm.hash(data),
			block_size,
			blocks: algorithm.hash_blocks(block_size, data),
		}
	}

	/// Recomputes digests over `data` and compares them against the stored
	/// ones, blocks first, then the whole file. `file` labels the error.
	pub fn verify(&self, file: &Path, data: &[u8]) -> Result<()> {
		for (idx, (block, expected)) in data
			.chunks(self.block_size)
			.zip(self.blocks.iter())
			.enumerate()
		{
			let actual = self.algorithm.hash(block);
			if actual != *expected {
				return Err(Error::IntegrityMismatch {
					file: file.to_path_buf(),
					block: Some(idx + 1),
					expected: expected.clone(),
					actual,
				});
			}
		}
		let actual = self.algorithm.hash(data);
		if actual != self.hash {
			return Err(Error::IntegrityMismatch {
				file: file.to_path_buf(),
				block: None,
				expected: self.hash.clone(),
				actual,
			});
		}
		Ok(())
	}
}

#[cfg(test)]
mod test {
	use super::BLOCK_SIZE;
	use crate::{error::Error, header::FileIntegrity};
	use sha2::{Digest, Sha256};
	use std::path::Path;

	#[test]
	fn empty_input_has_no_blocks() {
		let integrity = FileIntegrity::compute(b"", BLOCK_SIZE);
		assert!(integrity.blocks().is_empty());
		assert_eq!(
			hex::encode(integrity.hash()),
			"e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
		);
	}

	#[test]
	fn blocks_cover_the_input_in_order() {
		let data = b"hello";
		let integrity = FileIntegrity::compute(data, 2);
		assert_eq!(integrity.block_size(), 2);
		assert_eq!(integrity.blocks().len(), 3);
		for (block, chunk) in integrity.blocks().iter().zip(data.chunks(2)) {
			assert_eq!(block.as_slice(), Sha256::digest(chunk).as_slice());
		}
		assert_eq!(integrity.hash(), Sha256::digest(data).as_slice());
	}

	#[test]
	fn verify_accepts_untouched_data() {
		let data = b"some file contents that span a few blocks";
		let integrity = FileIntegrity::compute(data, 8);
		integrity
			.verify(Path::new("f.txt"), data)
			.expect("verification must pass");
	}

	#[test]
	fn verify_reports_the_failing_block() {
		let mut data = *b"0123456789abcdef";
		let integrity = FileIntegrity::compute(&data, 4);
		data[9] = b'!';
		match integrity.verify(Path::new("f.txt"), &data) {
			Err(Error::IntegrityMismatch { file, block, .. }) => {
				assert_eq!(file, Path::new("f.txt"));
				assert_eq!(block, Some(3));
			}
			other => panic!("expected a block mismatch, got {other:?}"),
		}
	}

	#[test]
	fn verify_reports_whole_file_mismatch() {
		let data = b"contents";
		let mut integrity = FileIntegrity::compute(data, BLOCK_SIZE);
		// Stored block hashes still match, so the whole-file check is the
		// one that fires.
		integrity.hash = vec![0; 32];
		match integrity.verify(Path::new("f.txt"), data) {
			Err(Error::IntegrityMismatch { block: None, .. }) => {}
			other => panic!("expected a whole-file mismatch, got {other:?}"),
		}
	}
}
