// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The length-prefixed framing that wraps the header JSON.
//!
//! Layout, all little-endian:
//!
//! ```text
//! [0:4)            total size  = 4 + padded header length
//! [4:8)            JSON length = exact UTF-8 byte length, unpadded
//! [8:8+json_len)   header JSON bytes
//! [..payload base) zero padding to a 4-byte boundary
//! ```
//!
//! The payload base (where every file offset 0 begins) is
//! `8 + padded header length`.

use crate::error::{Error, Result};
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::{self, Read};

/// Size of the two length fields preceding the header JSON.
pub const FRAMING_LEN: u64 = 8;

/// Upper bound on the header JSON length. Real-world headers are a few
/// megabytes at most; anything past this is a corrupt or hostile length
/// field, not an archive.
const MAX_HEADER_LEN: u32 = 256 * 1024 * 1024;

const fn align4(len: u32) -> u32 {
	(len + 3) & !3
}

fn read_u32<R: Read>(data: &mut R) -> Result<u32> {
	data.read_u32::<LittleEndian>().map_err(truncated_framing)
}

fn truncated_framing(err: io::Error) -> Error {
	if err.kind() == io::ErrorKind::UnexpectedEof {
		Error::CorruptHeader("input shorter than declared framing".to_owned())
	} else {
		Error::Io(err)
	}
}

/// Reads the framing and returns the header JSON string together with the
/// payload base offset. The reader is left positioned at the payload base.
pub fn decode<R: Read>(data: &mut R) -> Result<(String, u64)> {
	let total_size = read_u32(data)?;
	let json_len = read_u32(data)?;
	if json_len > MAX_HEADER_LEN {
		return Err(Error::CorruptHeader(format!(
			"header length {json_len} exceeds the {MAX_HEADER_LEN} byte limit"
		)));
	}
	let padded_len = align4(4 + json_len);
	if total_size != 4 + padded_len {
		return Err(Error::CorruptHeader(format!(
			"framing sizes disagree: total size {total_size}, JSON length {json_len}"
		)));
	}
	let mut bytes = vec![0_u8; json_len as usize];
	data.read_exact(&mut bytes).map_err(truncated_framing)?;
	let mut padding = vec![0_u8; (padded_len - 4 - json_len) as usize];
	data.read_exact(&mut padding).map_err(truncated_framing)?;
	let json = String::from_utf8(bytes)
		.map_err(|err| Error::CorruptHeader(format!("header is not valid UTF-8: {err}")))?;
	Ok((json, FRAMING_LEN + u64::from(padded_len)))
}

/// Frames a header JSON string: both length fields followed by the JSON
/// bytes and zero padding to a 4-byte boundary.
pub fn encode(json: &str) -> Result<Vec<u8>> {
	let json_len = u32::try_from(json.len())
		.ok()
		.filter(|len| *len <= MAX_HEADER_LEN)
		.ok_or_else(|| {
			Error::CorruptHeader(format!(
				"header length {} exceeds the {MAX_HEADER_LEN} byte limit",
				json.len()
			))
		})?;
	let padded_len = align4(4 + json_len);
	let mut out = Vec::with_capacity(FRAMING_LEN as usize + padded_len as usize);
	out.write_u32::<LittleEndian>(4 + padded_len)?;
	out.write_u32::<LittleEndian>(json_len)?;
	out.extend_from_slice(json.as_bytes());
	out.resize(FRAMING_LEN as usize + padded_len as usize, 0);
	Ok(out)
}

#[cfg(test)]
mod test {
	use super::{decode, encode};
	use crate::error::Error;

	#[test]
	fn round_trip_at_every_padding_phase() {
		// Lengths 8..=11 cover all four alignment phases.
		for json in ["12345678", "123456789", "1234567890", "12345678901"] {
			let encoded = encode(json).expect("failed to encode");
			assert_eq!(encoded.len() % 4, 0, "framing must stay 4-byte aligned");
			let (decoded, payload_base) =
				decode(&mut &encoded[..]).expect("failed to decode");
			assert_eq!(decoded, json);
			assert_eq!(payload_base, encoded.len() as u64);
		}
	}

	#[test]
	fn payload_base_skips_padding() {
		let encoded = encode("{}").expect("failed to encode");
		// 4 (length field) + 2 (JSON) rounds up to 8.
		assert_eq!(encoded.len(), 16);
		let mut data = encoded.clone();
		data.extend_from_slice(b"payload");
		let (_, payload_base) = decode(&mut &data[..]).expect("failed to decode");
		assert_eq!(&data[payload_base as usize..], b"payload");
	}

	#[test]
	fn rejects_disagreeing_sizes() {
		let mut encoded = encode("{}").expect("failed to encode");
		encoded[0] ^= 1;
		assert!(matches!(
			decode(&mut &encoded[..]),
			Err(Error::CorruptHeader(_))
		));
	}

	#[test]
	fn rejects_truncated_input() {
		let encoded = encode("{\"files\":{}}").expect("failed to encode");
		for len in [0, 3, 7, encoded.len() - 1] {
			assert!(
				matches!(decode(&mut &encoded[..len]), Err(Error::CorruptHeader(_))),
				"prefix of {len} bytes must be rejected"
			);
		}
	}

	#[test]
	fn rejects_invalid_utf8() {
		let mut encoded = encode("{\"files\":{}}").expect("failed to encode");
		encoded[8] = 0xff;
		assert!(matches!(
			decode(&mut &encoded[..]),
			Err(Error::CorruptHeader(_))
		));
	}
}
