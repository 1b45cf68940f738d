//! Conversion between the class file's "modified UTF-8" and [`JavaString`].

use std::borrow::Cow;
use anyhow::{Context, Result};
use java_string::{JavaStr, JavaString};

/// Decodes bytes in modified UTF-8, as stored in `CONSTANT_Utf8_info` entries.
pub(crate) fn from_vec_to_string(vec: Vec<u8>) -> Result<JavaString> {
	JavaString::from_modified_utf8(vec)
		.context("can't read modified utf-8 data")
}

/// Encodes a string into modified UTF-8 for writing a `CONSTANT_Utf8_info` entry.
pub(crate) fn from_string_to_vec(string: &JavaStr) -> Cow<[u8]> {
	string.to_modified_utf8()
}

#[cfg(test)]
mod testing {
	use anyhow::Result;
	use java_string::JavaStr;
	use pretty_assertions::assert_eq;
	use super::{from_string_to_vec, from_vec_to_string};

	fn round_trip(raw: &[u8], str: &JavaStr) -> Result<()> {
		assert_eq!(from_vec_to_string(raw.to_owned())?, str);
		assert_eq!(from_string_to_vec(str), raw);
		Ok(())
	}

	#[test]
	fn ascii() -> Result<()> {
		round_trip(b"java/lang/Object", JavaStr::from_str("java/lang/Object"))?;
		round_trip(b"<init>", JavaStr::from_str("<init>"))
	}

	#[test]
	fn embedded_nul() -> Result<()> {
		// the nul code point uses the two byte encoding
		round_trip(&[0x61, 0xc0, 0x80, 0x62], JavaStr::from_str("a\u{0000}b"))
	}

	#[test]
	fn two_and_three_byte_forms() -> Result<()> {
		round_trip(&[0xc2, 0x80, 0xdf, 0xbf], JavaStr::from_str("\u{0080}\u{07ff}"))?;
		round_trip(&[0xe0, 0xa0, 0x80, 0xef, 0xbf, 0xbf], JavaStr::from_str("\u{0800}\u{ffff}"))
	}

	#[test]
	fn supplementary_pairs() -> Result<()> {
		// code points above U+FFFF are stored as surrogate pairs, three bytes each
		round_trip(
			&[0xed, 0xa0, 0x80, 0xed, 0xb0, 0x80, 0xed, 0xaf, 0xbf, 0xed, 0xbf, 0xbf],
			JavaStr::from_str("\u{10000}\u{10ffff}"),
		)
	}

	#[test]
	fn rejects_truncated_sequence() {
		assert!(from_vec_to_string(vec![0x61, 0xe0, 0xa0]).is_err());
	}
}
