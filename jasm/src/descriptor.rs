//! Small helpers for walking field and method descriptors.

use anyhow::{bail, Result};
use java_string::JavaStr;

/// How many local variable slots a single value of type `desc` takes.
pub(crate) fn field_slots(desc: &JavaStr) -> u16 {
	match desc.as_bytes().first() {
		Some(b'J') | Some(b'D') => 2,
		_ => 1,
	}
}

/// The number of local variable slots the arguments of a method descriptor
/// occupy. `J` and `D` count twice.
pub(crate) fn argument_slots(desc: &JavaStr) -> Result<u16> {
	walk_arguments(desc, |slots, _| *slots += 1, |slots, _| *slots += 2, 0u16)
}

/// The number of parameters of a method descriptor.
pub(crate) fn parameter_count(desc: &JavaStr) -> Result<u8> {
	walk_arguments(desc, |count, _| *count += 1, |count, _| *count += 1, 0u8)
}

/// The number of stack slots the return value of a method descriptor takes.
pub(crate) fn return_slots(desc: &JavaStr) -> Result<u16> {
	let bytes = desc.as_bytes();
	let close = bytes.iter().position(|&b| b == b')')
		.ok_or_else(|| anyhow::anyhow!("method descriptor {desc:?} has no parameter list"))?;
	Ok(match bytes.get(close + 1) {
		Some(b'V') => 0,
		Some(b'J') | Some(b'D') => 2,
		Some(_) => 1,
		None => bail!("method descriptor {desc:?} has no return type"),
	})
}

fn walk_arguments<A>(
	desc: &JavaStr,
	mut narrow: impl FnMut(&mut A, usize),
	mut wide: impl FnMut(&mut A, usize),
	mut acc: A,
) -> Result<A> {
	let bytes = desc.as_bytes();
	if bytes.first() != Some(&b'(') {
		bail!("method descriptor {desc:?} doesn't start with a parameter list");
	}
	let mut i = 1;
	loop {
		match bytes.get(i) {
			None => bail!("method descriptor {desc:?} has an unterminated parameter list"),
			Some(b')') => return Ok(acc),
			Some(b'J') | Some(b'D') => {
				wide(&mut acc, i);
				i += 1;
			},
			Some(b'B' | b'C' | b'F' | b'I' | b'S' | b'Z') => {
				narrow(&mut acc, i);
				i += 1;
			},
			Some(b'L') => {
				let end = bytes[i..].iter().position(|&b| b == b';')
					.ok_or_else(|| anyhow::anyhow!("unterminated class type in descriptor {desc:?}"))?;
				narrow(&mut acc, i);
				i += end + 1;
			},
			Some(b'[') => {
				// arrays are a single reference regardless of element type
				let mut j = i;
				while bytes.get(j) == Some(&b'[') {
					j += 1;
				}
				match bytes.get(j) {
					Some(b'L') => {
						let end = bytes[j..].iter().position(|&b| b == b';')
							.ok_or_else(|| anyhow::anyhow!("unterminated class type in descriptor {desc:?}"))?;
						narrow(&mut acc, i);
						i = j + end + 1;
					},
					Some(b'B' | b'C' | b'D' | b'F' | b'I' | b'J' | b'S' | b'Z') => {
						narrow(&mut acc, i);
						i = j + 1;
					},
					_ => bail!("invalid array element type in descriptor {desc:?}"),
				}
			},
			Some(other) => bail!("invalid type {:?} in descriptor {desc:?}", *other as char),
		}
	}
}

#[cfg(test)]
mod testing {
	use anyhow::Result;
	use java_string::JavaStr;
	use super::{argument_slots, parameter_count, return_slots};

	#[test]
	fn slots() -> Result<()> {
		assert_eq!(argument_slots(JavaStr::from_str("()V"))?, 0);
		assert_eq!(argument_slots(JavaStr::from_str("(IJ)V"))?, 3);
		assert_eq!(argument_slots(JavaStr::from_str("(Ljava/lang/String;[JD)I"))?, 4);
		assert_eq!(argument_slots(JavaStr::from_str("([[ILjava/lang/Object;)J"))?, 2);
		Ok(())
	}

	#[test]
	fn parameters() -> Result<()> {
		assert_eq!(parameter_count(JavaStr::from_str("()V"))?, 0);
		assert_eq!(parameter_count(JavaStr::from_str("(IJ)V"))?, 2);
		assert_eq!(parameter_count(JavaStr::from_str("(Ljava/lang/String;[JD)I"))?, 3);
		Ok(())
	}

	#[test]
	fn returns() -> Result<()> {
		assert_eq!(return_slots(JavaStr::from_str("()V"))?, 0);
		assert_eq!(return_slots(JavaStr::from_str("(I)J"))?, 2);
		assert_eq!(return_slots(JavaStr::from_str("(J)[J"))?, 1);
		Ok(())
	}
}
