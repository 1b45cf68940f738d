//! The error taxonomy of this crate.
//!
//! Every fallible function returns [`anyhow::Result`]; errors of the kinds
//! below are constructed as [`Error`] values at the failure site, so callers
//! that care can recover them with [`anyhow::Error::downcast_ref`].

use crate::tree::Label;

#[derive(Debug, thiserror::Error)]
pub enum Error {
	/// Malformed input while reading.
	#[error("invalid class file at offset {offset}: {reason}")]
	InvalidClassFile { offset: u64, reason: String },
	/// A visitor method was called outside the grammar the writer expects.
	#[error("visitor called out of order: expected {expected}, got {got}")]
	InvalidSequence { expected: &'static str, got: &'static str },
	/// The constant pool ran out of indices.
	#[error("constant pool may hold at most 65535 slots")]
	PoolOverflow,
	/// A branch offset is unrepresentable even in its widest encoding.
	#[error("branch offset out of range after widening")]
	BranchOverflow,
	/// A method was finalized while a jump target still had no offset.
	#[error("label {0:?} was never visited in this method")]
	Unresolved(Label),
	#[error("unsupported class file version {major}.{minor}")]
	UnsupportedVersion { major: u16, minor: u16 },
	#[error(transparent)]
	Io(#[from] std::io::Error),
}

impl Error {
	pub(crate) fn invalid(offset: u64, reason: impl Into<String>) -> anyhow::Error {
		anyhow::Error::new(Error::InvalidClassFile { offset, reason: reason.into() })
	}
}
