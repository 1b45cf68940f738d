use std::collections::HashMap;
use anyhow::Result;
use crate::error::Error;
use crate::tree::Label;

/// Label to bytecode offset bookkeeping for one encoding attempt.
pub(crate) struct LabelOffsets {
	offsets: HashMap<Label, u16>,
}

impl LabelOffsets {
	pub(crate) fn new() -> LabelOffsets {
		LabelOffsets { offsets: HashMap::new() }
	}

	pub(crate) fn add(&mut self, label: Label, offset: u16) {
		self.offsets.insert(label, offset);
	}

	pub(crate) fn get(&self, label: Label) -> Option<u16> {
		self.offsets.get(&label).copied()
	}

	pub(crate) fn try_get(&self, label: Label) -> Result<u16> {
		self.get(label).ok_or_else(|| Error::Unresolved(label).into())
	}

	/// Resolves a label range to `(start, length)`, as the
	/// `LocalVariableTable` stores it.
	pub(crate) fn try_get_range(&self, start: Label, end: Label) -> Result<(u16, u16)> {
		let start = self.try_get(start)?;
		let end = self.try_get(end)?;
		Ok((start, end.wrapping_sub(start)))
	}

	pub(crate) fn next_attempt(&mut self) {
		self.offsets = HashMap::with_capacity(self.offsets.len());
	}
}

/// A forward reference: a branch operand whose target label had no offset
/// yet when the instruction was written. Patched after the instruction
/// stream of the attempt is complete.
pub(crate) struct ForwardRef {
	/// Bytecode offset the branch is computed relative to.
	pub(crate) opcode_pos: u16,
	/// Index into the recorded instruction list, stable across attempts.
	pub(crate) instruction_index: usize,
	pub(crate) label: Label,
	/// Buffer position of the reserved `i16` or `i32` operand.
	pub(crate) operand_pos: usize,
	/// Whether an `i32` was reserved instead of an `i16`.
	pub(crate) wide: bool,
}

pub(crate) fn signed_offset(opcode_pos: u16, target: u16) -> i32 {
	(target as i32) - (opcode_pos as i32)
}

pub(crate) fn patch_i16(buf: &mut [u8], pos: usize, value: i16) {
	let [a, b] = value.to_be_bytes();
	buf[pos] = a;
	buf[pos + 1] = b;
}

pub(crate) fn patch_i32(buf: &mut [u8], pos: usize, value: i32) {
	let [a, b, c, d] = value.to_be_bytes();
	buf[pos] = a;
	buf[pos + 1] = b;
	buf[pos + 2] = c;
	buf[pos + 3] = d;
}
