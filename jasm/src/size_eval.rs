//! Estimates the encoded size of a method body before writing it.
//!
//! [`CodeSizeEvaluator`] sits in a visitor chain and accumulates a
//! minimum and maximum byte count for the instructions it sees. The two
//! bounds differ where the encoder itself has a choice: `goto` and `jsr`
//! may be widened to their four byte forms, `ldc` may need a two byte
//! pool index, `iinc` may need the `wide` prefix and switch padding
//! depends on the final instruction offsets.

use anyhow::Result;
use java_string::JavaStr;
use crate::class_constants::opcode;
use crate::tree::{Constant, Handle, Label};
use crate::visitor::method::MethodVisitor;

pub struct CodeSizeEvaluator<'a> {
	inner: Option<&'a mut dyn MethodVisitor>,
	min_size: usize,
	max_size: usize,
}

impl<'a> CodeSizeEvaluator<'a> {
	pub fn new(inner: Option<&'a mut dyn MethodVisitor>) -> CodeSizeEvaluator<'a> {
		CodeSizeEvaluator { inner, min_size: 0, max_size: 0 }
	}

	pub fn min_size(&self) -> usize {
		self.min_size
	}

	pub fn max_size(&self) -> usize {
		self.max_size
	}

	fn add(&mut self, min: usize, max: usize) {
		self.min_size += min;
		self.max_size += max;
	}
}

impl MethodVisitor for CodeSizeEvaluator<'_> {
	fn delegate(&mut self) -> Option<&mut dyn MethodVisitor> {
		match self.inner.as_deref_mut() {
			Some(inner) => Some(inner),
			None => None,
		}
	}

	fn visit_insn(&mut self, opcode: u8) -> Result<()> {
		self.add(1, 1);
		if let Some(inner) = self.delegate() {
			inner.visit_insn(opcode)?;
		}
		Ok(())
	}

	fn visit_int_insn(&mut self, opcode: u8, operand: i32) -> Result<()> {
		if opcode == opcode::SIPUSH {
			self.add(3, 3);
		} else {
			self.add(2, 2);
		}
		if let Some(inner) = self.delegate() {
			inner.visit_int_insn(opcode, operand)?;
		}
		Ok(())
	}

	fn visit_var_insn(&mut self, opcode: u8, var: u16) -> Result<()> {
		if var < 4 && opcode != opcode::RET {
			self.add(1, 1);
		} else if var <= u8::MAX as u16 {
			self.add(2, 2);
		} else {
			self.add(4, 4);
		}
		if let Some(inner) = self.delegate() {
			inner.visit_var_insn(opcode, var)?;
		}
		Ok(())
	}

	fn visit_type_insn(&mut self, opcode: u8, name: &JavaStr) -> Result<()> {
		self.add(3, 3);
		if let Some(inner) = self.delegate() {
			inner.visit_type_insn(opcode, name)?;
		}
		Ok(())
	}

	fn visit_field_insn(&mut self, opcode: u8, owner: &JavaStr, name: &JavaStr, descriptor: &JavaStr) -> Result<()> {
		self.add(3, 3);
		if let Some(inner) = self.delegate() {
			inner.visit_field_insn(opcode, owner, name, descriptor)?;
		}
		Ok(())
	}

	fn visit_method_insn(&mut self, opcode: u8, owner: &JavaStr, name: &JavaStr, descriptor: &JavaStr) -> Result<()> {
		if opcode == opcode::INVOKEINTERFACE {
			self.add(5, 5);
		} else {
			self.add(3, 3);
		}
		if let Some(inner) = self.delegate() {
			inner.visit_method_insn(opcode, owner, name, descriptor)?;
		}
		Ok(())
	}

	fn visit_invoke_dynamic_insn(
		&mut self,
		name: &JavaStr,
		descriptor: &JavaStr,
		bootstrap_method: &Handle,
		arguments: &[Constant],
	) -> Result<()> {
		self.add(5, 5);
		if let Some(inner) = self.delegate() {
			inner.visit_invoke_dynamic_insn(name, descriptor, bootstrap_method, arguments)?;
		}
		Ok(())
	}

	fn visit_jump_insn(&mut self, opcode: u8, label: Label) -> Result<()> {
		if opcode == opcode::GOTO || opcode == opcode::JSR {
			// may be widened to goto_w or jsr_w
			self.add(3, 5);
		} else {
			self.add(3, 3);
		}
		if let Some(inner) = self.delegate() {
			inner.visit_jump_insn(opcode, label)?;
		}
		Ok(())
	}

	fn visit_ldc_insn(&mut self, constant: &Constant) -> Result<()> {
		if constant.is_wide() {
			self.add(3, 3);
		} else {
			self.add(2, 3);
		}
		if let Some(inner) = self.delegate() {
			inner.visit_ldc_insn(constant)?;
		}
		Ok(())
	}

	fn visit_iinc_insn(&mut self, var: u16, increment: i16) -> Result<()> {
		if var <= u8::MAX as u16 && i8::try_from(increment).is_ok() {
			self.add(3, 3);
		} else {
			self.add(6, 6);
		}
		if let Some(inner) = self.delegate() {
			inner.visit_iinc_insn(var, increment)?;
		}
		Ok(())
	}

	fn visit_table_switch_insn(&mut self, min: i32, max: i32, default: Label, labels: &[Label]) -> Result<()> {
		// up to three padding bytes
		let fixed = 13 + 4 * labels.len();
		self.add(fixed, fixed + 3);
		if let Some(inner) = self.delegate() {
			inner.visit_table_switch_insn(min, max, default, labels)?;
		}
		Ok(())
	}

	fn visit_lookup_switch_insn(&mut self, default: Label, keys: &[i32], labels: &[Label]) -> Result<()> {
		let fixed = 9 + 8 * labels.len();
		self.add(fixed, fixed + 3);
		if let Some(inner) = self.delegate() {
			inner.visit_lookup_switch_insn(default, keys, labels)?;
		}
		Ok(())
	}

	fn visit_multi_anew_array_insn(&mut self, descriptor: &JavaStr, dimensions: u8) -> Result<()> {
		self.add(4, 4);
		if let Some(inner) = self.delegate() {
			inner.visit_multi_anew_array_insn(descriptor, dimensions)?;
		}
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use anyhow::Result;
	use java_string::JavaStr;
	use pretty_assertions::assert_eq;
	use crate::class_constants::opcode;
	use crate::tree::{Constant, Label};
	use crate::visitor::method::MethodVisitor;
	use super::CodeSizeEvaluator;

	#[test]
	fn straight_line_code_has_tight_bounds() -> Result<()> {
		let mut eval = CodeSizeEvaluator::new(None);
		eval.visit_int_insn(opcode::BIPUSH, 7)?;
		eval.visit_var_insn(opcode::ISTORE, 1)?;
		eval.visit_var_insn(opcode::ILOAD, 1)?;
		eval.visit_insn(opcode::IRETURN)?;
		assert_eq!((eval.min_size(), eval.max_size()), (5, 5));
		Ok(())
	}

	#[test]
	fn gotos_may_widen() -> Result<()> {
		let mut eval = CodeSizeEvaluator::new(None);
		eval.visit_jump_insn(opcode::GOTO, Label::new(0))?;
		eval.visit_jump_insn(opcode::IFEQ, Label::new(0))?;
		assert_eq!((eval.min_size(), eval.max_size()), (6, 8));
		Ok(())
	}

	#[test]
	fn constants_depend_on_the_pool_index() -> Result<()> {
		let mut eval = CodeSizeEvaluator::new(None);
		eval.visit_ldc_insn(&Constant::Integer(3))?;
		eval.visit_ldc_insn(&Constant::Long(3))?;
		assert_eq!((eval.min_size(), eval.max_size()), (5, 6));
		Ok(())
	}

	#[test]
	fn switch_padding_is_an_upper_bound() -> Result<()> {
		let labels = [Label::new(1), Label::new(2)];
		let mut eval = CodeSizeEvaluator::new(None);
		eval.visit_table_switch_insn(0, 1, Label::new(0), &labels)?;
		assert_eq!((eval.min_size(), eval.max_size()), (21, 24));

		let mut eval = CodeSizeEvaluator::new(None);
		eval.visit_lookup_switch_insn(Label::new(0), &[1, 5], &labels)?;
		assert_eq!((eval.min_size(), eval.max_size()), (25, 28));
		Ok(())
	}

	#[test]
	fn wide_increments_take_six_bytes() -> Result<()> {
		let mut eval = CodeSizeEvaluator::new(None);
		eval.visit_iinc_insn(3, 1)?;
		eval.visit_iinc_insn(3, 200)?;
		eval.visit_iinc_insn(300, 1)?;
		assert_eq!((eval.min_size(), eval.max_size()), (15, 15));
		Ok(())
	}

	#[test]
	fn events_still_reach_the_inner_visitor() -> Result<()> {
		struct Counter(u32);
		impl MethodVisitor for Counter {
			fn visit_insn(&mut self, _opcode: u8) -> Result<()> {
				self.0 += 1;
				Ok(())
			}
		}

		let mut counter = Counter(0);
		{
			let mut eval = CodeSizeEvaluator::new(Some(&mut counter));
			eval.visit_insn(opcode::DUP)?;
			eval.visit_insn(opcode::POP)?;
			eval.visit_type_insn(opcode::NEW, JavaStr::from_str("java/lang/Object"))?;
			assert_eq!((eval.min_size(), eval.max_size()), (5, 5));
		}
		assert_eq!(counter.0, 2);
		Ok(())
	}
}
