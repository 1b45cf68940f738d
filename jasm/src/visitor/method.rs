use anyhow::Result;
use java_string::JavaStr;
use crate::attribute::Attribute;
use crate::tree::{Constant, Handle, Label};
use crate::visitor::annotation::AnnotationVisitor;

/// Visits a method.
///
/// The expected order is: annotations and method attributes, then
/// `visit_code`, then instructions interleaved with `visit_label` /
/// `visit_line_number` (with `visit_try_catch_block` interspersed or at the
/// end), then `visit_local_variable` entries, then `visit_maxs`, then
/// `visit_end`. Methods without code skip everything between
/// `visit_code` and `visit_maxs`, inclusive.
///
/// Instruction events name their opcode with the canonical short form
/// folded away: a reader reports `iload_0` as `visit_var_insn(ILOAD, 0)`,
/// and a writer picks the shortest encoding itself.
pub trait MethodVisitor {
	/// The next visitor in the chain, if any. Defaults drive it.
	fn delegate(&mut self) -> Option<&mut dyn MethodVisitor> {
		None
	}

	/// Visits the default value of an annotation interface method. The
	/// returned visitor receives exactly one unnamed value.
	fn visit_annotation_default(&mut self) -> Result<Option<&mut dyn AnnotationVisitor>> {
		match self.delegate() {
			Some(next) => next.visit_annotation_default(),
			None => Ok(None),
		}
	}

	fn visit_annotation(&mut self, descriptor: &JavaStr, visible: bool) -> Result<Option<&mut dyn AnnotationVisitor>> {
		match self.delegate() {
			Some(next) => next.visit_annotation(descriptor, visible),
			None => Ok(None),
		}
	}

	/// Visits an annotation of the `parameter`th parameter, zero based.
	fn visit_parameter_annotation(&mut self, parameter: u8, descriptor: &JavaStr, visible: bool) -> Result<Option<&mut dyn AnnotationVisitor>> {
		match self.delegate() {
			Some(next) => next.visit_parameter_annotation(parameter, descriptor, visible),
			None => Ok(None),
		}
	}

	/// Visits an attribute this crate has no structured model for. Before
	/// `visit_code` this is a method attribute; afterwards it belongs to
	/// the `Code` attribute.
	fn visit_attribute(&mut self, attribute: &Attribute) -> Result<()> {
		match self.delegate() {
			Some(next) => next.visit_attribute(attribute),
			None => Ok(()),
		}
	}

	fn visit_code(&mut self) -> Result<()> {
		match self.delegate() {
			Some(next) => next.visit_code(),
			None => Ok(()),
		}
	}

	/// Visits an instruction without operands.
	fn visit_insn(&mut self, opcode: u8) -> Result<()> {
		match self.delegate() {
			Some(next) => next.visit_insn(opcode),
			None => Ok(()),
		}
	}

	/// Visits `bipush`, `sipush` or `newarray`.
	fn visit_int_insn(&mut self, opcode: u8, operand: i32) -> Result<()> {
		match self.delegate() {
			Some(next) => next.visit_int_insn(opcode, operand),
			None => Ok(()),
		}
	}

	/// Visits a load, store or `ret` on local variable `var`.
	fn visit_var_insn(&mut self, opcode: u8, var: u16) -> Result<()> {
		match self.delegate() {
			Some(next) => next.visit_var_insn(opcode, var),
			None => Ok(()),
		}
	}

	/// Visits `new`, `anewarray`, `checkcast` or `instanceof`, with the
	/// internal name of the class operand.
	fn visit_type_insn(&mut self, opcode: u8, name: &JavaStr) -> Result<()> {
		match self.delegate() {
			Some(next) => next.visit_type_insn(opcode, name),
			None => Ok(()),
		}
	}

	fn visit_field_insn(&mut self, opcode: u8, owner: &JavaStr, name: &JavaStr, descriptor: &JavaStr) -> Result<()> {
		match self.delegate() {
			Some(next) => next.visit_field_insn(opcode, owner, name, descriptor),
			None => Ok(()),
		}
	}

	fn visit_method_insn(&mut self, opcode: u8, owner: &JavaStr, name: &JavaStr, descriptor: &JavaStr) -> Result<()> {
		match self.delegate() {
			Some(next) => next.visit_method_insn(opcode, owner, name, descriptor),
			None => Ok(()),
		}
	}

	fn visit_invoke_dynamic_insn(&mut self, name: &JavaStr, descriptor: &JavaStr, bootstrap_method: &Handle, arguments: &[Constant]) -> Result<()> {
		match self.delegate() {
			Some(next) => next.visit_invoke_dynamic_insn(name, descriptor, bootstrap_method, arguments),
			None => Ok(()),
		}
	}

	/// Visits a jump. `goto_w`/`jsr_w` are reported as `GOTO`/`JSR`; the
	/// encoding width is the writer's business.
	fn visit_jump_insn(&mut self, opcode: u8, label: Label) -> Result<()> {
		match self.delegate() {
			Some(next) => next.visit_jump_insn(opcode, label),
			None => Ok(()),
		}
	}

	/// Visits a label. It marks the position of the next instruction.
	fn visit_label(&mut self, label: Label) -> Result<()> {
		match self.delegate() {
			Some(next) => next.visit_label(label),
			None => Ok(()),
		}
	}

	fn visit_ldc_insn(&mut self, constant: &Constant) -> Result<()> {
		match self.delegate() {
			Some(next) => next.visit_ldc_insn(constant),
			None => Ok(()),
		}
	}

	fn visit_iinc_insn(&mut self, var: u16, increment: i16) -> Result<()> {
		match self.delegate() {
			Some(next) => next.visit_iinc_insn(var, increment),
			None => Ok(()),
		}
	}

	fn visit_table_switch_insn(&mut self, min: i32, max: i32, default: Label, labels: &[Label]) -> Result<()> {
		match self.delegate() {
			Some(next) => next.visit_table_switch_insn(min, max, default, labels),
			None => Ok(()),
		}
	}

	fn visit_lookup_switch_insn(&mut self, default: Label, keys: &[i32], labels: &[Label]) -> Result<()> {
		match self.delegate() {
			Some(next) => next.visit_lookup_switch_insn(default, keys, labels),
			None => Ok(()),
		}
	}

	/// Visits `multianewarray`, with the array type as a field descriptor.
	fn visit_multi_anew_array_insn(&mut self, descriptor: &JavaStr, dimensions: u8) -> Result<()> {
		match self.delegate() {
			Some(next) => next.visit_multi_anew_array_insn(descriptor, dimensions),
			None => Ok(()),
		}
	}

	/// Visits an exception handler. `catch_type` is an internal name,
	/// [`None`] for `finally` handlers.
	fn visit_try_catch_block(&mut self, start: Label, end: Label, handler: Label, catch_type: Option<&JavaStr>) -> Result<()> {
		match self.delegate() {
			Some(next) => next.visit_try_catch_block(start, end, handler, catch_type),
			None => Ok(()),
		}
	}

	fn visit_local_variable(
		&mut self,
		name: &JavaStr,
		descriptor: &JavaStr,
		signature: Option<&JavaStr>,
		start: Label,
		end: Label,
		index: u16,
	) -> Result<()> {
		match self.delegate() {
			Some(next) => next.visit_local_variable(name, descriptor, signature, start, end, index),
			None => Ok(()),
		}
	}

	fn visit_line_number(&mut self, line: u16, start: Label) -> Result<()> {
		match self.delegate() {
			Some(next) => next.visit_line_number(line, start),
			None => Ok(()),
		}
	}

	/// Visits the operand stack and local variable sizes. A writer
	/// configured to compute them itself ignores the arguments.
	fn visit_maxs(&mut self, max_stack: u16, max_locals: u16) -> Result<()> {
		match self.delegate() {
			Some(next) => next.visit_maxs(max_stack, max_locals),
			None => Ok(()),
		}
	}

	fn visit_end(&mut self) -> Result<()> {
		match self.delegate() {
			Some(next) => next.visit_end(),
			None => Ok(()),
		}
	}
}
