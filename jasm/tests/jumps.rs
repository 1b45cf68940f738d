//! Branch encoding: short forms, widening past the `i16` range and the
//! padding of switch instructions.

use anyhow::Result;
use java_string::JavaStr;
use pretty_assertions::assert_eq;
use jasm::class_constants::{access, opcode};
use jasm::tree::version::Version;
use jasm::tree::Label;
use jasm::visitor::{ClassVisitor, MethodVisitor};
use jasm::{ClassWriter, WriterFlags};

mod common;
use common::RawClass;

/// Runs `body` inside a fresh static void method and returns its bytecode.
fn emit(body: impl FnOnce(&mut dyn MethodVisitor) -> Result<()>) -> Result<Vec<u8>> {
	let mut writer = ClassWriter::new(WriterFlags::NONE);
	writer.visit(
		Version::V1_8,
		access::PUBLIC | access::SUPER,
		JavaStr::from_str("A"),
		None,
		Some(JavaStr::from_str("java/lang/Object")),
		&[],
	)?;
	if let Some(mv) = writer.visit_method(access::STATIC, JavaStr::from_str("m"), JavaStr::from_str("()V"), None, &[])? {
		mv.visit_code()?;
		body(mv)?;
		mv.visit_maxs(1, 1)?;
		mv.visit_end()?;
	}
	writer.visit_end()?;

	let bytes = writer.to_bytes()?;
	Ok(RawClass::parse(&bytes).bytecode(0).to_vec())
}

fn i32_at(code: &[u8], pos: usize) -> i32 {
	i32::from_be_bytes([code[pos], code[pos + 1], code[pos + 2], code[pos + 3]])
}

#[test]
fn short_jumps_stay_short() -> Result<()> {
	let target = Label::new(0);
	let code = emit(|mv| {
		mv.visit_label(target)?;
		mv.visit_insn(opcode::NOP)?;
		mv.visit_jump_insn(opcode::GOTO, target)?;
		Ok(())
	})?;
	assert_eq!(code, vec![opcode::NOP, opcode::GOTO, 0xFF, 0xFF]);
	Ok(())
}

#[test]
fn far_forward_goto_becomes_goto_w() -> Result<()> {
	let target = Label::new(0);
	let code = emit(|mv| {
		mv.visit_jump_insn(opcode::GOTO, target)?;
		for _ in 0..40_000 {
			mv.visit_insn(opcode::NOP)?;
		}
		mv.visit_label(target)?;
		mv.visit_insn(opcode::RETURN)?;
		Ok(())
	})?;

	assert_eq!(code[0], opcode::GOTO_W);
	assert_eq!(i32_at(&code, 1), 5 + 40_000);
	assert_eq!(code.len(), 5 + 40_000 + 1);
	assert_eq!(code[code.len() - 1], opcode::RETURN);
	Ok(())
}

#[test]
fn far_conditional_jump_is_inverted_around_a_goto_w() -> Result<()> {
	let target = Label::new(0);
	let code = emit(|mv| {
		mv.visit_var_insn(opcode::ILOAD, 0)?;
		mv.visit_jump_insn(opcode::IFEQ, target)?;
		for _ in 0..40_000 {
			mv.visit_insn(opcode::NOP)?;
		}
		mv.visit_label(target)?;
		mv.visit_insn(opcode::RETURN)?;
		Ok(())
	})?;

	// iload_0, then the inverted condition skipping over a goto_w
	assert_eq!(code[0], opcode::ILOAD_0);
	assert_eq!(code[1], opcode::IFNE);
	assert_eq!(i16::from_be_bytes([code[2], code[3]]), 8);
	assert_eq!(code[4], opcode::GOTO_W);
	let target_pc = 1 + 8 + 40_000;
	assert_eq!(i32_at(&code, 5), target_pc - 4);
	assert_eq!(code[target_pc as usize], opcode::RETURN);
	Ok(())
}

#[test]
fn null_checks_invert_to_each_other() -> Result<()> {
	let target = Label::new(0);
	let code = emit(|mv| {
		mv.visit_var_insn(opcode::ALOAD, 0)?;
		mv.visit_jump_insn(opcode::IFNULL, target)?;
		for _ in 0..40_000 {
			mv.visit_insn(opcode::NOP)?;
		}
		mv.visit_label(target)?;
		mv.visit_insn(opcode::RETURN)?;
		Ok(())
	})?;

	assert_eq!(code[1], opcode::IFNONNULL);
	assert_eq!(code[4], opcode::GOTO_W);
	Ok(())
}

#[test]
fn far_backward_goto_becomes_goto_w() -> Result<()> {
	let target = Label::new(0);
	let code = emit(|mv| {
		mv.visit_label(target)?;
		for _ in 0..40_000 {
			mv.visit_insn(opcode::NOP)?;
		}
		mv.visit_jump_insn(opcode::GOTO, target)?;
		Ok(())
	})?;

	assert_eq!(code[40_000], opcode::GOTO_W);
	assert_eq!(i32_at(&code, 40_001), -40_000);
	Ok(())
}

#[test]
fn switch_padding_depends_on_the_opcode_pc() -> Result<()> {
	let default = Label::new(0);
	let code = emit(|mv| {
		mv.visit_insn(opcode::NOP)?;
		mv.visit_var_insn(opcode::ILOAD, 0)?;
		mv.visit_lookup_switch_insn(default, &[4, 9], &[Label::new(1), Label::new(2)])?;
		mv.visit_label(default)?;
		mv.visit_label(Label::new(1))?;
		mv.visit_label(Label::new(2))?;
		mv.visit_insn(opcode::RETURN)?;
		Ok(())
	})?;

	// lookupswitch at pc 2; one byte of padding puts the operands at
	// a multiple of four from the code start
	assert_eq!(code[2], opcode::LOOKUPSWITCH);
	assert_eq!(code[3], 0);
	let operands = 4;
	// default, npairs, then two key/offset pairs; all labels sit right after
	let end = operands + 4 + 4 + 2 * 8;
	assert_eq!(i32_at(&code, operands), end as i32 - 2);
	assert_eq!(i32_at(&code, operands + 4), 2); // npairs
	assert_eq!(i32_at(&code, operands + 8), 4); // first key
	assert_eq!(i32_at(&code, operands + 12), end as i32 - 2);
	assert_eq!(i32_at(&code, operands + 16), 9); // second key
	assert_eq!(code[end], opcode::RETURN);
	Ok(())
}

#[test]
fn jumping_to_an_unresolved_label_fails() -> Result<()> {
	let mut writer = ClassWriter::new(WriterFlags::NONE);
	writer.visit(
		Version::V1_8,
		access::PUBLIC | access::SUPER,
		JavaStr::from_str("A"),
		None,
		Some(JavaStr::from_str("java/lang/Object")),
		&[],
	)?;
	let mv = writer
		.visit_method(access::STATIC, JavaStr::from_str("m"), JavaStr::from_str("()V"), None, &[])?
		.expect("method writer");
	mv.visit_code()?;
	mv.visit_jump_insn(opcode::GOTO, Label::new(7))?;
	mv.visit_maxs(0, 0)?;
	assert!(mv.visit_end().is_err());
	Ok(())
}
