//! Computes `max_stack` and `max_locals` from the instruction list.
//!
//! The stack size is found by a forward dataflow over basic blocks: each
//! instruction has a net stack effect, blocks are cut at labels and after
//! terminal instructions, and entry depths are propagated along jumps and
//! fallthrough until a fixed point. Exception handlers start at depth 1,
//! `jsr` targets get the pushed return address.

use std::collections::{BTreeSet, HashMap};
use anyhow::{Context, Result};
use java_string::JavaStr;
use crate::class_constants::{access, opcode};
use crate::descriptor;
use crate::error::Error;
use crate::tree::method::InsnNode;
use crate::tree::{Label, TryCatchBlockNode};

pub(crate) fn compute_maxs(
	method_access: u32,
	method_descriptor: &JavaStr,
	instructions: &[InsnNode],
	try_catch_blocks: &[TryCatchBlockNode],
) -> Result<(u16, u16)> {
	let max_locals = compute_max_locals(method_access, method_descriptor, instructions)?;
	let max_stack = compute_max_stack(instructions, try_catch_blocks)?;
	Ok((max_stack, max_locals))
}

fn compute_max_locals(method_access: u32, method_descriptor: &JavaStr, instructions: &[InsnNode]) -> Result<u16> {
	let this = u16::from(method_access & access::STATIC == 0);
	let mut max = descriptor::argument_slots(method_descriptor)?
		.checked_add(this)
		.context("too many argument slots")?;

	for insn in instructions {
		let needed = match *insn {
			InsnNode::Var { opcode, var } => {
				let width = match opcode {
					opcode::LLOAD | opcode::DLOAD | opcode::LSTORE | opcode::DSTORE => 2,
					_ => 1,
				};
				Some(var.checked_add(width))
			},
			InsnNode::Iinc { var, .. } => Some(var.checked_add(1)),
			_ => None,
		};
		if let Some(needed) = needed {
			let needed = needed.context("local variable index out of range")?;
			max = max.max(needed);
		}
	}
	Ok(max)
}

fn compute_max_stack(instructions: &[InsnNode], try_catch_blocks: &[TryCatchBlockNode]) -> Result<u16> {
	// Block boundaries: instruction indices that start a basic block.
	let mut starts = BTreeSet::from([0usize]);
	let mut label_to_index: HashMap<Label, usize> = HashMap::new();
	for (index, insn) in instructions.iter().enumerate() {
		match insn {
			InsnNode::Label(label) => {
				starts.insert(index);
				label_to_index.insert(*label, index);
			},
			insn if is_terminal(insn) => {
				starts.insert(index + 1);
			},
			_ => {},
		}
	}

	let block_of = |label: Label| -> Result<usize> {
		label_to_index.get(&label).copied().ok_or_else(|| Error::Unresolved(label).into())
	};

	// Entry depth per block, monotonically raised until a fixed point.
	let mut entries: HashMap<usize, i32> = HashMap::new();
	let mut worklist: Vec<(usize, i32)> = vec![(0, 0)];
	for block in try_catch_blocks {
		// the thrown reference is on the stack when the handler starts
		worklist.push((block_of(block.handler)?, 1));
	}

	let mut max = 0i32;
	while let Some((start, entry)) = worklist.pop() {
		match entries.get(&start) {
			Some(&known) if known >= entry => continue,
			_ => {},
		}
		entries.insert(start, entry);

		let mut enqueue = |worklist: &mut Vec<(usize, i32)>, start: usize, depth: i32| {
			worklist.push((start, depth));
		};

		let mut height = entry;
		max = max.max(height);
		let mut index = start;
		let mut falls_through = true;
		while index < instructions.len() && (index == start || !starts.contains(&index)) {
			let insn = &instructions[index];
			let delta = stack_delta(insn)?;

			match insn {
				InsnNode::Jump { opcode: opcode::GOTO, label } => {
					enqueue(&mut worklist, block_of(*label)?, height);
				},
				InsnNode::Jump { opcode: opcode::JSR, label } => {
					enqueue(&mut worklist, block_of(*label)?, height + 1);
				},
				InsnNode::Jump { label, .. } => {
					enqueue(&mut worklist, block_of(*label)?, height + delta);
				},
				InsnNode::TableSwitch { default, labels, .. } | InsnNode::LookupSwitch { default, labels, .. } => {
					enqueue(&mut worklist, block_of(*default)?, height + delta);
					for label in labels {
						enqueue(&mut worklist, block_of(*label)?, height + delta);
					}
				},
				_ => {},
			}

			height += delta;
			max = max.max(height);
			if is_terminal(insn) {
				falls_through = false;
			}
			index += 1;
		}

		if falls_through && index < instructions.len() {
			worklist.push((index, height));
		}
	}

	u16::try_from(max).context("operand stack grows beyond 65535 slots")
}

fn is_terminal(insn: &InsnNode) -> bool {
	match insn {
		InsnNode::Jump { opcode: opcode::GOTO, .. } => true,
		InsnNode::TableSwitch { .. } | InsnNode::LookupSwitch { .. } => true,
		InsnNode::Var { opcode: opcode::RET, .. } => true,
		InsnNode::Insn { opcode } => matches!(
			*opcode,
			opcode::IRETURN
				| opcode::LRETURN
				| opcode::FRETURN
				| opcode::DRETURN
				| opcode::ARETURN
				| opcode::RETURN
				| opcode::ATHROW
		),
		_ => false,
	}
}

/// The net stack effect of one instruction.
fn stack_delta(insn: &InsnNode) -> Result<i32> {
	Ok(match insn {
		InsnNode::Insn { opcode } => insn_delta(*opcode),
		InsnNode::Int { opcode, .. } => match *opcode {
			opcode::NEWARRAY => 0,
			_ => 1, // bipush, sipush
		},
		InsnNode::Var { opcode, .. } => match *opcode {
			opcode::ILOAD | opcode::FLOAD | opcode::ALOAD => 1,
			opcode::LLOAD | opcode::DLOAD => 2,
			opcode::ISTORE | opcode::FSTORE | opcode::ASTORE => -1,
			opcode::LSTORE | opcode::DSTORE => -2,
			_ => 0, // ret
		},
		InsnNode::Type { opcode, .. } => match *opcode {
			opcode::NEW => 1,
			_ => 0, // anewarray, checkcast, instanceof
		},
		InsnNode::Field { opcode, descriptor, .. } => {
			let slots = descriptor::field_slots(descriptor) as i32;
			match *opcode {
				opcode::GETSTATIC => slots,
				opcode::PUTSTATIC => -slots,
				opcode::GETFIELD => slots - 1,
				_ => -slots - 1, // putfield
			}
		},
		InsnNode::Method { opcode, descriptor, .. } => {
			let arguments = descriptor::argument_slots(descriptor)? as i32;
			let returned = descriptor::return_slots(descriptor)? as i32;
			let this = i32::from(*opcode != opcode::INVOKESTATIC);
			returned - arguments - this
		},
		InsnNode::InvokeDynamic { descriptor, .. } => {
			let arguments = descriptor::argument_slots(descriptor)? as i32;
			let returned = descriptor::return_slots(descriptor)? as i32;
			returned - arguments
		},
		InsnNode::Jump { opcode, .. } => match *opcode {
			opcode::GOTO => 0,
			opcode::JSR => 0, // the pushed address goes to the jump target
			opcode::IF_ICMPEQ
			| opcode::IF_ICMPNE
			| opcode::IF_ICMPLT
			| opcode::IF_ICMPGE
			| opcode::IF_ICMPGT
			| opcode::IF_ICMPLE
			| opcode::IF_ACMPEQ
			| opcode::IF_ACMPNE => -2,
			_ => -1, // ifeq..ifle, ifnull, ifnonnull
		},
		InsnNode::Label(_) | InsnNode::LineNumber { .. } | InsnNode::Iinc { .. } => 0,
		InsnNode::Ldc(constant) => {
			if constant.is_wide() { 2 } else { 1 }
		},
		InsnNode::TableSwitch { .. } | InsnNode::LookupSwitch { .. } => -1,
		InsnNode::MultiANewArray { dimensions, .. } => 1 - *dimensions as i32,
	})
}

fn insn_delta(opcode: u8) -> i32 {
	match opcode {
		opcode::ACONST_NULL
		| opcode::ICONST_M1
		| opcode::ICONST_0
		| opcode::ICONST_1
		| opcode::ICONST_2
		| opcode::ICONST_3
		| opcode::ICONST_4
		| opcode::ICONST_5
		| opcode::FCONST_0
		| opcode::FCONST_1
		| opcode::FCONST_2 => 1,
		opcode::LCONST_0 | opcode::LCONST_1 | opcode::DCONST_0 | opcode::DCONST_1 => 2,
		opcode::IALOAD | opcode::FALOAD | opcode::AALOAD | opcode::BALOAD | opcode::CALOAD | opcode::SALOAD => -1,
		opcode::LALOAD | opcode::DALOAD => 0,
		opcode::IASTORE | opcode::FASTORE | opcode::AASTORE | opcode::BASTORE | opcode::CASTORE | opcode::SASTORE => -3,
		opcode::LASTORE | opcode::DASTORE => -4,
		opcode::POP => -1,
		opcode::POP2 => -2,
		opcode::DUP | opcode::DUP_X1 | opcode::DUP_X2 => 1,
		opcode::DUP2 | opcode::DUP2_X1 | opcode::DUP2_X2 => 2,
		opcode::SWAP => 0,
		opcode::IADD | opcode::FADD | opcode::ISUB | opcode::FSUB | opcode::IMUL | opcode::FMUL
		| opcode::IDIV | opcode::FDIV | opcode::IREM | opcode::FREM => -1,
		opcode::LADD | opcode::DADD | opcode::LSUB | opcode::DSUB | opcode::LMUL | opcode::DMUL
		| opcode::LDIV | opcode::DDIV | opcode::LREM | opcode::DREM => -2,
		opcode::INEG | opcode::LNEG | opcode::FNEG | opcode::DNEG => 0,
		opcode::ISHL | opcode::ISHR | opcode::IUSHR | opcode::LSHL | opcode::LSHR | opcode::LUSHR => -1,
		opcode::IAND | opcode::IOR | opcode::IXOR => -1,
		opcode::LAND | opcode::LOR | opcode::LXOR => -2,
		opcode::I2L | opcode::I2D | opcode::F2L | opcode::F2D => 1,
		opcode::I2F | opcode::L2D | opcode::F2I | opcode::D2L | opcode::I2B | opcode::I2C | opcode::I2S => 0,
		opcode::L2I | opcode::L2F | opcode::D2I | opcode::D2F => -1,
		opcode::LCMP | opcode::DCMPL | opcode::DCMPG => -3,
		opcode::FCMPL | opcode::FCMPG => -1,
		opcode::IRETURN | opcode::FRETURN | opcode::ARETURN | opcode::ATHROW => -1,
		opcode::LRETURN | opcode::DRETURN => -2,
		opcode::MONITORENTER | opcode::MONITOREXIT => -1,
		// nop, arraylength, return and the rest of the operand-free group
		_ => 0,
	}
}
