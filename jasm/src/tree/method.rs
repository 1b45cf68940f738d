use std::collections::HashMap;
use anyhow::{Context, Result};
use java_string::{JavaStr, JavaString};
use crate::attribute::Attribute;
use crate::error::Error;
use crate::tree::annotation::{accept_value, AnnotationNode, ArrayValueNode, ElementValue};
use crate::tree::{Constant, Handle, Label, LocalVariableNode, TryCatchBlockNode};
use crate::visitor::annotation::AnnotationVisitor;
use crate::visitor::method::MethodVisitor;
use crate::visitor::ClassVisitor;

/// One instruction, or one of the markers interleaved with them.
///
/// `Label` and `LineNumber` are positions, not instructions; they refer to
/// the next real instruction in the list.
#[derive(Debug, Clone, PartialEq)]
pub enum InsnNode {
	Insn { opcode: u8 },
	Int { opcode: u8, operand: i32 },
	Var { opcode: u8, var: u16 },
	Type { opcode: u8, name: JavaString },
	Field { opcode: u8, owner: JavaString, name: JavaString, descriptor: JavaString },
	Method { opcode: u8, owner: JavaString, name: JavaString, descriptor: JavaString },
	InvokeDynamic { name: JavaString, descriptor: JavaString, bootstrap_method: Handle, arguments: Vec<Constant> },
	Jump { opcode: u8, label: Label },
	Label(Label),
	Ldc(Constant),
	Iinc { var: u16, increment: i16 },
	TableSwitch { min: i32, max: i32, default: Label, labels: Vec<Label> },
	LookupSwitch { default: Label, keys: Vec<i32>, labels: Vec<Label> },
	MultiANewArray { descriptor: JavaString, dimensions: u8 },
	LineNumber { line: u16, start: Label },
}

/// A method as data. Collects events as a [`MethodVisitor`] and replays
/// them with [`MethodNode::accept`].
#[derive(Debug, Clone, PartialEq)]
pub struct MethodNode {
	pub access: u32,
	pub name: JavaString,
	pub descriptor: JavaString,
	pub signature: Option<JavaString>,
	pub exceptions: Vec<JavaString>,
	pub annotation_default: Option<ElementValue>,
	pub visible_annotations: Vec<AnnotationNode>,
	pub invisible_annotations: Vec<AnnotationNode>,
	pub visible_parameter_annotations: Vec<Vec<AnnotationNode>>,
	pub invisible_parameter_annotations: Vec<Vec<AnnotationNode>>,
	/// Attributes of the method itself.
	pub attributes: Vec<Attribute>,
	/// Attributes of the `Code` attribute.
	pub code_attributes: Vec<Attribute>,
	pub has_code: bool,
	pub instructions: Vec<InsnNode>,
	pub try_catch_blocks: Vec<TryCatchBlockNode>,
	pub local_variables: Vec<LocalVariableNode>,
	pub max_stack: u16,
	pub max_locals: u16,
	default_collector: Option<ArrayValueNode>,
}

impl MethodNode {
	pub fn new(
		access: u32,
		name: JavaString,
		descriptor: JavaString,
		signature: Option<JavaString>,
		exceptions: Vec<JavaString>,
	) -> MethodNode {
		MethodNode {
			access,
			name,
			descriptor,
			signature,
			exceptions,
			annotation_default: None,
			visible_annotations: Vec::new(),
			invisible_annotations: Vec::new(),
			visible_parameter_annotations: Vec::new(),
			invisible_parameter_annotations: Vec::new(),
			attributes: Vec::new(),
			code_attributes: Vec::new(),
			has_code: false,
			instructions: Vec::new(),
			try_catch_blocks: Vec::new(),
			local_variables: Vec::new(),
			max_stack: 0,
			max_locals: 0,
			default_collector: None,
		}
	}

	pub fn accept(&self, visitor: &mut dyn ClassVisitor) -> Result<()> {
		let Some(mv) = visitor.visit_method(
			self.access,
			&self.name,
			&self.descriptor,
			self.signature.as_deref(),
			&self.exceptions,
		)? else {
			return Ok(());
		};
		self.accept_method(mv)
	}

	pub fn accept_method(&self, visitor: &mut dyn MethodVisitor) -> Result<()> {
		if let Some(value) = &self.annotation_default {
			if let Some(av) = visitor.visit_annotation_default()? {
				accept_value(None, value, av)?;
				av.visit_end()?;
			}
		}
		for annotation in &self.visible_annotations {
			if let Some(av) = visitor.visit_annotation(&annotation.descriptor, true)? {
				annotation.accept(av)?;
			}
		}
		for annotation in &self.invisible_annotations {
			if let Some(av) = visitor.visit_annotation(&annotation.descriptor, false)? {
				annotation.accept(av)?;
			}
		}
		for (visible, parameters) in [
			(true, &self.visible_parameter_annotations),
			(false, &self.invisible_parameter_annotations),
		] {
			for (parameter, annotations) in parameters.iter().enumerate() {
				let parameter = u8::try_from(parameter).context("more than 256 parameters carry annotations")?;
				for annotation in annotations {
					if let Some(av) = visitor.visit_parameter_annotation(parameter, &annotation.descriptor, visible)? {
						annotation.accept(av)?;
					}
				}
			}
		}
		for attribute in &self.attributes {
			visitor.visit_attribute(attribute)?;
		}
		if self.has_code {
			visitor.visit_code()?;
			for insn in &self.instructions {
				insn.accept(visitor)?;
			}
			for block in &self.try_catch_blocks {
				visitor.visit_try_catch_block(block.start, block.end, block.handler, block.catch_type.as_deref())?;
			}
			for attribute in &self.code_attributes {
				visitor.visit_attribute(attribute)?;
			}
			for local in &self.local_variables {
				visitor.visit_local_variable(
					&local.name,
					&local.descriptor,
					local.signature.as_deref(),
					local.start,
					local.end,
					local.index,
				)?;
			}
			visitor.visit_maxs(self.max_stack, self.max_locals)?;
		}
		visitor.visit_end()
	}

	/// Clones the instruction list, mapping every label through `label_map`.
	/// Fails with [`Error::Unresolved`] if a used label has no mapping.
	pub fn clone_instructions(&self, label_map: &HashMap<Label, Label>) -> Result<Vec<InsnNode>> {
		let map = |label: Label| -> Result<Label> {
			label_map.get(&label).copied().ok_or_else(|| Error::Unresolved(label).into())
		};
		self.instructions.iter()
			.map(|insn| Ok(match insn {
				InsnNode::Jump { opcode, label } => InsnNode::Jump { opcode: *opcode, label: map(*label)? },
				InsnNode::Label(label) => InsnNode::Label(map(*label)?),
				InsnNode::TableSwitch { min, max, default, labels } => InsnNode::TableSwitch {
					min: *min,
					max: *max,
					default: map(*default)?,
					labels: labels.iter().map(|&label| map(label)).collect::<Result<_>>()?,
				},
				InsnNode::LookupSwitch { default, keys, labels } => InsnNode::LookupSwitch {
					default: map(*default)?,
					keys: keys.clone(),
					labels: labels.iter().map(|&label| map(label)).collect::<Result<_>>()?,
				},
				InsnNode::LineNumber { line, start } => InsnNode::LineNumber { line: *line, start: map(*start)? },
				other => other.clone(),
			}))
			.collect()
	}
}

impl InsnNode {
	/// Replays this instruction into `visitor`.
	pub fn accept(&self, visitor: &mut dyn MethodVisitor) -> Result<()> {
		match self {
			InsnNode::Insn { opcode } => visitor.visit_insn(*opcode),
			InsnNode::Int { opcode, operand } => visitor.visit_int_insn(*opcode, *operand),
			InsnNode::Var { opcode, var } => visitor.visit_var_insn(*opcode, *var),
			InsnNode::Type { opcode, name } => visitor.visit_type_insn(*opcode, name),
			InsnNode::Field { opcode, owner, name, descriptor } => visitor.visit_field_insn(*opcode, owner, name, descriptor),
			InsnNode::Method { opcode, owner, name, descriptor } => visitor.visit_method_insn(*opcode, owner, name, descriptor),
			InsnNode::InvokeDynamic { name, descriptor, bootstrap_method, arguments } =>
				visitor.visit_invoke_dynamic_insn(name, descriptor, bootstrap_method, arguments),
			InsnNode::Jump { opcode, label } => visitor.visit_jump_insn(*opcode, *label),
			InsnNode::Label(label) => visitor.visit_label(*label),
			InsnNode::Ldc(constant) => visitor.visit_ldc_insn(constant),
			InsnNode::Iinc { var, increment } => visitor.visit_iinc_insn(*var, *increment),
			InsnNode::TableSwitch { min, max, default, labels } => visitor.visit_table_switch_insn(*min, *max, *default, labels),
			InsnNode::LookupSwitch { default, keys, labels } => visitor.visit_lookup_switch_insn(*default, keys, labels),
			InsnNode::MultiANewArray { descriptor, dimensions } => visitor.visit_multi_anew_array_insn(descriptor, *dimensions),
			InsnNode::LineNumber { line, start } => visitor.visit_line_number(*line, *start),
		}
	}
}

impl MethodVisitor for MethodNode {
	fn visit_annotation_default(&mut self) -> Result<Option<&mut dyn AnnotationVisitor>> {
		self.default_collector = Some(ArrayValueNode::default());
		match self.default_collector.as_mut() {
			Some(collector) => Ok(Some(collector)),
			None => Ok(None),
		}
	}

	fn visit_annotation(&mut self, descriptor: &JavaStr, visible: bool) -> Result<Option<&mut dyn AnnotationVisitor>> {
		let annotations = if visible { &mut self.visible_annotations } else { &mut self.invisible_annotations };
		annotations.push(AnnotationNode::new(descriptor.to_owned()));
		match annotations.last_mut() {
			Some(annotation) => Ok(Some(annotation)),
			None => Ok(None),
		}
	}

	fn visit_parameter_annotation(&mut self, parameter: u8, descriptor: &JavaStr, visible: bool) -> Result<Option<&mut dyn AnnotationVisitor>> {
		let parameters = if visible { &mut self.visible_parameter_annotations } else { &mut self.invisible_parameter_annotations };
		let parameter = parameter as usize;
		if parameters.len() <= parameter {
			parameters.resize_with(parameter + 1, Vec::new);
		}
		parameters[parameter].push(AnnotationNode::new(descriptor.to_owned()));
		match parameters[parameter].last_mut() {
			Some(annotation) => Ok(Some(annotation)),
			None => Ok(None),
		}
	}

	fn visit_attribute(&mut self, attribute: &Attribute) -> Result<()> {
		let attributes = if self.has_code { &mut self.code_attributes } else { &mut self.attributes };
		attributes.push(attribute.clone());
		Ok(())
	}

	fn visit_code(&mut self) -> Result<()> {
		self.has_code = true;
		Ok(())
	}

	fn visit_insn(&mut self, opcode: u8) -> Result<()> {
		self.instructions.push(InsnNode::Insn { opcode });
		Ok(())
	}

	fn visit_int_insn(&mut self, opcode: u8, operand: i32) -> Result<()> {
		self.instructions.push(InsnNode::Int { opcode, operand });
		Ok(())
	}

	fn visit_var_insn(&mut self, opcode: u8, var: u16) -> Result<()> {
		self.instructions.push(InsnNode::Var { opcode, var });
		Ok(())
	}

	fn visit_type_insn(&mut self, opcode: u8, name: &JavaStr) -> Result<()> {
		self.instructions.push(InsnNode::Type { opcode, name: name.to_owned() });
		Ok(())
	}

	fn visit_field_insn(&mut self, opcode: u8, owner: &JavaStr, name: &JavaStr, descriptor: &JavaStr) -> Result<()> {
		self.instructions.push(InsnNode::Field {
			opcode,
			owner: owner.to_owned(),
			name: name.to_owned(),
			descriptor: descriptor.to_owned(),
		});
		Ok(())
	}

	fn visit_method_insn(&mut self, opcode: u8, owner: &JavaStr, name: &JavaStr, descriptor: &JavaStr) -> Result<()> {
		self.instructions.push(InsnNode::Method {
			opcode,
			owner: owner.to_owned(),
			name: name.to_owned(),
			descriptor: descriptor.to_owned(),
		});
		Ok(())
	}

	fn visit_invoke_dynamic_insn(&mut self, name: &JavaStr, descriptor: &JavaStr, bootstrap_method: &Handle, arguments: &[Constant]) -> Result<()> {
		self.instructions.push(InsnNode::InvokeDynamic {
			name: name.to_owned(),
			descriptor: descriptor.to_owned(),
			bootstrap_method: bootstrap_method.clone(),
			arguments: arguments.to_vec(),
		});
		Ok(())
	}

	fn visit_jump_insn(&mut self, opcode: u8, label: Label) -> Result<()> {
		self.instructions.push(InsnNode::Jump { opcode, label });
		Ok(())
	}

	fn visit_label(&mut self, label: Label) -> Result<()> {
		self.instructions.push(InsnNode::Label(label));
		Ok(())
	}

	fn visit_ldc_insn(&mut self, constant: &Constant) -> Result<()> {
		self.instructions.push(InsnNode::Ldc(constant.clone()));
		Ok(())
	}

	fn visit_iinc_insn(&mut self, var: u16, increment: i16) -> Result<()> {
		self.instructions.push(InsnNode::Iinc { var, increment });
		Ok(())
	}

	fn visit_table_switch_insn(&mut self, min: i32, max: i32, default: Label, labels: &[Label]) -> Result<()> {
		self.instructions.push(InsnNode::TableSwitch { min, max, default, labels: labels.to_vec() });
		Ok(())
	}

	fn visit_lookup_switch_insn(&mut self, default: Label, keys: &[i32], labels: &[Label]) -> Result<()> {
		self.instructions.push(InsnNode::LookupSwitch { default, keys: keys.to_vec(), labels: labels.to_vec() });
		Ok(())
	}

	fn visit_multi_anew_array_insn(&mut self, descriptor: &JavaStr, dimensions: u8) -> Result<()> {
		self.instructions.push(InsnNode::MultiANewArray { descriptor: descriptor.to_owned(), dimensions });
		Ok(())
	}

	fn visit_try_catch_block(&mut self, start: Label, end: Label, handler: Label, catch_type: Option<&JavaStr>) -> Result<()> {
		self.try_catch_blocks.push(TryCatchBlockNode {
			start,
			end,
			handler,
			catch_type: catch_type.map(|name| name.to_owned()),
		});
		Ok(())
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
		self.local_variables.push(LocalVariableNode {
			name: name.to_owned(),
			descriptor: descriptor.to_owned(),
			signature: signature.map(|signature| signature.to_owned()),
			start,
			end,
			index,
		});
		Ok(())
	}

	fn visit_line_number(&mut self, line: u16, start: Label) -> Result<()> {
		self.instructions.push(InsnNode::LineNumber { line, start });
		Ok(())
	}

	fn visit_maxs(&mut self, max_stack: u16, max_locals: u16) -> Result<()> {
		self.max_stack = max_stack;
		self.max_locals = max_locals;
		Ok(())
	}

	fn visit_end(&mut self) -> Result<()> {
		if let Some(collector) = self.default_collector.take() {
			self.annotation_default = collector.values.into_iter().next();
		}
		Ok(())
	}
}
