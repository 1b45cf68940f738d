//! Assembles a class file from visitor events.
//!
//! [`ClassWriter`] implements [`ClassVisitor`]; feed it the events of a
//! class (by hand, from a [`ClassReader`][crate::ClassReader], or by
//! replaying a [`ClassNode`][crate::tree::class::ClassNode]) and call
//! [`ClassWriter::to_bytes`] once `visit_end` has been seen.
//!
//! Fields, methods and the module declaration are encoded by sub-writers
//! that share the constant pool over `Rc<RefCell<..>>` and deliver their
//! bytes into the class body on their own `visit_end`. Starting the next
//! field or method before ending the previous one drops the unfinished one.
//!
//! Branch instructions are written with 16 bit offsets first; whenever a
//! resolved offset does not fit, the instruction is marked for the wide
//! encoding and the whole code array is encoded again. `goto` and `jsr`
//! become `goto_w`/`jsr_w`, a conditional branch becomes its inverse
//! skipping over a `goto_w`.

use std::cell::RefCell;
use std::collections::HashSet;
use std::rc::Rc;
use anyhow::{bail, Context, Result};
use java_string::{JavaStr, JavaString};
use crate::class_constants::{access, attribute, opcode, MAGIC};
use crate::descriptor;
use crate::error::Error;
use crate::tree::method::InsnNode;
use crate::tree::version::Version;
use crate::tree::{Constant, Handle, Label, LocalVariableNode, TryCatchBlockNode};
use crate::visitor::annotation::AnnotationVisitor;
use crate::visitor::method::MethodVisitor;
use crate::visitor::module::ModuleVisitor;
use crate::visitor::{ClassVisitor, FieldVisitor};
use crate::ClassWrite;

pub mod pool;

mod annotation;
mod labels;
mod maxs;
mod module;

pub use pool::ConstantPool;

use annotation::AnnotationWriter;
use labels::{patch_i16, patch_i32, signed_offset, ForwardRef, LabelOffsets};
use module::ModuleWriter;

/// Options of a [`ClassWriter`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriterFlags {
	/// Recompute `max_stack` and `max_locals` of every method and ignore
	/// the values passed to `visit_maxs`.
	pub compute_maxs: bool,
}

impl WriterFlags {
	pub const NONE: WriterFlags = WriterFlags { compute_maxs: false };
	pub const COMPUTE_MAXS: WriterFlags = WriterFlags { compute_maxs: true };
}

/// An attribute table under construction: framed entries plus their count.
pub(crate) struct Attributes {
	count: u16,
	buf: Vec<u8>,
}

impl Attributes {
	fn new() -> Attributes {
		Attributes { count: 0, buf: Vec::new() }
	}

	/// Appends one attribute, framing `body` with the name index and length.
	pub(crate) fn put(&mut self, pool: &mut ConstantPool, name: &JavaStr, body: &[u8]) -> Result<()> {
		self.count = self.count.checked_add(1).context("more than 65535 attributes")?;
		let name_index = pool.put_utf8(name)?;
		self.buf.write_u16(name_index)?;
		self.buf.write_usize_as_u32(body.len())?;
		self.buf.write_u8_slice(body)
	}

	fn write(&self, writer: &mut impl ClassWrite) -> Result<()> {
		writer.write_u16(self.count)?;
		writer.write_u8_slice(&self.buf)
	}
}

/// The encoded `field_info` and `method_info` tables, filled by the
/// sub-writers as they finish.
#[derive(Default)]
struct ClassBody {
	field_count: u16,
	fields: Vec<u8>,
	method_count: u16,
	methods: Vec<u8>,
}

/// A `Runtime(In)visibleAnnotations` table under construction. The buffer
/// is shared with the [`AnnotationWriter`]s encoding into it.
struct AnnotationSet {
	count: u16,
	buf: Rc<RefCell<Vec<u8>>>,
}

impl AnnotationSet {
	fn new() -> AnnotationSet {
		AnnotationSet { count: 0, buf: Rc::new(RefCell::new(Vec::new())) }
	}

	fn start(&mut self, pool: &Rc<RefCell<ConstantPool>>, descriptor: &JavaStr) -> Result<AnnotationWriter> {
		self.count = self.count.checked_add(1).context("more than 65535 annotations")?;
		AnnotationWriter::new_annotation(Rc::clone(pool), Rc::clone(&self.buf), descriptor)
	}

	/// Emits the set as an attribute named `name`, or nothing when empty.
	fn to_attribute(&self, pool: &mut ConstantPool, attrs: &mut Attributes, name: &JavaStr) -> Result<()> {
		if self.count == 0 {
			return Ok(());
		}
		let mut body = Vec::new();
		body.write_u16(self.count)?;
		body.write_u8_slice(&self.buf.borrow())?;
		attrs.put(pool, name, &body)
	}
}

/// Emits a `Runtime(In)visibleParameterAnnotations` attribute, one set per
/// declared parameter.
fn put_parameter_sets(
	pool: &mut ConstantPool,
	attrs: &mut Attributes,
	name: &JavaStr,
	sets: &Option<Vec<AnnotationSet>>,
) -> Result<()> {
	let Some(sets) = sets else {
		return Ok(());
	};
	let mut body = Vec::new();
	body.write_usize_as_u8(sets.len())?;
	for set in sets {
		body.write_u16(set.count)?;
		body.write_u8_slice(&set.buf.borrow())?;
	}
	attrs.put(pool, name, &body)
}

/// Builds a class file from the events of a [`ClassVisitor`] walk.
pub struct ClassWriter {
	flags: WriterFlags,
	pool: Rc<RefCell<ConstantPool>>,
	attrs: Rc<RefCell<Attributes>>,
	body: Rc<RefCell<ClassBody>>,
	version: Version,
	access: u32,
	this_class: u16,
	super_class: u16,
	interfaces: Vec<u16>,
	inner_class_count: u16,
	inner_classes: Vec<u8>,
	visible_annotations: AnnotationSet,
	invisible_annotations: AnnotationSet,
	current_annotation: Option<AnnotationWriter>,
	current_field: Option<FieldWriter>,
	current_method: Option<MethodWriter>,
	module_writer: Option<ModuleWriter>,
}

impl ClassWriter {
	pub fn new(flags: WriterFlags) -> ClassWriter {
		ClassWriter {
			flags,
			pool: Rc::new(RefCell::new(ConstantPool::new())),
			attrs: Rc::new(RefCell::new(Attributes::new())),
			body: Rc::new(RefCell::new(ClassBody::default())),
			version: Version::V1_1,
			access: 0,
			this_class: 0,
			super_class: 0,
			interfaces: Vec::new(),
			inner_class_count: 0,
			inner_classes: Vec::new(),
			visible_annotations: AnnotationSet::new(),
			invisible_annotations: AnnotationSet::new(),
			current_annotation: None,
			current_field: None,
			current_method: None,
			module_writer: None,
		}
	}

	/// Finishes the class and hands out its bytes.
	pub fn to_bytes(self) -> Result<Vec<u8>> {
		let mut pool = self.pool.borrow_mut();
		let mut attrs = self.attrs.borrow_mut();

		if self.inner_class_count != 0 {
			let mut body = Vec::new();
			body.write_u16(self.inner_class_count)?;
			body.write_u8_slice(&self.inner_classes)?;
			attrs.put(&mut pool, attribute::INNER_CLASSES, &body)?;
		}
		if self.access & access::SYNTHETIC != 0 {
			attrs.put(&mut pool, attribute::SYNTHETIC, &[])?;
		}
		if self.access & access::DEPRECATED != 0 {
			attrs.put(&mut pool, attribute::DEPRECATED, &[])?;
		}
		self.visible_annotations.to_attribute(&mut pool, &mut attrs, attribute::RUNTIME_VISIBLE_ANNOTATIONS)?;
		self.invisible_annotations.to_attribute(&mut pool, &mut attrs, attribute::RUNTIME_INVISIBLE_ANNOTATIONS)?;
		if pool.has_bootstrap_methods() {
			let mut body = Vec::new();
			pool.write_bootstrap_methods(&mut body)?;
			attrs.put(&mut pool, attribute::BOOTSTRAP_METHODS, &body)?;
		}

		let body = self.body.borrow();
		let mut out = Vec::new();
		out.write_u32(MAGIC)?;
		out.write_u16(self.version.minor)?;
		out.write_u16(self.version.major)?;
		pool.write(&mut out)?;
		out.write_u16(self.access as u16)?;
		out.write_u16(self.this_class)?;
		out.write_u16(self.super_class)?;
		out.write_slice(
			&self.interfaces,
			|w, len| w.write_usize_as_u16(len),
			|w, &index| w.write_u16(index),
		)?;
		out.write_u16(body.field_count)?;
		out.write_u8_slice(&body.fields)?;
		out.write_u16(body.method_count)?;
		out.write_u8_slice(&body.methods)?;
		attrs.write(&mut out)?;
		Ok(out)
	}
}

impl ClassVisitor for ClassWriter {
	fn visit(
		&mut self,
		version: Version,
		access: u32,
		name: &JavaStr,
		signature: Option<&JavaStr>,
		super_name: Option<&JavaStr>,
		interfaces: &[JavaString],
	) -> Result<()> {
		if !(Version::V1_1.major..=Version::V11.major).contains(&version.major) {
			return Err(Error::UnsupportedVersion { major: version.major, minor: version.minor }.into());
		}
		self.version = version;
		self.access = access;

		let mut pool = self.pool.borrow_mut();
		self.this_class = pool.put_class(name)?;
		self.super_class = pool.put_optional_class(super_name)?;
		self.interfaces = interfaces.iter()
			.map(|interface| pool.put_class(interface))
			.collect::<Result<_>>()?;
		if let Some(signature) = signature {
			let mut body = Vec::new();
			body.write_u16(pool.put_utf8(signature)?)?;
			self.attrs.borrow_mut().put(&mut pool, attribute::SIGNATURE, &body)?;
		}
		Ok(())
	}

	fn visit_source(&mut self, source: Option<&JavaStr>) -> Result<()> {
		if let Some(source) = source {
			let mut pool = self.pool.borrow_mut();
			let mut body = Vec::new();
			body.write_u16(pool.put_utf8(source)?)?;
			self.attrs.borrow_mut().put(&mut pool, attribute::SOURCE_FILE, &body)?;
		}
		Ok(())
	}

	fn visit_module(&mut self) -> Result<Option<&mut dyn ModuleVisitor>> {
		self.module_writer = Some(ModuleWriter::new(Rc::clone(&self.pool), Rc::clone(&self.attrs)));
		match self.module_writer.as_mut() {
			Some(writer) => Ok(Some(writer)),
			None => Ok(None),
		}
	}

	fn visit_outer_class(
		&mut self,
		owner: &JavaStr,
		method_name: Option<&JavaStr>,
		method_desc: Option<&JavaStr>,
	) -> Result<()> {
		let mut pool = self.pool.borrow_mut();
		let class_index = pool.put_class(owner)?;
		let method_index = match (method_name, method_desc) {
			(Some(name), Some(desc)) => pool.put_name_and_type(name, desc)?,
			_ => 0,
		};
		let mut body = Vec::new();
		body.write_u16(class_index)?;
		body.write_u16(method_index)?;
		self.attrs.borrow_mut().put(&mut pool, attribute::ENCLOSING_METHOD, &body)
	}

	fn visit_annotation(&mut self, descriptor: &JavaStr, visible: bool) -> Result<Option<&mut dyn AnnotationVisitor>> {
		let set = if visible { &mut self.visible_annotations } else { &mut self.invisible_annotations };
		self.current_annotation = Some(set.start(&self.pool, descriptor)?);
		match self.current_annotation.as_mut() {
			Some(writer) => Ok(Some(writer)),
			None => Ok(None),
		}
	}

	fn visit_attribute(&mut self, attribute: &crate::attribute::Attribute) -> Result<()> {
		let mut pool = self.pool.borrow_mut();
		self.attrs.borrow_mut().put(&mut pool, &attribute.name, &attribute.data)
	}

	fn visit_inner_class(
		&mut self,
		name: &JavaStr,
		outer_name: Option<&JavaStr>,
		inner_name: Option<&JavaStr>,
		access: u32,
	) -> Result<()> {
		self.inner_class_count = self.inner_class_count.checked_add(1).context("more than 65535 inner classes")?;
		let mut pool = self.pool.borrow_mut();
		self.inner_classes.write_u16(pool.put_class(name)?)?;
		self.inner_classes.write_u16(pool.put_optional_class(outer_name)?)?;
		self.inner_classes.write_u16(pool.put_optional_utf8(inner_name)?)?;
		self.inner_classes.write_u16(access as u16)
	}

	fn visit_field(
		&mut self,
		access: u32,
		name: &JavaStr,
		descriptor: &JavaStr,
		signature: Option<&JavaStr>,
		value: Option<&Constant>,
	) -> Result<Option<&mut dyn FieldVisitor>> {
		let writer = FieldWriter::new(
			Rc::clone(&self.pool),
			Rc::clone(&self.body),
			access,
			name,
			descriptor,
			signature,
			value,
		)?;
		self.current_field = Some(writer);
		match self.current_field.as_mut() {
			Some(writer) => Ok(Some(writer)),
			None => Ok(None),
		}
	}

	fn visit_method(
		&mut self,
		access: u32,
		name: &JavaStr,
		descriptor: &JavaStr,
		signature: Option<&JavaStr>,
		exceptions: &[JavaString],
	) -> Result<Option<&mut dyn MethodVisitor>> {
		let writer = MethodWriter::new(
			Rc::clone(&self.pool),
			Rc::clone(&self.body),
			self.flags,
			access,
			name,
			descriptor,
			signature,
			exceptions,
		)?;
		self.current_method = Some(writer);
		match self.current_method.as_mut() {
			Some(writer) => Ok(Some(writer)),
			None => Ok(None),
		}
	}

	fn visit_end(&mut self) -> Result<()> {
		self.current_annotation = None;
		self.current_field = None;
		self.current_method = None;
		self.module_writer = None;
		Ok(())
	}
}

/// Encodes one `field_info` and delivers it on `visit_end`.
struct FieldWriter {
	pool: Rc<RefCell<ConstantPool>>,
	body: Rc<RefCell<ClassBody>>,
	access: u32,
	name_index: u16,
	descriptor_index: u16,
	attrs: Attributes,
	visible_annotations: AnnotationSet,
	invisible_annotations: AnnotationSet,
	current_annotation: Option<AnnotationWriter>,
}

impl FieldWriter {
	#[allow(clippy::too_many_arguments)]
	fn new(
		pool: Rc<RefCell<ConstantPool>>,
		body: Rc<RefCell<ClassBody>>,
		access: u32,
		name: &JavaStr,
		descriptor: &JavaStr,
		signature: Option<&JavaStr>,
		value: Option<&Constant>,
	) -> Result<FieldWriter> {
		let mut attrs = Attributes::new();
		let name_index;
		let descriptor_index;
		{
			let mut pool = pool.borrow_mut();
			name_index = pool.put_utf8(name)?;
			descriptor_index = pool.put_utf8(descriptor)?;
			if let Some(value) = value {
				let mut body = Vec::new();
				body.write_u16(pool.put_constant(value)?)?;
				attrs.put(&mut pool, attribute::CONSTANT_VALUE, &body)?;
			}
			if let Some(signature) = signature {
				let mut body = Vec::new();
				body.write_u16(pool.put_utf8(signature)?)?;
				attrs.put(&mut pool, attribute::SIGNATURE, &body)?;
			}
		}
		Ok(FieldWriter {
			pool,
			body,
			access,
			name_index,
			descriptor_index,
			attrs,
			visible_annotations: AnnotationSet::new(),
			invisible_annotations: AnnotationSet::new(),
			current_annotation: None,
		})
	}
}

impl FieldVisitor for FieldWriter {
	fn visit_annotation(&mut self, descriptor: &JavaStr, visible: bool) -> Result<Option<&mut dyn AnnotationVisitor>> {
		let set = if visible { &mut self.visible_annotations } else { &mut self.invisible_annotations };
		self.current_annotation = Some(set.start(&self.pool, descriptor)?);
		match self.current_annotation.as_mut() {
			Some(writer) => Ok(Some(writer)),
			None => Ok(None),
		}
	}

	fn visit_attribute(&mut self, attribute: &crate::attribute::Attribute) -> Result<()> {
		let mut pool = self.pool.borrow_mut();
		self.attrs.put(&mut pool, &attribute.name, &attribute.data)
	}

	fn visit_end(&mut self) -> Result<()> {
		self.current_annotation = None;
		{
			let mut pool = self.pool.borrow_mut();
			if self.access & access::SYNTHETIC != 0 {
				self.attrs.put(&mut pool, attribute::SYNTHETIC, &[])?;
			}
			if self.access & access::DEPRECATED != 0 {
				self.attrs.put(&mut pool, attribute::DEPRECATED, &[])?;
			}
			self.visible_annotations.to_attribute(&mut pool, &mut self.attrs, attribute::RUNTIME_VISIBLE_ANNOTATIONS)?;
			self.invisible_annotations.to_attribute(&mut pool, &mut self.attrs, attribute::RUNTIME_INVISIBLE_ANNOTATIONS)?;
		}

		let mut body = self.body.borrow_mut();
		body.field_count = body.field_count.checked_add(1).context("more than 65535 fields")?;
		body.fields.write_u16(self.access as u16)?;
		body.fields.write_u16(self.name_index)?;
		body.fields.write_u16(self.descriptor_index)?;
		self.attrs.write(&mut body.fields)
	}
}

/// Encodes one `method_info` and delivers it on `visit_end`.
///
/// Instructions are recorded as [`InsnNode`]s; the `Code` attribute is
/// encoded from the recording once `visit_end` sees the complete method,
/// since label offsets and branch widths are only known then.
struct MethodWriter {
	pool: Rc<RefCell<ConstantPool>>,
	body: Rc<RefCell<ClassBody>>,
	flags: WriterFlags,
	access: u32,
	name_index: u16,
	descriptor: JavaString,
	descriptor_index: u16,
	exception_indices: Vec<u16>,
	attrs: Attributes,
	code_attrs: Attributes,
	has_code: bool,
	instructions: Vec<InsnNode>,
	try_catch_blocks: Vec<TryCatchBlockNode>,
	local_variables: Vec<LocalVariableNode>,
	max_stack: u16,
	max_locals: u16,
	visible_annotations: AnnotationSet,
	invisible_annotations: AnnotationSet,
	visible_parameter_annotations: Option<Vec<AnnotationSet>>,
	invisible_parameter_annotations: Option<Vec<AnnotationSet>>,
	annotation_default: Option<Rc<RefCell<Vec<u8>>>>,
	current_annotation: Option<AnnotationWriter>,
}

impl MethodWriter {
	#[allow(clippy::too_many_arguments)]
	fn new(
		pool: Rc<RefCell<ConstantPool>>,
		body: Rc<RefCell<ClassBody>>,
		flags: WriterFlags,
		access: u32,
		name: &JavaStr,
		descriptor: &JavaStr,
		signature: Option<&JavaStr>,
		exceptions: &[JavaString],
	) -> Result<MethodWriter> {
		let mut attrs = Attributes::new();
		let name_index;
		let descriptor_index;
		let exception_indices;
		{
			let mut pool = pool.borrow_mut();
			name_index = pool.put_utf8(name)?;
			descriptor_index = pool.put_utf8(descriptor)?;
			exception_indices = exceptions.iter()
				.map(|exception| pool.put_class(exception))
				.collect::<Result<Vec<u16>>>()?;
			if let Some(signature) = signature {
				let mut body = Vec::new();
				body.write_u16(pool.put_utf8(signature)?)?;
				attrs.put(&mut pool, attribute::SIGNATURE, &body)?;
			}
		}
		Ok(MethodWriter {
			pool,
			body,
			flags,
			access,
			name_index,
			descriptor: descriptor.to_owned(),
			descriptor_index,
			exception_indices,
			attrs,
			code_attrs: Attributes::new(),
			has_code: false,
			instructions: Vec::new(),
			try_catch_blocks: Vec::new(),
			local_variables: Vec::new(),
			max_stack: 0,
			max_locals: 0,
			visible_annotations: AnnotationSet::new(),
			invisible_annotations: AnnotationSet::new(),
			visible_parameter_annotations: None,
			invisible_parameter_annotations: None,
			annotation_default: None,
			current_annotation: None,
		})
	}

	fn require_code(&self, got: &'static str) -> Result<()> {
		if self.has_code {
			Ok(())
		} else {
			Err(Error::InvalidSequence { expected: "visit_code", got }.into())
		}
	}

	fn record(&mut self, got: &'static str, insn: InsnNode) -> Result<()> {
		self.require_code(got)?;
		self.instructions.push(insn);
		Ok(())
	}

	/// Encodes the body of the `Code` attribute.
	fn encode_code(&mut self) -> Result<Vec<u8>> {
		let (max_stack, max_locals) = if self.flags.compute_maxs {
			maxs::compute_maxs(self.access, &self.descriptor, &self.instructions, &self.try_catch_blocks)?
		} else {
			(self.max_stack, self.max_locals)
		};

		// Indices of instructions that need the wide branch encoding,
		// found by failed narrow attempts.
		let mut wide: HashSet<usize> = HashSet::new();
		let mut labels = LabelOffsets::new();

		let code = 'attempt: loop {
			labels.next_attempt();
			let mut code: Vec<u8> = Vec::new();
			let mut forward_refs: Vec<ForwardRef> = Vec::new();

			for (index, insn) in self.instructions.iter().enumerate() {
				match insn {
					InsnNode::Label(label) => {
						labels.add(*label, offset(&code)?);
					},
					InsnNode::LineNumber { .. } => {},
					InsnNode::Insn { opcode } => {
						code.write_u8(*opcode)?;
					},
					InsnNode::Int { opcode, operand } => {
						code.write_u8(*opcode)?;
						match *opcode {
							opcode::SIPUSH => {
								let operand = i16::try_from(*operand).context("sipush operand out of range")?;
								code.write_i16(operand)?;
							},
							opcode::NEWARRAY => {
								let operand = u8::try_from(*operand).context("newarray type out of range")?;
								code.write_u8(operand)?;
							},
							_ => {
								let operand = i8::try_from(*operand).context("bipush operand out of range")?;
								code.write_i8(operand)?;
							},
						}
					},
					InsnNode::Var { opcode: op, var } => {
						if *op != opcode::RET && *var < 4 {
							let base = if *op < opcode::ISTORE {
								opcode::ILOAD_0 + (op - opcode::ILOAD) * 4
							} else {
								opcode::ISTORE_0 + (op - opcode::ISTORE) * 4
							};
							code.write_u8(base + *var as u8)?;
						} else if let Ok(var) = u8::try_from(*var) {
							code.write_u8(*op)?;
							code.write_u8(var)?;
						} else {
							code.write_u8(opcode::WIDE)?;
							code.write_u8(*op)?;
							code.write_u16(*var)?;
						}
					},
					InsnNode::Type { opcode, name } => {
						let index = self.pool.borrow_mut().put_class(name)?;
						code.write_u8(*opcode)?;
						code.write_u16(index)?;
					},
					InsnNode::Field { opcode, owner, name, descriptor } => {
						let index = self.pool.borrow_mut().put_field_ref(owner, name, descriptor)?;
						code.write_u8(*opcode)?;
						code.write_u16(index)?;
					},
					InsnNode::Method { opcode: op, owner, name, descriptor } => {
						let interface = *op == opcode::INVOKEINTERFACE;
						let index = self.pool.borrow_mut().put_method_ref(owner, name, descriptor, interface)?;
						code.write_u8(*op)?;
						code.write_u16(index)?;
						if interface {
							// receiver plus argument slots, then a zero byte
							let count = descriptor::argument_slots(descriptor)?
								.checked_add(1)
								.context("too many argument slots")?;
							code.write_usize_as_u8(count as usize)?;
							code.write_u8(0)?;
						}
					},
					InsnNode::InvokeDynamic { name, descriptor, bootstrap_method, arguments } => {
						let index = self.pool.borrow_mut().put_invoke_dynamic(name, descriptor, bootstrap_method, arguments)?;
						code.write_u8(opcode::INVOKEDYNAMIC)?;
						code.write_u16(index)?;
						code.write_u16(0)?;
					},
					InsnNode::Jump { opcode: op, label } => {
						let opcode_pos = offset(&code)?;
						let is_wide = wide.contains(&index);
						match *op {
							opcode::GOTO | opcode::JSR => {
								if is_wide {
									code.write_u8(if *op == opcode::GOTO { opcode::GOTO_W } else { opcode::JSR_W })?;
									wide_branch(&mut code, &labels, &mut forward_refs, index, opcode_pos, *label)?;
								} else {
									code.write_u8(*op)?;
									if !narrow_branch(&mut code, &labels, &mut forward_refs, index, opcode_pos, *label)? {
										wide.insert(index);
										continue 'attempt;
									}
								}
							},
							_ => {
								if is_wide {
									// inverted condition skipping a goto_w
									code.write_u8(invert_condition(*op))?;
									code.write_i16(8)?;
									let goto_pos = offset(&code)?;
									code.write_u8(opcode::GOTO_W)?;
									wide_branch(&mut code, &labels, &mut forward_refs, index, goto_pos, *label)?;
								} else {
									code.write_u8(*op)?;
									if !narrow_branch(&mut code, &labels, &mut forward_refs, index, opcode_pos, *label)? {
										wide.insert(index);
										continue 'attempt;
									}
								}
							},
						}
					},
					InsnNode::Ldc(constant) => {
						let index = self.pool.borrow_mut().put_constant(constant)?;
						if constant.is_wide() {
							code.write_u8(opcode::LDC2_W)?;
							code.write_u16(index)?;
						} else if let Ok(index) = u8::try_from(index) {
							code.write_u8(opcode::LDC)?;
							code.write_u8(index)?;
						} else {
							code.write_u8(opcode::LDC_W)?;
							code.write_u16(index)?;
						}
					},
					InsnNode::Iinc { var, increment } => {
						match (u8::try_from(*var), i8::try_from(*increment)) {
							(Ok(var), Ok(increment)) => {
								code.write_u8(opcode::IINC)?;
								code.write_u8(var)?;
								code.write_i8(increment)?;
							},
							_ => {
								code.write_u8(opcode::WIDE)?;
								code.write_u8(opcode::IINC)?;
								code.write_u16(*var)?;
								code.write_i16(*increment)?;
							},
						}
					},
					InsnNode::TableSwitch { min, max, default, labels: targets } => {
						let opcode_pos = offset(&code)?;
						code.write_u8(opcode::TABLESWITCH)?;
						while code.len() % 4 != 0 {
							code.write_u8(0)?;
						}
						wide_branch(&mut code, &labels, &mut forward_refs, index, opcode_pos, *default)?;
						code.write_i32(*min)?;
						code.write_i32(*max)?;
						for target in targets {
							wide_branch(&mut code, &labels, &mut forward_refs, index, opcode_pos, *target)?;
						}
					},
					InsnNode::LookupSwitch { default, keys, labels: targets } => {
						if keys.len() != targets.len() {
							bail!("lookupswitch has {} keys but {} targets", keys.len(), targets.len());
						}
						let opcode_pos = offset(&code)?;
						code.write_u8(opcode::LOOKUPSWITCH)?;
						while code.len() % 4 != 0 {
							code.write_u8(0)?;
						}
						wide_branch(&mut code, &labels, &mut forward_refs, index, opcode_pos, *default)?;
						code.write_usize_as_u32(keys.len())?;
						for (key, target) in keys.iter().zip(targets) {
							code.write_i32(*key)?;
							wide_branch(&mut code, &labels, &mut forward_refs, index, opcode_pos, *target)?;
						}
					},
					InsnNode::MultiANewArray { descriptor, dimensions } => {
						let index = self.pool.borrow_mut().put_class(descriptor)?;
						code.write_u8(opcode::MULTIANEWARRAY)?;
						code.write_u16(index)?;
						code.write_u8(*dimensions)?;
					},
				}
			}

			let mut restart = false;
			for forward_ref in &forward_refs {
				let target = labels.try_get(forward_ref.label)?;
				let branch = signed_offset(forward_ref.opcode_pos, target);
				if forward_ref.wide {
					patch_i32(&mut code, forward_ref.operand_pos, branch);
				} else {
					match i16::try_from(branch) {
						Ok(branch) => patch_i16(&mut code, forward_ref.operand_pos, branch),
						Err(_) => {
							wide.insert(forward_ref.instruction_index);
							restart = true;
						},
					}
				}
			}
			if restart {
				continue 'attempt;
			}
			break code;
		};

		if code.is_empty() {
			bail!("the Code attribute needs at least one instruction");
		}

		let mut pool = self.pool.borrow_mut();
		let mut body = Vec::new();
		body.write_u16(max_stack)?;
		body.write_u16(max_locals)?;
		body.write_usize_as_u32(code.len())?;
		body.write_u8_slice(&code)?;

		body.write_usize_as_u16(self.try_catch_blocks.len())?;
		for block in &self.try_catch_blocks {
			body.write_u16(labels.try_get(block.start)?)?;
			body.write_u16(labels.try_get(block.end)?)?;
			body.write_u16(labels.try_get(block.handler)?)?;
			body.write_u16(pool.put_optional_class(block.catch_type.as_deref())?)?;
		}

		let lines: Vec<(u16, u16)> = self.instructions.iter()
			.filter_map(|insn| match insn {
				InsnNode::LineNumber { line, start } => Some((*start, *line)),
				_ => None,
			})
			.map(|(start, line)| Ok((labels.try_get(start)?, line)))
			.collect::<Result<_>>()?;
		if !lines.is_empty() {
			let mut table = Vec::new();
			table.write_slice(
				&lines,
				|w, len| w.write_usize_as_u16(len),
				|w, &(start_pc, line)| {
					w.write_u16(start_pc)?;
					w.write_u16(line)
				},
			)?;
			self.code_attrs.put(&mut pool, attribute::LINE_NUMBER_TABLE, &table)?;
		}

		if !self.local_variables.is_empty() {
			let mut table = Vec::new();
			table.write_usize_as_u16(self.local_variables.len())?;
			for local in &self.local_variables {
				let (start_pc, length) = labels.try_get_range(local.start, local.end)?;
				table.write_u16(start_pc)?;
				table.write_u16(length)?;
				table.write_u16(pool.put_utf8(&local.name)?)?;
				table.write_u16(pool.put_utf8(&local.descriptor)?)?;
				table.write_u16(local.index)?;
			}
			self.code_attrs.put(&mut pool, attribute::LOCAL_VARIABLE_TABLE, &table)?;
		}

		self.code_attrs.write(&mut body)?;
		Ok(body)
	}
}

/// The `u16` bytecode offset of the next instruction.
fn offset(code: &[u8]) -> Result<u16> {
	u16::try_from(code.len()).context("method code grows past 65535 bytes")
}

/// Writes an `i16` branch operand, or reserves one for patching when the
/// target is still unresolved. Returns `false` when a resolved offset does
/// not fit, so the caller can widen the instruction and start over.
fn narrow_branch(
	code: &mut Vec<u8>,
	labels: &LabelOffsets,
	forward_refs: &mut Vec<ForwardRef>,
	instruction_index: usize,
	opcode_pos: u16,
	label: Label,
) -> Result<bool> {
	match labels.get(label) {
		Some(target) => match i16::try_from(signed_offset(opcode_pos, target)) {
			Ok(branch) => {
				code.write_i16(branch)?;
				Ok(true)
			},
			Err(_) => Ok(false),
		},
		None => {
			forward_refs.push(ForwardRef { opcode_pos, instruction_index, label, operand_pos: code.len(), wide: false });
			code.write_i16(0)?;
			Ok(true)
		},
	}
}

/// Writes an `i32` branch operand, reserving it for patching when the
/// target is still unresolved.
fn wide_branch(
	code: &mut Vec<u8>,
	labels: &LabelOffsets,
	forward_refs: &mut Vec<ForwardRef>,
	instruction_index: usize,
	opcode_pos: u16,
	label: Label,
) -> Result<()> {
	match labels.get(label) {
		Some(target) => code.write_i32(signed_offset(opcode_pos, target)),
		None => {
			forward_refs.push(ForwardRef { opcode_pos, instruction_index, label, operand_pos: code.len(), wide: true });
			code.write_i32(0)
		},
	}
}

/// The opcode testing the opposite condition.
fn invert_condition(op: u8) -> u8 {
	if op == opcode::IFNULL || op == opcode::IFNONNULL {
		op ^ 1
	} else {
		((op + 1) ^ 1) - 1
	}
}

impl MethodVisitor for MethodWriter {
	fn visit_annotation_default(&mut self) -> Result<Option<&mut dyn AnnotationVisitor>> {
		let buf = Rc::new(RefCell::new(Vec::new()));
		self.annotation_default = Some(Rc::clone(&buf));
		self.current_annotation = Some(AnnotationWriter::new_value(Rc::clone(&self.pool), buf));
		match self.current_annotation.as_mut() {
			Some(writer) => Ok(Some(writer)),
			None => Ok(None),
		}
	}

	fn visit_annotation(&mut self, descriptor: &JavaStr, visible: bool) -> Result<Option<&mut dyn AnnotationVisitor>> {
		let set = if visible { &mut self.visible_annotations } else { &mut self.invisible_annotations };
		self.current_annotation = Some(set.start(&self.pool, descriptor)?);
		match self.current_annotation.as_mut() {
			Some(writer) => Ok(Some(writer)),
			None => Ok(None),
		}
	}

	fn visit_parameter_annotation(&mut self, parameter: u8, descriptor: &JavaStr, visible: bool) -> Result<Option<&mut dyn AnnotationVisitor>> {
		let parameter_count = descriptor::parameter_count(&self.descriptor)? as usize;
		let sets = if visible { &mut self.visible_parameter_annotations } else { &mut self.invisible_parameter_annotations };
		let sets = sets.get_or_insert_with(|| (0..parameter_count).map(|_| AnnotationSet::new()).collect());
		let set = sets.get_mut(parameter as usize)
			.with_context(|| format!("parameter {parameter} outside the method's {parameter_count} parameters"))?;
		self.current_annotation = Some(set.start(&self.pool, descriptor)?);
		match self.current_annotation.as_mut() {
			Some(writer) => Ok(Some(writer)),
			None => Ok(None),
		}
	}

	fn visit_attribute(&mut self, attribute: &crate::attribute::Attribute) -> Result<()> {
		let mut pool = self.pool.borrow_mut();
		let attrs = if self.has_code { &mut self.code_attrs } else { &mut self.attrs };
		attrs.put(&mut pool, &attribute.name, &attribute.data)
	}

	fn visit_code(&mut self) -> Result<()> {
		self.has_code = true;
		Ok(())
	}

	fn visit_insn(&mut self, opcode: u8) -> Result<()> {
		self.record("visit_insn", InsnNode::Insn { opcode })
	}

	fn visit_int_insn(&mut self, opcode: u8, operand: i32) -> Result<()> {
		self.record("visit_int_insn", InsnNode::Int { opcode, operand })
	}

	fn visit_var_insn(&mut self, opcode: u8, var: u16) -> Result<()> {
		self.record("visit_var_insn", InsnNode::Var { opcode, var })
	}

	fn visit_type_insn(&mut self, opcode: u8, name: &JavaStr) -> Result<()> {
		self.record("visit_type_insn", InsnNode::Type { opcode, name: name.to_owned() })
	}

	fn visit_field_insn(&mut self, opcode: u8, owner: &JavaStr, name: &JavaStr, descriptor: &JavaStr) -> Result<()> {
		self.record("visit_field_insn", InsnNode::Field {
			opcode,
			owner: owner.to_owned(),
			name: name.to_owned(),
			descriptor: descriptor.to_owned(),
		})
	}

	fn visit_method_insn(&mut self, opcode: u8, owner: &JavaStr, name: &JavaStr, descriptor: &JavaStr) -> Result<()> {
		self.record("visit_method_insn", InsnNode::Method {
			opcode,
			owner: owner.to_owned(),
			name: name.to_owned(),
			descriptor: descriptor.to_owned(),
		})
	}

	fn visit_invoke_dynamic_insn(&mut self, name: &JavaStr, descriptor: &JavaStr, bootstrap_method: &Handle, arguments: &[Constant]) -> Result<()> {
		self.record("visit_invoke_dynamic_insn", InsnNode::InvokeDynamic {
			name: name.to_owned(),
			descriptor: descriptor.to_owned(),
			bootstrap_method: bootstrap_method.clone(),
			arguments: arguments.to_vec(),
		})
	}

	fn visit_jump_insn(&mut self, opcode: u8, label: Label) -> Result<()> {
		self.record("visit_jump_insn", InsnNode::Jump { opcode, label })
	}

	fn visit_label(&mut self, label: Label) -> Result<()> {
		self.record("visit_label", InsnNode::Label(label))
	}

	fn visit_ldc_insn(&mut self, constant: &Constant) -> Result<()> {
		self.record("visit_ldc_insn", InsnNode::Ldc(constant.clone()))
	}

	fn visit_iinc_insn(&mut self, var: u16, increment: i16) -> Result<()> {
		self.record("visit_iinc_insn", InsnNode::Iinc { var, increment })
	}

	fn visit_table_switch_insn(&mut self, min: i32, max: i32, default: Label, labels: &[Label]) -> Result<()> {
		self.record("visit_table_switch_insn", InsnNode::TableSwitch { min, max, default, labels: labels.to_vec() })
	}

	fn visit_lookup_switch_insn(&mut self, default: Label, keys: &[i32], labels: &[Label]) -> Result<()> {
		self.record("visit_lookup_switch_insn", InsnNode::LookupSwitch { default, keys: keys.to_vec(), labels: labels.to_vec() })
	}

	fn visit_multi_anew_array_insn(&mut self, descriptor: &JavaStr, dimensions: u8) -> Result<()> {
		self.record("visit_multi_anew_array_insn", InsnNode::MultiANewArray { descriptor: descriptor.to_owned(), dimensions })
	}

	fn visit_try_catch_block(&mut self, start: Label, end: Label, handler: Label, catch_type: Option<&JavaStr>) -> Result<()> {
		self.require_code("visit_try_catch_block")?;
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
		self.require_code("visit_local_variable")?;
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
		self.record("visit_line_number", InsnNode::LineNumber { line, start })
	}

	fn visit_maxs(&mut self, max_stack: u16, max_locals: u16) -> Result<()> {
		self.require_code("visit_maxs")?;
		self.max_stack = max_stack;
		self.max_locals = max_locals;
		Ok(())
	}

	fn visit_end(&mut self) -> Result<()> {
		self.current_annotation = None;
		if self.has_code {
			let code = self.encode_code()?;
			self.attrs.put(&mut self.pool.borrow_mut(), attribute::CODE, &code)?;
		}
		{
			let mut pool = self.pool.borrow_mut();
			if !self.exception_indices.is_empty() {
				let mut body = Vec::new();
				body.write_slice(
					&self.exception_indices,
					|w, len| w.write_usize_as_u16(len),
					|w, &index| w.write_u16(index),
				)?;
				self.attrs.put(&mut pool, attribute::EXCEPTIONS, &body)?;
			}
			if self.access & access::SYNTHETIC != 0 {
				self.attrs.put(&mut pool, attribute::SYNTHETIC, &[])?;
			}
			if self.access & access::DEPRECATED != 0 {
				self.attrs.put(&mut pool, attribute::DEPRECATED, &[])?;
			}
			if let Some(buf) = &self.annotation_default {
				self.attrs.put(&mut pool, attribute::ANNOTATION_DEFAULT, &buf.borrow())?;
			}
			self.visible_annotations.to_attribute(&mut pool, &mut self.attrs, attribute::RUNTIME_VISIBLE_ANNOTATIONS)?;
			self.invisible_annotations.to_attribute(&mut pool, &mut self.attrs, attribute::RUNTIME_INVISIBLE_ANNOTATIONS)?;
			put_parameter_sets(&mut pool, &mut self.attrs, attribute::RUNTIME_VISIBLE_PARAMETER_ANNOTATIONS, &self.visible_parameter_annotations)?;
			put_parameter_sets(&mut pool, &mut self.attrs, attribute::RUNTIME_INVISIBLE_PARAMETER_ANNOTATIONS, &self.invisible_parameter_annotations)?;
		}

		let mut body = self.body.borrow_mut();
		body.method_count = body.method_count.checked_add(1).context("more than 65535 methods")?;
		body.methods.write_u16(self.access as u16)?;
		body.methods.write_u16(self.name_index)?;
		body.methods.write_u16(self.descriptor_index)?;
		self.attrs.write(&mut body.methods)
	}
}

#[cfg(test)]
mod tests {
	use anyhow::Result;
	use pretty_assertions::assert_eq;
	use java_string::JavaStr;
	use crate::class_constants::{access, opcode};
	use crate::tree::version::Version;
	use crate::tree::Label;
	use crate::visitor::ClassVisitor;
	use super::{ClassWriter, WriterFlags};

	#[test]
	fn empty_class_layout() -> Result<()> {
		let mut writer = ClassWriter::new(WriterFlags::NONE);
		writer.visit(
			Version::V1_1,
			access::PUBLIC | access::SUPER,
			JavaStr::from_str("A"),
			None,
			Some(JavaStr::from_str("java/lang/Object")),
			&[],
		)?;
		writer.visit_end()?;

		let mut expected = vec![
			0xCA, 0xFE, 0xBA, 0xBE, // magic
			0x00, 0x03, 0x00, 0x2D, // minor 3, major 45
			0x00, 0x05, // constant pool count
			1, 0x00, 0x01, b'A',
			7, 0x00, 0x01,
			1, 0x00, 0x10,
		];
		expected.extend_from_slice(b"java/lang/Object");
		expected.extend_from_slice(&[
			7, 0x00, 0x03,
			0x00, 0x21, // access
			0x00, 0x02, // this
			0x00, 0x04, // super
			0x00, 0x00, // interfaces
			0x00, 0x00, // fields
			0x00, 0x00, // methods
			0x00, 0x00, // attributes
		]);
		assert_eq!(writer.to_bytes()?, expected);
		Ok(())
	}

	#[test]
	fn unsupported_version_is_rejected() {
		let mut writer = ClassWriter::new(WriterFlags::NONE);
		let result = writer.visit(
			Version::new(56, 0),
			access::PUBLIC,
			JavaStr::from_str("A"),
			None,
			Some(JavaStr::from_str("java/lang/Object")),
			&[],
		);
		assert!(result.is_err());
	}

	#[test]
	fn deprecated_flag_becomes_an_attribute() -> Result<()> {
		let mut writer = ClassWriter::new(WriterFlags::NONE);
		writer.visit(
			Version::V1_1,
			access::PUBLIC | access::SUPER | access::DEPRECATED,
			JavaStr::from_str("A"),
			None,
			Some(JavaStr::from_str("java/lang/Object")),
			&[],
		)?;
		writer.visit_end()?;

		let bytes = writer.to_bytes()?;
		let needle = b"Deprecated";
		assert!(bytes.windows(needle.len()).any(|window| window == needle));
		// the written u16 access keeps only the real flags; it sits before
		// this/super/interfaces/fields/methods (10 bytes) and the attribute
		// table holding the empty Deprecated attribute (2 + 2 + 4 bytes)
		let access = &bytes[bytes.len() - 20..][..2];
		assert_eq!(access, [0x00, 0x21]);
		Ok(())
	}

	#[test]
	fn unresolved_jump_target_fails() -> Result<()> {
		let mut writer = ClassWriter::new(WriterFlags::NONE);
		writer.visit(
			Version::V1_1,
			access::PUBLIC,
			JavaStr::from_str("A"),
			None,
			Some(JavaStr::from_str("java/lang/Object")),
			&[],
		)?;
		let mv = writer.visit_method(access::PUBLIC | access::STATIC, JavaStr::from_str("m"), JavaStr::from_str("()V"), None, &[])?;
		let mv = mv.ok_or_else(|| anyhow::anyhow!("writer refused the method"))?;
		mv.visit_code()?;
		mv.visit_jump_insn(opcode::GOTO, Label::new(0))?;
		mv.visit_maxs(0, 0)?;
		assert!(mv.visit_end().is_err());
		Ok(())
	}

	#[test]
	fn instructions_before_visit_code_are_rejected() -> Result<()> {
		let mut writer = ClassWriter::new(WriterFlags::NONE);
		writer.visit(
			Version::V1_1,
			access::PUBLIC,
			JavaStr::from_str("A"),
			None,
			Some(JavaStr::from_str("java/lang/Object")),
			&[],
		)?;
		let mv = writer.visit_method(access::PUBLIC, JavaStr::from_str("m"), JavaStr::from_str("()V"), None, &[])?;
		let mv = mv.ok_or_else(|| anyhow::anyhow!("writer refused the method"))?;
		assert!(mv.visit_insn(opcode::RETURN).is_err());
		Ok(())
	}
}
