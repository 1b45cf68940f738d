//! Decodes a class file and drives a [`ClassVisitor`] over its contents.
//!
//! [`ClassReader::new`] checks the header and indexes the constant pool;
//! nothing else is parsed until [`ClassReader::accept`] walks the class.
//! The walk emits events in class-file order: fields and methods are
//! skipped over first so that the class attributes (which contribute to
//! the header event) can be read, then revisited.
//!
//! Bytecode is decoded in two passes: the first collects every offset a
//! label is needed at (branch targets, exception ranges, debug tables),
//! the second emits the instruction events with `visit_label` markers in
//! between. Short instruction forms like `iload_0` or `goto_w` are
//! reported through their canonical events; encoding decisions are left
//! to whoever writes the class back out.

use std::collections::{BTreeSet, HashMap};
use std::io::Cursor;
use anyhow::Result;
use java_string::{JavaStr, JavaString};
use crate::attribute::Attribute;
use crate::class_constants::{access, attribute, opcode, pool, MAGIC};
use crate::error::Error;
use crate::jstring;
use crate::tree::version::Version;
use crate::tree::{Constant, Handle, Label};
use crate::visitor::method::MethodVisitor;
use crate::visitor::module::ModuleVisitor;
use crate::visitor::{AnnotationVisitor, ClassVisitor};
use crate::ClassRead;

/// Options of a [`ClassReader::accept`] walk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReaderOptions {
	/// Hand attributes without a structured model to `visit_attribute`
	/// instead of dropping them.
	pub keep_unknown_attributes: bool,
	/// Skip `SourceFile`, `LineNumberTable` and `LocalVariableTable`.
	pub skip_debug: bool,
}

impl Default for ReaderOptions {
	fn default() -> ReaderOptions {
		ReaderOptions { keep_unknown_attributes: true, skip_debug: false }
	}
}

/// A parsed class file header with an indexed constant pool.
pub struct ClassReader<'a> {
	bytes: &'a [u8],
	version: Version,
	/// Pool entry tags by index; zero for the unused slots.
	pool_tags: Vec<u8>,
	/// Byte offset of each entry's body, right after its tag.
	pool_offsets: Vec<u64>,
	/// Offset of `access_flags`, after the constant pool.
	header: u64,
}

impl<'a> ClassReader<'a> {
	/// Checks the magic number and version and indexes the constant pool.
	pub fn new(bytes: &'a [u8]) -> Result<ClassReader<'a>> {
		let mut r = Cursor::new(bytes);
		let magic = r.read_u32()?;
		if magic != MAGIC {
			return Err(Error::invalid(0, format!("wrong magic number {magic:#010x}")));
		}
		let minor = r.read_u16()?;
		let major = r.read_u16()?;
		if !(Version::V1_1.major..=Version::V11.major).contains(&major) {
			return Err(Error::UnsupportedVersion { major, minor }.into());
		}

		let count = r.read_u16_as_usize()?;
		let mut pool_tags = vec![0u8; count];
		let mut pool_offsets = vec![0u64; count];
		let mut index = 1;
		while index < count {
			let tag_offset = r.marker()?;
			let tag = r.read_u8()?;
			pool_tags[index] = tag;
			pool_offsets[index] = r.marker()?;
			let mut slots = 1;
			match tag {
				pool::UTF8 => {
					let len = r.read_u16_as_usize()?;
					r.skip(len as i64)?;
				},
				pool::INTEGER | pool::FLOAT => r.skip(4)?,
				pool::LONG | pool::DOUBLE => {
					r.skip(8)?;
					slots = 2;
				},
				pool::CLASS | pool::STRING | pool::METHOD_TYPE | pool::MODULE | pool::PACKAGE => r.skip(2)?,
				pool::FIELD_REF | pool::METHOD_REF | pool::INTERFACE_METHOD_REF
				| pool::NAME_AND_TYPE | pool::INVOKE_DYNAMIC => r.skip(4)?,
				pool::METHOD_HANDLE => r.skip(3)?,
				_ => return Err(Error::invalid(tag_offset, format!("unknown constant pool tag {tag}"))),
			}
			index += slots;
		}
		let header = r.marker()?;
		Ok(ClassReader { bytes, version: Version::new(major, minor), pool_tags, pool_offsets, header })
	}

	pub fn version(&self) -> Version {
		self.version
	}

	/// A cursor positioned at the body of pool entry `index`, after
	/// checking the tag.
	fn at(&self, index: u16, expected: u8, what: &str) -> Result<Cursor<&'a [u8]>> {
		let index = index as usize;
		match self.pool_tags.get(index) {
			Some(&tag) if tag == expected => {
				let mut r = Cursor::new(self.bytes);
				r.set_position(self.pool_offsets[index]);
				Ok(r)
			},
			Some(&tag) => Err(Error::invalid(
				self.pool_offsets[index],
				format!("constant pool index {index} holds tag {tag}, not {what}"),
			)),
			None => Err(Error::invalid(self.header, format!("constant pool index {index} out of range"))),
		}
	}

	pub(crate) fn utf8(&self, index: u16) -> Result<JavaString> {
		let mut r = self.at(index, pool::UTF8, "Utf8")?;
		let len = r.read_u16_as_usize()?;
		jstring::from_vec_to_string(r.read_u8_vec(len)?)
	}

	fn opt_utf8(&self, index: u16) -> Result<Option<JavaString>> {
		if index == 0 {
			Ok(None)
		} else {
			Ok(Some(self.utf8(index)?))
		}
	}

	fn class_name(&self, index: u16) -> Result<JavaString> {
		let mut r = self.at(index, pool::CLASS, "Class")?;
		let name_index = r.read_u16()?;
		self.utf8(name_index)
	}

	fn opt_class_name(&self, index: u16) -> Result<Option<JavaString>> {
		if index == 0 {
			Ok(None)
		} else {
			Ok(Some(self.class_name(index)?))
		}
	}

	pub(crate) fn module_name(&self, index: u16) -> Result<JavaString> {
		let mut r = self.at(index, pool::MODULE, "Module")?;
		let name_index = r.read_u16()?;
		self.utf8(name_index)
	}

	fn package_name(&self, index: u16) -> Result<JavaString> {
		let mut r = self.at(index, pool::PACKAGE, "Package")?;
		let name_index = r.read_u16()?;
		self.utf8(name_index)
	}

	fn name_and_type(&self, index: u16) -> Result<(JavaString, JavaString)> {
		let mut r = self.at(index, pool::NAME_AND_TYPE, "NameAndType")?;
		let name = self.utf8(r.read_u16()?)?;
		let descriptor = self.utf8(r.read_u16()?)?;
		Ok((name, descriptor))
	}

	/// Resolves a `Fieldref`, `Methodref` or `InterfaceMethodref` entry to
	/// `(owner, name, descriptor)`.
	fn member_ref(&self, index: u16) -> Result<(JavaString, JavaString, JavaString)> {
		let index_usize = index as usize;
		match self.pool_tags.get(index_usize) {
			Some(&(pool::FIELD_REF | pool::METHOD_REF | pool::INTERFACE_METHOD_REF)) => {
				let mut r = Cursor::new(self.bytes);
				r.set_position(self.pool_offsets[index_usize]);
				let owner = self.class_name(r.read_u16()?)?;
				let (name, descriptor) = self.name_and_type(r.read_u16()?)?;
				Ok((owner, name, descriptor))
			},
			Some(&tag) => Err(Error::invalid(
				self.pool_offsets[index_usize],
				format!("constant pool index {index} holds tag {tag}, not a member reference"),
			)),
			None => Err(Error::invalid(self.header, format!("constant pool index {index} out of range"))),
		}
	}

	fn handle(&self, index: u16) -> Result<Handle> {
		let mut r = self.at(index, pool::METHOD_HANDLE, "MethodHandle")?;
		let tag = r.read_u8()?;
		let (owner, name, desc) = self.member_ref(r.read_u16()?)?;
		Ok(Handle { tag, owner, name, desc })
	}

	fn invoke_dynamic(&self, index: u16) -> Result<(u16, JavaString, JavaString)> {
		let mut r = self.at(index, pool::INVOKE_DYNAMIC, "InvokeDynamic")?;
		let bootstrap_index = r.read_u16()?;
		let (name, descriptor) = self.name_and_type(r.read_u16()?)?;
		Ok((bootstrap_index, name, descriptor))
	}

	fn integer(&self, index: u16) -> Result<i32> {
		self.at(index, pool::INTEGER, "Integer")?.read_i32()
	}

	fn float(&self, index: u16) -> Result<f32> {
		Ok(f32::from_bits(self.at(index, pool::FLOAT, "Float")?.read_u32()?))
	}

	fn long(&self, index: u16) -> Result<i64> {
		self.at(index, pool::LONG, "Long")?.read_i64()
	}

	fn double(&self, index: u16) -> Result<f64> {
		Ok(f64::from_bits(self.at(index, pool::DOUBLE, "Double")?.read_u64()?))
	}

	/// Resolves a loadable pool entry, as `ldc` and `ConstantValue` use them.
	pub(crate) fn constant(&self, index: u16) -> Result<Constant> {
		let index_usize = index as usize;
		match self.pool_tags.get(index_usize) {
			Some(&pool::INTEGER) => Ok(Constant::Integer(self.integer(index)?)),
			Some(&pool::FLOAT) => Ok(Constant::Float(self.float(index)?)),
			Some(&pool::LONG) => Ok(Constant::Long(self.long(index)?)),
			Some(&pool::DOUBLE) => Ok(Constant::Double(self.double(index)?)),
			Some(&pool::STRING) => {
				let mut r = Cursor::new(self.bytes);
				r.set_position(self.pool_offsets[index_usize]);
				Ok(Constant::String(self.utf8(r.read_u16()?)?))
			},
			Some(&pool::CLASS) => Ok(Constant::Class(self.class_name(index)?)),
			Some(&pool::METHOD_TYPE) => {
				let mut r = Cursor::new(self.bytes);
				r.set_position(self.pool_offsets[index_usize]);
				Ok(Constant::MethodType(self.utf8(r.read_u16()?)?))
			},
			Some(&pool::METHOD_HANDLE) => Ok(Constant::MethodHandle(self.handle(index)?)),
			Some(&tag) => Err(Error::invalid(
				self.pool_offsets[index_usize],
				format!("constant pool index {index} holds tag {tag}, not a loadable constant"),
			)),
			None => Err(Error::invalid(self.header, format!("constant pool index {index} out of range"))),
		}
	}

	/// Walks the whole class, driving `visitor`.
	pub fn accept(&self, visitor: &mut dyn ClassVisitor, options: ReaderOptions) -> Result<()> {
		let mut r = Cursor::new(self.bytes);
		r.set_position(self.header);

		let mut class_access = r.read_u16()? as u32;
		let this_name = self.class_name(r.read_u16()?)?;
		let super_name = self.opt_class_name(r.read_u16()?)?;
		let interfaces: Vec<JavaString> = r.read_vec(
			|r| r.read_u16_as_usize(),
			|r| {
				let index = r.read_u16()?;
				self.class_name(index)
			},
		)?;

		// members are revisited once the class attributes are known
		let field_offsets = self.skip_members(&mut r)?;
		let method_offsets = self.skip_members(&mut r)?;

		let mut signature = None;
		let mut source = None;
		let mut outer_class: Option<(JavaString, Option<(JavaString, JavaString)>)> = None;
		let mut module_body = None;
		let mut module_version = None;
		let mut module_main_class = None;
		let mut module_target: Option<(Option<JavaString>, Option<JavaString>, Option<JavaString>)> = None;
		let mut concealed_packages: Vec<JavaString> = Vec::new();
		let mut inner_classes = None;
		let mut visible_annotations = None;
		let mut invisible_annotations = None;
		let mut bootstrap_methods: Vec<(Handle, Vec<Constant>)> = Vec::new();
		let mut raw_attributes: Vec<Attribute> = Vec::new();

		let attribute_count = r.read_u16_as_usize()?;
		for _ in 0..attribute_count {
			let name = self.utf8(r.read_u16()?)?;
			let len = r.read_u32_as_usize()?;
			let body = r.marker()?;
			let name_ref: &JavaStr = &name;

			if name_ref == attribute::SIGNATURE {
				signature = Some(self.utf8(r.read_u16()?)?);
			} else if name_ref == attribute::SOURCE_FILE {
				source = Some(self.utf8(r.read_u16()?)?);
			} else if name_ref == attribute::DEPRECATED {
				class_access |= access::DEPRECATED;
			} else if name_ref == attribute::SYNTHETIC {
				class_access |= access::SYNTHETIC;
			} else if name_ref == attribute::ENCLOSING_METHOD {
				let owner = self.class_name(r.read_u16()?)?;
				let method_index = r.read_u16()?;
				let method = if method_index == 0 { None } else { Some(self.name_and_type(method_index)?) };
				outer_class = Some((owner, method));
			} else if name_ref == attribute::MODULE {
				module_body = Some(body);
			} else if name_ref == attribute::VERSION {
				module_version = Some(self.utf8(r.read_u16()?)?);
			} else if name_ref == attribute::MAIN_CLASS {
				module_main_class = Some(self.class_name(r.read_u16()?)?);
			} else if name_ref == attribute::TARGET_PLATFORM {
				module_target = Some((
					self.opt_utf8(r.read_u16()?)?,
					self.opt_utf8(r.read_u16()?)?,
					self.opt_utf8(r.read_u16()?)?,
				));
			} else if name_ref == attribute::CONCEALED_PACKAGES {
				concealed_packages = r.read_vec(
					|r| r.read_u16_as_usize(),
					|r| {
						let index = r.read_u16()?;
						self.package_name(index)
					},
				)?;
			} else if name_ref == attribute::INNER_CLASSES {
				inner_classes = Some(body);
			} else if name_ref == attribute::RUNTIME_VISIBLE_ANNOTATIONS {
				visible_annotations = Some(body);
			} else if name_ref == attribute::RUNTIME_INVISIBLE_ANNOTATIONS {
				invisible_annotations = Some(body);
			} else if name_ref == attribute::BOOTSTRAP_METHODS {
				bootstrap_methods = r.read_vec(
					|r| r.read_u16_as_usize(),
					|r| {
						let handle = self.handle(r.read_u16()?)?;
						let arguments = r.read_vec(
							|r| r.read_u16_as_usize(),
							|r| {
								let index = r.read_u16()?;
								self.constant(index)
							},
						)?;
						Ok((handle, arguments))
					},
				)?;
			} else if options.keep_unknown_attributes {
				raw_attributes.push(Attribute { name, data: r.read_u8_vec(len)? });
			}
			r.set_position(body + len as u64);
		}

		visitor.visit(
			self.version,
			class_access,
			&this_name,
			signature.as_deref(),
			super_name.as_deref(),
			&interfaces,
		)?;
		if !options.skip_debug {
			if let Some(source) = &source {
				visitor.visit_source(Some(source))?;
			}
		}
		if let Some(body) = module_body {
			if let Some(mv) = visitor.visit_module()? {
				self.read_module(
					body,
					mv,
					module_version.as_deref(),
					module_main_class.as_deref(),
					module_target.as_ref(),
					&concealed_packages,
				)?;
			}
		}
		if let Some((owner, method)) = &outer_class {
			let (method_name, method_desc) = match method {
				Some((name, desc)) => (Some(name.as_ref()), Some(desc.as_ref())),
				None => (None, None),
			};
			visitor.visit_outer_class(owner, method_name, method_desc)?;
		}
		for (offset, visible) in [(visible_annotations, true), (invisible_annotations, false)] {
			if let Some(offset) = offset {
				let mut r = Cursor::new(self.bytes);
				r.set_position(offset);
				let count = r.read_u16_as_usize()?;
				for _ in 0..count {
					let descriptor = self.utf8(r.read_u16()?)?;
					let av = visitor.visit_annotation(&descriptor, visible)?;
					self.read_element_values(&mut r, true, av)?;
				}
			}
		}
		for attribute in &raw_attributes {
			visitor.visit_attribute(attribute)?;
		}
		if let Some(offset) = inner_classes {
			let mut r = Cursor::new(self.bytes);
			r.set_position(offset);
			let count = r.read_u16_as_usize()?;
			for _ in 0..count {
				let name = self.class_name(r.read_u16()?)?;
				let outer_name = self.opt_class_name(r.read_u16()?)?;
				let inner_name = self.opt_utf8(r.read_u16()?)?;
				let inner_access = r.read_u16()? as u32;
				visitor.visit_inner_class(&name, outer_name.as_deref(), inner_name.as_deref(), inner_access)?;
			}
		}

		for offset in field_offsets {
			self.read_field(offset, visitor, options)?;
		}
		for offset in method_offsets {
			self.read_method(offset, visitor, options, &bootstrap_methods)?;
		}
		visitor.visit_end()
	}

	fn skip_members(&self, r: &mut Cursor<&'a [u8]>) -> Result<Vec<u64>> {
		let count = r.read_u16_as_usize()?;
		let mut offsets = Vec::with_capacity(count);
		for _ in 0..count {
			offsets.push(r.marker()?);
			// access, name, descriptor
			r.skip(6)?;
			let attribute_count = r.read_u16_as_usize()?;
			for _ in 0..attribute_count {
				r.skip(2)?;
				let len = r.read_u32_as_usize()?;
				r.skip(len as i64)?;
			}
		}
		Ok(offsets)
	}

	#[allow(clippy::too_many_arguments)]
	fn read_module(
		&self,
		body: u64,
		visitor: &mut dyn ModuleVisitor,
		version: Option<&JavaStr>,
		main_class: Option<&JavaStr>,
		target: Option<&(Option<JavaString>, Option<JavaString>, Option<JavaString>)>,
		concealed_packages: &[JavaString],
	) -> Result<()> {
		if let Some(version) = version {
			visitor.visit_version(version)?;
		}
		if let Some(main_class) = main_class {
			visitor.visit_main_class(main_class)?;
		}
		if let Some((os_name, os_arch, os_version)) = target {
			visitor.visit_target_platform(os_name.as_deref(), os_arch.as_deref(), os_version.as_deref())?;
		}
		for package in concealed_packages {
			visitor.visit_concealed_package(package)?;
		}

		let mut r = Cursor::new(self.bytes);
		r.set_position(body);
		let require_count = r.read_u16_as_usize()?;
		for _ in 0..require_count {
			let module = self.module_name(r.read_u16()?)?;
			let require_access = r.read_u16()? as u32;
			visitor.visit_require(&module, require_access)?;
		}
		let export_count = r.read_u16_as_usize()?;
		for _ in 0..export_count {
			let package = self.package_name(r.read_u16()?)?;
			let export_access = r.read_u16()? as u32;
			let to: Vec<JavaString> = r.read_vec(
				|r| r.read_u16_as_usize(),
				|r| {
					let index = r.read_u16()?;
					self.module_name(index)
				},
			)?;
			visitor.visit_export(&package, export_access, &to)?;
		}
		let use_count = r.read_u16_as_usize()?;
		for _ in 0..use_count {
			let service = self.class_name(r.read_u16()?)?;
			visitor.visit_use(&service)?;
		}
		let provide_count = r.read_u16_as_usize()?;
		for _ in 0..provide_count {
			let service = self.class_name(r.read_u16()?)?;
			let provider = self.class_name(r.read_u16()?)?;
			visitor.visit_provide(&service, &provider)?;
		}
		visitor.visit_end()
	}

	/// Reads `num_element_value_pairs` (or plain values when `named` is
	/// false) and closes `av`. Input is consumed whether or not someone
	/// listens.
	fn read_element_values(
		&self,
		r: &mut Cursor<&'a [u8]>,
		named: bool,
		mut av: Option<&mut dyn AnnotationVisitor>,
	) -> Result<()> {
		let count = r.read_u16_as_usize()?;
		for _ in 0..count {
			let name = if named { Some(self.utf8(r.read_u16()?)?) } else { None };
			self.read_element_value(
				r,
				name.as_deref(),
				match av {
					Some(ref mut a) => Some(&mut **a),
					None => None,
				},
			)?;
		}
		if let Some(av) = av {
			av.visit_end()?;
		}
		Ok(())
	}

	fn read_element_value(
		&self,
		r: &mut Cursor<&'a [u8]>,
		name: Option<&JavaStr>,
		mut av: Option<&mut dyn AnnotationVisitor>,
	) -> Result<()> {
		use crate::tree::AnnotationValue;

		let pos = r.marker()?;
		let tag = r.read_u8()?;
		match tag {
			b'B' | b'C' | b'Z' | b'S' | b'I' | b'J' | b'F' | b'D' | b's' | b'c' => {
				let index = r.read_u16()?;
				let value = match tag {
					b'B' => AnnotationValue::Byte(self.integer(index)? as i8),
					b'C' => AnnotationValue::Char(self.integer(index)? as u16),
					b'Z' => AnnotationValue::Boolean(self.integer(index)? != 0),
					b'S' => AnnotationValue::Short(self.integer(index)? as i16),
					b'I' => AnnotationValue::Int(self.integer(index)?),
					b'J' => AnnotationValue::Long(self.long(index)?),
					b'F' => AnnotationValue::Float(self.float(index)?),
					b'D' => AnnotationValue::Double(self.double(index)?),
					b's' => AnnotationValue::String(self.utf8(index)?),
					_ => AnnotationValue::Class(self.utf8(index)?),
				};
				if let Some(av) = av {
					av.visit_value(name, &value)?;
				}
			},
			b'e' => {
				let descriptor = self.utf8(r.read_u16()?)?;
				let value = self.utf8(r.read_u16()?)?;
				if let Some(av) = av {
					av.visit_enum_value(name, &descriptor, &value)?;
				}
			},
			b'@' => {
				let descriptor = self.utf8(r.read_u16()?)?;
				let nested = match av.as_deref_mut() {
					Some(av) => av.visit_annotation_value(name, &descriptor)?,
					None => None,
				};
				self.read_element_values(r, true, nested)?;
			},
			b'[' => {
				let nested = match av.as_deref_mut() {
					Some(av) => av.visit_array_value(name)?,
					None => None,
				};
				self.read_element_values(r, false, nested)?;
			},
			_ => return Err(Error::invalid(pos, format!("unknown element value tag {:?}", tag as char))),
		}
		Ok(())
	}

	fn read_field(&self, offset: u64, visitor: &mut dyn ClassVisitor, options: ReaderOptions) -> Result<()> {
		let mut r = Cursor::new(self.bytes);
		r.set_position(offset);
		let mut field_access = r.read_u16()? as u32;
		let name = self.utf8(r.read_u16()?)?;
		let descriptor = self.utf8(r.read_u16()?)?;

		let mut signature = None;
		let mut value = None;
		let mut visible_annotations = None;
		let mut invisible_annotations = None;
		let mut raw_attributes = Vec::new();

		let attribute_count = r.read_u16_as_usize()?;
		for _ in 0..attribute_count {
			let attr_name = self.utf8(r.read_u16()?)?;
			let len = r.read_u32_as_usize()?;
			let body = r.marker()?;
			let attr_ref: &JavaStr = &attr_name;

			if attr_ref == attribute::CONSTANT_VALUE {
				value = Some(self.constant(r.read_u16()?)?);
			} else if attr_ref == attribute::SIGNATURE {
				signature = Some(self.utf8(r.read_u16()?)?);
			} else if attr_ref == attribute::DEPRECATED {
				field_access |= access::DEPRECATED;
			} else if attr_ref == attribute::SYNTHETIC {
				field_access |= access::SYNTHETIC;
			} else if attr_ref == attribute::RUNTIME_VISIBLE_ANNOTATIONS {
				visible_annotations = Some(body);
			} else if attr_ref == attribute::RUNTIME_INVISIBLE_ANNOTATIONS {
				invisible_annotations = Some(body);
			} else if options.keep_unknown_attributes {
				raw_attributes.push(Attribute { name: attr_name, data: r.read_u8_vec(len)? });
			}
			r.set_position(body + len as u64);
		}

		let Some(fv) = visitor.visit_field(field_access, &name, &descriptor, signature.as_deref(), value.as_ref())? else {
			return Ok(());
		};
		for (offset, visible) in [(visible_annotations, true), (invisible_annotations, false)] {
			if let Some(offset) = offset {
				let mut r = Cursor::new(self.bytes);
				r.set_position(offset);
				let count = r.read_u16_as_usize()?;
				for _ in 0..count {
					let descriptor = self.utf8(r.read_u16()?)?;
					let av = fv.visit_annotation(&descriptor, visible)?;
					self.read_element_values(&mut r, true, av)?;
				}
			}
		}
		for attribute in &raw_attributes {
			fv.visit_attribute(attribute)?;
		}
		fv.visit_end()
	}

	fn read_method(
		&self,
		offset: u64,
		visitor: &mut dyn ClassVisitor,
		options: ReaderOptions,
		bootstrap: &[(Handle, Vec<Constant>)],
	) -> Result<()> {
		let mut r = Cursor::new(self.bytes);
		r.set_position(offset);
		let mut method_access = r.read_u16()? as u32;
		let name = self.utf8(r.read_u16()?)?;
		let descriptor = self.utf8(r.read_u16()?)?;

		let mut signature = None;
		let mut exceptions: Vec<JavaString> = Vec::new();
		let mut annotation_default = None;
		let mut visible_annotations = None;
		let mut invisible_annotations = None;
		let mut visible_parameter_annotations = None;
		let mut invisible_parameter_annotations = None;
		let mut code = None;
		let mut raw_attributes = Vec::new();

		let attribute_count = r.read_u16_as_usize()?;
		for _ in 0..attribute_count {
			let attr_name = self.utf8(r.read_u16()?)?;
			let len = r.read_u32_as_usize()?;
			let body = r.marker()?;
			let attr_ref: &JavaStr = &attr_name;

			if attr_ref == attribute::CODE {
				code = Some(body);
			} else if attr_ref == attribute::EXCEPTIONS {
				exceptions = r.read_vec(
					|r| r.read_u16_as_usize(),
					|r| {
						let index = r.read_u16()?;
						self.class_name(index)
					},
				)?;
			} else if attr_ref == attribute::SIGNATURE {
				signature = Some(self.utf8(r.read_u16()?)?);
			} else if attr_ref == attribute::DEPRECATED {
				method_access |= access::DEPRECATED;
			} else if attr_ref == attribute::SYNTHETIC {
				method_access |= access::SYNTHETIC;
			} else if attr_ref == attribute::ANNOTATION_DEFAULT {
				annotation_default = Some(body);
			} else if attr_ref == attribute::RUNTIME_VISIBLE_ANNOTATIONS {
				visible_annotations = Some(body);
			} else if attr_ref == attribute::RUNTIME_INVISIBLE_ANNOTATIONS {
				invisible_annotations = Some(body);
			} else if attr_ref == attribute::RUNTIME_VISIBLE_PARAMETER_ANNOTATIONS {
				visible_parameter_annotations = Some(body);
			} else if attr_ref == attribute::RUNTIME_INVISIBLE_PARAMETER_ANNOTATIONS {
				invisible_parameter_annotations = Some(body);
			} else if options.keep_unknown_attributes {
				raw_attributes.push(Attribute { name: attr_name, data: r.read_u8_vec(len)? });
			}
			r.set_position(body + len as u64);
		}

		let Some(mv) = visitor.visit_method(method_access, &name, &descriptor, signature.as_deref(), &exceptions)? else {
			return Ok(());
		};
		if let Some(offset) = annotation_default {
			let mut r = Cursor::new(self.bytes);
			r.set_position(offset);
			let mut av = mv.visit_annotation_default()?;
			self.read_element_value(
				&mut r,
				None,
				match av {
					Some(ref mut a) => Some(&mut **a),
					None => None,
				},
			)?;
			if let Some(av) = av {
				av.visit_end()?;
			}
		}
		for (offset, visible) in [(visible_annotations, true), (invisible_annotations, false)] {
			if let Some(offset) = offset {
				let mut r = Cursor::new(self.bytes);
				r.set_position(offset);
				let count = r.read_u16_as_usize()?;
				for _ in 0..count {
					let descriptor = self.utf8(r.read_u16()?)?;
					let av = mv.visit_annotation(&descriptor, visible)?;
					self.read_element_values(&mut r, true, av)?;
				}
			}
		}
		for (offset, visible) in [(visible_parameter_annotations, true), (invisible_parameter_annotations, false)] {
			if let Some(offset) = offset {
				let mut r = Cursor::new(self.bytes);
				r.set_position(offset);
				let parameter_count = r.read_u8()?;
				for parameter in 0..parameter_count {
					let count = r.read_u16_as_usize()?;
					for _ in 0..count {
						let descriptor = self.utf8(r.read_u16()?)?;
						let av = mv.visit_parameter_annotation(parameter, &descriptor, visible)?;
						self.read_element_values(&mut r, true, av)?;
					}
				}
			}
		}
		for attribute in &raw_attributes {
			mv.visit_attribute(attribute)?;
		}
		if let Some(offset) = code {
			mv.visit_code()?;
			self.read_code(offset, mv, options, bootstrap)?;
		}
		mv.visit_end()
	}

	fn read_code(
		&self,
		offset: u64,
		visitor: &mut dyn MethodVisitor,
		options: ReaderOptions,
		bootstrap: &[(Handle, Vec<Constant>)],
	) -> Result<()> {
		let mut r = Cursor::new(self.bytes);
		r.set_position(offset);
		let max_stack = r.read_u16()?;
		let max_locals = r.read_u16()?;
		let code_length = r.read_u32_as_usize()?;
		let code_start = r.marker()?;
		r.skip(code_length as i64)?;

		let target = |insn_offset: usize, branch: i32| -> Result<usize> {
			let target = insn_offset as i64 + branch as i64;
			if (0..code_length as i64).contains(&target) {
				Ok(target as usize)
			} else {
				Err(Error::invalid(
					code_start + insn_offset as u64,
					format!("branch target {target} outside the code array"),
				))
			}
		};
		let in_code = |pc: usize, at: u64| -> Result<usize> {
			if pc <= code_length {
				Ok(pc)
			} else {
				Err(Error::invalid(at, format!("offset {pc} outside the code array")))
			}
		};

		// pass 1: every offset a label is needed at
		let mut targets: BTreeSet<usize> = BTreeSet::new();
		{
			let mut r = Cursor::new(self.bytes);
			r.set_position(code_start);
			let end = code_start + code_length as u64;
			while r.marker()? < end {
				let pos = r.marker()?;
				let insn_offset = (pos - code_start) as usize;
				let op = r.read_u8()?;
				match op {
					opcode::IFEQ..=opcode::JSR | opcode::IFNULL | opcode::IFNONNULL => {
						let branch = r.read_i16()? as i32;
						targets.insert(target(insn_offset, branch)?);
					},
					opcode::GOTO_W | opcode::JSR_W => {
						let branch = r.read_i32()?;
						targets.insert(target(insn_offset, branch)?);
					},
					opcode::TABLESWITCH => {
						while (r.marker()? - code_start) % 4 != 0 {
							r.skip(1)?;
						}
						targets.insert(target(insn_offset, r.read_i32()?)?);
						let min = r.read_i32()?;
						let max = r.read_i32()?;
						let count = max as i64 - min as i64 + 1;
						if count < 0 {
							return Err(Error::invalid(pos, "tableswitch with max below min"));
						}
						for _ in 0..count {
							targets.insert(target(insn_offset, r.read_i32()?)?);
						}
					},
					opcode::LOOKUPSWITCH => {
						while (r.marker()? - code_start) % 4 != 0 {
							r.skip(1)?;
						}
						targets.insert(target(insn_offset, r.read_i32()?)?);
						let count = r.read_i32()?;
						if count < 0 {
							return Err(Error::invalid(pos, "lookupswitch with a negative pair count"));
						}
						for _ in 0..count {
							r.skip(4)?;
							targets.insert(target(insn_offset, r.read_i32()?)?);
						}
					},
					opcode::WIDE => {
						let w = r.read_u8()?;
						r.skip(if w == opcode::IINC { 4 } else { 2 })?;
					},
					_ => match operand_length(op) {
						Some(len) => r.skip(len as i64)?,
						None => return Err(Error::invalid(pos, format!("unknown opcode {op:#04x}"))),
					},
				}
			}
		}

		let exception_count = r.read_u16_as_usize()?;
		let mut handlers = Vec::with_capacity(exception_count);
		for _ in 0..exception_count {
			let at = r.marker()?;
			let start = in_code(r.read_u16()? as usize, at)?;
			let end = in_code(r.read_u16()? as usize, at)?;
			let handler = in_code(r.read_u16()? as usize, at)?;
			let catch_type = self.opt_class_name(r.read_u16()?)?;
			targets.insert(start);
			targets.insert(end);
			targets.insert(handler);
			handlers.push((start, end, handler, catch_type));
		}

		let mut lines_at: HashMap<usize, Vec<u16>> = HashMap::new();
		let mut local_variables: Vec<(usize, usize, JavaString, JavaString, u16)> = Vec::new();
		let mut raw_attributes: Vec<Attribute> = Vec::new();
		let attribute_count = r.read_u16_as_usize()?;
		for _ in 0..attribute_count {
			let attr_name = self.utf8(r.read_u16()?)?;
			let len = r.read_u32_as_usize()?;
			let body = r.marker()?;
			let attr_ref: &JavaStr = &attr_name;

			if attr_ref == attribute::LINE_NUMBER_TABLE {
				if !options.skip_debug {
					let count = r.read_u16_as_usize()?;
					for _ in 0..count {
						let at = r.marker()?;
						let pc = in_code(r.read_u16()? as usize, at)?;
						let line = r.read_u16()?;
						targets.insert(pc);
						lines_at.entry(pc).or_default().push(line);
					}
				}
			} else if attr_ref == attribute::LOCAL_VARIABLE_TABLE {
				if !options.skip_debug {
					let count = r.read_u16_as_usize()?;
					for _ in 0..count {
						let at = r.marker()?;
						let start = in_code(r.read_u16()? as usize, at)?;
						let length = r.read_u16()? as usize;
						let end = in_code(start + length, at)?;
						let var_name = self.utf8(r.read_u16()?)?;
						let var_descriptor = self.utf8(r.read_u16()?)?;
						let index = r.read_u16()?;
						targets.insert(start);
						targets.insert(end);
						local_variables.push((start, end, var_name, var_descriptor, index));
					}
				}
			} else if options.keep_unknown_attributes {
				raw_attributes.push(Attribute { name: attr_name, data: r.read_u8_vec(len)? });
			}
			r.set_position(body + len as u64);
		}

		// labels get dense ids in bytecode order
		let labels: HashMap<usize, Label> = targets.iter()
			.enumerate()
			.map(|(id, &offset)| (offset, Label::new(id as u32)))
			.collect();
		let label_of = |pc: usize| -> Result<Label> {
			labels.get(&pc).copied()
				.ok_or_else(|| Error::invalid(code_start + pc as u64, "no label at this offset"))
		};

		// pass 2: emit the events
		let mut r = Cursor::new(self.bytes);
		r.set_position(code_start);
		let end = code_start + code_length as u64;
		while r.marker()? < end {
			let pos = r.marker()?;
			let insn_offset = (pos - code_start) as usize;
			if let Some(&label) = labels.get(&insn_offset) {
				visitor.visit_label(label)?;
				if let Some(lines) = lines_at.get(&insn_offset) {
					for &line in lines {
						visitor.visit_line_number(line, label)?;
					}
				}
			}
			let op = r.read_u8()?;
			match op {
				opcode::BIPUSH => visitor.visit_int_insn(op, r.read_i8()? as i32)?,
				opcode::SIPUSH => visitor.visit_int_insn(op, r.read_i16()? as i32)?,
				opcode::NEWARRAY => visitor.visit_int_insn(op, r.read_u8()? as i32)?,
				opcode::LDC => visitor.visit_ldc_insn(&self.constant(r.read_u8()? as u16)?)?,
				opcode::LDC_W | opcode::LDC2_W => visitor.visit_ldc_insn(&self.constant(r.read_u16()?)?)?,
				opcode::ILOAD..=opcode::ALOAD | opcode::ISTORE..=opcode::ASTORE | opcode::RET =>
					visitor.visit_var_insn(op, r.read_u8()? as u16)?,
				opcode::ILOAD_0..=opcode::ALOAD_3 => {
					let short = op - opcode::ILOAD_0;
					visitor.visit_var_insn(opcode::ILOAD + short / 4, (short % 4) as u16)?;
				},
				opcode::ISTORE_0..=opcode::ASTORE_3 => {
					let short = op - opcode::ISTORE_0;
					visitor.visit_var_insn(opcode::ISTORE + short / 4, (short % 4) as u16)?;
				},
				opcode::IINC => {
					let var = r.read_u8()? as u16;
					let increment = r.read_i8()? as i16;
					visitor.visit_iinc_insn(var, increment)?;
				},
				opcode::WIDE => {
					let w = r.read_u8()?;
					match w {
						opcode::IINC => {
							let var = r.read_u16()?;
							let increment = r.read_i16()?;
							visitor.visit_iinc_insn(var, increment)?;
						},
						opcode::ILOAD..=opcode::ALOAD | opcode::ISTORE..=opcode::ASTORE | opcode::RET =>
							visitor.visit_var_insn(w, r.read_u16()?)?,
						_ => return Err(Error::invalid(pos, format!("wide prefix before opcode {w:#04x}"))),
					}
				},
				opcode::IFEQ..=opcode::JSR | opcode::IFNULL | opcode::IFNONNULL => {
					let branch = r.read_i16()? as i32;
					visitor.visit_jump_insn(op, label_of(target(insn_offset, branch)?)?)?;
				},
				opcode::GOTO_W => {
					let branch = r.read_i32()?;
					visitor.visit_jump_insn(opcode::GOTO, label_of(target(insn_offset, branch)?)?)?;
				},
				opcode::JSR_W => {
					let branch = r.read_i32()?;
					visitor.visit_jump_insn(opcode::JSR, label_of(target(insn_offset, branch)?)?)?;
				},
				opcode::TABLESWITCH => {
					while (r.marker()? - code_start) % 4 != 0 {
						r.skip(1)?;
					}
					let default = label_of(target(insn_offset, r.read_i32()?)?)?;
					let min = r.read_i32()?;
					let max = r.read_i32()?;
					let count = max as i64 - min as i64 + 1;
					let mut table = Vec::with_capacity(count as usize);
					for _ in 0..count {
						table.push(label_of(target(insn_offset, r.read_i32()?)?)?);
					}
					visitor.visit_table_switch_insn(min, max, default, &table)?;
				},
				opcode::LOOKUPSWITCH => {
					while (r.marker()? - code_start) % 4 != 0 {
						r.skip(1)?;
					}
					let default = label_of(target(insn_offset, r.read_i32()?)?)?;
					let count = r.read_i32()?;
					let mut keys = Vec::with_capacity(count as usize);
					let mut table = Vec::with_capacity(count as usize);
					for _ in 0..count {
						keys.push(r.read_i32()?);
						table.push(label_of(target(insn_offset, r.read_i32()?)?)?);
					}
					visitor.visit_lookup_switch_insn(default, &keys, &table)?;
				},
				opcode::GETSTATIC..=opcode::PUTFIELD => {
					let (owner, member_name, member_descriptor) = self.member_ref(r.read_u16()?)?;
					visitor.visit_field_insn(op, &owner, &member_name, &member_descriptor)?;
				},
				opcode::INVOKEVIRTUAL..=opcode::INVOKEINTERFACE => {
					let (owner, member_name, member_descriptor) = self.member_ref(r.read_u16()?)?;
					if op == opcode::INVOKEINTERFACE {
						// count and the zero byte carry no information
						r.skip(2)?;
					}
					visitor.visit_method_insn(op, &owner, &member_name, &member_descriptor)?;
				},
				opcode::INVOKEDYNAMIC => {
					let index = r.read_u16()?;
					r.skip(2)?;
					let (bootstrap_index, dyn_name, dyn_descriptor) = self.invoke_dynamic(index)?;
					let (handle, arguments) = bootstrap.get(bootstrap_index as usize)
						.ok_or_else(|| Error::invalid(pos, format!("bootstrap method {bootstrap_index} out of range")))?;
					visitor.visit_invoke_dynamic_insn(&dyn_name, &dyn_descriptor, handle, arguments)?;
				},
				opcode::NEW | opcode::ANEWARRAY | opcode::CHECKCAST | opcode::INSTANCEOF => {
					let type_name = self.class_name(r.read_u16()?)?;
					visitor.visit_type_insn(op, &type_name)?;
				},
				opcode::MULTIANEWARRAY => {
					let array_descriptor = self.class_name(r.read_u16()?)?;
					let dimensions = r.read_u8()?;
					visitor.visit_multi_anew_array_insn(&array_descriptor, dimensions)?;
				},
				_ => {
					if operand_length(op) == Some(0) {
						visitor.visit_insn(op)?;
					} else {
						return Err(Error::invalid(pos, format!("unknown opcode {op:#04x}")));
					}
				},
			}
		}
		// ranges may end one past the last instruction
		if let Some(&label) = labels.get(&code_length) {
			visitor.visit_label(label)?;
		}

		for (start, end, handler, catch_type) in &handlers {
			visitor.visit_try_catch_block(label_of(*start)?, label_of(*end)?, label_of(*handler)?, catch_type.as_deref())?;
		}
		for attribute in &raw_attributes {
			visitor.visit_attribute(attribute)?;
		}
		for (start, end, var_name, var_descriptor, index) in &local_variables {
			visitor.visit_local_variable(var_name, var_descriptor, None, label_of(*start)?, label_of(*end)?, *index)?;
		}
		visitor.visit_maxs(max_stack, max_locals)
	}
}

/// Operand bytes following an opcode with a fixed layout; [`None`] for
/// unknown opcodes (branches, switches and `wide` are handled separately).
fn operand_length(op: u8) -> Option<usize> {
	match op {
		opcode::NOP..=opcode::DCONST_1
		| opcode::ILOAD_0..=opcode::SALOAD
		| opcode::ISTORE_0..=opcode::LXOR
		| opcode::I2L..=opcode::DCMPG
		| opcode::IRETURN..=opcode::RETURN
		| opcode::ARRAYLENGTH | opcode::ATHROW
		| opcode::MONITORENTER | opcode::MONITOREXIT => Some(0),
		opcode::BIPUSH | opcode::LDC
		| opcode::ILOAD..=opcode::ALOAD
		| opcode::ISTORE..=opcode::ASTORE
		| opcode::RET | opcode::NEWARRAY => Some(1),
		opcode::SIPUSH | opcode::LDC_W | opcode::LDC2_W | opcode::IINC
		| opcode::GETSTATIC..=opcode::INVOKESTATIC
		| opcode::NEW | opcode::ANEWARRAY | opcode::CHECKCAST | opcode::INSTANCEOF => Some(2),
		opcode::MULTIANEWARRAY => Some(3),
		opcode::INVOKEINTERFACE | opcode::INVOKEDYNAMIC => Some(4),
		_ => None,
	}
}

#[cfg(test)]
mod tests {
	use anyhow::Result;
	use pretty_assertions::assert_eq;
	use java_string::{JavaStr, JavaString};
	use crate::class_constants::{access, opcode};
	use crate::class_writer::{ClassWriter, WriterFlags};
	use crate::tree::class::ClassNode;
	use crate::tree::method::InsnNode;
	use crate::tree::version::Version;
	use crate::visitor::ClassVisitor;
	use super::{ClassReader, ReaderOptions};

	fn simple_class() -> Result<Vec<u8>> {
		let mut writer = ClassWriter::new(WriterFlags::NONE);
		writer.visit(
			Version::V1_8,
			access::PUBLIC | access::SUPER,
			JavaStr::from_str("com/example/Simple"),
			None,
			Some(JavaStr::from_str("java/lang/Object")),
			&[JavaString::from("java/io/Serializable")],
		)?;
		writer.visit_source(Some(JavaStr::from_str("Simple.java")))?;
		if let Some(mv) = writer.visit_method(
			access::PUBLIC | access::STATIC,
			JavaStr::from_str("answer"),
			JavaStr::from_str("()I"),
			None,
			&[],
		)? {
			mv.visit_code()?;
			mv.visit_int_insn(opcode::BIPUSH, 42)?;
			mv.visit_insn(opcode::IRETURN)?;
			mv.visit_maxs(1, 0)?;
			mv.visit_end()?;
		}
		writer.visit_end()?;
		writer.to_bytes()
	}

	#[test]
	fn wrong_magic_is_rejected() {
		assert!(ClassReader::new(&[0x00, 0x01, 0x02, 0x03, 0, 0, 0, 45]).is_err());
	}

	#[test]
	fn future_version_is_rejected() {
		assert!(ClassReader::new(&[0xCA, 0xFE, 0xBA, 0xBE, 0x00, 0x00, 0x00, 0x38]).is_err());
	}

	#[test]
	fn header_round_trip() -> Result<()> {
		let bytes = simple_class()?;
		let reader = ClassReader::new(&bytes)?;
		let mut node = ClassNode::new();
		reader.accept(&mut node, ReaderOptions::default())?;

		assert_eq!(node.version, Version::V1_8);
		assert_eq!(node.access, access::PUBLIC | access::SUPER);
		assert_eq!(node.name, JavaString::from("com/example/Simple"));
		assert_eq!(node.super_name, Some(JavaString::from("java/lang/Object")));
		assert_eq!(node.interfaces, vec![JavaString::from("java/io/Serializable")]);
		assert_eq!(node.source, Some(JavaString::from("Simple.java")));
		Ok(())
	}

	#[test]
	fn straight_line_code_round_trip() -> Result<()> {
		let bytes = simple_class()?;
		let reader = ClassReader::new(&bytes)?;
		let mut node = ClassNode::new();
		reader.accept(&mut node, ReaderOptions::default())?;

		let method = &node.methods[0];
		assert!(method.has_code);
		assert_eq!(method.instructions, vec![
			InsnNode::Int { opcode: opcode::BIPUSH, operand: 42 },
			InsnNode::Insn { opcode: opcode::IRETURN },
		]);
		assert_eq!((method.max_stack, method.max_locals), (1, 0));
		Ok(())
	}

	#[test]
	fn skip_debug_drops_the_source_file() -> Result<()> {
		let bytes = simple_class()?;
		let reader = ClassReader::new(&bytes)?;
		let mut node = ClassNode::new();
		reader.accept(&mut node, ReaderOptions { skip_debug: true, ..ReaderOptions::default() })?;
		assert_eq!(node.source, None);
		Ok(())
	}
}
