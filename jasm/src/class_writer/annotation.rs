use std::cell::RefCell;
use std::rc::Rc;
use anyhow::{Context, Result};
use java_string::JavaStr;
use crate::class_writer::pool::ConstantPool;
use crate::tree::AnnotationValue;
use crate::visitor::annotation::AnnotationVisitor;
use crate::ClassWrite;

/// Encodes one `annotation` structure (or one `element_value`) into a shared
/// buffer as the events come in.
///
/// The element count is not known up front, so a placeholder is written and
/// patched in `visit_end`. Values of an array are unnamed; `named` tells the
/// writer whether to emit element name indices.
pub(crate) struct AnnotationWriter {
	pool: Rc<RefCell<ConstantPool>>,
	buf: Rc<RefCell<Vec<u8>>>,
	named: bool,
	count: u16,
	/// Buffer position of the `u16` element count, [`None`] for a bare
	/// `element_value` as in `AnnotationDefault`.
	count_offset: Option<usize>,
	nested: Option<Box<AnnotationWriter>>,
}

impl AnnotationWriter {
	/// Starts an `annotation` structure: `type_index` and a count to be
	/// patched later.
	pub(crate) fn new_annotation(
		pool: Rc<RefCell<ConstantPool>>,
		buf: Rc<RefCell<Vec<u8>>>,
		descriptor: &JavaStr,
	) -> Result<AnnotationWriter> {
		let type_index = pool.borrow_mut().put_utf8(descriptor)?;
		let count_offset;
		{
			let mut buf_mut = buf.borrow_mut();
			buf_mut.write_u16(type_index)?;
			count_offset = buf_mut.len();
			buf_mut.write_u16(0)?;
		}
		Ok(AnnotationWriter { pool, buf, named: true, count: 0, count_offset: Some(count_offset), nested: None })
	}

	/// Starts a bare `element_value`, as the body of `AnnotationDefault`.
	/// Exactly one unnamed value is expected.
	pub(crate) fn new_value(pool: Rc<RefCell<ConstantPool>>, buf: Rc<RefCell<Vec<u8>>>) -> AnnotationWriter {
		AnnotationWriter { pool, buf, named: false, count: 0, count_offset: None, nested: None }
	}

	fn begin(&mut self, name: Option<&JavaStr>) -> Result<()> {
		self.nested = None;
		if self.named {
			let name = name.context("annotation element values need a name")?;
			let name_index = self.pool.borrow_mut().put_utf8(name)?;
			self.buf.borrow_mut().write_u16(name_index)?;
		}
		self.count = self.count.checked_add(1).context("too many annotation element values")?;
		Ok(())
	}
}

impl AnnotationVisitor for AnnotationWriter {
	fn visit_value(&mut self, name: Option<&JavaStr>, value: &AnnotationValue) -> Result<()> {
		self.begin(name)?;
		let mut pool = self.pool.borrow_mut();
		let (tag, index) = match value {
			AnnotationValue::Byte(value) => (b'B', pool.put_integer(*value as i32)?),
			AnnotationValue::Char(value) => (b'C', pool.put_integer(*value as i32)?),
			AnnotationValue::Boolean(value) => (b'Z', pool.put_integer(*value as i32)?),
			AnnotationValue::Short(value) => (b'S', pool.put_integer(*value as i32)?),
			AnnotationValue::Int(value) => (b'I', pool.put_integer(*value)?),
			AnnotationValue::Long(value) => (b'J', pool.put_long(*value)?),
			AnnotationValue::Float(value) => (b'F', pool.put_float(*value)?),
			AnnotationValue::Double(value) => (b'D', pool.put_double(*value)?),
			AnnotationValue::String(value) => (b's', pool.put_utf8(value)?),
			AnnotationValue::Class(descriptor) => (b'c', pool.put_utf8(descriptor)?),
		};
		let mut buf = self.buf.borrow_mut();
		buf.write_u8(tag)?;
		buf.write_u16(index)
	}

	fn visit_enum_value(&mut self, name: Option<&JavaStr>, descriptor: &JavaStr, value: &JavaStr) -> Result<()> {
		self.begin(name)?;
		let mut pool = self.pool.borrow_mut();
		let type_name_index = pool.put_utf8(descriptor)?;
		let const_name_index = pool.put_utf8(value)?;
		let mut buf = self.buf.borrow_mut();
		buf.write_u8(b'e')?;
		buf.write_u16(type_name_index)?;
		buf.write_u16(const_name_index)
	}

	fn visit_annotation_value(&mut self, name: Option<&JavaStr>, descriptor: &JavaStr) -> Result<Option<&mut dyn AnnotationVisitor>> {
		self.begin(name)?;
		self.buf.borrow_mut().write_u8(b'@')?;
		let nested = AnnotationWriter::new_annotation(Rc::clone(&self.pool), Rc::clone(&self.buf), descriptor)?;
		self.nested = Some(Box::new(nested));
		match self.nested.as_deref_mut() {
			Some(nested) => Ok(Some(nested)),
			None => Ok(None),
		}
	}

	fn visit_array_value(&mut self, name: Option<&JavaStr>) -> Result<Option<&mut dyn AnnotationVisitor>> {
		self.begin(name)?;
		let count_offset;
		{
			let mut buf = self.buf.borrow_mut();
			buf.write_u8(b'[')?;
			count_offset = buf.len();
			buf.write_u16(0)?;
		}
		self.nested = Some(Box::new(AnnotationWriter {
			pool: Rc::clone(&self.pool),
			buf: Rc::clone(&self.buf),
			named: false,
			count: 0,
			count_offset: Some(count_offset),
			nested: None,
		}));
		match self.nested.as_deref_mut() {
			Some(nested) => Ok(Some(nested)),
			None => Ok(None),
		}
	}

	fn visit_end(&mut self) -> Result<()> {
		self.nested = None;
		if let Some(count_offset) = self.count_offset {
			let [a, b] = self.count.to_be_bytes();
			let mut buf = self.buf.borrow_mut();
			buf[count_offset] = a;
			buf[count_offset + 1] = b;
		}
		Ok(())
	}
}
