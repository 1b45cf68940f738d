//! Generic signatures, as stored in `Signature` attributes.
//!
//! [`SignatureReader`] parses a signature string and drives a
//! [`SignatureVisitor`]; [`SignatureWriter`] is the inverse, building the
//! string back up from the events. Feeding a reader into a writer
//! reproduces the input exactly.

use anyhow::{anyhow, Result};
use java_string::{JavaStr, JavaString};

/// Visits a generic signature.
///
/// A class signature is visited as `visit_formal_type_parameter`* (each
/// followed by its bounds), then `visit_superclass` and `visit_interface`*.
/// A method signature replaces the tail with `visit_parameter_type`*,
/// `visit_return_type` and `visit_exception_type`*. A type signature is a
/// single type.
///
/// Types themselves are visited as either `visit_base_type`,
/// `visit_type_variable`, `visit_array_type` followed by the element type,
/// or `visit_class_type` with its type arguments and `visit_inner_class_type`
/// steps, closed by `visit_end`.
pub trait SignatureVisitor {
	/// The next visitor in the chain, if any. Defaults drive it.
	fn delegate(&mut self) -> Option<&mut dyn SignatureVisitor> {
		None
	}

	fn visit_formal_type_parameter(&mut self, name: &JavaStr) -> Result<()> {
		match self.delegate() {
			Some(next) => next.visit_formal_type_parameter(name),
			None => Ok(()),
		}
	}

	fn visit_class_bound(&mut self) -> Result<Option<&mut dyn SignatureVisitor>> {
		match self.delegate() {
			Some(next) => next.visit_class_bound(),
			None => Ok(None),
		}
	}

	fn visit_interface_bound(&mut self) -> Result<Option<&mut dyn SignatureVisitor>> {
		match self.delegate() {
			Some(next) => next.visit_interface_bound(),
			None => Ok(None),
		}
	}

	fn visit_superclass(&mut self) -> Result<Option<&mut dyn SignatureVisitor>> {
		match self.delegate() {
			Some(next) => next.visit_superclass(),
			None => Ok(None),
		}
	}

	fn visit_interface(&mut self) -> Result<Option<&mut dyn SignatureVisitor>> {
		match self.delegate() {
			Some(next) => next.visit_interface(),
			None => Ok(None),
		}
	}

	fn visit_parameter_type(&mut self) -> Result<Option<&mut dyn SignatureVisitor>> {
		match self.delegate() {
			Some(next) => next.visit_parameter_type(),
			None => Ok(None),
		}
	}

	fn visit_return_type(&mut self) -> Result<Option<&mut dyn SignatureVisitor>> {
		match self.delegate() {
			Some(next) => next.visit_return_type(),
			None => Ok(None),
		}
	}

	fn visit_exception_type(&mut self) -> Result<Option<&mut dyn SignatureVisitor>> {
		match self.delegate() {
			Some(next) => next.visit_exception_type(),
			None => Ok(None),
		}
	}

	/// Visits a primitive type, including `'V'` for `void` return types.
	fn visit_base_type(&mut self, descriptor: char) -> Result<()> {
		match self.delegate() {
			Some(next) => next.visit_base_type(descriptor),
			None => Ok(()),
		}
	}

	fn visit_type_variable(&mut self, name: &JavaStr) -> Result<()> {
		match self.delegate() {
			Some(next) => next.visit_type_variable(name),
			None => Ok(()),
		}
	}

	/// Visits an array type. The element type follows on the returned
	/// visitor.
	fn visit_array_type(&mut self) -> Result<Option<&mut dyn SignatureVisitor>> {
		match self.delegate() {
			Some(next) => next.visit_array_type(),
			None => Ok(None),
		}
	}

	/// Visits the start of a class type, with the internal name of its
	/// outermost class.
	fn visit_class_type(&mut self, name: &JavaStr) -> Result<()> {
		match self.delegate() {
			Some(next) => next.visit_class_type(name),
			None => Ok(()),
		}
	}

	/// Visits a step from a class type to one of its inner classes, with
	/// the simple name of the inner class.
	fn visit_inner_class_type(&mut self, name: &JavaStr) -> Result<()> {
		match self.delegate() {
			Some(next) => next.visit_inner_class_type(name),
			None => Ok(()),
		}
	}

	/// Visits a type argument of the last visited class or inner class
	/// type. `wildcard` is `'+'` for `? extends`, `'-'` for `? super`,
	/// `' '` for a plain type argument and `'*'` for an unbounded wildcard.
	/// Except for `'*'`, the argument type follows on the returned visitor.
	fn visit_type_argument(&mut self, wildcard: char) -> Result<Option<&mut dyn SignatureVisitor>> {
		match self.delegate() {
			Some(next) => next.visit_type_argument(wildcard),
			None => Ok(None),
		}
	}

	/// Visits the end of the current class type.
	fn visit_end(&mut self) -> Result<()> {
		match self.delegate() {
			Some(next) => next.visit_end(),
			None => Ok(()),
		}
	}
}

/// Parses a signature string and replays it on a [`SignatureVisitor`].
pub struct SignatureReader<'a> {
	signature: &'a JavaStr,
}

impl<'a> SignatureReader<'a> {
	pub fn new(signature: &'a JavaStr) -> SignatureReader<'a> {
		SignatureReader { signature }
	}

	/// Accepts a class signature: formal type parameters, superclass and
	/// interfaces.
	pub fn accept_class(&self, visitor: &mut dyn SignatureVisitor) -> Result<()> {
		let mut pos = self.parse_formals(visitor)?;
		pos = self.parse_type(pos, visitor.visit_superclass()?)?;
		while pos < self.signature.len() {
			pos = self.parse_type(pos, visitor.visit_interface()?)?;
		}
		Ok(())
	}

	/// Accepts a method signature: formal type parameters, parameter types,
	/// return type and thrown types.
	pub fn accept_method(&self, visitor: &mut dyn SignatureVisitor) -> Result<()> {
		let mut pos = self.parse_formals(visitor)?;
		if self.at(pos)? != b'(' {
			return Err(self.mismatch(pos, "expected '('"));
		}
		pos += 1;
		while self.at(pos)? != b')' {
			pos = self.parse_type(pos, visitor.visit_parameter_type()?)?;
		}
		pos = self.parse_type(pos + 1, visitor.visit_return_type()?)?;
		while pos < self.signature.len() {
			if self.at(pos)? != b'^' {
				return Err(self.mismatch(pos, "expected '^'"));
			}
			pos = self.parse_type(pos + 1, visitor.visit_exception_type()?)?;
		}
		Ok(())
	}

	/// Accepts a type signature.
	pub fn accept_type(&self, visitor: &mut dyn SignatureVisitor) -> Result<()> {
		let pos = self.parse_type(0, Some(visitor))?;
		if pos != self.signature.len() {
			return Err(self.mismatch(pos, "trailing characters after type"));
		}
		Ok(())
	}

	fn parse_formals(&self, visitor: &mut dyn SignatureVisitor) -> Result<usize> {
		if self.signature.as_bytes().first() != Some(&b'<') {
			return Ok(0);
		}
		let mut pos = 1;
		loop {
			let end = self.find(b':', pos)?;
			visitor.visit_formal_type_parameter(&self.signature[pos..end])?;
			pos = end + 1;

			let c = self.at(pos)?;
			if c == b'L' || c == b'[' || c == b'T' {
				pos = self.parse_type(pos, visitor.visit_class_bound()?)?;
			}
			while self.at(pos)? == b':' {
				pos = self.parse_type(pos + 1, visitor.visit_interface_bound()?)?;
			}
			if self.at(pos)? == b'>' {
				return Ok(pos + 1);
			}
		}
	}

	/// Parses one type starting at `pos` and returns the position just
	/// after it. The events go to `visitor`; the input is consumed either
	/// way, so a visitor that returns no sub-visitor simply skips the
	/// corresponding part.
	fn parse_type(&self, pos: usize, visitor: Option<&mut dyn SignatureVisitor>) -> Result<usize> {
		let mut v = visitor;
		match self.at(pos)? {
			c @ (b'Z' | b'C' | b'B' | b'S' | b'I' | b'F' | b'J' | b'D' | b'V') => {
				if let Some(v) = v {
					v.visit_base_type(c as char)?;
				}
				Ok(pos + 1)
			},
			b'[' => {
				let nested = match v {
					Some(v) => v.visit_array_type()?,
					None => None,
				};
				self.parse_type(pos + 1, nested)
			},
			b'T' => {
				let end = self.find(b';', pos + 1)?;
				if let Some(v) = v {
					v.visit_type_variable(&self.signature[pos + 1..end])?;
				}
				Ok(end + 1)
			},
			b'L' => {
				let mut pos = pos + 1;
				let mut start = pos;
				let mut visited = false;
				let mut inner = false;
				loop {
					match self.at(pos)? {
						c @ (b'.' | b';') => {
							if !visited {
								let name = &self.signature[start..pos];
								if let Some(v) = v.as_deref_mut() {
									if inner {
										v.visit_inner_class_type(name)?;
									} else {
										v.visit_class_type(name)?;
									}
								}
							}
							pos += 1;
							if c == b';' {
								if let Some(v) = v {
									v.visit_end()?;
								}
								return Ok(pos);
							}
							start = pos;
							visited = false;
							inner = true;
						},
						b'<' => {
							let name = &self.signature[start..pos];
							if let Some(v) = v.as_deref_mut() {
								if inner {
									v.visit_inner_class_type(name)?;
								} else {
									v.visit_class_type(name)?;
								}
							}
							visited = true;
							pos += 1;
							while self.at(pos)? != b'>' {
								match self.at(pos)? {
									b'*' => {
										pos += 1;
										if let Some(v) = v.as_deref_mut() {
											v.visit_type_argument('*')?;
										}
									},
									c @ (b'+' | b'-') => {
										let nested = match v.as_deref_mut() {
											Some(v) => v.visit_type_argument(c as char)?,
											None => None,
										};
										pos = self.parse_type(pos + 1, nested)?;
									},
									_ => {
										let nested = match v.as_deref_mut() {
											Some(v) => v.visit_type_argument(' ')?,
											None => None,
										};
										pos = self.parse_type(pos, nested)?;
									},
								}
							}
							pos += 1;
						},
						_ => pos += 1,
					}
				}
			},
			_ => Err(self.mismatch(pos, "expected a type")),
		}
	}

	fn at(&self, pos: usize) -> Result<u8> {
		self.signature.as_bytes().get(pos).copied()
			.ok_or_else(|| anyhow!("signature {:?} ends early at position {pos}", self.signature))
	}

	fn find(&self, byte: u8, from: usize) -> Result<usize> {
		self.signature.as_bytes().get(from..)
			.and_then(|tail| tail.iter().position(|&b| b == byte))
			.map(|offset| from + offset)
			.ok_or_else(|| anyhow!("signature {:?} misses a {:?} after position {from}", self.signature, byte as char))
	}

	fn mismatch(&self, pos: usize, reason: &str) -> anyhow::Error {
		anyhow!("malformed signature {:?} at position {pos}: {reason}", self.signature)
	}
}

/// Builds a signature string from visit events.
///
/// The writer tracks enough state to place the `<`/`>` around formal type
/// parameters and type arguments, and the parentheses around method
/// parameter types, without being told where they end.
#[derive(Default)]
pub struct SignatureWriter {
	buf: JavaString,
	has_formals: bool,
	has_parameters: bool,
	/// One bit per level of class type nesting; the lowest bit says whether
	/// the innermost type argument list has been opened.
	argument_stack: u32,
}

impl SignatureWriter {
	pub fn new() -> SignatureWriter {
		SignatureWriter::default()
	}

	/// The signature built so far.
	pub fn finish(self) -> JavaString {
		self.buf
	}

	fn end_formals(&mut self) {
		if self.has_formals {
			self.has_formals = false;
			self.buf.push('>');
		}
	}

	fn end_arguments(&mut self) {
		if self.argument_stack % 2 == 1 {
			self.buf.push('>');
		}
		self.argument_stack /= 2;
	}
}

impl SignatureVisitor for SignatureWriter {
	fn visit_formal_type_parameter(&mut self, name: &JavaStr) -> Result<()> {
		if !self.has_formals {
			self.has_formals = true;
			self.buf.push('<');
		}
		self.buf.push_java_str(name);
		self.buf.push(':');
		Ok(())
	}

	fn visit_class_bound(&mut self) -> Result<Option<&mut dyn SignatureVisitor>> {
		Ok(Some(self))
	}

	fn visit_interface_bound(&mut self) -> Result<Option<&mut dyn SignatureVisitor>> {
		self.buf.push(':');
		Ok(Some(self))
	}

	fn visit_superclass(&mut self) -> Result<Option<&mut dyn SignatureVisitor>> {
		self.end_formals();
		Ok(Some(self))
	}

	fn visit_interface(&mut self) -> Result<Option<&mut dyn SignatureVisitor>> {
		Ok(Some(self))
	}

	fn visit_parameter_type(&mut self) -> Result<Option<&mut dyn SignatureVisitor>> {
		self.end_formals();
		if !self.has_parameters {
			self.has_parameters = true;
			self.buf.push('(');
		}
		Ok(Some(self))
	}

	fn visit_return_type(&mut self) -> Result<Option<&mut dyn SignatureVisitor>> {
		self.end_formals();
		if !self.has_parameters {
			self.buf.push('(');
		}
		self.has_parameters = false;
		self.buf.push(')');
		Ok(Some(self))
	}

	fn visit_exception_type(&mut self) -> Result<Option<&mut dyn SignatureVisitor>> {
		self.buf.push('^');
		Ok(Some(self))
	}

	fn visit_base_type(&mut self, descriptor: char) -> Result<()> {
		self.buf.push(descriptor);
		Ok(())
	}

	fn visit_type_variable(&mut self, name: &JavaStr) -> Result<()> {
		self.buf.push('T');
		self.buf.push_java_str(name);
		self.buf.push(';');
		Ok(())
	}

	fn visit_array_type(&mut self) -> Result<Option<&mut dyn SignatureVisitor>> {
		self.buf.push('[');
		Ok(Some(self))
	}

	fn visit_class_type(&mut self, name: &JavaStr) -> Result<()> {
		self.buf.push('L');
		self.buf.push_java_str(name);
		self.argument_stack *= 2;
		Ok(())
	}

	fn visit_inner_class_type(&mut self, name: &JavaStr) -> Result<()> {
		self.end_arguments();
		self.buf.push('.');
		self.buf.push_java_str(name);
		self.argument_stack *= 2;
		Ok(())
	}

	fn visit_type_argument(&mut self, wildcard: char) -> Result<Option<&mut dyn SignatureVisitor>> {
		if self.argument_stack % 2 == 0 {
			self.argument_stack |= 1;
			self.buf.push('<');
		}
		match wildcard {
			'*' => {
				self.buf.push('*');
				Ok(None)
			},
			' ' => Ok(Some(self)),
			w => {
				self.buf.push(w);
				Ok(Some(self))
			},
		}
	}

	fn visit_end(&mut self) -> Result<()> {
		self.end_arguments();
		self.buf.push(';');
		Ok(())
	}
}
