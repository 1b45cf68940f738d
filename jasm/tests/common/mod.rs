//! Takes a finished class file apart again, far enough for tests to get
//! at raw attribute bodies without going through the reader under test.

#![allow(dead_code)]

use std::collections::HashMap;

pub struct RawClass {
	utf8: HashMap<u16, Vec<u8>>,
	field_attributes: Vec<Vec<(Vec<u8>, Vec<u8>)>>,
	method_attributes: Vec<Vec<(Vec<u8>, Vec<u8>)>>,
	class_attributes: Vec<(Vec<u8>, Vec<u8>)>,
}

impl RawClass {
	pub fn parse(bytes: &[u8]) -> RawClass {
		let mut w = Walker { bytes, pos: 0 };
		assert_eq!(w.u32(), 0xCAFE_BABE, "magic");
		w.skip(4); // version

		let count = w.u16();
		let mut utf8 = HashMap::new();
		let mut index = 1;
		while index < count {
			let tag = w.u8();
			let mut slots = 1;
			match tag {
				1 => {
					let len = w.u16() as usize;
					utf8.insert(index, w.take(len).to_vec());
				},
				7 | 8 | 16 | 19 | 20 => w.skip(2),
				15 => w.skip(3),
				3 | 4 | 9 | 10 | 11 | 12 | 18 => w.skip(4),
				5 | 6 => {
					w.skip(8);
					slots = 2;
				},
				_ => panic!("unknown pool tag {tag}"),
			}
			index += slots;
		}

		w.skip(6); // access, this, super
		let interface_count = w.u16() as usize;
		w.skip(2 * interface_count);

		let field_attributes = members(&mut w, &utf8);
		let method_attributes = members(&mut w, &utf8);
		let class_attributes = attributes(&mut w, &utf8);
		assert_eq!(w.pos, bytes.len(), "trailing bytes");

		RawClass { utf8, field_attributes, method_attributes, class_attributes }
	}

	/// The body of the `Code` attribute of method number `index`.
	pub fn code(&self, index: usize) -> &[u8] {
		self.method_attribute(index, b"Code").expect("method has no Code attribute")
	}

	/// Just the bytecode array of method number `index`.
	pub fn bytecode(&self, index: usize) -> &[u8] {
		let body = self.code(index);
		let len = u32::from_be_bytes([body[4], body[5], body[6], body[7]]) as usize;
		&body[8..8 + len]
	}

	pub fn method_attribute(&self, index: usize, name: &[u8]) -> Option<&[u8]> {
		self.method_attributes[index].iter()
			.find(|(n, _)| n == name)
			.map(|(_, body)| body.as_slice())
	}

	pub fn class_attribute(&self, name: &[u8]) -> Option<&[u8]> {
		self.class_attributes.iter()
			.find(|(n, _)| n == name)
			.map(|(_, body)| body.as_slice())
	}

	pub fn has_class_attribute(&self, name: &[u8]) -> bool {
		self.class_attribute(name).is_some()
	}
}

fn members(w: &mut Walker, utf8: &HashMap<u16, Vec<u8>>) -> Vec<Vec<(Vec<u8>, Vec<u8>)>> {
	let count = w.u16() as usize;
	let mut all = Vec::with_capacity(count);
	for _ in 0..count {
		w.skip(6);
		all.push(attributes(w, utf8));
	}
	all
}

fn attributes(w: &mut Walker, utf8: &HashMap<u16, Vec<u8>>) -> Vec<(Vec<u8>, Vec<u8>)> {
	let count = w.u16() as usize;
	let mut all = Vec::with_capacity(count);
	for _ in 0..count {
		let name = utf8[&w.u16()].clone();
		let len = w.u32() as usize;
		all.push((name, w.take(len).to_vec()));
	}
	all
}

struct Walker<'a> {
	bytes: &'a [u8],
	pos: usize,
}

impl<'a> Walker<'a> {
	fn u8(&mut self) -> u8 {
		self.pos += 1;
		self.bytes[self.pos - 1]
	}

	fn u16(&mut self) -> u16 {
		u16::from_be_bytes([self.u8(), self.u8()])
	}

	fn u32(&mut self) -> u32 {
		u32::from_be_bytes([self.u8(), self.u8(), self.u8(), self.u8()])
	}

	fn take(&mut self, n: usize) -> &'a [u8] {
		self.pos += n;
		&self.bytes[self.pos - n..self.pos]
	}

	fn skip(&mut self, n: usize) {
		self.pos += n;
	}
}
