use std::collections::hash_map::Entry;
use std::collections::HashMap;
use anyhow::Result;
use java_string::JavaStr;
use crate::class_constants::pool;
use crate::class_constants::pool::method_handle_reference;
use crate::error::Error;
use crate::tree::{Constant, Handle};
use crate::{jstring, ClassWrite};

/// One bootstrap method of the `BootstrapMethods` attribute, with its
/// arguments already interned as pool indices.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct BootstrapMethod {
	handle_index: u16,
	argument_indices: Vec<u16>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum PoolEntry {
	Utf8(Vec<u8>),
	Integer(i32),
	/// Stored as bits so the entry can be hashed.
	Float(u32),
	Long(i64),
	Double(u64),
	Class { name_index: u16 },
	String { string_index: u16 },
	FieldRef { class_index: u16, name_and_type_index: u16 },
	MethodRef { class_index: u16, name_and_type_index: u16 },
	InterfaceMethodRef { class_index: u16, name_and_type_index: u16 },
	NameAndType { name_index: u16, descriptor_index: u16 },
	MethodHandle { reference_kind: u8, reference_index: u16 },
	MethodType { descriptor_index: u16 },
	InvokeDynamic { bootstrap_method_attribute_index: u16, name_and_type_index: u16 },
	Module { name_index: u16 },
	Package { name_index: u16 },
}

/// The constant pool of a class under construction.
///
/// Entries are deduplicated: putting the same value twice hands out the
/// same index. Long and double entries occupy two slots.
#[derive(Debug, Default)]
pub struct ConstantPool {
	/// The value written as `constant_pool_count`, one past the last used
	/// slot. Starts at 1; the zeroth slot does not exist on the wire.
	count: u16,
	/// The used entries in index order. Positions don't map to indices
	/// directly since wide entries skip one.
	entries: Vec<PoolEntry>,
	map: HashMap<PoolEntry, u16>,
	bootstrap_methods: Vec<BootstrapMethod>,
	bootstrap_map: HashMap<BootstrapMethod, u16>,
}

impl ConstantPool {
	pub fn new() -> ConstantPool {
		ConstantPool {
			count: 1,
			entries: Vec::new(),
			map: HashMap::new(),
			bootstrap_methods: Vec::new(),
			bootstrap_map: HashMap::new(),
		}
	}

	fn put(&mut self, entry: PoolEntry) -> Result<u16> {
		match self.map.entry(entry) {
			Entry::Occupied(entry) => Ok(*entry.get()),
			Entry::Vacant(entry) => {
				let index = self.count;
				let slots = if matches!(entry.key(), PoolEntry::Long(_) | PoolEntry::Double(_)) { 2 } else { 1 };
				self.count = self.count.checked_add(slots).ok_or(Error::PoolOverflow)?;

				self.entries.push(entry.key().clone());
				entry.insert(index);
				Ok(index)
			},
		}
	}

	pub fn put_utf8(&mut self, value: &JavaStr) -> Result<u16> {
		self.put(PoolEntry::Utf8(jstring::from_string_to_vec(value).into_owned()))
	}

	/// Returns index zero for [`None`].
	pub fn put_optional_utf8(&mut self, value: Option<&JavaStr>) -> Result<u16> {
		match value {
			Some(value) => self.put_utf8(value),
			None => Ok(0),
		}
	}

	pub fn put_class(&mut self, name: &JavaStr) -> Result<u16> {
		let name_index = self.put_utf8(name)?;
		self.put(PoolEntry::Class { name_index })
	}

	/// Returns index zero for [`None`].
	pub fn put_optional_class(&mut self, name: Option<&JavaStr>) -> Result<u16> {
		match name {
			Some(name) => self.put_class(name),
			None => Ok(0),
		}
	}

	pub fn put_module(&mut self, name: &JavaStr) -> Result<u16> {
		let name_index = self.put_utf8(name)?;
		self.put(PoolEntry::Module { name_index })
	}

	pub fn put_package(&mut self, name: &JavaStr) -> Result<u16> {
		let name_index = self.put_utf8(name)?;
		self.put(PoolEntry::Package { name_index })
	}

	pub fn put_string(&mut self, value: &JavaStr) -> Result<u16> {
		let string_index = self.put_utf8(value)?;
		self.put(PoolEntry::String { string_index })
	}

	pub fn put_integer(&mut self, value: i32) -> Result<u16> {
		self.put(PoolEntry::Integer(value))
	}

	pub fn put_float(&mut self, value: f32) -> Result<u16> {
		self.put(PoolEntry::Float(value.to_bits()))
	}

	pub fn put_long(&mut self, value: i64) -> Result<u16> {
		self.put(PoolEntry::Long(value))
	}

	pub fn put_double(&mut self, value: f64) -> Result<u16> {
		self.put(PoolEntry::Double(value.to_bits()))
	}

	pub fn put_name_and_type(&mut self, name: &JavaStr, descriptor: &JavaStr) -> Result<u16> {
		let name_index = self.put_utf8(name)?;
		let descriptor_index = self.put_utf8(descriptor)?;
		self.put(PoolEntry::NameAndType { name_index, descriptor_index })
	}

	pub fn put_field_ref(&mut self, owner: &JavaStr, name: &JavaStr, descriptor: &JavaStr) -> Result<u16> {
		let class_index = self.put_class(owner)?;
		let name_and_type_index = self.put_name_and_type(name, descriptor)?;
		self.put(PoolEntry::FieldRef { class_index, name_and_type_index })
	}

	pub fn put_method_ref(&mut self, owner: &JavaStr, name: &JavaStr, descriptor: &JavaStr, interface: bool) -> Result<u16> {
		let class_index = self.put_class(owner)?;
		let name_and_type_index = self.put_name_and_type(name, descriptor)?;
		if interface {
			self.put(PoolEntry::InterfaceMethodRef { class_index, name_and_type_index })
		} else {
			self.put(PoolEntry::MethodRef { class_index, name_and_type_index })
		}
	}

	pub fn put_method_type(&mut self, descriptor: &JavaStr) -> Result<u16> {
		let descriptor_index = self.put_utf8(descriptor)?;
		self.put(PoolEntry::MethodType { descriptor_index })
	}

	pub fn put_method_handle(&mut self, handle: &Handle) -> Result<u16> {
		let reference_index = match handle.tag {
			method_handle_reference::GET_FIELD
			| method_handle_reference::GET_STATIC
			| method_handle_reference::PUT_FIELD
			| method_handle_reference::PUT_STATIC => self.put_field_ref(&handle.owner, &handle.name, &handle.desc)?,
			method_handle_reference::INVOKE_INTERFACE => self.put_method_ref(&handle.owner, &handle.name, &handle.desc, true)?,
			_ => self.put_method_ref(&handle.owner, &handle.name, &handle.desc, false)?,
		};
		self.put(PoolEntry::MethodHandle { reference_kind: handle.tag, reference_index })
	}

	pub fn put_constant(&mut self, constant: &Constant) -> Result<u16> {
		match constant {
			Constant::Integer(value) => self.put_integer(*value),
			Constant::Float(value) => self.put_float(*value),
			Constant::Long(value) => self.put_long(*value),
			Constant::Double(value) => self.put_double(*value),
			Constant::String(value) => self.put_string(value),
			Constant::Class(name) => self.put_class(name),
			Constant::MethodType(descriptor) => self.put_method_type(descriptor),
			Constant::MethodHandle(handle) => self.put_method_handle(handle),
		}
	}

	pub fn put_invoke_dynamic(&mut self, name: &JavaStr, descriptor: &JavaStr, bootstrap_method: &Handle, arguments: &[Constant]) -> Result<u16> {
		let name_and_type_index = self.put_name_and_type(name, descriptor)?;
		let bootstrap_method_attribute_index = self.put_bootstrap_method(bootstrap_method, arguments)?;
		self.put(PoolEntry::InvokeDynamic { bootstrap_method_attribute_index, name_and_type_index })
	}

	/// Puts an entry into the `BootstrapMethods` attribute and returns its
	/// index inside that attribute.
	fn put_bootstrap_method(&mut self, handle: &Handle, arguments: &[Constant]) -> Result<u16> {
		let handle_index = self.put_method_handle(handle)?;
		let mut argument_indices = Vec::with_capacity(arguments.len());
		for argument in arguments {
			argument_indices.push(self.put_constant(argument)?);
		}

		let entry = BootstrapMethod { handle_index, argument_indices };
		match self.bootstrap_map.entry(entry) {
			Entry::Occupied(entry) => Ok(*entry.get()),
			Entry::Vacant(entry) => {
				let index = u16::try_from(self.bootstrap_methods.len()).map_err(|_| Error::PoolOverflow)?;
				self.bootstrap_methods.push(entry.key().clone());
				entry.insert(index);
				Ok(index)
			},
		}
	}

	pub(crate) fn has_bootstrap_methods(&self) -> bool {
		!self.bootstrap_methods.is_empty()
	}

	/// Writes the `BootstrapMethods` attribute body, without the attribute
	/// name and length.
	pub(crate) fn write_bootstrap_methods(&self, writer: &mut impl ClassWrite) -> Result<()> {
		writer.write_usize_as_u16(self.bootstrap_methods.len())?;
		for method in &self.bootstrap_methods {
			writer.write_u16(method.handle_index)?;
			writer.write_slice(
				&method.argument_indices,
				|w, len| w.write_usize_as_u16(len),
				|w, &index| w.write_u16(index),
			)?;
		}
		Ok(())
	}

	/// Writes the pool, starting with `constant_pool_count`.
	pub(crate) fn write(&self, writer: &mut impl ClassWrite) -> Result<()> {
		writer.write_u16(self.count)?;

		for entry in &self.entries {
			match entry {
				PoolEntry::Utf8(bytes) => {
					writer.write_u8(pool::UTF8)?;
					writer.write_usize_as_u16(bytes.len())?;
					writer.write_u8_slice(bytes)?;
				},
				PoolEntry::Integer(value) => {
					writer.write_u8(pool::INTEGER)?;
					writer.write_i32(*value)?;
				},
				PoolEntry::Float(bits) => {
					writer.write_u8(pool::FLOAT)?;
					writer.write_u32(*bits)?;
				},
				PoolEntry::Long(value) => {
					writer.write_u8(pool::LONG)?;
					writer.write_i64(*value)?;
				},
				PoolEntry::Double(bits) => {
					writer.write_u8(pool::DOUBLE)?;
					writer.write_u64(*bits)?;
				},
				PoolEntry::Class { name_index } => {
					writer.write_u8(pool::CLASS)?;
					writer.write_u16(*name_index)?;
				},
				PoolEntry::String { string_index } => {
					writer.write_u8(pool::STRING)?;
					writer.write_u16(*string_index)?;
				},
				PoolEntry::FieldRef { class_index, name_and_type_index } => {
					writer.write_u8(pool::FIELD_REF)?;
					writer.write_u16(*class_index)?;
					writer.write_u16(*name_and_type_index)?;
				},
				PoolEntry::MethodRef { class_index, name_and_type_index } => {
					writer.write_u8(pool::METHOD_REF)?;
					writer.write_u16(*class_index)?;
					writer.write_u16(*name_and_type_index)?;
				},
				PoolEntry::InterfaceMethodRef { class_index, name_and_type_index } => {
					writer.write_u8(pool::INTERFACE_METHOD_REF)?;
					writer.write_u16(*class_index)?;
					writer.write_u16(*name_and_type_index)?;
				},
				PoolEntry::NameAndType { name_index, descriptor_index } => {
					writer.write_u8(pool::NAME_AND_TYPE)?;
					writer.write_u16(*name_index)?;
					writer.write_u16(*descriptor_index)?;
				},
				PoolEntry::MethodHandle { reference_kind, reference_index } => {
					writer.write_u8(pool::METHOD_HANDLE)?;
					writer.write_u8(*reference_kind)?;
					writer.write_u16(*reference_index)?;
				},
				PoolEntry::MethodType { descriptor_index } => {
					writer.write_u8(pool::METHOD_TYPE)?;
					writer.write_u16(*descriptor_index)?;
				},
				PoolEntry::InvokeDynamic { bootstrap_method_attribute_index, name_and_type_index } => {
					writer.write_u8(pool::INVOKE_DYNAMIC)?;
					writer.write_u16(*bootstrap_method_attribute_index)?;
					writer.write_u16(*name_and_type_index)?;
				},
				PoolEntry::Module { name_index } => {
					writer.write_u8(pool::MODULE)?;
					writer.write_u16(*name_index)?;
				},
				PoolEntry::Package { name_index } => {
					writer.write_u8(pool::PACKAGE)?;
					writer.write_u16(*name_index)?;
				},
			}
		}
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use anyhow::Result;
	use pretty_assertions::assert_eq;
	use java_string::JavaStr;
	use super::ConstantPool;

	#[test]
	fn indices_are_deduplicated() -> Result<()> {
		let mut pool = ConstantPool::new();
		let a = pool.put_utf8(JavaStr::from_str("java/lang/Object"))?;
		let b = pool.put_class(JavaStr::from_str("java/lang/Object"))?;
		let c = pool.put_class(JavaStr::from_str("java/lang/Object"))?;
		assert_eq!(a, 1);
		assert_eq!(b, 2);
		assert_eq!(b, c);
		assert_eq!(pool.put_utf8(JavaStr::from_str("java/lang/Object"))?, a);
		Ok(())
	}

	#[test]
	fn wide_entries_take_two_slots() -> Result<()> {
		let mut pool = ConstantPool::new();
		assert_eq!(pool.put_long(1)?, 1);
		assert_eq!(pool.put_integer(1)?, 3);
		assert_eq!(pool.put_double(1.0)?, 4);
		assert_eq!(pool.put_integer(2)?, 6);
		Ok(())
	}

	#[test]
	fn pool_count_is_one_past_the_last_slot() -> Result<()> {
		let mut pool = ConstantPool::new();
		pool.put_long(-1)?;
		pool.put_utf8(JavaStr::from_str("x"))?;

		let mut bytes = Vec::new();
		pool.write(&mut bytes)?;
		// count 4, then tag 5 with 8 value bytes, then tag 1 with "x"
		assert_eq!(bytes, vec![
			0x00, 0x04,
			5, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF,
			1, 0x00, 0x01, b'x',
		]);
		Ok(())
	}
}
