//! Open-ended attributes: raw pass-through plus typed views of the OpenJDK
//! module attributes.

use std::io::Cursor;
use anyhow::{Context, Result};
use java_string::JavaString;
use crate::class_reader::ClassReader;
use crate::ClassRead;

/// An attribute this crate has no structured model for.
///
/// The reader hands these to `visit_attribute`, and the writer copies the
/// raw bytes back out. Note that `data` may contain constant pool indices
/// into the pool of the class it was read from; such an attribute only
/// stays meaningful when written back together with the rest of that class.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
	pub name: JavaString,
	pub data: Vec<u8>,
}

/// Typed view of the OpenJDK `ModuleHashes` attribute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleHashesAttribute {
	pub algorithm: JavaString,
	/// Module name and hash bytes, one pair per hashed module.
	pub hashes: Vec<(JavaString, Vec<u8>)>,
}

impl ModuleHashesAttribute {
	pub fn parse(reader: &ClassReader<'_>, attribute: &Attribute) -> Result<ModuleHashesAttribute> {
		let mut r = Cursor::new(attribute.data.as_slice());
		let algorithm = reader.utf8(r.read_u16()?).context("in ModuleHashes attribute")?;
		let hashes = r.read_vec(
			|r| r.read_u16_as_usize(),
			|r| {
				let module = reader.module_name(r.read_u16()?)?;
				let len = r.read_u16_as_usize()?;
				Ok((module, r.read_u8_vec(len)?))
			},
		)?;
		Ok(ModuleHashesAttribute { algorithm, hashes })
	}
}

/// Typed view of the OpenJDK `ModuleTarget` attribute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleTargetAttribute {
	pub platform: JavaString,
}

impl ModuleTargetAttribute {
	pub fn parse(reader: &ClassReader<'_>, attribute: &Attribute) -> Result<ModuleTargetAttribute> {
		let mut r = Cursor::new(attribute.data.as_slice());
		let platform = reader.utf8(r.read_u16()?).context("in ModuleTarget attribute")?;
		Ok(ModuleTargetAttribute { platform })
	}
}

/// Typed view of the OpenJDK `ModuleResolution` attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModuleResolutionAttribute {
	pub resolution: u16,
}

impl ModuleResolutionAttribute {
	pub const DO_NOT_RESOLVE_BY_DEFAULT: u16 = 1;
	pub const WARN_DEPRECATED: u16 = 2;
	pub const WARN_DEPRECATED_FOR_REMOVAL: u16 = 4;
	pub const WARN_INCUBATING: u16 = 8;

	pub fn parse(attribute: &Attribute) -> Result<ModuleResolutionAttribute> {
		let mut r = Cursor::new(attribute.data.as_slice());
		let resolution = r.read_u16().context("in ModuleResolution attribute")?;
		Ok(ModuleResolutionAttribute { resolution })
	}
}
