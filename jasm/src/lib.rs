//! Reading, writing and transforming JVM class files.
//!
//! The crate is organised around visitor traits: [`ClassReader`] decodes a
//! class file and drives a [`visitor::ClassVisitor`], while
//! [`ClassWriter`] implements the same traits and assembles a new class file
//! from the events it receives. Chaining a reader into a writer (possibly
//! with adapters in between) is the intended way to transform classes.
//!
//! For random-access edits there is an in-memory model in [`tree`], where
//! [`tree::class::ClassNode`] both implements the visitor traits (so it can
//! be filled by a reader) and can replay itself into any other visitor.

use std::io::{Read, Seek, SeekFrom, Write};
use anyhow::{Context, Result};

pub mod class_constants;
pub mod error;
pub mod tree;
pub mod visitor;
pub mod signature;
pub mod attribute;
pub mod class_reader;
pub mod class_writer;
pub mod size_eval;

mod descriptor;
mod jstring;

pub use class_reader::{ClassReader, ReaderOptions};
pub use class_writer::{ClassWriter, WriterFlags};

/// Big-endian primitive reading on top of [`Read`] + [`Seek`].
///
/// All multi-byte values in a class file are big-endian.
pub(crate) trait ClassRead: Read + Seek {
	/// The current position, for error reporting.
	fn marker(&mut self) -> Result<u64> {
		Ok(self.stream_position()?)
	}

	fn skip(&mut self, n: i64) -> Result<()> {
		self.seek(SeekFrom::Current(n))?;
		Ok(())
	}

	/// Runs `f` with the stream at `pos`, restoring the old position afterwards.
	fn with_pos<T>(&mut self, pos: u64, f: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> where Self: Sized {
		let old = self.stream_position()?;
		self.seek(SeekFrom::Start(pos))?;
		let result = f(self);
		self.seek(SeekFrom::Start(old))?;
		result
	}

	fn read_u8(&mut self) -> Result<u8> {
		let mut buf = [0u8; 1];
		self.read_exact(&mut buf)?;
		Ok(buf[0])
	}
	fn read_i8(&mut self) -> Result<i8> {
		Ok(self.read_u8()? as i8)
	}
	fn read_u16(&mut self) -> Result<u16> {
		let mut buf = [0u8; 2];
		self.read_exact(&mut buf)?;
		Ok(u16::from_be_bytes(buf))
	}
	fn read_i16(&mut self) -> Result<i16> {
		Ok(self.read_u16()? as i16)
	}
	fn read_u32(&mut self) -> Result<u32> {
		let mut buf = [0u8; 4];
		self.read_exact(&mut buf)?;
		Ok(u32::from_be_bytes(buf))
	}
	fn read_i32(&mut self) -> Result<i32> {
		Ok(self.read_u32()? as i32)
	}
	fn read_u64(&mut self) -> Result<u64> {
		let mut buf = [0u8; 8];
		self.read_exact(&mut buf)?;
		Ok(u64::from_be_bytes(buf))
	}
	fn read_i64(&mut self) -> Result<i64> {
		Ok(self.read_u64()? as i64)
	}

	fn read_u8_as_usize(&mut self) -> Result<usize> {
		Ok(self.read_u8()? as usize)
	}
	fn read_u16_as_usize(&mut self) -> Result<usize> {
		Ok(self.read_u16()? as usize)
	}
	fn read_u32_as_usize(&mut self) -> Result<usize> {
		Ok(self.read_u32()? as usize)
	}

	fn read_u8_vec(&mut self, len: usize) -> Result<Vec<u8>> {
		let mut vec = vec![0u8; len];
		self.read_exact(&mut vec)?;
		Ok(vec)
	}

	fn read_vec<T>(
		&mut self,
		len: impl FnOnce(&mut Self) -> Result<usize>,
		mut item: impl FnMut(&mut Self) -> Result<T>,
	) -> Result<Vec<T>> where Self: Sized {
		let len = len(self)?;
		let mut vec = Vec::with_capacity(len);
		for _ in 0..len {
			vec.push(item(self)?);
		}
		Ok(vec)
	}
}

impl<T: Read + Seek> ClassRead for T {}

/// Big-endian primitive writing on top of [`Write`].
pub(crate) trait ClassWrite: Write {
	fn write_u8(&mut self, value: u8) -> Result<()> {
		self.write_all(&[value])?;
		Ok(())
	}
	fn write_i8(&mut self, value: i8) -> Result<()> {
		self.write_u8(value as u8)
	}
	fn write_u16(&mut self, value: u16) -> Result<()> {
		self.write_all(&value.to_be_bytes())?;
		Ok(())
	}
	fn write_i16(&mut self, value: i16) -> Result<()> {
		self.write_u16(value as u16)
	}
	fn write_u32(&mut self, value: u32) -> Result<()> {
		self.write_all(&value.to_be_bytes())?;
		Ok(())
	}
	fn write_i32(&mut self, value: i32) -> Result<()> {
		self.write_u32(value as u32)
	}
	fn write_u64(&mut self, value: u64) -> Result<()> {
		self.write_all(&value.to_be_bytes())?;
		Ok(())
	}
	fn write_i64(&mut self, value: i64) -> Result<()> {
		self.write_u64(value as u64)
	}

	fn write_u8_slice(&mut self, slice: &[u8]) -> Result<()> {
		self.write_all(slice)?;
		Ok(())
	}

	fn write_usize_as_u8(&mut self, value: usize) -> Result<()> {
		let value: u8 = value.try_into().with_context(|| format!("length {value} doesn't fit into an u8"))?;
		self.write_u8(value)
	}
	fn write_usize_as_u16(&mut self, value: usize) -> Result<()> {
		let value: u16 = value.try_into().with_context(|| format!("length {value} doesn't fit into an u16"))?;
		self.write_u16(value)
	}
	fn write_usize_as_u32(&mut self, value: usize) -> Result<()> {
		let value: u32 = value.try_into().with_context(|| format!("length {value} doesn't fit into an u32"))?;
		self.write_u32(value)
	}

	fn write_slice<T>(
		&mut self,
		slice: &[T],
		len: impl FnOnce(&mut Self, usize) -> Result<()>,
		mut item: impl FnMut(&mut Self, &T) -> Result<()>,
	) -> Result<()> where Self: Sized {
		len(self, slice.len())?;
		for x in slice {
			item(self, x)?;
		}
		Ok(())
	}
}

impl<T: Write> ClassWrite for T {}
