use std::cell::RefCell;
use std::rc::Rc;
use anyhow::Result;
use java_string::{JavaStr, JavaString};
use crate::class_constants::attribute;
use crate::class_writer::pool::ConstantPool;
use crate::class_writer::Attributes;
use crate::visitor::module::ModuleVisitor;
use crate::ClassWrite;

/// Encodes a module declaration into the class attribute sink.
///
/// The `Module` attribute body is accumulated per section; the version,
/// main class, target platform and concealed packages become their own
/// small attributes. Everything is delivered in `visit_end`.
pub(crate) struct ModuleWriter {
	pool: Rc<RefCell<ConstantPool>>,
	attrs: Rc<RefCell<Attributes>>,
	requires: Vec<u8>,
	require_count: u16,
	exports: Vec<u8>,
	export_count: u16,
	uses: Vec<u8>,
	use_count: u16,
	provides: Vec<u8>,
	provide_count: u16,
	version_index: u16,
	main_class_index: u16,
	target_platform: Option<(u16, u16, u16)>,
	concealed_packages: Vec<u16>,
}

impl ModuleWriter {
	pub(crate) fn new(pool: Rc<RefCell<ConstantPool>>, attrs: Rc<RefCell<Attributes>>) -> ModuleWriter {
		ModuleWriter {
			pool,
			attrs,
			requires: Vec::new(),
			require_count: 0,
			exports: Vec::new(),
			export_count: 0,
			uses: Vec::new(),
			use_count: 0,
			provides: Vec::new(),
			provide_count: 0,
			version_index: 0,
			main_class_index: 0,
			target_platform: None,
			concealed_packages: Vec::new(),
		}
	}
}

impl ModuleVisitor for ModuleWriter {
	fn visit_version(&mut self, version: &JavaStr) -> Result<()> {
		self.version_index = self.pool.borrow_mut().put_utf8(version)?;
		Ok(())
	}

	fn visit_main_class(&mut self, main_class: &JavaStr) -> Result<()> {
		self.main_class_index = self.pool.borrow_mut().put_class(main_class)?;
		Ok(())
	}

	fn visit_target_platform(
		&mut self,
		os_name: Option<&JavaStr>,
		os_arch: Option<&JavaStr>,
		os_version: Option<&JavaStr>,
	) -> Result<()> {
		let mut pool = self.pool.borrow_mut();
		self.target_platform = Some((
			pool.put_optional_utf8(os_name)?,
			pool.put_optional_utf8(os_arch)?,
			pool.put_optional_utf8(os_version)?,
		));
		Ok(())
	}

	fn visit_concealed_package(&mut self, package: &JavaStr) -> Result<()> {
		let index = self.pool.borrow_mut().put_package(package)?;
		self.concealed_packages.push(index);
		Ok(())
	}

	fn visit_require(&mut self, module: &JavaStr, access: u32) -> Result<()> {
		let index = self.pool.borrow_mut().put_module(module)?;
		self.requires.write_u16(index)?;
		self.requires.write_u16(access as u16)?;
		self.require_count += 1;
		Ok(())
	}

	fn visit_export(&mut self, package: &JavaStr, access: u32, to: &[JavaString]) -> Result<()> {
		let mut pool = self.pool.borrow_mut();
		let index = pool.put_package(package)?;
		self.exports.write_u16(index)?;
		self.exports.write_u16(access as u16)?;
		self.exports.write_usize_as_u16(to.len())?;
		for module in to {
			let index = pool.put_module(module)?;
			self.exports.write_u16(index)?;
		}
		self.export_count += 1;
		Ok(())
	}

	fn visit_use(&mut self, service: &JavaStr) -> Result<()> {
		let index = self.pool.borrow_mut().put_class(service)?;
		self.uses.write_u16(index)?;
		self.use_count += 1;
		Ok(())
	}

	fn visit_provide(&mut self, service: &JavaStr, provider: &JavaStr) -> Result<()> {
		let mut pool = self.pool.borrow_mut();
		let service_index = pool.put_class(service)?;
		let provider_index = pool.put_class(provider)?;
		self.provides.write_u16(service_index)?;
		self.provides.write_u16(provider_index)?;
		self.provide_count += 1;
		Ok(())
	}

	fn visit_end(&mut self) -> Result<()> {
		let mut body = Vec::new();
		body.write_u16(self.require_count)?;
		body.write_u8_slice(&self.requires)?;
		body.write_u16(self.export_count)?;
		body.write_u8_slice(&self.exports)?;
		body.write_u16(self.use_count)?;
		body.write_u8_slice(&self.uses)?;
		body.write_u16(self.provide_count)?;
		body.write_u8_slice(&self.provides)?;

		let mut pool = self.pool.borrow_mut();
		let mut attrs = self.attrs.borrow_mut();
		attrs.put(&mut pool, attribute::MODULE, &body)?;

		if self.version_index != 0 {
			let mut body = Vec::new();
			body.write_u16(self.version_index)?;
			attrs.put(&mut pool, attribute::VERSION, &body)?;
		}
		if self.main_class_index != 0 {
			let mut body = Vec::new();
			body.write_u16(self.main_class_index)?;
			attrs.put(&mut pool, attribute::MAIN_CLASS, &body)?;
		}
		if let Some((os_name, os_arch, os_version)) = self.target_platform {
			let mut body = Vec::new();
			body.write_u16(os_name)?;
			body.write_u16(os_arch)?;
			body.write_u16(os_version)?;
			attrs.put(&mut pool, attribute::TARGET_PLATFORM, &body)?;
		}
		if !self.concealed_packages.is_empty() {
			let mut body = Vec::new();
			body.write_slice(
				&self.concealed_packages,
				|w, len| w.write_usize_as_u16(len),
				|w, &index| w.write_u16(index),
			)?;
			attrs.put(&mut pool, attribute::CONCEALED_PACKAGES, &body)?;
		}
		Ok(())
	}
}
