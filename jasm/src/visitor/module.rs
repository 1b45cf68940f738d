use anyhow::Result;
use java_string::{JavaStr, JavaString};

/// Visits a module declaration, as stored in a `module-info` class.
///
/// This follows the early-access module format of JDK 9: the `Module`
/// attribute holds requires/exports/uses/provides, while the version, main
/// class, target platform and concealed packages live in small attributes
/// of their own next to it.
pub trait ModuleVisitor {
	/// The next visitor in the chain, if any. Defaults drive it.
	fn delegate(&mut self) -> Option<&mut dyn ModuleVisitor> {
		None
	}

	fn visit_version(&mut self, version: &JavaStr) -> Result<()> {
		match self.delegate() {
			Some(next) => next.visit_version(version),
			None => Ok(()),
		}
	}

	/// Visits the main class, by internal name.
	fn visit_main_class(&mut self, main_class: &JavaStr) -> Result<()> {
		match self.delegate() {
			Some(next) => next.visit_main_class(main_class),
			None => Ok(()),
		}
	}

	fn visit_target_platform(
		&mut self,
		os_name: Option<&JavaStr>,
		os_arch: Option<&JavaStr>,
		os_version: Option<&JavaStr>,
	) -> Result<()> {
		match self.delegate() {
			Some(next) => next.visit_target_platform(os_name, os_arch, os_version),
			None => Ok(()),
		}
	}

	/// Visits a package of this module that is neither exported nor open.
	fn visit_concealed_package(&mut self, package: &JavaStr) -> Result<()> {
		match self.delegate() {
			Some(next) => next.visit_concealed_package(package),
			None => Ok(()),
		}
	}

	fn visit_require(&mut self, module: &JavaStr, access: u32) -> Result<()> {
		match self.delegate() {
			Some(next) => next.visit_require(module, access),
			None => Ok(()),
		}
	}

	/// Visits an exported package. An empty `to` list means an
	/// unqualified export.
	fn visit_export(&mut self, package: &JavaStr, access: u32, to: &[JavaString]) -> Result<()> {
		match self.delegate() {
			Some(next) => next.visit_export(package, access, to),
			None => Ok(()),
		}
	}

	/// Visits a used service, by internal name.
	fn visit_use(&mut self, service: &JavaStr) -> Result<()> {
		match self.delegate() {
			Some(next) => next.visit_use(service),
			None => Ok(()),
		}
	}

	/// Visits a provided service with its implementation class, both by
	/// internal name.
	fn visit_provide(&mut self, service: &JavaStr, provider: &JavaStr) -> Result<()> {
		match self.delegate() {
			Some(next) => next.visit_provide(service, provider),
			None => Ok(()),
		}
	}

	fn visit_end(&mut self) -> Result<()> {
		match self.delegate() {
			Some(next) => next.visit_end(),
			None => Ok(()),
		}
	}
}
