use anyhow::Result;
use java_string::{JavaStr, JavaString};
use crate::visitor::module::ModuleVisitor;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequireNode {
	pub module: JavaString,
	pub access: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportNode {
	pub package: JavaString,
	pub access: u32,
	/// Modules the export is qualified to; empty for an unqualified export.
	pub to: Vec<JavaString>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvideNode {
	pub service: JavaString,
	pub provider: JavaString,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetPlatform {
	pub os_name: Option<JavaString>,
	pub os_arch: Option<JavaString>,
	pub os_version: Option<JavaString>,
}

/// A module declaration as data. Collects events as a [`ModuleVisitor`]
/// and replays them with [`ModuleNode::accept`].
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ModuleNode {
	pub version: Option<JavaString>,
	pub main_class: Option<JavaString>,
	pub target_platform: Option<TargetPlatform>,
	pub concealed_packages: Vec<JavaString>,
	pub requires: Vec<RequireNode>,
	pub exports: Vec<ExportNode>,
	pub uses: Vec<JavaString>,
	pub provides: Vec<ProvideNode>,
}

impl ModuleNode {
	pub fn accept(&self, visitor: &mut dyn ModuleVisitor) -> Result<()> {
		if let Some(version) = &self.version {
			visitor.visit_version(version)?;
		}
		if let Some(main_class) = &self.main_class {
			visitor.visit_main_class(main_class)?;
		}
		if let Some(target) = &self.target_platform {
			visitor.visit_target_platform(
				target.os_name.as_deref(),
				target.os_arch.as_deref(),
				target.os_version.as_deref(),
			)?;
		}
		for package in &self.concealed_packages {
			visitor.visit_concealed_package(package)?;
		}
		for require in &self.requires {
			visitor.visit_require(&require.module, require.access)?;
		}
		for export in &self.exports {
			visitor.visit_export(&export.package, export.access, &export.to)?;
		}
		for service in &self.uses {
			visitor.visit_use(service)?;
		}
		for provide in &self.provides {
			visitor.visit_provide(&provide.service, &provide.provider)?;
		}
		visitor.visit_end()
	}
}

impl ModuleVisitor for ModuleNode {
	fn visit_version(&mut self, version: &JavaStr) -> Result<()> {
		self.version = Some(version.to_owned());
		Ok(())
	}

	fn visit_main_class(&mut self, main_class: &JavaStr) -> Result<()> {
		self.main_class = Some(main_class.to_owned());
		Ok(())
	}

	fn visit_target_platform(
		&mut self,
		os_name: Option<&JavaStr>,
		os_arch: Option<&JavaStr>,
		os_version: Option<&JavaStr>,
	) -> Result<()> {
		self.target_platform = Some(TargetPlatform {
			os_name: os_name.map(|name| name.to_owned()),
			os_arch: os_arch.map(|arch| arch.to_owned()),
			os_version: os_version.map(|version| version.to_owned()),
		});
		Ok(())
	}

	fn visit_concealed_package(&mut self, package: &JavaStr) -> Result<()> {
		self.concealed_packages.push(package.to_owned());
		Ok(())
	}

	fn visit_require(&mut self, module: &JavaStr, access: u32) -> Result<()> {
		self.requires.push(RequireNode { module: module.to_owned(), access });
		Ok(())
	}

	fn visit_export(&mut self, package: &JavaStr, access: u32, to: &[JavaString]) -> Result<()> {
		self.exports.push(ExportNode { package: package.to_owned(), access, to: to.to_vec() });
		Ok(())
	}

	fn visit_use(&mut self, service: &JavaStr) -> Result<()> {
		self.uses.push(service.to_owned());
		Ok(())
	}

	fn visit_provide(&mut self, service: &JavaStr, provider: &JavaStr) -> Result<()> {
		self.provides.push(ProvideNode { service: service.to_owned(), provider: provider.to_owned() });
		Ok(())
	}
}
