//! The visitor traits describing a class file as a stream of events.
//!
//! Every method has a default implementation that forwards to the visitor
//! returned by `delegate`, so an adapter only overrides what it cares about
//! and everything else flows through to the next visitor in the chain. A
//! visitor with no delegate swallows all events.
//!
//! All methods return a [`Result`], so any visitor can abort a walk; the
//! reader stops at the first error and propagates it.

use anyhow::Result;
use java_string::{JavaStr, JavaString};
use crate::attribute::Attribute;
use crate::tree::Constant;
use crate::tree::version::Version;

pub mod annotation;
pub mod method;
pub mod module;

pub use annotation::AnnotationVisitor;
pub use method::MethodVisitor;
pub use module::ModuleVisitor;

/// Visits a class in class-file order: the header, then the module, the
/// class-level annotations and attributes, then fields, methods, and
/// finally `visit_end`.
pub trait ClassVisitor {
	/// The next visitor in the chain, if any. Defaults drive it.
	fn delegate(&mut self) -> Option<&mut dyn ClassVisitor> {
		None
	}

	/// Visits the header of the class.
	///
	/// `interfaces` holds internal names; `super_name` is [`None`] only for
	/// `java/lang/Object`.
	fn visit(
		&mut self,
		version: Version,
		access: u32,
		name: &JavaStr,
		signature: Option<&JavaStr>,
		super_name: Option<&JavaStr>,
		interfaces: &[JavaString],
	) -> Result<()> {
		match self.delegate() {
			Some(next) => next.visit(version, access, name, signature, super_name, interfaces),
			None => Ok(()),
		}
	}

	fn visit_source(&mut self, source: Option<&JavaStr>) -> Result<()> {
		match self.delegate() {
			Some(next) => next.visit_source(source),
			None => Ok(()),
		}
	}

	/// Visits the module this class declares, for `module-info` classes.
	fn visit_module(&mut self) -> Result<Option<&mut dyn ModuleVisitor>> {
		match self.delegate() {
			Some(next) => next.visit_module(),
			None => Ok(None),
		}
	}

	/// Visits the enclosing method of the class, for local and anonymous
	/// classes. `method_name`/`method_desc` are [`None`] when the class is
	/// not enclosed in a method body.
	fn visit_outer_class(
		&mut self,
		owner: &JavaStr,
		method_name: Option<&JavaStr>,
		method_desc: Option<&JavaStr>,
	) -> Result<()> {
		match self.delegate() {
			Some(next) => next.visit_outer_class(owner, method_name, method_desc),
			None => Ok(()),
		}
	}

	fn visit_annotation(&mut self, descriptor: &JavaStr, visible: bool) -> Result<Option<&mut dyn AnnotationVisitor>> {
		match self.delegate() {
			Some(next) => next.visit_annotation(descriptor, visible),
			None => Ok(None),
		}
	}

	/// Visits an attribute this crate has no structured model for.
	fn visit_attribute(&mut self, attribute: &Attribute) -> Result<()> {
		match self.delegate() {
			Some(next) => next.visit_attribute(attribute),
			None => Ok(()),
		}
	}

	fn visit_inner_class(
		&mut self,
		name: &JavaStr,
		outer_name: Option<&JavaStr>,
		inner_name: Option<&JavaStr>,
		access: u32,
	) -> Result<()> {
		match self.delegate() {
			Some(next) => next.visit_inner_class(name, outer_name, inner_name, access),
			None => Ok(()),
		}
	}

	fn visit_field(
		&mut self,
		access: u32,
		name: &JavaStr,
		descriptor: &JavaStr,
		signature: Option<&JavaStr>,
		value: Option<&Constant>,
	) -> Result<Option<&mut dyn FieldVisitor>> {
		match self.delegate() {
			Some(next) => next.visit_field(access, name, descriptor, signature, value),
			None => Ok(None),
		}
	}

	fn visit_method(
		&mut self,
		access: u32,
		name: &JavaStr,
		descriptor: &JavaStr,
		signature: Option<&JavaStr>,
		exceptions: &[JavaString],
	) -> Result<Option<&mut dyn MethodVisitor>> {
		match self.delegate() {
			Some(next) => next.visit_method(access, name, descriptor, signature, exceptions),
			None => Ok(None),
		}
	}

	fn visit_end(&mut self) -> Result<()> {
		match self.delegate() {
			Some(next) => next.visit_end(),
			None => Ok(()),
		}
	}
}

/// Visits a field: annotations, then attributes, then `visit_end`.
pub trait FieldVisitor {
	fn delegate(&mut self) -> Option<&mut dyn FieldVisitor> {
		None
	}

	fn visit_annotation(&mut self, descriptor: &JavaStr, visible: bool) -> Result<Option<&mut dyn AnnotationVisitor>> {
		match self.delegate() {
			Some(next) => next.visit_annotation(descriptor, visible),
			None => Ok(None),
		}
	}

	fn visit_attribute(&mut self, attribute: &Attribute) -> Result<()> {
		match self.delegate() {
			Some(next) => next.visit_attribute(attribute),
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
