use anyhow::Result;
use java_string::JavaStr;
use crate::tree::AnnotationValue;

/// Visits the element values of an annotation, or the elements of an array
/// value.
///
/// `name` is the element name inside an annotation, and [`None`] for the
/// elements of an array value (and for the single value driven through
/// `visit_annotation_default`).
pub trait AnnotationVisitor {
	/// The next visitor in the chain, if any. Defaults drive it.
	fn delegate(&mut self) -> Option<&mut dyn AnnotationVisitor> {
		None
	}

	fn visit_value(&mut self, name: Option<&JavaStr>, value: &AnnotationValue) -> Result<()> {
		match self.delegate() {
			Some(next) => next.visit_value(name, value),
			None => Ok(()),
		}
	}

	/// Visits an enum constant value. `descriptor` is the field descriptor
	/// of the enum class, `value` the constant's name.
	fn visit_enum_value(&mut self, name: Option<&JavaStr>, descriptor: &JavaStr, value: &JavaStr) -> Result<()> {
		match self.delegate() {
			Some(next) => next.visit_enum_value(name, descriptor, value),
			None => Ok(()),
		}
	}

	fn visit_annotation_value(&mut self, name: Option<&JavaStr>, descriptor: &JavaStr) -> Result<Option<&mut dyn AnnotationVisitor>> {
		match self.delegate() {
			Some(next) => next.visit_annotation_value(name, descriptor),
			None => Ok(None),
		}
	}

	/// Visits an array value. The returned visitor receives the elements
	/// as unnamed values.
	fn visit_array_value(&mut self, name: Option<&JavaStr>) -> Result<Option<&mut dyn AnnotationVisitor>> {
		match self.delegate() {
			Some(next) => next.visit_array_value(name),
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
