//! Annotations as data. [`AnnotationNode`] doubles as an
//! [`AnnotationVisitor`] that collects the events it receives, and can
//! replay itself into any other visitor with [`AnnotationNode::accept`].

use anyhow::Result;
use java_string::{JavaStr, JavaString};
use crate::tree::AnnotationValue;
use crate::visitor::annotation::AnnotationVisitor;

/// One element value of an annotation.
#[derive(Debug, Clone, PartialEq)]
pub enum ElementValue {
	Const(AnnotationValue),
	Enum {
		/// Field descriptor of the enum class.
		descriptor: JavaString,
		value: JavaString,
	},
	Annotation(AnnotationNode),
	Array(Vec<ElementValue>),
}

/// An annotation, as a list of named element values.
#[derive(Debug, Clone, PartialEq)]
pub struct AnnotationNode {
	/// Field descriptor of the annotation class.
	pub descriptor: JavaString,
	pub values: Vec<(JavaString, ElementValue)>,
	nested: Option<Box<Nested>>,
}

/// Collects the elements of an array value. Element names are ignored.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ArrayValueNode {
	pub values: Vec<ElementValue>,
	nested: Option<Box<Nested>>,
}

/// A sub-visitor handed out to a caller, still being filled in. It is
/// folded into the owner on the owner's next event.
#[derive(Debug, Clone, PartialEq)]
enum Nested {
	Annotation(Option<JavaString>, AnnotationNode),
	Array(Option<JavaString>, ArrayValueNode),
}

impl Nested {
	fn into_value(self) -> (Option<JavaString>, ElementValue) {
		match self {
			Nested::Annotation(name, node) => (name, ElementValue::Annotation(node)),
			Nested::Array(name, node) => (name, ElementValue::Array(node.values)),
		}
	}
}

impl AnnotationNode {
	pub fn new(descriptor: JavaString) -> AnnotationNode {
		AnnotationNode { descriptor, values: Vec::new(), nested: None }
	}

	/// Replays this annotation into `visitor`, ending with `visit_end`.
	pub fn accept(&self, visitor: &mut dyn AnnotationVisitor) -> Result<()> {
		for (name, value) in &self.values {
			accept_value(Some(name), value, visitor)?;
		}
		visitor.visit_end()
	}

	fn flush(&mut self) {
		if let Some(nested) = self.nested.take() {
			let (name, value) = nested.into_value();
			self.values.push((name.unwrap_or_default(), value));
		}
	}
}

impl ArrayValueNode {
	fn flush(&mut self) {
		if let Some(nested) = self.nested.take() {
			let (_, value) = nested.into_value();
			self.values.push(value);
		}
	}
}

/// Replays a single element value into `visitor`.
pub(crate) fn accept_value(name: Option<&JavaStr>, value: &ElementValue, visitor: &mut dyn AnnotationVisitor) -> Result<()> {
	match value {
		ElementValue::Const(value) => visitor.visit_value(name, value),
		ElementValue::Enum { descriptor, value } => visitor.visit_enum_value(name, descriptor, value),
		ElementValue::Annotation(node) => {
			if let Some(nested) = visitor.visit_annotation_value(name, &node.descriptor)? {
				node.accept(nested)?;
			}
			Ok(())
		},
		ElementValue::Array(values) => {
			if let Some(nested) = visitor.visit_array_value(name)? {
				for value in values {
					accept_value(None, value, &mut *nested)?;
				}
				nested.visit_end()?;
			}
			Ok(())
		},
	}
}

fn own(name: Option<&JavaStr>) -> Option<JavaString> {
	name.map(|name| name.to_owned())
}

impl AnnotationVisitor for AnnotationNode {
	fn visit_value(&mut self, name: Option<&JavaStr>, value: &AnnotationValue) -> Result<()> {
		self.flush();
		self.values.push((own(name).unwrap_or_default(), ElementValue::Const(value.clone())));
		Ok(())
	}

	fn visit_enum_value(&mut self, name: Option<&JavaStr>, descriptor: &JavaStr, value: &JavaStr) -> Result<()> {
		self.flush();
		self.values.push((own(name).unwrap_or_default(), ElementValue::Enum {
			descriptor: descriptor.to_owned(),
			value: value.to_owned(),
		}));
		Ok(())
	}

	fn visit_annotation_value(&mut self, name: Option<&JavaStr>, descriptor: &JavaStr) -> Result<Option<&mut dyn AnnotationVisitor>> {
		self.flush();
		self.nested = Some(Box::new(Nested::Annotation(own(name), AnnotationNode::new(descriptor.to_owned()))));
		match self.nested.as_deref_mut() {
			Some(Nested::Annotation(_, node)) => Ok(Some(node)),
			_ => Ok(None),
		}
	}

	fn visit_array_value(&mut self, name: Option<&JavaStr>) -> Result<Option<&mut dyn AnnotationVisitor>> {
		self.flush();
		self.nested = Some(Box::new(Nested::Array(own(name), ArrayValueNode::default())));
		match self.nested.as_deref_mut() {
			Some(Nested::Array(_, node)) => Ok(Some(node)),
			_ => Ok(None),
		}
	}

	fn visit_end(&mut self) -> Result<()> {
		self.flush();
		Ok(())
	}
}

impl AnnotationVisitor for ArrayValueNode {
	fn visit_value(&mut self, _name: Option<&JavaStr>, value: &AnnotationValue) -> Result<()> {
		self.flush();
		self.values.push(ElementValue::Const(value.clone()));
		Ok(())
	}

	fn visit_enum_value(&mut self, _name: Option<&JavaStr>, descriptor: &JavaStr, value: &JavaStr) -> Result<()> {
		self.flush();
		self.values.push(ElementValue::Enum {
			descriptor: descriptor.to_owned(),
			value: value.to_owned(),
		});
		Ok(())
	}

	fn visit_annotation_value(&mut self, _name: Option<&JavaStr>, descriptor: &JavaStr) -> Result<Option<&mut dyn AnnotationVisitor>> {
		self.flush();
		self.nested = Some(Box::new(Nested::Annotation(None, AnnotationNode::new(descriptor.to_owned()))));
		match self.nested.as_deref_mut() {
			Some(Nested::Annotation(_, node)) => Ok(Some(node)),
			_ => Ok(None),
		}
	}

	fn visit_array_value(&mut self, _name: Option<&JavaStr>) -> Result<Option<&mut dyn AnnotationVisitor>> {
		self.flush();
		self.nested = Some(Box::new(Nested::Array(None, ArrayValueNode::default())));
		match self.nested.as_deref_mut() {
			Some(Nested::Array(_, node)) => Ok(Some(node)),
			_ => Ok(None),
		}
	}

	fn visit_end(&mut self) -> Result<()> {
		self.flush();
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use anyhow::Result;
	use pretty_assertions::assert_eq;
	use java_string::{JavaStr, JavaString};
	use crate::tree::AnnotationValue;
	use crate::visitor::annotation::AnnotationVisitor;
	use super::{AnnotationNode, ElementValue};

	fn sample() -> Result<AnnotationNode> {
		let mut node = AnnotationNode::new(JavaString::from("LRetention;"));
		node.visit_value(Some(JavaStr::from_str("count")), &AnnotationValue::Int(3))?;
		node.visit_enum_value(
			Some(JavaStr::from_str("policy")),
			JavaStr::from_str("LRetentionPolicy;"),
			JavaStr::from_str("RUNTIME"),
		)?;
		if let Some(array) = node.visit_array_value(Some(JavaStr::from_str("names")))? {
			array.visit_value(None, &AnnotationValue::String(JavaString::from("a")))?;
			array.visit_value(None, &AnnotationValue::String(JavaString::from("b")))?;
			array.visit_end()?;
		}
		if let Some(nested) = node.visit_annotation_value(Some(JavaStr::from_str("inner")), JavaStr::from_str("LInner;"))? {
			nested.visit_value(Some(JavaStr::from_str("flag")), &AnnotationValue::Boolean(true))?;
			nested.visit_end()?;
		}
		node.visit_end()?;
		Ok(node)
	}

	#[test]
	fn collects_events() -> Result<()> {
		let node = sample()?;
		assert_eq!(node.descriptor, JavaString::from("LRetention;"));
		assert_eq!(node.values.len(), 4);
		assert_eq!(node.values[0], (JavaString::from("count"), ElementValue::Const(AnnotationValue::Int(3))));
		assert_eq!(node.values[2].0, JavaString::from("names"));
		match &node.values[2].1 {
			ElementValue::Array(values) => assert_eq!(values.len(), 2),
			other => panic!("expected an array, got {other:?}"),
		}
		Ok(())
	}

	#[test]
	fn replay_reproduces_the_node() -> Result<()> {
		let node = sample()?;
		let mut copy = AnnotationNode::new(node.descriptor.clone());
		node.accept(&mut copy)?;
		assert_eq!(copy, node);
		Ok(())
	}
}
