use anyhow::Result;
use java_string::{JavaStr, JavaString};
use crate::attribute::Attribute;
use crate::tree::annotation::AnnotationNode;
use crate::tree::Constant;
use crate::visitor::annotation::AnnotationVisitor;
use crate::visitor::{ClassVisitor, FieldVisitor};

/// A field as data. Collects events as a [`FieldVisitor`] and replays them
/// with [`FieldNode::accept`].
#[derive(Debug, Clone, PartialEq)]
pub struct FieldNode {
	pub access: u32,
	pub name: JavaString,
	pub descriptor: JavaString,
	pub signature: Option<JavaString>,
	pub value: Option<Constant>,
	pub visible_annotations: Vec<AnnotationNode>,
	pub invisible_annotations: Vec<AnnotationNode>,
	pub attributes: Vec<Attribute>,
}

impl FieldNode {
	pub fn new(
		access: u32,
		name: JavaString,
		descriptor: JavaString,
		signature: Option<JavaString>,
		value: Option<Constant>,
	) -> FieldNode {
		FieldNode {
			access,
			name,
			descriptor,
			signature,
			value,
			visible_annotations: Vec::new(),
			invisible_annotations: Vec::new(),
			attributes: Vec::new(),
		}
	}

	pub fn accept(&self, visitor: &mut dyn ClassVisitor) -> Result<()> {
		let Some(fv) = visitor.visit_field(
			self.access,
			&self.name,
			&self.descriptor,
			self.signature.as_deref(),
			self.value.as_ref(),
		)? else {
			return Ok(());
		};
		for annotation in &self.visible_annotations {
			if let Some(av) = fv.visit_annotation(&annotation.descriptor, true)? {
				annotation.accept(av)?;
			}
		}
		for annotation in &self.invisible_annotations {
			if let Some(av) = fv.visit_annotation(&annotation.descriptor, false)? {
				annotation.accept(av)?;
			}
		}
		for attribute in &self.attributes {
			fv.visit_attribute(attribute)?;
		}
		fv.visit_end()
	}
}

impl FieldVisitor for FieldNode {
	fn visit_annotation(&mut self, descriptor: &JavaStr, visible: bool) -> Result<Option<&mut dyn AnnotationVisitor>> {
		let annotations = if visible { &mut self.visible_annotations } else { &mut self.invisible_annotations };
		annotations.push(AnnotationNode::new(descriptor.to_owned()));
		match annotations.last_mut() {
			Some(annotation) => Ok(Some(annotation)),
			None => Ok(None),
		}
	}

	fn visit_attribute(&mut self, attribute: &Attribute) -> Result<()> {
		self.attributes.push(attribute.clone());
		Ok(())
	}
}
