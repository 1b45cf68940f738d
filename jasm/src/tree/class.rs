use anyhow::Result;
use java_string::{JavaStr, JavaString};
use crate::attribute::Attribute;
use crate::tree::annotation::AnnotationNode;
use crate::tree::field::FieldNode;
use crate::tree::method::MethodNode;
use crate::tree::module::ModuleNode;
use crate::tree::version::Version;
use crate::tree::Constant;
use crate::visitor::annotation::AnnotationVisitor;
use crate::visitor::method::MethodVisitor;
use crate::visitor::module::ModuleVisitor;
use crate::visitor::{ClassVisitor, FieldVisitor};

/// One entry of the `InnerClasses` attribute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InnerClassNode {
	pub name: JavaString,
	pub outer_name: Option<JavaString>,
	pub inner_name: Option<JavaString>,
	pub access: u32,
}

/// The `EnclosingMethod` attribute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OuterClassNode {
	pub owner: JavaString,
	pub method_name: Option<JavaString>,
	pub method_desc: Option<JavaString>,
}

/// A whole class as data. Collects events as a [`ClassVisitor`] and
/// replays them with [`ClassNode::accept`].
#[derive(Debug, Clone, PartialEq)]
pub struct ClassNode {
	pub version: Version,
	pub access: u32,
	pub name: JavaString,
	pub signature: Option<JavaString>,
	pub super_name: Option<JavaString>,
	pub interfaces: Vec<JavaString>,
	pub source: Option<JavaString>,
	pub module: Option<ModuleNode>,
	pub outer_class: Option<OuterClassNode>,
	pub visible_annotations: Vec<AnnotationNode>,
	pub invisible_annotations: Vec<AnnotationNode>,
	pub attributes: Vec<Attribute>,
	pub inner_classes: Vec<InnerClassNode>,
	pub fields: Vec<FieldNode>,
	pub methods: Vec<MethodNode>,
}

impl ClassNode {
	pub fn new() -> ClassNode {
		ClassNode {
			version: Version::V1_1,
			access: 0,
			name: JavaString::new(),
			signature: None,
			super_name: None,
			interfaces: Vec::new(),
			source: None,
			module: None,
			outer_class: None,
			visible_annotations: Vec::new(),
			invisible_annotations: Vec::new(),
			attributes: Vec::new(),
			inner_classes: Vec::new(),
			fields: Vec::new(),
			methods: Vec::new(),
		}
	}

	/// Replays the whole class into `visitor`, in class-file order.
	pub fn accept(&self, visitor: &mut dyn ClassVisitor) -> Result<()> {
		visitor.visit(
			self.version,
			self.access,
			&self.name,
			self.signature.as_deref(),
			self.super_name.as_deref(),
			&self.interfaces,
		)?;
		if self.source.is_some() {
			visitor.visit_source(self.source.as_deref())?;
		}
		if let Some(module) = &self.module {
			if let Some(mv) = visitor.visit_module()? {
				module.accept(mv)?;
			}
		}
		if let Some(outer) = &self.outer_class {
			visitor.visit_outer_class(&outer.owner, outer.method_name.as_deref(), outer.method_desc.as_deref())?;
		}
		for annotation in &self.visible_annotations {
			if let Some(av) = visitor.visit_annotation(&annotation.descriptor, true)? {
				annotation.accept(av)?;
			}
		}
		for annotation in &self.invisible_annotations {
			if let Some(av) = visitor.visit_annotation(&annotation.descriptor, false)? {
				annotation.accept(av)?;
			}
		}
		for attribute in &self.attributes {
			visitor.visit_attribute(attribute)?;
		}
		for inner in &self.inner_classes {
			visitor.visit_inner_class(&inner.name, inner.outer_name.as_deref(), inner.inner_name.as_deref(), inner.access)?;
		}
		for field in &self.fields {
			field.accept(visitor)?;
		}
		for method in &self.methods {
			method.accept(visitor)?;
		}
		visitor.visit_end()
	}
}

impl Default for ClassNode {
	fn default() -> ClassNode {
		ClassNode::new()
	}
}

impl ClassVisitor for ClassNode {
	fn visit(
		&mut self,
		version: Version,
		access: u32,
		name: &JavaStr,
		signature: Option<&JavaStr>,
		super_name: Option<&JavaStr>,
		interfaces: &[JavaString],
	) -> Result<()> {
		self.version = version;
		self.access = access;
		self.name = name.to_owned();
		self.signature = signature.map(|signature| signature.to_owned());
		self.super_name = super_name.map(|name| name.to_owned());
		self.interfaces = interfaces.to_vec();
		Ok(())
	}

	fn visit_source(&mut self, source: Option<&JavaStr>) -> Result<()> {
		self.source = source.map(|source| source.to_owned());
		Ok(())
	}

	fn visit_module(&mut self) -> Result<Option<&mut dyn ModuleVisitor>> {
		self.module = Some(ModuleNode::default());
		match self.module.as_mut() {
			Some(module) => Ok(Some(module)),
			None => Ok(None),
		}
	}

	fn visit_outer_class(
		&mut self,
		owner: &JavaStr,
		method_name: Option<&JavaStr>,
		method_desc: Option<&JavaStr>,
	) -> Result<()> {
		self.outer_class = Some(OuterClassNode {
			owner: owner.to_owned(),
			method_name: method_name.map(|name| name.to_owned()),
			method_desc: method_desc.map(|desc| desc.to_owned()),
		});
		Ok(())
	}

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

	fn visit_inner_class(
		&mut self,
		name: &JavaStr,
		outer_name: Option<&JavaStr>,
		inner_name: Option<&JavaStr>,
		access: u32,
	) -> Result<()> {
		self.inner_classes.push(InnerClassNode {
			name: name.to_owned(),
			outer_name: outer_name.map(|name| name.to_owned()),
			inner_name: inner_name.map(|name| name.to_owned()),
			access,
		});
		Ok(())
	}

	fn visit_field(
		&mut self,
		access: u32,
		name: &JavaStr,
		descriptor: &JavaStr,
		signature: Option<&JavaStr>,
		value: Option<&Constant>,
	) -> Result<Option<&mut dyn FieldVisitor>> {
		self.fields.push(FieldNode::new(
			access,
			name.to_owned(),
			descriptor.to_owned(),
			signature.map(|signature| signature.to_owned()),
			value.cloned(),
		));
		match self.fields.last_mut() {
			Some(field) => Ok(Some(field)),
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
		self.methods.push(MethodNode::new(
			access,
			name.to_owned(),
			descriptor.to_owned(),
			signature.map(|signature| signature.to_owned()),
			exceptions.to_vec(),
		));
		match self.methods.last_mut() {
			Some(method) => Ok(Some(method)),
			None => Ok(None),
		}
	}
}

#[cfg(test)]
mod tests {
	use anyhow::Result;
	use pretty_assertions::assert_eq;
	use java_string::{JavaStr, JavaString};
	use crate::class_constants::{access, opcode};
	use crate::tree::version::Version;
	use crate::visitor::ClassVisitor;
	use super::ClassNode;

	fn build(class: &mut dyn ClassVisitor) -> Result<()> {
		class.visit(
			Version::V1_8,
			access::PUBLIC | access::SUPER,
			JavaStr::from_str("com/example/Simple"),
			None,
			Some(JavaStr::from_str("java/lang/Object")),
			&[JavaString::from("java/io/Serializable")],
		)?;
		class.visit_source(Some(JavaStr::from_str("Simple.java")))?;
		if let Some(field) = class.visit_field(
			access::PRIVATE,
			JavaStr::from_str("count"),
			JavaStr::from_str("I"),
			None,
			None,
		)? {
			field.visit_end()?;
		}
		if let Some(method) = class.visit_method(
			access::PUBLIC,
			JavaStr::from_str("frob"),
			JavaStr::from_str("()V"),
			None,
			&[],
		)? {
			method.visit_code()?;
			method.visit_insn(opcode::RETURN)?;
			method.visit_maxs(0, 1)?;
			method.visit_end()?;
		}
		class.visit_end()
	}

	#[test]
	fn collect_and_replay() -> Result<()> {
		let mut node = ClassNode::new();
		build(&mut node)?;
		assert_eq!(node.name, JavaString::from("com/example/Simple"));
		assert_eq!(node.fields.len(), 1);
		assert_eq!(node.methods.len(), 1);
		assert!(node.methods[0].has_code);

		let mut copy = ClassNode::new();
		node.accept(&mut copy)?;
		assert_eq!(copy, node);
		Ok(())
	}
}
