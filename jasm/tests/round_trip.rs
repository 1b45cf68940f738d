//! Writing a class, reading it back and writing it again must reproduce
//! the same bytes, and reading must reproduce the same tree.

use anyhow::Result;
use java_string::{JavaStr, JavaString};
use pretty_assertions::assert_eq;
use jasm::attribute::Attribute;
use jasm::class_constants::{access, opcode};
use jasm::tree::annotation::{AnnotationNode, ElementValue};
use jasm::tree::class::{ClassNode, InnerClassNode, OuterClassNode};
use jasm::tree::field::FieldNode;
use jasm::tree::method::{InsnNode, MethodNode};
use jasm::tree::version::Version;
use jasm::tree::{AnnotationValue, Constant, Label, LocalVariableNode, TryCatchBlockNode};
use jasm::{ClassReader, ClassWriter, ReaderOptions, WriterFlags};

fn rich_class() -> ClassNode {
	let l0 = Label::new(0);
	let l1 = Label::new(1);
	let l2 = Label::new(2);
	let l3 = Label::new(3);

	let mut getter = MethodNode::new(
		access::PUBLIC,
		JavaString::from("value"),
		JavaString::from("(I)I"),
		None,
		Vec::new(),
	);
	getter.attributes.push(Attribute { name: JavaString::from("X"), data: vec![1, 2, 3] });
	getter.has_code = true;
	getter.instructions = vec![
		InsnNode::Label(l0),
		InsnNode::LineNumber { line: 10, start: l0 },
		InsnNode::Var { opcode: opcode::ALOAD, var: 0 },
		InsnNode::Field {
			opcode: opcode::GETFIELD,
			owner: JavaString::from("A"),
			name: JavaString::from("x"),
			descriptor: JavaString::from("I"),
		},
		InsnNode::Var { opcode: opcode::ISTORE, var: 1 },
		InsnNode::Label(l1),
		InsnNode::Jump { opcode: opcode::GOTO, label: l3 },
		InsnNode::Label(l2),
		InsnNode::Insn { opcode: opcode::POP },
		InsnNode::Label(l3),
		InsnNode::LineNumber { line: 12, start: l3 },
		InsnNode::Var { opcode: opcode::ILOAD, var: 1 },
		InsnNode::Insn { opcode: opcode::IRETURN },
	];
	getter.try_catch_blocks = vec![TryCatchBlockNode {
		start: l0,
		end: l1,
		handler: l2,
		catch_type: Some(JavaString::from("java/lang/Exception")),
	}];
	getter.local_variables = vec![LocalVariableNode {
		name: JavaString::from("this"),
		descriptor: JavaString::from("LA;"),
		signature: None,
		start: l0,
		end: l3,
		index: 0,
	}];
	getter.max_stack = 1;
	getter.max_locals = 2;

	let mut handler = MethodNode::new(
		access::PUBLIC | access::ABSTRACT,
		JavaString::from("handle"),
		JavaString::from("(Ljava/lang/String;)V"),
		None,
		vec![JavaString::from("java/io/IOException")],
	);
	handler.annotation_default = Some(ElementValue::Const(AnnotationValue::Int(3)));
	handler.visible_parameter_annotations = vec![vec![AnnotationNode::new(JavaString::from("LMark;"))]];

	let mut field = FieldNode::new(
		access::PRIVATE | access::FINAL,
		JavaString::from("x"),
		JavaString::from("I"),
		None,
		Some(Constant::Integer(7)),
	);
	field.invisible_annotations.push(AnnotationNode::new(JavaString::from("LHidden;")));

	let mut annotation = AnnotationNode::new(JavaString::from("LVersioned;"));
	annotation.values.push((
		JavaString::from("value"),
		ElementValue::Const(AnnotationValue::String(JavaString::from("1.0"))),
	));

	let mut node = ClassNode::new();
	node.version = Version::V1_8;
	node.access = access::PUBLIC | access::SUPER | access::DEPRECATED;
	node.name = JavaString::from("A");
	node.signature = Some(JavaString::from("<T:Ljava/lang/Object;>Ljava/lang/Object;"));
	node.super_name = Some(JavaString::from("java/lang/Object"));
	node.interfaces = vec![JavaString::from("java/io/Serializable")];
	node.source = Some(JavaString::from("A.java"));
	node.outer_class = Some(OuterClassNode {
		owner: JavaString::from("Outer"),
		method_name: Some(JavaString::from("run")),
		method_desc: Some(JavaString::from("()V")),
	});
	node.visible_annotations = vec![annotation];
	node.attributes = vec![Attribute { name: JavaString::from("Y"), data: vec![9] }];
	node.inner_classes = vec![InnerClassNode {
		name: JavaString::from("A$B"),
		outer_name: Some(JavaString::from("A")),
		inner_name: Some(JavaString::from("B")),
		access: access::STATIC,
	}];
	node.fields = vec![field];
	node.methods = vec![getter, handler];
	node
}

fn write(node: &ClassNode) -> Result<Vec<u8>> {
	let mut writer = ClassWriter::new(WriterFlags::NONE);
	node.accept(&mut writer)?;
	writer.to_bytes()
}

fn read(bytes: &[u8], options: ReaderOptions) -> Result<ClassNode> {
	let mut node = ClassNode::new();
	ClassReader::new(bytes)?.accept(&mut node, options)?;
	Ok(node)
}

#[test]
fn write_read_write_is_a_fixpoint() -> Result<()> {
	let bytes = write(&rich_class())?;
	let first = read(&bytes, ReaderOptions::default())?;
	let bytes_again = write(&first)?;
	let second = read(&bytes_again, ReaderOptions::default())?;

	assert_eq!(bytes, bytes_again);
	assert_eq!(first, second);
	Ok(())
}

#[test]
fn the_tree_survives_a_cycle() -> Result<()> {
	let node = rich_class();
	let read_back = read(&write(&node)?, ReaderOptions::default())?;

	assert_eq!(read_back.version, node.version);
	assert_eq!(read_back.access, node.access);
	assert_eq!(read_back.name, node.name);
	assert_eq!(read_back.signature, node.signature);
	assert_eq!(read_back.super_name, node.super_name);
	assert_eq!(read_back.interfaces, node.interfaces);
	assert_eq!(read_back.source, node.source);
	assert_eq!(read_back.outer_class, node.outer_class);
	assert_eq!(read_back.visible_annotations, node.visible_annotations);
	assert_eq!(read_back.attributes, node.attributes);
	assert_eq!(read_back.inner_classes, node.inner_classes);
	assert_eq!(read_back.fields, node.fields);
	// labels were handed out in bytecode order, so they survive unchanged
	assert_eq!(read_back.methods, node.methods);
	Ok(())
}

#[test]
fn dropping_unknown_attributes() -> Result<()> {
	let options = ReaderOptions { keep_unknown_attributes: false, ..ReaderOptions::default() };
	let read_back = read(&write(&rich_class())?, options)?;

	assert_eq!(read_back.attributes, vec![]);
	assert_eq!(read_back.methods[0].attributes, vec![]);
	Ok(())
}

#[test]
fn skipping_debug_information() -> Result<()> {
	let options = ReaderOptions { skip_debug: true, ..ReaderOptions::default() };
	let read_back = read(&write(&rich_class())?, options)?;

	assert_eq!(read_back.source, None);
	let method = &read_back.methods[0];
	assert!(method.local_variables.is_empty());
	assert!(!method.instructions.iter().any(|insn| matches!(insn, InsnNode::LineNumber { .. })));
	Ok(())
}

#[test]
fn computed_maxs_match_the_declared_ones() -> Result<()> {
	let mut node = rich_class();
	// discard the declared sizes and let the writer do the dataflow
	node.methods[0].max_stack = 0;
	node.methods[0].max_locals = 0;

	let mut writer = ClassWriter::new(WriterFlags::COMPUTE_MAXS);
	node.accept(&mut writer)?;
	let read_back = read(&writer.to_bytes()?, ReaderOptions::default())?;

	assert_eq!(read_back.methods[0].max_stack, 1);
	assert_eq!(read_back.methods[0].max_locals, 2);
	Ok(())
}
