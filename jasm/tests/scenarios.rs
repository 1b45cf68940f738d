//! Small end-to-end cases with known encodings.

use anyhow::Result;
use java_string::{JavaStr, JavaString};
use pretty_assertions::assert_eq;
use jasm::class_constants::{access, opcode};
use jasm::signature::{SignatureReader, SignatureWriter};
use jasm::tree::version::Version;
use jasm::tree::{AnnotationValue, Constant, Label};
use jasm::visitor::{AnnotationVisitor, ClassVisitor, MethodVisitor};
use jasm::{ClassReader, ClassWriter, ReaderOptions, WriterFlags};

mod common;
use common::RawClass;

fn empty_class() -> Result<Vec<u8>> {
	let mut writer = ClassWriter::new(WriterFlags::NONE);
	writer.visit(
		Version::V1_8,
		access::PUBLIC | access::SUPER,
		JavaStr::from_str("A"),
		None,
		Some(JavaStr::from_str("java/lang/Object")),
		&[],
	)?;
	writer.visit_end()?;
	writer.to_bytes()
}

#[test]
fn empty_class_header_events() -> Result<()> {
	#[derive(Default)]
	struct Recorder {
		events: Vec<String>,
	}

	impl ClassVisitor for Recorder {
		fn visit(
			&mut self,
			version: Version,
			access: u32,
			name: &JavaStr,
			signature: Option<&JavaStr>,
			super_name: Option<&JavaStr>,
			interfaces: &[JavaString],
		) -> Result<()> {
			self.events.push(format!(
				"visit({}, {access:#x}, {name}, {signature:?}, {super_name:?}, {interfaces:?})",
				version.major,
			));
			Ok(())
		}

		fn visit_end(&mut self) -> Result<()> {
			self.events.push("visit_end".to_string());
			Ok(())
		}
	}

	let bytes = empty_class()?;
	let reader = ClassReader::new(&bytes)?;
	let mut recorder = Recorder::default();
	reader.accept(&mut recorder, ReaderOptions::default())?;

	assert_eq!(recorder.events, vec![
		"visit(52, 0x21, A, None, Some(\"java/lang/Object\"), [])".to_string(),
		"visit_end".to_string(),
	]);
	Ok(())
}

#[test]
fn single_return_code_attribute() -> Result<()> {
	let mut writer = ClassWriter::new(WriterFlags::NONE);
	writer.visit(
		Version::V1_8,
		access::PUBLIC | access::SUPER,
		JavaStr::from_str("A"),
		None,
		Some(JavaStr::from_str("java/lang/Object")),
		&[],
	)?;
	if let Some(mv) = writer.visit_method(access::STATIC, JavaStr::from_str("m"), JavaStr::from_str("()V"), None, &[])? {
		mv.visit_code()?;
		mv.visit_insn(opcode::RETURN)?;
		mv.visit_maxs(0, 0)?;
		mv.visit_end()?;
	}
	writer.visit_end()?;

	let bytes = writer.to_bytes()?;
	let raw = RawClass::parse(&bytes);
	// max_stack, max_locals, code_length, code, no handlers, no attributes
	assert_eq!(raw.code(0), &[
		0x00, 0x00,
		0x00, 0x00,
		0x00, 0x00, 0x00, 0x01,
		0xB1,
		0x00, 0x00,
		0x00, 0x00,
	]);
	Ok(())
}

#[test]
fn constant_loads_widen_with_the_pool() -> Result<()> {
	let mut writer = ClassWriter::new(WriterFlags::NONE);
	writer.visit(
		Version::V1_8,
		access::PUBLIC | access::SUPER,
		JavaStr::from_str("A"),
		None,
		Some(JavaStr::from_str("java/lang/Object")),
		&[],
	)?;
	if let Some(mv) = writer.visit_method(access::STATIC, JavaStr::from_str("m"), JavaStr::from_str("()V"), None, &[])? {
		mv.visit_code()?;
		// pad the pool past index 255; each string adds two entries
		for i in 0..200 {
			mv.visit_ldc_insn(&Constant::String(JavaString::from(format!("c{i}"))))?;
			mv.visit_insn(opcode::POP)?;
		}
		mv.visit_ldc_insn(&Constant::String(JavaString::from("hello")))?;
		mv.visit_insn(opcode::POP)?;
		mv.visit_insn(opcode::RETURN)?;
		mv.visit_maxs(1, 0)?;
		mv.visit_end()?;
	}
	writer.visit_end()?;

	let bytes = writer.to_bytes()?;
	let raw = RawClass::parse(&bytes);
	let code = raw.bytecode(0);

	// the first constant still fits the one byte form
	assert_eq!(code[0], opcode::LDC);
	// "hello" was interned past index 255 and needs ldc_w
	let tail = &code[code.len() - 5..];
	assert_eq!(tail[0], opcode::LDC_W);
	assert!(u16::from_be_bytes([tail[1], tail[2]]) > 255);
	assert_eq!(&tail[3..], &[opcode::POP, opcode::RETURN]);
	Ok(())
}

#[test]
fn tableswitch_at_pc_zero_pads_to_alignment() -> Result<()> {
	let default = Label::new(0);
	let cases = [Label::new(1), Label::new(2), Label::new(3)];

	let mut writer = ClassWriter::new(WriterFlags::NONE);
	writer.visit(
		Version::V1_8,
		access::PUBLIC | access::SUPER,
		JavaStr::from_str("A"),
		None,
		Some(JavaStr::from_str("java/lang/Object")),
		&[],
	)?;
	if let Some(mv) = writer.visit_method(access::STATIC, JavaStr::from_str("m"), JavaStr::from_str("()V"), None, &[])? {
		mv.visit_code()?;
		mv.visit_table_switch_insn(0, 2, default, &cases)?;
		mv.visit_label(default)?;
		for case in cases {
			mv.visit_label(case)?;
		}
		mv.visit_insn(opcode::RETURN)?;
		mv.visit_maxs(1, 0)?;
		mv.visit_end()?;
	}
	writer.visit_end()?;

	let bytes = writer.to_bytes()?;
	let raw = RawClass::parse(&bytes);
	let code = raw.bytecode(0);

	assert_eq!(code[0], opcode::TABLESWITCH);
	// three padding bytes align the default offset to a multiple of four
	assert_eq!(&code[1..4], &[0, 0, 0]);
	let at = |pos: usize| i32::from_be_bytes([code[pos], code[pos + 1], code[pos + 2], code[pos + 3]]);
	assert_eq!(at(4), 28); // default
	assert_eq!(at(8), 0); // min
	assert_eq!(at(12), 2); // max
	assert_eq!([at(16), at(20), at(24)], [28, 28, 28]);
	assert_eq!(code[28], opcode::RETURN);
	Ok(())
}

#[test]
fn signatures_survive_a_read_write_cycle() -> Result<()> {
	let signature = JavaStr::from_str("<T:Ljava/lang/Object;>(TT;)Ljava/util/List<TT;>;");
	let mut writer = SignatureWriter::new();
	SignatureReader::new(signature).accept_method(&mut writer)?;
	assert_eq!(writer.finish(), signature);
	Ok(())
}

#[test]
fn annotation_element_values_are_tagged_in_order() -> Result<()> {
	let mut writer = ClassWriter::new(WriterFlags::NONE);
	writer.visit(
		Version::V1_8,
		access::PUBLIC | access::SUPER,
		JavaStr::from_str("A"),
		None,
		Some(JavaStr::from_str("java/lang/Object")),
		&[],
	)?;
	{
		let av = writer.visit_annotation(JavaStr::from_str("LA;"), true)?.expect("annotation writer");
		av.visit_value(Some(JavaStr::from_str("v")), &AnnotationValue::Int(42))?;
		av.visit_value(Some(JavaStr::from_str("s")), &AnnotationValue::String(JavaString::from("x")))?;
		av.visit_enum_value(Some(JavaStr::from_str("e")), JavaStr::from_str("LE;"), JavaStr::from_str("FOO"))?;
		let array = av.visit_array_value(Some(JavaStr::from_str("arr")))?.expect("array writer");
		array.visit_value(None, &AnnotationValue::Int(1))?;
		array.visit_value(None, &AnnotationValue::Int(2))?;
		array.visit_end()?;
		av.visit_end()?;
	}
	writer.visit_end()?;

	let bytes = writer.to_bytes()?;
	let raw = RawClass::parse(&bytes);
	let body = raw.class_attribute(b"RuntimeVisibleAnnotations").expect("annotations attribute");

	assert_eq!(&body[..2], &[0, 1]); // one annotation
	assert_eq!(&body[4..6], &[0, 4]); // four element value pairs
	let mut pos = 6;
	let mut tags = Vec::new();
	for _ in 0..4 {
		pos += 2; // element name
		let tag = body[pos];
		tags.push(tag);
		pos += 1;
		match tag {
			b'I' | b's' => pos += 2,
			b'e' => pos += 4,
			b'[' => {
				assert_eq!(&body[pos..pos + 2], &[0, 2]); // two elements
				pos += 2;
				for _ in 0..2 {
					assert_eq!(body[pos], b'I');
					pos += 3;
				}
			},
			_ => panic!("unexpected tag {:?}", tag as char),
		}
	}
	assert_eq!(tags, vec![b'I', b's', b'e', b'[']);
	assert_eq!(pos, body.len());
	Ok(())
}
