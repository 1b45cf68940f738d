//! Module declarations and the OpenJDK module metadata attributes.

use anyhow::Result;
use java_string::JavaString;
use pretty_assertions::assert_eq;
use jasm::attribute::{ModuleHashesAttribute, ModuleResolutionAttribute, ModuleTargetAttribute};
use jasm::class_constants::access;
use jasm::tree::class::ClassNode;
use jasm::tree::module::{ExportNode, ModuleNode, ProvideNode, RequireNode, TargetPlatform};
use jasm::tree::version::Version;
use jasm::{ClassReader, ClassWriter, ReaderOptions, WriterFlags};

#[test]
fn module_declarations_survive_a_cycle() -> Result<()> {
	let module = ModuleNode {
		version: Some(JavaString::from("9-ea")),
		main_class: Some(JavaString::from("com/greetings/Main")),
		target_platform: Some(TargetPlatform {
			os_name: Some(JavaString::from("linux")),
			os_arch: Some(JavaString::from("amd64")),
			os_version: None,
		}),
		concealed_packages: vec![JavaString::from("com/greetings/internal")],
		requires: vec![
			RequireNode { module: JavaString::from("java.base"), access: access::MANDATED },
			RequireNode { module: JavaString::from("java.sql"), access: 0 },
		],
		exports: vec![
			ExportNode {
				package: JavaString::from("com/greetings"),
				access: 0,
				to: Vec::new(),
			},
			ExportNode {
				package: JavaString::from("com/greetings/spi"),
				access: 0,
				to: vec![JavaString::from("com.consumer")],
			},
		],
		uses: vec![JavaString::from("com/greetings/spi/Greeter")],
		provides: vec![ProvideNode {
			service: JavaString::from("com/greetings/spi/Greeter"),
			provider: JavaString::from("com/greetings/EnglishGreeter"),
		}],
	};

	let mut node = ClassNode::new();
	node.version = Version::V9;
	node.access = 0x8000;
	node.name = JavaString::from("module-info");
	node.module = Some(module.clone());

	let mut writer = ClassWriter::new(WriterFlags::NONE);
	node.accept(&mut writer)?;
	let bytes = writer.to_bytes()?;

	let mut read_back = ClassNode::new();
	ClassReader::new(&bytes)?.accept(&mut read_back, ReaderOptions::default())?;
	assert_eq!(read_back.module, Some(module));
	assert_eq!(read_back.name, node.name);
	Ok(())
}

fn push_u16(bytes: &mut Vec<u8>, value: u16) {
	bytes.extend_from_slice(&value.to_be_bytes());
}

fn push_utf8(bytes: &mut Vec<u8>, value: &str) {
	bytes.push(1);
	push_u16(bytes, value.len() as u16);
	bytes.extend_from_slice(value.as_bytes());
}

/// A class file holding `ModuleHashes`, `ModuleTarget` and
/// `ModuleResolution` attributes, written out by hand.
fn metadata_class() -> Vec<u8> {
	let mut b = Vec::new();
	b.extend_from_slice(&[0xCA, 0xFE, 0xBA, 0xBE]);
	push_u16(&mut b, 0); // minor
	push_u16(&mut b, 53); // major

	push_u16(&mut b, 10); // constant pool count
	push_utf8(&mut b, "module-info"); // 1
	b.push(7); // 2: Class -> 1
	push_u16(&mut b, 1);
	push_utf8(&mut b, "SHA-256"); // 3
	push_utf8(&mut b, "mod.b"); // 4
	b.push(19); // 5: Module -> 4
	push_u16(&mut b, 4);
	push_utf8(&mut b, "ModuleHashes"); // 6
	push_utf8(&mut b, "ModuleTarget"); // 7
	push_utf8(&mut b, "linux-amd64"); // 8
	push_utf8(&mut b, "ModuleResolution"); // 9

	push_u16(&mut b, 0x8000); // access
	push_u16(&mut b, 2); // this
	push_u16(&mut b, 0); // super
	push_u16(&mut b, 0); // interfaces
	push_u16(&mut b, 0); // fields
	push_u16(&mut b, 0); // methods

	push_u16(&mut b, 3); // attributes
	push_u16(&mut b, 6); // ModuleHashes
	b.extend_from_slice(&10u32.to_be_bytes());
	push_u16(&mut b, 3); // algorithm
	push_u16(&mut b, 1); // one hashed module
	push_u16(&mut b, 5); // module
	push_u16(&mut b, 2); // hash length
	b.extend_from_slice(&[0xAB, 0xCD]);
	push_u16(&mut b, 7); // ModuleTarget
	b.extend_from_slice(&2u32.to_be_bytes());
	push_u16(&mut b, 8);
	push_u16(&mut b, 9); // ModuleResolution
	b.extend_from_slice(&2u32.to_be_bytes());
	push_u16(&mut b, ModuleResolutionAttribute::WARN_DEPRECATED);
	b
}

#[test]
fn typed_views_of_the_metadata_attributes() -> Result<()> {
	let bytes = metadata_class();
	let reader = ClassReader::new(&bytes)?;
	let mut node = ClassNode::new();
	reader.accept(&mut node, ReaderOptions::default())?;

	assert_eq!(node.attributes.len(), 3);

	let hashes = ModuleHashesAttribute::parse(&reader, &node.attributes[0])?;
	assert_eq!(hashes.algorithm, JavaString::from("SHA-256"));
	assert_eq!(hashes.hashes, vec![(JavaString::from("mod.b"), vec![0xAB, 0xCD])]);

	let target = ModuleTargetAttribute::parse(&reader, &node.attributes[1])?;
	assert_eq!(target.platform, JavaString::from("linux-amd64"));

	let resolution = ModuleResolutionAttribute::parse(&node.attributes[2])?;
	assert_eq!(resolution.resolution, ModuleResolutionAttribute::WARN_DEPRECATED);
	Ok(())
}
