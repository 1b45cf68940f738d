//! The in-memory model: value types shared by the visitor API, and the
//! node types ([`class::ClassNode`] and friends) that store a whole class
//! on the heap for random-access transformation.

use java_string::JavaString;

pub mod annotation;
pub mod class;
pub mod field;
pub mod method;
pub mod module;
pub mod version;

/// A symbolic position in a method's code stream.
///
/// Labels are plain handles: the reader allocates them densely per method,
/// and code driving a writer directly may pick any ids as long as they are
/// unique within the method. A label must not be reused across methods.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Label {
	pub id: u32,
}

impl Label {
	pub const fn new(id: u32) -> Label {
		Label { id }
	}
}

/// A loadable constant, as used by `ldc` and bootstrap method arguments.
#[derive(Debug, Clone, PartialEq)]
pub enum Constant {
	Integer(i32),
	Float(f32),
	Long(i64),
	Double(f64),
	String(JavaString),
	/// A class constant, by internal name.
	Class(JavaString),
	/// A method type constant, by method descriptor.
	MethodType(JavaString),
	MethodHandle(Handle),
}

impl Constant {
	/// Whether this constant occupies two constant pool slots, which forces
	/// the `ldc2_w` encoding.
	pub fn is_wide(&self) -> bool {
		matches!(self, Constant::Long(_) | Constant::Double(_))
	}
}

/// A method handle, pointing at a field or method.
///
/// `tag` is one of the `REF_*` kinds in
/// [`pool::method_handle_reference`][crate::class_constants::pool::method_handle_reference].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Handle {
	pub tag: u8,
	pub owner: JavaString,
	pub name: JavaString,
	pub desc: JavaString,
}

/// A primitive, string or class constant inside an annotation.
///
/// Enum constants, nested annotations and arrays have their own visitor
/// events and are not represented here.
#[derive(Debug, Clone, PartialEq)]
pub enum AnnotationValue {
	Byte(i8),
	Char(u16),
	Boolean(bool),
	Short(i16),
	Int(i32),
	Long(i64),
	Float(f32),
	Double(f64),
	String(JavaString),
	/// A class value, by field descriptor. Encoded with tag `c`.
	Class(JavaString),
}

/// An exception handler range of a method.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TryCatchBlockNode {
	pub start: Label,
	pub end: Label,
	pub handler: Label,
	/// The internal name of the caught class, [`None`] for `finally` blocks.
	pub catch_type: Option<JavaString>,
}

/// A `LocalVariableTable` entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalVariableNode {
	pub name: JavaString,
	pub descriptor: JavaString,
	pub signature: Option<JavaString>,
	pub start: Label,
	pub end: Label,
	pub index: u16,
}
