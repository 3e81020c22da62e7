//! Component F: the attribute tagged sum.
//!
//! [`Attribute`] is a tagged sum with variants for SourceFile, Code, Exceptions,
//! LocalVariableTable, LineNumberTable, StackMapTable, and an opaque `Unknown(bytes)` fallback.
//! It is used uniformly for class-level,
//! field-level, method-level, and `Code`-nested attribute lists — not every variant is valid in
//! every position (a bare `StackMapTable` at class level would be nonsensical), the same way
//! `duke`'s own attribute enums are shared across positions and the positions police their own
//! validity.
//!
//! `attribute_name_index` is resolved to a UTF8 string during parsing ([`crate::reader`]) to pick
//! a variant; on write ([`crate::writer`]) each variant knows its own canonical name.

use crate::class::Code;
use crate::code::{Label, LabelRange};
use crate::pool::PoolIndex;

/// One entry of a `StackMapTable` attribute's `verification_type_info` (JVMS §4.7.4).
#[derive(Debug, Clone, PartialEq)]
pub enum VerificationTypeInfo {
	Top,
	Integer,
	Float,
	Long,
	Double,
	Null,
	UninitializedThis,
	/// `Object_variable_info`; `class_index` points at a `Class` pool entry.
	Object { class_index: PoolIndex },
	/// `Uninitialized_variable_info`; `new_label` is the offset of the `new` instruction that
	/// produced the object, same as `Type::Uninitialized` (component I).
	Uninitialized { new_label: Label },
}

/// One `StackMapTable` entry, targeting the label it describes directly rather than via a raw
/// `offset_delta` — the writer derives the delta from consecutive targets' computed offsets
/// during layout (see [`crate::writer`]), same as it derives branch deltas for [`crate::code::Instruction::Jump`].
#[derive(Debug, Clone, PartialEq)]
pub enum StackMapFrame {
	Same { target: Label },
	SameLocals1StackItem { target: Label, stack: VerificationTypeInfo },
	Chop { target: Label, k: u8 },
	SameExtended { target: Label },
	Append { target: Label, locals: Vec<VerificationTypeInfo> },
	Full { target: Label, locals: Vec<VerificationTypeInfo>, stack: Vec<VerificationTypeInfo> },
}

impl StackMapFrame {
	pub fn target(&self) -> Label {
		match self {
			StackMapFrame::Same { target }
			| StackMapFrame::SameLocals1StackItem { target, .. }
			| StackMapFrame::Chop { target, .. }
			| StackMapFrame::SameExtended { target }
			| StackMapFrame::Append { target, .. }
			| StackMapFrame::Full { target, .. } => *target,
		}
	}
}

/// One `LineNumberTable` entry (JVMS §4.7.12).
#[derive(Debug, Clone, PartialEq)]
pub struct LineNumberEntry {
	pub start: Label,
	pub line_number: u16,
}

/// One `LocalVariableTable` entry (JVMS §4.7.13). `LocalVariableTypeTable` (the generic-signature
/// sibling attribute) is not modeled; it round-trips as `Attribute::Unknown` like any other name
/// this crate doesn't promote to a structured variant.
#[derive(Debug, Clone, PartialEq)]
pub struct LocalVariableEntry {
	pub range: LabelRange,
	pub name_index: PoolIndex,
	pub descriptor_index: PoolIndex,
	pub index: u16,
}

/// A class-file attribute. See the module doc for which positions each variant is valid in.
#[derive(Debug, Clone, PartialEq)]
pub enum Attribute {
	SourceFile { sourcefile_index: PoolIndex },
	Code(Code),
	/// A method's `throws` clause (JVMS §4.7.5); each index names a `Class` pool entry.
	Exceptions { exception_index_table: Vec<PoolIndex> },
	LineNumberTable(Vec<LineNumberEntry>),
	LocalVariableTable(Vec<LocalVariableEntry>),
	StackMapTable(Vec<StackMapFrame>),
	/// Any attribute name this crate does not promote to structured form. Preserved verbatim so
	/// a parse→write round-trip with no mutation reproduces it byte-for-byte.
	Unknown { name_index: PoolIndex, bytes: Vec<u8> },
}

impl Attribute {
	pub(crate) fn canonical_name(&self) -> Option<&'static str> {
		match self {
			Attribute::SourceFile { .. } => Some("SourceFile"),
			Attribute::Code(_) => Some("Code"),
			Attribute::Exceptions { .. } => Some("Exceptions"),
			Attribute::LineNumberTable(_) => Some("LineNumberTable"),
			Attribute::LocalVariableTable(_) => Some("LocalVariableTable"),
			Attribute::StackMapTable(_) => Some("StackMapTable"),
			Attribute::Unknown { .. } => None,
		}
	}
}
