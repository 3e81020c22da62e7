//! The data model's top-level aggregates: [`ClassFile`], [`Field`], [`Method`], and [`Code`].
//!
//! Grounded in `duke`'s own `tree::class`/`tree::field`/`tree::method` module shapes,
//! restructured so members reference the pool by raw index (component C) instead of `duke`'s
//! resolved semantic types.

use crate::attribute::Attribute;
use crate::code::Exception;
use crate::inst_list::InstList;
use crate::pool::{ConstPool, PoolIndex};
use crate::version::Version;

/// The raw `access_flags` bitmask shared by `ClassFile`, `field_info`, and `method_info` (JVMS
/// §4.1 Table 4.1-A and its field/method siblings). `duke`'s own `tree::class::ClassAccess` /
/// `tree::field::FieldAccess` / `tree::method::MethodAccess` each unpack the same kind of `u16`
/// into a dedicated bool-per-flag struct; since this crate's [`Member`] is shared between fields
/// and methods, the bits are kept as one raw mask with named, position-appropriate accessor
/// methods instead of three near-duplicate structs (some bit positions are reused with a
/// different meaning depending on position, e.g. `0x0020` is `ACC_SUPER` on a class but
/// `ACC_SYNCHRONIZED` on a method — callers are expected to call the accessor matching the
/// position they're looking at, same as the class file format itself does not separate the bit
/// spaces).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AccessFlags(pub u16);

impl AccessFlags {
	pub const PUBLIC: u16 = 0x0001;
	pub const PRIVATE: u16 = 0x0002;
	pub const PROTECTED: u16 = 0x0004;
	pub const STATIC: u16 = 0x0008;
	pub const FINAL: u16 = 0x0010;
	pub const SUPER: u16 = 0x0020;
	pub const SYNCHRONIZED: u16 = 0x0020;
	pub const VOLATILE: u16 = 0x0040;
	pub const BRIDGE: u16 = 0x0040;
	pub const TRANSIENT: u16 = 0x0080;
	pub const VARARGS: u16 = 0x0080;
	pub const NATIVE: u16 = 0x0100;
	pub const INTERFACE: u16 = 0x0200;
	pub const ABSTRACT: u16 = 0x0400;
	pub const STRICT: u16 = 0x0800;
	pub const SYNTHETIC: u16 = 0x1000;
	pub const ANNOTATION: u16 = 0x2000;
	pub const ENUM: u16 = 0x4000;
	pub const MODULE: u16 = 0x8000;

	pub fn contains(self, flag: u16) -> bool {
		self.0 & flag != 0
	}
	pub fn with(self, flag: u16) -> AccessFlags {
		AccessFlags(self.0 | flag)
	}
}

impl std::ops::BitOr<u16> for AccessFlags {
	type Output = AccessFlags;
	fn bitor(self, rhs: u16) -> AccessFlags {
		self.with(rhs)
	}
}
impl std::ops::BitOr for AccessFlags {
	type Output = AccessFlags;
	fn bitor(self, rhs: AccessFlags) -> AccessFlags {
		AccessFlags(self.0 | rhs.0)
	}
}

/// A method's `Code` attribute body: the instruction list, exception table, and nested
/// attributes (`LineNumberTable`, `LocalVariableTable`, `StackMapTable`, unknown blobs).
///
/// `max_stack`/`max_locals` are carried through from the parser (or set by the caller when
/// synthesizing a method) rather than recomputed; nothing in this crate invalidates them except
/// the frame computer, which the caller invokes explicitly — frame recomputation is opt-in, not
/// automatic.
#[derive(Debug, Clone, PartialEq)]
pub struct Code {
	pub max_stack: u16,
	pub max_locals: u16,
	pub instructions: InstList,
	pub exception_table: Vec<Exception>,
	pub attributes: Vec<Attribute>,
}

impl Code {
	pub fn new(max_stack: u16, max_locals: u16) -> Code {
		Code {
			max_stack,
			max_locals,
			instructions: InstList::new(),
			exception_table: Vec::new(),
			attributes: Vec::new(),
		}
	}

	/// Looks for the (at most one, per JVMS §4.7.4) `StackMapTable` among this code's attributes.
	pub fn stack_map_table(&self) -> Option<&[crate::attribute::StackMapFrame]> {
		self.attributes.iter().find_map(|a| match a {
			Attribute::StackMapTable(frames) => Some(frames.as_slice()),
			_ => None,
		})
	}
}

/// A field or method member: access flags, name/descriptor pool indices, and an attribute list.
#[derive(Debug, Clone, PartialEq)]
pub struct Member {
	pub access_flags: AccessFlags,
	pub name_index: PoolIndex,
	pub descriptor_index: PoolIndex,
	pub attributes: Vec<Attribute>,
}

impl Member {
	pub fn new(access_flags: AccessFlags, name_index: PoolIndex, descriptor_index: PoolIndex) -> Member {
		Member { access_flags, name_index, descriptor_index, attributes: Vec::new() }
	}
}

/// A field declaration: access flags, name index, descriptor index, and an attribute sequence.
/// Distinguished from [`Method`] only by type.
#[derive(Debug, Clone, PartialEq)]
pub struct Field(pub Member);

/// A method declaration. A method with a `Code` attribute owns an instruction list and exception
/// handlers via [`Method::code`]/[`Method::code_mut`].
#[derive(Debug, Clone, PartialEq)]
pub struct Method(pub Member);

impl Method {
	pub fn code(&self) -> Option<&Code> {
		self.0.attributes.iter().find_map(|a| match a {
			Attribute::Code(code) => Some(code),
			_ => None,
		})
	}
	pub fn code_mut(&mut self) -> Option<&mut Code> {
		self.0.attributes.iter_mut().find_map(|a| match a {
			Attribute::Code(code) => Some(code),
			_ => None,
		})
	}
}

/// The root aggregate: constant pool, access flags, this/super indices, interfaces, fields,
/// methods, and class-level attributes. Owns every pool entry, attribute, and instruction
/// (transitively, via [`InstList`]'s slab) — there is nothing for a caller to keep alive
/// separately; dropping a `ClassFile` releases everything it owns in one go, the safe-Rust
/// realization of a bump-allocated arena (component B).
#[derive(Debug, Clone, PartialEq)]
pub struct ClassFile {
	pub version: Version,
	pub pool: ConstPool,
	pub access_flags: AccessFlags,
	pub this_class: PoolIndex,
	pub super_class: Option<PoolIndex>,
	pub interfaces: Vec<PoolIndex>,
	pub fields: Vec<Field>,
	pub methods: Vec<Method>,
	pub attributes: Vec<Attribute>,
}

impl ClassFile {
	/// A fresh, empty class file for synthesis, with `this_class` already interned.
	pub fn new(version: Version, access_flags: AccessFlags, this_class_name: impl Into<java_string::JavaString>) -> ClassFile {
		let mut pool = ConstPool::new();
		let this_class = pool.add_class_name(this_class_name);
		ClassFile {
			version,
			pool,
			access_flags,
			this_class,
			super_class: None,
			interfaces: Vec::new(),
			fields: Vec::new(),
			methods: Vec::new(),
			attributes: Vec::new(),
		}
	}

	pub fn this_class_name(&self) -> Result<&java_string::JavaStr, crate::error::Error> {
		self.pool.get_class_name(self.this_class)
	}
	pub fn super_class_name(&self) -> Result<Option<&java_string::JavaStr>, crate::error::Error> {
		self.super_class.map(|index| self.pool.get_class_name(index)).transpose()
	}
}

#[cfg(test)]
mod testing {
	use pretty_assertions::assert_eq;
	use java_string::JavaStr;
	use super::*;

	#[test]
	fn new_class_file_interns_this_class() {
		let class = ClassFile::new(Version::V17, AccessFlags(AccessFlags::PUBLIC | AccessFlags::SUPER), "com/example/Foo");
		assert_eq!(class.this_class_name().unwrap(), JavaStr::from_str("com/example/Foo"));
		assert_eq!(class.super_class_name().unwrap(), None);
	}

	#[test]
	fn method_without_code_attribute_reports_none() {
		let method = Method(Member::new(AccessFlags(AccessFlags::PUBLIC | AccessFlags::ABSTRACT), 1, 2));
		assert_eq!(method.code(), None);
	}
}
