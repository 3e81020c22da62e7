//! Component C: the constant pool — an interned, index-addressed table.
//!
//! JVMS §4.4 defines 17 entry tags (`raw_class_file::CpInfo` mirrors the same set at the raw
//! byte level and is the grounding for the tag bytes used here). `LONG` and `DOUBLE` occupy two
//! consecutive indices; the second is a sentinel [`Entry::Empty`] slot that [`ConstPool::iter`]
//! skips.
//!
//! Every `add_*` method interns: UTF8 by byte content, every composite entry by its component
//! indices (not by recursing into what those indices point to — two `add_methodref` calls with
//! identical `class_index`/`name_and_type_index` return the same index, even if the caller
//! never re-derives those indices from scratch).

use std::collections::HashMap;
use java_string::{JavaStr, JavaString};
use crate::error::Error;

/// A 1-based index into a [`ConstPool`]. Index 0 is reserved and never valid.
pub type PoolIndex = u16;

/// The kind of a [method handle](https://docs.oracle.com/javase/specs/jvms/se22/html/jvms-4.html#jvms-4.4.8).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum HandleKind {
	GetField = 1,
	GetStatic = 2,
	PutField = 3,
	PutStatic = 4,
	InvokeVirtual = 5,
	InvokeStatic = 6,
	InvokeSpecial = 7,
	NewInvokeSpecial = 8,
	InvokeInterface = 9,
}

impl HandleKind {
	pub(crate) fn from_tag(tag: u8) -> anyhow::Result<HandleKind> {
		Ok(match tag {
			1 => HandleKind::GetField,
			2 => HandleKind::GetStatic,
			3 => HandleKind::PutField,
			4 => HandleKind::PutStatic,
			5 => HandleKind::InvokeVirtual,
			6 => HandleKind::InvokeStatic,
			7 => HandleKind::InvokeSpecial,
			8 => HandleKind::NewInvokeSpecial,
			9 => HandleKind::InvokeInterface,
			_ => anyhow::bail!("unknown method handle reference_kind {tag}"),
		})
	}
	pub(crate) fn to_tag(self) -> u8 {
		self as u8
	}
}

/// One of the 17 entry kinds a [`ConstPool`] may hold, plus the [`Entry::Empty`] sentinel used
/// for the second slot of a `LONG`/`DOUBLE` entry.
#[derive(Debug, Clone, PartialEq)]
pub enum Entry {
	Utf8(JavaString),
	Integer(i32),
	Float(f32),
	Long(i64),
	Double(f64),
	Class { name_index: PoolIndex },
	String { string_index: PoolIndex },
	Fieldref { class_index: PoolIndex, name_and_type_index: PoolIndex },
	Methodref { class_index: PoolIndex, name_and_type_index: PoolIndex },
	InterfaceMethodref { class_index: PoolIndex, name_and_type_index: PoolIndex },
	NameAndType { name_index: PoolIndex, descriptor_index: PoolIndex },
	MethodHandle { kind: HandleKind, reference_index: PoolIndex },
	MethodType { descriptor_index: PoolIndex },
	Dynamic { bootstrap_method_attr_index: u16, name_and_type_index: PoolIndex },
	InvokeDynamic { bootstrap_method_attr_index: u16, name_and_type_index: PoolIndex },
	Module { name_index: PoolIndex },
	Package { name_index: PoolIndex },
	/// The sentinel second slot of a preceding `LONG`/`DOUBLE` entry. Never addressable.
	Empty,
}

impl Entry {
	pub(crate) fn tag_name(&self) -> &'static str {
		match self {
			Entry::Utf8(_) => "Utf8",
			Entry::Integer(_) => "Integer",
			Entry::Float(_) => "Float",
			Entry::Long(_) => "Long",
			Entry::Double(_) => "Double",
			Entry::Class { .. } => "Class",
			Entry::String { .. } => "String",
			Entry::Fieldref { .. } => "Fieldref",
			Entry::Methodref { .. } => "Methodref",
			Entry::InterfaceMethodref { .. } => "InterfaceMethodref",
			Entry::NameAndType { .. } => "NameAndType",
			Entry::MethodHandle { .. } => "MethodHandle",
			Entry::MethodType { .. } => "MethodType",
			Entry::Dynamic { .. } => "Dynamic",
			Entry::InvokeDynamic { .. } => "InvokeDynamic",
			Entry::Module { .. } => "Module",
			Entry::Package { .. } => "Package",
			Entry::Empty => "Empty",
		}
	}

	/// Whether this entry takes up two consecutive pool indices (JVMS §4.4.5).
	pub(crate) fn is_wide(&self) -> bool {
		matches!(self, Entry::Long(_) | Entry::Double(_))
	}

	/// A structural key used for interning: two entries with the same key are the same
	/// logical constant and must return the same index.
	fn intern_key(&self) -> InternKey {
		match self {
			Entry::Utf8(s) => InternKey::Utf8(s.clone()),
			Entry::Integer(v) => InternKey::Integer(*v),
			Entry::Float(v) => InternKey::Float(v.to_bits()),
			Entry::Long(v) => InternKey::Long(*v),
			Entry::Double(v) => InternKey::Double(v.to_bits()),
			Entry::Class { name_index } => InternKey::Class(*name_index),
			Entry::String { string_index } => InternKey::String(*string_index),
			Entry::Fieldref { class_index, name_and_type_index } => InternKey::Fieldref(*class_index, *name_and_type_index),
			Entry::Methodref { class_index, name_and_type_index } => InternKey::Methodref(*class_index, *name_and_type_index),
			Entry::InterfaceMethodref { class_index, name_and_type_index } => InternKey::InterfaceMethodref(*class_index, *name_and_type_index),
			Entry::NameAndType { name_index, descriptor_index } => InternKey::NameAndType(*name_index, *descriptor_index),
			Entry::MethodHandle { kind, reference_index } => InternKey::MethodHandle(*kind, *reference_index),
			Entry::MethodType { descriptor_index } => InternKey::MethodType(*descriptor_index),
			Entry::Dynamic { bootstrap_method_attr_index, name_and_type_index } => InternKey::Dynamic(*bootstrap_method_attr_index, *name_and_type_index),
			Entry::InvokeDynamic { bootstrap_method_attr_index, name_and_type_index } => InternKey::InvokeDynamic(*bootstrap_method_attr_index, *name_and_type_index),
			Entry::Module { name_index } => InternKey::Module(*name_index),
			Entry::Package { name_index } => InternKey::Package(*name_index),
			Entry::Empty => InternKey::Empty,
		}
	}
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum InternKey {
	Utf8(JavaString),
	Integer(i32),
	Float(u32),
	Long(i64),
	Double(u64),
	Class(PoolIndex),
	String(PoolIndex),
	Fieldref(PoolIndex, PoolIndex),
	Methodref(PoolIndex, PoolIndex),
	InterfaceMethodref(PoolIndex, PoolIndex),
	NameAndType(PoolIndex, PoolIndex),
	MethodHandle(HandleKind, PoolIndex),
	MethodType(PoolIndex),
	Dynamic(u16, PoolIndex),
	InvokeDynamic(u16, PoolIndex),
	Module(PoolIndex),
	Package(PoolIndex),
	Empty,
}

/// The constant pool: an interned, 1-based, index-addressed table of [`Entry`] values.
///
/// Index `0` is reserved (never valid). Indices are stable for the lifetime of the pool:
/// nothing is ever removed or renumbered, so a [`PoolIndex`] handed out by an `add_*` call or
/// read from a class file remains valid for as long as the `ConstPool` lives.
#[derive(Debug, Clone, Default)]
pub struct ConstPool {
	/// `entries[0]` corresponds to pool index 1.
	entries: Vec<Entry>,
	interned: HashMap<InternKey, PoolIndex>,
}

impl ConstPool {
	pub fn new() -> ConstPool {
		ConstPool { entries: Vec::new(), interned: HashMap::new() }
	}

	/// The number of 1-based slots in use, including `LONG`/`DOUBLE` sentinel slots. The
	/// highest valid index is `size()`.
	pub fn size(&self) -> u16 {
		self.entries.len() as u16
	}

	pub(crate) fn tag(&self, index: PoolIndex) -> Result<&'static str, Error> {
		Ok(self.entry(index)?.tag_name())
	}

	fn entry(&self, index: PoolIndex) -> Result<&Entry, Error> {
		if index == 0 {
			return Err(Error::BadCpIndex { index, reason: "index 0 is reserved".to_string() });
		}
		self.entries.get(index as usize - 1).ok_or(Error::BadCpIndex {
			index,
			reason: format!("out of range for pool of size {}", self.size()),
		})
	}

	/// Interns `entry`, returning its index. Composite entries are interned by their component
	/// indices; `LONG`/`DOUBLE` additionally push an [`Entry::Empty`] sentinel at `index + 1`.
	fn intern(&mut self, entry: Entry) -> PoolIndex {
		let key = entry.intern_key();
		if let Some(&index) = self.interned.get(&key) {
			return index;
		}
		let wide = entry.is_wide();
		self.entries.push(entry);
		let index = self.entries.len() as PoolIndex;
		self.interned.insert(key, index);
		if wide {
			self.entries.push(Entry::Empty);
		}
		index
	}

	pub fn add_utf8(&mut self, value: impl Into<JavaString>) -> PoolIndex {
		self.intern(Entry::Utf8(value.into()))
	}
	pub fn add_integer(&mut self, value: i32) -> PoolIndex {
		self.intern(Entry::Integer(value))
	}
	pub fn add_float(&mut self, value: f32) -> PoolIndex {
		self.intern(Entry::Float(value))
	}
	pub fn add_long(&mut self, value: i64) -> PoolIndex {
		self.intern(Entry::Long(value))
	}
	pub fn add_double(&mut self, value: f64) -> PoolIndex {
		self.intern(Entry::Double(value))
	}
	pub fn add_class(&mut self, name_index: PoolIndex) -> PoolIndex {
		self.intern(Entry::Class { name_index })
	}
	pub fn add_class_name(&mut self, name: impl Into<JavaString>) -> PoolIndex {
		let name_index = self.add_utf8(name);
		self.add_class(name_index)
	}
	pub fn add_string(&mut self, string_index: PoolIndex) -> PoolIndex {
		self.intern(Entry::String { string_index })
	}
	pub fn add_fieldref(&mut self, class_index: PoolIndex, name_and_type_index: PoolIndex) -> PoolIndex {
		self.intern(Entry::Fieldref { class_index, name_and_type_index })
	}
	pub fn add_methodref(&mut self, class_index: PoolIndex, name_and_type_index: PoolIndex) -> PoolIndex {
		self.intern(Entry::Methodref { class_index, name_and_type_index })
	}
	pub fn add_interface_methodref(&mut self, class_index: PoolIndex, name_and_type_index: PoolIndex) -> PoolIndex {
		self.intern(Entry::InterfaceMethodref { class_index, name_and_type_index })
	}
	pub fn add_name_and_type(&mut self, name_index: PoolIndex, descriptor_index: PoolIndex) -> PoolIndex {
		self.intern(Entry::NameAndType { name_index, descriptor_index })
	}
	pub fn add_method_handle(&mut self, kind: HandleKind, reference_index: PoolIndex) -> PoolIndex {
		self.intern(Entry::MethodHandle { kind, reference_index })
	}
	pub fn add_method_type(&mut self, descriptor_index: PoolIndex) -> PoolIndex {
		self.intern(Entry::MethodType { descriptor_index })
	}
	pub fn add_dynamic(&mut self, bootstrap_method_attr_index: u16, name_and_type_index: PoolIndex) -> PoolIndex {
		self.intern(Entry::Dynamic { bootstrap_method_attr_index, name_and_type_index })
	}
	pub fn add_invoke_dynamic(&mut self, bootstrap_method_attr_index: u16, name_and_type_index: PoolIndex) -> PoolIndex {
		self.intern(Entry::InvokeDynamic { bootstrap_method_attr_index, name_and_type_index })
	}
	pub fn add_module(&mut self, name_index: PoolIndex) -> PoolIndex {
		self.intern(Entry::Module { name_index })
	}
	pub fn add_package(&mut self, name_index: PoolIndex) -> PoolIndex {
		self.intern(Entry::Package { name_index })
	}

	/// Used only by the parser: appends an entry read straight off the wire at the next sequential
	/// index, rather than deduplicating structurally the way [`ConstPool::intern`] does (the pool
	/// on disk may already contain the same logical constant more than once, and renumbering on
	/// read would invalidate every index the method bodies already reference).
	///
	/// Still registers the entry's structural key against its index (first occurrence wins, same
	/// as [`ConstPool::intern`]'s own tie-break), so a later `add_*` call for an already-present
	/// entry — e.g. the writer interning an attribute name that was already in the parsed pool —
	/// finds and reuses the existing index instead of appending a duplicate.
	pub(crate) fn push_raw(&mut self, entry: Entry) {
		let key = entry.intern_key();
		let wide = entry.is_wide();
		self.entries.push(entry);
		let index = self.entries.len() as PoolIndex;
		self.interned.entry(key).or_insert(index);
		if wide {
			self.entries.push(Entry::Empty);
		}
	}

	fn wrong_tag(index: PoolIndex, found: &'static str, expected: &'static str) -> Error {
		Error::WrongTag { index, expected, found }
	}

	pub fn get_utf8(&self, index: PoolIndex) -> Result<&JavaStr, Error> {
		match self.entry(index)? {
			Entry::Utf8(s) => Ok(s.as_java_str()),
			other => Err(Self::wrong_tag(index, other.tag_name(), "Utf8")),
		}
	}
	pub fn get_integer(&self, index: PoolIndex) -> Result<i32, Error> {
		match self.entry(index)? {
			Entry::Integer(v) => Ok(*v),
			other => Err(Self::wrong_tag(index, other.tag_name(), "Integer")),
		}
	}
	pub fn get_float(&self, index: PoolIndex) -> Result<f32, Error> {
		match self.entry(index)? {
			Entry::Float(v) => Ok(*v),
			other => Err(Self::wrong_tag(index, other.tag_name(), "Float")),
		}
	}
	pub fn get_long(&self, index: PoolIndex) -> Result<i64, Error> {
		match self.entry(index)? {
			Entry::Long(v) => Ok(*v),
			other => Err(Self::wrong_tag(index, other.tag_name(), "Long")),
		}
	}
	pub fn get_double(&self, index: PoolIndex) -> Result<f64, Error> {
		match self.entry(index)? {
			Entry::Double(v) => Ok(*v),
			other => Err(Self::wrong_tag(index, other.tag_name(), "Double")),
		}
	}
	pub fn get_class(&self, index: PoolIndex) -> Result<PoolIndex, Error> {
		match self.entry(index)? {
			Entry::Class { name_index } => Ok(*name_index),
			other => Err(Self::wrong_tag(index, other.tag_name(), "Class")),
		}
	}
	/// Convenience: resolves a `Class` entry all the way to its name bytes.
	pub fn get_class_name(&self, index: PoolIndex) -> Result<&JavaStr, Error> {
		self.get_utf8(self.get_class(index)?)
	}
	pub fn get_string(&self, index: PoolIndex) -> Result<PoolIndex, Error> {
		match self.entry(index)? {
			Entry::String { string_index } => Ok(*string_index),
			other => Err(Self::wrong_tag(index, other.tag_name(), "String")),
		}
	}
	pub fn get_fieldref(&self, index: PoolIndex) -> Result<(PoolIndex, PoolIndex), Error> {
		match self.entry(index)? {
			Entry::Fieldref { class_index, name_and_type_index } => Ok((*class_index, *name_and_type_index)),
			other => Err(Self::wrong_tag(index, other.tag_name(), "Fieldref")),
		}
	}
	pub fn get_methodref(&self, index: PoolIndex) -> Result<(PoolIndex, PoolIndex), Error> {
		match self.entry(index)? {
			Entry::Methodref { class_index, name_and_type_index } => Ok((*class_index, *name_and_type_index)),
			other => Err(Self::wrong_tag(index, other.tag_name(), "Methodref")),
		}
	}
	pub fn get_interface_methodref(&self, index: PoolIndex) -> Result<(PoolIndex, PoolIndex), Error> {
		match self.entry(index)? {
			Entry::InterfaceMethodref { class_index, name_and_type_index } => Ok((*class_index, *name_and_type_index)),
			other => Err(Self::wrong_tag(index, other.tag_name(), "InterfaceMethodref")),
		}
	}
	pub fn get_name_and_type(&self, index: PoolIndex) -> Result<(PoolIndex, PoolIndex), Error> {
		match self.entry(index)? {
			Entry::NameAndType { name_index, descriptor_index } => Ok((*name_index, *descriptor_index)),
			other => Err(Self::wrong_tag(index, other.tag_name(), "NameAndType")),
		}
	}
	pub fn get_method_handle(&self, index: PoolIndex) -> Result<(HandleKind, PoolIndex), Error> {
		match self.entry(index)? {
			Entry::MethodHandle { kind, reference_index } => Ok((*kind, *reference_index)),
			other => Err(Self::wrong_tag(index, other.tag_name(), "MethodHandle")),
		}
	}
	pub fn get_method_type(&self, index: PoolIndex) -> Result<PoolIndex, Error> {
		match self.entry(index)? {
			Entry::MethodType { descriptor_index } => Ok(*descriptor_index),
			other => Err(Self::wrong_tag(index, other.tag_name(), "MethodType")),
		}
	}
	pub fn get_invoke_dynamic(&self, index: PoolIndex) -> Result<(u16, PoolIndex), Error> {
		match self.entry(index)? {
			Entry::InvokeDynamic { bootstrap_method_attr_index, name_and_type_index } => Ok((*bootstrap_method_attr_index, *name_and_type_index)),
			other => Err(Self::wrong_tag(index, other.tag_name(), "InvokeDynamic")),
		}
	}

	/// Iterates pool indices in insertion order, skipping the `Empty` sentinel slots of
	/// `LONG`/`DOUBLE` entries.
	pub fn iter(&self) -> impl Iterator<Item = (PoolIndex, &Entry)> {
		self.entries.iter().enumerate()
			.filter(|(_, e)| !matches!(e, Entry::Empty))
			.map(|(i, e)| (i as PoolIndex + 1, e))
	}
}

#[cfg(test)]
mod testing {
	use pretty_assertions::assert_eq;
	use super::*;

	#[test]
	fn utf8_is_interned_by_content() {
		let mut pool = ConstPool::new();
		let a = pool.add_utf8("hello");
		let b = pool.add_utf8("hello");
		let c = pool.add_utf8("world");
		assert_eq!(a, b);
		assert_ne!(a, c);
	}

	#[test]
	fn composite_entries_intern_by_component_indices() {
		let mut pool = ConstPool::new();
		let class = pool.add_class_name("java/lang/Object");
		let name = pool.add_utf8("<init>");
		let desc = pool.add_utf8("()V");
		let nat = pool.add_name_and_type(name, desc);

		let a = pool.add_methodref(class, nat);
		let b = pool.add_methodref(class, nat);
		assert_eq!(a, b, "two methodrefs with identical class/nat indices must intern to the same index");
	}

	#[test]
	fn long_and_double_occupy_two_slots_and_are_skipped_on_iteration() {
		let mut pool = ConstPool::new();
		let utf8 = pool.add_utf8("x");
		let long = pool.add_long(42);
		let after = pool.add_utf8("y");

		assert_eq!(long + 1, after, "the long's sentinel slot occupies the index right after it");

		let indices: Vec<PoolIndex> = pool.iter().map(|(i, _)| i).collect();
		assert_eq!(indices, vec![utf8, long, after]);
	}

	#[test]
	fn wrong_tag_access_fails() {
		let mut pool = ConstPool::new();
		let utf8 = pool.add_utf8("x");
		assert!(pool.get_integer(utf8).is_err());
	}

	#[test]
	fn push_raw_entries_are_still_found_by_later_interning() {
		let mut pool = ConstPool::new();
		pool.push_raw(Entry::Utf8(JavaString::from("Code")));
		let reinterned = pool.add_utf8("Code");
		assert_eq!(reinterned, 1, "a later add_utf8 for an already-parsed name must not append a duplicate");
		assert_eq!(pool.size(), 1);
	}

	#[test]
	fn index_zero_is_reserved() {
		let pool = ConstPool::new();
		assert!(pool.get_utf8(0).is_err());
	}
}
