//! Whole-pipeline coverage: a class file built byte-for-byte by `raw_class_file` (an independent,
//! non-validating encoder) parses through [`duke::reader`] and writes back out to the identical
//! bytes, and [`duke::writer::compute_size`] agrees with the length of what actually got written.

use anyhow::Result;
use pretty_assertions::assert_eq;
use raw_class_file::{flags, insn, AttributeInfo, ClassFile as RawClassFile, CpInfo, LineNumberTableEntry, MethodInfo};

/// `org/example/Main`'s trivial `<init>` (`aload_0; invokespecial Object.<init>; return`), plus a
/// `LineNumberTable` and a `SourceFile` attribute, built the same way `javac` would lay it out.
fn example_main_bytes() -> Vec<u8> {
	let class = RawClassFile {
		minor_version: 0,
		major_version: 52,
		constant_pool: vec![
			CpInfo::Methodref { class_index: 3, name_and_type_index: 10 },
			CpInfo::Class { name_index: 11 },
			CpInfo::Class { name_index: 12 },
			CpInfo::Utf8 { bytes: b"<init>".to_vec() },
			CpInfo::Utf8 { bytes: b"()V".to_vec() },
			CpInfo::Utf8 { bytes: b"Code".to_vec() },
			CpInfo::Utf8 { bytes: b"LineNumberTable".to_vec() },
			CpInfo::Utf8 { bytes: b"SourceFile".to_vec() },
			CpInfo::Utf8 { bytes: b"Main.java".to_vec() },
			CpInfo::NameAndType { name_index: 4, descriptor_index: 5 },
			CpInfo::Utf8 { bytes: b"org/example/Main".to_vec() },
			CpInfo::Utf8 { bytes: b"java/lang/Object".to_vec() },
		],
		access_flags: flags::ACC_SUPER,
		this_class: 2,
		super_class: 3,
		interfaces: vec![],
		fields: vec![],
		methods: vec![MethodInfo {
			access_flags: 0,
			name_index: 4,
			descriptor_index: 5,
			attributes: vec![AttributeInfo::Code {
				attribute_name_index: 6,
				max_stack: 1,
				max_locals: 1,
				code: vec![insn::aload_0, insn::invokespecial, 0, 1, insn::r#return],
				exception_table: vec![],
				attributes: vec![AttributeInfo::LineNumberTable {
					attribute_name_index: 7,
					line_number_table: vec![LineNumberTableEntry { start_pc: 0, line_number: 3 }],
				}],
			}],
		}],
		attributes: vec![AttributeInfo::SourceFile { attribute_name_index: 8, sourcefile_index: 9 }],
	};
	class.to_bytes()
}

#[test]
fn untouched_class_round_trips_byte_for_byte() -> Result<()> {
	let bytes = example_main_bytes();

	let mut class = duke::reader::read_class(&bytes)?;
	assert_eq!(class.this_class_name()?, java_string::JavaStr::from_str("org/example/Main"));
	assert_eq!(class.super_class_name()?, Some(java_string::JavaStr::from_str("java/lang/Object")));

	let rewritten = duke::writer::write_class(&mut class)?;
	assert_eq!(rewritten, bytes);
	Ok(())
}

#[test]
fn compute_size_agrees_with_what_write_class_actually_produces() -> Result<()> {
	let bytes = example_main_bytes();
	let class = duke::reader::read_class(&bytes)?;

	let predicted = duke::writer::compute_size(&class)?;
	let mut class = class;
	let actual = duke::writer::write_class(&mut class)?;
	assert_eq!(predicted, actual.len());
	Ok(())
}
