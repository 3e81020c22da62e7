//! Whole-pipeline coverage for the two bytecode-instrumentation scenarios a JVMTI agent built on
//! this library actually performs: padding every method's code with `nop`s, and prepending a
//! proxy call to `java/lang/Object`'s own `<init>`.
//!
//! `duke::opcode` is crate-private, so (exactly as a real caller linking against this library
//! would have to) these raw opcode bytes are spelled out by hand instead of imported.

use anyhow::Result;
use duke::attribute::Attribute;
use duke::class::{AccessFlags, Code, ClassFile, Member, Method};
use duke::code::Instruction;
use duke::frame::{compute_frames, FrameComputeOptions};
use duke::hierarchy::ClassHierarchy;
use duke::version::Version;
use java_string::JavaStr;
use pretty_assertions::assert_eq;

const NOP: u8 = 0x00;
const ALOAD_0: u8 = 0x2a;
const RETURN: u8 = 0xb1;
const INVOKESTATIC: u8 = 0xb8;

fn class_with_trivial_init() -> ClassFile {
	let mut class = ClassFile::new(Version::V1_8, AccessFlags(AccessFlags::PUBLIC | AccessFlags::SUPER), "pkg/Widget");
	let object_class = class.pool.add_class_name("java/lang/Object");
	class.super_class = Some(object_class);

	let init_name = class.pool.add_utf8("<init>");
	let init_descriptor = class.pool.add_utf8("()V");
	let mut method = Method(Member::new(AccessFlags(AccessFlags::PUBLIC), init_name, init_descriptor));

	let mut code = Code::new(1, 1);
	code.instructions.push(Instruction::Var { opcode: ALOAD_0, index: 0 });
	code.instructions.push(Instruction::Zero(RETURN));
	method.0.attributes.push(Attribute::Code(code));

	class.methods.push(method);
	class
}

/// Prepends four `nop` instructions to the front of every method that has a `Code` attribute.
fn pad_every_method_with_four_nops(class: &mut ClassFile) -> usize {
	let mut touched = 0;
	for method in &mut class.methods {
		if let Some(code) = method.code_mut() {
			let mut cursor = code.instructions.cursor_front_mut();
			for _ in 0..4 {
				cursor.insert_before(Instruction::Zero(NOP));
			}
			touched += 1;
		}
	}
	touched
}

#[test]
fn nop_padding_adds_four_bytes_per_method_with_code() -> Result<()> {
	let mut class = class_with_trivial_init();
	let original_size = duke::writer::compute_size(&class)?;

	let methods_with_code = pad_every_method_with_four_nops(&mut class);
	assert_eq!(methods_with_code, 1);

	let padded_bytes = duke::writer::write_class(&mut class)?;
	assert_eq!(padded_bytes.len(), original_size + 4 * methods_with_code);

	// A second round trip re-parses to the same byte image: the padding is stable, not a
	// one-time artifact of having just been written.
	let mut reparsed = duke::reader::read_class(&padded_bytes)?;
	let rewritten = duke::writer::write_class(&mut reparsed)?;
	assert_eq!(rewritten, padded_bytes);
	Ok(())
}

#[test]
fn object_init_instrumentation_verifies_under_the_frame_computer() -> Result<()> {
	// `java/lang/Object` itself: its own `<init>` has no superclass constructor to call.
	let mut class = ClassFile::new(Version::V1_8, AccessFlags(AccessFlags::PUBLIC | AccessFlags::SUPER), "java/lang/Object");

	let init_name = class.pool.add_utf8("<init>");
	let init_descriptor = class.pool.add_utf8("()V");
	let mut method = Method(Member::new(AccessFlags(AccessFlags::PUBLIC), init_name, init_descriptor));

	let proxy_class = class.pool.add_class_name("frproxy/FrInstrProxy");
	let alloc_descriptor = class.pool.add_utf8("(Ljava/lang/Object;)V");
	let alloc_name_and_type = class.pool.add_name_and_type(class.pool.add_utf8("alloc"), alloc_descriptor);
	let alloc_method = class.pool.add_methodref(proxy_class, alloc_name_and_type);

	// The instrumentation sequence: `aload_0; invokestatic frproxy/FrInstrProxy.alloc(Ljava/lang/Object;)V`
	let mut code = Code::new(1, 1);
	code.instructions.push(Instruction::Var { opcode: ALOAD_0, index: 0 });
	code.instructions.push(Instruction::Invoke { opcode: INVOKESTATIC, index: alloc_method });
	code.instructions.push(Instruction::Zero(RETURN));
	method.0.attributes.push(Attribute::Code(code));
	class.methods.push(method);

	let hierarchy = ClassHierarchy::new();
	let code = class.methods[0].code_mut().expect("the <init> method carries a Code attribute");
	compute_frames(
		&mut class.pool,
		JavaStr::from_str("java/lang/Object"),
		false,
		true,
		JavaStr::from_str("()V"),
		code,
		&hierarchy,
		&FrameComputeOptions::default(),
	)?;

	let bytes = duke::writer::write_class(&mut class)?;
	let reparsed = duke::reader::read_class(&bytes)?;
	let method = reparsed.methods.iter().find(|m| m.0.name_index == init_name).expect("the instrumented <init>");
	let code = method.code().expect("a Code attribute");
	// No branch was introduced, so no StackMapTable entry is required — the instrumented method
	// still parses back with the instruction sequence intact.
	assert!(code.instructions.iter().any(|(_, instr)| matches!(instr, Instruction::Invoke { index, .. } if *index == alloc_method)));
	Ok(())
}
