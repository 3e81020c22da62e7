//! Whole-pipeline coverage of frame recomputation: a method whose two branches each construct a
//! different reference type before storing into the same local is built, sent through
//! [`duke::frame::compute_frames`], serialized, and re-parsed — the join point's `StackMapTable`
//! entry must carry the two branches' least common superclass as reported by a custom
//! [`duke::hierarchy::ClassPath`].

use anyhow::Result;
use duke::attribute::{Attribute, StackMapFrame, VerificationTypeInfo};
use duke::class::{AccessFlags, ClassFile, Code, Member, Method};
use duke::code::Instruction;
use duke::frame::{compute_frames, FrameComputeOptions};
use duke::hierarchy::ClassHierarchy;
use duke::version::Version;
use java_string::JavaStr;
use pretty_assertions::assert_eq;

const ILOAD_0: u8 = 0x1a;
const IFEQ: u8 = 0x99;
const NEW: u8 = 0xbb;
const DUP: u8 = 0x59;
const INVOKESPECIAL: u8 = 0xb7;
const ASTORE_1: u8 = 0x4c;
const GOTO: u8 = 0xa7;
const RETURN: u8 = 0xb1;

#[test]
fn join_point_carries_the_common_superclass_through_a_full_write_read_cycle() -> Result<()> {
	let mut hierarchy = ClassHierarchy::new();
	hierarchy.add_super(java_string::JavaString::from("pkg/A"), java_string::JavaString::from("pkg/Base"));
	hierarchy.add_super(java_string::JavaString::from("pkg/B"), java_string::JavaString::from("pkg/Base"));

	let mut class = ClassFile::new(Version::V1_8, AccessFlags(AccessFlags::PUBLIC | AccessFlags::SUPER), "pkg/Example");
	let a_class = class.pool.add_class_name("pkg/A");
	let b_class = class.pool.add_class_name("pkg/B");
	let init_name_and_type = class.pool.add_name_and_type(class.pool.add_utf8("<init>"), class.pool.add_utf8("()V"));
	let a_init = class.pool.add_methodref(a_class, init_name_and_type);
	let b_init = class.pool.add_methodref(b_class, init_name_and_type);

	let method_name = class.pool.add_utf8("pick");
	let method_descriptor = class.pool.add_utf8("(I)V");
	let mut method = Method(Member::new(AccessFlags(AccessFlags::PUBLIC), method_name, method_descriptor));

	let mut code = Code::new(3, 2);
	let else_label = code.instructions.create_label();
	let join_label = code.instructions.create_label();

	code.instructions.push(Instruction::Var { opcode: ILOAD_0, index: 0 });
	code.instructions.push(Instruction::Jump { opcode: IFEQ, target: else_label });
	code.instructions.push(Instruction::Type { opcode: NEW, index: a_class });
	code.instructions.push(Instruction::Zero(DUP));
	code.instructions.push(Instruction::Invoke { opcode: INVOKESPECIAL, index: a_init });
	code.instructions.push(Instruction::Var { opcode: ASTORE_1, index: 1 });
	code.instructions.push(Instruction::Jump { opcode: GOTO, target: join_label });
	code.instructions.push(Instruction::Label(else_label));
	code.instructions.push(Instruction::Type { opcode: NEW, index: b_class });
	code.instructions.push(Instruction::Zero(DUP));
	code.instructions.push(Instruction::Invoke { opcode: INVOKESPECIAL, index: b_init });
	code.instructions.push(Instruction::Var { opcode: ASTORE_1, index: 1 });
	code.instructions.push(Instruction::Label(join_label));
	code.instructions.push(Instruction::Zero(RETURN));

	compute_frames(
		&mut class.pool,
		JavaStr::from_str("pkg/Example"),
		true,
		false,
		JavaStr::from_str("(I)V"),
		&mut code,
		&hierarchy,
		&FrameComputeOptions::default(),
	)?;
	method.0.attributes.push(Attribute::Code(code));
	class.methods.push(method);

	let bytes = duke::writer::write_class(&mut class)?;
	let reparsed = duke::reader::read_class(&bytes)?;

	let method = reparsed.methods.iter().find(|m| m.0.name_index == method_name).expect("the 'pick' method");
	let code = method.code().expect("a Code attribute");
	let frames = code.stack_map_table().expect("a StackMapTable attribute survived the round trip");

	// Re-derive the join label's identity from the round-tripped code: labels don't themselves
	// survive serialization, but the frame whose append-local is the two branches' merged type
	// is exactly the one preceding the trailing `return`.
	let join_frame = frames.last().expect("at least one frame");
	match join_frame {
		StackMapFrame::Append { locals, .. } => {
			assert_eq!(locals.len(), 1);
			match &locals[0] {
				VerificationTypeInfo::Object { class_index } => {
					assert_eq!(reparsed.pool.get_class_name(*class_index)?, JavaStr::from_str("pkg/Base"));
				},
				other => panic!("expected an object type, got {other:?}"),
			}
		},
		other => panic!("expected an append frame at the join point, got {other:?}"),
	}
	Ok(())
}
