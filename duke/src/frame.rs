//! Component J: the stack-map frame computer.
//!
//! Computes a minimal-form `StackMapTable` for a method body by abstractly interpreting its
//! instructions, merging [`crate::types::Frame`]s at every branch target via
//! [`crate::hierarchy::ClassPath`], and repeating the forward pass to a fixed point — the
//! classic JVM verifier's worklist algorithm, iterated until no label's frame changes.
//!
//! This module never inspects raw byte offsets: it works entirely in terms of
//! [`crate::code::Label`]s and leaves the offset-delta encoding (same vs. extended forms) to
//! [`crate::writer`], consistent with how [`crate::attribute::StackMapFrame`] is defined.

use std::collections::{HashMap, HashSet};

use java_string::{JavaStr, JavaString};

use crate::attribute::{Attribute, StackMapFrame, VerificationTypeInfo};
use crate::class::Code;
use crate::code::{ArrayType, Instruction, Label};
use crate::error::Error;
use crate::hierarchy::ClassPath;
use crate::inst_list::NodeId;
use crate::pool::{ConstPool, PoolIndex};
use crate::types::{parse_field_type_bytes, parse_method_descriptor, Frame, Type};

/// Host-supplied policy for frame computation, passed explicitly at the agent-to-core boundary
/// rather than read from global state.
#[derive(Clone, Copy)]
pub struct FrameComputeOptions {
	/// Classes for which frame computation is skipped entirely (the `Code` attribute is left
	/// without a `StackMapTable`). Defaults to never skipping; a host fronting a `java`/`sun`
	/// bootstrap-class exclusion list supplies its own predicate here instead of this crate
	/// hardcoding one.
	pub skip_for_class: fn(&JavaStr) -> bool,
	/// `jsr`/`ret` is refused by default ([`Error::UnsupportedSubroutines`]), since verifying
	/// subroutines correctly requires tracking a return address type per call site. Setting this
	/// degrades to treating every frame in a subroutine-using method as a `Full` frame, built
	/// from a conservative (non-fixed-point-exact) single pass.
	pub allow_subroutines_as_full_frames: bool,
}

impl std::fmt::Debug for FrameComputeOptions {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("FrameComputeOptions")
			.field("allow_subroutines_as_full_frames", &self.allow_subroutines_as_full_frames)
			.finish()
	}
}

impl Default for FrameComputeOptions {
	fn default() -> Self {
		FrameComputeOptions { skip_for_class: |_| false, allow_subroutines_as_full_frames: false }
	}
}

/// Recomputes and installs the `StackMapTable` for a single method body in place, replacing any
/// attribute of that kind already present in `code.attributes`.
#[allow(clippy::too_many_arguments)]
pub fn compute_frames(
	pool: &mut ConstPool,
	this_class_name: &JavaStr,
	is_static: bool,
	is_constructor: bool,
	descriptor: &JavaStr,
	code: &mut Code,
	classpath: &dyn ClassPath,
	options: &FrameComputeOptions,
) -> Result<(), Error> {
	if (options.skip_for_class)(this_class_name) {
		log::trace!("skipping stack map computation for {this_class_name}");
		return Ok(());
	}

	let has_subroutines = code.instructions.iter().any(|(_, instr)| match instr {
		Instruction::Jump { opcode, .. } => *opcode == crate::opcode::JSR || *opcode == crate::opcode::JSR_W,
		Instruction::Var { opcode, .. } => *opcode == crate::opcode::RET,
		_ => false,
	});
	if has_subroutines && !options.allow_subroutines_as_full_frames {
		return Err(Error::UnsupportedSubroutines);
	}

	let new_site_labels = assign_new_site_labels(code);

	let (arg_types, _) = parse_method_descriptor(descriptor)
		.map_err(|reason| Error::AttrDecode { name: "method descriptor".to_string(), reason: reason.to_string() })?;

	let mut entry_locals = Vec::new();
	if !is_static {
		if is_constructor {
			entry_locals.push(Type::UninitializedThis);
		} else {
			entry_locals.push(Type::Object(this_class_name.to_owned()));
		}
	}
	for arg in &arg_types {
		let wide = arg.is_category_2();
		entry_locals.push(arg.clone());
		if wide {
			entry_locals.push(Type::Top);
		}
	}
	let entry = Frame { locals: entry_locals, stack: Vec::new() };

	// `target_labels` drives where `run_pass` merges frames, which must include every exception
	// region's start (so `seed_handler_frames` has a frame to seed the handler from) even though
	// that start is not itself a legitimate `StackMapTable` entry site. `emit_labels` is the
	// narrower set of genuine branch/switch/handler targets that actually get a frame emitted.
	let mut target_labels: HashSet<Label> = HashSet::new();
	let mut emit_labels: HashSet<Label> = HashSet::new();
	for (_, instr) in code.instructions.iter() {
		match instr {
			Instruction::Jump { target, .. } => {
				target_labels.insert(*target);
				emit_labels.insert(*target);
			},
			Instruction::TableSwitch { default, targets, .. } => {
				target_labels.insert(*default);
				target_labels.extend(targets.iter().copied());
				emit_labels.insert(*default);
				emit_labels.extend(targets.iter().copied());
			},
			Instruction::LookupSwitch { default, pairs } => {
				target_labels.insert(*default);
				target_labels.extend(pairs.iter().map(|(_, target)| *target));
				emit_labels.insert(*default);
				emit_labels.extend(pairs.iter().map(|(_, target)| *target));
			},
			_ => {},
		}
	}
	for exception in &code.exception_table {
		target_labels.insert(exception.start);
		target_labels.insert(exception.handler);
		emit_labels.insert(exception.handler);
	}

	let mut frame_at: HashMap<Label, Frame> = HashMap::new();
	let max_iterations = 16 + target_labels.len() * 4;
	let mut iterations = 0;
	loop {
		let mut changed = false;
		for (label, frame) in seed_handler_frames(code, pool, &frame_at)? {
			merge_into(&mut frame_at, label, &frame, classpath, &mut changed)?;
		}

		let pass_changed =
			run_pass(code, &entry, &target_labels, &mut frame_at, pool, &new_site_labels, classpath, this_class_name)?;
		changed = changed || pass_changed;

		iterations += 1;
		if !changed {
			break;
		}
		if iterations > max_iterations {
			log::warn!("stack map computation for {this_class_name} did not converge after {iterations} iteration(s)");
			return Err(Error::FrameMerge { reason: "stack map computation did not converge".to_string() });
		}
	}

	let frames = build_stack_map_table(code, &frame_at, &emit_labels, &entry, pool, has_subroutines)?;
	code.attributes.retain(|attribute| !matches!(attribute, Attribute::StackMapTable(_)));
	if !frames.is_empty() {
		code.attributes.push(Attribute::StackMapTable(frames));
	}
	Ok(())
}

/// Mints a stable [`Label`] identity for every `new` instruction in the method, used as the
/// [`Type::Uninitialized`] tag. A matching [`Instruction::Label`] is inserted immediately before
/// each site so the label has a physical position in the list — [`crate::writer`] resolves every
/// label (branch target or allocation-site identity alike) the same way, by where its
/// `Instruction::Label` sits after layout.
fn assign_new_site_labels(code: &mut Code) -> HashMap<NodeId, Label> {
	let new_sites: Vec<NodeId> = code
		.instructions
		.iter()
		.filter(|(_, instr)| matches!(instr, Instruction::Type { opcode, .. } if *opcode == crate::opcode::NEW))
		.map(|(id, _)| id)
		.collect();
	new_sites.into_iter().map(|id| {
		let label = code.instructions.create_label();
		code.instructions.insert_before(id, Instruction::Label(label));
		(id, label)
	}).collect()
}

/// Derives the frame an exception handler starts with from the current frame at its protected
/// region's start label: same locals, operand stack holding only the caught exception type.
fn seed_handler_frames(
	code: &Code,
	pool: &ConstPool,
	frame_at: &HashMap<Label, Frame>,
) -> Result<Vec<(Label, Frame)>, Error> {
	let mut out = Vec::new();
	for exception in &code.exception_table {
		if let Some(start_frame) = frame_at.get(&exception.start) {
			let catch_type = match exception.catch {
				Some(index) => Type::Object(pool.get_class_name(index)?.to_owned()),
				None => Type::Object(JavaString::from("java/lang/Throwable")),
			};
			out.push((exception.handler, Frame { locals: start_frame.locals.clone(), stack: vec![catch_type] }));
		}
	}
	Ok(out)
}

fn merge_into(
	frame_at: &mut HashMap<Label, Frame>,
	label: Label,
	incoming: &Frame,
	classpath: &dyn ClassPath,
	changed: &mut bool,
) -> Result<(), Error> {
	match frame_at.get(&label) {
		None => {
			frame_at.insert(label, incoming.clone());
			*changed = true;
		},
		Some(existing) => {
			let joined = existing.join(incoming, classpath)?;
			if &joined != existing {
				frame_at.insert(label, joined);
				*changed = true;
			}
		},
	}
	Ok(())
}

fn is_unconditional_jump(opcode: u8) -> bool {
	matches!(opcode, crate::opcode::GOTO | crate::opcode::GOTO_W | crate::opcode::JSR | crate::opcode::JSR_W)
}

fn is_terminal(opcode: u8) -> bool {
	use crate::opcode::*;
	matches!(opcode, IRETURN | LRETURN | FRETURN | DRETURN | ARETURN | RETURN | ATHROW)
}

/// One forward walk over the instruction list, propagating the frame forward through
/// fallthrough, branching it to every jump/switch/handler target it reaches, and merging at every
/// label already named in `target_labels`. Returns whether any merge changed `frame_at`.
#[allow(clippy::too_many_arguments)]
fn run_pass(
	code: &Code,
	entry: &Frame,
	target_labels: &HashSet<Label>,
	frame_at: &mut HashMap<Label, Frame>,
	pool: &ConstPool,
	new_site_labels: &HashMap<NodeId, Label>,
	classpath: &dyn ClassPath,
	this_class_name: &JavaStr,
) -> Result<bool, Error> {
	let mut changed = false;
	let mut current = entry.clone();
	let mut reachable = true;

	for (node_id, instr) in code.instructions.iter() {
		if let Instruction::Label(label) = instr {
			if target_labels.contains(label) {
				if reachable {
					merge_into(frame_at, *label, &current, classpath, &mut changed)?;
				}
				match frame_at.get(label) {
					Some(frame) => {
						current = frame.clone();
						reachable = true;
					},
					None => reachable = false,
				}
			}
			continue;
		}
		if !reachable {
			continue;
		}

		match instr {
			Instruction::Jump { opcode, target } if is_unconditional_jump(*opcode) => {
				merge_into(frame_at, *target, &current, classpath, &mut changed)?;
				reachable = *opcode == crate::opcode::JSR || *opcode == crate::opcode::JSR_W;
			},
			Instruction::Jump { target, .. } => {
				let next = apply(node_id, instr, &current, pool, new_site_labels, this_class_name)?;
				merge_into(frame_at, *target, &next, classpath, &mut changed)?;
				current = next;
			},
			Instruction::TableSwitch { default, targets, .. } => {
				let next = apply(node_id, instr, &current, pool, new_site_labels, this_class_name)?;
				merge_into(frame_at, *default, &next, classpath, &mut changed)?;
				for target in targets {
					merge_into(frame_at, *target, &next, classpath, &mut changed)?;
				}
				reachable = false;
			},
			Instruction::LookupSwitch { default, pairs } => {
				let next = apply(node_id, instr, &current, pool, new_site_labels, this_class_name)?;
				merge_into(frame_at, *default, &next, classpath, &mut changed)?;
				for (_, target) in pairs {
					merge_into(frame_at, *target, &next, classpath, &mut changed)?;
				}
				reachable = false;
			},
			Instruction::Zero(op) if is_terminal(*op) => reachable = false,
			Instruction::Var { opcode, .. } if *opcode == crate::opcode::RET => reachable = false,
			_ => current = apply(node_id, instr, &current, pool, new_site_labels, this_class_name)?,
		}
	}

	Ok(changed)
}

#[allow(clippy::too_many_arguments)]
fn apply(
	node_id: NodeId,
	instr: &Instruction,
	frame: &Frame,
	pool: &ConstPool,
	new_site_labels: &HashMap<NodeId, Label>,
	this_class_name: &JavaStr,
) -> Result<Frame, Error> {
	let mut locals = frame.locals.clone();
	let mut stack = frame.stack.clone();
	match instr {
		Instruction::Zero(op) => apply_zero(*op, &mut stack)?,
		Instruction::BiPush(_) | Instruction::SiPush(_) => push(&mut stack, Type::Integer),
		Instruction::Ldc(index) => push(&mut stack, ldc_type(pool, *index)?),
		Instruction::Var { opcode, index } => apply_var(*opcode, *index, &mut locals, &mut stack)?,
		Instruction::Iinc { .. } => {},
		Instruction::Jump { opcode, .. } => apply_jump_condition(*opcode, &mut stack)?,
		Instruction::TableSwitch { .. } | Instruction::LookupSwitch { .. } => {
			pop1(&mut stack)?;
		},
		Instruction::Field { opcode, index } => apply_field(*opcode, *index, pool, &mut stack)?,
		Instruction::Invoke { opcode, index } => apply_invoke(*opcode, *index, pool, &mut locals, &mut stack, false, this_class_name)?,
		Instruction::InvokeInterface { index, .. } => {
			apply_invoke(crate::opcode::INVOKEINTERFACE, *index, pool, &mut locals, &mut stack, true, this_class_name)?
		},
		Instruction::InvokeDynamic { index } => apply_invokedynamic(*index, pool, &mut stack)?,
		Instruction::Type { opcode, index } => apply_type_insn(node_id, *opcode, *index, pool, &mut stack, new_site_labels)?,
		Instruction::NewArray(array_type) => {
			pop1(&mut stack)?;
			push(&mut stack, Type::Object(newarray_descriptor(*array_type)));
		},
		Instruction::MultiANewArray { index, dims } => {
			for _ in 0..*dims {
				pop1(&mut stack)?;
			}
			push(&mut stack, Type::Object(pool.get_class_name(*index)?.to_owned()));
		},
		Instruction::Label(_) => unreachable!("labels are handled by the caller"),
	}
	Ok(Frame { locals, stack })
}

fn apply_zero(opcode: u8, stack: &mut Vec<Type>) -> Result<(), Error> {
	use crate::opcode::*;
	match opcode {
		NOP | BREAKPOINT | IMPDEP1 | IMPDEP2 => {},
		ACONST_NULL => push(stack, Type::Null),
		ICONST_M1..=ICONST_5 => push(stack, Type::Integer),
		LCONST_0 | LCONST_1 => push(stack, Type::Long),
		FCONST_0..=FCONST_2 => push(stack, Type::Float),
		DCONST_0 | DCONST_1 => push(stack, Type::Double),
		IALOAD | BALOAD | CALOAD | SALOAD => {
			pop1(stack)?;
			pop1(stack)?;
			push(stack, Type::Integer);
		},
		LALOAD => {
			pop1(stack)?;
			pop1(stack)?;
			push(stack, Type::Long);
		},
		FALOAD => {
			pop1(stack)?;
			pop1(stack)?;
			push(stack, Type::Float);
		},
		DALOAD => {
			pop1(stack)?;
			pop1(stack)?;
			push(stack, Type::Double);
		},
		AALOAD => {
			pop1(stack)?;
			let array = pop1(stack)?;
			push(stack, element_type_of(&array));
		},
		IASTORE | BASTORE | CASTORE | SASTORE | AASTORE | FASTORE => {
			pop1(stack)?;
			pop1(stack)?;
			pop1(stack)?;
		},
		LASTORE | DASTORE => {
			pop_value(stack, true)?;
			pop1(stack)?;
			pop1(stack)?;
		},
		POP => {
			pop1(stack)?;
		},
		POP2 => {
			pop1(stack)?;
			pop1(stack)?;
		},
		DUP => {
			let value = top(stack)?;
			stack.push(value);
		},
		DUP_X1 => {
			let v1 = pop1(stack)?;
			let v2 = pop1(stack)?;
			stack.push(v1.clone());
			stack.push(v2);
			stack.push(v1);
		},
		DUP_X2 => {
			let v1 = pop1(stack)?;
			let v2 = pop1(stack)?;
			let v3 = pop1(stack)?;
			stack.push(v1.clone());
			stack.push(v3);
			stack.push(v2);
			stack.push(v1);
		},
		DUP2 => {
			let v1 = pop1(stack)?;
			let v2 = pop1(stack)?;
			stack.push(v2.clone());
			stack.push(v1.clone());
			stack.push(v2);
			stack.push(v1);
		},
		DUP2_X1 => {
			let v1 = pop1(stack)?;
			let v2 = pop1(stack)?;
			let v3 = pop1(stack)?;
			stack.push(v2.clone());
			stack.push(v1.clone());
			stack.push(v3);
			stack.push(v2);
			stack.push(v1);
		},
		DUP2_X2 => {
			let v1 = pop1(stack)?;
			let v2 = pop1(stack)?;
			let v3 = pop1(stack)?;
			let v4 = pop1(stack)?;
			stack.push(v2.clone());
			stack.push(v1.clone());
			stack.push(v4);
			stack.push(v3);
			stack.push(v2);
			stack.push(v1);
		},
		SWAP => {
			let v1 = pop1(stack)?;
			let v2 = pop1(stack)?;
			stack.push(v1);
			stack.push(v2);
		},
		IADD | ISUB | IMUL | IDIV | IREM | IAND | IOR | IXOR | ISHL | ISHR | IUSHR => {
			pop1(stack)?;
			pop1(stack)?;
			push(stack, Type::Integer);
		},
		INEG => {
			pop1(stack)?;
			push(stack, Type::Integer);
		},
		LADD | LSUB | LMUL | LDIV | LREM | LAND | LOR | LXOR => {
			pop_value(stack, true)?;
			pop_value(stack, true)?;
			push(stack, Type::Long);
		},
		LSHL | LSHR | LUSHR => {
			pop1(stack)?;
			pop_value(stack, true)?;
			push(stack, Type::Long);
		},
		LNEG => {
			pop_value(stack, true)?;
			push(stack, Type::Long);
		},
		FADD | FSUB | FMUL | FDIV | FREM => {
			pop1(stack)?;
			pop1(stack)?;
			push(stack, Type::Float);
		},
		FNEG => {
			pop1(stack)?;
			push(stack, Type::Float);
		},
		DADD | DSUB | DMUL | DDIV | DREM => {
			pop_value(stack, true)?;
			pop_value(stack, true)?;
			push(stack, Type::Double);
		},
		DNEG => {
			pop_value(stack, true)?;
			push(stack, Type::Double);
		},
		I2L => {
			pop1(stack)?;
			push(stack, Type::Long);
		},
		I2F => {
			pop1(stack)?;
			push(stack, Type::Float);
		},
		I2D => {
			pop1(stack)?;
			push(stack, Type::Double);
		},
		L2I => {
			pop_value(stack, true)?;
			push(stack, Type::Integer);
		},
		L2F => {
			pop_value(stack, true)?;
			push(stack, Type::Float);
		},
		L2D => {
			pop_value(stack, true)?;
			push(stack, Type::Double);
		},
		F2I => {
			pop1(stack)?;
			push(stack, Type::Integer);
		},
		F2L => {
			pop1(stack)?;
			push(stack, Type::Long);
		},
		F2D => {
			pop1(stack)?;
			push(stack, Type::Double);
		},
		D2I => {
			pop_value(stack, true)?;
			push(stack, Type::Integer);
		},
		D2L => {
			pop_value(stack, true)?;
			push(stack, Type::Long);
		},
		D2F => {
			pop_value(stack, true)?;
			push(stack, Type::Float);
		},
		I2B | I2C | I2S => {
			pop1(stack)?;
			push(stack, Type::Integer);
		},
		LCMP => {
			pop_value(stack, true)?;
			pop_value(stack, true)?;
			push(stack, Type::Integer);
		},
		FCMPL | FCMPG => {
			pop1(stack)?;
			pop1(stack)?;
			push(stack, Type::Integer);
		},
		DCMPL | DCMPG => {
			pop_value(stack, true)?;
			pop_value(stack, true)?;
			push(stack, Type::Integer);
		},
		IRETURN | LRETURN | FRETURN | DRETURN | ARETURN | RETURN | ATHROW => {
			// Terminal; the caller marks unreachable-after without consulting the resulting frame.
		},
		ARRAYLENGTH => {
			pop1(stack)?;
			push(stack, Type::Integer);
		},
		MONITORENTER | MONITOREXIT => {
			pop1(stack)?;
		},
		_ => return Err(Error::UnknownOpcode { opcode, offset: 0 }),
	}
	Ok(())
}

fn apply_var(opcode: u8, index: u16, locals: &mut Vec<Type>, stack: &mut Vec<Type>) -> Result<(), Error> {
	use crate::opcode::*;
	let index = index as usize;
	match opcode {
		ILOAD | ILOAD_0 | ILOAD_1 | ILOAD_2 | ILOAD_3 | LLOAD | LLOAD_0 | LLOAD_1 | LLOAD_2 | LLOAD_3 | FLOAD
		| FLOAD_0 | FLOAD_1 | FLOAD_2 | FLOAD_3 | DLOAD | DLOAD_0 | DLOAD_1 | DLOAD_2 | DLOAD_3 | ALOAD | ALOAD_0
		| ALOAD_1 | ALOAD_2 | ALOAD_3 => push(stack, get_local(locals, index)),
		ISTORE | ISTORE_0 | ISTORE_1 | ISTORE_2 | ISTORE_3 | FSTORE | FSTORE_0 | FSTORE_1 | FSTORE_2 | FSTORE_3
		| ASTORE | ASTORE_0 | ASTORE_1 | ASTORE_2 | ASTORE_3 => {
			let value = pop1(stack)?;
			set_local(locals, index, value);
		},
		LSTORE | LSTORE_0 | LSTORE_1 | LSTORE_2 | LSTORE_3 | DSTORE | DSTORE_0 | DSTORE_1 | DSTORE_2 | DSTORE_3 => {
			let value = pop_value(stack, true)?;
			set_local(locals, index, value);
		},
		RET => {},
		_ => return Err(Error::UnknownOpcode { opcode, offset: 0 }),
	}
	Ok(())
}

fn apply_jump_condition(opcode: u8, stack: &mut Vec<Type>) -> Result<(), Error> {
	use crate::opcode::*;
	match opcode {
		IFEQ | IFNE | IFLT | IFGE | IFGT | IFLE | IFNULL | IFNONNULL => {
			pop1(stack)?;
		},
		IF_ICMPEQ | IF_ICMPNE | IF_ICMPLT | IF_ICMPGE | IF_ICMPGT | IF_ICMPLE | IF_ACMPEQ | IF_ACMPNE => {
			pop1(stack)?;
			pop1(stack)?;
		},
		_ => {},
	}
	Ok(())
}

fn apply_field(opcode: u8, index: PoolIndex, pool: &ConstPool, stack: &mut Vec<Type>) -> Result<(), Error> {
	use crate::opcode::*;
	let (_, name_and_type_index) = pool.get_fieldref(index)?;
	let (_, descriptor_index) = pool.get_name_and_type(name_and_type_index)?;
	let field_type = crate::types::parse_field_type(pool.get_utf8(descriptor_index)?)
		.map_err(|reason| Error::AttrDecode { name: "field descriptor".to_string(), reason: reason.to_string() })?;
	match opcode {
		GETSTATIC => push(stack, field_type),
		PUTSTATIC => {
			pop_value(stack, field_type.is_category_2())?;
		},
		GETFIELD => {
			pop1(stack)?;
			push(stack, field_type);
		},
		PUTFIELD => {
			pop_value(stack, field_type.is_category_2())?;
			pop1(stack)?;
		},
		_ => return Err(Error::UnknownOpcode { opcode, offset: 0 }),
	}
	Ok(())
}

#[allow(clippy::too_many_arguments)]
#[allow(clippy::too_many_arguments)]
fn apply_invoke(
	opcode: u8,
	index: PoolIndex,
	pool: &ConstPool,
	locals: &mut [Type],
	stack: &mut Vec<Type>,
	is_interface: bool,
	this_class_name: &JavaStr,
) -> Result<(), Error> {
	let (class_index, name_and_type_index) =
		if is_interface { pool.get_interface_methodref(index)? } else { pool.get_methodref(index)? };
	let (name_index, descriptor_index) = pool.get_name_and_type(name_and_type_index)?;
	let name = pool.get_utf8(name_index)?;
	let descriptor = pool.get_utf8(descriptor_index)?;
	let (args, ret) = parse_method_descriptor(descriptor)
		.map_err(|reason| Error::AttrDecode { name: "method descriptor".to_string(), reason: reason.to_string() })?;

	for arg in args.iter().rev() {
		pop_value(stack, arg.is_category_2())?;
	}

	if opcode != crate::opcode::INVOKESTATIC {
		let receiver = pop1(stack)?;
		if opcode == crate::opcode::INVOKESPECIAL && name == JavaStr::from_str("<init>") {
			// `UninitializedThis` is the receiver exactly when this call is a `super(...)` or
			// `this(...)` delegation from within a constructor; per JVMS §4.10.1.9 it always
			// becomes the class currently being verified, not the (typically super-)class named
			// in the methodref. A plain `new C; ...; invokespecial C.<init>` site, by contrast,
			// is anchored to its own `new` label and becomes the methodref's own class.
			let concrete = if receiver == Type::UninitializedThis {
				Type::Object(this_class_name.to_owned())
			} else {
				Type::Object(pool.get_class_name(class_index)?.to_owned())
			};
			substitute(locals, &receiver, &concrete);
			substitute(stack, &receiver, &concrete);
		}
	}

	if let Some(return_type) = ret {
		push(stack, return_type);
	}
	Ok(())
}

fn apply_invokedynamic(index: PoolIndex, pool: &ConstPool, stack: &mut Vec<Type>) -> Result<(), Error> {
	let (_, name_and_type_index) = pool.get_invoke_dynamic(index)?;
	let (_, descriptor_index) = pool.get_name_and_type(name_and_type_index)?;
	let descriptor = pool.get_utf8(descriptor_index)?;
	let (args, ret) = parse_method_descriptor(descriptor)
		.map_err(|reason| Error::AttrDecode { name: "method descriptor".to_string(), reason: reason.to_string() })?;
	for arg in args.iter().rev() {
		pop_value(stack, arg.is_category_2())?;
	}
	if let Some(return_type) = ret {
		push(stack, return_type);
	}
	Ok(())
}

fn apply_type_insn(
	node_id: NodeId,
	opcode: u8,
	index: PoolIndex,
	pool: &ConstPool,
	stack: &mut Vec<Type>,
	new_site_labels: &HashMap<NodeId, Label>,
) -> Result<(), Error> {
	use crate::opcode::*;
	match opcode {
		NEW => {
			let label = new_site_labels.get(&node_id).copied().ok_or_else(|| Error::FrameMerge {
				reason: "new instruction missing its allocation-site label".to_string(),
			})?;
			push(stack, Type::Uninitialized(label));
		},
		ANEWARRAY => {
			pop1(stack)?;
			let element_name = pool.get_class_name(index)?;
			push(stack, Type::Object(array_of(element_name)));
		},
		CHECKCAST => {
			pop1(stack)?;
			push(stack, Type::Object(pool.get_class_name(index)?.to_owned()));
		},
		INSTANCEOF => {
			pop1(stack)?;
			push(stack, Type::Integer);
		},
		_ => return Err(Error::UnknownOpcode { opcode, offset: 0 }),
	}
	Ok(())
}

fn array_of(element: &JavaStr) -> JavaString {
	let element_bytes = element.as_bytes();
	let mut bytes = vec![b'['];
	if element_bytes.first() == Some(&b'[') {
		bytes.extend_from_slice(element_bytes);
	} else {
		bytes.push(b'L');
		bytes.extend_from_slice(element_bytes);
		bytes.push(b';');
	}
	JavaString::from_modified_utf8(bytes).unwrap_or_else(|_| JavaString::from("java/lang/Object"))
}

fn newarray_descriptor(array_type: ArrayType) -> JavaString {
	let code = match array_type {
		ArrayType::Boolean => b'Z',
		ArrayType::Char => b'C',
		ArrayType::Float => b'F',
		ArrayType::Double => b'D',
		ArrayType::Byte => b'B',
		ArrayType::Short => b'S',
		ArrayType::Int => b'I',
		ArrayType::Long => b'J',
	};
	JavaString::from_modified_utf8(vec![b'[', code]).unwrap_or_else(|_| JavaString::from("java/lang/Object"))
}

fn element_type_of(array: &Type) -> Type {
	if let Type::Object(name) = array {
		let bytes = name.as_bytes();
		if bytes.first() == Some(&b'[') {
			if let Ok((element_type, _)) = parse_field_type_bytes(&bytes[1..]) {
				return element_type;
			}
		}
	}
	Type::Object(JavaString::from("java/lang/Object"))
}

fn substitute(values: &mut [Type], from: &Type, to: &Type) {
	for value in values.iter_mut() {
		if value == from {
			*value = to.clone();
		}
	}
}

fn ldc_type(pool: &ConstPool, index: PoolIndex) -> Result<Type, Error> {
	match pool.tag(index)? {
		"Integer" => Ok(Type::Integer),
		"Float" => Ok(Type::Float),
		"Long" => Ok(Type::Long),
		"Double" => Ok(Type::Double),
		"String" => Ok(Type::Object(JavaString::from("java/lang/String"))),
		"Class" => Ok(Type::Object(JavaString::from("java/lang/Class"))),
		"MethodType" => Ok(Type::Object(JavaString::from("java/lang/invoke/MethodType"))),
		"MethodHandle" => Ok(Type::Object(JavaString::from("java/lang/invoke/MethodHandle"))),
		"Dynamic" => Ok(Type::Object(JavaString::from("java/lang/Object"))),
		found => Err(Error::WrongTag { index, expected: "loadable constant", found }),
	}
}

fn push(stack: &mut Vec<Type>, ty: Type) {
	let wide = ty.is_category_2();
	stack.push(ty);
	if wide {
		stack.push(Type::Top);
	}
}

fn pop1(stack: &mut Vec<Type>) -> Result<Type, Error> {
	stack.pop().ok_or_else(|| Error::FrameMerge { reason: "operand stack underflow".to_string() })
}

fn pop_value(stack: &mut Vec<Type>, wide: bool) -> Result<Type, Error> {
	if wide {
		pop1(stack)?;
		pop1(stack)
	} else {
		pop1(stack)
	}
}

fn top(stack: &[Type]) -> Result<Type, Error> {
	stack.last().cloned().ok_or_else(|| Error::FrameMerge { reason: "operand stack underflow".to_string() })
}

fn get_local(locals: &[Type], index: usize) -> Type {
	locals.get(index).cloned().unwrap_or(Type::Top)
}

fn set_local(locals: &mut Vec<Type>, index: usize, ty: Type) {
	let wide = ty.is_category_2();
	let needed = index + if wide { 2 } else { 1 };
	if locals.len() < needed {
		locals.resize(needed, Type::Top);
	}
	locals[index] = ty;
	if wide {
		locals[index + 1] = Type::Top;
	}
}

enum Form {
	Same,
	SameLocals1(Type),
	Chop(u8),
	Append(Vec<Type>),
}

/// Counts *logical* slots in a physical local-variable/operand-stack vector: a category-2 type
/// (`long`/`double`) occupies two physical slots (itself, then a filler [`Type::Top`]) but is one
/// logical variable, matching JVMS §4.7.4's `Long_variable_info`/`Double_variable_info` (a single
/// entry with the second slot implicit).
fn logical_len(types: &[Type]) -> usize {
	let mut count = 0;
	let mut i = 0;
	while i < types.len() {
		count += 1;
		i += if types[i].is_category_2() && types.get(i + 1) == Some(&Type::Top) { 2 } else { 1 };
	}
	count
}

/// Picks the minimal logical `StackMapTable` entry form for the transition from
/// `previous_locals` to `frame`, using the standard greedy same/chop/append/full preference
/// order a verifier's frame writer uses. `SameExtended` is never produced here: it exists only
/// to let the parser preserve an already-extended encoding byte-for-byte on an unmodified round
/// trip, which is [`crate::reader`]'s concern, not this one's.
///
/// Appended/chopped counts and the single-item check for `SameLocals1StackItem` are computed over
/// *logical* slots (via [`logical_len`]), not physical `Vec<Type>` length, so a live `long`/`double`
/// local or stack value is counted once, not twice.
fn delta_form(previous_locals: &[Type], frame: &Frame) -> Option<Form> {
	if frame.stack.is_empty() && frame.locals == previous_locals {
		return Some(Form::Same);
	}
	if logical_len(&frame.stack) == 1 && frame.locals == previous_locals {
		return Some(Form::SameLocals1(frame.stack[0].clone()));
	}
	if frame.stack.is_empty() && previous_locals.len() > frame.locals.len() {
		let chopped = logical_len(&previous_locals[frame.locals.len()..]);
		if chopped <= 3 && previous_locals[..frame.locals.len()] == *frame.locals {
			return Some(Form::Chop(chopped as u8));
		}
	}
	if frame.stack.is_empty() && frame.locals.len() > previous_locals.len() {
		let tail = &frame.locals[previous_locals.len()..];
		let appended = logical_len(tail);
		if appended <= 3 && frame.locals[..previous_locals.len()] == *previous_locals {
			return Some(Form::Append(tail.to_vec()));
		}
	}
	None
}

fn type_to_verification(pool: &mut ConstPool, ty: &Type) -> VerificationTypeInfo {
	match ty {
		Type::Top => VerificationTypeInfo::Top,
		Type::Integer => VerificationTypeInfo::Integer,
		Type::Float => VerificationTypeInfo::Float,
		Type::Long => VerificationTypeInfo::Long,
		Type::Double => VerificationTypeInfo::Double,
		Type::Null => VerificationTypeInfo::Null,
		Type::UninitializedThis => VerificationTypeInfo::UninitializedThis,
		Type::Object(name) => VerificationTypeInfo::Object { class_index: pool.add_class_name(name.clone()) },
		Type::Uninitialized(label) => VerificationTypeInfo::Uninitialized { new_label: *label },
	}
}

/// Converts a physical slot vector (locals or stack, where a category-2 value is followed by an
/// implicit [`Type::Top`] filler) to the wire-form `VerificationTypeInfo` sequence: one entry per
/// logical slot, with the filler `Top` after a `Long`/`Double` dropped rather than encoded as its
/// own entry.
fn logical_to_verification(pool: &mut ConstPool, types: &[Type]) -> Vec<VerificationTypeInfo> {
	let mut out = Vec::with_capacity(types.len());
	let mut i = 0;
	while i < types.len() {
		let ty = &types[i];
		out.push(type_to_verification(pool, ty));
		i += if ty.is_category_2() && types.get(i + 1) == Some(&Type::Top) { 2 } else { 1 };
	}
	out
}

fn build_stack_map_table(
	code: &Code,
	frame_at: &HashMap<Label, Frame>,
	emit_labels: &HashSet<Label>,
	entry: &Frame,
	pool: &mut ConstPool,
	force_full: bool,
) -> Result<Vec<StackMapFrame>, Error> {
	let mut ordered_labels = Vec::new();
	for (_, instr) in code.instructions.iter() {
		if let Instruction::Label(label) = instr {
			if emit_labels.contains(label) && frame_at.contains_key(label) {
				ordered_labels.push(*label);
			}
		}
	}

	let mut out = Vec::with_capacity(ordered_labels.len());
	let mut previous_locals = entry.locals.clone();
	for label in ordered_labels {
		let frame = &frame_at[&label];
		let form = if force_full { None } else { delta_form(&previous_locals, frame) };
		let entry = match form {
			Some(Form::Same) => StackMapFrame::Same { target: label },
			Some(Form::SameLocals1(stack_item)) => {
				StackMapFrame::SameLocals1StackItem { target: label, stack: type_to_verification(pool, &stack_item) }
			},
			Some(Form::Chop(k)) => StackMapFrame::Chop { target: label, k },
			Some(Form::Append(tail)) => StackMapFrame::Append {
				target: label,
				locals: logical_to_verification(pool, &tail),
			},
			None => StackMapFrame::Full {
				target: label,
				locals: logical_to_verification(pool, &frame.locals),
				stack: logical_to_verification(pool, &frame.stack),
			},
		};
		out.push(entry);
		previous_locals = frame.locals.clone();
	}
	Ok(out)
}
