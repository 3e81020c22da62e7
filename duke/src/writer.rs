//! Component H: the class-file writer.
//!
//! Grounded in `duke`'s original `simple_class_writer.rs` attribute-framing idiom (buffer the
//! body, then prefix it with `attribute_name_index`/`attribute_length` via
//! [`crate::buffer::Writer::reserve_u32`]/[`crate::buffer::Writer::patch_u32_len_from`]), but the
//! original's incremental `PoolWrite` builder has no counterpart here: this crate's [`ConstPool`]
//! is already a fully interned table by the time writing starts (built either by
//! [`crate::reader`] or by a caller synthesizing a class via [`crate::class::ClassFile::new`] and
//! `pool.add_*`), so the pool is simply serialized in its existing order via [`ConstPool::iter`].
//!
//! The writer has two jobs: choosing the minimal encoding for instructions whose width isn't
//! fixed by their payload alone (`ldc` vs `ldc_w`, compact vs one-byte vs `wide` local-variable
//! forms), and resolving every [`Label`] to a concrete byte offset before
//! any branch delta or `StackMapTable` offset_delta can be written. [`layout_method`] is that
//! resolution pass, mirroring [`crate::reader`]'s own two-pass structure in reverse: a layout pass
//! assigns offsets first, then a single forward pass emits bytes using them.

use std::collections::{HashMap, HashSet};

use crate::attribute::{Attribute, StackMapFrame, VerificationTypeInfo};
use crate::buffer::Writer;
use crate::class::{ClassFile, Code};
use crate::code::{Instruction, Label};
use crate::error::Error;
use crate::inst_list::NodeId;
use crate::opcode as op;
use crate::pool::{ConstPool, PoolIndex};

/// Assigns a byte offset to every instruction (and `Instruction::Label` pseudo-instruction) of
/// every method body in `class`, choosing the minimal encoding width for each instruction whose
/// width depends on its operand. Offsets become readable via
/// [`crate::inst_list::InstList::offset_of`] afterwards, both for [`write_class`] itself and for a
/// disassembler that wants to print offsets without writing any bytes.
pub fn layout_class(class: &mut ClassFile) -> Result<(), Error> {
	for method in &mut class.methods {
		if let Some(code) = method.code_mut() {
			layout_method(code, &class.pool)?;
		}
	}
	Ok(())
}

/// Lays out a single method body, returning its `code_length` (JVMS §4.7.3): the sum of every
/// instruction's chosen width. `Instruction::Label` nodes contribute zero bytes but still receive
/// an offset, since branch targets, exception ranges, and `StackMapTable`/`LocalVariableTable`
/// entries all address code positions through a label rather than a raw offset.
pub(crate) fn layout_method(code: &mut Code, pool: &ConstPool) -> Result<u32, Error> {
	let ids: Vec<NodeId> = code.instructions.iter().map(|(id, _)| id).collect();
	let mut cursor = 0u32;
	for id in ids {
		code.instructions.set_offset(id, cursor);
		let width = instruction_width(code.instructions.get(id), cursor, pool)?;
		cursor += width;
	}
	if cursor == 0 {
		return Err(Error::Other(anyhow::anyhow!("a Code attribute must contain at least one instruction")));
	}
	if cursor > u16::MAX as u32 {
		return Err(Error::Other(anyhow::anyhow!("code_length {cursor} exceeds the 16-bit limit")));
	}
	Ok(cursor)
}

fn is_load_or_store_family(opcode: u8) -> bool {
	matches!(opcode, op::ILOAD..=op::ALOAD | op::ISTORE..=op::ASTORE)
}

/// The compact single-byte opcode for a load/store of `index` in `0..=3` (JVMS §6.5 `iload_<n>`
/// and siblings), if `opcode` has one — inverse of [`crate::reader`]'s un-compacting arithmetic.
/// `ret` has no compact family and always falls through to the narrow or `wide` form.
fn compact_var_opcode(opcode: u8, index: u16) -> Option<u8> {
	if index > 3 || !is_load_or_store_family(opcode) {
		return None;
	}
	if (op::ILOAD..=op::ALOAD).contains(&opcode) {
		Some(op::ILOAD_0 + (opcode - op::ILOAD) * 4 + index as u8)
	} else {
		Some(op::ISTORE_0 + (opcode - op::ISTORE) * 4 + index as u8)
	}
}

/// The width (in bytes) a `Var` instruction will occupy once encoded.
fn var_width(opcode: u8, index: u16) -> u32 {
	if compact_var_opcode(opcode, index).is_some() {
		1
	} else if index <= 255 {
		2
	} else {
		4
	}
}

fn iinc_is_narrow(index: u16, delta: i16) -> bool {
	index <= 255 && i8::try_from(delta).is_ok()
}

/// `ldc`/`ldc_w`/`ldc2_w` width selection: a `Long`/`Double` entry always needs the wide-index,
/// wide-slot `ldc2_w` form; everything else takes `ldc` if the index fits a byte, `ldc_w`
/// otherwise.
fn ldc_width(index: PoolIndex, pool: &ConstPool) -> crate::error::Result<u32> {
	let tag = pool.tag(index)?;
	Ok(if matches!(tag, "Long" | "Double") {
		3
	} else if index <= 255 {
		2
	} else {
		3
	})
}

/// Bytes of zero-padding a `tableswitch`/`lookupswitch` needs before its 4-byte-aligned payload,
/// counted from the instruction's own offset (JVMS §6.5) — the same alignment base
/// [`crate::reader::align_to_4`] uses on read.
fn switch_padding(offset: u32) -> u32 {
	(4 - ((offset + 1) % 4)) % 4
}

fn instruction_width(instruction: &Instruction, offset: u32, pool: &ConstPool) -> crate::error::Result<u32> {
	Ok(match instruction {
		Instruction::Label(_) => 0,
		Instruction::Zero(_) => 1,
		Instruction::BiPush(_) => 2,
		Instruction::SiPush(_) => 3,
		Instruction::Ldc(index) => ldc_width(*index, pool)?,
		Instruction::Var { opcode, index } => var_width(*opcode, *index),
		Instruction::Iinc { index, delta } => if iinc_is_narrow(*index, *delta) { 3 } else { 6 },
		Instruction::Jump { opcode, .. } => if *opcode == op::GOTO_W || *opcode == op::JSR_W { 5 } else { 3 },
		Instruction::TableSwitch { targets, .. } => 1 + switch_padding(offset) + 12 + 4 * targets.len() as u32,
		Instruction::LookupSwitch { pairs, .. } => 1 + switch_padding(offset) + 8 + 8 * pairs.len() as u32,
		Instruction::Field { .. } => 3,
		Instruction::Invoke { .. } => 3,
		Instruction::InvokeInterface { .. } => 5,
		Instruction::InvokeDynamic { .. } => 5,
		Instruction::Type { .. } => 3,
		Instruction::NewArray(_) => 2,
		Instruction::MultiANewArray { .. } => 4,
	})
}

/// Every label placed in `code`, resolved to its byte offset — valid only after
/// [`layout_method`] has run. Branch targets and `new`-site identities (see
/// `crate::frame::assign_new_site_labels`) are resolved through this one map alike.
pub(crate) fn label_offsets(code: &Code) -> HashMap<Label, u32> {
	code.instructions.iter()
		.filter_map(|(id, instr)| match instr {
			Instruction::Label(label) => code.instructions.offset_of(id).map(|offset| (*label, offset)),
			_ => None,
		})
		.collect()
}

pub(crate) fn resolve(labels: &HashMap<Label, u32>, label: Label) -> crate::error::Result<u32> {
	labels.get(&label).copied().ok_or_else(|| anyhow::anyhow!("label {label:?} was never placed in the instruction list"))
}

/// The writer's public entry point: serializes `class` into a freshly allocated `Vec<u8>`. Runs
/// [`layout_class`] first, so `class`'s instruction offsets are valid after this returns.
pub fn write_class(class: &mut ClassFile) -> Result<Vec<u8>, Error> {
	let name_index = intern_attribute_names(class);
	layout_class(class)?;
	let mut w = Writer::with_capacity(4096);
	serialize_class(&mut w, class, &name_index).map_err(Error::from)?;
	let bytes = w.into_bytes();
	log::trace!("wrote class file, {} byte(s), {} pool entries", bytes.len(), class.pool.size());
	Ok(bytes)
}

/// The safe-Rust realization of a JVMTI-style agent allocator callback: `allocate` is called
/// exactly once, with the exact serialized size, and must return a buffer of at least that many
/// bytes or `None`. A `None` (or undersized) response is surfaced as [`Error::OutOfMemory`] rather
/// than panicking, since a JVMTI host's allocator can legitimately run out of memory.
pub fn write_class_with_allocator(
	class: &mut ClassFile,
	allocate: impl FnOnce(usize) -> Option<Vec<u8>>,
) -> Result<Vec<u8>, Error> {
	let bytes = write_class(class)?;
	let mut buffer = allocate(bytes.len()).ok_or(Error::OutOfMemory { requested: bytes.len() })?;
	if buffer.len() < bytes.len() {
		return Err(Error::OutOfMemory { requested: bytes.len() });
	}
	buffer.truncate(bytes.len());
	buffer.copy_from_slice(&bytes);
	Ok(buffer)
}

/// The exact byte size [`write_class`] would produce. Implemented as a full write against a
/// scratch clone rather than a separate non-serializing size pass: every [`Writer::write_*`] call
/// pushes onto a growing `Vec<u8>` regardless of any pre-computed capacity, so a truly independent
/// size counter would just be this same layout-and-serialize logic duplicated a second time.
/// Useful for a host that wants to size its own allocation ahead of
/// [`write_class_with_allocator`] (which already does this internally) without keeping the bytes
/// around afterwards.
pub fn compute_size(class: &ClassFile) -> Result<usize, Error> {
	let mut class = class.clone();
	Ok(write_class(&mut class)?.len())
}

fn collect_attribute_names<'a>(attributes: &'a [Attribute], names: &mut HashSet<&'static str>) {
	for attribute in attributes {
		if let Some(name) = attribute.canonical_name() {
			names.insert(name);
		}
		if let Attribute::Code(code) = attribute {
			collect_attribute_names(&code.attributes, names);
		}
	}
}

/// Interns the UTF8 name of every structured attribute actually present in `class` (an
/// `attribute_name_index` must point at a real pool entry, and [`Attribute`]'s structured variants
/// don't carry their own name index the way [`Attribute::Unknown`] does). Must run before the pool
/// is serialized.
fn intern_attribute_names(class: &mut ClassFile) -> HashMap<&'static str, PoolIndex> {
	let mut names = HashSet::new();
	collect_attribute_names(&class.attributes, &mut names);
	for field in &class.fields {
		collect_attribute_names(&field.0.attributes, &mut names);
	}
	for method in &class.methods {
		collect_attribute_names(&method.0.attributes, &mut names);
	}
	names.into_iter().map(|name| (name, class.pool.add_utf8(name))).collect()
}

fn serialize_class(w: &mut Writer, class: &ClassFile, name_index: &HashMap<&'static str, PoolIndex>) -> crate::error::Result<()> {
	w.write_u32(0xCAFE_BABE);
	w.write_u16(class.version.minor);
	w.write_u16(class.version.major);

	w.write_usize_as_u16(class.pool.size() as usize + 1)?;
	for (_, entry) in class.pool.iter() {
		write_pool_entry(w, entry)?;
	}

	w.write_u16(class.access_flags.0);
	w.write_u16(class.this_class);
	w.write_u16(class.super_class.unwrap_or(0));

	w.write_usize_as_u16(class.interfaces.len())?;
	for &interface in &class.interfaces {
		w.write_u16(interface);
	}

	w.write_usize_as_u16(class.fields.len())?;
	for field in &class.fields {
		write_member(w, &class.pool, name_index, &field.0)?;
	}

	w.write_usize_as_u16(class.methods.len())?;
	for method in &class.methods {
		write_member(w, &class.pool, name_index, &method.0)?;
	}

	w.write_usize_as_u16(class.attributes.len())?;
	for attribute in &class.attributes {
		write_attribute(w, &class.pool, name_index, attribute, None)?;
	}
	Ok(())
}

fn write_pool_entry(w: &mut Writer, entry: &crate::pool::Entry) -> crate::error::Result<()> {
	use crate::pool::Entry;
	match entry {
		Entry::Utf8(s) => {
			w.write_u8(1);
			let bytes = crate::jstring::from_string_to_vec(s.as_java_str());
			w.write_usize_as_u16(bytes.len())?;
			w.write_bytes(&bytes);
		},
		Entry::Integer(v) => { w.write_u8(3); w.write_i32(*v); },
		Entry::Float(v) => { w.write_u8(4); w.write_f32(*v); },
		Entry::Long(v) => { w.write_u8(5); w.write_i64(*v); },
		Entry::Double(v) => { w.write_u8(6); w.write_f64(*v); },
		Entry::Class { name_index } => { w.write_u8(7); w.write_u16(*name_index); },
		Entry::String { string_index } => { w.write_u8(8); w.write_u16(*string_index); },
		Entry::Fieldref { class_index, name_and_type_index } => {
			w.write_u8(9); w.write_u16(*class_index); w.write_u16(*name_and_type_index);
		},
		Entry::Methodref { class_index, name_and_type_index } => {
			w.write_u8(10); w.write_u16(*class_index); w.write_u16(*name_and_type_index);
		},
		Entry::InterfaceMethodref { class_index, name_and_type_index } => {
			w.write_u8(11); w.write_u16(*class_index); w.write_u16(*name_and_type_index);
		},
		Entry::NameAndType { name_index, descriptor_index } => {
			w.write_u8(12); w.write_u16(*name_index); w.write_u16(*descriptor_index);
		},
		Entry::MethodHandle { kind, reference_index } => {
			w.write_u8(15); w.write_u8(kind.to_tag()); w.write_u16(*reference_index);
		},
		Entry::MethodType { descriptor_index } => { w.write_u8(16); w.write_u16(*descriptor_index); },
		Entry::Dynamic { bootstrap_method_attr_index, name_and_type_index } => {
			w.write_u8(17); w.write_u16(*bootstrap_method_attr_index); w.write_u16(*name_and_type_index);
		},
		Entry::InvokeDynamic { bootstrap_method_attr_index, name_and_type_index } => {
			w.write_u8(18); w.write_u16(*bootstrap_method_attr_index); w.write_u16(*name_and_type_index);
		},
		Entry::Module { name_index } => { w.write_u8(19); w.write_u16(*name_index); },
		Entry::Package { name_index } => { w.write_u8(20); w.write_u16(*name_index); },
		Entry::Empty => unreachable!("ConstPool::iter skips Empty sentinel slots"),
	}
	Ok(())
}

fn write_member(
	w: &mut Writer,
	pool: &ConstPool,
	name_index: &HashMap<&'static str, PoolIndex>,
	member: &crate::class::Member,
) -> crate::error::Result<()> {
	w.write_u16(member.access_flags.0);
	w.write_u16(member.name_index);
	w.write_u16(member.descriptor_index);
	w.write_usize_as_u16(member.attributes.len())?;
	for attribute in &member.attributes {
		write_attribute(w, pool, name_index, attribute, None)?;
	}
	Ok(())
}

/// Writes one attribute, framed as `attribute_name_index`/`attribute_length`/body, the body
/// written first and its length patched in afterwards. `labels` is `Some` only when writing a
/// `Code`-nested attribute (`LineNumberTable`/`LocalVariableTable`/`StackMapTable`), which address
/// positions by label rather than pool index.
fn write_attribute(
	w: &mut Writer,
	pool: &ConstPool,
	name_index: &HashMap<&'static str, PoolIndex>,
	attribute: &Attribute,
	labels: Option<&HashMap<Label, u32>>,
) -> crate::error::Result<()> {
	if let Attribute::Unknown { name_index, bytes } = attribute {
		w.write_u16(*name_index);
		w.write_usize_as_u32(bytes.len())?;
		w.write_bytes(bytes);
		return Ok(());
	}

	let canonical = attribute.canonical_name().expect("Unknown already handled above");
	let attr_name_index = *name_index.get(canonical)
		.ok_or_else(|| anyhow::anyhow!("attribute name {canonical} was not interned before writing"))?;
	w.write_u16(attr_name_index);
	let length_at = w.reserve_u32();
	let body_start = w.position();

	match attribute {
		Attribute::SourceFile { sourcefile_index } => w.write_u16(*sourcefile_index),
		Attribute::Exceptions { exception_index_table } => {
			w.write_usize_as_u16(exception_index_table.len())?;
			for &index in exception_index_table {
				w.write_u16(index);
			}
		},
		Attribute::Code(code) => write_code_body(w, pool, name_index, code)?,
		Attribute::LineNumberTable(entries) => {
			let labels = labels.ok_or_else(|| anyhow::anyhow!("LineNumberTable written outside of a Code attribute"))?;
			w.write_usize_as_u16(entries.len())?;
			for entry in entries {
				w.write_u16(resolve(labels, entry.start)? as u16);
				w.write_u16(entry.line_number);
			}
		},
		Attribute::LocalVariableTable(entries) => {
			let labels = labels.ok_or_else(|| anyhow::anyhow!("LocalVariableTable written outside of a Code attribute"))?;
			w.write_usize_as_u16(entries.len())?;
			for entry in entries {
				let start = resolve(labels, entry.range.start)?;
				let end = resolve(labels, entry.range.end)?;
				w.write_u16(start as u16);
				w.write_u16((end - start) as u16);
				w.write_u16(entry.name_index);
				w.write_u16(entry.descriptor_index);
				w.write_u16(entry.index);
			}
		},
		Attribute::StackMapTable(frames) => {
			let labels = labels.ok_or_else(|| anyhow::anyhow!("StackMapTable written outside of a Code attribute"))?;
			write_stack_map_table(w, frames, labels)?;
		},
		Attribute::Unknown { .. } => unreachable!("handled above"),
	}
	w.patch_u32_len_from(length_at, body_start);
	Ok(())
}

fn write_code_body(
	w: &mut Writer,
	pool: &ConstPool,
	name_index: &HashMap<&'static str, PoolIndex>,
	code: &Code,
) -> crate::error::Result<()> {
	let mut total = 0u32;
	for (id, instr) in code.instructions.iter() {
		let offset = code.instructions.offset_of(id)
			.ok_or_else(|| anyhow::anyhow!("layout_class must run before write_class serializes a Code attribute"))?;
		total += instruction_width(instr, offset, pool)?;
	}
	let labels = label_offsets(code);

	w.write_u16(code.max_stack);
	w.write_u16(code.max_locals);
	w.write_u32(total);

	for (id, instr) in code.instructions.iter() {
		if matches!(instr, Instruction::Label(_)) {
			continue;
		}
		let offset = code.instructions.offset_of(id).expect("checked above");
		emit_instruction(w, offset, instr, pool, &labels)?;
	}

	w.write_usize_as_u16(code.exception_table.len())?;
	for exception in &code.exception_table {
		w.write_u16(resolve(&labels, exception.start)? as u16);
		w.write_u16(resolve(&labels, exception.end)? as u16);
		w.write_u16(resolve(&labels, exception.handler)? as u16);
		w.write_u16(exception.catch.unwrap_or(0));
	}

	w.write_usize_as_u16(code.attributes.len())?;
	for attribute in &code.attributes {
		write_attribute(w, pool, name_index, attribute, Some(&labels))?;
	}
	Ok(())
}

fn emit_instruction(w: &mut Writer, offset: u32, instr: &Instruction, pool: &ConstPool, labels: &HashMap<Label, u32>) -> crate::error::Result<()> {
	match instr {
		Instruction::Label(_) => {},
		Instruction::Zero(opcode) => w.write_u8(*opcode),
		Instruction::BiPush(v) => { w.write_u8(op::BIPUSH); w.write_i8(*v); },
		Instruction::SiPush(v) => { w.write_u8(op::SIPUSH); w.write_i16(*v); },
		Instruction::Ldc(index) => emit_ldc(w, *index, pool)?,
		Instruction::Var { opcode, index } => emit_var(w, *opcode, *index),
		Instruction::Iinc { index, delta } => emit_iinc(w, *index, *delta),
		Instruction::Jump { opcode, target } => emit_jump(w, offset, *opcode, *target, labels)?,
		Instruction::TableSwitch { default, low, high, targets } => {
			w.write_u8(op::TABLESWITCH);
			for _ in 0..switch_padding(offset) { w.write_u8(0); }
			w.write_i32(branch_delta(offset, *default, labels)?);
			w.write_i32(*low);
			w.write_i32(*high);
			for &target in targets {
				w.write_i32(branch_delta(offset, target, labels)?);
			}
		},
		Instruction::LookupSwitch { default, pairs } => {
			w.write_u8(op::LOOKUPSWITCH);
			for _ in 0..switch_padding(offset) { w.write_u8(0); }
			w.write_i32(branch_delta(offset, *default, labels)?);
			w.write_usize_as_u32(pairs.len())?;
			for &(key, target) in pairs {
				w.write_i32(key);
				w.write_i32(branch_delta(offset, target, labels)?);
			}
		},
		Instruction::Field { opcode, index } => { w.write_u8(*opcode); w.write_u16(*index); },
		Instruction::Invoke { opcode, index } => { w.write_u8(*opcode); w.write_u16(*index); },
		Instruction::InvokeInterface { index, count } => {
			w.write_u8(op::INVOKEINTERFACE);
			w.write_u16(*index);
			w.write_u8(*count);
			w.write_u8(0);
		},
		Instruction::InvokeDynamic { index } => {
			w.write_u8(op::INVOKEDYNAMIC);
			w.write_u16(*index);
			w.write_u16(0);
		},
		Instruction::Type { opcode, index } => { w.write_u8(*opcode); w.write_u16(*index); },
		Instruction::NewArray(array_type) => { w.write_u8(op::NEWARRAY); w.write_u8(array_type.to_atype()); },
		Instruction::MultiANewArray { index, dims } => {
			w.write_u8(op::MULTIANEWARRAY);
			w.write_u16(*index);
			w.write_u8(*dims);
		},
	}
	Ok(())
}

fn emit_var(w: &mut Writer, opcode: u8, index: u16) {
	if let Some(compact) = compact_var_opcode(opcode, index) {
		w.write_u8(compact);
	} else if index <= 255 {
		w.write_u8(opcode);
		w.write_u8(index as u8);
	} else {
		w.write_u8(op::WIDE);
		w.write_u8(opcode);
		w.write_u16(index);
	}
}

fn emit_iinc(w: &mut Writer, index: u16, delta: i16) {
	if iinc_is_narrow(index, delta) {
		w.write_u8(op::IINC);
		w.write_u8(index as u8);
		w.write_i8(delta as i8);
	} else {
		w.write_u8(op::WIDE);
		w.write_u8(op::IINC);
		w.write_u16(index);
		w.write_i16(delta);
	}
}

fn emit_ldc(w: &mut Writer, index: PoolIndex, pool: &ConstPool) -> crate::error::Result<()> {
	let tag = pool.tag(index)?;
	if matches!(tag, "Long" | "Double") {
		w.write_u8(op::LDC2_W);
		w.write_u16(index);
	} else if index <= 255 {
		w.write_u8(op::LDC);
		w.write_u8(index as u8);
	} else {
		w.write_u8(op::LDC_W);
		w.write_u16(index);
	}
	Ok(())
}

fn branch_delta(offset: u32, target: Label, labels: &HashMap<Label, u32>) -> crate::error::Result<i32> {
	let target_offset = resolve(labels, target)?;
	Ok(target_offset as i32 - offset as i32)
}

/// Non-`goto_w`/`jsr_w` branches carry a 16-bit signed delta; a target too far away to reach with
/// one has no automatic upgrade path here (the instruction's opcode is fixed by construction, not
/// chosen by the writer), so it surfaces as a write-time error rather than silently truncating.
fn emit_jump(w: &mut Writer, offset: u32, opcode: u8, target: Label, labels: &HashMap<Label, u32>) -> crate::error::Result<()> {
	let delta = branch_delta(offset, target, labels)?;
	if opcode == op::GOTO_W || opcode == op::JSR_W {
		w.write_u8(opcode);
		w.write_i32(delta);
	} else {
		let narrow = i16::try_from(delta)
			.map_err(|_| anyhow::anyhow!("branch delta {delta} at offset {offset} does not fit a narrow jump; use goto_w/jsr_w"))?;
		w.write_u8(opcode);
		w.write_i16(narrow);
	}
	Ok(())
}

/// Writes the `verification_type_info` tag bytes of JVMS Table 4.7.4-A.
fn write_verification_type_info(w: &mut Writer, info: &VerificationTypeInfo, labels: &HashMap<Label, u32>) -> crate::error::Result<()> {
	match info {
		VerificationTypeInfo::Top => w.write_u8(0),
		VerificationTypeInfo::Integer => w.write_u8(1),
		VerificationTypeInfo::Float => w.write_u8(2),
		VerificationTypeInfo::Double => w.write_u8(3),
		VerificationTypeInfo::Long => w.write_u8(4),
		VerificationTypeInfo::Null => w.write_u8(5),
		VerificationTypeInfo::UninitializedThis => w.write_u8(6),
		VerificationTypeInfo::Object { class_index } => { w.write_u8(7); w.write_u16(*class_index); },
		VerificationTypeInfo::Uninitialized { new_label } => {
			w.write_u8(8);
			w.write_u16(resolve(labels, *new_label)? as u16);
		},
	}
	Ok(())
}

/// Encodes a `StackMapTable`'s frames (JVMS §4.7.4), deriving each entry's `offset_delta` from
/// consecutive targets' resolved offsets rather than from a stored delta — the same relationship
/// [`crate::reader`]'s `offset += offset_delta + if i == 0 { 0 } else { 1 }` accumulation rule
/// inverts on read.
fn write_stack_map_table(w: &mut Writer, frames: &[StackMapFrame], labels: &HashMap<Label, u32>) -> crate::error::Result<()> {
	w.write_usize_as_u16(frames.len())?;
	let mut previous_offset: Option<u32> = None;
	for frame in frames {
		let target_offset = resolve(labels, frame.target())?;
		let delta = match previous_offset {
			None => target_offset,
			Some(previous) => target_offset.checked_sub(previous + 1)
				.ok_or_else(|| anyhow::anyhow!("StackMapTable frames are out of order: {target_offset} does not follow {previous}"))?,
		};
		previous_offset = Some(target_offset);
		let delta = u16::try_from(delta).map_err(|_| anyhow::anyhow!("offset_delta {delta} does not fit a u16"))?;

		match frame {
			StackMapFrame::Same { .. } => {
				if delta <= 63 {
					w.write_u8(delta as u8);
				} else {
					w.write_u8(251);
					w.write_u16(delta);
				}
			},
			StackMapFrame::SameLocals1StackItem { stack, .. } => {
				if delta <= 63 {
					w.write_u8(64 + delta as u8);
				} else {
					w.write_u8(247);
					w.write_u16(delta);
				}
				write_verification_type_info(w, stack, labels)?;
			},
			StackMapFrame::Chop { k, .. } => {
				anyhow::ensure!((1..=3).contains(k), "StackMapFrame::Chop.k must be 1..=3, got {k}");
				w.write_u8(251 - k);
				w.write_u16(delta);
			},
			StackMapFrame::SameExtended { .. } => {
				w.write_u8(251);
				w.write_u16(delta);
			},
			StackMapFrame::Append { locals, .. } => {
				anyhow::ensure!((1..=3).contains(&locals.len()), "StackMapFrame::Append.locals must have 1..=3 entries, got {}", locals.len());
				w.write_u8(251 + locals.len() as u8);
				w.write_u16(delta);
				for local in locals {
					write_verification_type_info(w, local, labels)?;
				}
			},
			StackMapFrame::Full { locals, stack, .. } => {
				w.write_u8(255);
				w.write_u16(delta);
				w.write_usize_as_u16(locals.len())?;
				for local in locals {
					write_verification_type_info(w, local, labels)?;
				}
				w.write_usize_as_u16(stack.len())?;
				for item in stack {
					write_verification_type_info(w, item, labels)?;
				}
			},
		}
	}
	Ok(())
}

#[cfg(test)]
mod testing {
	use pretty_assertions::assert_eq;
	use crate::class::{AccessFlags, Member, Method};
	use crate::version::Version;
	use super::*;

	fn method_returning_void(pool: &mut ConstPool) -> Method {
		let name = pool.add_utf8("run");
		let desc = pool.add_utf8("()V");
		let mut member = Member::new(AccessFlags(AccessFlags::PUBLIC), name, desc);
		let mut code = Code::new(1, 1);
		code.instructions.push(Instruction::Zero(op::RETURN));
		member.attributes.push(Attribute::Code(code));
		Method(member)
	}

	#[test]
	fn var_width_picks_compact_form_for_small_indices() {
		assert_eq!(var_width(op::ILOAD, 0), 1);
		assert_eq!(var_width(op::ILOAD, 3), 1);
		assert_eq!(var_width(op::ILOAD, 4), 2);
		assert_eq!(var_width(op::ILOAD, 256), 4);
		assert_eq!(var_width(op::RET, 0), 2, "ret has no compact family");
	}

	#[test]
	fn compact_var_opcode_inverts_reader_uncompaction() {
		assert_eq!(compact_var_opcode(op::ILOAD, 2), Some(op::ILOAD_2));
		assert_eq!(compact_var_opcode(op::ASTORE, 1), Some(op::ASTORE_1));
		assert_eq!(compact_var_opcode(op::ILOAD, 4), None);
	}

	#[test]
	fn iinc_narrow_vs_wide() {
		assert!(iinc_is_narrow(255, 100));
		assert!(!iinc_is_narrow(256, 1));
		assert!(!iinc_is_narrow(1, 200));
	}

	#[test]
	fn switch_padding_aligns_to_four_bytes_after_opcode() {
		assert_eq!(switch_padding(0), 3);
		assert_eq!(switch_padding(1), 2);
		assert_eq!(switch_padding(2), 1);
		assert_eq!(switch_padding(3), 0);
		assert_eq!(switch_padding(4), 3);
	}

	#[test]
	fn ldc_picks_ldc2_w_for_wide_constants() -> anyhow::Result<()> {
		let mut pool = ConstPool::new();
		let int_index = pool.add_integer(42);
		let long_index = pool.add_long(42);
		assert_eq!(ldc_width(int_index, &pool)?, 2);
		assert_eq!(ldc_width(long_index, &pool)?, 3);
		Ok(())
	}

	#[test]
	fn layout_assigns_monotonic_offsets() {
		let pool = ConstPool::new();
		let mut code = Code::new(2, 1);
		code.instructions.push(Instruction::Zero(op::ICONST_0));
		code.instructions.push(Instruction::BiPush(5));
		code.instructions.push(Instruction::Zero(op::RETURN));
		let length = layout_method(&mut code, &pool).unwrap();
		assert_eq!(length, 1 + 2 + 1);

		let ids: Vec<NodeId> = code.instructions.iter().map(|(id, _)| id).collect();
		assert_eq!(code.instructions.offset_of(ids[0]), Some(0));
		assert_eq!(code.instructions.offset_of(ids[1]), Some(1));
		assert_eq!(code.instructions.offset_of(ids[2]), Some(3));
	}

	#[test]
	fn a_minimal_class_round_trips_through_the_reader() {
		let mut class = ClassFile::new(Version::V17, AccessFlags(AccessFlags::PUBLIC | AccessFlags::SUPER), "com/example/Trivial");
		class.super_class = Some(class.pool.add_class_name("java/lang/Object"));
		let method = method_returning_void(&mut class.pool);
		class.methods.push(method);

		let bytes = write_class(&mut class).expect("a trivial class should write cleanly");
		let read_back = crate::reader::read_class(&bytes).expect("the writer's own output must be readable");

		assert_eq!(read_back.this_class_name().unwrap(), class.this_class_name().unwrap());
		assert_eq!(read_back.methods.len(), 1);
		let code = read_back.methods[0].code().expect("method has a Code attribute");
		assert_eq!(code.instructions.len(), 1);
	}

	#[test]
	fn compute_size_matches_the_actual_write() {
		let mut class = ClassFile::new(Version::V17, AccessFlags(AccessFlags::PUBLIC | AccessFlags::SUPER), "com/example/Sized");
		let method = method_returning_void(&mut class.pool);
		class.methods.push(method);

		let expected = compute_size(&class).unwrap();
		let actual = write_class(&mut class.clone()).unwrap().len();
		assert_eq!(expected, actual);
	}

	#[test]
	fn a_branch_round_trips_its_target_offset() {
		let mut class = ClassFile::new(Version::V17, AccessFlags(AccessFlags::PUBLIC | AccessFlags::SUPER), "com/example/Loopy");
		let name = class.pool.add_utf8("loop");
		let desc = class.pool.add_utf8("()V");
		let mut member = Member::new(AccessFlags(AccessFlags::PUBLIC), name, desc);
		let mut code = Code::new(1, 1);
		let top = code.instructions.create_label();
		code.instructions.push(Instruction::Label(top));
		code.instructions.push(Instruction::Jump { opcode: op::GOTO, target: top });
		member.attributes.push(Attribute::Code(code));
		class.methods.push(Method(member));

		let bytes = write_class(&mut class).unwrap();
		let read_back = crate::reader::read_class(&bytes).unwrap();
		let code = read_back.methods[0].code().unwrap();
		let (_, jump) = code.instructions.iter().find(|(_, i)| matches!(i, Instruction::Jump { .. })).unwrap();
		match jump {
			Instruction::Jump { target, .. } => {
				let labels = label_offsets(code);
				assert_eq!(labels.get(target), Some(&0));
			},
			_ => unreachable!(),
		}
	}
}
