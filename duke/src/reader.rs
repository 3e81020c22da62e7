//! Component G: the class-file parser.
//!
//! Grounded in `duke`'s own `class_reader.rs`/`class_reader/labels.rs` control flow (magic,
//! version, pool, interfaces, fields, methods, attributes; the label-then-instruction two-pass
//! `Code` decode), with tree-building replaced by direct construction of [`crate::class`],
//! [`crate::code`], and [`crate::attribute`] values — there is no intermediate visitor to drive.

use std::collections::HashMap;
use crate::attribute::{Attribute, LineNumberEntry, LocalVariableEntry, StackMapFrame, VerificationTypeInfo};
use crate::buffer::Reader;
use crate::class::{AccessFlags, ClassFile, Code, Field, Member, Method};
use crate::code::{ArrayType, Exception, Instruction, Label, LabelRange};
use crate::error::Error;
use crate::inst_list::InstList;
use crate::opcode as op;
use crate::pool::{ConstPool, Entry, HandleKind, PoolIndex};
use crate::version::Version;

/// Host-supplied knobs for [`read_class_with_options`].
#[derive(Debug, Clone, Copy)]
pub struct ReadOptions {
	/// When `true` (the default), non-zero `tableswitch`/`lookupswitch` padding bytes are a hard
	/// [`Error::BadSwitchPadding`]. JVMS §6.5 itself does not require the padding content to be
	/// zero, only that it be skipped, so some third-party bytecode writers emit garbage there;
	/// setting this to `false` tolerates that instead of rejecting the class.
	pub strict_switch_padding: bool,
}

impl Default for ReadOptions {
	fn default() -> ReadOptions {
		ReadOptions { strict_switch_padding: true }
	}
}

/// Parses a class file with [`ReadOptions::default`].
pub fn read_class(bytes: &[u8]) -> Result<ClassFile, Error> {
	read_class_with_options(bytes, &ReadOptions::default())
}

/// Parses a class file per JVMS §4.1: magic, version, constant pool, access flags, this/super
/// class, interfaces, fields, methods, and class-level attributes.
pub fn read_class_with_options(bytes: &[u8], options: &ReadOptions) -> Result<ClassFile, Error> {
	let mut r = Reader::new(bytes);

	let magic = r.read_u32()?;
	if magic != 0xCAFE_BABE {
		return Err(Error::BadMagic { found: magic });
	}
	let minor = r.read_u16()?;
	let major = r.read_u16()?;
	let version = Version::new(major, minor);

	let mut pool = read_pool(&mut r)?;

	let access_flags = AccessFlags(r.read_u16()?);

	let this_class = r.read_u16()?;
	pool.get_class(this_class)?;

	let super_index = r.read_u16()?;
	let super_class = if super_index == 0 {
		None
	} else {
		pool.get_class(super_index)?;
		Some(super_index)
	};

	let interfaces: Vec<PoolIndex> = r.read_vec(|r| r.read_u16_as_usize(), |r| r.read_u16())?;
	for &index in &interfaces {
		pool.get_class(index)?;
	}

	let fields = r.read_vec(
		|r| r.read_u16_as_usize(),
		|r| -> anyhow::Result<Field> { Ok(Field(read_member(r, &mut pool, options)?)) },
	)?;
	let methods = r.read_vec(
		|r| r.read_u16_as_usize(),
		|r| -> anyhow::Result<Method> { Ok(Method(read_member(r, &mut pool, options)?)) },
	)?;

	let attribute_count = r.read_u16_as_usize()?;
	let mut attributes = Vec::with_capacity(attribute_count);
	for _ in 0..attribute_count {
		attributes.push(read_attribute(&mut r, &mut pool, options)?);
	}

	r.finish("class file")?;

	log::trace!("parsed class file version {}.{}, {} pool entries, {} field(s), {} method(s)",
		version.major, version.minor, pool.size(), fields.len(), methods.len());

	Ok(ClassFile { version, pool, access_flags, this_class, super_class, interfaces, fields, methods, attributes })
}

/// Reads the `constant_pool_count`-and-entries pair (JVMS §4.4), dispatching on tag byte.
/// `Long`/`Double` push a sentinel [`Entry::Empty`] at the following index and consume two
/// indices of the nominal count, exactly as [`ConstPool::push_raw`] expects.
fn read_pool(r: &mut Reader) -> Result<ConstPool, Error> {
	let count = r.read_u16()?;
	let mut pool = ConstPool::new();
	let mut index = 1u16;
	while index < count {
		let tag = r.read_u8()?;
		let entry = match tag {
			1 => {
				let len = r.read_u16_as_usize()?;
				let bytes = r.read_bytes(len)?;
				Entry::Utf8(crate::jstring::from_vec_to_string(bytes)?)
			},
			3 => Entry::Integer(r.read_i32()?),
			4 => Entry::Float(r.read_f32()?),
			5 => Entry::Long(r.read_i64()?),
			6 => Entry::Double(r.read_f64()?),
			7 => Entry::Class { name_index: r.read_u16()? },
			8 => Entry::String { string_index: r.read_u16()? },
			9 => Entry::Fieldref { class_index: r.read_u16()?, name_and_type_index: r.read_u16()? },
			10 => Entry::Methodref { class_index: r.read_u16()?, name_and_type_index: r.read_u16()? },
			11 => Entry::InterfaceMethodref { class_index: r.read_u16()?, name_and_type_index: r.read_u16()? },
			12 => Entry::NameAndType { name_index: r.read_u16()?, descriptor_index: r.read_u16()? },
			15 => {
				let kind = HandleKind::from_tag(r.read_u8()?)?;
				Entry::MethodHandle { kind, reference_index: r.read_u16()? }
			},
			16 => Entry::MethodType { descriptor_index: r.read_u16()? },
			17 => Entry::Dynamic { bootstrap_method_attr_index: r.read_u16()?, name_and_type_index: r.read_u16()? },
			18 => Entry::InvokeDynamic { bootstrap_method_attr_index: r.read_u16()?, name_and_type_index: r.read_u16()? },
			19 => Entry::Module { name_index: r.read_u16()? },
			20 => Entry::Package { name_index: r.read_u16()? },
			other => return Err(Error::AttrDecode {
				name: "ConstantPool".to_string(),
				reason: format!("unknown constant pool tag {other} at index {index}"),
			}),
		};
		let wide = entry.is_wide();
		pool.push_raw(entry);
		index += if wide { 2 } else { 1 };
	}
	Ok(pool)
}

fn read_member(r: &mut Reader, pool: &mut ConstPool, options: &ReadOptions) -> Result<Member, Error> {
	let access_flags = AccessFlags(r.read_u16()?);
	let name_index = r.read_u16()?;
	pool.get_utf8(name_index)?;
	let descriptor_index = r.read_u16()?;
	pool.get_utf8(descriptor_index)?;

	let mut member = Member::new(access_flags, name_index, descriptor_index);
	let attribute_count = r.read_u16_as_usize()?;
	for _ in 0..attribute_count {
		member.attributes.push(read_attribute(r, pool, options)?);
	}
	Ok(member)
}

/// Reads one class/field/method-level attribute. `Code` is the only variant with further
/// internal structure; everything this crate does not promote to a structured variant is kept
/// as an opaque [`Attribute::Unknown`] blob.
fn read_attribute(r: &mut Reader, pool: &mut ConstPool, options: &ReadOptions) -> Result<Attribute, Error> {
	let name_index = r.read_u16()?;
	let length = r.read_u32_as_usize()?;
	let mut body = r.sub_reader(length)?;
	let name = pool.get_utf8(name_index)?.as_bytes().to_vec();

	let attribute = match name.as_slice() {
		b"SourceFile" => {
			let sourcefile_index = body.read_u16()?;
			body.finish("SourceFile attribute")?;
			Attribute::SourceFile { sourcefile_index }
		},
		b"Exceptions" => {
			let exception_index_table = body.read_vec(|r| r.read_u16_as_usize(), |r| r.read_u16())?;
			body.finish("Exceptions attribute")?;
			Attribute::Exceptions { exception_index_table }
		},
		b"Code" => {
			let code = read_code(&mut body, pool, options)?;
			body.finish("Code attribute")?;
			Attribute::Code(code)
		},
		_ => {
			let bytes = body.read_bytes(body.remaining())?;
			Attribute::Unknown { name_index, bytes }
		},
	};
	Ok(attribute)
}

/// Assigns [`Label`]s to bytecode offsets on demand, minting each label's id from the owning
/// [`InstList`]'s own counter (the same id-space the frame computer mints synthetic `new`-site
/// labels from, see [`crate::frame`]) so every label, however it was created, is comparable.
#[derive(Default)]
struct LabelTable {
	by_offset: HashMap<u32, Label>,
}

impl LabelTable {
	fn get_or_create(&mut self, instructions: &mut InstList, offset: u32) -> Label {
		*self.by_offset.entry(offset).or_insert_with(|| instructions.create_label())
	}

	/// Looks up a label that a prior label-creation pass must already have registered.
	fn require(&self, offset: u32) -> Result<Label, Error> {
		self.by_offset.get(&offset).copied().ok_or_else(|| Error::AttrDecode {
			name: "Code".to_string(),
			reason: format!("no label registered for bytecode offset {offset}"),
		})
	}
}

/// Reads a `Code` attribute's body (JVMS §4.7.3): `max_stack`, `max_locals`, the code array
/// (decoded in a label-creation pass followed by an instruction-decode pass), the exception
/// table, and nested attributes.
fn read_code(body: &mut Reader, pool: &mut ConstPool, options: &ReadOptions) -> Result<Code, Error> {
	let max_stack = body.read_u16()?;
	let max_locals = body.read_u16()?;
	let code_length = body.read_u32_as_usize()?;
	if code_length == 0 || code_length > u16::MAX as usize {
		return Err(Error::AttrDecode {
			name: "Code".to_string(),
			reason: format!("code_length must be in 1..=65535, got {code_length}"),
		});
	}
	let bytecode = body.read_bytes(code_length)?;

	let mut code = Code::new(max_stack, max_locals);
	let mut labels = LabelTable::default();

	// Pass 1: walk the raw bytecode once, registering a label for every branch/switch target.
	{
		let mut r = Reader::new(&bytecode);
		while !r.is_empty() {
			let offset = r.position() as u32;
			scan_one(&mut r, offset, &mut code.instructions, &mut labels, options)?;
		}
	}

	// Exception table and nested attributes may reference additional offsets (handler bounds,
	// LineNumberTable/LocalVariableTable/StackMapTable targets); register those too before the
	// instruction pass, so every `Instruction::Label` that needs inserting is known up front.
	let instructions = &mut code.instructions;
	let exception_table = body.read_vec(
		|r| r.read_u16_as_usize(),
		|r| -> anyhow::Result<Exception> {
			let start = labels.get_or_create(instructions, r.read_u16()? as u32);
			let end = labels.get_or_create(instructions, r.read_u16()? as u32);
			let handler = labels.get_or_create(instructions, r.read_u16()? as u32);
			let catch_index = r.read_u16()?;
			let catch = if catch_index == 0 { None } else { pool.get_class(catch_index)?; Some(catch_index) };
			Ok(Exception { start, end, handler, catch })
		},
	)?;
	code.exception_table = exception_table;

	let attribute_count = body.read_u16_as_usize()?;
	for _ in 0..attribute_count {
		let attribute = read_code_attribute(body, pool, &mut code.instructions, &mut labels)?;
		code.attributes.push(attribute);
	}

	// Pass 2: walk the bytecode again, decoding instructions and inserting `Instruction::Label`
	// wherever pass 1 (or the exception table / nested attributes) registered one.
	{
		let mut r = Reader::new(&bytecode);
		while !r.is_empty() {
			let offset = r.position() as u32;
			if let Some(label) = labels.by_offset.get(&offset).copied() {
				code.instructions.push(Instruction::Label(label));
			}
			let instruction = decode_one(&mut r, offset, pool, &labels, options)?;
			code.instructions.push(instruction);
		}
	}
	// A label at the offset one past the last instruction (e.g. an exception range end, or a
	// LocalVariableTable range end, landing exactly at `code_length`) has nothing to attach to
	// during the walk above; place it after every decoded instruction instead.
	if let Some(label) = labels.by_offset.get(&(code_length as u32)).copied() {
		code.instructions.push(Instruction::Label(label));
	}

	Ok(code)
}

/// Aligns `r` to the next 4-byte boundary counted from the start of the method's bytecode
/// (JVMS §6.5 `tableswitch`/`lookupswitch`), enforcing zero padding unless
/// [`ReadOptions::strict_switch_padding`] is disabled.
fn align_to_4(r: &mut Reader, offset: u32, options: &ReadOptions) -> Result<(), Error> {
	let pad = (4 - (r.position() % 4)) % 4;
	for _ in 0..pad {
		let byte = r.read_u8()?;
		if byte != 0 {
			if options.strict_switch_padding {
				return Err(Error::BadSwitchPadding { offset });
			}
			log::debug!("non-zero switch padding byte at offset {offset} tolerated (strict_switch_padding is disabled)");
		}
	}
	Ok(())
}

fn branch_target(offset: u32, delta: i32) -> u32 {
	(offset as i64 + delta as i64) as u32
}

/// Pass 1: records every offset a branch, switch, or `new` could target, without yet decoding
/// full instructions. Mirrors `duke`'s original label pass, adapted to mint [`Label`]s eagerly
/// instead of deferring to a second lookup.
fn scan_one(r: &mut Reader, offset: u32, instructions: &mut InstList, labels: &mut LabelTable, options: &ReadOptions) -> Result<(), Error> {
	let opcode = r.read_u8()?;
	match opcode {
		op::NOP..=op::DCONST_1
		| op::ILOAD_0..=op::SALOAD
		| op::ISTORE_0..=op::LXOR
		| op::I2L..=op::DCMPG
		| op::IRETURN..=op::RETURN
		| op::ARRAYLENGTH | op::ATHROW | op::MONITORENTER | op::MONITOREXIT => {},

		op::BIPUSH | op::LDC | op::ILOAD..=op::ALOAD | op::ISTORE..=op::ASTORE | op::RET | op::NEWARRAY => {
			r.skip(1)?;
		},
		op::SIPUSH | op::LDC_W | op::LDC2_W | op::IINC
		| op::GETSTATIC..=op::INVOKESTATIC | op::NEW | op::ANEWARRAY | op::CHECKCAST | op::INSTANCEOF => {
			r.skip(2)?;
		},
		op::MULTIANEWARRAY => { r.skip(3)?; },
		op::INVOKEINTERFACE | op::INVOKEDYNAMIC => { r.skip(4)?; },

		op::WIDE => match r.read_u8()? {
			op::ILOAD..=op::ALOAD | op::ISTORE..=op::ASTORE | op::RET => { r.skip(2)?; },
			op::IINC => { r.skip(4)?; },
			wide_opcode => return Err(Error::UnknownOpcode { opcode: wide_opcode, offset }),
		},

		op::IFEQ..=op::JSR | op::IFNULL | op::IFNONNULL => {
			let delta = r.read_i16()?;
			labels.get_or_create(instructions, branch_target(offset, delta as i32));
		},
		op::GOTO_W | op::JSR_W => {
			let delta = r.read_i32()?;
			labels.get_or_create(instructions, branch_target(offset, delta));
		},

		op::TABLESWITCH => {
			align_to_4(r, offset, options)?;
			let default = r.read_i32()?;
			labels.get_or_create(instructions, branch_target(offset, default));
			let low = r.read_i32()?;
			let high = r.read_i32()?;
			if low > high {
				return Err(Error::AttrDecode { name: "Code".to_string(), reason: format!("tableswitch low ({low}) > high ({high})") });
			}
			for _ in 0..=(high - low) {
				let delta = r.read_i32()?;
				labels.get_or_create(instructions, branch_target(offset, delta));
			}
		},
		op::LOOKUPSWITCH => {
			align_to_4(r, offset, options)?;
			let default = r.read_i32()?;
			labels.get_or_create(instructions, branch_target(offset, default));
			let npairs = r.read_i32()?;
			if npairs < 0 {
				return Err(Error::AttrDecode { name: "Code".to_string(), reason: format!("lookupswitch npairs ({npairs}) is negative") });
			}
			for _ in 0..npairs {
				let _key = r.read_i32()?;
				let delta = r.read_i32()?;
				labels.get_or_create(instructions, branch_target(offset, delta));
			}
		},

		other => return Err(Error::UnknownOpcode { opcode: other, offset }),
	}
	Ok(())
}

/// Pass 2: decodes one instruction into its [`Instruction`] form, resolving branch/switch
/// operands against labels [`scan_one`] already registered.
fn decode_one(r: &mut Reader, offset: u32, pool: &ConstPool, labels: &LabelTable, options: &ReadOptions) -> Result<Instruction, Error> {
	let opcode = r.read_u8()?;
	Ok(match opcode {
		op::NOP..=op::DCONST_1
		| op::IALOAD..=op::SALOAD
		| op::IASTORE..=op::SWAP
		| op::IADD..=op::LXOR
		| op::I2L..=op::DCMPG
		| op::IRETURN..=op::RETURN
		| op::ARRAYLENGTH | op::ATHROW | op::MONITORENTER | op::MONITOREXIT => Instruction::Zero(opcode),

		op::ILOAD_0..=op::ALOAD_3 => {
			let shifted = opcode - op::ILOAD_0;
			let index = (shifted & 0b11) as u16;
			let base = op::ILOAD + (shifted >> 2);
			Instruction::Var { opcode: base, index }
		},
		op::ISTORE_0..=op::ASTORE_3 => {
			let shifted = opcode - op::ISTORE_0;
			let index = (shifted & 0b11) as u16;
			let base = op::ISTORE + (shifted >> 2);
			Instruction::Var { opcode: base, index }
		},
		op::ILOAD..=op::ALOAD | op::ISTORE..=op::ASTORE | op::RET => {
			Instruction::Var { opcode, index: r.read_u8_as_usize()? as u16 }
		},

		op::BIPUSH => Instruction::BiPush(r.read_i8()?),
		op::SIPUSH => Instruction::SiPush(r.read_i16()?),
		op::LDC => Instruction::Ldc(r.read_u8()? as PoolIndex),
		op::LDC_W | op::LDC2_W => Instruction::Ldc(r.read_u16()?),

		op::IINC => {
			let index = r.read_u8_as_usize()? as u16;
			let delta = r.read_i8()? as i16;
			Instruction::Iinc { index, delta }
		},

		op::IFEQ..=op::JSR | op::IFNULL | op::IFNONNULL => {
			let delta = r.read_i16()?;
			let target = labels.require(branch_target(offset, delta as i32))?;
			Instruction::Jump { opcode, target }
		},
		op::GOTO_W | op::JSR_W => {
			let delta = r.read_i32()?;
			let target = labels.require(branch_target(offset, delta))?;
			Instruction::Jump { opcode, target }
		},

		op::TABLESWITCH => {
			align_to_4(r, offset, options)?;
			let default = labels.require(branch_target(offset, r.read_i32()?))?;
			let low = r.read_i32()?;
			let high = r.read_i32()?;
			let mut targets = Vec::with_capacity((high - low + 1) as usize);
			for _ in 0..=(high - low) {
				let delta = r.read_i32()?;
				targets.push(labels.require(branch_target(offset, delta))?);
			}
			Instruction::TableSwitch { default, low, high, targets }
		},
		op::LOOKUPSWITCH => {
			align_to_4(r, offset, options)?;
			let default = labels.require(branch_target(offset, r.read_i32()?))?;
			let npairs = r.read_i32()?;
			let mut pairs = Vec::with_capacity(npairs.max(0) as usize);
			for _ in 0..npairs {
				let key = r.read_i32()?;
				let delta = r.read_i32()?;
				pairs.push((key, labels.require(branch_target(offset, delta))?));
			}
			Instruction::LookupSwitch { default, pairs }
		},

		op::GETSTATIC..=op::PUTFIELD => Instruction::Field { opcode, index: r.read_u16()? },
		op::INVOKEVIRTUAL..=op::INVOKESTATIC => Instruction::Invoke { opcode, index: r.read_u16()? },
		op::INVOKEINTERFACE => {
			let index = r.read_u16()?;
			let count = r.read_u8()?;
			let _reserved = r.read_u8()?;
			Instruction::InvokeInterface { index, count }
		},
		op::INVOKEDYNAMIC => {
			let index = r.read_u16()?;
			let _reserved = r.read_u16()?;
			Instruction::InvokeDynamic { index }
		},
		op::NEW | op::ANEWARRAY | op::CHECKCAST | op::INSTANCEOF => Instruction::Type { opcode, index: r.read_u16()? },
		op::NEWARRAY => Instruction::NewArray(ArrayType::from_atype(r.read_u8()?)?),
		op::MULTIANEWARRAY => {
			let index = r.read_u16()?;
			let dims = r.read_u8()?;
			Instruction::MultiANewArray { index, dims }
		},

		op::WIDE => match r.read_u8()? {
			wide_opcode @ (op::ILOAD..=op::ALOAD | op::ISTORE..=op::ASTORE | op::RET) => {
				Instruction::Var { opcode: wide_opcode, index: r.read_u16()? }
			},
			op::IINC => {
				let index = r.read_u16()?;
				let delta = r.read_i16()?;
				Instruction::Iinc { index, delta }
			},
			other => return Err(Error::UnknownOpcode { opcode: other, offset }),
		},

		other => return Err(Error::UnknownOpcode { opcode: other, offset }),
	})
}

enum FrameForm {
	Same,
	SameExtended,
	SameLocals1(VerificationTypeInfo),
	Chop(u8),
	Append(Vec<VerificationTypeInfo>),
	Full(Vec<VerificationTypeInfo>, Vec<VerificationTypeInfo>),
}

/// Reads a `Code`-nested attribute: `LineNumberTable`, `LocalVariableTable`, `StackMapTable`, or
/// an opaque blob. Unlike [`read_attribute`], these can reference bytecode offsets, so they're
/// threaded through the same [`LabelTable`] the instruction decode passes use.
fn read_code_attribute(body: &mut Reader, pool: &mut ConstPool, instructions: &mut InstList, labels: &mut LabelTable) -> Result<Attribute, Error> {
	let name_index = body.read_u16()?;
	let length = body.read_u32_as_usize()?;
	let mut inner = body.sub_reader(length)?;
	let name = pool.get_utf8(name_index)?.as_bytes().to_vec();

	match name.as_slice() {
		b"LineNumberTable" => {
			let entries = inner.read_vec(
				|r| r.read_u16_as_usize(),
				|r| -> anyhow::Result<LineNumberEntry> {
					let start_offset = r.read_u16()? as u32;
					let line_number = r.read_u16()?;
					let start = labels.get_or_create(instructions, start_offset);
					Ok(LineNumberEntry { start, line_number })
				},
			)?;
			inner.finish("LineNumberTable attribute")?;
			Ok(Attribute::LineNumberTable(entries))
		},
		b"LocalVariableTable" => {
			let entries = inner.read_vec(
				|r| r.read_u16_as_usize(),
				|r| -> anyhow::Result<LocalVariableEntry> {
					let start_pc = r.read_u16()? as u32;
					let len = r.read_u16()? as u32;
					let name_index = r.read_u16()?;
					let descriptor_index = r.read_u16()?;
					let index = r.read_u16()?;
					let start = labels.get_or_create(instructions, start_pc);
					let end = labels.get_or_create(instructions, start_pc + len);
					Ok(LocalVariableEntry { range: LabelRange { start, end }, name_index, descriptor_index, index })
				},
			)?;
			inner.finish("LocalVariableTable attribute")?;
			Ok(Attribute::LocalVariableTable(entries))
		},
		b"StackMapTable" => {
			let frames = read_stack_map_table(&mut inner, pool, instructions, labels)?;
			inner.finish("StackMapTable attribute")?;
			Ok(Attribute::StackMapTable(frames))
		},
		_ => {
			let bytes = inner.read_bytes(inner.remaining())?;
			Ok(Attribute::Unknown { name_index, bytes })
		},
	}
}

/// Reads a `StackMapTable` attribute's `entries` (JVMS §4.7.4): each entry's absolute target
/// offset accumulates from the previous entry's (`offset_delta`, plus one for every entry after
/// the first), exactly as the format's own delta encoding requires.
fn read_stack_map_table(r: &mut Reader, pool: &mut ConstPool, instructions: &mut InstList, labels: &mut LabelTable) -> Result<Vec<StackMapFrame>, Error> {
	let count = r.read_u16_as_usize()?;
	let mut frames = Vec::with_capacity(count);
	let mut offset: u32 = 0;
	for i in 0..count {
		let tag = r.read_u8()?;
		let (offset_delta, form) = match tag {
			0..=63 => (tag as u16, FrameForm::Same),
			64..=127 => {
				let stack = read_verification_type_info(r, pool, instructions, labels)?;
				((tag - 64) as u16, FrameForm::SameLocals1(stack))
			},
			128..=246 => return Err(Error::AttrDecode { name: "StackMapTable".to_string(), reason: format!("reserved frame type {tag}") }),
			247 => {
				let offset_delta = r.read_u16()?;
				let stack = read_verification_type_info(r, pool, instructions, labels)?;
				(offset_delta, FrameForm::SameLocals1(stack))
			},
			248..=250 => (r.read_u16()?, FrameForm::Chop(251 - tag)),
			251 => (r.read_u16()?, FrameForm::SameExtended),
			252..=254 => {
				let offset_delta = r.read_u16()?;
				let count = (tag - 251) as usize;
				let mut locals = Vec::with_capacity(count);
				for _ in 0..count {
					locals.push(read_verification_type_info(r, pool, instructions, labels)?);
				}
				(offset_delta, FrameForm::Append(locals))
			},
			255 => {
				let offset_delta = r.read_u16()?;
				let locals = r.read_vec(
					|r| r.read_u16_as_usize(),
					|r| -> anyhow::Result<VerificationTypeInfo> { Ok(read_verification_type_info(r, pool, instructions, labels)?) },
				)?;
				let stack = r.read_vec(
					|r| r.read_u16_as_usize(),
					|r| -> anyhow::Result<VerificationTypeInfo> { Ok(read_verification_type_info(r, pool, instructions, labels)?) },
				)?;
				(offset_delta, FrameForm::Full(locals, stack))
			},
		};
		offset += offset_delta as u32 + if i == 0 { 0 } else { 1 };
		let target = labels.get_or_create(instructions, offset);
		frames.push(match form {
			FrameForm::Same => StackMapFrame::Same { target },
			FrameForm::SameExtended => StackMapFrame::SameExtended { target },
			FrameForm::SameLocals1(stack) => StackMapFrame::SameLocals1StackItem { target, stack },
			FrameForm::Chop(k) => StackMapFrame::Chop { target, k },
			FrameForm::Append(locals) => StackMapFrame::Append { target, locals },
			FrameForm::Full(locals, stack) => StackMapFrame::Full { target, locals, stack },
		});
	}
	Ok(frames)
}

/// Reads one `verification_type_info` (JVMS §4.7.4, Table 4.7.4-A).
fn read_verification_type_info(r: &mut Reader, pool: &mut ConstPool, instructions: &mut InstList, labels: &mut LabelTable) -> Result<VerificationTypeInfo, Error> {
	Ok(match r.read_u8()? {
		0 => VerificationTypeInfo::Top,
		1 => VerificationTypeInfo::Integer,
		2 => VerificationTypeInfo::Float,
		3 => VerificationTypeInfo::Double,
		4 => VerificationTypeInfo::Long,
		5 => VerificationTypeInfo::Null,
		6 => VerificationTypeInfo::UninitializedThis,
		7 => {
			let class_index = r.read_u16()?;
			pool.get_class(class_index)?;
			VerificationTypeInfo::Object { class_index }
		},
		8 => {
			let new_label = labels.get_or_create(instructions, r.read_u16()? as u32);
			VerificationTypeInfo::Uninitialized { new_label }
		},
		other => return Err(Error::AttrDecode { name: "StackMapTable".to_string(), reason: format!("unknown verification_type_info tag {other}") }),
	})
}

#[cfg(test)]
mod testing {
	use pretty_assertions::assert_eq;
	use crate::class::AccessFlags as AF;
	use super::*;

	fn u16_be(v: u16) -> [u8; 2] {
		v.to_be_bytes()
	}
	fn u32_be(v: u32) -> [u8; 4] {
		v.to_be_bytes()
	}

	/// A minimal valid class file: `public class pkg/Foo extends java/lang/Object`, no fields,
	/// no methods, one `SourceFile` attribute.
	fn minimal_class_bytes() -> Vec<u8> {
		let mut bytes = Vec::new();
		bytes.extend_from_slice(&u32_be(0xCAFE_BABE));
		bytes.extend_from_slice(&u16_be(0)); // minor
		bytes.extend_from_slice(&u16_be(61)); // major (Java 17)

		// Constant pool: #1 Utf8 "pkg/Foo", #2 Class -> #1, #3 Utf8 "java/lang/Object",
		// #4 Class -> #3, #5 Utf8 "SourceFile", #6 Utf8 "Foo.java".
		bytes.extend_from_slice(&u16_be(7)); // constant_pool_count (6 entries + 1)
		bytes.push(1); bytes.extend_from_slice(&u16_be(7)); bytes.extend_from_slice(b"pkg/Foo");
		bytes.push(7); bytes.extend_from_slice(&u16_be(1));
		bytes.push(1); bytes.extend_from_slice(&u16_be(16)); bytes.extend_from_slice(b"java/lang/Object");
		bytes.push(7); bytes.extend_from_slice(&u16_be(3));
		bytes.push(1); bytes.extend_from_slice(&u16_be(10)); bytes.extend_from_slice(b"SourceFile");
		bytes.push(1); bytes.extend_from_slice(&u16_be(8)); bytes.extend_from_slice(b"Foo.java");

		bytes.extend_from_slice(&u16_be(AF::PUBLIC | AF::SUPER)); // access_flags
		bytes.extend_from_slice(&u16_be(2)); // this_class
		bytes.extend_from_slice(&u16_be(4)); // super_class
		bytes.extend_from_slice(&u16_be(0)); // interfaces_count
		bytes.extend_from_slice(&u16_be(0)); // fields_count
		bytes.extend_from_slice(&u16_be(0)); // methods_count

		bytes.extend_from_slice(&u16_be(1)); // attributes_count
		bytes.extend_from_slice(&u16_be(5)); // attribute_name_index -> "SourceFile"
		bytes.extend_from_slice(&u32_be(2)); // attribute_length
		bytes.extend_from_slice(&u16_be(6)); // sourcefile_index

		bytes
	}

	#[test]
	fn wrong_magic_is_rejected() {
		let bytes = [0x00, 0x00, 0x00, 0x00];
		let err = read_class(&bytes).unwrap_err();
		assert!(matches!(err, Error::BadMagic { found: 0 }));
	}

	#[test]
	fn truncated_header_is_an_error() {
		let bytes = [0xCA, 0xFE, 0xBA, 0xBE, 0x00];
		assert!(read_class(&bytes).is_err());
	}

	#[test]
	fn parses_minimal_class() {
		let bytes = minimal_class_bytes();
		let class = read_class(&bytes).unwrap();
		assert_eq!(class.version, Version::new(61, 0));
		assert_eq!(class.this_class_name().unwrap(), java_string::JavaStr::from_str("pkg/Foo"));
		assert_eq!(class.super_class_name().unwrap(), Some(java_string::JavaStr::from_str("java/lang/Object")));
		assert!(class.fields.is_empty());
		assert!(class.methods.is_empty());
		assert_eq!(class.attributes.len(), 1);
		assert!(matches!(class.attributes[0], Attribute::SourceFile { sourcefile_index: 6 }));
	}

	#[test]
	fn trailing_garbage_after_class_is_rejected() {
		let mut bytes = minimal_class_bytes();
		bytes.push(0xFF);
		assert!(read_class(&bytes).is_err());
	}

	/// A `Code` attribute body for: `ILOAD_0; IFEQ +8 (-> RETURN); ICONST_1; ISTORE_0; GOTO -6
	/// (-> ILOAD_0); RETURN`, i.e. a trivial loop — exercises branch targets both forward and
	/// backward, and a label shared by two different jump sites.
	fn looping_code_attribute_body() -> Vec<u8> {
		let mut code = Vec::new();
		code.push(op::ILOAD_0);               // 0: ILOAD_0
		code.push(op::IFEQ);                  // 1: IFEQ -> offset 9 (delta +8)
		code.extend_from_slice(&(8i16).to_be_bytes());
		code.push(op::ICONST_1);              // 4: ICONST_1
		code.push(op::ISTORE_0);              // 5: ISTORE_0
		code.push(op::GOTO);                  // 6: GOTO -> offset 0 (delta -6)
		code.extend_from_slice(&(-6i16).to_be_bytes());
		code.push(op::RETURN);                // 9: RETURN
		code
	}

	#[test]
	fn branch_targets_resolve_to_shared_labels() {
		let mut body = Vec::new();
		body.extend_from_slice(&u16_be(2)); // max_stack
		body.extend_from_slice(&u16_be(1)); // max_locals
		let code = looping_code_attribute_body();
		body.extend_from_slice(&u32_be(code.len() as u32));
		body.extend_from_slice(&code);
		body.extend_from_slice(&u16_be(0)); // exception_table_count
		body.extend_from_slice(&u16_be(0)); // attributes_count

		let mut pool = ConstPool::new();
		let options = ReadOptions::default();
		let mut r = Reader::new(&body);
		let parsed = read_code(&mut r, &mut pool, &options).unwrap();
		r.finish("code body").unwrap();

		let instructions: Vec<_> = parsed.instructions.iter().map(|(_, i)| i.clone()).collect();
		// Two `Instruction::Label` pseudo-instructions: one at offset 0 (GOTO's backward target)
		// and one at the IFEQ's forward target, both distinct from each other.
		let labels: Vec<Label> = instructions.iter().filter_map(|i| match i {
			Instruction::Label(l) => Some(*l),
			_ => None,
		}).collect();
		assert_eq!(labels.len(), 2);
		assert_ne!(labels[0], labels[1]);
	}

	#[test]
	fn strict_switch_padding_rejects_garbage() {
		// A method body containing just `tableswitch` with non-zero padding bytes.
		let mut code = vec![op::TABLESWITCH];
		code.extend_from_slice(&[0xAA, 0xAA, 0xAA]); // garbage padding (3 bytes to reach 4-alignment from offset 1)
		code.extend_from_slice(&u32_be(4)); // default delta (target offset is irrelevant to this test)
		code.extend_from_slice(&(0i32).to_be_bytes()); // low
		code.extend_from_slice(&(0i32).to_be_bytes()); // high (n=1)
		code.extend_from_slice(&u32_be(4)); // single target delta
		code.push(op::RETURN);

		let mut body = Vec::new();
		body.extend_from_slice(&u16_be(1));
		body.extend_from_slice(&u16_be(0));
		body.extend_from_slice(&u32_be(code.len() as u32));
		body.extend_from_slice(&code);
		body.extend_from_slice(&u16_be(0));
		body.extend_from_slice(&u16_be(0));

		let mut pool = ConstPool::new();
		let strict = ReadOptions { strict_switch_padding: true };
		let mut r = Reader::new(&body);
		assert!(matches!(read_code(&mut r, &mut pool, &strict), Err(Error::BadSwitchPadding { .. })));

		let lenient = ReadOptions { strict_switch_padding: false };
		let mut r = Reader::new(&body);
		assert!(read_code(&mut r, &mut pool, &lenient).is_ok());
	}

	/// A method whose `Code` attribute's exception table `catch_index` points at a `Utf8` entry
	/// instead of a `Class` entry. The bad index is read deep inside nested [`Reader::read_vec`]
	/// calls (methods -> attributes -> exception table); this asserts the resulting [`Error`]
	/// still surfaces as [`Error::WrongTag`] rather than collapsing into [`Error::Other`].
	#[test]
	fn typed_error_nested_in_exception_table_survives_as_its_own_variant() {
		let mut bytes = Vec::new();
		bytes.extend_from_slice(&u32_be(0xCAFE_BABE));
		bytes.extend_from_slice(&u16_be(0)); // minor
		bytes.extend_from_slice(&u16_be(61)); // major

		// #1 Utf8 "pkg/Foo", #2 Class -> #1, #3 Utf8 "java/lang/Object", #4 Class -> #3,
		// #5 Utf8 "m", #6 Utf8 "()V", #7 Utf8 "Code".
		bytes.extend_from_slice(&u16_be(8)); // constant_pool_count
		bytes.push(1); bytes.extend_from_slice(&u16_be(7)); bytes.extend_from_slice(b"pkg/Foo");
		bytes.push(7); bytes.extend_from_slice(&u16_be(1));
		bytes.push(1); bytes.extend_from_slice(&u16_be(16)); bytes.extend_from_slice(b"java/lang/Object");
		bytes.push(7); bytes.extend_from_slice(&u16_be(3));
		bytes.push(1); bytes.extend_from_slice(&u16_be(1)); bytes.extend_from_slice(b"m");
		bytes.push(1); bytes.extend_from_slice(&u16_be(3)); bytes.extend_from_slice(b"()V");
		bytes.push(1); bytes.extend_from_slice(&u16_be(4)); bytes.extend_from_slice(b"Code");

		bytes.extend_from_slice(&u16_be(AF::PUBLIC)); // access_flags
		bytes.extend_from_slice(&u16_be(2)); // this_class
		bytes.extend_from_slice(&u16_be(4)); // super_class
		bytes.extend_from_slice(&u16_be(0)); // interfaces_count
		bytes.extend_from_slice(&u16_be(0)); // fields_count

		bytes.extend_from_slice(&u16_be(1)); // methods_count
		bytes.extend_from_slice(&u16_be(AF::PUBLIC)); // method access_flags
		bytes.extend_from_slice(&u16_be(5)); // name_index -> "m"
		bytes.extend_from_slice(&u16_be(6)); // descriptor_index -> "()V"
		bytes.extend_from_slice(&u16_be(1)); // method attributes_count

		let code = [op::RETURN];
		let mut code_attribute_body = Vec::new();
		code_attribute_body.extend_from_slice(&u16_be(1)); // max_stack
		code_attribute_body.extend_from_slice(&u16_be(1)); // max_locals
		code_attribute_body.extend_from_slice(&u32_be(code.len() as u32));
		code_attribute_body.extend_from_slice(&code);
		code_attribute_body.extend_from_slice(&u16_be(1)); // exception_table_count
		code_attribute_body.extend_from_slice(&u16_be(0)); // start_pc
		code_attribute_body.extend_from_slice(&u16_be(1)); // end_pc
		code_attribute_body.extend_from_slice(&u16_be(0)); // handler_pc
		code_attribute_body.extend_from_slice(&u16_be(5)); // catch_index -> "m" (a Utf8, not a Class)
		code_attribute_body.extend_from_slice(&u16_be(0)); // code attributes_count

		bytes.extend_from_slice(&u16_be(7)); // attribute_name_index -> "Code"
		bytes.extend_from_slice(&u32_be(code_attribute_body.len() as u32));
		bytes.extend_from_slice(&code_attribute_body);

		bytes.extend_from_slice(&u16_be(0)); // class attributes_count

		let err = read_class(&bytes).unwrap_err();
		assert!(
			matches!(err, Error::WrongTag { index: 5, expected: "Class", found: "Utf8" }),
			"expected a classified Error::WrongTag, got {err:?}",
		);
	}
}
