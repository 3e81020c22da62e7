//! Component D: instruction payloads and symbolic labels.
//!
//! Mirrors `duke`'s own `tree::method::code::Instruction` (a tagged sum with a variant per
//! instruction shape) but payloads carry raw constant-pool indices and local-variable indices
//! instead of `duke`'s resolved `ClassName`/`FieldRef`/`MethodRef` values — the pool stays an
//! explicit, addressable table rather than being hidden behind a semantic tree.
//!
//! `Var`/`Iinc` always store a 16-bit local-variable index; whether the writer emits the
//! compact `iload_1`-style form, the one-byte-operand form, or a `wide`-prefixed 16-bit-operand
//! form is purely an encoding choice made during [`crate::writer`]'s layout pass, alongside
//! `ldc` vs `ldc_w` selection. This keeps the instruction model one shape smaller than the raw
//! bytecode without losing any information the model needs to carry.

use crate::pool::PoolIndex;

/// A symbolic id identifying a bytecode offset, assigned by a [`crate::inst_list::InstList`]'s
/// per-list counter. Never carries a byte offset itself; layout computes and records those
/// separately (see [`crate::inst_list::InstList::offset_of`]).
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Label(pub(crate) u32);

/// A `[start, end)` range of bytecode offsets, expressed as two labels.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct LabelRange {
	pub start: Label,
	pub end: Label,
}

/// An exception-table entry: `catch` is `None` for a `finally`-style catch-all (JVMS encodes
/// this as `catch_type = 0`).
#[derive(Debug, Clone, PartialEq)]
pub struct Exception {
	pub start: Label,
	pub end: Label,
	pub handler: Label,
	pub catch: Option<PoolIndex>,
}

/// The primitive element type operand of `newarray` (JVMS Table 6.5.newarray-A).
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ArrayType {
	Boolean,
	Char,
	Float,
	Double,
	Byte,
	Short,
	Int,
	Long,
}

impl ArrayType {
	pub(crate) fn from_atype(atype: u8) -> anyhow::Result<ArrayType> {
		use crate::opcode::atype::*;
		Ok(match atype {
			T_BOOLEAN => ArrayType::Boolean,
			T_CHAR => ArrayType::Char,
			T_FLOAT => ArrayType::Float,
			T_DOUBLE => ArrayType::Double,
			T_BYTE => ArrayType::Byte,
			T_SHORT => ArrayType::Short,
			T_INT => ArrayType::Int,
			T_LONG => ArrayType::Long,
			_ => anyhow::bail!("unknown newarray atype {atype:#x}"),
		})
	}
	pub(crate) fn to_atype(self) -> u8 {
		use crate::opcode::atype::*;
		match self {
			ArrayType::Boolean => T_BOOLEAN,
			ArrayType::Char => T_CHAR,
			ArrayType::Float => T_FLOAT,
			ArrayType::Double => T_DOUBLE,
			ArrayType::Byte => T_BYTE,
			ArrayType::Short => T_SHORT,
			ArrayType::Int => T_INT,
			ArrayType::Long => T_LONG,
		}
	}
}

/// A category of local-variable/field-reference/invoke opcode family, carried alongside an
/// operand so the writer and disassembler know exactly which mnemonic to use without having to
/// re-derive it from context.
pub type RawOpcode = u8;

/// Represents a single JVM bytecode instruction (or the [`Instruction::Label`] pseudo-instruction
/// marking a branch target) as a tagged sum, matched on directly rather than through a class
/// hierarchy requiring double dispatch.
#[derive(Debug, Clone, PartialEq)]
pub enum Instruction {
	/// An instruction with no operands at all: `nop`, `aconst_null`, the `iconst_*`/`lconst_*`/
	/// `fconst_*`/`dconst_*` family, array load/store, stack shuffling (`pop`/`dup`/`swap`/...),
	/// arithmetic, comparisons, widening/narrowing conversions, `return`-family, `arraylength`,
	/// `athrow`, `monitorenter`/`monitorexit`.
	Zero(RawOpcode),
	BiPush(i8),
	SiPush(i16),
	/// `ldc`/`ldc_w`/`ldc2_w`, unified: which width the writer uses depends only on the
	/// referenced pool entry's category and on whether the index fits in a byte.
	Ldc(PoolIndex),
	/// A local-variable load or store: `iload`/`lload`/`fload`/`dload`/`aload`/`istore`/`lstore`/
	/// `fstore`/`dstore`/`astore`/`ret`, compact forms included.
	Var { opcode: RawOpcode, index: u16 },
	Iinc { index: u16, delta: i16 },
	/// A conditional or unconditional branch: `ifeq`..`if_acmpne`, `goto`, `goto_w`, `jsr`,
	/// `jsr_w`, `ifnull`, `ifnonnull`.
	Jump { opcode: RawOpcode, target: Label },
	TableSwitch {
		default: Label,
		low: i32,
		high: i32,
		targets: Vec<Label>,
	},
	LookupSwitch {
		default: Label,
		/// Must be sorted ascending by key (JVMS §6.5 `lookupswitch`).
		pairs: Vec<(i32, Label)>,
	},
	/// `getstatic`/`putstatic`/`getfield`/`putfield`.
	Field { opcode: RawOpcode, index: PoolIndex },
	/// `invokevirtual`/`invokespecial`/`invokestatic`.
	Invoke { opcode: RawOpcode, index: PoolIndex },
	InvokeInterface { index: PoolIndex, count: u8 },
	InvokeDynamic { index: PoolIndex },
	/// `new`/`anewarray`/`checkcast`/`instanceof`, each referencing a `Class` pool entry.
	Type { opcode: RawOpcode, index: PoolIndex },
	NewArray(ArrayType),
	MultiANewArray { index: PoolIndex, dims: u8 },
	/// A pseudo-instruction marking a branch target; contributes zero bytes to layout.
	Label(Label),
}

impl Instruction {
	/// A short, stable name for the instruction's kind, used by the disassembler and by error
	/// messages. Does not disambiguate the exact opcode within a family (see
	/// [`Instruction::mnemonic`] for that).
	pub(crate) fn kind_name(&self) -> &'static str {
		match self {
			Instruction::Zero(_) => "zero",
			Instruction::BiPush(_) => "bipush",
			Instruction::SiPush(_) => "sipush",
			Instruction::Ldc(_) => "ldc",
			Instruction::Var { .. } => "var",
			Instruction::Iinc { .. } => "iinc",
			Instruction::Jump { .. } => "jump",
			Instruction::TableSwitch { .. } => "tableswitch",
			Instruction::LookupSwitch { .. } => "lookupswitch",
			Instruction::Field { .. } => "field",
			Instruction::Invoke { .. } => "invoke",
			Instruction::InvokeInterface { .. } => "invokeinterface",
			Instruction::InvokeDynamic { .. } => "invokedynamic",
			Instruction::Type { .. } => "type",
			Instruction::NewArray(_) => "newarray",
			Instruction::MultiANewArray { .. } => "multianewarray",
			Instruction::Label(_) => "label",
		}
	}

	/// The exact JVMS §6.5 mnemonic for this instruction, disambiguating within a family by the
	/// opcode byte it actually carries (a compact local-variable form is an encoding choice made
	/// later, in [`crate::writer`], so this always reports the family's canonical opcode, e.g.
	/// `iload` rather than `iload_1`).
	pub(crate) fn mnemonic(&self) -> &'static str {
		match self {
			Instruction::Zero(opcode)
			| Instruction::Var { opcode, .. }
			| Instruction::Jump { opcode, .. }
			| Instruction::Field { opcode, .. }
			| Instruction::Invoke { opcode, .. }
			| Instruction::Type { opcode, .. } => crate::opcode::mnemonic_for(*opcode),
			Instruction::BiPush(_) => "bipush",
			Instruction::SiPush(_) => "sipush",
			Instruction::Ldc(_) => "ldc",
			Instruction::Iinc { .. } => "iinc",
			Instruction::TableSwitch { .. } => "tableswitch",
			Instruction::LookupSwitch { .. } => "lookupswitch",
			Instruction::InvokeInterface { .. } => "invokeinterface",
			Instruction::InvokeDynamic { .. } => "invokedynamic",
			Instruction::NewArray(_) => "newarray",
			Instruction::MultiANewArray { .. } => "multianewarray",
			Instruction::Label(_) => "label",
		}
	}
}

#[cfg(test)]
mod testing {
	use super::*;

	#[test]
	fn mnemonic_disambiguates_the_family_member() {
		assert_eq!(Instruction::Zero(crate::opcode::RETURN).mnemonic(), "return");
		assert_eq!(Instruction::Var { opcode: crate::opcode::ILOAD, index: 1 }.mnemonic(), "iload");
	}

	#[test]
	fn kind_name_is_stable_across_a_family() {
		assert_eq!(Instruction::Jump { opcode: crate::opcode::GOTO, target: Label(0) }.kind_name(), "jump");
		assert_eq!(Instruction::Jump { opcode: crate::opcode::IFEQ, target: Label(0) }.kind_name(), "jump");
	}
}
