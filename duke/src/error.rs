//! The public error type surfaced at the crate boundary.
//!
//! Internally, parsing and writing use [`anyhow::Result`] throughout (matching the rest of
//! this crate's plumbing), attaching context at every meaningful boundary (a field, a method,
//! an instruction offset). Wherever that `anyhow::Error` is converted back to this type — which
//! happens as soon as it crosses back into a function returning `Result<_, Error>`, including
//! at the outermost entry points ([`crate::reader::read_class`], [`crate::writer::write_class`])
//! — the `From<anyhow::Error>` impl below walks the chain for an `Error` that a deeper call
//! already classified (even one buried under `.context(...)`) and recovers it, so embedders (a
//! JVMTI agent host, in particular) can match on the *kind* of failure rather than parsing error
//! strings. Only a chain that never held a classified `Error` falls back to [`Error::Other`].

use thiserror::Error;

/// A distinct, surfaced-to-the-caller kind of failure in reading, computing frames for, or
/// writing a class file.
#[derive(Debug, Error)]
pub enum Error {
	/// The first four bytes of the input were not `0xCAFEBABE`.
	#[error("not a class file: expected magic 0xCAFEBABE, got {found:#010x}")]
	BadMagic { found: u32 },

	/// The reader ran out of bytes before it could satisfy a read.
	#[error("truncated input: {context}")]
	TruncatedInput { context: String },

	/// A reader was left with bytes unconsumed after a value it was meant to fully describe.
	#[error("trailing garbage: {context}")]
	TrailingGarbage { context: String },

	/// A constant pool index was zero, out of range, or pointed at an entry of the wrong tag.
	#[error("bad constant pool index {index}: {reason}")]
	BadCpIndex { index: u16, reason: String },

	/// A [`crate::pool::ConstPool::get`]-style accessor was used against an entry of a
	/// different tag than requested.
	#[error("wrong constant pool tag at index {index}: expected {expected}, got {found}")]
	WrongTag { index: u16, expected: &'static str, found: &'static str },

	/// An instruction byte that isn't in the JVM opcode table.
	#[error("unknown opcode {opcode:#04x} at bytecode offset {offset}")]
	UnknownOpcode { opcode: u8, offset: u32 },

	/// The padding bytes before a `tableswitch`/`lookupswitch` payload were not all zero.
	#[error("non-zero switch padding at bytecode offset {offset}")]
	BadSwitchPadding { offset: u32 },

	/// During stack-map computation, joining two frames produced a type that violates a
	/// structural invariant (e.g. a category-2 value landing on a slot holding a category-1
	/// value, or vice versa).
	#[error("cannot merge frames at label: {reason}")]
	FrameMerge { reason: String },

	/// `jsr`/`ret` was encountered while [`crate::frame::FrameComputeOptions`] is configured to
	/// refuse subroutines (the default).
	#[error("method uses jsr/ret, which this frame computer is configured to refuse")]
	UnsupportedSubroutines,

	/// A structured attribute's inner bytes were malformed.
	#[error("malformed {name} attribute: {reason}")]
	AttrDecode { name: String, reason: String },

	/// The caller-supplied allocator callback returned `None` for the writer's output buffer.
	#[error("allocator callback failed to provide a buffer of {requested} bytes")]
	OutOfMemory { requested: usize },

	/// Any failure that does not (yet) have a dedicated variant. Carries the original
	/// [`anyhow::Error`] chain for diagnostics.
	#[error(transparent)]
	Other(anyhow::Error),
}

impl Error {
	/// Clones every variant but [`Error::Other`] (whose payload isn't `Clone`), for recovering a
	/// classified variant that got buried under `.context(...)` calls while propagating as
	/// [`anyhow::Error`] (see the `From<anyhow::Error>` impl below).
	fn classified(&self) -> Option<Error> {
		match self {
			Error::BadMagic { found } => Some(Error::BadMagic { found: *found }),
			Error::TruncatedInput { context } => Some(Error::TruncatedInput { context: context.clone() }),
			Error::TrailingGarbage { context } => Some(Error::TrailingGarbage { context: context.clone() }),
			Error::BadCpIndex { index, reason } => Some(Error::BadCpIndex { index: *index, reason: reason.clone() }),
			Error::WrongTag { index, expected, found } => {
				Some(Error::WrongTag { index: *index, expected, found })
			},
			Error::UnknownOpcode { opcode, offset } => Some(Error::UnknownOpcode { opcode: *opcode, offset: *offset }),
			Error::BadSwitchPadding { offset } => Some(Error::BadSwitchPadding { offset: *offset }),
			Error::FrameMerge { reason } => Some(Error::FrameMerge { reason: reason.clone() }),
			Error::UnsupportedSubroutines => Some(Error::UnsupportedSubroutines),
			Error::AttrDecode { name, reason } => Some(Error::AttrDecode { name: name.clone(), reason: reason.clone() }),
			Error::OutOfMemory { requested } => Some(Error::OutOfMemory { requested: *requested }),
			Error::Other(_) => None,
		}
	}
}

/// Classifies an [`anyhow::Error`] chain into one of [`Error`]'s dedicated variants when one is
/// buried in it (typically under `.context(...)`/`.with_context(...)` calls added while
/// propagating out of a [`crate::buffer::Reader::read_vec`] element closure), falling back to
/// [`Error::Other`] only when the chain never held a classified [`Error`] to begin with.
impl From<anyhow::Error> for Error {
	fn from(err: anyhow::Error) -> Error {
		match err.chain().find_map(|cause| cause.downcast_ref::<Error>()?.classified()) {
			Some(classified) => classified,
			None => Error::Other(err),
		}
	}
}

pub(crate) type Result<T> = anyhow::Result<T>;
