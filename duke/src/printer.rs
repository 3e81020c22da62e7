//! Component K: human-readable class-file disassembly.
//!
//! Access flags space-joined in canonical order, a frame printed as `{ locals } [ stack ]`, one
//! line per constant pool entry and per instruction — the usual shape of a JVM class
//! disassembler, expressed here as Rust `Display` impls rather than stream-insertion overloads.
//!
//! Printing an instruction needs byte offsets, which only exist after a layout pass
//! ([`crate::writer::layout_method`]); since `Display::fmt` only borrows `&self`, [`ClassFile`]'s
//! impl below clones each method's `Code` and lays out the clone, the same clone-then-compute
//! trick [`crate::writer::compute_size`] uses for the same reason.

use std::fmt;

use crate::attribute::{Attribute, StackMapFrame, VerificationTypeInfo};
use crate::class::{AccessFlags, ClassFile, Code, Field, Method};
use crate::code::{Instruction, Label};
use crate::pool::{ConstPool, Entry, PoolIndex};
use crate::types::{Frame, Type};

/// Checks flag bits in a fixed order, including its bit collisions (e.g. `0x0020` prints as
/// `synchronized` even on a class, where the same bit means `ACC_SUPER`): this printer doesn't
/// disambiguate by position, matching how the JVM spec itself overlaps these bits.
impl fmt::Display for AccessFlags {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		const NAMES: &[(u16, &str)] = &[
			(AccessFlags::PUBLIC, "public"),
			(AccessFlags::PRIVATE, "private"),
			(AccessFlags::PROTECTED, "protected"),
			(AccessFlags::STATIC, "static"),
			(AccessFlags::FINAL, "final"),
			(AccessFlags::SYNCHRONIZED, "synchronized"),
			(AccessFlags::BRIDGE, "bridge"),
			(AccessFlags::VARARGS, "varargs"),
			(AccessFlags::NATIVE, "native"),
			(AccessFlags::ABSTRACT, "abstract"),
			(AccessFlags::STRICT, "strict"),
			(AccessFlags::SYNTHETIC, "synthetic"),
		];
		let mut first = true;
		for (bit, name) in NAMES {
			if self.contains(*bit) {
				if !first {
					write!(f, " ")?;
				}
				write!(f, "{name}")?;
				first = false;
			}
		}
		Ok(())
	}
}

/// Renders a frame as `{ locals } [ stack ]`.
impl fmt::Display for Frame {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{{ ")?;
		for (i, ty) in self.locals.iter().enumerate() {
			if i != 0 {
				write!(f, ", ")?;
			}
			write!(f, "{i}: {ty}")?;
		}
		write!(f, " }} [ ")?;
		for (i, ty) in self.stack.iter().enumerate() {
			if i != 0 {
				write!(f, " | ")?;
			}
			write!(f, "{ty}")?;
		}
		write!(f, " ]")
	}
}

impl fmt::Display for Type {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Type::Top => write!(f, "Top"),
			Type::Integer => write!(f, "Int"),
			Type::Long => write!(f, "Long"),
			Type::Float => write!(f, "Float"),
			Type::Double => write!(f, "Double"),
			Type::Null => write!(f, "Null"),
			Type::UninitializedThis => write!(f, "UninitializedThis"),
			Type::Object(name) => write!(f, "Ref: {name}"),
			Type::Uninitialized(label) => write!(f, "Uninitialized: {}", label.0),
		}
	}
}

fn format_entry(pool: &ConstPool, entry: &Entry) -> String {
	match entry {
		Entry::Utf8(s) => s.to_string(),
		Entry::Integer(v) => v.to_string(),
		Entry::Float(v) => v.to_string(),
		Entry::Long(v) => v.to_string(),
		Entry::Double(v) => v.to_string(),
		Entry::Class { name_index } => format!("{}#{name_index}", pool.get_utf8(*name_index).map(|s| s.to_string()).unwrap_or_default()),
		Entry::String { string_index } => format!("{}#{string_index}", pool.get_utf8(*string_index).map(|s| s.to_string()).unwrap_or_default()),
		Entry::Fieldref { class_index, name_and_type_index } => format!("#{class_index}.#{name_and_type_index}"),
		Entry::Methodref { class_index, name_and_type_index } => format!("#{class_index}.#{name_and_type_index}"),
		Entry::InterfaceMethodref { class_index, name_and_type_index } => format!("#{class_index}.#{name_and_type_index}"),
		Entry::NameAndType { name_index, descriptor_index } => format!("#{name_index}:#{descriptor_index}"),
		Entry::MethodHandle { kind, reference_index } => format!("{kind:?} #{reference_index}"),
		Entry::MethodType { descriptor_index } => format!("#{descriptor_index}"),
		Entry::Dynamic { bootstrap_method_attr_index, name_and_type_index } => format!("#{bootstrap_method_attr_index}.#{name_and_type_index}"),
		Entry::InvokeDynamic { bootstrap_method_attr_index, name_and_type_index } => format!("#{bootstrap_method_attr_index}.#{name_and_type_index}"),
		Entry::Module { name_index } => format!("#{name_index}"),
		Entry::Package { name_index } => format!("#{name_index}"),
		Entry::Empty => "-".to_string(),
	}
}

fn label_offset(labels: &std::collections::HashMap<Label, u32>, label: Label) -> String {
	match labels.get(&label) {
		Some(offset) => offset.to_string(),
		None => "?".to_string(),
	}
}

fn format_verification_type(ty: &VerificationTypeInfo, labels: &std::collections::HashMap<Label, u32>) -> String {
	match ty {
		VerificationTypeInfo::Top => "top".to_string(),
		VerificationTypeInfo::Integer => "integer".to_string(),
		VerificationTypeInfo::Float => "float".to_string(),
		VerificationTypeInfo::Long => "long".to_string(),
		VerificationTypeInfo::Double => "double".to_string(),
		VerificationTypeInfo::Null => "null".to_string(),
		VerificationTypeInfo::UninitializedThis => "UninitializedThis".to_string(),
		VerificationTypeInfo::Object { class_index } => format!("Object: cpindex = {class_index}"),
		VerificationTypeInfo::Uninitialized { new_label } => format!("Uninitialized: offset = {}", label_offset(labels, *new_label)),
	}
}

fn format_stack_map_frame(frame: &StackMapFrame, labels: &std::collections::HashMap<Label, u32>) -> String {
	let offset = label_offset(labels, frame.target());
	match frame {
		StackMapFrame::Same { .. } => format!("offset = {offset} same_frame"),
		StackMapFrame::SameLocals1StackItem { stack, .. } => {
			format!("offset = {offset} same_locals_1_stack_item_frame. {}", format_verification_type(stack, labels))
		},
		StackMapFrame::Chop { k, .. } => format!("offset = {offset} chop_frame, k = {k}"),
		StackMapFrame::SameExtended { .. } => format!("offset = {offset} same_frame_extended"),
		StackMapFrame::Append { locals, .. } => {
			let locals = locals.iter().map(|t| format_verification_type(t, labels)).collect::<Vec<_>>().join(" | ");
			format!("offset = {offset} append_frame, locals = [ {locals} ]")
		},
		StackMapFrame::Full { locals, stack, .. } => {
			let locals = locals.iter().map(|t| format_verification_type(t, labels)).collect::<Vec<_>>().join(" | ");
			let stack = stack.iter().map(|t| format_verification_type(t, labels)).collect::<Vec<_>>().join(" | ");
			format!("offset = {offset} full_frame, locals = [ {locals} ], stack = [ {stack} ]")
		},
	}
}

/// Prints one instruction on its own line: an offset, the opcode number, and the mnemonic,
/// followed by whatever operand the instruction carries.
fn format_instruction(pool: &ConstPool, code: &Code, id: crate::inst_list::NodeId, labels: &std::collections::HashMap<Label, u32>) -> String {
	let instruction = code.instructions.get(id);
	if let Instruction::Label(label) = instruction {
		return format!("label: {}", label_offset(labels, *label));
	}
	let offset = code.instructions.offset_of(id).map(|o| o.to_string()).unwrap_or_else(|| "?".to_string());
	let head = format!("{offset:>4}: {}", instruction.mnemonic());
	match instruction {
		Instruction::Zero(_) => head,
		Instruction::BiPush(v) => format!("{head} {v}"),
		Instruction::SiPush(v) => format!("{head} {v}"),
		Instruction::Ldc(index) => format!("{head} #{index}"),
		Instruction::Var { index, .. } => format!("{head} {index}"),
		Instruction::Iinc { index, delta } => format!("{head} {index} {delta}"),
		Instruction::Jump { target, .. } => format!("{head} label: {}", label_offset(labels, *target)),
		Instruction::TableSwitch { default, low, high, targets } => {
			let targets = targets.iter().map(|t| label_offset(labels, *t)).collect::<Vec<_>>().join(" ");
			format!("{head} default: {}, from: {low} {high}: {targets}", label_offset(labels, *default))
		},
		Instruction::LookupSwitch { default, pairs } => {
			let pairs = pairs.iter().map(|(k, t)| format!("{k} -> {}", label_offset(labels, *t))).collect::<Vec<_>>().join(" ");
			format!("{head} default: {} {}: {pairs}", label_offset(labels, *default), pairs.len())
		},
		Instruction::Field { index, .. } => format!("{head} #{index}"),
		Instruction::Invoke { index, .. } => format!("{head} #{index}"),
		Instruction::InvokeInterface { index, count } => format!("{head} #{index} ({count})"),
		Instruction::InvokeDynamic { index } => format!("{head} #{index}"),
		Instruction::Type { index, .. } => {
			let name = pool.get_class_name(*index).map(|s| s.to_string()).unwrap_or_default();
			format!("{head} {name}")
		},
		Instruction::NewArray(atype) => format!("{head} {atype:?}"),
		Instruction::MultiANewArray { index, dims } => {
			let name = pool.get_class_name(*index).map(|s| s.to_string()).unwrap_or_default();
			format!("{head} {name} {dims}")
		},
		Instruction::Label(_) => unreachable!("handled above"),
	}
}

/// Prints one attribute. `labels` resolves `Label`s belonging to the `Code` this attribute is
/// nested in (empty for an attribute that isn't Code-nested — `LineNumberTable`,
/// `LocalVariableTable` and `StackMapTable` never appear outside a `Code`'s own attribute list,
/// but `Attribute` is one flat enum shared by every position, so the type system doesn't rule it
/// out).
fn format_attribute(pool: &ConstPool, attribute: &Attribute, indent: &str, labels: &std::collections::HashMap<Label, u32>, f: &mut fmt::Formatter<'_>) -> fmt::Result {
	match attribute {
		Attribute::SourceFile { sourcefile_index } => {
			let name = pool.get_utf8(*sourcefile_index).map(|s| s.to_string()).unwrap_or_default();
			writeln!(f, "{indent}Source file: {name}#{sourcefile_index}")
		},
		Attribute::Exceptions { exception_index_table } => {
			for index in exception_index_table {
				let name = pool.get_class_name(*index).map(|s| s.to_string()).unwrap_or_default();
				writeln!(f, "{indent}Exceptions entry: '{name}'#{index}")?;
			}
			Ok(())
		},
		Attribute::LineNumberTable(entries) => {
			for entry in entries {
				writeln!(f, "{indent}LineNumberTable entry: start: {}, line: {}", label_offset(labels, entry.start), entry.line_number)?;
			}
			Ok(())
		},
		Attribute::LocalVariableTable(entries) => {
			for entry in entries {
				writeln!(
					f,
					"{indent}LocalVariableTable entry: start: {}, end: {}, slot {}, name #{}, descriptor #{}",
					label_offset(labels, entry.range.start), label_offset(labels, entry.range.end),
					entry.index, entry.name_index, entry.descriptor_index,
				)?;
			}
			Ok(())
		},
		Attribute::StackMapTable(frames) => {
			writeln!(f, "{indent}Stack map table:")?;
			for frame in frames {
				writeln!(f, "{indent}  {}", format_stack_map_frame(frame, labels))?;
			}
			Ok(())
		},
		Attribute::Unknown { name_index, bytes } => {
			let name = pool.get_utf8(*name_index).map(|s| s.to_string()).unwrap_or_default();
			writeln!(f, "{indent}Attribute unknown '{name}'#{name_index} [{}]", bytes.len())
		},
		Attribute::Code(_) => Ok(()),
	}
}

fn format_method(pool: &ConstPool, method: &Method, f: &mut fmt::Formatter<'_>) -> fmt::Result {
	let member = &method.0;
	let name = pool.get_utf8(member.name_index).map(|s| s.to_string()).unwrap_or_default();
	let descriptor = pool.get_utf8(member.descriptor_index).map(|s| s.to_string()).unwrap_or_default();
	writeln!(f, "  +Method {} {name}: #{} {descriptor}#{}", member.access_flags, member.name_index, member.descriptor_index)?;
	for attribute in &member.attributes {
		if let Attribute::Code(code) = attribute {
			let mut code = code.clone();
			crate::writer::layout_method(&mut code, pool).map_err(|_| fmt::Error)?;
			let labels = crate::writer::label_offsets(&code);
			writeln!(f, "    maxStack: {}, maxLocals: {}", code.max_stack, code.max_locals)?;
			for (id, _) in code.instructions.iter() {
				writeln!(f, "    {}", format_instruction(pool, &code, id, &labels))?;
			}
			for exception in &code.exception_table {
				writeln!(f, "    exception entry: start: {}, end: {}, handler: {}", label_offset(&labels, exception.start), label_offset(&labels, exception.end), label_offset(&labels, exception.handler))?;
			}
			for nested in &code.attributes {
				format_attribute(pool, nested, "    ", &labels, f)?;
			}
		} else {
			format_attribute(pool, attribute, "    ", &std::collections::HashMap::new(), f)?;
		}
	}
	Ok(())
}

fn format_field(pool: &ConstPool, field: &Field, f: &mut fmt::Formatter<'_>) -> fmt::Result {
	let member = &field.0;
	let name = pool.get_utf8(member.name_index).map(|s| s.to_string()).unwrap_or_default();
	let descriptor = pool.get_utf8(member.descriptor_index).map(|s| s.to_string()).unwrap_or_default();
	writeln!(f, "  Field {name}: {} #{}: {descriptor}#{}", member.access_flags, member.name_index, member.descriptor_index)?;
	for attribute in &member.attributes {
		format_attribute(pool, attribute, "    ", &std::collections::HashMap::new(), f)?;
	}
	Ok(())
}

/// The full disassembly of a class: version, constant pool, access flags, superclass,
/// interfaces, fields, methods, and class-level attributes.
impl fmt::Display for ClassFile {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let this_name = self.this_class_name().map(|s| s.to_string()).unwrap_or_default();
		writeln!(f, "{} class {this_name}#{}", self.access_flags, self.this_class)?;
		writeln!(f, "  Version: {}.{}", self.version.major, self.version.minor)?;

		writeln!(f, "  Constant Pool [{}]", self.pool.size())?;
		for (index, entry) in self.pool.iter() {
			writeln!(f, "    #{index} [{}]: {}", entry.tag_name(), format_entry(&self.pool, entry))?;
		}

		match self.super_class_name() {
			Ok(Some(name)) => writeln!(f, "  superClassIndex: {name}#{}", self.super_class.unwrap_or_default())?,
			_ => writeln!(f, "  superClassIndex: #0")?,
		}

		writeln!(f, "  Interfaces [{}]", self.interfaces.len())?;
		for index in &self.interfaces {
			let name = self.pool.get_class_name(*index).map(|s| s.to_string()).unwrap_or_default();
			writeln!(f, "    Interface '{name}'#{index}")?;
		}

		writeln!(f, "  Fields [{}]", self.fields.len())?;
		for field in &self.fields {
			format_field(&self.pool, field, f)?;
		}

		writeln!(f, "  Methods [{}]", self.methods.len())?;
		for method in &self.methods {
			format_method(&self.pool, method, f)?;
		}

		for attribute in &self.attributes {
			format_attribute(&self.pool, attribute, "  ", &std::collections::HashMap::new(), f)?;
		}

		Ok(())
	}
}

#[cfg(test)]
mod testing {
	use crate::class::{AccessFlags, Method, Member};
	use crate::version::Version;
	use super::*;

	#[test]
	fn access_flags_join_in_canonical_order() {
		let flags = AccessFlags(AccessFlags::PUBLIC | AccessFlags::STATIC | AccessFlags::FINAL);
		assert_eq!(flags.to_string(), "public static final");
	}

	#[test]
	fn frame_prints_locals_then_stack() {
		let frame = Frame { locals: vec![Type::Integer], stack: vec![Type::Long, Type::Top] };
		assert_eq!(frame.to_string(), "{ 0: Int } [ Long | Top ]");
	}

	#[test]
	fn a_minimal_class_dumps_without_panicking() {
		let mut class = ClassFile::new(Version::V17, AccessFlags(AccessFlags::PUBLIC), "com/example/Trivial");
		class.super_class = Some(class.pool.add_class_name("java/lang/Object"));
		let name_index = class.pool.add_utf8("run");
		let descriptor_index = class.pool.add_utf8("()V");
		let mut method = Method(Member::new(AccessFlags(AccessFlags::PUBLIC), name_index, descriptor_index));
		let mut code = Code::new(1, 1);
		code.instructions.push(Instruction::Zero(crate::opcode::RETURN));
		method.0.attributes.push(Attribute::Code(code));
		class.methods.push(method);

		let dump = class.to_string();
		assert!(dump.contains("class com/example/Trivial"));
		assert!(dump.contains("return"));
	}
}
