//! Component I: the type lattice used by the frame computer.
//!
//! The tag set mirrors [`crate::attribute::VerificationTypeInfo`] one-for-one, matching the
//! verification-type handling a JVM verifier's join rule uses; the difference is that `Type`
//! additionally carries resolved class *names* (not just pool indices) so the join rule can call
//! into a [`crate::hierarchy::ClassPath`] oracle without a pool handle in scope.

use java_string::JavaString;
use crate::code::Label;

/// A single local-variable-slot or operand-stack-slot type, as used internally by the frame
/// computer (component J). Converted to/from [`crate::attribute::VerificationTypeInfo`] when a
/// `StackMapTable` is read or emitted.
#[derive(Debug, Clone, PartialEq)]
pub enum Type {
	Top,
	Integer,
	Float,
	Long,
	Double,
	Null,
	UninitializedThis,
	/// A reference type, named by its internal binary class name (JVMS §4.2.1).
	Object(JavaString),
	/// An object produced by a `new` at the given label, not yet initialized by a constructor
	/// call. Becomes [`Type::Object`] once the matching `invokespecial <init>` runs.
	Uninitialized(Label),
}

impl Type {
	/// Category-2 types (`long`, `double`) occupy two consecutive local-variable/operand-stack
	/// slots; the second slot always holds [`Type::Top`].
	pub fn is_category_2(&self) -> bool {
		matches!(self, Type::Long | Type::Double)
	}

	fn is_reference(&self) -> bool {
		matches!(self, Type::Null | Type::UninitializedThis | Type::Object(_) | Type::Uninitialized(_))
	}

	/// Joins `self` with `other`:
	/// - equal types join to themselves,
	/// - `NULL` joins with any reference to that reference,
	/// - any reference × any reference joins to their least common superclass via `classpath`,
	///   falling back to `java/lang/Object`,
	/// - any other mismatch (including a primitive meeting a reference, or two different
	///   primitive categories) joins to `TOP`.
	pub fn join(&self, other: &Type, classpath: &dyn crate::hierarchy::ClassPath) -> Type {
		if self == other {
			return self.clone();
		}
		match (self, other) {
			(Type::Null, reference) | (reference, Type::Null) if reference.is_reference() => reference.clone(),
			(a, b) if a.is_reference() && b.is_reference() => {
				let name_a = Self::reference_name(a);
				let name_b = Self::reference_name(b);
				match (name_a, name_b) {
					(Some(a), Some(b)) => Type::Object(classpath.common_super_class(a, b)),
					_ => Type::Object(JavaString::from("java/lang/Object")),
				}
			},
			_ => Type::Top,
		}
	}

	fn reference_name(ty: &Type) -> Option<&JavaString> {
		match ty {
			Type::Object(name) => Some(name),
			_ => None,
		}
	}
}

/// A local-variable array and operand stack snapshot at some instruction offset.
/// Attached to every label that is a branch target once [`crate::frame`]'s computation converges.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Frame {
	pub locals: Vec<Type>,
	pub stack: Vec<Type>,
}

impl Frame {
	/// Pointwise-joins two frames: each local slot and each stack slot is joined independently.
	/// The two frames must agree on stack depth (a verifier invariant: two control-flow paths
	/// reaching the same point must leave the same number of operand-stack slots); locals are
	/// joined up to the shorter length, with any extra trailing locals on one side dropped (a
	/// local not defined on both incoming paths is not live at the merge point).
	pub fn join(&self, other: &Frame, classpath: &dyn crate::hierarchy::ClassPath) -> Result<Frame, crate::error::Error> {
		if self.stack.len() != other.stack.len() {
			return Err(crate::error::Error::FrameMerge {
				reason: format!("operand stack depth mismatch: {} vs {}", self.stack.len(), other.stack.len()),
			});
		}
		let locals = self.locals.iter().zip(other.locals.iter())
			.map(|(a, b)| a.join(b, classpath))
			.collect();
		let stack = self.stack.iter().zip(other.stack.iter())
			.map(|(a, b)| a.join(b, classpath))
			.collect();
		Ok(Frame { locals, stack })
	}
}

/// Parses one field-descriptor type starting at `bytes[0]` (JVMS §4.3.2), returning the [`Type`]
/// and the number of bytes it consumed. Array types are represented as an `Object` carrying the
/// descriptor itself as the class name (e.g. `[I`, `[Ljava/lang/String;`), matching how the JVM
/// verifier itself represents array references.
pub(crate) fn parse_field_type_bytes(bytes: &[u8]) -> anyhow::Result<(Type, usize)> {
	match bytes.first() {
		Some(b'B' | b'C' | b'S' | b'Z' | b'I') => Ok((Type::Integer, 1)),
		Some(b'F') => Ok((Type::Float, 1)),
		Some(b'J') => Ok((Type::Long, 1)),
		Some(b'D') => Ok((Type::Double, 1)),
		Some(b'L') => {
			// stored without the leading 'L'/trailing ';': a plain internal binary class name,
			// matching exactly what a `Class` constant pool entry's name_index resolves to.
			let end = bytes.iter().position(|&b| b == b';')
				.ok_or_else(|| anyhow::anyhow!("unterminated object descriptor"))?;
			let name = JavaString::from_modified_utf8(bytes[1..end].to_vec())?;
			Ok((Type::Object(name), end + 1))
		},
		Some(b'[') => {
			let mut depth = 0;
			while bytes.get(depth) == Some(&b'[') {
				depth += 1;
			}
			let (_, rest_len) = parse_field_type_bytes(&bytes[depth..])?;
			let total = depth + rest_len;
			let name = JavaString::from_modified_utf8(bytes[0..total].to_vec())?;
			Ok((Type::Object(name), total))
		},
		other => Err(anyhow::anyhow!("invalid field descriptor byte {other:?}")),
	}
}

/// Parses a single JVMS §4.3.2 field descriptor into its verification [`Type`].
pub(crate) fn parse_field_type(descriptor: &java_string::JavaStr) -> anyhow::Result<Type> {
	Ok(parse_field_type_bytes(descriptor.as_bytes())?.0)
}

/// Parses a JVMS §4.3.3 method descriptor into its argument types (in order) and, if non-`void`,
/// its return type.
pub(crate) fn parse_method_descriptor(descriptor: &java_string::JavaStr) -> anyhow::Result<(Vec<Type>, Option<Type>)> {
	let bytes = descriptor.as_bytes();
	anyhow::ensure!(bytes.first() == Some(&b'('), "method descriptor must start with '('");
	let mut i = 1;
	let mut args = Vec::new();
	while bytes.get(i) != Some(&b')') {
		let (ty, len) = parse_field_type_bytes(&bytes[i..])?;
		args.push(ty);
		i += len;
	}
	i += 1;
	let ret = if bytes.get(i) == Some(&b'V') {
		None
	} else {
		Some(parse_field_type_bytes(&bytes[i..])?.0)
	};
	Ok((args, ret))
}

#[cfg(test)]
mod descriptor_testing {
	use java_string::JavaStr;
	use pretty_assertions::assert_eq;
	use super::*;

	#[test]
	fn parses_primitive_args_and_object_return() {
		let (args, ret) = parse_method_descriptor(JavaStr::from_str("(IJLjava/lang/String;)Ljava/lang/Object;")).unwrap();
		assert_eq!(args, vec![Type::Integer, Type::Long, Type::Object(JavaString::from("java/lang/String"))]);
		assert_eq!(ret, Some(Type::Object(JavaString::from("java/lang/Object"))));
	}

	#[test]
	fn void_return_is_none() {
		let (args, ret) = parse_method_descriptor(JavaStr::from_str("()V")).unwrap();
		assert!(args.is_empty());
		assert_eq!(ret, None);
	}

	#[test]
	fn array_descriptor_is_an_object_type() {
		assert_eq!(parse_field_type(JavaStr::from_str("[I")).unwrap(), Type::Object(JavaString::from("[I")));
	}
}

#[cfg(test)]
mod testing {
	use pretty_assertions::assert_eq;
	use crate::hierarchy::ClassHierarchy;
	use super::*;

	#[test]
	fn equal_types_join_to_themselves() {
		let hierarchy = ClassHierarchy::new();
		assert_eq!(Type::Integer.join(&Type::Integer, &hierarchy), Type::Integer);
	}

	#[test]
	fn null_joins_to_the_reference() {
		let hierarchy = ClassHierarchy::new();
		let string = Type::Object(JavaString::from("java/lang/String"));
		assert_eq!(Type::Null.join(&string, &hierarchy), string);
		assert_eq!(string.join(&Type::Null, &hierarchy), string);
	}

	#[test]
	fn primitive_category_mismatch_joins_to_top() {
		let hierarchy = ClassHierarchy::new();
		assert_eq!(Type::Integer.join(&Type::Long, &hierarchy), Type::Top);
	}

	#[test]
	fn unrelated_references_join_via_classpath() {
		let mut hierarchy = ClassHierarchy::new();
		hierarchy.add_super(JavaString::from("pkg/A"), JavaString::from("pkg/Base"));
		hierarchy.add_super(JavaString::from("pkg/B"), JavaString::from("pkg/Base"));
		let a = Type::Object(JavaString::from("pkg/A"));
		let b = Type::Object(JavaString::from("pkg/B"));
		assert_eq!(a.join(&b, &hierarchy), Type::Object(JavaString::from("pkg/Base")));
	}

	#[test]
	fn category_2_types_report_two_slots() {
		assert!(Type::Long.is_category_2());
		assert!(Type::Double.is_category_2());
		assert!(!Type::Integer.is_category_2());
	}
}
