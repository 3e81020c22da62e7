//! Component L: the class hierarchy cache and the `ClassPath` oracle interface.
//!
//! The global class-hierarchy cache is re-architected here as an explicit value passed through
//! the agent-to-core boundary, with the host choosing its lifetime, rather than living as a
//! file-scope global the way some bytecode toolkits keep it. `duke` itself has no direct
//! equivalent (it never computes frames), so this follows the shape of a lazily-populated class
//! graph feeding a bytecode verifier's common-superclass queries.

use std::collections::HashMap;
use java_string::JavaString;

/// The sentinel for "this class has no superclass" (`java/lang/Object` itself).
pub const NO_SUPER_CLASS: &str = "0";

/// Answers subtype and common-superclass questions about classes the core has not itself parsed.
/// The frame computer (component J) depends on this abstractly; a JVMTI host typically
/// implements it by walking the classes it has already loaded plus a [`ClassHierarchy`] cache of
/// classes seen so far, falling back to its own classloader for anything neither source knows
/// about.
pub trait ClassPath {
	/// The least common superclass of `a` and `b`. Implementations may load classes on demand;
	/// the frame computer falls back to `java/lang/Object` itself if this ever needs to, so
	/// implementations are free to return `java/lang/Object` when they cannot determine anything
	/// more specific.
	fn common_super_class(&self, a: &JavaString, b: &JavaString) -> JavaString;

	/// A transitive subtype test: is `sub` assignable to a variable of type `sup`?
	fn is_assignable_from(&self, sub: &JavaString, sup: &JavaString) -> bool;
}

/// An in-memory `class name -> super-class name` map, populated incrementally as classes are
/// parsed. Does not itself implement [`ClassPath`] (walking an arbitrary pair of names to their
/// common ancestor needs a classloader for names the cache hasn't seen yet) but is the building
/// block a host-side `ClassPath` implementation uses: the frame computer's oracle consults this
/// cache plus an agent-provided resource loader.
#[derive(Debug, Clone, Default)]
pub struct ClassHierarchy {
	super_class: HashMap<JavaString, JavaString>,
}

impl ClassHierarchy {
	pub fn new() -> ClassHierarchy {
		ClassHierarchy { super_class: HashMap::new() }
	}

	/// Records `name`'s superclass directly.
	pub fn add_super(&mut self, name: JavaString, super_name: JavaString) {
		self.super_class.insert(name, super_name);
	}

	/// Extracts and records the `(this_class, super_class)` pair from a parsed class file.
	pub fn add_class(&mut self, class: &crate::class::ClassFile) -> Result<(), crate::error::Error> {
		let name = class.this_class_name()?.to_owned();
		let super_name = class.super_class_name()?
			.map(|s| s.to_owned())
			.unwrap_or_else(|| JavaString::from(NO_SUPER_CLASS));
		self.super_class.insert(name, super_name);
		Ok(())
	}

	/// Returns the recorded superclass, or [`NO_SUPER_CLASS`] if `name` has none recorded (either
	/// because it is `java/lang/Object` or because the cache has never seen it).
	pub fn get_super_class(&self, name: &JavaString) -> JavaString {
		self.super_class.get(name).cloned().unwrap_or_else(|| JavaString::from(NO_SUPER_CLASS))
	}

	pub fn is_defined(&self, name: &JavaString) -> bool {
		self.super_class.contains_key(name)
	}

	/// `name`, then its recorded superclass, then that class's recorded superclass, and so on
	/// until a name with no recorded superclass is reached (which is included last). Used by this
	/// cache's own [`ClassPath`] impl; a host with a real classloader behind it will generally
	/// want its own walk that can load classes this cache hasn't seen yet.
	fn ancestors(&self, name: &JavaString) -> Vec<JavaString> {
		let mut chain = vec![name.clone()];
		let mut current = name.clone();
		while let Some(super_name) = self.super_class.get(&current) {
			chain.push(super_name.clone());
			if *super_name == current {
				break;
			}
			current = super_name.clone();
		}
		chain
	}
}

/// A best-effort [`ClassPath`] using only what [`ClassHierarchy::add_class`] has recorded so
/// far, with no external classloader. Unrelated or unknown names fall back to
/// `java/lang/Object`, the same fallback the type lattice's join rule applies.
impl ClassPath for ClassHierarchy {
	fn common_super_class(&self, a: &JavaString, b: &JavaString) -> JavaString {
		let ancestors_a = self.ancestors(a);
		let ancestors_b = self.ancestors(b);
		for candidate in &ancestors_a {
			if ancestors_b.contains(candidate) {
				return candidate.clone();
			}
		}
		JavaString::from("java/lang/Object")
	}

	fn is_assignable_from(&self, sub: &JavaString, sup: &JavaString) -> bool {
		sub == sup || self.ancestors(sub).contains(sup)
	}
}

#[cfg(test)]
mod testing {
	use pretty_assertions::assert_eq;
	use super::*;

	#[test]
	fn unknown_class_reports_sentinel_super() {
		let hierarchy = ClassHierarchy::new();
		assert_eq!(hierarchy.get_super_class(&JavaString::from("pkg/Unknown")), JavaString::from(NO_SUPER_CLASS));
		assert!(!hierarchy.is_defined(&JavaString::from("pkg/Unknown")));
	}

	#[test]
	fn recorded_super_is_returned() {
		let mut hierarchy = ClassHierarchy::new();
		hierarchy.add_super(JavaString::from("pkg/Child"), JavaString::from("pkg/Parent"));
		assert_eq!(hierarchy.get_super_class(&JavaString::from("pkg/Child")), JavaString::from("pkg/Parent"));
		assert!(hierarchy.is_defined(&JavaString::from("pkg/Child")));
	}

	#[test]
	fn common_super_class_walks_recorded_ancestors() {
		let mut hierarchy = ClassHierarchy::new();
		hierarchy.add_super(JavaString::from("pkg/A"), JavaString::from("pkg/Base"));
		hierarchy.add_super(JavaString::from("pkg/B"), JavaString::from("pkg/Base"));
		assert_eq!(
			hierarchy.common_super_class(&JavaString::from("pkg/A"), &JavaString::from("pkg/B")),
			JavaString::from("pkg/Base"),
		);
	}

	#[test]
	fn unrelated_classes_fall_back_to_object() {
		let hierarchy = ClassHierarchy::new();
		assert_eq!(
			hierarchy.common_super_class(&JavaString::from("pkg/A"), &JavaString::from("pkg/B")),
			JavaString::from("java/lang/Object"),
		);
	}
}
