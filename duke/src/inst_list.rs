//! Component E: a doubly-linked, mutable instruction sequence.
//!
//! A language without arenas can model an arena-and-raw-pointer instruction list as indices into
//! a shared vector owned by the method's code attribute instead. [`InstList`] is exactly that —
//! a slab (`Vec<Node>`) addressed by [`NodeId`] handles, with `prev`/`next` stored as
//! `Option<NodeId>` instead of raw pointers. No `unsafe`, no raw pointers; the slab (and
//! everything it contains) is freed in one shot when the owning [`crate::class::Code`] is
//! dropped — the safe-Rust realization of an arena (component B).
//!
//! Only append, push-front, and insert-before are needed by the parser and the writer; removal
//! is not implemented, matching that the core workflow never needs it.

use crate::code::{Instruction, Label};

/// A handle into an [`InstList`]'s slab. Stable for the lifetime of the list (nodes are never
/// removed, so no handle is ever invalidated by another mutation).
pub type NodeId = usize;

struct Node {
	prev: Option<NodeId>,
	next: Option<NodeId>,
	/// The instruction's byte offset, valid only after a layout pass (see
	/// [`crate::writer::layout_method`] and the parser's label pass).
	offset: Option<u32>,
	instruction: Instruction,
}

/// A doubly-linked sequence of [`Instruction`]s (including [`Instruction::Label`]
/// pseudo-instructions), addressed by [`NodeId`] handles drawn from a per-list slab.
#[derive(Default)]
pub struct InstList {
	nodes: Vec<Node>,
	head: Option<NodeId>,
	tail: Option<NodeId>,
	next_label_id: u32,
}

impl Clone for InstList {
	fn clone(&self) -> Self {
		InstList {
			nodes: self.nodes.iter().map(|n| Node {
				prev: n.prev,
				next: n.next,
				offset: n.offset,
				instruction: n.instruction.clone(),
			}).collect(),
			head: self.head,
			tail: self.tail,
			next_label_id: self.next_label_id,
		}
	}
}

impl std::fmt::Debug for InstList {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_list().entries(self.iter().map(|(_, i)| i)).finish()
	}
}

impl PartialEq for InstList {
	fn eq(&self, other: &Self) -> bool {
		self.iter().map(|(_, i)| i).eq(other.iter().map(|(_, i)| i))
	}
}

impl InstList {
	pub fn new() -> InstList {
		InstList::default()
	}

	/// Assigns a fresh [`Label`] id from this list's counter. The label is not placed anywhere
	/// in the sequence until an [`Instruction::Label`] referencing it is inserted (typically via
	/// [`InstList::push`]).
	pub fn create_label(&mut self) -> Label {
		let label = Label(self.next_label_id);
		self.next_label_id += 1;
		label
	}

	fn alloc(&mut self, instruction: Instruction) -> NodeId {
		self.nodes.push(Node { prev: None, next: None, offset: None, instruction });
		self.nodes.len() - 1
	}

	/// Appends `instruction` at the end of the sequence.
	pub fn push(&mut self, instruction: Instruction) -> NodeId {
		let id = self.alloc(instruction);
		match self.tail {
			None => {
				self.head = Some(id);
				self.tail = Some(id);
			},
			Some(tail) => {
				self.nodes[tail].next = Some(id);
				self.nodes[id].prev = Some(tail);
				self.tail = Some(id);
			},
		}
		id
	}

	/// Inserts `instruction` at the very start of the sequence.
	pub fn push_front(&mut self, instruction: Instruction) -> NodeId {
		let id = self.alloc(instruction);
		match self.head {
			None => {
				self.head = Some(id);
				self.tail = Some(id);
			},
			Some(head) => {
				self.nodes[head].prev = Some(id);
				self.nodes[id].next = Some(head);
				self.head = Some(id);
			},
		}
		id
	}

	/// Inserts `instruction` immediately before `anchor`.
	pub fn insert_before(&mut self, anchor: NodeId, instruction: Instruction) -> NodeId {
		let id = self.alloc(instruction);
		let prev = self.nodes[anchor].prev;
		self.nodes[id].prev = prev;
		self.nodes[id].next = Some(anchor);
		self.nodes[anchor].prev = Some(id);
		match prev {
			Some(prev) => self.nodes[prev].next = Some(id),
			None => self.head = Some(id),
		}
		id
	}

	pub fn get(&self, id: NodeId) -> &Instruction {
		&self.nodes[id].instruction
	}
	pub fn get_mut(&mut self, id: NodeId) -> &mut Instruction {
		&mut self.nodes[id].instruction
	}

	pub fn offset_of(&self, id: NodeId) -> Option<u32> {
		self.nodes[id].offset
	}
	pub(crate) fn set_offset(&mut self, id: NodeId, offset: u32) {
		self.nodes[id].offset = offset.into();
	}

	pub fn first(&self) -> Option<NodeId> {
		self.head
	}
	pub fn last(&self) -> Option<NodeId> {
		self.tail
	}
	pub fn next(&self, id: NodeId) -> Option<NodeId> {
		self.nodes[id].next
	}
	pub fn prev(&self, id: NodeId) -> Option<NodeId> {
		self.nodes[id].prev
	}

	pub fn len(&self) -> usize {
		self.iter().count()
	}
	pub fn is_empty(&self) -> bool {
		self.head.is_none()
	}

	/// Iterates `(NodeId, &Instruction)` pairs in list order. Safe to call
	/// [`InstList::insert_before`]/[`InstList::push`] on an id already visited without
	/// disturbing iteration (the iterator follows `next` pointers freshly on each step rather
	/// than holding a fixed index), which is what "tolerates mutation" means for this list.
	pub fn iter(&self) -> Iter<'_> {
		Iter { list: self, cur: self.head }
	}

	/// A cursor that starts at the front of the list and can insert around its current
	/// position while continuing to advance afterwards.
	pub fn cursor_front_mut(&mut self) -> CursorMut<'_> {
		let cur = self.head;
		CursorMut { list: self, cur }
	}
}

pub struct Iter<'a> {
	list: &'a InstList,
	cur: Option<NodeId>,
}

impl<'a> Iterator for Iter<'a> {
	type Item = (NodeId, &'a Instruction);

	fn next(&mut self) -> Option<Self::Item> {
		let id = self.cur?;
		self.cur = self.list.nodes[id].next;
		Some((id, &self.list.nodes[id].instruction))
	}
}

/// A mutation-tolerant cursor: inserting before or after the current position does not
/// invalidate the cursor, and [`CursorMut::move_next`] continues from wherever the cursor
/// logically is.
pub struct CursorMut<'a> {
	list: &'a mut InstList,
	cur: Option<NodeId>,
}

impl<'a> CursorMut<'a> {
	pub fn current(&self) -> Option<(NodeId, &Instruction)> {
		self.cur.map(|id| (id, self.list.get(id)))
	}

	pub fn move_next(&mut self) {
		if let Some(id) = self.cur {
			self.cur = self.list.next(id);
		}
	}

	/// Inserts `instruction` immediately before the cursor's current position (or at the very
	/// end, if the cursor has run off the end of the list). Does not move the cursor.
	pub fn insert_before(&mut self, instruction: Instruction) -> NodeId {
		match self.cur {
			Some(id) => self.list.insert_before(id, instruction),
			None => self.list.push(instruction),
		}
	}
}

#[cfg(test)]
mod testing {
	use pretty_assertions::assert_eq;
	use crate::code::Label;
	use crate::opcode;
	use super::*;

	fn collect(list: &InstList) -> Vec<Instruction> {
		list.iter().map(|(_, i)| i.clone()).collect()
	}

	#[test]
	fn append_and_push_front() {
		let mut list = InstList::new();
		list.push(Instruction::Zero(opcode::NOP));
		list.push_front(Instruction::Zero(opcode::RETURN));
		assert_eq!(collect(&list), vec![
			Instruction::Zero(opcode::RETURN),
			Instruction::Zero(opcode::NOP),
		]);
	}

	#[test]
	fn insert_before_anchor() {
		let mut list = InstList::new();
		let anchor = list.push(Instruction::Zero(opcode::RETURN));
		list.insert_before(anchor, Instruction::Zero(opcode::NOP));
		assert_eq!(collect(&list), vec![
			Instruction::Zero(opcode::NOP),
			Instruction::Zero(opcode::RETURN),
		]);
	}

	#[test]
	fn label_round_trips_through_push() {
		let mut list = InstList::new();
		let label = list.create_label();
		list.push(Instruction::Label(label));
		list.push(Instruction::Jump { opcode: opcode::GOTO, target: label });
		assert_eq!(collect(&list), vec![
			Instruction::Label(label),
			Instruction::Jump { opcode: opcode::GOTO, target: label },
		]);
	}

	#[test]
	fn cursor_insert_before_does_not_disturb_iteration() {
		let mut list = InstList::new();
		list.push(Instruction::Zero(opcode::ATHROW));

		let mut cursor = list.cursor_front_mut();
		cursor.insert_before(Instruction::Zero(opcode::NOP));
		assert_eq!(cursor.current().map(|(_, i)| i.clone()), Some(Instruction::Zero(opcode::ATHROW)));
		cursor.move_next();
		assert_eq!(cursor.current(), None);

		assert_eq!(collect(&list), vec![
			Instruction::Zero(opcode::NOP),
			Instruction::Zero(opcode::ATHROW),
		]);
	}

	#[test]
	fn label_ids_increase_monotonically() {
		let mut list = InstList::new();
		let a = list.create_label();
		let b = list.create_label();
		assert_ne!(a, b);
		assert!(matches!((a, b), (Label(0), Label(1))));
	}
}
