//! Component A: a big-endian byte cursor with bounds checking.
//!
//! [`Reader`] borrows a byte range and never panics on a short read; [`Writer`] is the
//! symmetric append-only counterpart, used by the class-file writer's second pass once the
//! exact output size is known (see [`crate::writer`]).
//!
//! A reader is required to consume exactly the range it was handed: sub-ranges carved out for
//! an attribute body (see [`Reader::sub_reader`]) must be fully drained by [`Reader::finish`],
//! or the attribute's trailing bytes are a hard [`crate::error::Error::TrailingGarbage`] rather
//! than a warning.

use anyhow::{anyhow, bail, Context, Result};

/// A borrowed, bounds-checked, big-endian cursor over a byte range.
pub(crate) struct Reader<'a> {
	bytes: &'a [u8],
	pos: usize,
}

impl<'a> Reader<'a> {
	pub(crate) fn new(bytes: &'a [u8]) -> Reader<'a> {
		Reader { bytes, pos: 0 }
	}

	pub(crate) fn position(&self) -> usize {
		self.pos
	}

	pub(crate) fn remaining(&self) -> usize {
		self.bytes.len() - self.pos
	}

	pub(crate) fn is_empty(&self) -> bool {
		self.remaining() == 0
	}

	/// Consumes the reader, failing with `TrailingGarbage`-flavored context if any bytes of
	/// its range remain unread. Every attribute body is read through a [`Reader::sub_reader`]
	/// and finished this way.
	pub(crate) fn finish(self, what: &str) -> Result<()> {
		if self.remaining() != 0 {
			bail!("trailing garbage after {what}: {} byte(s) left unread", self.remaining());
		}
		Ok(())
	}

	fn take(&mut self, n: usize) -> Result<&'a [u8]> {
		if n > self.remaining() {
			bail!("truncated input: wanted {n} byte(s), only {} left", self.remaining());
		}
		let slice = &self.bytes[self.pos..self.pos + n];
		self.pos += n;
		Ok(slice)
	}

	/// Carves out the next `len` bytes as their own reader, for attribute bodies whose
	/// `attribute_length` is declared up front.
	pub(crate) fn sub_reader(&mut self, len: usize) -> Result<Reader<'a>> {
		Ok(Reader::new(self.take(len).context("reading attribute body")?))
	}

	pub(crate) fn read_u8(&mut self) -> Result<u8> {
		Ok(self.take(1).context("reading u8")?[0])
	}
	pub(crate) fn read_i8(&mut self) -> Result<i8> {
		Ok(self.read_u8()? as i8)
	}
	pub(crate) fn read_u16(&mut self) -> Result<u16> {
		let b = self.take(2).context("reading u16")?;
		Ok(u16::from_be_bytes([b[0], b[1]]))
	}
	pub(crate) fn read_i16(&mut self) -> Result<i16> {
		Ok(self.read_u16()? as i16)
	}
	pub(crate) fn read_u32(&mut self) -> Result<u32> {
		let b = self.take(4).context("reading u32")?;
		Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
	}
	pub(crate) fn read_i32(&mut self) -> Result<i32> {
		Ok(self.read_u32()? as i32)
	}
	pub(crate) fn read_u64(&mut self) -> Result<u64> {
		let b = self.take(8).context("reading u64")?;
		Ok(u64::from_be_bytes([b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7]]))
	}
	pub(crate) fn read_i64(&mut self) -> Result<i64> {
		Ok(self.read_u64()? as i64)
	}
	pub(crate) fn read_f32(&mut self) -> Result<f32> {
		Ok(f32::from_bits(self.read_u32()?))
	}
	pub(crate) fn read_f64(&mut self) -> Result<f64> {
		Ok(f64::from_bits(self.read_u64()?))
	}

	pub(crate) fn read_u8_as_usize(&mut self) -> Result<usize> {
		Ok(self.read_u8()? as usize)
	}
	pub(crate) fn read_u16_as_usize(&mut self) -> Result<usize> {
		Ok(self.read_u16()? as usize)
	}
	pub(crate) fn read_u32_as_usize(&mut self) -> Result<usize> {
		Ok(self.read_u32()? as usize)
	}

	pub(crate) fn read_bytes(&mut self, n: usize) -> Result<Vec<u8>> {
		Ok(self.take(n)?.to_vec())
	}

	pub(crate) fn skip(&mut self, n: usize) -> Result<()> {
		self.take(n).context("skipping bytes")?;
		Ok(())
	}

	/// Reads a length-prefixed vector, where `get_size` reads the count and `get_element`
	/// reads one element.
	pub(crate) fn read_vec<T>(
		&mut self,
		get_size: impl FnOnce(&mut Self) -> Result<usize>,
		mut get_element: impl FnMut(&mut Self) -> Result<T>,
	) -> Result<Vec<T>> {
		let size = get_size(self)?;
		let mut vec = Vec::with_capacity(size);
		for i in 0..size {
			vec.push(get_element(self).with_context(|| anyhow!("reading element {i}/{size}"))?);
		}
		Ok(vec)
	}
}

/// An exact-size, append-only, big-endian byte buffer.
///
/// The writer computes the serialized size in a first pass (see [`crate::writer::compute_size`])
/// and writes into a buffer pre-sized to that exact length, so every `write_*` call here is
/// infallible: there is no bounds check to fail.
pub(crate) struct Writer {
	bytes: Vec<u8>,
}

impl Writer {
	pub(crate) fn with_capacity(capacity: usize) -> Writer {
		Writer { bytes: Vec::with_capacity(capacity) }
	}

	pub(crate) fn position(&self) -> usize {
		self.bytes.len()
	}

	pub(crate) fn into_bytes(self) -> Vec<u8> {
		self.bytes
	}

	pub(crate) fn write_u8(&mut self, value: u8) {
		self.bytes.push(value);
	}
	pub(crate) fn write_i8(&mut self, value: i8) {
		self.write_u8(value as u8);
	}
	pub(crate) fn write_u16(&mut self, value: u16) {
		self.bytes.extend_from_slice(&value.to_be_bytes());
	}
	pub(crate) fn write_i16(&mut self, value: i16) {
		self.write_u16(value as u16);
	}
	pub(crate) fn write_u32(&mut self, value: u32) {
		self.bytes.extend_from_slice(&value.to_be_bytes());
	}
	pub(crate) fn write_i32(&mut self, value: i32) {
		self.write_u32(value as u32);
	}
	pub(crate) fn write_u64(&mut self, value: u64) {
		self.bytes.extend_from_slice(&value.to_be_bytes());
	}
	pub(crate) fn write_i64(&mut self, value: i64) {
		self.write_u64(value as u64);
	}
	pub(crate) fn write_f32(&mut self, value: f32) {
		self.write_u32(value.to_bits());
	}
	pub(crate) fn write_f64(&mut self, value: f64) {
		self.write_u64(value.to_bits());
	}

	pub(crate) fn write_usize_as_u16(&mut self, value: usize) -> Result<()> {
		self.write_u16(u16::try_from(value).with_context(|| anyhow!("{value} does not fit in a u16"))?);
		Ok(())
	}
	pub(crate) fn write_usize_as_u32(&mut self, value: usize) -> Result<()> {
		self.write_u32(u32::try_from(value).with_context(|| anyhow!("{value} does not fit in a u32"))?);
		Ok(())
	}

	pub(crate) fn write_bytes(&mut self, bytes: &[u8]) {
		self.bytes.extend_from_slice(bytes);
	}

	/// Writes the final byte count at `at` (reserved earlier with [`Writer::reserve_u32`]),
	/// computed as `self.position() - after`.
	pub(crate) fn patch_u32_len_from(&mut self, at: usize, after: usize) {
		let len = (self.position() - after) as u32;
		self.bytes[at..at + 4].copy_from_slice(&len.to_be_bytes());
	}

	/// Reserves 4 bytes (e.g. for an `attribute_length` to be patched in later) and returns
	/// their position.
	pub(crate) fn reserve_u32(&mut self) -> usize {
		let at = self.position();
		self.write_u32(0);
		at
	}
}

#[cfg(test)]
mod testing {
	use pretty_assertions::assert_eq;
	use super::*;

	#[test]
	fn read_primitives() -> Result<()> {
		let bytes = [0xCA, 0xFE, 0xBA, 0xBE, 0x00, 0x34];
		let mut r = Reader::new(&bytes);
		assert_eq!(r.read_u32()?, 0xCAFEBABE);
		assert_eq!(r.read_u16()?, 0x0034);
		r.finish("test")?;
		Ok(())
	}

	#[test]
	fn truncated_is_an_error() {
		let bytes = [0x00];
		let mut r = Reader::new(&bytes);
		assert!(r.read_u16().is_err());
	}

	#[test]
	fn trailing_garbage_is_an_error() {
		let bytes = [0x00, 0x01, 0x02];
		let mut r = Reader::new(&bytes);
		r.read_u16().unwrap();
		assert!(r.finish("test").is_err());
	}

	#[test]
	fn write_round_trips_read() -> Result<()> {
		let mut w = Writer::with_capacity(16);
		w.write_u32(0xCAFEBABE);
		w.write_i16(-1);
		w.write_f64(1.5);
		let bytes = w.into_bytes();

		let mut r = Reader::new(&bytes);
		assert_eq!(r.read_u32()?, 0xCAFEBABE);
		assert_eq!(r.read_i16()?, -1);
		assert_eq!(r.read_f64()?, 1.5);
		r.finish("test")?;
		Ok(())
	}
}
