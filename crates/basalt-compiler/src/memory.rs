//! The static memory allocator.
//!
//! A bump allocator over the module's static data region. Segments are
//! 8-byte aligned, written once, and never mutated; the cursor starts past
//! a reserved base kept free for header and runtime pointers. Arrays carry
//! a `{capacity: u32, length: u32, data: ptr}` header immediately followed
//! by their elements; strings are arrays of 16-bit code units interned by
//! exact text when reuse is requested.

use rustc_hash::FxHashMap;

use basalt_core::{ConstValue, InternalError, TargetWidth};

use crate::types::{Ty, TypeKind};

/// First usable static offset; the bytes below are reserved.
pub const STATIC_BASE: u32 = 8;

/// An immutable (offset, bytes) pair in the static data region.
#[derive(Debug, Clone, PartialEq)]
pub struct MemorySegment {
    /// Byte offset in linear memory.
    pub offset: u32,
    /// Segment contents.
    pub bytes: Vec<u8>,
}

/// Bump allocator for constant data segments.
#[derive(Debug)]
pub struct StaticAllocator {
    target: TargetWidth,
    cursor: u32,
    segments: Vec<MemorySegment>,
    strings: FxHashMap<String, u32>,
}

impl StaticAllocator {
    /// Create an allocator for the given target width.
    pub fn new(target: TargetWidth) -> Self {
        Self {
            target,
            cursor: STATIC_BASE,
            segments: Vec::new(),
            strings: FxHashMap::default(),
        }
    }

    /// Round the cursor up to the next 8-byte boundary.
    ///
    /// Every segment begins 8-byte aligned.
    pub fn align(&mut self) {
        self.cursor = (self.cursor + 7) & !7;
    }

    /// Current cursor position.
    pub fn cursor(&self) -> u32 {
        self.cursor
    }

    /// Total static size (highest allocated offset).
    pub fn total_size(&self) -> u32 {
        self.cursor
    }

    /// The segments allocated so far, in allocation order.
    pub fn segments(&self) -> &[MemorySegment] {
        &self.segments
    }

    /// Consume the allocator, yielding its segments.
    pub fn into_segments(self) -> Vec<MemorySegment> {
        self.segments
    }

    /// Size of the array header: capacity + length + data pointer.
    pub fn header_size(&self) -> u32 {
        8 + self.target.ptr_size()
    }

    /// Allocate a constant array segment, returning its offset.
    ///
    /// A length outside `[0, 2^31 - 1]` is a caller-side invariant
    /// violation, not a user diagnostic.
    pub fn create_array(
        &mut self,
        values: &[ConstValue],
        elem_ty: Ty,
    ) -> Result<u32, InternalError> {
        if values.len() > i32::MAX as usize {
            return Err(InternalError::ArrayLengthOutOfRange {
                len: values.len() as i64,
            });
        }

        // Nested reference elements must already be flattened to offsets.
        let mut flat = Vec::with_capacity(values.len());
        for value in values {
            flat.push(self.flatten(value)?);
        }

        self.align();
        let offset = self.cursor;
        let header_size = self.header_size();
        let length = values.len() as u32;
        let total = header_size + elem_ty.size * length;

        let mut bytes = Vec::with_capacity(total as usize);
        bytes.extend_from_slice(&length.to_le_bytes()); // capacity
        bytes.extend_from_slice(&length.to_le_bytes()); // length
        let data_ptr = u64::from(offset + header_size);
        match self.target {
            TargetWidth::W32 => bytes.extend_from_slice(&(data_ptr as u32).to_le_bytes()),
            TargetWidth::W64 => bytes.extend_from_slice(&data_ptr.to_le_bytes()),
        }
        for value in &flat {
            write_element(&mut bytes, value, elem_ty);
        }

        self.cursor += total;
        self.segments.push(MemorySegment { offset, bytes });
        Ok(offset)
    }

    /// Allocate (or reuse) a constant string segment, returning its offset.
    ///
    /// With `reuse`, identical text resolves to the same segment.
    pub fn create_string(&mut self, text: &str, reuse: bool) -> Result<u32, InternalError> {
        if reuse && let Some(&offset) = self.strings.get(text) {
            return Ok(offset);
        }
        let units: Vec<ConstValue> = text
            .encode_utf16()
            .map(|unit| ConstValue::I32(i32::from(unit)))
            .collect();
        let offset = self.create_array(&units, Ty::U16)?;
        if reuse {
            self.strings.insert(text.to_string(), offset);
        }
        Ok(offset)
    }

    /// Replace nested string values with their segment offsets.
    fn flatten(&mut self, value: &ConstValue) -> Result<ConstValue, InternalError> {
        match value {
            ConstValue::Str(text) => {
                let offset = self.create_string(text, true)?;
                Ok(match self.target {
                    TargetWidth::W32 => ConstValue::I32(offset as i32),
                    TargetWidth::W64 => ConstValue::I64(i64::from(offset)),
                })
            }
            ConstValue::Array(_) => Err(InternalError::msg(
                "nested array literals are not constant-evaluable",
            )),
            other => Ok(other.clone()),
        }
    }
}

/// Serialize one element with the size-correct little-endian writer for its
/// declared kind.
fn write_element(bytes: &mut Vec<u8>, value: &ConstValue, elem_ty: Ty) {
    match elem_ty.kind {
        TypeKind::F32 => {
            let v = value.as_f64().unwrap_or(0.0) as f32;
            bytes.extend_from_slice(&v.to_le_bytes());
        }
        TypeKind::F64 => {
            let v = value.as_f64().unwrap_or(0.0);
            bytes.extend_from_slice(&v.to_le_bytes());
        }
        _ => {
            let v = value.as_i64().unwrap_or(0);
            match elem_ty.size {
                1 => bytes.push(v as u8),
                2 => bytes.extend_from_slice(&(v as u16).to_le_bytes()),
                8 => bytes.extend_from_slice(&(v as u64).to_le_bytes()),
                _ => bytes.extend_from_slice(&(v as u32).to_le_bytes()),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn segments_start_aligned() {
        let mut alloc = StaticAllocator::new(TargetWidth::W32);
        let a = alloc
            .create_array(&[ConstValue::I32(1)], Ty::U8)
            .unwrap();
        let b = alloc
            .create_array(&[ConstValue::I32(2)], Ty::U8)
            .unwrap();
        assert_eq!(a % 8, 0);
        assert_eq!(b % 8, 0);
        assert!(b > a);
    }

    #[test]
    fn array_header_and_elements() {
        let mut alloc = StaticAllocator::new(TargetWidth::W32);
        let values = [ConstValue::I32(1), ConstValue::I32(2), ConstValue::I32(3)];
        let offset = alloc.create_array(&values, Ty::I32).unwrap();

        let segment = &alloc.segments()[0];
        assert_eq!(segment.offset, offset);
        // capacity, length
        assert_eq!(&segment.bytes[0..4], &3u32.to_le_bytes());
        assert_eq!(&segment.bytes[4..8], &3u32.to_le_bytes());
        // data pointer points just past the header
        let data_ptr = u32::from_le_bytes(segment.bytes[8..12].try_into().unwrap());
        assert_eq!(data_ptr, offset + 12);
        // little-endian elements
        assert_eq!(&segment.bytes[12..16], &1u32.to_le_bytes());
        assert_eq!(&segment.bytes[16..20], &2u32.to_le_bytes());
        assert_eq!(&segment.bytes[20..24], &3u32.to_le_bytes());
    }

    #[test]
    fn wide_target_widens_data_pointer() {
        let mut alloc = StaticAllocator::new(TargetWidth::W64);
        let offset = alloc.create_array(&[ConstValue::I64(9)], Ty::I64).unwrap();
        let segment = &alloc.segments()[0];
        assert_eq!(segment.bytes.len(), (16 + 8) as usize);
        let data_ptr = u64::from_le_bytes(segment.bytes[8..16].try_into().unwrap());
        assert_eq!(data_ptr, u64::from(offset) + 16);
    }

    #[test]
    fn string_reuse_interns_by_text() {
        let mut alloc = StaticAllocator::new(TargetWidth::W32);
        let a = alloc.create_string("hello", true).unwrap();
        let b = alloc.create_string("hello", true).unwrap();
        assert_eq!(a, b);
        assert_eq!(alloc.segments().len(), 1);

        let c = alloc.create_string("hello", false).unwrap();
        assert_ne!(a, c);
        assert_eq!(alloc.segments().len(), 2);
    }

    #[test]
    fn string_units_are_utf16() {
        let mut alloc = StaticAllocator::new(TargetWidth::W32);
        alloc.create_string("ab", true).unwrap();
        let segment = &alloc.segments()[0];
        assert_eq!(&segment.bytes[12..14], &(b'a' as u16).to_le_bytes());
        assert_eq!(&segment.bytes[14..16], &(b'b' as u16).to_le_bytes());
    }

    #[test]
    fn u8_elements_pack_densely() {
        let mut alloc = StaticAllocator::new(TargetWidth::W32);
        let values = [ConstValue::I32(0x11), ConstValue::I32(0x22)];
        alloc.create_array(&values, Ty::U8).unwrap();
        let segment = &alloc.segments()[0];
        assert_eq!(segment.bytes[12], 0x11);
        assert_eq!(segment.bytes[13], 0x22);
        assert_eq!(segment.bytes.len(), 14);
    }
}
