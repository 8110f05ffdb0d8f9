//! Large-object (memo, blob, graphic) resolution against the companion `.MB` file.
//!
//! A large-object field ends with a 10-byte pointer: offset (u32), length (u32) and modification
//! number (u16), all little-endian. Short values live inline in the leading bytes of the field;
//! longer values live in the companion file, which is organised in 4096-byte chunks. The low byte
//! of the offset selects a slot inside a sub-allocated block, with `0xFF` meaning "no slot".

use std::collections::HashMap;
use std::io::{ErrorKind, Read, Seek, SeekFrom};
use std::path::PathBuf;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::error::{FormatError, FormatResult};
use crate::header::{FieldDescriptor, TableSchema};
use crate::types::BLOB_POINTER_LEN;

/// Allocation unit of the companion file.
pub const MB_CHUNK_SIZE: usize = 4096;
/// Sub-block index meaning the pointer targets a self-contained single-value block.
pub const NO_INDEX: u8 = 0xFF;

pub const TAG_FILE_HEADER: u8 = 0;
pub const TAG_SINGLE: u8 = 2;
pub const TAG_SUBALLOCATED: u8 = 3;
pub const TAG_FREE: u8 = 4;

/// Bytes in front of the data of a single-value block: tag, chunks, length, modification number.
pub const SINGLE_HEADER_LEN: usize = 9;
/// Start of the slot table inside a sub-allocated block.
pub const SLOT_TABLE_OFFSET: usize = 12;
pub const SLOT_ENTRY_LEN: usize = 5;
pub const SLOT_COUNT: usize = 64;
/// Slot offsets and lengths are stored in units of this many bytes.
pub const SLOT_UNIT: usize = 16;

/// Decoded trailing pointer of a large-object field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LargeObjectPointer {
    pub offset: u32,
    pub length: u32,
    pub modification: u16,
}

impl LargeObjectPointer {
    /// Read the pointer from the last 10 bytes of a field.
    pub fn from_field(field: &[u8]) -> Self {
        let start = field.len().saturating_sub(BLOB_POINTER_LEN);
        let mut raw = [0u8; BLOB_POINTER_LEN];
        let tail = &field[start..];
        raw[..tail.len()].copy_from_slice(tail);
        Self {
            offset: u32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]),
            length: u32::from_le_bytes([raw[4], raw[5], raw[6], raw[7]]),
            modification: u16::from_le_bytes([raw[8], raw[9]]),
        }
    }

    pub fn to_bytes(self) -> [u8; BLOB_POINTER_LEN] {
        let mut out = [0u8; BLOB_POINTER_LEN];
        out[0..4].copy_from_slice(&self.offset.to_le_bytes());
        out[4..8].copy_from_slice(&self.length.to_le_bytes());
        out[8..10].copy_from_slice(&self.modification.to_le_bytes());
        out
    }

    pub fn block_offset(self) -> u32 {
        self.offset & 0xFFFF_FF00
    }

    pub fn index(self) -> u8 {
        (self.offset & 0xFF) as u8
    }

    pub fn cache_key(self) -> (u32, u8) {
        (self.block_offset(), self.index())
    }
}

/// Resolved large-object bytes keyed by `(block offset, sub-block index)`.
///
/// Shared by every scan of a table handle. Entries are only ever added until the handle is
/// closed, at which point the whole map is cleared.
#[derive(Debug, Default)]
pub struct BlockCache {
    entries: RwLock<HashMap<(u32, u8), Arc<[u8]>>>,
}

impl BlockCache {
    fn read(&self) -> RwLockReadGuard<'_, HashMap<(u32, u8), Arc<[u8]>>> {
        match self.entries.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<(u32, u8), Arc<[u8]>>> {
        match self.entries.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    pub fn get(&self, key: (u32, u8)) -> Option<Arc<[u8]>> {
        self.read().get(&key).cloned()
    }

    /// Insert `value` unless another scan got there first; returns the cached bytes either way.
    pub fn insert(&self, key: (u32, u8), value: Arc<[u8]>) -> Arc<[u8]> {
        self.write().entry(key).or_insert(value).clone()
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.write().clear();
    }
}

pub(crate) trait ReadSeek: Read + Seek + Send {}

impl<T: Read + Seek + Send> ReadSeek for T {}

pub(crate) enum BlobSource {
    /// Companion file absent; only an external value read fails.
    Missing(PathBuf),
    Reader(Box<dyn ReadSeek>),
}

/// Per-scan view of the companion file plus the table's shared cache.
pub(crate) struct LargeObjectReader<'a> {
    table: &'a str,
    source: BlobSource,
    cache: &'a BlockCache,
}

impl<'a> LargeObjectReader<'a> {
    pub(crate) fn new(schema: &'a TableSchema, source: BlobSource, cache: &'a BlockCache) -> Self {
        Self {
            table: schema.name(),
            source,
            cache,
        }
    }

    #[cfg(test)]
    pub(crate) fn detached(schema: &'a TableSchema, cache: &'a BlockCache) -> Self {
        let path = PathBuf::from(format!("{}.MB", schema.name()));
        Self::new(schema, BlobSource::Missing(path), cache)
    }

    /// Resolve a large-object field to its bytes, or `None` for a blank value.
    pub(crate) fn resolve(
        &mut self,
        field: &FieldDescriptor,
        bytes: &[u8],
        pointer: &LargeObjectPointer,
    ) -> FormatResult<Option<Arc<[u8]>>> {
        if pointer.length == 0 {
            return Ok(None);
        }
        let length = pointer.length as usize;
        if length <= field.inline_allowance() {
            return Ok(Some(Arc::from(&bytes[..length])));
        }

        let key = pointer.cache_key();
        if let Some(hit) = self.cache.get(key) {
            return Ok(Some(hit));
        }
        let data = self.load(field, pointer)?;
        Ok(Some(self.cache.insert(key, Arc::from(data))))
    }

    fn block_error(&self, field: &FieldDescriptor, offset: u32, reason: impl Into<String>) -> FormatError {
        FormatError::BlobBlock {
            table: self.table.to_string(),
            field: field.name.clone(),
            offset,
            reason: reason.into(),
        }
    }

    fn size_error(
        &self,
        field: &FieldDescriptor,
        offset: u32,
        declared: u32,
        capacity: usize,
    ) -> FormatError {
        FormatError::BlobSizeExceeded {
            table: self.table.to_string(),
            field: field.name.clone(),
            offset,
            declared,
            capacity: u32::try_from(capacity).unwrap_or(u32::MAX),
        }
    }

    fn read_at(
        &mut self,
        field: &FieldDescriptor,
        block: u32,
        position: u64,
        len: usize,
    ) -> FormatResult<Vec<u8>> {
        let reader = match &mut self.source {
            BlobSource::Missing(path) => {
                return Err(FormatError::MissingCompanionFile {
                    table: self.table.to_string(),
                    path: path.clone(),
                })
            }
            BlobSource::Reader(reader) => reader,
        };
        let context = || format!("large-object file of table {}", self.table);
        reader
            .seek(SeekFrom::Start(position))
            .map_err(|err| FormatError::io(context(), err))?;
        let mut buf = vec![0u8; len];
        match reader.read_exact(&mut buf) {
            Ok(()) => Ok(buf),
            Err(err) if err.kind() == ErrorKind::UnexpectedEof => Err(self.block_error(
                field,
                block,
                format!("file ends before the {len} bytes at offset {position}"),
            )),
            Err(err) => Err(FormatError::io(context(), err)),
        }
    }

    fn load(&mut self, field: &FieldDescriptor, pointer: &LargeObjectPointer) -> FormatResult<Vec<u8>> {
        let block = pointer.block_offset();
        let base = u64::from(block);
        let head = self.read_at(field, block, base, SLOT_TABLE_OFFSET)?;
        let chunks = usize::from(u16::from_le_bytes([head[1], head[2]]));

        match head[0] {
            TAG_SINGLE => self.load_single(field, pointer, &head, chunks),
            TAG_SUBALLOCATED => self.load_slot(field, pointer, chunks),
            TAG_FILE_HEADER => Err(self.block_error(field, block, "pointer targets the file header")),
            TAG_FREE => Err(self.block_error(field, block, "pointer targets a free block")),
            tag => Err(self.block_error(field, block, format!("unknown block tag {tag}"))),
        }
    }

    fn load_single(
        &mut self,
        field: &FieldDescriptor,
        pointer: &LargeObjectPointer,
        head: &[u8],
        chunks: usize,
    ) -> FormatResult<Vec<u8>> {
        let block = pointer.block_offset();
        if pointer.index() != NO_INDEX {
            return Err(self.block_error(
                field,
                block,
                format!(
                    "single-value block addressed with sub-block index {}",
                    pointer.index()
                ),
            ));
        }
        if chunks == 0 {
            return Err(self.block_error(field, block, "block spans zero chunks"));
        }
        let capacity = chunks * MB_CHUNK_SIZE - SINGLE_HEADER_LEN;
        if pointer.length as usize > capacity {
            return Err(self.size_error(field, block, pointer.length, capacity));
        }
        let stored = u32::from_le_bytes([head[3], head[4], head[5], head[6]]);
        if stored != pointer.length {
            return Err(self.block_error(
                field,
                block,
                format!(
                    "block holds {stored} bytes but the field pointer declares {}",
                    pointer.length
                ),
            ));
        }
        let modification = u16::from_le_bytes([head[7], head[8]]);
        if modification != pointer.modification {
            log::debug!(
                "table {}: field {}: block 0x{block:08X} modification {modification} differs from pointer {}",
                self.table,
                field.name,
                pointer.modification
            );
        }

        let start = u64::from(block) + SINGLE_HEADER_LEN as u64;
        self.read_at(field, block, start, pointer.length as usize)
    }

    fn load_slot(
        &mut self,
        field: &FieldDescriptor,
        pointer: &LargeObjectPointer,
        chunks: usize,
    ) -> FormatResult<Vec<u8>> {
        let block = pointer.block_offset();
        let index = usize::from(pointer.index());
        if pointer.index() == NO_INDEX {
            return Err(self.block_error(
                field,
                block,
                "sub-allocated block addressed without a sub-block index",
            ));
        }
        if index >= SLOT_COUNT {
            return Err(self.block_error(
                field,
                block,
                format!("sub-block index {index} exceeds the {SLOT_COUNT}-slot table"),
            ));
        }

        let entry_pos = u64::from(block) + (SLOT_TABLE_OFFSET + index * SLOT_ENTRY_LEN) as u64;
        let entry = self.read_at(field, block, entry_pos, SLOT_ENTRY_LEN)?;
        let data_units = usize::from(entry[0]);
        let length_units = usize::from(entry[1]);
        let remainder = usize::from(entry[4]);
        if data_units == 0 || length_units == 0 {
            return Err(self.block_error(field, block, format!("sub-block {index} is empty")));
        }
        if remainder >= SLOT_UNIT {
            return Err(self.block_error(
                field,
                block,
                format!("sub-block {index} length remainder {remainder} is not below {SLOT_UNIT}"),
            ));
        }
        let slot_len = if remainder == 0 {
            length_units * SLOT_UNIT
        } else {
            (length_units - 1) * SLOT_UNIT + remainder
        };
        if pointer.length as usize > slot_len {
            return Err(self.size_error(field, block, pointer.length, slot_len));
        }

        let start = data_units * SLOT_UNIT;
        let block_len = chunks * MB_CHUNK_SIZE;
        if start + pointer.length as usize > block_len {
            return Err(self.size_error(
                field,
                block,
                pointer.length,
                block_len.saturating_sub(start),
            ));
        }

        self.read_at(
            field,
            block,
            u64::from(block) + start as u64,
            pointer.length as usize,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::header::tests::schema_with_blocks;
    use crate::types::FieldType;
    use std::io::Cursor;

    fn memo_field(width: usize) -> FieldDescriptor {
        FieldDescriptor {
            name: "NOTES".to_string(),
            field_type: FieldType::Memo,
            declared_size: width as u8,
            width,
            ordinal: 0,
            offset: 0,
        }
    }

    fn field_bytes(width: usize, inline: &[u8], pointer: LargeObjectPointer) -> Vec<u8> {
        let mut out = vec![0u8; width];
        out[..inline.len()].copy_from_slice(inline);
        out[width - BLOB_POINTER_LEN..].copy_from_slice(&pointer.to_bytes());
        out
    }

    fn single_block_file(at: usize, data: &[u8], modification: u16) -> Vec<u8> {
        let mut file = vec![0u8; at + MB_CHUNK_SIZE];
        file[at] = TAG_SINGLE;
        file[at + 1..at + 3].copy_from_slice(&1u16.to_le_bytes());
        file[at + 3..at + 7].copy_from_slice(&(data.len() as u32).to_le_bytes());
        file[at + 7..at + 9].copy_from_slice(&modification.to_le_bytes());
        file[at + 9..at + 9 + data.len()].copy_from_slice(data);
        file
    }

    #[test]
    fn pointer_splits_block_and_index() {
        let pointer = LargeObjectPointer {
            offset: 0x0000_2003,
            length: 10,
            modification: 1,
        };
        assert_eq!(pointer.block_offset(), 0x2000);
        assert_eq!(pointer.index(), 3);
        assert_eq!(LargeObjectPointer::from_field(&pointer.to_bytes()), pointer);
    }

    #[test]
    fn inline_values_do_not_touch_the_companion_file() {
        let schema = schema_with_blocks(64, 1, 1, 1);
        let cache = BlockCache::default();
        let mut reader = LargeObjectReader::detached(&schema, &cache);
        let field = memo_field(20);
        let pointer = LargeObjectPointer {
            offset: 0,
            length: 5,
            modification: 0,
        };
        let bytes = field_bytes(20, b"hello", pointer);
        let value = reader.resolve(&field, &bytes, &pointer).unwrap();
        assert_eq!(value.as_deref(), Some(&b"hello"[..]));
        assert!(cache.is_empty());
    }

    #[test]
    fn external_value_without_companion_file_fails() {
        let schema = schema_with_blocks(64, 1, 1, 1);
        let cache = BlockCache::default();
        let mut reader = LargeObjectReader::detached(&schema, &cache);
        let field = memo_field(20);
        let pointer = LargeObjectPointer {
            offset: 0x10FF,
            length: 500,
            modification: 0,
        };
        let bytes = field_bytes(20, b"", pointer);
        let err = reader.resolve(&field, &bytes, &pointer).unwrap_err();
        assert!(matches!(err, FormatError::MissingCompanionFile { .. }), "{err}");
    }

    #[test]
    fn single_block_value_is_cached() {
        let schema = schema_with_blocks(64, 1, 1, 1);
        let cache = BlockCache::default();
        let data = vec![b'x'; 300];
        let file = single_block_file(MB_CHUNK_SIZE, &data, 1);
        let source = BlobSource::Reader(Box::new(Cursor::new(file)));
        let mut reader = LargeObjectReader::new(&schema, source, &cache);

        let field = memo_field(20);
        let pointer = LargeObjectPointer {
            offset: MB_CHUNK_SIZE as u32 | u32::from(NO_INDEX),
            length: 300,
            modification: 1,
        };
        let bytes = field_bytes(20, b"", pointer);
        let first = reader.resolve(&field, &bytes, &pointer).unwrap().unwrap();
        assert_eq!(&first[..], &data[..]);
        assert_eq!(cache.len(), 1);
        let second = reader.resolve(&field, &bytes, &pointer).unwrap().unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn single_block_rejects_sub_block_index() {
        let schema = schema_with_blocks(64, 1, 1, 1);
        let cache = BlockCache::default();
        let file = single_block_file(0, &[1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12], 0);
        let source = BlobSource::Reader(Box::new(Cursor::new(file)));
        let mut reader = LargeObjectReader::new(&schema, source, &cache);
        let field = memo_field(11);
        let pointer = LargeObjectPointer {
            offset: 0x0000_0002,
            length: 12,
            modification: 0,
        };
        let bytes = field_bytes(11, b"", pointer);
        let err = reader.resolve(&field, &bytes, &pointer).unwrap_err();
        assert!(matches!(err, FormatError::BlobBlock { .. }), "{err}");
    }

    #[test]
    fn free_block_is_a_structural_error() {
        let schema = schema_with_blocks(64, 1, 1, 1);
        let cache = BlockCache::default();
        let mut file = vec![0u8; MB_CHUNK_SIZE * 2];
        file[MB_CHUNK_SIZE] = TAG_FREE;
        let source = BlobSource::Reader(Box::new(Cursor::new(file)));
        let mut reader = LargeObjectReader::new(&schema, source, &cache);
        let field = memo_field(10);
        let pointer = LargeObjectPointer {
            offset: MB_CHUNK_SIZE as u32 | 0xFF,
            length: 40,
            modification: 0,
        };
        let bytes = field_bytes(10, b"", pointer);
        let err = reader.resolve(&field, &bytes, &pointer).unwrap_err();
        assert!(err.to_string().contains("free block"), "{err}");
        assert!(cache.is_empty());
    }
}
