#![allow(dead_code)]

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use paradox_format::blob::{
    MB_CHUNK_SIZE, NO_INDEX, SINGLE_HEADER_LEN, SLOT_ENTRY_LEN, SLOT_TABLE_OFFSET, SLOT_UNIT,
    TAG_FILE_HEADER, TAG_FREE, TAG_SINGLE, TAG_SUBALLOCATED,
};
use paradox_format::{
    dates, numeric, Decimal, FieldType, LargeObjectPointer, BLOB_POINTER_LEN, BLOCK_SIZE_UNIT,
    EXTENDED_PREAMBLE_LEN, FILE_TYPE_UNKEYED, FIRST_EXTENDED_VERSION, FIRST_LONG_NAME_VERSION,
    LEGACY_PREAMBLE_LEN,
};

// Preamble offsets written by the builder. Kept in one place so corrupting tests can patch them.
pub const OFFSET_RECORD_SIZE: usize = 0x00;
pub const OFFSET_HEADER_SIZE: usize = 0x02;
pub const OFFSET_FILE_TYPE: usize = 0x04;
pub const OFFSET_BLOCK_SIZE: usize = 0x05;
pub const OFFSET_ROW_COUNT: usize = 0x06;
pub const OFFSET_USED_BLOCKS: usize = 0x0A;
pub const OFFSET_TOTAL_BLOCKS: usize = 0x0C;
pub const OFFSET_FIRST_BLOCK: usize = 0x0E;
pub const OFFSET_LAST_BLOCK: usize = 0x10;
pub const OFFSET_FIELD_COUNT: usize = 0x21;
pub const OFFSET_KEY_FIELD_COUNT: usize = 0x23;
pub const OFFSET_SORT_ORDER: usize = 0x29;
pub const OFFSET_VERSION: usize = 0x39;
pub const OFFSET_AUTO_INCREMENT: usize = 0x49;
pub const OFFSET_CODE_PAGE: usize = 0x6A;

const BLOCK_HEADER_LEN: usize = 6;

#[derive(Debug, Clone)]
pub struct FieldSpec {
    pub name: String,
    pub type_code: u8,
    pub size: u8,
}

/// Writes bit-exact `.DB` images: preamble, descriptors, names and a linked chain of data blocks.
///
/// This is not a general writer; it produces just enough structure to exercise the reader.
#[derive(Debug, Clone)]
pub struct TableBuilder {
    version: u8,
    code_page: u16,
    block_size_units: u8,
    fields: Vec<FieldSpec>,
    records: Vec<Vec<u8>>,
    records_per_block: Option<usize>,
    sort_order_name: Option<String>,
    next_auto_increment: u32,
}

/// A built table plus the geometry needed to patch it.
#[derive(Debug, Clone)]
pub struct TableImage {
    pub bytes: Vec<u8>,
    pub header_size: usize,
    pub block_size: usize,
    pub block_count: usize,
}

impl TableImage {
    /// Byte offset of data block `n` (1-based).
    pub fn block_start(&self, n: usize) -> usize {
        self.header_size + (n - 1) * self.block_size
    }

    pub fn set_next_block(&mut self, n: usize, next: u16) {
        let start = self.block_start(n);
        self.bytes[start..start + 2].copy_from_slice(&next.to_le_bytes());
    }

    pub fn patch_u16(&mut self, offset: usize, value: u16) {
        self.bytes[offset..offset + 2].copy_from_slice(&value.to_le_bytes());
    }

    pub fn patch_u32(&mut self, offset: usize, value: u32) {
        self.bytes[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
    }
}

impl Default for TableBuilder {
    fn default() -> Self {
        Self {
            version: FIRST_LONG_NAME_VERSION,
            code_page: 1252,
            block_size_units: 1,
            fields: Vec::new(),
            records: Vec::new(),
            records_per_block: None,
            sort_order_name: Some("ascii".to_string()),
            next_auto_increment: 1,
        }
    }
}

impl TableBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn version(mut self, version: u8) -> Self {
        self.version = version;
        self
    }

    pub fn code_page(mut self, code_page: u16) -> Self {
        self.code_page = code_page;
        self
    }

    pub fn block_size_units(mut self, units: u8) -> Self {
        self.block_size_units = units;
        self
    }

    /// Cap how many records each block holds (defaults to as many as fit).
    pub fn records_per_block(mut self, count: usize) -> Self {
        self.records_per_block = Some(count);
        self
    }

    pub fn sort_order_name(mut self, name: Option<&str>) -> Self {
        self.sort_order_name = name.map(str::to_string);
        self
    }

    pub fn next_auto_increment(mut self, value: u32) -> Self {
        self.next_auto_increment = value;
        self
    }

    pub fn field(self, name: &str, field_type: FieldType, size: u8) -> Self {
        self.raw_field(name, field_type.code(), size)
    }

    pub fn raw_field(mut self, name: &str, type_code: u8, size: u8) -> Self {
        self.fields.push(FieldSpec {
            name: name.to_string(),
            type_code,
            size,
        });
        self
    }

    pub fn record_size(&self) -> usize {
        self.fields
            .iter()
            .map(|field| match FieldType::from_code(field.type_code) {
                Some(field_type) => field_type.physical_width(field.size),
                None => usize::from(field.size),
            })
            .sum()
    }

    /// Append a record built from per-field cells; each cell must already have its field's width.
    pub fn record(mut self, cells: Vec<Vec<u8>>) -> Self {
        let record: Vec<u8> = cells.into_iter().flatten().collect();
        assert_eq!(record.len(), self.record_size(), "record width");
        self.records.push(record);
        self
    }

    pub fn raw_record(mut self, record: Vec<u8>) -> Self {
        self.records.push(record);
        self
    }

    fn header_bytes(&self, block_count: usize, block_size: usize) -> Vec<u8> {
        let extended = self.version >= FIRST_EXTENDED_VERSION;
        let preamble_len = if extended {
            EXTENDED_PREAMBLE_LEN
        } else {
            LEGACY_PREAMBLE_LEN
        };
        let table_name_len = if self.version >= FIRST_LONG_NAME_VERSION {
            261
        } else {
            79
        };

        let mut tail = Vec::new();
        for field in &self.fields {
            tail.push(field.type_code);
            tail.push(field.size);
        }
        tail.extend(std::iter::repeat(0u8).take(4 + 4 * self.fields.len()));
        tail.extend(std::iter::repeat(0u8).take(table_name_len));
        for field in &self.fields {
            tail.extend_from_slice(field.name.as_bytes());
            tail.push(0);
        }
        for index in 0..self.fields.len() {
            tail.extend_from_slice(&(index as u16 + 1).to_le_bytes());
        }
        if let Some(name) = &self.sort_order_name {
            tail.extend_from_slice(name.as_bytes());
            tail.push(0);
        }

        let needed = preamble_len + tail.len();
        let header_size = needed.div_ceil(0x800) * 0x800;
        let mut header = vec![0u8; header_size];

        let put16 = |header: &mut Vec<u8>, offset: usize, value: u16| {
            header[offset..offset + 2].copy_from_slice(&value.to_le_bytes());
        };
        put16(&mut header, OFFSET_RECORD_SIZE, self.record_size() as u16);
        put16(&mut header, OFFSET_HEADER_SIZE, header_size as u16);
        header[OFFSET_FILE_TYPE] = FILE_TYPE_UNKEYED;
        header[OFFSET_BLOCK_SIZE] = (block_size / BLOCK_SIZE_UNIT) as u8;
        header[OFFSET_ROW_COUNT..OFFSET_ROW_COUNT + 4]
            .copy_from_slice(&(self.records.len() as u32).to_le_bytes());
        put16(&mut header, OFFSET_USED_BLOCKS, block_count as u16);
        put16(&mut header, OFFSET_TOTAL_BLOCKS, block_count as u16);
        put16(&mut header, OFFSET_FIRST_BLOCK, u16::from(block_count > 0));
        put16(&mut header, OFFSET_LAST_BLOCK, block_count as u16);
        put16(&mut header, OFFSET_FIELD_COUNT, self.fields.len() as u16);
        header[OFFSET_VERSION] = self.version;
        header[OFFSET_AUTO_INCREMENT..OFFSET_AUTO_INCREMENT + 4]
            .copy_from_slice(&self.next_auto_increment.to_le_bytes());
        if extended {
            put16(&mut header, OFFSET_CODE_PAGE, self.code_page);
        }
        header[preamble_len..preamble_len + tail.len()].copy_from_slice(&tail);
        header
    }

    pub fn build_image(&self) -> TableImage {
        let record_size = self.record_size();
        let block_size = usize::from(self.block_size_units) * BLOCK_SIZE_UNIT;
        let capacity = (block_size - BLOCK_HEADER_LEN) / record_size.max(1);
        let per_block = self.records_per_block.unwrap_or(capacity).clamp(1, capacity.max(1));
        let chunks: Vec<&[Vec<u8>]> = self.records.chunks(per_block).collect();

        let mut bytes = self.header_bytes(chunks.len(), block_size);
        let header_size = bytes.len();
        for (index, records) in chunks.iter().enumerate() {
            let number = index + 1;
            let mut block = vec![0u8; block_size];
            let next = if number == chunks.len() { 0 } else { number + 1 };
            block[0..2].copy_from_slice(&(next as u16).to_le_bytes());
            block[2..4].copy_from_slice(&(number as u16 - 1).to_le_bytes());
            let add_size = (records.len() as i16 - 1) * record_size as i16;
            block[4..6].copy_from_slice(&add_size.to_le_bytes());
            for (slot, record) in records.iter().enumerate() {
                let start = BLOCK_HEADER_LEN + slot * record_size;
                block[start..start + record_size].copy_from_slice(record);
            }
            bytes.extend_from_slice(&block);
        }

        TableImage {
            bytes,
            header_size,
            block_size,
            block_count: chunks.len(),
        }
    }

    pub fn build(&self) -> Vec<u8> {
        self.build_image().bytes
    }
}

// Cell encoders. Each returns exactly the field's physical width.

pub fn alpha(text: &str, width: u8) -> Vec<u8> {
    let mut out = vec![0u8; usize::from(width)];
    let bytes = text.as_bytes();
    out[..bytes.len()].copy_from_slice(bytes);
    out
}

pub fn raw_alpha(bytes: &[u8], width: u8) -> Vec<u8> {
    let mut out = vec![0u8; usize::from(width)];
    out[..bytes.len()].copy_from_slice(bytes);
    out
}

pub fn short(value: i16) -> Vec<u8> {
    numeric::encode_short(value).to_vec()
}

pub fn long(value: i32) -> Vec<u8> {
    numeric::encode_long(value).to_vec()
}

pub fn auto_increment(value: u32) -> Vec<u8> {
    value.to_be_bytes().to_vec()
}

pub fn number(value: f64) -> Vec<u8> {
    numeric::encode_number(value).to_vec()
}

pub fn logical(value: bool) -> Vec<u8> {
    vec![numeric::encode_logical(value)]
}

pub fn date(value: NaiveDate) -> Vec<u8> {
    dates::encode_date(value).expect("date after the epoch floor").to_vec()
}

pub fn time(value: NaiveTime) -> Vec<u8> {
    dates::encode_time(value).to_vec()
}

pub fn timestamp(value: NaiveDateTime) -> Vec<u8> {
    let millis = dates::millis_from_timestamp(value).expect("timestamp after the epoch floor");
    numeric::encode_number(millis).to_vec()
}

pub fn bcd(value: Decimal, scale: u8) -> Vec<u8> {
    numeric::encode_bcd(value, scale)
        .expect("value fits 32 digits")
        .to_vec()
}

pub fn blank(width: usize) -> Vec<u8> {
    vec![0u8; width]
}

/// Large-object field cell with `inline` bytes in front of the pointer.
pub fn blob_cell(width: u8, inline: &[u8], offset: u32, length: u32, modification: u16) -> Vec<u8> {
    let width = usize::from(width);
    let mut out = vec![0u8; width];
    out[..inline.len()].copy_from_slice(inline);
    let pointer = LargeObjectPointer {
        offset,
        length,
        modification,
    };
    out[width - BLOB_POINTER_LEN..].copy_from_slice(&pointer.to_bytes());
    out
}

/// Writes `.MB` images chunk by chunk. Chunk 0 is always the file header.
#[derive(Debug, Clone)]
pub struct BlobFileBuilder {
    bytes: Vec<u8>,
}

impl Default for BlobFileBuilder {
    fn default() -> Self {
        let mut bytes = vec![0u8; MB_CHUNK_SIZE];
        bytes[0] = TAG_FILE_HEADER;
        bytes[1..3].copy_from_slice(&1u16.to_le_bytes());
        Self { bytes }
    }
}

impl BlobFileBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    fn chunk_aligned_start(&self) -> usize {
        debug_assert_eq!(self.bytes.len() % MB_CHUNK_SIZE, 0);
        self.bytes.len()
    }

    /// Add a single-value block; returns the pointer offset (with the no-index sentinel).
    pub fn single(&mut self, data: &[u8], modification: u16) -> u32 {
        let start = self.chunk_aligned_start();
        let chunks = (data.len() + SINGLE_HEADER_LEN).div_ceil(MB_CHUNK_SIZE);
        let mut block = vec![0u8; chunks * MB_CHUNK_SIZE];
        block[0] = TAG_SINGLE;
        block[1..3].copy_from_slice(&(chunks as u16).to_le_bytes());
        block[3..7].copy_from_slice(&(data.len() as u32).to_le_bytes());
        block[7..9].copy_from_slice(&modification.to_le_bytes());
        block[SINGLE_HEADER_LEN..SINGLE_HEADER_LEN + data.len()].copy_from_slice(data);
        self.bytes.extend_from_slice(&block);
        start as u32 | u32::from(NO_INDEX)
    }

    /// Add a one-chunk sub-allocated block holding `values`; returns one pointer offset each.
    pub fn suballocated(&mut self, values: &[&[u8]]) -> Vec<u32> {
        let start = self.chunk_aligned_start();
        let mut block = vec![0u8; MB_CHUNK_SIZE];
        block[0] = TAG_SUBALLOCATED;
        block[1..3].copy_from_slice(&1u16.to_le_bytes());

        // Slot data starts after the 64-entry table, on a 16-byte boundary.
        let mut data_at = (SLOT_TABLE_OFFSET + 64 * SLOT_ENTRY_LEN).div_ceil(SLOT_UNIT) * SLOT_UNIT;
        let mut offsets = Vec::with_capacity(values.len());
        for (index, value) in values.iter().enumerate() {
            let units = value.len().div_ceil(SLOT_UNIT);
            assert!(data_at + units * SLOT_UNIT <= MB_CHUNK_SIZE, "slot data overflows chunk");
            let entry = SLOT_TABLE_OFFSET + index * SLOT_ENTRY_LEN;
            block[entry] = (data_at / SLOT_UNIT) as u8;
            block[entry + 1] = units as u8;
            block[entry + 2..entry + 4].copy_from_slice(&1u16.to_le_bytes());
            block[entry + 4] = (value.len() % SLOT_UNIT) as u8;
            block[data_at..data_at + value.len()].copy_from_slice(value);
            data_at += units * SLOT_UNIT;
            offsets.push(start as u32 | index as u32);
        }
        self.bytes.extend_from_slice(&block);
        offsets
    }

    /// Add a reclaimed block; returns its offset with the no-index sentinel.
    pub fn free(&mut self) -> u32 {
        let start = self.chunk_aligned_start();
        let mut block = vec![0u8; MB_CHUNK_SIZE];
        block[0] = TAG_FREE;
        block[1..3].copy_from_slice(&1u16.to_le_bytes());
        self.bytes.extend_from_slice(&block);
        start as u32 | u32::from(NO_INDEX)
    }

    pub fn build(&self) -> Vec<u8> {
        self.bytes.clone()
    }
}
