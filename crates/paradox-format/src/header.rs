//! Table header (preamble) parsing.
//!
//! All multi-byte preamble fields are little-endian. Offsets of the field descriptor region and
//! the presence of the code-page slot depend on the format version: version ids 5 and later carry
//! a 32-byte extended header between the common preamble and the descriptors.

use encoding_rs::Encoding;

use crate::charset;
use crate::error::{FormatError, FormatResult};
use crate::options::{Advisory, OpenOptions};
use crate::types::{FieldType, BCD_MAX_SCALE, BLOB_POINTER_LEN};
use crate::value::ValueKind;

const OFFSET_RECORD_SIZE: usize = 0x00;
const OFFSET_HEADER_SIZE: usize = 0x02;
const OFFSET_FILE_TYPE: usize = 0x04;
const OFFSET_BLOCK_SIZE: usize = 0x05;
const OFFSET_ROW_COUNT: usize = 0x06;
const OFFSET_USED_BLOCKS: usize = 0x0A;
const OFFSET_TOTAL_BLOCKS: usize = 0x0C;
const OFFSET_FIRST_BLOCK: usize = 0x0E;
const OFFSET_LAST_BLOCK: usize = 0x10;
const OFFSET_FIELD_COUNT: usize = 0x21;
const OFFSET_KEY_FIELD_COUNT: usize = 0x23;
const OFFSET_SORT_ORDER: usize = 0x29;
const OFFSET_VERSION: usize = 0x39;
const OFFSET_AUTO_INCREMENT: usize = 0x49;
const OFFSET_CODE_PAGE: usize = 0x6A;

/// End of the common preamble; field descriptors start here for legacy versions.
pub const LEGACY_PREAMBLE_LEN: usize = 0x58;
/// End of the extended header; field descriptors start here for version 5 and later.
pub const EXTENDED_PREAMBLE_LEN: usize = 0x78;
/// First version id that carries the extended header (and with it the code-page slot).
pub const FIRST_EXTENDED_VERSION: u8 = 5;
/// First version id whose table-name slot is 261 bytes instead of 79.
pub const FIRST_LONG_NAME_VERSION: u8 = 12;
/// Block sizes are stored as multiples of this unit.
pub const BLOCK_SIZE_UNIT: usize = 0x400;

const SHORT_TABLE_NAME_LEN: usize = 79;
const LONG_TABLE_NAME_LEN: usize = 261;

/// File type byte of a keyed (primary-indexed) table.
pub const FILE_TYPE_KEYED: u8 = 0;
/// File type byte of an unkeyed table.
pub const FILE_TYPE_UNKEYED: u8 = 2;

/// One field of a table, in declaration order.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldDescriptor {
    pub name: String,
    pub field_type: FieldType,
    /// Raw size byte from the header. For BCD fields this is the scale.
    pub declared_size: u8,
    /// Bytes the field occupies inside each record.
    pub width: usize,
    /// Zero-based field position.
    pub ordinal: usize,
    /// Byte offset of the field inside a record.
    pub offset: usize,
}

impl FieldDescriptor {
    pub fn value_kind(&self) -> ValueKind {
        self.field_type.value_kind()
    }

    /// Bytes of a large-object value that may be stored inline in front of the pointer.
    pub fn inline_allowance(&self) -> usize {
        if self.field_type.is_large_object() {
            self.width.saturating_sub(BLOB_POINTER_LEN)
        } else {
            0
        }
    }
}

/// Immutable description of an opened table.
#[derive(Debug, Clone)]
pub struct TableSchema {
    pub(crate) name: String,
    pub(crate) record_size: usize,
    pub(crate) header_size: usize,
    pub(crate) block_size: usize,
    pub(crate) file_type: u8,
    pub(crate) version: u8,
    pub(crate) row_count: u32,
    pub(crate) used_blocks: u16,
    pub(crate) total_blocks: u16,
    pub(crate) first_block: u16,
    pub(crate) last_block: u16,
    pub(crate) key_field_count: u16,
    pub(crate) next_auto_increment: u32,
    pub(crate) fields: Vec<FieldDescriptor>,
    pub(crate) field_order: Vec<u16>,
    pub(crate) code_page: Option<u16>,
    pub(crate) sort_order: u8,
    pub(crate) sort_order_name: Option<String>,
    pub(crate) encoding: &'static Encoding,
    pub(crate) advisories: Vec<Advisory>,
}

impl TableSchema {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn record_size(&self) -> usize {
        self.record_size
    }

    pub fn header_size(&self) -> usize {
        self.header_size
    }

    pub fn block_size(&self) -> usize {
        self.block_size
    }

    pub fn file_type(&self) -> u8 {
        self.file_type
    }

    pub fn version(&self) -> u8 {
        self.version
    }

    pub fn is_extended_format(&self) -> bool {
        self.version >= FIRST_EXTENDED_VERSION
    }

    pub fn row_count(&self) -> u32 {
        self.row_count
    }

    pub fn used_blocks(&self) -> u16 {
        self.used_blocks
    }

    pub fn total_blocks(&self) -> u16 {
        self.total_blocks
    }

    pub fn first_block(&self) -> u16 {
        self.first_block
    }

    pub fn last_block(&self) -> u16 {
        self.last_block
    }

    pub fn key_field_count(&self) -> u16 {
        self.key_field_count
    }

    pub fn next_auto_increment(&self) -> u32 {
        self.next_auto_increment
    }

    pub fn fields(&self) -> &[FieldDescriptor] {
        &self.fields
    }

    pub fn field(&self, name: &str) -> Option<&FieldDescriptor> {
        self.fields
            .iter()
            .find(|field| field.name.eq_ignore_ascii_case(name))
    }

    /// Field-order index table stored after the field names.
    pub fn field_order(&self) -> &[u16] {
        &self.field_order
    }

    pub fn code_page(&self) -> Option<u16> {
        self.code_page
    }

    /// Sort-order identifier naming the collation/code-page pairing the table was written with.
    pub fn sort_order(&self) -> u8 {
        self.sort_order
    }

    pub fn sort_order_name(&self) -> Option<&str> {
        self.sort_order_name.as_deref()
    }

    pub fn encoding(&self) -> &'static Encoding {
        self.encoding
    }

    pub fn advisories(&self) -> &[Advisory] {
        &self.advisories
    }

    /// Records that fit in one block after its 6-byte block header.
    pub fn records_per_block(&self) -> usize {
        if self.record_size == 0 {
            return 0;
        }
        self.block_size.saturating_sub(crate::blocks::BLOCK_HEADER_LEN) / self.record_size
    }
}

struct HeaderCursor<'a> {
    table: &'a str,
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> HeaderCursor<'a> {
    fn new(table: &'a str, bytes: &'a [u8], pos: usize) -> Self {
        Self { table, bytes, pos }
    }

    fn take(&mut self, len: usize, what: &str) -> FormatResult<&'a [u8]> {
        let end = self.pos.checked_add(len).ok_or_else(|| {
            FormatError::malformed(self.table, format!("{what} offset overflow"))
        })?;
        let slice = self.bytes.get(self.pos..end).ok_or_else(|| {
            FormatError::malformed(
                self.table,
                format!(
                    "{what} at offset 0x{:X} runs past the {}-byte header",
                    self.pos,
                    self.bytes.len()
                ),
            )
        })?;
        self.pos = end;
        Ok(slice)
    }

    fn skip(&mut self, len: usize, what: &str) -> FormatResult<()> {
        self.take(len, what).map(|_| ())
    }

    fn u8(&mut self, what: &str) -> FormatResult<u8> {
        Ok(self.take(1, what)?[0])
    }

    fn u16(&mut self, what: &str) -> FormatResult<u16> {
        let b = self.take(2, what)?;
        Ok(u16::from_le_bytes([b[0], b[1]]))
    }

    fn c_string(&mut self, what: &str) -> FormatResult<&'a [u8]> {
        let rest = self.bytes.get(self.pos..).unwrap_or(&[]);
        let len = rest.iter().position(|b| *b == 0).ok_or_else(|| {
            FormatError::malformed(self.table, format!("unterminated {what}"))
        })?;
        let value = &rest[..len];
        self.pos += len + 1;
        Ok(value)
    }
}

fn read_u16(bytes: &[u8], offset: usize) -> u16 {
    u16::from_le_bytes([bytes[offset], bytes[offset + 1]])
}

fn read_u32(bytes: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes([
        bytes[offset],
        bytes[offset + 1],
        bytes[offset + 2],
        bytes[offset + 3],
    ])
}

/// Peek the header size from the first bytes of a table file.
pub(crate) fn peek_header_size(table: &str, prefix: &[u8]) -> FormatResult<usize> {
    if prefix.len() < OFFSET_HEADER_SIZE + 2 {
        return Err(FormatError::malformed(table, "file is shorter than the preamble"));
    }
    Ok(usize::from(read_u16(prefix, OFFSET_HEADER_SIZE)))
}

/// Parse a table header into a [`TableSchema`].
///
/// `header` must hold at least the first `header_size` bytes of the file.
pub fn parse_table_header(
    table: &str,
    header: &[u8],
    options: &OpenOptions,
) -> FormatResult<TableSchema> {
    if header.len() < LEGACY_PREAMBLE_LEN {
        return Err(FormatError::malformed(
            table,
            format!(
                "preamble needs {LEGACY_PREAMBLE_LEN} bytes, found {}",
                header.len()
            ),
        ));
    }

    let record_size = usize::from(read_u16(header, OFFSET_RECORD_SIZE));
    let header_size = usize::from(read_u16(header, OFFSET_HEADER_SIZE));
    let file_type = header[OFFSET_FILE_TYPE];
    let block_size = usize::from(header[OFFSET_BLOCK_SIZE]) * BLOCK_SIZE_UNIT;
    let row_count = read_u32(header, OFFSET_ROW_COUNT);
    let used_blocks = read_u16(header, OFFSET_USED_BLOCKS);
    let total_blocks = read_u16(header, OFFSET_TOTAL_BLOCKS);
    let first_block = read_u16(header, OFFSET_FIRST_BLOCK);
    let last_block = read_u16(header, OFFSET_LAST_BLOCK);
    let field_count = usize::from(read_u16(header, OFFSET_FIELD_COUNT));
    let key_field_count = read_u16(header, OFFSET_KEY_FIELD_COUNT);
    let sort_order = header[OFFSET_SORT_ORDER];
    let version = header[OFFSET_VERSION];
    let next_auto_increment = read_u32(header, OFFSET_AUTO_INCREMENT);

    if file_type != FILE_TYPE_KEYED && file_type != FILE_TYPE_UNKEYED {
        return Err(FormatError::malformed(
            table,
            format!("file type {file_type} is not a data table"),
        ));
    }

    let extended = version >= FIRST_EXTENDED_VERSION;
    let preamble_len = if extended {
        EXTENDED_PREAMBLE_LEN
    } else {
        LEGACY_PREAMBLE_LEN
    };
    if header_size < preamble_len {
        return Err(FormatError::malformed(
            table,
            format!("header size {header_size} is smaller than the {preamble_len}-byte preamble"),
        ));
    }
    if header.len() < header_size {
        return Err(FormatError::malformed(
            table,
            format!(
                "header declares {header_size} bytes but only {} are present",
                header.len()
            ),
        ));
    }
    let header = &header[..header_size];

    if block_size == 0 {
        return Err(FormatError::malformed(table, "block size is zero"));
    }
    if record_size == 0 && row_count > 0 {
        return Err(FormatError::malformed(
            table,
            format!("record size is zero but the table holds {row_count} rows"),
        ));
    }
    if record_size + crate::blocks::BLOCK_HEADER_LEN > block_size {
        return Err(FormatError::malformed(
            table,
            format!("record size {record_size} does not fit in a {block_size}-byte block"),
        ));
    }
    if field_count == 0 {
        return Err(FormatError::malformed(table, "table declares no fields"));
    }
    if used_blocks > total_blocks {
        return Err(FormatError::malformed(
            table,
            format!("{used_blocks} used blocks exceed the {total_blocks} allocated"),
        ));
    }
    if first_block == 0 && row_count > 0 {
        return Err(FormatError::malformed(
            table,
            format!("block chain is empty but the table holds {row_count} rows"),
        ));
    }

    let code_page = extended.then(|| read_u16(header, OFFSET_CODE_PAGE));

    let mut cursor = HeaderCursor::new(table, header, preamble_len);
    let mut raw_fields = Vec::with_capacity(field_count);
    for _ in 0..field_count {
        let type_code = cursor.u8("field descriptor")?;
        let size = cursor.u8("field descriptor")?;
        raw_fields.push((type_code, size));
    }

    // Table-name pointer followed by one name pointer per field; both are runtime-only slots.
    cursor.skip(4 + 4 * field_count, "name pointer table")?;
    let name_len = if version >= FIRST_LONG_NAME_VERSION {
        LONG_TABLE_NAME_LEN
    } else {
        SHORT_TABLE_NAME_LEN
    };
    cursor.skip(name_len, "table name")?;

    let mut advisories = Vec::new();
    let encoding = charset::resolve_encoding(table, code_page, options, &mut advisories);

    let mut fields = Vec::with_capacity(field_count);
    let mut offset = 0usize;
    for (ordinal, (type_code, declared_size)) in raw_fields.into_iter().enumerate() {
        let raw_name = cursor.c_string("field name")?;
        let name = charset::decode_text(encoding, raw_name);

        let field_type =
            FieldType::from_code(type_code).ok_or_else(|| FormatError::UnsupportedFieldType {
                table: table.to_string(),
                field: name.clone(),
                type_code,
            })?;

        if field_type.is_large_object() && usize::from(declared_size) < BLOB_POINTER_LEN {
            return Err(FormatError::malformed(
                table,
                format!(
                    "large-object field {name} is {declared_size} bytes, narrower than its {BLOB_POINTER_LEN}-byte pointer"
                ),
            ));
        }
        if field_type == FieldType::Bcd && declared_size > BCD_MAX_SCALE {
            return Err(FormatError::malformed(
                table,
                format!("BCD field {name} declares scale {declared_size} (max {BCD_MAX_SCALE})"),
            ));
        }

        let width = field_type.physical_width(declared_size);
        fields.push(FieldDescriptor {
            name,
            field_type,
            declared_size,
            width,
            ordinal,
            offset,
        });
        offset += width;
    }

    if offset != record_size {
        return Err(FormatError::malformed(
            table,
            format!("field widths sum to {offset} bytes but the record size is {record_size}"),
        ));
    }

    let mut field_order = Vec::with_capacity(field_count);
    for _ in 0..field_count {
        field_order.push(cursor.u16("field order table")?);
    }

    // The sort-order name is optional; older writers stop right after the field order table.
    let sort_order_name = cursor
        .c_string("sort order name")
        .ok()
        .filter(|raw| !raw.is_empty())
        .map(|raw| charset::decode_text(encoding, raw));

    log::debug!(
        "opened table {table}: version {version}, {field_count} fields, {row_count} rows, {used_blocks}/{total_blocks} blocks of {block_size} bytes"
    );

    Ok(TableSchema {
        name: table.to_string(),
        record_size,
        header_size,
        block_size,
        file_type,
        version,
        row_count,
        used_blocks,
        total_blocks,
        first_block,
        last_block,
        key_field_count,
        next_auto_increment,
        fields,
        field_order,
        code_page,
        sort_order,
        sort_order_name,
        encoding,
        advisories,
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use encoding_rs::WINDOWS_1252;

    /// Schema with a 20-byte record (NAME A10, BORN D, ID I, QTY S) and arbitrary block geometry.
    pub(crate) fn schema_with_blocks(
        block_size: usize,
        total_blocks: u16,
        used_blocks: u16,
        first_block: u16,
    ) -> TableSchema {
        let layout = [
            ("NAME", FieldType::Alpha, 10u8),
            ("BORN", FieldType::Date, 4),
            ("ID", FieldType::Long, 4),
            ("QTY", FieldType::Short, 2),
        ];
        let mut offset = 0;
        let fields = layout
            .iter()
            .enumerate()
            .map(|(ordinal, (name, field_type, size))| {
                let width = field_type.physical_width(*size);
                let field = FieldDescriptor {
                    name: name.to_string(),
                    field_type: *field_type,
                    declared_size: *size,
                    width,
                    ordinal,
                    offset,
                };
                offset += width;
                field
            })
            .collect();

        TableSchema {
            name: "FIXTURE".to_string(),
            record_size: offset,
            header_size: 128,
            block_size,
            file_type: FILE_TYPE_UNKEYED,
            version: 12,
            row_count: 0,
            used_blocks,
            total_blocks,
            first_block,
            last_block: 0,
            key_field_count: 0,
            next_auto_increment: 0,
            fields,
            field_order: vec![1, 2, 3, 4],
            code_page: Some(1252),
            sort_order: 0,
            sort_order_name: None,
            encoding: WINDOWS_1252,
            advisories: Vec::new(),
        }
    }

    fn legacy_preamble(record_size: u16, header_size: u16, field_count: u16) -> Vec<u8> {
        let mut bytes = vec![0u8; usize::from(header_size)];
        bytes[OFFSET_RECORD_SIZE..OFFSET_RECORD_SIZE + 2].copy_from_slice(&record_size.to_le_bytes());
        bytes[OFFSET_HEADER_SIZE..OFFSET_HEADER_SIZE + 2].copy_from_slice(&header_size.to_le_bytes());
        bytes[OFFSET_FILE_TYPE] = FILE_TYPE_UNKEYED;
        bytes[OFFSET_BLOCK_SIZE] = 1;
        bytes[OFFSET_FIELD_COUNT..OFFSET_FIELD_COUNT + 2].copy_from_slice(&field_count.to_le_bytes());
        bytes[OFFSET_VERSION] = 3;
        bytes
    }

    #[test]
    fn legacy_header_has_no_code_page() {
        let mut bytes = legacy_preamble(4, 0x200, 1);
        let mut pos = LEGACY_PREAMBLE_LEN;
        bytes[pos] = FieldType::Long.code();
        bytes[pos + 1] = 4;
        pos += 2 + 4 + 4 + SHORT_TABLE_NAME_LEN;
        bytes[pos..pos + 3].copy_from_slice(b"ID\0");
        pos += 3;
        bytes[pos..pos + 2].copy_from_slice(&1u16.to_le_bytes());

        let schema = parse_table_header("LEGACY", &bytes, &OpenOptions::default()).unwrap();
        assert!(!schema.is_extended_format());
        assert_eq!(schema.code_page(), None);
        assert_eq!(schema.encoding(), WINDOWS_1252);
        assert_eq!(schema.fields()[0].name, "ID");
        assert_eq!(schema.field_order(), &[1]);
        assert_eq!(schema.sort_order_name(), None);
        assert_eq!(schema.block_size(), BLOCK_SIZE_UNIT);
    }

    #[test]
    fn rejects_non_table_file_type() {
        let mut bytes = legacy_preamble(4, 0x200, 1);
        bytes[OFFSET_FILE_TYPE] = 1;
        let err = parse_table_header("IDX", &bytes, &OpenOptions::default()).unwrap_err();
        assert!(matches!(err, FormatError::MalformedHeader { .. }), "{err}");
    }

    #[test]
    fn rejects_header_smaller_than_preamble() {
        let mut bytes = legacy_preamble(4, 0x200, 1);
        bytes[OFFSET_HEADER_SIZE..OFFSET_HEADER_SIZE + 2].copy_from_slice(&0x40u16.to_le_bytes());
        let err = parse_table_header("SHORT", &bytes, &OpenOptions::default()).unwrap_err();
        assert!(err.to_string().contains("smaller than"), "{err}");
    }

    #[test]
    fn records_per_block_excludes_block_header() {
        let schema = schema_with_blocks(64, 1, 1, 1);
        assert_eq!(schema.record_size(), 20);
        assert_eq!(schema.records_per_block(), 2);
    }
}
