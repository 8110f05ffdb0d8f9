//! Static catalog of on-disk field type codes.

use crate::value::ValueKind;

/// Width of the large-object pointer stored at the end of memo/blob fields.
pub const BLOB_POINTER_LEN: usize = 10;
/// Physical width of a packed BCD field, independent of its declared scale.
pub const BCD_WIDTH: usize = 17;
/// Highest scale a BCD field can declare (32 digit nibbles).
pub const BCD_MAX_SCALE: u8 = 32;

/// Logical field types, one per type code the format defines.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FieldType {
    Alpha,
    Date,
    Short,
    Long,
    Currency,
    Number,
    Logical,
    Memo,
    Blob,
    FormattedMemo,
    Ole,
    Graphic,
    Time,
    Timestamp,
    AutoIncrement,
    Bcd,
    Bytes,
}

struct CatalogEntry {
    code: u8,
    field_type: FieldType,
    kind: ValueKind,
    /// `None` means the physical width is the declared size.
    fixed_width: Option<usize>,
    name: &'static str,
}

#[rustfmt::skip]
const CATALOG: &[CatalogEntry] = &[
    CatalogEntry { code: 0x01, field_type: FieldType::Alpha, kind: ValueKind::Text, fixed_width: None, name: "ALPHA" },
    CatalogEntry { code: 0x02, field_type: FieldType::Date, kind: ValueKind::Date, fixed_width: Some(4), name: "DATE" },
    CatalogEntry { code: 0x03, field_type: FieldType::Short, kind: ValueKind::Integer, fixed_width: Some(2), name: "SHORT" },
    CatalogEntry { code: 0x04, field_type: FieldType::Long, kind: ValueKind::Integer, fixed_width: Some(4), name: "LONG" },
    CatalogEntry { code: 0x05, field_type: FieldType::Currency, kind: ValueKind::Number, fixed_width: Some(8), name: "CURRENCY" },
    CatalogEntry { code: 0x06, field_type: FieldType::Number, kind: ValueKind::Number, fixed_width: Some(8), name: "NUMBER" },
    CatalogEntry { code: 0x09, field_type: FieldType::Logical, kind: ValueKind::Boolean, fixed_width: Some(1), name: "LOGICAL" },
    CatalogEntry { code: 0x0C, field_type: FieldType::Memo, kind: ValueKind::Text, fixed_width: None, name: "MEMO" },
    CatalogEntry { code: 0x0D, field_type: FieldType::Blob, kind: ValueKind::Binary, fixed_width: None, name: "BLOB" },
    CatalogEntry { code: 0x0E, field_type: FieldType::FormattedMemo, kind: ValueKind::Text, fixed_width: None, name: "FMTMEMO" },
    CatalogEntry { code: 0x0F, field_type: FieldType::Ole, kind: ValueKind::Binary, fixed_width: None, name: "OLE" },
    CatalogEntry { code: 0x10, field_type: FieldType::Graphic, kind: ValueKind::Binary, fixed_width: None, name: "GRAPHIC" },
    CatalogEntry { code: 0x14, field_type: FieldType::Time, kind: ValueKind::Time, fixed_width: Some(4), name: "TIME" },
    CatalogEntry { code: 0x15, field_type: FieldType::Timestamp, kind: ValueKind::Timestamp, fixed_width: Some(8), name: "TIMESTAMP" },
    CatalogEntry { code: 0x16, field_type: FieldType::AutoIncrement, kind: ValueKind::Integer, fixed_width: Some(4), name: "AUTOINC" },
    CatalogEntry { code: 0x17, field_type: FieldType::Bcd, kind: ValueKind::Decimal, fixed_width: Some(BCD_WIDTH), name: "BCD" },
    CatalogEntry { code: 0x18, field_type: FieldType::Bytes, kind: ValueKind::Binary, fixed_width: None, name: "BYTES" },
];

impl FieldType {
    pub fn from_code(code: u8) -> Option<Self> {
        CATALOG
            .iter()
            .find(|entry| entry.code == code)
            .map(|entry| entry.field_type)
    }

    // Catalog rows are listed in variant order.
    fn entry(self) -> &'static CatalogEntry {
        &CATALOG[self as usize]
    }

    pub fn code(self) -> u8 {
        self.entry().code
    }

    pub fn value_kind(self) -> ValueKind {
        self.entry().kind
    }

    pub fn name(self) -> &'static str {
        self.entry().name
    }

    /// Bytes the field occupies inside a record given its declared size byte.
    pub fn physical_width(self, declared_size: u8) -> usize {
        self.entry()
            .fixed_width
            .unwrap_or(usize::from(declared_size))
    }

    /// Memo, blob, formatted memo, OLE and graphic fields store a pointer into the companion file.
    pub fn is_large_object(self) -> bool {
        matches!(
            self,
            FieldType::Memo
                | FieldType::Blob
                | FieldType::FormattedMemo
                | FieldType::Ole
                | FieldType::Graphic
        )
    }
}
