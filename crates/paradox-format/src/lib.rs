//! Read-only decoding of Paradox `.DB` tables and their `.MB` large-object companions.
//!
//! [`ParadoxTable::open`] parses the table header into a [`TableSchema`]; [`ParadoxTable::scan`]
//! walks the data block chain and decodes each record into a [`Row`] of typed [`Value`]s. Memo,
//! blob and graphic fields are resolved against the companion file on demand and cached per
//! table handle.
//!
//! Malformed input is always reported as a [`FormatError`]; nothing is silently coerced.

pub mod blob;
pub mod blocks;
mod charset;
pub mod dates;
mod error;
mod fields;
mod header;
pub mod numeric;
mod options;
mod rows;
mod table;
mod types;
mod value;

pub use blob::{BlockCache, LargeObjectPointer};
pub use blocks::{Block, BlockWalker};
pub use error::{FormatError, FormatResult};
pub use fields::RecordDecoder;
pub use header::{
    parse_table_header, FieldDescriptor, TableSchema, BLOCK_SIZE_UNIT, EXTENDED_PREAMBLE_LEN,
    FILE_TYPE_KEYED, FILE_TYPE_UNKEYED, FIRST_EXTENDED_VERSION, FIRST_LONG_NAME_VERSION,
    LEGACY_PREAMBLE_LEN,
};
pub use options::{Advisory, OpenOptions, DEFAULT_CODE_PAGE};
pub use rows::RowIter;
pub use table::{find_companion, ParadoxTable};
pub use types::{FieldType, BCD_MAX_SCALE, BCD_WIDTH, BLOB_POINTER_LEN};
pub use value::{Row, Value, ValueKind};

pub use encoding_rs::Encoding;
pub use rust_decimal::{Decimal, RoundingStrategy};
