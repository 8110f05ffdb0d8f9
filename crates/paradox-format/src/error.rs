use std::path::PathBuf;

pub type FormatResult<T> = Result<T, FormatError>;

/// Errors raised while decoding Paradox table and large-object files.
///
/// Every structural variant is fatal: a malformed file is never coerced into default values, so
/// callers always see the table (and where relevant the field or block) that failed.
#[derive(Debug, thiserror::Error)]
pub enum FormatError {
    #[error("I/O error reading {context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("table {table}: large-object file {} is missing", path.display())]
    MissingCompanionFile { table: String, path: PathBuf },

    #[error("table {table}: malformed header: {reason}")]
    MalformedHeader { table: String, reason: String },

    #[error("table {table}: block {block}: {reason}")]
    BlockChain {
        table: String,
        block: u32,
        reason: String,
    },

    #[error("table {table}: field {field} has unsupported type code 0x{type_code:02X}")]
    UnsupportedFieldType {
        table: String,
        field: String,
        type_code: u8,
    },

    #[error("table {table}: field {field}: invalid value: {reason}")]
    InvalidFieldValue {
        table: String,
        field: String,
        reason: String,
    },

    #[error("table {table}: field {field}: large-object block at 0x{offset:08X}: {reason}")]
    BlobBlock {
        table: String,
        field: String,
        offset: u32,
        reason: String,
    },

    #[error(
        "table {table}: field {field}: large-object length {declared} exceeds block capacity {capacity} (block at 0x{offset:08X})"
    )]
    BlobSizeExceeded {
        table: String,
        field: String,
        offset: u32,
        declared: u32,
        capacity: u32,
    },
}

impl FormatError {
    pub(crate) fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    pub(crate) fn malformed(table: &str, reason: impl Into<String>) -> Self {
        Self::MalformedHeader {
            table: table.to_string(),
            reason: reason.into(),
        }
    }

    pub(crate) fn block_chain(table: &str, block: u32, reason: impl Into<String>) -> Self {
        Self::BlockChain {
            table: table.to_string(),
            block,
            reason: reason.into(),
        }
    }

    /// Whether the error describes a damaged or unsupported file rather than an I/O failure.
    pub fn is_structural(&self) -> bool {
        !matches!(self, Self::Io { .. } | Self::MissingCompanionFile { .. })
    }
}
