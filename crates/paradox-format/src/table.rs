use std::fs::File;
use std::io::{Cursor, ErrorKind, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::blob::{BlobSource, BlockCache, LargeObjectReader, ReadSeek};
use crate::blocks::BlockWalker;
use crate::error::{FormatError, FormatResult};
use crate::fields::RecordDecoder;
use crate::header::{self, TableSchema};
use crate::options::OpenOptions;
use crate::rows::RowIter;
use crate::value::Row;

const COMPANION_EXTENSIONS: [&str; 2] = ["MB", "mb"];

enum Storage {
    File {
        path: PathBuf,
        /// Companion file found next to the table, if any.
        companion: Option<PathBuf>,
    },
    Memory {
        table: Arc<[u8]>,
        blob: Option<Arc<[u8]>>,
    },
}

/// An opened Paradox table.
///
/// The handle owns the parsed schema and the large-object cache shared by all of its scans. Every
/// scan opens its own readers, so scans may run concurrently from different threads.
pub struct ParadoxTable {
    schema: Arc<TableSchema>,
    decoder: RecordDecoder,
    storage: Storage,
    cache: BlockCache,
}

impl std::fmt::Debug for ParadoxTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ParadoxTable")
            .field("name", &self.schema.name())
            .field("rows", &self.schema.row_count())
            .field("cached_blobs", &self.cache.len())
            .finish()
    }
}

/// Look for `<stem>.MB` (then `<stem>.mb`) next to `path`.
pub fn find_companion(path: &Path) -> Option<PathBuf> {
    COMPANION_EXTENSIONS
        .iter()
        .map(|ext| path.with_extension(ext))
        .find(|candidate| candidate.is_file())
}

fn table_name(path: &Path) -> String {
    path.file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

fn read_header(name: &str, reader: &mut impl Read) -> FormatResult<Vec<u8>> {
    let context = || format!("header of table {name}");
    let mut prefix = [0u8; 4];
    reader.read_exact(&mut prefix).map_err(|err| {
        if err.kind() == ErrorKind::UnexpectedEof {
            FormatError::malformed(name, "file is shorter than the preamble")
        } else {
            FormatError::io(context(), err)
        }
    })?;
    let header_size = header::peek_header_size(name, &prefix)?;

    let mut header = vec![0u8; header_size.max(prefix.len())];
    header[..prefix.len()].copy_from_slice(&prefix);
    reader.read_exact(&mut header[prefix.len()..]).map_err(|err| {
        if err.kind() == ErrorKind::UnexpectedEof {
            FormatError::malformed(
                name,
                format!("file ends inside the {header_size}-byte header"),
            )
        } else {
            FormatError::io(context(), err)
        }
    })?;
    Ok(header)
}

impl ParadoxTable {
    /// Open a `.DB` file and parse its header. The companion `.MB` file is located now but only
    /// read when a scan touches an externally stored value.
    pub fn open(path: impl AsRef<Path>, options: &OpenOptions) -> FormatResult<Self> {
        let path = path.as_ref();
        let name = table_name(path);
        let mut file = File::open(path)
            .map_err(|err| FormatError::io(format!("table file {}", path.display()), err))?;
        let header = read_header(&name, &mut file)?;
        let schema = header::parse_table_header(&name, &header, options)?;
        let companion = find_companion(path);
        if companion.is_none() && schema.fields().iter().any(|f| f.field_type.is_large_object()) {
            log::debug!("table {name}: no large-object file next to {}", path.display());
        }

        Ok(Self::with_storage(
            schema,
            options,
            Storage::File {
                path: path.to_path_buf(),
                companion,
            },
        ))
    }

    /// Open a table held in memory, with an optional large-object image.
    pub fn from_bytes(
        name: &str,
        table: impl Into<Arc<[u8]>>,
        blob: Option<Arc<[u8]>>,
        options: &OpenOptions,
    ) -> FormatResult<Self> {
        let table = table.into();
        let header = read_header(name, &mut Cursor::new(&table[..]))?;
        let schema = header::parse_table_header(name, &header, options)?;
        Ok(Self::with_storage(schema, options, Storage::Memory { table, blob }))
    }

    #[cfg(test)]
    pub(crate) fn from_schema_and_bytes(
        schema: TableSchema,
        table: Vec<u8>,
        blob: Option<Vec<u8>>,
    ) -> Self {
        Self::with_storage(
            schema,
            &OpenOptions::default(),
            Storage::Memory {
                table: table.into(),
                blob: blob.map(Into::into),
            },
        )
    }

    fn with_storage(schema: TableSchema, options: &OpenOptions, storage: Storage) -> Self {
        for advisory in schema.advisories() {
            log::debug!("{}", advisory.message);
        }
        let schema = Arc::new(schema);
        Self {
            decoder: RecordDecoder::new(schema.clone(), options.decimal_rounding),
            schema,
            storage,
            cache: BlockCache::default(),
        }
    }

    pub fn name(&self) -> &str {
        self.schema.name()
    }

    pub fn schema(&self) -> &Arc<TableSchema> {
        &self.schema
    }

    /// Path of the table file, for file-backed tables.
    pub fn path(&self) -> Option<&Path> {
        match &self.storage {
            Storage::File { path, .. } => Some(path),
            Storage::Memory { .. } => None,
        }
    }

    pub fn companion_path(&self) -> Option<&Path> {
        match &self.storage {
            Storage::File { companion, .. } => companion.as_deref(),
            Storage::Memory { .. } => None,
        }
    }

    /// Large-object values resolved so far, shared by every scan of this handle.
    pub fn cache(&self) -> &BlockCache {
        &self.cache
    }

    fn open_readers(&self) -> FormatResult<(Box<dyn ReadSeek>, BlobSource)> {
        match &self.storage {
            Storage::File { path, companion } => {
                let table = File::open(path)
                    .map_err(|err| FormatError::io(format!("table file {}", path.display()), err))?;
                let blob = match companion {
                    Some(companion) => BlobSource::Reader(Box::new(File::open(companion).map_err(
                        |err| FormatError::io(format!("large-object file {}", companion.display()), err),
                    )?)),
                    None => BlobSource::Missing(path.with_extension(COMPANION_EXTENSIONS[0])),
                };
                Ok((Box::new(table), blob))
            }
            Storage::Memory { table, blob } => {
                let blob = match blob {
                    Some(blob) => BlobSource::Reader(Box::new(Cursor::new(blob.clone()))),
                    None => BlobSource::Missing(PathBuf::from(format!(
                        "{}.{}",
                        self.name(),
                        COMPANION_EXTENSIONS[0]
                    ))),
                };
                Ok((Box::new(Cursor::new(table.clone())), blob))
            }
        }
    }

    /// Start a scan. Fields whose `mask` entry is `false` (or missing) are returned as NULL
    /// without being decoded; `None` decodes every field.
    pub fn scan(&self, mask: Option<&[bool]>) -> FormatResult<RowIter<'_>> {
        let (table, blob) = self.open_readers()?;
        let walker = BlockWalker::new(&self.schema, table);
        let blobs = LargeObjectReader::new(&self.schema, blob, &self.cache);
        Ok(RowIter::new(
            &self.decoder,
            walker,
            blobs,
            mask.map(<[bool]>::to_vec),
        ))
    }

    pub fn rows(&self) -> FormatResult<RowIter<'_>> {
        self.scan(None)
    }

    /// Decode every row into memory.
    pub fn read_all(&self) -> FormatResult<Vec<Row>> {
        self.rows()?.collect()
    }

    /// Release the handle. Equivalent to dropping it.
    pub fn close(self) {}
}

impl Drop for ParadoxTable {
    fn drop(&mut self) {
        if !self.cache.is_empty() {
            log::debug!(
                "table {}: dropping {} cached large-object values",
                self.schema.name(),
                self.cache.len()
            );
        }
        self.cache.clear();
    }
}
