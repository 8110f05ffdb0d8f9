//! Data block chain traversal.

use std::io::{ErrorKind, Read, Seek, SeekFrom};

use crate::error::{FormatError, FormatResult};
use crate::header::TableSchema;

/// Bytes of bookkeeping at the start of every data block: next, previous, additional size.
pub const BLOCK_HEADER_LEN: usize = 6;

/// One fixed-size data block.
#[derive(Debug, Clone)]
pub struct Block {
    pub number: u16,
    /// Next block in the chain; 0 ends it.
    pub next: u16,
    pub prev: u16,
    /// Byte offset of the last record in the block; negative means the block is empty.
    pub add_size: i16,
    data: Vec<u8>,
}

impl Block {
    pub fn parse(number: u16, bytes: Vec<u8>) -> Option<Self> {
        if bytes.len() < BLOCK_HEADER_LEN {
            return None;
        }
        Some(Self {
            number,
            next: u16::from_le_bytes([bytes[0], bytes[1]]),
            prev: u16::from_le_bytes([bytes[2], bytes[3]]),
            add_size: i16::from_le_bytes([bytes[4], bytes[5]]),
            data: bytes,
        })
    }

    pub fn record_count(&self, record_size: usize) -> usize {
        if self.add_size < 0 || record_size == 0 {
            return 0;
        }
        self.add_size as usize / record_size + 1
    }

    /// Bytes of the `index`-th record, or `None` past the end of the block.
    pub fn record(&self, index: usize, record_size: usize) -> Option<&[u8]> {
        let start = BLOCK_HEADER_LEN.checked_add(index.checked_mul(record_size)?)?;
        self.data.get(start..start.checked_add(record_size)?)
    }
}

/// Lazily follows a table's block chain from its first block.
///
/// Each walker owns its reader, so concurrent scans never share a file position. Construct a new
/// walker to restart from the beginning.
pub struct BlockWalker<'a, R> {
    schema: &'a TableSchema,
    reader: R,
    next: u16,
    visited: Vec<bool>,
    walked: usize,
    done: bool,
}

impl<'a, R: Read + Seek> BlockWalker<'a, R> {
    pub fn new(schema: &'a TableSchema, reader: R) -> Self {
        Self {
            schema,
            reader,
            next: schema.first_block,
            visited: vec![false; usize::from(schema.total_blocks) + 1],
            walked: 0,
            done: false,
        }
    }

    /// Blocks yielded so far.
    pub fn walked(&self) -> usize {
        self.walked
    }

    fn read_block(&mut self, number: u16) -> FormatResult<Block> {
        let schema = self.schema;
        let table = schema.name.as_str();
        let block_id = u32::from(number);

        if number > schema.total_blocks {
            return Err(FormatError::block_chain(
                table,
                block_id,
                format!("pointer exceeds the {} allocated blocks", schema.total_blocks),
            ));
        }
        let seen = &mut self.visited[usize::from(number)];
        if *seen {
            return Err(FormatError::block_chain(table, block_id, "chain revisits this block"));
        }
        *seen = true;

        let position = schema.header_size as u64 + (u64::from(number) - 1) * schema.block_size as u64;
        self.reader
            .seek(SeekFrom::Start(position))
            .map_err(|err| FormatError::io(format!("table {table} block {number}"), err))?;

        let mut bytes = vec![0u8; schema.block_size];
        if let Err(err) = self.reader.read_exact(&mut bytes) {
            return Err(if err.kind() == ErrorKind::UnexpectedEof {
                FormatError::block_chain(
                    table,
                    block_id,
                    format!("short read at offset {position}; file is truncated"),
                )
            } else {
                FormatError::io(format!("table {table} block {number}"), err)
            });
        }

        let block = Block::parse(number, bytes).ok_or_else(|| {
            FormatError::block_chain(table, block_id, "block is smaller than its header")
        })?;

        let capacity = schema.records_per_block();
        let declared = block.record_count(schema.record_size);
        if declared > capacity {
            return Err(FormatError::block_chain(
                table,
                block_id,
                format!("declares {declared} records but only {capacity} fit"),
            ));
        }

        log::trace!(
            "table {table}: block {number} holds {declared} records, next {}",
            block.next
        );
        Ok(block)
    }
}

impl<R: Read + Seek> Iterator for BlockWalker<'_, R> {
    type Item = FormatResult<Block>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        if self.next == 0 {
            if self.walked != usize::from(self.schema.used_blocks) {
                log::warn!(
                    "table {}: walked {} blocks but the header records {} in use",
                    self.schema.name,
                    self.walked,
                    self.schema.used_blocks
                );
            }
            self.done = true;
            return None;
        }

        match self.read_block(self.next) {
            Ok(block) => {
                self.next = block.next;
                self.walked += 1;
                Some(Ok(block))
            }
            Err(err) => {
                self.done = true;
                Some(Err(err))
            }
        }
    }
}
