use crate::blob::{LargeObjectReader, ReadSeek};
use crate::blocks::{Block, BlockWalker};
use crate::error::{FormatError, FormatResult};
use crate::fields::RecordDecoder;
use crate::header::TableSchema;
use crate::value::Row;

/// Forward iterator over the rows of one table scan, in file order.
///
/// Yields exactly the records the data blocks declare. After the first error the iterator is
/// fused and yields nothing further.
pub struct RowIter<'a> {
    schema: &'a TableSchema,
    decoder: &'a RecordDecoder,
    walker: BlockWalker<'a, Box<dyn ReadSeek>>,
    blobs: LargeObjectReader<'a>,
    mask: Option<Vec<bool>>,
    block: Option<Block>,
    next_record: usize,
    yielded: u64,
    done: bool,
}

impl<'a> RowIter<'a> {
    pub(crate) fn new(
        decoder: &'a RecordDecoder,
        walker: BlockWalker<'a, Box<dyn ReadSeek>>,
        blobs: LargeObjectReader<'a>,
        mask: Option<Vec<bool>>,
    ) -> Self {
        Self {
            schema: decoder.schema(),
            decoder,
            walker,
            blobs,
            mask,
            block: None,
            next_record: 0,
            yielded: 0,
            done: false,
        }
    }

    pub fn schema(&self) -> &TableSchema {
        self.schema
    }

    fn finish(&mut self) {
        self.done = true;
        if self.yielded != u64::from(self.schema.row_count()) {
            log::warn!(
                "table {}: read {} rows but the header records {}",
                self.schema.name(),
                self.yielded,
                self.schema.row_count()
            );
        }
    }
}

impl Iterator for RowIter<'_> {
    type Item = FormatResult<Row>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.done {
                return None;
            }

            if let Some(block) = &self.block {
                let record_size = self.schema.record_size();
                if self.next_record < block.record_count(record_size) {
                    let index = self.next_record;
                    self.next_record += 1;
                    let result = match block.record(index, record_size) {
                        Some(record) => {
                            self.decoder
                                .decode_record(record, self.mask.as_deref(), &mut self.blobs)
                        }
                        None => Err(FormatError::block_chain(
                            self.schema.name(),
                            u32::from(block.number),
                            format!("record {index} runs past the end of the block"),
                        )),
                    };
                    match result {
                        Ok(_) => self.yielded += 1,
                        Err(_) => self.done = true,
                    }
                    return Some(result);
                }
                self.block = None;
            }

            match self.walker.next() {
                None => {
                    self.finish();
                    return None;
                }
                Some(Err(err)) => {
                    self.done = true;
                    return Some(Err(err));
                }
                Some(Ok(block)) => {
                    self.block = Some(block);
                    self.next_record = 0;
                }
            }
        }
    }
}
