#![allow(dead_code)]

use paradox_format::{
    numeric, FieldType, BLOCK_SIZE_UNIT, EXTENDED_PREAMBLE_LEN, FILE_TYPE_UNKEYED,
    FIRST_LONG_NAME_VERSION,
};

/// A cell of a record written by [`table_image`].
#[derive(Debug, Clone)]
pub enum Cell<'a> {
    Alpha(&'a str),
    Long(Option<i32>),
}

/// Column of a [`table_image`] table: `(name, type, declared size)`.
pub type Column<'a> = (&'a str, FieldType, u8);

const BLOCK_HEADER_LEN: usize = 6;

/// Bytes of an unkeyed `.DB` table with 1 KiB blocks holding `records`.
///
/// Only Alpha and Long fields are supported; that is all the query tests need.
pub fn table_image(columns: &[Column<'_>], records: &[Vec<Cell<'_>>]) -> Vec<u8> {
    let record_size: usize = columns
        .iter()
        .map(|(_, field_type, size)| field_type.physical_width(*size))
        .sum();
    let block_size = BLOCK_SIZE_UNIT;
    let per_block = (block_size - BLOCK_HEADER_LEN) / record_size;
    let blocks: Vec<&[Vec<Cell<'_>>]> = records.chunks(per_block).collect();

    let mut tail = Vec::new();
    for (_, field_type, size) in columns {
        tail.push(field_type.code());
        tail.push(*size);
    }
    tail.extend(std::iter::repeat(0u8).take(4 + 4 * columns.len() + 261));
    for (name, _, _) in columns {
        tail.extend_from_slice(name.as_bytes());
        tail.push(0);
    }
    for index in 0..columns.len() {
        tail.extend_from_slice(&(index as u16 + 1).to_le_bytes());
    }
    tail.extend_from_slice(b"ascii\0");

    let header_size = (EXTENDED_PREAMBLE_LEN + tail.len()).div_ceil(0x800) * 0x800;
    let mut bytes = vec![0u8; header_size];
    bytes[0x00..0x02].copy_from_slice(&(record_size as u16).to_le_bytes());
    bytes[0x02..0x04].copy_from_slice(&(header_size as u16).to_le_bytes());
    bytes[0x04] = FILE_TYPE_UNKEYED;
    bytes[0x05] = 1;
    bytes[0x06..0x0A].copy_from_slice(&(records.len() as u32).to_le_bytes());
    bytes[0x0A..0x0C].copy_from_slice(&(blocks.len() as u16).to_le_bytes());
    bytes[0x0C..0x0E].copy_from_slice(&(blocks.len() as u16).to_le_bytes());
    bytes[0x0E..0x10].copy_from_slice(&u16::from(!blocks.is_empty()).to_le_bytes());
    bytes[0x10..0x12].copy_from_slice(&(blocks.len() as u16).to_le_bytes());
    bytes[0x21..0x23].copy_from_slice(&(columns.len() as u16).to_le_bytes());
    bytes[0x39] = FIRST_LONG_NAME_VERSION;
    bytes[0x6A..0x6C].copy_from_slice(&1252u16.to_le_bytes());
    bytes[EXTENDED_PREAMBLE_LEN..EXTENDED_PREAMBLE_LEN + tail.len()].copy_from_slice(&tail);

    for (index, chunk) in blocks.iter().enumerate() {
        let number = index + 1;
        let next = if number == blocks.len() { 0 } else { number + 1 };
        let mut block = vec![0u8; block_size];
        block[0..2].copy_from_slice(&(next as u16).to_le_bytes());
        block[2..4].copy_from_slice(&(index as u16).to_le_bytes());
        let add_size = (chunk.len() as i16 - 1) * record_size as i16;
        block[4..6].copy_from_slice(&add_size.to_le_bytes());
        let mut at = BLOCK_HEADER_LEN;
        for record in chunk.iter() {
            for (cell, (_, _, size)) in record.iter().zip(columns) {
                match cell {
                    Cell::Alpha(text) => {
                        block[at..at + text.len()].copy_from_slice(text.as_bytes());
                        at += usize::from(*size);
                    }
                    Cell::Long(value) => {
                        if let Some(value) = value {
                            block[at..at + 4].copy_from_slice(&numeric::encode_long(*value));
                        }
                        at += 4;
                    }
                }
            }
        }
        bytes.extend_from_slice(&block);
    }
    bytes
}
