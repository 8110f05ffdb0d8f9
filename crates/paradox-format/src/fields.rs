//! Per-field decoding.
//!
//! A [`RecordDecoder`] picks one decode function per field when it is built, so decoding a record
//! is a walk over a fixed table of function pointers rather than a type switch per cell.

use std::sync::Arc;

use encoding_rs::Encoding;
use rust_decimal::RoundingStrategy;

use crate::blob::{LargeObjectPointer, LargeObjectReader};
use crate::charset;
use crate::dates;
use crate::error::{FormatError, FormatResult};
use crate::header::{FieldDescriptor, TableSchema};
use crate::numeric;
use crate::types::{FieldType, BCD_WIDTH};
use crate::value::{Row, Value};

/// Settings shared by every scalar decoder of one table.
#[derive(Debug, Clone, Copy)]
pub(crate) struct DecodeEnv {
    pub(crate) encoding: &'static Encoding,
    pub(crate) rounding: RoundingStrategy,
}

type ScalarDecodeFn = fn(&FieldDescriptor, &DecodeEnv, &[u8]) -> Result<Value, String>;

#[derive(Clone, Copy)]
enum FieldSlot {
    Scalar(ScalarDecodeFn),
    LargeObject { text: bool },
}

fn slot_for(field_type: FieldType) -> FieldSlot {
    match field_type {
        FieldType::Alpha => FieldSlot::Scalar(decode_alpha),
        FieldType::Date => FieldSlot::Scalar(decode_date),
        FieldType::Short => FieldSlot::Scalar(decode_short),
        FieldType::Long => FieldSlot::Scalar(decode_long),
        FieldType::AutoIncrement => FieldSlot::Scalar(decode_auto_increment),
        FieldType::Currency | FieldType::Number => FieldSlot::Scalar(decode_number),
        FieldType::Logical => FieldSlot::Scalar(decode_logical),
        FieldType::Time => FieldSlot::Scalar(decode_time),
        FieldType::Timestamp => FieldSlot::Scalar(decode_timestamp),
        FieldType::Bcd => FieldSlot::Scalar(decode_bcd),
        FieldType::Bytes => FieldSlot::Scalar(decode_bytes),
        FieldType::Memo | FieldType::FormattedMemo => FieldSlot::LargeObject { text: true },
        FieldType::Blob | FieldType::Ole | FieldType::Graphic => {
            FieldSlot::LargeObject { text: false }
        }
    }
}

fn fixed<const N: usize>(bytes: &[u8]) -> Result<[u8; N], String> {
    bytes
        .try_into()
        .map_err(|_| format!("expected {N} bytes, found {}", bytes.len()))
}

fn decode_alpha(_: &FieldDescriptor, env: &DecodeEnv, bytes: &[u8]) -> Result<Value, String> {
    let text = charset::decode_text(env.encoding, bytes);
    Ok(if text.is_empty() {
        Value::Null
    } else {
        Value::from(text)
    })
}

fn decode_date(_: &FieldDescriptor, _: &DecodeEnv, bytes: &[u8]) -> Result<Value, String> {
    Ok(dates::decode_date(fixed(bytes)?)?.into())
}

fn decode_time(_: &FieldDescriptor, _: &DecodeEnv, bytes: &[u8]) -> Result<Value, String> {
    Ok(dates::decode_time(fixed(bytes)?)?.into())
}

fn decode_timestamp(_: &FieldDescriptor, _: &DecodeEnv, bytes: &[u8]) -> Result<Value, String> {
    match numeric::decode_number(fixed(bytes)?) {
        None => Ok(Value::Null),
        Some(millis) => dates::timestamp_from_millis(millis)
            .map(Value::Timestamp)
            .ok_or_else(|| format!("{millis} ms is outside the supported timestamp range")),
    }
}

fn decode_short(_: &FieldDescriptor, _: &DecodeEnv, bytes: &[u8]) -> Result<Value, String> {
    Ok(numeric::decode_short(fixed(bytes)?).map(i64::from).into())
}

fn decode_long(_: &FieldDescriptor, _: &DecodeEnv, bytes: &[u8]) -> Result<Value, String> {
    Ok(numeric::decode_long(fixed(bytes)?).map(i64::from).into())
}

fn decode_auto_increment(
    _: &FieldDescriptor,
    _: &DecodeEnv,
    bytes: &[u8],
) -> Result<Value, String> {
    Ok(numeric::decode_auto_increment(fixed(bytes)?)
        .map(i64::from)
        .into())
}

fn decode_number(_: &FieldDescriptor, _: &DecodeEnv, bytes: &[u8]) -> Result<Value, String> {
    Ok(numeric::decode_number(fixed(bytes)?).into())
}

fn decode_logical(_: &FieldDescriptor, _: &DecodeEnv, bytes: &[u8]) -> Result<Value, String> {
    let [byte] = fixed::<1>(bytes)?;
    Ok(numeric::decode_logical(byte).into())
}

fn decode_bcd(field: &FieldDescriptor, env: &DecodeEnv, bytes: &[u8]) -> Result<Value, String> {
    let raw: [u8; BCD_WIDTH] = fixed(bytes)?;
    Ok(numeric::decode_bcd(&raw, field.declared_size, env.rounding)?.into())
}

fn decode_bytes(_: &FieldDescriptor, _: &DecodeEnv, bytes: &[u8]) -> Result<Value, String> {
    Ok(Value::from(bytes.to_vec()))
}

/// Decodes whole records of one table into [`Row`]s.
pub struct RecordDecoder {
    schema: Arc<TableSchema>,
    env: DecodeEnv,
    slots: Vec<FieldSlot>,
}

impl RecordDecoder {
    pub fn new(schema: Arc<TableSchema>, rounding: RoundingStrategy) -> Self {
        let slots = schema
            .fields()
            .iter()
            .map(|field| slot_for(field.field_type))
            .collect();
        let env = DecodeEnv {
            encoding: schema.encoding(),
            rounding,
        };
        Self { schema, env, slots }
    }

    pub fn schema(&self) -> &TableSchema {
        &self.schema
    }

    fn invalid(&self, field: &FieldDescriptor, reason: String) -> FormatError {
        FormatError::InvalidFieldValue {
            table: self.schema.name().to_string(),
            field: field.name.clone(),
            reason,
        }
    }

    /// Decode field `index` of `record`.
    pub(crate) fn decode_field(
        &self,
        index: usize,
        record: &[u8],
        blobs: &mut LargeObjectReader<'_>,
    ) -> FormatResult<Value> {
        let field = &self.schema.fields()[index];
        let bytes = record
            .get(field.offset..field.offset + field.width)
            .ok_or_else(|| self.invalid(field, "record is shorter than the field layout".into()))?;

        match self.slots[index] {
            FieldSlot::Scalar(decode) => {
                decode(field, &self.env, bytes).map_err(|reason| self.invalid(field, reason))
            }
            FieldSlot::LargeObject { text } => {
                let pointer = LargeObjectPointer::from_field(bytes);
                let Some(data) = blobs.resolve(field, bytes, &pointer)? else {
                    return Ok(Value::Null);
                };
                Ok(if text {
                    let text = charset::decode_text(self.env.encoding, &data);
                    if text.is_empty() {
                        Value::Null
                    } else {
                        Value::from(text)
                    }
                } else {
                    Value::Binary(data)
                })
            }
        }
    }

    /// Decode a whole record; fields outside `mask` are left as NULL without being read.
    pub(crate) fn decode_record(
        &self,
        record: &[u8],
        mask: Option<&[bool]>,
        blobs: &mut LargeObjectReader<'_>,
    ) -> FormatResult<Row> {
        let mut row = Vec::with_capacity(self.slots.len());
        for index in 0..self.slots.len() {
            let wanted = mask.map_or(true, |mask| mask.get(index).copied().unwrap_or(false));
            row.push(if wanted {
                self.decode_field(index, record, blobs)?
            } else {
                Value::Null
            });
        }
        Ok(row)
    }
}
