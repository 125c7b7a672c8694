//! The decode/encode state machine (spec §4.7, C7): drives one template's
//! fields through the codec registry, verifies checksums over the whole
//! message, and runs the trailing `Evaluate`/`PostProcess` pass.

use std::collections::{BTreeMap, HashMap};

use crate::bits::{BitReader, BitWriter};
use crate::codec::{DecodeCtx, EncodeCtx};
use crate::core::Core;
use crate::descriptor::{Descriptor, HeaderBinding};
use crate::error::{Error, Result};
use crate::eval::{self, Context};
use crate::record::{Record, SlotId};
use crate::template::{FieldOp, Template};
use crate::value::Value;

/// Decodes one record's fields — the on-wire pass, the checksum
/// verification, then the trailing `Evaluate`/`PostProcess` pass — against
/// `reader`, whose backing buffer is always the *whole* top-level message
/// (spec invariant I4: checksum ranges are message-relative, not
/// field-relative, even from inside a nested `Object`).
pub fn decode_record(core: &Core, template: &Template, reader: &mut BitReader, root: &BTreeMap<String, Value>) -> Result<Record> {
    let mut record = Record::with_capacity(template.slot_names().len());
    let mut wire_slot_by_name: HashMap<&str, SlotId> = HashMap::new();
    let mut checksum_message_length: Option<usize> = None;

    for op in template.fields() {
        wire_slot_by_name.insert(op.field_name.as_str(), op.target);
        let self_map = record.named_snapshot(template.slot_names());
        if !eval::evaluate_boolean(&op.condition, Context::new(root, &self_map))? {
            continue;
        }
        if matches!(op.descriptor, Descriptor::Checksum { .. }) {
            checksum_message_length = Some((reader.bit_position() / 8) as usize);
        }
        let raw = {
            let mut ctx = DecodeCtx { core, reader, root, self_map: &self_map, field_name: &op.field_name };
            core.codec_registry().decode(&op.descriptor, &mut ctx)?
        };
        let converted = apply_converter_decode(core, op, &raw, Context::new(root, &self_map))?;
        validate(core, op, &converted)?;
        record.set_slot(op.target, converted);
    }

    verify_checksum(core, template, reader, &record, checksum_message_length)?;

    for op in template.post_process() {
        let self_map = record.named_snapshot(template.slot_names());
        if !eval::evaluate_boolean(&op.condition, Context::new(root, &self_map))? {
            continue;
        }
        let raw = {
            let mut ctx = DecodeCtx { core, reader, root, self_map: &self_map, field_name: &op.field_name };
            core.codec_registry().decode(&op.descriptor, &mut ctx)?
        };
        let converted = apply_converter_decode(core, op, &raw, Context::new(root, &self_map))?;
        validate(core, op, &converted)?;
        let target = wire_slot_by_name.get(op.field_name.as_str()).copied().unwrap_or(op.target);
        record.set_slot(target, converted);
    }

    Ok(record)
}

/// The encode-side counterpart of [`decode_record`]: writes a pre-populated
/// `record`'s fields back onto the wire, recomputing the checksum over the
/// bytes already written rather than trusting whatever value the record
/// holds for that slot.
pub fn encode_record(core: &Core, template: &Template, writer: &mut BitWriter, root: &BTreeMap<String, Value>, record: &Record) -> Result<()> {
    let mut wire_slot_by_name: HashMap<&str, SlotId> = HashMap::new();
    for op in template.fields() {
        wire_slot_by_name.insert(op.field_name.as_str(), op.target);
    }

    // `valueEncode` must see the record before any field is serialized (I6),
    // so every `PostProcess` override is resolved up front and applied to
    // the same on-wire slot the decoded field occupies, the encode-side
    // mirror of `decode_record`'s `wire_slot_by_name` redirect.
    let mut overrides: HashMap<SlotId, Value> = HashMap::new();
    for op in template.post_process() {
        let Descriptor::PostProcess { condition, value_encode, .. } = &op.descriptor else { continue };
        if value_encode.is_empty() {
            continue;
        }
        let self_map = record.named_snapshot(template.slot_names());
        if !eval::evaluate_boolean(condition, Context::new(root, &self_map))? {
            continue;
        }
        let computed = eval::evaluate(value_encode, Context::new(root, &self_map))?;
        if let Some(&slot) = wire_slot_by_name.get(op.field_name.as_str()) {
            overrides.insert(slot, computed);
        }
    }

    for op in template.fields() {
        let self_map = record.named_snapshot(template.slot_names());
        if !eval::evaluate_boolean(&op.condition, Context::new(root, &self_map))? {
            continue;
        }
        if let Descriptor::Checksum { algorithm, skip_start, skip_end, .. } = &op.descriptor {
            let checksummer = core.checksummer(algorithm)?;
            let bytes = writer.bytes_so_far();
            let message_length = bytes.len();
            let computed = checksum_over(checksummer, bytes, message_length, *skip_start, *skip_end, &op.field_name)?;
            let mut ctx = EncodeCtx { core, writer, root, self_map: &self_map, field_name: &op.field_name };
            core.codec_registry().encode(&op.descriptor, &Value::from(computed as i128), &mut ctx)?;
            continue;
        }
        let value = overrides
            .get(&op.target)
            .or_else(|| record.get_slot(op.target))
            .ok_or_else(|| Error::template(&op.field_name, "field is required by its condition but has no value"))?;
        let raw = apply_converter_encode(core, op, value, Context::new(root, &self_map))?;
        validate(core, op, &raw)?;
        let mut ctx = EncodeCtx { core, writer, root, self_map: &self_map, field_name: &op.field_name };
        core.codec_registry().encode(&op.descriptor, &raw, &mut ctx)?;
    }

    for op in template.post_process() {
        if matches!(op.descriptor, Descriptor::PostProcess { .. }) {
            continue;
        }
        let self_map = record.named_snapshot(template.slot_names());
        if !eval::evaluate_boolean(&op.condition, Context::new(root, &self_map))? {
            continue;
        }
        let mut ctx = EncodeCtx { core, writer, root, self_map: &self_map, field_name: &op.field_name };
        core.codec_registry().encode(&op.descriptor, &Value::Null, &mut ctx)?;
    }

    Ok(())
}

fn select_converter_id<'o>(op: &'o FieldOp, ctx: Context<'_>) -> Result<Option<&'o str>> {
    for (condition, id) in &op.converter_choices {
        if eval::evaluate_boolean(condition, ctx)? {
            return Ok(Some(id.as_str()));
        }
    }
    Ok(op.default_converter.as_deref())
}

fn apply_converter_decode(core: &Core, op: &FieldOp, raw: &Value, ctx: Context<'_>) -> Result<Value> {
    match select_converter_id(op, ctx)? {
        Some(id) => core
            .converter(id)
            .ok_or_else(|| Error::template(&op.field_name, format!("no converter registered under '{id}'")))?
            .decode(raw),
        None => Ok(raw.clone()),
    }
}

fn apply_converter_encode(core: &Core, op: &FieldOp, value: &Value, ctx: Context<'_>) -> Result<Value> {
    match select_converter_id(op, ctx)? {
        Some(id) => core
            .converter(id)
            .ok_or_else(|| Error::template(&op.field_name, format!("no converter registered under '{id}'")))?
            .encode(value),
        None => Ok(value.clone()),
    }
}

fn validate(core: &Core, op: &FieldOp, value: &Value) -> Result<()> {
    if let Some(id) = &op.validator {
        core.validator(id)
            .ok_or_else(|| Error::template(&op.field_name, format!("no validator registered under '{id}'")))?
            .check(value)?;
    }
    Ok(())
}

/// Computes a checksum over `bytes[skip_start..message_length - skip_end]`
/// (spec invariant I4). `message_length` is the byte length of the message
/// *excluding the checksum field itself* — on encode that is exactly
/// `writer.bytes_so_far().len()` at the point the checksum field is reached;
/// on decode it is the reader's byte position at that same point. Passing
/// the same `message_length` basis on both sides is what keeps the range
/// identical regardless of encode/decode direction.
fn checksum_over(
    checksummer: &dyn crate::checksum::Checksummer,
    bytes: &[u8],
    message_length: usize,
    skip_start: u32,
    skip_end: u32,
    field: &str,
) -> Result<u64> {
    let start = skip_start as usize;
    let end = message_length.saturating_sub(skip_end as usize);
    if start > end || end > bytes.len() {
        return Err(Error::template(field, "checksum skip bounds exceed the buffer length"));
    }
    Ok(checksummer.calculate(bytes, start, end))
}

fn verify_checksum(core: &Core, template: &Template, reader: &BitReader, record: &Record, message_length: Option<usize>) -> Result<()> {
    let Some(op) = template.fields().iter().find(|op| matches!(op.descriptor, Descriptor::Checksum { .. })) else {
        return Ok(());
    };
    let Descriptor::Checksum { algorithm, skip_start, skip_end, .. } = &op.descriptor else { unreachable!() };
    let Some(expected_value) = record.get_slot(op.target) else {
        return Ok(());
    };
    let expected = expected_value
        .as_i128()
        .ok_or_else(|| Error::template(&op.field_name, "decoded checksum is not an integer"))? as u64;
    let message_length =
        message_length.ok_or_else(|| Error::template(&op.field_name, "checksum field was never reached during decode"))?;
    let checksummer = core.checksummer(algorithm)?;
    let computed = checksum_over(checksummer, reader.bytes(), message_length, *skip_start, *skip_end, &op.field_name)?;
    if expected != computed {
        return Err(Error::ChecksumMismatch { field: op.field_name.clone(), expected, computed });
    }
    Ok(())
}

/// The top-level entry point (spec §4.7): resolves a message's template
/// from its header bytes, decodes it, and checks the trailing end marker if
/// the template declares one. [`crate::Parser`]/[`crate::Composer`] are thin
/// wrappers around this and [`encode_message`].
pub struct ParseEngine<'a> {
    core: &'a Core,
}

impl<'a> ParseEngine<'a> {
    pub fn new(core: &'a Core) -> Self {
        Self { core }
    }

    pub fn decode(&self, bytes: &[u8], root: &BTreeMap<String, Value>) -> Result<(String, Record)> {
        let template = self.core.template_registry().match_longest(bytes).ok_or(Error::NoMatchingTemplate)?;
        let mut reader = BitReader::new(bytes);
        if let HeaderBinding::Bound { start_markers, .. } = template.header() {
            let marker = start_markers
                .iter()
                .find(|m| bytes.starts_with(m.as_slice()))
                .ok_or(Error::NoMatchingTemplate)?;
            reader.skip_bits((marker.len() * 8) as u32)?;
        }
        let record = decode_record(self.core, &template, &mut reader, root)?;
        if let HeaderBinding::Bound { end_marker: Some(marker), .. } = template.header() {
            reader.align_to_byte();
            let got = reader.get_bytes(marker.len())?;
            if &got != marker {
                return Err(Error::template(template.class_handle(), "end marker does not match the declared trailer"));
            }
        }
        Ok((template.class_handle().clone(), record))
    }

    pub fn encode(&self, class_handle: &str, record: &Record, root: &BTreeMap<String, Value>) -> Result<Vec<u8>> {
        let template = self
            .core
            .template_by_name(class_handle)
            .ok_or_else(|| Error::template(class_handle, "no template registered under this name"))?;
        let mut writer = BitWriter::new();
        if let HeaderBinding::Bound { start_markers, .. } = template.header() {
            let marker = start_markers
                .first()
                .ok_or_else(|| Error::template(class_handle, "header declares no start marker to encode"))?;
            writer.put_bytes(marker);
        }
        encode_record(self.core, template, &mut writer, root, record)?;
        if let HeaderBinding::Bound { end_marker: Some(marker), .. } = template.header() {
            writer.align_to_byte();
            writer.put_bytes(marker);
        }
        Ok(writer.array())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bits::ByteOrder;
    use crate::core::CoreFacade;
    use crate::descriptor::{FieldDescriptor, HeaderBinding as HB};
    use crate::template::TemplateCompiler;

    fn simple_template() -> Template {
        TemplateCompiler::compile(
            "Simple",
            HB::Bound { start_markers: vec![vec![0xAA]], end_marker: None, charset: crate::bits::Charset::Ascii },
            vec![FieldDescriptor::new(
                "count",
                Descriptor::Integer { size: "8".to_string(), byte_order: ByteOrder::BigEndian, signed: false },
            )],
        )
        .unwrap()
    }

    #[test]
    fn decode_then_encode_round_trips() {
        let core = CoreFacade::new().with_template(crate::core::TemplateSource {
            class_handle: "Simple".to_string(),
            header: simple_template().header().clone(),
            fields: vec![FieldDescriptor::new(
                "count",
                Descriptor::Integer { size: "8".to_string(), byte_order: ByteOrder::BigEndian, signed: false },
            )],
            embedded_only: false,
        });
        let core = core.build().unwrap();
        let root = BTreeMap::new();
        let engine = ParseEngine::new(&core);
        let bytes = [0xAA, 0x2A];
        let (class_handle, record) = engine.decode(&bytes, &root).unwrap();
        assert_eq!(class_handle, "Simple");
        let encoded = engine.encode(&class_handle, &record, &root).unwrap();
        assert_eq!(encoded, bytes);
    }

    #[test]
    fn checksum_mismatch_is_reported() {
        let core = CoreFacade::new()
            .with_template(crate::core::TemplateSource {
                class_handle: "Checked".to_string(),
                header: HB::Bound { start_markers: vec![vec![0xBB]], end_marker: None, charset: crate::bits::Charset::Ascii },
                fields: vec![
                    FieldDescriptor::new(
                        "payload",
                        Descriptor::Integer { size: "8".to_string(), byte_order: ByteOrder::BigEndian, signed: false },
                    ),
                    FieldDescriptor::new(
                        "crc",
                        Descriptor::Checksum {
                            algorithm: "CRC16/IBM".to_string(),
                            skip_start: 0,
                            skip_end: 0,
                            byte_order: ByteOrder::BigEndian,
                        },
                    ),
                ],
                embedded_only: false,
            })
            .build()
            .unwrap();
        let root = BTreeMap::new();
        let engine = ParseEngine::new(&core);
        let bytes = [0xBB, 0x42, 0x00, 0x00];
        assert!(engine.decode(&bytes, &root).is_err());
    }
}
