//! Default `Codec` implementation for each descriptor kind (spec §4.4).
//!
//! Every codec here is stateless and reachable only through
//! [`super::CodecRegistry`]; none of them hold onto a `DecodeCtx`/`EncodeCtx`
//! beyond a single call.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::bits::{BitSet, ByteOrder, Charset};
use crate::descriptor::Descriptor;
use crate::error::{Error, Result};
use crate::eval::{self, Context};
use crate::value::Value;

use super::{Codec, DecodeCtx, DescriptorKind, EncodeCtx};

pub fn default_codec(kind: DescriptorKind) -> Arc<dyn Codec> {
    match kind {
        DescriptorKind::Integer => Arc::new(IntegerCodec),
        DescriptorKind::BitSet => Arc::new(BitSetCodec),
        DescriptorKind::StringFixed => Arc::new(StringFixedCodec),
        DescriptorKind::StringTerminated => Arc::new(StringTerminatedCodec),
        DescriptorKind::Object => Arc::new(ObjectCodec),
        DescriptorKind::AsArray => Arc::new(AsArrayCodec),
        DescriptorKind::SkipBits => Arc::new(SkipBitsCodec),
        DescriptorKind::SkipUntilTerminator => Arc::new(SkipUntilTerminatorCodec),
        DescriptorKind::Checksum => Arc::new(ChecksumCodec),
        DescriptorKind::Evaluate => Arc::new(EvaluateCodec),
        DescriptorKind::PostProcess => Arc::new(PostProcessCodec),
        DescriptorKind::ContextParameter => Arc::new(ContextParameterCodec),
        DescriptorKind::ConfigurationField => Arc::new(ConfigurationFieldCodec),
        DescriptorKind::CompositeConfigurationField => Arc::new(CompositeConfigurationFieldCodec),
        DescriptorKind::AlternativeConfigurationField => Arc::new(AlternativeConfigurationFieldCodec),
        DescriptorKind::ConfigurationSkip => Arc::new(ConfigurationSkipCodec),
    }
}

fn decode_ctx_eval<'a>(ctx: &'a DecodeCtx) -> Context<'a> {
    Context::new(ctx.root, ctx.self_map)
}

fn encode_ctx_eval<'a>(ctx: &'a EncodeCtx) -> Context<'a> {
    Context::new(ctx.root, ctx.self_map)
}

struct IntegerCodec;

impl Codec for IntegerCodec {
    fn decode(&self, descriptor: &Descriptor, ctx: &mut DecodeCtx) -> Result<Value> {
        let Descriptor::Integer { size, byte_order, signed } = descriptor else { unreachable!() };
        let n = eval::evaluate_size(size, decode_ctx_eval(ctx))?;
        let v = ctx.reader.get_integer(n as u32, *byte_order, *signed)?;
        Ok(v.into())
    }

    fn encode(&self, descriptor: &Descriptor, value: &Value, ctx: &mut EncodeCtx) -> Result<()> {
        let Descriptor::Integer { size, byte_order, .. } = descriptor else { unreachable!() };
        let n = eval::evaluate_size(size, encode_ctx_eval(ctx))?;
        let raw = value
            .as_i128()
            .ok_or_else(|| Error::template(ctx.field_name, format!("expected an integer value, got {value}")))?;
        ctx.writer.put_integer(raw, n as u32, *byte_order)
    }
}

struct BitSetCodec;

impl Codec for BitSetCodec {
    fn decode(&self, descriptor: &Descriptor, ctx: &mut DecodeCtx) -> Result<Value> {
        let Descriptor::BitSetField { size, byte_order } = descriptor else { unreachable!() };
        let n = eval::evaluate_size(size, decode_ctx_eval(ctx))?;
        let bits = ctx.reader.get_bits(n as u32)?;
        Ok((bits.to_integer(n, *byte_order) as i128).into())
    }

    fn encode(&self, descriptor: &Descriptor, value: &Value, ctx: &mut EncodeCtx) -> Result<()> {
        let Descriptor::BitSetField { size, byte_order } = descriptor else { unreachable!() };
        let n = eval::evaluate_size(size, encode_ctx_eval(ctx))?;
        let raw = value
            .as_u64()
            .ok_or_else(|| Error::template(ctx.field_name, format!("expected an unsigned value, got {value}")))?;
        let bits = BitSet::from_integer(raw as u128, n, *byte_order);
        ctx.writer.put_bits(&bits, n as u32);
        Ok(())
    }
}

struct StringFixedCodec;

impl Codec for StringFixedCodec {
    fn decode(&self, descriptor: &Descriptor, ctx: &mut DecodeCtx) -> Result<Value> {
        let Descriptor::StringFixed { size, charset, match_expr } = descriptor else { unreachable!() };
        let n = eval::evaluate_size(size, decode_ctx_eval(ctx))?;
        let text = ctx.reader.get_text(n as usize, *charset)?;
        check_match(ctx.field_name, match_expr, &text)?;
        Ok(Value::Text(text))
    }

    fn encode(&self, descriptor: &Descriptor, value: &Value, ctx: &mut EncodeCtx) -> Result<()> {
        let Descriptor::StringFixed { size, charset, .. } = descriptor else { unreachable!() };
        let n = eval::evaluate_size(size, encode_ctx_eval(ctx))? as usize;
        let text = value
            .as_text()
            .ok_or_else(|| Error::template(ctx.field_name, format!("expected text, got {value}")))?;
        let mut bytes = charset.encode(text);
        if bytes.len() > n {
            return Err(Error::BufferOverflow { size: (bytes.len() * 8) as u32 });
        }
        bytes.resize(n, 0);
        ctx.writer.put_bytes(&bytes);
        Ok(())
    }
}

/// Validates a decoded fixed-length string against its `match_expr`,
/// treated as a regular expression the whole text must match — the same
/// convention [`crate::configuration::validate_configuration_value`] uses
/// for configuration field patterns.
fn check_match(field: &str, match_expr: &str, text: &str) -> Result<()> {
    if match_expr.is_empty() {
        return Ok(());
    }
    let re = regex::Regex::new(match_expr)
        .map_err(|e| Error::template(field, format!("invalid match pattern '{match_expr}': {e}")))?;
    if re.is_match(text) {
        Ok(())
    } else {
        Err(Error::validation(field, format!("'{text}' does not match pattern '{match_expr}'")))
    }
}

struct StringTerminatedCodec;

impl Codec for StringTerminatedCodec {
    fn decode(&self, descriptor: &Descriptor, ctx: &mut DecodeCtx) -> Result<Value> {
        let Descriptor::StringTerminated { terminator, charset, consume_terminator } = descriptor else {
            unreachable!()
        };
        let text = ctx.reader.get_text_until(*terminator, *charset, *consume_terminator)?;
        Ok(Value::Text(text))
    }

    fn encode(&self, descriptor: &Descriptor, value: &Value, ctx: &mut EncodeCtx) -> Result<()> {
        let Descriptor::StringTerminated { terminator, charset, .. } = descriptor else { unreachable!() };
        let text = value
            .as_text()
            .ok_or_else(|| Error::template(ctx.field_name, format!("expected text, got {value}")))?;
        ctx.writer.put_text_terminated(text, *charset, *terminator);
        Ok(())
    }
}

struct ObjectCodec;

impl ObjectCodec {
    fn select_alternative<'a>(
        descriptor: &'a Descriptor,
        prefix_value: Option<i128>,
        field_name: &str,
        ctx_root: &BTreeMap<String, Value>,
        self_map: &BTreeMap<String, Value>,
    ) -> Result<&'a str> {
        let Descriptor::Object { choices, default_type } = descriptor else { unreachable!() };
        let alt_self_map;
        let self_map = if let Some(prefix) = prefix_value {
            let mut map = BTreeMap::new();
            map.insert("prefix".to_string(), prefix.into());
            alt_self_map = map;
            &alt_self_map
        } else {
            self_map
        };
        for alt in &choices.alternatives {
            if eval::evaluate_boolean(&alt.condition, Context::new(ctx_root, self_map))? {
                return Ok(&alt.type_name);
            }
        }
        default_type
            .as_deref()
            .ok_or_else(|| Error::ChoiceUnmatched { field: field_name.to_string() })
    }
}

impl Codec for ObjectCodec {
    fn decode(&self, descriptor: &Descriptor, ctx: &mut DecodeCtx) -> Result<Value> {
        let Descriptor::Object { choices, .. } = descriptor else { unreachable!() };
        let prefix_value = if choices.prefix_size > 0 {
            Some(ctx.reader.get_integer(choices.prefix_size, choices.prefix_byte_order, false)?)
        } else {
            None
        };
        let type_name =
            Self::select_alternative(descriptor, prefix_value, ctx.field_name, ctx.root, ctx.self_map)?.to_string();
        let template = ctx
            .core
            .object_template(&type_name)
            .ok_or_else(|| Error::template(ctx.field_name, format!("no template registered for type '{type_name}'")))?;
        let record = crate::engine::decode_record(ctx.core, template, ctx.reader, ctx.root)?;
        Ok(Value::Object { type_name, record })
    }

    fn encode(&self, descriptor: &Descriptor, value: &Value, ctx: &mut EncodeCtx) -> Result<()> {
        let Descriptor::Object { choices, .. } = descriptor else { unreachable!() };
        let (type_name, record) = match value {
            Value::Object { type_name, record } => (type_name, record),
            other => return Err(Error::template(ctx.field_name, format!("expected an object value, got {other}"))),
        };
        if choices.prefix_size > 0 {
            let alt = choices
                .alternatives
                .iter()
                .find(|a| &a.type_name == type_name)
                .ok_or_else(|| Error::ChoiceUnmatched { field: ctx.field_name.to_string() })?;
            let prefix = alt
                .prefix_value
                .ok_or_else(|| Error::template(ctx.field_name, format!("alternative '{type_name}' has no prefix value")))?;
            ctx.writer.put_integer(prefix, choices.prefix_size, choices.prefix_byte_order)?;
        }
        let template = ctx
            .core
            .object_template(type_name)
            .ok_or_else(|| Error::template(ctx.field_name, format!("no template registered for type '{type_name}'")))?;
        crate::engine::encode_record(ctx.core, template, ctx.writer, ctx.root, record)
    }
}

struct AsArrayCodec;

impl Codec for AsArrayCodec {
    fn decode(&self, descriptor: &Descriptor, ctx: &mut DecodeCtx) -> Result<Value> {
        let Descriptor::AsArray { element, size } = descriptor else { unreachable!() };
        let count = eval::evaluate_size(size, decode_ctx_eval(ctx))?;
        let mut items = Vec::with_capacity(count as usize);
        for _ in 0..count {
            items.push(ctx.core.codec_registry().decode(element, ctx)?);
        }
        Ok(Value::Array(items))
    }

    fn encode(&self, descriptor: &Descriptor, value: &Value, ctx: &mut EncodeCtx) -> Result<()> {
        let Descriptor::AsArray { element, size } = descriptor else { unreachable!() };
        let count = eval::evaluate_size(size, encode_ctx_eval(ctx))?;
        let items = match value {
            Value::Array(items) => items,
            other => return Err(Error::template(ctx.field_name, format!("expected an array value, got {other}"))),
        };
        if items.len() as u64 != count {
            return Err(Error::EncodeError {
                key: ctx.field_name.to_string(),
                reason: format!("array has {} elements but size expression evaluated to {count}", items.len()),
            });
        }
        for item in items {
            ctx.core.codec_registry().encode(element, item, ctx)?;
        }
        Ok(())
    }
}

struct SkipBitsCodec;

impl Codec for SkipBitsCodec {
    fn decode(&self, descriptor: &Descriptor, ctx: &mut DecodeCtx) -> Result<Value> {
        let Descriptor::SkipBits { size } = descriptor else { unreachable!() };
        let n = eval::evaluate_size(size, decode_ctx_eval(ctx))?;
        ctx.reader.skip_bits(n as u32)?;
        Ok(Value::Null)
    }

    fn encode(&self, descriptor: &Descriptor, _value: &Value, ctx: &mut EncodeCtx) -> Result<()> {
        let Descriptor::SkipBits { size } = descriptor else { unreachable!() };
        let n = eval::evaluate_size(size, encode_ctx_eval(ctx))?;
        ctx.writer.skip_bits(n as u32);
        Ok(())
    }
}

struct SkipUntilTerminatorCodec;

impl Codec for SkipUntilTerminatorCodec {
    fn decode(&self, descriptor: &Descriptor, ctx: &mut DecodeCtx) -> Result<Value> {
        let Descriptor::SkipUntilTerminator { terminator, consume_terminator } = descriptor else { unreachable!() };
        ctx.reader.get_text_until(*terminator, Charset::Latin1, *consume_terminator)?;
        Ok(Value::Null)
    }

    fn encode(&self, descriptor: &Descriptor, _value: &Value, ctx: &mut EncodeCtx) -> Result<()> {
        let Descriptor::SkipUntilTerminator { terminator, consume_terminator } = descriptor else { unreachable!() };
        if *consume_terminator {
            ctx.writer.put_byte(*terminator);
        }
        Ok(())
    }
}

/// The whole-message verification/computation for `Checksum` fields (I4)
/// happens in [`crate::engine`], which alone has access to the raw byte
/// range the checksum covers; this codec only moves the already-verified
/// (decode) or already-computed (encode) width-sized integer on or off the
/// wire.
struct ChecksumCodec;

impl Codec for ChecksumCodec {
    fn decode(&self, descriptor: &Descriptor, ctx: &mut DecodeCtx) -> Result<Value> {
        let Descriptor::Checksum { algorithm, byte_order, .. } = descriptor else { unreachable!() };
        let width = ctx.core.checksummer(algorithm)?.width_bits();
        let v = ctx.reader.get_integer(width, *byte_order, false)?;
        Ok(v.into())
    }

    fn encode(&self, descriptor: &Descriptor, value: &Value, ctx: &mut EncodeCtx) -> Result<()> {
        let Descriptor::Checksum { algorithm, byte_order, .. } = descriptor else { unreachable!() };
        let width = ctx.core.checksummer(algorithm)?.width_bits();
        let raw = value
            .as_i128()
            .ok_or_else(|| Error::template(ctx.field_name, format!("expected a checksum value, got {value}")))?;
        ctx.writer.put_integer(raw, width, *byte_order)
    }
}

struct EvaluateCodec;

impl Codec for EvaluateCodec {
    fn decode(&self, descriptor: &Descriptor, ctx: &mut DecodeCtx) -> Result<Value> {
        let Descriptor::Evaluate { value } = descriptor else { unreachable!() };
        eval::evaluate(value, decode_ctx_eval(ctx))
    }

    fn encode(&self, descriptor: &Descriptor, _value: &Value, ctx: &mut EncodeCtx) -> Result<()> {
        let Descriptor::Evaluate { value } = descriptor else { unreachable!() };
        eval::evaluate(value, encode_ctx_eval(ctx))?;
        Ok(())
    }
}

struct PostProcessCodec;

impl Codec for PostProcessCodec {
    fn decode(&self, descriptor: &Descriptor, ctx: &mut DecodeCtx) -> Result<Value> {
        let Descriptor::PostProcess { condition, value_decode, .. } = descriptor else { unreachable!() };
        let prior = ctx.self_map.get(ctx.field_name).cloned().unwrap_or(Value::Null);
        if !eval::evaluate_boolean(condition, decode_ctx_eval(ctx))? {
            return Ok(prior);
        }
        eval::evaluate(value_decode, decode_ctx_eval(ctx))
    }

    fn encode(&self, descriptor: &Descriptor, _value: &Value, ctx: &mut EncodeCtx) -> Result<()> {
        let Descriptor::PostProcess { condition, value_encode, .. } = descriptor else { unreachable!() };
        if eval::evaluate_boolean(condition, encode_ctx_eval(ctx))? {
            eval::evaluate(value_encode, encode_ctx_eval(ctx))?;
        }
        Ok(())
    }
}

struct ContextParameterCodec;

impl Codec for ContextParameterCodec {
    fn decode(&self, descriptor: &Descriptor, ctx: &mut DecodeCtx) -> Result<Value> {
        let Descriptor::ContextParameter { key } = descriptor else { unreachable!() };
        ctx.root
            .get(key)
            .cloned()
            .ok_or_else(|| Error::template(ctx.field_name, format!("no context value registered under '{key}'")))
    }

    fn encode(&self, descriptor: &Descriptor, _value: &Value, ctx: &mut EncodeCtx) -> Result<()> {
        let Descriptor::ContextParameter { key } = descriptor else { unreachable!() };
        ctx.root
            .get(key)
            .map(|_| ())
            .ok_or_else(|| Error::template(ctx.field_name, format!("no context value registered under '{key}'")))
    }
}

/// Resolves one configuration field's raw text from the shared context, by
/// field name, falling back to the descriptor's declared default.
fn resolve_configuration_text<'a>(
    field_name: &str,
    default_value: &'a Option<String>,
    root: &'a BTreeMap<String, Value>,
) -> Result<std::borrow::Cow<'a, str>> {
    if let Some(Value::Text(s)) = root.get(field_name) {
        return Ok(std::borrow::Cow::Borrowed(s.as_str()));
    }
    default_value
        .as_deref()
        .map(std::borrow::Cow::Borrowed)
        .ok_or_else(|| Error::template(field_name, "no configuration value supplied and no default set"))
}

struct ConfigurationFieldCodec;

impl Codec for ConfigurationFieldCodec {
    fn decode(&self, descriptor: &Descriptor, ctx: &mut DecodeCtx) -> Result<Value> {
        let Descriptor::ConfigurationField(desc) = descriptor else { unreachable!() };
        let raw = resolve_configuration_text(ctx.field_name, &desc.default_value, ctx.root)?;
        crate::configuration::validate_configuration_value(desc, &raw)
            .map_err(|reason| Error::validation(ctx.field_name, reason))?;
        Ok(Value::Text(raw.into_owned()))
    }

    fn encode(&self, descriptor: &Descriptor, value: &Value, ctx: &mut EncodeCtx) -> Result<()> {
        let Descriptor::ConfigurationField(desc) = descriptor else { unreachable!() };
        let text = value
            .as_text()
            .ok_or_else(|| Error::template(ctx.field_name, format!("expected text, got {value}")))?;
        crate::configuration::validate_configuration_value(desc, text)
            .map_err(|reason| Error::validation(ctx.field_name, reason))?;
        ctx.writer.put_text(text, desc.charset.unwrap_or(Charset::Ascii));
        if let Some(terminator) = desc.terminator {
            ctx.writer.put_byte(terminator);
        }
        Ok(())
    }
}

/// Combines several configuration sub-fields' values into one, via
/// `composition` — an expression evaluated against the already-decoded
/// fields of the enclosing record, the same mechanism `Evaluate` uses. This
/// keeps composite fields declarative without inventing positional names for
/// otherwise-anonymous sub-descriptors.
struct CompositeConfigurationFieldCodec;

impl Codec for CompositeConfigurationFieldCodec {
    fn decode(&self, descriptor: &Descriptor, ctx: &mut DecodeCtx) -> Result<Value> {
        let Descriptor::CompositeConfigurationField { fields, composition } = descriptor else { unreachable!() };
        for desc in fields {
            if let Some(Value::Text(raw)) = ctx.root.get(ctx.field_name) {
                crate::configuration::validate_configuration_value(desc, raw)
                    .map_err(|reason| Error::validation(ctx.field_name, reason))?;
            }
        }
        eval::evaluate(composition, decode_ctx_eval(ctx))
    }

    fn encode(&self, descriptor: &Descriptor, value: &Value, ctx: &mut EncodeCtx) -> Result<()> {
        let Descriptor::CompositeConfigurationField { .. } = descriptor else { unreachable!() };
        let text = value
            .as_text()
            .ok_or_else(|| Error::template(ctx.field_name, format!("expected text, got {value}")))?;
        ctx.writer.put_text(text, Charset::Ascii);
        Ok(())
    }
}

/// Tries each alternative's constraints in order against the supplied raw
/// text and keeps the first that validates (spec's analogue of `Object`
/// alternative selection, for configuration-bound fields rather than
/// wire-prefix-bound ones).
struct AlternativeConfigurationFieldCodec;

impl Codec for AlternativeConfigurationFieldCodec {
    fn decode(&self, descriptor: &Descriptor, ctx: &mut DecodeCtx) -> Result<Value> {
        let Descriptor::AlternativeConfigurationField { alternatives } = descriptor else { unreachable!() };
        let raw = match ctx.root.get(ctx.field_name) {
            Some(Value::Text(s)) => s.clone(),
            _ => {
                return Err(Error::template(ctx.field_name, "no configuration value supplied"));
            }
        };
        for alt in alternatives {
            if crate::configuration::validate_configuration_value(alt, &raw).is_ok() {
                return Ok(Value::Text(raw));
            }
        }
        Err(Error::validation(ctx.field_name, format!("'{raw}' matches no declared alternative")))
    }

    fn encode(&self, descriptor: &Descriptor, value: &Value, ctx: &mut EncodeCtx) -> Result<()> {
        let Descriptor::AlternativeConfigurationField { alternatives } = descriptor else { unreachable!() };
        let text = value
            .as_text()
            .ok_or_else(|| Error::template(ctx.field_name, format!("expected text, got {value}")))?;
        if !alternatives
            .iter()
            .any(|alt| crate::configuration::validate_configuration_value(alt, text).is_ok())
        {
            return Err(Error::validation(ctx.field_name, format!("'{text}' matches no declared alternative")));
        }
        ctx.writer.put_text(text, Charset::Ascii);
        Ok(())
    }
}

struct ConfigurationSkipCodec;

impl Codec for ConfigurationSkipCodec {
    fn decode(&self, descriptor: &Descriptor, ctx: &mut DecodeCtx) -> Result<Value> {
        let Descriptor::ConfigurationSkip { terminator } = descriptor else { unreachable!() };
        ctx.reader.get_text_until(*terminator, Charset::Ascii, true)?;
        Ok(Value::Null)
    }

    fn encode(&self, descriptor: &Descriptor, _value: &Value, ctx: &mut EncodeCtx) -> Result<()> {
        let Descriptor::ConfigurationSkip { terminator } = descriptor else { unreachable!() };
        ctx.writer.put_byte(*terminator);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bits::{BitReader, BitWriter};
    use crate::core::CoreFacade;

    fn empty_ctx() -> (BTreeMap<String, Value>, BTreeMap<String, Value>) {
        (BTreeMap::new(), BTreeMap::new())
    }

    #[test]
    fn integer_codec_round_trips() {
        let core = CoreFacade::new().build().unwrap();
        let descriptor = Descriptor::Integer { size: "16".to_string(), byte_order: ByteOrder::BigEndian, signed: false };
        let mut writer = BitWriter::new();
        let (root, self_map) = empty_ctx();
        {
            let mut ectx = EncodeCtx { core: &core, writer: &mut writer, root: &root, self_map: &self_map, field_name: "n" };
            IntegerCodec.encode(&descriptor, &Value::Integer(0x1234), &mut ectx).unwrap();
        }
        let bytes = writer.array();
        let mut reader = BitReader::new(&bytes);
        let mut dctx = DecodeCtx { core: &core, reader: &mut reader, root: &root, self_map: &self_map, field_name: "n" };
        let decoded = IntegerCodec.decode(&descriptor, &mut dctx).unwrap();
        assert_eq!(decoded, Value::Integer(0x1234));
    }

    #[test]
    fn skip_bits_advances_cursor_without_producing_a_value() {
        let core = CoreFacade::new().build().unwrap();
        let bytes = [0xFF, 0xFF];
        let mut reader = BitReader::new(&bytes);
        let (root, self_map) = empty_ctx();
        let mut dctx = DecodeCtx { core: &core, reader: &mut reader, root: &root, self_map: &self_map, field_name: "pad" };
        let descriptor = Descriptor::SkipBits { size: "8".to_string() };
        let v = SkipBitsCodec.decode(&descriptor, &mut dctx).unwrap();
        assert_eq!(v, Value::Null);
        assert_eq!(reader.bit_position(), 8);
    }

    #[test]
    fn string_fixed_rejects_text_violating_match_pattern() {
        let core = CoreFacade::new().build().unwrap();
        let bytes = b"xyz".to_vec();
        let mut reader = BitReader::new(&bytes);
        let (root, self_map) = empty_ctx();
        let mut dctx = DecodeCtx { core: &core, reader: &mut reader, root: &root, self_map: &self_map, field_name: "tag" };
        let descriptor = Descriptor::StringFixed {
            size: "3".to_string(),
            charset: Charset::Ascii,
            match_expr: "^abc$".to_string(),
        };
        assert!(StringFixedCodec.decode(&descriptor, &mut dctx).is_err());
    }
}
