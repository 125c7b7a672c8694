//! Structured, nested description of a compiled template (spec §4.9, C9):
//! every descriptor's shape, without requiring wire bytes to walk it.

use std::collections::BTreeMap;

use crate::bits::ByteOrder;
use crate::codec::DescriptorKind;
use crate::core::Core;
use crate::descriptor::Descriptor;
use crate::error::{Error, Result};
use crate::template::{FieldOp, Template};
use crate::value::Value;

pub struct Describer<'a> {
    core: &'a Core,
}

impl<'a> Describer<'a> {
    pub fn new(core: &'a Core) -> Self {
        Self { core }
    }

    /// Describes the template registered under `class_handle`, recursing
    /// into any `Object` alternative's own template.
    pub fn describe(&self, class_handle: &str) -> Result<Value> {
        let template = self
            .core
            .template_by_name(class_handle)
            .ok_or_else(|| Error::template(class_handle, "no template registered under this name"))?;
        Ok(describe_template(self.core, template))
    }
}

fn describe_template(core: &Core, template: &Template) -> Value {
    let mut map = BTreeMap::new();
    map.insert("classHandle".to_string(), Value::Text(template.class_handle().clone()));
    map.insert("header".to_string(), describe_header(template));
    map.insert(
        "fields".to_string(),
        Value::Array(template.fields().iter().map(|op| describe_field(core, op)).collect()),
    );
    if !template.post_process().is_empty() {
        map.insert(
            "postProcess".to_string(),
            Value::Array(template.post_process().iter().map(|op| describe_field(core, op)).collect()),
        );
    }
    Value::Map(map)
}

fn describe_header(template: &Template) -> Value {
    use crate::descriptor::HeaderBinding;
    match template.header() {
        HeaderBinding::Absent => Value::Null,
        HeaderBinding::Bound { start_markers, end_marker, .. } => {
            let mut map = BTreeMap::new();
            map.insert(
                "startMarkers".to_string(),
                Value::Array(start_markers.iter().map(|m| Value::Bytes(m.clone())).collect()),
            );
            if let Some(marker) = end_marker {
                map.insert("endMarker".to_string(), Value::Bytes(marker.clone()));
            }
            Value::Map(map)
        }
    }
}

fn describe_field(core: &Core, op: &FieldOp) -> Value {
    let mut map = BTreeMap::new();
    map.insert("name".to_string(), Value::Text(op.field_name.clone()));
    map.insert("kind".to_string(), Value::Text(format!("{:?}", DescriptorKind::of(&op.descriptor))));
    if !op.condition.is_empty() {
        map.insert("condition".to_string(), Value::Text(op.condition.clone()));
    }
    if let Some(validator) = &op.validator {
        map.insert("validator".to_string(), Value::Text(validator.clone()));
    }
    map.insert("detail".to_string(), describe_descriptor(core, &op.descriptor));
    Value::Map(map)
}

fn byte_order_text(order: ByteOrder) -> Value {
    Value::Text(match order {
        ByteOrder::BigEndian => "bigEndian".to_string(),
        ByteOrder::LittleEndian => "littleEndian".to_string(),
    })
}

fn describe_descriptor(core: &Core, descriptor: &Descriptor) -> Value {
    let mut map = BTreeMap::new();
    match descriptor {
        Descriptor::Integer { size, byte_order, signed } => {
            map.insert("size".to_string(), Value::Text(size.clone()));
            map.insert("byteOrder".to_string(), byte_order_text(*byte_order));
            map.insert("signed".to_string(), Value::Bool(*signed));
        }
        Descriptor::BitSetField { size, byte_order } => {
            map.insert("size".to_string(), Value::Text(size.clone()));
            map.insert("byteOrder".to_string(), byte_order_text(*byte_order));
        }
        Descriptor::StringFixed { size, match_expr, .. } => {
            map.insert("size".to_string(), Value::Text(size.clone()));
            if !match_expr.is_empty() {
                map.insert("matchExpr".to_string(), Value::Text(match_expr.clone()));
            }
        }
        Descriptor::StringTerminated { terminator, consume_terminator, .. } => {
            map.insert("terminator".to_string(), Value::Integer(*terminator as i64));
            map.insert("consumeTerminator".to_string(), Value::Bool(*consume_terminator));
        }
        Descriptor::Object { choices, default_type } => {
            map.insert("prefixSize".to_string(), Value::Integer(choices.prefix_size as i64));
            map.insert(
                "alternatives".to_string(),
                Value::Array(
                    choices
                        .alternatives
                        .iter()
                        .map(|alt| {
                            let mut m = BTreeMap::new();
                            m.insert("typeName".to_string(), Value::Text(alt.type_name.clone()));
                            m.insert("condition".to_string(), Value::Text(alt.condition.clone()));
                            if let Some(template) = core.object_template(&alt.type_name) {
                                m.insert("template".to_string(), describe_template(core, template));
                            }
                            Value::Map(m)
                        })
                        .collect(),
                ),
            );
            if let Some(default) = default_type {
                map.insert("defaultType".to_string(), Value::Text(default.clone()));
            }
        }
        Descriptor::AsArray { element, size } => {
            map.insert("size".to_string(), Value::Text(size.clone()));
            map.insert("element".to_string(), describe_descriptor(core, element));
        }
        Descriptor::SkipBits { size } => {
            map.insert("size".to_string(), Value::Text(size.clone()));
        }
        Descriptor::SkipUntilTerminator { terminator, consume_terminator } => {
            map.insert("terminator".to_string(), Value::Integer(*terminator as i64));
            map.insert("consumeTerminator".to_string(), Value::Bool(*consume_terminator));
        }
        Descriptor::Checksum { algorithm, skip_start, skip_end, byte_order } => {
            map.insert("algorithm".to_string(), Value::Text(algorithm.clone()));
            map.insert("skipStart".to_string(), Value::Integer(*skip_start as i64));
            map.insert("skipEnd".to_string(), Value::Integer(*skip_end as i64));
            map.insert("byteOrder".to_string(), byte_order_text(*byte_order));
        }
        Descriptor::Evaluate { value } => {
            map.insert("value".to_string(), Value::Text(value.clone()));
        }
        Descriptor::PostProcess { condition, value_decode, value_encode } => {
            map.insert("condition".to_string(), Value::Text(condition.clone()));
            map.insert("valueDecode".to_string(), Value::Text(value_decode.clone()));
            map.insert("valueEncode".to_string(), Value::Text(value_encode.clone()));
        }
        Descriptor::ContextParameter { key } => {
            map.insert("key".to_string(), Value::Text(key.clone()));
        }
        Descriptor::ConfigurationField(desc) => {
            map.insert("configuration".to_string(), describe_configuration_field(desc));
        }
        Descriptor::CompositeConfigurationField { fields, composition } => {
            map.insert("composition".to_string(), Value::Text(composition.clone()));
            map.insert(
                "fields".to_string(),
                Value::Array(fields.iter().map(describe_configuration_field).collect()),
            );
        }
        Descriptor::AlternativeConfigurationField { alternatives } => {
            map.insert(
                "alternatives".to_string(),
                Value::Array(alternatives.iter().map(describe_configuration_field).collect()),
            );
        }
        Descriptor::ConfigurationSkip { terminator } => {
            map.insert("terminator".to_string(), Value::Integer(*terminator as i64));
        }
    }
    Value::Map(map)
}

fn describe_configuration_field(desc: &crate::descriptor::ConfigurationFieldDescriptor) -> Value {
    let mut map = BTreeMap::new();
    if !desc.short_description.is_empty() {
        map.insert("shortDescription".to_string(), Value::Text(desc.short_description.clone()));
    }
    if !desc.long_description.is_empty() {
        map.insert("longDescription".to_string(), Value::Text(desc.long_description.clone()));
    }
    if let Some(pattern) = &desc.pattern {
        map.insert("pattern".to_string(), Value::Text(pattern.clone()));
    }
    if !desc.enumeration.is_empty() {
        map.insert(
            "enumeration".to_string(),
            Value::Array(desc.enumeration.iter().map(|s| Value::Text(s.clone())).collect()),
        );
    }
    if let Some(min) = desc.min_value {
        map.insert("minValue".to_string(), Value::Float(min));
    }
    if let Some(max) = desc.max_value {
        map.insert("maxValue".to_string(), Value::Float(max));
    }
    if let Some(default) = &desc.default_value {
        map.insert("defaultValue".to_string(), Value::Text(default.clone()));
    }
    Value::Map(map)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bits::ByteOrder;
    use crate::core::{CoreFacade, TemplateSource};
    use crate::descriptor::{FieldDescriptor, HeaderBinding};

    #[test]
    fn describes_a_simple_template() {
        let core = CoreFacade::new()
            .with_template(TemplateSource {
                class_handle: "Device".to_string(),
                header: HeaderBinding::Bound { start_markers: vec![vec![0xAA]], end_marker: None, charset: crate::bits::Charset::Ascii },
                fields: vec![FieldDescriptor::new(
                    "id",
                    Descriptor::Integer { size: "16".to_string(), byte_order: ByteOrder::BigEndian, signed: false },
                )],
                embedded_only: false,
            })
            .build()
            .unwrap();
        let description = Describer::new(&core).describe("Device").unwrap();
        match description {
            Value::Map(m) => assert_eq!(m.get("classHandle"), Some(&Value::Text("Device".to_string()))),
            other => panic!("expected a map, got {other:?}"),
        }
    }
}
