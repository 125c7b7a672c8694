//! Boxon: a declarative binary-message framework.
//!
//! A template is compiled once from a list of [`descriptor::Descriptor`]s
//! (see [`template::TemplateCompiler`]); from then on [`Parser`] and
//! [`Composer`] drive it against wire bytes, [`Configurator`] drives it
//! against a protocol-version-scoped configuration, and [`Describer`]
//! renders it as data for tooling. See SPEC_FULL.md for the full module
//! breakdown.

pub mod bits;
mod checksum;
pub mod codec;
pub mod configuration;
pub mod convert;
pub mod core;
pub mod descriptor;
mod describer;
mod engine;
mod eval;
pub mod error;
mod record;
pub mod registry;
pub mod template;
pub mod value;

use std::collections::BTreeMap;

pub use crate::checksum::{Checksummer, CrcParams};
pub use crate::configuration::{ConfigurationView, Version};
pub use crate::convert::{Converter, PredicateValidator, Validator};
pub use crate::core::{Core, CoreFacade, TemplateSource};
pub use crate::describer::Describer;
pub use crate::descriptor::{
    ConfigurationFieldDescriptor, Descriptor, FieldDescriptor, HeaderBinding, ObjectAlternative, ObjectChoices,
};
pub use crate::error::{Error, ExprError, Result};
pub use crate::record::Record;
pub use crate::template::{FieldOp, FieldPlan, Template, TemplateCompiler, TemplateError};
pub use crate::value::Value;

use crate::descriptor::ConfigurationFieldDescriptor as ConfigFieldDescriptor;
use crate::engine::ParseEngine;
use crate::record::SlotId;

/// Decodes wire bytes against whatever template their header bytes select
/// (spec §4.6/§4.7). Stateless beyond the borrowed [`Core`]; safe to build
/// fresh per call.
pub struct Parser<'a> {
    core: &'a Core,
}

/// A single decoded message: the template that matched, and every field
/// that was set, keyed by name (unset/skipped fields are simply absent).
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedMessage {
    pub class_handle: String,
    pub fields: BTreeMap<String, Value>,
}

impl<'a> Parser<'a> {
    pub fn new(core: &'a Core) -> Self {
        Self { core }
    }

    pub fn parse(&self, bytes: &[u8]) -> Result<ParsedMessage> {
        let (class_handle, record) = ParseEngine::new(self.core).decode(bytes, self.core.context())?;
        let template = self
            .core
            .template_by_name(&class_handle)
            .expect("the engine only returns a class handle for a template it resolved");
        let fields = record.named_snapshot(template.slot_names());
        Ok(ParsedMessage { class_handle, fields })
    }
}

/// The encode-side counterpart of [`Parser`]: given a type name and a named
/// field map, resolves the template, binds values to slots, and writes the
/// wire bytes (spec §4.7 composition direction).
pub struct Composer<'a> {
    core: &'a Core,
}

impl<'a> Composer<'a> {
    pub fn new(core: &'a Core) -> Self {
        Self { core }
    }

    pub fn compose(&self, class_handle: &str, fields: &BTreeMap<String, Value>) -> Result<Vec<u8>> {
        let template = self
            .core
            .template_by_name(class_handle)
            .ok_or_else(|| Error::template(class_handle, "no template registered under this name"))?;
        let record = record_from_named(template, fields);
        ParseEngine::new(self.core).encode(class_handle, &record, self.core.context())
    }
}

fn record_from_named(template: &Template, fields: &BTreeMap<String, Value>) -> Record {
    let mut record = Record::with_capacity(template.slot_names().len());
    for (idx, name) in template.slot_names().iter().enumerate() {
        if let Some(value) = fields.get(name) {
            record.set_slot(SlotId(idx as u32), value.clone());
        }
    }
    record
}

/// Projects a template's `ConfigurationField` descriptors through a
/// particular protocol [`Version`] (spec §4.8).
pub struct Configurator<'a> {
    core: &'a Core,
}

impl<'a> Configurator<'a> {
    pub fn new(core: &'a Core) -> Self {
        Self { core }
    }

    pub fn view(&self, class_handle: &str, version: &Version) -> Result<ConfigurationView> {
        let template = self
            .core
            .template_by_name(class_handle)
            .ok_or_else(|| Error::template(class_handle, "no template registered under this name"))?;
        let fields: Vec<(String, ConfigFieldDescriptor)> = template
            .fields()
            .iter()
            .filter_map(|op| match &op.descriptor {
                Descriptor::ConfigurationField(desc) => Some((op.field_name.clone(), desc.clone())),
                _ => None,
            })
            .collect();
        Ok(ConfigurationView::build(fields, version))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bits::ByteOrder;
    use crate::descriptor::HeaderBinding as HB;

    #[test]
    fn parser_and_composer_round_trip_through_the_public_api() {
        let core = CoreFacade::new()
            .with_template(TemplateSource {
                class_handle: "Ping".to_string(),
                header: HB::Bound { start_markers: vec![vec![0x7E]], end_marker: None, charset: crate::bits::Charset::Ascii },
                fields: vec![FieldDescriptor::new(
                    "sequence",
                    Descriptor::Integer { size: "8".to_string(), byte_order: ByteOrder::BigEndian, signed: false },
                )],
                embedded_only: false,
            })
            .build()
            .unwrap();

        let parsed = Parser::new(&core).parse(&[0x7E, 0x05]).unwrap();
        assert_eq!(parsed.class_handle, "Ping");
        assert_eq!(parsed.fields.get("sequence"), Some(&Value::Integer(5)));

        let bytes = Composer::new(&core).compose("Ping", &parsed.fields).unwrap();
        assert_eq!(bytes, vec![0x7E, 0x05]);
    }
}
