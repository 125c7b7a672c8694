//! Build-time composition: descriptors + codecs + context → an immutable
//! `Core` (spec §4.9, C10).

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::checksum::{presets, Checksummer};
use crate::codec::CodecRegistry;
use crate::convert::{Converter, Validator};
use crate::descriptor::HeaderBinding;
use crate::descriptor::FieldDescriptor;
use crate::error::{Error, Result};
use crate::registry::TemplateRegistry;
use crate::template::{Template, TemplateCompiler, TemplateError};
use crate::value::Value;

/// The immutable, shareable runtime every user-facing entry point
/// (`Parser`, `Composer`, `Configurator`, `Describer`) borrows (spec §3.3,
/// §5: "`Core` is `Send + Sync`-equivalent; parse calls are stack-local").
pub struct Core {
    codecs: CodecRegistry,
    templates: TemplateRegistry,
    /// Templates reachable only as an `Object` alternative target, keyed
    /// by the name `ObjectAlternative::type_name` refers to.
    object_templates: BTreeMap<String, Arc<Template>>,
    converters: BTreeMap<String, Arc<dyn Converter>>,
    validators: BTreeMap<String, Arc<dyn Validator>>,
    checksummers: BTreeMap<String, Arc<dyn Checksummer>>,
    context: BTreeMap<String, Value>,
}

impl Core {
    pub fn codec_registry(&self) -> &CodecRegistry {
        &self.codecs
    }

    pub fn template_registry(&self) -> &TemplateRegistry {
        &self.templates
    }

    pub fn object_template(&self, type_name: &str) -> Option<&Template> {
        self.object_templates.get(type_name).map(Arc::as_ref)
    }

    /// Resolves a template by its class handle, checking embedded-only
    /// (`Object` alternative) templates first, then top-level header-bound
    /// ones — used by [`crate::engine::ParseEngine::encode`], which starts
    /// from a known type name rather than wire bytes.
    pub fn template_by_name(&self, class_handle: &str) -> Option<&Template> {
        self.object_templates
            .get(class_handle)
            .map(Arc::as_ref)
            .or_else(|| self.templates.get(class_handle))
    }

    pub fn converter(&self, id: &str) -> Option<&dyn Converter> {
        self.converters.get(id).map(Arc::as_ref)
    }

    pub fn validator(&self, id: &str) -> Option<&dyn Validator> {
        self.validators.get(id).map(Arc::as_ref)
    }

    pub fn checksummer(&self, id: &str) -> Result<&dyn Checksummer> {
        self.checksummers
            .get(id)
            .map(Arc::as_ref)
            .ok_or_else(|| Error::template(id, "no checksummer registered under this name"))
    }

    pub fn context(&self) -> &BTreeMap<String, Value> {
        &self.context
    }
}

/// One record type's descriptors, ready for compilation.
pub struct TemplateSource {
    pub class_handle: String,
    pub header: HeaderBinding,
    pub fields: Vec<FieldDescriptor>,
    /// `true` for templates only ever reached as an `Object` alternative
    /// target (no top-level header dispatch).
    pub embedded_only: bool,
}

/// Builder that takes descriptor sources, custom codecs, checksummers,
/// converters, validators and context values and produces an immutable
/// [`Core`] (spec §4.9).
#[derive(Default)]
pub struct CoreFacade {
    codecs: CodecRegistry,
    sources: Vec<TemplateSource>,
    converters: BTreeMap<String, Arc<dyn Converter>>,
    validators: BTreeMap<String, Arc<dyn Validator>>,
    checksummers: BTreeMap<String, Arc<dyn Checksummer>>,
    context: BTreeMap<String, Value>,
}

impl CoreFacade {
    pub fn new() -> Self {
        let mut facade = Self {
            codecs: CodecRegistry::with_defaults(),
            ..Default::default()
        };
        facade.checksummers.insert("CRC16".to_string(), Arc::new(presets::CRC16_IBM));
        facade.checksummers.insert("CRC16/IBM".to_string(), Arc::new(presets::CRC16_IBM));
        facade
            .checksummers
            .insert("CRC16/CCITT-FALSE".to_string(), Arc::new(presets::CRC16_CCITT_FALSE));
        facade
            .checksummers
            .insert("CRC32".to_string(), Arc::new(presets::CRC32_ISO_HDLC));
        facade
    }

    pub fn with_template(mut self, source: TemplateSource) -> Self {
        self.sources.push(source);
        self
    }

    pub fn with_codec_registry(mut self, codecs: CodecRegistry) -> Self {
        self.codecs = codecs;
        self
    }

    pub fn with_converter(mut self, id: impl Into<String>, converter: Arc<dyn Converter>) -> Self {
        self.converters.insert(id.into(), converter);
        self
    }

    pub fn with_validator(mut self, id: impl Into<String>, validator: Arc<dyn Validator>) -> Self {
        self.validators.insert(id.into(), validator);
        self
    }

    pub fn with_checksummer(mut self, id: impl Into<String>, checksummer: Arc<dyn Checksummer>) -> Self {
        self.checksummers.insert(id.into(), checksummer);
        self
    }

    pub fn with_context_value(mut self, key: impl Into<String>, value: Value) -> Self {
        self.context.insert(key.into(), value);
        self
    }

    /// Compiles every registered template source, collecting all
    /// `TemplateError`s before returning (spec §4.3).
    pub fn build(self) -> std::result::Result<Core, Vec<TemplateError>> {
        let mut errors = Vec::new();
        let mut templates = TemplateRegistry::new();
        let mut object_templates = BTreeMap::new();

        for source in self.sources {
            match TemplateCompiler::compile(source.class_handle.clone(), source.header, source.fields) {
                Ok(template) => {
                    if source.embedded_only {
                        object_templates.insert(source.class_handle, Arc::new(template));
                    } else if let Err(e) = templates.register(template.clone()) {
                        errors.push(TemplateError { field: source.class_handle.clone(), reason: e.to_string() });
                    } else {
                        object_templates.insert(source.class_handle, Arc::new(template));
                    }
                }
                Err(mut errs) => errors.append(&mut errs),
            }
        }

        if !errors.is_empty() {
            return Err(errors);
        }

        Ok(Core {
            codecs: self.codecs,
            templates,
            object_templates,
            converters: self.converters,
            validators: self.validators,
            checksummers: self.checksummers,
            context: self.context,
        })
    }
}
