//! Descriptor-kind → (decode, encode) strategy registry (spec §4.4, C5).

mod defaults;

use std::collections::BTreeMap;
use std::collections::HashMap;
use std::sync::Arc;

use crate::bits::{BitReader, BitWriter};
use crate::core::Core;
use crate::descriptor::Descriptor;
use crate::error::{Error, Result};
use crate::value::Value;

/// Everything a codec needs to decode one field: the bit cursor, the two
/// evaluation contexts (spec §3.1), a back-reference to `Core` so
/// recursive kinds (`Object`, `AsArray`) can dispatch into the engine or
/// back into this same registry, and the field's own name for errors.
pub struct DecodeCtx<'a, 'b> {
    pub core: &'a Core,
    pub reader: &'a mut BitReader<'b>,
    pub root: &'a BTreeMap<String, Value>,
    pub self_map: &'a BTreeMap<String, Value>,
    pub field_name: &'a str,
}

pub struct EncodeCtx<'a> {
    pub core: &'a Core,
    pub writer: &'a mut BitWriter,
    pub root: &'a BTreeMap<String, Value>,
    pub self_map: &'a BTreeMap<String, Value>,
    pub field_name: &'a str,
}

/// A descriptor-kind's decode/encode strategy (spec §4.4).
pub trait Codec: Send + Sync {
    fn decode(&self, descriptor: &Descriptor, ctx: &mut DecodeCtx) -> Result<Value>;
    fn encode(&self, descriptor: &Descriptor, value: &Value, ctx: &mut EncodeCtx) -> Result<()>;
}

/// The tag `CodecRegistry` dispatches on — one variant per §3.1 descriptor
/// kind, carrying no data of its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DescriptorKind {
    Integer,
    BitSet,
    StringFixed,
    StringTerminated,
    Object,
    AsArray,
    SkipBits,
    SkipUntilTerminator,
    Checksum,
    Evaluate,
    PostProcess,
    ContextParameter,
    ConfigurationField,
    CompositeConfigurationField,
    AlternativeConfigurationField,
    ConfigurationSkip,
}

impl DescriptorKind {
    pub fn of(descriptor: &Descriptor) -> Self {
        match descriptor {
            Descriptor::Integer { .. } => Self::Integer,
            Descriptor::BitSetField { .. } => Self::BitSet,
            Descriptor::StringFixed { .. } => Self::StringFixed,
            Descriptor::StringTerminated { .. } => Self::StringTerminated,
            Descriptor::Object { .. } => Self::Object,
            Descriptor::AsArray { .. } => Self::AsArray,
            Descriptor::SkipBits { .. } => Self::SkipBits,
            Descriptor::SkipUntilTerminator { .. } => Self::SkipUntilTerminator,
            Descriptor::Checksum { .. } => Self::Checksum,
            Descriptor::Evaluate { .. } => Self::Evaluate,
            Descriptor::PostProcess { .. } => Self::PostProcess,
            Descriptor::ContextParameter { .. } => Self::ContextParameter,
            Descriptor::ConfigurationField(_) => Self::ConfigurationField,
            Descriptor::CompositeConfigurationField { .. } => Self::CompositeConfigurationField,
            Descriptor::AlternativeConfigurationField { .. } => Self::AlternativeConfigurationField,
            Descriptor::ConfigurationSkip { .. } => Self::ConfigurationSkip,
        }
    }
}

/// Fixed, tested registration order for the default codecs (spec §4.4:
/// "Ordering of default kinds is fixed and tested").
pub const DEFAULT_KIND_ORDER: [DescriptorKind; 16] = [
    DescriptorKind::Integer,
    DescriptorKind::BitSet,
    DescriptorKind::StringFixed,
    DescriptorKind::StringTerminated,
    DescriptorKind::Object,
    DescriptorKind::AsArray,
    DescriptorKind::SkipBits,
    DescriptorKind::SkipUntilTerminator,
    DescriptorKind::Checksum,
    DescriptorKind::Evaluate,
    DescriptorKind::PostProcess,
    DescriptorKind::ContextParameter,
    DescriptorKind::ConfigurationField,
    DescriptorKind::CompositeConfigurationField,
    DescriptorKind::AlternativeConfigurationField,
    DescriptorKind::ConfigurationSkip,
];

#[derive(Default)]
pub struct CodecRegistry {
    codecs: HashMap<DescriptorKind, Arc<dyn Codec>>,
    registration_order: Vec<DescriptorKind>,
}

impl CodecRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a registry pre-populated with the default codec for every
    /// kind, in [`DEFAULT_KIND_ORDER`].
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        for kind in DEFAULT_KIND_ORDER {
            registry.register(kind, defaults::default_codec(kind));
        }
        registry
    }

    /// Registers (or overrides) the codec for `kind`; users may add extra
    /// kinds beyond the default set (spec §4.4).
    pub fn register(&mut self, kind: DescriptorKind, codec: Arc<dyn Codec>) {
        if !self.codecs.contains_key(&kind) {
            self.registration_order.push(kind);
        }
        self.codecs.insert(kind, codec);
    }

    pub fn registration_order(&self) -> &[DescriptorKind] {
        &self.registration_order
    }

    pub fn decode(&self, descriptor: &Descriptor, ctx: &mut DecodeCtx) -> Result<Value> {
        let kind = DescriptorKind::of(descriptor);
        let codec = self
            .codecs
            .get(&kind)
            .ok_or_else(|| Error::template(ctx.field_name, format!("no codec registered for {kind:?}")))?;
        codec.decode(descriptor, ctx)
    }

    pub fn encode(&self, descriptor: &Descriptor, value: &Value, ctx: &mut EncodeCtx) -> Result<()> {
        let kind = DescriptorKind::of(descriptor);
        let codec = self
            .codecs
            .get(&kind)
            .ok_or_else(|| Error::template(ctx.field_name, format!("no codec registered for {kind:?}")))?;
        codec.encode(descriptor, value, ctx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_registry_covers_every_kind_in_fixed_order() {
        let registry = CodecRegistry::with_defaults();
        assert_eq!(registry.registration_order(), &DEFAULT_KIND_ORDER);
    }
}
