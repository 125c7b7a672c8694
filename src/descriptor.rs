//! The normalized, language-agnostic descriptor model (spec §3.1, C3).
//!
//! A [`Descriptor`] is a tagged variant: each kind only carries data valid
//! for it, so "an optional field set on the wrong variant" is not
//! representable. [`TemplateCompiler`](crate::template::TemplateCompiler)
//! consumes these to produce an executable [`crate::template::FieldPlan`].

use crate::bits::{ByteOrder, Charset};
use crate::configuration::Version;

/// One field's descriptor plus the declaration metadata the compiler needs
/// to bind it to a record slot (spec §3.1, `FieldOp` before compilation).
#[derive(Debug, Clone)]
pub struct FieldDescriptor {
    /// The name the descriptor was declared under; used to resolve the
    /// target slot and for diagnostics. Never used for runtime field
    /// lookup once compiled (spec §9, "Field identity").
    pub name: String,
    /// Expression string; empty means "always" (spec §4.2).
    pub condition: String,
    pub descriptor: Descriptor,
    /// `(condition, converter)` pairs tried in order; first matching
    /// condition's converter applies.
    pub converter_choices: Vec<(String, String)>,
    pub default_converter: Option<String>,
    pub validator: Option<String>,
}

impl FieldDescriptor {
    pub fn new(name: impl Into<String>, descriptor: Descriptor) -> Self {
        Self {
            name: name.into(),
            condition: String::new(),
            descriptor,
            converter_choices: Vec::new(),
            default_converter: None,
            validator: None,
        }
    }

    pub fn with_condition(mut self, condition: impl Into<String>) -> Self {
        self.condition = condition.into();
        self
    }

    pub fn with_validator(mut self, validator: impl Into<String>) -> Self {
        self.validator = Some(validator.into());
        self
    }
}

/// Tagged descriptor kinds (spec §3.1).
#[derive(Debug, Clone)]
pub enum Descriptor {
    Integer {
        size: String,
        byte_order: ByteOrder,
        signed: bool,
    },
    BitSetField {
        size: String,
        byte_order: ByteOrder,
    },
    StringFixed {
        size: String,
        charset: Charset,
        /// Non-empty: an equals/regex/expression comparison the decoded
        /// text must satisfy (spec §4.4).
        match_expr: String,
    },
    StringTerminated {
        terminator: u8,
        charset: Charset,
        consume_terminator: bool,
    },
    Object {
        choices: ObjectChoices,
        default_type: Option<String>,
    },
    /// Wraps any of the above, making the target field an array.
    AsArray {
        element: Box<Descriptor>,
        size: String,
    },
    SkipBits {
        size: String,
    },
    SkipUntilTerminator {
        terminator: u8,
        consume_terminator: bool,
    },
    Checksum {
        algorithm: String,
        skip_start: u32,
        skip_end: u32,
        byte_order: ByteOrder,
    },
    Evaluate {
        value: String,
    },
    PostProcess {
        condition: String,
        value_decode: String,
        value_encode: String,
    },
    ContextParameter {
        key: String,
    },
    ConfigurationField(ConfigurationFieldDescriptor),
    CompositeConfigurationField {
        fields: Vec<ConfigurationFieldDescriptor>,
        composition: String,
    },
    AlternativeConfigurationField {
        alternatives: Vec<ConfigurationFieldDescriptor>,
    },
    ConfigurationSkip {
        terminator: u8,
    },
}

/// One `Object` alternative: a condition plus the name of the sub-template
/// it selects.
#[derive(Debug, Clone)]
pub struct ObjectAlternative {
    /// Evaluated with a synthetic `prefix` self-field when `prefix_size >
    /// 0`; otherwise evaluated against whatever fields were already
    /// decoded in the enclosing record.
    pub condition: String,
    pub type_name: String,
    /// The alternative's numeric prefix value, required when the owning
    /// `ObjectChoices::prefix_size` is non-zero — decode discriminates via
    /// `condition`, encode re-selects the alternative by `type_name` and
    /// writes this value back onto the wire (spec §4.3 step 2a).
    pub prefix_value: Option<i128>,
}

#[derive(Debug, Clone)]
pub struct ObjectChoices {
    /// `0` means no prefix is read; alternatives are then discriminated
    /// purely by their conditions over already-decoded fields.
    pub prefix_size: u32,
    pub prefix_byte_order: ByteOrder,
    pub alternatives: Vec<ObjectAlternative>,
}

/// Metadata describing one configuration (protocol) field (spec §4.8).
#[derive(Debug, Clone, Default)]
pub struct ConfigurationFieldDescriptor {
    pub short_description: String,
    pub long_description: String,
    pub unit_of_measure: String,
    pub min_value: Option<f64>,
    pub max_value: Option<f64>,
    pub pattern: Option<String>,
    pub enumeration: Vec<String>,
    pub default_value: Option<String>,
    pub charset: Option<Charset>,
    pub terminator: Option<u8>,
    pub min_protocol: Option<Version>,
    pub max_protocol: Option<Version>,
}

impl ConfigurationFieldDescriptor {
    /// spec §4.4 step 5: at most one of `{pattern, (min/max), enumeration}`.
    pub fn has_conflicting_constraints(&self) -> bool {
        let has_pattern = self.pattern.as_ref().is_some_and(|p| !p.is_empty());
        let has_range = self.min_value.is_some() || self.max_value.is_some();
        let has_enum = !self.enumeration.is_empty();
        [has_pattern, has_range, has_enum].iter().filter(|&&b| b).count() > 1
    }
}

/// Header framing for templated messages (spec §3.1).
#[derive(Debug, Clone)]
pub enum HeaderBinding {
    Bound {
        start_markers: Vec<Vec<u8>>,
        end_marker: Option<Vec<u8>>,
        charset: Charset,
    },
    /// Embedded types (e.g. `Object` alternatives) have no header of their
    /// own.
    Absent,
}

impl HeaderBinding {
    pub fn start_markers(&self) -> &[Vec<u8>] {
        match self {
            HeaderBinding::Bound { start_markers, .. } => start_markers,
            HeaderBinding::Absent => &[],
        }
    }
}
