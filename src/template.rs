//! Template compilation (spec §4.3, C4): validates descriptors against the
//! record shape and freezes them into an ordered [`FieldPlan`].

use crate::configuration::validate_configuration_value;
use crate::descriptor::{Descriptor, FieldDescriptor, HeaderBinding, ObjectChoices};
use crate::eval::referenced_self_fields;
use crate::record::SlotId;

/// One compiled descriptor bound to a target field (spec §3.1).
#[derive(Debug, Clone)]
pub struct FieldOp {
    pub target: SlotId,
    pub field_name: String,
    pub descriptor: Descriptor,
    pub condition: String,
    pub converter_choices: Vec<(String, String)>,
    pub default_converter: Option<String>,
    pub validator: Option<String>,
}

impl FieldOp {
    fn compile(slot: SlotId, field: FieldDescriptor) -> Self {
        Self {
            target: slot,
            field_name: field.name,
            descriptor: field.descriptor,
            condition: field.condition,
            converter_choices: field.converter_choices,
            default_converter: field.default_converter,
            validator: field.validator,
        }
    }

    pub fn is_on_wire(&self) -> bool {
        !matches!(self.descriptor, Descriptor::Evaluate { .. } | Descriptor::PostProcess { .. })
    }
}

/// The compiled, immutable form of a record type (spec §3.1/§3.3).
///
/// `Template` *is* the `FieldPlan` the spec describes — there is no
/// separate representation, since compilation is the only thing that
/// produces one and the result is never mutated afterwards.
#[derive(Debug, Clone, derive_getters::Getters)]
pub struct Template {
    header: HeaderBinding,
    fields: Vec<FieldOp>,
    post_process: Vec<FieldOp>,
    class_handle: String,
    slot_names: Vec<String>,
}

/// Alias matching the spec's terminology for the compiled, executable form.
pub type FieldPlan = Template;

impl Template {
    pub fn slot_name(&self, slot: SlotId) -> Option<&str> {
        self.slot_names.get(slot.index()).map(String::as_str)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateError {
    pub field: String,
    pub reason: String,
}

impl std::fmt::Display for TemplateError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "field '{}': {}", self.field, self.reason)
    }
}

impl std::error::Error for TemplateError {}

pub struct TemplateCompiler;

impl TemplateCompiler {
    /// Validates and compiles `descriptors` for a record type named
    /// `class_handle`, collecting every validation error rather than
    /// stopping at the first (spec §4.3).
    pub fn compile(
        class_handle: impl Into<String>,
        header: HeaderBinding,
        descriptors: Vec<FieldDescriptor>,
    ) -> Result<Template, Vec<TemplateError>> {
        let mut errors = Vec::new();
        let mut slot_names = Vec::with_capacity(descriptors.len());
        let mut field_ops = Vec::with_capacity(descriptors.len());

        for (idx, field) in descriptors.into_iter().enumerate() {
            validate_field(&field, &mut errors);
            slot_names.push(field.name.clone());
            field_ops.push(FieldOp::compile(SlotId(idx as u32), field));
        }

        validate_checksum_is_last(&field_ops, &mut errors);

        if !errors.is_empty() {
            return Err(errors);
        }

        let (post_process, fields): (Vec<_>, Vec<_>) =
            field_ops.into_iter().partition(|op| !op.is_on_wire());

        Ok(Template {
            header,
            fields,
            post_process,
            class_handle: class_handle.into(),
            slot_names,
        })
    }
}

fn validate_field(field: &FieldDescriptor, errors: &mut Vec<TemplateError>) {
    if field.name.is_empty() {
        errors.push(TemplateError {
            field: "<unnamed>".to_string(),
            reason: "descriptor must target a named field".to_string(),
        });
    }
    if !field.condition.is_empty() {
        if let Err(e) = referenced_self_fields(&field.condition) {
            errors.push(TemplateError {
                field: field.name.clone(),
                reason: format!("invalid condition expression: {e}"),
            });
        }
    }

    match &field.descriptor {
        Descriptor::Object { choices, .. } => validate_object_choices(&field.name, choices, errors),
        Descriptor::AsArray { size, .. } => validate_size_expr(&field.name, size, errors),
        Descriptor::Integer { size, .. } | Descriptor::BitSetField { size, .. } | Descriptor::SkipBits { size } => {
            validate_size_expr(&field.name, size, errors);
        }
        Descriptor::ConfigurationField(desc) => validate_configuration_field(&field.name, desc, errors),
        Descriptor::CompositeConfigurationField { fields, .. }
        | Descriptor::AlternativeConfigurationField { alternatives: fields } => {
            for desc in fields {
                validate_configuration_field(&field.name, desc, errors);
            }
        }
        Descriptor::Checksum { skip_start, skip_end, algorithm, .. } => {
            if algorithm.is_empty() {
                errors.push(TemplateError {
                    field: field.name.clone(),
                    reason: "checksum descriptor must name an algorithm".to_string(),
                });
            }
            let _ = (skip_start, skip_end); // both are u32: non-negative by construction
        }
        Descriptor::Evaluate { value } => validate_nonempty_expr(&field.name, value, errors),
        Descriptor::PostProcess { value_decode, value_encode, .. } => {
            if value_decode.is_empty() && value_encode.is_empty() {
                errors.push(TemplateError {
                    field: field.name.clone(),
                    reason: "post-process descriptor needs at least one of valueDecode/valueEncode".to_string(),
                });
            }
        }
        _ => {}
    }
}

fn validate_size_expr(field: &str, size: &str, errors: &mut Vec<TemplateError>) {
    if size.is_empty() {
        errors.push(TemplateError {
            field: field.to_string(),
            reason: "size expression must not be empty".to_string(),
        });
    } else if let Err(e) = referenced_self_fields(size) {
        errors.push(TemplateError {
            field: field.to_string(),
            reason: format!("invalid size expression: {e}"),
        });
    }
}

fn validate_nonempty_expr(field: &str, expr: &str, errors: &mut Vec<TemplateError>) {
    if expr.is_empty() {
        errors.push(TemplateError {
            field: field.to_string(),
            reason: "expression must not be empty".to_string(),
        });
    } else if let Err(e) = referenced_self_fields(expr) {
        errors.push(TemplateError {
            field: field.to_string(),
            reason: format!("invalid expression: {e}"),
        });
    }
}

/// spec §4.3 step 2: resolve `Object` alternatives.
fn validate_object_choices(field: &str, choices: &ObjectChoices, errors: &mut Vec<TemplateError>) {
    if choices.alternatives.is_empty() {
        errors.push(TemplateError {
            field: field.to_string(),
            reason: "Object descriptor must declare at least one alternative".to_string(),
        });
        return;
    }
    for alt in &choices.alternatives {
        if alt.type_name.is_empty() {
            errors.push(TemplateError {
                field: field.to_string(),
                reason: "Object alternative must name a target type".to_string(),
            });
        }
        let refs = match referenced_self_fields(&alt.condition) {
            Ok(r) => r,
            Err(e) => {
                errors.push(TemplateError {
                    field: field.to_string(),
                    reason: format!("invalid alternative condition: {e}"),
                });
                continue;
            }
        };
        if choices.prefix_size > 0 {
            let non_prefix: Vec<_> = refs.iter().filter(|r| r.as_str() != "prefix").collect();
            if !non_prefix.is_empty() {
                errors.push(TemplateError {
                    field: field.to_string(),
                    reason: format!(
                        "alternative condition references non-prefix field(s) {non_prefix:?} but prefix_size > 0"
                    ),
                });
            }
            if alt.prefix_value.is_none() {
                errors.push(TemplateError {
                    field: field.to_string(),
                    reason: format!("alternative '{}' needs an explicit prefix_value when prefix_size > 0", alt.type_name),
                });
            }
        }
    }
}

fn validate_configuration_field(
    field: &str,
    desc: &crate::descriptor::ConfigurationFieldDescriptor,
    errors: &mut Vec<TemplateError>,
) {
    if desc.has_conflicting_constraints() {
        errors.push(TemplateError {
            field: field.to_string(),
            reason: "at most one of pattern, (min/max value), enumeration may be set".to_string(),
        });
    }
    if let Some(pattern) = &desc.pattern {
        if pattern.is_empty() {
            errors.push(TemplateError {
                field: field.to_string(),
                reason: "pattern must not be an empty regex".to_string(),
            });
        }
    }
    if let Some(default) = &desc.default_value {
        if let Err(reason) = validate_configuration_value(desc, default) {
            errors.push(TemplateError {
                field: field.to_string(),
                reason: format!("default value invalid: {reason}"),
            });
        }
    }
}

/// spec §4.3 step 6: the checksum field is the last on-wire field.
fn validate_checksum_is_last(fields: &[FieldOp], errors: &mut Vec<TemplateError>) {
    let on_wire: Vec<&FieldOp> = fields.iter().filter(|f| f.is_on_wire()).collect();
    for (idx, op) in on_wire.iter().enumerate() {
        if matches!(op.descriptor, Descriptor::Checksum { .. }) && idx != on_wire.len() - 1 {
            errors.push(TemplateError {
                field: op.field_name.clone(),
                reason: "checksum descriptor must be the last on-wire field".to_string(),
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bits::ByteOrder;
    use crate::descriptor::{ObjectAlternative, ObjectChoices};

    #[test]
    fn compiles_simple_template() {
        let fields = vec![FieldDescriptor::new(
            "deviceId",
            Descriptor::Integer { size: "16".to_string(), byte_order: ByteOrder::BigEndian, signed: false },
        )];
        let tpl = TemplateCompiler::compile("Device", HeaderBinding::Absent, fields).unwrap();
        assert_eq!(tpl.fields().len(), 1);
        assert!(tpl.post_process().is_empty());
    }

    #[test]
    fn rejects_object_alternative_depending_on_non_prefix_field() {
        let choices = ObjectChoices {
            prefix_size: 8,
            prefix_byte_order: ByteOrder::BigEndian,
            alternatives: vec![ObjectAlternative {
                condition: "otherField == 1".to_string(),
                type_name: "Type1".to_string(),
                prefix_value: Some(1),
            }],
        };
        let fields = vec![FieldDescriptor::new(
            "payload",
            Descriptor::Object { choices, default_type: None },
        )];
        let result = TemplateCompiler::compile("Msg", HeaderBinding::Absent, fields);
        assert!(result.is_err());
    }

    #[test]
    fn evaluate_and_post_process_are_separated_into_trailing_list() {
        let fields = vec![
            FieldDescriptor::new(
                "a",
                Descriptor::Integer { size: "8".to_string(), byte_order: ByteOrder::BigEndian, signed: false },
            ),
            FieldDescriptor::new("derived", Descriptor::Evaluate { value: "1 + 1".to_string() }),
        ];
        let tpl = TemplateCompiler::compile("Msg", HeaderBinding::Absent, fields).unwrap();
        assert_eq!(tpl.fields().len(), 1);
        assert_eq!(tpl.post_process().len(), 1);
    }

    #[test]
    fn checksum_must_be_last() {
        let fields = vec![
            FieldDescriptor::new(
                "crc",
                Descriptor::Checksum {
                    algorithm: "crc16".to_string(),
                    skip_start: 0,
                    skip_end: 0,
                    byte_order: ByteOrder::BigEndian,
                },
            ),
            FieldDescriptor::new(
                "tail",
                Descriptor::Integer { size: "8".to_string(), byte_order: ByteOrder::BigEndian, signed: false },
            ),
        ];
        assert!(TemplateCompiler::compile("Msg", HeaderBinding::Absent, fields).is_err());
    }
}
