//! Converter and validator extension points (spec §4.3 step 3, §6).
//!
//! The host record is plain Rust, not reflectable, so the subtype checks
//! spec §4.3 step 3 describes ("assert `converter.input_type <:
//! descriptor.raw_type`") happen structurally at the `Value` level instead
//! of via generics: a converter either accepts the `Value` shape it is
//! given or returns a [`crate::error::Error::ConverterError`]. The
//! compiler still resolves that a `converter_choices`/`default_converter`
//! id is well-formed (non-empty); the deeper type check is deferred to the
//! first decode/encode that exercises it, since a DSL already chose the
//! correct wire shape by construction.

use crate::error::Result;
use crate::value::Value;

pub trait Converter: Send + Sync {
    fn decode(&self, raw: &Value) -> Result<Value>;
    fn encode(&self, field: &Value) -> Result<Value>;
}

pub trait Validator: Send + Sync {
    fn check(&self, value: &Value) -> Result<()>;
}

/// A validator built from a simple predicate closure, for the common case
/// of "reject unless this holds".
pub struct PredicateValidator<F> {
    pub predicate: F,
    pub message: String,
}

impl<F> Validator for PredicateValidator<F>
where
    F: Fn(&Value) -> bool + Send + Sync,
{
    fn check(&self, value: &Value) -> Result<()> {
        if (self.predicate)(value) {
            Ok(())
        } else {
            Err(crate::error::Error::validation("<validator>", self.message.clone()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn predicate_validator_rejects_failing_values() {
        let v = PredicateValidator {
            predicate: |val: &Value| val.as_i128().is_some_and(|n| n >= 0),
            message: "must be non-negative".to_string(),
        };
        assert!(v.check(&Value::Integer(-1)).is_err());
        assert!(v.check(&Value::Integer(1)).is_ok());
    }
}
