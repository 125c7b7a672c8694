//! Protocol-version-bounded configuration view (spec §4.8, C8).
//!
//! `ConfigurationView` is a second consumer of the same compiled template
//! representation `ParseEngine` uses: given a [`Version`] it filters a
//! template's `ConfigurationField` entries down to the ones in scope, and
//! validates/projects key-value maps against that filtered view.

use std::collections::BTreeMap;
use std::fmt;

use regex::Regex;

use crate::descriptor::ConfigurationFieldDescriptor;
use crate::error::{Error, Result};
use crate::value::Value;

/// A semver triple plus an optional pre-release identifier (spec §4.8).
///
/// Precedence follows semver for the numeric triple; pre-release
/// comparison is a plain lexicographic fallback rather than the full
/// dot-separated-identifier algorithm (documented open-question decision,
/// DESIGN.md) since configuration bounds in practice only compare whole
/// release trains against each other.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Version {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
    pub pre_release: Option<String>,
}

impl Version {
    pub fn new(major: u32, minor: u32, patch: u32) -> Self {
        Self { major, minor, patch, pre_release: None }
    }

    pub fn with_pre_release(mut self, pre: impl Into<String>) -> Self {
        self.pre_release = Some(pre.into());
        self
    }

    pub fn parse(s: &str) -> Result<Self> {
        let (core, pre) = match s.split_once('-') {
            Some((core, pre)) => (core, Some(pre.to_string())),
            None => (s, None),
        };
        let mut parts = core.split('.');
        let mut next = || -> Result<u32> {
            parts
                .next()
                .and_then(|p| p.parse().ok())
                .ok_or_else(|| Error::template("version", format!("invalid version string '{s}'")))
        };
        let major = next()?;
        let minor = next()?;
        let patch = next()?;
        Ok(Self { major, minor, patch, pre_release: pre })
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)?;
        if let Some(pre) = &self.pre_release {
            write!(f, "-{pre}")?;
        }
        Ok(())
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        (self.major, self.minor, self.patch)
            .cmp(&(other.major, other.minor, other.patch))
            .then_with(|| match (&self.pre_release, &other.pre_release) {
                (None, None) => std::cmp::Ordering::Equal,
                (None, Some(_)) => std::cmp::Ordering::Greater,
                (Some(_), None) => std::cmp::Ordering::Less,
                (Some(a), Some(b)) => a.cmp(b),
            })
    }
}

/// One filtered configuration field, bound to its owning slot name.
#[derive(Debug, Clone)]
struct ConfigEntry {
    name: String,
    descriptor: ConfigurationFieldDescriptor,
}

/// A protocol-version-filtered projection of a template's configuration
/// fields.
#[derive(Debug, Clone)]
pub struct ConfigurationView {
    entries: Vec<ConfigEntry>,
}

impl ConfigurationView {
    /// Filters `fields` to those whose `[min_protocol, max_protocol]`
    /// contains `version` (open bounds match everything on that side).
    pub fn build(fields: Vec<(String, ConfigurationFieldDescriptor)>, version: &Version) -> Self {
        let entries = fields
            .into_iter()
            .filter(|(_, d)| {
                let above_min = d.min_protocol.as_ref().map_or(true, |min| version >= min);
                let below_max = d.max_protocol.as_ref().map_or(true, |max| version <= max);
                above_min && below_max
            })
            .map(|(name, descriptor)| ConfigEntry { name, descriptor })
            .collect();
        Self { entries }
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| e.name.as_str())
    }

    /// Exports descriptor metadata per remaining field, empty values
    /// omitted (spec §4.8).
    pub fn describe(&self) -> BTreeMap<String, Value> {
        let mut out = BTreeMap::new();
        for entry in &self.entries {
            let mut meta = BTreeMap::new();
            let d = &entry.descriptor;
            insert_if_non_empty(&mut meta, "shortDescription", &d.short_description);
            insert_if_non_empty(&mut meta, "longDescription", &d.long_description);
            insert_if_non_empty(&mut meta, "unitOfMeasure", &d.unit_of_measure);
            if let Some(min) = d.min_value {
                meta.insert("minValue".to_string(), Value::Float(min));
            }
            if let Some(max) = d.max_value {
                meta.insert("maxValue".to_string(), Value::Float(max));
            }
            if let Some(pattern) = &d.pattern {
                if !pattern.is_empty() {
                    meta.insert("pattern".to_string(), Value::Text(pattern.clone()));
                }
            }
            if !d.enumeration.is_empty() {
                meta.insert(
                    "enumeration".to_string(),
                    Value::Array(d.enumeration.iter().map(|s| Value::Text(s.clone())).collect()),
                );
            }
            if let Some(default) = &d.default_value {
                meta.insert("defaultValue".to_string(), Value::Text(default.clone()));
            }
            out.insert(entry.name.clone(), Value::Map(meta));
        }
        out
    }

    /// Validates an input key→value map against the filtered view,
    /// returning a map of `field name -> Value` ready for encoding.
    /// Fails with [`Error::EncodeError`] naming the offending key.
    pub fn validate_input(&self, input: &BTreeMap<String, String>) -> Result<BTreeMap<String, Value>> {
        let mut out = BTreeMap::new();
        for entry in &self.entries {
            let raw = match input.get(&entry.name) {
                Some(v) => v.clone(),
                None => match &entry.descriptor.default_value {
                    Some(default) => default.clone(),
                    None => continue,
                },
            };
            self.validate_one(entry, &raw)?;
            out.insert(entry.name.clone(), Value::Text(raw));
        }
        for key in input.keys() {
            if !self.entries.iter().any(|e| &e.name == key) {
                return Err(Error::EncodeError {
                    key: key.clone(),
                    reason: "unknown or out-of-protocol-range configuration key".to_string(),
                });
            }
        }
        Ok(out)
    }

    fn validate_one(&self, entry: &ConfigEntry, raw: &str) -> Result<()> {
        validate_configuration_value(&entry.descriptor, raw).map_err(|reason| Error::EncodeError {
            key: entry.name.clone(),
            reason,
        })
    }
}

/// Standalone validity check reused by both [`ConfigurationView`] (incoming
/// key/value maps) and `TemplateCompiler` (a descriptor's own
/// `default_value`, spec §4.3 step 5).
pub(crate) fn validate_configuration_value(
    desc: &ConfigurationFieldDescriptor,
    raw: &str,
) -> std::result::Result<(), String> {
    if let Some(pattern) = &desc.pattern {
        if !pattern.is_empty() {
            let re = Regex::new(pattern).map_err(|e| format!("invalid pattern '{pattern}': {e}"))?;
            if !re.is_match(raw) {
                return Err(format!("'{raw}' does not match pattern '{pattern}'"));
            }
        }
    }
    if desc.min_value.is_some() || desc.max_value.is_some() {
        let n: f64 = raw.parse().map_err(|_| format!("'{raw}' is not numeric"))?;
        if let Some(min) = desc.min_value {
            if n < min {
                return Err(format!("{n} is below minimum {min}"));
            }
        }
        if let Some(max) = desc.max_value {
            if n > max {
                return Err(format!("{n} is above maximum {max}"));
            }
        }
    }
    if !desc.enumeration.is_empty() && !desc.enumeration.iter().any(|e| e == raw) {
        return Err(format!("'{raw}' is not one of {:?}", desc.enumeration));
    }
    Ok(())
}

fn insert_if_non_empty(map: &mut BTreeMap<String, Value>, key: &str, value: &str) {
    if !value.is_empty() {
        map.insert(key.to_string(), Value::Text(value.to_string()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn field(name: &str) -> (String, ConfigurationFieldDescriptor) {
        (name.to_string(), ConfigurationFieldDescriptor::default())
    }

    #[test]
    fn version_ordering_prefers_release_over_prerelease() {
        let release = Version::new(1, 2, 0);
        let prerelease = Version::new(1, 2, 0).with_pre_release("rc1");
        assert!(release > prerelease);
    }

    #[test]
    fn filters_fields_outside_protocol_bounds() {
        let mut old_only = ConfigurationFieldDescriptor::default();
        old_only.max_protocol = Some(Version::new(1, 0, 0));
        let fields = vec![field("a"), ("b".to_string(), old_only)];
        let view = ConfigurationView::build(fields, &Version::new(2, 0, 0));
        let names: Vec<_> = view.field_names().collect();
        assert_eq!(names, vec!["a"]);
    }

    #[test]
    fn pattern_violation_is_rejected() {
        let mut desc = ConfigurationFieldDescriptor::default();
        desc.pattern = Some(r"^\d{3}$".to_string());
        let view = ConfigurationView::build(vec![("code".to_string(), desc)], &Version::new(1, 0, 0));
        let mut input = BTreeMap::new();
        input.insert("code".to_string(), "abcd".to_string());
        assert!(view.validate_input(&input).is_err());
    }

    #[test]
    fn enumeration_accepts_listed_values_only() {
        let mut desc = ConfigurationFieldDescriptor::default();
        desc.enumeration = vec!["A".to_string(), "B".to_string()];
        let view = ConfigurationView::build(vec![("mode".to_string(), desc)], &Version::new(1, 0, 0));
        let mut input = BTreeMap::new();
        input.insert("mode".to_string(), "C".to_string());
        assert!(view.validate_input(&input).is_err());
    }
}
