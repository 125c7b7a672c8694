//! Header-prefix trie mapping leading bytes to a compiled template (spec
//! §4.6, C6).

use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::template::Template;

#[derive(Default)]
struct TrieNode {
    children: HashMap<u8, Box<TrieNode>>,
    template: Option<Arc<Template>>,
}

/// Templates indexed by the byte sequences in `header.start_markers`.
///
/// Decoding scans the trie byte-by-byte; the longest matching prefix wins.
/// Registration enforces spec invariant I5: no registered `start_markers`
/// entry may be a prefix of another (ties are therefore structurally
/// impossible).
#[derive(Default)]
pub struct TemplateRegistry {
    root: TrieNode,
    all_markers: Vec<Vec<u8>>,
    by_name: HashMap<String, Arc<Template>>,
}

impl TemplateRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, template: Template) -> Result<()> {
        let template = Arc::new(template);
        let markers = template.header().start_markers().to_vec();
        for marker in &markers {
            self.check_disjoint(marker, &template)?;
        }
        for marker in &markers {
            self.insert(marker, Arc::clone(&template));
            self.all_markers.push(marker.clone());
        }
        self.by_name.insert(template.class_handle().clone(), Arc::clone(&template));
        Ok(())
    }

    /// Looks up a registered template by its class handle rather than by
    /// wire bytes — used to encode a message whose type is already known.
    pub fn get(&self, class_handle: &str) -> Option<&Template> {
        self.by_name.get(class_handle).map(Arc::as_ref)
    }

    fn check_disjoint(&self, marker: &[u8], template: &Template) -> Result<()> {
        for existing in &self.all_markers {
            let is_prefix = existing.len() <= marker.len() && marker.starts_with(existing.as_slice())
                || marker.len() <= existing.len() && existing.starts_with(marker);
            if is_prefix {
                return Err(Error::template(
                    template.class_handle(),
                    format!(
                        "start marker {marker:02x?} is not disjoint from an already-registered marker {existing:02x?}"
                    ),
                ));
            }
        }
        Ok(())
    }

    fn insert(&mut self, marker: &[u8], template: Arc<Template>) {
        let mut node = &mut self.root;
        for &byte in marker {
            node = node.children.entry(byte).or_default();
        }
        node.template = Some(template);
    }

    /// Returns the template registered under the longest prefix of `bytes`,
    /// or `None` if nothing matches (spec: engine then fails with
    /// `NoMatchingTemplate`).
    pub fn match_longest(&self, bytes: &[u8]) -> Option<Arc<Template>> {
        let mut node = &self.root;
        let mut best = node.template.clone();
        for &byte in bytes {
            match node.children.get(&byte) {
                Some(next) => {
                    node = next;
                    if node.template.is_some() {
                        best = node.template.clone();
                    }
                }
                None => break,
            }
        }
        best
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::HeaderBinding;
    use crate::bits::Charset;
    use crate::template::TemplateCompiler;

    fn template_with_marker(name: &str, marker: &[u8]) -> Template {
        TemplateCompiler::compile(
            name,
            HeaderBinding::Bound {
                start_markers: vec![marker.to_vec()],
                end_marker: None,
                charset: Charset::Ascii,
            },
            vec![],
        )
        .unwrap()
    }

    #[test]
    fn rejects_overlapping_headers() {
        let mut reg = TemplateRegistry::new();
        reg.register(template_with_marker("A", b"AB")).unwrap();
        let err = reg.register(template_with_marker("B", b"ABC"));
        assert!(err.is_err());
    }

    #[test]
    fn longest_prefix_wins() {
        let mut reg = TemplateRegistry::new();
        reg.register(template_with_marker("Short", b"AB")).unwrap();
        reg.register(template_with_marker("Long", b"CD1")).unwrap();
        let matched = reg.match_longest(b"CD1extra").unwrap();
        assert_eq!(matched.class_handle(), "Long");
    }

    #[test]
    fn no_match_returns_none() {
        let mut reg = TemplateRegistry::new();
        reg.register(template_with_marker("A", b"XY")).unwrap();
        assert!(reg.match_longest(b"ZZ").is_none());
    }
}
