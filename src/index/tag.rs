//! Exact-match tag index. Tag values are atomic tokens, never tokenized.

use roaring::RoaringBitmap;
use std::collections::HashMap;

/// Normalize a tag for storage or lookup.
pub fn normalize_tag(tag: &str, case_sensitive: bool) -> String {
    let trimmed = tag.trim();
    if case_sensitive {
        trimmed.to_string()
    } else {
        trimmed.to_lowercase()
    }
}

#[derive(Debug, Default)]
pub struct TagIndex {
    case_sensitive: bool,
    tags: HashMap<String, RoaringBitmap>,
    doc_tags: HashMap<u32, Vec<String>>,
}

impl TagIndex {
    pub fn new(case_sensitive: bool) -> Self {
        Self {
            case_sensitive,
            ..Default::default()
        }
    }

    pub fn normalize(&self, tag: &str) -> String {
        normalize_tag(tag, self.case_sensitive)
    }

    /// Index already-normalized tags for a document.
    pub fn insert(&mut self, doc_id: u32, tags: &[String]) {
        self.remove(doc_id);
        let mut stored = Vec::with_capacity(tags.len());
        for tag in tags {
            if tag.is_empty() {
                continue;
            }
            if self.tags.entry(tag.clone()).or_default().insert(doc_id) {
                stored.push(tag.clone());
            }
        }
        if !stored.is_empty() {
            self.doc_tags.insert(doc_id, stored);
        }
    }

    pub fn remove(&mut self, doc_id: u32) {
        let Some(tags) = self.doc_tags.remove(&doc_id) else {
            return;
        };
        for tag in tags {
            if let Some(bitmap) = self.tags.get_mut(&tag) {
                bitmap.remove(doc_id);
                if bitmap.is_empty() {
                    self.tags.remove(&tag);
                }
            }
        }
    }

    /// Documents carrying any of `tags` (raw query values, normalized here).
    pub fn lookup_any<S: AsRef<str>>(&self, tags: &[S]) -> RoaringBitmap {
        let mut out = RoaringBitmap::new();
        for tag in tags {
            if let Some(bitmap) = self.tags.get(&self.normalize(tag.as_ref())) {
                out |= bitmap;
            }
        }
        out
    }

    pub fn distinct_tags(&self) -> usize {
        self.tags.len()
    }
}
