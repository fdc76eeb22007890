use scraper::{ElementRef, Node, Selector};

use crate::dom::{self, Edit};
use crate::profile::CleanupProfile;

/// Compiled boilerplate-removal rules.
///
/// Two passes: sub-trees matching any selector are dropped, then small
/// containers whose own text mentions a boilerplate phrase are dropped.
/// Nothing inside `pre`/`code` is touched and the content root always survives.
#[derive(Debug)]
pub struct CleanupRules {
    selectors: Vec<Selector>,
    phrases: Vec<String>,
    max_container_chars: usize,
}

impl CleanupRules {
    pub fn compile(profile: &CleanupProfile) -> anyhow::Result<Self> {
        Ok(Self {
            selectors: dom::parse_selectors(&profile.selectors)?,
            phrases: profile
                .phrases
                .iter()
                .filter(|p| !p.trim().is_empty())
                .cloned()
                .collect(),
            max_container_chars: profile.max_phrase_container_chars,
        })
    }

    /// Elements under `root` that the rules remove.
    pub fn removals<'a>(&self, root: ElementRef<'a>) -> Vec<ElementRef<'a>> {
        let mut removed: Vec<ElementRef<'a>> = Vec::new();

        for selector in &self.selectors {
            for el in root.select(selector) {
                if el == root || is_in_code(el, root) || removed.contains(&el) {
                    continue;
                }
                removed.push(el);
            }
        }

        if self.phrases.is_empty() {
            return removed;
        }

        for node in root.descendants() {
            let Node::Text(text) = node.value() else {
                continue;
            };
            if !self.phrases.iter().any(|phrase| text.contains(phrase.as_str())) {
                continue;
            }
            let Some(parent) = node.parent().and_then(ElementRef::wrap) else {
                continue;
            };
            if parent == root || is_in_code(parent, root) || removed.contains(&parent) {
                continue;
            }
            if dom::dense_text_len(parent) < self.max_container_chars {
                removed.push(parent);
            }
        }

        removed
    }

    /// Serializes `root` with every removal applied.
    pub fn apply(&self, root: ElementRef<'_>) -> String {
        let removed = self.removals(root);
        if !removed.is_empty() {
            tracing::debug!(removed = removed.len(), "cleanup: dropped boilerplate nodes");
        }
        dom::render_element(root, |el| {
            if removed.contains(&el) {
                Edit::Remove
            } else {
                Edit::Keep
            }
        })
    }
}

fn is_in_code(el: ElementRef<'_>, root: ElementRef<'_>) -> bool {
    let mut current = Some(el);
    while let Some(candidate) = current {
        if candidate == root {
            return false;
        }
        if matches!(candidate.value().name(), "pre" | "code") {
            return true;
        }
        current = candidate.parent().and_then(ElementRef::wrap);
    }
    false
}
