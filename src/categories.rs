use std::cmp::Ordering;

use crate::formats::{Category, SectionSummary};
use crate::profile::CategoryGroup;

/// Main/sub category from breadcrumb items (home, main, ..., sub).
pub fn from_breadcrumb(items: &[String]) -> Option<String> {
    let items: Vec<&str> = items
        .iter()
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .collect();
    if items.len() < 3 {
        return None;
    }
    Some(format!("{}/{}", items[1], items[items.len() - 1]))
}

/// Category path for a section title from the static mapping table.
///
/// Exact sub-category matches win, then the first fuzzy match in table order,
/// then `<catch_all>/<title>`.
pub fn from_table(section_title: &str, groups: &[CategoryGroup], catch_all: &str) -> String {
    let title = section_title.trim();
    if title.is_empty() {
        return format!("{catch_all}/Unknown");
    }

    for group in groups {
        if group.subcategories.iter().any(|sub| sub == title) {
            return format!("{}/{title}", group.name);
        }
    }

    let title_lower = title.to_lowercase();
    for group in groups {
        for sub in &group.subcategories {
            if sub.is_empty() {
                continue;
            }
            let sub_lower = sub.to_lowercase();
            let matched = sub.contains(title)
                || title.contains(sub.as_str())
                || sub_lower
                    .split_whitespace()
                    .any(|keyword| title_lower.contains(keyword))
                || title_lower
                    .split_whitespace()
                    .any(|keyword| sub_lower.contains(keyword));
            if matched {
                return format!("{}/{sub}", group.name);
            }
        }
    }

    format!("{catch_all}/{title}")
}

/// Main category of a two-level path.
pub fn main_category<'a>(category_path: &'a str, catch_all: &'a str) -> &'a str {
    let main = category_path
        .split('/')
        .next()
        .map(str::trim)
        .unwrap_or_default();
    if main.is_empty() { catch_all } else { main }
}

/// Sub-category of a two-level path (everything after the first `/`).
pub fn sub_category(category_path: &str) -> &str {
    category_path
        .split_once('/')
        .map(|(_, sub)| sub.trim())
        .unwrap_or_default()
}

/// Compares main category names by the configured navigation order;
/// unlisted names sort after listed ones, alphabetically.
pub fn compare_by_order(a: &str, b: &str, order: &[String]) -> Ordering {
    let rank = |name: &str| order.iter().position(|o| o == name);
    match (rank(a), rank(b)) {
        (Some(x), Some(y)) => x.cmp(&y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => a.cmp(b),
    }
}

/// Groups section summaries into ordered categories.
pub fn group_sections(
    sections: &[SectionSummary],
    order: &[String],
    catch_all: &str,
) -> Vec<Category> {
    let mut categories: Vec<Category> = Vec::new();
    for section in sections {
        let name = main_category(&section.category_path, catch_all);
        let idx = match categories.iter().position(|c| c.name == name) {
            Some(idx) => idx,
            None => {
                categories.push(Category::new(name));
                categories.len() - 1
            }
        };
        categories[idx].sections.push(section.clone());
    }
    categories.sort_by(|a, b| compare_by_order(&a.name, &b.name, order));
    categories
}
