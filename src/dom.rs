//! A small rewriting serializer on top of `scraper`.
//!
//! `scraper` trees are read-only, so every content transformation in this
//! crate is expressed as a walk that decides, per element, what to emit.

use scraper::{ElementRef, Html, Node, Selector};

/// What to emit for one element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Edit {
    /// Emit the element unchanged and keep walking its children.
    Keep,
    /// Emit nothing for the element or its subtree.
    Remove,
    /// Emit the children without the element's own tags.
    Unwrap,
    /// Emit the given markup instead of the subtree.
    Replace(String),
    /// Emit the element with these attributes and keep walking its children.
    Rewrite(Vec<(String, String)>),
    /// Emit the children inside a different tag with these attributes.
    Retag(String, Vec<(String, String)>),
}

const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "source", "track",
    "wbr",
];

const RAW_TEXT_ELEMENTS: &[&str] = &["script", "style"];

pub fn parse_selector(selector: &str) -> anyhow::Result<Selector> {
    Selector::parse(selector).map_err(|err| anyhow::anyhow!("parse selector {selector:?}: {err:?}"))
}

pub fn parse_selectors(selectors: &[String]) -> anyhow::Result<Vec<Selector>> {
    selectors.iter().map(|s| parse_selector(s)).collect()
}

/// Serializes the top-level nodes of a fragment parsed with `Html::parse_fragment`.
pub fn render_fragment<'a, F>(fragment: &'a Html, mut edit: F) -> String
where
    F: FnMut(ElementRef<'a>) -> Edit,
{
    let mut out = String::new();
    render_children(fragment.root_element(), &mut edit, &mut out);
    out
}

/// Serializes `el` itself (subject to `edit`) and its subtree.
pub fn render_element<'a, F>(el: ElementRef<'a>, mut edit: F) -> String
where
    F: FnMut(ElementRef<'a>) -> Edit,
{
    let mut out = String::new();
    render_node(el, &mut edit, &mut out);
    out
}

fn render_node<'a, F>(el: ElementRef<'a>, edit: &mut F, out: &mut String)
where
    F: FnMut(ElementRef<'a>) -> Edit,
{
    match edit(el) {
        Edit::Remove => {}
        Edit::Replace(markup) => out.push_str(&markup),
        Edit::Unwrap => render_children(el, edit, out),
        Edit::Keep => {
            let attrs = el
                .value()
                .attrs()
                .map(|(name, value)| (name.to_owned(), value.to_owned()))
                .collect::<Vec<_>>();
            write_element(el, el.value().name(), &attrs, edit, out);
        }
        Edit::Rewrite(attrs) => write_element(el, el.value().name(), &attrs, edit, out),
        Edit::Retag(name, attrs) => write_element(el, &name, &attrs, edit, out),
    }
}

fn write_element<'a, F>(
    el: ElementRef<'a>,
    name: &str,
    attrs: &[(String, String)],
    edit: &mut F,
    out: &mut String,
) where
    F: FnMut(ElementRef<'a>) -> Edit,
{
    out.push_str(&start_tag(name, attrs));

    if VOID_ELEMENTS.contains(&name) {
        return;
    }

    if RAW_TEXT_ELEMENTS.contains(&name) {
        for text in el.text() {
            out.push_str(text);
        }
    } else {
        render_children(el, edit, out);
    }

    out.push_str("</");
    out.push_str(name);
    out.push('>');
}

fn render_children<'a, F>(el: ElementRef<'a>, edit: &mut F, out: &mut String)
where
    F: FnMut(ElementRef<'a>) -> Edit,
{
    for child in el.children() {
        match child.value() {
            Node::Text(text) => out.push_str(&escape_text(text)),
            Node::Element(_) => {
                if let Some(child_el) = ElementRef::wrap(child) {
                    render_node(child_el, edit, out);
                }
            }
            _ => {}
        }
    }
}

pub fn start_tag(name: &str, attrs: &[(String, String)]) -> String {
    let mut out = String::with_capacity(name.len() + 2);
    out.push('<');
    out.push_str(name);
    for (attr, value) in attrs {
        out.push(' ');
        out.push_str(attr);
        out.push_str("=\"");
        out.push_str(&escape_attr(value));
        out.push('"');
    }
    out.push('>');
    out
}

pub fn escape_text(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for ch in input.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(ch),
        }
    }
    out
}

pub fn escape_attr(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for ch in input.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '"' => out.push_str("&quot;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(ch),
        }
    }
    out
}

/// Text content with runs of whitespace collapsed to single spaces.
pub fn collapsed_text(el: ElementRef<'_>) -> String {
    el.text()
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Number of non-whitespace characters in the element's text.
pub fn dense_text_len(el: ElementRef<'_>) -> usize {
    el.text()
        .flat_map(str::chars)
        .filter(|ch| !ch.is_whitespace())
        .count()
}

/// Attribute list of `el` with `overrides` applied and `drop` removed.
pub fn attrs_with(
    el: ElementRef<'_>,
    overrides: &[(&str, &str)],
    drop: &[&str],
) -> Vec<(String, String)> {
    let mut attrs = el
        .value()
        .attrs()
        .filter(|(name, _)| !drop.contains(name))
        .filter(|(name, _)| !overrides.iter().any(|(o, _)| o == name))
        .map(|(name, value)| (name.to_owned(), value.to_owned()))
        .collect::<Vec<_>>();
    for (name, value) in overrides {
        attrs.push(((*name).to_owned(), (*value).to_owned()));
    }
    attrs
}
