//! Generic text rendering of decoded values.
//!
//! Walks a [`Describe`] value field by field. Containers print their length
//! and a bounded number of items; composite values nest one level deeper.
//! Values that report a [`NodeId`] are printed at most once per render.

use std::collections::HashSet;
use std::fmt::Write;

use acpcap_protocol::{Describe, Field, FieldValue, Namespace, NodeId};

/// Default number of container items printed before the summary line.
pub const DEFAULT_MAX_ITEMS: usize = 5;

const INDENT: &str = "  ";

/// Field-by-field renderer.
#[derive(Debug, Clone, Copy)]
pub struct Inspector {
    max_items: usize,
}

impl Default for Inspector {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ITEMS)
    }
}

impl Inspector {
    pub fn new(max_items: usize) -> Self {
        Self { max_items }
    }

    pub fn max_items(&self) -> usize {
        self.max_items
    }

    /// Render the fields of `value`, starting at `depth` levels of indentation.
    pub fn render(&self, value: &dyn Describe, depth: usize) -> String {
        let mut walk = Walk {
            max_items: self.max_items,
            visited: HashSet::new(),
            out: String::new(),
        };
        walk.object(value, depth);
        walk.out
    }
}

struct Walk {
    max_items: usize,
    visited: HashSet<NodeId>,
    out: String,
}

impl Walk {
    fn line(&mut self, args: std::fmt::Arguments<'_>) {
        // Writing into a String cannot fail.
        let _ = self.out.write_fmt(args);
        self.out.push('\n');
    }

    fn object(&mut self, value: &dyn Describe, depth: usize) {
        if let Some(id) = value.node_id() {
            if !self.visited.insert(id) {
                return;
            }
        }
        if value.namespace() != Namespace::Protocol {
            return;
        }

        let indent = INDENT.repeat(depth);
        for Field { name, value } in value.fields() {
            match value {
                Ok(value) => self.field(&indent, name, &value, depth),
                Err(e) => self.line(format_args!("{}{}: <Error: {}>", indent, name, e)),
            }
        }
    }

    fn field(&mut self, indent: &str, name: &str, value: &FieldValue<'_>, depth: usize) {
        match value {
            FieldValue::Null => self.line(format_args!("{}{}: null", indent, name)),
            FieldValue::Enum { name: symbol, value } => {
                self.line(format_args!("{}{}: {} (0x{:X})", indent, name, symbol, value))
            }
            FieldValue::Scalar(scalar) => self.line(format_args!("{}{}: {}", indent, name, scalar)),
            FieldValue::Sequence(items) => {
                self.line(format_args!("{}{}: [{} items]", indent, name, items.len()));
                self.items(indent, &sequence_entries(items), depth);
            }
            FieldValue::Map(entries) => {
                self.line(format_args!("{}{}: [{} items]", indent, name, entries.len()));
                self.items(indent, &map_entries(entries), depth);
            }
            FieldValue::Composite(inner) => {
                self.line(format_args!("{}{}:", indent, name));
                self.object(*inner, depth + 1);
            }
        }
    }

    fn items(&mut self, indent: &str, entries: &[Entry<'_, '_>], depth: usize) {
        for (i, (key, item)) in entries.iter().take(self.max_items).enumerate() {
            let label = match key {
                Some(key) => format!("[{}]: {} =>", i, inline(key)),
                None => format!("[{}]:", i),
            };
            match item {
                FieldValue::Composite(inner) => {
                    self.line(format_args!("{}{}{}", indent, INDENT, label));
                    self.object(*inner, depth + 2);
                }
                FieldValue::Sequence(nested) => {
                    self.line(format_args!("{}{}{} [{} items]", indent, INDENT, label, nested.len()));
                    let nested_indent = INDENT.repeat(depth + 1);
                    self.items(&nested_indent, &sequence_entries(nested), depth + 1);
                }
                FieldValue::Map(nested) => {
                    self.line(format_args!("{}{}{} [{} items]", indent, INDENT, label, nested.len()));
                    let nested_indent = INDENT.repeat(depth + 1);
                    self.items(&nested_indent, &map_entries(nested), depth + 1);
                }
                other => self.line(format_args!("{}{}{} {}", indent, INDENT, label, inline(other))),
            }
        }
        if entries.len() > self.max_items {
            self.line(format_args!(
                "{}{}... and {} more items",
                indent,
                INDENT,
                entries.len() - self.max_items
            ));
        }
    }
}

/// Container item, with its key for maps.
type Entry<'v, 'a> = (Option<&'v FieldValue<'a>>, &'v FieldValue<'a>);

fn sequence_entries<'v, 'a>(items: &'v [FieldValue<'a>]) -> Vec<Entry<'v, 'a>> {
    items.iter().map(|item| (None, item)).collect()
}

fn map_entries<'v, 'a>(entries: &'v [(FieldValue<'a>, FieldValue<'a>)]) -> Vec<Entry<'v, 'a>> {
    entries.iter().map(|(key, value)| (Some(key), value)).collect()
}

/// Single-line form of a leaf value.
fn inline(value: &FieldValue<'_>) -> String {
    match value {
        FieldValue::Null => "null".to_string(),
        FieldValue::Enum { name, value } => format!("{} (0x{:X})", name, value),
        FieldValue::Scalar(scalar) => scalar.to_string(),
        FieldValue::Sequence(items) => format!("[{} items]", items.len()),
        FieldValue::Map(entries) => format!("[{} items]", entries.len()),
        FieldValue::Composite(_) => "{..}".to_string(),
    }
}
