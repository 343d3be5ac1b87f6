use std::fmt;

use regex::{Captures, Regex};
use serde_json::Value;

use crate::models::Data;

/// One attribute of a plugin block.
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    pub name: String,
    pub default: Option<Value>,
}

impl Field {
    pub fn new(name: impl Into<String>) -> Self {
        Field {
            name: name.into(),
            default: None,
        }
    }

    pub fn with_default(mut self, default: Value) -> Self {
        self.default = Some(default);
        self
    }
}

type ToBlock = Box<dyn Fn(&Data) -> String + Send + Sync>;
type FromBlock = Box<dyn Fn(&Captures<'_>) -> Data + Send + Sync>;

/// A plugin descriptor: one shortcode block kind contributed by the host.
///
/// `to_block` renders the block's data to its single-line markdown form.
/// When a `pattern` is registered, lines matching it are read back into a
/// shortcode block via `from_block`.
pub struct Plugin {
    pub id: String,
    pub label: String,
    pub fields: Vec<Field>,
    pattern: Option<Regex>,
    from_block: Option<FromBlock>,
    to_block: ToBlock,
}

impl Plugin {
    pub fn new(
        id: impl Into<String>,
        label: impl Into<String>,
        to_block: impl Fn(&Data) -> String + Send + Sync + 'static,
    ) -> Self {
        Plugin {
            id: id.into(),
            label: label.into(),
            fields: Vec::new(),
            pattern: None,
            from_block: None,
            to_block: Box::new(to_block),
        }
    }

    pub fn with_fields(mut self, fields: Vec<Field>) -> Self {
        self.fields = fields;
        self
    }

    pub fn with_pattern(
        mut self,
        pattern: Regex,
        from_block: impl Fn(&Captures<'_>) -> Data + Send + Sync + 'static,
    ) -> Self {
        self.pattern = Some(pattern);
        self.from_block = Some(Box::new(from_block));
        self
    }

    /// Render a shortcode block's data to its markdown line.
    pub fn to_block(&self, data: &Data) -> String {
        (self.to_block)(data)
    }

    /// Try to read a rendered line back into shortcode data.
    pub fn match_block(&self, text: &str) -> Option<Data> {
        let pattern = self.pattern.as_ref()?;
        let captures = pattern.captures(text.trim())?;
        match &self.from_block {
            Some(from_block) => Some(from_block(&captures)),
            None => Some(self.default_data()),
        }
    }

    /// Data populated from the fields' declared defaults.
    pub fn default_data(&self) -> Data {
        let mut data = Data::new();
        for field in &self.fields {
            if let Some(default) = &field.default {
                data.insert(field.name.clone(), default.clone());
            }
        }
        data
    }
}

impl fmt::Debug for Plugin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Plugin")
            .field("id", &self.id)
            .field("label", &self.label)
            .field("fields", &self.fields)
            .field("pattern", &self.pattern.as_ref().map(Regex::as_str))
            .finish_non_exhaustive()
    }
}

/// Ordered set of plugins supplied by the host at construction. The core
/// supports zero or more without recompilation; pattern lookups scan in
/// registration order, first match wins.
#[derive(Debug, Default)]
pub struct PluginRegistry {
    plugins: Vec<Plugin>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        PluginRegistry::default()
    }

    pub fn register(&mut self, plugin: Plugin) {
        self.plugins.push(plugin);
    }

    pub fn get(&self, id: &str) -> Option<&Plugin> {
        self.plugins.iter().find(|p| p.id == id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Plugin> {
        self.plugins.iter()
    }

    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }

    /// Recognize a rendered shortcode line, returning the owning plugin id
    /// and the recovered data.
    pub fn recognize(&self, text: &str) -> Option<(String, Data)> {
        for plugin in &self.plugins {
            if let Some(data) = plugin.match_block(text) {
                return Some((plugin.id.clone(), data));
            }
        }
        None
    }
}
