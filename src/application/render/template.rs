//! `#name#` placeholder substitution over resource templates.

use std::{collections::BTreeMap, sync::Arc};

use crate::infra::resources::ResourceStore;

use super::{filters::FilterChain, types::RenderError};

/// Named values substituted into a template. Later inserts replace earlier ones.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VariableMap {
    values: BTreeMap<String, String>,
}

impl VariableMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.values.insert(name.into(), value.into());
        self
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.values.get(name).map(String::as_str)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl<K, V> FromIterator<(K, V)> for VariableMap
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut map = Self::new();
        for (name, value) in iter {
            map.insert(name, value);
        }
        map
    }
}

/// Loads templates from the resource store, substitutes variables, then pipes
/// the result through a filter chain.
#[derive(Debug, Clone)]
pub struct TemplateRenderer {
    resources: Arc<ResourceStore>,
}

impl TemplateRenderer {
    pub fn new(resources: Arc<ResourceStore>) -> Self {
        Self { resources }
    }

    pub fn resources(&self) -> &Arc<ResourceStore> {
        &self.resources
    }

    pub fn render(
        &self,
        template_path: &str,
        variables: &VariableMap,
        filters: &FilterChain,
    ) -> Result<String, RenderError> {
        let template = self.resources.get(template_path)?;
        let substituted = substitute(&template, template_path, variables)?;
        filters.apply(substituted)
    }
}

/// Replace each `#name#` in `template` with its value in a single
/// left-to-right pass. Substituted values are never rescanned.
pub fn substitute(
    template: &str,
    template_name: &str,
    variables: &VariableMap,
) -> Result<String, RenderError> {
    let bytes = template.as_bytes();
    let mut output = String::with_capacity(template.len());
    let mut literal_start = 0;
    let mut cursor = 0;

    while let Some(offset) = template[cursor..].find('#') {
        let open = cursor + offset;
        let name_start = open + 1;
        let name_len = bytes[name_start..]
            .iter()
            .take_while(|byte| byte.is_ascii_alphanumeric() || **byte == b'_')
            .count();
        let close = name_start + name_len;

        if name_len == 0 || bytes.get(close) != Some(&b'#') {
            cursor = name_start;
            continue;
        }

        let name = &template[name_start..close];
        let value = variables
            .get(name)
            .ok_or_else(|| RenderError::MissingVariable {
                template: template_name.to_string(),
                name: name.to_string(),
            })?;

        output.push_str(&template[literal_start..open]);
        output.push_str(value);
        cursor = close + 1;
        literal_start = cursor;
    }

    output.push_str(&template[literal_start..]);
    Ok(output)
}
