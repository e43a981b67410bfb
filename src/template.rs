use std::collections::{BTreeMap, HashMap};
use std::fmt;

use chrono::{DateTime, Utc};

use crate::constants::format::TEMPLATE_TIMESTAMP;
use crate::error::{EtlError, EtlResult};

/// A keyword argument for query rendering.
#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue {
    String(String),
    I64(i64),
    F64(f64),
    Bool(bool),
    Timestamp(DateTime<Utc>),
}

impl ParamValue {
    /// The string substituted into the template.
    ///
    /// Timestamps render as `YYYY-MM-DD HH:MM:SS` in UTC; everything else
    /// renders as its plain display form.
    pub fn rendered(&self) -> String {
        match self {
            ParamValue::String(s) => s.clone(),
            ParamValue::I64(n) => n.to_string(),
            ParamValue::F64(n) => n.to_string(),
            ParamValue::Bool(b) => b.to_string(),
            ParamValue::Timestamp(ts) => ts.format(TEMPLATE_TIMESTAMP).to_string(),
        }
    }
}

impl From<&str> for ParamValue {
    fn from(value: &str) -> Self {
        ParamValue::String(value.to_string())
    }
}

impl From<String> for ParamValue {
    fn from(value: String) -> Self {
        ParamValue::String(value)
    }
}

impl From<i64> for ParamValue {
    fn from(value: i64) -> Self {
        ParamValue::I64(value)
    }
}

impl From<f64> for ParamValue {
    fn from(value: f64) -> Self {
        ParamValue::F64(value)
    }
}

impl From<bool> for ParamValue {
    fn from(value: bool) -> Self {
        ParamValue::Bool(value)
    }
}

impl From<DateTime<Utc>> for ParamValue {
    fn from(value: DateTime<Utc>) -> Self {
        ParamValue::Timestamp(value)
    }
}

/// Keyword arguments for a pipeline run.
///
/// Backed by an ordered map so rendering and logging are deterministic.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryParams(BTreeMap<String, ParamValue>);

impl QueryParams {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn set(mut self, name: impl Into<String>, value: impl Into<ParamValue>) -> Self {
        self.0.insert(name.into(), value.into());
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<ParamValue>) {
        self.0.insert(name.into(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&ParamValue> {
        self.0.get(name)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &ParamValue)> {
        self.0.iter()
    }

    /// Normalizes every argument to its substitution string.
    ///
    /// Applied to all arguments before template expansion, not selectively.
    pub fn rendered_values(&self) -> BTreeMap<String, String> {
        self.0
            .iter()
            .map(|(name, value)| (name.clone(), value.rendered()))
            .collect()
    }
}

impl fmt::Display for QueryParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (name, value) in &self.0 {
            if !first {
                write!(f, ", ")?;
            }
            write!(f, "{}={}", name, value.rendered())?;
            first = false;
        }
        Ok(())
    }
}

/// Named query templates with `{{ var }}` keyword substitution.
#[derive(Debug, Clone, Default)]
pub struct TemplateStore {
    templates: HashMap<String, String>,
}

impl TemplateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a template source under a name, replacing any previous one.
    pub fn register(&mut self, name: impl Into<String>, source: impl Into<String>) {
        self.templates.insert(name.into(), source.into());
    }

    /// Renders the named template with the given keyword arguments.
    pub fn render(&self, name: &str, params: &QueryParams) -> EtlResult<String> {
        let source = self
            .templates
            .get(name)
            .ok_or_else(|| EtlError::template_not_found(name))?;
        let values = params.rendered_values();

        let mut output = String::with_capacity(source.len());
        let mut rest = source.as_str();
        while let Some(start) = rest.find("{{") {
            output.push_str(&rest[..start]);
            let after = &rest[start + 2..];
            let end = after
                .find("}}")
                .ok_or_else(|| EtlError::template_render(name, "unclosed '{{' placeholder"))?;
            let variable = after[..end].trim();
            if variable.is_empty() {
                return Err(EtlError::template_render(name, "empty placeholder"));
            }
            let value = values.get(variable).ok_or_else(|| {
                EtlError::template_render(name, format!("missing value for variable '{}'", variable))
            })?;
            output.push_str(value);
            rest = &after[end + 2..];
        }
        output.push_str(rest);
        Ok(output)
    }
}
