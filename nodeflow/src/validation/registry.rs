//! Capability registry of provider parameter schemas.

use crate::core::StepKind;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;

/// Primitive type a parameter must have.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamType {
    /// JSON string.
    String,
    /// Any JSON number.
    Number,
    /// JSON number without a fractional part.
    Integer,
    /// JSON boolean.
    Boolean,
    /// JSON array.
    Array,
    /// JSON object.
    Object,
}

impl ParamType {
    /// Returns true if `value` has this type.
    #[must_use]
    pub fn accepts(&self, value: &serde_json::Value) -> bool {
        match self {
            Self::String => value.is_string(),
            Self::Number => value.is_number(),
            Self::Integer => {
                value.is_i64()
                    || value.is_u64()
                    || value.as_f64().is_some_and(|f| f.fract() == 0.0)
            }
            Self::Boolean => value.is_boolean(),
            Self::Array => value.is_array(),
            Self::Object => value.is_object(),
        }
    }
}

impl fmt::Display for ParamType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::String => "string",
            Self::Number => "number",
            Self::Integer => "integer",
            Self::Boolean => "boolean",
            Self::Array => "array",
            Self::Object => "object",
        };
        write!(f, "{name}")
    }
}

/// Returns the JSON type name of a value, for messages.
#[must_use]
pub fn json_type_name(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "boolean",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}

/// Declared constraints for one parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParamSpec {
    /// Required primitive type.
    #[serde(rename = "type")]
    pub param_type: ParamType,
    /// Whether the parameter must be present.
    #[serde(default)]
    pub required: bool,
    /// Allowed values for string parameters.
    #[serde(default, rename = "enum", skip_serializing_if = "Option::is_none")]
    pub enum_values: Option<Vec<String>>,
    /// Inclusive lower bound for numbers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub minimum: Option<f64>,
    /// Inclusive upper bound for numbers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub maximum: Option<f64>,
    /// Optional description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl ParamSpec {
    /// Creates an optional parameter of the given type.
    #[must_use]
    pub fn new(param_type: ParamType) -> Self {
        Self {
            param_type,
            required: false,
            enum_values: None,
            minimum: None,
            maximum: None,
            description: None,
        }
    }

    /// Marks the parameter required.
    #[must_use]
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// Restricts a string parameter to the given values.
    #[must_use]
    pub fn with_enum<I, S>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.enum_values = Some(values.into_iter().map(Into::into).collect());
        self
    }

    /// Sets numeric bounds.
    #[must_use]
    pub fn with_range(mut self, minimum: Option<f64>, maximum: Option<f64>) -> Self {
        self.minimum = minimum;
        self.maximum = maximum;
        self
    }

    /// Sets the description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// Parameter schema of one provider or operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderSchema {
    /// Provider or operation name, matched against the step.
    pub name: String,
    /// Step kind the schema applies to; `None` applies to any kind.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<StepKind>,
    /// Optional description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Declared parameters.
    #[serde(default)]
    pub parameters: BTreeMap<String, ParamSpec>,
}

impl ProviderSchema {
    /// Creates an empty schema.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: None,
            description: None,
            parameters: BTreeMap::new(),
        }
    }

    /// Restricts the schema to one step kind.
    #[must_use]
    pub fn for_kind(mut self, kind: StepKind) -> Self {
        self.kind = Some(kind);
        self
    }

    /// Sets the description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Declares a parameter.
    #[must_use]
    pub fn with_param(mut self, name: impl Into<String>, spec: ParamSpec) -> Self {
        self.parameters.insert(name.into(), spec);
        self
    }

    /// Names of required parameters, in sorted order.
    pub fn required_params(&self) -> impl Iterator<Item = &str> {
        self.parameters
            .iter()
            .filter(|(_, spec)| spec.required)
            .map(|(name, _)| name.as_str())
    }
}

/// Read-mostly registry of provider schemas.
///
/// Schemas are keyed by name and optionally by step kind; a kind-specific
/// schema wins over a kind-agnostic one of the same name.
#[derive(Debug, Default)]
pub struct CapabilityRegistry {
    schemas: RwLock<HashMap<(String, Option<StepKind>), ProviderSchema>>,
}

impl CapabilityRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a registry from schemas.
    #[must_use]
    pub fn from_schemas(schemas: impl IntoIterator<Item = ProviderSchema>) -> Self {
        let registry = Self::new();
        for schema in schemas {
            registry.register(schema);
        }
        registry
    }

    /// Parses a JSON array of schemas.
    ///
    /// # Errors
    ///
    /// Returns the deserialization error for malformed documents.
    pub fn from_json_str(json: &str) -> Result<Self, serde_json::Error> {
        let schemas: Vec<ProviderSchema> = serde_json::from_str(json)?;
        Ok(Self::from_schemas(schemas))
    }

    /// Registers a schema, replacing any previous one with the same name and
    /// kind.
    pub fn register(&self, schema: ProviderSchema) {
        let key = (schema.name.clone(), schema.kind);
        self.schemas.write().insert(key, schema);
    }

    /// Looks up the schema for a provider used by a step of `kind`.
    #[must_use]
    pub fn get(&self, name: &str, kind: StepKind) -> Option<ProviderSchema> {
        let schemas = self.schemas.read();
        schemas
            .get(&(name.to_string(), Some(kind)))
            .or_else(|| schemas.get(&(name.to_string(), None)))
            .cloned()
    }

    /// Returns the number of registered schemas.
    #[must_use]
    pub fn len(&self) -> usize {
        self.schemas.read().len()
    }

    /// Returns true if no schema is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.schemas.read().is_empty()
    }

    /// Removes all schemas.
    pub fn clear(&self) {
        self.schemas.write().clear();
    }
}
