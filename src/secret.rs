//! # Secret Renderer
//!
//! Builds the Kubernetes `Secret` manifest that is handed to sops.
//!
//! Serialization is deterministic: field order is fixed by the struct layout
//! and values are kept in a `BTreeMap`, so identical inputs always produce
//! byte-identical YAML.

use base64::Engine;
use serde::Serialize;
use std::collections::BTreeMap;

use crate::error::{PipelineError, Result};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SecretMetadata {
    pub name: String,
    pub namespace: String,
}

/// An `Opaque` v1 Secret with exactly one populated value map
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SecretDocument {
    pub api_version: String,
    pub kind: String,
    pub metadata: SecretMetadata,
    #[serde(rename = "type")]
    pub secret_type: String,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub string_data: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub data: BTreeMap<String, String>,
}

impl SecretDocument {
    /// Build a document, placing `values` under `data` when `is_base64` is set
    /// and under `stringData` otherwise
    pub fn new(
        name: &str,
        namespace: &str,
        values: BTreeMap<String, String>,
        is_base64: bool,
    ) -> Result<Self> {
        if name.trim().is_empty() {
            return Err(PipelineError::PreconditionViolation(
                "secret name must not be empty".to_string(),
            ));
        }
        if namespace.trim().is_empty() {
            return Err(PipelineError::PreconditionViolation(
                "secret namespace must not be empty".to_string(),
            ));
        }
        if values.is_empty() {
            return Err(PipelineError::PreconditionViolation(format!(
                "secret '{name}' must have at least one value"
            )));
        }
        if let Some(key) = values.keys().find(|k| k.trim().is_empty()) {
            return Err(PipelineError::PreconditionViolation(format!(
                "secret '{name}' has an empty key ({key:?})"
            )));
        }

        let (string_data, data) = if is_base64 {
            for (key, value) in &values {
                base64::engine::general_purpose::STANDARD
                    .decode(value)
                    .map_err(|e| {
                        PipelineError::PreconditionViolation(format!(
                            "value for key '{key}' is not valid base64: {e}"
                        ))
                    })?;
            }
            (BTreeMap::new(), values)
        } else {
            (values, BTreeMap::new())
        };

        Ok(Self {
            api_version: "v1".to_string(),
            kind: "Secret".to_string(),
            metadata: SecretMetadata {
                name: name.to_string(),
                namespace: namespace.to_string(),
            },
            secret_type: "Opaque".to_string(),
            string_data,
            data,
        })
    }

    /// Serialize to canonical YAML
    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self).map_err(|e| {
            PipelineError::PreconditionViolation(format!("failed to marshal secret to yaml: {e}"))
        })
    }
}

/// Render a secret manifest from its fields
pub fn render(
    name: &str,
    namespace: &str,
    values: &BTreeMap<String, String>,
    is_base64: bool,
) -> Result<String> {
    SecretDocument::new(name, namespace, values.clone(), is_base64)?.to_yaml()
}
