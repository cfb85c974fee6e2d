use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use serde_json::Value;
use tower_lsp::lsp_types::Url;

use super::DocumentSchema;
use crate::error::{Result, ServiceError};
use crate::util::lock;

/// One schema violation, located by JSON pointer into the document.
#[derive(Debug, Clone, PartialEq)]
pub struct SchemaError {
    pub pointer: String,
    pub message: String,
}

/// Compiled validators: one for the document, one per action fragment.
pub struct SchemaValidator {
    base: jsonschema::Validator,
    fragments: HashMap<String, jsonschema::Validator>,
}

impl SchemaValidator {
    pub fn compile(schema: &DocumentSchema) -> Result<Self> {
        let compile = |value: &Value| {
            jsonschema::validator_for(value).map_err(|err| ServiceError::Schema {
                uri: schema.uri().to_string(),
                message: err.to_string(),
            })
        };
        let base = compile(schema.document())?;
        let fragments = schema
            .registry()
            .actions()
            .map(|action| Ok((action.action.clone(), compile(&action.schema)?)))
            .collect::<Result<HashMap<_, _>>>()?;
        Ok(SchemaValidator { base, fragments })
    }

    /// Validate a document value. Each step in `mainSteps` is checked
    /// against the fragment for its action in addition to the base schema.
    pub fn validate(&self, document: &Value) -> Vec<SchemaError> {
        let mut errors: Vec<SchemaError> = self
            .base
            .iter_errors(document)
            .map(|error| SchemaError {
                pointer: error.instance_path.to_string(),
                message: error.to_string(),
            })
            .collect();

        let steps = document.get("mainSteps").and_then(Value::as_array);
        for (index, step) in steps.into_iter().flatten().enumerate() {
            let Some(validator) = step
                .get("action")
                .and_then(Value::as_str)
                .and_then(|action| self.fragments.get(action))
            else {
                continue;
            };
            errors.extend(validator.iter_errors(step).map(|error| SchemaError {
                pointer: format!("/mainSteps/{index}{}", error.instance_path),
                message: error.to_string(),
            }));
        }
        errors
    }
}

/// A schema together with its compiled validators.
pub struct CompiledSchema {
    pub schema: DocumentSchema,
    pub validator: SchemaValidator,
}

/// Lazily compiled schema owned by one backend.
///
/// [`SchemaStore::reset`] drops the compiled form when its uri changes on
/// disk; the next request recompiles.
pub struct SchemaStore {
    schema_path: Option<PathBuf>,
    compiled: Mutex<Option<Arc<CompiledSchema>>>,
}

impl SchemaStore {
    pub fn new(schema_path: Option<PathBuf>) -> Self {
        SchemaStore {
            schema_path,
            compiled: Mutex::new(None),
        }
    }

    pub fn get(&self) -> Result<Arc<CompiledSchema>> {
        if let Some(compiled) = lock(&self.compiled).as_ref() {
            return Ok(Arc::clone(compiled));
        }

        let schema = match &self.schema_path {
            Some(path) => DocumentSchema::load(path)?,
            None => DocumentSchema::builtin()?,
        };
        tracing::debug!("compiling document schema {}", schema.uri());
        let validator = SchemaValidator::compile(&schema)?;
        let compiled = Arc::new(CompiledSchema { schema, validator });
        *lock(&self.compiled) = Some(Arc::clone(&compiled));
        Ok(compiled)
    }

    /// Uri of the schema this store serves.
    pub fn uri(&self) -> Option<Url> {
        match &self.schema_path {
            Some(path) => Url::from_file_path(path).ok(),
            None => Url::parse(super::DOCUMENT_SCHEMA_URI).ok(),
        }
    }

    /// Forget the compiled schema if `uri` is the one it was loaded from.
    pub fn reset(&self, uri: &Url) -> bool {
        if self.uri().as_ref() != Some(uri) {
            return false;
        }
        lock(&self.compiled).take();
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn validator() -> SchemaValidator {
        SchemaValidator::compile(&DocumentSchema::builtin().unwrap()).unwrap()
    }

    fn document(steps: Value) -> Value {
        json!({"schemaVersion": "0.3", "mainSteps": steps})
    }

    #[test]
    fn test_valid_document() {
        let errors = validator().validate(&document(json!([
            {"name": "wait", "action": "aws:sleep", "inputs": {"Duration": "PT10M"}}
        ])));
        assert!(errors.is_empty(), "{errors:?}");
    }

    #[test]
    fn test_fragment_applies_to_registered_action() {
        let errors = validator().validate(&document(json!([
            {"name": "wait", "action": "aws:sleep", "inputs": {"Duration": 5}}
        ])));

        assert_eq!(errors.len(), 1, "{errors:?}");
        assert_eq!(errors[0].pointer, "/mainSteps/0/inputs/Duration");
    }

    #[test]
    fn test_unregistered_action_uses_base_only() {
        let errors = validator().validate(&document(json!([
            {"name": "custom", "action": "aws:notRegistered", "inputs": {"Duration": 5}}
        ])));
        assert!(errors.is_empty(), "{errors:?}");
    }

    #[test]
    fn test_base_errors_are_reported() {
        let errors = validator().validate(&json!({"schemaVersion": "0.3", "mainSteps": [{"name": "x"}]}));
        assert!(errors.iter().any(|e| e.pointer == "/mainSteps/0"), "{errors:?}");
    }

    #[test]
    fn test_store_reset_matches_uri() {
        let store = SchemaStore::new(None);
        let first = store.get().unwrap();

        assert!(!store.reset(&Url::parse("file:///other.json").unwrap()));
        assert!(Arc::ptr_eq(&first, &store.get().unwrap()));

        assert!(store.reset(&Url::parse(super::super::DOCUMENT_SCHEMA_URI).unwrap()));
        assert!(!Arc::ptr_eq(&first, &store.get().unwrap()), "Reset should force a recompile");
    }
}
