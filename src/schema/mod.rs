//! Document schema data and per-action sub-schemas.
//!
//! Every step in `mainSteps` is checked against the base step schema, and
//! additionally against the fragment registered for the step's `action`
//! literal. The pairing is a plain lookup in [`ActionRegistry`]; a step whose
//! action has no entry is checked against the base schema only.
//!
//! | Data | Source |
//! |------|--------|
//! | document envelope, `step`, `parameter`, `file` definitions | `document.json` |
//! | one fragment and optional snippet per action | `actions/*.json` |
//!
//! [`DocumentSchema::bundled`] renders the same pairing as the classic
//! `allOf` / `if` / `then` JSON schema for external tools.

mod validator;

pub use validator::{CompiledSchema, SchemaError, SchemaStore, SchemaValidator};

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use serde::Deserialize;
use serde_json::{json, Value};
use tower_lsp::lsp_types::Url;

use crate::error::{Result, ServiceError};
use crate::model::Segment;

/// Uri under which the built-in document schema is known.
pub const DOCUMENT_SCHEMA_URI: &str = "file://schema/ssm-document-schema.json";

const DOCUMENT: &str = include_str!("document.json");

const ACTIONS: [&str; 14] = [
    include_str!("actions/approve.json"),
    include_str!("actions/branch.json"),
    include_str!("actions/changeInstanceState.json"),
    include_str!("actions/createStack.json"),
    include_str!("actions/createTags.json"),
    include_str!("actions/deleteImage.json"),
    include_str!("actions/executeAwsApi.json"),
    include_str!("actions/executeStateMachine.json"),
    include_str!("actions/invokeLambdaFunction.json"),
    include_str!("actions/pause.json"),
    include_str!("actions/runCommand.json"),
    include_str!("actions/runInstances.json"),
    include_str!("actions/sleep.json"),
    include_str!("actions/waitForAwsResourceProperty.json"),
];

/// A ready-made step offered by completion inside `mainSteps`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Snippet {
    pub label: String,
    pub description: String,
    pub body: Value,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ActionSchema {
    pub action: String,
    pub schema: Value,
    #[serde(default)]
    pub snippet: Option<Snippet>,
}

/// Action literal to fragment, in registration order.
#[derive(Debug, Default)]
pub struct ActionRegistry {
    actions: Vec<ActionSchema>,
    index: HashMap<String, usize>,
}

impl ActionRegistry {
    pub fn new(actions: Vec<ActionSchema>) -> Self {
        let index = actions
            .iter()
            .enumerate()
            .map(|(i, action)| (action.action.clone(), i))
            .collect();
        ActionRegistry { actions, index }
    }

    pub fn builtin() -> Result<Self> {
        let actions = ACTIONS
            .iter()
            .map(|data| serde_json::from_str::<ActionSchema>(data))
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(Self::new(actions))
    }

    pub fn lookup(&self, action: &str) -> Option<&ActionSchema> {
        self.index.get(action).map(|&i| &self.actions[i])
    }

    /// The fragment in force for a step value, if its `action` is registered.
    pub fn select(&self, step: &Value) -> Option<&ActionSchema> {
        step.get("action").and_then(Value::as_str).and_then(|action| self.lookup(action))
    }

    pub fn actions(&self) -> impl Iterator<Item = &ActionSchema> {
        self.actions.iter()
    }

    pub fn snippets(&self) -> impl Iterator<Item = &Snippet> {
        self.actions.iter().filter_map(|action| action.snippet.as_ref())
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }
}

/// The document schema plus the action registry layered on its steps.
#[derive(Debug, Clone)]
pub struct DocumentSchema {
    uri: Url,
    document: Value,
    registry: Arc<ActionRegistry>,
}

impl DocumentSchema {
    pub fn new(uri: Url, document: Value, registry: Arc<ActionRegistry>) -> Self {
        DocumentSchema {
            uri,
            document,
            registry,
        }
    }

    pub fn builtin() -> Result<Self> {
        let uri = Url::parse(DOCUMENT_SCHEMA_URI).map_err(|err| ServiceError::Schema {
            uri: DOCUMENT_SCHEMA_URI.to_string(),
            message: err.to_string(),
        })?;
        Ok(Self::new(uri, serde_json::from_str(DOCUMENT)?, Arc::new(ActionRegistry::builtin()?)))
    }

    /// Load a document schema from disk; the built-in action fragments still apply.
    pub fn load(path: &Path) -> Result<Self> {
        let schema_error = |message: String| ServiceError::Schema {
            uri: path.display().to_string(),
            message,
        };
        let uri = Url::from_file_path(path).map_err(|()| schema_error("not an absolute path".to_string()))?;
        let text = std::fs::read_to_string(path)?;
        let document = serde_json::from_str(&text).map_err(|err| schema_error(err.to_string()))?;
        Ok(Self::new(uri, document, Arc::new(ActionRegistry::builtin()?)))
    }

    pub fn uri(&self) -> &Url {
        &self.uri
    }

    pub fn document(&self) -> &Value {
        &self.document
    }

    pub fn registry(&self) -> &ActionRegistry {
        &self.registry
    }

    fn step_definition(&self) -> Option<&Value> {
        self.document.pointer("/definitions/step")
    }

    /// The schema as a single JSON document with the fragments inlined as
    /// `allOf` / `if` / `then` clauses on the step definition.
    pub fn bundled(&self) -> Value {
        let mut document = self.document.clone();
        let clauses: Vec<Value> = self
            .registry
            .actions()
            .map(|action| {
                json!({
                    "if": { "properties": { "action": { "const": action.action } } },
                    "then": action.schema,
                })
            })
            .collect();
        if let Some(Value::Object(step)) = document.pointer_mut("/definitions/step") {
            step.insert("allOf".to_string(), Value::Array(clauses));
            let snippets: Vec<Value> = self
                .registry
                .snippets()
                .map(|snippet| {
                    json!({
                        "label": snippet.label,
                        "description": snippet.description,
                        "body": snippet.body,
                    })
                })
                .collect();
            step.insert("defaultSnippets".to_string(), Value::Array(snippets));
        }
        document
    }

    /// Follow a local `$ref`.
    pub fn resolve<'a>(&'a self, schema: &'a Value) -> &'a Value {
        let mut schema = schema;
        for _ in 0..16 {
            match schema
                .get("$ref")
                .and_then(Value::as_str)
                .and_then(|r| r.strip_prefix('#'))
                .and_then(|pointer| self.document.pointer(pointer))
            {
                Some(target) => schema = target,
                None => break,
            }
        }
        schema
    }

    /// Every schema that applies at `path`, given the document value.
    ///
    /// Composition keywords are flattened, so the result includes the
    /// branches of `allOf`, `anyOf` and `oneOf`. Where a step definition
    /// applies, the fragment selected by the step's action is appended.
    pub fn schemas_at<'a>(&'a self, path: &[Segment], document: Option<&'a Value>) -> Vec<&'a Value> {
        let mut current = Vec::new();
        self.expand(&self.document, document, &mut current);

        let mut value = document;
        for segment in path {
            value = value.and_then(|v| match segment {
                Segment::Key(key) => v.get(key),
                Segment::Index(index) => v.get(index),
            });
            let mut next = Vec::new();
            for schema in current {
                if let Some(child) = child_schema(schema, segment) {
                    self.expand(child, value, &mut next);
                }
            }
            current = next;
        }
        current
    }

    fn expand<'a>(&'a self, schema: &'a Value, value: Option<&'a Value>, out: &mut Vec<&'a Value>) {
        let schema = self.resolve(schema);
        if out.iter().any(|s| std::ptr::eq(*s, schema)) {
            return;
        }
        out.push(schema);
        for keyword in ["allOf", "anyOf", "oneOf"] {
            if let Some(branches) = schema.get(keyword).and_then(Value::as_array) {
                for branch in branches {
                    self.expand(branch, value, out);
                }
            }
        }
        let is_step = self.step_definition().is_some_and(|step| std::ptr::eq(step, schema));
        if is_step {
            if let Some(action) = value.and_then(|v| self.registry.select(v)) {
                out.push(&action.schema);
            }
        }
    }
}

fn child_schema<'a>(schema: &'a Value, segment: &Segment) -> Option<&'a Value> {
    match segment {
        Segment::Key(key) => schema
            .get("properties")
            .and_then(|p| p.get(key))
            .or_else(|| schema.get("additionalProperties").filter(|a| a.is_object())),
        Segment::Index(index) => match schema.get("items")? {
            Value::Array(items) => items.get(*index),
            items => Some(items),
        },
    }
}

/// First `description` among the schemas.
pub fn description<'a>(schemas: &[&'a Value]) -> Option<&'a str> {
    schemas
        .iter()
        .find_map(|schema| schema.get("description").and_then(Value::as_str))
}

/// Property names offered by the schemas, with their descriptions, in schema order.
pub fn property_names<'a>(schemas: &[&'a Value]) -> Vec<(&'a str, Option<&'a str>)> {
    let mut names: Vec<(&str, Option<&str>)> = Vec::new();
    for schema in schemas {
        if let Some(Value::Object(properties)) = schema.get("properties") {
            for (name, property) in properties {
                let description = property.get("description").and_then(Value::as_str);
                match names.iter_mut().find(|(n, _)| *n == name.as_str()) {
                    Some(existing) if existing.1.is_none() => existing.1 = description,
                    Some(_) => {}
                    None => names.push((name.as_str(), description)),
                }
            }
        }
    }
    names
}

/// Literal values allowed by the schemas (`enum`, `const`, booleans).
pub fn literal_values(schemas: &[&Value]) -> Vec<Value> {
    let mut values: Vec<Value> = Vec::new();
    let mut push = |value: &Value| {
        if !values.contains(value) {
            values.push(value.clone());
        }
    };
    for schema in schemas {
        if let Some(items) = schema.get("enum").and_then(Value::as_array) {
            items.iter().for_each(&mut push);
        }
        if let Some(value) = schema.get("const") {
            push(value);
        }
        let boolean = match schema.get("type") {
            Some(Value::String(t)) => t == "boolean",
            Some(Value::Array(types)) => types.iter().any(|t| t == "boolean"),
            _ => false,
        };
        if boolean {
            push(&Value::Bool(true));
            push(&Value::Bool(false));
        }
    }
    values
}
