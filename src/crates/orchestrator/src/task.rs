//! Renderable units of work.
//!
//! A [`Task`] turns an input map into system and user text. The executor and
//! chain only ever see this capability; how templates are stored or
//! versioned is up to the caller.

use crate::error::RenderError;
use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::OnceLock;

/// Variables supplied to a task
pub type Input = HashMap<String, Value>;

/// Output of [`Task::render`]
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Rendered {
    pub system: String,
    pub user: String,

    /// Effective input after defaults were applied
    pub input: Input,
}

/// Something that can be rendered into a completion request.
#[async_trait]
pub trait Task: Send + Sync {
    /// Task name, used in logs
    fn name(&self) -> &str;

    /// Produce system and user text for `input`
    async fn render(&self, input: &Input) -> Result<Rendered, RenderError>;

    /// Metadata forwarded into every completion request
    fn metadata(&self) -> HashMap<String, Value> {
        HashMap::new()
    }
}

/// Accepted type of a template variable
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VariableKind {
    String,
    Int,
    Float,
    Bool,
    #[default]
    Any,
}

impl VariableKind {
    fn accepts(&self, value: &Value) -> bool {
        match self {
            VariableKind::String => value.is_string(),
            VariableKind::Int => value.is_i64() || value.is_u64(),
            VariableKind::Float => value.is_number(),
            VariableKind::Bool => value.is_boolean(),
            VariableKind::Any => true,
        }
    }
}

/// A declared template variable
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Variable {
    pub name: String,
    #[serde(default)]
    pub kind: VariableKind,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub default: Option<Value>,
}

impl Variable {
    /// An optional variable of any type
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: VariableKind::Any,
            required: false,
            default: None,
        }
    }

    pub fn of_kind(mut self, kind: VariableKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// Value used when the input does not supply one
    pub fn with_default(mut self, default: impl Into<Value>) -> Self {
        self.default = Some(default.into());
        self
    }
}

fn placeholder() -> &'static Regex {
    static PLACEHOLDER: OnceLock<Regex> = OnceLock::new();
    PLACEHOLDER.get_or_init(|| {
        Regex::new(r"\{\{\s*([A-Za-z_][A-Za-z0-9_.-]*)\s*\}\}").expect("placeholder pattern is valid")
    })
}

fn value_to_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// A task backed by `{{name}}` placeholder templates.
///
/// Placeholders may appear in both system and user templates and are
/// replaced by the matching input value (strings verbatim, other JSON values
/// in their JSON form, `null` as empty). A placeholder with no matching
/// value is an error.
///
/// # Example
///
/// ```rust
/// use orchestrator::task::{Input, PromptTask, Task, Variable};
///
/// # tokio::runtime::Runtime::new().unwrap().block_on(async {
/// let task = PromptTask::new("greet", "Say hello to {{ name }}.")
///     .with_system("You are friendly.")
///     .with_variable(Variable::new("name").with_default("world"));
///
/// let rendered = task.render(&Input::new()).await.unwrap();
/// assert_eq!(rendered.user, "Say hello to world.");
/// # });
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromptTask {
    pub name: String,
    #[serde(default)]
    pub system: String,
    pub template: String,
    #[serde(default)]
    pub variables: Vec<Variable>,
    #[serde(default)]
    pub metadata: HashMap<String, Value>,
}

impl PromptTask {
    /// A task with a user template and no declared variables
    pub fn new(name: impl Into<String>, template: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            system: String::new(),
            template: template.into(),
            variables: Vec::new(),
            metadata: HashMap::new(),
        }
    }

    /// Set the system template
    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = system.into();
        self
    }

    /// Declare a variable
    pub fn with_variable(mut self, variable: Variable) -> Self {
        self.variables.push(variable);
        self
    }

    /// Add a metadata entry
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Apply defaults and check declared variables
    fn resolve_input(&self, input: &Input) -> Result<Input, RenderError> {
        let mut effective = input.clone();

        for variable in &self.variables {
            let supplied = effective.get(&variable.name).filter(|v| !v.is_null()).cloned();
            let value = match (supplied, &variable.default) {
                (Some(value), _) => value,
                (None, Some(default)) => {
                    effective.insert(variable.name.clone(), default.clone());
                    default.clone()
                }
                (None, None) if variable.required => {
                    return Err(RenderError::MissingVariable(variable.name.clone()));
                }
                (None, None) => continue,
            };

            if !variable.kind.accepts(&value) {
                return Err(RenderError::InvalidValue {
                    name: variable.name.clone(),
                    message: format!("expected {:?}, got {}", variable.kind, value),
                });
            }
        }

        Ok(effective)
    }

    fn substitute(template: &str, input: &Input) -> Result<String, RenderError> {
        let mut missing = None;
        let text = placeholder().replace_all(template, |caps: &regex::Captures<'_>| {
            let name = &caps[1];
            match input.get(name) {
                Some(value) => value_to_text(value),
                None => {
                    missing.get_or_insert_with(|| name.to_string());
                    String::new()
                }
            }
        });

        match missing {
            Some(name) => Err(RenderError::UnresolvedPlaceholder(name)),
            None => Ok(text.into_owned()),
        }
    }
}

#[async_trait]
impl Task for PromptTask {
    fn name(&self) -> &str {
        &self.name
    }

    async fn render(&self, input: &Input) -> Result<Rendered, RenderError> {
        let input = self.resolve_input(input)?;
        let system = Self::substitute(&self.system, &input)?;
        let user = Self::substitute(&self.template, &input)?;
        Ok(Rendered { system, user, input })
    }

    fn metadata(&self) -> HashMap<String, Value> {
        self.metadata.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn input(pairs: &[(&str, Value)]) -> Input {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[tokio::test]
    async fn test_substitutes_system_and_user() {
        let task = PromptTask::new("t", "Summarise: {{text}} in {{ words }} words")
            .with_system("You write for {{audience}}.");

        let rendered = task
            .render(&input(&[
                ("text", json!("the report")),
                ("words", json!(50)),
                ("audience", json!("engineers")),
            ]))
            .await
            .unwrap();

        assert_eq!(rendered.user, "Summarise: the report in 50 words");
        assert_eq!(rendered.system, "You write for engineers.");
    }

    #[tokio::test]
    async fn test_plain_text_renders_verbatim() {
        let task = PromptTask::new("a", "a");
        let rendered = task.render(&Input::new()).await.unwrap();
        assert_eq!(rendered.user, "a");
        assert_eq!(rendered.system, "");
    }

    #[tokio::test]
    async fn test_missing_required_variable() {
        let task = PromptTask::new("t", "{{topic}}").with_variable(Variable::new("topic").required());
        let err = task.render(&Input::new()).await.unwrap_err();
        assert_eq!(err, RenderError::MissingVariable("topic".into()));
    }

    #[tokio::test]
    async fn test_null_counts_as_missing() {
        let task = PromptTask::new("t", "{{topic}}").with_variable(Variable::new("topic").required());
        let err = task.render(&input(&[("topic", Value::Null)])).await.unwrap_err();
        assert_eq!(err, RenderError::MissingVariable("topic".into()));
    }

    #[tokio::test]
    async fn test_default_fills_in() {
        let task = PromptTask::new("t", "Tone: {{tone}}")
            .with_variable(Variable::new("tone").required().with_default("neutral"));

        let rendered = task.render(&Input::new()).await.unwrap();
        assert_eq!(rendered.user, "Tone: neutral");
        assert_eq!(rendered.input["tone"], json!("neutral"));
    }

    #[tokio::test]
    async fn test_unresolved_placeholder() {
        let task = PromptTask::new("t", "{{known}} and {{unknown}}");
        let err = task.render(&input(&[("known", json!("x"))])).await.unwrap_err();
        assert_eq!(err, RenderError::UnresolvedPlaceholder("unknown".into()));
    }

    #[tokio::test]
    async fn test_kind_mismatch() {
        let task = PromptTask::new("t", "{{count}}")
            .with_variable(Variable::new("count").of_kind(VariableKind::Int));
        let err = task.render(&input(&[("count", json!("three"))])).await.unwrap_err();
        assert!(matches!(err, RenderError::InvalidValue { name, .. } if name == "count"));
    }

    #[tokio::test]
    async fn test_metadata_is_exposed() {
        let task = PromptTask::new("t", "x").with_metadata("version", "1.2.0");
        assert_eq!(task.metadata()["version"], json!("1.2.0"));
    }

    #[test]
    fn test_deserializes_from_yaml() {
        let task: PromptTask = serde_yaml::from_str(
            r#"
name: classify
system: You label support tickets.
template: "Ticket: {{ticket}}"
variables:
  - name: ticket
    kind: string
    required: true
"#,
        )
        .unwrap();

        assert_eq!(task.variables[0].kind, VariableKind::String);
        assert!(task.variables[0].required);
    }
}
