//! Prompt templates with `{{argument}}` placeholders.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::pagination::{paginate, Page, DEFAULT_PAGE_SIZE};
use crate::provider::PromptProvider;
use crate::types::{
    HostError, HostResult, PromptArgument, PromptDefinition, PromptGetResult, PromptMessage,
    ToolContent,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateMessage {
    pub role: String,
    pub text: String,
}

/// A prompt definition together with the messages it expands to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromptTemplate {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub arguments: Vec<PromptArgument>,
    pub messages: Vec<TemplateMessage>,
}

impl PromptTemplate {
    pub fn definition(&self) -> PromptDefinition {
        PromptDefinition {
            name: self.name.clone(),
            description: self.description.clone(),
            arguments: (!self.arguments.is_empty()).then(|| self.arguments.clone()),
        }
    }

    /// Expand the template. Required arguments must be present; unknown
    /// placeholders are left as-is.
    pub fn render(&self, arguments: &Map<String, Value>) -> HostResult<PromptGetResult> {
        for arg in self.arguments.iter().filter(|a| a.required) {
            if arguments.get(&arg.name).map_or(true, Value::is_null) {
                return Err(HostError::MissingArgument(arg.name.clone()));
            }
        }

        let messages = self
            .messages
            .iter()
            .map(|m| PromptMessage {
                role: m.role.clone(),
                content: ToolContent::Text {
                    text: substitute(&m.text, arguments),
                },
            })
            .collect();

        Ok(PromptGetResult {
            description: self.description.clone(),
            messages,
        })
    }
}

fn substitute(text: &str, arguments: &Map<String, Value>) -> String {
    let mut out = text.to_string();
    for (name, value) in arguments {
        let replacement = match value {
            Value::String(s) => s.clone(),
            Value::Null => String::new(),
            other => other.to_string(),
        };
        out = out.replace(&format!("{{{{{name}}}}}"), &replacement);
    }
    out
}

pub struct InMemoryPromptProvider {
    templates: Vec<PromptTemplate>,
    page_size: usize,
}

impl InMemoryPromptProvider {
    pub fn new(templates: Vec<PromptTemplate>) -> Self {
        Self {
            templates,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }
}

impl PromptProvider for InMemoryPromptProvider {
    fn list(&self, cursor: Option<&str>) -> HostResult<Page<PromptDefinition>> {
        let definitions: Vec<PromptDefinition> =
            self.templates.iter().map(PromptTemplate::definition).collect();
        paginate(&definitions, cursor, self.page_size)
    }

    fn get(&self, name: &str, arguments: &Map<String, Value>) -> HostResult<PromptGetResult> {
        self.templates
            .iter()
            .find(|t| t.name == name)
            .ok_or_else(|| HostError::PromptNotFound(name.to_string()))?
            .render(arguments)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn review() -> PromptTemplate {
        PromptTemplate {
            name: "review".to_string(),
            description: Some("Review a change".to_string()),
            arguments: vec![
                PromptArgument {
                    name: "file".to_string(),
                    description: None,
                    required: true,
                },
                PromptArgument {
                    name: "focus".to_string(),
                    description: None,
                    required: false,
                },
            ],
            messages: vec![TemplateMessage {
                role: "user".to_string(),
                text: "Review {{file}} focusing on {{focus}}".to_string(),
            }],
        }
    }

    fn args(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap_or_default()
    }

    #[test]
    fn test_render_substitutes_arguments() {
        let result = review()
            .render(&args(json!({ "file": "main.rs", "focus": "errors" })))
            .unwrap();
        assert_eq!(
            result.messages[0].content,
            ToolContent::Text {
                text: "Review main.rs focusing on errors".to_string()
            }
        );
    }

    #[test]
    fn test_missing_required_argument() {
        let err = review().render(&args(json!({ "focus": "x" }))).unwrap_err();
        assert!(matches!(err, HostError::MissingArgument(a) if a == "file"));
    }

    #[test]
    fn test_unknown_prompt() {
        let provider = InMemoryPromptProvider::new(vec![review()]);
        assert!(matches!(
            provider.get("nope", &Map::new()),
            Err(HostError::PromptNotFound(_))
        ));
    }

    #[test]
    fn test_definition_hides_empty_arguments() {
        let mut template = review();
        template.arguments.clear();
        assert!(template.definition().arguments.is_none());
    }
}
