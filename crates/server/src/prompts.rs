//! Parameterized prompt templates.
//!
//! A template body uses `{argument}` placeholders. Rendering validates
//! required arguments, substitutes the provided ones, and leaves unknown
//! placeholders intact.

use std::collections::BTreeMap;

use gangway_protocol::{
    GetPromptResult, PromptArgumentInfo, PromptInfo, PromptMessage, ToolContent,
};

#[derive(Debug, thiserror::Error)]
pub enum PromptError {
    #[error("missing required argument: {0}")]
    MissingArgument(String),
}

#[derive(Debug, Clone)]
pub struct PromptArgument {
    pub name: String,
    pub description: Option<String>,
    pub required: bool,
}

#[derive(Debug, Clone)]
pub struct PromptTemplate {
    pub name: String,
    pub description: Option<String>,
    pub arguments: Vec<PromptArgument>,
    pub template: String,
}

impl PromptTemplate {
    pub fn new(name: impl Into<String>, template: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            arguments: Vec::new(),
            template: template.into(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_argument(
        mut self,
        name: impl Into<String>,
        description: impl Into<String>,
        required: bool,
    ) -> Self {
        self.arguments.push(PromptArgument {
            name: name.into(),
            description: Some(description.into()),
            required,
        });
        self
    }

    pub fn info(&self) -> PromptInfo {
        PromptInfo {
            name: self.name.clone(),
            description: self.description.clone(),
            arguments: self
                .arguments
                .iter()
                .map(|arg| PromptArgumentInfo {
                    name: arg.name.clone(),
                    description: arg.description.clone(),
                    required: arg.required,
                })
                .collect(),
        }
    }

    /// Render the template with the provided arguments.
    pub fn render(&self, args: &BTreeMap<String, String>) -> Result<String, PromptError> {
        for declared in &self.arguments {
            if declared.required && !args.contains_key(&declared.name) {
                return Err(PromptError::MissingArgument(declared.name.clone()));
            }
        }
        for provided in args.keys() {
            if !self.arguments.iter().any(|a| &a.name == provided) {
                tracing::warn!(
                    prompt = %self.name,
                    argument = %provided,
                    "unknown argument provided for prompt"
                );
            }
        }
        Ok(substitute(&self.template, args))
    }

    /// Render into a `prompts/get` result: one user message carrying the
    /// rendered text.
    pub fn get(&self, args: &BTreeMap<String, String>) -> Result<GetPromptResult, PromptError> {
        let text = self.render(args)?;
        Ok(GetPromptResult {
            description: self.description.clone(),
            messages: vec![PromptMessage {
                role: "user".to_string(),
                content: ToolContent::Text { text },
            }],
        })
    }
}

/// Replace `{key}` placeholders with bound values. Placeholders without a
/// binding are left intact.
pub(crate) fn substitute(template: &str, args: &BTreeMap<String, String>) -> String {
    let mut result = template.to_string();
    for (key, value) in args {
        result = result.replace(&format!("{{{key}}}"), value);
    }
    result
}
