//! Prompt templates for the two generation stages.
//!
//! Templates are registered once in a [`minijinja::Environment`] and rendered
//! with a strict field set: every placeholder a template declares must be
//! supplied, and nothing else may be.

use std::collections::BTreeMap;
use std::fmt;

use minijinja::{Environment, UndefinedBehavior};

const DEEP_THINKING_TEMPLATE: &str = "**Deep Thinking Analysis Task**
    Analyze user's query thoroughly. Consider:
    1. Primary intent and underlying needs
    2. Potential ambiguities or missing context
    3. Required knowledge domains
    4. Response strategy
    
    userQuery: {{ query }}
    Step-by-step Analysis:";

const FINAL_RESPONSE_TEMPLATE: &str = "**Response Generation**
    Based on the analysis below, craft a comprehensive response.

    Analysis: {{ analysis }}
    Original Query: {{ query }} 
    Response:";

/// The fixed set of templates known to the renderer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PromptTemplate {
    DeepThinking,
    FinalResponse,
}

impl PromptTemplate {
    pub fn id(&self) -> &'static str {
        match self {
            PromptTemplate::DeepThinking => "deep-thinking",
            PromptTemplate::FinalResponse => "final-response",
        }
    }

    /// Placeholders the template declares.
    pub fn placeholders(&self) -> &'static [&'static str] {
        match self {
            PromptTemplate::DeepThinking => &["query"],
            PromptTemplate::FinalResponse => &["analysis", "query"],
        }
    }

    fn source(&self) -> &'static str {
        match self {
            PromptTemplate::DeepThinking => DEEP_THINKING_TEMPLATE,
            PromptTemplate::FinalResponse => FINAL_RESPONSE_TEMPLATE,
        }
    }

    const ALL: [PromptTemplate; 2] = [PromptTemplate::DeepThinking, PromptTemplate::FinalResponse];
}

impl fmt::Display for PromptTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PromptError {
    #[error("template '{template}' requires field '{field}'")]
    MissingField {
        template: PromptTemplate,
        field: &'static str,
    },
    #[error("template '{template}' does not declare field '{field}'")]
    UnexpectedField {
        template: PromptTemplate,
        field: String,
    },
    #[error("template error: {0}")]
    Template(#[from] minijinja::Error),
}

/// Named placeholder values, kept in insertion order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PromptFields {
    entries: Vec<(String, String)>,
}

impl PromptFields {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a field, replacing any earlier value under the same name.
    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        let name = name.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(n, _)| *n == name) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((name, value)),
        }
        self
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(n, _)| n.as_str())
    }
}

/// Renders the stage templates. Stateless apart from the compiled templates.
pub struct PromptRenderer {
    env: Environment<'static>,
}

impl PromptRenderer {
    pub fn new() -> Result<Self, PromptError> {
        let mut env = Environment::new();
        env.set_undefined_behavior(UndefinedBehavior::Strict);
        env.set_keep_trailing_newline(true);
        for template in PromptTemplate::ALL {
            env.add_template(template.id(), template.source())?;
        }
        Ok(Self { env })
    }

    /// Substitute `fields` into `template`.
    ///
    /// Values are inserted literally; template syntax inside a value is not
    /// evaluated.
    pub fn render(
        &self,
        template: PromptTemplate,
        fields: &PromptFields,
    ) -> Result<String, PromptError> {
        let declared = template.placeholders();

        if let Some(field) = declared.iter().copied().find(|name| fields.get(name).is_none()) {
            return Err(PromptError::MissingField { template, field });
        }
        if let Some(extra) = fields
            .names()
            .find(|name| !declared.iter().any(|d| d == name))
        {
            return Err(PromptError::UnexpectedField {
                template,
                field: extra.to_string(),
            });
        }

        let ctx: BTreeMap<&str, &str> = fields
            .entries
            .iter()
            .map(|(n, v)| (n.as_str(), v.as_str()))
            .collect();
        let rendered = self.env.get_template(template.id())?.render(ctx)?;
        Ok(rendered)
    }
}

impl fmt::Debug for PromptRenderer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PromptRenderer").finish_non_exhaustive()
    }
}
