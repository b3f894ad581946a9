//! Handlebars renderer
//!
//! Raw templates are YAML documents listing messages; each message's content
//! is a Handlebars template rendered in strict mode, so a reference to an
//! undefined variable is an error rather than an empty string.
//!
//! ```yaml
//! messages:
//!   - role: system
//!     content: You are a support agent.
//!   - role: user
//!     content: "{{name}} reports: {{issue}}"
//! ```

use async_trait::async_trait;
use handlebars::{Handlebars, RenderErrorReason};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{RenderError, Renderer};
use crate::domain::{Message, MessageKind, Role, Variables};

/// One message entry in a template document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplateMessage {
    pub role: Role,
    #[serde(default)]
    pub kind: MessageKind,
    pub content: String,
}

/// Parsed template document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplateDocument {
    pub messages: Vec<TemplateMessage>,
}

impl TemplateDocument {
    pub fn parse(template: &str) -> Result<Self, RenderError> {
        debug!(template_len = template.len(), "TemplateDocument::parse: called");
        let doc: Self = serde_yaml::from_str(template).map_err(|e| RenderError::Malformed(e.to_string()))?;
        if doc.messages.is_empty() {
            return Err(RenderError::Malformed("template has no messages".to_string()));
        }
        Ok(doc)
    }
}

/// Renders template documents with Handlebars
pub struct HandlebarsRenderer {
    hbs: Handlebars<'static>,
}

impl HandlebarsRenderer {
    pub fn new() -> Self {
        debug!("HandlebarsRenderer::new: called");
        let mut hbs = Handlebars::new();
        hbs.set_strict_mode(true);
        // Prompts are not HTML
        hbs.register_escape_fn(handlebars::no_escape);
        Self { hbs }
    }

    /// Render synchronously; the async trait method delegates here
    pub fn render_document(&self, template: &str, variables: &Variables) -> Result<Vec<Message>, RenderError> {
        let doc = TemplateDocument::parse(template)?;
        doc.messages
            .iter()
            .map(|m| {
                let content = self
                    .hbs
                    .render_template(&m.content, variables)
                    .map_err(template_error)?;
                Ok(Message::new(m.role, m.kind, content.trim_matches('\n')))
            })
            .collect()
    }
}

fn template_error(e: handlebars::RenderError) -> RenderError {
    match e.reason() {
        RenderErrorReason::MissingVariable(path) => {
            RenderError::MissingVariable(vec![path.clone().unwrap_or_else(|| "<unknown>".to_string())])
        }
        _ => RenderError::Template(e.to_string()),
    }
}

impl Default for HandlebarsRenderer {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Renderer for HandlebarsRenderer {
    async fn render(&self, template: &str, variables: &Variables) -> Result<Vec<Message>, RenderError> {
        debug!(variable_count = variables.len(), "HandlebarsRenderer::render: called");
        self.render_document(template, variables)
    }
}
