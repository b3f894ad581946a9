//! Rendering boundary
//!
//! The engine hands a resolved revision's raw template and the caller's
//! variables to a [`Renderer`] and gets back ordered messages. The template
//! language belongs to the renderer; [`HandlebarsRenderer`] is the built-in
//! implementation.

use async_trait::async_trait;
use thiserror::Error;

mod document;
pub mod minimal;

pub use document::{HandlebarsRenderer, TemplateDocument, TemplateMessage};
pub use minimal::minimal_revision;

use crate::domain::{Message, Variables};

/// Errors produced while rendering
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RenderError {
    #[error("missing required variables: {}", .0.join(", "))]
    MissingVariable(Vec<String>),

    #[error("malformed template: {0}")]
    Malformed(String),

    #[error("template rendering failed: {0}")]
    Template(String),
}

/// Turns raw template text plus variables into messages
#[async_trait]
pub trait Renderer: Send + Sync {
    async fn render(&self, template: &str, variables: &Variables) -> Result<Vec<Message>, RenderError>;
}
