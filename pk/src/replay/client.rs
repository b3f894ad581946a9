//! ModelClient trait definition

use async_trait::async_trait;

use super::error::ModelError;
use super::row::TraceMeta;
use crate::domain::Message;

/// Sends a conversation to a model and returns its answer messages
///
/// Each call is independent; no state is carried between calls.
#[async_trait]
pub trait ModelClient: Send + Sync {
    async fn complete(&self, messages: &[Message], meta: &TraceMeta) -> Result<Vec<Message>, ModelError>;
}
