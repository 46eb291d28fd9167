//! Model gateway - one structured exchange with the language model.
//!
//! Every planning component speaks the same protocol: the model is asked to
//! reply with free-text reasoning followed by an `Action:` line carrying the
//! machine-readable payload. The gateway performs exactly one exchange per
//! call; attempt budgets (resubmitting after a bad payload) belong to the
//! callers, and transient HTTP retries belong to the [`crate::llm`] layer
//! underneath.

pub mod protocol;

use std::sync::Arc;

use thiserror::Error;

use crate::llm::{ChatMessage, ChatOptions, LlmClient};

/// One parsed gateway reply: what the model thought, and what it decided.
#[derive(Debug, Clone)]
pub struct GatewayReply {
    /// Free-text reasoning preceding the delimiter.
    pub reasoning: String,
    /// Raw payload text after the delimiter (JSON, a letter, ...).
    pub action: String,
}

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("model call failed: {0}")]
    Call(String),

    #[error("model returned an empty completion")]
    EmptyCompletion,

    #[error("completion has no 'Action:' delimiter")]
    MissingAction,
}

/// Gateway to the prediction service.
///
/// Holds the client, the model id, and the sampling options shared by every
/// call. Temperature is pinned to zero so reruns of the same tree are as
/// reproducible as the provider allows.
pub struct ModelGateway {
    llm: Arc<dyn LlmClient>,
    model: String,
}

impl ModelGateway {
    pub fn new(llm: Arc<dyn LlmClient>, model: impl Into<String>) -> Self {
        Self {
            llm,
            model: model.into(),
        }
    }

    fn options() -> ChatOptions {
        ChatOptions {
            temperature: Some(0.0),
            ..ChatOptions::default()
        }
    }

    /// Submit a prompt and return the raw completion text.
    ///
    /// Used where the reply is consumed whole (generated code, generated
    /// prompts, reasoning answers) rather than split into reasoning/action.
    pub async fn complete(
        &self,
        system: Option<&str>,
        user: &str,
    ) -> Result<String, GatewayError> {
        let mut messages = Vec::with_capacity(2);
        if let Some(system) = system {
            messages.push(ChatMessage::system(system));
        }
        messages.push(ChatMessage::user(user));

        let response = self
            .llm
            .chat_completion(&self.model, &messages, Self::options())
            .await
            .map_err(|e| GatewayError::Call(e.to_string()))?;

        match response.content {
            Some(content) if !content.trim().is_empty() => Ok(content),
            _ => Err(GatewayError::EmptyCompletion),
        }
    }

    /// Submit a prompt and split the completion into reasoning and action.
    ///
    /// # Errors
    /// Fails if the call fails, the completion is empty, or the completion
    /// carries no `Action:` delimiter. All three are protocol failures the
    /// caller counts against its attempt budget.
    pub async fn request_action(
        &self,
        system: Option<&str>,
        user: &str,
    ) -> Result<GatewayReply, GatewayError> {
        let content = self.complete(system, user).await?;
        let (reasoning, action) =
            protocol::split_action(&content).ok_or(GatewayError::MissingAction)?;
        Ok(GatewayReply {
            reasoning: reasoning.trim().to_string(),
            action: action.trim().to_string(),
        })
    }
}
