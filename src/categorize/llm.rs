//! Classifier backed by an LLM chat completion.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;

use super::{Classifier, ClassifyError};
use crate::llm::{ChatMessage, ChatOptions, LlmClient, Role};

/// Expected reply shape; anything else is a schema failure.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ClassifierReply {
    category: String,
}

/// Asks a model to place a tool in one business category.
pub struct LlmClassifier {
    client: Arc<dyn LlmClient>,
    model: String,
    /// Categories the model should prefer, usually the catalog's.
    known_categories: Vec<String>,
}

impl LlmClassifier {
    pub fn new(client: Arc<dyn LlmClient>, model: String, known_categories: Vec<String>) -> Self {
        Self {
            client,
            model,
            known_categories,
        }
    }

    fn prompt(&self, name: &str) -> String {
        format!(
            "Classify the software product \"{}\" into a single business category.\n\
             Prefer one of: {}.\n\
             Respond with JSON only, exactly of the form {{\"category\": \"<category>\"}}.",
            name,
            self.known_categories.join(", ")
        )
    }
}

/// Parse a model reply, tolerating a surrounding markdown code fence.
fn parse_reply(text: &str) -> Result<String, ClassifyError> {
    let trimmed = text.trim();
    let body = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .and_then(|rest| rest.trim_end().strip_suffix("```"))
        .unwrap_or(trimmed)
        .trim();

    let reply: ClassifierReply =
        serde_json::from_str(body).map_err(|e| ClassifyError::Schema(e.to_string()))?;
    Ok(reply.category)
}

#[async_trait]
impl Classifier for LlmClassifier {
    async fn classify(&self, name: &str) -> Result<String, ClassifyError> {
        let messages = [
            ChatMessage::new(
                Role::System,
                "You categorize software subscriptions for an IT cost audit.",
            ),
            ChatMessage::new(Role::User, self.prompt(name)),
        ];
        let options = ChatOptions {
            temperature: Some(0.0),
            max_tokens: Some(40),
        };

        let response = self
            .client
            .chat_completion(&self.model, &messages, options)
            .await
            .map_err(|e| ClassifyError::Request(e.to_string()))?;

        let content = response
            .content
            .ok_or_else(|| ClassifyError::Schema("empty completion".to_string()))?;
        parse_reply(&content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{ChatResponse, LlmError};

    #[test]
    fn test_parse_plain_and_fenced_replies() {
        assert_eq!(parse_reply(r#"{"category": "CRM"}"#).unwrap(), "CRM");
        assert_eq!(
            parse_reply("```json\n{\"category\": \"Design\"}\n```").unwrap(),
            "Design"
        );
        assert_eq!(
            parse_reply("```\n{\"category\": \"Cloud\"}\n```").unwrap(),
            "Cloud"
        );
    }

    #[test]
    fn test_parse_rejects_schema_deviations() {
        assert!(matches!(parse_reply("CRM"), Err(ClassifyError::Schema(_))));
        assert!(matches!(
            parse_reply(r#"{"category": "CRM", "confidence": 0.9}"#),
            Err(ClassifyError::Schema(_))
        ));
        assert!(matches!(
            parse_reply(r#"{"categories": ["CRM"]}"#),
            Err(ClassifyError::Schema(_))
        ));
        assert!(matches!(
            parse_reply(r#"{"category": 7}"#),
            Err(ClassifyError::Schema(_))
        ));
    }

    struct FixedClient(Result<Option<String>, LlmError>);

    #[async_trait]
    impl LlmClient for FixedClient {
        async fn chat_completion(
            &self,
            _model: &str,
            messages: &[ChatMessage],
            _options: ChatOptions,
        ) -> Result<ChatResponse, LlmError> {
            assert!(messages[1].content.contains("\"Airtable\""));
            self.0.clone().map(|content| ChatResponse { content })
        }
    }

    fn classifier(reply: Result<Option<String>, LlmError>) -> LlmClassifier {
        LlmClassifier::new(
            Arc::new(FixedClient(reply)),
            "test-model".into(),
            vec!["CRM".into(), "Design".into()],
        )
    }

    #[tokio::test]
    async fn test_classify_success() {
        let c = classifier(Ok(Some(r#"{"category":"Databases"}"#.into())));
        assert_eq!(c.classify("Airtable").await.unwrap(), "Databases");
    }

    #[tokio::test]
    async fn test_classify_failures() {
        let c = classifier(Err(LlmError::network_error("down".into())));
        assert!(matches!(
            c.classify("Airtable").await,
            Err(ClassifyError::Request(_))
        ));

        let c = classifier(Ok(None));
        assert!(matches!(
            c.classify("Airtable").await,
            Err(ClassifyError::Schema(_))
        ));
    }
}
