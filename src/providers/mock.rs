//! Canned generator for running without the remote service.
//!
//! Enabled with `[gemini] mock = true`. Answers instantly, never touches the
//! network and needs no API key. Token counts are estimated from text length
//! so the cost ledger still moves.

use async_trait::async_trait;
use serde_json::json;
use tracing::debug;

use super::traits::{GenerationParams, RemoteGenerator, RemoteOutput};
use crate::Result;

const SUMMARY: &str = "\
• The document introduces its subject and scope.
• It sets out the main argument in the opening sections.
• Supporting evidence follows, grouped by theme.
• Counterpoints are raised and addressed.
• It closes with conclusions and next steps.";

/// Rough token estimate: one token per four characters, at least one.
fn estimate_tokens(text: &str) -> u64 {
    let chars = u64::try_from(text.chars().count()).unwrap_or(u64::MAX);
    chars.div_ceil(4).max(1)
}

/// Generator returning fixed, well-formed output for every prompt.
#[derive(Debug, Clone, Default)]
pub struct MockGenerator;

impl MockGenerator {
    pub fn new() -> Self {
        Self
    }

    fn mindmap() -> String {
        let branch = |title: &str, leaves: &[&str]| {
            let children: Vec<_> = leaves
                .iter()
                .map(|leaf| json!({ "title": leaf, "children": [] }))
                .collect();
            json!({ "title": title, "children": children })
        };
        json!({
            "title": "Document",
            "children": [
                branch("Introduction", &["Scope", "Background"]),
                branch("Main argument", &["Evidence", "Counterpoints"]),
                branch("Conclusion", &["Next steps"]),
            ]
        })
        .to_string()
    }
}

#[async_trait]
impl RemoteGenerator for MockGenerator {
    fn name(&self) -> &str {
        "mock"
    }

    async fn generate(&self, prompt: &str, params: &GenerationParams) -> Result<RemoteOutput> {
        let text = if params.json_output {
            Self::mindmap()
        } else {
            SUMMARY.to_string()
        };
        debug!(json = params.json_output, "returning canned output");
        let tokens_in = estimate_tokens(prompt);
        let tokens_out = estimate_tokens(&text);
        Ok(RemoteOutput::new(text, tokens_in, tokens_out))
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::validation::parse_mindmap;

    fn params(json_output: bool) -> GenerationParams {
        GenerationParams {
            temperature: 0.2,
            max_output_tokens: 1024,
            timeout: Duration::from_secs(20),
            json_output,
        }
    }

    #[tokio::test]
    async fn canned_mindmap_passes_validation() {
        let output = MockGenerator::new()
            .generate("map this", &params(true))
            .await
            .unwrap();
        let root = parse_mindmap(&output.text).unwrap();
        assert_eq!(root.title, "Document");
        assert_eq!(root.children.len(), 3);
    }

    #[tokio::test]
    async fn summary_has_bullets_and_token_estimates() {
        let prompt = "x".repeat(40);
        let output = MockGenerator::new()
            .generate(&prompt, &params(false))
            .await
            .unwrap();
        assert_eq!(output.text.lines().filter(|l| l.starts_with('•')).count(), 5);
        assert_eq!(output.tokens_in, 10);
        assert!(output.tokens_out > 0);
    }

    #[test]
    fn empty_text_still_costs_a_token() {
        assert_eq!(estimate_tokens(""), 1);
        assert_eq!(estimate_tokens("abcde"), 2);
    }
}
