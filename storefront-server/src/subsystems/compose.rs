//! Response composer: turns ranked hits into the assistant's reply text.
//!
//! The wording comes from a `TextGenerator` so a generative model can replace
//! the fixed templates later without touching the search path.

use async_trait::async_trait;
use storefront_core::{RankedResult, SearchOutcome};

/// Reply returned whenever the search path fails.
pub const APOLOGY_REPLY: &str = "I'm sorry, I'm having trouble processing your request right now.";

#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Reply text for `query` given the ranked hits, best first.
    async fn generate(&self, query: &str, results: &[RankedResult]) -> String;

    fn name(&self) -> &str;
}

/// Fixed-template generator.
#[derive(Debug, Clone, Copy, Default)]
pub struct TemplateGenerator;

#[async_trait]
impl TextGenerator for TemplateGenerator {
    async fn generate(&self, query: &str, results: &[RankedResult]) -> String {
        match results.first() {
            Some(top) => format!(
                "I found a few items for you based on '{}', including {}.",
                query, top.title
            ),
            None => format!(
                "I couldn't find any products matching '{}', but I'm here to help you find other items!",
                query
            ),
        }
    }

    fn name(&self) -> &str {
        "template"
    }
}

/// Attach reply text to the results.
pub async fn compose(
    generator: &dyn TextGenerator,
    query: &str,
    results: Vec<RankedResult>,
) -> SearchOutcome {
    let reply_text = generator.generate(query, &results).await;
    SearchOutcome {
        reply_text,
        results,
    }
}

pub fn apology() -> SearchOutcome {
    SearchOutcome {
        reply_text: APOLOGY_REPLY.to_string(),
        results: Vec::new(),
    }
}
