//! LLM-backed SQL generation.

pub mod client;
pub mod parse;
pub mod prompt;

use crate::error::Result;
use crate::pipeline::{GeneratedSql, GenerationContext, SqlGenerator};

use client::LlmProvider;

/// [`SqlGenerator`] that prompts a hosted model and extracts the SQL from
/// its reply.
#[derive(Debug, Clone)]
pub struct LlmSqlGenerator {
    provider: LlmProvider,
}

impl LlmSqlGenerator {
    pub fn new(provider: LlmProvider) -> Self {
        Self { provider }
    }

    pub fn provider(&self) -> &LlmProvider {
        &self.provider
    }
}

impl SqlGenerator for LlmSqlGenerator {
    async fn generate(&self, ctx: &GenerationContext<'_>) -> Result<GeneratedSql> {
        let prompt = prompt::sql_generation_prompt(
            ctx.question,
            ctx.schema_text,
            ctx.dialect,
            ctx.default_limit,
        );
        let completion = self.provider.complete(&prompt).await?;
        tracing::debug!(
            "Model response ({} tokens): {}",
            completion.usage.total_tokens,
            completion.text
        );
        let sql = parse::extract_sql(&completion.text)?;
        Ok(GeneratedSql::new(sql, completion.usage))
    }
}
