//! Per-request query pipeline.
//!
//! Each chat request walks the same path: take the last conversation
//! message as the query, obtain the ready knowledge base (building it on a
//! cold start), embed the query, rank the chunks, assemble a grounded
//! system instruction, and hand the full message history to the generation
//! provider. The returned delta stream is relayed to the caller untouched.
//!
//! Any failure before streaming begins is returned as an error; once the
//! stream is handed over, errors travel inside it.

use anyhow::{bail, Result};
use std::sync::Arc;

use crate::config::Config;
use crate::corpus::load_corpus;
use crate::embedding::{EmbeddingProvider, OpenAIEmbeddings};
use crate::generation::{DeltaStream, GenerationProvider, Message, OpenAIGeneration};
use crate::knowledge::KnowledgeCache;
use crate::rank::rank;

/// Separator placed between selected chunk contents in the prompt.
pub const CONTEXT_SEPARATOR: &str = "\n\n---\n\n";

/// Orchestrates retrieval and generation for chat requests.
pub struct ChatPipeline {
    knowledge: Arc<KnowledgeCache>,
    embedding: Arc<dyn EmbeddingProvider>,
    generation: Arc<dyn GenerationProvider>,
    top_k: usize,
    extra_instructions: Option<String>,
}

impl ChatPipeline {
    pub fn new(
        knowledge: Arc<KnowledgeCache>,
        embedding: Arc<dyn EmbeddingProvider>,
        generation: Arc<dyn GenerationProvider>,
        top_k: usize,
        extra_instructions: Option<String>,
    ) -> Self {
        Self {
            knowledge,
            embedding,
            generation,
            top_k,
            extra_instructions,
        }
    }

    /// Wire the production providers from configuration.
    ///
    /// Loads the corpus and constructs the OpenAI embedding and generation
    /// clients, so a missing credential fails here rather than on the
    /// first request.
    pub fn from_config(config: &Config) -> Result<Self> {
        let corpus = Arc::new(load_corpus(&config.corpus.path)?);
        let embedding: Arc<dyn EmbeddingProvider> =
            Arc::new(OpenAIEmbeddings::new(&config.embedding)?);
        let generation: Arc<dyn GenerationProvider> =
            Arc::new(OpenAIGeneration::new(&config.generation)?);
        let extra = corpus.system_instructions.clone();
        let knowledge = Arc::new(KnowledgeCache::new(corpus, embedding.clone()));

        Ok(Self::new(
            knowledge,
            embedding,
            generation,
            config.retrieval.top_k,
            extra,
        ))
    }

    /// Run the pipeline for one conversation and return the delta stream.
    ///
    /// The last message is taken as the query regardless of its role; the
    /// role-validation policy is intentionally left to callers.
    pub async fn chat(&self, messages: &[Message]) -> Result<DeltaStream> {
        let Some(query) = messages.last() else {
            bail!("Conversation is empty");
        };

        let kb = self.knowledge.get().await?;
        let query_vector = self.embedding.embed_one(&query.content).await?;

        // Zero and negative scores carry no signal (a degenerate query
        // embedding scores everything 0.0); such chunks are excluded so the
        // context stays empty rather than arbitrary.
        let ranked = rank(&query_vector, &kb.chunks, self.top_k);
        let context = ranked
            .iter()
            .filter(|r| r.score > 0.0)
            .map(|r| r.chunk.chunk.content.as_str())
            .collect::<Vec<_>>()
            .join(CONTEXT_SEPARATOR);

        let system = assemble_system_instruction(&context, self.extra_instructions.as_deref());

        let mut history = Vec::with_capacity(messages.len() + 1);
        history.push(Message::new("system", system));
        history.extend_from_slice(messages);

        self.generation.stream(&history).await
    }
}

/// Build the grounding system instruction around the selected context.
///
/// An empty context is passed through as-is; the closing instruction
/// already obligates the model to admit it does not know.
fn assemble_system_instruction(context: &str, extra: Option<&str>) -> String {
    let mut prompt = format!(
        "You are an assistant that answers questions about the person described in the context below.\n\n\
         Context:\n{}\n\n\
         Formatting rules:\n\
         - Render every link as Markdown, [label](url).\n\
         - Never include a raw URL in the answer text.\n\n\
         Answer using only the context above. If the context does not contain \
         the answer, say that you do not know.",
        context
    );

    if let Some(extra) = extra {
        prompt.push_str("\n\n");
        prompt.push_str(extra);
    }

    prompt
}
