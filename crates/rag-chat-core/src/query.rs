//! Query orchestration: retrieve → assemble prompt → generate.
//!
//! Two modes share retrieval and prompt assembly:
//!
//! - [`QueryEngine::answer`] is blocking and reports failures as
//!   [`RagError`]s.
//! - [`QueryEngine::answer_stream`] returns a lazy [`EventStream`] that
//!   always ends cleanly: either `token* sources done` or a single trailing
//!   `error`. Failures are data on this path, never panics or `Err`s.
//!
//! The event stream owns the provider's token stream. Dropping the event
//! stream (for example because the client disconnected) drops the provider
//! stream with it, so no generation keeps running in the background.

use std::sync::Arc;

use futures::stream::{self, BoxStream, StreamExt};
use tracing::{debug, warn};

use crate::error::RagError;
use crate::generation::{Generator, TokenStream};
use crate::models::{dedup_sources, Answer, ScoredChunk, StreamEvent};
use crate::prompt::build_prompt;
use crate::store::VectorIndex;

/// Number of chunks retrieved per question unless configured otherwise.
pub const DEFAULT_TOP_K: usize = 4;

/// Finite sequence of events for one streamed answer.
pub type EventStream = BoxStream<'static, StreamEvent>;

/// The process-wide orchestration service, shared by HTTP handlers and
/// streaming sessions.
pub struct QueryEngine {
    index: Arc<dyn VectorIndex>,
    generator: Arc<dyn Generator>,
    top_k: usize,
}

impl QueryEngine {
    pub fn new(index: Arc<dyn VectorIndex>, generator: Arc<dyn Generator>, top_k: usize) -> Self {
        Self {
            index,
            generator,
            top_k: top_k.max(1),
        }
    }

    pub fn index(&self) -> &Arc<dyn VectorIndex> {
        &self.index
    }

    pub fn model_name(&self) -> &str {
        self.generator.model_name()
    }

    pub fn top_k(&self) -> usize {
        self.top_k
    }

    /// Answer `question` in one piece.
    pub async fn answer(&self, question: &str) -> Result<Answer, RagError> {
        let context = retrieve(self.index.as_ref(), question, self.top_k).await?;
        let prompt = build_prompt(question, &context);
        let text = self
            .generator
            .generate(&prompt)
            .await
            .map_err(RagError::generation)?;

        Ok(Answer {
            text,
            sources: dedup_sources(context.iter().map(|c| &c.chunk)),
        })
    }

    /// Answer `question` as a lazy event stream.
    ///
    /// Nothing is emitted until retrieval completes. Each call starts a
    /// fresh, independent sequence.
    pub fn answer_stream(&self, question: &str) -> EventStream {
        let start = StreamState::Retrieve {
            index: self.index.clone(),
            generator: self.generator.clone(),
            question: question.to_string(),
            top_k: self.top_k,
        };
        stream::unfold(start, next_event).boxed()
    }
}

async fn retrieve(
    index: &dyn VectorIndex,
    question: &str,
    k: usize,
) -> Result<Vec<ScoredChunk>, RagError> {
    let context = index
        .top_k(question, k)
        .await
        .map_err(RagError::retrieval)?;
    debug!(question = %question, retrieved = context.len(), "context retrieved");
    Ok(context)
}

enum StreamState {
    Retrieve {
        index: Arc<dyn VectorIndex>,
        generator: Arc<dyn Generator>,
        question: String,
        top_k: usize,
    },
    Generating {
        tokens: TokenStream,
        answer: String,
        sources: Vec<String>,
    },
    Complete {
        answer: String,
    },
    Finished,
}

fn failure(err: RagError) -> Option<(StreamEvent, StreamState)> {
    warn!(error = %err, "streamed answer failed");
    Some((StreamEvent::Error(err.to_string()), StreamState::Finished))
}

async fn next_event(mut state: StreamState) -> Option<(StreamEvent, StreamState)> {
    loop {
        match state {
            StreamState::Retrieve {
                index,
                generator,
                question,
                top_k,
            } => {
                let context = match retrieve(index.as_ref(), &question, top_k).await {
                    Ok(context) => context,
                    Err(err) => return failure(err),
                };
                let prompt = build_prompt(&question, &context);
                let tokens = match generator.stream(&prompt).await {
                    Ok(tokens) => tokens,
                    Err(err) => return failure(RagError::generation(err)),
                };
                state = StreamState::Generating {
                    tokens,
                    answer: String::new(),
                    sources: dedup_sources(context.iter().map(|c| &c.chunk)),
                };
            }
            StreamState::Generating {
                mut tokens,
                mut answer,
                sources,
            } => match tokens.next().await {
                Some(Ok(fragment)) if fragment.is_empty() => {
                    state = StreamState::Generating {
                        tokens,
                        answer,
                        sources,
                    };
                }
                Some(Ok(fragment)) => {
                    answer.push_str(&fragment);
                    let next = StreamState::Generating {
                        tokens,
                        answer,
                        sources,
                    };
                    return Some((StreamEvent::Token(fragment), next));
                }
                Some(Err(err)) => return failure(RagError::generation(err)),
                None => {
                    debug!(length = answer.len(), "generation complete");
                    return Some((StreamEvent::Sources(sources), StreamState::Complete { answer }));
                }
            },
            StreamState::Complete { answer } => {
                return Some((StreamEvent::Done(answer), StreamState::Finished));
            }
            StreamState::Finished => return None,
        }
    }
}
