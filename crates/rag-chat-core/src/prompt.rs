//! The fixed RAG prompt template.

use crate::models::ScoredChunk;

/// Instruction template with `{context}` and `{question}` slots.
pub const RAG_PROMPT_TEMPLATE: &str = "You are a helpful AI assistant. Use the following pieces of context to answer the question at the end.
If you don't know the answer based on the context, just say that you don't know, don't try to make up an answer.
Always cite the source documents when providing information from them.

Context:
{context}

Question: {question}

Helpful Answer:";

/// Assemble the prompt for `question` from retrieved chunks, in rank order.
pub fn build_prompt(question: &str, context: &[ScoredChunk]) -> String {
    let context = context
        .iter()
        .map(|c| c.chunk.text.as_str())
        .collect::<Vec<_>>()
        .join("\n\n");
    render(
        RAG_PROMPT_TEMPLATE,
        &[("{context}", context.as_str()), ("{question}", question)],
    )
}

/// Single-pass slot substitution; substituted values are never rescanned.
fn render(template: &str, slots: &[(&str, &str)]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(start) = rest.find('{') {
        out.push_str(&rest[..start]);
        let tail = &rest[start..];
        match slots.iter().find(|(name, _)| tail.starts_with(*name)) {
            Some((name, value)) => {
                out.push_str(value);
                rest = &tail[name.len()..];
            }
            None => {
                out.push('{');
                rest = &tail[1..];
            }
        }
    }
    out.push_str(rest);
    out
}
