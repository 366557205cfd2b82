//! Prompts for generative summarization
//!
//! Placeholders are substituted with `str::replace`.

/// Batch summarization prompt
///
/// Placeholders:
/// - {tier} - source tier name
/// - {count} - number of memories in the batch
/// - {length_hint} - how long the summary should be
/// - {memories} - one line per memory, oldest first
pub const SUMMARIZE_PROMPT: &str = r#"You are compressing the working memory of an autonomous agent.

The following {count} memories come from the agent's {tier} tier, oldest first.
Each line is formatted as: [timestamp] (category) content

Write a summary that preserves:
- Decisions made and the reasons given
- Mistakes, failures and the lessons drawn from them
- Stated user preferences
- Outcomes of tasks, including unfinished work

Drop greetings, repetition, and routine progress chatter.
{length_hint}

Memories:
{memories}

Respond with ONLY the summary text."#;

/// Length hint for batches without a target ratio
pub const CONCISE_HINT: &str = "Be concise: a short paragraph or a few bullet points.";

/// Length hint template for batches with a target size
///
/// Placeholder: {target_tokens} - approximate token budget
pub const TARGET_HINT: &str =
    "Keep the summary under roughly {target_tokens} tokens; favor the most important facts.";
