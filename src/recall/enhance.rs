//! Prompt enhancement: interleaving recalled facts with the prompt.
//!
//! The composition is a structured interleave: a header section listing
//! recalled facts in ranked order, type-tagged, followed by the original
//! prompt verbatim. Pure and deterministic; empty recall passes the
//! prompt through unchanged.

use crate::models::Memory;
use std::fmt::Write as _;

/// Composes the enhanced prompt from ranked memories and the caller's
/// prompt. The caller has already capped the memory list.
#[must_use]
pub fn compose_enhanced_prompt(prompt: &str, memories: &[Memory]) -> String {
    if memories.is_empty() {
        return prompt.to_string();
    }

    let mut out = String::from("## Relevant memories\n\n");
    for (position, memory) in memories.iter().enumerate() {
        let _ = writeln!(
            out,
            "{}. [{}] {}",
            position + 1,
            memory.memory_type,
            memory.content
        );
    }
    out.push('\n');
    out.push_str(prompt);
    out
}
