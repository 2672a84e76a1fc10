//! Prompt templates.
//!
//! Fixed strings with the source text interpolated at the end. The mindmap
//! templates restate the structure limits enforced by
//! [`validate_mindmap`](crate::validation::validate_mindmap) so the model
//! has a fair chance of producing an acceptable tree first time.

use crate::types::OperationKind;
use crate::validation::{MAX_CHILDREN, MAX_DEPTH, MAX_TOTAL_NODES};

const SUMMARY_TEMPLATE: &str = "\
You are an expert at distilling documents. Summarize the text below as \
5 to 10 concise bullet points. Each bullet starts with \"• \" on its own \
line and states one key idea, fact or conclusion. Do not add an \
introduction or closing remarks.

Text:
";

/// Render the prompt for `operation`.
///
/// `strict` selects the tightened mindmap wording used after the model
/// returned unparseable or out-of-bounds output. Summaries have a single
/// wording.
pub fn render(operation: OperationKind, source_text: &str, strict: bool) -> String {
    match operation {
        OperationKind::Summarize => format!("{SUMMARY_TEMPLATE}{source_text}"),
        OperationKind::Mindmap => mindmap_prompt(source_text, strict),
    }
}

fn mindmap_prompt(source_text: &str, strict: bool) -> String {
    let mut prompt = format!(
        "Create a hierarchical mindmap of the text below.\n\
         Respond with strict JSON only: no markdown, no code fences, no commentary.\n\
         The JSON is a single object of the form \
         {{\"title\": \"...\", \"children\": [ ... ]}} where every child has the same shape.\n\
         Rules:\n\
         - every \"title\" is a short non-empty string\n\
         - \"children\" is always an array (use [] for leaves)\n\
         - at most {MAX_DEPTH} levels below the root\n\
         - at most {MAX_CHILDREN} children per node\n\
         - at most {MAX_TOTAL_NODES} nodes in total\n"
    );
    if strict {
        prompt.push_str(
            "Your previous answer was rejected. Output ONLY the JSON object, \
             starting with '{' and ending with '}'. Prefer a shallower, smaller \
             tree (3 levels, a few dozen nodes) over a complete one.\n",
        );
    }
    prompt.push_str("\nText:\n");
    prompt.push_str(source_text);
    prompt
}
