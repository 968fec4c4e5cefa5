use anyhow::Result;

use crate::decision::Decisions;
use crate::knowledge::KnowledgeBase;

/// Suggest a category for a document type from learned tokens.
///
/// A candidate matches a known token when either contains the other,
/// case-insensitively. The first matching category in insertion order wins;
/// no longest-match tie-break is attempted.
pub fn suggest<'a>(kb: &'a KnowledgeBase, doc_type: &str) -> Option<&'a str> {
    if kb.is_empty() {
        return None;
    }

    let candidate = doc_type.to_lowercase();

    for category in kb.categories() {
        for known in &category.document_types {
            let known = known.to_lowercase();
            if candidate.contains(&known) || known.contains(&candidate) {
                return Some(category.name.as_str());
            }
        }
    }

    None
}

/// Resolve a document type to a category, escalating to the decision
/// provider when nothing matches. A confirmed choice is learned immediately.
pub fn resolve(
    kb: &mut KnowledgeBase,
    decisions: &mut dyn Decisions,
    filename: &str,
    doc_type: &str,
) -> Result<String> {
    if let Some(category) = suggest(kb, doc_type) {
        return Ok(category.to_string());
    }

    let choice = decisions.choose_category(filename, doc_type, kb.categories())?;
    kb.record(&choice.category, &choice.token)?;
    Ok(choice.category)
}
