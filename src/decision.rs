use std::path::Path;
use anyhow::Result;
use colored::*;
use dialoguer::{theme::ColorfulTheme, Confirm, Select};

use crate::knowledge::Category;

/// Operator's answer to a categorization request. The token may have been
/// narrowed from the original document type before being learned.
#[derive(Debug, Clone)]
pub struct CategoryChoice {
    pub category: String,
    pub token: String,
}

/// Synchronous decision boundary between the core and the operator.
///
/// The sorter only ever needs three answers; anything implementing this
/// trait (a terminal, a scripted test double) can drive a session.
pub trait Decisions {
    /// Pick a category for an unrecognized document type.
    fn choose_category(
        &mut self,
        filename: &str,
        doc_type: &str,
        candidates: &[Category],
    ) -> Result<CategoryChoice>;

    /// The computed target path already exists; overwrite it?
    fn confirm_overwrite(&mut self, target: &Path) -> Result<bool>;

    /// A sync-readiness check timed out; process the file anyway?
    fn proceed_unsynced(&mut self, file: &Path) -> Result<bool>;
}

/// Live terminal implementation backed by dialoguer prompts.
pub struct TerminalDecisions;

impl Decisions for TerminalDecisions {
    fn choose_category(
        &mut self,
        filename: &str,
        doc_type: &str,
        candidates: &[Category],
    ) -> Result<CategoryChoice> {
        let theme = ColorfulTheme::default();

        println!();
        println!("{} Need help categorizing: {}", "📄".cyan(), filename.bold());
        println!("   Document type appears to be: {}", doc_type.bold());

        // Multi-word tokens often carry a personal name; let the operator
        // narrow the learned token down to the actual document type
        let mut token = doc_type.to_string();
        let words: Vec<&str> = doc_type.split_whitespace().collect();
        if words.len() > 1 {
            let has_name = Confirm::with_theme(&theme)
                .with_prompt("This name contains multiple words. Is any part a personal name?")
                .default(false)
                .interact()?;

            if has_name {
                let idx = Select::with_theme(&theme)
                    .with_prompt("Select the actual document type (excluding personal names)")
                    .items(&words)
                    .default(0)
                    .interact()?;
                token = words[idx].to_string();
            }
        }

        let labels: Vec<String> = candidates
            .iter()
            .map(|category| {
                if category.document_types.is_empty() {
                    category.name.clone()
                } else {
                    format!("{} ({})", category.name, category.document_types.join(", "))
                }
            })
            .collect();

        let idx = Select::with_theme(&theme)
            .with_prompt("Choose a category")
            .items(&labels)
            .default(0)
            .interact()?;

        Ok(CategoryChoice {
            category: candidates[idx].name.clone(),
            token,
        })
    }

    fn confirm_overwrite(&mut self, target: &Path) -> Result<bool> {
        println!();
        println!("{} File already exists: {}", "⚠️".yellow(), target.display());

        let overwrite = Confirm::with_theme(&ColorfulTheme::default())
            .with_prompt("Overwrite?")
            .default(false)
            .interact()?;

        Ok(overwrite)
    }

    fn proceed_unsynced(&mut self, file: &Path) -> Result<bool> {
        println!();
        println!("{} {} may not be fully synced", "☁️".yellow(), file.display());

        let proceed = Confirm::with_theme(&ColorfulTheme::default())
            .with_prompt("Process anyway?")
            .default(false)
            .interact()?;

        Ok(proceed)
    }
}
