use std::fs;
use std::path::{Path, PathBuf};
use anyhow::{Context, Result};
use clap::Parser;
use colored::*;
use dialoguer::{theme::ColorfulTheme, Confirm, Input};

use docsort::cli::{Cli, Commands, SortArgs};
use docsort::cloud::CloudProvider;
use docsort::colors;
use docsort::decision::TerminalDecisions;
use docsort::knowledge::KnowledgeBase;
use docsort::reconcile;
use docsort::sorter::{SortReport, Sorter, SystemClock};
use docsort::DOCUMENT_EXTENSIONS;

fn main() -> Result<()> {
    // Parse CLI arguments
    let cli = Cli::parse();

    // Disable colors if requested
    if cli.no_color {
        colored::control::set_override(false);
    }

    match cli.command {
        Commands::ShowHelp => {
            Cli::print_help();
            Ok(())
        }
        Commands::Version => {
            Cli::print_version();
            Ok(())
        }
        Commands::Categories => handle_categories(),
        Commands::Sort(args) => handle_sort(args, cli.verbose),
    }
}

fn handle_sort(args: SortArgs, verbose: bool) -> Result<()> {
    match args.path {
        Some(path) => sort_folder(&path, verbose),
        None => {
            // Interactive session: keep offering folders until the user stops
            loop {
                let path = prompt_for_directory()?;
                sort_folder(&path, verbose)?;

                println!();
                let again = Confirm::with_theme(&ColorfulTheme::default())
                    .with_prompt("Sort another folder?")
                    .default(false)
                    .interact()?;
                if !again {
                    println!("Thank you for using DocSort!");
                    return Ok(());
                }
            }
        }
    }
}

/// Run one full session over a folder: load knowledge, reconcile the
/// folder tree, then place every discovered file.
fn sort_folder(path: &Path, verbose: bool) -> Result<()> {
    let root = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
    let provider = CloudProvider::detect(&root);

    let knowledge_path = KnowledgeBase::locate(provider)
        .context("Failed to locate knowledge file")?;
    let mut knowledge = KnowledgeBase::load(knowledge_path);
    knowledge.ensure_defaults().context("Failed to prepare categories")?;

    match reconcile::sync_folders(&root) {
        Ok(report) => {
            if !report.failed.is_empty() {
                println!(
                    "{} {} item(s) could not be reconciled:",
                    "⚠️".yellow(),
                    report.failed.len()
                );
                for (path, error) in &report.failed {
                    println!("   • {}: {}", path.display(), error);
                }
            }
        }
        Err(e) => {
            eprintln!("{} {:#}", "❌".red(), e);
            eprintln!("   Please check folder permissions and try again.");
            return Ok(());
        }
    }

    let mut sorter = Sorter::new(
        root,
        provider,
        knowledge,
        TerminalDecisions,
        SystemClock,
        verbose,
    );
    let report = sorter.sort()?;

    print_report(&report, provider);
    Ok(())
}

fn handle_categories() -> Result<()> {
    let path = KnowledgeBase::locate(None).context("Failed to locate knowledge file")?;
    let kb = KnowledgeBase::load(path);

    println!("{}", "📚 LEARNED CATEGORIES".bold().color(colors::HEADER));
    println!("{}", "─".repeat(50).color(colors::PATH));

    if kb.is_empty() {
        println!("No categories learned yet. Run {} first.", "docsort sort".bold());
        return Ok(());
    }

    for category in kb.categories() {
        println!();
        println!("{}", category.name.bold().color(colors::SUCCESS));
        if category.document_types.is_empty() {
            println!("  (no document types learned yet)");
        } else {
            println!("  Known types: {}", category.document_types.join(", "));
        }
        println!("  Created: {}", category.created_at.dimmed());
    }

    println!();
    println!(
        "{} Knowledge file: {}",
        "💾".cyan(),
        kb.path().display().to_string().color(colors::PATH)
    );
    Ok(())
}

/// Ask for a directory until a usable one is given.
fn prompt_for_directory() -> Result<PathBuf> {
    let theme = ColorfulTheme::default();

    loop {
        let input: String = Input::with_theme(&theme)
            .with_prompt("Path to your documents folder")
            .interact_text()?;

        let trimmed = input.trim().trim_matches(|c| c == '"' || c == '\'');
        let path = expand_home(trimmed);

        if !path.exists() {
            println!("{} The path '{}' does not exist.", "❌".red(), path.display());
            println!("   If this is a cloud folder, make sure it is synced locally.");
            continue;
        }

        if !path.is_dir() {
            println!("{} '{}' is not a directory.", "❌".red(), path.display());
            continue;
        }

        match contains_documents(&path) {
            Ok(true) => return Ok(path),
            Ok(false) => {
                println!(
                    "{} No supported files found in '{}'",
                    "⚠️".yellow(),
                    path.display()
                );
                let anyway = Confirm::with_theme(&theme)
                    .with_prompt("Continue anyway?")
                    .default(false)
                    .interact()?;
                if anyway {
                    return Ok(path);
                }
            }
            Err(_) => {
                println!("{} Cannot access '{}'", "❌".red(), path.display());
                println!("   Please check your permissions for this folder");
            }
        }
    }
}

fn expand_home(input: &str) -> PathBuf {
    if let Some(rest) = input.strip_prefix('~') {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest.trim_start_matches('/'));
        }
    }
    PathBuf::from(input)
}

/// Top-level check whether a folder holds any sortable documents.
fn contains_documents(path: &Path) -> std::io::Result<bool> {
    for entry in fs::read_dir(path)? {
        let entry = entry?;
        let extension = entry
            .path()
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.to_lowercase());
        if let Some(extension) = extension {
            if DOCUMENT_EXTENSIONS.contains(&extension.as_str()) {
                return Ok(true);
            }
        }
    }
    Ok(false)
}

fn print_report(report: &SortReport, provider: Option<CloudProvider>) {
    println!();
    println!("{}", "📊 SORTING RESULTS".bold().color(colors::HEADER));
    println!("{}", "─".repeat(50).color(colors::PATH));

    if report.is_empty() {
        println!("No files were moved.");
    } else {
        for (category, files) in report.by_category() {
            println!();
            println!("{}:", category.color(colors::SUCCESS));
            for file in files {
                println!("  - {}", file);
            }
        }
    }

    if report.skipped > 0 || report.failed > 0 || report.unverified > 0 {
        println!();
        if report.skipped > 0 {
            println!("{} Skipped: {}", "ℹ️".cyan(), report.skipped);
        }
        if report.failed > 0 {
            println!("{} Failed: {}", "⚠️".yellow(), report.failed);
        }
        if report.unverified > 0 {
            println!(
                "{} Unverified (possibly delayed by sync): {}",
                "☁️".yellow(),
                report.unverified
            );
        }
    }

    if provider.is_some() && !report.is_empty() {
        println!();
        println!("{} Note: cloud sync can delay file operations.", "📝".cyan());
        println!("   You can check the folders manually to confirm the moves completed.");
    }
}
