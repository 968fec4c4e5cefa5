use std::fs;
use std::path::{Path, PathBuf};
use anyhow::{Context, Result};
use colored::*;

/// Normalized base names mapped to their canonical folder names.
const CANONICAL_FOLDERS: &[(&str, &str)] = &[
    ("antrag", "01 Antrag"),
    ("bescheid", "02 Bescheid"),
    ("vertrag", "03 Vertrag"),
    ("rechnung", "04 Rechnung"),
    ("information", "05 Information"),
];

/// What a reconciliation pass actually did. A second pass over the same
/// tree reports nothing.
#[derive(Debug, Default)]
pub struct ReconcileReport {
    pub created: Vec<String>,
    pub merged: Vec<PathBuf>,
    pub removed: Vec<PathBuf>,
    pub failed: Vec<(PathBuf, String)>,
}

impl ReconcileReport {
    pub fn is_noop(&self) -> bool {
        self.created.is_empty()
            && self.merged.is_empty()
            && self.removed.is_empty()
            && self.failed.is_empty()
    }
}

/// Strip numbering, underscores and casing down to the first word.
/// `"01_Vertrag"`, `"1 vertrag"` and `"Vertrag alt"` all yield `"vertrag"`.
fn base_name(folder_name: &str) -> Option<String> {
    let name = folder_name.to_lowercase().replace('_', " ");
    let name = name.trim_start_matches(|c: char| c.is_ascii_digit() || c.is_whitespace());
    name.split_whitespace().next().map(str::to_string)
}

/// Align the on-disk folder set with the canonical category names: create
/// missing canonical folders, fold name variants into them, and drop the
/// emptied variants. Per-category failures are collected and skipped.
pub fn sync_folders(root: &Path) -> Result<ReconcileReport> {
    let mut report = ReconcileReport::default();

    let mut variants: Vec<(usize, PathBuf)> = Vec::new();
    let entries = fs::read_dir(root)
        .with_context(|| format!("Cannot access {}", root.display()))?;

    for entry in entries.flatten() {
        let path = entry.path();
        if !path.is_dir() {
            continue;
        }
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        let Some(base) = base_name(name) else { continue };
        if let Some(idx) = CANONICAL_FOLDERS.iter().position(|(b, _)| *b == base) {
            variants.push((idx, path));
        }
    }

    for (idx, (_, canonical_name)) in CANONICAL_FOLDERS.iter().enumerate() {
        let target = root.join(canonical_name);

        if !target.exists() {
            match fs::create_dir(&target) {
                Ok(_) => {
                    println!("Created folder: {}", canonical_name.color(crate::colors::PATH));
                    report.created.push(canonical_name.to_string());
                }
                Err(e) => {
                    report.failed.push((target.clone(), e.to_string()));
                    continue;
                }
            }
        }

        for (variant_idx, folder) in &variants {
            if *variant_idx != idx || *folder == target {
                continue;
            }
            merge_into(folder, &target, &mut report);
        }
    }

    Ok(report)
}

/// Move every child of `source` into `target`, renaming on collision, then
/// remove the emptied source folder.
fn merge_into(source: &Path, target: &Path, report: &mut ReconcileReport) {
    let entries = match fs::read_dir(source) {
        Ok(entries) => entries,
        Err(e) => {
            report.failed.push((source.to_path_buf(), e.to_string()));
            return;
        }
    };

    let mut moved_any = false;
    for entry in entries.flatten() {
        let item = entry.path();
        let Some(file_name) = item.file_name().and_then(|n| n.to_str()) else {
            continue;
        };

        let mut dest = target.join(file_name);
        if dest.exists() {
            match collision_free(target, file_name) {
                Some(renamed) => dest = renamed,
                None => {
                    report
                        .failed
                        .push((item.clone(), "too many name collisions".to_string()));
                    continue;
                }
            }
        }

        match fs::rename(&item, &dest) {
            Ok(_) => moved_any = true,
            Err(e) => report.failed.push((item.clone(), e.to_string())),
        }
    }

    if moved_any {
        report.merged.push(source.to_path_buf());
    }

    match fs::remove_dir(source) {
        Ok(_) => {
            println!(
                "Removed old folder: {}",
                source.display().to_string().color(crate::colors::PATH)
            );
            report.removed.push(source.to_path_buf());
        }
        Err(e) => report.failed.push((source.to_path_buf(), e.to_string())),
    }
}

/// First `name_altN.ext` (N = 1..99) not yet present in `dir`.
fn collision_free(dir: &Path, file_name: &str) -> Option<PathBuf> {
    let path = Path::new(file_name);
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| file_name.to_string());
    let extension = path
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default();

    (1..100)
        .map(|n| dir.join(format!("{}_alt{}{}", stem, n, extension)))
        .find(|candidate| !candidate.exists())
}
