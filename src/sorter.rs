use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use anyhow::{Context, Result};
use colored::*;
use fs_extra::file::{move_file, CopyOptions};
use indicatif::{ProgressBar, ProgressStyle};
use regex::Regex;
use walkdir::{DirEntry, WalkDir};

use crate::cloud::CloudProvider;
use crate::colors;
use crate::decision::Decisions;
use crate::knowledge::KnowledgeBase;
use crate::resolver;
use crate::DOCUMENT_EXTENSIONS;

/// How long to wait for a cloud file to stop changing size.
const SYNC_TIMEOUT: Duration = Duration::from_secs(30);
/// Consecutive identical size samples before a file counts as stable.
const SYNC_STABLE_CHECKS: u32 = 3;
/// Settle delay after a move on cloud storage, before verification.
const CLOUD_SETTLE: Duration = Duration::from_secs(2);
/// Post-move verification attempts on cloud storage.
const CLOUD_VERIFY_ATTEMPTS: u32 = 5;

/// Time source for the readiness and verification polls.
pub trait Clock {
    fn now(&self) -> Instant;
    fn sleep(&mut self, duration: Duration);
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn sleep(&mut self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// Terminal state of a single file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOutcome {
    Moved,
    Skipped,
    Failed,
    /// The move was issued but could not be verified in time; on cloud
    /// storage this usually means a sync delay, not a lost file.
    Unverified,
}

/// One successfully relocated file.
#[derive(Debug)]
pub struct SortedFile {
    pub category: String,
    pub year: Option<String>,
    pub filename: String,
}

/// Accumulated results of a sorting session.
#[derive(Debug, Default)]
pub struct SortReport {
    pub entries: Vec<SortedFile>,
    pub moved: usize,
    pub skipped: usize,
    pub failed: usize,
    pub unverified: usize,
}

impl SortReport {
    fn record(&mut self, category: &str, year: Option<&str>, filename: &str) {
        self.entries.push(SortedFile {
            category: category.to_string(),
            year: year.map(str::to_string),
            filename: filename.to_string(),
        });
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Category → year-prefixed filenames, in first-moved order.
    /// Files without a year appear bare.
    pub fn by_category(&self) -> Vec<(String, Vec<String>)> {
        let mut grouped: Vec<(String, Vec<String>)> = Vec::new();
        for entry in &self.entries {
            let formatted = match &entry.year {
                Some(year) => format!("{}/{}", year, entry.filename),
                None => entry.filename.clone(),
            };
            match grouped.iter_mut().find(|(name, _)| name == &entry.category) {
                Some((_, files)) => files.push(formatted),
                None => grouped.push((entry.category.clone(), vec![formatted])),
            }
        }
        grouped
    }
}

/// Moves discovered files into category (and year) folders, learning new
/// document types through the decision provider as it goes.
pub struct Sorter<D: Decisions, C: Clock> {
    root: PathBuf,
    provider: Option<CloudProvider>,
    knowledge: KnowledgeBase,
    decisions: D,
    clock: C,
    verbose: bool,
    date_segment_re: Regex,
    year_re: Regex,
    leading_date_re: Regex,
}

impl<D: Decisions, C: Clock> Sorter<D, C> {
    pub fn new(
        root: PathBuf,
        provider: Option<CloudProvider>,
        knowledge: KnowledgeBase,
        decisions: D,
        clock: C,
        verbose: bool,
    ) -> Self {
        Self {
            root,
            provider,
            knowledge,
            decisions,
            clock,
            verbose,
            date_segment_re: Regex::new(r"^\d{8}$").expect("Invalid date segment regex"),
            year_re: Regex::new(r"20\d{2}").expect("Invalid year regex"),
            leading_date_re: Regex::new(r"^(\d{4})(\d{2})(\d{2})[_-](.+)$")
                .expect("Invalid leading date regex"),
        }
    }

    /// Process every discovered file and return the session report.
    ///
    /// An unreadable source root aborts the session with an empty report;
    /// any single file's failure only affects that file.
    pub fn sort(&mut self) -> Result<SortReport> {
        let mut report = SortReport::default();

        let files = match self.discover() {
            Ok(files) => files,
            Err(e) => {
                eprintln!("{} {:#}", "❌".red(), e);
                eprintln!("   Please check your permissions for this folder");
                return Ok(report);
            }
        };

        if files.is_empty() {
            println!("No files found in the directory.");
            return Ok(report);
        }

        if let Some(provider) = self.provider {
            println!(
                "{} Working with {} folder. Files may take longer to process.",
                "☁️".cyan(),
                provider.name()
            );
        }

        let pb = ProgressBar::new(files.len() as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} files {msg}")?
                .progress_chars("#>-"),
        );

        for file in files {
            pb.inc(1);
            match self.place_file(&file, &mut report) {
                SortOutcome::Moved => {
                    report.moved += 1;
                    pb.set_message("Moved");
                }
                SortOutcome::Skipped => {
                    report.skipped += 1;
                    pb.set_message("Skipped");
                }
                SortOutcome::Failed => {
                    report.failed += 1;
                    pb.set_message("Failed");
                }
                SortOutcome::Unverified => {
                    report.unverified += 1;
                    pb.set_message("Unverified");
                }
            }
        }

        pb.finish_and_clear();
        Ok(report)
    }

    /// Recursively collect sortable files, pruning year folders.
    fn discover(&self) -> Result<Vec<PathBuf>> {
        // Fail fast when the root itself is unreadable; everything deeper
        // is handled per entry
        fs::read_dir(&self.root)
            .with_context(|| format!("Cannot access {}", self.root.display()))?;

        let mut files = Vec::new();
        let walker = WalkDir::new(&self.root)
            .follow_links(false)
            .into_iter()
            .filter_entry(|entry| !is_year_folder(entry));

        for entry in walker.filter_map(|e| e.ok()) {
            if !entry.file_type().is_file() {
                continue;
            }

            let extension = entry
                .path()
                .extension()
                .and_then(|ext| ext.to_str())
                .unwrap_or("")
                .to_lowercase();

            if DOCUMENT_EXTENSIONS.contains(&extension.as_str()) {
                files.push(entry.path().to_path_buf());
            }
        }

        Ok(files)
    }

    fn place_file(&mut self, file: &Path, report: &mut SortReport) -> SortOutcome {
        match self.try_place(file, report) {
            Ok(outcome) => outcome,
            Err(e) => {
                eprintln!();
                eprintln!("{} ERROR moving {}: {:#}", "❌".red(), file.display(), e);
                if self.provider.is_some() {
                    eprintln!("   This might be due to cloud sync issues. Please try again in a few moments.");
                }
                SortOutcome::Failed
            }
        }
    }

    fn try_place(&mut self, file: &Path, report: &mut SortReport) -> Result<SortOutcome> {
        let filename = file
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        if !self.is_cloud_file_ready(file)? {
            println!("Skipping {} - not ready for processing", filename);
            return Ok(SortOutcome::Skipped);
        }

        let doc_type = self.extract_document_type(&filename);
        let category = resolver::resolve(
            &mut self.knowledge,
            &mut self.decisions,
            &filename,
            &doc_type,
        )?;

        let category_dir = self.root.join(&category);
        fs::create_dir_all(&category_dir)
            .with_context(|| format!("Cannot create folder {}", category))?;

        let year = self.extract_year(&filename);
        let target_dir = match &year {
            Some(year) => match self.ensure_year_folder(&category_dir, year) {
                Some(dir) => dir,
                None => category_dir.clone(),
            },
            None => category_dir.clone(),
        };

        let formatted = self.format_filename(&filename);
        if self.verbose && formatted != filename {
            println!("  Renaming: {} → {}", filename, formatted);
        }
        let target_path = target_dir.join(&formatted);

        // Already where it belongs, nothing to do
        if target_path == file {
            return Ok(SortOutcome::Skipped);
        }

        if target_path.exists() && !self.decisions.confirm_overwrite(&target_path)? {
            println!("  Skipped: {}", filename);
            return Ok(SortOutcome::Skipped);
        }

        if self.verbose {
            println!("  From: {}", file.display());
            println!("  To:   {}", target_path.display());
        }

        let mut options = CopyOptions::new();
        options.overwrite = true;
        move_file(file, &target_path, &options)
            .with_context(|| format!("Failed to move {}", filename))?;

        if self.verify_move(file, &target_path) {
            let final_name = target_path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or(formatted);
            report.record(&category, year.as_deref(), &final_name);

            if self.verbose {
                println!(
                    "  {} Moved to: {}",
                    "✅".green(),
                    target_path.display().to_string().color(colors::PATH)
                );
            }
            Ok(SortOutcome::Moved)
        } else {
            println!();
            println!(
                "{} Could not verify the move of {}",
                "⚠️".yellow(),
                filename
            );
            if self.provider.is_some() {
                println!("   This might be a sync delay. Please check the folders manually.");
            }
            Ok(SortOutcome::Unverified)
        }
    }

    /// Cloud files must exist, have content, and hold a stable size before
    /// they are touched; a timed-out poll defers to the operator.
    fn is_cloud_file_ready(&mut self, file: &Path) -> Result<bool> {
        if self.provider.is_none() {
            return Ok(true);
        }

        let metadata = match fs::metadata(file) {
            Ok(metadata) => metadata,
            Err(_) => {
                println!();
                println!("Waiting for cloud to sync {}...", file.display());
                return Ok(false);
            }
        };

        if metadata.len() == 0 {
            println!();
            println!("Waiting for {} to download...", file.display());
            return Ok(false);
        }

        if !self.wait_for_stable_size(file) {
            println!();
            println!(
                "{} {} may not be fully synced",
                "⚠️".yellow(),
                file.display()
            );
            return self.decisions.proceed_unsynced(file);
        }

        Ok(true)
    }

    /// Poll the file size once a second until it holds still for
    /// `SYNC_STABLE_CHECKS` samples or `SYNC_TIMEOUT` passes.
    fn wait_for_stable_size(&mut self, file: &Path) -> bool {
        let start = self.clock.now();
        let mut last_size = None;
        let mut stable = 0;

        while self.clock.now().duration_since(start) < SYNC_TIMEOUT {
            if let Ok(metadata) = fs::metadata(file) {
                let size = metadata.len();
                if Some(size) == last_size {
                    stable += 1;
                    if stable >= SYNC_STABLE_CHECKS {
                        return true;
                    }
                } else {
                    stable = 0;
                }
                last_size = Some(size);
            }
            self.clock.sleep(Duration::from_secs(1));
        }

        false
    }

    /// Confirm the source is gone and the target exists. Cloud storage gets
    /// a settle delay, a listing refresh, and bounded retries.
    fn verify_move(&mut self, source: &Path, target: &Path) -> bool {
        let attempts = if self.provider.is_some() {
            self.clock.sleep(CLOUD_SETTLE);
            // Nudge the sync client into refreshing its view
            let _ = fs::read_dir(&self.root).map(|entries| entries.count());
            if let Some(parent) = target.parent() {
                let _ = fs::read_dir(parent).map(|entries| entries.count());
            }
            CLOUD_VERIFY_ATTEMPTS
        } else {
            1
        };

        for attempt in 0..attempts {
            if attempt > 0 {
                self.clock.sleep(Duration::from_secs(1));
            }
            if target.exists() && !source.exists() {
                return true;
            }
        }

        false
    }

    /// Derive the document type from a filename: drop the extension, split
    /// on separators, discard 8-digit date segments, rejoin with spaces.
    pub fn extract_document_type(&self, filename: &str) -> String {
        let stem = Path::new(filename)
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();

        stem.split(|c: char| c == '_' || c == '-' || c.is_whitespace())
            .filter(|part| !part.is_empty())
            .filter(|part| !self.date_segment_re.is_match(part))
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// First 4-digit year starting with 20, anywhere in the filename.
    pub fn extract_year(&self, filename: &str) -> Option<String> {
        self.year_re
            .find(filename)
            .map(|m| m.as_str().to_string())
    }

    /// Reformat a leading `YYYYMMDD` date (followed by `_` or `-`) into
    /// `YYYY-MM-DD ` plus the remainder. Other names pass through unchanged.
    pub fn format_filename(&self, filename: &str) -> String {
        let path = Path::new(filename);
        let stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let extension = path
            .extension()
            .map(|e| format!(".{}", e.to_string_lossy()))
            .unwrap_or_default();

        match self.leading_date_re.captures(&stem) {
            Some(caps) => format!(
                "{}-{}-{} {}{}",
                &caps[1], &caps[2], &caps[3], &caps[4], extension
            ),
            None => filename.to_string(),
        }
    }

    fn ensure_year_folder(&self, category_dir: &Path, year: &str) -> Option<PathBuf> {
        let year_dir = category_dir.join(year);
        match fs::create_dir_all(&year_dir) {
            Ok(_) => Some(year_dir),
            Err(e) => {
                eprintln!("{} Error creating year folder {}: {}", "⚠️".yellow(), year, e);
                None
            }
        }
    }
}

fn is_year_folder(entry: &DirEntry) -> bool {
    entry.file_type().is_dir()
        && entry
            .file_name()
            .to_str()
            .map_or(false, |name| name.len() == 4 && name.chars().all(|c| c.is_ascii_digit()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decision::testing::ScriptedDecisions;
    use tempfile::TempDir;

    struct FakeClock {
        start: Instant,
        advanced: Duration,
    }

    impl FakeClock {
        fn new() -> Self {
            Self {
                start: Instant::now(),
                advanced: Duration::ZERO,
            }
        }
    }

    impl Clock for FakeClock {
        fn now(&self) -> Instant {
            self.start + self.advanced
        }

        fn sleep(&mut self, duration: Duration) {
            self.advanced += duration;
        }
    }

    fn sorter_in(
        dir: &TempDir,
        provider: Option<CloudProvider>,
        decisions: ScriptedDecisions,
    ) -> Sorter<ScriptedDecisions, FakeClock> {
        let mut kb = KnowledgeBase::load(dir.path().join(".docsort_knowledge.json"));
        kb.ensure_defaults().unwrap();
        Sorter::new(
            dir.path().to_path_buf(),
            provider,
            kb,
            decisions,
            FakeClock::new(),
            false,
        )
    }

    fn write_file(path: &Path, content: &[u8]) {
        fs::write(path, content).unwrap();
    }

    #[test]
    fn document_type_drops_dates_and_separators() {
        let dir = TempDir::new().unwrap();
        let sorter = sorter_in(&dir, None, ScriptedDecisions::new());

        assert_eq!(
            sorter.extract_document_type("20230401_Invoice_Smith.pdf"),
            "Invoice Smith"
        );
        assert_eq!(sorter.extract_document_type("Vertrag-Miete.pdf"), "Vertrag Miete");
        assert_eq!(sorter.extract_document_type("scan.pdf"), "scan");
    }

    #[test]
    fn year_is_first_20xx_match() {
        let dir = TempDir::new().unwrap();
        let sorter = sorter_in(&dir, None, ScriptedDecisions::new());

        assert_eq!(
            sorter.extract_year("20230401_Invoice_Smith.pdf"),
            Some("2023".to_string())
        );
        assert_eq!(
            sorter.extract_year("Rechnung_2019.pdf"),
            Some("2019".to_string())
        );
        assert_eq!(sorter.extract_year("Rechnung_1999.pdf"), None);
        assert_eq!(sorter.extract_year("Brief.pdf"), None);
    }

    #[test]
    fn leading_date_is_reformatted() {
        let dir = TempDir::new().unwrap();
        let sorter = sorter_in(&dir, None, ScriptedDecisions::new());

        assert_eq!(
            sorter.format_filename("20230401_Invoice.pdf"),
            "2023-04-01 Invoice.pdf"
        );
        assert_eq!(
            sorter.format_filename("20230401-Invoice.pdf"),
            "2023-04-01 Invoice.pdf"
        );
        assert_eq!(sorter.format_filename("Invoice_2023.pdf"), "Invoice_2023.pdf");
        assert_eq!(sorter.format_filename("20230401.pdf"), "20230401.pdf");
    }

    #[test]
    fn discovery_prunes_year_folders_and_foreign_extensions() {
        let dir = TempDir::new().unwrap();
        fs::create_dir(dir.path().join("2023")).unwrap();
        write_file(&dir.path().join("2023").join("sorted.pdf"), b"x");
        write_file(&dir.path().join("keep.pdf"), b"x");
        write_file(&dir.path().join("photo.JPG"), b"x");
        write_file(&dir.path().join("notes.txt"), b"x");

        let sorter = sorter_in(&dir, None, ScriptedDecisions::new());
        let mut found: Vec<String> = sorter
            .discover()
            .unwrap()
            .into_iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        found.sort();

        assert_eq!(found, vec!["keep.pdf", "photo.JPG"]);
    }

    #[test]
    fn known_token_moves_into_year_subfolder() {
        let dir = TempDir::new().unwrap();
        write_file(&dir.path().join("20230401_Rechnung.pdf"), b"pdf");

        let mut sorter = sorter_in(&dir, None, ScriptedDecisions::new());
        let report = sorter.sort().unwrap();

        assert_eq!(report.moved, 1);
        assert!(dir
            .path()
            .join("04 Rechnung")
            .join("2023")
            .join("2023-04-01 Rechnung.pdf")
            .exists());

        let grouped = report.by_category();
        assert_eq!(grouped.len(), 1);
        assert_eq!(grouped[0].0, "04 Rechnung");
        assert_eq!(grouped[0].1, vec!["2023/2023-04-01 Rechnung.pdf".to_string()]);
    }

    #[test]
    fn file_without_year_lands_directly_in_category() {
        let dir = TempDir::new().unwrap();
        write_file(&dir.path().join("Quittung_Siemens.pdf"), b"pdf");

        let mut sorter = sorter_in(&dir, None, ScriptedDecisions::new());
        let report = sorter.sort().unwrap();

        assert_eq!(report.moved, 1);
        assert!(dir
            .path()
            .join("04 Rechnung")
            .join("Quittung_Siemens.pdf")
            .exists());

        // Distinct no-year grouping: the entry carries no year prefix
        assert_eq!(report.entries[0].year, None);
        assert_eq!(
            report.by_category()[0].1,
            vec!["Quittung_Siemens.pdf".to_string()]
        );
    }

    #[test]
    fn declined_overwrite_leaves_source_untouched() {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("Rechnung.pdf");
        write_file(&source, b"new");

        let target_dir = dir.path().join("04 Rechnung");
        fs::create_dir(&target_dir).unwrap();
        write_file(&target_dir.join("Rechnung.pdf"), b"old");

        let mut decisions = ScriptedDecisions::new();
        decisions.overwrite = false;
        let mut sorter = sorter_in(&dir, None, decisions);
        let report = sorter.sort().unwrap();

        assert_eq!(report.moved, 0);
        // The source (declined) and the already-placed target both skip
        assert_eq!(report.skipped, 2);
        assert!(source.exists());
        assert_eq!(fs::read(target_dir.join("Rechnung.pdf")).unwrap(), b"old");
        assert!(report.is_empty());
    }

    #[test]
    fn confirmed_overwrite_replaces_target() {
        let dir = TempDir::new().unwrap();
        write_file(&dir.path().join("Rechnung.pdf"), b"new");

        let target_dir = dir.path().join("04 Rechnung");
        fs::create_dir(&target_dir).unwrap();
        write_file(&target_dir.join("Rechnung.pdf"), b"old");

        let mut decisions = ScriptedDecisions::new();
        decisions.overwrite = true;
        let mut sorter = sorter_in(&dir, None, decisions);
        let report = sorter.sort().unwrap();

        assert_eq!(report.moved, 1);
        assert_eq!(fs::read(target_dir.join("Rechnung.pdf")).unwrap(), b"new");
    }

    #[test]
    fn unknown_document_type_is_learned_through_escalation() {
        let dir = TempDir::new().unwrap();
        write_file(&dir.path().join("Zeugnis.pdf"), b"pdf");

        let mut sorter = sorter_in(&dir, None, ScriptedDecisions::choosing("05 Information"));
        let report = sorter.sort().unwrap();

        assert_eq!(report.moved, 1);
        assert!(dir
            .path()
            .join("05 Information")
            .join("Zeugnis.pdf")
            .exists());
        assert_eq!(sorter.decisions.category_requests, 1);
        assert!(sorter.knowledge.get("05 Information").unwrap().knows_token("zeugnis"));
    }

    #[test]
    fn already_placed_file_is_skipped_without_prompts() {
        let dir = TempDir::new().unwrap();
        let category_dir = dir.path().join("04 Rechnung");
        fs::create_dir(&category_dir).unwrap();
        write_file(&category_dir.join("Rechnung.pdf"), b"pdf");

        // ScriptedDecisions::new() panics on a category request, so this
        // also proves no prompt is issued
        let mut sorter = sorter_in(&dir, None, ScriptedDecisions::new());
        let report = sorter.sort().unwrap();

        assert_eq!(report.moved, 0);
        assert_eq!(report.skipped, 1);
        assert!(category_dir.join("Rechnung.pdf").exists());
    }

    #[test]
    fn empty_cloud_file_is_skipped_as_unsynced() {
        let dir = TempDir::new().unwrap();
        write_file(&dir.path().join("Rechnung.pdf"), b"");

        let mut sorter = sorter_in(&dir, Some(CloudProvider::Dropbox), ScriptedDecisions::new());
        let report = sorter.sort().unwrap();

        assert_eq!(report.moved, 0);
        assert_eq!(report.skipped, 1);
        assert!(dir.path().join("Rechnung.pdf").exists());
    }

    #[test]
    fn stable_cloud_file_is_moved_and_verified() {
        let dir = TempDir::new().unwrap();
        write_file(&dir.path().join("20230401_Rechnung.pdf"), b"pdf");

        let mut sorter = sorter_in(&dir, Some(CloudProvider::Dropbox), ScriptedDecisions::new());
        let report = sorter.sort().unwrap();

        assert_eq!(report.moved, 1);
        assert!(dir
            .path()
            .join("04 Rechnung")
            .join("2023")
            .join("2023-04-01 Rechnung.pdf")
            .exists());
        // The stability poll and settle delay ran against the fake clock
        assert!(sorter.clock.advanced >= Duration::from_secs(3));
    }

    #[test]
    fn unreadable_root_yields_empty_report() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("does-not-exist");

        let kb = KnowledgeBase::load(dir.path().join(".docsort_knowledge.json"));
        let mut sorter = Sorter::new(
            missing,
            None,
            kb,
            ScriptedDecisions::new(),
            FakeClock::new(),
            false,
        );
        let report = sorter.sort().unwrap();

        assert!(report.is_empty());
        assert_eq!(report.moved + report.skipped + report.failed, 0);
    }
}
