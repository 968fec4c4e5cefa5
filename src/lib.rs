//! DocSort - filename-driven document sorter with learned categories

pub mod cli;
pub mod cloud;
pub mod decision;
pub mod knowledge;
pub mod reconcile;
pub mod resolver;
pub mod sorter;

// Re-exports for easy access
pub use cli::{Cli, Commands};
pub use cloud::CloudProvider;
pub use decision::{CategoryChoice, Decisions, TerminalDecisions};
pub use knowledge::{Category, KnowledgeBase};
pub use reconcile::ReconcileReport;
pub use sorter::{Clock, SortOutcome, SortReport, Sorter, SystemClock};

// Export all constants
pub mod colors {
    use colored::Color;

    pub const SUCCESS: Color = Color::TrueColor { r: 77, g: 255, b: 157 };
    pub const HEADER: Color = Color::TrueColor { r: 157, g: 77, b: 255 };
    pub const PATH: Color = Color::TrueColor { r: 77, g: 195, b: 255 };
    pub const WARNING: Color = Color::TrueColor { r: 255, g: 217, b: 61 };
}

/// Current version of DocSort
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Document file extensions picked up by the sorter
pub const DOCUMENT_EXTENSIONS: &[&str] = &["pdf", "jpg", "jpeg", "png"];
