use clap::{Parser, Subcommand, Args};
use std::path::PathBuf;
use colored::*;

#[derive(Parser, Debug)]
#[command(
    name = "docsort",
    about = "Filename-driven document sorter with learned categories",
    version,
    author,
    long_about = "DocSort files scanned documents (PDF and images) into a small\n\
                  set of category folders, split by year where the filename\n\
                  carries one, and remembers every categorization decision\n\
                  you make.\n\n\
                  Features:\n\
                  • Learns: new document types are remembered across runs\n\
                  • Folder repair: merges renamed/duplicated category folders\n\
                  • Cloud-aware: waits for iCloud/Drive/Dropbox/OneDrive sync\n\
                  • Date tidying: 20230401_Invoice.pdf → 2023-04-01 Invoice.pdf"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Sort documents in a folder into category folders
    Sort(SortArgs),

    /// Show learned categories and their document types
    Categories,

    /// Show help and examples
    ShowHelp,

    /// Show version information
    Version,
}

#[derive(Args, Debug)]
pub struct SortArgs {
    /// Folder to sort (prompts interactively when omitted)
    pub path: Option<PathBuf>,
}

impl Cli {
    /// Print help with examples
    pub fn print_help() {
        println!("{}", "📂 DOCSORT - DOCUMENT SORTER".bold().green());
        println!();
        println!("{}", "USAGE:".bold());
        println!("  docsort [OPTIONS] <COMMAND>");
        println!();
        println!("{}", "OPTIONS:".bold());
        println!("  -v, --verbose    Verbose output");
        println!("  --no-color       Disable colored output");
        println!("  -h, --help       Print help");
        println!("  -V, --version    Print version");
        println!();
        println!("{}", "COMMANDS:".bold());
        println!();
        println!("  {}  Sort documents into category folders", "sort".cyan().bold());
        println!("      docsort sort ~/Downloads/Scans");
        println!("      docsort sort              # prompts for a folder");
        println!();
        println!("  {}  Show learned categories", "categories".cyan().bold());
        println!("      docsort categories");
        println!();
        println!("  {}  Show help", "show-help".cyan().bold());
        println!("      docsort show-help");
        println!();
        println!("{}", "HOW SORTING WORKS:".bold().cyan());
        println!("  • The document type is read from the filename (dates stripped)");
        println!("  • Known types are filed automatically; unknown ones ask you once");
        println!("  • A 20xx year in the name adds a year subfolder");
        println!("  • Category folders with drifted names are merged on startup");
        println!();
        println!("{}", "SAFETY:".bold().cyan());
        println!("  • Files are only ever moved, never deleted");
        println!("  • Existing files are never overwritten without confirmation");
        println!("  • Cloud files are checked for sync readiness before moving");
    }

    /// Print version information
    pub fn print_version() {
        println!("📂 DocSort v{}", env!("CARGO_PKG_VERSION"));
        println!("Filename-driven document sorter with learned categories");
        println!("License: {}", env!("CARGO_PKG_LICENSE"));
    }
}

impl Commands {
    /// Get the command name
    pub fn name(&self) -> &'static str {
        match self {
            Commands::Sort(_) => "sort",
            Commands::Categories => "categories",
            Commands::ShowHelp => "show-help",
            Commands::Version => "version",
        }
    }
}
