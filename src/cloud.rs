use std::path::{Path, PathBuf};
use path_slash::PathExt;

/// Cloud storage providers whose sync folders need readiness handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloudProvider {
    ICloud,
    GoogleDrive,
    Dropbox,
    OneDrive,
}

impl CloudProvider {
    pub const ALL: &'static [CloudProvider] = &[
        CloudProvider::ICloud,
        CloudProvider::GoogleDrive,
        CloudProvider::Dropbox,
        CloudProvider::OneDrive,
    ];

    /// Lower-cased path fragments that identify this provider's sync folder.
    fn indicators(self) -> &'static [&'static str] {
        match self {
            CloudProvider::ICloud => &[
                "library/mobile documents/com~apple~clouddocs",
                "icloud",
            ],
            CloudProvider::GoogleDrive => &["google drive", "googledrive"],
            CloudProvider::Dropbox => &["dropbox"],
            CloudProvider::OneDrive => &["onedrive"],
        }
    }

    /// Default sync folder location relative to the home directory.
    fn default_path(self) -> &'static str {
        match self {
            CloudProvider::ICloud => "Library/Mobile Documents/com~apple~CloudDocs",
            CloudProvider::GoogleDrive => "Google Drive",
            CloudProvider::Dropbox => "Dropbox",
            CloudProvider::OneDrive => "OneDrive",
        }
    }

    /// Display name
    pub fn name(self) -> &'static str {
        match self {
            CloudProvider::ICloud => "iCloud",
            CloudProvider::GoogleDrive => "Google Drive",
            CloudProvider::Dropbox => "Dropbox",
            CloudProvider::OneDrive => "OneDrive",
        }
    }

    /// Detect which provider, if any, a path lives under.
    pub fn detect(path: &Path) -> Option<CloudProvider> {
        // Backslashes from pasted Windows paths are normalized before matching
        let normalized = path.to_slash_lossy().to_lowercase();
        Self::ALL
            .iter()
            .copied()
            .find(|provider| {
                provider
                    .indicators()
                    .iter()
                    .any(|indicator| normalized.contains(indicator))
            })
    }

    /// Base directory of this provider's sync folder, if present on disk.
    pub fn base_dir(self) -> Option<PathBuf> {
        let home = dirs::home_dir()?;
        let base = home.join(self.default_path());
        if base.exists() {
            Some(base)
        } else {
            None
        }
    }
}
