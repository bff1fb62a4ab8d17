//! Steepfile handling.
//!
//! The steepfile is deliberately thin: one signature directory per line,
//! relative to the steepfile itself. Blank lines and `#` comments are
//! skipped. Signature files are the `*.sig` files under those
//! directories.

use std::io;
use std::path::{Path, PathBuf};

use tracing::debug;
use walkdir::WalkDir;

/// Extension of signature files.
pub const SIGNATURE_EXTENSION: &str = "sig";

#[derive(Clone, Debug)]
pub struct Project {
    /// Directory the steepfile lives in.
    pub base_dir: PathBuf,
    /// Signature directories, absolute.
    pub signature_dirs: Vec<PathBuf>,
}

impl Project {
    /// Load a steepfile. A missing file yields a project rooted at its
    /// directory with a default `sig/` signature directory.
    pub fn load(steepfile: &Path) -> io::Result<Project> {
        let base_dir = steepfile
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));

        let mut signature_dirs = Vec::new();
        match std::fs::read_to_string(steepfile) {
            Ok(content) => {
                for line in content.lines() {
                    let line = line.trim();
                    if line.is_empty() || line.starts_with('#') {
                        continue;
                    }
                    signature_dirs.push(base_dir.join(line));
                }
            }
            Err(error) if error.kind() == io::ErrorKind::NotFound => {}
            Err(error) => return Err(error),
        }
        if signature_dirs.is_empty() {
            signature_dirs.push(base_dir.join("sig"));
        }

        debug!(?signature_dirs, "loaded steepfile");
        Ok(Project {
            base_dir,
            signature_dirs,
        })
    }

    /// All signature files under the project's directories, sorted for
    /// deterministic assignment.
    pub fn signature_files(&self) -> Vec<PathBuf> {
        let mut files = Vec::new();
        for dir in &self.signature_dirs {
            for entry in WalkDir::new(dir).into_iter().filter_map(Result::ok) {
                let path = entry.path();
                if path.extension().and_then(|e| e.to_str()) == Some(SIGNATURE_EXTENSION) {
                    files.push(path.to_path_buf());
                }
            }
        }
        files.sort();
        files.dedup();
        files
    }
}
