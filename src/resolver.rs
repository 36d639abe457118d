//! Input audio resolution
//!
//! The nominal path is tried first, then each conventional fallback name,
//! first relative and then rooted at the working directory. The first
//! candidate that exists wins.

use crate::error::{DownbeatError, Result};
use serde::Serialize;
use std::path::{Path, PathBuf};

/// A resolved audio file, fixed for the rest of the run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AudioReference {
    /// The candidate as it appeared in the list
    requested: PathBuf,
    /// Where the file actually is
    location: PathBuf,
}

impl AudioReference {
    /// Reference a file that is already known to exist
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        let path = path.into();
        Self {
            requested: path.clone(),
            location: path,
        }
    }

    pub fn requested(&self) -> &Path {
        &self.requested
    }

    pub fn location(&self) -> &Path {
        &self.location
    }

    /// Lower-cased file extension, empty when there is none
    pub fn extension(&self) -> String {
        self.location
            .extension()
            .and_then(|ext| ext.to_str())
            .unwrap_or("")
            .to_lowercase()
    }
}

/// Finds the audio file to analyse
#[derive(Debug, Clone)]
pub struct FileResolver {
    working_dir: PathBuf,
    fallback_names: Vec<String>,
}

impl FileResolver {
    pub fn new<P: Into<PathBuf>>(working_dir: P, fallback_names: Vec<String>) -> Self {
        Self {
            working_dir: working_dir.into(),
            fallback_names,
        }
    }

    /// Resolver rooted at the process working directory
    pub fn from_current_dir(fallback_names: Vec<String>) -> Result<Self> {
        let cwd = std::env::current_dir().map_err(|e| {
            DownbeatError::Processing(format!("cannot read working directory: {}", e))
        })?;
        Ok(Self::new(cwd, fallback_names))
    }

    pub fn working_dir(&self) -> &Path {
        &self.working_dir
    }

    /// Ordered candidate list for a nominal path
    pub fn candidates<P: AsRef<Path>>(&self, nominal: P) -> Vec<PathBuf> {
        let mut candidates = Vec::with_capacity(1 + 2 * self.fallback_names.len());
        candidates.push(nominal.as_ref().to_path_buf());
        candidates.extend(self.fallback_names.iter().map(PathBuf::from));
        candidates.extend(self.fallback_names.iter().map(|name| self.working_dir.join(name)));
        candidates
    }

    /// Return the first existing candidate
    pub fn resolve<P: AsRef<Path>>(&self, nominal: P) -> Result<AudioReference> {
        let candidates = self.candidates(nominal);

        for candidate in &candidates {
            // join() leaves absolute candidates untouched
            let location = self.working_dir.join(candidate);
            if location.exists() {
                log::info!("Found audio file: {}", candidate.display());
                return Ok(AudioReference {
                    requested: candidate.clone(),
                    location,
                });
            }
            log::debug!("Candidate missing: {}", location.display());
        }

        Err(DownbeatError::FileNotFound { tried: candidates })
    }
}
