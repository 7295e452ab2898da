use std::{
    path::{Path, PathBuf},
    sync::RwLock,
};

use tracing::info;

use crate::infra::lock::{self, LockSite};

/// Whether a presentation is showing, and from which directory.
#[derive(Debug, Default)]
pub struct PresentationState {
    directory: RwLock<Option<PathBuf>>,
}

impl PresentationState {
    pub fn inactive() -> Self {
        Self::default()
    }

    pub fn active(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: RwLock::new(Some(directory.into())),
        }
    }

    pub fn activate(&self, directory: &Path) {
        *lock::write(&self.directory, LockSite::ActivePresentation, "activate") =
            Some(directory.to_path_buf());
        info!(
            target = "application::presentation",
            op = "presentation::activate",
            directory = %directory.display(),
            "Presentation activated"
        );
    }

    pub fn deactivate(&self) {
        lock::write(&self.directory, LockSite::ActivePresentation, "deactivate").take();
    }

    pub fn is_active(&self) -> bool {
        lock::read(&self.directory, LockSite::ActivePresentation, "is_active").is_some()
    }

    pub fn directory(&self) -> Option<PathBuf> {
        lock::read(&self.directory, LockSite::ActivePresentation, "directory").clone()
    }
}
