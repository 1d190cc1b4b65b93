//! Relocation into the configuration-specific working directory.
//!
//! The current directory is process-global. Once [`relocate`] succeeds the
//! previous directory is NOT restored: embedders that need their own working
//! directory afterwards must run the harness in a subprocess.

use std::{
    env, fs,
    path::{Path, PathBuf},
};

use tracing::info;

use crate::error::WorkdirError;

/// Record of a completed working-directory change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Relocation {
    pub previous: PathBuf,
    pub current: PathBuf,
}

/// `<root>/<configuration>`; an empty label names the root itself.
pub fn target_directory(root: &Path, configuration: &str) -> PathBuf {
    if configuration.is_empty() {
        root.to_path_buf()
    } else {
        root.join(configuration)
    }
}

/// Change the process working directory to `<root>/<configuration>`.
pub fn relocate(root: &Path, configuration: &str) -> Result<Relocation, WorkdirError> {
    let target = target_directory(root, configuration);

    let metadata = match fs::metadata(&target) {
        Ok(metadata) => metadata,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            return Err(WorkdirError::NotFound(target));
        }
        Err(err) => return Err(WorkdirError::io(&target, err)),
    };
    if !metadata.is_dir() {
        return Err(WorkdirError::NotADirectory(target));
    }

    let previous = env::current_dir().map_err(|err| WorkdirError::io(".", err))?;
    env::set_current_dir(&target).map_err(|err| WorkdirError::io(&target, err))?;
    let current = env::current_dir().map_err(|err| WorkdirError::io(&target, err))?;

    info!(
        from = %previous.display(),
        to = %current.display(),
        "Relocated working directory"
    );

    Ok(Relocation { previous, current })
}
