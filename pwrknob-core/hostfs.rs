//! Host file-system and command access
//!
//! Every pseudo-file mechanism goes through the [`HostFs`] trait so tests
//! can substitute an in-memory host. The framework maps `NotFound` errors
//! to "mechanism unsupported here" and lets everything else propagate.

use std::path::{Path, PathBuf};
use std::process::Command;

use crate::error::{PwrknobError, Result};

pub trait HostFs {
    /// Read a file to a string.
    fn read(&self, path: &Path) -> Result<String>;

    /// Write a string to a file, replacing its contents.
    fn write(&self, path: &Path, data: &str) -> Result<()>;

    fn exists(&self, path: &Path) -> bool;

    /// List directory entry names (not full paths).
    fn list_dir(&self, path: &Path) -> Result<Vec<String>>;

    /// Run a command and return its stdout.
    fn run(&self, command: &str) -> Result<String>;
}

/// [`HostFs`] over the local file system.
pub struct LocalHostFs;

fn classify(err: std::io::Error, path: &Path, action: &str) -> PwrknobError {
    match err.kind() {
        std::io::ErrorKind::NotFound => PwrknobError::FileNotFound {
            path: PathBuf::from(path),
        },
        std::io::ErrorKind::PermissionDenied => PwrknobError::PermissionDenied {
            what: format!("{action} '{}'", path.display()),
            guidance: "this operation accesses privileged kernel interfaces, \
                       re-run as root or grant the needed capability"
                .to_string(),
        },
        _ => PwrknobError::Io(err),
    }
}

impl HostFs for LocalHostFs {
    fn read(&self, path: &Path) -> Result<String> {
        std::fs::read_to_string(path).map_err(|e| classify(e, path, "reading"))
    }

    fn write(&self, path: &Path, data: &str) -> Result<()> {
        tracing::debug!("writing '{}' to '{}'", data.trim_end(), path.display());
        std::fs::write(path, data).map_err(|e| classify(e, path, "writing"))
    }

    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn list_dir(&self, path: &Path) -> Result<Vec<String>> {
        let entries = std::fs::read_dir(path).map_err(|e| classify(e, path, "listing"))?;

        let mut names = Vec::new();
        for entry in entries {
            let entry = entry.map_err(PwrknobError::Io)?;
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
        names.sort();
        Ok(names)
    }

    fn run(&self, command: &str) -> Result<String> {
        let output = Command::new("sh")
            .arg("-c")
            .arg(command)
            .output()
            .map_err(PwrknobError::Io)?;

        if !output.status.success() {
            return Err(PwrknobError::Io(std::io::Error::other(format!(
                "command '{command}' exited with {}",
                output.status
            ))));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}
