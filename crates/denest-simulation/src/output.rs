// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

/*!
Output directory layout.

```text
<output_dir>/
  parameter_tree.json
  versions.json
  data/                  kernel data path, plus one <recorder>.json per recorder
  sessions/
    session_times.json
    00_<model>.json ...
<parent>/current -> <output_dir>
```

Every metadata file is written to a temporary sibling and renamed into place,
so readers never see a partial file.
*/

use crate::error::{SimulationError, SimulationResult};
use serde::Serialize;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

pub const DATA_DIR: &str = "data";
pub const SESSIONS_DIR: &str = "sessions";
pub const PARAMETER_TREE_FILE: &str = "parameter_tree.json";
pub const VERSIONS_FILE: &str = "versions.json";
pub const SESSION_TIMES_FILE: &str = "session_times.json";

/// Subdirectories whose files are removed when the output dir is cleared
const CLEAR_SUBDIRS: &[&str] = &[DATA_DIR, SESSIONS_DIR];

/// Paths inside one run's output directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputLayout {
    root: PathBuf,
}

impl OutputLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory handed to the kernel for raw recorder output
    pub fn data_dir(&self) -> PathBuf {
        self.root.join(DATA_DIR)
    }

    pub fn sessions_dir(&self) -> PathBuf {
        self.root.join(SESSIONS_DIR)
    }

    pub fn parameter_tree(&self) -> PathBuf {
        self.root.join(PARAMETER_TREE_FILE)
    }

    pub fn versions(&self) -> PathBuf {
        self.root.join(VERSIONS_FILE)
    }

    pub fn session_times(&self) -> PathBuf {
        self.sessions_dir().join(SESSION_TIMES_FILE)
    }

    pub fn session(&self, name: &str) -> PathBuf {
        self.sessions_dir().join(format!("{}.json", name))
    }

    pub fn recorder(&self, label: &str) -> PathBuf {
        self.data_dir().join(format!("{}.json", label))
    }

    /// Create the directory tree, clearing files left by a previous run
    /// when `clear` is set
    ///
    /// Only files directly inside the known subdirectories are removed.
    /// Anything else under the output directory is left alone.
    pub fn prepare(&self, clear: bool) -> SimulationResult<()> {
        fs::create_dir_all(&self.root).map_err(SimulationError::io(&self.root))?;
        for subdir in CLEAR_SUBDIRS {
            let dir = self.root.join(subdir);
            if clear && dir.is_dir() {
                debug!(target: "denest-simulation", "Clearing {}", dir.display());
                delete_files(&dir)?;
            }
            fs::create_dir_all(&dir).map_err(SimulationError::io(&dir))?;
        }
        if clear {
            for file in [self.parameter_tree(), self.versions()] {
                if file.is_file() {
                    fs::remove_file(&file).map_err(SimulationError::io(&file))?;
                }
            }
        }
        Ok(())
    }
}

fn delete_files(dir: &Path) -> SimulationResult<()> {
    for entry in fs::read_dir(dir).map_err(SimulationError::io(dir))? {
        let path = entry.map_err(SimulationError::io(dir))?.path();
        if path.is_file() {
            fs::remove_file(&path).map_err(SimulationError::io(&path))?;
        }
    }
    Ok(())
}

/// Serialize `value` as pretty JSON to `path` via a temporary file and a rename
pub fn write_json_atomic<T: Serialize + ?Sized>(path: &Path, value: &T) -> SimulationResult<()> {
    let bytes = serde_json::to_vec_pretty(value)?;
    let tmp = temporary_sibling(path);
    {
        let mut file = fs::File::create(&tmp).map_err(SimulationError::io(&tmp))?;
        file.write_all(&bytes).map_err(SimulationError::io(&tmp))?;
        file.write_all(b"\n").map_err(SimulationError::io(&tmp))?;
        file.sync_all().map_err(SimulationError::io(&tmp))?;
    }
    fs::rename(&tmp, path).map_err(SimulationError::io(path))?;
    Ok(())
}

fn temporary_sibling(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!(".{}.tmp-{}", name, std::process::id()))
}

/// Point `<parent of output_dir>/<link_name>` at `output_dir`
///
/// The new link is created under a temporary name and renamed over the old
/// one. The link target is relative, so the pair can be moved together. An
/// existing non-link entry with the link's name makes the rename fail and is
/// left untouched. Returns the link path, or `None` on platforms without
/// symlinks.
pub fn update_current_link(output_dir: &Path, link_name: &str) -> SimulationResult<Option<PathBuf>> {
    let target = output_dir.file_name().ok_or_else(|| SimulationError::Io {
        path: output_dir.to_path_buf(),
        source: std::io::Error::new(std::io::ErrorKind::InvalidInput, "output directory has no name"),
    })?;
    if target == link_name {
        return Err(SimulationError::Io {
            path: output_dir.to_path_buf(),
            source: std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("output directory may not be named `{}`", link_name),
            ),
        });
    }
    let parent = match output_dir.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    let link = parent.join(link_name);
    replace_link(Path::new(target), &link)
}

#[cfg(unix)]
fn replace_link(target: &Path, link: &Path) -> SimulationResult<Option<PathBuf>> {
    let tmp = temporary_sibling(link);
    if fs::symlink_metadata(&tmp).is_ok() {
        fs::remove_file(&tmp).map_err(SimulationError::io(&tmp))?;
    }
    std::os::unix::fs::symlink(target, &tmp).map_err(SimulationError::io(&tmp))?;
    if let Err(source) = fs::rename(&tmp, link) {
        // leave no stray temporary link behind
        let _ = fs::remove_file(&tmp);
        return Err(SimulationError::Io {
            path: link.to_path_buf(),
            source,
        });
    }
    debug!(target: "denest-simulation", "{} -> {}", link.display(), target.display());
    Ok(Some(link.to_path_buf()))
}

#[cfg(not(unix))]
fn replace_link(target: &Path, link: &Path) -> SimulationResult<Option<PathBuf>> {
    warn!(
        target: "denest-simulation",
        "Symbolic links unsupported here; not pointing {} at {}",
        link.display(),
        target.display()
    );
    Ok(None)
}

/// Remove the `current` link without touching what it points to
pub fn remove_current_link(link: &Path) -> SimulationResult<()> {
    match fs::symlink_metadata(link) {
        Ok(meta) if meta.file_type().is_symlink() => {
            fs::remove_file(link).map_err(SimulationError::io(link))
        }
        Ok(_) => {
            warn!(target: "denest-simulation", "{} is not a link; leaving it in place", link.display());
            Ok(())
        }
        Err(_) => Ok(()),
    }
}
