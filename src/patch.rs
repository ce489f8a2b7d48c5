//! Patch binding and the applier.
//!
//! A [`Patch`] binds one guest-absolute config path to one transform. A
//! [`Patcher`] applies it under a host prefix: parent directories are
//! created, the current contents (empty when the file is absent) are fed
//! through the transform into a temporary sibling file, and the temporary
//! file is renamed over the target only when the transform succeeds. The
//! final file therefore holds exactly the bytes the transform wrote, with
//! no residue from a previous longer version and no half-written file
//! visible at the target path.

use crate::transform::{PatchTransform, TransformId};
use crate::translate::translate;
use anyhow::{Context, Result};
use std::fmt;
use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, ErrorKind, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

/// One configuration file patch: a guest path and the transform that
/// produces its new contents. Immutable once constructed.
#[derive(Clone)]
pub struct Patch {
    config_file_path: String,
    transform: Arc<dyn PatchTransform>,
}

impl Patch {
    pub fn new(config_file_path: impl Into<String>, transform: Arc<dyn PatchTransform>) -> Self {
        Self {
            config_file_path: config_file_path.into(),
            transform,
        }
    }

    /// The POSIX-absolute path of the config file inside the guest.
    pub fn config_file_path(&self) -> &str {
        &self.config_file_path
    }

    pub fn transform_id(&self) -> TransformId {
        self.transform.id()
    }

    /// Apply this patch to the distro mounted under `host_prefix`.
    pub fn apply(&self, host_prefix: &Path) -> Result<()> {
        Patcher::new(host_prefix, self).apply()
    }
}

impl PartialEq for Patch {
    /// Two patches are equivalent when they target the same path with the
    /// same transform tag.
    fn eq(&self, other: &Self) -> bool {
        self.config_file_path == other.config_file_path
            && self.transform.id() == other.transform.id()
    }
}

impl Eq for Patch {}

impl fmt::Debug for Patch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Patch")
            .field("config_file_path", &self.config_file_path)
            .field("transform", &self.transform.id())
            .finish()
    }
}

/// A patch paired with the host prefix it is applied under.
pub struct Patcher<'a> {
    host_prefix: &'a Path,
    patch: &'a Patch,
}

impl<'a> Patcher<'a> {
    pub fn new(host_prefix: &'a Path, patch: &'a Patch) -> Self {
        Self { host_prefix, patch }
    }

    /// The host path of the patched file.
    pub fn translated_path(&self) -> Result<PathBuf> {
        translate(self.host_prefix, self.patch.config_file_path())
    }

    /// Run the bound transform over the target file's current contents and
    /// replace the file with the transform's output.
    ///
    /// An absent target is not an error: the transform sees an empty read
    /// view and its output creates the file. On any failure the temporary
    /// output is removed and a pre-existing target is left untouched.
    pub fn apply(&self) -> Result<()> {
        let target = self.translated_path()?;

        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("creating directory '{}'", parent.display()))?;
        }

        let mut original: Box<dyn Read> = match File::open(&target) {
            Ok(file) => Box::new(BufReader::new(file)),
            Err(e) if e.kind() == ErrorKind::NotFound => Box::new(io::empty()),
            Err(e) => {
                return Err(e).with_context(|| format!("opening '{}'", target.display()));
            }
        };

        let tmp = tmp_sibling(&target);
        let written = write_transformed(self.patch, original.as_mut(), &tmp);
        match written {
            Ok(()) => fs::rename(&tmp, &target).with_context(|| {
                format!("moving '{}' over '{}'", tmp.display(), target.display())
            }),
            Err(e) => {
                let _ = fs::remove_file(&tmp);
                Err(e).with_context(|| {
                    format!("patching '{}'", self.patch.config_file_path())
                })
            }
        }
    }
}

/// Run the transform into the temporary file, flushing before return so
/// every buffered byte lands before the rename.
fn write_transformed(patch: &Patch, original: &mut dyn Read, tmp: &Path) -> Result<()> {
    let file =
        File::create(tmp).with_context(|| format!("creating '{}'", tmp.display()))?;
    let mut updated = BufWriter::new(file);
    patch.transform.transform(original, &mut updated)?;
    updated
        .flush()
        .with_context(|| format!("flushing '{}'", tmp.display()))?;
    Ok(())
}

/// Temporary output path next to the target, so the final rename stays on
/// one filesystem.
fn tmp_sibling(target: &Path) -> PathBuf {
    let n = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    let name = target
        .file_name()
        .and_then(|f| f.to_str())
        .unwrap_or("patch");
    target.with_file_name(format!(".{name}.tmp-{n}"))
}

/// Apply `patches` in order, stopping at the first failure.
///
/// Patches targeting the same file compose: a later patch reads the earlier
/// patch's output. Callers that want to continue past failures apply each
/// patch individually instead.
pub fn apply_all<'a>(
    host_prefix: &Path,
    patches: impl IntoIterator<Item = &'a Patch>,
) -> Result<()> {
    for patch in patches {
        println!("  Patching {}", patch.config_file_path());
        patch.apply(host_prefix)?;
    }
    Ok(())
}
