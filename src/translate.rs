//! Guest-path to host-path translation.
//!
//! A distribution image mounted by the host is reachable under some prefix
//! (`\\wsl.localhost\Ubuntu22.04LTS` on Windows 11, `\\wsl$\...` on
//! Windows 10, or any plain directory when testing). Paths inside the guest
//! are POSIX-absolute; translating one means re-rooting it under the prefix
//! with the host's native separators.

use anyhow::{bail, Result};
use std::path::{Path, PathBuf};

/// Translate a POSIX-absolute guest path into a host path under `host_prefix`.
///
/// The prefix is treated as an opaque fragment to prepend: no normalization,
/// no symlink resolution, no case changes. Each guest segment is appended
/// with the host-native separator, so the result is the naive concatenation
/// of prefix and segments.
///
/// Fails on a guest path that is not absolute, names no file (bare `/`), or
/// contains a `..` segment: translated paths must never escape the prefix.
pub fn translate(host_prefix: &Path, guest_path: &str) -> Result<PathBuf> {
    let Some(relative) = guest_path.strip_prefix('/') else {
        bail!("guest path '{guest_path}' is not absolute");
    };
    if relative.is_empty() {
        bail!("guest path '{guest_path}' does not name a file");
    }

    let mut translated = host_prefix.to_path_buf();
    for segment in relative.split('/').filter(|s| !s.is_empty()) {
        if segment == ".." {
            bail!("guest path '{guest_path}' escapes the mount prefix");
        }
        translated.push(segment);
    }
    Ok(translated)
}
