//! Configuration file patching for mounted Linux distribution images.
//!
//! A distro image mounted by the host (a WSL distro under
//! `\\wsl.localhost\<Distro>`, or any directory when testing) is patched by
//! rewriting individual config files through the host-visible mount. This
//! crate is the patch application engine:
//!
//! - **Path translation** - re-root a guest-absolute path under a host prefix
//! - **Transform contract** - derive a file's new contents from its current
//!   contents (absent files read as empty)
//! - **Transform library** - line filters, rewrites, and appends
//! - **Patch + applier** - bind a guest path to a transform and apply it
//!   with create-parent-dirs and atomic replacement
//! - **Registry** - release-agnostic and release-specific patch tables
//!
//! # Architecture
//!
//! ```text
//! PatchRegistry ──patches_for(release)──▶ [Patch]
//!                                           │
//! Patch { guest path, PatchTransform }      │ apply(host_prefix)
//!                                           ▼
//! translate(prefix, path) ─▶ read view ─▶ transform ─▶ tmp ─rename─▶ file
//! ```
//!
//! Deciding which patches to run and when, discovering the mount prefix, and
//! the rest of the install flow belong to the caller; this crate only
//! translates, transforms, and replaces.
//!
//! # Example
//!
//! ```rust,ignore
//! use distro_patcher::{apply_all, PatchRegistry, Release};
//! use std::path::Path;
//!
//! let registry = PatchRegistry::builtin();
//! let release = Release::new("Ubuntu22.04LTS");
//! let prefix = Path::new(r"\\wsl.localhost\Ubuntu22.04LTS");
//! apply_all(prefix, registry.patches_for(&release))?;
//! ```

pub mod patch;
pub mod registry;
pub mod transform;
pub mod translate;

pub use patch::{apply_all, Patch, Patcher};
pub use registry::{PatchRegistry, PatchRegistryBuilder, Release};
pub use transform::{
    remove_cloudimg_label, AppendContents, DropMatchingLines, PatchTransform, TransformId,
    WriteContents, CLOUDIMG_FSTAB_ENTRY,
};
pub use translate::translate;
