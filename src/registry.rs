//! Static patch registry: which transforms are wired to which config files.
//!
//! The registry is built once at process start and read-only afterwards.
//! It holds a release-agnostic set applied to every distribution release
//! plus per-release additions. The orchestrator needs exactly two queries:
//! the patch set for a release, and whether a given binding is registered
//! release-agnostically (a wiring check over static data).

use crate::patch::Patch;
use anyhow::{bail, Result};
use std::collections::BTreeMap;
use std::fmt;

/// A distribution release name, e.g. `Ubuntu18.04LTS` or `Ubuntu22.04LTS`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Release(String);

impl Release {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Release {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Immutable table of registered patches.
#[derive(Debug)]
pub struct PatchRegistry {
    release_agnostic: Vec<Patch>,
    release_specific: BTreeMap<Release, Vec<Patch>>,
}

impl PatchRegistry {
    pub fn builder() -> PatchRegistryBuilder {
        PatchRegistryBuilder::default()
    }

    /// The production registry.
    ///
    /// Cloud images ship an `/etc/fstab` root volume row whose label does
    /// not exist inside a mounted image, so it is removed for every release.
    pub fn builtin() -> Self {
        Self {
            release_agnostic: vec![Patch::new(
                "/etc/fstab",
                crate::transform::remove_cloudimg_label(),
            )],
            release_specific: BTreeMap::new(),
        }
    }

    /// All patches applicable to `release`: the release-agnostic set plus
    /// that release's additions, in registration order.
    pub fn patches_for(&self, release: &Release) -> Vec<&Patch> {
        let mut patches: Vec<&Patch> = self.release_agnostic.iter().collect();
        if let Some(additions) = self.release_specific.get(release) {
            patches.extend(additions.iter());
        }
        patches
    }

    /// Whether an equivalent patch (same path, same transform tag) is
    /// registered for every release.
    pub fn is_release_agnostic(&self, patch: &Patch) -> bool {
        self.release_agnostic.contains(patch)
    }

    pub fn release_agnostic_patches(&self) -> &[Patch] {
        &self.release_agnostic
    }
}

/// Builder validating the registration-time invariant: within one scope
/// (agnostic, or one release), a config path may not be bound to two
/// different transforms. Registering the identical binding twice is
/// deduplicated.
#[derive(Default)]
pub struct PatchRegistryBuilder {
    release_agnostic: Vec<Patch>,
    release_specific: BTreeMap<Release, Vec<Patch>>,
}

impl PatchRegistryBuilder {
    /// Register a patch applied to every release.
    pub fn release_agnostic(mut self, patch: Patch) -> Self {
        self.release_agnostic.push(patch);
        self
    }

    /// Register a patch applied only to `release`, in addition to the
    /// release-agnostic set.
    pub fn for_release(mut self, release: Release, patch: Patch) -> Self {
        self.release_specific.entry(release).or_default().push(patch);
        self
    }

    pub fn build(self) -> Result<PatchRegistry> {
        let release_agnostic = dedup_scope("release-agnostic", self.release_agnostic)?;
        let mut release_specific = BTreeMap::new();
        for (release, patches) in self.release_specific {
            let patches = dedup_scope(release.as_str(), patches)?;
            release_specific.insert(release, patches);
        }
        Ok(PatchRegistry {
            release_agnostic,
            release_specific,
        })
    }
}

/// Drop exact duplicates within one scope; reject two different transforms
/// bound to the same path.
fn dedup_scope(scope: &str, patches: Vec<Patch>) -> Result<Vec<Patch>> {
    let mut kept: Vec<Patch> = Vec::with_capacity(patches.len());
    for patch in patches {
        if let Some(existing) = kept
            .iter()
            .find(|p| p.config_file_path() == patch.config_file_path())
        {
            if *existing == patch {
                continue;
            }
            bail!(
                "conflicting {scope} patches for '{}': {} vs {}",
                patch.config_file_path(),
                existing.transform_id(),
                patch.transform_id(),
            );
        }
        kept.push(patch);
    }
    Ok(kept)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transform::{remove_cloudimg_label, TransformId, WriteContents};
    use std::sync::Arc;

    fn boot_patch(path: &str) -> Patch {
        Patch::new(
            path,
            Arc::new(WriteContents::new(
                TransformId::Named("boot"),
                "[boot]\nsystemd=true",
            )),
        )
    }

    #[test]
    fn test_builtin_registers_cloudimg_label_for_all_releases() {
        // The fstab row removal must be wired in regardless of release.
        let registry = PatchRegistry::builtin();
        let expected = Patch::new("/etc/fstab", remove_cloudimg_label());
        assert!(registry.is_release_agnostic(&expected));
    }

    #[test]
    fn test_patches_for_unions_agnostic_and_specific() {
        let bionic = Release::new("Ubuntu18.04LTS");
        let jammy = Release::new("Ubuntu22.04LTS");
        let registry = PatchRegistry::builder()
            .release_agnostic(Patch::new("/etc/fstab", remove_cloudimg_label()))
            .for_release(bionic.clone(), boot_patch("/etc/wsl.conf"))
            .build()
            .unwrap();

        let for_bionic = registry.patches_for(&bionic);
        assert_eq!(for_bionic.len(), 2);
        assert_eq!(for_bionic[0].config_file_path(), "/etc/fstab");
        assert_eq!(for_bionic[1].config_file_path(), "/etc/wsl.conf");

        // A release with no specific entries gets only the agnostic set.
        let for_jammy = registry.patches_for(&jammy);
        assert_eq!(for_jammy.len(), 1);
        assert_eq!(for_jammy[0].config_file_path(), "/etc/fstab");
    }

    #[test]
    fn test_release_specific_patch_is_not_agnostic() {
        let registry = PatchRegistry::builder()
            .for_release(Release::new("Ubuntu18.04LTS"), boot_patch("/etc/wsl.conf"))
            .build()
            .unwrap();
        assert!(!registry.is_release_agnostic(&boot_patch("/etc/wsl.conf")));
    }

    #[test]
    fn test_build_rejects_conflicting_transforms_for_one_path() {
        let result = PatchRegistry::builder()
            .release_agnostic(Patch::new("/etc/fstab", remove_cloudimg_label()))
            .release_agnostic(boot_patch("/etc/fstab"))
            .build();
        let err = result.unwrap_err().to_string();
        assert!(err.contains("/etc/fstab"), "unexpected error: {err}");
    }

    #[test]
    fn test_build_dedups_identical_registration() {
        let registry = PatchRegistry::builder()
            .release_agnostic(Patch::new("/etc/fstab", remove_cloudimg_label()))
            .release_agnostic(Patch::new("/etc/fstab", remove_cloudimg_label()))
            .build()
            .unwrap();
        assert_eq!(registry.release_agnostic_patches().len(), 1);
    }

    #[test]
    fn test_same_path_in_different_scopes_is_not_a_conflict() {
        // An agnostic patch and a release-specific addition may share a
        // path; for that release both apply, in order.
        let bionic = Release::new("Ubuntu18.04LTS");
        let registry = PatchRegistry::builder()
            .release_agnostic(Patch::new("/etc/wsl.conf", remove_cloudimg_label()))
            .for_release(bionic.clone(), boot_patch("/etc/wsl.conf"))
            .build()
            .unwrap();
        assert_eq!(registry.patches_for(&bionic).len(), 2);
    }

    #[test]
    fn test_release_display() {
        assert_eq!(Release::new("Ubuntu22.04LTS").to_string(), "Ubuntu22.04LTS");
    }
}
