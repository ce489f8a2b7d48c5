//! Content transforms applied to configuration files.
//!
//! A transform is handed a single-pass read view of the target file's
//! current bytes (empty when the file does not exist) and an append-only
//! sink for the new contents. The applier treats every transform the same
//! way regardless of whether it rewrites, appends, or filters:
//!
//! - [`WriteContents`] ignores the original and emits fixed contents
//!   (rewrite, also how not-yet-existing files are created)
//! - [`AppendContents`] copies the original verbatim, then appends
//! - [`DropMatchingLines`] copies the original line by line, omitting lines
//!   that match a fixed entry (filter)
//!
//! Transforms are value types with a stable [`TransformId`] tag, so two
//! registered transforms compare by tag rather than by function identity.

use anyhow::Result;
use std::fmt;
use std::io::{BufRead, BufReader, Read, Write};
use std::sync::Arc;

/// The `/etc/fstab` root volume entry shipped in Ubuntu cloud images
/// (byte-for-byte as found on 18.04).
pub const CLOUDIMG_FSTAB_ENTRY: &str = "LABEL=cloudimg-rootfs\t/\t ext4\tdefaults\t0 1";

/// Stable identity tag for a registered transform.
///
/// Registry and wiring checks compare transforms by tag; the tag names the
/// behavior, not the instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransformId {
    /// Drops the cloud-image root volume entry from `/etc/fstab`.
    RemoveCloudImgLabel,
    /// Caller-named transform (ad-hoc patches and tests).
    Named(&'static str),
}

impl fmt::Display for TransformId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransformId::RemoveCloudImgLabel => write!(f, "RemoveCloudImgLabel"),
            TransformId::Named(name) => write!(f, "{name}"),
        }
    }
}

/// Produces a configuration file's new contents from its current contents.
pub trait PatchTransform: Send + Sync {
    /// Stable tag used to compare registered transforms.
    fn id(&self) -> TransformId;

    /// Read the file's current bytes from `original` (empty if the file is
    /// absent) and write the full replacement contents to `updated`.
    ///
    /// Any I/O failure must surface through the returned `Result`; the
    /// applier discards the partial output and leaves the target untouched.
    fn transform(&self, original: &mut dyn Read, updated: &mut dyn Write) -> Result<()>;
}

/// Rewrite transform: emits fixed contents, disregarding the original.
#[derive(Debug, Clone)]
pub struct WriteContents {
    id: TransformId,
    contents: String,
}

impl WriteContents {
    pub fn new(id: TransformId, contents: impl Into<String>) -> Self {
        Self {
            id,
            contents: contents.into(),
        }
    }
}

impl PatchTransform for WriteContents {
    fn id(&self) -> TransformId {
        self.id
    }

    fn transform(&self, _original: &mut dyn Read, updated: &mut dyn Write) -> Result<()> {
        updated.write_all(self.contents.as_bytes())?;
        Ok(())
    }
}

/// Append transform: copies the original verbatim, then emits fixed contents.
#[derive(Debug, Clone)]
pub struct AppendContents {
    id: TransformId,
    contents: String,
}

impl AppendContents {
    pub fn new(id: TransformId, contents: impl Into<String>) -> Self {
        Self {
            id,
            contents: contents.into(),
        }
    }
}

impl PatchTransform for AppendContents {
    fn id(&self) -> TransformId {
        self.id
    }

    fn transform(&self, original: &mut dyn Read, updated: &mut dyn Write) -> Result<()> {
        std::io::copy(original, updated)?;
        updated.write_all(self.contents.as_bytes())?;
        Ok(())
    }
}

/// Line filter: drops every line whose trimmed content equals the target
/// entry, copying all other lines byte-for-byte with their terminators.
///
/// Matching trims ASCII whitespace on both sides, so an indented copy of the
/// entry is still dropped. Applying the filter to already-filtered output is
/// a no-op.
#[derive(Debug, Clone)]
pub struct DropMatchingLines {
    id: TransformId,
    target: String,
}

impl DropMatchingLines {
    pub fn new(id: TransformId, target: impl Into<String>) -> Self {
        Self {
            id,
            target: target.into().trim().to_string(),
        }
    }
}

impl PatchTransform for DropMatchingLines {
    fn id(&self) -> TransformId {
        self.id
    }

    fn transform(&self, original: &mut dyn Read, updated: &mut dyn Write) -> Result<()> {
        let mut reader = BufReader::new(original);
        let mut line = Vec::new();
        loop {
            line.clear();
            // read_until keeps the terminator, so kept lines round-trip
            // exactly; the final line may be unterminated.
            let n = reader.read_until(b'\n', &mut line)?;
            if n == 0 {
                break;
            }
            if line.trim_ascii() == self.target.as_bytes() {
                continue;
            }
            updated.write_all(&line)?;
        }
        Ok(())
    }
}

/// The production fstab patch transform: removes the cloud-image root volume
/// entry, which names a label that does not exist inside a mounted image.
pub fn remove_cloudimg_label() -> Arc<dyn PatchTransform> {
    Arc::new(DropMatchingLines::new(
        TransformId::RemoveCloudImgLabel,
        CLOUDIMG_FSTAB_ENTRY,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(transform: &dyn PatchTransform, input: &str) -> String {
        let mut original = input.as_bytes();
        let mut updated = Vec::new();
        transform
            .transform(&mut original, &mut updated)
            .unwrap();
        String::from_utf8(updated).unwrap()
    }

    #[test]
    fn test_remove_cloudimg_label_drops_sole_line() {
        // /etc/fstab exactly as shipped on 18.04.
        let fstab = format!("{CLOUDIMG_FSTAB_ENTRY}\n");
        let output = run(remove_cloudimg_label().as_ref(), &fstab);
        assert!(output.is_empty());
    }

    #[test]
    fn test_remove_cloudimg_label_preserves_other_lines() {
        // The entry is dropped even when indented; the comment survives
        // with its terminator intact.
        let fstab = format!("# This is a comment.\n    {CLOUDIMG_FSTAB_ENTRY}\n");
        let output = run(remove_cloudimg_label().as_ref(), &fstab);
        assert_eq!(output, "# This is a comment.\n");
    }

    #[test]
    fn test_drop_matching_lines_is_idempotent() {
        let transform = remove_cloudimg_label();
        let fstab = format!("# comment\n{CLOUDIMG_FSTAB_ENTRY}\n/dev/sdb1 /data ext4 defaults 0 2\n");
        let once = run(transform.as_ref(), &fstab);
        let twice = run(transform.as_ref(), &once);
        assert_eq!(once, "# comment\n/dev/sdb1 /data ext4 defaults 0 2\n");
        assert_eq!(twice, once);
    }

    #[test]
    fn test_drop_matching_lines_empty_input() {
        assert_eq!(run(remove_cloudimg_label().as_ref(), ""), "");
    }

    #[test]
    fn test_drop_matching_lines_no_match_copies_verbatim() {
        let transform = DropMatchingLines::new(TransformId::Named("drop-nothing"), "absent entry");
        let input = "first\nsecond\nfinal without terminator";
        assert_eq!(run(&transform, input), input);
    }

    #[test]
    fn test_drop_matching_lines_drops_every_match() {
        let transform = DropMatchingLines::new(TransformId::Named("drop-dup"), "dup");
        assert_eq!(run(&transform, "dup\nkeep\n  dup\ndup"), "keep\n");
    }

    #[test]
    fn test_write_contents_ignores_original() {
        let transform = WriteContents::new(TransformId::Named("unit"), "[Unit]\nDisable=Forever\n");
        let output = run(&transform, "previous contents that do not matter\n");
        assert_eq!(output, "[Unit]\nDisable=Forever\n");
    }

    #[test]
    fn test_append_contents_copies_then_appends() {
        let transform = AppendContents::new(TransformId::Named("boot"), "[boot]\nsystemd=true");
        let original = "\n[user]\ndefaultUid=1000\n\n[mount]\noptions=metadata\n";
        let output = run(&transform, original);
        assert_eq!(output, format!("{original}[boot]\nsystemd=true"));
    }

    #[test]
    fn test_transform_id_display() {
        assert_eq!(TransformId::RemoveCloudImgLabel.to_string(), "RemoveCloudImgLabel");
        assert_eq!(TransformId::Named("boot").to_string(), "boot");
    }
}
