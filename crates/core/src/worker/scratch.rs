//! Scratch space and filename hygiene for item processing.

use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use uuid::Uuid;

/// Characters that may not appear in a path component.
const FORBIDDEN: [char; 9] = ['/', '\\', ':', '*', '?', '"', '<', '>', '|'];

/// Longest stem in bytes. Leaves room for an extension under the usual
/// 255-byte component limit.
pub const MAX_STEM_BYTES: usize = 200;

/// Replaces path-hostile characters with `_` and caps the result at
/// [`MAX_STEM_BYTES`], cutting on a char boundary.
///
/// Falls back to `"untitled"` when nothing usable remains.
pub fn sanitize_filename(name: &str) -> String {
    let mut cleaned: String = name
        .trim()
        .chars()
        .map(|c| if FORBIDDEN.contains(&c) || c.is_control() { '_' } else { c })
        .collect();

    if cleaned.len() > MAX_STEM_BYTES {
        let mut end = MAX_STEM_BYTES;
        while !cleaned.is_char_boundary(end) {
            end -= 1;
        }
        cleaned.truncate(end);
    }

    match cleaned.as_str() {
        "" | "." | ".." => "untitled".to_string(),
        _ => cleaned,
    }
}

/// A private per-item directory, removed when dropped.
#[derive(Debug)]
pub struct ScratchDir {
    path: PathBuf,
    armed: bool,
}

impl ScratchDir {
    /// Creates `<root>/<uuid>/`.
    pub async fn create(root: &Path) -> std::io::Result<Self> {
        let path = root.join(Uuid::new_v4().to_string());
        tokio::fs::create_dir_all(&path).await?;
        Ok(Self { path, armed: true })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Path for a file inside the directory.
    pub fn file(&self, name: &str) -> PathBuf {
        self.path.join(name)
    }

    /// Removes the directory without blocking the runtime.
    pub async fn cleanup(mut self) {
        self.armed = false;
        match tokio::fs::remove_dir_all(&self.path).await {
            Ok(()) => debug!(path = %self.path.display(), "Scratch directory removed"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(path = %self.path.display(), error = %e, "Failed to remove scratch directory"),
        }
    }
}

impl Drop for ScratchDir {
    fn drop(&mut self) {
        if self.armed {
            let _ = std::fs::remove_dir_all(&self.path);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_sanitize_replaces_forbidden() {
        assert_eq!(sanitize_filename("a/b:c*d"), "a_b_c_d");
        assert_eq!(sanitize_filename(r#"x\y?"z"<w>|"#), "x_y__z__w__");
    }

    #[test]
    fn test_sanitize_keeps_unicode_and_trims() {
        assert_eq!(sanitize_filename("  夜に駆ける  "), "夜に駆ける");
    }

    #[test]
    fn test_sanitize_empty_fallback() {
        assert_eq!(sanitize_filename("   "), "untitled");
        assert_eq!(sanitize_filename(".."), "untitled");
    }

    #[test]
    fn test_sanitize_caps_length_on_char_boundary() {
        // 3 bytes per char, 90 chars = 270 bytes.
        let long = "夜".repeat(90);
        let stem = sanitize_filename(&long);
        assert_eq!(stem.len(), 198);
        assert_eq!(stem, "夜".repeat(66));

        let ascii = "a".repeat(300);
        assert_eq!(sanitize_filename(&ascii).len(), MAX_STEM_BYTES);
        assert_eq!(sanitize_filename("short"), "short");
    }

    #[tokio::test]
    async fn test_scratch_file_accepts_long_titles() {
        let root = TempDir::new().unwrap();
        let scratch = ScratchDir::create(root.path()).await.unwrap();
        let stem = sanitize_filename(&"夜".repeat(90));

        let path = scratch.file(&format!("{}.mp4", stem));
        tokio::fs::write(&path, b"data").await.unwrap();
        assert!(path.exists());
    }

    #[tokio::test]
    async fn test_scratch_cleanup_removes_dir() {
        let root = TempDir::new().unwrap();
        let scratch = ScratchDir::create(root.path()).await.unwrap();
        let path = scratch.path().to_path_buf();
        std::fs::write(scratch.file("x.mp4"), b"data").unwrap();

        scratch.cleanup().await;
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_scratch_drop_removes_dir() {
        let root = TempDir::new().unwrap();
        let path = {
            let scratch = ScratchDir::create(root.path()).await.unwrap();
            std::fs::write(scratch.file("x.mp4"), b"data").unwrap();
            scratch.path().to_path_buf()
        };
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_scratch_dirs_are_distinct() {
        let root = TempDir::new().unwrap();
        let a = ScratchDir::create(root.path()).await.unwrap();
        let b = ScratchDir::create(root.path()).await.unwrap();
        assert_ne!(a.path(), b.path());
    }
}
