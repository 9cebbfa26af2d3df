use std::path::{Path, PathBuf};
use tracing::debug;

use crate::error::Result;

/// Files that make up a complete developer disk image
const DDI_FILES: [&str; 3] = ["BuildManifest.plist", "Image.dmg", "Image.dmg.trustcache"];

/// On-disk cache of developer disk image files under `~/.xtool/ddi/`.
///
/// Screenshot services require the image to be mounted on the device; the
/// cache lets the external mounter reuse a previous download. Files are
/// written atomically and removed on failure, so the cache is either absent
/// or usable.
#[derive(Debug, Clone)]
pub struct DdiCache {
    dir: PathBuf,
}

impl DdiCache {
    /// Cache rooted at the default location under the user's home directory.
    pub fn default_location() -> Option<Self> {
        let home = std::env::var_os("HOME")?;
        Some(Self::at(PathBuf::from(home).join(".xtool").join("ddi")))
    }

    pub fn at(dir: PathBuf) -> Self {
        Self { dir }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// True when every image file is present.
    pub fn is_complete(&self) -> bool {
        DDI_FILES.iter().all(|name| self.dir.join(name).is_file())
    }

    /// Store one image file atomically: write to a staging name in the same
    /// directory, then rename into place. The staging file is unlinked when
    /// anything fails.
    pub fn store(&self, name: &str, bytes: &[u8]) -> Result<()> {
        std::fs::create_dir_all(&self.dir)?;
        let staging = self.dir.join(format!(".{}.partial", name));
        let target = self.dir.join(name);

        if let Err(e) = std::fs::write(&staging, bytes) {
            let _ = std::fs::remove_file(&staging);
            return Err(e.into());
        }
        if let Err(e) = std::fs::rename(&staging, &target) {
            let _ = std::fs::remove_file(&staging);
            return Err(e.into());
        }
        debug!("stored {} ({} bytes)", target.display(), bytes.len());
        Ok(())
    }
}
