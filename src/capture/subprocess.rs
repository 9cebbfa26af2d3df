use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::process::Command;
use tracing::{debug, info, warn};

use super::{CaptureBackend, CaptureTool};
use crate::error::{CaptureError, Result};

/// Directory override for vendored tool binaries
const TOOL_DIR_ENV: &str = "XTOOL_TOOL_DIR";

/// Capture backend that shells out to an external screenshot tool per frame.
///
/// Output goes to a per-process temp directory; each frame gets a unique
/// file name from a counter that never resets for the lifetime of the
/// backend.
pub struct SubprocessCapture {
    preference: CaptureTool,
    udid: Option<String>,
    /// Tool + binary path locked in after the first success
    resolved: Option<(CaptureTool, PathBuf)>,
    temp_dir: PathBuf,
    frame_counter: u64,
}

impl SubprocessCapture {
    pub fn new(preference: CaptureTool, udid: Option<String>) -> Self {
        let temp_dir =
            std::env::temp_dir().join(format!("xtool-preview-{}", std::process::id()));
        Self {
            preference,
            udid,
            resolved: None,
            temp_dir,
            frame_counter: 0,
        }
    }

    #[cfg(test)]
    pub(crate) fn with_resolved_tool(
        tool: CaptureTool,
        binary: PathBuf,
        udid: Option<String>,
    ) -> Self {
        let mut backend = Self::new(tool, udid);
        backend.resolved = Some((tool, binary));
        backend
    }

    /// Tools to try this frame, in preference order.
    fn candidates(&self) -> Vec<CaptureTool> {
        if let Some((tool, _)) = &self.resolved {
            return vec![*tool];
        }
        match self.preference {
            // idevicescreenshot first: no interpreter startup per frame
            CaptureTool::Auto => {
                vec![CaptureTool::Idevicescreenshot, CaptureTool::Pymobiledevice3]
            }
            tool => vec![tool],
        }
    }

    fn binary_for(&self, tool: CaptureTool) -> Result<PathBuf> {
        if let Some((resolved, path)) = &self.resolved {
            if *resolved == tool {
                return Ok(path.clone());
            }
        }
        let name = tool_binary_name(tool);
        find_tool(name).ok_or_else(|| {
            CaptureError::ToolNotFound {
                tool: name.to_string(),
            }
            .into()
        })
    }

    async fn run_tool(&mut self, tool: CaptureTool, binary: &Path) -> Result<Vec<u8>> {
        let output_path = self.temp_dir.join(format!(
            "frame-{}.{}",
            self.frame_counter,
            tool_output_extension(tool)
        ));
        self.frame_counter += 1;

        let mut command = Command::new(binary);
        match tool {
            CaptureTool::Idevicescreenshot | CaptureTool::Auto => {
                if let Some(udid) = &self.udid {
                    command.arg("-u").arg(udid);
                }
                command.arg(&output_path);
            }
            CaptureTool::Pymobiledevice3 => {
                command
                    .args(["developer", "dvt", "screenshot"])
                    .arg(&output_path);
                if let Some(udid) = &self.udid {
                    command.arg("--udid").arg(udid);
                }
            }
        }

        let name = tool_binary_name(tool);
        let output = command.kill_on_drop(true).output().await.map_err(|e| {
            CaptureError::ToolFailed {
                tool: name.to_string(),
                status: "failed to spawn".to_string(),
                stderr: e.to_string(),
            }
        })?;

        if !output.status.success() {
            let _ = tokio::fs::remove_file(&output_path).await;
            return Err(CaptureError::ToolFailed {
                tool: name.to_string(),
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            }
            .into());
        }

        let bytes = tokio::fs::read(&output_path)
            .await
            .map_err(|e| CaptureError::FrameRead {
                details: format!("{}: {}", output_path.display(), e),
            })?;
        let _ = tokio::fs::remove_file(&output_path).await;

        if bytes.is_empty() {
            return Err(CaptureError::FrameRead {
                details: format!("{} wrote an empty file", name),
            }
            .into());
        }

        Ok(bytes)
    }
}

#[async_trait]
impl CaptureBackend for SubprocessCapture {
    async fn start(&mut self) -> Result<()> {
        tokio::fs::create_dir_all(&self.temp_dir)
            .await
            .map_err(|e| CaptureError::TempDir {
                path: self.temp_dir.display().to_string(),
                source: e,
            })?;
        debug!("capture temp directory: {}", self.temp_dir.display());
        Ok(())
    }

    async fn capture_frame(&mut self) -> Result<Vec<u8>> {
        let candidates = self.candidates();
        let sticky_open = self.resolved.is_none();
        let mut last_error = None;

        for tool in candidates {
            let binary = match self.binary_for(tool) {
                Ok(binary) => binary,
                Err(e) => {
                    debug!("{}", e);
                    last_error = Some(e);
                    continue;
                }
            };
            match self.run_tool(tool, &binary).await {
                Ok(bytes) => {
                    if sticky_open {
                        info!(
                            "using {} for screen capture ({})",
                            tool_binary_name(tool),
                            binary.display()
                        );
                        self.resolved = Some((tool, binary));
                    }
                    return Ok(bytes);
                }
                Err(e) => {
                    warn!("{} capture failed: {}", tool_binary_name(tool), e);
                    last_error = Some(e);
                }
            }
        }

        match self.preference {
            CaptureTool::Auto if self.resolved.is_none() => {
                Err(CaptureError::AllToolsFailed.into())
            }
            _ => Err(last_error
                .unwrap_or_else(|| CaptureError::AllToolsFailed.into())),
        }
    }

    async fn stop(&mut self) {
        if let Err(e) = tokio::fs::remove_dir_all(&self.temp_dir).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!(
                    "failed to remove capture temp directory {}: {}",
                    self.temp_dir.display(),
                    e
                );
            }
        }
    }
}

fn tool_binary_name(tool: CaptureTool) -> &'static str {
    match tool {
        CaptureTool::Auto | CaptureTool::Idevicescreenshot => "idevicescreenshot",
        CaptureTool::Pymobiledevice3 => "pymobiledevice3",
    }
}

fn tool_output_extension(tool: CaptureTool) -> &'static str {
    match tool {
        CaptureTool::Auto | CaptureTool::Idevicescreenshot => "tiff",
        CaptureTool::Pymobiledevice3 => "png",
    }
}

/// Locate a tool binary: override dir, the running executable's directory,
/// the usual system directories, then every `PATH` entry.
fn find_tool(name: &str) -> Option<PathBuf> {
    find_in_dirs(name, search_dirs())
}

fn search_dirs() -> Vec<PathBuf> {
    let mut dirs = Vec::new();
    if let Some(override_dir) = std::env::var_os(TOOL_DIR_ENV) {
        dirs.push(PathBuf::from(override_dir));
    }
    if let Ok(exe) = std::env::current_exe() {
        if let Some(parent) = exe.parent() {
            dirs.push(parent.to_path_buf());
        }
    }
    dirs.push(PathBuf::from("/usr/bin"));
    dirs.push(PathBuf::from("/usr/local/bin"));
    dirs.push(PathBuf::from("/usr/sbin"));
    if let Some(path) = std::env::var_os("PATH") {
        dirs.extend(std::env::split_paths(&path));
    }
    dirs
}

fn find_in_dirs(name: &str, dirs: impl IntoIterator<Item = PathBuf>) -> Option<PathBuf> {
    for dir in dirs {
        let candidate = dir.join(name);
        if is_executable(&candidate) {
            return Some(candidate);
        }
    }
    None
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    path.metadata()
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}
