//! External tool discovery (`yt-dlp`, `ffmpeg`).

use crate::config::ToolsConfig;
use std::path::PathBuf;
use std::process::Command;

pub struct ToolStatus {
    pub name: String,
    pub available: bool,
    pub version: Option<String>,
    pub path: Option<PathBuf>,
}

/// Check that the configured external tools resolve on PATH and report their
/// versions.
pub fn check_tools(tools: &ToolsConfig) -> Vec<ToolStatus> {
    [&tools.yt_dlp, &tools.ffmpeg]
        .into_iter()
        .map(|binary| check_tool(binary))
        .collect()
}

fn check_tool(binary: &str) -> ToolStatus {
    match which::which(binary) {
        Ok(path) => {
            let version = Command::new(&path)
                .arg("-version")
                .output()
                .ok()
                .filter(|out| out.status.success())
                .or_else(|| {
                    Command::new(&path)
                        .arg("--version")
                        .output()
                        .ok()
                        .filter(|out| out.status.success())
                })
                .and_then(|out| {
                    String::from_utf8_lossy(&out.stdout)
                        .lines()
                        .next()
                        .map(str::to_string)
                });
            ToolStatus {
                name: binary.to_string(),
                available: true,
                version,
                path: Some(path),
            }
        }
        Err(_) => ToolStatus {
            name: binary.to_string(),
            available: false,
            version: None,
            path: None,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_tool_is_reported_unavailable() {
        let status = check_tool("definitely-not-a-real-binary-name");
        assert!(!status.available);
        assert!(status.path.is_none());
        assert!(status.version.is_none());
    }
}
