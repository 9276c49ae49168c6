//! Host tool discovery.

use serde::Serialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::debug;

use super::types::ToolStatus;
use crate::config::ToolsConfig;

/// External programs the backends can drive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Tool {
    LibreOffice,
    Ffmpeg,
    ImageMagick,
    RsvgConvert,
    Inkscape,
    Pdftoppm,
    Pdftotext,
    SevenZip,
    PowerShell,
}

impl Tool {
    pub const ALL: [Tool; 9] = [
        Tool::LibreOffice,
        Tool::Ffmpeg,
        Tool::ImageMagick,
        Tool::RsvgConvert,
        Tool::Inkscape,
        Tool::Pdftoppm,
        Tool::Pdftotext,
        Tool::SevenZip,
        Tool::PowerShell,
    ];

    /// Human-readable name used in error messages.
    pub fn label(&self) -> &'static str {
        match self {
            Self::LibreOffice => "LibreOffice",
            Self::Ffmpeg => "FFmpeg",
            Self::ImageMagick => "ImageMagick",
            Self::RsvgConvert => "rsvg-convert",
            Self::Inkscape => "Inkscape",
            Self::Pdftoppm => "pdftoppm",
            Self::Pdftotext => "pdftotext",
            Self::SevenZip => "7-Zip",
            Self::PowerShell => "PowerShell",
        }
    }

    /// Executable names probed on `PATH`, in order.
    fn executables(&self) -> &'static [&'static str] {
        match self {
            Self::LibreOffice => &["soffice", "libreoffice"],
            Self::Ffmpeg => &["ffmpeg"],
            // `convert` on Windows is the filesystem utility.
            #[cfg(windows)]
            Self::ImageMagick => &["magick"],
            #[cfg(not(windows))]
            Self::ImageMagick => &["magick", "convert"],
            Self::RsvgConvert => &["rsvg-convert"],
            Self::Inkscape => &["inkscape"],
            Self::Pdftoppm => &["pdftoppm"],
            Self::Pdftotext => &["pdftotext"],
            Self::SevenZip => &["7z", "7za", "7zz"],
            Self::PowerShell => &["powershell", "pwsh"],
        }
    }

    /// Fixed install locations checked after `PATH`.
    fn well_known_locations(&self) -> &'static [&'static str] {
        #[cfg(windows)]
        {
            match self {
                Self::LibreOffice => &[
                    r"C:\Program Files\LibreOffice\program\soffice.exe",
                    r"C:\Program Files (x86)\LibreOffice\program\soffice.exe",
                ],
                Self::Inkscape => &[r"C:\Program Files\Inkscape\bin\inkscape.exe"],
                Self::SevenZip => &[
                    r"C:\Program Files\7-Zip\7z.exe",
                    r"C:\Program Files (x86)\7-Zip\7z.exe",
                ],
                Self::PowerShell => &[
                    r"C:\Windows\System32\WindowsPowerShell\v1.0\powershell.exe",
                ],
                _ => &[],
            }
        }
        #[cfg(target_os = "macos")]
        {
            match self {
                Self::LibreOffice => &["/Applications/LibreOffice.app/Contents/MacOS/soffice"],
                Self::Inkscape => &["/Applications/Inkscape.app/Contents/MacOS/inkscape"],
                Self::Ffmpeg => &["/opt/homebrew/bin/ffmpeg", "/usr/local/bin/ffmpeg"],
                Self::ImageMagick => &["/opt/homebrew/bin/magick", "/usr/local/bin/magick"],
                _ => &[],
            }
        }
        #[cfg(not(any(windows, target_os = "macos")))]
        {
            match self {
                Self::LibreOffice => &[
                    "/usr/bin/soffice",
                    "/usr/lib/libreoffice/program/soffice",
                    "/opt/libreoffice/program/soffice",
                    "/snap/bin/libreoffice",
                ],
                Self::Ffmpeg => &["/usr/bin/ffmpeg", "/usr/local/bin/ffmpeg"],
                Self::SevenZip => &["/usr/bin/7z", "/usr/lib/p7zip/7z"],
                _ => &[],
            }
        }
    }

    fn configured(&self, tools: &ToolsConfig) -> Option<PathBuf> {
        match self {
            Self::LibreOffice => tools.soffice.clone(),
            Self::Ffmpeg => tools.ffmpeg.clone(),
            Self::ImageMagick => tools.magick.clone(),
            Self::RsvgConvert => tools.rsvg_convert.clone(),
            Self::Inkscape => tools.inkscape.clone(),
            Self::Pdftoppm => tools.pdftoppm.clone(),
            Self::Pdftotext => tools.pdftotext.clone(),
            Self::SevenZip => tools.seven_zip.clone(),
            Self::PowerShell => tools.powershell.clone(),
        }
    }
}

/// Finds external tool executables.
///
/// Resolution order: configured override, then every search directory
/// (`PATH` followed by configured extras), then well-known install locations.
#[derive(Debug, Clone)]
pub struct ToolLocator {
    overrides: HashMap<Tool, PathBuf>,
    search_paths: Vec<PathBuf>,
    use_well_known: bool,
}

impl ToolLocator {
    /// Locator for this host: `PATH`, configured extras and well-known locations.
    pub fn from_config(tools: &ToolsConfig) -> Self {
        let mut search_paths: Vec<PathBuf> = std::env::var_os("PATH")
            .map(|path| std::env::split_paths(&path).collect())
            .unwrap_or_default();
        search_paths.extend(tools.extra_search_paths.iter().cloned());

        let overrides = Tool::ALL
            .iter()
            .filter_map(|tool| tool.configured(tools).map(|path| (*tool, path)))
            .collect();

        Self {
            overrides,
            search_paths,
            use_well_known: true,
        }
    }

    /// Locator that finds nothing until overrides or search paths are added.
    pub fn isolated() -> Self {
        Self {
            overrides: HashMap::new(),
            search_paths: Vec::new(),
            use_well_known: false,
        }
    }

    pub fn with_override(mut self, tool: Tool, path: impl Into<PathBuf>) -> Self {
        self.overrides.insert(tool, path.into());
        self
    }

    pub fn with_search_path(mut self, dir: impl Into<PathBuf>) -> Self {
        self.search_paths.push(dir.into());
        self
    }

    /// Resolves a tool to an executable path, if one is present.
    pub fn resolve(&self, tool: Tool) -> Option<PathBuf> {
        if let Some(path) = self.overrides.get(&tool) {
            if is_executable(path) {
                return Some(path.clone());
            }
            debug!(
                "Configured path for {} is not executable: {:?}",
                tool.label(),
                path
            );
        }

        for dir in &self.search_paths {
            for name in tool.executables() {
                let candidate = dir.join(executable_name(name));
                if is_executable(&candidate) {
                    return Some(candidate);
                }
            }
        }

        if self.use_well_known {
            for location in tool.well_known_locations() {
                let candidate = Path::new(location);
                if is_executable(candidate) {
                    return Some(candidate.to_path_buf());
                }
            }
        }

        None
    }

    pub fn is_available(&self, tool: Tool) -> bool {
        self.resolve(tool).is_some()
    }

    /// Availability of every known tool.
    pub fn status(&self) -> Vec<ToolStatus> {
        Tool::ALL
            .iter()
            .map(|tool| {
                let path = self.resolve(*tool);
                ToolStatus {
                    tool: *tool,
                    label: tool.label(),
                    available: path.is_some(),
                    path,
                }
            })
            .collect()
    }
}

#[cfg(windows)]
fn executable_name(name: &str) -> String {
    format!("{}.exe", name)
}

#[cfg(not(windows))]
fn executable_name(name: &str) -> String {
    name.to_string()
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

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;
    use tempfile::TempDir;

    fn fake_tool(dir: &Path, name: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, "#!/bin/sh\nexit 0\n").unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    #[test]
    fn test_isolated_finds_nothing() {
        let locator = ToolLocator::isolated();
        assert!(Tool::ALL.iter().all(|t| locator.resolve(*t).is_none()));
    }

    #[test]
    fn test_search_path_probes_alternate_names() {
        let dir = TempDir::new().unwrap();
        let expected = fake_tool(dir.path(), "7za");
        let locator = ToolLocator::isolated().with_search_path(dir.path());
        assert_eq!(locator.resolve(Tool::SevenZip), Some(expected));
        assert!(!locator.is_available(Tool::Ffmpeg));
    }

    #[test]
    fn test_override_wins() {
        let dir = TempDir::new().unwrap();
        let on_path = fake_tool(dir.path(), "soffice");
        let custom_dir = TempDir::new().unwrap();
        let custom = fake_tool(custom_dir.path(), "my-office");

        let locator = ToolLocator::isolated()
            .with_search_path(dir.path())
            .with_override(Tool::LibreOffice, &custom);
        assert_eq!(locator.resolve(Tool::LibreOffice), Some(custom));

        let locator = ToolLocator::isolated()
            .with_search_path(dir.path())
            .with_override(Tool::LibreOffice, dir.path().join("missing"));
        assert_eq!(locator.resolve(Tool::LibreOffice), Some(on_path));
    }

    #[test]
    fn test_non_executable_is_skipped() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("ffmpeg"), "not a program").unwrap();
        let locator = ToolLocator::isolated().with_search_path(dir.path());
        assert!(locator.resolve(Tool::Ffmpeg).is_none());
    }

    #[test]
    fn test_status_lists_every_tool() {
        let dir = TempDir::new().unwrap();
        fake_tool(dir.path(), "ffmpeg");
        let status = ToolLocator::isolated().with_search_path(dir.path()).status();
        assert_eq!(status.len(), Tool::ALL.len());
        let ffmpeg = status.iter().find(|s| s.tool == Tool::Ffmpeg).unwrap();
        assert!(ffmpeg.available);
        assert_eq!(ffmpeg.label, "FFmpeg");
    }
}
