//! # Tool Path Resolver
//!
//! Finds the external transcoder. The encoder is expected to ship next to
//! the converter executable, so the executable directory is both the main
//! lookup location and the working directory of the spawned process.
//!
//! Lookup order:
//! - explicit path from the configuration (relative paths are joined to the
//!   executable directory)
//! - `$CONVERTER_TOOLS_DIR`
//! - the executable directory
//! - system `PATH`

use std::env;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Environment variable that overrides the bundled tools directory
pub const TOOLS_DIR_ENV: &str = "CONVERTER_TOOLS_DIR";

/// Base name of the transcoder binary
pub const TRANSCODER_NAME: &str = "ffmpeg";

/// Tool path resolver for bundled and system-installed tools
#[derive(Debug, Clone)]
pub struct ToolPathResolver {
    /// Directory holding the running executable
    app_dir: PathBuf,
    /// Override directory from the environment
    tools_dir: Option<PathBuf>,
}

impl ToolPathResolver {
    /// Create a resolver rooted at the running executable
    pub fn new() -> Self {
        let app_dir = Self::detect_app_dir();
        let tools_dir = env::var_os(TOOLS_DIR_ENV)
            .map(PathBuf::from)
            .filter(|dir| dir.is_dir());
        debug!("App directory: {:?}, tools override: {:?}", app_dir, tools_dir);
        Self { app_dir, tools_dir }
    }

    /// Create a resolver with explicit directories
    pub fn with_dirs(app_dir: impl Into<PathBuf>, tools_dir: Option<PathBuf>) -> Self {
        Self {
            app_dir: app_dir.into(),
            tools_dir,
        }
    }

    fn detect_app_dir() -> PathBuf {
        env::current_exe()
            .ok()
            .and_then(|exe| exe.parent().map(Path::to_path_buf))
            .or_else(|| env::current_dir().ok())
            .unwrap_or_else(|| PathBuf::from("."))
    }

    /// Directory used as working directory for spawned tools
    pub fn app_dir(&self) -> &Path {
        &self.app_dir
    }

    /// Platform file name of a tool
    pub fn executable_name(tool_name: &str) -> String {
        let extension = if cfg!(windows) { ".exe" } else { "" };
        format!("{}{}", tool_name, extension)
    }

    /// Resolve the path to a specific tool.
    ///
    /// Always returns a path: when nothing is found the bundled location is
    /// returned so the launch failure names the place the tool was expected.
    pub fn resolve_tool(&self, tool_name: &str, configured: Option<&Path>) -> PathBuf {
        if let Some(path) = configured {
            let path = if path.is_relative() {
                self.app_dir.join(path)
            } else {
                path.to_path_buf()
            };
            debug!("Using configured {}: {:?}", tool_name, path);
            return path;
        }

        let file_name = Self::executable_name(tool_name);

        if let Some(ref tools_dir) = self.tools_dir {
            let candidate = tools_dir.join(&file_name);
            if candidate.is_file() {
                debug!("Using {} from {}: {:?}", tool_name, TOOLS_DIR_ENV, candidate);
                return candidate;
            }
        }

        let bundled = self.app_dir.join(&file_name);
        if bundled.is_file() {
            debug!("Using bundled {}: {:?}", tool_name, bundled);
            return bundled;
        }

        if let Some(system_path) = Self::find_in_system_path(&file_name) {
            debug!("Using system {}: {:?}", tool_name, system_path);
            return system_path;
        }

        warn!("Tool not found: {} (expected at {})", tool_name, bundled.display());
        bundled
    }

    /// Find tool in system PATH
    fn find_in_system_path(file_name: &str) -> Option<PathBuf> {
        let paths = env::var_os("PATH")?;
        env::split_paths(&paths)
            .map(|dir| dir.join(file_name))
            .find(|path| path.is_file())
    }
}

impl Default for ToolPathResolver {
    fn default() -> Self {
        Self::new()
    }
}
