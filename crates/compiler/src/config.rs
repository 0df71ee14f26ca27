//! Configuration file support for the NPU lowering compiler
//!
//! The flags mirror the support library's tuning knobs and are read once per
//! compilation through [`CompilationOptions::from_config`](crate::support::CompilationOptions::from_config).
//!
//! # Config File Locations
//!
//! [`CompilerConfig::find_and_load`] searches in the following order:
//! 1. The file named by the `NPU_LOWER_CONFIG` environment variable
//! 2. `./npu-lower.toml` (current directory)
//! 3. `./.npu-lower.toml` (dotfile)
//! 4. `<user config dir>/npu-lower/config.toml`
//!
//! # Example Config File
//!
//! ```toml
//! [npu-lower]
//! variant = "n78"
//! strategy3 = false
//! dump_debug_files = true
//! debug_dir = "/tmp/npu"
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::{CompilerError, Result};

/// Environment variable naming an explicit config file
pub const CONFIG_ENV_VAR: &str = "NPU_LOWER_CONFIG";

/// Root of a config file: either a `[npu-lower]` section or bare keys
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct RootConfig {
    #[serde(rename = "npu-lower", skip_serializing_if = "Option::is_none")]
    npu_lower: Option<CompilerConfig>,

    #[serde(flatten, skip_serializing_if = "Option::is_none")]
    direct: Option<CompilerConfig>,
}

/// Compiler configuration loaded from TOML file
///
/// Absent keys take their defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompilerConfig {
    /// Target hardware variant
    pub variant: String,

    pub strategy0: bool,
    pub strategy1: bool,
    pub strategy3: bool,
    pub strategy4: bool,
    pub strategy6: bool,
    pub strategy7: bool,

    /// Dump the accelerator's RAM after inference
    pub dump_ram: bool,
    /// Dump SRAM before inference
    pub initial_sram_dump: bool,

    pub block_config_16x16: bool,
    pub block_config_32x8: bool,
    pub block_config_8x32: bool,
    pub block_config_8x8: bool,

    pub enable_intermediate_compression: bool,
    pub disable_winograd: bool,

    /// Write networks and IR dumps to `debug_dir`
    pub dump_debug_files: bool,
    pub debug_dir: PathBuf,

    pub enable_cascading: bool,
}

impl Default for CompilerConfig {
    fn default() -> Self {
        Self {
            variant: "n77".to_string(),
            strategy0: true,
            strategy1: true,
            strategy3: true,
            strategy4: true,
            strategy6: true,
            strategy7: true,
            dump_ram: false,
            initial_sram_dump: false,
            block_config_16x16: true,
            block_config_32x8: true,
            block_config_8x32: true,
            block_config_8x8: true,
            enable_intermediate_compression: true,
            disable_winograd: false,
            dump_debug_files: false,
            debug_dir: PathBuf::from("/tmp/"),
            enable_cascading: false,
        }
    }
}

impl CompilerConfig {
    /// Load config from TOML file
    ///
    /// Accepts both the sectioned (`[npu-lower]`) and the direct format; the
    /// section wins when both are present.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| {
            CompilerError::Config(format!("failed to read config file {}: {}", path.display(), e))
        })?;

        Self::from_toml_str(&contents).map_err(|e| match e {
            CompilerError::Config(msg) => {
                CompilerError::Config(format!("{}: {}", path.display(), msg))
            }
            other => other,
        })
    }

    /// Parse config from TOML text
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let root: RootConfig = toml::from_str(contents)?;
        Ok(root.npu_lower.or(root.direct).unwrap_or_default())
    }

    /// Find and load config file from standard locations
    ///
    /// Returns `None` if no config file found. A file named by
    /// `NPU_LOWER_CONFIG` must exist.
    pub fn find_and_load() -> Result<Option<Self>> {
        let explicit = std::env::var_os(CONFIG_ENV_VAR).map(PathBuf::from);
        Self::find_in(explicit, &Self::search_paths())
    }

    fn find_in(explicit: Option<PathBuf>, candidates: &[PathBuf]) -> Result<Option<Self>> {
        if let Some(explicit) = explicit {
            tracing::debug!("Loading config from ${}", CONFIG_ENV_VAR);
            return Ok(Some(Self::load(explicit)?));
        }

        for candidate in candidates {
            if candidate.exists() {
                tracing::debug!("Loading config from {}", candidate.display());
                return Ok(Some(Self::load(candidate)?));
            }
        }

        Ok(None)
    }

    /// Standard config file locations, in search order
    pub fn search_paths() -> Vec<PathBuf> {
        let mut paths = vec![
            PathBuf::from("./npu-lower.toml"),
            PathBuf::from("./.npu-lower.toml"),
        ];
        if let Some(config_dir) = dirs::config_dir() {
            paths.push(config_dir.join("npu-lower").join("config.toml"));
        }
        paths
    }

    /// Save config to TOML file (sectioned format)
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let root = RootConfig {
            npu_lower: Some(self.clone()),
            direct: None,
        };
        let contents =
            toml::to_string_pretty(&root).map_err(|e| CompilerError::Config(e.to_string()))?;
        std::fs::write(path.as_ref(), contents)?;
        Ok(())
    }
}
