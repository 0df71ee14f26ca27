//! Compilation options passed to the support library

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::PathBuf;

use crate::config::CompilerConfig;

/// Cascading strategies the accelerator compiler may try
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Strategy {
    Strategy0,
    Strategy1,
    Strategy3,
    Strategy4,
    Strategy6,
    Strategy7,
}

/// Block sizes (width x height) the accelerator compiler may use
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct BlockConfig {
    pub width: u32,
    pub height: u32,
}

impl BlockConfig {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DebugOptions {
    pub dump_ram: bool,
    pub initial_sram_dump: bool,
    pub dump_debug_files: bool,
    pub debug_dir: PathBuf,
}

/// Options for one call to [`SupportLibrary::compile`](super::SupportLibrary::compile)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompilationOptions {
    /// Target hardware variant, e.g. `n77`
    pub variant: String,
    pub strategies: BTreeSet<Strategy>,
    pub block_configs: BTreeSet<BlockConfig>,
    pub enable_intermediate_compression: bool,
    pub disable_winograd: bool,
    pub enable_cascading: bool,
    pub debug: DebugOptions,
}

impl CompilationOptions {
    /// Translate the flat configuration flags into compiler options
    pub fn from_config(config: &CompilerConfig) -> Self {
        let strategies = [
            (config.strategy0, Strategy::Strategy0),
            (config.strategy1, Strategy::Strategy1),
            (config.strategy3, Strategy::Strategy3),
            (config.strategy4, Strategy::Strategy4),
            (config.strategy6, Strategy::Strategy6),
            (config.strategy7, Strategy::Strategy7),
        ]
        .into_iter()
        .filter_map(|(enabled, strategy)| enabled.then_some(strategy))
        .collect();

        let block_configs = [
            (config.block_config_16x16, BlockConfig::new(16, 16)),
            (config.block_config_32x8, BlockConfig::new(32, 8)),
            (config.block_config_8x32, BlockConfig::new(8, 32)),
            (config.block_config_8x8, BlockConfig::new(8, 8)),
        ]
        .into_iter()
        .filter_map(|(enabled, block)| enabled.then_some(block))
        .collect();

        Self {
            variant: config.variant.clone(),
            strategies,
            block_configs,
            enable_intermediate_compression: config.enable_intermediate_compression,
            disable_winograd: config.disable_winograd,
            enable_cascading: config.enable_cascading,
            debug: DebugOptions {
                dump_ram: config.dump_ram,
                initial_sram_dump: config.initial_sram_dump,
                dump_debug_files: config.dump_debug_files,
                debug_dir: config.debug_dir.clone(),
            },
        }
    }
}

impl Default for CompilationOptions {
    fn default() -> Self {
        Self::from_config(&CompilerConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_enable_everything() {
        let options = CompilationOptions::default();
        assert_eq!(options.variant, "n77");
        assert_eq!(options.strategies.len(), 6);
        assert_eq!(options.block_configs.len(), 4);
        assert!(options.enable_intermediate_compression);
        assert!(!options.debug.dump_debug_files);
    }

    #[test]
    fn test_disabled_flags_are_dropped() {
        let config = CompilerConfig {
            strategy3: false,
            block_config_8x8: false,
            disable_winograd: true,
            ..Default::default()
        };
        let options = CompilationOptions::from_config(&config);

        assert!(!options.strategies.contains(&Strategy::Strategy3));
        assert!(options.strategies.contains(&Strategy::Strategy7));
        assert!(!options.block_configs.contains(&BlockConfig::new(8, 8)));
        assert!(options.block_configs.contains(&BlockConfig::new(32, 8)));
        assert!(options.disable_winograd);
    }
}
