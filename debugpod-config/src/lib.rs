// Copyright 2025 The Debugpod Authors. All rights reserved.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//    http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Operator configuration for `kubectl-debugpod`.
//!
//! The only setting is the helper image. It is read from an optional YAML file
//! named `.kubectl-debugpod.yaml` (or `.yml`) in `$HOME` or the working
//! directory, and is always overridden by an explicit `--image` flag.

pub mod serde_utils;

use std::path::{Path, PathBuf};

use debugpod_error::{Error, ResultExt};
use serde::Deserialize;
use tracing::debug;

use crate::serde_utils::convert_optional_string_with_shellexpand;

/// File name of the configuration file, without extension.
pub const CONFIG_FILE_STEM: &str = ".kubectl-debugpod";

/// Extensions tried for every search directory, in order.
pub const CONFIG_FILE_EXTENSIONS: [&str; 2] = ["yaml", "yml"];

/// Image used by the helper pod when neither the flag nor the config file
/// names one.
pub const DEFAULT_IMAGE: &str = "docker.io/centos:latest";

#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
pub struct DebugpodConfig {
    /// Image used by the helper pod.
    ///
    /// Environment variables in the value are expanded, eg: `${REGISTRY}/toolbox:latest`.
    #[serde(default, deserialize_with = "convert_optional_string_with_shellexpand")]
    pub image: Option<String>,
}

impl DebugpodConfig {
    /// Parses a YAML document. An empty document is an empty config.
    pub fn from_yaml(contents: &str) -> Result<Self, Error> {
        if contents.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(contents).err_tip(|| "While parsing kubectl-debugpod configuration")
    }

    pub fn load(path: &Path) -> Result<Self, Error> {
        let contents = std::fs::read_to_string(path)
            .err_tip(|| format!("Failed to read configuration file {}", path.display()))?;
        Self::from_yaml(&contents)
            .err_tip(|| format!("Invalid configuration file {}", path.display()))
    }

    /// Candidate file locations, in lookup order.
    pub fn search_paths(dirs: &[PathBuf]) -> Vec<PathBuf> {
        dirs.iter()
            .flat_map(|dir| {
                CONFIG_FILE_EXTENSIONS
                    .iter()
                    .map(move |ext| dir.join(format!("{CONFIG_FILE_STEM}.{ext}")))
            })
            .collect()
    }

    /// Loads the first configuration file found in `dirs`.
    pub fn discover_in(dirs: &[PathBuf]) -> Result<Option<(PathBuf, Self)>, Error> {
        for candidate in Self::search_paths(dirs) {
            if !candidate.is_file() {
                continue;
            }
            let config = Self::load(&candidate)?;
            debug!(path = %candidate.display(), "Loaded configuration file");
            return Ok(Some((candidate, config)));
        }
        Ok(None)
    }

    /// Looks in `$HOME`, then the working directory.
    pub fn discover() -> Result<Option<(PathBuf, Self)>, Error> {
        let mut dirs = Vec::with_capacity(2);
        if let Some(home) = std::env::var_os("HOME").filter(|home| !home.is_empty()) {
            dirs.push(PathBuf::from(home));
        }
        dirs.push(std::env::current_dir().err_tip(|| "Could not read the working directory")?);
        Self::discover_in(&dirs)
    }

    /// Flag, then config file, then [`DEFAULT_IMAGE`]. Empty values count as
    /// unset.
    pub fn resolve_image(&self, flag: Option<&str>) -> String {
        flag.filter(|image| !image.is_empty())
            .or_else(|| self.image.as_deref().filter(|image| !image.is_empty()))
            .unwrap_or(DEFAULT_IMAGE)
            .to_string()
    }
}
