//! The ambient runtime the resolution context is assembled from.
//!
//! Everything the classpath builder needs to know about the invoking host
//! (its loader chain, the runtime home and whether that runtime has a module
//! system) comes through [`AmbientEnvironment`], so tests can substitute a
//! [`StaticEnvironment`].

use std::path::{Path, PathBuf};

pub trait AmbientEnvironment {
    /// Locations visible to each loader of the host, ancestor first.
    fn loader_chain(&self) -> Vec<Vec<String>>;

    /// Directories whose contents count as platform extensions.
    fn extension_dirs(&self) -> Vec<PathBuf>;

    /// Installation directory of the target runtime, if known.
    fn runtime_home(&self) -> Option<PathBuf>;

    /// Whether the target runtime ships a module system.
    fn has_module_system(&self) -> bool;

    /// Path-separator delimited classpath the host runs with.
    fn runtime_classpath(&self) -> Option<String>;
}

/// Capability probe: a modular runtime carries a `lib/modules` image or a
/// `jmods` directory.
pub fn runtime_has_module_system(runtime_home: &Path) -> bool {
    runtime_home.join("lib").join("modules").is_file() || runtime_home.join("jmods").is_dir()
}

/// Environment backed by the configuration of the running process.
#[derive(Debug, Clone, Default)]
pub struct HostEnvironment {
    pub runtime_home: Option<PathBuf>,
    pub extension_dirs: Option<Vec<PathBuf>>,
    pub host_classpath: Option<String>,
    pub runtime_classpath: Option<String>,
}

impl AmbientEnvironment for HostEnvironment {
    fn loader_chain(&self) -> Vec<Vec<String>> {
        match self.host_classpath.as_deref() {
            Some(raw) => vec![split_path_list(raw)],
            None => Vec::new(),
        }
    }

    fn extension_dirs(&self) -> Vec<PathBuf> {
        if let Some(dirs) = self.extension_dirs.clone() {
            return dirs;
        }
        match self.runtime_home.as_deref() {
            Some(home) => vec![home.join("lib").join("ext")],
            None => Vec::new(),
        }
    }

    fn runtime_home(&self) -> Option<PathBuf> {
        self.runtime_home.clone()
    }

    fn has_module_system(&self) -> bool {
        self.runtime_home
            .as_deref()
            .is_some_and(runtime_has_module_system)
    }

    fn runtime_classpath(&self) -> Option<String> {
        self.runtime_classpath.clone()
    }
}

/// Fixed answers, for tests and embedding.
#[derive(Debug, Clone, Default)]
pub struct StaticEnvironment {
    pub loaders: Vec<Vec<String>>,
    pub extension_dirs: Vec<PathBuf>,
    pub runtime_home: Option<PathBuf>,
    pub module_system: bool,
    pub runtime_classpath: Option<String>,
}

impl AmbientEnvironment for StaticEnvironment {
    fn loader_chain(&self) -> Vec<Vec<String>> {
        self.loaders.clone()
    }

    fn extension_dirs(&self) -> Vec<PathBuf> {
        self.extension_dirs.clone()
    }

    fn runtime_home(&self) -> Option<PathBuf> {
        self.runtime_home.clone()
    }

    fn has_module_system(&self) -> bool {
        self.module_system
    }

    fn runtime_classpath(&self) -> Option<String> {
        self.runtime_classpath.clone()
    }
}

pub const PATH_LIST_SEPARATOR: char = if cfg!(windows) { ';' } else { ':' };

/// Split a classpath string on the platform separator and `,`, dropping
/// empty items.
pub fn split_path_list(raw: &str) -> Vec<String> {
    raw.split([PATH_LIST_SEPARATOR, ','])
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
