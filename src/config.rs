// src/config.rs

//! Resolver configuration
//!
//! Loaded from a TOML file with every key optional:
//!
//! ```toml
//! root = "/"
//! transaction_color = 3
//! netshared_paths = ["/usr/share/nfs"]
//! install_langs = ["en", "de"]
//! max_order_rescans = 10
//! dependency_whiteout = ["glibc-common>glibc"]
//!
//! [filter]
//! replace_old_files = true
//! ```

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Problem kinds the caller chooses not to hear about
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProblemFilter {
    pub ignore_os: bool,
    pub ignore_arch: bool,
    /// Allow reinstalling an identical installed package
    pub replace_pkg: bool,
    /// Apply relocations even to paths that are not relocatable
    pub force_relocate: bool,
    /// Conflicts between two packages of this transaction
    pub replace_new_files: bool,
    /// Conflicts with files of installed packages
    pub replace_old_files: bool,
    /// Allow installing an older version than the installed one
    pub old_package: bool,
    pub disk_space: bool,
    pub disk_nodes: bool,
}

/// Policy knobs for a resolver run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolverConfig {
    /// Install root; fingerprints and disk probes are resolved below it
    pub root: PathBuf,

    /// Multilib color mask of the transaction (0 disables coloring)
    pub transaction_color: u32,

    /// Color that wins colored file conflicts (2 = ELF64)
    pub preferred_color: u32,

    /// Path prefixes on shared network filesystems
    pub netshared_paths: Vec<String>,

    /// Languages to install; empty or `all` installs every language
    pub install_langs: Vec<String>,

    pub exclude_docs: bool,
    pub no_configs: bool,

    /// Keep the caller's element order instead of successor-count ordering
    pub presentation_order: bool,

    /// How many times ordering restarts after breaking dependency loops
    pub max_order_rescans: u32,

    /// Use the persistent dependency result cache
    pub dependency_cache: bool,

    /// `requirer>provider` pairs whose ordering edges are ignored
    pub dependency_whiteout: Vec<String>,

    /// Accepted architectures; empty accepts any
    pub compat_arches: Vec<String>,

    /// Accepted operating systems; empty accepts any
    pub compat_os: Vec<String>,

    /// Do not look up suggested providers for missing requirements
    pub no_suggest: bool,

    /// Create missing `%missingok` config files instead of skipping them
    pub all_files: bool,

    pub filter: ProblemFilter,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("/"),
            transaction_color: 0,
            preferred_color: 2,
            netshared_paths: Vec::new(),
            install_langs: Vec::new(),
            exclude_docs: false,
            no_configs: false,
            presentation_order: false,
            max_order_rescans: 10,
            dependency_cache: true,
            dependency_whiteout: Vec::new(),
            compat_arches: Vec::new(),
            compat_os: Vec::new(),
            no_suggest: false,
            all_files: false,
            filter: ProblemFilter::default(),
        }
    }
}

impl ResolverConfig {
    /// Load and validate a configuration file
    pub fn load(path: &Path) -> Result<Self> {
        debug!("Loading resolver config from {}", path.display());
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Parse and validate configuration text
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: ResolverConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Configuration rooted somewhere other than `/`
    pub fn with_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.root = root.into();
        self
    }

    pub fn with_filter(mut self, filter: ProblemFilter) -> Self {
        self.filter = filter;
        self
    }

    pub fn with_transaction_color(mut self, color: u32) -> Self {
        self.transaction_color = color;
        self
    }

    pub fn with_presentation_order(mut self, enabled: bool) -> Self {
        self.presentation_order = enabled;
        self
    }

    /// Check values that serde cannot
    pub fn validate(&self) -> Result<()> {
        if !self.root.is_absolute() {
            return Err(Error::ConfigError(format!(
                "root must be an absolute path, got {}",
                self.root.display()
            )));
        }

        for prefix in &self.netshared_paths {
            if !prefix.starts_with('/') {
                return Err(Error::ConfigError(format!(
                    "netshared path '{}' is not absolute",
                    prefix
                )));
            }
        }

        if self.transaction_color != 0 && self.preferred_color & self.transaction_color == 0 {
            return Err(Error::ConfigError(format!(
                "preferred_color {} is outside transaction_color {}",
                self.preferred_color, self.transaction_color
            )));
        }

        self.whiteout_pairs()?;
        Ok(())
    }

    /// Parse `dependency_whiteout` into (requirer, provider) pairs
    pub fn whiteout_pairs(&self) -> Result<Vec<(String, String)>> {
        self.dependency_whiteout
            .iter()
            .map(|entry| {
                let (requirer, provider) = entry.split_once('>').ok_or_else(|| {
                    Error::ConfigError(format!(
                        "whiteout entry '{}' is not of the form requirer>provider",
                        entry
                    ))
                })?;
                let (requirer, provider) = (requirer.trim(), provider.trim());
                if requirer.is_empty() || provider.is_empty() {
                    return Err(Error::ConfigError(format!(
                        "whiteout entry '{}' has an empty side",
                        entry
                    )));
                }
                Ok((requirer.to_string(), provider.to_string()))
            })
            .collect()
    }

    /// Does the language list of a file pass `install_langs`?
    pub fn lang_allowed(&self, langs: &[String]) -> bool {
        if langs.is_empty()
            || self.install_langs.is_empty()
            || self.install_langs.iter().any(|l| l == "all")
        {
            return true;
        }
        langs.iter().any(|file_lang| {
            file_lang.is_empty()
                || self
                    .install_langs
                    .iter()
                    .any(|wanted| wanted.starts_with(file_lang.as_str()))
        })
    }

    /// Does a path lie under one of the `netshared_paths` prefixes?
    pub fn is_netshared(&self, path: &str) -> bool {
        self.netshared_paths.iter().any(|prefix| {
            let prefix = prefix.trim_end_matches('/');
            match path.strip_prefix(prefix) {
                Some(rest) => rest.is_empty() || rest.starts_with('/'),
                None => false,
            }
        })
    }
}
