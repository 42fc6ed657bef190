use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::error::TaintResult;
use crate::ir::FuncRef;
use crate::taint_ensure;

/// Analysis configuration: which call seeds taint and which namespaces
/// count as sinks. Loaded from `nowtaint.toml`; defaults match the
/// canonical pairing of `time.Now` and the Cloud Spanner client.
#[derive(Debug, Clone, Deserialize)]
pub struct TaintConfig {
    #[serde(default)]
    pub source: SourceSpec,

    #[serde(default)]
    pub sinks: SinkSpec,
}

impl Default for TaintConfig {
    fn default() -> Self {
        Self {
            source: SourceSpec::default(),
            sinks: SinkSpec::default(),
        }
    }
}

impl TaintConfig {
    /// Reject configurations that would silently analyze nothing.
    pub fn validate(&self) -> TaintResult<()> {
        taint_ensure!(
            !self.source.package.is_empty() && !self.source.name.is_empty(),
            "source function must have a non-empty package and name"
        );
        taint_ensure!(
            !self.sinks.packages.is_empty(),
            "at least one sink namespace pattern is required"
        );
        Ok(())
    }
}

/// The single designated source operation, matched by exact qualified name
/// plus owning package path.
#[derive(Debug, Clone, Deserialize)]
pub struct SourceSpec {
    pub package: String,
    pub name: String,
}

impl Default for SourceSpec {
    fn default() -> Self {
        Self {
            package: "time".to_string(),
            name: "Now".to_string(),
        }
    }
}

impl SourceSpec {
    /// True iff `fr` is exactly the designated source function.
    pub fn matches(&self, fr: &FuncRef) -> bool {
        fr.package == self.package && fr.name == self.name
    }
}

/// Namespace patterns identifying the sink API family. A callee whose
/// owning package path contains any pattern is a sink.
#[derive(Debug, Clone, Deserialize)]
pub struct SinkSpec {
    pub packages: Vec<String>,
}

impl Default for SinkSpec {
    fn default() -> Self {
        Self {
            packages: vec!["cloud.google.com/go/spanner".to_string()],
        }
    }
}

pub const DEFAULT_CONFIG_FILE_NAME: &str = "nowtaint.toml";

pub fn find_config_file(start_dir: &Path) -> Option<PathBuf> {
    let mut cur = Some(start_dir);
    while let Some(dir) = cur {
        let candidate = dir.join(DEFAULT_CONFIG_FILE_NAME);
        if candidate.is_file() {
            return Some(candidate);
        }
        cur = dir.parent();
    }
    None
}

pub fn load_config_file(path: &Path) -> Result<TaintConfig> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config file: {}", path.display()))?;
    let cfg: TaintConfig = toml::from_str(&raw)
        .with_context(|| format!("failed to parse config file: {}", path.display()))?;
    Ok(cfg)
}

pub fn load_config(
    explicit_path: Option<&Path>,
    start_dir: &Path,
) -> Result<Option<(PathBuf, TaintConfig)>> {
    if let Some(p) = explicit_path {
        let cfg = load_config_file(p)?;
        return Ok(Some((p.to_path_buf(), cfg)));
    }

    let Some(p) = find_config_file(start_dir) else {
        return Ok(None);
    };
    let cfg = load_config_file(&p)?;
    Ok(Some((p, cfg)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_targets_time_now_and_spanner() {
        let cfg = TaintConfig::default();
        assert!(cfg.source.matches(&FuncRef::new("time", "Now")));
        assert!(!cfg.source.matches(&FuncRef::new("mytime", "Now")));
        assert_eq!(cfg.sinks.packages, vec!["cloud.google.com/go/spanner"]);
        cfg.validate().expect("defaults are valid");
    }

    #[test]
    fn toml_overrides_source_and_sinks() {
        let raw = r#"
[source]
package = "clock"
name = "ReadMonotonic"

[sinks]
packages = ["example.com/storage", "example.com/kv"]
"#;
        let cfg: TaintConfig = toml::from_str(raw).expect("parse");
        assert!(cfg.source.matches(&FuncRef::new("clock", "ReadMonotonic")));
        assert_eq!(cfg.sinks.packages.len(), 2);
    }

    #[test]
    fn empty_sink_list_is_rejected() {
        let raw = r#"
[sinks]
packages = []
"#;
        let cfg: TaintConfig = toml::from_str(raw).expect("parse");
        assert!(cfg.validate().is_err());
    }
}
