//! Startup configuration.
//!
//! A flat `key = value` file (`#` comments, string values quoted) layered
//! under `PGVIEW_`-prefixed environment variables. Recognized keys:
//!
//! | key | effect |
//! |---|---|
//! | `platform` | initial backend (`pg`/`sd`/`lb`/`n4`) |
//! | `workspace` | graph created and used after startup |
//! | `typecheck` | enable type errors |
//! | `prunequery` | enable pruning of unsatisfiable branches |
//! | `ivm` | eager refresh of materialized views on base mutation |
//! | `answer` | emit result tuples (vs. count only) |

use figment::providers::{Env, Format, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{Error, Result};

fn default_answer() -> bool {
    true
}

/// Engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Initial backend platform.
    #[serde(default)]
    pub platform: Option<String>,
    /// Graph used after startup.
    #[serde(default)]
    pub workspace: Option<String>,
    /// Enable type errors (default off).
    #[serde(default)]
    pub typecheck: bool,
    /// Enable pruning of unsatisfiable branches (default off).
    #[serde(default)]
    pub prunequery: bool,
    /// Eagerly re-materialize views on base mutation (default off).
    #[serde(default)]
    pub ivm: bool,
    /// Emit result tuples rather than counts (default on).
    #[serde(default = "default_answer")]
    pub answer: bool,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            platform: None,
            workspace: None,
            typecheck: false,
            prunequery: false,
            ivm: false,
            answer: true,
        }
    }
}

impl Config {
    /// Load from a config file with environment overrides.
    pub fn load(path: &Path) -> Result<Config> {
        Figment::new()
            .merge(Toml::file(path))
            .merge(Env::prefixed("PGVIEW_"))
            .extract()
            .map_err(|e| Error::Io(format!("config: {e}")))
    }

    /// Environment-only configuration.
    pub fn from_env() -> Result<Config> {
        Figment::from(Env::prefixed("PGVIEW_"))
            .extract()
            .map_err(|e| Error::Io(format!("config: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let c = Config::default();
        assert!(c.answer);
        assert!(!c.typecheck);
        assert!(!c.prunequery);
        assert!(!c.ivm);
        assert!(c.platform.is_none());
    }

    #[test]
    fn test_load_flat_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pgview.conf");
        let mut f = std::fs::File::create(&path).unwrap();
        writeln!(f, "# startup settings").unwrap();
        writeln!(f, "platform = \"sd\"").unwrap();
        writeln!(f, "workspace = \"g\"").unwrap();
        writeln!(f, "typecheck = true").unwrap();
        writeln!(f, "answer = false").unwrap();
        drop(f);

        let c = Config::load(&path).unwrap();
        assert_eq!(c.platform.as_deref(), Some("sd"));
        assert_eq!(c.workspace.as_deref(), Some("g"));
        assert!(c.typecheck);
        assert!(!c.prunequery);
        assert!(!c.answer);
    }

    #[test]
    fn test_missing_file_yields_defaults() {
        let c = Config::load(Path::new("/nonexistent/pgview.conf")).unwrap();
        assert!(c.platform.is_none());
        assert!(c.answer);
    }
}
