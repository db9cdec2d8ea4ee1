use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use super::env_string;

/// Filesystem locations the subsystem reads and writes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    #[serde(default = "d_data_dir")]
    pub data_dir: PathBuf,
    #[serde(default = "d_db_path")]
    pub db_path: PathBuf,
    #[serde(default = "d_graph_path")]
    pub graph_path: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            data_dir: d_data_dir(),
            db_path: d_db_path(),
            graph_path: d_graph_path(),
        }
    }
}

impl PathsConfig {
    /// Build from the environment, falling back to compiled-in defaults for
    /// any variable that is unset or fails to parse.
    pub fn from_env() -> Self {
        Self {
            data_dir: env_string("MNEMO_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(d_data_dir),
            db_path: env_string("MNEMO_DB_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(d_db_path),
            graph_path: env_string("MNEMO_GRAPH_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(d_graph_path),
        }
    }
}

fn d_data_dir() -> PathBuf {
    PathBuf::from("./data")
}
fn d_db_path() -> PathBuf {
    PathBuf::from("./data/memory.sqlite3")
}
fn d_graph_path() -> PathBuf {
    PathBuf::from("./data/graph.json")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_under_data_dir() {
        let cfg = PathsConfig::default();
        assert_eq!(cfg.data_dir, PathBuf::from("./data"));
    }
}
