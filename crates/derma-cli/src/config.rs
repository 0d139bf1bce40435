use std::path::PathBuf;
use std::str::FromStr;

/// Face detector backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetectorKind {
    /// Built-in skin-blob heuristic; needs no model files.
    Skin,
    /// SCRFD ONNX model from `model_dir`.
    Scrfd,
}

impl FromStr for DetectorKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "skin" | "skin-blob" => Ok(Self::Skin),
            "scrfd" => Ok(Self::Scrfd),
            other => Err(format!("unknown detector '{other}' (expected 'skin' or 'scrfd')")),
        }
    }
}

/// Runtime configuration, loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Optional TOML file with pipeline thresholds.
    pub config_path: Option<PathBuf>,
    /// Optional JSON catalog; the built-in catalog is used otherwise.
    pub catalog_path: Option<PathBuf>,
    /// Which detector backend to construct.
    pub detector: DetectorKind,
    /// Directory containing ONNX model files.
    pub model_dir: PathBuf,
    /// Number of engine worker threads.
    pub workers: usize,
    /// Deadline in seconds for a single analysis.
    pub timeout_secs: u64,
}

impl Config {
    /// Load configuration from `DERMA_*` environment variables with defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) with an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let model_dir = lookup("DERMA_MODEL_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| default_data_dir(&lookup).join("models"));

        let detector = match lookup("DERMA_DETECTOR") {
            Some(raw) => raw.parse().unwrap_or_else(|e: String| {
                tracing::warn!(error = %e, "falling back to skin detector");
                DetectorKind::Skin
            }),
            None => DetectorKind::Skin,
        };

        let default_workers = std::thread::available_parallelism()
            .map(|n| n.get().min(4))
            .unwrap_or(2);

        Self {
            config_path: lookup("DERMA_CONFIG_PATH").map(PathBuf::from),
            catalog_path: lookup("DERMA_CATALOG_PATH").map(PathBuf::from),
            detector,
            model_dir,
            workers: env_usize(&lookup, "DERMA_WORKERS", default_workers).max(1),
            timeout_secs: env_u64(&lookup, "DERMA_TIMEOUT_SECS", 30).max(1),
        }
    }

    /// Path to the SCRFD detection model.
    pub fn scrfd_model_path(&self) -> PathBuf {
        self.model_dir.join("det_10g.onnx")
    }
}

fn default_data_dir(lookup: &impl Fn(&str) -> Option<String>) -> PathBuf {
    lookup("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|| {
            let home = lookup("HOME").unwrap_or_else(|| "/tmp".to_string());
            PathBuf::from(home).join(".local/share")
        })
        .join("derma")
}

fn env_u64(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: u64) -> u64 {
    lookup(key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_usize(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: usize) -> usize {
    lookup(key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(vars: &[(&str, &str)]) -> Config {
        let vars: HashMap<String, String> = vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config_from(&[("HOME", "/home/ana")]);
        assert_eq!(config.detector, DetectorKind::Skin);
        assert_eq!(config.model_dir, PathBuf::from("/home/ana/.local/share/derma/models"));
        assert!(config.config_path.is_none());
        assert!(config.catalog_path.is_none());
        assert!(config.workers >= 1);
        assert_eq!(config.timeout_secs, 30);
    }

    #[test]
    fn test_overrides() {
        let config = config_from(&[
            ("DERMA_DETECTOR", "SCRFD"),
            ("DERMA_MODEL_DIR", "/opt/models"),
            ("DERMA_WORKERS", "3"),
            ("DERMA_TIMEOUT_SECS", "5"),
            ("DERMA_CATALOG_PATH", "/etc/derma/catalog.json"),
        ]);
        assert_eq!(config.detector, DetectorKind::Scrfd);
        assert_eq!(config.scrfd_model_path(), PathBuf::from("/opt/models/det_10g.onnx"));
        assert_eq!(config.workers, 3);
        assert_eq!(config.timeout_secs, 5);
        assert_eq!(config.catalog_path, Some(PathBuf::from("/etc/derma/catalog.json")));
    }

    #[test]
    fn test_unparseable_values_fall_back() {
        let config = config_from(&[
            ("DERMA_DETECTOR", "haar"),
            ("DERMA_WORKERS", "many"),
            ("DERMA_TIMEOUT_SECS", "0"),
        ]);
        assert_eq!(config.detector, DetectorKind::Skin);
        assert!(config.workers >= 1);
        assert_eq!(config.timeout_secs, 1);
    }

    #[test]
    fn test_xdg_data_home() {
        let config = config_from(&[("XDG_DATA_HOME", "/data")]);
        assert_eq!(config.model_dir, PathBuf::from("/data/derma/models"));
    }
}
