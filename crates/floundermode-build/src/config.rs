use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::BuildError;

pub const DEFAULT_CONFIG_FILE: &str = "floundermode.yaml";

/// Where the generator reads from and writes to.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SiteConfig {
    pub terms_dir: PathBuf,
    pub output_dir: PathBuf,
    pub template: PathBuf,
    pub manifest: PathBuf,
    pub base_url: String,
    /// Render dirty pages with live vote tallies from the configured backend.
    pub live_votes: bool,
    /// Vote database the local backend reads live tallies from.
    pub votes_db: Option<PathBuf>,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            terms_dir: PathBuf::from("terms"),
            output_dir: PathBuf::from("site/terms"),
            template: PathBuf::from("templates/term.html"),
            manifest: PathBuf::from("site/terms-manifest.json"),
            base_url: "https://floundermode.com".to_string(),
            live_votes: false,
            votes_db: None,
        }
    }
}

impl SiteConfig {
    /// Read `path` if it exists, then apply `FLOUNDER_*` environment overrides.
    ///
    /// # Errors
    /// Returns [`BuildError::Io`] when the file exists but cannot be read, and
    /// [`BuildError::Config`] when it is not a valid site config.
    pub fn load(path: &Path) -> Result<Self, BuildError> {
        let yaml = match fs::read_to_string(path) {
            Ok(yaml) => Some(yaml),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => None,
            Err(source) => return Err(BuildError::Io { path: path.to_path_buf(), source }),
        };
        Self::from_sources(yaml.as_deref(), |key| std::env::var(key).ok())
    }

    /// # Errors
    /// Returns [`BuildError::Config`] when `yaml` does not describe a site config.
    pub fn from_sources(
        yaml: Option<&str>,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, BuildError> {
        let mut config = match yaml.filter(|yaml| !yaml.trim().is_empty()) {
            Some(yaml) => serde_yaml::from_str::<Self>(yaml)
                .map_err(|err| BuildError::Config(format!("invalid {DEFAULT_CONFIG_FILE}: {err}")))?,
            None => Self::default(),
        };

        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());
        if let Some(dir) = get("FLOUNDER_TERMS_DIR") {
            config.terms_dir = PathBuf::from(dir);
        }
        if let Some(dir) = get("FLOUNDER_OUTPUT_DIR") {
            config.output_dir = PathBuf::from(dir);
        }
        if let Some(template) = get("FLOUNDER_TEMPLATE") {
            config.template = PathBuf::from(template);
        }
        if let Some(manifest) = get("FLOUNDER_MANIFEST") {
            config.manifest = PathBuf::from(manifest);
        }
        if let Some(base_url) = get("FLOUNDER_BASE_URL") {
            config.base_url = base_url;
        }
        if let Some(votes_db) = get("FLOUNDER_VOTES_DB") {
            config.votes_db = Some(PathBuf::from(votes_db));
        }
        Ok(config)
    }
}
