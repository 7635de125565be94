use serde::Deserialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::fs;
use anyhow::{Context, Result};

pub const COUNTIES_URL: &str =
    "https://cdn.freecodecamp.org/testable-projects-fcc/data/choropleth_map/counties.json";
pub const EDUCATION_URL: &str =
    "https://cdn.freecodecamp.org/testable-projects-fcc/data/choropleth_map/for_user_education.json";

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct AppConfig {
    pub input: InputConfig,
    pub map: MapConfig,
    pub legend: LegendConfig,
    pub output: OutputConfig,
    pub server: ServerConfig,
}

/// Where a dataset comes from. Anything starting with `http://` or
/// `https://` is fetched, everything else is treated as a local path.
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
#[serde(from = "String")]
pub enum Source {
    Url(String),
    File(PathBuf),
}

impl From<String> for Source {
    fn from(value: String) -> Self {
        if value.starts_with("http://") || value.starts_with("https://") {
            Source::Url(value)
        } else {
            Source::File(PathBuf::from(value))
        }
    }
}

impl From<&str> for Source {
    fn from(value: &str) -> Self {
        Source::from(value.to_string())
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Source::Url(url) => write!(f, "{}", url),
            Source::File(path) => write!(f, "{}", path.display()),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct InputConfig {
    pub counties: Source,
    pub education: Source,
    /// Name of the object inside the topology holding the county geometries.
    pub topology_object: String,
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            counties: Source::from(COUNTIES_URL),
            education: Source::from(EDUCATION_URL),
            topology_object: "counties".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct MapConfig {
    pub width: u32,
    pub height: u32,
    pub neutral_fill: String,
    pub title: String,
    pub description: String,
}

impl Default for MapConfig {
    fn default() -> Self {
        Self {
            width: 1000,
            height: 650,
            neutral_fill: "white".to_string(),
            title: "United States Educational Attainment".to_string(),
            description: "Percentage of adults age 25 and older with a bachelor's degree or higher (2010-2014)".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct LegendConfig {
    pub steps: usize,
    pub x: f64,
    pub y: f64,
    pub swatch: f64,
}

impl Default for LegendConfig {
    fn default() -> Self {
        Self { steps: 10, x: 900.0, y: 200.0, swatch: 20.0 }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct OutputConfig {
    pub dir: PathBuf,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self { dir: PathBuf::from("output") }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { port: 3000 }
    }
}

impl AppConfig {
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        let config: AppConfig = toml::from_str(&content)
            .with_context(|| "Failed to parse TOML configuration")?;
        Ok(config)
    }

    /// Like [`AppConfig::load_from_file`], but a missing file means defaults.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load_from_file(path)
        } else {
            tracing::info!(path = %path.display(), "config file not found, using defaults");
            Ok(Self::default())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn empty_file_yields_defaults() {
        let config: AppConfig = toml::from_str("").unwrap();
        assert_eq!(config.map.width, 1000);
        assert_eq!(config.map.height, 650);
        assert_eq!(config.legend.steps, 10);
        assert_eq!(config.input.counties, Source::Url(COUNTIES_URL.to_string()));
        assert_eq!(config.input.topology_object, "counties");
    }

    #[test]
    fn source_distinguishes_urls_from_paths() {
        assert_eq!(
            Source::from("https://example.org/a.json"),
            Source::Url("https://example.org/a.json".to_string())
        );
        assert_eq!(
            Source::from("data/education.json"),
            Source::File(PathBuf::from("data/education.json"))
        );
    }

    #[test]
    fn partial_file_overrides_selected_fields() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[input]\neducation = \"fixtures/edu.json\"\n\n[legend]\nsteps = 5\n\n[server]\nport = 8080"
        )
        .unwrap();

        let config = AppConfig::load_from_file(file.path()).unwrap();
        assert_eq!(config.input.education, Source::File(PathBuf::from("fixtures/edu.json")));
        assert_eq!(config.input.counties, Source::Url(COUNTIES_URL.to_string()));
        assert_eq!(config.legend.steps, 5);
        assert_eq!(config.legend.x, 900.0);
        assert_eq!(config.server.port, 8080);
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = AppConfig::load_or_default(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config.output.dir, PathBuf::from("output"));
    }

    #[test]
    fn malformed_file_is_an_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[map\nwidth = ").unwrap();
        assert!(AppConfig::load_from_file(file.path()).is_err());
    }
}
