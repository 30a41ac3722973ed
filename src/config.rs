use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use log::{debug, info, warn};
use serde::{Deserialize, Deserializer};
use serde_json::Value;

use crate::auth::Token;
use crate::error::{G2GError, Result};
use crate::gitlab::RetryPolicy;

const SUPPORTED_PROTOCOLS: &[&str] = &["bolt", "bolt+s", "bolt+ssc", "neo4j", "neo4j+s", "neo4j+ssc"];

/// Configuration of one project pipeline.
///
/// The `gitlab`, `neo4j` and `project` sections are validated. Every other
/// top-level section is carried verbatim in [`PassThrough`] and handed to the
/// extractor without interpretation.
#[derive(Debug, Clone, Deserialize)]
pub struct ProjectConfig {
    pub gitlab: GitLabSection,

    pub neo4j: Neo4jSection,

    pub project: ProjectSection,

    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GitLabSection {
    /// Personal access token
    pub token: Token,

    /// GitLab instance base URL
    #[serde(default = "default_gitlab_url")]
    pub url: String,

    /// Records requested per page (GitLab caps this at 100)
    #[serde(default = "default_per_page")]
    pub per_page: u32,

    /// Attempts per request before a transient failure is reported
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Initial backoff delay in milliseconds, doubled on every retry
    #[serde(default = "default_retry_base_ms")]
    pub retry_base_ms: u64,

    /// Upper bound for a single backoff delay in milliseconds
    #[serde(default = "default_retry_max_ms")]
    pub retry_max_ms: u64,
}

#[derive(Clone, Deserialize)]
pub struct Neo4jSection {
    pub hostname: String,
    pub protocol: String,
    pub port: u16,
    pub db: String,
    pub user: String,
    pub password: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProjectSection {
    /// Numeric project id or `group/project` path
    #[serde(deserialize_with = "string_or_number")]
    pub project_id: String,
}

/// Sections of the configuration that the core does not interpret.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PassThrough(BTreeMap<String, Value>);

fn default_gitlab_url() -> String {
    "https://gitlab.com".to_string()
}

fn default_per_page() -> u32 {
    100
}

fn default_max_attempts() -> u32 {
    5
}

fn default_retry_base_ms() -> u64 {
    500
}

fn default_retry_max_ms() -> u64 {
    30_000
}

fn string_or_number<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Number(i64),
        Text(String),
    }

    Ok(match Raw::deserialize(deserializer)? {
        Raw::Number(n) => n.to_string(),
        Raw::Text(s) => s,
    })
}

impl fmt::Debug for Neo4jSection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Neo4jSection")
            .field("hostname", &self.hostname)
            .field("protocol", &self.protocol)
            .field("port", &self.port)
            .field("db", &self.db)
            .field("user", &self.user)
            .field("password", &"***")
            .finish()
    }
}

impl Neo4jSection {
    /// Connection URI, e.g. `bolt://localhost:7687`.
    pub fn uri(&self) -> String {
        format!("{}://{}:{}", self.protocol, self.hostname, self.port)
    }
}

impl GitLabSection {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts.max(1),
            base_delay: Duration::from_millis(self.retry_base_ms),
            max_delay: Duration::from_millis(self.retry_max_ms.max(self.retry_base_ms)),
        }
    }

    pub fn page_size(&self) -> u32 {
        self.per_page.clamp(1, 100)
    }
}

const PAGINATION_KEYS: [&str; 2] = ["page", "per_page"];

impl PassThrough {
    /// Scalar entries of `section` rendered as query parameters.
    ///
    /// Nested tables and arrays are skipped; they have no query-string form.
    /// `page` and `per_page` belong to pagination (`gitlab.per_page`) and are
    /// never forwarded.
    pub fn query_params(&self, section: &str) -> Vec<(String, String)> {
        let Some(Value::Object(entries)) = self.0.get(section) else {
            return Vec::new();
        };

        entries
            .iter()
            .filter_map(|(key, value)| {
                if PAGINATION_KEYS.contains(&key.as_str()) {
                    warn!("Ignoring {section}.{key}: page size is set by gitlab.per_page");
                    return None;
                }
                let rendered = match value {
                    Value::String(s) => s.clone(),
                    Value::Number(n) => n.to_string(),
                    Value::Bool(b) => b.to_string(),
                    _ => {
                        debug!("Skipping non-scalar pass-through entry {section}.{key}");
                        return None;
                    }
                };
                Some((key.clone(), rendered))
            })
            .collect()
    }
}

impl ProjectConfig {
    /// Resolves a configuration identifier to a file.
    ///
    /// An identifier naming an existing path is used as-is, anything else is
    /// looked up inside `config_dir`.
    pub fn resolve(identifier: &str, config_dir: &Path) -> Result<PathBuf> {
        let direct = PathBuf::from(identifier);
        if direct.is_file() {
            return Ok(direct);
        }

        let candidate = config_dir.join(identifier);
        if candidate.is_file() {
            Ok(candidate)
        } else {
            Err(G2GError::Config(format!(
                "Configuration {} not found.",
                candidate.display()
            )))
        }
    }

    /// Resolves, parses and validates a configuration.
    pub fn load(identifier: &str, config_dir: &Path) -> Result<Self> {
        let path = Self::resolve(identifier, config_dir)?;
        info!("Parsing configuration {}", path.display());
        let config = Self::load_from_path(&path)?;
        config.validate()?;
        debug!("Configuration {} is valid", path.display());
        Ok(config)
    }

    /// Parses a configuration file, choosing the format by extension.
    fn load_from_path(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let extension = path.extension().and_then(|ext| ext.to_str()).unwrap_or("");

        let parse_error =
            |e: &dyn fmt::Display| G2GError::Config(format!("{}: {e}", path.display()));

        match extension {
            "toml" => toml::from_str(&contents).map_err(|e| parse_error(&e)),
            "json" => serde_json::from_str(&contents).map_err(|e| parse_error(&e)),
            "yaml" | "yml" => serde_yaml::from_str(&contents).map_err(|e| parse_error(&e)),
            _ => toml::from_str(&contents)
                .or_else(|_| serde_json::from_str(&contents))
                .or_else(|_| serde_yaml::from_str(&contents))
                .map_err(|e| parse_error(&e)),
        }
    }

    /// Checks that every required parameter carries a usable value.
    pub fn validate(&self) -> Result<()> {
        let missing = |section: &str, param: &str| {
            G2GError::Config(format!(
                "Parameter {param} in section {section} is missing"
            ))
        };

        if self.gitlab.token.is_blank() {
            return Err(missing("gitlab", "token"));
        }
        if self.gitlab.url.trim().is_empty() {
            return Err(missing("gitlab", "url"));
        }

        let neo4j = &self.neo4j;
        for (param, value) in [
            ("hostname", &neo4j.hostname),
            ("protocol", &neo4j.protocol),
            ("db", &neo4j.db),
            ("user", &neo4j.user),
            ("password", &neo4j.password),
        ] {
            if value.trim().is_empty() {
                return Err(missing("neo4j", param));
            }
        }
        if neo4j.port == 0 {
            return Err(missing("neo4j", "port"));
        }
        if !SUPPORTED_PROTOCOLS.contains(&neo4j.protocol.as_str()) {
            return Err(G2GError::Config(format!(
                "Unsupported graph protocol '{}' (expected one of: {})",
                neo4j.protocol,
                SUPPORTED_PROTOCOLS.join(", ")
            )));
        }

        if self.project.project_id.trim().is_empty() {
            return Err(missing("project", "project_id"));
        }

        Ok(())
    }

    pub fn pass_through(&self) -> PassThrough {
        PassThrough(self.extra.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const VALID_TOML: &str = r#"
[gitlab]
token = "f00b4r"

[neo4j]
hostname = "localhost"
protocol = "bolt"
port = 7687
db = "neo4j"
user = "neo4j"
password = "secret"

[project]
project_id = 42

[pipelines]
ref = "main"
status = "success"
"#;

    fn write_temp(suffix: &str, contents: &str) -> NamedTempFile {
        let mut file = NamedTempFile::with_suffix(suffix).unwrap();
        write!(file, "{contents}").unwrap();
        file
    }

    #[test]
    fn test_load_toml_config() {
        let file = write_temp(".toml", VALID_TOML);
        let config = ProjectConfig::load_from_path(file.path()).unwrap();
        config.validate().unwrap();

        assert_eq!(config.gitlab.token.as_str(), "f00b4r");
        assert_eq!(config.gitlab.url, "https://gitlab.com");
        assert_eq!(config.gitlab.page_size(), 100);
        assert_eq!(config.neo4j.uri(), "bolt://localhost:7687");
        assert_eq!(config.project.project_id, "42");
        assert!(config.extra.contains_key("pipelines"));
    }

    #[test]
    fn test_load_json_config_with_path_project_id() {
        let file = write_temp(
            ".json",
            r#"{
  "gitlab": {"token": "t", "url": "https://gitlab.example.com", "per_page": 500},
  "neo4j": {"hostname": "db", "protocol": "neo4j", "port": 7687, "db": "graph", "user": "u", "password": "p"},
  "project": {"project_id": "group/project"}
}"#,
        );
        let config = ProjectConfig::load_from_path(file.path()).unwrap();
        config.validate().unwrap();

        assert_eq!(config.project.project_id, "group/project");
        assert_eq!(config.gitlab.url, "https://gitlab.example.com");
        assert_eq!(config.gitlab.page_size(), 100);
        assert!(config.extra.is_empty());
    }

    #[test]
    fn test_load_yaml_config() {
        let file = write_temp(
            ".yaml",
            r"
gitlab:
  token: t
neo4j:
  hostname: db
  protocol: bolt
  port: 7687
  db: neo4j
  user: u
  password: p
project:
  project_id: 7
",
        );
        let config = ProjectConfig::load_from_path(file.path()).unwrap();
        assert_eq!(config.project.project_id, "7");
    }

    #[test]
    fn test_missing_required_section_fails_to_parse() {
        let file = write_temp(".toml", "[gitlab]\ntoken = \"t\"\n");
        let err = ProjectConfig::load_from_path(file.path()).unwrap_err();
        assert!(err.to_string().contains("neo4j"));
    }

    #[test]
    fn test_missing_required_parameter_fails_to_parse() {
        let contents = VALID_TOML.replace("hostname = \"localhost\"\n", "");
        let file = write_temp(".toml", &contents);
        let err = ProjectConfig::load_from_path(file.path()).unwrap_err();
        assert!(err.to_string().contains("hostname"));
    }

    #[test]
    fn test_blank_token_is_rejected() {
        let contents = VALID_TOML.replace("token = \"f00b4r\"", "token = \"  \"");
        let file = write_temp(".toml", &contents);
        let config = ProjectConfig::load_from_path(file.path()).unwrap();
        let err = config.validate().unwrap_err();
        assert_eq!(
            err.to_string(),
            "Invalid configuration: Parameter token in section gitlab is missing"
        );
    }

    #[test]
    fn test_unsupported_protocol_is_rejected() {
        let contents = VALID_TOML.replace("protocol = \"bolt\"", "protocol = \"http\"");
        let file = write_temp(".toml", &contents);
        let config = ProjectConfig::load_from_path(file.path()).unwrap();
        assert!(config
            .validate()
            .unwrap_err()
            .to_string()
            .contains("Unsupported graph protocol 'http'"));
    }

    #[test]
    fn test_resolve_prefers_existing_path_then_config_dir() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("project.toml"), VALID_TOML).unwrap();

        let resolved = ProjectConfig::resolve("project.toml", dir.path()).unwrap();
        assert_eq!(resolved, dir.path().join("project.toml"));

        let absolute = dir.path().join("project.toml");
        let direct =
            ProjectConfig::resolve(absolute.to_str().unwrap(), Path::new("/nonexistent")).unwrap();
        assert_eq!(direct, absolute);
    }

    #[test]
    fn test_resolve_missing_configuration() {
        let dir = tempfile::tempdir().unwrap();
        let err = ProjectConfig::resolve("test_project.toml", dir.path()).unwrap_err();
        assert_eq!(
            err.to_string(),
            format!(
                "Invalid configuration: Configuration {} not found.",
                dir.path().join("test_project.toml").display()
            )
        );
    }

    #[test]
    fn test_pass_through_renders_scalars_without_pagination_keys() {
        let file = write_temp(
            ".toml",
            &format!("{VALID_TOML}per_page = 5\npage = 3\nnested = {{ a = 1 }}\nyes = true\n"),
        );
        let config = ProjectConfig::load_from_path(file.path()).unwrap();
        let pass_through = config.pass_through();

        let mut params = pass_through.query_params("pipelines");
        params.sort();
        let expected: Vec<(String, String)> = [
            ("ref", "main"),
            ("status", "success"),
            ("yes", "true"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
        assert_eq!(params, expected);
        assert!(pass_through.query_params("jobs").is_empty());
    }

    #[test]
    fn test_debug_output_redacts_secrets() {
        let file = write_temp(".toml", VALID_TOML);
        let config = ProjectConfig::load_from_path(file.path()).unwrap();
        let rendered = format!("{config:?}");
        assert!(!rendered.contains("f00b4r"));
        assert!(!rendered.contains("secret"));
    }

    #[test]
    fn test_retry_policy_from_section() {
        let file = write_temp(
            ".toml",
            &VALID_TOML.replace(
                "token = \"f00b4r\"",
                "token = \"f00b4r\"\nmax_attempts = 0\nretry_base_ms = 10\nretry_max_ms = 5",
            ),
        );
        let config = ProjectConfig::load_from_path(file.path()).unwrap();
        let policy = config.gitlab.retry_policy();
        assert_eq!(policy.max_attempts, 1);
        assert_eq!(policy.base_delay, Duration::from_millis(10));
        assert_eq!(policy.max_delay, Duration::from_millis(10));
    }
}
