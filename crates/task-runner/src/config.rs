use crate::assemble::RunFlags;
use crate::block::Block;
use crate::registry::Assets;
use crate::store::SubmitFormat;
use crate::transport::RetryPolicy;
use reqwest::Url;
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

pub const REQUIRED_FIELDS: &[&str] = &[
    "task_id",
    "practice",
    "collect_demo",
    "collect_validating_demo",
    "submit",
];

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse task config: {0}")]
    Parse(String),
    #[error("task config is missing required fields: {}", .0.join(", "))]
    MissingFields(Vec<String>),
    #[error("invalid submit endpoint '{url}': {reason}")]
    InvalidEndpoint { url: String, reason: String },
    #[error("invalid {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },
    #[error("invalid --set '{0}': {1}")]
    InvalidOverride(String, &'static str),
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawTaskConfig {
    task_id: String,
    practice: bool,
    collect_demo: bool,
    collect_validating_demo: bool,
    submit: String,
    #[serde(default)]
    submit_format: SubmitFormat,
    #[serde(default)]
    assets: Assets,
    #[serde(default)]
    retry: RetryPolicy,
    #[serde(default = "default_timeout_secs")]
    timeout_secs: u64,
    #[serde(default)]
    blocks: Vec<Block>,
}

fn default_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Clone, PartialEq)]
pub struct TaskConfig {
    pub task_id: String,
    pub flags: RunFlags,
    pub endpoint: Url,
    pub submit_format: SubmitFormat,
    pub assets: Assets,
    pub retry: RetryPolicy,
    pub timeout: Duration,
    pub blocks: Vec<Block>,
}

impl TaskConfig {
    pub fn load(path: &Path, overrides: &BTreeMap<String, Value>) -> Result<Self, ConfigError> {
        let data = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let is_json = path
            .extension()
            .map(|e| e.eq_ignore_ascii_case("json"))
            .unwrap_or(false);
        let value: Value = if is_json {
            serde_json::from_str(&data).map_err(|e| ConfigError::Parse(e.to_string()))?
        } else {
            serde_yaml::from_str(&data).map_err(|e| ConfigError::Parse(e.to_string()))?
        };
        Self::from_value(value, overrides)
    }

    pub fn from_value(
        mut value: Value,
        overrides: &BTreeMap<String, Value>,
    ) -> Result<Self, ConfigError> {
        let root = value
            .as_object_mut()
            .ok_or_else(|| ConfigError::Parse("task config must be a mapping".to_string()))?;
        for (key, val) in overrides {
            root.insert(key.clone(), val.clone());
        }
        let missing: Vec<String> = REQUIRED_FIELDS
            .iter()
            .filter(|f| root.get(**f).map(Value::is_null).unwrap_or(true))
            .map(|f| f.to_string())
            .collect();
        if !missing.is_empty() {
            return Err(ConfigError::MissingFields(missing));
        }

        let raw: RawTaskConfig =
            serde_json::from_value(value).map_err(|e| ConfigError::Parse(e.to_string()))?;
        if raw.task_id.trim().is_empty() {
            return Err(ConfigError::MissingFields(vec!["task_id".to_string()]));
        }
        let endpoint = parse_endpoint(&raw.submit)?;
        if raw.timeout_secs == 0 {
            return Err(ConfigError::InvalidValue {
                field: "timeout_secs",
                reason: "must be at least 1".to_string(),
            });
        }
        if raw.retry.max_delay_ms < raw.retry.base_delay_ms {
            return Err(ConfigError::InvalidValue {
                field: "retry.max_delay_ms",
                reason: format!(
                    "{} is below base_delay_ms {}",
                    raw.retry.max_delay_ms, raw.retry.base_delay_ms
                ),
            });
        }
        Ok(Self {
            task_id: raw.task_id,
            flags: RunFlags {
                practice: raw.practice,
                collect_demo: raw.collect_demo,
                collect_validating_demo: raw.collect_validating_demo,
            },
            endpoint,
            submit_format: raw.submit_format,
            assets: raw.assets,
            retry: raw.retry,
            timeout: Duration::from_secs(raw.timeout_secs),
            blocks: raw.blocks,
        })
    }
}

fn parse_endpoint(raw: &str) -> Result<Url, ConfigError> {
    if raw.trim().is_empty() {
        return Err(ConfigError::MissingFields(vec!["submit".to_string()]));
    }
    let url = Url::parse(raw).map_err(|e| ConfigError::InvalidEndpoint {
        url: raw.to_string(),
        reason: e.to_string(),
    })?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(ConfigError::InvalidEndpoint {
            url: raw.to_string(),
            reason: format!("unsupported scheme '{}'", other),
        }),
    }
}

pub fn parse_overrides(values: &[String]) -> Result<BTreeMap<String, Value>, ConfigError> {
    let mut out = BTreeMap::new();
    for raw in values {
        let (key, val_raw) = raw
            .split_once('=')
            .ok_or_else(|| ConfigError::InvalidOverride(raw.clone(), "expected k=v"))?;
        if key.trim().is_empty() {
            return Err(ConfigError::InvalidOverride(raw.clone(), "key cannot be empty"));
        }
        let parsed =
            serde_json::from_str::<Value>(val_raw).unwrap_or(Value::String(val_raw.to_string()));
        out.insert(key.trim().to_string(), parsed);
    }
    Ok(out)
}

pub const STARTER_CONFIG: &str = "\
task_id: T42
practice: false                   # appends the debrief block
collect_demo: true                # demographics form before the task
collect_validating_demo: false    # validating demographics form, before demographics
submit: https://localhost:12344/submit
submit_format: object             # object | trial_array
retry:
  max_retries: 3
  base_delay_ms: 500
  max_delay_ms: 8000
blocks:
  - type: instructions
    pages: ['<p>Pick the images you would keep.</p>']
  - type: click_choice
    name: keep
    choice: keep
    stimuli: [[a.jpg, b.jpg, c.jpg]]
  - type: instructions
    pages: ['<p>Now pick the images you would reject.</p>']
  - type: click_choice
    name: reject
    choice: reject
    stimuli: [[a.jpg, b.jpg, c.jpg]]
";

pub const STARTER_SCRIPT: &str = "\
forms:
  - gender: f
    birthyear: '1990'
choices:
  keep: [a.jpg]
  reject: [c.jpg]
passed_practice: true
";

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::json;

    fn base() -> Value {
        json!({
            "task_id": "T42",
            "practice": false,
            "collect_demo": true,
            "collect_validating_demo": false,
            "submit": "https://tasks.example.org/submit"
        })
    }

    #[test]
    fn minimal_config_gets_defaults() {
        let cfg = TaskConfig::from_value(base(), &BTreeMap::new()).expect("config");
        assert_eq!(cfg.task_id, "T42");
        assert!(cfg.flags.collect_demo);
        assert_eq!(cfg.endpoint.as_str(), "https://tasks.example.org/submit");
        assert_eq!(cfg.submit_format, SubmitFormat::Object);
        assert_eq!(cfg.retry, RetryPolicy::default());
        assert_eq!(cfg.timeout, Duration::from_secs(30));
        assert!(cfg.blocks.is_empty());
    }

    #[test]
    fn missing_flags_are_all_reported() {
        let mut value = base();
        let obj = value.as_object_mut().expect("object");
        obj.remove("practice");
        obj.remove("collect_validating_demo");
        let err = TaskConfig::from_value(value, &BTreeMap::new()).expect_err("missing");
        let msg = err.to_string();
        assert!(msg.contains("practice"), "{}", msg);
        assert!(msg.contains("collect_validating_demo"), "{}", msg);
        assert!(!msg.contains("task_id"), "{}", msg);
    }

    #[test]
    fn empty_or_bad_endpoint_fails_fast() {
        let mut value = base();
        value["submit"] = json!("");
        assert!(matches!(
            TaskConfig::from_value(value, &BTreeMap::new()),
            Err(ConfigError::MissingFields(_))
        ));
        let mut value = base();
        value["submit"] = json!("not a url");
        assert!(matches!(
            TaskConfig::from_value(value, &BTreeMap::new()),
            Err(ConfigError::InvalidEndpoint { .. })
        ));
        let mut value = base();
        value["submit"] = json!("ftp://example.org/submit");
        assert!(matches!(
            TaskConfig::from_value(value, &BTreeMap::new()),
            Err(ConfigError::InvalidEndpoint { .. })
        ));
    }

    #[test]
    fn zero_timeout_fails_fast() {
        let mut value = base();
        value["timeout_secs"] = json!(0);
        let err = TaskConfig::from_value(value, &BTreeMap::new()).expect_err("zero timeout");
        assert!(
            matches!(err, ConfigError::InvalidValue { field: "timeout_secs", .. }),
            "{}",
            err
        );
        let mut value = base();
        value["timeout_secs"] = json!(1);
        let cfg = TaskConfig::from_value(value, &BTreeMap::new()).expect("config");
        assert_eq!(cfg.timeout, Duration::from_secs(1));
    }

    #[test]
    fn retry_cap_below_base_delay_fails_fast() {
        let mut value = base();
        value["retry"] = json!({ "base_delay_ms": 1000, "max_delay_ms": 200 });
        let err = TaskConfig::from_value(value, &BTreeMap::new()).expect_err("bad retry");
        assert!(
            matches!(err, ConfigError::InvalidValue { field: "retry.max_delay_ms", .. }),
            "{}",
            err
        );
        let mut value = base();
        value["retry"] = json!({ "base_delay_ms": 0, "max_delay_ms": 0 });
        assert!(TaskConfig::from_value(value, &BTreeMap::new()).is_ok());
    }

    #[test]
    fn non_boolean_flag_is_a_parse_error() {
        let mut value = base();
        value["practice"] = json!("yes");
        assert!(matches!(
            TaskConfig::from_value(value, &BTreeMap::new()),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let mut value = base();
        value["colect_demo"] = json!(true);
        assert!(matches!(
            TaskConfig::from_value(value, &BTreeMap::new()),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn overrides_replace_top_level_keys() {
        let overrides =
            parse_overrides(&["practice=true".to_string(), "task_id=T7".to_string()])
                .expect("overrides");
        assert_eq!(overrides.get("practice"), Some(&json!(true)));
        assert_eq!(overrides.get("task_id"), Some(&json!("T7")));
        let cfg = TaskConfig::from_value(base(), &overrides).expect("config");
        assert!(cfg.flags.practice);
        assert_eq!(cfg.task_id, "T7");
    }

    #[test]
    fn malformed_overrides_are_rejected() {
        assert!(parse_overrides(&["practice".to_string()]).is_err());
        assert!(parse_overrides(&["=true".to_string()]).is_err());
    }

    #[test]
    fn starter_config_loads_from_yaml_file() {
        let root = std::env::temp_dir().join(format!(
            "task_runner_cfg_test_{}_{}",
            std::process::id(),
            Utc::now().timestamp_micros()
        ));
        std::fs::create_dir_all(&root).expect("temp dir");
        let path = root.join("task.yaml");
        std::fs::write(&path, STARTER_CONFIG).expect("write");
        let cfg = TaskConfig::load(&path, &BTreeMap::new()).expect("load");
        assert_eq!(cfg.blocks.len(), 4);
        assert_eq!(cfg.blocks[1].kind(), "click_choice");
        let script: crate::engine::Script =
            serde_yaml::from_str(STARTER_SCRIPT).expect("script");
        assert_eq!(script.forms.len(), 1);
        let _ = std::fs::remove_dir_all(root);
    }

    #[test]
    fn missing_file_reports_path() {
        let err = TaskConfig::load(Path::new("/nonexistent/task.yaml"), &BTreeMap::new())
            .expect_err("missing file");
        assert!(err.to_string().contains("/nonexistent/task.yaml"));
    }
}
