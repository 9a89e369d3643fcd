//! Pipeline configuration from YAML
//!
//! Loading happens in two steps. [`ConfigurationLoader`] reads a file and
//! folds its `include:` chain into one raw mapping, then
//! [`PipelineConfig::from_mapping`] turns that mapping into typed records,
//! merging every job with the `default:` block and the global variables.

use crate::core::error::ConfigError;
use crate::core::pipeline::{DefaultConfig, JobConfig, PipelineConfig, DEFAULT_STAGE};
use regex::Regex;
use serde_yaml::{Mapping, Value};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use tracing::debug;

/// Top-level keys that never describe a job
const RESERVED_KEYWORDS: &[&str] = &[
    "stages",
    "variables",
    "default",
    "include",
    "image",
    "services",
    "before_script",
    "after_script",
    "cache",
    "artifacts",
    "workflow",
];

fn variable_name_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("valid regex"))
}

/// Reads pipeline files and resolves local includes recursively
#[derive(Debug, Clone)]
pub struct ConfigurationLoader {
    /// Directory include paths are resolved against
    base_dir: PathBuf,
}

impl ConfigurationLoader {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    /// Loader rooted at the directory containing `path`
    pub fn for_file(path: &Path) -> Self {
        let base_dir = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        Self::new(base_dir)
    }

    /// Load a file and everything it includes into one raw mapping
    pub fn load(&self, path: &Path) -> Result<Mapping, ConfigError> {
        let mut stack = Vec::new();
        self.load_file(path, &mut stack)
    }

    /// Same as [`load`](Self::load) for an in-memory document
    pub fn load_str(&self, yaml: &str) -> Result<Mapping, ConfigError> {
        let doc = parse_document(yaml, Path::new("<inline>"))?;
        let mut stack = Vec::new();
        self.expand(doc, &mut stack)
    }

    /// Include paths are relative to the base directory, even with a leading `/`
    fn resolve(&self, target: &str) -> PathBuf {
        self.base_dir.join(target.trim_start_matches('/'))
    }

    fn load_file(&self, path: &Path, stack: &mut Vec<PathBuf>) -> Result<Mapping, ConfigError> {
        let key = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
        if stack.contains(&key) {
            let chain: Vec<String> = stack
                .iter()
                .chain(std::iter::once(&key))
                .map(|p| p.display().to_string())
                .collect();
            return Err(ConfigError::IncludeCycle(chain.join(" -> ")));
        }

        debug!("Loading configuration file {}", path.display());
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let doc = parse_document(&content, path)?;

        stack.push(key);
        let merged = self.expand(doc, stack);
        stack.pop();
        merged
    }

    /// Merge a document on top of everything it includes
    fn expand(&self, doc: Mapping, stack: &mut Vec<PathBuf>) -> Result<Mapping, ConfigError> {
        let mut include = None;
        let mut body = Mapping::new();
        for (key, value) in doc {
            if key.as_str() == Some("include") {
                include = Some(value);
            } else {
                body.insert(key, value);
            }
        }

        let mut merged = Mapping::new();
        if let Some(include) = include {
            for target in include_targets(&include)? {
                let included = self.load_file(&self.resolve(&target), stack)?;
                deep_merge(&mut merged, included);
            }
        }

        deep_merge(&mut merged, body);
        Ok(merged)
    }
}

fn parse_document(content: &str, path: &Path) -> Result<Mapping, ConfigError> {
    let value: Value = serde_yaml::from_str(content).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })?;

    match value {
        Value::Mapping(map) => Ok(map),
        Value::Null => Ok(Mapping::new()),
        _ => Err(ConfigError::NotAMapping(path.to_path_buf())),
    }
}

/// Local file paths named by an `include:` value
fn include_targets(value: &Value) -> Result<Vec<String>, ConfigError> {
    match value {
        Value::String(path) => Ok(vec![path.clone()]),
        Value::Mapping(map) => match map.get("local") {
            Some(Value::String(path)) => Ok(vec![path.clone()]),
            _ => Err(ConfigError::UnsupportedInclude(render(value))),
        },
        Value::Sequence(items) => {
            let mut targets = Vec::new();
            for item in items {
                targets.extend(include_targets(item)?);
            }
            Ok(targets)
        }
        Value::Null => Ok(Vec::new()),
        other => Err(ConfigError::UnsupportedInclude(render(other))),
    }
}

/// Overlay `overlay` onto `base`, merging nested mappings key by key
fn deep_merge(base: &mut Mapping, overlay: Mapping) {
    for (key, value) in overlay {
        if let Value::Mapping(incoming) = value {
            if let Some(Value::Mapping(existing)) = base.get_mut(&key) {
                deep_merge(existing, incoming);
                continue;
            }
            base.insert(key, Value::Mapping(incoming));
        } else {
            base.insert(key, value);
        }
    }
}

fn render(value: &Value) -> String {
    serde_yaml::to_string(value)
        .map(|s| s.trim().to_string())
        .unwrap_or_else(|_| format!("{:?}", value))
}

/// A script value: one string or a list of strings
fn script_lines(value: Option<&Value>, location: &str) -> Result<Vec<String>, ConfigError> {
    match value {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(Value::String(line)) => Ok(vec![line.clone()]),
        Some(Value::Sequence(items)) => items
            .iter()
            .enumerate()
            .map(|(i, item)| match item {
                Value::String(line) => Ok(line.clone()),
                other => Err(ConfigError::InvalidScript {
                    location: format!("{}[{}]", location, i),
                    value: render(other),
                }),
            })
            .collect(),
        Some(other) => Err(ConfigError::InvalidScript {
            location: location.to_string(),
            value: render(other),
        }),
    }
}

fn variable_value(name: &str, value: &Value) -> Result<String, ConfigError> {
    match value {
        Value::String(s) => Ok(s.clone()),
        Value::Number(n) => Ok(n.to_string()),
        Value::Bool(b) => Ok(b.to_string()),
        Value::Null => Ok(String::new()),
        // Expanded form: { value: "...", description: "..." }
        Value::Mapping(map) => match map.get("value") {
            Some(inner) if !inner.is_mapping() => variable_value(name, inner),
            _ => Err(ConfigError::InvalidVariableValue { name: name.to_string() }),
        },
        _ => Err(ConfigError::InvalidVariableValue { name: name.to_string() }),
    }
}

fn parse_variables(value: Option<&Value>) -> Result<HashMap<String, String>, ConfigError> {
    let map = match value {
        None | Some(Value::Null) => return Ok(HashMap::new()),
        Some(Value::Mapping(map)) => map,
        Some(other) => {
            return Err(ConfigError::Invalid(format!(
                "variables must be a mapping, got {}",
                render(other)
            )))
        }
    };

    let mut variables = HashMap::new();
    for (key, value) in map {
        let name = key
            .as_str()
            .ok_or_else(|| ConfigError::InvalidVariableName(render(key)))?;
        variables.insert(name.to_string(), variable_value(name, value)?);
    }
    Ok(variables)
}

fn parse_stages(value: Option<&Value>) -> Result<Vec<String>, ConfigError> {
    match value {
        None | Some(Value::Null) => Ok(vec![DEFAULT_STAGE.to_string()]),
        Some(Value::Sequence(items)) => items
            .iter()
            .map(|item| {
                item.as_str().map(str::to_string).ok_or_else(|| {
                    ConfigError::Invalid(format!("stage name {} is not a string", render(item)))
                })
            })
            .collect(),
        Some(other) => Err(ConfigError::Invalid(format!(
            "stages must be a list, got {}",
            render(other)
        ))),
    }
}

fn parse_default(value: Option<&Value>) -> Result<DefaultConfig, ConfigError> {
    let map = match value {
        None | Some(Value::Null) => return Ok(DefaultConfig::default()),
        Some(Value::Mapping(map)) => map,
        Some(other) => {
            return Err(ConfigError::Invalid(format!(
                "default must be a mapping, got {}",
                render(other)
            )))
        }
    };

    Ok(DefaultConfig {
        before_script: script_lines(map.get("before_script"), "default.before_script")?,
        after_script: script_lines(map.get("after_script"), "default.after_script")?,
        variables: parse_variables(map.get("variables"))?,
    })
}

fn process_job(
    name: &str,
    data: &Mapping,
    default: &DefaultConfig,
    global_variables: &HashMap<String, String>,
) -> Result<JobConfig, ConfigError> {
    let stage = match data.get("stage") {
        None | Some(Value::Null) => DEFAULT_STAGE.to_string(),
        Some(Value::String(stage)) => stage.clone(),
        Some(other) => {
            return Err(ConfigError::Invalid(format!(
                "job '{}' has a non-string stage {}",
                name,
                render(other)
            )))
        }
    };

    // job > global > default
    let mut variables = default.variables.clone();
    variables.extend(global_variables.clone());
    variables.extend(parse_variables(data.get("variables"))?);

    let mut before_script = default.before_script.clone();
    before_script.extend(script_lines(
        data.get("before_script"),
        &format!("{}.before_script", name),
    )?);

    let mut after_script = script_lines(data.get("after_script"), &format!("{}.after_script", name))?;
    after_script.extend(default.after_script.iter().cloned());

    Ok(JobConfig {
        name: name.to_string(),
        stage,
        before_script,
        script: script_lines(data.get("script"), &format!("{}.script", name))?,
        after_script,
        variables,
    })
}

impl PipelineConfig {
    /// Load pipeline configuration from a YAML file, following includes
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = ConfigurationLoader::for_file(path).load(path)?;
        Self::from_mapping(&raw)
    }

    /// Parse pipeline configuration from a YAML string
    ///
    /// Includes are resolved against the current directory.
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        let raw = ConfigurationLoader::new(".").load_str(yaml)?;
        Self::from_mapping(&raw)
    }

    /// Build the typed pipeline from an include-resolved raw mapping
    pub fn from_mapping(raw: &Mapping) -> Result<Self, ConfigError> {
        let stages = parse_stages(raw.get("stages"))?;
        let variables = parse_variables(raw.get("variables"))?;
        let default = parse_default(raw.get("default"))?;

        let mut jobs = Vec::new();
        for (key, value) in raw {
            let Some(name) = key.as_str() else { continue };
            if RESERVED_KEYWORDS.contains(&name) || name.starts_with('.') {
                continue;
            }
            let Value::Mapping(data) = value else { continue };
            jobs.push(process_job(name, data, &default, &variables)?);
        }

        let config = PipelineConfig {
            stages,
            variables,
            default,
            jobs,
        };
        config.validate()?;
        Ok(config)
    }

    /// Validate the pipeline configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut seen_stages = HashSet::new();
        for stage in &self.stages {
            if !seen_stages.insert(stage.as_str()) {
                return Err(ConfigError::DuplicateStage(stage.clone()));
            }
        }

        let mut seen_jobs = HashSet::new();
        for job in &self.jobs {
            if !seen_jobs.insert(job.name.as_str()) {
                return Err(ConfigError::Invalid(format!("duplicate job name '{}'", job.name)));
            }
            if !seen_stages.contains(job.stage.as_str()) {
                return Err(ConfigError::UnknownStage {
                    job: job.name.clone(),
                    stage: job.stage.clone(),
                });
            }
        }

        let names = self
            .variables
            .keys()
            .chain(self.default.variables.keys())
            .chain(self.jobs.iter().flat_map(|j| j.variables.keys()));
        for name in names {
            if !variable_name_pattern().is_match(name) {
                return Err(ConfigError::InvalidVariableName(name.clone()));
            }
        }

        Ok(())
    }
}
