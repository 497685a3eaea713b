use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::VerifyError;

/// Which string leaves of a document are checked against the source.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EligibilityRules {
    /// Field names whose string values carry extracted content.
    pub content_fields: Vec<String>,
    /// Field names of arrays holding ordered references; each string item is checked.
    pub list_fields: Vec<String>,
    /// Field names exempt from `min_value_chars` (identifiers, references).
    pub short_value_fields: Vec<String>,
    pub min_value_chars: usize,
}

impl Default for EligibilityRules {
    fn default() -> Self {
        Self {
            content_fields: vec![
                "content".into(),
                "title".into(),
                "url".into(),
                "ref".into(),
            ],
            list_fields: vec!["path".into()],
            short_value_fields: vec!["ref".into()],
            min_value_chars: 3,
        }
    }
}

impl EligibilityRules {
    pub fn is_content_field(&self, name: &str) -> bool {
        self.content_fields.iter().any(|f| f == name)
    }

    pub fn is_list_field(&self, name: &str) -> bool {
        self.list_fields.iter().any(|f| f == name)
    }

    pub fn is_short_value_field(&self, name: &str) -> bool {
        self.short_value_fields.iter().any(|f| f == name)
    }
}

/// How extraction units are merged into one source text.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceOptions {
    /// Drop standalone `Page N` lines before merging.
    pub strip_page_markers: bool,
    /// Sidecar extension used when no source file is given.
    pub sidecar_extension: String,
}

impl Default for SourceOptions {
    fn default() -> Self {
        Self {
            strip_page_markers: true,
            sidecar_extension: "txt".into(),
        }
    }
}

/// External program that receives fix requests.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AssistantConfig {
    pub command: Option<String>,
    pub args: Vec<String>,
}

/// Top-level configuration, usually read from `verbatim.yml`.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub eligibility: EligibilityRules,
    pub source: SourceOptions,
    pub assistant: AssistantConfig,
}

impl Config {
    /// Parse a YAML configuration.
    pub fn from_yaml(text: &str) -> Result<Self, VerifyError> {
        let cfg: Config = serde_yaml::from_str(text)
            .map_err(|e| VerifyError::InvalidConfig(format!("invalid YAML: {e}")))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Read the YAML configuration at `path`, falling back to defaults when absent.
    pub fn load_or_default(path: &Path) -> Result<Self, VerifyError> {
        if !path.exists() {
            return Ok(Config::default());
        }
        let text = std::fs::read_to_string(path)?;
        Self::from_yaml(&text)
    }

    pub fn validate(&self) -> Result<(), VerifyError> {
        let rules = &self.eligibility;
        if rules.content_fields.is_empty() && rules.list_fields.is_empty() {
            return Err(VerifyError::InvalidConfig(
                "eligibility needs at least one content or list field".into(),
            ));
        }
        let all = rules
            .content_fields
            .iter()
            .chain(&rules.list_fields)
            .chain(&rules.short_value_fields);
        for name in all {
            if name.trim().is_empty() {
                return Err(VerifyError::InvalidConfig(
                    "eligibility field names must not be blank".into(),
                ));
            }
        }
        Ok(())
    }
}
