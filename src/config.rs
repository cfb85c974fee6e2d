use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::anyhow;
use config::{Config, File};
use serde::Deserialize;
use tower_lsp::lsp_types::ClientCapabilities;

#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct Settings {
    pub cache: CacheSettings,
    pub validation: ValidationConfig,
    /// Cap on symbols and colors per request
    pub result_limit: Option<usize>,
    pub folding_range_limit: Option<usize>,
    pub provide_formatter: bool,
    /// JSON schema replacing the built-in document schema
    pub schema_path: Option<PathBuf>,
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct CacheSettings {
    pub max_entries: usize,
    pub cleanup_interval_time_in_sec: u64,
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct ValidationConfig {
    pub validation_delay_ms: u64,
}

/// `initializationOptions` sent by the client. Anything set here wins over
/// the settings files.
#[derive(Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct InitializationOptions {
    pub provide_formatter: Option<bool>,
    pub result_limit: Option<usize>,
    pub folding_range_limit: Option<usize>,
    pub schema_path: Option<String>,
    pub validation_delay_ms: Option<u64>,
}

impl InitializationOptions {
    /// Missing or malformed options fall back to the defaults.
    pub fn from_value(value: Option<&serde_json::Value>) -> Self {
        match value {
            Some(value) => serde_json::from_value(value.clone()).unwrap_or_else(|err| {
                tracing::warn!("ignoring malformed initializationOptions: {err}");
                Self::default()
            }),
            None => Self::default(),
        }
    }
}

impl Settings {
    pub fn new(root_dir: Option<&Path>, options: &InitializationOptions) -> anyhow::Result<Settings> {
        let expanded = shellexpand::tilde("~/.config/ssm-lsp/settings");
        let mut builder = Config::builder().add_source(File::with_name(&expanded).required(false));
        if let Some(root_dir) = root_dir {
            builder = builder.add_source(
                File::with_name(&format!(
                    "{}/.ssm-lsp",
                    root_dir
                        .to_str()
                        .ok_or(anyhow!("Can't convert root_dir to str"))?
                ))
                .required(false),
            );
        }

        let settings = builder
            .set_default("cache.max_entries", 10)?
            .set_default("cache.cleanup_interval_time_in_sec", 60)?
            .set_default("validation.validation_delay_ms", 500)?
            .set_default("provide_formatter", false)?
            .set_override_option("provide_formatter", options.provide_formatter)?
            .set_override_option("result_limit", options.result_limit.map(|n| n as u64))?
            .set_override_option("folding_range_limit", options.folding_range_limit.map(|n| n as u64))?
            .set_override_option("schema_path", options.schema_path.clone())?
            .set_override_option("validation.validation_delay_ms", options.validation_delay_ms)?
            .build()
            .map_err(|err| anyhow!("Build err: {err}"))?;

        let mut settings = settings.try_deserialize::<Settings>()?;
        if let Some(path) = settings.schema_path.take() {
            let path = shellexpand::tilde(&path.to_string_lossy()).into_owned();
            settings.schema_path = Some(PathBuf::from(path));
        }

        anyhow::Ok(settings)
    }

    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.cache.cleanup_interval_time_in_sec)
    }

    pub fn validation_delay(&self) -> Duration {
        Duration::from_millis(self.validation.validation_delay_ms)
    }
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            cache: CacheSettings {
                max_entries: 10,
                cleanup_interval_time_in_sec: 60,
            },
            validation: ValidationConfig {
                validation_delay_ms: 500,
            },
            result_limit: None,
            folding_range_limit: None,
            provide_formatter: false,
            schema_path: None,
        }
    }
}

/// What the client said it can do, read once at initialize.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ClientSupport {
    pub snippets: bool,
    pub hierarchical_symbols: bool,
    pub folding_range_limit: Option<usize>,
}

impl ClientSupport {
    pub fn new(capabilities: &ClientCapabilities) -> Self {
        let text_document = capabilities.text_document.as_ref();
        ClientSupport {
            snippets: text_document
                .and_then(|it| it.completion.as_ref())
                .and_then(|it| it.completion_item.as_ref())
                .and_then(|it| it.snippet_support)
                .unwrap_or(false),
            hierarchical_symbols: text_document
                .and_then(|it| it.document_symbol.as_ref())
                .and_then(|it| it.hierarchical_document_symbol_support)
                .unwrap_or(false),
            folding_range_limit: text_document
                .and_then(|it| it.folding_range.as_ref())
                .and_then(|it| it.range_limit)
                .map(|limit| limit as usize),
        }
    }
}

/// The smaller of two optional limits; `None` means unbounded.
pub fn min_limit(a: Option<usize>, b: Option<usize>) -> Option<usize> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.min(b)),
        (a, b) => a.or(b),
    }
}
