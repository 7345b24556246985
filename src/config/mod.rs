//! Configuration
//!
//! All settings come from one JSON file, loaded once at startup and
//! immutable afterwards. Keys are PascalCase; downstream tooling depends on
//! the exact spellings. Per-pipeline file-naming templates drive the
//! directory protocol, so validation failures here are fatal before any
//! file is touched.

pub mod errors;

pub use errors::{ConfigError, ConfigResult};

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Config {
    /// Records moved through the pipeline per scheduler tick (default: 5000)
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Concurrently open transactions per pipeline (default: 4)
    #[serde(default = "default_max_open_transactions")]
    pub max_open_transactions: usize,

    /// Idle sleep between scheduler ticks in milliseconds (default: 100)
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Named pipeline sections, started in name order
    #[serde(default)]
    pub pipelines: BTreeMap<String, PipelineConfig>,
}

/// Per-pipeline file-naming and adapter settings.
///
/// The input adapter claims files matching
/// `{InputFilePrefix}*{InputFileSuffix}` in `InputFilePath` and disposes
/// them into the done/error templates. The output adapter writes valid
/// records into the output template and error records into the error
/// template; when the two templates are identical (or `SingleOutputFile`
/// is set) both kinds share one writer.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PipelineConfig {
    /// Directory scanned for input files
    pub input_file_path: String,

    /// Directory receiving committed input files
    pub done_file_path: String,

    /// Directory receiving rolled-back input files and error records
    pub err_file_path: String,

    #[serde(default)]
    pub input_file_prefix: String,

    #[serde(default)]
    pub done_file_prefix: String,

    #[serde(default)]
    pub err_file_prefix: String,

    #[serde(default)]
    pub input_file_suffix: String,

    #[serde(default)]
    pub done_file_suffix: String,

    #[serde(default)]
    pub err_file_suffix: String,

    /// Marker prepended to a file name while the framework owns it
    /// (default: "tmp")
    #[serde(default = "default_processing_prefix")]
    pub processing_prefix: String,

    /// Directory receiving output files
    pub output_file_path: String,

    #[serde(default)]
    pub output_file_prefix: String,

    #[serde(default)]
    pub output_file_suffix: String,

    /// Delete rather than rename an empty output file on commit
    /// (default: false)
    #[serde(default)]
    pub delete_empty_output_file: bool,

    /// Delete rather than rename an empty error file on commit
    /// (default: true)
    #[serde(default = "default_delete_empty_error_file")]
    pub delete_empty_error_file: bool,

    /// Route error records into the output file instead of a separate one
    /// (default: false)
    #[serde(default)]
    pub single_output_file: bool,
}

fn default_batch_size() -> usize {
    5000
}
fn default_max_open_transactions() -> usize {
    4
}
fn default_poll_interval_ms() -> u64 {
    100
}
fn default_processing_prefix() -> String {
    "tmp".to_string()
}
fn default_delete_empty_error_file() -> bool {
    true
}

impl Default for Config {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            max_open_transactions: default_max_open_transactions(),
            poll_interval_ms: default_poll_interval_ms(),
            pipelines: BTreeMap::new(),
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            input_file_path: String::new(),
            done_file_path: String::new(),
            err_file_path: String::new(),
            input_file_prefix: String::new(),
            done_file_prefix: String::new(),
            err_file_prefix: String::new(),
            input_file_suffix: String::new(),
            done_file_suffix: String::new(),
            err_file_suffix: String::new(),
            processing_prefix: default_processing_prefix(),
            output_file_path: String::new(),
            output_file_prefix: String::new(),
            output_file_suffix: String::new(),
            delete_empty_output_file: false,
            delete_empty_error_file: default_delete_empty_error_file(),
            single_output_file: false,
        }
    }
}

impl Config {
    /// Load configuration from file and validate its shape.
    ///
    /// Directory existence is checked separately via
    /// `validate_directories`, so `init` can create the layout first.
    pub fn load(path: &Path) -> ConfigResult<Self> {
        let content = fs::read_to_string(path).map_err(|e| ConfigError::ReadFailed {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;

        let config: Config =
            serde_json::from_str(&content).map_err(|e| ConfigError::InvalidJson(e.to_string()))?;

        config.validate()?;

        Ok(config)
    }

    /// Validate everything that does not require filesystem access.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.batch_size == 0 {
            return Err(ConfigError::InvalidValue {
                key: "BatchSize".to_string(),
                reason: "must be > 0".to_string(),
            });
        }
        if self.max_open_transactions == 0 {
            return Err(ConfigError::InvalidValue {
                key: "MaxOpenTransactions".to_string(),
                reason: "must be > 0".to_string(),
            });
        }
        if self.poll_interval_ms == 0 {
            return Err(ConfigError::InvalidValue {
                key: "PollIntervalMs".to_string(),
                reason: "must be > 0".to_string(),
            });
        }
        if self.pipelines.is_empty() {
            return Err(ConfigError::NoPipelines);
        }
        for (name, pipeline) in &self.pipelines {
            pipeline.validate(name)?;
        }
        Ok(())
    }

    /// Validate that every configured directory exists.
    pub fn validate_directories(&self) -> ConfigResult<()> {
        for (name, pipeline) in &self.pipelines {
            pipeline.validate_directories(name)?;
        }
        Ok(())
    }
}

impl PipelineConfig {
    fn validate(&self, name: &str) -> ConfigResult<()> {
        if self.input_file_prefix.is_empty() && self.input_file_suffix.is_empty() {
            return Err(ConfigError::EmptyGlob {
                pipeline: name.to_string(),
            });
        }
        if self.processing_prefix.is_empty() {
            return Err(ConfigError::EmptyProcessingPrefix {
                pipeline: name.to_string(),
            });
        }
        // The scanner skips names carrying the processing marker, so an
        // input prefix that starts with it would hide every original file.
        if self.input_file_prefix.starts_with(&self.processing_prefix) {
            return Err(ConfigError::CollidingTemplates {
                pipeline: name.to_string(),
                detail: "input prefix begins with the processing prefix".to_string(),
            });
        }
        // Done and error must stay distinguishable, otherwise commit and
        // rollback would produce the same terminal name.
        if self.done_file_path == self.err_file_path
            && self.done_file_prefix == self.err_file_prefix
            && self.done_file_suffix == self.err_file_suffix
        {
            return Err(ConfigError::CollidingTemplates {
                pipeline: name.to_string(),
                detail: "done and error templates are identical".to_string(),
            });
        }
        // A done or error template identical to the input template would
        // make disposed files look like fresh input.
        let input = (
            &self.input_file_path,
            &self.input_file_prefix,
            &self.input_file_suffix,
        );
        if input
            == (
                &self.done_file_path,
                &self.done_file_prefix,
                &self.done_file_suffix,
            )
        {
            return Err(ConfigError::CollidingTemplates {
                pipeline: name.to_string(),
                detail: "done template matches the input scan glob".to_string(),
            });
        }
        if input
            == (
                &self.err_file_path,
                &self.err_file_prefix,
                &self.err_file_suffix,
            )
        {
            return Err(ConfigError::CollidingTemplates {
                pipeline: name.to_string(),
                detail: "error template matches the input scan glob".to_string(),
            });
        }
        Ok(())
    }

    fn validate_directories(&self, name: &str) -> ConfigResult<()> {
        let dirs = [
            ("InputFilePath", &self.input_file_path),
            ("DoneFilePath", &self.done_file_path),
            ("ErrFilePath", &self.err_file_path),
            ("OutputFilePath", &self.output_file_path),
        ];
        for (key, dir) in dirs {
            let path = Path::new(dir);
            match fs::metadata(path) {
                Ok(meta) if meta.is_dir() => {}
                Ok(_) => {
                    return Err(ConfigError::NotADirectory {
                        pipeline: name.to_string(),
                        key: key.to_string(),
                        path: dir.clone(),
                    })
                }
                Err(_) => {
                    return Err(ConfigError::MissingDirectory {
                        pipeline: name.to_string(),
                        key: key.to_string(),
                        path: dir.clone(),
                    })
                }
            }
        }
        Ok(())
    }

    /// All configured directories, for `init` to create.
    pub fn directories(&self) -> Vec<PathBuf> {
        vec![
            PathBuf::from(&self.input_file_path),
            PathBuf::from(&self.done_file_path),
            PathBuf::from(&self.err_file_path),
            PathBuf::from(&self.output_file_path),
        ]
    }

    /// Whether valid and error records share one output writer.
    pub fn single_writer(&self) -> bool {
        self.single_output_file
            || (self.output_file_path == self.err_file_path
                && self.output_file_prefix == self.err_file_prefix
                && self.output_file_suffix == self.err_file_suffix)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pipeline_json() -> &'static str {
        r#"{
            "InputFilePath": "/data/in",
            "DoneFilePath": "/data/done",
            "ErrFilePath": "/data/err",
            "InputFilePrefix": "CDR_",
            "InputFileSuffix": ".dat",
            "OutputFilePath": "/data/out",
            "OutputFilePrefix": "out_",
            "OutputFileSuffix": ".txt"
        }"#
    }

    fn parse_pipeline(json: &str) -> PipelineConfig {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_pascal_case_keys_are_recognized() {
        let pipeline = parse_pipeline(pipeline_json());
        assert_eq!(pipeline.input_file_path, "/data/in");
        assert_eq!(pipeline.input_file_prefix, "CDR_");
        assert_eq!(pipeline.input_file_suffix, ".dat");
        assert_eq!(pipeline.output_file_prefix, "out_");
    }

    #[test]
    fn test_defaults_applied() {
        let pipeline = parse_pipeline(pipeline_json());
        assert_eq!(pipeline.processing_prefix, "tmp");
        assert!(!pipeline.delete_empty_output_file);
        assert!(pipeline.delete_empty_error_file);
        assert!(!pipeline.single_output_file);

        let config: Config = serde_json::from_str("{}").unwrap();
        assert_eq!(config.batch_size, 5000);
        assert_eq!(config.max_open_transactions, 4);
        assert_eq!(config.poll_interval_ms, 100);
    }

    #[test]
    fn test_serialized_keys_are_pascal_case() {
        let config = Config::default();
        let json = serde_json::to_string(&config).unwrap();
        assert!(json.contains("\"BatchSize\""));
        assert!(json.contains("\"MaxOpenTransactions\""));
        assert!(json.contains("\"PollIntervalMs\""));
        assert!(json.contains("\"Pipelines\""));
    }

    fn config_with(pipeline: PipelineConfig) -> Config {
        let mut config = Config::default();
        config.pipelines.insert("voice".to_string(), pipeline);
        config
    }

    #[test]
    fn test_valid_config_passes() {
        let config = config_with(parse_pipeline(pipeline_json()));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_no_pipelines_is_rejected() {
        let config = Config::default();
        assert!(matches!(config.validate(), Err(ConfigError::NoPipelines)));
    }

    #[test]
    fn test_empty_glob_is_rejected() {
        let mut pipeline = parse_pipeline(pipeline_json());
        pipeline.input_file_prefix.clear();
        pipeline.input_file_suffix.clear();
        let config = config_with(pipeline);
        assert!(matches!(
            config.validate(),
            Err(ConfigError::EmptyGlob { .. })
        ));
    }

    #[test]
    fn test_empty_processing_prefix_is_rejected() {
        let mut pipeline = parse_pipeline(pipeline_json());
        pipeline.processing_prefix.clear();
        let config = config_with(pipeline);
        assert!(matches!(
            config.validate(),
            Err(ConfigError::EmptyProcessingPrefix { .. })
        ));
    }

    #[test]
    fn test_input_prefix_under_processing_marker_is_rejected() {
        let mut pipeline = parse_pipeline(pipeline_json());
        pipeline.input_file_prefix = "tmpCDR_".to_string();
        let config = config_with(pipeline);
        assert!(matches!(
            config.validate(),
            Err(ConfigError::CollidingTemplates { .. })
        ));
    }

    #[test]
    fn test_identical_done_and_err_templates_are_rejected() {
        let mut pipeline = parse_pipeline(pipeline_json());
        pipeline.err_file_path = pipeline.done_file_path.clone();
        let config = config_with(pipeline);
        assert!(matches!(
            config.validate(),
            Err(ConfigError::CollidingTemplates { .. })
        ));
    }

    #[test]
    fn test_done_template_matching_input_glob_is_rejected() {
        let mut pipeline = parse_pipeline(pipeline_json());
        pipeline.done_file_path = pipeline.input_file_path.clone();
        pipeline.done_file_prefix = pipeline.input_file_prefix.clone();
        pipeline.done_file_suffix = pipeline.input_file_suffix.clone();
        let config = config_with(pipeline);
        assert!(matches!(
            config.validate(),
            Err(ConfigError::CollidingTemplates { .. })
        ));
    }

    #[test]
    fn test_zero_batch_size_is_rejected() {
        let mut config = config_with(parse_pipeline(pipeline_json()));
        config.batch_size = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue { .. })
        ));
    }

    #[test]
    fn test_single_writer_detection() {
        let mut pipeline = parse_pipeline(pipeline_json());
        assert!(!pipeline.single_writer());

        pipeline.single_output_file = true;
        assert!(pipeline.single_writer());

        pipeline.single_output_file = false;
        pipeline.err_file_path = pipeline.output_file_path.clone();
        pipeline.err_file_prefix = pipeline.output_file_prefix.clone();
        pipeline.err_file_suffix = pipeline.output_file_suffix.clone();
        assert!(pipeline.single_writer());
    }

    #[test]
    fn test_load_from_file() {
        use std::io::Write;

        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("cdrflow.json");
        let mut file = fs::File::create(&path).unwrap();
        write!(
            file,
            r#"{{"BatchSize": 100, "Pipelines": {{"voice": {}}}}}"#,
            pipeline_json()
        )
        .unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.batch_size, 100);
        assert!(config.pipelines.contains_key("voice"));
    }

    #[test]
    fn test_load_missing_file_fails() {
        let err = Config::load(Path::new("/nonexistent/cdrflow.json")).unwrap_err();
        assert!(matches!(err, ConfigError::ReadFailed { .. }));
    }

    #[test]
    fn test_validate_directories() {
        let dir = tempfile::TempDir::new().unwrap();
        let sub = |n: &str| {
            let p = dir.path().join(n);
            fs::create_dir(&p).unwrap();
            p.display().to_string()
        };

        let mut pipeline = parse_pipeline(pipeline_json());
        pipeline.input_file_path = sub("in");
        pipeline.done_file_path = sub("done");
        pipeline.err_file_path = sub("err");
        pipeline.output_file_path = sub("out");
        let config = config_with(pipeline.clone());
        assert!(config.validate_directories().is_ok());

        pipeline.done_file_path = dir.path().join("missing").display().to_string();
        let config = config_with(pipeline);
        assert!(matches!(
            config.validate_directories(),
            Err(ConfigError::MissingDirectory { .. })
        ));
    }
}
