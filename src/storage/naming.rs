//! Template-based file names for recordings.
//!
//! Templates contain `{name}` placeholders:
//!
//! | Variable        | Value                                   |
//! |-----------------|-----------------------------------------|
//! | `{timestamp}`   | start time, `20240131_142500`           |
//! | `{date}`        | start date, `2024-01-31`                |
//! | `{time}`        | start time of day, `14-25-00`           |
//! | `{caller}`      | calling party, `unknown` if not known   |
//! | `{callee}`      | called party, `unknown` if not known    |
//! | `{call_id}`     | signaling call id, `unknown` if not set |
//! | `{duration}`    | recording length, `0m00s` until stopped |
//! | `{codec}`       | `pcm`, `alaw`, `ulaw` or `float`        |
//! | `{sample_rate}` | output sample rate in Hz                |
//! | `{id}`          | recording id                            |

use std::collections::HashMap;
use std::fs::OpenOptions;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Local};
use regex::Regex;

use crate::config::RecordingOptions;
use crate::error::StorageError;

const UNKNOWN: &str = "unknown";
const MAX_NAME_LEN: usize = 100;

/// Values substituted into a file name template.
#[derive(Debug, Clone, Default)]
pub struct TemplateVariables {
    variables: HashMap<String, String>,
}

impl TemplateVariables {
    /// Builds the variable set for a recording starting at `started_at`.
    pub fn for_recording(options: &RecordingOptions, id: &str, started_at: DateTime<Local>) -> Self {
        let mut vars = Self::default();
        vars.insert("timestamp", started_at.format("%Y%m%d_%H%M%S").to_string());
        vars.insert("date", started_at.format("%Y-%m-%d").to_string());
        vars.insert("time", started_at.format("%H-%M-%S").to_string());

        let metadata = &options.metadata;
        vars.insert("caller", party(metadata.caller.as_deref()));
        vars.insert("callee", party(metadata.callee.as_deref()));
        vars.insert("call_id", party(metadata.call_id.as_deref()));

        vars.insert("codec", options.codec.as_str().to_string());
        vars.insert("sample_rate", options.sample_rate.to_string());
        vars.insert("id", id.to_string());
        vars.set_duration(Duration::ZERO);
        vars
    }

    /// Updates `{duration}`.
    pub fn set_duration(&mut self, duration: Duration) {
        let secs = duration.as_secs();
        self.insert("duration", format!("{}m{:02}s", secs / 60, secs % 60));
    }

    /// Adds or overrides a variable. The value is sanitized.
    pub fn set(&mut self, key: &str, value: &str) {
        self.insert(key, sanitize_filename(value));
    }

    fn insert(&mut self, key: &str, value: String) {
        self.variables.insert(key.to_string(), value);
    }

    /// Value of a variable.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.variables.get(key).map(String::as_str)
    }
}

fn party(value: Option<&str>) -> String {
    value
        .map(sanitize_filename)
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| UNKNOWN.to_string())
}

/// Expands file name templates.
#[derive(Debug, Clone)]
pub struct FileNameGenerator {
    template_regex: Regex,
}

impl FileNameGenerator {
    /// Creates a generator.
    pub fn new() -> Result<Self, StorageError> {
        let template_regex = Regex::new(r"\{([a-zA-Z_][a-zA-Z0-9_]*)\}").map_err(|e| {
            StorageError::InvalidTemplate {
                reason: e.to_string(),
            }
        })?;
        Ok(Self { template_regex })
    }

    /// Names used in `template` that have no value in `variables`.
    pub fn unresolved(&self, template: &str, variables: &TemplateVariables) -> Vec<String> {
        self.template_regex
            .captures_iter(template)
            .filter(|caps| variables.get(&caps[1]).is_none())
            .map(|caps| caps[1].to_string())
            .collect()
    }

    /// Returns `true` if `template` references `{duration}`.
    pub fn uses_duration(&self, template: &str) -> bool {
        self.template_regex
            .captures_iter(template)
            .any(|caps| &caps[1] == "duration")
    }

    /// Expands `template` into a file name with `extension`.
    ///
    /// Unknown variables are left in place (and then sanitized). A template
    /// that sanitizes down to nothing is rejected.
    pub fn generate(
        &self,
        template: &str,
        variables: &TemplateVariables,
        extension: &str,
    ) -> Result<String, StorageError> {
        if template.trim().is_empty() {
            return Err(StorageError::InvalidTemplate {
                reason: "template is empty".to_string(),
            });
        }

        let unresolved = self.unresolved(template, variables);
        if !unresolved.is_empty() {
            tracing::warn!(?unresolved, "unresolved template variables");
        }

        let expanded = self
            .template_regex
            .replace_all(template, |caps: &regex::Captures<'_>| {
                variables
                    .get(&caps[1])
                    .map_or_else(|| caps[1].to_string(), str::to_string)
            });

        let stem = sanitize_filename(&expanded);
        if stem.is_empty() {
            return Err(StorageError::InvalidTemplate {
                reason: format!("template {template:?} produces an empty file name"),
            });
        }
        Ok(format!("{stem}.{extension}"))
    }
}

/// Makes a string safe as a file name stem.
///
/// Path separators, reserved characters and control characters are removed,
/// whitespace and dots become underscores, runs of underscores collapse, and
/// the result is capped at 100 characters.
pub fn sanitize_filename(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        let mapped = match c {
            '<' | '>' | ':' | '"' | '/' | '\\' | '|' | '?' | '*' | '{' | '}' => None,
            c if c.is_control() => None,
            c if c.is_whitespace() || c == '.' => Some('_'),
            c if c.is_alphanumeric() || c == '_' || c == '-' || c == '+' => Some(c),
            _ => Some('_'),
        };
        if let Some(c) = mapped {
            if !(c == '_' && out.ends_with('_')) {
                out.push(c);
            }
        }
    }
    out.trim_matches('_').chars().take(MAX_NAME_LEN).collect()
}

/// Reserves `path`, or the first free `{stem}_{NNN}.{ext}` beside it, by
/// creating an empty file there.
///
/// Creation uses `create_new`, so concurrent callers never receive the same
/// path.
pub fn make_unique_path(path: &Path) -> Result<PathBuf, StorageError> {
    if try_reserve(path)? {
        return Ok(path.to_path_buf());
    }

    let parent = path.parent().unwrap_or(Path::new("."));
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("recording");
    let extension = path.extension().and_then(|s| s.to_str()).unwrap_or("wav");

    for i in 1..=9999 {
        let candidate = parent.join(format!("{stem}_{i:03}.{extension}"));
        if try_reserve(&candidate)? {
            return Ok(candidate);
        }
    }

    let timestamp = Local::now().format("%H%M%S%3f");
    let candidate = parent.join(format!("{stem}_{timestamp}.{extension}"));
    if try_reserve(&candidate)? {
        return Ok(candidate);
    }
    Err(StorageError::io(
        path,
        io::Error::new(io::ErrorKind::AlreadyExists, "no free file name"),
    ))
}

/// Creates an empty file at `path`. Returns `false` if one already exists.
fn try_reserve(path: &Path) -> Result<bool, StorageError> {
    match OpenOptions::new().write(true).create_new(true).open(path) {
        Ok(_) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists => Ok(false),
        Err(e) => Err(StorageError::io(path, e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CallMetadata;
    use chrono::TimeZone;
    use tempfile::tempdir;

    fn variables() -> TemplateVariables {
        let options = RecordingOptions {
            metadata: CallMetadata {
                caller: Some("+1 555/0100".to_string()),
                callee: None,
                ..Default::default()
            },
            ..RecordingOptions::new("/tmp")
        };
        let started = Local.with_ymd_and_hms(2024, 1, 31, 14, 25, 0).unwrap();
        TemplateVariables::for_recording(&options, "abc", started)
    }

    #[test]
    fn test_sanitize_filename() {
        assert_eq!(sanitize_filename("a/b\\c:d"), "abcd");
        assert_eq!(sanitize_filename("  hello   world  "), "hello_world");
        assert_eq!(sanitize_filename("+1 (555) 0100"), "+1_555_0100");
        assert_eq!(sanitize_filename("name.with.dots"), "name_with_dots");
        assert_eq!(sanitize_filename("???"), "");
        assert_eq!(sanitize_filename(&"x".repeat(300)).len(), 100);
    }

    #[test]
    fn test_generate_substitutes_variables() {
        let generator = FileNameGenerator::new().unwrap();
        let name = generator
            .generate("{timestamp}_{caller}_{callee}", &variables(), "wav")
            .unwrap();
        assert_eq!(name, "20240131_142500_+1_5550100_unknown.wav");
    }

    #[test]
    fn test_generate_all_builtin_variables() {
        let generator = FileNameGenerator::new().unwrap();
        let name = generator
            .generate(
                "{date}_{time}_{codec}_{sample_rate}_{duration}_{id}_{call_id}",
                &variables(),
                "wav",
            )
            .unwrap();
        assert_eq!(name, "2024-01-31_14-25-00_pcm_8000_0m00s_abc_unknown.wav");
    }

    #[test]
    fn test_generate_keeps_unknown_variables_as_text() {
        let generator = FileNameGenerator::new().unwrap();
        let vars = variables();
        assert_eq!(generator.unresolved("{id}_{nope}", &vars), vec!["nope"]);
        let name = generator.generate("{id}_{nope}", &vars, "wav").unwrap();
        assert_eq!(name, "abc_nope.wav");
    }

    #[test]
    fn test_generate_rejects_empty_results() {
        let generator = FileNameGenerator::new().unwrap();
        assert!(generator.generate("   ", &variables(), "wav").is_err());
        assert!(generator.generate("???", &variables(), "wav").is_err());
    }

    #[test]
    fn test_duration_variable() {
        let generator = FileNameGenerator::new().unwrap();
        let mut vars = variables();
        vars.set_duration(Duration::from_secs(125));
        assert!(generator.uses_duration("{caller}_{duration}"));
        assert!(!generator.uses_duration("{caller}"));
        assert_eq!(generator.generate("{duration}", &vars, "wav").unwrap(), "2m05s.wav");
    }

    #[test]
    fn test_make_unique_path() {
        let dir = tempdir().unwrap();
        let base = dir.path().join("call.wav");
        assert_eq!(make_unique_path(&base).unwrap(), base);
        assert!(base.exists());

        let second = make_unique_path(&base).unwrap();
        assert_eq!(second, dir.path().join("call_001.wav"));
        assert_eq!(make_unique_path(&base).unwrap(), dir.path().join("call_002.wav"));
    }

    #[test]
    fn test_make_unique_path_concurrent_callers_get_distinct_paths() {
        let dir = tempdir().unwrap();
        let base = dir.path().join("call.wav");

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let base = base.clone();
                std::thread::spawn(move || make_unique_path(&base).unwrap())
            })
            .collect();
        let mut paths: Vec<PathBuf> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        paths.sort();
        paths.dedup();
        assert_eq!(paths.len(), 8);
    }

    #[test]
    fn test_make_unique_path_missing_directory_is_error() {
        let dir = tempdir().unwrap();
        let result = make_unique_path(&dir.path().join("absent").join("call.wav"));
        assert!(matches!(result, Err(StorageError::Io { .. })));
    }
}
