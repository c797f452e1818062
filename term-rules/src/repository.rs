//! On-disk layout of a validation run.
//!
//! ```text
//! <out_dir>/<run_id>/
//! ├── tasks/
//! │   ├── db_metadata.json
//! │   └── <task>/
//! │       ├── expected_rules.json
//! │       └── <rule_id>/
//! │           └── <schema.table>.jsonl
//! └── final/
//!     ├── results.json
//!     └── coverage.json
//! ```
//!
//! Every rule log is append-only. A log line is written with a single
//! `write_all` so concurrent appenders never interleave partial lines, and
//! readers take the last complete line as the current result.

use crate::core::{ExpectedRule, RuleResult, RunContext};
use crate::error::{ErrorContext, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, instrument, warn};

const MANIFEST_FILE: &str = "expected_rules.json";
const METADATA_FILE: &str = "db_metadata.json";
const LOG_EXTENSION: &str = "jsonl";

/// Run-level facts cached next to the task directories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RunMetadata {
    #[serde(default)]
    pub total_tables: u64,
}

/// Reads and writes the files of one run.
#[derive(Debug, Clone)]
pub struct ResultRepository {
    run_dir: PathBuf,
}

impl ResultRepository {
    /// Creates a repository rooted at `<out_dir>/<run_id>`.
    pub fn new(out_dir: impl AsRef<Path>, run_id: &str) -> Self {
        Self {
            run_dir: out_dir.as_ref().join(run_id),
        }
    }

    /// Creates a repository for the run described by `ctx`.
    pub fn for_context(ctx: &RunContext) -> Self {
        Self {
            run_dir: ctx.run_dir(),
        }
    }

    pub fn run_dir(&self) -> &Path {
        &self.run_dir
    }

    pub fn tasks_dir(&self) -> PathBuf {
        self.run_dir.join("tasks")
    }

    pub fn final_dir(&self) -> PathBuf {
        self.run_dir.join("final")
    }

    pub fn task_dir(&self, task: &str) -> PathBuf {
        self.tasks_dir().join(path_component(task))
    }

    pub fn manifest_path(&self, task: &str) -> PathBuf {
        self.task_dir(task).join(MANIFEST_FILE)
    }

    pub fn metadata_path(&self) -> PathBuf {
        self.tasks_dir().join(METADATA_FILE)
    }

    /// Returns the log file of one `(task, rule_id, table)` triple.
    pub fn rule_log_path(&self, task: &str, rule_id: &str, table: &str) -> PathBuf {
        self.task_dir(task)
            .join(path_component(rule_id))
            .join(format!("{}.{LOG_EXTENSION}", path_component(table)))
    }

    /// Writes the task manifest atomically.
    #[instrument(skip(self, expected), fields(rules = expected.len()))]
    pub async fn write_manifest(&self, task: &str, expected: &[ExpectedRule]) -> Result<PathBuf> {
        let path = self.manifest_path(task);
        write_json_atomic(&path, expected).await?;
        debug!(path = %path.display(), "Wrote expected rules manifest");
        Ok(path)
    }

    /// Reads a task manifest. A missing manifest reads as empty.
    pub async fn read_manifest(&self, task: &str) -> Result<Vec<ExpectedRule>> {
        let path = self.manifest_path(task);
        if !fs::try_exists(&path).await? {
            return Ok(Vec::new());
        }
        let bytes = fs::read(&path).await?;
        serde_json::from_slice(&bytes)
            .with_context(|| format!("Failed to parse manifest {}", path.display()))
    }

    /// Reads the manifests of every task in the run.
    pub async fn read_all_manifests(&self) -> Result<Vec<ExpectedRule>> {
        let mut expected = Vec::new();
        for task in self.task_names().await? {
            expected.extend(self.read_manifest(&task).await?);
        }
        Ok(expected)
    }

    /// Appends one result as a JSON line to its rule log.
    pub async fn append_result(&self, result: &RuleResult) -> Result<PathBuf> {
        let path = self.rule_log_path(&result.task, &result.rule_id, &result.table);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let mut line = serde_json::to_string(result)?;
        line.push('\n');

        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;
        Ok(path)
    }

    /// Writes the run metadata.
    pub async fn write_metadata(&self, metadata: &RunMetadata) -> Result<PathBuf> {
        let path = self.metadata_path();
        write_json_atomic(&path, metadata).await?;
        Ok(path)
    }

    /// Reads the run metadata, if it has been written.
    pub async fn read_metadata(&self) -> Result<Option<RunMetadata>> {
        let path = self.metadata_path();
        if !fs::try_exists(&path).await? {
            return Ok(None);
        }
        let bytes = fs::read(&path).await?;
        let metadata = serde_json::from_slice(&bytes)
            .with_context(|| format!("Failed to parse metadata {}", path.display()))?;
        Ok(Some(metadata))
    }

    /// Writes a JSON document into `final/`.
    pub async fn write_final<T: Serialize + ?Sized>(
        &self,
        name: &str,
        value: &T,
    ) -> Result<PathBuf> {
        let path = self.final_dir().join(name);
        write_json_atomic(&path, value).await?;
        Ok(path)
    }

    /// Returns every rule log under `tasks/`, sorted by path.
    pub async fn log_files(&self) -> Result<Vec<PathBuf>> {
        let mut files = Vec::new();
        let mut pending = vec![self.tasks_dir()];

        while let Some(dir) = pending.pop() {
            if !fs::try_exists(&dir).await? {
                continue;
            }
            let mut entries = fs::read_dir(&dir).await?;
            while let Some(entry) = entries.next_entry().await? {
                let path = entry.path();
                if entry.file_type().await?.is_dir() {
                    pending.push(path);
                } else if path.extension().and_then(|e| e.to_str()) == Some(LOG_EXTENSION) {
                    files.push(path);
                }
            }
        }

        files.sort();
        Ok(files)
    }

    /// Returns the names of the task directories, sorted.
    pub async fn task_names(&self) -> Result<Vec<String>> {
        let tasks_dir = self.tasks_dir();
        let mut names = Vec::new();
        if !fs::try_exists(&tasks_dir).await? {
            return Ok(names);
        }
        let mut entries = fs::read_dir(&tasks_dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            if entry.file_type().await?.is_dir() {
                if let Some(name) = entry.file_name().to_str().and_then(decode_component) {
                    names.push(name);
                }
            }
        }
        names.sort();
        Ok(names)
    }

    /// Returns the last parseable result of a rule log.
    ///
    /// A torn or corrupt trailing line is logged and skipped, so the previous
    /// complete record wins.
    pub async fn read_last_result(&self, path: &Path) -> Result<Option<RuleResult>> {
        let content = fs::read_to_string(path).await?;
        for line in content.lines().rev().filter(|l| !l.trim().is_empty()) {
            match serde_json::from_str::<RuleResult>(line) {
                Ok(result) => return Ok(Some(result)),
                Err(e) => warn!(
                    path = %path.display(),
                    error = %e,
                    "Skipping unparseable result line"
                ),
            }
        }
        Ok(None)
    }
}

/// Maps an arbitrary name onto a single safe path component.
///
/// Bytes outside `[A-Za-z0-9_.-]` are percent-encoded, so distinct names
/// never share a file. `.` and `..` are encoded whole and the empty name
/// becomes a lone `%`, which encoding never produces.
fn path_component(name: &str) -> String {
    match name {
        "" => return "%".to_string(),
        "." | ".." => return name.bytes().map(|b| format!("%{b:02X}")).collect(),
        _ => {}
    }
    let mut encoded = String::with_capacity(name.len());
    for byte in name.bytes() {
        if byte.is_ascii_alphanumeric() || matches!(byte, b'_' | b'-' | b'.') {
            encoded.push(char::from(byte));
        } else {
            encoded.push_str(&format!("%{byte:02X}"));
        }
    }
    encoded
}

/// Reverses [`path_component`]. Returns `None` for names it never produces.
fn decode_component(component: &str) -> Option<String> {
    if component == "%" {
        return Some(String::new());
    }
    let bytes = component.as_bytes();
    let mut decoded = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let hex = component.get(i + 1..i + 3)?;
            decoded.push(u8::from_str_radix(hex, 16).ok()?);
            i += 3;
        } else {
            decoded.push(bytes[i]);
            i += 1;
        }
    }
    String::from_utf8(decoded).ok()
}

/// Writes JSON to a temporary sibling, then renames it over `path`.
async fn write_json_atomic<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).await?;
    }
    let bytes = serde_json::to_vec_pretty(value)?;
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, &bytes).await?;
    fs::rename(&tmp, path).await?;
    Ok(())
}
