//! The history artifact: data model, naming contract and writer.
//!
//! On disk an artifact is a JSON array:
//!
//! ```json
//! [{"name":"lint","status":[{"result":0,"timestamp":1718000000000}]}]
//! ```
//!
//! `result` uses an inverted encoding: `0` is a pass, `1` is a failure.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

use crate::error::{HistoryError, HistoryResult};

/// Artifact name used when none is configured.
pub const DEFAULT_ARTIFACT_NAME: &str = "check-history";

/// Name shared by the uploaded artifact, its zip archive and the JSON file inside.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ArtifactName(String);

impl ArtifactName {
    pub fn new(name: impl Into<String>) -> HistoryResult<Self> {
        let name = name.into();
        let reason = if name.trim().is_empty() {
            Some("name is empty")
        } else if name.contains('/') || name.contains('\\') {
            Some("name contains a path separator")
        } else if name == "." || name == ".." {
            Some("name is a relative path component")
        } else {
            None
        };

        match reason {
            Some(reason) => Err(HistoryError::InvalidName {
                name,
                reason: reason.to_string(),
            }),
            None => Ok(Self(name)),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// `<name>.zip`, where the downloaded archive is stored.
    pub fn archive_file_name(&self) -> String {
        format!("{}.zip", self.0)
    }

    /// `<name>.json`, the file written by the writer and read back by the locator.
    pub fn json_file_name(&self) -> String {
        format!("{}.json", self.0)
    }
}

impl Default for ArtifactName {
    fn default() -> Self {
        Self(DEFAULT_ARTIFACT_NAME.to_string())
    }
}

impl fmt::Display for ArtifactName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for ArtifactName {
    type Error = HistoryError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<ArtifactName> for String {
    fn from(name: ArtifactName) -> Self {
        name.0
    }
}

/// Result of a single check, serialized as `0` (success) or `1` (failure).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum Outcome {
    Success,
    Failure,
}

impl Outcome {
    pub fn from_passed(passed: bool) -> Self {
        if passed {
            Self::Success
        } else {
            Self::Failure
        }
    }

    pub fn passed(self) -> bool {
        self == Self::Success
    }
}

impl From<Outcome> for u8 {
    fn from(outcome: Outcome) -> Self {
        match outcome {
            Outcome::Success => 0,
            Outcome::Failure => 1,
        }
    }
}

impl TryFrom<u8> for Outcome {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Success),
            1 => Ok(Self::Failure),
            other => Err(format!("result must be 0 or 1, got {}", other)),
        }
    }
}

/// One observation of a check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusPoint {
    pub result: Outcome,
    /// Milliseconds since the Unix epoch.
    pub timestamp: i64,
}

/// A named check and its observations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckRecord {
    pub name: String,
    pub status: Vec<StatusPoint>,
}

/// The persisted unit of history. Serializes as a bare JSON array.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Artifact {
    pub entries: Vec<CheckRecord>,
}

impl Artifact {
    /// Build a fresh artifact, one record per report, in input order.
    ///
    /// Every record carries the same `timestamp_ms`. Names are not deduplicated.
    pub fn from_reports<I, S>(reports: I, timestamp_ms: i64) -> Self
    where
        I: IntoIterator<Item = (S, bool)>,
        S: Into<String>,
    {
        let entries = reports
            .into_iter()
            .map(|(name, passed)| CheckRecord {
                name: name.into(),
                status: vec![StatusPoint {
                    result: Outcome::from_passed(passed),
                    timestamp: timestamp_ms,
                }],
            })
            .collect();
        Self { entries }
    }

    pub fn to_json(&self) -> HistoryResult<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Parse artifact text, e.g. the string returned by the locator.
    pub fn from_json(text: &str) -> HistoryResult<Self> {
        let artifact: Self = serde_json::from_str(text)?;
        if let Some(record) = artifact.entries.iter().find(|r| r.status.is_empty()) {
            return Err(HistoryError::InvalidArtifact {
                message: format!("check {:?} has no status points", record.name),
            });
        }
        Ok(artifact)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Writes the current run's results to `<output_dir>/<name>.json`.
#[derive(Debug, Clone)]
pub struct ArtifactWriter {
    name: ArtifactName,
    output_dir: PathBuf,
}

impl ArtifactWriter {
    pub fn new(name: ArtifactName, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            name,
            output_dir: output_dir.into(),
        }
    }

    /// Path the artifact is written to.
    pub fn path(&self) -> PathBuf {
        self.output_dir.join(self.name.json_file_name())
    }

    /// Serialize `reports` and persist them, returning the written path once synced.
    pub async fn write<I, S>(&self, reports: I) -> HistoryResult<PathBuf>
    where
        I: IntoIterator<Item = (S, bool)>,
        S: Into<String>,
    {
        let now = chrono::Utc::now().timestamp_millis();
        let artifact = Artifact::from_reports(reports, now);
        self.write_artifact(&artifact).await
    }

    /// Persist an already-built artifact.
    pub async fn write_artifact(&self, artifact: &Artifact) -> HistoryResult<PathBuf> {
        let path = self.path();
        let body = artifact.to_json()?;
        debug!(path = %path.display(), bytes = body.len(), "writing artifact");

        write_synced(&path, body.as_bytes()).await?;

        info!(
            path = %path.display(),
            checks = artifact.len(),
            "artifact written"
        );
        Ok(path)
    }
}

async fn write_synced(path: &Path, body: &[u8]) -> HistoryResult<()> {
    let mut file = tokio::fs::File::create(path)
        .await
        .map_err(|e| HistoryError::io(path, e))?;
    file.write_all(body)
        .await
        .map_err(|e| HistoryError::io(path, e))?;
    file.flush().await.map_err(|e| HistoryError::io(path, e))?;
    file.sync_all().await.map_err(|e| HistoryError::io(path, e))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_artifact_name_file_names() {
        let name = ArtifactName::new("check-history").unwrap();
        assert_eq!(name.archive_file_name(), "check-history.zip");
        assert_eq!(name.json_file_name(), "check-history.json");
        assert_eq!(name.to_string(), "check-history");
    }

    #[test]
    fn test_artifact_name_rejects_paths() {
        for bad in ["", "  ", "a/b", "a\\b", ".."] {
            assert!(
                matches!(ArtifactName::new(bad), Err(HistoryError::InvalidName { .. })),
                "{:?} should be rejected",
                bad
            );
        }
    }

    #[test]
    fn test_outcome_encoding_is_inverted() {
        assert_eq!(u8::from(Outcome::from_passed(true)), 0);
        assert_eq!(u8::from(Outcome::from_passed(false)), 1);
        assert!(Outcome::Success.passed());
        assert!(!Outcome::Failure.passed());
    }

    #[test]
    fn test_from_reports_keeps_order_and_duplicates() {
        let artifact = Artifact::from_reports(
            vec![("lint", true), ("unit", false), ("lint", false)],
            1_700_000_000_000,
        );
        let names: Vec<_> = artifact.entries.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, ["lint", "unit", "lint"]);
        assert_eq!(artifact.entries[1].status.len(), 1);
        assert_eq!(artifact.entries[1].status[0].result, Outcome::Failure);
        assert!(artifact
            .entries
            .iter()
            .all(|r| r.status[0].timestamp == 1_700_000_000_000));
    }

    #[test]
    fn test_canonical_json_shape() {
        let artifact = Artifact::from_reports([("build", true), ("e2e", false)], 42);
        let json = artifact.to_json().unwrap();
        assert_eq!(
            json,
            r#"[{"name":"build","status":[{"result":0,"timestamp":42}]},{"name":"e2e","status":[{"result":1,"timestamp":42}]}]"#
        );
    }

    #[test]
    fn test_from_json_rejects_unknown_result() {
        let text = r#"[{"name":"build","status":[{"result":2,"timestamp":42}]}]"#;
        assert!(matches!(
            Artifact::from_json(text),
            Err(HistoryError::InvalidArtifact { .. })
        ));
    }

    #[test]
    fn test_from_json_rejects_empty_status() {
        let text = r#"[{"name":"build","status":[]}]"#;
        let err = Artifact::from_json(text).unwrap_err();
        assert!(err.to_string().contains("build"));
    }

    #[test]
    fn test_from_json_empty_array() {
        let artifact = Artifact::from_json("[]").unwrap();
        assert!(artifact.is_empty());
    }

    #[tokio::test]
    async fn test_writer_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let name = ArtifactName::new("history").unwrap();
        let writer = ArtifactWriter::new(name, dir.path());

        let before = chrono::Utc::now().timestamp_millis();
        let path = writer
            .write(vec![
                ("fmt".to_string(), true),
                ("clippy".to_string(), false),
                ("test".to_string(), true),
            ])
            .await
            .unwrap();
        let after = chrono::Utc::now().timestamp_millis();

        assert_eq!(path, dir.path().join("history.json"));
        let text = std::fs::read_to_string(&path).unwrap();
        let artifact = Artifact::from_json(&text).unwrap();

        let got: Vec<_> = artifact
            .entries
            .iter()
            .map(|r| (r.name.as_str(), u8::from(r.status[0].result)))
            .collect();
        assert_eq!(got, [("fmt", 0), ("clippy", 1), ("test", 0)]);
        for record in &artifact.entries {
            let ts = record.status[0].timestamp;
            assert!(ts >= before && ts <= after);
        }
    }

    #[tokio::test]
    async fn test_writer_overwrites_previous_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let writer = ArtifactWriter::new(ArtifactName::new("history").unwrap(), dir.path());

        writer.write([("old", true), ("older", true)]).await.unwrap();
        let path = writer.write([("new", false)]).await.unwrap();

        let artifact = Artifact::from_json(&std::fs::read_to_string(path).unwrap()).unwrap();
        assert_eq!(artifact.len(), 1);
        assert_eq!(artifact.entries[0].name, "new");
    }

    #[tokio::test]
    async fn test_writer_surfaces_io_errors() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("does-not-exist");
        let writer = ArtifactWriter::new(ArtifactName::new("history").unwrap(), missing);

        let err = writer.write([("build", true)]).await.unwrap_err();
        assert!(matches!(err, HistoryError::Io { .. }));
    }
}
