// src/diagnostics.rs
//! Raw and failed payload dumps for diagnosing provider problems.
//!
//! A payload is written once per content: consecutive fetches returning the
//! same bytes (by SHA-256) do not produce new files.

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use sha2::{Digest, Sha256};

use crate::types::Source;

pub const DEFAULT_DIAGNOSTIC_DIR: &str = "/var/tmp/fc";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DumpKind {
    Raw,
    Failed,
}

impl DumpKind {
    fn suffix(self) -> &'static str {
        match self {
            DumpKind::Raw => "raw",
            DumpKind::Failed => "fail",
        }
    }
}

pub fn digest(text: &str) -> String {
    Sha256::digest(text.as_bytes())
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect()
}

/// Remembers the last digest written per provider and kind.
#[derive(Debug, Default)]
pub struct Diagnostics {
    last: Mutex<HashMap<(Source, DumpKind), String>>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Writes `payload` (preceded by `messages`, one per line) to
    /// `dir/<source>-<kind>-<YYYYmmddHHMM>`. Returns `None` when the payload
    /// matches the previous dump of the same kind.
    pub fn save(
        &self,
        dir: &Path,
        source: Source,
        kind: DumpKind,
        payload: &str,
        messages: &[String],
        now: DateTime<Utc>,
    ) -> io::Result<Option<PathBuf>> {
        let d = digest(payload);
        let mut last = self.last.lock();
        if last.get(&(source, kind)) == Some(&d) {
            return Ok(None);
        }
        fs::create_dir_all(dir)?;
        let path = dir.join(format!(
            "{}-{}-{}",
            source,
            kind.suffix(),
            now.format("%Y%m%d%H%M")
        ));
        let mut body = String::new();
        for m in messages {
            body.push_str(m);
            body.push('\n');
        }
        body.push_str(payload);
        fs::write(&path, body)?;
        last.insert((source, kind), d);
        Ok(Some(path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn identical_payloads_are_written_once() {
        let dir = tempfile::tempdir().unwrap();
        let diag = Diagnostics::new();
        let now = Utc.with_ymd_and_hms(2024, 2, 3, 4, 5, 0).unwrap();
        let first = diag
            .save(dir.path(), Source::Owm, DumpKind::Raw, "{}", &[], now)
            .unwrap()
            .unwrap();
        assert!(first.ends_with("owm-raw-202402030405"));
        assert!(diag
            .save(dir.path(), Source::Owm, DumpKind::Raw, "{}", &[], now)
            .unwrap()
            .is_none());
        // a failure dump of the same bytes is tracked separately
        let failed = diag
            .save(
                dir.path(),
                Source::Owm,
                DumpKind::Failed,
                "{}",
                &["no list".to_string()],
                now,
            )
            .unwrap()
            .unwrap();
        assert_eq!(fs::read_to_string(failed).unwrap(), "no list\n{}");
    }

    #[test]
    fn digest_is_hex_sha256() {
        assert_eq!(
            digest(""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }
}
