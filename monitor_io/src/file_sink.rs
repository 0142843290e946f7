//! File-backed `StateSink`: one directory per line, newline-delimited JSON
//! for the append-only logs and an atomically-replaced blob for the
//! runtime-state checkpoint.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use monitor_traits::{Event, RunRecord, SinkError, StageRecord, StateSink};
use tracing::warn;

fn write_atomic(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let tmp = path.with_extension("tmp");
    {
        let mut f = fs::File::create(&tmp)?;
        f.write_all(bytes)?;
        f.sync_all()?;
    }
    fs::rename(tmp, path)
}

fn append_line(path: &Path, line: &str) -> std::io::Result<()> {
    let mut f = OpenOptions::new().create(true).append(true).open(path)?;
    writeln!(f, "{line}")
}

pub struct FileStateSink {
    base_dir: PathBuf,
}

impl FileStateSink {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    fn line_dir(&self, line_id: &str) -> std::io::Result<PathBuf> {
        let dir = self.base_dir.join(line_id);
        fs::create_dir_all(&dir)?;
        Ok(dir)
    }
}

impl StateSink for FileStateSink {
    fn save_runtime_state(&self, line_id: &str, blob: &[u8]) -> Result<(), SinkError> {
        let dir = self
            .line_dir(line_id)
            .map_err(|e| SinkError::Io(e.to_string()))?;
        write_atomic(&dir.join("runtime_state.bin"), blob).map_err(|e| SinkError::Io(e.to_string()))
    }

    fn load_runtime_state(&self, line_id: &str) -> Result<Option<Vec<u8>>, SinkError> {
        let path = self.base_dir.join(line_id).join("runtime_state.bin");
        match fs::read(&path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(SinkError::Io(e.to_string())),
        }
    }

    fn append_event(&self, line_id: &str, event: &Event) -> Result<(), SinkError> {
        let dir = self
            .line_dir(line_id)
            .map_err(|e| SinkError::Io(e.to_string()))?;
        let line = serde_json::to_string(event).map_err(|e| SinkError::Io(e.to_string()))?;
        append_line(&dir.join("events.jsonl"), &line).map_err(|e| SinkError::Io(e.to_string()))
    }

    fn on_stage_closed(&self, line_id: &str, record: &StageRecord) {
        let Ok(dir) = self.line_dir(line_id) else {
            warn!(line_id, "failed to create line directory for stage record");
            return;
        };
        let Ok(line) = serde_json::to_string(record) else {
            warn!(line_id, "failed to serialize stage record");
            return;
        };
        if let Err(e) = append_line(&dir.join("stages.jsonl"), &line) {
            warn!(line_id, error = %e, "failed to append stage record");
        }
    }

    fn on_run_closed(&self, line_id: &str, record: &RunRecord) {
        let Ok(dir) = self.line_dir(line_id) else {
            warn!(line_id, "failed to create line directory for run record");
            return;
        };
        let Ok(line) = serde_json::to_string(record) else {
            warn!(line_id, "failed to serialize run record");
            return;
        };
        if let Err(e) = append_line(&dir.join("runs.jsonl"), &line) {
            warn!(line_id, error = %e, "failed to append run record");
        }
    }
}
