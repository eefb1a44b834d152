use anyhow::Result;
use chrono::Utc;
use std::path::{Path, PathBuf};
use tokio::{fs::OpenOptions, io::AsyncWriteExt, sync::Mutex};
use uuid::Uuid;

// ─── SessionLog ───────────────────────────────────────────────────────────────

/// Append-only raw-output log for one bootstrap run after another.
///
/// Every line a step action writes to stdout or stderr lands here instead of
/// the terminal, so the interactive display stays one line per step while the
/// full detail survives for post-hoc debugging. The file is created on first
/// write, only ever appended to, and never rotated or truncated by this tool.
///
/// The file handle is cached for the process lifetime. Write failures are
/// logged at WARN and never propagated; an unwritable log does not abort
/// the bootstrap.
pub struct SessionLog {
    path: PathBuf,
    /// Cached, open file handle; `None` until the first write.
    file: Mutex<Option<tokio::fs::File>>,
}

impl SessionLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            file: Mutex::new(None),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write the run header and return the generated run id.
    ///
    /// Runs append to the same file, so the header is what tells one run's
    /// output apart from the next.
    pub async fn begin_run(&self) -> String {
        let run_id = Uuid::new_v4().to_string();
        let header = format!(
            "==== devup run {} started {} ====",
            run_id,
            Utc::now().to_rfc3339()
        );
        self.append_line(&header).await;
        run_id
    }

    /// Mark the start of a step's captured output.
    pub async fn begin_step(&self, label: &str) {
        self.append_line(&format!("--- {} ({}) ---", label, Utc::now().to_rfc3339()))
            .await;
    }

    /// Append one raw line (a newline is added).
    pub async fn append_line(&self, line: &str) {
        if let Err(e) = self.try_append(line).await {
            tracing::warn!(err = %e, path = %self.path.display(), "session log write failed");
        }
    }

    async fn try_append(&self, line: &str) -> Result<()> {
        let mut guard = self.file.lock().await;

        // Open lazily on the first write.
        if guard.is_none() {
            if let Some(parent) = self.path.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            let f = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&self.path)
                .await?;
            *guard = Some(f);
        }

        let f = guard.as_mut().expect("handle opened above");
        f.write_all(line.as_bytes()).await?;
        f.write_all(b"\n").await?;
        Ok(())
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────
