//! Timestamped readout lines
//!
//! The readout is the user-facing transcript of a diagnostic flow: each
//! line is prefixed with the local wall-clock time. Lines are kept so a
//! caller can inspect the transcript after the flow ends.

use std::sync::{Arc, Mutex};

use chrono::Local;

/// Shared, append-only list of readout lines
#[derive(Debug, Clone, Default)]
pub struct Readout {
    lines: Arc<Mutex<Vec<String>>>,
    echo: bool,
}

impl Readout {
    /// A readout that also prints each line to stdout
    pub fn stdout() -> Self {
        Self {
            lines: Arc::default(),
            echo: true,
        }
    }

    /// A readout that only records
    pub fn silent() -> Self {
        Self::default()
    }

    pub fn push(&self, message: impl AsRef<str>) {
        let line = format!("{} - {}", Local::now().format("%H:%M:%S"), message.as_ref());
        if self.echo {
            println!("{}", line);
        }
        // A listener that panicked mid-push must not silence later lines
        let mut lines = self.lines.lock().unwrap_or_else(|e| e.into_inner());
        lines.push(line);
    }

    pub fn lines(&self) -> Vec<String> {
        self.lines
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Messages without their timestamp prefix
    pub fn messages(&self) -> Vec<String> {
        self.lines()
            .into_iter()
            .map(|line| match line.split_once(" - ") {
                Some((_, message)) => message.to_string(),
                None => line,
            })
            .collect()
    }

    pub fn clear(&self) {
        self.lines.lock().unwrap_or_else(|e| e.into_inner()).clear();
    }
}
