//! `companion_dialogs.md` — harvested high-quality Q/A pairs.
//!
//! One pair per block: `Q: <question>\nA: <answer>\n\n`.

use std::collections::HashSet;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::error::AppError;

pub struct DialogStore {
    path: PathBuf,
}

impl DialogStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read(&self) -> Result<String, AppError> {
        match fs::read_to_string(&self.path) {
            Ok(s) => Ok(s),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(String::new()),
            Err(e) => Err(AppError::Memory(format!(
                "cannot read {}: {e}",
                self.path.display()
            ))),
        }
    }

    /// All stored pairs as `"Q: …\nA: …"` strings.
    pub fn load_qas(&self) -> Result<Vec<String>, AppError> {
        Ok(parse_qas(&self.read()?))
    }

    /// Append one pair. Newlines inside either side are flattened to spaces
    /// so the pair stays on two lines.
    pub fn append(&self, question: &str, answer: &str) -> Result<(), AppError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut f = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| AppError::Memory(format!("cannot open {}: {e}", self.path.display())))?;
        write!(f, "Q: {}\nA: {}\n\n", single_line(question), single_line(answer))
            .map_err(|e| AppError::Memory(format!("cannot write {}: {e}", self.path.display())))
    }

    /// Drop repeated lines, blank ones included, keeping first occurrences.
    /// Returns the number of lines removed.
    pub fn dedup_lines(&self) -> Result<usize, AppError> {
        let content = self.read()?;
        if content.is_empty() {
            return Ok(0);
        }
        let mut seen = HashSet::new();
        let mut removed = 0usize;
        let mut out = String::with_capacity(content.len());
        for line in content.split_inclusive('\n') {
            let key = line.trim_end_matches(['\r', '\n']);
            if !seen.insert(key.to_string()) {
                removed += 1;
                continue;
            }
            out.push_str(line);
        }
        if removed > 0 {
            fs::write(&self.path, out).map_err(|e| {
                AppError::Memory(format!("cannot write {}: {e}", self.path.display()))
            })?;
        }
        Ok(removed)
    }

    /// The last `n` lines of the file.
    pub fn recent_lines(&self, n: usize) -> Result<Vec<String>, AppError> {
        let content = self.read()?;
        let lines: Vec<&str> = content.lines().collect();
        let start = lines.len().saturating_sub(n);
        Ok(lines[start..].iter().map(|l| l.to_string()).collect())
    }
}

fn single_line(s: &str) -> String {
    s.lines().map(str::trim).filter(|l| !l.is_empty()).collect::<Vec<_>>().join(" ")
}

/// Pair each `Q:` line with the `A:` line that follows it.
pub fn parse_qas(content: &str) -> Vec<String> {
    let mut qas = Vec::new();
    let mut question: Option<&str> = None;
    for line in content.lines() {
        if line.starts_with("Q:") {
            question = Some(line);
        } else if line.starts_with("A:") {
            if let Some(q) = question.take() {
                qas.push(format!("{q}\n{line}"));
            }
        }
    }
    qas
}
