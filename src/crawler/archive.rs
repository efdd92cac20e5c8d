//! Raw payload archive
//!
//! Every vendor response a job receives can be kept verbatim under the job's
//! `raw/` directory for later inspection.

use serde_json::Value;
use std::fs::{self, File};
use std::io::{self, BufWriter};
use std::path::{Path, PathBuf};

/// Writes raw JSON payloads for one job
#[derive(Debug, Clone)]
pub struct RawArchive {
    dir: PathBuf,
}

impl RawArchive {
    /// Creates `<job_dir>/raw`
    pub fn create(job_dir: &Path) -> io::Result<Self> {
        let dir = job_dir.join("raw");
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn save_search(&self, term: &str, page: u32, body: &Value) -> io::Result<PathBuf> {
        self.save(&format!("search_{}_page_{}.json", file_token(term), page), body)
    }

    pub fn save_category(&self, category_id: &str, page: u32, body: &Value) -> io::Result<PathBuf> {
        self.save(
            &format!("category_{}_page_{}.json", file_token(category_id), page),
            body,
        )
    }

    pub fn save_product(&self, item_id: &str, body: &Value) -> io::Result<PathBuf> {
        self.save(&format!("product_{}.json", file_token(item_id)), body)
    }

    fn save(&self, name: &str, body: &Value) -> io::Result<PathBuf> {
        let path = self.dir.join(name);
        let writer = BufWriter::new(File::create(&path)?);
        serde_json::to_writer_pretty(writer, body)?;
        Ok(path)
    }
}

/// Replaces anything but alphanumerics, `-` and `.` with `_`
fn file_token(raw: &str) -> String {
    let token: String = raw
        .trim()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '.' {
                c
            } else {
                '_'
            }
        })
        .collect();
    if token.is_empty() {
        "unnamed".to_string()
    } else {
        token
    }
}
