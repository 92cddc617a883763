//! The impls and functions
//!
use std::{fs, io::Write, path::{Path, PathBuf}};
use anyhow::{Context, Result};
use log::*;
use crate::registry::NodeEntry;
use crate::store::RecordStore;
use crate::wire::Record;

impl RecordStore {
    /// Create the store; the data directory is created if it does not exist.
    pub fn new(
        data_dir: &Path,
    ) -> Result<Self>
    {
        fs::create_dir_all(data_dir)
            .with_context(|| format!("Cannot create directory: {}", data_dir.display()))?;
        Ok(RecordStore { data_dir: data_dir.to_path_buf() })
    }
    /// The file for a node: named after its hostname, or its id when it did not report one.
    pub fn file_path(&self, entry: &NodeEntry) -> PathBuf {
        let shortname = match entry.hostname.as_deref() {
            Some(hostname) if !hostname.is_empty() => hostname,
            _ => entry.id.as_str(),
        };
        let shortname: String = shortname
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || "-_.".contains(c) { c } else { '_' })
            .collect();
        self.data_dir.join(format!("{}.txt", shortname))
    }
    /// Append records to the node's file, writing the header lines first if the file is new.
    pub fn store(
        &self,
        entry: &NodeEntry,
        records: &[Record],
    ) -> Result<()>
    {
        debug!("new data ({} records) from slot {}", records.len(), entry.slot);
        let filepath = self.file_path(entry);
        let is_new = !filepath.exists();

        let mut lines = String::new();
        if is_new {
            lines.push_str(&format!("{}\n{}\n{}\n", entry.id, entry.hostname.as_deref().unwrap_or_default(), entry.address));
        }
        for record in records {
            lines.push_str(&serde_json::to_string(record).with_context(|| "Json serialization error")?);
            lines.push('\n');
        }

        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&filepath)
            .with_context(|| format!("Cannot open file: {}", filepath.display()))?;
        file.write_all(lines.as_bytes())
            .with_context(|| format!("Error writing to file: {}", filepath.display()))?;
        Ok(())
    }
}
