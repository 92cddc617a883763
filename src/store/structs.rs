//! The structs
//!
use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct RecordStore {
    pub data_dir: PathBuf,
}
