// Fieldlink Gateway - Poll/uplink orchestration for telemetry gateways
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! File-backed frame counter store
//!
//! One file per key (`<dir>/<key>.cnt`) holding the checksummed record from
//! [`fieldlink::store::encode_counter`]. Writes go to a temporary file that
//! is synced and renamed over the previous record.

use std::fs::{self, File};
use std::io::{ErrorKind, Read, Write};
use std::path::{Path, PathBuf};

use fieldlink::store::{decode_counter, encode_counter, CounterStore};
use fieldlink::{Result, StoreError};
use log::debug;

/// Counter store writing one small file per key
#[derive(Debug, Clone)]
pub struct FileCounterStore {
    dir: PathBuf,
}

impl FileCounterStore {
    /// Store counters under `dir` (created on first save)
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Directory holding the counter files
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the record for `key`
    pub fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.cnt", key))
    }
}

fn io_error(key: &str, action: &str, e: std::io::Error) -> StoreError {
    StoreError::Io {
        key: key.to_string(),
        reason: format!("Failed to {}: {}", action, e),
    }
}

impl CounterStore for FileCounterStore {
    fn load(&mut self, key: &str) -> Result<Option<u32>> {
        let path = self.path_for(key);
        let mut file = match File::open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(io_error(key, "open counter file", e).into()),
        };

        let mut bytes = Vec::new();
        file.read_to_end(&mut bytes)
            .map_err(|e| io_error(key, "read counter file", e))?;
        decode_counter(key, &bytes).map(Some)
    }

    fn save(&mut self, key: &str, value: u32) -> Result<()> {
        fs::create_dir_all(&self.dir).map_err(|e| io_error(key, "create store directory", e))?;

        let path = self.path_for(key);
        let tmp = path.with_extension("tmp");
        {
            let mut file =
                File::create(&tmp).map_err(|e| io_error(key, "create counter file", e))?;
            file.write_all(&encode_counter(value))
                .map_err(|e| io_error(key, "write counter file", e))?;
            file.sync_all()
                .map_err(|e| io_error(key, "sync counter file", e))?;
        }
        fs::rename(&tmp, &path).map_err(|e| io_error(key, "replace counter file", e))?;

        debug!("Saved {} = {} to {}", key, value, path.display());
        Ok(())
    }
}
