//! Crash-recoverable per-hour checkpoint.
//!
//! Written after every committed mutation outside `Other`, as self-describing
//! JSON (field names survive schema drift) under `checkpoint-<HH>.dat`,
//! replaced atomically (write-to-temp, rename) so a crash mid-write can never
//! corrupt the last good checkpoint. A write failure is logged and does not
//! abort the pipeline -- the next successful write replaces the file.

use std::path::PathBuf;

use tracing::warn;

use crate::aggregator::HourlyRow;

pub struct Checkpointer {
    dir: PathBuf,
}

impl Checkpointer {
    pub fn new(dir: PathBuf) -> Self {
        Checkpointer { dir }
    }

    fn path_for(&self, hour: u32) -> PathBuf {
        self.dir.join(format!("checkpoint-{:02}.dat", hour))
    }

    /// Writes `row` as the checkpoint for `hour`. Logs and swallows failures.
    pub fn save(&self, hour: u32, row: &HourlyRow) {
        if let Err(err) = self.try_save(hour, row) {
            warn!(error = %err, hour, "checkpoint write failed, continuing");
        }
    }

    fn try_save(&self, hour: u32, row: &HourlyRow) -> anyhow::Result<()> {
        let final_path = self.path_for(hour);
        let tmp_path = self.dir.join(format!("checkpoint-{:02}.dat.tmp", hour));
        let bytes = serde_json::to_vec_pretty(row)?;
        std::fs::write(&tmp_path, &bytes)?;
        std::fs::rename(&tmp_path, &final_path)?;
        Ok(())
    }

    /// Loads the checkpoint for `current_hour` if it exists, as required on
    /// startup. Deletes every other stale checkpoint file found in the
    /// directory.
    pub fn load_on_startup(&self, current_hour: u32) -> Option<HourlyRow> {
        let current_path = self.path_for(current_hour);
        let loaded = std::fs::read(&current_path).ok().and_then(|bytes| {
            serde_json::from_slice::<HourlyRow>(&bytes)
                .map_err(|err| warn!(error = %err, "stored checkpoint is unreadable, discarding"))
                .ok()
        });

        self.delete_all_except(if loaded.is_some() {
            Some(current_hour)
        } else {
            None
        });

        loaded
    }

    /// Deletes every checkpoint file, e.g. on flush or idle entry.
    pub fn delete_all(&self) {
        self.delete_all_except(None);
    }

    fn delete_all_except(&self, keep_hour: Option<u32>) {
        let Ok(entries) = std::fs::read_dir(&self.dir) else {
            return;
        };
        for entry in entries.flatten() {
            let path = entry.path();
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            if !name.starts_with("checkpoint-") {
                continue;
            }
            if let Some(keep) = keep_hour {
                if name == format!("checkpoint-{:02}.dat", keep) {
                    continue;
                }
            }
            let _ = std::fs::remove_file(&path);
        }
    }
}
