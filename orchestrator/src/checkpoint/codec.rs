use std::{
    collections::BTreeMap,
    fs,
    io::{self, BufWriter, Write},
    path::Path,
};

use machine_learning::{
    StateDict, optimization::OptimizerState, optimization::scheduler::SchedulerState,
};
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;

use crate::{OrchestratorError, Result};

/// Leads every checkpoint file.
pub const MAGIC: &[u8; 8] = b"GANCKPT\0";
/// The layout version following the magic, big endian.
pub const VERSION: u32 = 1;

const HEADER_LEN: usize = MAGIC.len() + size_of::<u32>();

/// The saved state of a single component.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ItemState {
    Module(StateDict),
    Optimizer(OptimizerState),
    Scheduler(SchedulerState),
}

impl ItemState {
    pub fn kind(&self) -> &'static str {
        match self {
            ItemState::Module(_) => "module",
            ItemState::Optimizer(_) => "optimizer",
            ItemState::Scheduler(_) => "scheduler",
        }
    }
}

/// Everything a checkpoint file holds.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CheckpointRecord {
    pub iteration: u64,
    pub items: BTreeMap<String, ItemState>,
}

/// Writes `record` to `path`, creating its parent directories.
///
/// The record is written to a temporary file in the same directory which is then renamed over
/// `path`, so a reader never observes a partially written checkpoint.
///
/// # Errors
/// `OrchestratorError::Io` or `OrchestratorError::Codec` if writing fails, in which case `path`
/// is left as it was.
pub fn write(path: &Path, record: &CheckpointRecord) -> Result<()> {
    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir)?;

    let mut tmp = NamedTempFile::new_in(dir)?;
    {
        let mut writer = BufWriter::new(tmp.as_file_mut());
        writer.write_all(MAGIC)?;
        writer.write_all(&VERSION.to_be_bytes())?;
        bincode::serialize_into(&mut writer, record)?;
        writer.flush()?;
    }
    tmp.as_file().sync_all()?;

    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

/// Reads the checkpoint at `path`.
///
/// # Errors
/// `OrchestratorError::CheckpointNotFound` if there's no file at `path` and
/// `OrchestratorError::CorruptCheckpoint` if it isn't a checkpoint of this version.
pub fn read(path: &Path) -> Result<CheckpointRecord> {
    let bytes = fs::read(path).map_err(|e| match e.kind() {
        io::ErrorKind::NotFound => OrchestratorError::CheckpointNotFound(path.to_path_buf()),
        _ => OrchestratorError::Io(e),
    })?;

    let corrupt = |reason: String| OrchestratorError::CorruptCheckpoint {
        path: path.to_path_buf(),
        reason,
    };

    if bytes.len() < HEADER_LEN || &bytes[..MAGIC.len()] != MAGIC {
        return Err(corrupt("not a checkpoint file".to_string()));
    }

    let mut version = [0; size_of::<u32>()];
    version.copy_from_slice(&bytes[MAGIC.len()..HEADER_LEN]);
    let version = u32::from_be_bytes(version);
    if version != VERSION {
        return Err(corrupt(format!(
            "layout version {version}, expected {VERSION}"
        )));
    }

    bincode::deserialize(&bytes[HEADER_LEN..]).map_err(|e| corrupt(e.to_string()))
}

#[cfg(test)]
mod tests {
    use machine_learning::Tensor;
    use tempfile::tempdir;

    use super::*;

    fn record(iteration: u64) -> CheckpointRecord {
        let state = StateDict::from([("0.weight".to_string(), Tensor::ones(vec![2, 3]))]);
        let optimizer = OptimizerState::new("adam", 1e-3, 4)
            .with_buffer("exp_avg", vec![Tensor::zeros(vec![2, 3])]);
        let scheduler = SchedulerState {
            kind: "step_lr".to_string(),
            base_lr: 1e-3,
            last_epoch: 4,
        };

        CheckpointRecord {
            iteration,
            items: BTreeMap::from([
                ("module_gen".to_string(), ItemState::Module(state)),
                ("optim_gen".to_string(), ItemState::Optimizer(optimizer)),
                ("sched_gen".to_string(), ItemState::Scheduler(scheduler)),
            ]),
        }
    }

    #[test]
    fn reads_what_it_wrote() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("ckpt.bin");

        write(&path, &record(12)).unwrap();
        assert_eq!(read(&path).unwrap(), record(12));
    }

    #[test]
    fn overwrites_and_leaves_no_temporaries() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("ckpt.bin");

        write(&path, &record(1)).unwrap();
        write(&path, &record(2)).unwrap();

        assert_eq!(read(&path).unwrap().iteration, 2);
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn missing_file_is_not_found() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("absent.bin");

        assert!(matches!(
            read(&path),
            Err(OrchestratorError::CheckpointNotFound(p)) if p == path
        ));
    }

    #[test]
    fn rejects_foreign_and_truncated_files() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("ckpt.bin");

        fs::write(&path, b"definitely not a checkpoint").unwrap();
        assert!(matches!(
            read(&path),
            Err(OrchestratorError::CorruptCheckpoint { .. })
        ));

        write(&path, &record(3)).unwrap();
        let bytes = fs::read(&path).unwrap();
        fs::write(&path, &bytes[..bytes.len() - 4]).unwrap();
        assert!(matches!(
            read(&path),
            Err(OrchestratorError::CorruptCheckpoint { .. })
        ));
    }

    #[test]
    fn rejects_other_versions() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("ckpt.bin");

        let mut bytes = MAGIC.to_vec();
        bytes.extend_from_slice(&(VERSION + 1).to_be_bytes());
        fs::write(&path, bytes).unwrap();

        assert!(matches!(
            read(&path),
            Err(OrchestratorError::CorruptCheckpoint { ref reason, .. }) if reason.contains("version")
        ));
    }
}
