//! Background execution of backup and restore runs.
//!
//! A [`JobSlot`] tracks at most one worker thread. Starting a new job while
//! one is still running replaces the tracked handle; the old worker keeps
//! running detached and its result is dropped. `stop` only forgets the
//! handle, it never interrupts a worker.

use std::sync::Arc;
use std::thread::{self, JoinHandle};

use tracing::{debug, info, warn};

use crate::backup::{BackupSummary, run_backup};
use crate::error::{Error, Result};
use crate::io::config::TransferOptions;
use crate::io::remote::TagClient;
use crate::restore::{RestoreSummary, run_restore};

pub struct JobSlot<T> {
    name: String,
    handle: Option<JoinHandle<T>>,
}

impl<T: Send + 'static> JobSlot<T> {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            handle: None,
        }
    }

    /// Spawn `job` on a named thread and track it.
    pub fn start<F>(&mut self, label: &str, job: F) -> Result<()>
    where
        F: FnOnce() -> T + Send + 'static,
    {
        if self.is_running() {
            warn!(slot = %self.name, "previous job still running, detaching it");
        }
        let handle = thread::Builder::new()
            .name(format!("{}-{label}", self.name))
            .spawn(job)
            .map_err(|err| Error::io(format!("spawn {label} job"), err))?;
        self.handle = Some(handle);
        debug!(slot = %self.name, label, "job started");
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.handle
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// Forget the tracked job. Returns whether one was tracked.
    pub fn stop(&mut self) -> bool {
        self.handle.take().is_some()
    }

    /// Join the tracked job. `None` when nothing is tracked.
    pub fn wait(&mut self) -> Option<thread::Result<T>> {
        self.handle.take().map(JoinHandle::join)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferReport {
    Backup(BackupSummary),
    Restore(RestoreSummary),
}

/// Owns the client, the resolved options and the single job slot.
pub struct TransferLogic<C> {
    client: Arc<C>,
    options: TransferOptions,
    slot: JobSlot<Result<TransferReport>>,
}

impl<C> TransferLogic<C>
where
    C: TagClient + Send + Sync + 'static,
{
    pub fn new(client: Arc<C>, options: TransferOptions) -> Self {
        Self {
            client,
            options,
            slot: JobSlot::new("tagbackup"),
        }
    }

    pub fn options(&self) -> &TransferOptions {
        &self.options
    }

    pub fn start_backup(&mut self) -> Result<()> {
        let client = Arc::clone(&self.client);
        let options = self.options.clone();
        self.slot.start("backup", move || {
            run_backup(&options, client.as_ref()).map(TransferReport::Backup)
        })
    }

    pub fn start_restore(&mut self) -> Result<()> {
        let client = Arc::clone(&self.client);
        let options = self.options.clone();
        self.slot.start("restore", move || {
            run_restore(&options, client.as_ref()).map(TransferReport::Restore)
        })
    }

    pub fn is_running(&self) -> bool {
        self.slot.is_running()
    }

    pub fn stop(&mut self) {
        if self.slot.stop() {
            info!("transfer job detached");
        }
    }

    /// Block until the tracked job finishes and return its outcome.
    pub fn wait(&mut self) -> Result<Option<TransferReport>> {
        match self.slot.wait() {
            None => Ok(None),
            Some(Ok(outcome)) => outcome.map(Some),
            Some(Err(_)) => Err(Error::JobPanicked {
                job: "transfer".to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::record::RecordFormat;
    use crate::test_support::{MemoryTagClient, options_for, sample_tags};
    use std::sync::mpsc;
    use std::time::Duration;

    #[test]
    fn newer_job_replaces_tracked_handle() {
        let (release, blocked) = mpsc::channel::<()>();
        let mut slot = JobSlot::new("test");
        slot.start("first", move || {
            blocked.recv().ok();
            1
        })
        .expect("start first");
        assert!(slot.is_running());

        slot.start("second", || 2).expect("start second");
        assert_eq!(slot.wait().expect("tracked").expect("joined"), 2);
        release.send(()).ok();
        assert!(slot.wait().is_none());
    }

    #[test]
    fn stop_forgets_the_job() {
        let mut slot = JobSlot::new("test");
        slot.start("only", || ()).expect("start");
        assert!(slot.stop());
        assert!(!slot.stop());
        assert!(slot.wait().is_none());
    }

    #[test]
    fn panicking_job_is_reported() {
        let temp = tempfile::tempdir().expect("tempdir");
        let client = Arc::new(MemoryTagClient::new("Plant", Vec::new()));
        let mut logic = TransferLogic::new(
            client,
            options_for(temp.path().join("x.csv"), RecordFormat::default()),
        );
        logic
            .slot
            .start("boom", || panic!("boom"))
            .expect("start");
        assert!(matches!(logic.wait(), Err(Error::JobPanicked { .. })));
    }

    #[test]
    fn backup_then_restore_through_jobs() {
        let temp = tempfile::tempdir().expect("tempdir");
        let options = options_for(temp.path().join("plant.csv"), RecordFormat::new(';', true));
        let source = Arc::new(
            MemoryTagClient::new("Plant", sample_tags()).with_read_delay(Duration::from_millis(20)),
        );
        let mut logic = TransferLogic::new(source, options.clone());
        logic.start_backup().expect("start backup");
        let Some(TransferReport::Backup(summary)) = logic.wait().expect("backup") else {
            panic!("expected backup report");
        };
        assert_eq!(summary.excluded, 1);
        assert_eq!(summary.skipped, 0);

        let target = Arc::new(MemoryTagClient::empty_like("Plant", &sample_tags()));
        let mut logic = TransferLogic::new(Arc::clone(&target), options);
        logic.start_restore().expect("start restore");
        let Some(TransferReport::Restore(summary)) = logic.wait().expect("restore") else {
            panic!("expected restore report");
        };
        assert_eq!(summary.restored, sample_tags().len() - 1);
        assert_eq!(target.writes().len(), 1);
        assert!(logic.wait().expect("idle").is_none());
    }
}
