// Durable ledger: an append-only JSON-lines journal in front of the in-memory index.
// Every commit is written and synced to the journal before it becomes visible to readers.

use std::{
    fs::{File, OpenOptions},
    io::{self, BufRead, BufReader, Write},
    path::{Path, PathBuf},
};

use async_trait::async_trait;
use chrono::NaiveDate;
use parking_lot::Mutex;
use tracing::{error, info, warn};

use crate::{
    ledger::{InMemoryLedger, InsertOutcome, LedgerError, LedgerStore, NewReservation},
    model::{CarId, Reservation, ReservationId, UserId},
};

/// The file operations the journal needs. Implemented for `File`; tests
/// substitute a handle that fails on demand.
pub trait JournalFile: Write + Send + 'static {
    fn sync_data(&self) -> io::Result<()>;
    fn set_len(&self, len: u64) -> io::Result<()>;
}

impl JournalFile for File {
    fn sync_data(&self) -> io::Result<()> {
        File::sync_data(self)
    }

    fn set_len(&self, len: u64) -> io::Result<()> {
        File::set_len(self, len)
    }
}

#[derive(Debug)]
struct Tail<F> {
    file: F,
    // bytes covered by acknowledged records
    committed_len: u64,
    poisoned: bool,
}

#[derive(Debug)]
pub struct JournalLedger<F = File> {
    path: PathBuf,
    index: InMemoryLedger,
    tail: Mutex<Tail<F>>,
}

impl JournalLedger<File> {
    /// Opens (or creates) the journal at `path` and replays it.
    ///
    /// A final line without a trailing newline is a torn write from a crash
    /// mid-append and is skipped; any other unreadable line is corruption.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, LedgerError> {
        Self::open_with(path, |file| file)
    }
}

impl<F: JournalFile> JournalLedger<F> {
    pub(crate) fn open_with(
        path: impl AsRef<Path>,
        wrap: impl FnOnce(File) -> F,
    ) -> Result<Self, LedgerError> {
        let path = path.as_ref().to_path_buf();
        let index = InMemoryLedger::new();

        let mut valid_len = None;
        if path.exists() {
            let (replayed, len) = Self::replay(&path, &index)?;
            info!(path = %path.display(), replayed, "journal replayed");
            valid_len = len;
        }

        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        if let Some(len) = valid_len {
            // cut the torn tail so the next append starts on a fresh line
            file.set_len(len)?;
        }
        let committed_len = file.metadata()?.len();

        Ok(Self {
            path,
            index,
            tail: Mutex::new(Tail {
                file: wrap(file),
                committed_len,
                poisoned: false,
            }),
        })
    }

    // Returns the number of replayed entries and, if the tail was torn,
    // the length of the intact prefix
    fn replay(path: &Path, index: &InMemoryLedger) -> Result<(usize, Option<u64>), LedgerError> {
        let mut reader = BufReader::new(File::open(path)?);
        let mut line = String::new();
        let mut line_no = 0;
        let mut replayed = 0;
        let mut offset = 0u64;

        loop {
            line.clear();
            let read = reader.read_line(&mut line)?;
            if read == 0 {
                break;
            }
            line_no += 1;

            if !line.ends_with('\n') {
                warn!(line = line_no, "skipping torn journal tail");
                return Ok((replayed, Some(offset)));
            }
            offset += read as u64;
            if line.trim().is_empty() {
                continue;
            }

            let reservation: Reservation =
                serde_json::from_str(line.trim_end()).map_err(|e| LedgerError::Corrupt {
                    line: line_no,
                    message: e.to_string(),
                })?;

            index
                .restore(reservation)
                .map_err(|existing| LedgerError::Corrupt {
                    line: line_no,
                    message: format!("overlaps {}", existing.reservation_id),
                })?;
            replayed += 1;
        }

        Ok((replayed, None))
    }

    // On failure the file is cut back to the last acknowledged record
    fn append(&self, reservation: &Reservation) -> Result<(), LedgerError> {
        let mut record = serde_json::to_vec(reservation)?;
        record.push(b'\n');

        let mut tail = self.tail.lock();
        if tail.poisoned {
            return Err(LedgerError::Poisoned(self.path.display().to_string()));
        }

        match write_record(&mut tail.file, &record) {
            Ok(()) => {
                tail.committed_len += record.len() as u64;
                Ok(())
            }
            Err(err) => {
                let len = tail.committed_len;
                if let Err(rollback) = tail.file.set_len(len) {
                    tail.poisoned = true;
                    error!(
                        path = %self.path.display(),
                        error = %rollback,
                        "journal rollback failed, refusing further writes"
                    );
                } else {
                    warn!(path = %self.path.display(), error = %err, "journal append rolled back");
                }
                Err(err.into())
            }
        }
    }
}

fn write_record<F: JournalFile>(file: &mut F, record: &[u8]) -> io::Result<()> {
    file.write_all(record)?;
    file.flush()?;
    file.sync_data()
}

#[async_trait]
impl<F: JournalFile> LedgerStore for JournalLedger<F> {
    async fn insert_if_free(&self, request: NewReservation) -> Result<InsertOutcome, LedgerError> {
        self.index.insert_with(request, |r| self.append(r))
    }

    async fn for_car_day(
        &self,
        car_id: CarId,
        day: NaiveDate,
    ) -> Result<Vec<Reservation>, LedgerError> {
        Ok(self.index.for_car_day_now(car_id, day))
    }

    async fn for_car(&self, car_id: CarId) -> Result<Vec<Reservation>, LedgerError> {
        self.index.for_car(car_id).await
    }

    async fn for_user(&self, user_id: UserId) -> Result<Vec<Reservation>, LedgerError> {
        self.index.for_user(user_id).await
    }

    async fn in_range(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<Reservation>, LedgerError> {
        Ok(self.index.range_now(start, end))
    }

    async fn get(
        &self,
        reservation_id: ReservationId,
    ) -> Result<Option<Reservation>, LedgerError> {
        self.index.get(reservation_id).await
    }

    async fn snapshot(&self) -> Result<Vec<Reservation>, LedgerError> {
        self.index.snapshot().await
    }

    async fn len(&self) -> Result<usize, LedgerError> {
        Ok(self.index.len_now())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::TimeOfDay;
    use chrono::Utc;
    use std::sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    };

    #[derive(Debug, Default)]
    struct Faults {
        short_write: AtomicBool,
        fail_sync: AtomicBool,
        fail_truncate: AtomicBool,
    }

    #[derive(Debug)]
    struct FaultyFile {
        inner: File,
        faults: Arc<Faults>,
    }

    impl Write for FaultyFile {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            if self.faults.short_write.load(Ordering::SeqCst) {
                // half the record reaches the file before the device gives up
                self.inner.write_all(&buf[..buf.len() / 2])?;
                return Err(io::Error::new(io::ErrorKind::Other, "no space left on device"));
            }
            self.inner.write(buf)
        }

        fn flush(&mut self) -> io::Result<()> {
            self.inner.flush()
        }
    }

    impl JournalFile for FaultyFile {
        fn sync_data(&self) -> io::Result<()> {
            if self.faults.fail_sync.load(Ordering::SeqCst) {
                return Err(io::Error::new(io::ErrorKind::Other, "sync failed"));
            }
            self.inner.sync_data()
        }

        fn set_len(&self, len: u64) -> io::Result<()> {
            if self.faults.fail_truncate.load(Ordering::SeqCst) {
                return Err(io::Error::new(io::ErrorKind::Other, "truncate failed"));
            }
            self.inner.set_len(len)
        }
    }

    fn faulty(path: &Path) -> (JournalLedger<FaultyFile>, Arc<Faults>) {
        let faults = Arc::new(Faults::default());
        let handle = faults.clone();
        let journal = JournalLedger::open_with(path, |inner| FaultyFile {
            inner,
            faults: handle,
        })
        .unwrap();
        (journal, faults)
    }

    fn request(car: u64, start_h: u16) -> NewReservation {
        NewReservation {
            car_id: CarId(car),
            user_id: UserId(5),
            day: NaiveDate::from_ymd_opt(2026, 10, 20).unwrap(),
            start_time: TimeOfDay::hm(start_h, 0).unwrap(),
            end_time: TimeOfDay::hm(start_h + 2, 0).unwrap(),
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_commits_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ledger.jsonl");

        {
            let journal = JournalLedger::open(&path).unwrap();
            journal.insert_if_free(request(1, 8)).await.unwrap();
            journal.insert_if_free(request(1, 10)).await.unwrap();
            let clash = journal.insert_if_free(request(1, 10)).await.unwrap();
            assert!(matches!(clash, InsertOutcome::Overlap(_)));
        }

        let reopened = JournalLedger::open(&path).unwrap();
        assert_eq!(reopened.len().await.unwrap(), 2);

        // ids continue after the replayed ones and the overlap check still holds
        let clash = reopened.insert_if_free(request(1, 8)).await.unwrap();
        assert!(matches!(clash, InsertOutcome::Overlap(_)));
        match reopened.insert_if_free(request(2, 8)).await.unwrap() {
            InsertOutcome::Committed(r) => assert_eq!(r.reservation_id, ReservationId(3)),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_torn_tail_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ledger.jsonl");
        {
            let journal = JournalLedger::open(&path).unwrap();
            journal.insert_if_free(request(1, 8)).await.unwrap();
        }
        let mut file = OpenOptions::new().append(true).open(&path).unwrap();
        file.write_all(b"{\"reservation_id\":2,\"car_").unwrap();

        let reopened = JournalLedger::open(&path).unwrap();
        assert_eq!(reopened.len().await.unwrap(), 1);
        reopened.insert_if_free(request(1, 12)).await.unwrap();
        drop(reopened);

        let again = JournalLedger::open(&path).unwrap();
        assert_eq!(again.len().await.unwrap(), 2);
    }

    #[test]
    fn test_corrupt_line_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ledger.jsonl");
        std::fs::write(&path, "not json\n").unwrap();

        let err = JournalLedger::open(&path).unwrap_err();
        assert!(matches!(err, LedgerError::Corrupt { line: 1, .. }));
        assert!(!err.is_transient());
    }

    #[tokio::test]
    async fn test_failed_append_is_rolled_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ledger.jsonl");

        {
            let (journal, faults) = faulty(&path);
            journal.insert_if_free(request(1, 8)).await.unwrap();

            faults.short_write.store(true, Ordering::SeqCst);
            let err = journal.insert_if_free(request(1, 10)).await.unwrap_err();
            assert!(matches!(err, LedgerError::Io(_)));
            faults.short_write.store(false, Ordering::SeqCst);

            faults.fail_sync.store(true, Ordering::SeqCst);
            assert!(journal.insert_if_free(request(1, 10)).await.is_err());
            faults.fail_sync.store(false, Ordering::SeqCst);
            assert_eq!(journal.len().await.unwrap(), 1);

            // the slot the failed appends asked for is still free
            let outcome = journal.insert_if_free(request(1, 10)).await.unwrap();
            assert!(matches!(outcome, InsertOutcome::Committed(_)));
        }

        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents.lines().count(), 2);
        assert!(contents.ends_with('\n'));

        let reopened = JournalLedger::open(&path).unwrap();
        assert_eq!(reopened.len().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_failed_rollback_refuses_further_writes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ledger.jsonl");
        let (journal, faults) = faulty(&path);

        faults.fail_sync.store(true, Ordering::SeqCst);
        faults.fail_truncate.store(true, Ordering::SeqCst);
        let err = journal.insert_if_free(request(1, 8)).await.unwrap_err();
        assert!(matches!(err, LedgerError::Io(_)));

        faults.fail_sync.store(false, Ordering::SeqCst);
        faults.fail_truncate.store(false, Ordering::SeqCst);
        let err = journal.insert_if_free(request(2, 8)).await.unwrap_err();
        assert!(matches!(err, LedgerError::Poisoned(_)));
        assert!(!err.is_transient());
        assert_eq!(journal.len().await.unwrap(), 0);
    }
}
