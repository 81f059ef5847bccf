use bytes::Bytes;
use std::sync::{Arc, Mutex};
use std::{fmt, io};

/// Position of a record in a journal. The first record is at 1, there is never a record at 0.
#[derive(Copy, Clone, PartialOrd, PartialEq, Ord, Eq)]
pub struct JournalIndex(u64);

impl JournalIndex {
    pub fn start_index() -> Self {
        JournalIndex(1)
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }

    pub fn plus(&self, delta: u64) -> JournalIndex {
        JournalIndex(self.0 + delta)
    }
}

impl fmt::Debug for JournalIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Append only record of a shard's persisted events, replayed on recovery. Records are opaque,
/// self-describing byte strings and must stay readable by every later version.
pub trait Journal: Send {
    /// Appends at `next_index()` and returns the index used.
    fn append(&mut self, record: Bytes) -> Result<JournalIndex, io::Error>;

    fn read(&self, index: JournalIndex) -> Result<Option<Bytes>, io::Error>;

    fn next_index(&self) -> JournalIndex;
}

/// Clones share the same records, so a restarted shard can recover what its predecessor wrote.
#[derive(Clone, Default)]
pub struct InMemoryJournal {
    records: Arc<Mutex<Vec<Bytes>>>,
}

impl InMemoryJournal {
    pub fn new() -> Self {
        Self::default()
    }

    fn vec_index(index: JournalIndex) -> Option<usize> {
        (index.as_u64() as usize).checked_sub(1)
    }

    fn poisoned() -> io::Error {
        io::Error::new(io::ErrorKind::Other, "journal lock poisoned")
    }
}

impl Journal for InMemoryJournal {
    fn append(&mut self, record: Bytes) -> Result<JournalIndex, io::Error> {
        let mut records = self.records.lock().map_err(|_| Self::poisoned())?;
        records.push(record);

        Ok(JournalIndex(records.len() as u64))
    }

    fn read(&self, index: JournalIndex) -> Result<Option<Bytes>, io::Error> {
        let records = self.records.lock().map_err(|_| Self::poisoned())?;

        Ok(Self::vec_index(index).and_then(|i| records.get(i).cloned()))
    }

    fn next_index(&self) -> JournalIndex {
        let len = self.records.lock().map(|records| records.len()).unwrap_or(0);
        JournalIndex(len as u64 + 1)
    }
}
