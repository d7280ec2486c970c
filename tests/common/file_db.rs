//! A simple, persistent, file-backed implementation of [`KVStore`].

use std::{
    collections::{HashMap, HashSet},
    fs, io,
    path::{Path, PathBuf},
};

use borsh::{BorshDeserialize, BorshSerialize};
use state_repair::stores::pluggables::{KVGet, KVStore, WriteBatch};

/// Name of the file a `FileDB` keeps its contents in, inside its store directory.
pub(crate) const DB_FILE: &str = "kv.borsh";

/// A file-backed implementation of [`KVStore`].
///
/// The whole key-value map is held in memory and rewritten to disk on every `write`, through a
/// temporary file that is renamed over the old one, so a write batch is either fully persisted or not
/// at all. Reopening the same directory gives back what was last written, which is what lets tests
/// "restart" a node.
pub(crate) struct FileDB {
    path: PathBuf,
    map: HashMap<Vec<u8>, Vec<u8>>,
}

impl KVStore for FileDB {
    type WriteBatch = FileWriteBatch;

    fn open(path: &Path) -> io::Result<Self> {
        fs::create_dir_all(path)?;
        let path = path.join(DB_FILE);
        let map = match fs::read(&path) {
            Ok(bytes) => HashMap::<Vec<u8>, Vec<u8>>::try_from_slice(&bytes)?,
            Err(err) if err.kind() == io::ErrorKind::NotFound => HashMap::new(),
            Err(err) => return Err(err),
        };
        Ok(FileDB { path, map })
    }

    fn write(&mut self, wb: Self::WriteBatch) -> io::Result<()> {
        let mut map = self.map.clone();
        for (key, value) in wb.insertions {
            map.insert(key, value);
        }
        for key in wb.deletions {
            map.remove(&key);
        }

        let tmp_path = self.path.with_extension("tmp");
        fs::write(&tmp_path, map.try_to_vec()?)?;
        fs::rename(&tmp_path, &self.path)?;

        self.map = map;
        Ok(())
    }
}

impl KVGet for FileDB {
    fn get(&self, key: &[u8]) -> Option<Vec<u8>> {
        self.map.get(key).cloned()
    }
}

// A simple implementation of [`WriteBatch`].
pub(crate) struct FileWriteBatch {
    insertions: HashMap<Vec<u8>, Vec<u8>>,
    deletions: HashSet<Vec<u8>>,
}

impl WriteBatch for FileWriteBatch {
    fn new() -> Self {
        FileWriteBatch {
            insertions: HashMap::new(),
            deletions: HashSet::new(),
        }
    }

    fn set(&mut self, key: &[u8], value: &[u8]) {
        let _ = self.deletions.remove(key);
        self.insertions.insert(key.to_vec(), value.to_vec());
    }

    fn delete(&mut self, key: &[u8]) {
        let _ = self.insertions.remove(key);
        self.deletions.insert(key.to_vec());
    }
}
