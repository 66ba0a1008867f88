use rocksdb::{Options, WriteBatch, DB};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;

pub struct Storage {
    db: Arc<DB>,
}

impl Storage {
    pub fn open(path: &str) -> Result<Self, String> {
        let path = Path::new(path);
        let mut opts = Options::default();
        opts.create_if_missing(true);

        let db = DB::open(&opts, path).map_err(|e| e.to_string())?;
        Ok(Storage { db: Arc::new(db) })
    }

    // Generic Helper: Put
    pub fn put<T: Serialize>(&self, key: &str, value: &T) -> Result<(), String> {
        let serialized = bincode::serialize(value).map_err(|e| e.to_string())?;
        self.db
            .put(key.as_bytes(), serialized)
            .map_err(|e| e.to_string())
    }

    // Generic Helper: Get
    pub fn get<T: for<'a> Deserialize<'a>>(&self, key: &str) -> Result<Option<T>, String> {
        match self.db.get(key.as_bytes()) {
            Ok(Some(data)) => {
                let deserialized = bincode::deserialize(&data).map_err(|e| e.to_string())?;
                Ok(Some(deserialized))
            }
            Ok(None) => Ok(None),
            Err(e) => Err(e.to_string()),
        }
    }

    pub fn delete(&self, key: &str) -> Result<(), String> {
        self.db.delete(key.as_bytes()).map_err(|e| e.to_string())
    }

    /// All values whose key starts with `prefix`, in key order.
    pub fn scan_prefix<T: for<'a> Deserialize<'a>>(&self, prefix: &str) -> Result<Vec<T>, String> {
        let mut out = Vec::new();
        let iter = self.db.prefix_iterator(prefix.as_bytes());
        for item in iter {
            let (key, value) = item.map_err(|e| e.to_string())?;
            if !key.starts_with(prefix.as_bytes()) {
                break;
            }
            let deserialized = bincode::deserialize(&value).map_err(|e| e.to_string())?;
            out.push(deserialized);
        }
        Ok(out)
    }

    /// Write several keys as a single atomic batch.
    pub fn put_batch(&self, entries: Vec<(String, Vec<u8>)>) -> Result<(), String> {
        let mut batch = WriteBatch::default();
        for (key, value) in entries {
            batch.put(key.as_bytes(), value);
        }
        self.db.write(batch).map_err(|e| e.to_string())
    }

    pub fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, String> {
        bincode::serialize(value).map_err(|e| e.to_string())
    }
}

pub mod keys {
    pub fn account(id: u64) -> String {
        format!("account:{}", id)
    }

    pub fn verify_token(token: &str) -> String {
        format!("vtoken:{}", token)
    }

    pub fn plan(id: u64) -> String {
        format!("plan:{}", id)
    }

    pub fn instance(id: u64) -> String {
        format!("inst:{}", id)
    }

    pub fn transaction(account_id: u64, id: &str) -> String {
        format!("txn:{}:{}", account_id, id)
    }

    pub fn message(id: &str) -> String {
        format!("msg:{}", id)
    }
}
