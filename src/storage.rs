//! Object and record storage collaborators.
//!
//! The pipeline talks to two stores through traits:
//!
//! - [`ObjectStore`]: blob storage addressed by `(bucket, name)`, with a
//!   public URL per stored object.
//! - [`RecordStore`]: JSON records addressed by `(table, id)`, partially
//!   updated field by field.
//!
//! Two implementations of each ship with the crate. The local ones persist
//! to a directory tree and back the CLI. The memory ones keep everything in
//! process, can be told to fail, and back `--dry-run` and the tests.

use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use thiserror::Error;
use walkdir::WalkDir;

/// One stored record: a JSON object with an `"id"` field.
pub type Record = Map<String, Value>;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Unauthorized: {0}")]
    Unauthorized(String),
    #[error("Invalid name: {0}")]
    InvalidName(String),
    #[error("Store failure: {0}")]
    Backend(String),
}

/// Location of a stored object inside its bucket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    pub path: String,
}

pub trait ObjectStore {
    /// Store `bytes` under `name`. Names are never reused, so an existing
    /// object is simply overwritten.
    fn put(
        &self,
        bucket: &str,
        name: &str,
        bytes: &[u8],
        content_type: &str,
    ) -> Result<StoredObject, StorageError>;

    /// Public URL for a stored path.
    fn public_url(&self, bucket: &str, path: &str) -> String;

    /// Names of stored objects whose path starts with `prefix`, sorted.
    fn list(&self, bucket: &str, prefix: &str) -> Result<Vec<String>, StorageError>;

    /// Remove the named objects. Names that do not exist are ignored.
    fn remove(&self, bucket: &str, names: &[String]) -> Result<(), StorageError>;

    /// Inverse of [`public_url`](Self::public_url): the stored path a URL
    /// points at, or `None` if it belongs to another bucket or host.
    fn path_from_url(&self, bucket: &str, url: &str) -> Option<String> {
        let prefix = self.public_url(bucket, "");
        let url = url.split(['?', '#']).next().unwrap_or(url);
        url.strip_prefix(&prefix)
            .filter(|path| !path.is_empty())
            .map(str::to_string)
    }
}

pub trait RecordStore {
    /// Merge `fields` into the record, creating it if absent, and return the
    /// stored result.
    fn update(&self, table: &str, id: &str, fields: Record) -> Result<Record, StorageError>;

    fn fetch(&self, table: &str, id: &str) -> Result<Option<Record>, StorageError>;

    /// Delete a record. Deleting a missing record is not an error.
    fn delete(&self, table: &str, id: &str) -> Result<(), StorageError>;

    fn list(&self, table: &str) -> Result<Vec<Record>, StorageError>;
}

/// Object names are relative, `/`-separated, and never climb out of the bucket.
fn check_object_name(name: &str) -> Result<(), StorageError> {
    let bad = name.is_empty()
        || name.starts_with('/')
        || name.contains('\\')
        || name.split('/').any(|seg| seg.is_empty() || seg == "." || seg == "..");
    if bad {
        return Err(StorageError::InvalidName(name.to_string()));
    }
    Ok(())
}

/// Buckets and tables become single directory or file names.
fn check_identifier(ident: &str) -> Result<(), StorageError> {
    let ok = !ident.is_empty()
        && ident
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if !ok {
        return Err(StorageError::InvalidName(ident.to_string()));
    }
    Ok(())
}

fn merge_into(record: &mut Record, id: &str, fields: Record) {
    record.insert("id".to_string(), Value::String(id.to_string()));
    for (key, value) in fields {
        if key != "id" {
            record.insert(key, value);
        }
    }
}

// =============================================================================
// Local directory-backed stores
// =============================================================================

/// Objects stored as files under `<root>/<bucket>/<name>`.
pub struct LocalObjectStore {
    root: PathBuf,
    public_base_url: String,
}

impl LocalObjectStore {
    pub fn new(root: impl Into<PathBuf>, public_base_url: &str) -> Self {
        Self {
            root: root.into(),
            public_base_url: public_base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn object_path(&self, bucket: &str, name: &str) -> Result<PathBuf, StorageError> {
        check_identifier(bucket)?;
        check_object_name(name)?;
        Ok(self.root.join(bucket).join(name))
    }
}

impl ObjectStore for LocalObjectStore {
    fn put(
        &self,
        bucket: &str,
        name: &str,
        bytes: &[u8],
        _content_type: &str,
    ) -> Result<StoredObject, StorageError> {
        let path = self.object_path(bucket, name)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, bytes)?;
        Ok(StoredObject {
            path: name.to_string(),
        })
    }

    fn public_url(&self, bucket: &str, path: &str) -> String {
        format!("{}/{}/{}", self.public_base_url, bucket, path)
    }

    fn list(&self, bucket: &str, prefix: &str) -> Result<Vec<String>, StorageError> {
        check_identifier(bucket)?;
        let bucket_dir = self.root.join(bucket);
        if !bucket_dir.exists() {
            return Ok(Vec::new());
        }

        let mut names = Vec::new();
        for entry in WalkDir::new(&bucket_dir)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
        {
            let Ok(relative) = entry.path().strip_prefix(&bucket_dir) else {
                continue;
            };
            let name = relative
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");
            if name.starts_with(prefix) {
                names.push(name);
            }
        }
        names.sort();
        Ok(names)
    }

    fn remove(&self, bucket: &str, names: &[String]) -> Result<(), StorageError> {
        for name in names {
            let path = self.object_path(bucket, name)?;
            match fs::remove_file(&path) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }
}

/// Records stored as one pretty-printed JSON object per table:
/// `<dir>/<table>.json` maps record ids to records.
pub struct JsonRecordStore {
    dir: PathBuf,
}

impl JsonRecordStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn table_path(&self, table: &str) -> Result<PathBuf, StorageError> {
        check_identifier(table)?;
        Ok(self.dir.join(format!("{table}.json")))
    }

    fn read_table(&self, table: &str) -> Result<BTreeMap<String, Record>, StorageError> {
        let path = self.table_path(table)?;
        if !path.exists() {
            return Ok(BTreeMap::new());
        }
        let content = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    fn write_table(
        &self,
        table: &str,
        rows: &BTreeMap<String, Record>,
    ) -> Result<(), StorageError> {
        let path = self.table_path(table)?;
        fs::create_dir_all(&self.dir)?;
        fs::write(path, serde_json::to_string_pretty(rows)?)?;
        Ok(())
    }
}

impl RecordStore for JsonRecordStore {
    fn update(&self, table: &str, id: &str, fields: Record) -> Result<Record, StorageError> {
        let mut rows = self.read_table(table)?;
        let record = rows.entry(id.to_string()).or_default();
        merge_into(record, id, fields);
        let stored = record.clone();
        self.write_table(table, &rows)?;
        Ok(stored)
    }

    fn fetch(&self, table: &str, id: &str) -> Result<Option<Record>, StorageError> {
        Ok(self.read_table(table)?.remove(id))
    }

    fn delete(&self, table: &str, id: &str) -> Result<(), StorageError> {
        let mut rows = self.read_table(table)?;
        if rows.remove(id).is_some() {
            self.write_table(table, &rows)?;
        }
        Ok(())
    }

    fn list(&self, table: &str) -> Result<Vec<Record>, StorageError> {
        Ok(self.read_table(table)?.into_values().collect())
    }
}

// =============================================================================
// In-process stores
// =============================================================================

/// Object store held in memory. Puts whose name contains one of the
/// registered fragments fail, and the whole store can be made to reject
/// every call as unauthorized.
pub struct MemoryObjectStore {
    objects: Mutex<BTreeMap<(String, String), (Vec<u8>, String)>>,
    failing_fragments: Mutex<Vec<String>>,
    unauthorized: AtomicBool,
    puts: AtomicUsize,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self {
            objects: Mutex::new(BTreeMap::new()),
            failing_fragments: Mutex::new(Vec::new()),
            unauthorized: AtomicBool::new(false),
            puts: AtomicUsize::new(0),
        }
    }

    /// Make every put whose name contains `fragment` fail.
    pub fn fail_puts_matching(&self, fragment: &str) {
        if let Ok(mut fragments) = self.failing_fragments.lock() {
            fragments.push(fragment.to_string());
        }
    }

    pub fn set_unauthorized(&self, unauthorized: bool) {
        self.unauthorized.store(unauthorized, Ordering::SeqCst);
    }

    /// Number of successful puts so far.
    pub fn put_count(&self) -> usize {
        self.puts.load(Ordering::SeqCst)
    }

    /// Stored bytes and content type for an object.
    pub fn get(&self, bucket: &str, name: &str) -> Option<(Vec<u8>, String)> {
        self.objects
            .lock()
            .ok()?
            .get(&(bucket.to_string(), name.to_string()))
            .cloned()
    }

    fn check_auth(&self) -> Result<(), StorageError> {
        if self.unauthorized.load(Ordering::SeqCst) {
            return Err(StorageError::Unauthorized(
                "credentials rejected by object store".into(),
            ));
        }
        Ok(())
    }

    fn lock_objects(
        &self,
    ) -> Result<std::sync::MutexGuard<'_, BTreeMap<(String, String), (Vec<u8>, String)>>, StorageError>
    {
        self.objects
            .lock()
            .map_err(|_| StorageError::Backend("object map poisoned".into()))
    }
}

impl Default for MemoryObjectStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ObjectStore for MemoryObjectStore {
    fn put(
        &self,
        bucket: &str,
        name: &str,
        bytes: &[u8],
        content_type: &str,
    ) -> Result<StoredObject, StorageError> {
        self.check_auth()?;
        check_identifier(bucket)?;
        check_object_name(name)?;
        let refused = self
            .failing_fragments
            .lock()
            .map(|fragments| fragments.iter().any(|f| name.contains(f.as_str())))
            .unwrap_or(false);
        if refused {
            return Err(StorageError::Backend(format!("put refused for {name}")));
        }
        self.lock_objects()?.insert(
            (bucket.to_string(), name.to_string()),
            (bytes.to_vec(), content_type.to_string()),
        );
        self.puts.fetch_add(1, Ordering::SeqCst);
        Ok(StoredObject {
            path: name.to_string(),
        })
    }

    fn public_url(&self, bucket: &str, path: &str) -> String {
        format!("memory://{bucket}/{path}")
    }

    fn list(&self, bucket: &str, prefix: &str) -> Result<Vec<String>, StorageError> {
        self.check_auth()?;
        Ok(self
            .lock_objects()?
            .keys()
            .filter(|(b, name)| b == bucket && name.starts_with(prefix))
            .map(|(_, name)| name.clone())
            .collect())
    }

    fn remove(&self, bucket: &str, names: &[String]) -> Result<(), StorageError> {
        self.check_auth()?;
        let mut objects = self.lock_objects()?;
        for name in names {
            objects.remove(&(bucket.to_string(), name.clone()));
        }
        Ok(())
    }
}

/// Record store held in memory. Updates can be made to fail.
#[derive(Default)]
pub struct MemoryRecordStore {
    tables: Mutex<BTreeMap<String, BTreeMap<String, Record>>>,
    fail_updates: AtomicBool,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_fail_updates(&self, fail: bool) {
        self.fail_updates.store(fail, Ordering::SeqCst);
    }

    fn lock_tables(
        &self,
    ) -> Result<std::sync::MutexGuard<'_, BTreeMap<String, BTreeMap<String, Record>>>, StorageError>
    {
        self.tables
            .lock()
            .map_err(|_| StorageError::Backend("record map poisoned".into()))
    }
}

impl RecordStore for MemoryRecordStore {
    fn update(&self, table: &str, id: &str, fields: Record) -> Result<Record, StorageError> {
        if self.fail_updates.load(Ordering::SeqCst) {
            return Err(StorageError::Backend(format!("update of {table}/{id} refused")));
        }
        let mut tables = self.lock_tables()?;
        let record = tables
            .entry(table.to_string())
            .or_default()
            .entry(id.to_string())
            .or_default();
        merge_into(record, id, fields);
        Ok(record.clone())
    }

    fn fetch(&self, table: &str, id: &str) -> Result<Option<Record>, StorageError> {
        Ok(self
            .lock_tables()?
            .get(table)
            .and_then(|rows| rows.get(id))
            .cloned())
    }

    fn delete(&self, table: &str, id: &str) -> Result<(), StorageError> {
        if let Some(rows) = self.lock_tables()?.get_mut(table) {
            rows.remove(id);
        }
        Ok(())
    }

    fn list(&self, table: &str) -> Result<Vec<Record>, StorageError> {
        Ok(self
            .lock_tables()?
            .get(table)
            .map(|rows| rows.values().cloned().collect())
            .unwrap_or_default())
    }
}
