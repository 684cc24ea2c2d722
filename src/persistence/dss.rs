use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard};
use std::thread;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use super::DataStorageConfig;
use crate::event::Event;
use crate::types::{AppContext, Service};

pub const DATA_STORAGE_SERVICE_NAME: &str = "stla.persistence.datastorage.service";
pub const MAX_FILENAME_SIZE: usize = 255;

pub type NamespaceHandle = i32;
pub type FileHandle = i32;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum DssError {
    #[error("data storage service disabled")]
    ServiceDisable,
    #[error("storage inaccessible")]
    ConnRefused,
    #[error("file name too long")]
    NameTooLong,
    #[error("invalid argument")]
    Inval,
    #[error("already exists")]
    Exist,
    #[error("file busy")]
    Busy,
    #[error("not enough space")]
    NoMem,
    #[error("no such file")]
    NoEnt,
    #[error("generic error")]
    Generic,
}

impl DssError {
    pub fn code(self) -> i32 {
        match self {
            DssError::ServiceDisable => -656,
            DssError::ConnRefused => -111,
            DssError::NameTooLong => -32,
            DssError::Inval => -22,
            DssError::Exist => -17,
            DssError::Busy => -16,
            DssError::NoMem => -12,
            DssError::NoEnt => -2,
            DssError::Generic => -1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NamespaceType {
    Private = 0,
    /// Every file is public
    Shared = 1,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AccessMode {
    ReadOnly = 0,
    ReadWrite = 1,
    WriteOnly = 2,
}

impl AccessMode {
    fn reads(self) -> bool {
        matches!(self, AccessMode::ReadOnly | AccessMode::ReadWrite)
    }

    fn writes(self) -> bool {
        matches!(self, AccessMode::ReadWrite | AccessMode::WriteOnly)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SeekOrigin {
    Set = 0,
    Cur = 1,
    End = 2,
}

/// Notifications about files of the shared namespace
#[derive(Debug, Default)]
pub struct DataStorageEvents {
    /// A written file was closed
    pub file_changed: Event<String>,
    /// The last handle on a file was closed
    pub file_released: Event<String>,
}

/// File based storage organised in per-application namespaces
pub trait DataStorageService: Service {
    fn namespace_open(&self, ctx: &AppContext, kind: NamespaceType)
        -> Result<NamespaceHandle, DssError>;
    /// KiB
    fn namespace_quota(&self, ns: NamespaceHandle) -> Result<u32, DssError>;
    /// KiB
    fn namespace_free_space(&self, ns: NamespaceHandle) -> Result<u32, DssError>;
    fn total_used_space(&self) -> Result<u32, DssError>;
    fn total_free_space(&self) -> Result<u32, DssError>;
    /// `Busy` while any file of the namespace is open
    fn namespace_remove_all_files(&self, ns: NamespaceHandle) -> Result<(), DssError>;
    fn namespace_remove(&self, bundle: &str) -> Result<(), DssError>;

    /// Creates missing files unless opened read-only.
    fn file_open(&self, ns: NamespaceHandle, name: &str, mode: AccessMode)
        -> Result<FileHandle, DssError>;
    fn file_close(&self, file: FileHandle) -> Result<(), DssError>;
    fn file_save(&self, ns: NamespaceHandle, name: &str, synchronous: bool)
        -> Result<(), DssError>;
    fn file_remove(&self, ns: NamespaceHandle, name: &str) -> Result<(), DssError>;
    fn file_size(&self, file: FileHandle) -> Result<usize, DssError>;
    /// Reads at the current offset; returns 0 at end of file.
    fn file_read(&self, file: FileHandle, buf: &mut [u8]) -> Result<usize, DssError>;
    fn file_write(&self, file: FileHandle, data: &[u8]) -> Result<usize, DssError>;
    fn file_seek(&self, file: FileHandle, offset: i64, origin: SeekOrigin)
        -> Result<u64, DssError>;

    fn events(&self) -> &DataStorageEvents;
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
enum NamespaceKey {
    Private(String),
    Shared,
}

impl NamespaceKey {
    fn dir(&self) -> PathBuf {
        match self {
            NamespaceKey::Private(bundle) => PathBuf::from("private").join(bundle),
            NamespaceKey::Shared => PathBuf::from("shared"),
        }
    }
}

#[derive(Default)]
struct Namespace {
    files: BTreeMap<String, Vec<u8>>,
}

impl Namespace {
    fn used_bytes(&self) -> usize {
        self.files.values().map(Vec::len).sum()
    }
}

struct OpenFile {
    ns: NamespaceKey,
    name: String,
    mode: AccessMode,
    offset: u64,
    written: bool,
}

struct StorageState {
    enabled: bool,
    mounted: bool,
    namespaces: BTreeMap<NamespaceKey, Namespace>,
    ns_handles: BTreeMap<NamespaceHandle, NamespaceKey>,
    open_files: BTreeMap<FileHandle, OpenFile>,
    next_handle: i32,
}

impl StorageState {
    fn allocate(&mut self) -> i32 {
        let handle = self.next_handle;
        self.next_handle = self.next_handle.checked_add(1).unwrap_or(1);
        handle
    }

    fn namespace_key(&self, ns: NamespaceHandle) -> Result<NamespaceKey, DssError> {
        self.ns_handles.get(&ns).cloned().ok_or(DssError::Inval)
    }

    fn is_open(&self, ns: &NamespaceKey, name: &str) -> bool {
        self.open_files
            .values()
            .any(|f| &f.ns == ns && f.name == name)
    }

    /// True if a handle other than `file` holds `name` with an access matching `conflict`.
    fn conflicting(
        &self,
        file: FileHandle,
        ns: &NamespaceKey,
        name: &str,
        conflict: fn(AccessMode) -> bool,
    ) -> bool {
        self.open_files
            .iter()
            .any(|(h, f)| *h != file && &f.ns == ns && f.name == name && conflict(f.mode))
    }

    fn total_used_bytes(&self) -> usize {
        self.namespaces.values().map(Namespace::used_bytes).sum()
    }
}

fn kib(bytes: usize) -> u32 {
    u32::try_from(bytes.div_ceil(1024)).unwrap_or(u32::MAX)
}

fn check_name(name: &str) -> Result<(), DssError> {
    if name.is_empty() || name.contains(['/', '\\', '\0']) || name == "." || name == ".." {
        return Err(DssError::Inval);
    }
    if name.len() > MAX_FILENAME_SIZE {
        return Err(DssError::NameTooLong);
    }
    Ok(())
}

/// In-memory data storage with optional write-through on save.
pub struct DataStorage {
    config: DataStorageConfig,
    state: Mutex<StorageState>,
    events: DataStorageEvents,
}

impl DataStorage {
    pub fn new(config: DataStorageConfig) -> Self {
        Self {
            config,
            state: Mutex::new(StorageState {
                enabled: true,
                mounted: true,
                namespaces: BTreeMap::new(),
                ns_handles: BTreeMap::new(),
                open_files: BTreeMap::new(),
                next_handle: 1,
            }),
            events: DataStorageEvents::default(),
        }
    }

    fn state(&self) -> Result<MutexGuard<'_, StorageState>, DssError> {
        let state = self.state.lock().map_err(|_| DssError::Generic)?;
        if !state.enabled {
            return Err(DssError::ServiceDisable);
        }
        if !state.mounted {
            return Err(DssError::ConnRefused);
        }
        Ok(state)
    }

    pub fn set_enabled(&self, enabled: bool) {
        if let Ok(mut state) = self.state.lock() {
            state.enabled = enabled;
        }
    }

    /// Storage medium availability
    pub fn set_mounted(&self, mounted: bool) {
        if let Ok(mut state) = self.state.lock() {
            state.mounted = mounted;
        }
    }

    fn quota_bytes(&self) -> usize {
        self.config.namespace_quota_kib as usize * 1024
    }

    fn capacity_bytes(&self) -> usize {
        self.config.total_capacity_kib as usize * 1024
    }
}

impl Service for DataStorage {
    fn service_name(&self) -> &'static str {
        DATA_STORAGE_SERVICE_NAME
    }
}

impl DataStorageService for DataStorage {
    fn namespace_open(
        &self,
        ctx: &AppContext,
        kind: NamespaceType,
    ) -> Result<NamespaceHandle, DssError> {
        let key = match kind {
            NamespaceType::Private if ctx.symbolic_name.is_empty() => {
                return Err(DssError::Inval)
            }
            NamespaceType::Private => NamespaceKey::Private(ctx.symbolic_name.clone()),
            NamespaceType::Shared => NamespaceKey::Shared,
        };
        let mut state = self.state()?;
        if let Some((handle, _)) = state.ns_handles.iter().find(|(_, k)| **k == key) {
            return Ok(*handle);
        }
        let handle = state.allocate();
        state.namespaces.entry(key.clone()).or_default();
        debug!(bundle = %ctx.symbolic_name, ?kind, handle, "namespace opened");
        state.ns_handles.insert(handle, key);
        Ok(handle)
    }

    fn namespace_quota(&self, ns: NamespaceHandle) -> Result<u32, DssError> {
        self.state()?.namespace_key(ns)?;
        Ok(self.config.namespace_quota_kib)
    }

    fn namespace_free_space(&self, ns: NamespaceHandle) -> Result<u32, DssError> {
        let state = self.state()?;
        let key = state.namespace_key(ns)?;
        let used = state.namespaces.get(&key).map(Namespace::used_bytes).unwrap_or(0);
        Ok(self.config.namespace_quota_kib.saturating_sub(kib(used)))
    }

    fn total_used_space(&self) -> Result<u32, DssError> {
        Ok(kib(self.state()?.total_used_bytes()))
    }

    fn total_free_space(&self) -> Result<u32, DssError> {
        let used = self.total_used_space()?;
        Ok(self.config.total_capacity_kib.saturating_sub(used))
    }

    fn namespace_remove_all_files(&self, ns: NamespaceHandle) -> Result<(), DssError> {
        let mut state = self.state()?;
        let key = state.namespace_key(ns)?;
        if state.open_files.values().any(|f| f.ns == key) {
            return Err(DssError::Busy);
        }
        if let Some(namespace) = state.namespaces.get_mut(&key) {
            namespace.files.clear();
        }
        info!(?key, "namespace emptied");
        Ok(())
    }

    fn namespace_remove(&self, bundle: &str) -> Result<(), DssError> {
        if bundle.is_empty() {
            return Err(DssError::Inval);
        }
        let key = NamespaceKey::Private(bundle.to_string());
        let mut state = self.state()?;
        if state.open_files.values().any(|f| f.ns == key) {
            return Err(DssError::Busy);
        }
        state.namespaces.remove(&key);
        state.ns_handles.retain(|_, k| *k != key);
        info!(bundle, "namespace removed");
        Ok(())
    }

    fn file_open(
        &self,
        ns: NamespaceHandle,
        name: &str,
        mode: AccessMode,
    ) -> Result<FileHandle, DssError> {
        check_name(name)?;
        let mut state = self.state()?;
        let key = state.namespace_key(ns)?;
        let exists = state
            .namespaces
            .get(&key)
            .is_some_and(|n| n.files.contains_key(name));
        if !exists {
            if mode == AccessMode::ReadOnly {
                return Err(DssError::NoEnt);
            }
            state
                .namespaces
                .entry(key.clone())
                .or_default()
                .files
                .insert(name.to_string(), Vec::new());
        }
        let handle = state.allocate();
        state.open_files.insert(
            handle,
            OpenFile {
                ns: key,
                name: name.to_string(),
                mode,
                offset: 0,
                written: false,
            },
        );
        debug!(name, ?mode, handle, "file opened");
        Ok(handle)
    }

    fn file_close(&self, file: FileHandle) -> Result<(), DssError> {
        let (closed, released) = {
            let mut state = self.state()?;
            let closed = state.open_files.remove(&file).ok_or(DssError::Inval)?;
            let released = !state.is_open(&closed.ns, &closed.name);
            (closed, released)
        };
        if closed.ns == NamespaceKey::Shared {
            if closed.written {
                self.events.file_changed.notify(&closed.name);
            }
            if released {
                self.events.file_released.notify(&closed.name);
            }
        }
        Ok(())
    }

    fn file_save(
        &self,
        ns: NamespaceHandle,
        name: &str,
        synchronous: bool,
    ) -> Result<(), DssError> {
        check_name(name)?;
        let (key, data) = {
            let state = self.state()?;
            let key = state.namespace_key(ns)?;
            let data = state
                .namespaces
                .get(&key)
                .and_then(|n| n.files.get(name))
                .cloned()
                .ok_or(DssError::NoEnt)?;
            if state.is_open(&key, name) {
                return Err(DssError::Busy);
            }
            (key, data)
        };

        let Some(root) = self.config.root_dir.clone() else {
            return Ok(());
        };
        let dir = root.join(key.dir());
        let path = dir.join(name);
        let write = move || fs::create_dir_all(&dir).and_then(|_| fs::write(&path, &data));
        if synchronous {
            write().map_err(|err| {
                warn!(%err, name, "file save failed");
                DssError::Generic
            })
        } else {
            let name = name.to_string();
            thread::spawn(move || {
                if let Err(err) = write() {
                    warn!(%err, name, "background file save failed");
                }
            });
            Ok(())
        }
    }

    fn file_remove(&self, ns: NamespaceHandle, name: &str) -> Result<(), DssError> {
        check_name(name)?;
        let mut state = self.state()?;
        let key = state.namespace_key(ns)?;
        if state.is_open(&key, name) {
            return Err(DssError::Busy);
        }
        state
            .namespaces
            .get_mut(&key)
            .and_then(|n| n.files.remove(name))
            .map(|_| ())
            .ok_or(DssError::NoEnt)
    }

    fn file_size(&self, file: FileHandle) -> Result<usize, DssError> {
        let state = self.state()?;
        let open = state.open_files.get(&file).ok_or(DssError::Inval)?;
        state
            .namespaces
            .get(&open.ns)
            .and_then(|n| n.files.get(&open.name))
            .map(Vec::len)
            .ok_or(DssError::NoEnt)
    }

    fn file_read(&self, file: FileHandle, buf: &mut [u8]) -> Result<usize, DssError> {
        let mut state = self.state()?;
        let (ns, name, offset) = {
            let open = state.open_files.get(&file).ok_or(DssError::Inval)?;
            if !open.mode.reads() {
                return Err(DssError::Inval);
            }
            (open.ns.clone(), open.name.clone(), open.offset)
        };
        if ns == NamespaceKey::Shared && state.conflicting(file, &ns, &name, AccessMode::writes) {
            return Err(DssError::Busy);
        }
        let data = state
            .namespaces
            .get(&ns)
            .and_then(|n| n.files.get(&name))
            .ok_or(DssError::NoEnt)?;
        let start = usize::try_from(offset).unwrap_or(usize::MAX).min(data.len());
        let count = buf.len().min(data.len() - start);
        buf[..count].copy_from_slice(&data[start..start + count]);
        if let Some(open) = state.open_files.get_mut(&file) {
            open.offset += count as u64;
        }
        Ok(count)
    }

    fn file_write(&self, file: FileHandle, data: &[u8]) -> Result<usize, DssError> {
        let quota = self.quota_bytes();
        let capacity = self.capacity_bytes();
        let mut state = self.state()?;
        let (ns, name, offset) = {
            let open = state.open_files.get(&file).ok_or(DssError::Inval)?;
            if !open.mode.writes() {
                return Err(DssError::Inval);
            }
            (open.ns.clone(), open.name.clone(), open.offset)
        };
        if ns == NamespaceKey::Shared && state.conflicting(file, &ns, &name, AccessMode::reads) {
            return Err(DssError::Busy);
        }

        let offset = usize::try_from(offset).map_err(|_| DssError::Inval)?;
        let total_used = state.total_used_bytes();
        let namespace = state.namespaces.get_mut(&ns).ok_or(DssError::NoEnt)?;
        let ns_used = namespace.used_bytes();
        let contents = namespace.files.get_mut(&name).ok_or(DssError::NoEnt)?;
        let end = offset.checked_add(data.len()).ok_or(DssError::NoMem)?;
        let growth = end.saturating_sub(contents.len());
        let exceeds = |used: usize, limit: usize| {
            used.checked_add(growth).map_or(true, |total| total > limit)
        };
        if exceeds(ns_used, quota) || exceeds(total_used, capacity) {
            warn!(name = %name, growth, "data storage quota exceeded");
            return Err(DssError::NoMem);
        }
        if contents.len() < end {
            contents.resize(end, 0);
        }
        contents[offset..end].copy_from_slice(data);

        if let Some(open) = state.open_files.get_mut(&file) {
            open.offset = end as u64;
            open.written = true;
        }
        Ok(data.len())
    }

    fn file_seek(&self, file: FileHandle, offset: i64, origin: SeekOrigin) -> Result<u64, DssError> {
        let mut state = self.state()?;
        let (ns, name, current) = {
            let open = state.open_files.get(&file).ok_or(DssError::Inval)?;
            (open.ns.clone(), open.name.clone(), open.offset)
        };
        let len = state
            .namespaces
            .get(&ns)
            .and_then(|n| n.files.get(&name))
            .map(|f| f.len() as u64)
            .ok_or(DssError::NoEnt)?;
        let base = match origin {
            SeekOrigin::Set => 0,
            SeekOrigin::Cur => current,
            SeekOrigin::End => len,
        };
        let target = i128::from(base) + i128::from(offset);
        let target = u64::try_from(target).map_err(|_| DssError::Inval)?;
        if let Some(open) = state.open_files.get_mut(&file) {
            open.offset = target;
        }
        Ok(target)
    }

    fn events(&self) -> &DataStorageEvents {
        &self.events
    }
}
