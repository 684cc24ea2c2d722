//! LwM2M general purpose object instances owned by applications.
//!
//! Resource ids encode the resource type and the server access:
//!
//! | rid         | type        | server access |
//! |-------------|-------------|---------------|
//! | 0           | symbolic name (string) | read |
//! | 1000..=1099 / 1100..=1199 | string  | read / read-write |
//! | 2000..=2099 / 2100..=2199 | integer | read / read-write |
//! | 3000..=3099 / 3100..=3199 | float   | read / read-write |
//! | 4000..=4099 / 4100..=4199 | boolean | read / read-write |
//! | 5000..=5099 / 5100..=5199 | opaque  | read / read-write |
//! | 6000..=6099 / 6100..=6199 | time    | read / read-write |
//! | 7000..=7099 / 7100..=7199 | object link | read / read-write |
//! | 8000..=8099 | executable  | execute |

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use super::Lwm2mConfig;
use crate::event::Event;
use crate::types::{AppContext, Service};

pub const LWM2M_APPFWK_SERVICE_NAME: &str = "stla.connectivity.lwm2mappfwk.service.base";

pub type Oid = u16;
pub type Oiid = u16;
pub type Rid = u16;

pub const SYMBOLIC_NAME_RID: Rid = 0;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lwm2mError {
    #[error("resource not found")]
    NotFound = 1,
    #[error("operation not allowed")]
    MethodNotAllowed = 2,
    #[error("instance exceeds the available memory")]
    OutOfMemory = 3,
    #[error("all general purpose instances are in use")]
    OutOfInstance = 4,
    #[error("resource type or id out of bounds")]
    InvalidRid = 5,
    #[error("link to the device management client is broken")]
    BrokenLink = 6,
    #[error("communication not available")]
    CommNotAvailable = 7,
    #[error("already created")]
    AlreadyCreated = 8,
    #[error("invalid id")]
    IdInvalid = 9,
    #[error("unknown error")]
    UnknownError = 10,
}

impl Lwm2mError {
    pub fn code(self) -> u32 {
        self as u32
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResourceKind {
    String,
    Integer,
    Float,
    Boolean,
    Opaque,
    Time,
    ObjLnk,
    Executable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Access {
    ReadOnly,
    ReadWrite,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ResourceValue {
    String(String),
    Integer(i64),
    Float(f64),
    Boolean(bool),
    Opaque(Vec<u8>),
    /// Seconds since the epoch
    Time(i64),
    ObjLnk { oid: Oid, oiid: Oiid },
}

impl ResourceValue {
    pub fn kind(&self) -> ResourceKind {
        match self {
            ResourceValue::String(_) => ResourceKind::String,
            ResourceValue::Integer(_) => ResourceKind::Integer,
            ResourceValue::Float(_) => ResourceKind::Float,
            ResourceValue::Boolean(_) => ResourceKind::Boolean,
            ResourceValue::Opaque(_) => ResourceKind::Opaque,
            ResourceValue::Time(_) => ResourceKind::Time,
            ResourceValue::ObjLnk { .. } => ResourceKind::ObjLnk,
        }
    }

    fn encoded_len(&self) -> usize {
        match self {
            ResourceValue::String(s) => s.len(),
            ResourceValue::Opaque(bytes) => bytes.len(),
            ResourceValue::Integer(_) | ResourceValue::Float(_) | ResourceValue::Time(_) => 8,
            ResourceValue::Boolean(_) => 1,
            ResourceValue::ObjLnk { .. } => 4,
        }
    }
}

/// Type and server access of `rid`, `None` when the id is outside every range.
pub fn resource_layout(rid: Rid) -> Option<(ResourceKind, Access)> {
    if rid == SYMBOLIC_NAME_RID {
        return Some((ResourceKind::String, Access::ReadOnly));
    }
    let kind = match rid / 1000 {
        1 => ResourceKind::String,
        2 => ResourceKind::Integer,
        3 => ResourceKind::Float,
        4 => ResourceKind::Boolean,
        5 => ResourceKind::Opaque,
        6 => ResourceKind::Time,
        7 => ResourceKind::ObjLnk,
        8 => ResourceKind::Executable,
        _ => return None,
    };
    match (kind, rid % 1000) {
        (ResourceKind::Executable, 0..=99) => Some((kind, Access::ReadWrite)),
        (ResourceKind::Executable, _) => None,
        (_, 0..=99) => Some((kind, Access::ReadOnly)),
        (_, 100..=199) => Some((kind, Access::ReadWrite)),
        _ => None,
    }
}

fn check_kind(rid: Rid, kind: ResourceKind) -> Result<Access, Lwm2mError> {
    match resource_layout(rid) {
        Some((expected, access)) if expected == kind => Ok(access),
        _ => Err(Lwm2mError::InvalidRid),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resource {
    pub rid: Rid,
    pub value: ResourceValue,
}

/// All values of an object instance
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Instance {
    pub symbolic_name: String,
    pub resources: BTreeMap<Rid, ResourceValue>,
}

impl Instance {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, rid: Rid, value: ResourceValue) -> Self {
        self.resources.insert(rid, value);
        self
    }

    pub fn encoded_len(&self) -> usize {
        self.symbolic_name.len()
            + self
                .resources
                .values()
                .map(ResourceValue::encoded_len)
                .sum::<usize>()
    }

    fn validate(&self) -> Result<(), Lwm2mError> {
        for (rid, value) in &self.resources {
            if *rid == SYMBOLIC_NAME_RID {
                return Err(Lwm2mError::InvalidRid);
            }
            check_kind(*rid, value.kind())?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecuteOperation {
    pub rid: Rid,
    pub parameters: Vec<String>,
}

#[derive(Debug, Default)]
pub struct InstanceEvents {
    /// A resource was modified by the server
    pub resource_changed: Event<Resource>,
    pub execute_operation: Event<ExecuteOperation>,
}

/// Server-side changes to the instances of an application
#[derive(Debug, Default)]
pub struct ObjectEvents {
    pub instance_created: Event<Oiid>,
    pub instance_deleted: Event<Oiid>,
    pub instance_changed: Event<Oiid>,
}

pub trait Lwm2mInstanceHandler: Send + Sync {
    fn instance_id(&self) -> Oiid;
    fn instance(&self) -> Result<Instance, Lwm2mError>;
    /// Ids of the resources set, ascending
    fn resource_ids(&self) -> Result<Vec<Rid>, Lwm2mError>;
    fn symbolic_name(&self) -> Result<String, Lwm2mError>;
    fn resource(&self, rid: Rid) -> Result<ResourceValue, Lwm2mError>;
    fn set_resource(&self, rid: Rid, value: ResourceValue) -> Result<(), Lwm2mError>;
    /// The symbolic name cannot be deleted.
    fn delete_resource(&self, rid: Rid) -> Result<(), Lwm2mError>;
    /// Routes server executions of `rid` to [`InstanceEvents::execute_operation`].
    fn register_execute_handler(&self, rid: Rid) -> Result<(), Lwm2mError>;
    fn set_execute_result(&self, rid: Rid, success: bool) -> Result<(), Lwm2mError>;
    fn events(&self) -> &InstanceEvents;

    fn string_resource(&self, rid: Rid) -> Result<String, Lwm2mError> {
        check_kind(rid, ResourceKind::String)?;
        match self.resource(rid)? {
            ResourceValue::String(value) => Ok(value),
            _ => Err(Lwm2mError::InvalidRid),
        }
    }

    fn integer_resource(&self, rid: Rid) -> Result<i64, Lwm2mError> {
        check_kind(rid, ResourceKind::Integer)?;
        match self.resource(rid)? {
            ResourceValue::Integer(value) => Ok(value),
            _ => Err(Lwm2mError::InvalidRid),
        }
    }

    fn float_resource(&self, rid: Rid) -> Result<f64, Lwm2mError> {
        check_kind(rid, ResourceKind::Float)?;
        match self.resource(rid)? {
            ResourceValue::Float(value) => Ok(value),
            _ => Err(Lwm2mError::InvalidRid),
        }
    }

    fn boolean_resource(&self, rid: Rid) -> Result<bool, Lwm2mError> {
        check_kind(rid, ResourceKind::Boolean)?;
        match self.resource(rid)? {
            ResourceValue::Boolean(value) => Ok(value),
            _ => Err(Lwm2mError::InvalidRid),
        }
    }

    fn opaque_resource(&self, rid: Rid) -> Result<Vec<u8>, Lwm2mError> {
        check_kind(rid, ResourceKind::Opaque)?;
        match self.resource(rid)? {
            ResourceValue::Opaque(value) => Ok(value),
            _ => Err(Lwm2mError::InvalidRid),
        }
    }

    fn time_resource(&self, rid: Rid) -> Result<i64, Lwm2mError> {
        check_kind(rid, ResourceKind::Time)?;
        match self.resource(rid)? {
            ResourceValue::Time(value) => Ok(value),
            _ => Err(Lwm2mError::InvalidRid),
        }
    }

    fn objlnk_resource(&self, rid: Rid) -> Result<(Oid, Oiid), Lwm2mError> {
        check_kind(rid, ResourceKind::ObjLnk)?;
        match self.resource(rid)? {
            ResourceValue::ObjLnk { oid, oiid } => Ok((oid, oiid)),
            _ => Err(Lwm2mError::InvalidRid),
        }
    }

    fn set_string_resource(&self, rid: Rid, value: &str) -> Result<(), Lwm2mError> {
        self.set_resource(rid, ResourceValue::String(value.to_string()))
    }

    fn set_integer_resource(&self, rid: Rid, value: i64) -> Result<(), Lwm2mError> {
        self.set_resource(rid, ResourceValue::Integer(value))
    }

    fn set_float_resource(&self, rid: Rid, value: f64) -> Result<(), Lwm2mError> {
        self.set_resource(rid, ResourceValue::Float(value))
    }

    fn set_boolean_resource(&self, rid: Rid, value: bool) -> Result<(), Lwm2mError> {
        self.set_resource(rid, ResourceValue::Boolean(value))
    }

    fn set_opaque_resource(&self, rid: Rid, value: &[u8]) -> Result<(), Lwm2mError> {
        self.set_resource(rid, ResourceValue::Opaque(value.to_vec()))
    }

    fn set_time_resource(&self, rid: Rid, value: i64) -> Result<(), Lwm2mError> {
        self.set_resource(rid, ResourceValue::Time(value))
    }

    fn set_objlnk_resource(&self, rid: Rid, oid: Oid, oiid: Oiid) -> Result<(), Lwm2mError> {
        self.set_resource(rid, ResourceValue::ObjLnk { oid, oiid })
    }
}

pub trait Lwm2mObjectHandler: Send + Sync {
    fn instance_list(&self) -> Result<Vec<Oiid>, Lwm2mError>;
    fn instance(&self, oiid: Oiid) -> Option<Arc<dyn Lwm2mInstanceHandler>>;
    /// The symbolic name resource is always taken from the owning application.
    fn create_new_instance(&self, oiid: Oiid, instance: &Instance) -> Result<(), Lwm2mError>;
    fn delete_instance(&self, oiid: Oiid) -> Result<(), Lwm2mError>;
    fn events(&self) -> &ObjectEvents;
}

pub trait Lwm2mAppFwkService: Service {
    fn is_service_ready(&self) -> Result<(), Lwm2mError>;
    fn service_status_changed(&self) -> &Event<Result<(), Lwm2mError>>;
    /// One handler per application
    fn object_handler(&self, ctx: &AppContext) -> Result<Arc<dyn Lwm2mObjectHandler>, Lwm2mError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ExecState {
    Idle,
    Pending,
}

struct InstanceSlot {
    owner: String,
    data: Instance,
    executables: BTreeMap<Rid, ExecState>,
    results: BTreeMap<Rid, bool>,
    handle: Arc<InstanceHandle>,
}

struct Lwm2mState {
    ready: bool,
    link_broken: bool,
    instances: BTreeMap<Oiid, InstanceSlot>,
    objects: BTreeMap<String, Arc<ObjectHandle>>,
}

struct Lwm2mInner {
    config: Lwm2mConfig,
    state: Mutex<Lwm2mState>,
}

impl Lwm2mInner {
    fn raw(&self) -> Result<MutexGuard<'_, Lwm2mState>, Lwm2mError> {
        self.state.lock().map_err(|_| Lwm2mError::UnknownError)
    }

    /// Locks the state if the device management client is reachable.
    fn state(&self) -> Result<MutexGuard<'_, Lwm2mState>, Lwm2mError> {
        let state = self.raw()?;
        if state.link_broken {
            return Err(Lwm2mError::BrokenLink);
        }
        if !state.ready {
            return Err(Lwm2mError::CommNotAvailable);
        }
        Ok(state)
    }

    fn insert_instance(
        self: &Arc<Self>,
        state: &mut Lwm2mState,
        owner: &str,
        oiid: Oiid,
        instance: &Instance,
    ) -> Result<(), Lwm2mError> {
        instance.validate()?;
        if state.instances.contains_key(&oiid) {
            return Err(Lwm2mError::AlreadyCreated);
        }
        if state.instances.len() >= self.config.max_instances {
            warn!(owner, oiid, "no general purpose instance left");
            return Err(Lwm2mError::OutOfInstance);
        }
        let mut data = instance.clone();
        data.symbolic_name = owner.to_string();
        if data.encoded_len() > self.config.max_instance_bytes {
            return Err(Lwm2mError::OutOfMemory);
        }
        let handle = Arc::new(InstanceHandle {
            oiid,
            owner: owner.to_string(),
            inner: Arc::downgrade(self),
            events: InstanceEvents::default(),
        });
        state.instances.insert(
            oiid,
            InstanceSlot {
                owner: owner.to_string(),
                data,
                executables: BTreeMap::new(),
                results: BTreeMap::new(),
                handle,
            },
        );
        debug!(owner, oiid, "lwm2m instance created");
        Ok(())
    }
}

fn store_value(
    slot: &mut InstanceSlot,
    rid: Rid,
    value: ResourceValue,
    limit: usize,
) -> Result<(), Lwm2mError> {
    let previous = slot.data.resources.get(&rid).map(ResourceValue::encoded_len).unwrap_or(0);
    if slot.data.encoded_len() - previous + value.encoded_len() > limit {
        return Err(Lwm2mError::OutOfMemory);
    }
    slot.data.resources.insert(rid, value);
    Ok(())
}

struct InstanceHandle {
    oiid: Oiid,
    owner: String,
    inner: Weak<Lwm2mInner>,
    events: InstanceEvents,
}

impl InstanceHandle {
    fn with_slot<T, F>(&self, access: F) -> Result<T, Lwm2mError>
    where
        F: FnOnce(&mut InstanceSlot, &Lwm2mConfig) -> Result<T, Lwm2mError>,
    {
        let inner = self.inner.upgrade().ok_or(Lwm2mError::UnknownError)?;
        let mut state = inner.state()?;
        let slot = state
            .instances
            .get_mut(&self.oiid)
            .filter(|slot| slot.owner == self.owner)
            .ok_or(Lwm2mError::NotFound)?;
        access(slot, &inner.config)
    }
}

impl Lwm2mInstanceHandler for InstanceHandle {
    fn instance_id(&self) -> Oiid {
        self.oiid
    }

    fn instance(&self) -> Result<Instance, Lwm2mError> {
        self.with_slot(|slot, _| Ok(slot.data.clone()))
    }

    fn resource_ids(&self) -> Result<Vec<Rid>, Lwm2mError> {
        self.with_slot(|slot, _| Ok(slot.data.resources.keys().copied().collect()))
    }

    fn symbolic_name(&self) -> Result<String, Lwm2mError> {
        self.with_slot(|slot, _| Ok(slot.data.symbolic_name.clone()))
    }

    fn resource(&self, rid: Rid) -> Result<ResourceValue, Lwm2mError> {
        if rid == SYMBOLIC_NAME_RID {
            return self.symbolic_name().map(ResourceValue::String);
        }
        match resource_layout(rid) {
            None | Some((ResourceKind::Executable, _)) => return Err(Lwm2mError::InvalidRid),
            Some(_) => {}
        }
        self.with_slot(|slot, _| {
            slot.data
                .resources
                .get(&rid)
                .cloned()
                .ok_or(Lwm2mError::NotFound)
        })
    }

    fn set_resource(&self, rid: Rid, value: ResourceValue) -> Result<(), Lwm2mError> {
        if rid == SYMBOLIC_NAME_RID {
            return Err(Lwm2mError::MethodNotAllowed);
        }
        check_kind(rid, value.kind())?;
        self.with_slot(|slot, config| store_value(slot, rid, value, config.max_instance_bytes))
    }

    fn delete_resource(&self, rid: Rid) -> Result<(), Lwm2mError> {
        if rid == SYMBOLIC_NAME_RID {
            return Err(Lwm2mError::MethodNotAllowed);
        }
        self.with_slot(|slot, _| {
            slot.data
                .resources
                .remove(&rid)
                .map(|_| ())
                .ok_or(Lwm2mError::NotFound)
        })
    }

    fn register_execute_handler(&self, rid: Rid) -> Result<(), Lwm2mError> {
        check_kind(rid, ResourceKind::Executable)?;
        self.with_slot(|slot, _| {
            if slot.executables.contains_key(&rid) {
                return Err(Lwm2mError::AlreadyCreated);
            }
            slot.executables.insert(rid, ExecState::Idle);
            Ok(())
        })
    }

    fn set_execute_result(&self, rid: Rid, success: bool) -> Result<(), Lwm2mError> {
        self.with_slot(|slot, _| match slot.executables.get_mut(&rid) {
            Some(exec) if *exec == ExecState::Pending => {
                *exec = ExecState::Idle;
                slot.results.insert(rid, success);
                info!(oiid = self.oiid, rid, success, "execute operation completed");
                Ok(())
            }
            _ => Err(Lwm2mError::NotFound),
        })
    }

    fn events(&self) -> &InstanceEvents {
        &self.events
    }
}

struct ObjectHandle {
    bundle: String,
    inner: Weak<Lwm2mInner>,
    events: ObjectEvents,
}

impl ObjectHandle {
    fn inner(&self) -> Result<Arc<Lwm2mInner>, Lwm2mError> {
        self.inner.upgrade().ok_or(Lwm2mError::UnknownError)
    }
}

impl Lwm2mObjectHandler for ObjectHandle {
    fn instance_list(&self) -> Result<Vec<Oiid>, Lwm2mError> {
        let inner = self.inner()?;
        let state = inner.state()?;
        Ok(state
            .instances
            .iter()
            .filter(|(_, slot)| slot.owner == self.bundle)
            .map(|(oiid, _)| *oiid)
            .collect())
    }

    fn instance(&self, oiid: Oiid) -> Option<Arc<dyn Lwm2mInstanceHandler>> {
        let inner = self.inner().ok()?;
        let state = inner.state().ok()?;
        let slot = state.instances.get(&oiid)?;
        if slot.owner != self.bundle {
            return None;
        }
        let handle: Arc<dyn Lwm2mInstanceHandler> = slot.handle.clone();
        Some(handle)
    }

    fn create_new_instance(&self, oiid: Oiid, instance: &Instance) -> Result<(), Lwm2mError> {
        let inner = self.inner()?;
        let mut state = inner.state()?;
        inner.insert_instance(&mut state, &self.bundle, oiid, instance)
    }

    fn delete_instance(&self, oiid: Oiid) -> Result<(), Lwm2mError> {
        let inner = self.inner()?;
        let mut state = inner.state()?;
        let owned = state
            .instances
            .get(&oiid)
            .is_some_and(|slot| slot.owner == self.bundle);
        if !owned {
            return Err(Lwm2mError::IdInvalid);
        }
        state.instances.remove(&oiid);
        debug!(bundle = %self.bundle, oiid, "lwm2m instance deleted");
        Ok(())
    }

    fn events(&self) -> &ObjectEvents {
        &self.events
    }
}

/// General purpose object store shared by all applications.
///
/// The `server_*` methods feed operations coming from the device management
/// server.
pub struct Lwm2mService {
    inner: Arc<Lwm2mInner>,
    status_changed: Event<Result<(), Lwm2mError>>,
}

impl Lwm2mService {
    pub fn new(config: Lwm2mConfig) -> Self {
        Self {
            inner: Arc::new(Lwm2mInner {
                config,
                state: Mutex::new(Lwm2mState {
                    ready: true,
                    link_broken: false,
                    instances: BTreeMap::new(),
                    objects: BTreeMap::new(),
                }),
            }),
            status_changed: Event::new(),
        }
    }

    pub fn set_ready(&self, ready: bool) {
        if let Ok(mut state) = self.inner.raw() {
            state.ready = ready;
        }
        info!(ready, "lwm2m service readiness changed");
        self.status_changed.notify(&self.is_service_ready());
    }

    pub fn set_link_broken(&self, broken: bool) {
        if let Ok(mut state) = self.inner.raw() {
            state.link_broken = broken;
        }
        self.status_changed.notify(&self.is_service_ready());
    }

    pub fn server_write(&self, oiid: Oiid, rid: Rid, value: ResourceValue) -> Result<(), Lwm2mError> {
        let (handle, object) = {
            let mut state = self.inner.state()?;
            let limit = self.inner.config.max_instance_bytes;
            let slot = state.instances.get_mut(&oiid).ok_or(Lwm2mError::NotFound)?;
            if rid == SYMBOLIC_NAME_RID || check_kind(rid, value.kind())? == Access::ReadOnly {
                return Err(Lwm2mError::MethodNotAllowed);
            }
            store_value(slot, rid, value.clone(), limit)?;
            let handle = slot.handle.clone();
            let owner = slot.owner.clone();
            (handle, state.objects.get(&owner).cloned())
        };
        handle
            .events
            .resource_changed
            .notify(&Resource { rid, value });
        if let Some(object) = object {
            object.events.instance_changed.notify(&oiid);
        }
        Ok(())
    }

    pub fn server_execute(
        &self,
        oiid: Oiid,
        rid: Rid,
        parameters: Vec<String>,
    ) -> Result<(), Lwm2mError> {
        let handle = {
            let mut state = self.inner.state()?;
            let slot = state.instances.get_mut(&oiid).ok_or(Lwm2mError::NotFound)?;
            let exec = slot.executables.get_mut(&rid).ok_or(Lwm2mError::NotFound)?;
            *exec = ExecState::Pending;
            slot.handle.clone()
        };
        handle
            .events
            .execute_operation
            .notify(&ExecuteOperation { rid, parameters });
        Ok(())
    }

    /// Last result reported by the application for `rid`
    pub fn execute_result(&self, oiid: Oiid, rid: Rid) -> Option<bool> {
        let state = self.inner.raw().ok()?;
        state.instances.get(&oiid)?.results.get(&rid).copied()
    }

    pub fn server_create_instance(
        &self,
        owner: &str,
        oiid: Oiid,
        instance: &Instance,
    ) -> Result<(), Lwm2mError> {
        let object = {
            let mut state = self.inner.state()?;
            self.inner.insert_instance(&mut state, owner, oiid, instance)?;
            state.objects.get(owner).cloned()
        };
        if let Some(object) = object {
            object.events.instance_created.notify(&oiid);
        }
        Ok(())
    }

    pub fn server_delete_instance(&self, oiid: Oiid) -> Result<(), Lwm2mError> {
        let object = {
            let mut state = self.inner.state()?;
            let slot = state.instances.remove(&oiid).ok_or(Lwm2mError::IdInvalid)?;
            state.objects.get(&slot.owner).cloned()
        };
        if let Some(object) = object {
            object.events.instance_deleted.notify(&oiid);
        }
        Ok(())
    }
}

impl Service for Lwm2mService {
    fn service_name(&self) -> &'static str {
        LWM2M_APPFWK_SERVICE_NAME
    }
}

impl Lwm2mAppFwkService for Lwm2mService {
    fn is_service_ready(&self) -> Result<(), Lwm2mError> {
        self.inner.state().map(|_| ())
    }

    fn service_status_changed(&self) -> &Event<Result<(), Lwm2mError>> {
        &self.status_changed
    }

    fn object_handler(&self, ctx: &AppContext) -> Result<Arc<dyn Lwm2mObjectHandler>, Lwm2mError> {
        if ctx.symbolic_name.is_empty() {
            return Err(Lwm2mError::IdInvalid);
        }
        let mut state = self.inner.raw()?;
        let handler = state
            .objects
            .entry(ctx.symbolic_name.clone())
            .or_insert_with(|| {
                Arc::new(ObjectHandle {
                    bundle: ctx.symbolic_name.clone(),
                    inner: Arc::downgrade(&self.inner),
                    events: ObjectEvents::default(),
                })
            })
            .clone();
        Ok(handler)
    }
}
