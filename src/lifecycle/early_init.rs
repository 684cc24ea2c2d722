use std::collections::BTreeMap;
use std::sync::atomic::AtomicI32;
use std::sync::{Arc, Mutex, Weak};

use tracing::{debug, info};

use super::*;
use crate::event::Subscription;
use crate::registry::{RegistryEvent, ServiceRegistry};

/// Early-init bundle: hands out lifecycle monitors and fans system
/// notifications out to them.
pub struct EarlyInit {
    instance: InstanceId,
    config: LifecycleConfig,
    handles: Arc<AtomicI32>,
    known_services: Mutex<BTreeMap<String, SrvState>>,
    monitors: Mutex<BTreeMap<String, Weak<AppLifecycleMonitor>>>,
    acks: Event<AppStateAck>,
}

impl EarlyInit {
    pub fn new(instance_id: impl Into<String>, third_party: bool, config: LifecycleConfig) -> Self {
        Self {
            instance: InstanceId {
                id: instance_id.into(),
                third_party,
            },
            config,
            handles: Arc::new(AtomicI32::new(1)),
            known_services: Mutex::new(BTreeMap::new()),
            monitors: Mutex::new(BTreeMap::new()),
            acks: Event::new(),
        }
    }

    /// Coordinator side of `ack_app_state`
    pub fn acknowledgements(&self) -> &Event<AppStateAck> {
        &self.acks
    }

    /// Concrete monitor of `app`, for the system side feeds.
    pub fn monitor(&self, app: &str) -> Option<Arc<AppLifecycleMonitor>> {
        self.monitors
            .lock()
            .ok()
            .and_then(|monitors| monitors.get(app).and_then(Weak::upgrade))
    }

    fn live_monitors(&self) -> Vec<Arc<AppLifecycleMonitor>> {
        match self.monitors.lock() {
            Ok(mut monitors) => {
                monitors.retain(|_, weak| weak.strong_count() > 0);
                monitors.values().filter_map(Weak::upgrade).collect()
            }
            Err(_) => Vec::new(),
        }
    }

    /// Runs `f` on every live monitor. No lock is held while `f` runs.
    pub fn for_each_monitor<F>(&self, f: F)
    where
        F: Fn(&AppLifecycleMonitor),
    {
        for monitor in self.live_monitors() {
            f(&monitor);
        }
    }

    /// A monitor created concurrently either replays this record or receives it.
    pub fn notify_service_state(&self, record: &SrvStateRecord) {
        let targets = match self.known_services.lock() {
            Ok(mut known) => {
                known.insert(record.service_name.clone(), record.state);
                self.live_monitors()
            }
            Err(_) => return,
        };
        debug!(service = %record.service_name, state = ?record.state, "service state");
        for monitor in targets {
            monitor.on_service_state(record);
        }
    }

    /// Feeds registry membership changes into every dependency map.
    pub fn attach_registry(self: &Arc<Self>, registry: &ServiceRegistry) -> Subscription {
        for name in registry.names() {
            self.notify_service_state(&SrvStateRecord::new(name, SrvState::Available));
        }
        let this = Arc::downgrade(self);
        registry.events().subscribe(move |event| {
            let Some(this) = this.upgrade() else {
                return;
            };
            let record = match event {
                RegistryEvent::Registered(name) => {
                    SrvStateRecord::new(name.clone(), SrvState::Available)
                }
                RegistryEvent::Unregistered(name) => {
                    SrvStateRecord::new(name.clone(), SrvState::Unavailable)
                }
            };
            this.notify_service_state(&record);
        })
    }
}

impl Service for EarlyInit {
    fn service_name(&self) -> &'static str {
        EARLY_INIT_SERVICE_NAME
    }
}

impl EarlyInitService for EarlyInit {
    fn instance_id(&self) -> InstanceId {
        self.instance.clone()
    }

    fn lifecycle_monitor(
        &self,
        ctx: &AppContext,
        mandatory: &[String],
        optional: &[String],
    ) -> std::result::Result<Arc<dyn LifecycleMonitor>, LcmError> {
        let app = ctx.symbolic_name.as_str();
        if app.is_empty() || mandatory.iter().any(|name| optional.contains(name)) {
            return Err(LcmError::InvalidArg);
        }

        // Held until the monitor is listed so no state change slips between replay and fan-out.
        let known = self.known_services.lock().map_err(|_| LcmError::InternalErr)?;
        let mut monitors = self.monitors.lock().map_err(|_| LcmError::InternalErr)?;
        if monitors
            .get(app)
            .is_some_and(|existing| existing.strong_count() > 0)
        {
            return Err(LcmError::DuplicateReg);
        }
        let monitor = Arc::new(AppLifecycleMonitor::with_coordinator(
            app,
            mandatory,
            optional,
            self.config.clone(),
            self.acks.clone(),
            self.handles.clone(),
        ));
        // Not started yet: the replay updates state without notifying.
        for (name, state) in known.iter() {
            monitor.on_service_state(&SrvStateRecord::new(name.clone(), *state));
        }
        monitor.refresh_readiness();
        monitors.insert(app.to_string(), Arc::downgrade(&monitor));
        drop(monitors);
        drop(known);

        info!(
            app,
            mandatory = mandatory.len(),
            optional = optional.len(),
            "lifecycle monitor created"
        );
        Ok(monitor)
    }
}
