//! Name-keyed registry of live service implementations.

use std::any::Any;
use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

use tracing::{debug, info};

use crate::error::{Result, TelematicsError};
use crate::event::Event;

/// Registry membership change
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryEvent {
    Registered(String),
    Unregistered(String),
}

struct Entry {
    instance: Box<dyn Any + Send + Sync>,
    type_name: &'static str,
}

/// Maps service names to shared handles.
///
/// Handles are stored as `Arc<S>` where `S` is usually a `dyn Contract` type;
/// lookups must ask for the same `S` they were registered with.
pub struct ServiceRegistry {
    entries: RwLock<BTreeMap<String, Entry>>,
    events: Event<RegistryEvent>,
}

impl ServiceRegistry {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(BTreeMap::new()),
            events: Event::new(),
        }
    }

    pub fn register<S>(&self, name: &str, service: Arc<S>) -> Result<()>
    where
        S: ?Sized + Send + Sync + 'static,
    {
        if name.is_empty() {
            return Err(TelematicsError::invalid("empty service name"));
        }
        {
            let mut entries = self
                .entries
                .write()
                .map_err(|_| TelematicsError::LockPoisoned)?;
            if entries.contains_key(name) {
                return Err(TelematicsError::DuplicateService {
                    name: name.to_string(),
                });
            }
            entries.insert(
                name.to_string(),
                Entry {
                    instance: Box::new(service),
                    type_name: std::any::type_name::<S>(),
                },
            );
        }
        info!(service = name, "service registered");
        self.events
            .notify(&RegistryEvent::Registered(name.to_string()));
        Ok(())
    }

    pub fn find<S>(&self, name: &str) -> Result<Arc<S>>
    where
        S: ?Sized + Send + Sync + 'static,
    {
        let entries = self
            .entries
            .read()
            .map_err(|_| TelematicsError::LockPoisoned)?;
        let entry = entries
            .get(name)
            .ok_or_else(|| TelematicsError::ServiceNotFound {
                name: name.to_string(),
            })?;
        match entry.instance.downcast_ref::<Arc<S>>() {
            Some(service) => Ok(service.clone()),
            None => {
                debug!(
                    service = name,
                    registered_as = entry.type_name,
                    "service lookup type mismatch"
                );
                Err(TelematicsError::ServiceTypeMismatch {
                    name: name.to_string(),
                    expected: std::any::type_name::<S>(),
                })
            }
        }
    }

    pub fn unregister(&self, name: &str) -> Result<()> {
        let removed = self
            .entries
            .write()
            .map_err(|_| TelematicsError::LockPoisoned)?
            .remove(name);
        if removed.is_none() {
            return Err(TelematicsError::ServiceNotFound {
                name: name.to_string(),
            });
        }
        info!(service = name, "service unregistered");
        self.events
            .notify(&RegistryEvent::Unregistered(name.to_string()));
        Ok(())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries
            .read()
            .map(|entries| entries.contains_key(name))
            .unwrap_or(false)
    }

    pub fn names(&self) -> Vec<String> {
        self.entries
            .read()
            .map(|entries| entries.keys().cloned().collect())
            .unwrap_or_default()
    }

    pub fn events(&self) -> &Event<RegistryEvent> {
        &self.events
    }
}

impl Default for ServiceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Service;
    use std::sync::Mutex;

    trait Greeter: Service {
        fn greet(&self) -> String;
    }

    struct English;

    impl Service for English {
        fn service_name(&self) -> &'static str {
            "test.greeter"
        }
    }

    impl Greeter for English {
        fn greet(&self) -> String {
            "hello".into()
        }
    }

    #[test]
    fn test_register_and_find_trait_object() {
        let registry = ServiceRegistry::new();
        let svc: Arc<dyn Greeter> = Arc::new(English);
        registry.register("test.greeter", svc).unwrap();

        let found = registry.find::<dyn Greeter>("test.greeter").unwrap();
        assert_eq!(found.greet(), "hello");
        assert_eq!(found.service_name(), "test.greeter");
    }

    #[test]
    fn test_lookup_errors() {
        let registry = ServiceRegistry::new();
        assert!(matches!(
            registry.find::<dyn Greeter>("missing"),
            Err(TelematicsError::ServiceNotFound { .. })
        ));

        registry.register("num", Arc::new(5u32)).unwrap();
        assert!(matches!(
            registry.find::<dyn Greeter>("num"),
            Err(TelematicsError::ServiceTypeMismatch { .. })
        ));
        assert!(matches!(
            registry.register("num", Arc::new(6u32)),
            Err(TelematicsError::DuplicateService { .. })
        ));
    }

    #[test]
    fn test_membership_events() {
        let registry = ServiceRegistry::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_cb = seen.clone();
        let _sub = registry.events().subscribe(move |e| {
            seen_cb.lock().unwrap().push(e.clone());
        });

        registry.register("a", Arc::new(1u8)).unwrap();
        registry.unregister("a").unwrap();
        assert!(registry.unregister("a").is_err());

        assert_eq!(
            *seen.lock().unwrap(),
            vec![
                RegistryEvent::Registered("a".into()),
                RegistryEvent::Unregistered("a".into())
            ]
        );
        assert!(registry.names().is_empty());
    }
}
