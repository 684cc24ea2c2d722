use super::dss::*;
use super::pcl::*;
use super::*;
use crate::types::AppContext;
use std::sync::{Arc, Mutex};

fn create_store() -> KeyValueStore {
    KeyValueStore::new(PersistenceConfig::default())
}

fn app_scope() -> KeyScope {
    KeyScope::bundle("com.test.app")
}

fn create_storage() -> DataStorage {
    DataStorage::new(DataStorageConfig {
        namespace_quota_kib: 4,
        total_capacity_kib: 8,
        root_dir: None,
    })
}

fn ctx(name: &str) -> AppContext {
    AppContext::new(name)
}

mod pcl_tests {
    use super::*;

    #[test]
    fn test_read_after_delete_is_not_found() {
        let store = create_store();
        let scope = app_scope();
        store.key_create_int(&scope, "counter").unwrap();
        store.write_int(&scope, "counter", 7).unwrap();
        assert_eq!(store.read_int(&scope, "counter"), Ok(7));

        store.key_delete(&scope, "counter").unwrap();
        assert_eq!(store.read_int(&scope, "counter"), Err(PclError::KeyNotFound));
    }

    #[test]
    fn test_unwritten_key_is_not_found() {
        let store = create_store();
        let scope = app_scope();
        store.key_create_byte_array(&scope, "blob", 16).unwrap();
        assert_eq!(store.read_byte_array(&scope, "blob"), Err(PclError::KeyNotFound));
        assert_eq!(store.key_size(&scope, "blob"), Ok(0));
    }

    #[test]
    fn test_duplicate_key_rejected() {
        let store = create_store();
        let scope = app_scope();
        store.key_create_int(&scope, "k").unwrap();
        assert_eq!(store.key_create_int(&scope, "k"), Err(PclError::KeyExists));
        // Same name under another bundle is a different key
        assert!(store
            .key_create_int(&KeyScope::bundle("com.other.app"), "k")
            .is_ok());
    }

    #[test]
    fn test_byte_array_size_limits() {
        let store = create_store();
        let scope = app_scope();
        assert_eq!(
            store.key_create_byte_array(&scope, "zero", 0),
            Err(PclError::Internal)
        );
        assert_eq!(
            store.key_create_byte_array_critical(&scope, "big", 25 * 1024 + 1),
            Err(PclError::InvalidArg)
        );

        store.key_create_byte_array(&scope, "small", 4).unwrap();
        assert_eq!(
            store.write_byte_array(&scope, "small", &[1, 2, 3, 4, 5]),
            Err(PclError::InvalidArg)
        );
        store.write_byte_array(&scope, "small", &[1, 2, 3]).unwrap();
        assert_eq!(store.read_byte_array(&scope, "small"), Ok(vec![1, 2, 3]));
        assert_eq!(store.key_size(&scope, "small"), Ok(3));
    }

    #[test]
    fn test_type_mismatch() {
        let store = create_store();
        let scope = app_scope();
        store.key_create_int(&scope, "n").unwrap();
        assert_eq!(store.write_byte_array(&scope, "n", &[1]), Err(PclError::InvalidArg));
        assert_eq!(store.read_byte_array(&scope, "n"), Err(PclError::InvalidArg));
    }

    #[test]
    fn test_critical_and_normal_deletes_do_not_cross() {
        let store = create_store();
        let scope = app_scope();
        store.key_create_int_critical(&scope, "secret").unwrap();
        assert_eq!(store.key_delete(&scope, "secret"), Err(PclError::AccessDenied));
        assert!(store.key_delete_critical(&scope, "secret").is_ok());
    }

    #[test]
    fn test_quota_accounting() {
        let store = KeyValueStore::new(PersistenceConfig {
            quota_bytes: 100,
            key_max_size: 100,
            secured_key_max_size: 50,
            key_name_max_len: 16,
        });
        let scope = app_scope();
        store.key_create_byte_array(&scope, "a", 90).unwrap();
        store.key_create_int(&scope, "b").unwrap();
        assert_eq!(store.used_space(), Ok(94));
        assert_eq!(store.remaining_space(), Ok(6));
        assert_eq!(
            store.key_create_byte_array(&scope, "c", 10),
            Err(PclError::NoQuota)
        );
        assert_eq!(
            store.key_create_int(&scope, "a-name-longer-than-16"),
            Err(PclError::InvalidArg)
        );
    }

    #[test]
    fn test_change_notifications() {
        let store = create_store();
        let scope = app_scope();
        store.key_create_int(&scope, "watched").unwrap();

        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let _sub = store
            .register_notify_on_change(
                &scope,
                "watched",
                Box::new(move |n: &ChangeNotification| sink.lock().unwrap().push(n.clone())),
            )
            .unwrap();

        store.write_int(&scope, "watched", 1).unwrap();
        store.key_delete(&scope, "watched").unwrap();

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0].notify_status, NotifyStatus::Modified);
        assert_eq!(seen[1].notify_status, NotifyStatus::Deleted);
        assert_eq!(seen[1].key_id, "watched");
    }

    #[test]
    fn test_remove_app_keys_keeps_other_bundles() {
        let store = create_store();
        let other = KeyScope::bundle("com.other.app");
        store.key_create_int(&app_scope(), "x").unwrap();
        store.key_create_int(&KeyScope::Shared, "x").unwrap();
        store.key_create_int(&other, "x").unwrap();

        store.remove_app_keys("com.test.app").unwrap();
        assert_eq!(store.read_int(&app_scope(), "x"), Err(PclError::KeyNotFound));
        store.write_int(&KeyScope::Shared, "x", 3).unwrap();
        store.write_int(&other, "x", 4).unwrap();
        assert_eq!(store.remove_app_keys(""), Err(PclError::InvalidArg));
    }

    #[test]
    fn test_restored_to_default_drops_keys() {
        let store = create_store();
        let scope = app_scope();
        store.key_create_int(&scope, "k").unwrap();
        let states = Arc::new(Mutex::new(Vec::new()));
        let sink = states.clone();
        let _sub = store
            .database_state_changed()
            .subscribe(move |s: &DatabaseState| sink.lock().unwrap().push(*s));

        store.set_database_state(DatabaseState::Corrupted);
        store.set_database_state(DatabaseState::RestoredToDefault);

        assert_eq!(store.database_state(), DatabaseState::RestoredToDefault);
        assert_eq!(
            *states.lock().unwrap(),
            vec![DatabaseState::Corrupted, DatabaseState::RestoredToDefault]
        );
        assert_eq!(store.used_space(), Ok(0));
        assert!(store.key_create_int(&scope, "k").is_ok());
    }

    #[test]
    fn test_disabled_service() {
        let store = create_store();
        store.set_enabled(false);
        assert_eq!(
            store.key_create_int(&app_scope(), "k"),
            Err(PclError::ServiceDisabled)
        );
        assert_eq!(PclError::ServiceDisabled.code(), -93);
    }
}

mod dss_tests {
    use super::*;

    #[test]
    fn test_private_file_lifecycle() {
        let storage = create_storage();
        let ns = storage
            .namespace_open(&ctx("com.test.app"), NamespaceType::Private)
            .unwrap();
        assert_eq!(
            storage.file_open(ns, "data.bin", AccessMode::ReadOnly),
            Err(DssError::NoEnt)
        );

        let file = storage.file_open(ns, "data.bin", AccessMode::ReadWrite).unwrap();
        assert_eq!(storage.file_write(file, b"hello world"), Ok(11));
        assert_eq!(storage.file_size(file), Ok(11));
        assert_eq!(storage.file_seek(file, 6, SeekOrigin::Set), Ok(6));

        let mut buf = [0u8; 16];
        assert_eq!(storage.file_read(file, &mut buf), Ok(5));
        assert_eq!(&buf[..5], b"world");
        assert_eq!(storage.file_read(file, &mut buf), Ok(0));
        assert_eq!(storage.file_seek(file, -20, SeekOrigin::End), Err(DssError::Inval));

        assert_eq!(storage.file_remove(ns, "data.bin"), Err(DssError::Busy));
        storage.file_close(file).unwrap();
        assert!(storage.file_remove(ns, "data.bin").is_ok());
        assert_eq!(storage.file_remove(ns, "data.bin"), Err(DssError::NoEnt));
    }

    #[test]
    fn test_write_far_past_end_rejected() {
        let storage = create_storage();
        let ns = storage
            .namespace_open(&ctx("com.test.app"), NamespaceType::Private)
            .unwrap();
        let file = storage.file_open(ns, "data.bin", AccessMode::ReadWrite).unwrap();
        storage.file_write(file, b"0123456789").unwrap();

        storage.file_seek(file, i64::MAX, SeekOrigin::Set).unwrap();
        assert_eq!(
            storage.file_seek(file, i64::MAX, SeekOrigin::Cur),
            Ok(u64::MAX - 1)
        );
        assert!(storage.file_write(file, b"xyz").is_err());

        storage.file_seek(file, 1 << 40, SeekOrigin::Set).unwrap();
        assert!(storage.file_write(file, b"xyz").is_err());

        // The service stays usable and the file is unchanged
        assert_eq!(storage.file_size(file), Ok(10));
        assert_eq!(storage.file_seek(file, 0, SeekOrigin::End), Ok(10));
        assert_eq!(storage.file_write(file, b"ab"), Ok(2));
        assert_eq!(storage.file_size(file), Ok(12));
    }

    #[test]
    fn test_name_validation() {
        let storage = create_storage();
        let ns = storage
            .namespace_open(&ctx("com.test.app"), NamespaceType::Private)
            .unwrap();
        let long = "x".repeat(MAX_FILENAME_SIZE + 1);
        assert_eq!(
            storage.file_open(ns, &long, AccessMode::WriteOnly),
            Err(DssError::NameTooLong)
        );
        assert_eq!(
            storage.file_open(ns, "", AccessMode::WriteOnly),
            Err(DssError::Inval)
        );
        assert_eq!(
            storage.file_open(ns, "../escape", AccessMode::WriteOnly),
            Err(DssError::Inval)
        );
        assert_eq!(
            storage.file_open(99, "ok", AccessMode::WriteOnly),
            Err(DssError::Inval)
        );
    }

    #[test]
    fn test_namespace_quota() {
        let storage = create_storage();
        let ns = storage
            .namespace_open(&ctx("com.test.app"), NamespaceType::Private)
            .unwrap();
        assert_eq!(storage.namespace_quota(ns), Ok(4));
        assert_eq!(storage.namespace_free_space(ns), Ok(4));

        let file = storage.file_open(ns, "big", AccessMode::WriteOnly).unwrap();
        assert_eq!(storage.file_write(file, &[0u8; 3000]), Ok(3000));
        assert_eq!(storage.namespace_free_space(ns), Ok(1));
        assert_eq!(storage.total_used_space(), Ok(3));
        assert_eq!(storage.total_free_space(), Ok(5));
        assert_eq!(storage.file_write(file, &[0u8; 2000]), Err(DssError::NoMem));
    }

    #[test]
    fn test_shared_namespace_conflicts_and_events() {
        let storage = create_storage();
        let ns = storage
            .namespace_open(&ctx("com.test.writer"), NamespaceType::Shared)
            .unwrap();
        let same = storage
            .namespace_open(&ctx("com.test.reader"), NamespaceType::Shared)
            .unwrap();
        assert_eq!(ns, same);

        let changed = Arc::new(Mutex::new(Vec::new()));
        let released = Arc::new(Mutex::new(Vec::new()));
        let (c, r) = (changed.clone(), released.clone());
        let _s1 = storage
            .events()
            .file_changed
            .subscribe(move |n: &String| c.lock().unwrap().push(n.clone()));
        let _s2 = storage
            .events()
            .file_released
            .subscribe(move |n: &String| r.lock().unwrap().push(n.clone()));

        let writer = storage.file_open(ns, "shared.txt", AccessMode::WriteOnly).unwrap();
        let reader = storage.file_open(ns, "shared.txt", AccessMode::ReadOnly).unwrap();
        let mut buf = [0u8; 4];
        assert_eq!(storage.file_read(reader, &mut buf), Err(DssError::Busy));
        assert_eq!(storage.file_write(writer, b"abc"), Err(DssError::Busy));

        storage.file_close(reader).unwrap();
        assert_eq!(storage.file_write(writer, b"abc"), Ok(3));
        assert!(changed.lock().unwrap().is_empty());
        storage.file_close(writer).unwrap();

        assert_eq!(*changed.lock().unwrap(), vec!["shared.txt".to_string()]);
        assert_eq!(*released.lock().unwrap(), vec!["shared.txt".to_string()]);
    }

    #[test]
    fn test_remove_all_files_requires_closed_files() {
        let storage = create_storage();
        let ns = storage
            .namespace_open(&ctx("com.test.app"), NamespaceType::Private)
            .unwrap();
        let file = storage.file_open(ns, "a", AccessMode::WriteOnly).unwrap();
        assert_eq!(storage.namespace_remove_all_files(ns), Err(DssError::Busy));
        storage.file_close(file).unwrap();
        storage.namespace_remove_all_files(ns).unwrap();
        assert_eq!(
            storage.file_open(ns, "a", AccessMode::ReadOnly),
            Err(DssError::NoEnt)
        );

        storage.namespace_remove("com.test.app").unwrap();
        assert_eq!(storage.namespace_quota(ns), Err(DssError::Inval));
    }

    #[test]
    fn test_unmounted_and_disabled() {
        let storage = create_storage();
        storage.set_mounted(false);
        assert_eq!(
            storage.namespace_open(&ctx("com.test.app"), NamespaceType::Shared),
            Err(DssError::ConnRefused)
        );
        storage.set_mounted(true);
        storage.set_enabled(false);
        assert_eq!(storage.total_used_space(), Err(DssError::ServiceDisable));
        assert_eq!(DssError::ServiceDisable.code(), -656);
    }

    #[test]
    fn test_synchronous_save_writes_file() {
        let dir = tempfile::tempdir().unwrap();
        let storage = DataStorage::new(DataStorageConfig {
            root_dir: Some(dir.path().to_path_buf()),
            ..DataStorageConfig::default()
        });
        let ns = storage
            .namespace_open(&ctx("com.test.app"), NamespaceType::Private)
            .unwrap();
        let file = storage.file_open(ns, "saved.cfg", AccessMode::WriteOnly).unwrap();
        storage.file_write(file, b"payload").unwrap();
        assert_eq!(storage.file_save(ns, "saved.cfg", true), Err(DssError::Busy));
        storage.file_close(file).unwrap();

        storage.file_save(ns, "saved.cfg", true).unwrap();
        let on_disk = std::fs::read(
            dir.path()
                .join("private")
                .join("com.test.app")
                .join("saved.cfg"),
        )
        .unwrap();
        assert_eq!(on_disk, b"payload");
        assert_eq!(storage.file_save(ns, "missing", true), Err(DssError::NoEnt));
    }
}

mod config_tests {
    use super::*;
    use crate::types::Config;

    #[test]
    fn test_defaults_validate() {
        assert!(PersistenceConfig::default().validate().is_ok());
        assert!(DataStorageConfig::default().validate().is_ok());
    }

    #[test]
    fn test_invalid_limits() {
        let pcl = PersistenceConfig {
            secured_key_max_size: 10,
            key_max_size: 5,
            ..PersistenceConfig::default()
        };
        assert!(pcl.validate().is_err());
        let dss = DataStorageConfig {
            namespace_quota_kib: 100,
            total_capacity_kib: 10,
            root_dir: None,
        };
        assert!(dss.validate().is_err());
    }
}
