//! Tests for SharedStore
//!
//! These tests verify:
//! - Operations through a shared handle
//! - Concurrent writers serialized by the store mutex
//! - Getting the store back from the last handle

use std::thread;

use flashkv::{Config, NvmStore, RamFlash, SharedStore};

// =============================================================================
// Helper Functions
// =============================================================================

fn setup_shared() -> SharedStore<RamFlash> {
    let store = NvmStore::open(RamFlash::new(64 * 1024, 4096), Config::default()).unwrap();
    SharedStore::new(store)
}

// =============================================================================
// Basic Tests
// =============================================================================

#[test]
fn test_shared_basic_operations() {
    let shared = setup_shared();

    shared.write(1, b"hello").unwrap();
    let mut buf = [0u8; 5];
    assert!(shared.read(1, &mut buf).unwrap());
    assert_eq!(&buf, b"hello");

    assert!(shared.erase(1).unwrap());
    assert_eq!(shared.get(1).unwrap(), None);

    shared.erase_all().unwrap();
    assert_eq!(shared.with(|store| store.cursor()), 0);
}

#[test]
fn test_shared_clone_sees_same_store() {
    let shared = setup_shared();
    let other = shared.clone();

    shared.write(3, b"three").unwrap();

    assert_eq!(other.get(3).unwrap(), Some(b"three".to_vec()));
    assert_eq!(other.stats().unwrap().live_records, 1);
}

// =============================================================================
// Concurrency Tests
// =============================================================================

#[test]
fn test_concurrent_writers() {
    let shared = setup_shared();
    let mut handles = Vec::new();

    for t in 0..4u64 {
        let store = shared.clone();
        handles.push(thread::spawn(move || {
            let id = t + 1;
            for round in 0..20 {
                store
                    .write(id, format!("thread{}-round{}", t, round).as_bytes())
                    .unwrap();
            }
        }));
    }
    for handle in handles {
        handle.join().unwrap();
    }

    for t in 0..4u64 {
        assert_eq!(
            shared.get(t + 1).unwrap(),
            Some(format!("thread{}-round19", t).into_bytes())
        );
    }

    let stats = shared.stats().unwrap();
    assert_eq!(stats.live_records, 4);
    assert_eq!(stats.tombstones, 4 * 19);
    assert!(shared.verify().unwrap().is_clean());
}

#[test]
fn test_try_into_inner() {
    let shared = setup_shared();
    let other = shared.clone();

    // Another handle is still alive
    let shared = match shared.try_into_inner() {
        Ok(_) => panic!("store should still be shared"),
        Err(shared) => shared,
    };
    drop(other);

    let mut store = shared.try_into_inner().ok().unwrap();
    assert_eq!(store.get(1).unwrap(), None);
}
