//! Concurrent PID allocation never hands out the same PID twice.

use std::{collections::HashSet, sync::Arc, thread};

use encore_server::{MemoryStorage, RedbStorage, Repository, Storage};

const THREADS: usize = 10;
const PER_THREAD: usize = 50;

fn allocate_concurrently<S: Storage>(storage: S) -> Vec<u32> {
    let repo = Arc::new(Repository::new(storage));

    let handles: Vec<_> = (0..THREADS)
        .map(|_| {
            let repo = Arc::clone(&repo);
            thread::spawn(move || (0..PER_THREAD).map(|_| repo.allocate_pid().unwrap()).collect::<Vec<_>>())
        })
        .collect();

    handles.into_iter().flat_map(|h| h.join().unwrap()).collect()
}

fn assert_distinct(pids: &[u32]) {
    let unique: HashSet<u32> = pids.iter().copied().collect();
    assert_eq!(pids.len(), THREADS * PER_THREAD);
    assert_eq!(unique.len(), pids.len(), "duplicate pid handed out");
    assert!(pids.iter().all(|&pid| pid > 1000));
}

#[test]
fn memory_storage_pids_are_unique() {
    assert_distinct(&allocate_concurrently(MemoryStorage::new()));
}

#[test]
fn redb_storage_pids_are_unique() {
    let dir = tempfile::tempdir().unwrap();
    let storage = RedbStorage::open(dir.path().join("encore.redb")).unwrap();
    assert_distinct(&allocate_concurrently(storage));
}

#[test]
fn pids_continue_after_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("encore.redb");

    let last = {
        let repo = Repository::new(RedbStorage::open(&path).unwrap());
        (0..5).map(|_| repo.allocate_pid().unwrap()).max().unwrap()
    };

    let repo = Repository::new(RedbStorage::open(&path).unwrap());
    assert_eq!(repo.allocate_pid().unwrap(), last + 1);
}
