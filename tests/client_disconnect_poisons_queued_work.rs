// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! A client that disconnects while its requests are still queued should
//! have them discarded rather than run, when `cleanup_disconnected_reqs`
//! is enabled.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use xlator_core::client::{Client, ClientAuthData, ClientRegistry};
use xlator_core::io_threads::{Frame, IOThreads, Op};
use xlator_core::Config;

fn wait_for<F: Fn() -> bool>(condition: F, timeout: Duration) -> bool {
    let deadline = Instant::now() + timeout;
    while !condition() {
        if Instant::now() >= deadline {
            return false;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    true
}

#[test_log::test]
fn disconnected_client_requests_are_dropped_instead_of_run() {
    let registry = ClientRegistry::new(2);
    let pool = IOThreads::defaults_init(Config::default().with_max_count(1).with_cleanup_disconnected_reqs(true));

    let auth = ClientAuthData::new(1, vec![9]).expect("valid auth");
    let client = registry.get(0, auth, "uid-disconnect", None).expect("created");
    let tbl_index = client.tbl_index();

    let gate = Arc::new((std::sync::Mutex::new(false), std::sync::Condvar::new()));
    let gate_clone = Arc::clone(&gate);
    pool.schedule(
        Arc::new(Frame::new(None, 0, 0, false)),
        Op::Write,
        Box::new(move || {
            let (lock, cvar) = &*gate_clone;
            let mut released = lock.lock().unwrap();
            while !*released {
                released = cvar.wait(released).unwrap();
            }
        }),
    )
    .expect("queues");
    std::thread::sleep(Duration::from_millis(50));

    let ran = Arc::new(AtomicUsize::new(0));
    let ran_clone = Arc::clone(&ran);
    pool.schedule(
        Arc::new(Frame::new(Some(Arc::clone(&client)), 0, 0, false)),
        Op::Write,
        Box::new(move || {
            ran_clone.fetch_add(1, Ordering::SeqCst);
        }),
    )
    .expect("queues");

    // The client disconnects before its request is ever dequeued.
    pool.disconnect_cbk(tbl_index);
    let mut detached = false;
    registry.put(&client, &mut detached);
    assert!(detached);

    {
        let (lock, cvar) = &*gate.clone();
        *lock.lock().unwrap() = true;
        cvar.notify_all();
    }

    // Give the worker a chance to drain the (poisoned) stub, then confirm
    // it never ran the action.
    std::thread::sleep(Duration::from_millis(200));
    assert_eq!(ran.load(Ordering::SeqCst), 0);

    pool.client_destroy(tbl_index);
    pool.stop();
}

#[test_log::test]
fn disconnect_without_cleanup_enabled_leaves_queued_work_to_run() {
    let registry = ClientRegistry::new(2);
    let pool = IOThreads::defaults_init(Config::default().with_max_count(1).with_cleanup_disconnected_reqs(false));

    let auth = ClientAuthData::new(1, vec![9]).expect("valid auth");
    let client = registry.get(0, auth, "uid-keep", None).expect("created");
    let tbl_index = client.tbl_index();

    let ran = Arc::new(AtomicUsize::new(0));
    let ran_clone = Arc::clone(&ran);
    pool.schedule(
        Arc::new(Frame::new(Some(Arc::clone(&client)), 0, 0, false)),
        Op::Write,
        Box::new(move || {
            ran_clone.fetch_add(1, Ordering::SeqCst);
        }),
    )
    .expect("queues");

    pool.disconnect_cbk(tbl_index);

    assert!(wait_for(|| ran.load(Ordering::SeqCst) == 1, Duration::from_secs(5)));

    pool.client_destroy(tbl_index);
    pool.stop();
}
