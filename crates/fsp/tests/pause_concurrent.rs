//! Pause Concurrency Tests - Stop-the-World Under Real Threads
//!
//! These tests run the pause protocol against live mutator threads:
//! - Every running thread is stopped exactly once per pause
//! - Parked threads are not counted and cannot run during a pause
//! - Concurrent requesters never hold a pause at the same time
//! - Registration waits for the pause to end

mod common;

use common::{assert_same_threads, CountingVisitor, Mutators, BLOCK_CHECK};
use fsp::{PauseCoordinator, PauseScope, ThreadKind};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;

/// ============================================================================
/// STOPPING RUNNING THREADS
/// ============================================================================

/// **Invariant verified:** after request_pause returns, stopped == N and
/// visit_roots visits each of the N handles exactly once
#[test]
fn test_pause_stops_all_running_threads() {
    let coordinator = Arc::new(PauseCoordinator::new());
    let mutators = Mutators::spawn(&coordinator, 8, 2);

    {
        let pause = PauseScope::new(&coordinator);
        assert_eq!(coordinator.stopped_threads(), 8);

        let mut visitor = CountingVisitor::default();
        pause.visit_roots(&mut visitor);

        assert_same_threads(visitor.threads.clone(), mutators.ids());
        assert_eq!(visitor.total_roots(), 16);
        assert!(visitor.roots.values().all(|&n| n == 2));
    }

    assert!(!coordinator.is_armed());
    mutators.join();
    assert!(!coordinator.contains_any_thread());
}

/// **Invariant verified:** no mutator makes progress while the pause is held
#[test]
fn test_mutators_make_no_progress_during_pause() {
    let coordinator = Arc::new(PauseCoordinator::new());
    let mutators = Mutators::spawn(&coordinator, 4, 0);

    {
        let _pause = PauseScope::new(&coordinator);
        let before = mutators.polls();
        thread::sleep(BLOCK_CHECK);
        assert_eq!(mutators.polls(), before);
    }

    let after_release = mutators.polls();
    while mutators.polls() == after_release {
        thread::yield_now();
    }
    mutators.join();
}

/// **Invariant verified:** a nested request neither blocks nor re-counts
#[test]
fn test_nested_pause_does_not_recount() {
    let coordinator = Arc::new(PauseCoordinator::new());
    let mutators = Mutators::spawn(&coordinator, 4, 0);

    let outer = PauseScope::new(&coordinator);
    assert_eq!(coordinator.stopped_threads(), 4);
    {
        let _inner = PauseScope::new(&coordinator);
        assert_eq!(coordinator.stopped_threads(), 4);
        assert_eq!(coordinator.active_pauses(), 2);
    }
    assert!(coordinator.is_armed());
    drop(outer);

    assert_eq!(coordinator.active_pauses(), 0);
    assert!(!coordinator.is_armed());
    mutators.join();
}

/// **Invariant verified:** repeated pauses against the same threads never
/// miss a wakeup
#[test]
fn test_many_consecutive_pauses() {
    let coordinator = Arc::new(PauseCoordinator::new());
    let mutators = Mutators::spawn(&coordinator, 4, 1);

    for _ in 0..200 {
        let pause = PauseScope::new(&coordinator);
        assert_eq!(coordinator.stopped_threads(), 4);
        let mut visitor = CountingVisitor::default();
        pause.visit_roots(&mut visitor);
        assert_eq!(visitor.threads.len(), 4);
    }

    let summary = coordinator.stats().unwrap().summary();
    assert_eq!(summary.pauses, 200);
    assert_eq!(summary.threads_stopped, 800);
    mutators.join();
}

/// ============================================================================
/// PARKED THREADS
/// ============================================================================

/// **Invariant verified:** a parked thread is not waited for, and blocks in
/// unpark until the pause is released
#[test]
fn test_parked_thread_not_counted_and_blocks_in_unpark() {
    let coordinator = Arc::new(PauseCoordinator::new());
    let mutators = Mutators::spawn(&coordinator, 3, 0);

    let parked = Arc::new(Barrier::new(2));
    let go = Arc::new(Barrier::new(2));
    let unparked = Arc::new(AtomicBool::new(false));

    let sleeper = {
        let coordinator = Arc::clone(&coordinator);
        let parked = Arc::clone(&parked);
        let go = Arc::clone(&go);
        let unparked = Arc::clone(&unparked);
        thread::spawn(move || {
            let thread = coordinator.register_thread(ThreadKind::Background, || {});
            thread.park();
            parked.wait();
            go.wait();
            thread.unpark();
            unparked.store(true, Ordering::Release);
        })
    };

    parked.wait();
    {
        let pause = PauseScope::new(&coordinator);
        assert_eq!(coordinator.stopped_threads(), 3);

        go.wait();
        thread::sleep(BLOCK_CHECK);
        assert!(!unparked.load(Ordering::Acquire));

        let mut visitor = CountingVisitor::default();
        pause.visit_roots(&mut visitor);
        assert_eq!(visitor.threads.len(), 4);
        assert_eq!(coordinator.stopped_threads(), 3);
    }

    sleeper.join().unwrap();
    assert!(unparked.load(Ordering::Acquire));
    mutators.join();
}

/// **Invariant verified:** a counted thread that parks instead of polling
/// still reports
#[test]
fn test_park_reports_to_pending_pause() {
    let coordinator = Arc::new(PauseCoordinator::new());
    let ready = Arc::new(Barrier::new(2));
    let stop = Arc::new(AtomicBool::new(false));

    let parker = {
        let coordinator = Arc::clone(&coordinator);
        let ready = Arc::clone(&ready);
        let stop = Arc::clone(&stop);
        thread::spawn(move || {
            let thread = coordinator.register_thread(ThreadKind::Background, || {});
            ready.wait();
            while !stop.load(Ordering::Acquire) {
                let _parked = thread.parked_scope();
                std::hint::spin_loop();
            }
        })
    };

    ready.wait();
    for _ in 0..100 {
        let _pause = PauseScope::new(&coordinator);
        assert!(coordinator.stopped_threads() <= 1);
    }
    stop.store(true, Ordering::Release);
    parker.join().unwrap();
}

/// ============================================================================
/// MAIN THREAD
/// ============================================================================

/// **Invariant verified:** without stop_main_thread the main thread keeps
/// running and is not counted
#[test]
fn test_main_thread_left_running() {
    let coordinator = Arc::new(PauseCoordinator::new());
    let main = Mutators::spawn_kind(&coordinator, 1, 0, ThreadKind::Main);
    let background = Mutators::spawn(&coordinator, 2, 0);

    {
        let _pause = PauseScope::with_main_thread(&coordinator, false);
        assert_eq!(coordinator.stopped_threads(), 2);

        let before = main.polls();
        while main.polls() == before {
            thread::yield_now();
        }
    }

    {
        let _pause = PauseScope::with_main_thread(&coordinator, true);
        assert_eq!(coordinator.stopped_threads(), 3);
    }

    background.join();
    main.join();
}

/// ============================================================================
/// CONCURRENT REQUESTERS
/// ============================================================================

/// **Invariant verified:** registered requesters serialize and each stops
/// the other
#[test]
fn test_concurrent_requesters_serialize() {
    let coordinator = Arc::new(PauseCoordinator::new());
    let mutators = Mutators::spawn(&coordinator, 2, 0);
    let holders = Arc::new(AtomicUsize::new(0));
    let start = Arc::new(Barrier::new(3));

    let requesters: Vec<_> = (0..3)
        .map(|_| {
            let coordinator = Arc::clone(&coordinator);
            let holders = Arc::clone(&holders);
            let start = Arc::clone(&start);
            thread::spawn(move || {
                let thread = coordinator.register_thread(ThreadKind::Background, || {});
                start.wait();
                for _ in 0..50 {
                    {
                        let _pause = PauseScope::new(&coordinator);
                        assert_eq!(holders.fetch_add(1, Ordering::SeqCst), 0);
                        // The pollers always count; other requesters only
                        // when they were running as the pause formed.
                        let stopped = coordinator.stopped_threads();
                        assert!((2..=4).contains(&stopped), "stopped = {}", stopped);
                        holders.fetch_sub(1, Ordering::SeqCst);
                    }
                    thread.safepoint();
                }
            })
        })
        .collect();

    for requester in requesters {
        requester.join().unwrap();
    }
    mutators.join();
}

/// ============================================================================
/// REGISTRY CHANGES DURING A PAUSE
/// ============================================================================

/// **Invariant verified:** registration waits for the pause to be released
#[test]
fn test_register_waits_for_release() {
    let coordinator = Arc::new(PauseCoordinator::new());
    let registered = Arc::new(AtomicBool::new(false));

    let pause = PauseScope::new(&coordinator);
    let late = {
        let coordinator = Arc::clone(&coordinator);
        let registered = Arc::clone(&registered);
        thread::spawn(move || {
            let thread = coordinator.register_thread(ThreadKind::Background, || {
                registered.store(true, Ordering::Release);
            });
            thread.safepoint();
        })
    };

    thread::sleep(BLOCK_CHECK);
    assert!(!registered.load(Ordering::Acquire));
    assert_eq!(coordinator.thread_count(), 0);
    drop(pause);

    late.join().unwrap();
    assert!(registered.load(Ordering::Acquire));
}

/// **Invariant verified:** a thread detaching during a pause is still
/// iterated by that pause and leaves afterwards
#[test]
fn test_detach_waits_for_release() {
    let coordinator = Arc::new(PauseCoordinator::new());
    let ready = Arc::new(Barrier::new(2));
    let detach = Arc::new(Barrier::new(2));
    let detached = Arc::new(AtomicBool::new(false));

    let leaver = {
        let coordinator = Arc::clone(&coordinator);
        let ready = Arc::clone(&ready);
        let detach = Arc::clone(&detach);
        let detached = Arc::clone(&detached);
        thread::spawn(move || {
            let thread = coordinator.register_thread(ThreadKind::Background, || {});
            thread.park();
            ready.wait();
            detach.wait();
            thread.detach_with(|| detached.store(true, Ordering::Release));
        })
    };

    ready.wait();
    {
        let pause = PauseScope::new(&coordinator);
        detach.wait();
        thread::sleep(BLOCK_CHECK);
        assert!(!detached.load(Ordering::Acquire));

        let mut visitor = CountingVisitor::default();
        pause.visit_roots(&mut visitor);
        assert_eq!(visitor.threads.len(), 1);
    }

    leaver.join().unwrap();
    assert!(detached.load(Ordering::Acquire));
    assert!(!coordinator.contains_any_thread());
}
