//! End-to-end recovery: a peer dies holding the lock, the monitor cleans
//! up, and allocation traffic carries on.

use shmem::{
    DATA_OFFSET, DumpError, DumpSegment, DumpSink, ItemId, LockRegistry, PeerEvent, PeerSubsystem,
    PhysicalAddress, ProcessorId, RemoteLock, RemoteSpin, RestartMonitor, SharedHeap, SharedRegion,
};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

const MODEM: PeerSubsystem = PeerSubsystem::new(ProcessorId::new(1), "modem");

fn stack() -> (Arc<SharedHeap>, Arc<RemoteSpin>, Arc<LockRegistry>) {
    let region = Arc::new(SharedRegion::in_memory(
        PhysicalAddress::new(0x8000_0000),
        DATA_OFFSET + 4096,
    ));
    let heap = Arc::new(SharedHeap::new(region, ProcessorId::new(0)).unwrap());
    heap.bootstrap().unwrap();

    let lock = Arc::new(RemoteSpin::new());
    heap.install_lock(Arc::clone(&lock) as Arc<dyn RemoteLock>)
        .unwrap();

    let locks = Arc::new(LockRegistry::new());
    locks.register("heap", Arc::clone(&lock) as Arc<dyn RemoteLock>);
    (heap, lock, locks)
}

struct CountingSink {
    fail: bool,
    captures: AtomicUsize,
}

impl DumpSink for CountingSink {
    fn capture(&self, segments: &[DumpSegment<'_>]) -> Result<(), DumpError> {
        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0].phys, PhysicalAddress::new(0x8000_0000));
        assert_eq!(segments[0].data.len(), (DATA_OFFSET + 4096) as usize);
        self.captures.fetch_add(1, Ordering::SeqCst);
        if self.fail { Err(DumpError(-5)) } else { Ok(()) }
    }
}

#[test]
fn termination_unblocks_a_waiting_allocator() {
    let (heap, lock, locks) = stack();
    let monitor = RestartMonitor::new(
        Arc::clone(&heap),
        Arc::clone(&locks),
        vec![MODEM],
        None,
    );

    // The peer claims the lock and then "dies".
    lock.lock(MODEM.processor);

    let allocated = Arc::new(AtomicBool::new(false));
    let waiter = {
        let heap = Arc::clone(&heap);
        let allocated = Arc::clone(&allocated);
        thread::spawn(move || {
            let item = heap.find_or_alloc(ItemId::new(77), 32).unwrap();
            allocated.store(true, Ordering::SeqCst);
            item
        })
    };

    thread::sleep(Duration::from_millis(20));
    assert!(!allocated.load(Ordering::SeqCst), "allocator got in early");

    monitor.handle(MODEM, PeerEvent::Terminated);

    let item = waiter.join().unwrap();
    assert!(allocated.load(Ordering::SeqCst));
    assert_eq!(item.size, 32);
    assert_eq!(heap.find(ItemId::new(77), 32).unwrap(), item);
}

#[test]
fn unrelated_allocation_survives_a_peer_restart() {
    let (heap, lock, locks) = stack();
    let monitor = RestartMonitor::new(
        Arc::clone(&heap),
        Arc::clone(&locks),
        vec![MODEM],
        None,
    );

    let before = heap.find_or_alloc(ItemId::new(40), 64).unwrap();

    lock.lock(MODEM.processor);
    monitor.handle(MODEM, PeerEvent::Terminated);

    // The established item is intact and new items still allocate.
    assert_eq!(heap.find(ItemId::new(40), 64).unwrap(), before);
    let after = heap.find_or_alloc(ItemId::new(41), 64).unwrap();
    assert_eq!(
        after.addr.as_u64(),
        before.addr.as_u64() + 64,
        "bump cursor continued where it left off"
    );
}

#[test]
fn repeated_delivery_is_harmless() {
    let (heap, lock, locks) = stack();
    let sink = Arc::new(CountingSink {
        fail: false,
        captures: AtomicUsize::new(0),
    });
    let monitor = RestartMonitor::new(
        Arc::clone(&heap),
        Arc::clone(&locks),
        vec![MODEM],
        Some(Box::new(Handle(Arc::clone(&sink)))),
    );

    lock.lock(MODEM.processor);
    monitor.handle(MODEM, PeerEvent::Terminated);
    monitor.handle(MODEM, PeerEvent::Terminated);
    monitor.handle(MODEM, PeerEvent::Terminated);

    assert_eq!(lock.holder(), None);
    assert_eq!(sink.captures.load(Ordering::SeqCst), 3);
    assert!(heap.find_or_alloc(ItemId::new(50), 16).is_ok());
}

#[test]
fn capture_failure_never_wedges_recovery() {
    let (heap, lock, locks) = stack();
    let sink = Arc::new(CountingSink {
        fail: true,
        captures: AtomicUsize::new(0),
    });
    let monitor = RestartMonitor::new(
        Arc::clone(&heap),
        Arc::clone(&locks),
        vec![MODEM],
        Some(Box::new(Handle(Arc::clone(&sink)))),
    );

    lock.lock(MODEM.processor);
    monitor.handle(MODEM, PeerEvent::Terminated);

    assert_eq!(lock.holder(), None);
    assert_eq!(sink.captures.load(Ordering::SeqCst), 1);
    assert!(heap.find_or_alloc(ItemId::new(51), 16).is_ok());
}

/// Shares a sink between the monitor (which wants a box) and the test.
struct Handle(Arc<CountingSink>);

impl DumpSink for Handle {
    fn capture(&self, segments: &[DumpSegment<'_>]) -> Result<(), DumpError> {
        self.0.capture(segments)
    }
}
