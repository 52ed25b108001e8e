//! Peer lifecycle handling: forced lock recovery and postmortem capture.
//!
//! A peer that dies mid-transaction leaves the cross-processor lock (and
//! possibly others) permanently held. The [`RestartMonitor`] subscribes to
//! the platform's subsystem lifecycle notifications and, on a termination,
//! tears every lock out of the dead peer's hands and snapshots the primary
//! region for postmortem analysis. Capture is best-effort; lock recovery
//! never waits for it and never fails because of it.

use crate::error::DumpError;
use crate::heap::SharedHeap;
use alloc::boxed::Box;
use alloc::sync::Arc;
use alloc::vec::Vec;
use log::{debug, error, info, warn};
use shmem_addresses::PhysicalAddress;
use shmem_sync::{LockRegistry, ProcessorId};

/// Lifecycle states reported for a peer subsystem.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum PeerEvent {
    /// The peer is up (or back up).
    Online,
    /// An orderly restart is in progress.
    Restarting,
    /// The peer went down, without releasing what it held.
    Terminated,
}

/// One recoverable peer subsystem.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct PeerSubsystem {
    pub processor: ProcessorId,
    pub name: &'static str,
}

impl PeerSubsystem {
    #[must_use]
    pub const fn new(processor: ProcessorId, name: &'static str) -> Self {
        Self { processor, name }
    }
}

/// A memory range handed to a dump sink.
#[derive(Debug, Copy, Clone)]
pub struct DumpSegment<'a> {
    pub phys: PhysicalAddress,
    pub data: &'a [u8],
}

/// Postmortem capture device.
pub trait DumpSink: Send + Sync {
    fn capture(&self, segments: &[DumpSegment<'_>]) -> Result<(), DumpError>;
}

/// Delivery channel for peer lifecycle events.
///
/// Implementations arrange for [`RestartMonitor::handle`] to be called with
/// the subscribed peer on every lifecycle change. Delivery is at least once
/// and may run concurrently with allocation traffic.
pub trait SubsystemNotifier {
    fn subscribe(&mut self, peer: PeerSubsystem, monitor: Arc<RestartMonitor>);
}

/// Watches peer subsystems and recovers shared state they died holding.
pub struct RestartMonitor {
    heap: Arc<SharedHeap>,
    locks: Arc<LockRegistry>,
    peers: Vec<PeerSubsystem>,
    sink: Option<Box<dyn DumpSink>>,
}

impl RestartMonitor {
    /// A monitor for `peers`, sweeping `locks` on termination.
    ///
    /// `sink` is `None` when dump-device creation failed earlier in
    /// bring-up; recovery then skips capture and does everything else.
    #[must_use]
    pub fn new(
        heap: Arc<SharedHeap>,
        locks: Arc<LockRegistry>,
        peers: Vec<PeerSubsystem>,
        sink: Option<Box<dyn DumpSink>>,
    ) -> Self {
        if sink.is_none() {
            debug!("no dump sink configured; postmortem capture disabled");
        }
        Self {
            heap,
            locks,
            peers,
            sink,
        }
    }

    /// Registers every configured peer with the notification collaborator.
    pub fn subscribe(self: &Arc<Self>, notifier: &mut dyn SubsystemNotifier) {
        for peer in &self.peers {
            info!("watching subsystem {} (processor {})", peer.name, peer.processor);
            notifier.subscribe(*peer, Arc::clone(self));
        }
    }

    /// Reacts to one lifecycle event.
    ///
    /// Only [`PeerEvent::Terminated`] does anything; handling is idempotent,
    /// so at-least-once delivery is fine.
    pub fn handle(&self, peer: PeerSubsystem, event: PeerEvent) {
        if event != PeerEvent::Terminated {
            return;
        }
        info!(
            "subsystem {} (processor {}) terminated, recovering locks",
            peer.name, peer.processor
        );
        if self.heap.force_release(peer.processor) {
            warn!("table lock was held by {}, released", peer.name);
        }
        self.locks.force_release_all(peer.processor, |lock| {
            warn!("lock {lock} was held by {}, released", peer.name);
        });
        self.dump();
    }

    fn dump(&self) {
        let Some(sink) = &self.sink else {
            return;
        };
        let region = self.heap.primary_region();
        let data = region.snapshot();
        let segment = DumpSegment {
            phys: region.phys(),
            data: &data,
        };
        if let Err(err) = sink.capture(&[segment]) {
            // Diagnostics stay best-effort; recovery already happened.
            error!("shared region dump failed: {err}");
        }
    }
}
