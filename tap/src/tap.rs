// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

use crate::TapStats;
use crate::counters::{TapCounters, bump};
use host::hook::{Disposition, PacketHook};
use host::xmit::{Transmit, XmitOutcome};
use net::buffer::BufferPool;
use net::frame::FrameRef;
use net::interface::InterfaceIndex;
use parking_lot::RwLock;
use std::sync::Arc;
use tracing::{debug, info, trace};

/// Lifecycle of a [`MirrorTap`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TapState {
    /// Frames are observed but never mirrored.
    Unregistered,
    /// Frames are mirrored onto the sink.
    Active {
        /// Interface index of the mirror sink.
        sink: InterfaceIndex,
    },
}

/// Copies frames onto the mirror sink.
///
/// For every frame it is shown, the tap decides whether to mirror it:
///
/// * nothing is mirrored unless the tap is [active](TapState::Active),
/// * frames coming from the sink are never mirrored (they are mirrors already),
/// * frames nobody else holds a reference to are left alone,
/// * everything else is copied, re-targeted to the sink with its link-layer header restored, and
///   handed to the transmit path.
///
/// The frame the tap was shown is never modified and the tap's reference to it is always released.
pub struct MirrorTap {
    host: Arc<dyn Transmit>,
    pool: Arc<dyn BufferPool>,
    state: RwLock<TapState>,
    counters: TapCounters,
}

impl std::fmt::Debug for MirrorTap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MirrorTap")
            .field("pool", &self.pool)
            .field("state", &self.state.try_read().map(|state| *state))
            .field("counters", &self.counters)
            .finish_non_exhaustive()
    }
}

impl MirrorTap {
    /// Create an inactive tap which sends duplicates through `host`, allocating them from `pool`.
    #[must_use]
    pub fn new(host: Arc<dyn Transmit>, pool: Arc<dyn BufferPool>) -> MirrorTap {
        MirrorTap {
            host,
            pool,
            state: RwLock::new(TapState::Unregistered),
            counters: TapCounters::default(),
        }
    }

    /// Start mirroring onto `sink`.
    #[tracing::instrument(level = "debug", skip(self))]
    pub fn activate(&self, sink: InterfaceIndex) {
        *self.state.write() = TapState::Active { sink };
        info!("mirroring onto interface {sink}");
    }

    /// Stop mirroring.
    ///
    /// Waits for observations in flight to finish: once this returns, no duplicate is submitted
    /// to the sink anymore.
    #[tracing::instrument(level = "debug", skip(self))]
    pub fn deactivate(&self) {
        let mut state = self.state.write();
        if let TapState::Active { sink } = *state {
            info!("no longer mirroring onto interface {sink}");
        }
        *state = TapState::Unregistered;
    }

    /// The current state.  May wait for an activation or deactivation in progress.
    #[must_use]
    pub fn state(&self) -> TapState {
        *self.state.read()
    }

    /// Read the tap counters.
    #[must_use]
    pub fn stats(&self) -> TapStats {
        self.counters.snapshot()
    }

    fn mirror(&self, frame: &FrameRef, source: InterfaceIndex, sink: InterfaceIndex) {
        if source == sink {
            trace!("not mirroring frame from the sink itself");
            bump(&self.counters.skipped_loop);
            return;
        }
        if !frame.is_shared() {
            trace!("not mirroring unshared frame from {source}");
            bump(&self.counters.skipped_exclusive);
            return;
        }
        let mut duplicate = match frame.try_copy(self.pool.as_ref()) {
            Ok(duplicate) => duplicate,
            Err(e) => {
                debug!("failed to duplicate frame from {source}: {e}");
                bump(&self.counters.duplication_failures);
                return;
            }
        };
        duplicate.set_dev(sink);
        if let Err(e) = duplicate.push_mac_header() {
            debug!("failed to restore link-layer header of frame from {source}: {e}");
            bump(&self.counters.duplication_failures);
            return;
        }
        let len = duplicate.len();
        match self.host.dev_transmit(duplicate) {
            XmitOutcome::Transmitted => {
                trace!("mirrored {len} bytes from {source}");
                bump(&self.counters.mirrored);
            }
            XmitOutcome::Dropped(reason) => {
                debug!("mirror of frame from {source} dropped: {reason}");
                bump(&self.counters.transmit_drops);
            }
        }
    }
}

impl PacketHook for MirrorTap {
    fn on_frame(
        &self,
        frame: FrameRef,
        source: InterfaceIndex,
        _destination: Option<InterfaceIndex>,
    ) -> Disposition {
        bump(&self.counters.observed);
        // never wait on the data path: a writer holds the lock only while (de)activating
        match self.state.try_read().as_deref() {
            Some(TapState::Active { sink }) => self.mirror(&frame, source, *sink),
            Some(TapState::Unregistered) | None => bump(&self.counters.skipped_inactive),
        }
        frame.release();
        Disposition::Consumed
    }
}

#[cfg(test)]
mod test {
    use crate::{MirrorTap, TapState, TapStats};
    use host::hook::{Disposition, PacketHook};
    use host::xmit::{DropReason, Transmit, XmitOutcome};
    use net::buffer::{BufferPool, HeapPool, LimitedPool};
    use net::frame::{Frame, FrameRef};
    use net::interface::InterfaceIndex;
    use parking_lot::Mutex;
    use pretty_assertions::assert_eq;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};
    use tracing_test::traced_test;

    /// A transmit path which keeps what it is given.
    #[derive(Default)]
    struct Wire {
        sent: Mutex<Vec<Frame>>,
        refuse: AtomicBool,
    }

    impl Transmit for Wire {
        fn dev_transmit(&self, frame: Frame) -> XmitOutcome {
            if self.refuse.load(Ordering::Relaxed) {
                let ifindex = frame.dev().unwrap();
                return XmitOutcome::Dropped(DropReason::DeviceDown(ifindex));
            }
            self.sent.lock().push(frame);
            XmitOutcome::Transmitted
        }
    }

    const SINK: InterfaceIndex = match InterfaceIndex::try_new(9) {
        Ok(ifindex) => ifindex,
        Err(_) => panic!(),
    };
    const ETH0: InterfaceIndex = match InterfaceIndex::try_new(2) {
        Ok(ifindex) => ifindex,
        Err(_) => panic!(),
    };

    fn wire_bytes(len: usize) -> Vec<u8> {
        let mut bytes = vec![0x02, 0, 0, 0, 0, 2, 0x02, 0, 0, 0, 0, 1, 0x86, 0xdd];
        bytes.extend((0..len - 14).map(|i| (i % 256) as u8));
        bytes
    }

    fn setup(pool: Arc<dyn BufferPool>) -> (Arc<Wire>, MirrorTap) {
        let wire = Arc::new(Wire::default());
        let tap = MirrorTap::new(wire.clone(), pool);
        tap.activate(SINK);
        (wire, tap)
    }

    /// Show a received frame to the tap while the "stack" keeps its own reference.
    fn observe(tap: &MirrorTap, bytes: &[u8], source: InterfaceIndex) -> FrameRef {
        let frame = FrameRef::new(Frame::received(bytes, source).unwrap());
        assert_eq!(tap.on_frame(frame.clone(), source, None), Disposition::Consumed);
        frame
    }

    #[test]
    fn exactly_one_duplicate_with_wire_bytes() {
        let (wire, tap) = setup(Arc::new(HeapPool::new()));
        let bytes = wire_bytes(100);
        let original = observe(&tap, &bytes, ETH0);
        let sent = wire.sent.lock();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].as_ref(), bytes.as_slice());
        assert_eq!(sent[0].len(), 100);
        assert_eq!(sent[0].dev(), Some(SINK));
        // the original is untouched and only the stack's reference is left
        assert_eq!(original.as_ref(), &bytes[14..]);
        assert_eq!(original.dev(), Some(ETH0));
        assert_eq!(original.users(), 1);
        assert_eq!(tap.stats().mirrored, 1);
    }

    #[test]
    fn mirrors_arbitrary_frames_verbatim() {
        bolero::check!().with_type::<Vec<u8>>().for_each(|tail| {
            let (wire, tap) = setup(Arc::new(HeapPool::new()));
            let mut bytes = wire_bytes(14);
            bytes.extend_from_slice(tail);
            let original = observe(&tap, &bytes, ETH0);
            let sent = wire.sent.lock();
            assert_eq!(sent.len(), 1);
            assert_eq!(sent[0].as_ref(), bytes.as_slice());
            assert_eq!(original.users(), 1);
        });
    }

    #[test]
    fn frames_from_the_sink_are_not_mirrored() {
        let (wire, tap) = setup(Arc::new(HeapPool::new()));
        let original = observe(&tap, &wire_bytes(100), SINK);
        assert!(wire.sent.lock().is_empty());
        assert_eq!(original.users(), 1);
        assert_eq!(tap.stats().skipped_loop, 1);
    }

    #[test]
    fn unshared_frames_are_not_mirrored() {
        let (wire, tap) = setup(Arc::new(HeapPool::new()));
        let frame = FrameRef::new(Frame::received(&wire_bytes(64), ETH0).unwrap());
        tap.on_frame(frame, ETH0, None);
        assert!(wire.sent.lock().is_empty());
        assert_eq!(tap.stats().skipped_exclusive, 1);
    }

    #[test]
    #[traced_test]
    fn duplication_failure_is_absorbed() {
        let (wire, tap) = setup(Arc::new(LimitedPool::exhausted()));
        let original = observe(&tap, &wire_bytes(100), ETH0);
        assert!(wire.sent.lock().is_empty());
        assert_eq!(original.users(), 1);
        assert_eq!(tap.stats().duplication_failures, 1);
        assert!(logs_contain("failed to duplicate frame"));
    }

    #[test]
    fn pool_budget_limits_duplicates() {
        let (wire, tap) = setup(Arc::new(LimitedPool::new(2)));
        for _ in 0..3 {
            observe(&tap, &wire_bytes(100), ETH0);
        }
        assert_eq!(wire.sent.lock().len(), 2);
        let stats = tap.stats();
        assert_eq!(stats.mirrored, 2);
        assert_eq!(stats.duplication_failures, 1);
    }

    #[test]
    fn transmit_drops_are_absorbed() {
        let (wire, tap) = setup(Arc::new(HeapPool::new()));
        wire.refuse.store(true, Ordering::Relaxed);
        let original = observe(&tap, &wire_bytes(100), ETH0);
        assert_eq!(original.users(), 1);
        assert_eq!(tap.stats().transmit_drops, 1);
        assert_eq!(tap.stats().mirrored, 0);
    }

    #[test]
    fn inactive_tap_only_observes() {
        let wire = Arc::new(Wire::default());
        let tap = MirrorTap::new(wire.clone(), Arc::new(HeapPool::new()));
        assert_eq!(tap.state(), TapState::Unregistered);
        observe(&tap, &wire_bytes(60), ETH0);
        tap.activate(SINK);
        assert_eq!(tap.state(), TapState::Active { sink: SINK });
        observe(&tap, &wire_bytes(60), ETH0);
        tap.deactivate();
        tap.deactivate();
        observe(&tap, &wire_bytes(60), ETH0);
        assert_eq!(wire.sent.lock().len(), 1);
        assert_eq!(
            tap.stats(),
            TapStats {
                observed: 3,
                mirrored: 1,
                skipped_inactive: 2,
                ..TapStats::default()
            }
        );
    }

    #[test]
    fn concurrent_observation_keeps_exact_counts() {
        const THREADS: usize = 4;
        const FRAMES: usize = 250;
        let (wire, tap) = setup(Arc::new(HeapPool::new()));
        std::thread::scope(|scope| {
            for thread in 0..THREADS {
                let tap = &tap;
                scope.spawn(move || {
                    for i in 0..FRAMES {
                        let source = if i % 5 == 0 { SINK } else { ETH0 };
                        observe(tap, &wire_bytes(64 + thread), source);
                    }
                });
            }
        });
        let stats = tap.stats();
        let total = (THREADS * FRAMES) as u64;
        assert_eq!(stats.observed, total);
        assert_eq!(stats.skipped_loop, total / 5);
        assert_eq!(stats.mirrored, total - total / 5);
        assert_eq!(stats.outcomes(), stats.observed);
        assert_eq!(wire.sent.lock().len() as u64, stats.mirrored);
    }

    #[test]
    fn deactivation_waits_for_nothing_when_idle() {
        let (_, tap) = setup(Arc::new(HeapPool::new()));
        tap.deactivate();
        assert_eq!(tap.state(), TapState::Unregistered);
    }
}
