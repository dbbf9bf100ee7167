//! The occlusion-query round trip.
//!
//! A query issued while slot `i` is current resolves into slot `i`'s
//! readback buffer inside the same command buffer, but the resolve is a
//! GPU operation: the value only becomes CPU-readable once that
//! submission's fence has signaled. Reading it the same frame would mean
//! blocking on the resolve, defeating the CPU/GPU overlap the slot set
//! exists to provide. Instead, while recording slot `i` the scheduler
//! reads the result of the *previous* slot's last query, which the prior
//! cycle's fence wait already covers. Results therefore lag the issuing
//! frame by one full scheduling cycle.
//!
//! [`OcclusionTracker`] is the pure bookkeeping half: it tracks each
//! slot's position in the {Idle, Recording, Resolved, Read} cycle and
//! never hands out a slot for reading unless its resolve has materially
//! completed. The GPU half (reset / begin / end / copy-results) is
//! recorded by the scheduler through `cadence_rhi`.

use tracing::trace;

/// Lifecycle of one slot's query.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum QueryPhase {
    /// No query issued yet, or the slot was recycled.
    Idle,
    /// The query's begin/end has been recorded this cycle; the resolve is
    /// in the same command buffer.
    Recording,
    /// The resolve's submission fence has signaled; the readback buffer
    /// holds a valid result.
    Resolved,
    /// The result was consumed by a later cycle.
    Read,
}

/// Per-slot query bookkeeping for the frame pipeline.
#[derive(Debug)]
pub struct OcclusionTracker {
    phases: Vec<QueryPhase>,
    /// Most recently consumed sample count.
    last_samples: Option<u64>,
}

impl OcclusionTracker {
    /// Creates a tracker for `slot_count` frame slots.
    ///
    /// # Panics
    ///
    /// Panics if `slot_count` is zero.
    pub fn new(slot_count: usize) -> Self {
        assert!(slot_count > 0, "tracker needs at least one slot");
        Self {
            phases: vec![QueryPhase::Idle; slot_count],
            last_samples: None,
        }
    }

    /// Returns the number of tracked slots.
    #[inline]
    pub fn slot_count(&self) -> usize {
        self.phases.len()
    }

    /// Returns the phase of the given slot.
    #[inline]
    pub fn phase(&self, slot: usize) -> QueryPhase {
        self.phases[slot]
    }

    /// Returns the cyclically previous slot index.
    #[inline]
    pub fn previous_index(&self, current: usize) -> usize {
        (current + self.phases.len() - 1) % self.phases.len()
    }

    /// Marks the slot's query as being re-issued this cycle.
    ///
    /// Valid from any phase: a reset is recorded before the begin, which
    /// restarts the cycle whether or not the prior result was ever read
    /// (an unread result is simply dropped).
    pub fn begin_recording(&mut self, slot: usize) {
        trace!(slot, from = ?self.phases[slot], "query recording");
        self.phases[slot] = QueryPhase::Recording;
    }

    /// Marks the slot's resolve as materially complete.
    ///
    /// Call after the fence of the submission carrying the resolve has
    /// been observed signaled.
    pub fn mark_resolved(&mut self, slot: usize) {
        debug_assert_eq!(self.phases[slot], QueryPhase::Recording);
        self.phases[slot] = QueryPhase::Resolved;
    }

    /// Returns the slot whose result should be read while recording
    /// `current`, if one is available.
    ///
    /// This is always the cyclically previous index, and only when that
    /// slot's query has reached [`QueryPhase::Resolved`]. On the first
    /// cycle (or after an out-of-order acquire leaves the previous slot
    /// mid-flight) there is nothing safe to read and `None` is returned.
    pub fn poll_previous(&self, current: usize) -> Option<usize> {
        let prev = self.previous_index(current);
        (self.phases[prev] == QueryPhase::Resolved).then_some(prev)
    }

    /// Records the sample count read back from `slot` and retires its
    /// result.
    pub fn mark_read(&mut self, slot: usize, samples: u64) {
        debug_assert_eq!(self.phases[slot], QueryPhase::Resolved);
        self.phases[slot] = QueryPhase::Read;
        self.last_samples = Some(samples);
    }

    /// Returns the most recently consumed sample count, if any.
    #[inline]
    pub fn last_samples(&self) -> Option<u64> {
        self.last_samples
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_state_has_nothing_to_read() {
        let tracker = OcclusionTracker::new(2);
        assert_eq!(tracker.poll_previous(0), None);
        assert_eq!(tracker.poll_previous(1), None);
        assert_eq!(tracker.last_samples(), None);
    }

    #[test]
    fn test_previous_index_wraps() {
        let tracker = OcclusionTracker::new(2);
        assert_eq!(tracker.previous_index(0), 1);
        assert_eq!(tracker.previous_index(1), 0);

        let tracker = OcclusionTracker::new(3);
        assert_eq!(tracker.previous_index(0), 2);
        assert_eq!(tracker.previous_index(2), 1);
    }

    #[test]
    fn test_result_lags_one_full_cycle() {
        // Mock GPU: hands out a distinct counter value per resolve.
        let mut tracker = OcclusionTracker::new(2);
        let mut resolve_counter = 0u64;
        let mut readback = [0u64; 2];

        // Frame 0 on slot 0: nothing to read yet.
        assert_eq!(tracker.poll_previous(0), None);
        tracker.begin_recording(0);
        resolve_counter += 1;
        readback[0] = resolve_counter;
        tracker.mark_resolved(0);

        // Frame 1 on slot 1: reads slot 0's frame-0 result.
        let prev = tracker.poll_previous(1).expect("slot 0 resolved");
        assert_eq!(prev, 0);
        tracker.mark_read(prev, readback[prev]);
        assert_eq!(tracker.last_samples(), Some(1));
        tracker.begin_recording(1);
        resolve_counter += 1;
        readback[1] = resolve_counter;
        tracker.mark_resolved(1);

        // Frame 2 on slot 0: reads slot 1's frame-1 result, never its own
        // in-progress one.
        let prev = tracker.poll_previous(0).expect("slot 1 resolved");
        assert_eq!(prev, 1);
        tracker.mark_read(prev, readback[prev]);
        assert_eq!(tracker.last_samples(), Some(2));
    }

    #[test]
    fn test_ten_frame_scenario_reads_frame_nine_resolve() {
        // Drive ten frames; the value read during frame k must equal the
        // value resolved at the end of frame k-1.
        let mut tracker = OcclusionTracker::new(2);
        let mut readback = [0u64; 2];

        for frame in 1..=10u64 {
            let slot = ((frame - 1) % 2) as usize;

            if let Some(prev) = tracker.poll_previous(slot) {
                tracker.mark_read(prev, readback[prev]);
                assert_eq!(
                    tracker.last_samples(),
                    Some(frame - 1),
                    "frame {frame} must read the frame {} resolve",
                    frame - 1
                );
            } else {
                assert_eq!(frame, 1, "only the first frame has nothing to read");
            }

            tracker.begin_recording(slot);
            readback[slot] = frame;
            tracker.mark_resolved(slot);
        }

        assert_eq!(tracker.last_samples(), Some(9));
    }

    #[test]
    fn test_unread_result_is_dropped_on_reuse() {
        let mut tracker = OcclusionTracker::new(2);

        tracker.begin_recording(0);
        tracker.mark_resolved(0);

        // Slot 0 comes around again without anyone reading its result.
        tracker.begin_recording(0);
        assert_eq!(tracker.phase(0), QueryPhase::Recording);
        assert_eq!(tracker.poll_previous(1), None);
        assert_eq!(tracker.last_samples(), None);
    }

    #[test]
    fn test_unresolved_previous_slot_yields_none() {
        let mut tracker = OcclusionTracker::new(2);

        // Slot 1 is mid-recording (e.g. out-of-order acquire); slot 0 must
        // not be offered a stale or in-flight result.
        tracker.begin_recording(1);
        assert_eq!(tracker.poll_previous(0), None);
    }
}
