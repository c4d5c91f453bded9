//! Frame-pacing decisions.
//!
//! [`FramePacing`] tracks the active frame slot and every condition that
//! triggers a swapchain rebuild, separate from the Vulkan handles so the
//! protocol itself can be exercised in tests:
//!
//! - the frame counter advances mod F only after a successful present;
//! - an out-of-date acquire skips the iteration entirely (no recording, no
//!   fence reset, no counter advance) and triggers exactly one rebuild;
//! - a suboptimal acquire draws the frame and rebuilds afterwards;
//! - a degenerate (zero-area) drawable parks the driver without attempting
//!   a rebuild until the area becomes usable again, then rebuilds once.

/// Result of acquiring a presentable image, as seen by the pacer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AcquireOutcome {
    /// An image was acquired; `suboptimal` flags a stale-but-usable chain.
    Acquired { image_index: u32, suboptimal: bool },
    /// The chain no longer matches the surface; nothing was acquired.
    OutOfDate,
}

/// What to do before acquiring, based on the drawable area and pending flags.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SurfaceGate {
    /// Zero-area drawable: render nothing, try again next iteration.
    Wait,
    /// A rebuild is pending and the drawable is usable: rebuild, then draw.
    RecreateFirst,
    /// Proceed straight to the fence wait and acquire.
    Proceed,
}

/// What to do after acquiring.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AcquireAction {
    /// Record and submit this frame against the given image.
    Draw { image_index: u32 },
    /// Abort the iteration and rebuild the chain.
    SkipAndRecreate,
}

/// Pure pacing state for F frames in flight.
#[derive(Debug)]
pub struct FramePacing {
    /// Number of concurrently outstanding frames (F >= 1).
    frames_in_flight: usize,
    /// Active frame slot, 0..F-1.
    current_frame: usize,
    /// A rebuild is owed (resize notification, suboptimal, out-of-date).
    recreate_requested: bool,
    /// The drawable area was seen degenerate and the chain may be stale.
    waiting_for_surface: bool,
    /// Completed rebuild episodes.
    recreations: u64,
}

impl FramePacing {
    /// Creates pacing state for `frames_in_flight` slots.
    ///
    /// # Panics
    ///
    /// Panics if `frames_in_flight` is zero; a pipeline with no slots cannot
    /// make progress.
    pub fn new(frames_in_flight: usize) -> Self {
        assert!(frames_in_flight >= 1, "at least one frame slot is required");
        Self {
            frames_in_flight,
            current_frame: 0,
            recreate_requested: false,
            waiting_for_surface: false,
            recreations: 0,
        }
    }

    /// Number of frame slots.
    #[inline]
    pub fn frames_in_flight(&self) -> usize {
        self.frames_in_flight
    }

    /// Index of the active frame slot.
    #[inline]
    pub fn current_frame(&self) -> usize {
        self.current_frame
    }

    /// Completed rebuild episodes.
    #[inline]
    pub fn recreations(&self) -> u64 {
        self.recreations
    }

    /// Records an external "surface changed" notification (e.g. a resize
    /// event). Consumed by the next [`SurfaceGate::RecreateFirst`].
    pub fn note_surface_changed(&mut self) {
        self.recreate_requested = true;
    }

    /// Gates the iteration on the drawable area and pending rebuild flags.
    ///
    /// A zero-area chain is invalid, so while the drawable is degenerate the
    /// driver parks here without attempting creation.
    pub fn gate(&mut self, drawable_width: u32, drawable_height: u32) -> SurfaceGate {
        if drawable_width == 0 || drawable_height == 0 {
            self.waiting_for_surface = true;
            return SurfaceGate::Wait;
        }

        if self.waiting_for_surface || self.recreate_requested {
            SurfaceGate::RecreateFirst
        } else {
            SurfaceGate::Proceed
        }
    }

    /// Decides whether to record this frame based on the acquire outcome.
    pub fn on_acquire(&mut self, outcome: AcquireOutcome) -> AcquireAction {
        match outcome {
            AcquireOutcome::Acquired {
                image_index,
                suboptimal,
            } => {
                if suboptimal {
                    // Usable this frame; rebuild after presentation
                    self.recreate_requested = true;
                }
                AcquireAction::Draw { image_index }
            }
            AcquireOutcome::OutOfDate => {
                self.recreate_requested = true;
                AcquireAction::SkipAndRecreate
            }
        }
    }

    /// Folds in the presentation result and advances the frame counter.
    ///
    /// Returns true when the chain should be rebuilt now.
    pub fn after_present(&mut self, present_needs_recreate: bool) -> bool {
        if present_needs_recreate {
            self.recreate_requested = true;
        }
        self.current_frame = (self.current_frame + 1) % self.frames_in_flight;
        self.recreate_requested
    }

    /// Marks a completed rebuild, clearing every pending trigger.
    pub fn mark_recreated(&mut self) {
        self.recreate_requested = false;
        self.waiting_for_surface = false;
        self.recreations += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Drives one successful iteration: acquire, draw, present.
    fn run_normal_iteration(pacing: &mut FramePacing, image_index: u32) {
        assert_eq!(pacing.gate(800, 600), SurfaceGate::Proceed);
        let action = pacing.on_acquire(AcquireOutcome::Acquired {
            image_index,
            suboptimal: false,
        });
        assert_eq!(action, AcquireAction::Draw { image_index });
        assert!(!pacing.after_present(false));
    }

    #[test]
    #[should_panic]
    fn test_zero_slots_is_rejected() {
        FramePacing::new(0);
    }

    #[test]
    fn test_counter_advances_mod_f() {
        for f in [1usize, 2, 3] {
            let mut pacing = FramePacing::new(f);
            for i in 0..(f * 3) {
                assert_eq!(pacing.current_frame(), i % f);
                run_normal_iteration(&mut pacing, 0);
            }
        }
    }

    #[test]
    fn test_out_of_date_acquire_skips_without_advancing() {
        let mut pacing = FramePacing::new(2);

        // Nine clean frames
        for i in 0..9 {
            run_normal_iteration(&mut pacing, i % 3);
        }
        let frame_before = pacing.current_frame();

        // Frame 10: acquisition reports the surface is stale
        assert_eq!(pacing.gate(800, 600), SurfaceGate::Proceed);
        let action = pacing.on_acquire(AcquireOutcome::OutOfDate);
        assert_eq!(action, AcquireAction::SkipAndRecreate);

        // The skipped iteration never advances the counter
        assert_eq!(pacing.current_frame(), frame_before);

        // The driver rebuilds exactly once
        pacing.mark_recreated();
        assert_eq!(pacing.recreations(), 1);

        // Frame 11 proceeds normally and the rebuild count stays put
        run_normal_iteration(&mut pacing, 0);
        assert_eq!(pacing.recreations(), 1);
        assert_eq!(pacing.current_frame(), (frame_before + 1) % 2);
    }

    #[test]
    fn test_suboptimal_acquire_draws_then_recreates() {
        let mut pacing = FramePacing::new(2);

        assert_eq!(pacing.gate(800, 600), SurfaceGate::Proceed);
        let action = pacing.on_acquire(AcquireOutcome::Acquired {
            image_index: 1,
            suboptimal: true,
        });
        // The frame is still drawn
        assert_eq!(action, AcquireAction::Draw { image_index: 1 });

        // ...and the rebuild happens after presentation
        assert!(pacing.after_present(false));
        pacing.mark_recreated();
        assert_eq!(pacing.recreations(), 1);
        // The presented frame still counted
        assert_eq!(pacing.current_frame(), 1);
    }

    #[test]
    fn test_present_out_of_date_triggers_recreate() {
        let mut pacing = FramePacing::new(2);

        assert_eq!(pacing.gate(800, 600), SurfaceGate::Proceed);
        pacing.on_acquire(AcquireOutcome::Acquired {
            image_index: 0,
            suboptimal: false,
        });
        assert!(pacing.after_present(true));
        pacing.mark_recreated();

        assert_eq!(pacing.gate(800, 600), SurfaceGate::Proceed);
    }

    #[test]
    fn test_degenerate_drawable_waits_then_recreates_once() {
        let mut pacing = FramePacing::new(2);

        // Minimized: poll without attempting chain creation
        for _ in 0..5 {
            assert_eq!(pacing.gate(0, 0), SurfaceGate::Wait);
        }
        assert_eq!(pacing.recreations(), 0);

        // Window restored: rebuild exactly once, then draw normally
        assert_eq!(pacing.gate(800, 600), SurfaceGate::RecreateFirst);
        pacing.mark_recreated();
        assert_eq!(pacing.recreations(), 1);

        run_normal_iteration(&mut pacing, 0);
        assert_eq!(pacing.recreations(), 1);
    }

    #[test]
    fn test_zero_width_or_height_alone_is_degenerate() {
        let mut pacing = FramePacing::new(2);
        assert_eq!(pacing.gate(0, 600), SurfaceGate::Wait);
        assert_eq!(pacing.gate(800, 0), SurfaceGate::Wait);
    }

    #[test]
    fn test_resize_notification_is_consumed_by_one_rebuild() {
        let mut pacing = FramePacing::new(2);

        pacing.note_surface_changed();
        assert_eq!(pacing.gate(1024, 768), SurfaceGate::RecreateFirst);
        pacing.mark_recreated();

        // Flag cleared: the next iteration proceeds straight through
        assert_eq!(pacing.gate(1024, 768), SurfaceGate::Proceed);
        assert_eq!(pacing.recreations(), 1);
    }
}
