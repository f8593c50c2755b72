//! # Render Driver
//!
//! The render-thread side of the controller. The platform calls
//! [`RenderDriver::on_frame_start`] once per display refresh; the driver
//! decides whether this refresh gets a frame, pins a committed snapshot,
//! hands it to the [`RenderBackend`], then frees textures the scene has
//! retired.
//!
//! ```text
//!   refresh ──> on_frame_start ──skip?──> return
//!                     │
//!                     ▼
//!               begin_frame (pin snapshot)
//!                     │
//!                     ▼
//!               backend.draw ──> end frame ──> release retired textures
//! ```

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use terrella_core::{CommittedScene, FrameGuard, Identity, Point3d};

use crate::view::MapView;

/// What the driver needs from a GPU renderer.
pub trait RenderBackend: Send {
    /// Draws one frame from the pinned snapshot.
    fn draw(&mut self, frame: &FrameGuard, view: Point3d);

    /// Frees the GPU copy of a texture. The id will not be drawn again.
    fn release_texture(&mut self, id: Identity);

    /// Backend-side statistics interval. 0 turns it off.
    fn set_perf_interval(&mut self, interval: u32);
}

/// Render settings shared between the controller and its driver.
#[derive(Debug)]
pub struct RenderSettings {
    frame_interval: AtomicU32,
    perf_interval: AtomicU32,
}

impl RenderSettings {
    /// Creates settings. A frame interval of 0 is treated as 1.
    #[must_use]
    pub fn new(frame_interval: u32, perf_interval: u32) -> Self {
        Self {
            frame_interval: AtomicU32::new(frame_interval.max(1)),
            perf_interval: AtomicU32::new(perf_interval),
        }
    }

    /// Render every Nth refresh.
    #[inline]
    #[must_use]
    pub fn frame_interval(&self) -> u32 {
        self.frame_interval.load(Ordering::Relaxed)
    }

    /// Sets the frame interval. 0 is treated as 1.
    pub fn set_frame_interval(&self, interval: u32) {
        self.frame_interval.store(interval.max(1), Ordering::Relaxed);
    }

    /// Log statistics every N rendered frames. 0 is off.
    #[inline]
    #[must_use]
    pub fn perf_interval(&self) -> u32 {
        self.perf_interval.load(Ordering::Relaxed)
    }

    /// Sets the perf interval.
    pub fn set_perf_interval(&self, interval: u32) {
        self.perf_interval.store(interval, Ordering::Relaxed);
    }
}

/// Render statistics.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RenderStats {
    /// Refresh notifications received.
    pub notifications: u64,
    /// Frames rendered.
    pub frames_rendered: u64,
    /// Textures released to the backend.
    pub textures_released: u64,
    /// Slowest frame so far (microseconds).
    pub worst_frame_us: u64,
}

/// Accumulator for one perf logging window.
#[derive(Debug, Default)]
struct PerfWindow {
    frames: u32,
    busy: Duration,
}

/// Drives a [`RenderBackend`] from refresh notifications.
pub struct RenderDriver<B: RenderBackend> {
    backend: B,
    scene: Arc<CommittedScene>,
    view: Arc<MapView>,
    settings: Arc<RenderSettings>,
    /// Refreshes skipped since the last rendered frame.
    skipped: u32,
    /// Perf interval last forwarded to the backend.
    forwarded_perf_interval: u32,
    window: PerfWindow,
    stats: RenderStats,
}

impl<B: RenderBackend> std::fmt::Debug for RenderDriver<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenderDriver")
            .field("settings", &self.settings)
            .field("stats", &self.stats)
            .finish_non_exhaustive()
    }
}

impl<B: RenderBackend> RenderDriver<B> {
    /// Binds `backend` to a scene and view.
    ///
    /// The backend gets the current perf interval straight away.
    pub fn new(
        mut backend: B,
        scene: Arc<CommittedScene>,
        view: Arc<MapView>,
        settings: Arc<RenderSettings>,
    ) -> Self {
        let perf_interval = settings.perf_interval();
        backend.set_perf_interval(perf_interval);
        Self {
            backend,
            scene,
            view,
            settings,
            skipped: 0,
            forwarded_perf_interval: perf_interval,
            window: PerfWindow::default(),
            stats: RenderStats::default(),
        }
    }

    /// Refresh notification. Renders every `frame_interval`-th call and
    /// returns whether it did.
    pub fn on_frame_start(&mut self) -> bool {
        self.stats.notifications += 1;
        self.skipped += 1;
        if self.skipped < self.settings.frame_interval() {
            return false;
        }
        self.skipped = 0;
        self.render_frame();
        true
    }

    /// Renders one frame now, ignoring the frame interval.
    ///
    /// # Panics
    ///
    /// Panics if called while the same scene already has a frame in flight.
    pub fn render_frame(&mut self) {
        self.sync_perf_interval();

        let started = Instant::now();
        {
            let frame = self.scene.begin_frame();
            self.backend.draw(&frame, self.view.position());
        }
        for id in self.scene.drain_released() {
            self.backend.release_texture(id);
            self.stats.textures_released += 1;
        }
        let elapsed = started.elapsed();

        self.stats.frames_rendered += 1;
        let elapsed_us = u64::try_from(elapsed.as_micros()).unwrap_or(u64::MAX);
        self.stats.worst_frame_us = self.stats.worst_frame_us.max(elapsed_us);
        self.record_perf(elapsed);
    }

    fn sync_perf_interval(&mut self) {
        let wanted = self.settings.perf_interval();
        if wanted != self.forwarded_perf_interval {
            self.backend.set_perf_interval(wanted);
            self.forwarded_perf_interval = wanted;
            self.window = PerfWindow::default();
        }
    }

    fn record_perf(&mut self, elapsed: Duration) {
        let interval = self.forwarded_perf_interval;
        if interval == 0 {
            return;
        }
        self.window.frames += 1;
        self.window.busy += elapsed;
        if self.window.frames >= interval {
            let snapshot = self.scene.snapshot();
            tracing::info!(
                "Rendered {} frames: avg {:?}/frame, generation {}, {} objects, {} textures, {} retired",
                self.window.frames,
                self.window.busy / self.window.frames,
                snapshot.generation(),
                snapshot.object_count(),
                snapshot.texture_count(),
                self.scene.retired_count()
            );
            self.window = PerfWindow::default();
        }
    }

    /// Statistics so far.
    #[must_use]
    pub fn stats(&self) -> RenderStats {
        self.stats
    }

    /// The backend.
    #[must_use]
    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// The backend, mutably.
    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct CountingBackend {
        draws: u32,
        perf: Vec<u32>,
    }

    impl RenderBackend for CountingBackend {
        fn draw(&mut self, _frame: &FrameGuard, _view: Point3d) {
            self.draws += 1;
        }

        fn release_texture(&mut self, _id: Identity) {}

        fn set_perf_interval(&mut self, interval: u32) {
            self.perf.push(interval);
        }
    }

    fn driver(frame_interval: u32) -> RenderDriver<CountingBackend> {
        RenderDriver::new(
            CountingBackend::default(),
            CommittedScene::new(2),
            Arc::new(MapView::default()),
            Arc::new(RenderSettings::new(frame_interval, 0)),
        )
    }

    #[test]
    fn test_frame_interval() {
        let mut every_other = driver(2);
        let rendered: Vec<bool> = (0..6).map(|_| every_other.on_frame_start()).collect();
        assert_eq!(rendered, vec![false, true, false, true, false, true]);
        assert_eq!(every_other.backend().draws, 3);

        let mut every = driver(1);
        assert!((0..5).all(|_| every.on_frame_start()));
        assert_eq!(every.stats().frames_rendered, 5);
    }

    #[test]
    fn test_zero_interval_means_every_frame() {
        let settings = RenderSettings::new(0, 0);
        assert_eq!(settings.frame_interval(), 1);
        settings.set_frame_interval(0);
        assert_eq!(settings.frame_interval(), 1);
    }

    #[test]
    fn test_perf_interval_forwarded_on_change() {
        let mut d = driver(1);
        d.render_frame();
        d.settings.set_perf_interval(30);
        d.render_frame();
        d.render_frame();
        assert_eq!(d.backend().perf, vec![0, 30]);
    }
}
