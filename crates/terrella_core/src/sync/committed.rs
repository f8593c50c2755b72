//! # Committed Scene
//!
//! The only shared piece of scene state. The mutation thread publishes
//! snapshots here; the render thread pins one per frame.
//!
//! ## Architecture
//!
//! ```text
//!                    ┌──────────────────────────────┐
//!                    │        CommittedScene        │
//!                    │                              │
//!                    │  RwLock<Arc<SceneSnapshot>>  │
//!                    │  frames started / completed  │
//!                    │  retired -> released ids     │
//!                    └──────────────────────────────┘
//!                          ▲                 │
//!                  publish │                 │ begin_frame
//!              ┌───────────┴───┐     ┌───────▼──────┐
//!              │ Scene::apply  │     │  FrameGuard  │
//!              │ (mutation)    │     │  (render)    │
//!              └───────────────┘     └──────────────┘
//! ```
//!
//! ## Texture Retirement
//!
//! A texture removed at a moment when the renderer had started `S` frames is
//! released once `S + retire_frames` frames have completed. Frames are
//! numbered from 1 and complete in order, one at a time.

use std::ops::Deref;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use crate::identity::Identity;
use crate::scene::SceneSnapshot;

/// A texture waiting for the renderer to move past it.
#[derive(Clone, Copy, Debug)]
struct RetiredTexture {
    id: Identity,
    release_after: u64,
}

/// Shared, read-mostly view of the last committed scene generation.
#[derive(Debug)]
pub struct CommittedScene {
    /// The last fully applied snapshot.
    current: RwLock<Arc<SceneSnapshot>>,

    /// Number of frames begun by the renderer.
    frames_started: AtomicU64,

    /// Number of frames finished by the renderer.
    frames_completed: AtomicU64,

    /// Whether a frame guard is currently alive.
    frame_active: AtomicBool,

    /// Extra frames a removed texture is kept for.
    retire_frames: u64,

    /// Removed textures the renderer may still be drawing.
    retired: Mutex<Vec<RetiredTexture>>,

    /// Textures the renderer may now free.
    released: Mutex<Vec<Identity>>,
}

impl CommittedScene {
    /// Creates a committed scene holding an empty snapshot.
    ///
    /// # Arguments
    ///
    /// * `retire_frames` - Completed frames to wait, after the last frame
    ///   that could see a removed texture, before releasing it
    #[must_use]
    pub fn new(retire_frames: u64) -> Arc<Self> {
        Arc::new(Self {
            current: RwLock::new(Arc::new(SceneSnapshot::default())),
            frames_started: AtomicU64::new(0),
            frames_completed: AtomicU64::new(0),
            frame_active: AtomicBool::new(false),
            retire_frames,
            retired: Mutex::new(Vec::new()),
            released: Mutex::new(Vec::new()),
        })
    }

    /// Returns the last committed snapshot.
    #[inline]
    #[must_use]
    pub fn snapshot(&self) -> Arc<SceneSnapshot> {
        Arc::clone(&self.current.read())
    }

    /// Generation of the last committed snapshot.
    #[inline]
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.current.read().generation()
    }

    /// Number of frames begun so far.
    #[inline]
    #[must_use]
    pub fn frames_started(&self) -> u64 {
        self.frames_started.load(Ordering::Acquire)
    }

    /// Number of frames completed so far.
    #[inline]
    #[must_use]
    pub fn frames_completed(&self) -> u64 {
        self.frames_completed.load(Ordering::Acquire)
    }

    /// Whether a frame is in flight.
    #[inline]
    #[must_use]
    pub fn is_frame_active(&self) -> bool {
        self.frame_active.load(Ordering::Acquire)
    }

    /// Number of textures retired but not yet released.
    #[must_use]
    pub fn retired_count(&self) -> usize {
        self.retired.lock().len()
    }

    /// Pins the committed snapshot for one frame.
    ///
    /// # Panics
    ///
    /// Panics if another frame is still in flight (only one allowed).
    #[must_use]
    pub fn begin_frame(self: &Arc<Self>) -> FrameGuard {
        let was_active = self.frame_active.swap(true, Ordering::AcqRel);
        assert!(!was_active, "Double frame! Only one frame may be in flight at a time.");

        // Counted under the read lock, so a publish either sees this frame
        // or this frame sees the published snapshot.
        let current = self.current.read();
        let number = self.frames_started.fetch_add(1, Ordering::AcqRel) + 1;
        let snapshot = Arc::clone(&current);
        drop(current);

        FrameGuard {
            scene: Arc::clone(self),
            snapshot,
            number,
        }
    }

    /// Takes the textures that are now safe to free.
    #[must_use]
    pub fn drain_released(&self) -> Vec<Identity> {
        std::mem::take(&mut *self.released.lock())
    }

    /// Installs a new snapshot and retires the textures it dropped.
    pub(crate) fn publish(&self, snapshot: Arc<SceneSnapshot>, removed_textures: Vec<Identity>) {
        let started = {
            let mut current = self.current.write();
            *current = snapshot;
            // Any frame not counted here pins the new snapshot.
            self.frames_started.load(Ordering::Acquire)
        };

        if removed_textures.is_empty() {
            return;
        }

        let release_after = started + self.retire_frames;
        self.retired.lock().extend(
            removed_textures
                .into_iter()
                .map(|id| RetiredTexture { id, release_after }),
        );
        self.sweep(self.frames_completed());
    }

    /// Releases every retired texture at once. Used at teardown, when the
    /// renderer has stopped drawing from this scene.
    pub(crate) fn release_all(&self) {
        let drained: Vec<_> = self.retired.lock().drain(..).map(|t| t.id).collect();
        self.released.lock().extend(drained);
    }

    fn end_frame(&self, number: u64) {
        self.frames_completed.store(number, Ordering::Release);
        self.frame_active.store(false, Ordering::Release);
        self.sweep(number);
    }

    fn sweep(&self, completed: u64) {
        let mut retired = self.retired.lock();
        if retired.is_empty() {
            return;
        }
        let mut ready = Vec::new();
        retired.retain(|t| {
            if t.release_after <= completed {
                ready.push(t.id);
                false
            } else {
                true
            }
        });
        drop(retired);

        if !ready.is_empty() {
            tracing::debug!("Releasing {} retired textures after frame {}", ready.len(), completed);
            self.released.lock().extend(ready);
        }
    }
}

/// One frame's pinned view of the scene.
///
/// Dropping the guard marks the frame completed.
///
/// ## Usage
///
/// ```rust,ignore
/// let frame = committed.begin_frame();
/// for (id, entry) in frame.iter_enabled() {
///     draw(id, &entry.object);
/// }
/// drop(frame); // frame completed
///
/// for id in committed.drain_released() {
///     gpu.free_texture(id);
/// }
/// ```
#[derive(Debug)]
pub struct FrameGuard {
    scene: Arc<CommittedScene>,
    snapshot: Arc<SceneSnapshot>,
    number: u64,
}

impl FrameGuard {
    /// The frame number, starting at 1.
    #[inline]
    #[must_use]
    pub fn number(&self) -> u64 {
        self.number
    }

    /// The pinned snapshot.
    #[inline]
    #[must_use]
    pub fn snapshot(&self) -> &Arc<SceneSnapshot> {
        &self.snapshot
    }
}

impl Deref for FrameGuard {
    type Target = SceneSnapshot;

    #[inline]
    fn deref(&self) -> &Self::Target {
        &self.snapshot
    }
}

impl Drop for FrameGuard {
    fn drop(&mut self) {
        self.scene.end_frame(self.number);
    }
}
