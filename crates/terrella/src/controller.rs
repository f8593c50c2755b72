//! # Map Controller
//!
//! The public face of the engine. Every method may be called from any
//! thread and returns without waiting for the scene.
//!
//! ## Task Flow
//!
//! ```text
//!   caller ──> MapController::add_vectors ──> ComponentObject (returned now)
//!                       │
//!                       ├── on mutation thread? run inline
//!                       └── otherwise queue a task
//!                                   │
//!                                   ▼
//!                        lock MutationContext
//!                        build ChangeSet ──> commit (one generation)
//!                        record ids in the ComponentObject
//! ```
//!
//! A task that fails logs a warning, discards its batch and leaves the
//! queue running.

use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use terrella_core::{ChangeSet, CommittedScene, Point2d, Point3d, TerrellaError, TerrellaResult};

use crate::component::ComponentObject;
use crate::config::ControllerConfig;
use crate::context::MutationContext;
use crate::input::{GestureHandler, TouchEvent};
use crate::manager::{
    FeatureKind, LabelInfo, LabelKind, MarkerInfo, MarkerKind, ScreenLabel, ScreenMarker,
    VectorInfo, VectorKind, VectorObject,
};
use crate::render::{RenderBackend, RenderDriver, RenderSettings};
use crate::thread::{MutationThread, MutationThreadStats};
use crate::view::{MapView, ViewExtents};

/// Thread-safe entry point for adding, toggling and removing map content.
///
/// Share it between threads behind an `Arc`. Dropping the last reference
/// shuts it down.
pub struct MapController {
    config: ControllerConfig,
    thread: MutationThread,
    /// Locked by tasks running on `thread`, and by shutdown once it stopped.
    context: Arc<Mutex<MutationContext>>,
    committed: Arc<CommittedScene>,
    view: Arc<MapView>,
    render: Arc<RenderSettings>,
    gestures: RwLock<Option<Arc<dyn GestureHandler>>>,
}

impl std::fmt::Debug for MapController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MapController")
            .field("config", &self.config)
            .field("thread", &self.thread)
            .field("generation", &self.committed.generation())
            .finish_non_exhaustive()
    }
}

impl MapController {
    /// Validates `config`, creates the scene and starts the mutation thread.
    ///
    /// # Errors
    ///
    /// * [`TerrellaError::InvalidConfig`] if `config` fails validation
    /// * [`TerrellaError::ThreadSpawn`] if the thread cannot be started
    pub fn new(config: ControllerConfig) -> TerrellaResult<Self> {
        config.validate()?;

        let context = MutationContext::new(&config);
        let committed = context.committed();
        let thread = MutationThread::spawn(config.thread_name.clone())?;

        tracing::info!(
            "Map controller started (frame interval {}, retire after {} frames, {} textures max)",
            config.frame_interval,
            config.texture_retire_frames,
            config.max_textures
        );

        Ok(Self {
            render: Arc::new(RenderSettings::new(config.frame_interval, config.perf_interval)),
            view: Arc::new(MapView::default()),
            gestures: RwLock::new(None),
            context: Arc::new(Mutex::new(context)),
            committed,
            thread,
            config,
        })
    }

    /// A controller with [`ControllerConfig::default`].
    ///
    /// # Errors
    ///
    /// Returns [`TerrellaError::ThreadSpawn`] if the thread cannot be started.
    pub fn with_defaults() -> TerrellaResult<Self> {
        Self::new(ControllerConfig::default())
    }

    /// Panics if the controller has been shut down.
    fn assert_running(&self) {
        assert!(self.thread.is_running(), "MapController used after shutdown!");
    }

    /// Runs `work` against the mutation context, inline when already on
    /// the mutation thread. Returns `false` if the thread refused it.
    fn submit<F>(&self, what: &'static str, work: F) -> bool
    where
        F: FnOnce(&mut MutationContext) -> TerrellaResult<()> + Send + 'static,
    {
        let context = Arc::clone(&self.context);
        let owner = self.thread.thread_id();
        let task = move || {
            debug_assert_eq!(
                std::thread::current().id(),
                owner,
                "Scene mutated off the mutation thread!"
            );
            let mut context = context.lock();
            if let Err(e) = work(&mut context) {
                tracing::warn!("{} failed: {}", what, e);
            }
        };
        match self.thread.run_or_enqueue(task) {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!("{} dropped: {}", what, e);
                false
            }
        }
    }

    /// The configuration in effect.
    #[must_use]
    pub fn config(&self) -> &ControllerConfig {
        &self.config
    }

    // ========================================================================
    // Content
    // ========================================================================

    /// Adds one batch of features of kind `K` as one scene object.
    ///
    /// Returns at once. The returned handle fills in when the mutation
    /// thread gets to the batch. A malformed batch is logged and leaves the
    /// handle empty.
    ///
    /// # Panics
    ///
    /// Panics after [`MapController::shutdown`].
    pub fn add_features<K: FeatureKind>(
        &self,
        features: Vec<K::Feature>,
        style: K::Style,
    ) -> ComponentObject {
        self.assert_running();
        self.submit_add::<K>(features, style)
    }

    fn submit_add<K: FeatureKind>(
        &self,
        features: Vec<K::Feature>,
        style: K::Style,
    ) -> ComponentObject {
        let component = ComponentObject::new();
        let handle = component.clone();
        let queued = self.submit("add features", move |context| {
            context.add_features::<K>(&features, &style, &handle)
        });
        // Shutdown won the race; the add will never run.
        if !queued {
            component.mark_live(true);
        }
        component
    }

    /// Adds linear and areal vectors.
    pub fn add_vectors(&self, vectors: Vec<VectorObject>, info: VectorInfo) -> ComponentObject {
        self.add_features::<VectorKind>(vectors, info)
    }

    /// Adds a single vector object.
    pub fn add_vector(&self, vector: VectorObject, info: VectorInfo) -> ComponentObject {
        self.add_vectors(vec![vector], info)
    }

    /// Adds screen markers. Markers sharing an image share one texture.
    pub fn add_screen_markers(
        &self,
        markers: Vec<ScreenMarker>,
        info: MarkerInfo,
    ) -> ComponentObject {
        self.add_features::<MarkerKind>(markers, info)
    }

    /// Adds a single screen marker.
    pub fn add_screen_marker(&self, marker: ScreenMarker, info: MarkerInfo) -> ComponentObject {
        self.add_screen_markers(vec![marker], info)
    }

    /// Adds screen labels.
    pub fn add_screen_labels(&self, labels: Vec<ScreenLabel>, info: LabelInfo) -> ComponentObject {
        self.add_features::<LabelKind>(labels, info)
    }

    /// Adds a single screen label.
    pub fn add_screen_label(&self, label: ScreenLabel, info: LabelInfo) -> ComponentObject {
        self.add_screen_labels(vec![label], info)
    }

    /// Shows every object of every handle, as one generation.
    ///
    /// # Panics
    ///
    /// Panics after [`MapController::shutdown`].
    pub fn enable_objects(&self, objects: &[ComponentObject]) {
        self.set_enabled(objects, true);
    }

    /// Hides every object of every handle, as one generation.
    ///
    /// # Panics
    ///
    /// Panics after [`MapController::shutdown`].
    pub fn disable_objects(&self, objects: &[ComponentObject]) {
        self.set_enabled(objects, false);
    }

    fn set_enabled(&self, objects: &[ComponentObject], enabled: bool) {
        self.assert_running();
        if objects.is_empty() {
            return;
        }
        let objects = objects.to_vec();
        let what = if enabled { "enable objects" } else { "disable objects" };
        let _ = self.submit(what, move |context| {
            let mut changes = ChangeSet::new();
            for object in &objects {
                object.enable(context, enabled, &mut changes)?;
            }
            context.commit(changes).map(|_| ())
        });
    }

    /// Removes the objects of one handle.
    ///
    /// # Panics
    ///
    /// Panics after [`MapController::shutdown`].
    pub fn remove_object(&self, object: &ComponentObject) {
        self.remove_objects(std::slice::from_ref(object));
    }

    /// Removes the objects of every handle, as one generation. Handles that
    /// were already removed contribute nothing.
    ///
    /// # Panics
    ///
    /// Panics after [`MapController::shutdown`].
    pub fn remove_objects(&self, objects: &[ComponentObject]) {
        self.assert_running();
        if objects.is_empty() {
            return;
        }
        let objects = objects.to_vec();
        let _ = self.submit("remove objects", move |context| context.remove_components(&objects));
    }

    // ========================================================================
    // Tasks
    // ========================================================================

    /// Queues arbitrary work on the mutation thread.
    ///
    /// The task may call back into the controller; those calls run inline.
    ///
    /// # Errors
    ///
    /// Returns [`TerrellaError::InvalidState`] if shutdown raced this call.
    ///
    /// # Panics
    ///
    /// Panics after [`MapController::shutdown`].
    pub fn add_task<F>(&self, task: F) -> TerrellaResult<()>
    where
        F: FnOnce() + Send + 'static,
    {
        self.assert_running();
        self.thread.add_task(task)
    }

    /// Blocks until everything queued so far has run.
    ///
    /// Unlike the other entry points this does not panic after shutdown,
    /// since everything queued has then already run.
    ///
    /// # Errors
    ///
    /// Returns [`TerrellaError::InvalidState`] after shutdown.
    pub fn flush(&self) -> TerrellaResult<()> {
        self.thread.flush()
    }

    /// True when called from the mutation thread.
    #[must_use]
    pub fn is_on_mutation_thread(&self) -> bool {
        self.thread.running_on_this_thread()
    }

    /// Mutation thread statistics.
    #[must_use]
    pub fn thread_stats(&self) -> MutationThreadStats {
        self.thread.stats()
    }

    // ========================================================================
    // View and rendering
    // ========================================================================

    /// Reader handle on the committed scene.
    #[must_use]
    pub fn scene(&self) -> Arc<CommittedScene> {
        Arc::clone(&self.committed)
    }

    /// The view.
    #[must_use]
    pub fn view(&self) -> Arc<MapView> {
        Arc::clone(&self.view)
    }

    /// Jumps the view to `(x, y, z)`, cancelling any animation. Returns the
    /// position after clamping to the view extents.
    ///
    /// # Errors
    ///
    /// Returns [`TerrellaError::InvalidArgument`] for non-finite input.
    ///
    /// # Panics
    ///
    /// Panics after [`MapController::shutdown`].
    pub fn set_position(&self, x: f64, y: f64, z: f64) -> TerrellaResult<Point3d> {
        self.assert_running();
        self.view.cancel_animation();
        self.view.set_position(Point3d::new(x, y, z))
    }

    /// Restricts the view to a box. An `ll.x` east of `ur.x` wraps across
    /// the antimeridian.
    ///
    /// # Errors
    ///
    /// Returns [`TerrellaError::InvalidArgument`] for malformed extents.
    ///
    /// # Panics
    ///
    /// Panics after [`MapController::shutdown`].
    pub fn set_view_extents(&self, ll: Point2d, ur: Point2d) -> TerrellaResult<()> {
        self.assert_running();
        self.view.set_extents(ViewExtents::new(ll, ur)?);
        Ok(())
    }

    /// Logs render statistics every `interval` frames. 0 turns it off.
    /// Reaches an attached renderer on its next frame.
    ///
    /// # Panics
    ///
    /// Panics after [`MapController::shutdown`].
    pub fn set_perf_interval(&self, interval: u32) {
        self.assert_running();
        self.render.set_perf_interval(interval);
        tracing::debug!("Perf interval set to {}", interval);
    }

    /// Renders on every `interval`-th refresh.
    ///
    /// # Errors
    ///
    /// Returns [`TerrellaError::InvalidArgument`] for 0.
    ///
    /// # Panics
    ///
    /// Panics after [`MapController::shutdown`].
    pub fn set_frame_interval(&self, interval: u32) -> TerrellaResult<()> {
        self.assert_running();
        if interval == 0 {
            return Err(TerrellaError::InvalidArgument(
                "frame interval must be at least 1".to_string(),
            ));
        }
        self.render.set_frame_interval(interval);
        Ok(())
    }

    /// The platform surface is ready: binds `backend` to this controller's
    /// scene, view and render settings.
    ///
    /// # Panics
    ///
    /// Panics after [`MapController::shutdown`].
    pub fn surface_created<B: RenderBackend>(&self, backend: B) -> RenderDriver<B> {
        self.assert_running();
        tracing::info!(
            "Render surface attached at scene generation {}",
            self.committed.generation()
        );
        RenderDriver::new(
            backend,
            Arc::clone(&self.committed),
            Arc::clone(&self.view),
            Arc::clone(&self.render),
        )
    }

    /// Installs the handler that receives touches.
    ///
    /// # Panics
    ///
    /// Panics after [`MapController::shutdown`].
    pub fn set_gesture_handler(&self, handler: Arc<dyn GestureHandler>) {
        self.assert_running();
        *self.gestures.write() = Some(handler);
    }

    /// Forwards a touch to the gesture handler. Returns whether it was
    /// consumed; `false` when no handler is installed.
    pub fn on_touch(&self, event: &TouchEvent) -> bool {
        let handler = self.gestures.read().clone();
        match handler {
            Some(handler) => handler.on_touch(&self.view, event),
            None => false,
        }
    }

    // ========================================================================
    // Shutdown
    // ========================================================================

    /// Stops the mutation thread after it drains, then removes every
    /// object and texture and tears the scene down. Idempotent.
    ///
    /// Called from the mutation thread itself, tasks still queued behind
    /// the caller run against a torn-down scene and fail.
    pub fn shutdown(&self) {
        self.thread.shutdown();

        let mut context = self.context.lock();
        if !context.scene().is_torn_down() {
            context.teardown();
            tracing::info!("Map controller shut down");
        }
    }
}

impl Drop for MapController {
    fn drop(&mut self) {
        self.shutdown();
    }
}
