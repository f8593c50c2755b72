//! Integration tests for the map controller.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;

use crossbeam_channel::bounded;
use parking_lot::Mutex;
use terrella::{
    ComponentObject, ComponentState, ControllerConfig, GestureHandler, LabelInfo, MapController,
    MapView, MarkerInfo, RenderBackend, ScreenLabel, ScreenMarker, TouchEvent, TouchPhase,
    VectorInfo, VectorObject,
};
use terrella_core::{FrameGuard, Identity, Image, ObjectKind, Point2d, Point3d};

fn controller() -> MapController {
    MapController::with_defaults().unwrap()
}

fn line() -> VectorObject {
    VectorObject::linear(vec![Point2d::new(0.0, 0.0), Point2d::new(0.5, 0.5)])
}

fn image(shade: u8) -> Arc<Image> {
    Arc::new(Image::solid(8, 8, [shade, shade, 0, 255]).unwrap())
}

fn marker_with(image: &Arc<Image>) -> ScreenMarker {
    ScreenMarker::new(Point2d::new(0.2, 0.3), Point2d::new(16.0, 16.0)).with_image(Arc::clone(image))
}

/// Backend that remembers what it was asked to do.
#[derive(Default)]
struct RecordingBackend {
    draws: Vec<(u64, usize, usize)>,
    released: Vec<Identity>,
    perf: Vec<u32>,
}

impl RenderBackend for RecordingBackend {
    fn draw(&mut self, frame: &FrameGuard, _view: Point3d) {
        self.draws
            .push((frame.generation(), frame.object_count(), frame.texture_count()));
    }

    fn release_texture(&mut self, id: Identity) {
        self.released.push(id);
    }

    fn set_perf_interval(&mut self, interval: u32) {
        self.perf.push(interval);
    }
}

// ============================================================================
// Scenarios
// ============================================================================

#[test]
fn test_add_one_vector_then_remove() {
    let controller = controller();
    let scene = controller.scene();

    let component = controller.add_vector(line(), VectorInfo::default());
    controller.flush().unwrap();

    let ids = component.vector_ids();
    assert_eq!(ids.len(), 1);
    assert_eq!(component.state(), ComponentState::Live);
    let snapshot = scene.snapshot();
    assert_eq!(snapshot.generation(), 1);
    assert_eq!(snapshot.count_kind(ObjectKind::Vector), 1);
    assert_eq!(snapshot.is_enabled(ids[0]), Some(true));

    controller.remove_object(&component);
    controller.flush().unwrap();

    let snapshot = scene.snapshot();
    assert_eq!(snapshot.generation(), 2);
    assert_eq!(snapshot.object_count(), 0);
    assert!(component.is_cleared());
    assert!(component.is_empty());
}

#[test]
fn test_two_markers_share_one_texture() {
    let controller = controller();
    let shared = image(200);

    let component = controller.add_screen_markers(
        vec![marker_with(&shared), marker_with(&shared)],
        MarkerInfo::default(),
    );
    controller.flush().unwrap();

    let snapshot = controller.scene().snapshot();
    assert_eq!(snapshot.object_count(), 1);
    assert_eq!(snapshot.texture_count(), 1);

    let markers = snapshot.markers(component.marker_ids()[0]).unwrap();
    assert_eq!(markers.markers.len(), 2);
    let texture = markers.markers[0].texture.unwrap();
    assert_eq!(markers.markers[1].texture, Some(texture));
    assert!(snapshot.texture(texture).unwrap().same_content(&shared));
}

#[test]
fn test_texture_dedup_across_calls() {
    let controller = controller();

    let first = controller.add_screen_marker(marker_with(&image(7)), MarkerInfo::default());
    // Same pixels, separate allocation on the caller side.
    let second = controller.add_screen_marker(marker_with(&image(7)), MarkerInfo::default());
    let mut label = ScreenLabel::new(Point2d::new(0.1, 0.1), "Harbour");
    label.icon = Some(image(7));
    let third = controller.add_screen_label(label, LabelInfo::default());
    controller.flush().unwrap();

    let snapshot = controller.scene().snapshot();
    assert_eq!(snapshot.object_count(), 3);
    assert_eq!(snapshot.texture_count(), 1);

    let a = snapshot.markers(first.marker_ids()[0]).unwrap().markers[0].texture;
    let b = snapshot.markers(second.marker_ids()[0]).unwrap().markers[0].texture;
    let c = snapshot.labels(third.label_ids()[0]).unwrap().labels[0].icon;
    assert_eq!(a, b);
    assert_eq!(a, c);
}

#[test]
fn test_disable_then_enable() {
    let controller = controller();
    let scene = controller.scene();
    let component = controller.add_vector(line(), VectorInfo::default());
    controller.flush().unwrap();
    let id = component.vector_ids()[0];
    let before = scene.generation();

    controller.disable_objects(&[component.clone()]);
    controller.flush().unwrap();
    assert_eq!(scene.generation(), before + 1);
    assert_eq!(scene.snapshot().is_enabled(id), Some(false));
    assert_eq!(component.state(), ComponentState::Disabled);

    controller.enable_objects(&[component.clone()]);
    controller.flush().unwrap();
    assert_eq!(scene.generation(), before + 2);
    assert_eq!(scene.snapshot().is_enabled(id), Some(true));
    assert_eq!(component.state(), ComponentState::Live);
}

#[test]
fn test_initially_disabled_style() {
    let controller = controller();
    let info = VectorInfo {
        enable: false,
        ..VectorInfo::default()
    };
    let component = controller.add_vector(line(), info);
    controller.flush().unwrap();

    let id = component.vector_ids()[0];
    assert_eq!(controller.scene().snapshot().is_enabled(id), Some(false));
    assert_eq!(component.state(), ComponentState::Disabled);
}

#[test]
fn test_add_from_mutation_thread_runs_inline() {
    let controller = Arc::new(controller());
    let inner = Arc::clone(&controller);
    let (tx, rx) = bounded(1);

    controller
        .add_task(move || {
            assert!(inner.is_on_mutation_thread());
            let component = inner.add_vector(line(), VectorInfo::default());
            // Already applied: no queue hop.
            let ids = component.vector_ids();
            let visible = inner.scene().snapshot().contains(ids[0]);
            tx.send((ids.len(), visible)).unwrap();
        })
        .unwrap();

    assert_eq!(rx.recv().unwrap(), (1, true));
    controller.flush().unwrap();
    assert!(!controller.is_on_mutation_thread());
}

// ============================================================================
// Properties
// ============================================================================

#[test]
fn test_clear_is_idempotent() {
    let controller = controller();
    let scene = controller.scene();
    let component = controller.add_vector(line(), VectorInfo::default());
    controller.flush().unwrap();

    controller.remove_object(&component);
    controller.flush().unwrap();
    let after_first = scene.generation();

    controller.remove_object(&component);
    controller.remove_objects(&[component.clone(), component.clone()]);
    controller.disable_objects(&[component.clone()]);
    controller.flush().unwrap();

    // Nothing left to change, so no new generation.
    assert_eq!(scene.generation(), after_first);
    assert_eq!(component.state(), ComponentState::Cleared);
}

#[test]
fn test_batch_removal_is_one_generation() {
    let controller = controller();
    let scene = controller.scene();
    let components: Vec<ComponentObject> = (0..5)
        .map(|_| controller.add_vector(line(), VectorInfo::default()))
        .collect();
    let keep = controller.add_screen_marker(marker_with(&image(1)), MarkerInfo::default());
    controller.flush().unwrap();
    let before = scene.generation();

    controller.remove_objects(&components);
    controller.flush().unwrap();

    assert_eq!(scene.generation(), before + 1);
    let snapshot = scene.snapshot();
    assert_eq!(snapshot.object_count(), 1);
    assert!(snapshot.contains(keep.marker_ids()[0]));
    assert!(components.iter().all(ComponentObject::is_cleared));
}

#[test]
fn test_empty_lists_enqueue_nothing() {
    let controller = controller();
    let (release_tx, release_rx) = bounded::<()>(1);
    controller
        .add_task(move || {
            let _ = release_rx.recv();
        })
        .unwrap();

    controller.enable_objects(&[]);
    controller.disable_objects(&[]);
    controller.remove_objects(&[]);

    // Only the blocking task is outstanding.
    assert_eq!(controller.thread_stats().pending, 1);
    release_tx.send(()).unwrap();
    controller.flush().unwrap();
    assert_eq!(controller.scene().generation(), 0);
}

#[test]
fn test_empty_add_returns_empty_handle() {
    let controller = controller();
    let component = controller.add_vectors(Vec::new(), VectorInfo::default());
    controller.flush().unwrap();

    assert!(component.is_empty());
    assert_eq!(component.state(), ComponentState::Live);
    assert_eq!(controller.scene().generation(), 0);
}

#[test]
fn test_fifo_per_producer() {
    let controller = Arc::new(controller());

    let producers: Vec<_> = (0..4)
        .map(|_| {
            let controller = Arc::clone(&controller);
            thread::spawn(move || {
                (0..50)
                    .map(|_| controller.add_vector(line(), VectorInfo::default()))
                    .collect::<Vec<_>>()
            })
        })
        .collect();
    let per_producer: Vec<Vec<ComponentObject>> =
        producers.into_iter().map(|p| p.join().unwrap()).collect();
    controller.flush().unwrap();

    // Identities are handed out in execution order.
    for components in &per_producer {
        let ids: Vec<Identity> = components.iter().map(|c| c.vector_ids()[0]).collect();
        assert!(ids.windows(2).all(|w| w[0] < w[1]), "producer order broken: {ids:?}");
    }
    assert_eq!(controller.scene().snapshot().object_count(), 200);
}

#[test]
fn test_reader_never_sees_partial_batch() {
    const ROUNDS: u64 = 10;
    const PER_BATCH: usize = 20;

    let controller = controller();
    let scene = controller.scene();
    let done = Arc::new(AtomicBool::new(false));

    // Generations 1..=ROUNDS each add one object with PER_BATCH fresh
    // textures; generation ROUNDS + 1 removes every object, and with them
    // every texture, at once.
    let reader = {
        let scene = Arc::clone(&scene);
        let done = Arc::clone(&done);
        thread::spawn(move || {
            let mut frames = 0_u64;
            while !done.load(Ordering::Acquire) {
                let frame = scene.begin_frame();
                let generation = frame.generation();
                let expected_objects = if generation > ROUNDS {
                    0
                } else {
                    usize::try_from(generation).unwrap()
                };

                assert_eq!(frame.object_count(), expected_objects);
                assert_eq!(frame.texture_count(), expected_objects * PER_BATCH);
                for (_, entry) in frame.iter() {
                    assert_eq!(entry.object.primitive_count(), PER_BATCH);
                    for tex in entry.object.texture_refs() {
                        assert!(frame.texture(tex).is_some());
                    }
                }
                frames += 1;
                drop(frame);
            }
            frames
        })
    };

    let components: Vec<ComponentObject> = (0..ROUNDS)
        .map(|round| {
            let markers = (0..PER_BATCH)
                .map(|i| {
                    let shade = u8::try_from(round * 20 + i as u64).unwrap();
                    marker_with(&image(shade))
                })
                .collect();
            controller.add_screen_markers(markers, MarkerInfo::default())
        })
        .collect();
    controller.remove_objects(&components);
    controller.flush().unwrap();

    done.store(true, Ordering::Release);
    assert!(reader.join().unwrap() > 0);
    assert_eq!(scene.generation(), ROUNDS + 1);
}

// ============================================================================
// Failure handling
// ============================================================================

#[test]
fn test_invalid_add_leaves_empty_handle() {
    let controller = controller();
    let bad = ScreenMarker::new(Point2d::ZERO, Point2d::new(0.0, 16.0));
    let component = controller.add_screen_markers(
        vec![marker_with(&image(1)), bad],
        MarkerInfo::default(),
    );
    let good = controller.add_vector(line(), VectorInfo::default());
    controller.flush().unwrap();

    assert!(component.is_empty());
    assert_eq!(component.state(), ComponentState::Live);
    let snapshot = controller.scene().snapshot();
    assert_eq!(snapshot.object_count(), 1);
    assert_eq!(snapshot.texture_count(), 0);
    assert!(snapshot.contains(good.vector_ids()[0]));
}

#[test]
fn test_texture_limit_fails_whole_batch() {
    let config = ControllerConfig {
        max_textures: 2,
        ..ControllerConfig::default()
    };
    let controller = MapController::new(config).unwrap();
    let component = controller.add_screen_markers(
        vec![marker_with(&image(1)), marker_with(&image(2)), marker_with(&image(3))],
        MarkerInfo::default(),
    );
    controller.flush().unwrap();

    assert!(component.is_empty());
    assert_eq!(controller.scene().snapshot().texture_count(), 0);

    // The rolled-back slots are free again.
    let retry = controller.add_screen_markers(
        vec![marker_with(&image(1)), marker_with(&image(2))],
        MarkerInfo::default(),
    );
    controller.flush().unwrap();
    assert_eq!(retry.marker_ids().len(), 1);
    assert_eq!(controller.scene().snapshot().texture_count(), 2);
}

#[test]
fn test_panicking_task_is_contained() {
    let controller = controller();
    controller.add_task(|| panic!("task blew up")).unwrap();
    let component = controller.add_vector(line(), VectorInfo::default());
    controller.flush().unwrap();

    assert_eq!(component.vector_ids().len(), 1);
    assert_eq!(controller.thread_stats().panicked, 1);
}

// ============================================================================
// Shutdown
// ============================================================================

#[test]
fn test_shutdown_drains_then_tears_down() {
    let controller = controller();
    let scene = controller.scene();
    let ran = Arc::new(AtomicUsize::new(0));

    for _ in 0..100 {
        let ran = Arc::clone(&ran);
        controller
            .add_task(move || {
                ran.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();
    }
    let last = controller.add_screen_marker(marker_with(&image(9)), MarkerInfo::default());

    controller.shutdown();

    assert_eq!(ran.load(Ordering::SeqCst), 100);
    // The queued add ran before teardown removed it again.
    assert_eq!(last.marker_ids().len(), 1);
    let snapshot = scene.snapshot();
    assert_eq!(snapshot.object_count(), 0);
    assert_eq!(snapshot.texture_count(), 0);
    assert_eq!(scene.drain_released().len(), 1);
}

#[test]
fn test_shutdown_is_idempotent() {
    let controller = Arc::new(controller());
    let closers: Vec<_> = (0..3)
        .map(|_| {
            let controller = Arc::clone(&controller);
            thread::spawn(move || controller.shutdown())
        })
        .collect();
    for c in closers {
        c.join().unwrap();
    }
    controller.shutdown();
    assert!(controller.flush().is_err());
}

#[test]
#[should_panic(expected = "MapController used after shutdown!")]
fn test_use_after_shutdown_panics() {
    let controller = controller();
    controller.shutdown();
    let _ = controller.add_vector(line(), VectorInfo::default());
}

// ============================================================================
// Rendering, view and input
// ============================================================================

#[test]
fn test_render_driver_frame_interval_and_release() {
    let controller = controller();
    controller.set_frame_interval(3).unwrap();
    assert!(controller.set_frame_interval(0).is_err());
    controller.set_perf_interval(10);

    let mut driver = controller.surface_created(RecordingBackend::default());
    let component = controller.add_screen_marker(marker_with(&image(4)), MarkerInfo::default());
    controller.flush().unwrap();

    let rendered = (0..6).filter(|_| driver.on_frame_start()).count();
    assert_eq!(rendered, 2);
    assert_eq!(driver.backend().draws.last(), Some(&(1, 1, 1)));
    assert_eq!(driver.backend().perf, vec![10]);

    let texture = controller
        .scene()
        .snapshot()
        .markers(component.marker_ids()[0])
        .unwrap()
        .markers[0]
        .texture
        .unwrap();

    controller.shutdown();
    driver.render_frame();
    assert_eq!(driver.backend().released, vec![texture]);
    assert_eq!(driver.backend().draws.last(), Some(&(3, 0, 0)));
}

#[test]
fn test_removed_texture_is_released_after_retire_frames() {
    let config = ControllerConfig {
        max_textures: 1,
        frame_interval: 1,
        ..ControllerConfig::default()
    };
    let controller = MapController::new(config).unwrap();
    let scene = controller.scene();
    let mut driver = controller.surface_created(RecordingBackend::default());

    let first = controller.add_screen_marker(marker_with(&image(30)), MarkerInfo::default());
    controller.flush().unwrap();
    let texture = scene.snapshot().markers(first.marker_ids()[0]).unwrap().markers[0]
        .texture
        .unwrap();
    driver.render_frame();

    controller.remove_object(&first);
    controller.flush().unwrap();
    assert_eq!(scene.snapshot().texture_count(), 0);
    assert_eq!(scene.retired_count(), 1);

    // The frame drawn before the removal plus the grace frames must finish.
    let retire = controller.config().texture_retire_frames;
    for _ in 1..retire {
        driver.render_frame();
    }
    assert!(driver.backend().released.is_empty());
    driver.render_frame();
    assert_eq!(driver.backend().released, vec![texture]);

    // The limit counts live textures, so a new image fits again.
    let second = controller.add_screen_marker(marker_with(&image(31)), MarkerInfo::default());
    controller.flush().unwrap();
    assert_eq!(second.marker_ids().len(), 1);
    assert_eq!(scene.snapshot().texture_count(), 1);
}

#[test]
fn test_shared_texture_outlives_first_user() {
    let controller = controller();
    let shared = image(40);
    let first = controller.add_screen_marker(marker_with(&shared), MarkerInfo::default());
    let second = controller.add_screen_marker(marker_with(&shared), MarkerInfo::default());
    controller.flush().unwrap();

    controller.remove_object(&first);
    controller.flush().unwrap();
    let snapshot = controller.scene().snapshot();
    assert_eq!(snapshot.texture_count(), 1);
    assert!(snapshot.markers(second.marker_ids()[0]).is_some());

    controller.remove_object(&second);
    controller.flush().unwrap();
    assert_eq!(controller.scene().snapshot().texture_count(), 0);
}

#[test]
#[should_panic(expected = "MapController used after shutdown!")]
fn test_surface_after_shutdown_panics() {
    let controller = controller();
    controller.shutdown();
    let _ = controller.surface_created(RecordingBackend::default());
}

#[test]
fn test_set_position_clamps_and_cancels_animation() {
    let controller = controller();
    let view = controller.view();
    controller
        .set_view_extents(Point2d::new(-1.0, -1.0), Point2d::new(1.0, 1.0))
        .unwrap();

    view.start_animation();
    let pos = controller.set_position(0.5, 3.0, 0.25).unwrap();
    assert_eq!(pos, Point3d::new(0.5, 1.0, 0.25));
    assert_eq!(view.position(), pos);
    assert!(!view.is_animating());

    assert!(controller.set_position(f64::NAN, 0.0, 1.0).is_err());
    assert!(controller
        .set_view_extents(Point2d::new(0.0, 1.0), Point2d::new(1.0, 0.0))
        .is_err());
}

struct PanHandler {
    seen: Mutex<Vec<TouchPhase>>,
}

impl GestureHandler for PanHandler {
    fn on_touch(&self, view: &Arc<MapView>, event: &TouchEvent) -> bool {
        self.seen.lock().push(event.phase);
        if event.phase == TouchPhase::Moved {
            let pos = view.position();
            let _ = view.set_position(Point3d::new(pos.x + 0.1, pos.y, pos.z));
        }
        true
    }
}

#[test]
fn test_touch_forwarding() {
    let controller = controller();
    let touch = |phase| TouchEvent {
        phase,
        pointer: 0,
        position: Point2d::new(100.0, 200.0),
        timestamp_ms: 0,
    };
    assert!(!controller.on_touch(&touch(TouchPhase::Began)));

    let handler = Arc::new(PanHandler {
        seen: Mutex::new(Vec::new()),
    });
    controller.set_gesture_handler(handler.clone());

    assert!(controller.on_touch(&touch(TouchPhase::Began)));
    assert!(controller.on_touch(&touch(TouchPhase::Moved)));
    assert!(controller.on_touch(&touch(TouchPhase::Ended)));

    assert_eq!(
        *handler.seen.lock(),
        vec![TouchPhase::Began, TouchPhase::Moved, TouchPhase::Ended]
    );
    assert!((controller.view().position().x - 0.1).abs() < 1e-12);
}

#[test]
fn test_controller_from_toml() {
    let config = ControllerConfig::from_toml_str(
        r#"
        thread_name = "integration writer"
        frame_interval = 1
        texture_retire_frames = 0
        "#,
    )
    .unwrap();
    let controller = MapController::new(config).unwrap();
    assert_eq!(controller.config().thread_name, "integration writer");

    let (tx, rx) = bounded(1);
    controller
        .add_task(move || {
            tx.send(thread::current().name().map(str::to_string)).unwrap();
        })
        .unwrap();
    assert_eq!(rx.recv().unwrap().as_deref(), Some("integration writer"));
}
