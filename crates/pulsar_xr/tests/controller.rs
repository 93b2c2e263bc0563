// # Controller Session Tests
//
// End-to-end behaviour of the mixed-reality controller against the simulated
// headset: toggle idempotence, fail-safe enables, stream pairing across ticks,
// edge-triggered sky writes and restoration of device flags at shutdown.

use std::cell::RefCell;
use std::rc::Rc;

use pulsar_xr::sim::{SimHandles, SimHeadset, SimStreamStage};
use pulsar_xr::{
    CameraMetadata, CubemapSource, MrFeatureController, ReflectionUpdate, SessionLoop, SkyMode,
    SkyUpdateMode, XrError, XrSettings, DEFAULT_SKY_EXPOSURE,
};

fn start_with(settings: XrSettings) -> (MrFeatureController, SimHandles) {
    let (hardware, handles) = SimHeadset::build();
    let controller = MrFeatureController::start(hardware, &settings).unwrap();
    (controller, handles)
}

fn start() -> (MrFeatureController, SimHandles) {
    start_with(XrSettings::default())
}

fn metadata(ev: f64, calibration: f64, timestamp_ns: u64) -> CameraMetadata {
    CameraMetadata {
        ev,
        camera_calibration_constant: calibration,
        timestamp_ns,
        ..Default::default()
    }
}

#[test]
fn test_pass_through_enable_is_idempotent() {
    let (mut controller, handles) = start();

    assert_eq!(controller.set_pass_through(true), Ok(true));
    assert_eq!(controller.set_pass_through(true), Ok(true));
    assert_eq!(handles.driver.pass_through_enable_calls(), 1);
}

#[test]
fn test_failed_depth_enable_leaves_flags_untouched() {
    let (mut controller, handles) = start();
    handles.driver.set_flags(false, false, true);
    handles.driver.refuse_depth_estimation(true);

    let result = controller.set_depth_estimation(true);
    assert!(matches!(result, Err(XrError::HardwareEnableFailure { .. })));
    assert!(!controller.is_depth_estimation_enabled());
    assert_eq!(handles.driver.flags(), (false, false, true));

    // The toggle stays usable once the hardware accepts it.
    handles.driver.refuse_depth_estimation(false);
    assert_eq!(controller.set_depth_estimation(true), Ok(true));
    assert_eq!(handles.driver.flags(), (false, true, true));
}

#[test]
fn test_depth_disable_restores_its_snapshot() {
    let (mut controller, handles) = start();
    handles.driver.set_flags(false, false, true);

    controller.set_depth_estimation(true).unwrap();
    assert_eq!(handles.driver.flags(), (false, true, true));

    controller.set_depth_estimation(false).unwrap();
    assert_eq!(handles.driver.flags(), (false, false, true));
    assert!(!handles.driver.depth_estimation_active());
}

#[test]
fn test_failed_enable_does_not_disturb_other_features() {
    let (mut controller, handles) = start();
    controller.set_depth_estimation(true).unwrap();
    controller.set_eye_offset(0.0).unwrap();
    controller.tick();

    handles.driver.refuse_pass_through(true);
    assert!(controller.set_pass_through(true).is_err());

    assert!(controller.is_depth_estimation_enabled());
    assert_eq!(controller.eye_offset(), 0.0);
    assert_eq!(controller.sky_mode(), SkyMode::Default);
}

#[test]
fn test_reflection_update_requires_both_streams() {
    let (mut controller, handles) = start();
    controller.set_environment_reflections(true).unwrap();

    // Only the cubemap is fresh: nothing is read, default sky stays.
    handles.reflections.publish(100);
    controller.tick();
    assert_eq!(controller.sky_mode(), SkyMode::Default);
    assert_eq!(handles.reflections.reads(), 0);
    assert!(handles.reflections.has_unread_frame());

    // Metadata arrives a tick later; the pending cubemap is paired with it.
    handles.metadata.publish(metadata(2.0, 4.0, 110));
    controller.tick();
    assert_eq!(controller.sky_mode(), SkyMode::Live);
    assert_eq!(handles.reflections.reads(), 1);
    assert_eq!(handles.metadata.reads(), 1);
    assert_eq!(handles.profile.fixed_exposure(), Some(4.0));
    assert_eq!(
        handles.profile.sky_texture(),
        Some(CubemapSource::Streamed { texture_id: 100 })
    );
    assert_eq!(handles.profile.sky_update_mode(), Some(SkyUpdateMode::Realtime));
    assert_eq!(handles.profile.white_balance_intensity(), Some(1.0));
}

#[test]
fn test_default_sky_written_once_per_pairless_run() {
    let (mut controller, handles) = start();
    controller.set_environment_reflections(true).unwrap();

    handles.reflections.publish(1);
    handles.metadata.publish(metadata(5.0, 1.0, 1));
    controller.tick();
    assert_eq!(controller.sky_mode(), SkyMode::Live);

    controller.tick();
    assert_eq!(controller.sky_mode(), SkyMode::Default);
    let writes = handles.profile.override_count();
    for _ in 0..10 {
        controller.tick();
    }
    assert_eq!(handles.profile.override_count(), writes);
    assert_eq!(handles.profile.fixed_exposure(), Some(DEFAULT_SKY_EXPOSURE));
    assert_eq!(handles.profile.white_balance_intensity(), Some(0.0));
}

#[test]
fn test_live_hold_keeps_stream_values_between_frames() {
    let settings = XrSettings {
        live_hold_ticks: 3,
        ..Default::default()
    };
    let (mut controller, handles) = start_with(settings);
    controller.set_environment_reflections(true).unwrap();

    handles.reflections.publish(1);
    handles.metadata.publish(metadata(3.0, 2.0, 1));
    controller.tick();
    let writes = handles.profile.override_count();

    controller.tick();
    controller.tick();
    assert_eq!(controller.sky_mode(), SkyMode::Live);
    assert_eq!(handles.profile.override_count(), writes);
}

#[test]
fn test_disabling_reflections_falls_back_to_default() {
    let (mut controller, handles) = start();
    controller.set_environment_reflections(true).unwrap();
    handles.reflections.publish(1);
    handles.metadata.publish(metadata(5.0, 1.0, 1));
    controller.tick();

    controller.set_environment_reflections(false).unwrap();
    controller.tick();

    assert_eq!(controller.sky_mode(), SkyMode::Default);
    assert_eq!(
        handles.profile.sky_texture(),
        Some(CubemapSource::Asset(XrSettings::default().default_sky_texture))
    );
    assert_eq!(handles.profile.sky_update_mode(), Some(SkyUpdateMode::OnChanged));
}

#[test]
fn test_listeners_notified_per_live_update() {
    let (mut controller, handles) = start();
    let updates: Rc<RefCell<Vec<ReflectionUpdate>>> = Rc::default();
    let sink = updates.clone();
    assert_eq!(controller.listener_count(), 0);
    controller.on_reflection_update(move |update| sink.borrow_mut().push(*update));
    assert_eq!(controller.listener_count(), 1);
    controller.set_environment_reflections(true).unwrap();

    for timestamp in [10, 20] {
        handles.reflections.publish(timestamp);
        handles.metadata.publish(metadata(2.0, 4.0, timestamp));
        controller.tick();
    }
    controller.tick();

    let updates = updates.borrow();
    assert_eq!(updates.len(), 2);
    assert_eq!(updates[1].cubemap_timestamp_ns, 20);
    assert_eq!(updates[1].exposure, 4.0);
    assert_eq!(updates[1].refresh_period, 1.0 / 30.0);
}

#[test]
fn test_eye_offset_written_only_on_change() {
    let (mut controller, handles) = start();

    // Device default is already applied.
    controller.set_eye_offset(1.0).unwrap();
    controller.tick();
    assert_eq!(handles.driver.eye_offset_writes(), 0);

    controller.set_eye_offset(0.5).unwrap();
    controller.tick();
    controller.tick();
    assert_eq!(handles.driver.eye_offset_writes(), 1);
    assert_eq!(handles.driver.eye_offset(), 0.5);

    controller.set_eye_offset(0.5).unwrap();
    controller.tick();
    assert_eq!(handles.driver.eye_offset_writes(), 1);
}

#[test]
fn test_initial_eye_offset_applied_on_first_tick() {
    let settings = XrSettings {
        initial_eye_offset: 0.0,
        ..Default::default()
    };
    let (mut controller, handles) = start_with(settings);
    assert_eq!(handles.driver.eye_offset_writes(), 0);

    controller.tick();
    assert_eq!(handles.driver.eye_offset_writes(), 1);
    assert_eq!(handles.driver.eye_offset(), 0.0);
}

#[test]
fn test_shutdown_restores_pre_session_flags() {
    let (hardware, handles) = SimHeadset::build();
    handles.driver.set_flags(true, false, true);
    let mut controller = MrFeatureController::start(hardware, &XrSettings::default()).unwrap();

    controller.set_pass_through(true).unwrap();
    controller.set_depth_estimation(true).unwrap();
    controller.set_environment_reflections(true).unwrap();
    controller.set_depth_estimation(false).unwrap();
    controller.set_depth_estimation(true).unwrap();
    controller.tick();

    controller.shutdown();

    assert_eq!(handles.driver.flags(), (true, false, true));
    assert!(!handles.driver.pass_through_active());
    assert!(!handles.driver.depth_estimation_active());
    assert!(!handles.reflections.is_running());
    assert!(!handles.metadata.is_enabled());
    assert_eq!(controller.sky_mode(), SkyMode::Default);
}

#[test]
fn test_shutdown_is_idempotent() {
    let (mut controller, handles) = start();
    controller.set_pass_through(true).unwrap();

    controller.shutdown();
    let writes = handles.profile.override_count();
    controller.shutdown();
    controller.tick();

    assert!(controller.is_shut_down());
    assert_eq!(handles.profile.override_count(), writes);
}

#[test]
fn test_drop_performs_shutdown() {
    let (hardware, handles) = SimHeadset::build();
    handles.driver.set_flags(true, true, false);
    {
        let mut controller =
            MrFeatureController::start(hardware, &XrSettings::default()).unwrap();
        controller.set_depth_estimation(true).unwrap();
        assert_eq!(handles.driver.flags(), (false, true, true));
    }

    assert_eq!(handles.driver.flags(), (true, true, false));
    assert!(!handles.driver.depth_estimation_active());
}

#[test]
fn test_session_loop_drives_simulated_streams() {
    let (hardware, handles) = SimHeadset::build();
    let mut controller = MrFeatureController::start(hardware, &XrSettings::default()).unwrap();
    controller.set_environment_reflections(true).unwrap();

    let mut session = SessionLoop::new();
    session.register(SimStreamStage::new(&handles, 3, 1)).unwrap();
    session.register(controller).unwrap();
    assert_eq!(session.stage_names(), vec!["sim_streams", "mr_features"]);

    for _ in 0..12 {
        session.run_frame(1.0 / 90.0);
    }
    assert_eq!(handles.reflections.reads(), 4);

    session.shutdown().unwrap();
    assert!(!handles.reflections.is_running());
    assert!(handles.driver.flags().0);
}
