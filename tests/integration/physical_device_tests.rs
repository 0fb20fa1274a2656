//! Physical device tests against the scripted transport.

use std::time::{Duration, Instant};

use futures_lite::future::{self, block_on};

use scalelink::app::events::{EventBus, ScaleEvent};
use scalelink::config::ScaleConfig;
use scalelink::device::{ConnectParams, DeviceInfo, DeviceStatus, PhysicalDevice};
use scalelink::error::{Error, ValidationError};
use scalelink::protocol::characteristics::{
    self, AGGREGATOR_SERVICE, CHAR_AGGREGATOR_COMMAND, CHAR_TARE, COMMAND_SERVICE, COMMAND_TRIGGER,
};
use scalelink::protocol::fields::PlatformField;
use scalelink::protocol::frame::StatusFlags;

use crate::mock_transport::{MockTransport, Recorder, fast_config, frame, ready, wait_until};

fn aggregator(name: &str) -> (PhysicalDevice<MockTransport>, MockTransport, std::sync::Arc<Recorder>) {
    let bus = EventBus::new();
    let recorder = Recorder::attach(&bus);
    let transport = MockTransport::new();
    let info = DeviceInfo::physical("AA:BB:CC:00:00:01", name, Some(-55));
    let device = PhysicalDevice::new(info, transport.clone(), &fast_config(), bus);
    (device, transport, recorder)
}

fn connect(device: &PhysicalDevice<MockTransport>) -> bool {
    block_on(device.connect(ConnectParams::from_config(&fast_config())))
}

// ── Connect ──────────────────────────────────────────────────

#[test]
fn connect_presizes_from_advertised_name() {
    let (device, _t, recorder) = aggregator("VISOR-4P-F62");
    assert!(connect(&device));
    assert_eq!(device.core().status(), DeviceStatus::Connected);

    let state = device.core().snapshot();
    assert_eq!(state.platform_count(), 4);
    assert_eq!(state.general.firmware_version, 62);
    assert_eq!(
        recorder.count(|e| matches!(e, ScaleEvent::ConnectionStatusChanged { connected: true, .. })),
        1
    );
}

#[test]
fn connect_failure_reports_error_and_stays_disconnected() {
    let bus = EventBus::new();
    let recorder = Recorder::attach(&bus);
    let transport = MockTransport::failing();
    let info = DeviceInfo::physical("AA:BB:CC:00:00:02", "VISOR-2P", None);
    let device = PhysicalDevice::new(info, transport.clone(), &fast_config(), bus);

    assert!(!connect(&device));
    assert_eq!(device.core().status(), DeviceStatus::Disconnected);
    assert_eq!(transport.releases(), 1);

    let events = recorder.events();
    assert!(matches!(
        events.last(),
        Some(ScaleEvent::ConnectionStatusChanged {
            connected: false,
            error: Some(_),
            ..
        })
    ));
}

#[test]
fn connect_twice_is_idempotent() {
    let (device, transport, _r) = aggregator("VISOR-1P");
    assert!(connect(&device));
    assert!(connect(&device));
    assert_eq!(transport.state.lock().unwrap().connects, 1);
}

// ── Aggregator reads ─────────────────────────────────────────

#[test]
fn general_frame_growth_preserves_existing_platforms() {
    let (device, transport, _r) = aggregator("VISOR-4P-F62");
    transport.set_general(4);
    for id in 1..=4u8 {
        transport.set_platform(id, &frame(f32::from(id) * 10.0, f32::from(id) * 10.0, 0, ready()));
    }
    assert!(connect(&device));
    assert!(block_on(device.initial_read()));
    assert_eq!(device.core().snapshot().platform_count(), 4);

    transport.set_general(6);
    for id in 5..=6u8 {
        transport.set_platform(id, &frame(1.0, 1.0, 0, ready()));
    }
    assert!(block_on(device.initial_read()));

    let state = device.core().snapshot();
    assert_eq!(state.platform_count(), 6);
    for id in 1..=4u8 {
        let p = state.platform(id).unwrap();
        assert_eq!(p.id, id);
        assert_eq!(p.net_weight, f32::from(id) * 10.0);
    }
    assert_eq!(state.platform(6).unwrap().id, 6);
}

#[test]
fn status_bits_connected_calibrated_tared() {
    let (device, transport, _r) = aggregator("VISOR-1P");
    transport.set_general(1);
    transport.set_platform(1, &frame(5.0, 25.0, 0, StatusFlags::from_bytes(0b111, 0)));
    assert!(connect(&device));
    assert!(block_on(device.initial_read()));

    let state = device.core().snapshot();
    let p = state.platform(1).unwrap();
    assert!(p.connected && p.calibrated && p.tared);
    assert!(!p.overload && !p.underload && !p.stable);
    assert!((p.tare - 20.0).abs() < 1e-3);
}

#[test]
fn weight_events_only_on_change() {
    let (device, transport, recorder) = aggregator("VISOR-2P");
    transport.set_general(2);
    transport.set_platform(1, &frame(12.5, 12.5, 0, ready()));
    transport.set_platform(2, &frame(7.5, 7.5, 0, ready()));
    assert!(connect(&device));

    assert!(block_on(device.initial_read()));
    assert!(block_on(device.initial_read()));

    let weights = recorder.count(|e| matches!(e, ScaleEvent::WeightUpdated { .. }));
    assert_eq!(weights, 2);
    assert_eq!(device.core().formatted_weight(1), "12.5 kg");
    assert_eq!(device.core().total_weight(), 20.0);
}

#[test]
fn hanging_read_times_out() {
    let (device, transport, _r) = aggregator("VISOR-1P");
    transport.set_general(1);
    assert!(connect(&device));
    transport.set_hang(true);
    assert!(!block_on(device.initial_read()));
    assert_eq!(device.core().gate().outstanding(), 0);
}

#[test]
fn live_load_fixed_fires_once() {
    let (device, transport, recorder) = aggregator("VISOR-2P");
    let pending = StatusFlags {
        live_load_enabled: true,
        ..ready()
    };
    let fixed = StatusFlags {
        live_load_fixed: true,
        ..pending
    };
    transport.set_general(2);
    transport.set_platform(1, &frame(1.0, 1.0, 0, pending));
    transport.set_platform(2, &frame(1.0, 1.0, 0, pending));
    assert!(connect(&device));
    assert!(block_on(device.initial_read()));

    transport.set_platform(1, &frame(1.0, 1.0, 0, fixed));
    transport.set_platform(2, &frame(1.0, 1.0, 0, fixed));
    assert!(block_on(device.initial_read()));
    assert!(block_on(device.initial_read()));

    assert_eq!(recorder.count(|e| matches!(e, ScaleEvent::LiveLoadFixed { .. })), 1);
}

#[test]
fn live_load_already_fixed_at_connect_stays_quiet() {
    let (device, transport, recorder) = aggregator("VISOR-2P");
    let fixed = StatusFlags {
        live_load_enabled: true,
        live_load_fixed: true,
        ..ready()
    };
    transport.set_general(2);
    transport.set_platform(1, &frame(1.0, 1.0, 0, fixed));
    transport.set_platform(2, &frame(2.0, 2.0, 0, fixed));
    assert!(connect(&device));
    assert!(block_on(device.initial_read()));
    assert!(block_on(device.initial_read()));

    assert_eq!(recorder.count(|e| matches!(e, ScaleEvent::LiveLoadFixed { .. })), 0);
}

#[test]
fn disconnect_cancels_initial_read_in_flight() {
    let bus = EventBus::new();
    let transport = MockTransport::new();
    let config = ScaleConfig {
        read_timeout_ms: 5_000,
        ..fast_config()
    };
    let info = DeviceInfo::physical("AA:BB:CC:00:00:03", "VISOR-1P", None);
    let device = PhysicalDevice::new(info, transport.clone(), &config, bus);
    transport.set_general(1);
    assert!(block_on(device.connect(ConnectParams::from_config(&config))));
    transport.set_hang(true);

    let started = Instant::now();
    let (read_ok, ()) = block_on(future::zip(device.initial_read(), async {
        async_io_mini::Timer::after(Duration::from_millis(50)).await;
        device.disconnect().await;
    }));

    assert!(!read_ok);
    assert!(started.elapsed() < Duration::from_secs(2));
    assert_eq!(device.core().status(), DeviceStatus::Disconnected);
    assert_eq!(device.core().gate().outstanding(), 0);
}

// ── Continuous reading ───────────────────────────────────────

#[test]
fn interval_below_floor_is_rejected() {
    let (device, _t, _r) = aggregator("VISOR-1P");
    assert!(connect(&device));
    let err = device
        .start_continuous_reading(Duration::from_millis(50))
        .unwrap_err();
    assert!(matches!(
        err,
        Error::Validation(ValidationError::IntervalTooShort { requested_ms: 50, .. })
    ));
    assert!(!device.core().is_reading());
}

#[test]
fn disconnect_stops_reading_and_resets_platforms() {
    let (device, transport, recorder) = aggregator("VISOR-2P");
    transport.set_general(2);
    transport.set_platform(1, &frame(3.0, 3.0, 0, ready()));
    transport.set_platform(2, &frame(4.0, 4.0, 0, ready()));
    assert!(connect(&device));
    device
        .start_continuous_reading(Duration::from_millis(100))
        .unwrap();
    assert!(wait_until(Duration::from_secs(2), || {
        device.core().snapshot().platform(2).is_some_and(|p| p.connected)
    }));

    block_on(device.disconnect());

    assert!(!device.core().is_reading());
    assert_eq!(device.core().status(), DeviceStatus::Disconnected);
    let state = device.core().snapshot();
    assert!(state.platforms.iter().all(|p| !p.connected));
    assert_eq!(device.core().formatted_weight(1), "Disconnected");
    assert!(transport.releases() >= 1);
    assert!(matches!(
        recorder.events().last(),
        Some(ScaleEvent::ConnectionStatusChanged {
            connected: false,
            error: None,
            ..
        })
    ));
}

#[test]
fn watchdog_reports_lost_connection() {
    let (device, transport, recorder) = aggregator("VISOR-1P");
    transport.set_general(1);
    assert!(connect(&device));
    transport.set_hang(true);
    device
        .start_continuous_reading(Duration::from_millis(100))
        .unwrap();

    assert!(wait_until(Duration::from_secs(3), || {
        recorder.count(|e| {
            matches!(
                e,
                ScaleEvent::ConnectionStatusChanged {
                    connected: false,
                    error: Some(_),
                    ..
                }
            )
        }) == 1
    }));
    block_on(device.dispose());
}

// ── Commands ─────────────────────────────────────────────────

#[test]
fn tare_all_writes_one_command_per_platform() {
    let (device, transport, _r) = aggregator("VISOR-3P");
    assert!(connect(&device));
    assert!(block_on(device.tare_all()));

    let mut payloads: Vec<Vec<u8>> = transport
        .writes()
        .into_iter()
        .inspect(|(service, ch, _)| {
            assert_eq!(*service, AGGREGATOR_SERVICE);
            assert_eq!(*ch, CHAR_AGGREGATOR_COMMAND);
        })
        .map(|(_, _, p)| p)
        .collect();
    payloads.sort();
    assert_eq!(payloads, vec![vec![0x01, 1], vec![0x01, 2], vec![0x01, 3]]);
}

#[test]
fn commands_refused_while_disconnected() {
    let (device, transport, _r) = aggregator("VISOR-3P");
    assert!(!block_on(device.tare(1)));
    assert!(!block_on(device.zero_all()));
    assert!(transport.writes().is_empty());
}

#[test]
fn tare_unknown_platform_is_refused() {
    let (device, transport, _r) = aggregator("VISOR-2P");
    assert!(connect(&device));
    assert!(!block_on(device.tare(9)));
    assert!(transport.writes().is_empty());
}

// ── Per-platform devices ─────────────────────────────────────

#[test]
fn per_platform_device_reads_every_field() {
    let (device, transport, recorder) = aggregator("PAD-NB-2P-F48");
    transport.set_pad_fields(48, 12.25);
    assert!(connect(&device));
    assert!(block_on(device.initial_read()));

    let state = device.core().snapshot();
    assert_eq!(state.platform_count(), 1);
    let p = state.platform(1).unwrap();
    assert_eq!(p.net_weight, 12.25);
    assert_eq!(p.firmware_version, 48);
    assert_eq!(p.network_number, Some(11));
    assert_eq!(p.platform_number, Some(2));
    assert_eq!(p.decimal_places, 2);
    assert_eq!(p.battery_percent, 50);
    assert!(p.connected && p.calibrated && p.stable);
    assert_eq!(device.core().formatted_weight(1), "12.25 kg");
    assert_eq!(recorder.count(|e| matches!(e, ScaleEvent::WeightUpdated { .. })), 1);
}

#[test]
fn uncalibrated_pad_shows_connecting() {
    let (device, transport, _r) = aggregator("PAD-NB-2P-F48");
    transport.set_pad_fields(48, 12.25);
    let (service, characteristic) = characteristics::field_address(PlatformField::Calibrated);
    transport.set(service, characteristic, &[0]);
    assert!(connect(&device));
    assert_eq!(device.core().formatted_weight(1), "Connecting");
    assert!(block_on(device.initial_read()));

    let state = device.core().snapshot();
    let p = state.platform(1).unwrap();
    assert!(p.connected);
    assert!(!p.calibrated);
    assert_eq!(device.core().formatted_weight(1), "Connecting");
    assert_eq!(device.core().total_weight(), 0.0);
}

#[test]
fn per_platform_tare_writes_trigger() {
    let (device, transport, _r) = aggregator("PAD-N3-1P");
    assert!(connect(&device));
    assert!(block_on(device.tare(1)));
    assert_eq!(
        transport.writes(),
        vec![(COMMAND_SERVICE, CHAR_TARE, COMMAND_TRIGGER.to_vec())]
    );
}
