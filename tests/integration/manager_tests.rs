//! Device manager lifecycle and phase tests.

use std::time::Duration;

use futures_lite::future::block_on;

use scalelink::app::commands::ScaleCommand;
use scalelink::app::events::{EventBus, ScaleEvent};
use scalelink::app::manager::DeviceManager;
use scalelink::device::simulated::SIMULATED_ADDRESS;
use scalelink::device::{DeviceInfo, DeviceKind};
use scalelink::error::Error;
use scalelink::phase::ConnectionPhase;

use crate::mock_transport::{
    MockAdapter, MockTransport, Recorder, advertisement, fast_config, frame, ready,
};

fn manager() -> (DeviceManager<MockTransport>, std::sync::Arc<Recorder>) {
    let bus = EventBus::new();
    let recorder = Recorder::attach(&bus);
    let mut config = fast_config();
    config.simulation.platform_count = 3;
    config.simulation.seed = Some(8);
    config.simulation.interval_ms = 100;
    (DeviceManager::new(config, bus).unwrap(), recorder)
}

fn phases(recorder: &Recorder) -> Vec<ConnectionPhase> {
    recorder
        .events()
        .iter()
        .filter_map(|e| match e {
            ScaleEvent::PhaseChanged { to, .. } => Some(*to),
            _ => None,
        })
        .collect()
}

/// A registered aggregator with two platforms scripted.
fn register_aggregator(mgr: &DeviceManager<MockTransport>, address: &str, transport: MockTransport) {
    transport.set_general(2);
    transport.set_platform(1, &frame(10.0, 10.0, 0, ready()));
    transport.set_platform(2, &frame(20.0, 20.0, 0, ready()));
    let info = DeviceInfo::physical(address, "VISOR-2P-F60", Some(-50));
    assert!(mgr.register_physical(info, transport));
}

#[test]
fn starts_with_simulator_and_disconnected() {
    let (mgr, _r) = manager();
    assert_eq!(mgr.phase(), ConnectionPhase::Disconnected);
    assert!(mgr.current_device().is_none());
    let sim = mgr.simulated().unwrap();
    assert_eq!(sim.address(), SIMULATED_ADDRESS);
    assert_eq!(sim.info().kind, DeviceKind::Simulated);
    assert_eq!(mgr.formatted_weight(1), "Disconnected");
}

#[test]
fn invalid_config_is_rejected() {
    let mut config = fast_config();
    config.simulation.platform_count = 0;
    let result = DeviceManager::<MockTransport>::new(config, EventBus::new());
    assert!(matches!(result, Err(Error::Validation(_))));
}

#[test]
fn connect_walks_every_phase_in_order() {
    let (mgr, recorder) = manager();
    let sim = mgr.simulated().unwrap();
    assert!(block_on(mgr.connect_device(&sim)));

    assert_eq!(mgr.phase(), ConnectionPhase::Connected);
    assert!(sim.is_reading());
    assert!(mgr.current_device().unwrap().same_device(&sim));
    assert_eq!(
        phases(&recorder),
        vec![
            ConnectionPhase::Connecting,
            ConnectionPhase::ReadingInitialData,
            ConnectionPhase::Connected,
        ]
    );
    // The initial read already populated every platform.
    assert_eq!(sim.snapshot().platform_count(), 3);
    assert!(sim.snapshot().platforms.iter().all(|p| p.connected));

    block_on(mgr.shutdown());
}

#[test]
fn reconnecting_current_device_is_a_no_op() {
    let (mgr, recorder) = manager();
    let sim = mgr.simulated().unwrap();
    assert!(block_on(mgr.connect_device(&sim)));
    let before = phases(&recorder).len();
    assert!(block_on(mgr.connect_device(&sim)));
    assert_eq!(phases(&recorder).len(), before);
    block_on(mgr.shutdown());
}

#[test]
fn failed_connect_drops_to_disconnected() {
    let (mgr, recorder) = manager();
    let info = DeviceInfo::physical("AA:00:00:00:00:09", "VISOR-2P", None);
    assert!(mgr.register_physical(info, MockTransport::failing()));
    let device = mgr.find("AA:00:00:00:00:09").unwrap();

    assert!(!block_on(mgr.connect_device(&device)));
    assert_eq!(mgr.phase(), ConnectionPhase::Disconnected);
    assert!(mgr.current_device().is_none());
    assert!(!device.is_connected());
    assert_eq!(
        phases(&recorder),
        vec![ConnectionPhase::Connecting, ConnectionPhase::Disconnected]
    );
    assert!(recorder.count(|e| matches!(
        e,
        ScaleEvent::ConnectionStatusChanged { connected: false, error: Some(_), .. }
    )) >= 1);
}

#[test]
fn switching_devices_disconnects_previous() {
    let (mgr, _r) = manager();
    let transport = MockTransport::new();
    register_aggregator(&mgr, "AA:00:00:00:00:01", transport);

    let sim = mgr.simulated().unwrap();
    assert!(block_on(mgr.connect_device(&sim)));

    let physical = mgr.find("AA:00:00:00:00:01").unwrap();
    assert!(block_on(mgr.connect_device(&physical)));

    assert!(!sim.is_connected());
    assert!(!sim.is_reading());
    assert!(physical.is_connected());
    assert_eq!(mgr.phase(), ConnectionPhase::Connected);
    assert_eq!(mgr.total_weight(), 30.0);
    assert_eq!(mgr.formatted_weight(2), "20.0 kg");

    block_on(mgr.shutdown());
}

#[test]
fn disconnect_current_device_tears_down() {
    let (mgr, _r) = manager();
    let sim = mgr.simulated().unwrap();
    assert!(block_on(mgr.connect_device(&sim)));

    block_on(mgr.disconnect_current_device());
    assert_eq!(mgr.phase(), ConnectionPhase::Disconnected);
    assert!(mgr.current_device().is_none());
    assert!(!sim.is_reading());
    assert!(sim.snapshot().platforms.iter().all(|p| !p.connected));
}

#[test]
fn discovery_registers_new_addresses_once() {
    let (mgr, _r) = manager();
    let adapter = MockAdapter {
        advertisements: vec![
            advertisement("VISOR-4P-F62", "AA:00:00:00:00:01"),
            advertisement("PAD-NB-2P-F48", "AA:00:00:00:00:02"),
            advertisement("VISOR-4P-F62", "AA:00:00:00:00:01"),
        ],
    };
    let added = block_on(mgr.discover(&adapter, Duration::from_secs(1)));
    assert_eq!(added, 2);
    assert_eq!(mgr.devices().len(), 3);

    let pad = mgr.find("AA:00:00:00:00:02").unwrap();
    assert!(!pad.info().name.is_aggregator());
    assert_eq!(pad.info().rssi, Some(-60));

    assert_eq!(block_on(mgr.discover(&adapter, Duration::from_secs(1))), 0);
}

#[test]
fn commands_route_to_current_device() {
    let (mgr, _r) = manager();
    assert!(!block_on(mgr.handle_command(ScaleCommand::TareAll)).unwrap());

    let connected = block_on(mgr.handle_command(ScaleCommand::Connect {
        address: SIMULATED_ADDRESS.into(),
    }))
    .unwrap();
    assert!(connected);
    assert!(block_on(mgr.handle_command(ScaleCommand::Tare { platform_id: 2 })).unwrap());
    assert!(!block_on(mgr.handle_command(ScaleCommand::Zero { platform_id: 7 })).unwrap());
    assert!(block_on(mgr.handle_command(ScaleCommand::ZeroAll)).unwrap());
    assert!(
        block_on(mgr.handle_command(ScaleCommand::SetReadInterval(Duration::from_millis(300))))
            .unwrap()
    );
    assert!(
        block_on(mgr.handle_command(ScaleCommand::SetReadInterval(Duration::from_millis(20))))
            .is_err()
    );

    assert!(block_on(mgr.handle_command(ScaleCommand::Disconnect)).unwrap());
    assert_eq!(mgr.phase(), ConnectionPhase::Disconnected);
}

#[test]
fn unknown_address_does_not_connect() {
    let (mgr, _r) = manager();
    let ok = block_on(mgr.handle_command(ScaleCommand::Connect {
        address: "FF:FF:FF:FF:FF:FF".into(),
    }))
    .unwrap();
    assert!(!ok);
    assert_eq!(mgr.phase(), ConnectionPhase::Disconnected);
}
