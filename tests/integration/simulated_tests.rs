//! Simulated device driven through the public surface.

use std::time::Duration;

use futures_lite::future::block_on;

use scalelink::app::events::{EventBus, ScaleEvent};
use scalelink::device::{ConnectParams, DeviceStatus, SimulatedDevice};
use scalelink::platform::PlatformStatus;

use crate::mock_transport::{Recorder, fast_config, wait_until};

fn simulator(count: u8, seed: u64) -> (SimulatedDevice, std::sync::Arc<Recorder>) {
    let mut config = fast_config();
    config.simulation.platform_count = count;
    config.simulation.seed = Some(seed);
    config.simulation.interval_ms = 100;
    let bus = EventBus::new();
    let recorder = Recorder::attach(&bus);
    (SimulatedDevice::new(&config, bus).unwrap(), recorder)
}

#[test]
fn three_platform_tick_emits_weight_per_platform() {
    let (sim, recorder) = simulator(3, 11);
    assert!(block_on(sim.connect(ConnectParams::default())));
    assert!(sim.tick());

    let state = sim.core().snapshot();
    assert_eq!(state.platform_count(), 3);
    assert_eq!(state.general.platform_count, 3);
    for p in &state.platforms {
        assert!(p.connected && p.calibrated);
        assert!(!(p.overload && p.underload));
        assert_ne!(p.status(), PlatformStatus::Disconnected);
    }

    let mut ids: Vec<u8> = recorder
        .events()
        .iter()
        .filter_map(|e| match e {
            ScaleEvent::WeightUpdated { platform_id, .. } => Some(*platform_id),
            _ => None,
        })
        .collect();
    ids.sort_unstable();
    assert_eq!(ids, vec![1, 2, 3]);
}

#[test]
fn same_seed_same_readings() {
    let (a, _) = simulator(4, 99);
    let (b, _) = simulator(4, 99);
    for sim in [&a, &b] {
        assert!(block_on(sim.connect(ConnectParams::default())));
        for _ in 0..5 {
            assert!(sim.tick());
        }
    }
    let (sa, sb) = (a.core().snapshot(), b.core().snapshot());
    for (pa, pb) in sa.platforms.iter().zip(sb.platforms.iter()) {
        assert_eq!(pa.net_weight, pb.net_weight);
        assert_eq!(pa.battery_mv, pb.battery_mv);
    }
}

#[test]
fn continuous_reading_runs_until_disconnect() {
    let (sim, recorder) = simulator(2, 5);
    assert!(block_on(sim.connect(ConnectParams::default())));
    sim.start_continuous_reading(Duration::from_millis(100))
        .unwrap();
    assert!(sim.core().is_reading());

    assert!(wait_until(Duration::from_secs(3), || {
        recorder.count(|e| matches!(e, ScaleEvent::WeightUpdated { .. })) >= 4
    }));

    block_on(sim.disconnect());
    assert!(!sim.core().is_reading());
    assert_eq!(sim.core().status(), DeviceStatus::Disconnected);
    assert!(!sim.tick());
}

#[test]
fn change_interval_restarts_active_reading() {
    let (sim, _) = simulator(1, 3);
    assert!(block_on(sim.connect(ConnectParams::default())));
    sim.start_continuous_reading(Duration::from_millis(100))
        .unwrap();
    block_on(sim.change_read_interval(Duration::from_millis(200))).unwrap();
    assert!(sim.core().is_reading());
    assert_eq!(sim.core().read_interval(), Duration::from_millis(200));

    assert!(block_on(sim.change_read_interval(Duration::from_millis(10))).is_err());
    assert_eq!(sim.core().read_interval(), Duration::from_millis(200));
    block_on(sim.dispose());
    assert!(!sim.core().is_reading());
}

#[test]
fn tare_then_tare_again_clears() {
    let (sim, _) = simulator(1, 21);
    assert!(block_on(sim.connect(ConnectParams::default())));
    assert!(sim.tare(1));
    assert!(sim.tick());
    assert!(sim.core().snapshot().platform(1).unwrap().tared);

    assert!(sim.tare(1));
    assert!(sim.tick());
    let state = sim.core().snapshot();
    let p = state.platform(1).unwrap();
    assert!(!p.tared);
    assert!(p.tare.abs() < 1e-3);
}

#[test]
fn disposed_simulator_refuses_everything() {
    let (sim, _) = simulator(2, 1);
    block_on(sim.dispose());
    assert!(!block_on(sim.connect(ConnectParams::default())));
    assert!(!sim.tare_all());
    assert!(!sim.tick());
}
