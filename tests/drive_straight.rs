use lane_pursuit::{
    sim::{KinematicVehicle, VehicleDynamics},
    vehicle::{wheel_commands, VehicleDescriptor},
    Config, ControlEvent, LaneModel, VehicleController,
};
use std::sync::Arc;

const DT: f64 = 1.0 / 60.0;

struct Run {
    controller: VehicleController,
    vehicle: KinematicVehicle,
}

impl Run {
    fn new(data: &str, config: &Config) -> Self {
        let lane = Arc::new(LaneModel::from_path_data(data, &config.lane).unwrap());
        let vehicle = KinematicVehicle::new(
            VehicleDescriptor::compact_car(),
            lane.start_position(),
            lane.start_rotation(),
        );
        Self {
            controller: VehicleController::new(lane, config),
            vehicle,
        }
    }

    fn tick(&mut self) -> Vec<ControlEvent> {
        let outputs = self
            .controller
            .on_pre_physics_step(&self.vehicle.body_state(), DT);
        let commands = wheel_commands(
            &self.vehicle.descriptor().wheels,
            &outputs,
            self.controller.drive_train(),
        );
        self.vehicle.apply(&commands);
        self.vehicle.step(DT);
        outputs.events
    }
}

#[test]
fn straight_centerline_accelerates_to_target_speed() {
    let config = Config::default();
    let mut run = Run::new("M 0 0 L 0 -100", &config);
    assert!((run.vehicle.body_state().position.z + 3.0).abs() < 1e-9);

    let mut speeds = Vec::new();
    let mut gears = Vec::new();
    for _ in 0..300 {
        run.tick();
        speeds.push(run.controller.state().speed());
        gears.push(run.controller.state().gear());
    }

    let target = config.speed.target_speed;
    // Bang-bang control may overshoot by at most one tick of acceleration.
    let overshoot = 4.0 * config.speed.max_acceleration * config.speed.engine_force_scale / 150.0 * DT;
    assert!(
        speeds.iter().all(|&s| (0.0..=target + overshoot + 1e-9).contains(&s)),
        "{speeds:?}"
    );

    let reached = speeds
        .iter()
        .position(|&s| s >= target - 0.05)
        .expect("never reached the target speed");
    assert!(speeds[..=reached].windows(2).all(|w| w[1] >= w[0]));

    assert_eq!(gears[0], 1);
    assert!(gears.windows(2).all(|w| w[1] >= w[0]), "{gears:?}");
    assert_eq!(*gears.last().unwrap(), 2);

    let position = run.vehicle.body_state().position;
    assert!(position.x.abs() < 1e-6);
    assert!(position.z < -20.0);
}

#[test]
fn straight_run_comes_to_rest_near_the_goal() {
    let config = Config::default();
    let mut run = Run::new("M 0 0 L 0 -100", &config);

    let mut arrived_events = 0;
    for _ in 0..(150.0 / DT) as usize {
        arrived_events += run
            .tick()
            .iter()
            .filter(|e| matches!(e, ControlEvent::Arrived))
            .count();
        if run.controller.has_arrived() && run.vehicle.speed() == 0.0 {
            break;
        }
    }

    assert_eq!(arrived_events, 1);
    assert_eq!(run.vehicle.speed(), 0.0);
    let distance = run
        .controller
        .distance_to_goal(&run.vehicle.body_state().position);
    assert!(distance <= config.speed.deceleration_distance, "{distance}");
}
