// ================================
// src/bin/lane_drive.rs - headless lane-following run
// ================================
use anyhow::{Context, Result};
use lane_pursuit::{
    sim::{KinematicVehicle, VehicleDynamics},
    vehicle::{wheel_commands, VehicleDescriptor},
    Config, ControlEvent, LaneError, LaneModel, VehicleController,
};
use std::{env, sync::Arc};
use tracing::{info, warn};

const TICK_RATE: f64 = 60.0;
const DEFAULT_DURATION: f64 = 60.0;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| {
                    tracing_subscriber::EnvFilter::new("lane_pursuit=info,lane_drive=info")
                }),
        )
        .init();

    let config = Config::load()?;
    let scenario = env::var("SCENARIO").unwrap_or_else(|_| "straight".to_string());
    let duration = match env::var("DURATION") {
        Ok(value) => value
            .parse::<f64>()
            .with_context(|| format!("DURATION must be a number of seconds, got {value:?}"))?,
        Err(_) => DEFAULT_DURATION,
    };

    let data = config
        .scenarios
        .get(&scenario)
        .ok_or_else(|| LaneError::UnknownScenario(scenario.clone()))?;
    let lane = Arc::new(
        LaneModel::from_path_data(data, &config.lane)
            .with_context(|| format!("building scenario {scenario}"))?,
    );
    info!(
        "Scenario {scenario}: start {:?}, goal {:?}, {} segments",
        lane.start_position(),
        lane.end_position(),
        lane.segments().len()
    );

    let descriptor = VehicleDescriptor::compact_car();
    if let Some((min, max)) = descriptor.collision_bounds() {
        info!("Chassis bounds {min:?} .. {max:?}");
    }
    let mut vehicle = KinematicVehicle::new(descriptor, lane.start_position(), lane.start_rotation());
    let mut controller = VehicleController::new(lane.clone(), &config);

    let dt = 1.0 / TICK_RATE;
    let ticks = (duration * TICK_RATE).ceil() as usize;
    for tick in 0..ticks {
        let outputs = controller.on_pre_physics_step(&vehicle.body_state(), dt);
        for event in &outputs.events {
            match event {
                ControlEvent::SegmentTransition(t) => {
                    info!("Segment {} -> {}", t.old_index, t.new_index)
                }
                ControlEvent::ControlDegraded { misses } => {
                    warn!("Steering held for {misses} ticks without a centerline target")
                }
                ControlEvent::Arrived => info!("Arrived after {:.2}s", tick as f64 * dt),
            }
        }

        let commands =
            wheel_commands(&vehicle.descriptor().wheels, &outputs, controller.drive_train());
        vehicle.apply(&commands);
        vehicle.step(dt);

        if tick % TICK_RATE as usize == 0 {
            let state = controller.state();
            info!(
                "t={:5.1}s speed {:5.2} gear {} steer {:+.3} segment {} goal {:.1}",
                tick as f64 * dt,
                state.speed(),
                state.gear(),
                state.steer_smoothed(),
                state.current_segment(),
                controller.distance_to_goal(&state.position())
            );
        }
        if controller.has_arrived() && vehicle.speed() == 0.0 {
            break;
        }
    }

    let state = controller.state();
    info!(
        "Finished: {:.1} units from goal, speed {:.2}, gear {}",
        controller.distance_to_goal(&state.position()),
        state.speed(),
        state.gear()
    );
    Ok(())
}
