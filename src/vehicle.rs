// ================================
// src/vehicle.rs - per-tick vehicle control loop and wheel command fan-out
// ================================
use nalgebra::{Point3, UnitQuaternion, Vector2, Vector3};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, info};

use crate::{
    config::{Config, DriveConfig},
    control::{GearAction, GearBox, PurePursuitController, PursuitStatus, SpeedController},
    geometry::project,
    lane::LaneModel,
    smoother::SpringSimulator,
    tracker::{SegmentTracker, SegmentTransition},
};

/// Wheels that must touch the ground before speed, gear and segment updates run.
pub const WHEELS_FOR_CONTACT: u8 = 4;

/// Which wheels receive engine force.
#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DriveTrain {
    Awd,
    Fwd,
    Rwd,
}

impl DriveTrain {
    pub fn drives(&self, axle: DriveAxle) -> bool {
        match self {
            DriveTrain::Awd => true,
            DriveTrain::Fwd => axle == DriveAxle::Front,
            DriveTrain::Rwd => axle == DriveAxle::Rear,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriveAxle {
    Front,
    Rear,
}

/// A wheel as handed over by the asset loader.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WheelDescriptor {
    /// Mount point in the vehicle frame (forward is `-z`).
    pub position: Point3<f64>,
    pub is_steering: bool,
    pub drive_axle: DriveAxle,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollisionShapeKind {
    Box,
    Sphere,
    Cylinder,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CollisionShapeDescriptor {
    pub kind: CollisionShapeKind,
    /// Half extents along each vehicle axis.
    pub extents: Vector3<f64>,
    pub offset: Vector3<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct VehicleDescriptor {
    pub wheels: Vec<WheelDescriptor>,
    pub collision: Vec<CollisionShapeDescriptor>,
}

impl VehicleDescriptor {
    /// Four wheels, front steering, one box chassis.
    pub fn compact_car() -> Self {
        let wheel = |x: f64, z: f64, drive_axle: DriveAxle| WheelDescriptor {
            position: Point3::new(x, 0.0, z),
            is_steering: drive_axle == DriveAxle::Front,
            drive_axle,
        };
        Self {
            wheels: vec![
                wheel(-0.8, -1.3, DriveAxle::Front),
                wheel(0.8, -1.3, DriveAxle::Front),
                wheel(-0.8, 1.3, DriveAxle::Rear),
                wheel(0.8, 1.3, DriveAxle::Rear),
            ],
            collision: vec![CollisionShapeDescriptor {
                kind: CollisionShapeKind::Box,
                extents: Vector3::new(0.9, 0.4, 2.0),
                offset: Vector3::new(0.0, 0.3, 0.0),
            }],
        }
    }

    /// Distance between the mean front and mean rear wheel positions.
    pub fn wheelbase(&self) -> Option<f64> {
        let axle_z = |axle: DriveAxle| {
            let zs: Vec<f64> = self
                .wheels
                .iter()
                .filter(|w| w.drive_axle == axle)
                .map(|w| w.position.z)
                .collect();
            (!zs.is_empty()).then(|| zs.iter().sum::<f64>() / zs.len() as f64)
        };
        let base = (axle_z(DriveAxle::Rear)? - axle_z(DriveAxle::Front)?).abs();
        (base > 0.0).then_some(base)
    }

    /// Axis-aligned bounds of all collision shapes in the vehicle frame.
    pub fn collision_bounds(&self) -> Option<(Point3<f64>, Point3<f64>)> {
        self.collision.iter().fold(None, |acc, shape| {
            let extents = match shape.kind {
                CollisionShapeKind::Sphere => Vector3::repeat(shape.extents.x),
                CollisionShapeKind::Box | CollisionShapeKind::Cylinder => shape.extents,
            };
            let min = Point3::from(shape.offset - extents);
            let max = Point3::from(shape.offset + extents);
            Some(match acc {
                None => (min, max),
                Some((lo, hi)) => (lo.inf(&min), hi.sup(&max)),
            })
        })
    }
}

/// Pose and motion read from the dynamics engine before a physics step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BodyState {
    pub position: Point3<f64>,
    pub orientation: UnitQuaternion<f64>,
    pub velocity: Vector3<f64>,
    pub ground_contacts: u8,
}

impl BodyState {
    /// Unit forward axis in world space.
    pub fn forward(&self) -> Vector3<f64> {
        self.orientation * Vector3::new(0.0, 0.0, -1.0)
    }

    /// Signed speed along the forward axis.
    pub fn forward_speed(&self) -> f64 {
        self.velocity.dot(&self.forward())
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ControlEvent {
    SegmentTransition(SegmentTransition),
    /// The centerline has been out of the probe's reach for `misses` ticks.
    ControlDegraded { misses: u32 },
    /// The vehicle came to rest at the goal; the brake is now held.
    Arrived,
}

/// Commands for the dynamics engine. `engine_force` and `brake_force` are per wheel.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ControlOutputs {
    pub engine_force: f64,
    pub brake_force: f64,
    pub steering: f64,
    pub events: Vec<ControlEvent>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WheelCommand {
    pub wheel: usize,
    pub engine_force: f64,
    pub brake_force: f64,
    pub steering: f64,
}

/// Fan the scalar outputs out to individual wheels.
///
/// Engine force and brake go to the wheels driven by `drive_train`,
/// steering only to steering wheels.
pub fn wheel_commands(
    wheels: &[WheelDescriptor],
    outputs: &ControlOutputs,
    drive_train: DriveTrain,
) -> Vec<WheelCommand> {
    wheels
        .iter()
        .enumerate()
        .map(|(wheel, descriptor)| {
            let driven = drive_train.drives(descriptor.drive_axle);
            WheelCommand {
                wheel,
                engine_force: if driven { outputs.engine_force } else { 0.0 },
                brake_force: if driven { outputs.brake_force } else { 0.0 },
                steering: if descriptor.is_steering {
                    outputs.steering
                } else {
                    0.0
                },
            }
        })
        .collect()
}

/// Snapshot of the controller after its latest tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VehicleControlState {
    position: Point3<f64>,
    orientation: UnitQuaternion<f64>,
    speed: f64,
    steer_target_raw: f64,
    steer_smoothed: f64,
    gear: u8,
    shift_timer: f64,
    current_segment: usize,
    previous_segment: usize,
}

impl VehicleControlState {
    pub fn position(&self) -> Point3<f64> {
        self.position
    }

    pub fn orientation(&self) -> UnitQuaternion<f64> {
        self.orientation
    }

    pub fn speed(&self) -> f64 {
        self.speed
    }

    pub fn steer_target_raw(&self) -> f64 {
        self.steer_target_raw
    }

    pub fn steer_smoothed(&self) -> f64 {
        self.steer_smoothed
    }

    pub fn gear(&self) -> u8 {
        self.gear
    }

    pub fn shift_timer(&self) -> f64 {
        self.shift_timer
    }

    pub fn current_segment(&self) -> usize {
        self.current_segment
    }

    pub fn previous_segment(&self) -> usize {
        self.previous_segment
    }
}

pub struct VehicleController {
    lane: Arc<LaneModel>,
    drive: DriveConfig,
    tracker: SegmentTracker,
    pursuit: PurePursuitController,
    smoother: SpringSimulator,
    speed_control: SpeedController,
    gearbox: GearBox,
    /// Engine force stays applied between ticks until the next decision.
    engine_force: f64,
    arrived: bool,
    state: VehicleControlState,
}

impl VehicleController {
    pub fn new(lane: Arc<LaneModel>, config: &Config) -> Self {
        let state = VehicleControlState {
            position: lane.start_position(),
            orientation: lane.start_rotation(),
            speed: 0.0,
            steer_target_raw: 0.0,
            steer_smoothed: 0.0,
            gear: 1,
            shift_timer: 0.0,
            current_segment: 0,
            previous_segment: 0,
        };
        Self {
            drive: config.drive.clone(),
            tracker: SegmentTracker::new(),
            pursuit: PurePursuitController::new(config.pursuit.clone()),
            smoother: SpringSimulator::from_config(&config.steering),
            speed_control: SpeedController::new(config.speed.clone()),
            gearbox: GearBox::new(config.gearbox.clone()),
            engine_force: 0.0,
            arrived: false,
            state,
            lane,
        }
    }

    pub fn lane(&self) -> &Arc<LaneModel> {
        &self.lane
    }

    pub fn state(&self) -> &VehicleControlState {
        &self.state
    }

    pub fn drive_train(&self) -> DriveTrain {
        self.drive.drive_train
    }

    pub fn has_arrived(&self) -> bool {
        self.arrived
    }

    /// Ground-plane distance from `position` to the lane's goal.
    pub fn distance_to_goal(&self, position: &Point3<f64>) -> f64 {
        (project(position) - project(&self.lane.end_position())).norm()
    }

    /// At the goal at zone speed, or stopped anywhere inside the deceleration zone.
    fn is_arrival(&self, distance: f64, speed: f64) -> bool {
        let speed_config = self.speed_control.config();
        let at_goal =
            distance <= speed_config.arrival_radius && speed <= speed_config.zone_target_speed;
        let stopped_in_zone = distance <= speed_config.deceleration_distance
            && speed.abs() <= speed_config.rest_speed;
        at_goal || stopped_in_zone
    }

    /// Run one control tick from the body state the dynamics engine is about to integrate.
    pub fn on_pre_physics_step(&mut self, body: &BodyState, dt: f64) -> ControlOutputs {
        let dt = if dt > self.drive.max_tick {
            debug!("Clamping tick of {dt:.4}s to {:.4}s", self.drive.max_tick);
            self.drive.max_tick
        } else {
            dt.max(0.0)
        };
        let mut events = Vec::new();

        let speed = body.forward_speed();
        let grounded = body.ground_contacts >= WHEELS_FOR_CONTACT;
        if grounded {
            if let Some(transition) = self.tracker.update(&body.position, self.lane.segments()) {
                events.push(ControlEvent::SegmentTransition(transition));
            }
        }

        let forward = body.forward();
        let heading = Vector2::new(forward.x, forward.z)
            .try_normalize(f64::EPSILON)
            .unwrap_or_else(Vector2::zeros);
        let position = project(&body.position);
        if let PursuitStatus::Degraded { misses } =
            self.pursuit.update(&position, &heading, self.lane.center_shape())
        {
            events.push(ControlEvent::ControlDegraded { misses });
        }
        self.smoother.target = self.pursuit.steer();

        let mut brake_force = 0.0;
        if grounded && !self.arrived {
            let distance = self.distance_to_goal(&body.position);
            if self.is_arrival(distance, speed) {
                info!("Arrived {distance:.2} units from the goal at speed {speed:.2}");
                self.arrived = true;
                events.push(ControlEvent::Arrived);
            } else {
                match self.gearbox.update(speed, dt) {
                    GearAction::Shifting => {}
                    GearAction::ShiftedUp(_) | GearAction::ShiftedDown(_) => self.engine_force = 0.0,
                    GearAction::Drive => {
                        self.engine_force = self.speed_control.force(speed, distance)
                            * self.speed_control.config().engine_force_scale;
                    }
                }
            }
        }
        if self.arrived {
            self.engine_force = 0.0;
            brake_force = self.speed_control.config().arrival_brake_force;
        }

        self.smoother.simulate(dt);
        let steering = self.smoother.position();

        self.state = VehicleControlState {
            position: body.position,
            orientation: body.orientation,
            speed,
            steer_target_raw: self.pursuit.steer(),
            steer_smoothed: steering,
            gear: self.gearbox.gear(),
            shift_timer: self.gearbox.shift_timer(),
            current_segment: self.tracker.current(),
            previous_segment: self.tracker.previous(),
        };

        ControlOutputs {
            engine_force: self.engine_force,
            brake_force,
            steering,
            events,
        }
    }
}
