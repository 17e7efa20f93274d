// ================================
// src/sim.rs - kinematic stand-in for the vehicle dynamics engine
// ================================
use nalgebra::{Point3, UnitQuaternion, Vector3};

use crate::vehicle::{BodyState, VehicleDescriptor, WheelCommand};

const DEFAULT_MASS: f64 = 150.0;
const DEFAULT_WHEELBASE: f64 = 2.6;
/// Road-wheel angle in radians at a steering value of 1.
const DEFAULT_MAX_WHEEL_ANGLE: f64 = 1.0;

/// The part of a physics engine the control loop talks to.
pub trait VehicleDynamics {
    fn body_state(&self) -> BodyState;
    fn apply(&mut self, commands: &[WheelCommand]);
    fn step(&mut self, dt: f64);
}

/// Point-mass longitudinal model with kinematic bicycle yaw. No slip, no suspension.
#[derive(Debug, Clone)]
pub struct KinematicVehicle {
    descriptor: VehicleDescriptor,
    position: Point3<f64>,
    /// Rotation about +Y; zero faces `-z`, positive turns left.
    yaw: f64,
    speed: f64,
    mass: f64,
    wheelbase: f64,
    max_wheel_angle: f64,
    ground_contacts: u8,
    engine_force: f64,
    brake_force: f64,
    steering: f64,
}

impl KinematicVehicle {
    pub fn new(
        descriptor: VehicleDescriptor,
        position: Point3<f64>,
        rotation: UnitQuaternion<f64>,
    ) -> Self {
        let forward = rotation * Vector3::new(0.0, 0.0, -1.0);
        let wheelbase = descriptor.wheelbase().unwrap_or(DEFAULT_WHEELBASE);
        let ground_contacts = descriptor.wheels.len().min(u8::MAX as usize) as u8;
        Self {
            descriptor,
            position,
            yaw: (-forward.x).atan2(-forward.z),
            speed: 0.0,
            mass: DEFAULT_MASS,
            wheelbase,
            max_wheel_angle: DEFAULT_MAX_WHEEL_ANGLE,
            ground_contacts,
            engine_force: 0.0,
            brake_force: 0.0,
            steering: 0.0,
        }
    }

    pub fn with_mass(mut self, mass: f64) -> Self {
        self.mass = mass;
        self
    }

    pub fn descriptor(&self) -> &VehicleDescriptor {
        &self.descriptor
    }

    pub fn speed(&self) -> f64 {
        self.speed
    }

    pub fn set_ground_contacts(&mut self, contacts: u8) {
        self.ground_contacts = contacts;
    }

    fn orientation(&self) -> UnitQuaternion<f64> {
        UnitQuaternion::from_axis_angle(&Vector3::y_axis(), self.yaw)
    }
}

impl VehicleDynamics for KinematicVehicle {
    fn body_state(&self) -> BodyState {
        let orientation = self.orientation();
        BodyState {
            position: self.position,
            orientation,
            velocity: orientation * Vector3::new(0.0, 0.0, -self.speed),
            ground_contacts: self.ground_contacts,
        }
    }

    fn apply(&mut self, commands: &[WheelCommand]) {
        self.engine_force = commands.iter().map(|c| c.engine_force).sum();
        self.brake_force = commands.iter().map(|c| c.brake_force).sum();

        let steered: Vec<f64> = commands
            .iter()
            .filter(|c| {
                self.descriptor
                    .wheels
                    .get(c.wheel)
                    .is_some_and(|w| w.is_steering)
            })
            .map(|c| c.steering)
            .collect();
        if !steered.is_empty() {
            self.steering = steered.iter().sum::<f64>() / steered.len() as f64;
        }
    }

    fn step(&mut self, dt: f64) {
        if self.ground_contacts > 0 {
            let next = self.speed + self.engine_force / self.mass * dt;
            // Engine braking brings the car to rest; it does not reverse it.
            self.speed = if self.speed != 0.0 && next.signum() != self.speed.signum() {
                0.0
            } else {
                next
            };
            let braking = self.brake_force.abs() / self.mass * dt;
            if self.speed.abs() <= braking {
                self.speed = 0.0;
            } else {
                self.speed -= braking * self.speed.signum();
            }
        }

        let wheel_angle = (self.steering * self.max_wheel_angle).tan();
        self.yaw += self.speed / self.wheelbase * wheel_angle * dt;

        let forward = self.orientation() * Vector3::new(0.0, 0.0, -1.0);
        self.position += forward * (self.speed * dt);
    }
}
