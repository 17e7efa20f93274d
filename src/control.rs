// ================================
// src/control.rs - steering, speed and gear control laws
// ================================
use nalgebra::{Point2, Vector2};
use std::f64::consts::PI;
use tracing::{info, warn};

use crate::{
    config::{GearboxConfig, PursuitConfig, SpeedConfig},
    geometry::{PathShape, PerpendicularProbe},
};

/// Geometry of one successful pure-pursuit evaluation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PursuitSolution {
    /// Centre of the perpendicular probe (the current-heading reference).
    pub probe_center: Point2<f64>,
    /// First crossing of the probe with the centerline.
    pub target: Point2<f64>,
    /// Raw steering target, positive to the left.
    pub steer: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PursuitStatus {
    Tracking,
    /// No target this tick; the previous steering target is held.
    Holding { misses: u32 },
    /// Reported once, on the tick the miss streak reaches the warning limit.
    Degraded { misses: u32 },
}

/// Signed heading change from `a -> b` to `a -> c`, as a fraction of a half turn in `[-1, 1]`.
pub fn normalized_rotation(a: &Point2<f64>, b: &Point2<f64>, c: &Point2<f64>) -> f64 {
    let current = (b.y - a.y).atan2(b.x - a.x);
    let desired = (c.y - a.y).atan2(c.x - a.x);
    let rotation = (desired - current) / PI;
    if rotation > 1.0 {
        rotation - 2.0
    } else if rotation < -1.0 {
        rotation + 2.0
    } else {
        rotation
    }
}

// Pure Pursuit 제어
pub struct PurePursuitController {
    config: PursuitConfig,
    steer: f64,
    misses: u32,
}

impl PurePursuitController {
    pub fn new(config: PursuitConfig) -> Self {
        Self {
            config,
            steer: 0.0,
            misses: 0,
        }
    }

    /// Last raw steering target.
    pub fn steer(&self) -> f64 {
        self.steer
    }

    pub fn consecutive_misses(&self) -> u32 {
        self.misses
    }

    /// Probe ahead of `position` along `forward` and steer toward the centerline.
    pub fn steer_target(
        &self,
        position: &Point2<f64>,
        forward: &Vector2<f64>,
        center: &PathShape,
    ) -> Option<PursuitSolution> {
        let ahead = position + forward * self.config.probe_distance;
        let probe = PerpendicularProbe::new(
            *position,
            ahead,
            self.config.lookahead_bias,
            self.config.probe_length,
        );
        let target = center.intersections(&probe.shape()).first()?.point;

        let rotation = normalized_rotation(position, &probe.center, &target);
        let max = self.config.max_steer.abs();
        Some(PursuitSolution {
            probe_center: probe.center,
            target,
            steer: (-rotation).clamp(-max, max),
        })
    }

    /// Evaluate one tick, holding the previous target on a miss.
    pub fn update(
        &mut self,
        position: &Point2<f64>,
        forward: &Vector2<f64>,
        center: &PathShape,
    ) -> PursuitStatus {
        if let Some(solution) = self.steer_target(position, forward, center) {
            if self.misses >= self.config.miss_warning_ticks {
                info!("Pure pursuit reacquired the centerline after {} ticks", self.misses);
            }
            self.steer = solution.steer;
            self.misses = 0;
            return PursuitStatus::Tracking;
        }

        self.misses = self.misses.saturating_add(1);
        if self.misses == self.config.miss_warning_ticks {
            warn!(
                "Pure pursuit has missed the centerline for {} consecutive ticks, holding steer {:.3}",
                self.misses, self.steer
            );
            PursuitStatus::Degraded {
                misses: self.misses,
            }
        } else {
            PursuitStatus::Holding {
                misses: self.misses,
            }
        }
    }
}

// 속도 제어
pub struct SpeedController {
    config: SpeedConfig,
}

impl SpeedController {
    pub fn new(config: SpeedConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SpeedConfig {
        &self.config
    }

    /// Longitudinal force from the configured target speed and limits.
    pub fn force(&self, current_speed: f64, distance_to_goal: f64) -> f64 {
        self.compute_force(
            current_speed,
            self.config.target_speed,
            self.config.max_acceleration,
            self.config.max_deceleration,
            distance_to_goal,
        )
    }

    /// Bang-bang force toward `target_speed`, switching to the deceleration
    /// zone at or inside `deceleration_distance` of the goal.
    pub fn compute_force(
        &self,
        current_speed: f64,
        target_speed: f64,
        max_acceleration: f64,
        max_deceleration: f64,
        distance_to_goal: f64,
    ) -> f64 {
        let zone = self.config.deceleration_distance;
        if distance_to_goal > zone {
            if current_speed < target_speed {
                max_acceleration
            } else if current_speed > target_speed {
                -max_deceleration
            } else {
                0.0
            }
        } else {
            let desired = distance_to_goal / zone * self.config.zone_target_speed;
            if current_speed > desired {
                -self.config.zone_deceleration
            } else {
                0.0
            }
        }
    }
}

/// Outcome of one gearbox evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GearAction {
    /// A shift is in progress; no engine force is computed this tick.
    Shifting,
    ShiftedUp(u8),
    ShiftedDown(u8),
    /// In gear; engine force should be computed.
    Drive,
}

impl GearAction {
    /// Whether this tick's engine force must be zero.
    pub fn cuts_power(&self) -> bool {
        !matches!(self, GearAction::Drive)
    }
}

#[derive(Debug, Clone)]
pub struct GearBox {
    config: GearboxConfig,
    gear: u8,
    shift_timer: f64,
}

impl GearBox {
    pub fn new(config: GearboxConfig) -> Self {
        Self {
            config,
            gear: 1,
            shift_timer: 0.0,
        }
    }

    pub fn gear(&self) -> u8 {
        self.gear
    }

    pub fn shift_timer(&self) -> f64 {
        self.shift_timer
    }

    /// How much room is left in the current gear: 1 at the previous gear's
    /// top speed, 0 at this gear's top speed.
    pub fn power_factor(&self, speed: f64) -> f64 {
        let top = |gear: u8| self.config.max_speeds.get(gear as usize).copied().unwrap_or(0.0);
        let (upper, lower) = (top(self.gear), top(self.gear.saturating_sub(1)));
        (upper - speed) / (upper - lower)
    }

    /// Advance the shift timer or evaluate a shift. Call only with full ground contact.
    pub fn update(&mut self, speed: f64, dt: f64) -> GearAction {
        if self.shift_timer > 0.0 {
            self.shift_timer = (self.shift_timer - dt).max(0.0);
            return GearAction::Shifting;
        }

        let power_factor = self.power_factor(speed);
        if power_factor < self.config.upshift_factor && self.gear < self.config.max_gears() {
            self.shift(self.gear + 1, speed);
            GearAction::ShiftedUp(self.gear)
        } else if self.gear > 1 && power_factor > self.config.downshift_factor {
            self.shift(self.gear - 1, speed);
            GearAction::ShiftedDown(self.gear)
        } else {
            GearAction::Drive
        }
    }

    fn shift(&mut self, gear: u8, speed: f64) {
        info!("Shifting {} -> {} at speed {:.2}", self.gear, gear, speed);
        self.gear = gear;
        self.shift_timer = self.config.shift_time;
    }
}
