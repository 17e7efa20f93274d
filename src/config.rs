// ================================
// src/config.rs - tunables for lane building and vehicle control
// ================================
use anyhow::{Context, Result};
use serde::Deserialize;
use std::{collections::BTreeMap, env, fs};

use crate::vehicle::DriveTrain;

/// Default location of the TOML file when `CONFIG_PATH` is unset.
pub const DEFAULT_CONFIG_PATH: &str = "./lane_drive.toml";

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(default)]
pub struct Config {
    pub lane: LaneConfig,
    pub pursuit: PursuitConfig,
    pub steering: SteeringConfig,
    pub speed: SpeedConfig,
    pub gearbox: GearboxConfig,
    pub drive: DriveConfig,
    /// Scenario name -> lane path data (`M ...` grammar).
    pub scenarios: BTreeMap<String, String>,
}

impl Config {
    /// Load the configuration from the TOML file named by `CONFIG_PATH`.
    pub fn load() -> Result<Self> {
        let config_path =
            env::var("CONFIG_PATH").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        let config_str = fs::read_to_string(&config_path)
            .with_context(|| format!("reading config file {config_path}"))?;
        Self::from_toml_str(&config_str).with_context(|| format!("parsing {config_path}"))
    }

    pub fn from_toml_str(config_str: &str) -> Result<Self> {
        Ok(toml::from_str(config_str)?)
    }
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct LaneConfig {
    /// Fixed height of every ground-plane point.
    pub ground_height: f64,
    /// Arclength at which the vehicle is spawned.
    pub start_offset: f64,
    /// Distance before the end of the centerline used as the goal.
    pub end_offset: f64,
    /// Number of evenly spaced cross-sections along the centerline.
    pub cross_sections: usize,
    /// How far ahead along the tangent the cross-section probe is constructed.
    pub probe_reach: f64,
    /// Full length of the perpendicular cross-section probe.
    pub probe_length: f64,
    pub curve_samples_per_unit: f64,
    pub max_curve_samples: usize,
}

impl Default for LaneConfig {
    fn default() -> Self {
        Self {
            ground_height: 0.325,
            start_offset: 3.0,
            end_offset: 1.0,
            cross_sections: 20,
            probe_reach: 10.0,
            probe_length: 15.0,
            curve_samples_per_unit: 16.0,
            max_curve_samples: 800,
        }
    }
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct PursuitConfig {
    /// Distance from the vehicle to the far end of the forward probe segment.
    pub probe_distance: f64,
    /// Fraction of the probe distance by which the perpendicular is shifted
    /// from the probe midpoint (negative looks back toward the vehicle).
    pub lookahead_bias: f64,
    pub probe_length: f64,
    /// Raw steering targets are clamped to `[-max_steer, max_steer]`.
    pub max_steer: f64,
    /// Consecutive ticks without a centerline hit before control is reported degraded.
    pub miss_warning_ticks: u32,
}

impl Default for PursuitConfig {
    fn default() -> Self {
        Self {
            probe_distance: 20.0,
            lookahead_bias: -0.1,
            probe_length: 15.0,
            max_steer: 1.0,
            miss_warning_ticks: 30,
        }
    }
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct SteeringConfig {
    pub fps: f64,
    pub mass: f64,
    pub damping: f64,
}

impl Default for SteeringConfig {
    fn default() -> Self {
        Self {
            fps: 60.0,
            mass: 10.0,
            damping: 0.6,
        }
    }
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct SpeedConfig {
    pub target_speed: f64,
    pub max_acceleration: f64,
    pub max_deceleration: f64,
    pub deceleration_distance: f64,
    pub zone_deceleration: f64,
    pub zone_target_speed: f64,
    /// Multiplier from controller force to engine force.
    pub engine_force_scale: f64,
    pub arrival_radius: f64,
    /// Inside the deceleration zone, a speed at or below this counts as stopped.
    pub rest_speed: f64,
    pub arrival_brake_force: f64,
}

impl Default for SpeedConfig {
    fn default() -> Self {
        Self {
            target_speed: 8.0,
            max_acceleration: 8.0,
            max_deceleration: 4.0,
            deceleration_distance: 10.0,
            zone_deceleration: 64.0,
            zone_target_speed: 1.0,
            engine_force_scale: 12.0,
            arrival_radius: 1.0,
            rest_speed: 0.05,
            arrival_brake_force: 1_000_000.0,
        }
    }
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct GearboxConfig {
    /// Top speed per gear; index 0 is the zero floor below first gear.
    pub max_speeds: Vec<f64>,
    pub shift_time: f64,
    pub upshift_factor: f64,
    pub downshift_factor: f64,
}

impl Default for GearboxConfig {
    fn default() -> Self {
        Self {
            max_speeds: vec![0.0, 5.0, 9.0, 13.0, 17.0, 22.0],
            shift_time: 0.2,
            upshift_factor: 0.1,
            downshift_factor: 1.2,
        }
    }
}

impl GearboxConfig {
    pub fn max_gears(&self) -> u8 {
        self.max_speeds.len().saturating_sub(1).min(u8::MAX as usize) as u8
    }
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct DriveConfig {
    pub drive_train: DriveTrain,
    /// Upper bound on a single external tick, in seconds.
    pub max_tick: f64,
}

impl Default for DriveConfig {
    fn default() -> Self {
        Self {
            drive_train: DriveTrain::Awd,
            max_tick: 1.0 / 30.0,
        }
    }
}
