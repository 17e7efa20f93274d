// ================================
// src/smoother.rs - fixed-rate spring-damper steering filter
// ================================
//! The filter always advances in whole internal frames of `1 / fps` seconds,
//! however long the external tick is. The leftover time is carried into the
//! next tick and the public state is interpolated between the last two frames,
//! so the response is the same at any external tick rate.
use crate::config::SteeringConfig;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimulationFrame {
    pub position: f64,
    pub velocity: f64,
}

/// One internal frame of the spring pulling `source` toward `dest`.
pub fn spring(source: f64, dest: f64, velocity: f64, mass: f64, damping: f64) -> SimulationFrame {
    let acceleration = (dest - source) / mass;
    let velocity = (velocity + acceleration) * damping;
    SimulationFrame {
        position: source + velocity,
        velocity,
    }
}

#[derive(Debug, Clone)]
pub struct SpringSimulator {
    pub target: f64,
    position: f64,
    velocity: f64,
    mass: f64,
    damping: f64,
    frame_time: f64,
    /// Time not yet consumed by a whole frame.
    offset: f64,
    /// The two most recent frames, oldest first.
    cache: [SimulationFrame; 2],
}

impl SpringSimulator {
    pub fn new(fps: f64, mass: f64, damping: f64, start_position: f64, start_velocity: f64) -> Self {
        let start = SimulationFrame {
            position: start_position,
            velocity: start_velocity,
        };
        Self {
            target: 0.0,
            position: start_position,
            velocity: start_velocity,
            mass,
            damping,
            frame_time: 1.0 / fps,
            offset: 0.0,
            cache: [start; 2],
        }
    }

    pub fn from_config(config: &SteeringConfig) -> Self {
        Self::new(config.fps, config.mass, config.damping, 0.0, 0.0)
    }

    pub fn set_fps(&mut self, fps: f64) {
        self.frame_time = 1.0 / fps;
    }

    pub fn position(&self) -> f64 {
        self.position
    }

    pub fn velocity(&self) -> f64 {
        self.velocity
    }

    /// Advance by `time_step` seconds of external time.
    pub fn simulate(&mut self, time_step: f64) {
        self.generate_frames(time_step);

        let alpha = self.offset / self.frame_time;
        let [from, to] = self.cache;
        self.position = lerp(from.position, to.position, alpha);
        self.velocity = lerp(from.velocity, to.velocity, alpha);
    }

    fn generate_frames(&mut self, time_step: f64) {
        let total = self.offset + time_step;
        let frames = (total / self.frame_time).floor() as usize;
        self.offset = total % self.frame_time;

        for _ in 0..frames {
            let last = self.cache[1];
            let next = spring(last.position, self.target, last.velocity, self.mass, self.damping);
            self.cache = [last, next];
        }
    }
}

fn lerp(a: f64, b: f64, t: f64) -> f64 {
    a + (b - a) * t
}
