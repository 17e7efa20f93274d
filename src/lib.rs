// ================================
// src/lib.rs
// ================================
pub mod config;
pub mod control;
pub mod curve;
pub mod error;
pub mod geometry;
pub mod lane;
pub mod path; // lane path grammar
pub mod sim;
pub mod smoother;
pub mod tracker;
pub mod vehicle;

pub use config::Config;
pub use error::{LaneError, Result};
pub use lane::LaneModel;
pub use path::{parse_path, Path, PathCommand};
pub use vehicle::{BodyState, ControlEvent, ControlOutputs, VehicleController};
