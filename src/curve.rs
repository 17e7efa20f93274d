// ================================
// src/curve.rs - flatten paths into ground-plane polylines
// ================================
use nalgebra::{Point2, Point3};

use crate::{
    config::LaneConfig,
    geometry::{lift, Piece},
    path::{Path, PathCommand},
};

const MIN_CUBIC_SAMPLES: usize = 8;

/// Axis-aligned box in the ground (X/Z) plane.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aabb {
    pub min: Point2<f64>,
    pub max: Point2<f64>,
}

impl Aabb {
    pub fn from_points<'a>(points: impl IntoIterator<Item = &'a Point3<f64>>) -> Option<Self> {
        points.into_iter().fold(None, |acc, p| {
            let xz = Point2::new(p.x, p.z);
            Some(match acc {
                None => Aabb { min: xz, max: xz },
                Some(b) => Aabb {
                    min: b.min.inf(&xz),
                    max: b.max.sup(&xz),
                },
            })
        })
    }

    /// Inclusive containment test on `(x, z)`.
    pub fn contains(&self, x: f64, z: f64) -> bool {
        x >= self.min.x && x <= self.max.x && z >= self.min.y && z <= self.max.y
    }
}

/// Polyline geometry at ground height, one stroke per `MoveTo`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Curve {
    pub strokes: Vec<Vec<Point3<f64>>>,
}

impl Curve {
    pub fn points(&self) -> impl Iterator<Item = &Point3<f64>> {
        self.strokes.iter().flatten()
    }

    pub fn bounding_box(&self) -> Option<Aabb> {
        Aabb::from_points(self.points())
    }
}

#[derive(Debug, Clone)]
pub struct CurveBuilder {
    ground_height: f64,
    samples_per_unit: f64,
    max_samples: usize,
}

impl CurveBuilder {
    pub fn new(config: &LaneConfig) -> Self {
        Self {
            ground_height: config.ground_height,
            samples_per_unit: config.curve_samples_per_unit,
            max_samples: config.max_curve_samples.max(MIN_CUBIC_SAMPLES),
        }
    }

    /// Sample count for a cubic, from the length of its control polygon.
    fn cubic_samples(&self, piece: &Piece) -> usize {
        let Piece::Cubic {
            from,
            ctrl1,
            ctrl2,
            to,
        } = *piece
        else {
            return 1;
        };
        let polygon = (ctrl1 - from).norm() + (ctrl2 - ctrl1).norm() + (to - ctrl2).norm();
        ((polygon * self.samples_per_unit).ceil() as usize)
            .clamp(MIN_CUBIC_SAMPLES, self.max_samples)
    }

    pub fn build(&self, path: &Path) -> Curve {
        let mut curve = Curve::default();
        let mut cursor = Point2::origin();
        let ground = |p: &Point2<f64>| lift(p, self.ground_height);

        for command in path.commands() {
            match *command {
                PathCommand::MoveTo(p) => {
                    curve.strokes.push(vec![ground(&p)]);
                    cursor = p;
                }
                PathCommand::LineTo(to) => {
                    stroke(&mut curve, ground(&cursor)).push(ground(&to));
                    cursor = to;
                }
                PathCommand::CubicTo { ctrl1, ctrl2, to } => {
                    let piece = Piece::Cubic {
                        from: cursor,
                        ctrl1,
                        ctrl2,
                        to,
                    };
                    let samples = self.cubic_samples(&piece);
                    let points = stroke(&mut curve, ground(&cursor));
                    points.extend(
                        (1..=samples).map(|i| ground(&piece.point(i as f64 / samples as f64))),
                    );
                    cursor = to;
                }
            }
        }

        curve
    }
}

/// The stroke being drawn, starting one at `start` if the path had no `MoveTo`.
fn stroke(curve: &mut Curve, start: Point3<f64>) -> &mut Vec<Point3<f64>> {
    if curve.strokes.is_empty() {
        curve.strokes.push(vec![start]);
    }
    let last = curve.strokes.len() - 1;
    &mut curve.strokes[last]
}
