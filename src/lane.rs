// ================================
// src/lane.rs - lane model, cross-sections and lane segments
// ================================
use nalgebra::{Point2, Point3, UnitQuaternion, Vector2, Vector3};
use tracing::{debug, info};

use crate::{
    config::LaneConfig,
    curve::{Aabb, Curve, CurveBuilder},
    error::{LaneError, Result},
    geometry::{lift, PathShape, PerpendicularProbe},
    path::{parse_path, Path, PathCommand},
};

/// Fallback centerline direction where the sampler has no tangent.
const DEFAULT_TANGENT: Vector2<f64> = Vector2::new(0.0, -1.0);
/// Cross-section probes are re-centred exactly on the sampled point.
const CROSS_SECTION_BIAS: f64 = -0.5;

/// A slice across the lane at one centerline arclength.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CrossSection {
    pub arclength: f64,
    pub point_left: Point3<f64>,
    pub point_right: Point3<f64>,
    /// Arclength of `point_left` on the left boundary.
    pub offset_left: f64,
    /// Arclength of `point_right` on the right boundary.
    pub offset_right: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SegmentCorners {
    pub left_start: Point3<f64>,
    pub right_start: Point3<f64>,
    pub left_end: Point3<f64>,
    pub right_end: Point3<f64>,
}

/// Strip of lane between two consecutive cross-sections.
#[derive(Debug, Clone)]
pub struct LaneSegment {
    pub index: usize,
    pub bounding_box: Aabb,
    /// Closing edges plus both boundary sub-paths.
    pub outline: Path,
    pub curve: Curve,
    pub corners: SegmentCorners,
}

#[derive(Debug, Clone)]
struct Boundaries {
    left: Path,
    right: Path,
    left_shape: PathShape,
    right_shape: PathShape,
}

#[derive(Debug, Clone)]
pub struct LaneModel {
    center: Path,
    center_shape: PathShape,
    boundaries: Option<Boundaries>,
    start_position: Point3<f64>,
    start_rotation: UnitQuaternion<f64>,
    end_position: Point3<f64>,
    cross_sections: Vec<CrossSection>,
    segments: Vec<LaneSegment>,
}

impl LaneModel {
    /// Lane with left and right boundaries; all segments are built here.
    pub fn bounded(left: Path, center: Path, right: Path, config: &LaneConfig) -> Result<Self> {
        let mut lane = Self::with_center(center, config)?;
        let boundaries = Boundaries {
            left_shape: PathShape::from_path(&left),
            right_shape: PathShape::from_path(&right),
            left,
            right,
        };

        lane.cross_sections = sample_cross_sections(&lane.center_shape, &boundaries, config);
        if lane.cross_sections.len() < 2 {
            return Err(LaneError::DegenerateLane {
                usable_sections: lane.cross_sections.len(),
            });
        }
        lane.segments = build_segments(&lane.cross_sections, &boundaries, config);
        lane.boundaries = Some(boundaries);

        info!(
            "Lane built: center {:.2} units, {} cross-sections, {} segments",
            lane.center_shape.length(),
            lane.cross_sections.len(),
            lane.segments.len()
        );
        Ok(lane)
    }

    /// Lane described by its centerline alone. It has no segments.
    pub fn driver_only(center: Path, config: &LaneConfig) -> Result<Self> {
        let lane = Self::with_center(center, config)?;
        info!(
            "Driver-only lane built: center {:.2} units",
            lane.center_shape.length()
        );
        Ok(lane)
    }

    /// Parse lane data: one subpath is a bare centerline, three are
    /// left boundary, centerline and right boundary in that order.
    pub fn from_path_data(data: &str, config: &LaneConfig) -> Result<Self> {
        let mut subpaths = parse_path(data)?.subpaths().into_iter();
        match (subpaths.next(), subpaths.next(), subpaths.next(), subpaths.next()) {
            (Some(center), None, None, None) => Self::driver_only(center, config),
            (Some(left), Some(center), Some(right), None) => {
                Self::bounded(left, center, right, config)
            }
            _ => Err(LaneError::malformed(
                0,
                "lane data must hold one centerline or left, center and right paths",
            )),
        }
    }

    fn with_center(center: Path, config: &LaneConfig) -> Result<Self> {
        let center_shape = PathShape::from_path(&center);
        let length = center_shape.length();
        let required = config.start_offset.max(config.end_offset);
        let too_short = LaneError::CenterTooShort { length, required };

        if length <= required {
            return Err(too_short);
        }
        let start = center_shape
            .point_at(config.start_offset)
            .ok_or_else(|| too_short.clone())?;
        let end = center_shape
            .point_at(length - config.end_offset)
            .ok_or(too_short)?;

        let tangent = center_shape
            .tangent_at(config.start_offset)
            .unwrap_or(DEFAULT_TANGENT);

        Ok(Self {
            center,
            center_shape,
            boundaries: None,
            start_position: lift(&start, config.ground_height),
            start_rotation: heading_rotation(&tangent),
            end_position: lift(&end, config.ground_height),
            cross_sections: Vec::new(),
            segments: Vec::new(),
        })
    }

    pub fn center(&self) -> &Path {
        &self.center
    }

    pub fn center_shape(&self) -> &PathShape {
        &self.center_shape
    }

    pub fn left(&self) -> Option<&Path> {
        self.boundaries.as_ref().map(|b| &b.left)
    }

    pub fn right(&self) -> Option<&Path> {
        self.boundaries.as_ref().map(|b| &b.right)
    }

    pub fn is_driver_only(&self) -> bool {
        self.boundaries.is_none()
    }

    pub fn start_position(&self) -> Point3<f64> {
        self.start_position
    }

    pub fn start_rotation(&self) -> UnitQuaternion<f64> {
        self.start_rotation
    }

    pub fn end_position(&self) -> Point3<f64> {
        self.end_position
    }

    pub fn cross_sections(&self) -> &[CrossSection] {
        &self.cross_sections
    }

    pub fn segments(&self) -> &[LaneSegment] {
        &self.segments
    }
}

/// Rotation taking the vehicle's forward axis `(0, 0, -1)` onto `tangent`.
pub fn heading_rotation(tangent: &Vector2<f64>) -> UnitQuaternion<f64> {
    let forward = Vector3::new(0.0, 0.0, -1.0);
    let target = Vector3::new(tangent.x, 0.0, tangent.y).normalize();
    UnitQuaternion::rotation_between(&forward, &target)
        .unwrap_or_else(|| UnitQuaternion::from_axis_angle(&Vector3::y_axis(), std::f64::consts::PI))
}

fn sample_cross_sections(
    center: &PathShape,
    boundaries: &Boundaries,
    config: &LaneConfig,
) -> Vec<CrossSection> {
    let count = config.cross_sections.max(2);
    let interval = center.length() / (count - 1) as f64;
    let mut sections = Vec::with_capacity(count);

    for i in 0..count {
        let arclength = i as f64 * interval;
        let Some(point) = center.point_at(arclength) else {
            debug!("Cross-section {i}: no centerline point at {arclength:.3}");
            continue;
        };
        let tangent = center.tangent_at(arclength).unwrap_or(DEFAULT_TANGENT);
        let reach = point + tangent * config.probe_reach;
        let probe = PerpendicularProbe::new(point, reach, CROSS_SECTION_BIAS, config.probe_length).shape();

        let left = boundaries.left_shape.intersections(&probe).into_iter().next();
        let right = boundaries.right_shape.intersections(&probe).into_iter().next();
        match (left, right) {
            (Some(left), Some(right)) => sections.push(CrossSection {
                arclength,
                point_left: lift(&left.point, config.ground_height),
                point_right: lift(&right.point, config.ground_height),
                offset_left: left.offset,
                offset_right: right.offset,
            }),
            (left, right) => debug!(
                "Dropping cross-section {i} at {arclength:.3}: left hit {}, right hit {}",
                left.is_some(),
                right.is_some()
            ),
        }
    }

    sections
}

fn build_segments(
    sections: &[CrossSection],
    boundaries: &Boundaries,
    config: &LaneConfig,
) -> Vec<LaneSegment> {
    let builder = CurveBuilder::new(config);

    sections
        .windows(2)
        .enumerate()
        .map(|(index, pair)| {
            let (a, b) = (&pair[0], &pair[1]);
            let left = boundaries.left_shape.subpath(a.offset_left, b.offset_left);
            let right = boundaries.right_shape.subpath(a.offset_right, b.offset_right);

            let endpoints = |shape: &PathShape, fallback: Point2<f64>| {
                (
                    shape.first_point().unwrap_or(fallback),
                    shape.last_point().unwrap_or(fallback),
                )
            };
            let (left_start, left_end) = endpoints(&left, Point2::new(a.point_left.x, a.point_left.z));
            let (right_start, right_end) =
                endpoints(&right, Point2::new(a.point_right.x, a.point_right.z));

            let mut outline = Path::from_commands(vec![
                PathCommand::MoveTo(left_start),
                PathCommand::LineTo(right_start),
            ]);
            outline.extend(&left.to_path());
            outline.extend(&right.to_path());
            outline.extend(&Path::from_commands(vec![
                PathCommand::MoveTo(left_end),
                PathCommand::LineTo(right_end),
            ]));

            let curve = builder.build(&outline);
            let bounding_box = curve.bounding_box().unwrap_or(Aabb {
                min: left_start,
                max: left_start,
            });
            let ground = |p: &Point2<f64>| lift(p, config.ground_height);

            LaneSegment {
                index,
                bounding_box,
                outline,
                curve,
                corners: SegmentCorners {
                    left_start: ground(&left_start),
                    right_start: ground(&right_start),
                    left_end: ground(&left_end),
                    right_end: ground(&right_end),
                },
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const STRAIGHT: &str = "M -5 0 L -5 -100 M 0 0 L 0 -100 M 5 0 L 5 -100";

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-6
    }

    #[test]
    fn straight_lane_poses() {
        let lane = LaneModel::from_path_data(STRAIGHT, &LaneConfig::default()).unwrap();
        assert!(!lane.is_driver_only());
        assert!((lane.start_position() - Point3::new(0.0, 0.325, -3.0)).norm() < 1e-9);
        assert!((lane.end_position() - Point3::new(0.0, 0.325, -99.0)).norm() < 1e-9);
        assert!(lane.start_rotation().angle() < 1e-9);
    }

    #[test]
    fn start_rotation_follows_the_tangent() {
        let config = LaneConfig::default();
        let east = LaneModel::from_path_data("M 0 0 L 50 0", &config).unwrap();
        let forward = east.start_rotation() * Vector3::new(0.0, 0.0, -1.0);
        assert!((forward - Vector3::new(1.0, 0.0, 0.0)).norm() < 1e-9);

        let south = LaneModel::from_path_data("M 0 0 L 0 50", &config).unwrap();
        let forward = south.start_rotation() * Vector3::new(0.0, 0.0, -1.0);
        assert!((forward - Vector3::new(0.0, 0.0, 1.0)).norm() < 1e-9);
    }

    #[test]
    fn straight_lane_cross_sections_and_segments() {
        let lane = LaneModel::from_path_data(STRAIGHT, &LaneConfig::default()).unwrap();
        let sections = lane.cross_sections();
        assert_eq!(sections.len(), 20);
        assert!(sections.windows(2).all(|w| w[0].arclength < w[1].arclength));
        for section in sections {
            assert!(close(section.point_left.x, -5.0));
            assert!(close(section.point_right.x, 5.0));
            assert!(close(section.offset_left, section.arclength));
        }

        let segments = lane.segments();
        assert_eq!(segments.len(), 19);
        for (j, segment) in segments.iter().enumerate() {
            assert_eq!(segment.index, j);
            let bbox = segment.bounding_box;
            assert!(close(bbox.min.x, -5.0) && close(bbox.max.x, 5.0));
            assert!(close(bbox.max.y, -sections[j].arclength));
            assert!(close(bbox.min.y, -sections[j + 1].arclength));
            assert!(close(segment.corners.left_start.z, -sections[j].arclength));
            assert!(close(segment.corners.right_end.x, 5.0));
        }
        assert!(segments[0].outline.to_path_string().starts_with("M -5 0 L 5 0 M -5 0 L -5"));
    }

    #[test]
    fn short_boundary_drops_cross_sections() {
        let data = "M -5 0 L -5 -50 M 0 0 L 0 -100 M 5 0 L 5 -100";
        let lane = LaneModel::from_path_data(data, &LaneConfig::default()).unwrap();
        let sections = lane.cross_sections();
        assert_eq!(sections.len(), 10);
        assert!(sections.iter().all(|s| s.arclength <= 50.0));
        assert_eq!(lane.segments().len(), 9);
    }

    #[test]
    fn boundaries_out_of_probe_reach_are_degenerate() {
        let data = "M -20 0 L -20 -100 M 0 0 L 0 -100 M 20 0 L 20 -100";
        let err = LaneModel::from_path_data(data, &LaneConfig::default()).unwrap_err();
        assert_eq!(err, LaneError::DegenerateLane { usable_sections: 0 });
    }

    #[test]
    fn curved_lane_segments_cover_their_corners() {
        let data = "M -5 0 C -5 -40 -40 -65 -80 -65 \
                    M 0 0 C 0 -45 -40 -70 -80 -70 \
                    M 5 0 C 5 -50 -40 -75 -80 -75";
        let lane = LaneModel::from_path_data(data, &LaneConfig::default()).unwrap();
        assert!(lane.segments().len() >= 10, "{}", lane.segments().len());
        for segment in lane.segments() {
            let bbox = segment.bounding_box;
            for corner in [segment.corners.left_start, segment.corners.right_end] {
                assert!(bbox.contains(corner.x, corner.z));
            }
        }
    }

    #[test]
    fn driver_only_lane_has_no_segments() {
        let lane = LaneModel::from_path_data("M 0 0 L 0 -100", &LaneConfig::default()).unwrap();
        assert!(lane.is_driver_only());
        assert!(lane.segments().is_empty());
        assert!(lane.left().is_none());
    }

    #[test]
    fn rejects_bad_layouts_and_short_centers() {
        let config = LaneConfig::default();
        assert!(matches!(
            LaneModel::from_path_data("M 0 0 L 0 -10 M 1 0 L 1 -10", &config),
            Err(LaneError::MalformedPath { .. })
        ));
        assert!(matches!(
            LaneModel::from_path_data("M 0 0 L 0 -2", &config),
            Err(LaneError::CenterTooShort { .. })
        ));
        assert!(matches!(
            LaneModel::from_path_data("M 0 0 L", &config),
            Err(LaneError::MalformedPath { .. })
        ));
    }
}
