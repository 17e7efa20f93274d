// ================================
// src/geometry.rs - arclength-parametrised 2D paths
// ================================
//! Minimal 2D computational geometry over line and cubic Bézier pieces:
//! arclength sampling, path/path intersection and sub-path extraction.
//!
//! Lane geometry lives in the ground plane. A ground point `(x, h, z)` maps to
//! the 2D point `(x, z)`; see [`project`] and [`lift`].
use nalgebra::{Point2, Point3, Vector2};

use crate::path::{Path, PathCommand};

/// Subdivisions of the arclength table of a cubic piece.
const CUBIC_STEPS: usize = 128;
const BISECTION_STEPS: usize = 48;
const EPSILON: f64 = 1e-9;

pub fn project(p: &Point3<f64>) -> Point2<f64> {
    Point2::new(p.x, p.z)
}

pub fn lift(p: &Point2<f64>, height: f64) -> Point3<f64> {
    Point3::new(p.x, height, p.y)
}

fn cross(a: &Vector2<f64>, b: &Vector2<f64>) -> f64 {
    a.x * b.y - a.y * b.x
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Piece {
    Line {
        from: Point2<f64>,
        to: Point2<f64>,
    },
    Cubic {
        from: Point2<f64>,
        ctrl1: Point2<f64>,
        ctrl2: Point2<f64>,
        to: Point2<f64>,
    },
}

impl Piece {
    pub fn start_point(&self) -> Point2<f64> {
        match *self {
            Piece::Line { from, .. } | Piece::Cubic { from, .. } => from,
        }
    }

    pub fn end_point(&self) -> Point2<f64> {
        match *self {
            Piece::Line { to, .. } | Piece::Cubic { to, .. } => to,
        }
    }

    pub fn point(&self, t: f64) -> Point2<f64> {
        match *self {
            Piece::Line { from, to } => from + (to - from) * t,
            Piece::Cubic {
                from,
                ctrl1,
                ctrl2,
                to,
            } => {
                let u = 1.0 - t;
                let coords = from.coords * (u * u * u)
                    + ctrl1.coords * (3.0 * u * u * t)
                    + ctrl2.coords * (3.0 * u * t * t)
                    + to.coords * (t * t * t);
                Point2::from(coords)
            }
        }
    }

    pub fn derivative(&self, t: f64) -> Vector2<f64> {
        match *self {
            Piece::Line { from, to } => to - from,
            Piece::Cubic {
                from,
                ctrl1,
                ctrl2,
                to,
            } => {
                let u = 1.0 - t;
                (ctrl1 - from) * (3.0 * u * u)
                    + (ctrl2 - ctrl1) * (6.0 * u * t)
                    + (to - ctrl2) * (3.0 * t * t)
            }
        }
    }

    fn steps(&self) -> usize {
        match self {
            Piece::Line { .. } => 1,
            Piece::Cubic { .. } => CUBIC_STEPS,
        }
    }

    /// The part of this piece between parameters `t0 <= t1`.
    pub fn sub_piece(&self, t0: f64, t1: f64) -> Piece {
        match *self {
            Piece::Line { .. } => Piece::Line {
                from: self.point(t0),
                to: self.point(t1),
            },
            Piece::Cubic { .. } => {
                let (head, _) = self.split(t1);
                if t1 <= EPSILON {
                    return head;
                }
                let (_, tail) = head.split(t0 / t1);
                tail
            }
        }
    }

    /// de Casteljau split at `t`.
    fn split(&self, t: f64) -> (Piece, Piece) {
        match *self {
            Piece::Line { from, to } => {
                let mid = self.point(t);
                (Piece::Line { from, to: mid }, Piece::Line { from: mid, to })
            }
            Piece::Cubic {
                from,
                ctrl1,
                ctrl2,
                to,
            } => {
                let lerp = |a: Point2<f64>, b: Point2<f64>| a + (b - a) * t;
                let ab = lerp(from, ctrl1);
                let bc = lerp(ctrl1, ctrl2);
                let cd = lerp(ctrl2, to);
                let abc = lerp(ab, bc);
                let bcd = lerp(bc, cd);
                let mid = lerp(abc, bcd);
                (
                    Piece::Cubic {
                        from,
                        ctrl1: ab,
                        ctrl2: abc,
                        to: mid,
                    },
                    Piece::Cubic {
                        from: mid,
                        ctrl1: bcd,
                        ctrl2: cd,
                        to,
                    },
                )
            }
        }
    }
}

#[derive(Debug, Clone)]
struct ShapePiece {
    piece: Piece,
    /// Arclength of the whole shape at the start of this piece.
    start: f64,
    /// Cumulative arclength at `t = i / steps`, relative to `start`.
    table: Vec<f64>,
}

impl ShapePiece {
    fn new(piece: Piece, start: f64) -> Self {
        let steps = piece.steps();
        let mut table = Vec::with_capacity(steps + 1);
        let mut total = 0.0;
        let mut previous = piece.point(0.0);
        table.push(0.0);
        for i in 1..=steps {
            let point = piece.point(i as f64 / steps as f64);
            total += (point - previous).norm();
            table.push(total);
            previous = point;
        }
        Self {
            piece,
            start,
            table,
        }
    }

    fn length(&self) -> f64 {
        self.table.last().copied().unwrap_or(0.0)
    }

    fn steps(&self) -> usize {
        self.table.len() - 1
    }

    fn t_at(&self, local: f64) -> f64 {
        let steps = self.steps();
        let idx = self.table.partition_point(|&v| v < local);
        if idx == 0 {
            return 0.0;
        }
        if idx > steps {
            return 1.0;
        }
        let (lo, hi) = (self.table[idx - 1], self.table[idx]);
        let frac = if hi - lo > EPSILON {
            (local - lo) / (hi - lo)
        } else {
            0.0
        };
        ((idx - 1) as f64 + frac) / steps as f64
    }

    fn length_at(&self, t: f64) -> f64 {
        let steps = self.steps();
        let scaled = t.clamp(0.0, 1.0) * steps as f64;
        let i = (scaled.floor() as usize).min(steps - 1);
        let frac = scaled - i as f64;
        self.table[i] + frac * (self.table[i + 1] - self.table[i])
    }

    /// Table sample points as `(t, point)`.
    fn polyline(&self) -> Vec<(f64, Point2<f64>)> {
        let steps = self.steps();
        (0..=steps)
            .map(|i| {
                let t = i as f64 / steps as f64;
                (t, self.piece.point(t))
            })
            .collect()
    }

    fn tangent(&self, t: f64) -> Option<Vector2<f64>> {
        let d = self.piece.derivative(t);
        if d.norm() > EPSILON {
            return Some(d.normalize());
        }
        // Coincident control points: look just inside the piece.
        let nudged = if t < 0.5 { t + 1e-4 } else { t - 1e-4 };
        let d = self.piece.derivative(nudged);
        (d.norm() > EPSILON).then(|| d.normalize())
    }
}

/// A point where two paths cross, with its arclength on the queried path.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Intersection {
    pub point: Point2<f64>,
    pub offset: f64,
}

#[derive(Debug, Clone, Default)]
pub struct PathShape {
    pieces: Vec<ShapePiece>,
    origin: Option<Point2<f64>>,
    length: f64,
}

impl PathShape {
    pub fn from_pieces(pieces: impl IntoIterator<Item = Piece>) -> Self {
        let mut shape = PathShape::default();
        for piece in pieces {
            shape.push(piece);
        }
        shape
    }

    pub fn from_path(path: &Path) -> Self {
        let mut shape = PathShape::default();
        let mut cursor = Point2::origin();
        for command in path.commands() {
            match *command {
                PathCommand::MoveTo(p) => {
                    shape.origin.get_or_insert(p);
                    cursor = p;
                }
                PathCommand::LineTo(to) => {
                    shape.push(Piece::Line { from: cursor, to });
                    cursor = to;
                }
                PathCommand::CubicTo { ctrl1, ctrl2, to } => {
                    shape.push(Piece::Cubic {
                        from: cursor,
                        ctrl1,
                        ctrl2,
                        to,
                    });
                    cursor = to;
                }
            }
        }
        shape
    }

    pub fn line(from: Point2<f64>, to: Point2<f64>) -> Self {
        Self::from_pieces([Piece::Line { from, to }])
    }

    fn push(&mut self, piece: Piece) {
        self.origin.get_or_insert(piece.start_point());
        let shape_piece = ShapePiece::new(piece, self.length);
        if shape_piece.length() <= EPSILON {
            return;
        }
        self.length += shape_piece.length();
        self.pieces.push(shape_piece);
    }

    pub fn length(&self) -> f64 {
        self.length
    }

    pub fn pieces(&self) -> impl Iterator<Item = &Piece> {
        self.pieces.iter().map(|p| &p.piece)
    }

    pub fn first_point(&self) -> Option<Point2<f64>> {
        self.origin
    }

    pub fn last_point(&self) -> Option<Point2<f64>> {
        self.pieces.last().map(|p| p.piece.end_point()).or(self.origin)
    }

    fn locate(&self, offset: f64) -> Option<(&ShapePiece, f64)> {
        if !(-EPSILON..=self.length + EPSILON).contains(&offset) {
            return None;
        }
        let offset = offset.clamp(0.0, self.length);
        let idx = self
            .pieces
            .partition_point(|p| p.start <= offset)
            .saturating_sub(1);
        let piece = self.pieces.get(idx)?;
        Some((piece, piece.t_at(offset - piece.start)))
    }

    pub fn point_at(&self, offset: f64) -> Option<Point2<f64>> {
        match self.locate(offset) {
            Some((piece, t)) => Some(piece.piece.point(t)),
            None if self.pieces.is_empty() && offset.abs() <= EPSILON => self.origin,
            None => None,
        }
    }

    /// Unit tangent at `offset`, `None` off the path or where it degenerates.
    pub fn tangent_at(&self, offset: f64) -> Option<Vector2<f64>> {
        let (piece, t) = self.locate(offset)?;
        piece.tangent(t)
    }

    /// Every crossing of `other` with this path, ordered by offset on `self`.
    pub fn intersections(&self, other: &PathShape) -> Vec<Intersection> {
        let edges: Vec<(Point2<f64>, Point2<f64>)> = other
            .pieces
            .iter()
            .flat_map(|p| p.polyline().windows(2).map(|w| (w[0].1, w[1].1)).collect::<Vec<_>>())
            .collect();

        let mut hits = Vec::new();
        for shape_piece in &self.pieces {
            let polyline = shape_piece.polyline();
            for w in polyline.windows(2) {
                let ((t0, p0), (t1, p1)) = (w[0], w[1]);
                for &(a, b) in &edges {
                    let Some(u) = segment_intersection(p0, p1, a, b) else {
                        continue;
                    };
                    let t = match shape_piece.piece {
                        Piece::Line { .. } => t0 + u * (t1 - t0),
                        Piece::Cubic { .. } => refine_crossing(&shape_piece.piece, t0, t1, a, b)
                            .unwrap_or(t0 + u * (t1 - t0)),
                    };
                    hits.push(Intersection {
                        point: shape_piece.piece.point(t),
                        offset: shape_piece.start + shape_piece.length_at(t),
                    });
                }
            }
        }

        hits.sort_by(|a, b| a.offset.total_cmp(&b.offset));
        hits.dedup_by(|b, a| (b.offset - a.offset).abs() < 1e-7 && (b.point - a.point).norm() < 1e-6);
        hits
    }

    /// The part of the path between two offsets, as its own shape.
    pub fn subpath(&self, from: f64, to: f64) -> PathShape {
        let (from, to) = if from <= to { (from, to) } else { (to, from) };
        let (from, to) = (from.clamp(0.0, self.length), to.clamp(0.0, self.length));

        let mut sub = PathShape::default();
        for shape_piece in &self.pieces {
            let start = shape_piece.start;
            let end = start + shape_piece.length();
            if end < from || start > to {
                continue;
            }
            let t0 = shape_piece.t_at(from.max(start) - start);
            let t1 = shape_piece.t_at(to.min(end) - start);
            if t1 - t0 > EPSILON {
                sub.push(shape_piece.piece.sub_piece(t0, t1));
            }
        }
        if sub.origin.is_none() {
            sub.origin = self.point_at(from);
        }
        sub
    }

    /// Convert back into grammar commands, re-inserting `MoveTo` at gaps.
    pub fn to_path(&self) -> Path {
        let mut commands = Vec::new();
        let mut cursor: Option<Point2<f64>> = None;
        for shape_piece in &self.pieces {
            let piece = shape_piece.piece;
            if cursor.map_or(true, |c| (c - piece.start_point()).norm() > EPSILON) {
                commands.push(PathCommand::MoveTo(piece.start_point()));
            }
            commands.push(match piece {
                Piece::Line { to, .. } => PathCommand::LineTo(to),
                Piece::Cubic {
                    ctrl1, ctrl2, to, ..
                } => PathCommand::CubicTo { ctrl1, ctrl2, to },
            });
            cursor = Some(piece.end_point());
        }
        if commands.is_empty() {
            if let Some(origin) = self.origin {
                commands.push(PathCommand::MoveTo(origin));
            }
        }
        Path::from_commands(commands)
    }
}

/// Parameter along `p0 -> p1` where it crosses `a -> b`, endpoints inclusive.
fn segment_intersection(
    p0: Point2<f64>,
    p1: Point2<f64>,
    a: Point2<f64>,
    b: Point2<f64>,
) -> Option<f64> {
    let r = p1 - p0;
    let s = b - a;
    let denom = cross(&r, &s);
    if denom.abs() < EPSILON {
        return None;
    }
    let ap = a - p0;
    let u = cross(&ap, &s) / denom;
    let v = cross(&ap, &r) / denom;
    let range = -EPSILON..=1.0 + EPSILON;
    (range.contains(&u) && range.contains(&v)).then(|| u.clamp(0.0, 1.0))
}

/// Bisect the exact curve for the crossing with the line through `a`, `b`.
fn refine_crossing(piece: &Piece, t0: f64, t1: f64, a: Point2<f64>, b: Point2<f64>) -> Option<f64> {
    let dir = b - a;
    let side = |t: f64| cross(&dir, &(piece.point(t) - a));
    let (mut lo, mut hi) = (t0, t1);
    let (mut f_lo, f_hi) = (side(lo), side(hi));
    if f_lo == 0.0 {
        return Some(lo);
    }
    if f_hi == 0.0 {
        return Some(hi);
    }
    if f_lo.signum() == f_hi.signum() {
        return None;
    }
    for _ in 0..BISECTION_STEPS {
        let mid = 0.5 * (lo + hi);
        let f_mid = side(mid);
        if f_mid.signum() == f_lo.signum() {
            lo = mid;
            f_lo = f_mid;
        } else {
            hi = mid;
        }
    }
    Some(0.5 * (lo + hi))
}

/// Probe segment perpendicular to `a -> d`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PerpendicularProbe {
    /// Point on `a -> d` the probe is centred on.
    pub center: Point2<f64>,
    pub start: Point2<f64>,
    pub end: Point2<f64>,
}

impl PerpendicularProbe {
    /// Centre the probe at the midpoint of `a -> d`, shifted by `bias` times
    /// the `a -> d` distance along the direction of travel.
    pub fn new(a: Point2<f64>, d: Point2<f64>, bias: f64, length: f64) -> Self {
        let span = d - a;
        let distance = span.norm();
        let direction = if distance > 0.0 {
            span / distance
        } else {
            Vector2::zeros()
        };
        let perpendicular = if direction == Vector2::zeros() {
            Vector2::new(1.0, 0.0)
        } else {
            Vector2::new(-direction.y, direction.x)
        };
        let center = nalgebra::center(&a, &d) + direction * (bias * distance);
        let half = perpendicular * (length / 2.0);
        Self {
            center,
            start: center + half,
            end: center - half,
        }
    }

    pub fn shape(&self) -> PathShape {
        PathShape::line(self.start, self.end)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::path::parse_path;

    fn shape(s: &str) -> PathShape {
        PathShape::from_path(&parse_path(s).unwrap())
    }

    fn close(a: f64, b: f64, tol: f64) -> bool {
        (a - b).abs() <= tol
    }

    #[test]
    fn line_sampling() {
        let s = shape("M 0 0 L 0 -100");
        assert!(close(s.length(), 100.0, 1e-12));
        assert_eq!(s.point_at(3.0), Some(Point2::new(0.0, -3.0)));
        assert_eq!(s.tangent_at(50.0), Some(Vector2::new(0.0, -1.0)));
        assert!(s.point_at(100.5).is_none());
        assert!(s.tangent_at(-1.0).is_none());
    }

    #[test]
    fn polyline_length_and_corner_sampling() {
        let s = shape("M 0 0 L 10 0 L 10 10");
        assert!(close(s.length(), 20.0, 1e-12));
        let p = s.point_at(15.0).unwrap();
        assert!(close(p.x, 10.0, 1e-12) && close(p.y, 5.0, 1e-12));
        assert_eq!(s.tangent_at(12.0), Some(Vector2::new(0.0, 1.0)));
    }

    #[test]
    fn cubic_length_of_straight_cubic() {
        // Control points on the chord: the cubic is a straight line.
        let s = shape("M 0 0 C 0 -10 0 -20 0 -30");
        assert!(close(s.length(), 30.0, 1e-9));
        let p = s.point_at(15.0).unwrap();
        assert!(close(p.y, -15.0, 1e-3), "{p}");
    }

    #[test]
    fn quarter_circle_cubic_length() {
        let k = 0.552_284_749_831;
        let s = shape(&format!("M 10 0 C 10 {} {} 10 0 10", 10.0 * k, 10.0 * k));
        let quarter = std::f64::consts::PI * 10.0 / 2.0;
        assert!(close(s.length(), quarter, 1e-2), "{}", s.length());
        let t = s.tangent_at(0.0).unwrap();
        assert!(close(t.x, 0.0, 1e-12) && close(t.y, 1.0, 1e-12));
    }

    #[test]
    fn degenerate_control_point_tangent_falls_back_inside() {
        let s = shape("M 0 0 C 0 0 10 0 10 10");
        let t = s.tangent_at(0.0).unwrap();
        assert!(t.x > 0.99, "{t}");
        assert!(PathShape::default().tangent_at(0.0).is_none());
    }

    #[test]
    fn probe_crosses_line_with_offset() {
        let lane = shape("M -5 0 L -5 -100");
        let probe = PathShape::line(Point2::new(7.5, -40.0), Point2::new(-7.5, -40.0));
        let hits = lane.intersections(&probe);
        assert_eq!(hits.len(), 1);
        assert!(close(hits[0].offset, 40.0, 1e-9));
        assert!(close(hits[0].point.x, -5.0, 1e-9));
    }

    #[test]
    fn endpoint_crossing_is_found_once() {
        let lane = shape("M -5 0 L -5 -50 L -5 -100");
        let at_joint = PathShape::line(Point2::new(7.5, -50.0), Point2::new(-7.5, -50.0));
        assert_eq!(lane.intersections(&at_joint).len(), 1);
        let at_end = PathShape::line(Point2::new(7.5, -100.0), Point2::new(-7.5, -100.0));
        let hits = lane.intersections(&at_end);
        assert_eq!(hits.len(), 1);
        assert!(close(hits[0].offset, 100.0, 1e-9));
    }

    #[test]
    fn cubic_crossing_is_refined_onto_the_curve() {
        let curve = shape("M 0 0 C 0 -30 -20 -50 -50 -50");
        let probe = PathShape::line(Point2::new(7.5, -11.0), Point2::new(-7.5, -11.0));
        let hits = curve.intersections(&probe);
        assert_eq!(hits.len(), 1);
        assert!(close(hits[0].point.y, -11.0, 1e-9), "{}", hits[0].point);
        let resampled = curve.point_at(hits[0].offset).unwrap();
        assert!((resampled - hits[0].point).norm() < 1e-2);
    }

    #[test]
    fn intersections_are_ordered_by_offset() {
        let zigzag = shape("M 0 0 L 10 0 L 10 10 L 0 10");
        let probe = PathShape::line(Point2::new(5.0, -5.0), Point2::new(5.0, 15.0));
        let hits = zigzag.intersections(&probe);
        assert_eq!(hits.len(), 2);
        assert!(hits[0].offset < hits[1].offset);
        assert!(close(hits[1].point.y, 10.0, 1e-9));
    }

    #[test]
    fn missing_intersection_is_empty() {
        let lane = shape("M 0 0 L 0 -100");
        let probe = PathShape::line(Point2::new(20.0, -10.0), Point2::new(30.0, -10.0));
        assert!(lane.intersections(&probe).is_empty());
    }

    #[test]
    fn subpath_of_line_and_cubic() {
        let s = shape("M 0 0 L 0 -10 C 0 -20 0 -30 0 -40");
        let sub = s.subpath(5.0, 25.0);
        assert!(close(sub.length(), 20.0, 1e-6), "{}", sub.length());
        let first = sub.first_point().unwrap();
        let last = sub.last_point().unwrap();
        assert!(close(first.y, -5.0, 1e-9));
        assert!(close(last.y, -25.0, 1e-3), "{last}");

        let reversed = s.subpath(25.0, 5.0);
        assert!(close(reversed.length(), sub.length(), 1e-12));
    }

    #[test]
    fn empty_subpath_keeps_its_point() {
        let s = shape("M 0 0 L 0 -10");
        let sub = s.subpath(4.0, 4.0);
        assert_eq!(sub.length(), 0.0);
        assert_eq!(sub.first_point(), Some(Point2::new(0.0, -4.0)));
        assert_eq!(sub.to_path().to_path_string(), "M 0 -4");
    }

    #[test]
    fn to_path_reinserts_moves_at_gaps() {
        let s = shape("M 0 0 L 1 0 M 5 5 L 6 5");
        assert_eq!(s.to_path().to_path_string(), "M 0 0 L 1 0 M 5 5 L 6 5");
    }

    #[test]
    fn probe_recentres_on_start_with_half_back_bias() {
        let a = Point2::new(0.0, -10.0);
        let d = Point2::new(0.0, -20.0);
        let probe = PerpendicularProbe::new(a, d, -0.5, 15.0);
        assert!((probe.center - a).norm() < 1e-12);
        assert!(close((probe.start - probe.end).norm(), 15.0, 1e-12));
        assert!(close(probe.start.x, 7.5, 1e-12));

        let look = PerpendicularProbe::new(a, Point2::new(0.0, -30.0), -0.1, 15.0);
        assert!(close(look.center.y, -18.0, 1e-12));

        let degenerate = PerpendicularProbe::new(a, a, -0.1, 15.0);
        assert_eq!(degenerate.center, a);
        assert!(close(degenerate.start.x, 7.5, 1e-12));
    }
}
