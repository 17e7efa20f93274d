// ================================
// src/tracker.rs - forward-only lane segment tracking
// ================================
use nalgebra::Point3;
use tracing::debug;

use crate::lane::LaneSegment;

/// The tracked segment changed from `old_index` to `new_index`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SegmentTransition {
    pub old_index: usize,
    pub new_index: usize,
}

/// First segment at or after `search_from` whose box contains `position`.
///
/// Only the ground-plane coordinates `(x, z)` are tested and the box edges
/// count as inside. Segments before `search_from` are never considered.
pub fn find_segment(
    position: &Point3<f64>,
    segments: &[LaneSegment],
    search_from: usize,
) -> Option<usize> {
    segments
        .iter()
        .enumerate()
        .skip(search_from)
        .find(|(_, segment)| segment.bounding_box.contains(position.x, position.z))
        .map(|(index, _)| index)
}

#[derive(Debug, Clone, Default)]
pub struct SegmentTracker {
    current: usize,
    previous: usize,
}

impl SegmentTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> usize {
        self.current
    }

    pub fn previous(&self) -> usize {
        self.previous
    }

    /// Search forward from the current segment. A miss leaves tracking where it was.
    pub fn update(
        &mut self,
        position: &Point3<f64>,
        segments: &[LaneSegment],
    ) -> Option<SegmentTransition> {
        let found = find_segment(position, segments, self.current)?;
        if found == self.current {
            return None;
        }

        let transition = SegmentTransition {
            old_index: self.current,
            new_index: found,
        };
        self.previous = self.current;
        self.current = found;
        debug!(
            "Segment transition {} -> {}",
            transition.old_index, transition.new_index
        );
        Some(transition)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{config::LaneConfig, lane::LaneModel};

    fn straight_lane() -> LaneModel {
        LaneModel::from_path_data(
            "M -5 0 L -5 -100 M 0 0 L 0 -100 M 5 0 L 5 -100",
            &LaneConfig::default(),
        )
        .unwrap()
    }

    #[test]
    fn finds_the_containing_segment() {
        let lane = straight_lane();
        let segments = lane.segments();
        assert_eq!(find_segment(&Point3::new(0.0, 0.3, -1.0), segments, 0), Some(0));
        assert_eq!(find_segment(&Point3::new(4.0, 0.3, -50.0), segments, 0), Some(9));
        assert_eq!(find_segment(&Point3::new(0.0, 0.3, -99.9), segments, 0), Some(18));
        assert_eq!(find_segment(&Point3::new(6.0, 0.3, -50.0), segments, 0), None);
        assert_eq!(find_segment(&Point3::new(0.0, 0.3, 1.0), segments, 0), None);
    }

    #[test]
    fn never_searches_behind_search_from() {
        let lane = straight_lane();
        let segments = lane.segments();
        let behind = Point3::new(0.0, 0.3, -1.0);
        for search_from in 0..=segments.len() + 2 {
            if let Some(index) = find_segment(&behind, segments, search_from) {
                assert!(index >= search_from);
            }
        }
        assert_eq!(find_segment(&behind, segments, 3), None);
        assert_eq!(find_segment(&behind, &[], 0), None);
    }

    #[test]
    fn shared_edge_resolves_to_the_earlier_segment() {
        let lane = straight_lane();
        let edge = lane.segments()[4].bounding_box.min.y;
        assert_eq!(
            find_segment(&Point3::new(0.0, 0.3, edge), lane.segments(), 0),
            Some(4)
        );
    }

    #[test]
    fn tracker_reports_transitions_and_stalls_on_miss() {
        let lane = straight_lane();
        let segments = lane.segments();
        let mut tracker = SegmentTracker::new();

        assert_eq!(tracker.update(&Point3::new(0.0, 0.3, -2.0), segments), None);
        assert_eq!(tracker.current(), 0);

        let transition = tracker.update(&Point3::new(0.0, 0.3, -30.0), segments);
        assert_eq!(
            transition,
            Some(SegmentTransition {
                old_index: 0,
                new_index: 5
            })
        );
        assert_eq!(tracker.previous(), 0);

        // Off the lane: tracking holds its index.
        assert_eq!(tracker.update(&Point3::new(40.0, 0.3, -35.0), segments), None);
        assert_eq!(tracker.current(), 5);

        // Back behind the current segment is never matched.
        assert_eq!(tracker.update(&Point3::new(0.0, 0.3, -2.0), segments), None);
        assert_eq!(tracker.current(), 5);
    }
}
