//! Hands pending routed segments to their tracks' queues.

use crate::id::*;
use crate::registry::Registry;
use crate::task::SegmentStatus;
use tracing::debug;

/// Push every pending segment onto its track's queue and mark it assigned.
///
/// Segments are taken in insertion order and grouped by track in the order
/// tracks are first seen. Vehicle binding is left to the track.
pub fn allocate(reg: &mut Registry) -> Vec<(TrackKey, Vec<SegmentKey>)> {
    let mut groups: Vec<(TrackKey, Vec<SegmentKey>)> = Vec::new();
    for (key, seg) in reg.segments.iter() {
        if seg.status != SegmentStatus::Pending {
            continue;
        }
        match groups.iter_mut().find(|(t, _)| *t == seg.track) {
            Some((_, keys)) => keys.push(key),
            None => groups.push((seg.track, vec![key])),
        }
    }

    for (track_key, keys) in &groups {
        let Some(track) = reg.tracks.get_mut(*track_key) else {
            continue;
        };
        track.queue.extend(keys.iter().copied());
        for &k in keys {
            if let Some(seg) = reg.segments.get_mut(k) {
                seg.status = SegmentStatus::Assigned;
            }
        }
        debug!(track = reg.track_name(*track_key), count = keys.len(), "segments queued");
    }
    groups
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::build_registry;
    use crate::planner::PathPlanner;
    use crate::splitter::TaskSplitBuffer;
    use crate::test_utils::*;

    #[test]
    fn pending_segments_move_to_track_queues() {
        let mut reg = build_registry(&hub_topology()).unwrap();
        let mut split = TaskSplitBuffer::new();
        release_and_split(&mut reg, &mut split, vec![hub_order(1, "1LD")]);
        PathPlanner::new(&reg)
            .unwrap()
            .plan(&mut reg, &mut split)
            .unwrap();

        let groups = allocate(&mut reg);
        assert_eq!(groups.len(), 2);
        let t1 = reg.tracks.key_of("T1").unwrap();
        let t3 = reg.tracks.key_of("T3").unwrap();
        assert_eq!(groups[0].0, t1);
        assert_eq!(groups[1].0, t3);
        assert_eq!(reg.tracks.get(t1).unwrap().queue.len(), 1);
        assert!(reg
            .segments
            .values()
            .all(|s| s.status == SegmentStatus::Assigned));

        // Nothing pending on a second pass.
        assert!(allocate(&mut reg).is_empty());
    }
}
