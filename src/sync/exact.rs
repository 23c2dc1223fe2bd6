use crate::sync::{FrameTuple, MessageFilter, PartialTuple, SensorMessage, Timestamp};
use itertools::Itertools;
use log::debug;
use std::collections::BTreeMap;

/// Emits a tuple when all five substreams delivered a message with the same timestamp.
///
/// At most `queue_size` incomplete groups are kept; the oldest one is dropped on overflow. When a
/// group completes, all the older incomplete groups are dropped as they can't complete anymore.
///
pub struct ExactTimeFilter {
    queue_size: usize,
    pending: BTreeMap<Timestamp, PartialTuple>,
}

impl ExactTimeFilter {
    pub fn new(queue_size: usize) -> Self {
        Self {
            queue_size: queue_size.max(1),
            pending: BTreeMap::default(),
        }
    }

    pub fn pending(&self) -> usize {
        self.pending.len()
    }
}

impl MessageFilter for ExactTimeFilter {
    fn push(&mut self, msg: SensorMessage) -> Option<FrameTuple> {
        let stamp = msg.stamp();
        let group = self.pending.entry(stamp).or_default();
        group.set(msg);

        if group.is_complete() {
            let group = self.pending.remove(&stamp)?;
            debug_assert!(group.stamps().all_equal());
            self.pending = self.pending.split_off(&stamp);
            return group.into_tuple();
        }

        while self.pending.len() > self.queue_size {
            if let Some((dropped, _)) = self.pending.pop_first() {
                debug!("Incomplete group {} dropped from the exact queue", dropped);
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use crate::sync::exact::ExactTimeFilter;
    use crate::sync::MessageFilter;
    use crate::test_stuff::frame_messages;

    #[test]
    fn waits_for_identical_stamps() {
        let mut f = ExactTimeFilter::new(3);
        let t = frame_messages(100);
        let t2 = frame_messages(101);
        for m in t.iter().take(4).cloned() {
            assert!(f.push(m).is_none());
        }
        assert!(f.push(t2[4].clone()).is_none());
        let tuple = f.push(t[4].clone()).unwrap();
        assert_eq!(tuple.timestamp, 100);
        assert_eq!(f.pending(), 1);
    }

    #[test]
    fn completion_drops_older_groups() {
        let mut f = ExactTimeFilter::new(3);
        assert!(f.push(frame_messages(1)[0].clone()).is_none());
        assert!(f.push(frame_messages(2)[0].clone()).is_none());
        let mut emitted = None;
        for m in frame_messages(3) {
            emitted = f.push(m);
        }
        assert_eq!(emitted.unwrap().timestamp, 3);
        assert_eq!(f.pending(), 0);
    }

    #[test]
    fn overflow_drops_oldest() {
        let mut f = ExactTimeFilter::new(3);
        let first = frame_messages(1);
        for m in first.iter().take(4).cloned() {
            assert!(f.push(m).is_none());
        }
        for t in 2..5 {
            assert!(f.push(frame_messages(t)[0].clone()).is_none());
        }
        assert_eq!(f.pending(), 3);
        assert!(f.push(first[4].clone()).is_none());
        assert_eq!(f.pending(), 3);
    }

    #[test]
    fn reordered_groups_both_complete() {
        let mut f = ExactTimeFilter::new(3);
        let first = frame_messages(1);
        let second = frame_messages(2);
        for m in second.iter().take(3).cloned() {
            assert!(f.push(m).is_none());
        }
        let mut emitted = None;
        for m in first.into_iter().rev() {
            emitted = f.push(m);
        }
        assert_eq!(emitted.unwrap().timestamp, 1);
        assert_eq!(f.pending(), 1);

        let mut emitted = None;
        for m in second.into_iter().skip(3) {
            emitted = f.push(m);
        }
        assert_eq!(emitted.unwrap().timestamp, 2);
        assert_eq!(f.pending(), 0);
    }

    #[test]
    fn stale_message_waits_for_overflow() {
        let mut f = ExactTimeFilter::new(3);
        let mut emitted = None;
        for m in frame_messages(100) {
            emitted = f.push(m);
        }
        assert_eq!(emitted.unwrap().timestamp, 100);

        assert!(f.push(frame_messages(50)[2].clone()).is_none());
        assert_eq!(f.pending(), 1);
        for t in [200, 300] {
            assert!(f.push(frame_messages(t)[0].clone()).is_none());
        }
        assert_eq!(f.pending(), 3);
        assert!(f.push(frame_messages(400)[0].clone()).is_none());
        assert_eq!(f.pending(), 3);

        // the stale group is gone, completing the oldest remaining one keeps the newer groups
        let mut emitted = None;
        for m in frame_messages(200).into_iter().skip(1) {
            emitted = f.push(m);
        }
        assert_eq!(emitted.unwrap().timestamp, 200);
        assert_eq!(f.pending(), 2);
    }
}
