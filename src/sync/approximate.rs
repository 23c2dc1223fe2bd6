use crate::sync::{FrameTuple, MessageFilter, PartialTuple, SensorMessage, Substream, Timestamp};
use itertools::{Itertools, MinMaxResult};
use log::debug;
use std::collections::VecDeque;

/// Emits the best aligned group of messages whose timestamps span at most `max_interval` ns.
///
/// Every substream has its own bounded queue (oldest dropped on overflow). Once all the queues
/// are non-empty, the pivot is the latest of the queue heads; from every queue the latest message
/// not newer than the pivot is picked. If the picked messages span more than the allowed interval
/// the messages older than `pivot - max_interval` can't be part of any group and are dropped.
///
/// Every queue is kept in time order: a message older than the newest one already queued for its
/// substream is dropped on arrival.
///
pub struct ApproximateTimeFilter {
    queue_size: usize,
    max_interval: Timestamp,
    queues: [VecDeque<SensorMessage>; 5],
}

impl ApproximateTimeFilter {
    pub fn new(queue_size: usize, max_interval: Timestamp) -> Self {
        Self {
            queue_size: queue_size.max(1),
            max_interval,
            queues: Default::default(),
        }
    }

    pub fn queued(&self, substream: Substream) -> usize {
        self.queues[substream.index()].len()
    }

    fn pivot(&self) -> Option<Timestamp> {
        self.queues
            .iter()
            .map(|q| q.front().map(SensorMessage::stamp))
            .collect::<Option<Vec<_>>>()?
            .into_iter()
            .max()
    }

    fn candidates(&self, pivot: Timestamp) -> Option<[usize; 5]> {
        let mut res = [0; 5];
        for (i, q) in self.queues.iter().enumerate() {
            res[i] = q.iter().rposition(|m| m.stamp() <= pivot)?;
        }
        Some(res)
    }

    fn try_emit(&mut self) -> Option<FrameTuple> {
        loop {
            let pivot = self.pivot()?;
            let picked = self.candidates(pivot)?;
            let span = match picked
                .iter()
                .enumerate()
                .map(|(q, i)| self.queues[q][*i].stamp())
                .minmax()
            {
                MinMaxResult::MinMax(min, max) => max - min,
                _ => 0,
            };

            if span <= self.max_interval {
                let mut group = PartialTuple::default();
                for (q, i) in picked.iter().enumerate() {
                    let queue = &mut self.queues[q];
                    let msg = queue.drain(..=*i).last()?;
                    group.set(msg);
                }
                return group.into_tuple();
            }

            let horizon = pivot.saturating_sub(self.max_interval);
            let mut dropped = 0;
            for queue in self.queues.iter_mut() {
                let before = queue.len();
                queue.retain(|m| {
                    let keep = m.stamp() >= horizon;
                    if !keep {
                        debug!(
                            "{} message {} dropped, no match within the interval",
                            m.substream().name(),
                            m.stamp()
                        );
                    }
                    keep
                });
                dropped += before - queue.len();
            }
            if dropped == 0 {
                return None;
            }
        }
    }
}

impl MessageFilter for ApproximateTimeFilter {
    fn push(&mut self, msg: SensorMessage) -> Option<FrameTuple> {
        let queue = &mut self.queues[msg.substream().index()];
        if let Some(newest) = queue.back().map(SensorMessage::stamp) {
            if msg.stamp() < newest {
                debug!(
                    "{} message {} dropped, older than the queued {}",
                    msg.substream().name(),
                    msg.stamp(),
                    newest
                );
                return None;
            }
        }
        queue.push_back(msg);
        while queue.len() > self.queue_size {
            queue.pop_front();
        }
        self.try_emit()
    }
}
