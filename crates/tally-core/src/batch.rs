//! Debounced grouping of image bursts
//!
//! Images sent together (an album) arrive as independent events sharing a
//! group id. The aggregator buffers them until the group has been idle for
//! `idle_threshold`, then hands the whole group out exactly once.
//!
//! State machine per group: `Collecting -> Flushing -> removed`. There is no
//! way back to `Collecting`; once a group is removed, a late image with the
//! same id starts a brand-new group.
//!
//! All access goes through one coarse lock around the group map. Callers
//! never see the map itself, only `submit`, `take_idle` and `remove`.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{debug, warn};

use crate::models::ImageRef;

/// Lifecycle state of a group
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum GroupState {
    /// Accepting more images
    Collecting,
    /// Handed to the processor; new arrivals are dropped
    Flushing,
}

/// What `submit` did with an image
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// First image of a new group
    Created,
    /// Added to a collecting group
    Appended,
    /// The group is already flushing; the image was dropped
    Ignored,
}

#[derive(Debug)]
struct Group {
    chat_id: i64,
    images: Vec<ImageRef>,
    last_arrival: Instant,
    state: GroupState,
}

/// A group handed out for processing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlushedGroup {
    pub group_id: String,
    pub chat_id: i64,
    /// Images in arrival order
    pub images: Vec<ImageRef>,
}

/// Debounce store for submission groups
pub struct BatchAggregator {
    groups: Mutex<HashMap<String, Group>>,
    idle_threshold: Duration,
    one_shot_seq: AtomicU64,
}

impl BatchAggregator {
    pub fn new(idle_threshold: Duration) -> Self {
        Self {
            groups: Mutex::new(HashMap::new()),
            idle_threshold,
            one_shot_seq: AtomicU64::new(0),
        }
    }

    pub fn idle_threshold(&self) -> Duration {
        self.idle_threshold
    }

    /// Fresh group id for a lone image that did not come with one
    pub fn one_shot_id(&self, chat_id: i64) -> String {
        let seq = self.one_shot_seq.fetch_add(1, Ordering::Relaxed);
        format!("single-{}-{}", chat_id, seq)
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Group>> {
        self.groups.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Record one arriving image
    pub fn submit(
        &self,
        group_id: &str,
        chat_id: i64,
        image: ImageRef,
        arrival: Instant,
    ) -> SubmitOutcome {
        let mut groups = self.lock();

        match groups.get_mut(group_id) {
            None => {
                groups.insert(
                    group_id.to_string(),
                    Group {
                        chat_id,
                        images: vec![image],
                        last_arrival: arrival,
                        state: GroupState::Collecting,
                    },
                );
                debug!(group = %group_id, chat_id, "Group created");
                SubmitOutcome::Created
            }
            Some(group) if group.state == GroupState::Collecting => {
                group.images.push(image);
                group.last_arrival = group.last_arrival.max(arrival);
                debug!(group = %group_id, count = group.images.len(), "Image added to group");
                SubmitOutcome::Appended
            }
            Some(_) => {
                warn!(
                    group = %group_id,
                    unique_id = %image.unique_id,
                    "Group already flushing, image ignored"
                );
                SubmitOutcome::Ignored
            }
        }
    }

    /// Move every collecting group idle for at least the threshold to
    /// `Flushing` and return it
    ///
    /// Flushing groups are skipped, so overlapping calls never hand out the
    /// same group twice. Returned groups are ordered by last arrival.
    pub fn take_idle(&self, now: Instant) -> Vec<FlushedGroup> {
        let mut groups = self.lock();

        let mut ready: Vec<(Instant, FlushedGroup)> = groups
            .iter_mut()
            .filter(|(_, g)| g.state == GroupState::Collecting)
            .filter(|(_, g)| now.saturating_duration_since(g.last_arrival) >= self.idle_threshold)
            .map(|(id, g)| {
                g.state = GroupState::Flushing;
                (
                    g.last_arrival,
                    FlushedGroup {
                        group_id: id.clone(),
                        chat_id: g.chat_id,
                        images: std::mem::take(&mut g.images),
                    },
                )
            })
            .collect();

        ready.sort_by_key(|(last, _)| *last);
        ready.into_iter().map(|(_, group)| group).collect()
    }

    /// Drop a group's state after its processing pass
    pub fn remove(&self, group_id: &str) -> bool {
        self.lock().remove(group_id).is_some()
    }

    /// State of a group, if it exists
    pub fn state(&self, group_id: &str) -> Option<GroupState> {
        self.lock().get(group_id).map(|g| g.state)
    }

    /// Number of groups currently tracked (collecting or flushing)
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
