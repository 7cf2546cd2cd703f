use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::model::{Estimate, TaskId, UserId, Vote};

/// One estimate per (task, user). Recording again replaces the earlier estimate.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VoteStore {
    votes: BTreeMap<(TaskId, UserId), Estimate>,
}

impl VoteStore {
    pub fn record_vote(&mut self, task_id: TaskId, user_id: UserId, estimate: Estimate) {
        self.votes.insert((task_id, user_id), estimate);
    }

    /// Drops every vote `user_id` has cast.
    pub fn clear_vote(&mut self, user_id: UserId) {
        self.votes.retain(|(_, voter), _| *voter != user_id);
    }

    pub fn retract_vote(&mut self, task_id: TaskId, user_id: UserId) -> Option<Estimate> {
        self.votes.remove(&(task_id, user_id))
    }

    pub fn clear_task(&mut self, task_id: TaskId) -> usize {
        let before = self.votes.len();
        self.votes.retain(|(task, _), _| *task != task_id);
        before - self.votes.len()
    }

    pub fn set_votes(&mut self, votes: impl IntoIterator<Item = Vote>) {
        self.votes = votes
            .into_iter()
            .map(|vote| ((vote.task_id, vote.user_id), vote.estimate))
            .collect();
    }

    pub fn list_votes(&self) -> Vec<Vote> {
        self.votes
            .iter()
            .map(|(&(task_id, user_id), estimate)| Vote {
                task_id,
                user_id,
                estimate: estimate.clone(),
            })
            .collect()
    }

    pub fn votes_for(&self, task_id: TaskId) -> Vec<Vote> {
        self.list_votes()
            .into_iter()
            .filter(|vote| vote.task_id == task_id)
            .collect()
    }

    pub fn count_for(&self, task_id: TaskId) -> usize {
        self.votes.keys().filter(|(task, _)| *task == task_id).count()
    }

    pub fn has_voted(&self, task_id: TaskId, user_id: UserId) -> bool {
        self.votes.contains_key(&(task_id, user_id))
    }

    pub fn len(&self) -> usize {
        self.votes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.votes.is_empty()
    }
}

/// Summary shown when a round is revealed. Cards without a numeric value are left out.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VoteStatistics {
    pub count: usize,
    pub average: f64,
    pub min: f64,
    pub max: f64,
    pub mode: f64,
}

impl VoteStatistics {
    pub fn from_votes<'a>(votes: impl IntoIterator<Item = &'a Vote>) -> Option<Self> {
        let mut points: Vec<f64> = votes
            .into_iter()
            .filter_map(|vote| vote.estimate.points())
            .collect();
        if points.is_empty() {
            return None;
        }
        points.sort_by(f64::total_cmp);

        let count = points.len();
        let sum: f64 = points.iter().sum();
        let average = (sum / count as f64 * 10.0).round() / 10.0;

        // longest run in the sorted list, ties going to the larger value
        let mut mode = points[0];
        let mut best_run = 0;
        let mut run = 0;
        for (i, value) in points.iter().enumerate() {
            run = if i > 0 && points[i - 1] == *value { run + 1 } else { 1 };
            if run >= best_run {
                best_run = run;
                mode = *value;
            }
        }

        Some(Self {
            count,
            average,
            min: points[0],
            max: points[count - 1],
            mode,
        })
    }
}
