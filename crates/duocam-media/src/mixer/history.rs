//! Vote history and the per-frame camera decision.

use std::collections::VecDeque;

use duocam_models::Camera;

/// The last `capacity` motion votes, 0 for camera A and 1 for camera B.
///
/// Starts out as `[0]` so the mix opens on camera A.
#[derive(Debug, Clone, PartialEq)]
pub struct FlowHistory {
    votes: VecDeque<u8>,
    capacity: usize,
}

impl FlowHistory {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let mut votes = VecDeque::with_capacity(capacity + 1);
        votes.push_back(Camera::A.history_value());
        Self { votes, capacity }
    }

    pub fn push(&mut self, vote: Camera) {
        self.votes.push_back(vote.history_value());
        while self.votes.len() > self.capacity {
            self.votes.pop_front();
        }
    }

    pub fn len(&self) -> usize {
        self.votes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.votes.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn mean(&self) -> f64 {
        if self.votes.is_empty() {
            return 0.0;
        }
        self.votes.iter().map(|&v| v as f64).sum::<f64>() / self.votes.len() as f64
    }

    /// Camera A while fewer than half the votes went to B.
    pub fn decision(&self) -> Camera {
        decide(self.mean())
    }
}

fn decide(score: f64) -> Camera {
    if score < 0.5 {
        Camera::A
    } else {
        Camera::B
    }
}

/// How the history turns into a camera choice.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DecisionRule {
    /// Majority of the raw history
    Majority,
    /// Exponential moving average of the history mean
    Smoothed { alpha: f64 },
}

/// Run-long decision state: the bounded history plus the smoothed score.
#[derive(Debug, Clone, PartialEq)]
pub struct MixState {
    history: FlowHistory,
    smoothed: f64,
    rule: DecisionRule,
}

impl MixState {
    pub fn new(history_length: usize, rule: DecisionRule) -> Self {
        Self {
            history: FlowHistory::new(history_length),
            smoothed: 0.0,
            rule,
        }
    }

    /// Record one vote and return the camera to show from now on.
    pub fn step(&mut self, vote: Camera) -> Camera {
        self.history.push(vote);
        if let DecisionRule::Smoothed { alpha } = self.rule {
            self.smoothed = alpha * self.history.mean() + (1.0 - alpha) * self.smoothed;
        }
        self.current()
    }

    pub fn current(&self) -> Camera {
        match self.rule {
            DecisionRule::Majority => self.history.decision(),
            DecisionRule::Smoothed { .. } => decide(self.smoothed),
        }
    }

    pub fn history(&self) -> &FlowHistory {
        &self.history
    }

    pub fn smoothed(&self) -> f64 {
        self.smoothed
    }
}
