use crate::core::{JobId, Tick};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, FromRepr};

#[derive(
    Debug, Deserialize, Serialize, PartialEq, Eq, Clone, Copy, Hash, Display, EnumIter, FromRepr,
)]
pub enum JobState {
    #[strum(to_string = "Requested")]
    Requested,
    /// GPUs reserved
    #[strum(to_string = "Placed")]
    Placed,
    /// Ports reserved
    #[strum(to_string = "Linked")]
    Linked,
    #[strum(to_string = "Active")]
    Active,
    /// GPUs and ports released
    #[strum(to_string = "Completed")]
    Completed,
}

impl JobState {
    /// Failed attempts fall back from `Placed`/`Linked` to `Requested`.
    pub fn can_transition_to(self, next: JobState) -> bool {
        use JobState::*;
        matches!(
            (self, next),
            (Requested, Placed)
                | (Placed, Linked)
                | (Placed, Requested)
                | (Linked, Active)
                | (Linked, Requested)
                | (Active, Completed)
        )
    }

    pub fn is_final(self) -> bool {
        self == JobState::Completed
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
pub struct Job {
    pub id: JobId,
    pub gpu_count: u32,
    /// Lifetime in ticks once admitted
    pub duration: Tick,
    pub arrival: Tick,
    pub state: JobState,
}

impl Job {
    pub fn builder() -> JobBuilder {
        JobBuilder::new()
    }

    /// Move to `next`, panicking on a transition the lifecycle forbids.
    pub fn transition(&mut self, next: JobState) {
        assert!(
            self.state.can_transition_to(next),
            "job {}: illegal transition {} -> {}",
            self.id,
            self.state,
            next
        );
        self.state = next;
    }
}

#[derive(Default)]
pub struct JobBuilder {
    id: JobId,
    gpu_count: u32,
    duration: Tick,
    arrival: Tick,
}

impl JobBuilder {
    pub fn new() -> Self {
        Self {
            duration: 1,
            ..Default::default()
        }
    }

    pub fn id(mut self, id: JobId) -> Self {
        self.id = id;
        self
    }

    pub fn gpu_count(mut self, gpu_count: u32) -> Self {
        self.gpu_count = gpu_count;
        self
    }

    pub fn duration(mut self, duration: Tick) -> Self {
        self.duration = duration;
        self
    }

    pub fn arrival(mut self, arrival: Tick) -> Self {
        self.arrival = arrival;
        self
    }

    pub fn build(self) -> Job {
        Job {
            id: self.id,
            gpu_count: self.gpu_count,
            duration: self.duration,
            arrival: self.arrival,
            state: JobState::Requested,
        }
    }
}
