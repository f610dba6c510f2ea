//! Assign absolute event times to recording episodes.
//!
//! Event and episode times are in samples on a shared absolute clock. Each
//! event lands in the last episode whose start is not after it, and is
//! reported as an offset from that episode's start.

use serde::{Deserialize, Serialize};
use tracing::warn;

/// Per-episode event offsets, indexed by episode position in the input.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EpisodeAlignment {
    pub episodes: Vec<Vec<i64>>,
}

impl EpisodeAlignment {
    #[must_use]
    pub fn len(&self) -> usize {
        self.episodes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.episodes.is_empty()
    }

    #[must_use]
    pub fn episode(&self, index: usize) -> Option<&[i64]> {
        self.episodes.get(index).map(Vec::as_slice)
    }

    /// Offsets converted to milliseconds given the sample clock rate.
    #[must_use]
    pub fn to_millis(&self, samples_per_ms: f64) -> Vec<Vec<f64>> {
        self.episodes
            .iter()
            .map(|offsets| offsets.iter().map(|&o| o as f64 / samples_per_ms).collect())
            .collect()
    }
}

/// Two-pointer sweep over `event_times` and `episode_starts`.
///
/// Both inputs are expected in ascending order. Violations are logged and
/// the sweep carries on, so unsorted input yields best-effort output. Events
/// before the first episode go to episode 0 with a negative offset.
pub fn align(event_times: &[i64], episode_starts: &[i64]) -> EpisodeAlignment {
    let mut episodes = vec![Vec::new(); episode_starts.len()];
    let Some(&first) = episode_starts.first() else {
        return EpisodeAlignment { episodes };
    };
    if episode_starts.windows(2).any(|w| w[0] > w[1]) {
        warn!(
            episodes = episode_starts.len(),
            "episode start times are not sorted; alignment is best effort"
        );
    }

    let mut episode = 0;
    let mut start = first;
    for &event in event_times {
        if event < start {
            warn!(event, episode, start, "event comes before the current episode");
        }
        while let Some(&next) = episode_starts.get(episode + 1) {
            if event < next {
                break;
            }
            episode += 1;
            start = next;
        }
        episodes[episode].push(event - start);
    }
    EpisodeAlignment { episodes }
}
