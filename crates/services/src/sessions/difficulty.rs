use std::collections::VecDeque;

/// Pacing state for mid-session difficulty adaptation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pace {
    Normal,
    Eased,
}

/// A pace transition, with the windowed accuracy that caused it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PaceChange {
    pub from: Pace,
    pub to: Pace,
    pub accuracy: f64,
}

/// Accuracy below this over a full window triggers easing.
pub const EASE_BELOW: f64 = 0.60;
/// A subsequent full window at or above this reverts to normal pace.
pub const RECOVER_AT: f64 = 0.70;

const MIN_WINDOW: usize = 3;

/// Two-state hysteretic controller over a rolling accuracy window.
///
/// Transitions are evaluated only on full windows, and every transition
/// restarts the window: recovery is judged on samples observed after easing
/// began, never on the ones that triggered it. The ≥10-point gap between the
/// two thresholds keeps a borderline performer from oscillating.
#[derive(Debug, Clone)]
pub struct DifficultyController {
    window: usize,
    samples: VecDeque<bool>,
    pace: Pace,
}

impl DifficultyController {
    /// Window is one third of the session length, minimum 3.
    #[must_use]
    pub fn for_session_len(session_len: usize) -> Self {
        Self::with_window((session_len / 3).max(MIN_WINDOW))
    }

    #[must_use]
    pub fn with_window(window: usize) -> Self {
        Self {
            window: window.max(1),
            samples: VecDeque::new(),
            pace: Pace::Normal,
        }
    }

    #[must_use]
    pub fn pace(&self) -> Pace {
        self.pace
    }

    #[must_use]
    pub fn window(&self) -> usize {
        self.window
    }

    /// Feed one graded answer; returns the transition, if any.
    #[allow(clippy::cast_precision_loss)]
    pub fn observe(&mut self, correct: bool) -> Option<PaceChange> {
        self.samples.push_back(correct);
        if self.samples.len() > self.window {
            self.samples.pop_front();
        }
        if self.samples.len() < self.window {
            return None;
        }

        let hits = self.samples.iter().filter(|&&c| c).count();
        let accuracy = hits as f64 / self.window as f64;

        let next = match self.pace {
            Pace::Normal if accuracy < EASE_BELOW => Pace::Eased,
            Pace::Eased if accuracy >= RECOVER_AT => Pace::Normal,
            _ => return None,
        };

        let change = PaceChange {
            from: self.pace,
            to: next,
            accuracy,
        };
        self.pace = next;
        self.samples.clear();
        Some(change)
    }
}
