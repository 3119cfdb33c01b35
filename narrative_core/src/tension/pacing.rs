//! Append-only pacing history and the advice derived from it.

use serde::{Deserialize, Serialize};

use story_bible::{EntityId, TensionCategory, TensionLevel};

/// Tension recorded for one committed tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PacingEntry {
    pub tick: u32,
    pub scene: EntityId,
    pub level: TensionLevel,
    pub category: TensionCategory,
}

/// What the next scene should do with tension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PacingAdvice {
    /// Too many climactic ticks in a row.
    Deescalate,
    /// Too many calm ticks in a row.
    Escalate,
    Steady,
}

/// Tension levels of committed ticks, oldest first.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PacingHistory {
    entries: Vec<PacingEntry>,
}

impl PacingHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an entry. Re-recording a tick already present is ignored.
    pub fn record(&mut self, entry: PacingEntry) -> bool {
        if self.entries.iter().any(|e| e.tick == entry.tick) {
            return false;
        }
        self.entries.push(entry);
        true
    }

    pub fn entries(&self) -> &[PacingEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The last `n` entries, oldest first.
    pub fn recent(&self, n: usize) -> &[PacingEntry] {
        let start = self.entries.len().saturating_sub(n);
        &self.entries[start..]
    }

    /// Number of trailing entries sharing `category`.
    pub fn streak(&self, category: TensionCategory) -> usize {
        self.entries
            .iter()
            .rev()
            .take_while(|e| e.category == category)
            .count()
    }

    /// Recommend a direction once an extreme band has held for `streak_length` ticks.
    pub fn advice(&self, streak_length: usize) -> PacingAdvice {
        if streak_length == 0 {
            return PacingAdvice::Steady;
        }
        if self.streak(TensionCategory::Climactic) >= streak_length {
            PacingAdvice::Deescalate
        } else if self.streak(TensionCategory::Calm) >= streak_length {
            PacingAdvice::Escalate
        } else {
            PacingAdvice::Steady
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use story_bible::EntityKind;

    fn entry(tick: u32, level: i64, category: TensionCategory) -> PacingEntry {
        PacingEntry {
            tick,
            scene: EntityId::new(EntityKind::Scene, tick),
            level: TensionLevel::new(level),
            category,
        }
    }

    #[test]
    fn test_record_is_idempotent_per_tick() {
        let mut history = PacingHistory::new();
        assert!(history.record(entry(0, 2, TensionCategory::Calm)));
        assert!(!history.record(entry(0, 9, TensionCategory::Climactic)));
        assert_eq!(history.len(), 1);
        assert_eq!(history.entries()[0].level.value(), 2);
    }

    #[test]
    fn test_three_climactic_ticks_recommend_deescalation() {
        let mut history = PacingHistory::new();
        history.record(entry(0, 5, TensionCategory::Rising));
        history.record(entry(1, 9, TensionCategory::Climactic));
        history.record(entry(2, 10, TensionCategory::Climactic));
        assert_eq!(history.advice(3), PacingAdvice::Steady);

        history.record(entry(3, 9, TensionCategory::Climactic));
        assert_eq!(history.advice(3), PacingAdvice::Deescalate);
    }

    #[test]
    fn test_calm_streak_recommends_escalation() {
        let mut history = PacingHistory::new();
        for tick in 0..3 {
            history.record(entry(tick, 1, TensionCategory::Calm));
        }
        assert_eq!(history.advice(3), PacingAdvice::Escalate);
    }

    #[test]
    fn test_recent_window() {
        let mut history = PacingHistory::new();
        for tick in 0..5 {
            history.record(entry(tick, tick as i64, TensionCategory::Calm));
        }
        let recent: Vec<_> = history.recent(2).iter().map(|e| e.tick).collect();
        assert_eq!(recent, vec![3, 4]);
        assert_eq!(history.recent(10).len(), 5);
    }
}
