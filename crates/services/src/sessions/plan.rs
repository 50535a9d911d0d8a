use std::collections::{HashMap, HashSet};

use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;

use exam_core::model::{Item, ItemId};

use crate::exposure::Classified;

/// Which freshness tier an entry was drawn from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PlanTier {
    /// No exposure record for this user.
    Fresh,
    /// Previously served; selected oldest-exposure-first.
    Repeat,
}

/// One scheduled item plus its selection provenance.
#[derive(Debug, Clone, PartialEq)]
pub struct PlanEntry {
    item: Item,
    tier: PlanTier,
    rank: usize,
}

impl PlanEntry {
    #[must_use]
    pub fn item(&self) -> &Item {
        &self.item
    }

    #[must_use]
    pub fn tier(&self) -> PlanTier {
        self.tier
    }

    /// Position in the default serving order.
    #[must_use]
    pub fn rank(&self) -> usize {
        self.rank
    }
}

/// Ordered session plan.
///
/// The item set is fixed at creation; only the serving order of the unserved
/// tail may change, and never across the fresh/repeat boundary.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionPlan {
    entries: Vec<PlanEntry>,
    requested: usize,
    fresh_selected: usize,
    repeat_selected: usize,
    pool_exhausted: bool,
    tie_break_seed: Option<u64>,
}

impl SessionPlan {
    /// Total number of scheduled items.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true when no items were selected.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The size the caller asked for.
    #[must_use]
    pub fn requested(&self) -> usize {
        self.requested
    }

    #[must_use]
    pub fn fresh_selected(&self) -> usize {
        self.fresh_selected
    }

    #[must_use]
    pub fn repeat_selected(&self) -> usize {
        self.repeat_selected
    }

    /// True when the pool could not fill the requested size. Reported, never
    /// an error.
    #[must_use]
    pub fn pool_exhausted(&self) -> bool {
        self.pool_exhausted
    }

    /// The seed used for in-tier shuffling, when one was requested.
    #[must_use]
    pub fn tie_break_seed(&self) -> Option<u64> {
        self.tie_break_seed
    }

    #[must_use]
    pub fn entries(&self) -> &[PlanEntry] {
        &self.entries
    }

    #[must_use]
    pub fn get(&self, index: usize) -> Option<&PlanEntry> {
        self.entries.get(index)
    }

    #[must_use]
    pub fn position(&self, item_id: ItemId) -> Option<usize> {
        self.entries.iter().position(|e| e.item.id() == item_id)
    }

    #[must_use]
    pub fn contains(&self, item_id: ItemId) -> bool {
        self.position(item_id).is_some()
    }

    /// Re-bias the unserved tail toward easier items.
    ///
    /// Within each (tier, category) group the entries are re-sorted by
    /// difficulty, then original rank. Group members only ever swap among the
    /// slots the group already occupies, so the fresh/repeat boundary and the
    /// category interleaving stay put. A group with uniform difficulty comes
    /// out in default order.
    pub(crate) fn ease_tail(&mut self, from: usize) {
        if from >= self.entries.len() {
            return;
        }
        let mut groups: HashMap<(PlanTier, String), Vec<usize>> = HashMap::new();
        for index in from..self.entries.len() {
            let entry = &self.entries[index];
            groups
                .entry((entry.tier, entry.item.category().to_owned()))
                .or_default()
                .push(index);
        }
        for slots in groups.values() {
            let mut members: Vec<PlanEntry> =
                slots.iter().map(|&i| self.entries[i].clone()).collect();
            members.sort_by_key(|e| (e.item.difficulty(), e.rank));
            for (&slot, member) in slots.iter().zip(members) {
                self.entries[slot] = member;
            }
        }
    }

    /// Put the unserved tail back into the default serving order.
    pub(crate) fn restore_tail(&mut self, from: usize) {
        if from >= self.entries.len() {
            return;
        }
        self.entries[from..].sort_by_key(PlanEntry::rank);
    }
}

/// Builds a session plan from a classified pool.
///
/// Fresh items first in stable catalog order, then previously-seen items
/// oldest-exposure-first, until the requested size or the pool runs out.
#[derive(Debug, Clone, Default)]
pub struct SessionAssembler {
    tie_break_seed: Option<u64>,
}

impl SessionAssembler {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Shuffle candidates *within* the fresh tier with an explicit seed.
    ///
    /// The seed ends up on the plan, so a session remains reproducible. The
    /// repeat tier is never shuffled; its order is the freshness policy.
    #[must_use]
    pub fn with_tie_break_seed(mut self, seed: u64) -> Self {
        self.tie_break_seed = Some(seed);
        self
    }

    /// Build the plan. A pool smaller than `requested` yields a smaller plan;
    /// `requested == 0` yields a valid empty plan.
    #[must_use]
    pub fn build(&self, classified: Classified, requested: usize) -> SessionPlan {
        let Classified { mut never_seen, seen } = classified;

        if let Some(seed) = self.tie_break_seed {
            let mut rng = StdRng::seed_from_u64(seed);
            never_seen.shuffle(&mut rng);
        }

        let mut selected_ids: HashSet<ItemId> = HashSet::new();
        let mut entries: Vec<PlanEntry> = Vec::new();

        for item in never_seen {
            if entries.len() >= requested {
                break;
            }
            if selected_ids.insert(item.id()) {
                entries.push(PlanEntry {
                    item,
                    tier: PlanTier::Fresh,
                    rank: 0,
                });
            }
        }
        let fresh_selected = entries.len();

        for (item, _last_seen_at) in seen {
            if entries.len() >= requested {
                break;
            }
            if selected_ids.insert(item.id()) {
                entries.push(PlanEntry {
                    item,
                    tier: PlanTier::Repeat,
                    rank: 0,
                });
            }
        }
        let repeat_selected = entries.len() - fresh_selected;

        for (rank, entry) in entries.iter_mut().enumerate() {
            entry.rank = rank;
        }

        let pool_exhausted = entries.len() < requested;

        SessionPlan {
            entries,
            requested,
            fresh_selected,
            repeat_selected,
            pool_exhausted,
            tie_break_seed: self.tie_break_seed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use exam_core::model::{Difficulty, ItemContent};
    use exam_core::time::fixed_now;

    fn build_item(id: u64, category: &str, difficulty: Difficulty) -> Item {
        let content = ItemContent::new(
            format!("Q{id}"),
            vec!["a".to_string(), "b".to_string()],
            None,
        )
        .unwrap();
        Item::new(ItemId::new(id), category, "topic", difficulty, content).unwrap()
    }

    fn fresh_only(count: u64) -> Classified {
        Classified {
            never_seen: (1..=count)
                .map(|id| build_item(id, "math", Difficulty::Medium))
                .collect(),
            seen: Vec::new(),
        }
    }

    #[test]
    fn plan_size_is_min_of_pool_and_requested() {
        let assembler = SessionAssembler::new();

        let plan = assembler.build(fresh_only(3), 10);
        assert_eq!(plan.len(), 3);
        assert!(plan.pool_exhausted());

        let plan = assembler.build(fresh_only(10), 4);
        assert_eq!(plan.len(), 4);
        assert!(!plan.pool_exhausted());
    }

    #[test]
    fn zero_requested_yields_valid_empty_plan() {
        let plan = SessionAssembler::new().build(fresh_only(5), 0);
        assert!(plan.is_empty());
        assert!(!plan.pool_exhausted());
    }

    #[test]
    fn fresh_items_fill_before_repeats() {
        let now = fixed_now();
        let classified = Classified {
            never_seen: vec![
                build_item(1, "math", Difficulty::Easy),
                build_item(2, "math", Difficulty::Hard),
            ],
            seen: vec![
                (build_item(3, "math", Difficulty::Easy), now - Duration::days(9)),
                (build_item(4, "math", Difficulty::Easy), now - Duration::days(1)),
            ],
        };

        let plan = SessionAssembler::new().build(classified, 3);
        assert_eq!(plan.len(), 3);
        assert_eq!(plan.fresh_selected(), 2);
        assert_eq!(plan.repeat_selected(), 1);
        assert_eq!(plan.entries()[0].tier(), PlanTier::Fresh);
        assert_eq!(plan.entries()[1].tier(), PlanTier::Fresh);
        // oldest exposure wins the repeat slot
        assert_eq!(plan.entries()[2].item().id(), ItemId::new(3));
        assert_eq!(plan.entries()[2].tier(), PlanTier::Repeat);
    }

    #[test]
    fn enough_fresh_items_means_no_repeats() {
        let now = fixed_now();
        let mut classified = fresh_only(5);
        classified
            .seen
            .push((build_item(9, "math", Difficulty::Easy), now));

        let plan = SessionAssembler::new().build(classified, 5);
        assert!(plan.entries().iter().all(|e| e.tier() == PlanTier::Fresh));
    }

    #[test]
    fn no_item_appears_twice() {
        let now = fixed_now();
        // item 2 somehow present in both tiers; the plan must dedupe
        let classified = Classified {
            never_seen: vec![
                build_item(1, "math", Difficulty::Easy),
                build_item(2, "math", Difficulty::Easy),
            ],
            seen: vec![(build_item(2, "math", Difficulty::Easy), now)],
        };

        let plan = SessionAssembler::new().build(classified, 10);
        let mut ids: Vec<ItemId> = plan.entries().iter().map(|e| e.item().id()).collect();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), plan.len());
    }

    #[test]
    fn seeded_shuffle_is_reproducible_and_reported() {
        let plan_a = SessionAssembler::new()
            .with_tie_break_seed(42)
            .build(fresh_only(20), 20);
        let plan_b = SessionAssembler::new()
            .with_tie_break_seed(42)
            .build(fresh_only(20), 20);

        assert_eq!(plan_a, plan_b);
        assert_eq!(plan_a.tie_break_seed(), Some(42));

        let unseeded = SessionAssembler::new().build(fresh_only(20), 20);
        assert_eq!(unseeded.tie_break_seed(), None);
        // unseeded order is stable catalog order
        let ids: Vec<u64> = unseeded
            .entries()
            .iter()
            .map(|e| e.item().id().value())
            .collect();
        assert_eq!(ids, (1..=20).collect::<Vec<u64>>());
    }

    #[test]
    fn ease_tail_prefers_easier_within_tier_and_category() {
        let now = fixed_now();
        let classified = Classified {
            never_seen: vec![
                build_item(1, "math", Difficulty::Hard),
                build_item(2, "math", Difficulty::Easy),
                build_item(3, "math", Difficulty::Medium),
            ],
            seen: vec![
                (build_item(4, "math", Difficulty::Hard), now - Duration::days(4)),
                (build_item(5, "math", Difficulty::Easy), now - Duration::days(2)),
            ],
        };

        let mut plan = SessionAssembler::new().build(classified, 5);
        plan.ease_tail(0);

        let ids: Vec<u64> = plan.entries().iter().map(|e| e.item().id().value()).collect();
        // fresh tier re-sorted easy-first, repeat tier re-sorted easy-first,
        // and no repeat item crosses in front of a fresh item
        assert_eq!(ids, vec![2, 3, 1, 5, 4]);

        plan.restore_tail(0);
        let ids: Vec<u64> = plan.entries().iter().map(|e| e.item().id().value()).collect();
        assert_eq!(ids, vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn ease_tail_leaves_served_prefix_alone() {
        let classified = Classified {
            never_seen: vec![
                build_item(1, "math", Difficulty::Hard),
                build_item(2, "math", Difficulty::Hard),
                build_item(3, "math", Difficulty::Easy),
            ],
            seen: Vec::new(),
        };

        let mut plan = SessionAssembler::new().build(classified, 3);
        plan.ease_tail(1);

        let ids: Vec<u64> = plan.entries().iter().map(|e| e.item().id().value()).collect();
        assert_eq!(ids, vec![1, 3, 2]);
    }

    #[test]
    fn ease_tail_keeps_categories_in_their_slots() {
        let classified = Classified {
            never_seen: vec![
                build_item(1, "math", Difficulty::Hard),
                build_item(2, "reading", Difficulty::Hard),
                build_item(3, "math", Difficulty::Easy),
                build_item(4, "reading", Difficulty::Easy),
            ],
            seen: Vec::new(),
        };

        let mut plan = SessionAssembler::new().build(classified, 4);
        plan.ease_tail(0);

        let entries = plan.entries();
        // slots keep their categories; each category is easy-first
        assert_eq!(entries[0].item().category(), "math");
        assert_eq!(entries[0].item().id(), ItemId::new(3));
        assert_eq!(entries[1].item().category(), "reading");
        assert_eq!(entries[1].item().id(), ItemId::new(4));
        assert_eq!(entries[2].item().id(), ItemId::new(1));
        assert_eq!(entries[3].item().id(), ItemId::new(2));
    }

    #[test]
    fn uniform_difficulty_falls_back_to_default_order() {
        let mut plan = SessionAssembler::new().build(fresh_only(4), 4);
        let before: Vec<u64> = plan.entries().iter().map(|e| e.item().id().value()).collect();
        plan.ease_tail(0);
        let after: Vec<u64> = plan.entries().iter().map(|e| e.item().id().value()).collect();
        assert_eq!(before, after);
    }
}
