//! Fact Integration Pipeline - applies extracted fact deltas to the entity store.
//!
//! Every delta is validated and applied on its own. A delta that fails
//! validation or references an unknown entity is skipped with a warning;
//! nothing it would have written is persisted. Storage failures are not
//! contained and abort the run.
//!
//! Character updates aimed at the declared POV slot are checked against the
//! declared POV name first: a mismatch means the viewpoint moved to someone
//! else, so the update goes to that person (created if needed) and the slot's
//! original occupant is left untouched.

mod delta;
mod report;

pub use delta::*;
pub use report::*;

use std::collections::BTreeMap;
use tracing::{debug, info};

use story_bible::{
    normalize_name, Character, EntityId, EntityKind, Goal, GoalStatus, LoreItem, OpenLoop,
    Relationship,
};

use crate::config::IntegrationConfig;
use crate::entity_store::EntityStore;
use crate::error::{NarrativeError, Result};
use crate::story_state::StoryState;

/// The tick and scene the deltas were extracted from.
#[derive(Debug, Clone, PartialEq)]
pub struct SceneContext {
    pub tick: u32,
    /// Scene recorded as provenance for loops and lore.
    pub scene_id: EntityId,
    /// Character slot the scene was declared to be written from.
    pub pov_character_id: Option<EntityId>,
    /// Name the prose generator declared for the POV character.
    pub pov_name: Option<String>,
    pub location_id: Option<EntityId>,
}

impl SceneContext {
    pub fn new(tick: u32, scene_id: EntityId) -> Self {
        Self {
            tick,
            scene_id,
            pov_character_id: None,
            pov_name: None,
            location_id: None,
        }
    }

    pub fn with_pov(mut self, character: Option<EntityId>, name: Option<String>) -> Self {
        self.pov_character_id = character;
        self.pov_name = name;
        self
    }

    pub fn with_location(mut self, location: Option<EntityId>) -> Self {
        self.location_id = location;
        self
    }
}

/// Applies fact deltas, one independently valid write at a time.
#[derive(Debug, Clone, Default)]
pub struct FactIntegrationPipeline {
    config: IntegrationConfig,
}

impl FactIntegrationPipeline {
    pub fn new(config: IntegrationConfig) -> Self {
        Self { config }
    }

    pub fn with_defaults() -> Self {
        Self::default()
    }

    /// Apply `deltas` in order, then promote long-running loops to goals.
    pub fn integrate(
        &self,
        store: &mut EntityStore,
        state: &mut StoryState,
        context: &SceneContext,
        deltas: &[FactDelta],
    ) -> Result<IntegrationReport> {
        let mut report = IntegrationReport::new();

        for delta in deltas {
            let kind = target_kind(delta);
            let applied = delta
                .validate()
                .and_then(|()| self.apply(store, state, context, delta, &mut report));
            match applied {
                Ok(outcome) => report.record(kind, outcome),
                Err(err) if err.is_recoverable() => {
                    report.warn(format!("skipped {}: {}", delta.label(), err));
                    report.record(kind, Outcome::Skipped);
                }
                Err(err) => return Err(err),
            }
        }

        self.promote_goals(store, context, &mut report)?;

        debug!(
            tick = context.tick,
            deltas = deltas.len(),
            warnings = report.warnings().len(),
            "fact deltas integrated"
        );
        Ok(report)
    }

    fn apply(
        &self,
        store: &mut EntityStore,
        state: &mut StoryState,
        context: &SceneContext,
        delta: &FactDelta,
        report: &mut IntegrationReport,
    ) -> Result<Outcome> {
        match delta {
            FactDelta::CharacterUpdate {
                character_id,
                fields,
            } => self.update_character(store, state, context, *character_id, fields, report),
            FactDelta::RelationshipUpdate {
                character_a,
                character_b,
                relationship_type,
                strength,
            } => upsert_relationship(store, *character_a, *character_b, relationship_type, *strength),
            FactDelta::LoopDelta {
                action: LoopAction::Create,
                description,
                importance,
                ..
            } => self.raise_loop(store, context, description, *importance),
            FactDelta::LoopDelta {
                action: LoopAction::Resolve,
                description,
                loop_id,
                ..
            } => resolve_loop(store, context, description, *loop_id, report),
            FactDelta::LoreAddition {
                statement,
                category,
            } => add_lore(store, context, statement, category.clone(), report),
        }
    }

    fn update_character(
        &self,
        store: &mut EntityStore,
        state: &mut StoryState,
        context: &SceneContext,
        id: EntityId,
        fields: &BTreeMap<String, String>,
        report: &mut IntegrationReport,
    ) -> Result<Outcome> {
        let declared_name = context
            .pov_name
            .as_deref()
            .filter(|name| !normalize_name(name).is_empty());

        let pov_slot_name = declared_name.filter(|_| context.pov_character_id == Some(id));
        if let Some(name) = pov_slot_name {
            let occupant_matches = if store.contains(id) {
                store.load::<Character>(id)?.answers_to(name)
            } else {
                false
            };
            if !occupant_matches {
                return switch_pov(store, state, id, name, fields, report);
            }
        }

        let mut character: Character = store.load(id)?;
        if character.merge_state(fields) > 0 {
            store.save(&character)?;
        }
        Ok(Outcome::Updated)
    }

    fn raise_loop(
        &self,
        store: &mut EntityStore,
        context: &SceneContext,
        description: &str,
        importance: Option<f32>,
    ) -> Result<Outcome> {
        let key = fingerprint(description);
        if let Some(mut existing) = store.find_loop_by_fingerprint(&key)? {
            if !existing.is_open() {
                return Err(NarrativeError::Validation(format!(
                    "loop `{}` was already resolved",
                    existing.id
                )));
            }
            if !existing.mention(context.scene_id) {
                debug!(id = %existing.id, scene = %context.scene_id, "loop already recorded for scene");
                return Ok(Outcome::Skipped);
            }
            store.save(&existing)?;
            return Ok(Outcome::Updated);
        }

        let importance = importance.unwrap_or(self.config.default_loop_importance);
        let mut open_loop = OpenLoop::new(description.trim(), key, importance, context.tick);
        open_loop.mention(context.scene_id);
        store.create(open_loop)?;
        Ok(Outcome::Created)
    }

    /// Turn open loops past the mention or age threshold into goals.
    fn promote_goals(
        &self,
        store: &mut EntityStore,
        context: &SceneContext,
        report: &mut IntegrationReport,
    ) -> Result<()> {
        let candidates: Vec<OpenLoop> = store
            .load_all::<OpenLoop>()?
            .into_iter()
            .filter(|l| l.is_open() && l.goal.is_none())
            .filter(|l| {
                l.mentions >= self.config.goal_mention_threshold
                    || l.age(context.tick) >= self.config.goal_age_threshold
            })
            .collect();

        for mut open_loop in candidates {
            let parent = enclosing_goal(store, open_loop.importance)?;
            let goal = Goal::new(open_loop.description.clone(), open_loop.id, context.tick)
                .with_parent(parent);
            let goal_id = store.create(goal)?;
            open_loop.goal = Some(goal_id);
            store.save(&open_loop)?;
            report.record(EntityKind::Goal, Outcome::Created);
            info!(loop_id = %open_loop.id, goal = %goal_id, "open loop promoted to goal");
        }
        Ok(())
    }
}

fn target_kind(delta: &FactDelta) -> EntityKind {
    match delta {
        FactDelta::CharacterUpdate { .. } => EntityKind::Character,
        FactDelta::RelationshipUpdate { .. } => EntityKind::Relationship,
        FactDelta::LoopDelta { .. } => EntityKind::OpenLoop,
        FactDelta::LoreAddition { .. } => EntityKind::LoreItem,
    }
}

/// Move the active POV to the character named `name`, creating it if nobody answers to it.
fn switch_pov(
    store: &mut EntityStore,
    state: &mut StoryState,
    slot: EntityId,
    name: &str,
    fields: &BTreeMap<String, String>,
    report: &mut IntegrationReport,
) -> Result<Outcome> {
    let previous = state.active_pov();

    let (target, outcome) = match store.find_character_by_name(name)? {
        Some(mut existing) => {
            if existing.merge_state(fields) > 0 {
                store.save(&existing)?;
            }
            (existing.id, Outcome::Updated)
        }
        None => {
            let mut character = Character::from_full_name(name);
            character.current_state = fields.clone();
            (store.create(character)?, Outcome::Created)
        }
    };

    state.set_active_pov(target);
    report.set_pov_switch(PovSwitch {
        from: previous,
        to: target,
        created: outcome == Outcome::Created,
    });
    info!(%slot, to = %target, name, "point of view switched");
    Ok(outcome)
}

fn upsert_relationship(
    store: &mut EntityStore,
    a: EntityId,
    b: EntityId,
    relationship_type: &str,
    strength: f32,
) -> Result<Outcome> {
    for endpoint in [a, b] {
        if !store.contains(endpoint) {
            return Err(NarrativeError::ReferentialIntegrity { missing: endpoint });
        }
    }

    let incoming = Relationship::new(a, b, relationship_type, strength);
    if let Some(mut existing) = store.find_relationship(a, b)? {
        if existing.relationship_type != incoming.relationship_type
            || existing.strength != incoming.strength
        {
            existing.relationship_type = incoming.relationship_type;
            existing.strength = incoming.strength;
            store.save(&existing)?;
        }
        return Ok(Outcome::Updated);
    }

    let id = store.create(incoming)?;
    for endpoint in [a, b] {
        let mut character: Character = store.load(endpoint)?;
        if character.relationships.insert(id) {
            store.save(&character)?;
        }
    }
    Ok(Outcome::Created)
}

fn resolve_loop(
    store: &mut EntityStore,
    context: &SceneContext,
    description: &str,
    loop_id: Option<EntityId>,
    report: &mut IntegrationReport,
) -> Result<Outcome> {
    let target = match loop_id {
        Some(id) if store.contains(id) => Some(store.load::<OpenLoop>(id)?),
        Some(_) => None,
        None => store.find_loop_by_fingerprint(&fingerprint(description))?,
    };
    let Some(mut open_loop) = target else {
        let label = loop_id
            .map(|id| id.to_string())
            .unwrap_or_else(|| description.trim().to_string());
        report.warn(format!("no loop to resolve for `{}`", label));
        return Ok(Outcome::Skipped);
    };

    if !open_loop.resolve(context.scene_id) {
        return Ok(Outcome::Skipped);
    }
    store.save(&open_loop)?;

    if let Some(goal_id) = open_loop.goal {
        let mut goal: Goal = store.load(goal_id)?;
        if goal.status != GoalStatus::Achieved {
            goal.status = GoalStatus::Achieved;
            store.save(&goal)?;
        }
    }
    Ok(Outcome::Updated)
}

fn add_lore(
    store: &mut EntityStore,
    context: &SceneContext,
    statement: &str,
    category: Option<String>,
    report: &mut IntegrationReport,
) -> Result<Outcome> {
    let key = fingerprint(statement);
    let existing = store.load_all::<LoreItem>()?;
    if existing.iter().any(|item| item.fingerprint == key) {
        return Ok(Outcome::Skipped);
    }

    let mut item = LoreItem::new(statement.trim(), key, context.scene_id).with_category(category);
    let (core, negated) = negation_key(statement);
    if let Some(conflict) = existing.iter().find(|other| {
        let (other_core, other_negated) = negation_key(&other.statement);
        other_core == core && other_negated != negated
    }) {
        item.conflicts_with = Some(conflict.id);
        report.warn(format!(
            "lore `{}` contradicts {} `{}`",
            item.statement, conflict.id, conflict.statement
        ));
    }
    store.create(item)?;
    Ok(Outcome::Created)
}

/// A statement with negation words removed, and whether it was negated.
fn negation_key(statement: &str) -> (String, bool) {
    let normalized = normalize_statement(statement);
    let mut negations = 0;
    let core: Vec<&str> = normalized
        .split(' ')
        .filter(|word| {
            let negation = matches!(*word, "not" | "never");
            if negation {
                negations += 1;
            }
            !negation
        })
        .collect();
    (core.join(" "), negations % 2 == 1)
}

/// The active goal a new goal of `importance` nests under: the one whose
/// source loop matters most, if it matters more than the new one.
fn enclosing_goal(store: &EntityStore, importance: f32) -> Result<Option<EntityId>> {
    let mut best: Option<(f32, EntityId)> = None;
    for goal in store.load_all::<Goal>()? {
        if goal.status != GoalStatus::Active || !store.contains(goal.source_loop) {
            continue;
        }
        let source: OpenLoop = store.load(goal.source_loop)?;
        if source.importance > importance && best.map_or(true, |(b, _)| source.importance > b) {
            best = Some((source.importance, goal.id));
        }
    }
    Ok(best.map(|(_, id)| id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use story_bible::LoopStatus;

    fn scene(seq: u32) -> EntityId {
        EntityId::new(EntityKind::Scene, seq)
    }

    fn fields(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn create_loop(description: &str) -> FactDelta {
        FactDelta::LoopDelta {
            action: LoopAction::Create,
            description: description.to_string(),
            importance: None,
            loop_id: None,
        }
    }

    fn resolve(description: &str) -> FactDelta {
        FactDelta::LoopDelta {
            action: LoopAction::Resolve,
            description: description.to_string(),
            importance: None,
            loop_id: None,
        }
    }

    fn setup() -> (EntityStore, StoryState, EntityId) {
        let mut store = EntityStore::in_memory();
        let alice = store.create(Character::new("Alice", "Smith")).unwrap();
        (store, StoryState::new().with_active_pov(alice), alice)
    }

    #[test]
    fn test_pov_switch_creates_new_character() {
        let (mut store, mut state, alice) = setup();
        let context = SceneContext::new(3, scene(3)).with_pov(Some(alice), Some("Bob Johnson".into()));
        let deltas = vec![FactDelta::CharacterUpdate {
            character_id: alice,
            fields: fields(&[("status", "injured")]),
        }];

        let report = FactIntegrationPipeline::with_defaults()
            .integrate(&mut store, &mut state, &context, &deltas)
            .unwrap();

        let unchanged: Character = store.load(alice).unwrap();
        assert_eq!(unchanged.full_name(), "Alice Smith");
        assert!(unchanged.current_state.is_empty());

        let bob_id: EntityId = "C1".parse().unwrap();
        let bob: Character = store.load(bob_id).unwrap();
        assert_eq!(bob.first_name, "Bob");
        assert_eq!(bob.family_name, "Johnson");
        assert_eq!(bob.current_state["status"], "injured");

        assert_eq!(state.active_pov(), Some(bob_id));
        assert_eq!(report.counts(EntityKind::Character).created, 1);
        assert_eq!(
            report.pov_switch(),
            Some(PovSwitch {
                from: Some(alice),
                to: bob_id,
                created: true
            })
        );
    }

    #[test]
    fn test_matching_pov_name_merges_fields() {
        let (mut store, mut state, alice) = setup();
        let context =
            SceneContext::new(0, scene(0)).with_pov(Some(alice), Some("  alice   SMITH ".into()));
        let deltas = vec![FactDelta::CharacterUpdate {
            character_id: alice,
            fields: fields(&[("mood", "wary")]),
        }];

        let report = FactIntegrationPipeline::with_defaults()
            .integrate(&mut store, &mut state, &context, &deltas)
            .unwrap();

        let alice_now: Character = store.load(alice).unwrap();
        assert_eq!(alice_now.current_state["mood"], "wary");
        assert_eq!(store.count(EntityKind::Character), 1);
        assert_eq!(state.active_pov(), Some(alice));
        assert_eq!(report.counts(EntityKind::Character).updated, 1);
        assert!(report.pov_switch().is_none());
    }

    #[test]
    fn test_pov_switch_reuses_known_character() {
        let (mut store, mut state, alice) = setup();
        let bob = store.create(Character::new("Bob", "Johnson")).unwrap();
        let context = SceneContext::new(1, scene(1)).with_pov(Some(alice), Some("Bob Johnson".into()));
        let deltas = vec![
            FactDelta::CharacterUpdate {
                character_id: alice,
                fields: fields(&[("status", "injured")]),
            },
            FactDelta::CharacterUpdate {
                character_id: alice,
                fields: fields(&[("mood", "grim")]),
            },
        ];

        FactIntegrationPipeline::with_defaults()
            .integrate(&mut store, &mut state, &context, &deltas)
            .unwrap();

        assert_eq!(store.count(EntityKind::Character), 2);
        let bob_now: Character = store.load(bob).unwrap();
        assert_eq!(bob_now.current_state["status"], "injured");
        assert_eq!(bob_now.current_state["mood"], "grim");
        assert_eq!(state.active_pov(), Some(bob));
    }

    #[test]
    fn test_unknown_non_pov_character_is_skipped() {
        let (mut store, mut state, alice) = setup();
        let context = SceneContext::new(0, scene(0)).with_pov(Some(alice), Some("Alice Smith".into()));
        let deltas = vec![FactDelta::CharacterUpdate {
            character_id: "C7".parse().unwrap(),
            fields: fields(&[("status", "dead")]),
        }];

        let report = FactIntegrationPipeline::with_defaults()
            .integrate(&mut store, &mut state, &context, &deltas)
            .unwrap();

        assert_eq!(store.count(EntityKind::Character), 1);
        assert_eq!(report.counts(EntityKind::Character).skipped, 1);
        assert_eq!(report.warnings().len(), 1);
        assert!(report.warnings()[0].contains("C7"));
    }

    #[test]
    fn test_relationship_with_missing_endpoint_is_rejected() {
        let (mut store, mut state, alice) = setup();
        let bob = store.create(Character::new("Bob", "Johnson")).unwrap();
        store
            .create(Relationship::new(alice, bob, "sibling", 0.9))
            .unwrap();
        let before: Character = store.load(alice).unwrap();

        let deltas = vec![FactDelta::RelationshipUpdate {
            character_a: alice,
            character_b: "C9".parse().unwrap(),
            relationship_type: "rival".into(),
            strength: 0.4,
        }];
        let report = FactIntegrationPipeline::with_defaults()
            .integrate(&mut store, &mut state, &SceneContext::new(0, scene(0)), &deltas)
            .unwrap();

        assert_eq!(store.count(EntityKind::Relationship), 1);
        assert_eq!(report.warnings().len(), 1);
        assert!(report.warnings()[0].contains("C9"));
        assert_eq!(store.load::<Character>(alice).unwrap(), before);
        let existing = store.find_relationship(alice, bob).unwrap().unwrap();
        assert_eq!(existing.relationship_type, "sibling");
    }

    #[test]
    fn test_relationship_upsert_and_linking() {
        let (mut store, mut state, alice) = setup();
        let bob = store.create(Character::new("Bob", "Johnson")).unwrap();
        let pipeline = FactIntegrationPipeline::with_defaults();
        let context = SceneContext::new(0, scene(0));

        let first = vec![FactDelta::RelationshipUpdate {
            character_a: bob,
            character_b: alice,
            relationship_type: "Friend".into(),
            strength: 0.3,
        }];
        let report = pipeline
            .integrate(&mut store, &mut state, &context, &first)
            .unwrap();
        assert_eq!(report.counts(EntityKind::Relationship).created, 1);

        let second = vec![FactDelta::RelationshipUpdate {
            character_a: alice,
            character_b: bob,
            relationship_type: "rival".into(),
            strength: 0.8,
        }];
        let report = pipeline
            .integrate(&mut store, &mut state, &context, &second)
            .unwrap();
        assert_eq!(report.counts(EntityKind::Relationship).updated, 1);
        assert_eq!(store.count(EntityKind::Relationship), 1);

        let relationship = store.find_relationship(alice, bob).unwrap().unwrap();
        assert_eq!(relationship.relationship_type, "rival");
        for endpoint in [alice, bob] {
            let character: Character = store.load(endpoint).unwrap();
            assert!(character.relationships.contains(&relationship.id));
        }
    }

    #[test]
    fn test_loop_creation_is_idempotent_per_scene() {
        let (mut store, mut state, _) = setup();
        let pipeline = FactIntegrationPipeline::with_defaults();
        let deltas = vec![create_loop("Who sent the letter?")];

        pipeline
            .integrate(&mut store, &mut state, &SceneContext::new(0, scene(0)), &deltas)
            .unwrap();
        let report = pipeline
            .integrate(&mut store, &mut state, &SceneContext::new(0, scene(0)), &deltas)
            .unwrap();
        assert_eq!(report.counts(EntityKind::OpenLoop).skipped, 1);
        assert!(report.warnings().is_empty());

        pipeline
            .integrate(
                &mut store,
                &mut state,
                &SceneContext::new(1, scene(1)),
                &[create_loop("who sent the LETTER")],
            )
            .unwrap();

        assert_eq!(store.count(EntityKind::OpenLoop), 1);
        let open_loop = store.load_all::<OpenLoop>().unwrap().remove(0);
        assert_eq!(open_loop.mentions, 2);
        assert_eq!(open_loop.importance, 0.5);
    }

    #[test]
    fn test_resolving_unknown_loop_is_a_warning() {
        let (mut store, mut state, _) = setup();
        let report = FactIntegrationPipeline::with_defaults()
            .integrate(
                &mut store,
                &mut state,
                &SceneContext::new(0, scene(0)),
                &[resolve("Where is the crown?")],
            )
            .unwrap();

        assert_eq!(report.counts(EntityKind::OpenLoop).skipped, 1);
        assert_eq!(report.warnings().len(), 1);
        assert_eq!(store.count(EntityKind::OpenLoop), 0);
    }

    #[test]
    fn test_goal_promotion_and_achievement() {
        let (mut store, mut state, _) = setup();
        let pipeline = FactIntegrationPipeline::with_defaults();
        let raised = [create_loop("Who sent the letter?")];

        for tick in 0..3 {
            pipeline
                .integrate(&mut store, &mut state, &SceneContext::new(tick, scene(tick)), &raised)
                .unwrap();
        }
        let open_loop = store.load_all::<OpenLoop>().unwrap().remove(0);
        let goal_id = open_loop.goal.expect("promoted after three mentions");
        assert_eq!(store.count(EntityKind::Goal), 1);

        let report = pipeline
            .integrate(
                &mut store,
                &mut state,
                &SceneContext::new(3, scene(3)),
                &[resolve("Who sent the letter?")],
            )
            .unwrap();
        assert_eq!(report.counts(EntityKind::OpenLoop).updated, 1);

        let resolved: OpenLoop = store.load(open_loop.id).unwrap();
        assert_eq!(resolved.status, LoopStatus::Resolved);
        assert!(resolved.resolved_in.contains(&scene(3)));
        let goal: Goal = store.load(goal_id).unwrap();
        assert_eq!(goal.status, GoalStatus::Achieved);
    }

    #[test]
    fn test_goal_promotion_by_age() {
        let (mut store, mut state, _) = setup();
        let pipeline = FactIntegrationPipeline::with_defaults();
        pipeline
            .integrate(
                &mut store,
                &mut state,
                &SceneContext::new(0, scene(0)),
                &[create_loop("What lies beneath the mill?")],
            )
            .unwrap();

        pipeline
            .integrate(&mut store, &mut state, &SceneContext::new(4, scene(4)), &[])
            .unwrap();
        assert_eq!(store.count(EntityKind::Goal), 0);

        let report = pipeline
            .integrate(&mut store, &mut state, &SceneContext::new(5, scene(5)), &[])
            .unwrap();
        assert_eq!(report.counts(EntityKind::Goal).created, 1);
    }

    #[test]
    fn test_lore_negation_is_flagged() {
        let (mut store, mut state, _) = setup();
        let pipeline = FactIntegrationPipeline::with_defaults();
        let context = SceneContext::new(0, scene(0));
        let deltas = vec![
            FactDelta::LoreAddition {
                statement: "The river freezes in winter.".into(),
                category: Some("geography".into()),
            },
            FactDelta::LoreAddition {
                statement: "the river freezes in winter".into(),
                category: None,
            },
            FactDelta::LoreAddition {
                statement: "The river never freezes in winter.".into(),
                category: None,
            },
        ];

        let report = pipeline
            .integrate(&mut store, &mut state, &context, &deltas)
            .unwrap();

        let counts = report.counts(EntityKind::LoreItem);
        assert_eq!((counts.created, counts.skipped), (2, 1));
        assert_eq!(report.warnings().len(), 1);

        let lore = store.load_all::<LoreItem>().unwrap();
        assert_eq!(lore[1].conflicts_with, Some(lore[0].id));
        assert_eq!(lore[0].origin_scene, scene(0));
    }

    #[test]
    fn test_invalid_delta_is_skipped_and_processing_continues() {
        let (mut store, mut state, alice) = setup();
        let deltas = vec![
            FactDelta::LoreAddition {
                statement: "".into(),
                category: None,
            },
            FactDelta::CharacterUpdate {
                character_id: alice,
                fields: fields(&[("status", "tired")]),
            },
        ];

        let report = FactIntegrationPipeline::with_defaults()
            .integrate(&mut store, &mut state, &SceneContext::new(0, scene(0)), &deltas)
            .unwrap();

        assert_eq!(report.counts(EntityKind::LoreItem).skipped, 1);
        assert_eq!(report.counts(EntityKind::Character).updated, 1);
        assert_eq!(store.count(EntityKind::LoreItem), 0);
    }

    #[test]
    fn test_negation_key() {
        assert_eq!(
            negation_key("The king is not dead!"),
            ("the king is dead".to_string(), true)
        );
        assert_eq!(negation_key("The king is dead"), ("the king is dead".to_string(), false));
    }
}
