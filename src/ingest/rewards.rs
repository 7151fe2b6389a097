//! Reward integrations.
//!
//! Points systems, badge engines and the like subscribe to accepted events
//! through [`RewardHandler`]. Each handler runs independently; a failing one
//! is logged by the coordinator and never affects the others.

use std::collections::BTreeMap;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::{Map, Value};
use tracing::debug;

use crate::core::ids::ActorId;
use crate::events::schema::EventType;

/// Consumer of accepted gamification events.
#[async_trait]
pub trait RewardHandler: Send + Sync {
    /// Name used in logs.
    fn name(&self) -> &str;

    /// React to one accepted event.
    async fn on_gamify_event(
        &self,
        event_type: &EventType,
        actor_id: ActorId,
        score: u64,
        payload: &Map<String, Value>,
    ) -> anyhow::Result<()>;
}

/// Points awarded per event kind on top of the event's score.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PointsTable {
    base: BTreeMap<String, u64>,
}

impl Default for PointsTable {
    fn default() -> Self {
        let base = [
            (EventType::LevelComplete, 50),
            (EventType::GameOver, 10),
            (EventType::ScoreMilestone, 25),
            (EventType::Death, 0),
            (EventType::GameStart, 5),
            (EventType::AchievementUnlock, 100),
        ]
        .into_iter()
        .map(|(kind, points)| (kind.as_str().to_string(), points))
        .collect();
        Self { base }
    }
}

impl PointsTable {
    /// Override the base points of one kind.
    pub fn with(mut self, event_type: &EventType, points: u64) -> Self {
        self.base.insert(event_type.as_str().to_string(), points);
        self
    }

    /// Base points of a kind; unknown kinds earn none.
    pub fn base_points(&self, event_type: &EventType) -> u64 {
        self.base.get(event_type.as_str()).copied().unwrap_or(0)
    }
}

/// In-process points balance per actor.
#[derive(Debug, Default)]
pub struct PointsLedger {
    table: PointsTable,
    balances: RwLock<BTreeMap<ActorId, u64>>,
}

impl PointsLedger {
    /// Ledger with the default points table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Ledger with a custom points table.
    pub fn with_table(table: PointsTable) -> Self {
        Self {
            table,
            balances: RwLock::new(BTreeMap::new()),
        }
    }

    /// Current balance.
    pub fn balance(&self, actor_id: ActorId) -> u64 {
        self.balances.read().get(&actor_id).copied().unwrap_or(0)
    }

    /// Highest balances first.
    pub fn leaderboard(&self, limit: usize) -> Vec<(ActorId, u64)> {
        let mut rows: Vec<(ActorId, u64)> = self.balances.read().iter().map(|(a, p)| (*a, *p)).collect();
        rows.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
        rows.truncate(limit);
        rows
    }
}

#[async_trait]
impl RewardHandler for PointsLedger {
    fn name(&self) -> &str {
        "points_ledger"
    }

    async fn on_gamify_event(
        &self,
        event_type: &EventType,
        actor_id: ActorId,
        score: u64,
        _payload: &Map<String, Value>,
    ) -> anyhow::Result<()> {
        let awarded = self.table.base_points(event_type).saturating_add(score);
        let mut balances = self.balances.write();
        let balance = balances.entry(actor_id).or_insert(0);
        *balance = balance.saturating_add(awarded);
        debug!(actor = %actor_id, event = %event_type, awarded, balance = *balance, "Points awarded");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_points_accumulate() {
        let ledger = PointsLedger::new();
        let payload = Map::new();

        ledger
            .on_gamify_event(&EventType::LevelComplete, ActorId(1), 200, &payload)
            .await
            .unwrap();
        ledger
            .on_gamify_event(&EventType::AchievementUnlock, ActorId(1), 0, &payload)
            .await
            .unwrap();
        ledger
            .on_gamify_event(&EventType::Death, ActorId(2), 3, &payload)
            .await
            .unwrap();

        assert_eq!(ledger.balance(ActorId(1)), 350);
        assert_eq!(ledger.balance(ActorId(2)), 3);
        assert_eq!(ledger.balance(ActorId(3)), 0);
        assert_eq!(ledger.leaderboard(1), vec![(ActorId(1), 350)]);
    }

    #[tokio::test]
    async fn test_custom_table_and_registered_kinds() {
        let kind = EventType::from_name("boss_defeated");
        let ledger = PointsLedger::with_table(PointsTable::default().with(&kind, 500));

        ledger.on_gamify_event(&kind, ActorId(4), 1, &Map::new()).await.unwrap();
        ledger
            .on_gamify_event(&EventType::from_name("unlisted"), ActorId(4), 1, &Map::new())
            .await
            .unwrap();
        assert_eq!(ledger.balance(ActorId(4)), 502);
    }
}
