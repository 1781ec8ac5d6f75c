//! Projection-mode rendering over the flattened `killmail_filters` view.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::sql::{and_all, SqlBuilder, SqlQuery};
use super::{page_clause, ActorField, Condition, FilterPlan, FilterStrategy, LocationField, Page, QueryMode};
use crate::killmail::Killmail;

/// One row of the filter projection: scalar victim columns plus
/// deduplicated, sorted attacker arrays.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterProjectionRow {
    pub killmail_id: i64,
    pub killmail_time: DateTime<Utc>,
    pub solar_system_id: i64,
    pub region_id: Option<i64>,
    pub attacker_count: i64,
    pub victim_character_id: Option<i64>,
    pub victim_corporation_id: Option<i64>,
    pub victim_alliance_id: Option<i64>,
    pub victim_ship_type_id: i64,
    pub attacker_character_ids: Vec<i64>,
    pub attacker_corporation_ids: Vec<i64>,
    pub attacker_alliance_ids: Vec<i64>,
    pub attacker_ship_type_ids: Vec<i64>,
}

fn collect_sorted(values: impl Iterator<Item = Option<i64>>) -> Vec<i64> {
    let mut out: Vec<i64> = values.flatten().collect();
    out.sort_unstable();
    out.dedup();
    out
}

impl FilterProjectionRow {
    /// Flatten a killmail the same way the materialized view does.
    pub fn from_killmail(km: &Killmail) -> Self {
        Self {
            killmail_id: km.killmail_id,
            killmail_time: km.killmail_time,
            solar_system_id: km.solar_system_id,
            region_id: km.region_id,
            attacker_count: km.attacker_count(),
            victim_character_id: km.victim.character_id,
            victim_corporation_id: km.victim.corporation_id,
            victim_alliance_id: km.victim.alliance_id,
            victim_ship_type_id: km.victim.ship_type_id,
            attacker_character_ids: collect_sorted(km.attackers.iter().map(|a| a.character_id)),
            attacker_corporation_ids: collect_sorted(km.attackers.iter().map(|a| a.corporation_id)),
            attacker_alliance_ids: collect_sorted(km.attackers.iter().map(|a| a.alliance_id)),
            attacker_ship_type_ids: collect_sorted(km.attackers.iter().map(|a| a.ship_type_id)),
        }
    }

    fn victim_value(&self, field: ActorField) -> Option<i64> {
        match field {
            ActorField::ShipType => Some(self.victim_ship_type_id),
            ActorField::Character => self.victim_character_id,
            ActorField::Corporation => self.victim_corporation_id,
            ActorField::Alliance => self.victim_alliance_id,
        }
    }

    fn attacker_values(&self, field: ActorField) -> &[i64] {
        match field {
            ActorField::ShipType => &self.attacker_ship_type_ids,
            ActorField::Character => &self.attacker_character_ids,
            ActorField::Corporation => &self.attacker_corporation_ids,
            ActorField::Alliance => &self.attacker_alliance_ids,
        }
    }
}

/// Flat predicates: `victim_x = $n OR $n = ANY(attacker_xs)`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProjectionStrategy;

impl ProjectionStrategy {
    fn array_column(field: ActorField) -> &'static str {
        match field {
            ActorField::ShipType => "attacker_ship_type_ids",
            ActorField::Character => "attacker_character_ids",
            ActorField::Corporation => "attacker_corporation_ids",
            ActorField::Alliance => "attacker_alliance_ids",
        }
    }

    fn render_condition(condition: &Condition, b: &mut SqlBuilder) -> String {
        match *condition {
            Condition::Participant {
                field,
                scope,
                value,
            } => {
                let p = b.bind(value);
                let mut either = Vec::with_capacity(2);
                if scope.includes_victim() {
                    either.push(format!("victim_{} = {}", field.column(), p));
                }
                if scope.includes_attacker() {
                    either.push(format!("{} = ANY({})", p, Self::array_column(field)));
                }
                format!("({})", either.join(" OR "))
            }
            Condition::Location { field, value } => {
                format!("{} = {}", field.column(), b.bind(value))
            }
            Condition::MinAttackers(n) => format!("attacker_count >= {}", b.bind(n)),
            Condition::MaxAttackers(n) => format!("attacker_count <= {}", b.bind(n)),
        }
    }
}

impl FilterStrategy for ProjectionStrategy {
    type Row = FilterProjectionRow;

    fn mode(&self) -> QueryMode {
        QueryMode::Projection
    }

    fn render(&self, plan: &FilterPlan, page: Page) -> SqlQuery {
        let mut b = SqlBuilder::new();
        let mut clauses: Vec<String> = plan
            .conditions
            .iter()
            .map(|c| Self::render_condition(c, &mut b))
            .collect();
        let (before, tail) = page_clause("killmail_id", page, &mut b);
        clauses.extend(before);

        let sql = format!(
            "SELECT killmail_id FROM killmail_filters WHERE {}{}",
            and_all(clauses),
            tail
        );
        b.finish(sql)
    }

    fn matches(&self, plan: &FilterPlan, row: &FilterProjectionRow) -> bool {
        plan.conditions.iter().all(|c| match *c {
            Condition::Participant {
                field,
                scope,
                value,
            } => {
                (scope.includes_victim() && row.victim_value(field) == Some(value))
                    || (scope.includes_attacker()
                        && row.attacker_values(field).binary_search(&value).is_ok())
            }
            Condition::Location { field, value } => match field {
                LocationField::SolarSystem => row.solar_system_id == value,
                LocationField::Region => row.region_id == Some(value),
            },
            Condition::MinAttackers(n) => row.attacker_count >= n,
            Condition::MaxAttackers(n) => row.attacker_count <= n,
        })
    }
}
