//! Join-mode rendering over the normalized killmail relation.

use super::sql::{and_all, SqlBuilder, SqlQuery};
use super::{page_clause, ActorField, Condition, FilterPlan, FilterStrategy, LocationField, Page, QueryMode};
use crate::killmail::{Attacker, Killmail, Victim};

/// Predicates over `killmails k JOIN killmail_victims v`, with attacker
/// matches as correlated `EXISTS` subqueries.
#[derive(Debug, Clone, Copy, Default)]
pub struct JoinStrategy;

impl JoinStrategy {
    fn render_condition(condition: &Condition, b: &mut SqlBuilder) -> String {
        match *condition {
            Condition::Participant {
                field,
                scope,
                value,
            } => {
                let p = b.bind(value);
                let column = field.column();
                let mut either = Vec::with_capacity(2);
                if scope.includes_victim() {
                    either.push(format!("v.{} = {}", column, p));
                }
                if scope.includes_attacker() {
                    either.push(format!(
                        "EXISTS (SELECT 1 FROM killmail_attackers a \
                         WHERE a.killmail_id = k.killmail_id AND a.{} = {})",
                        column, p
                    ));
                }
                format!("({})", either.join(" OR "))
            }
            Condition::Location { field, value } => {
                format!("k.{} = {}", field.column(), b.bind(value))
            }
            Condition::MinAttackers(n) => format!("k.attacker_count >= {}", b.bind(n)),
            Condition::MaxAttackers(n) => format!("k.attacker_count <= {}", b.bind(n)),
        }
    }
}

fn victim_value(victim: &Victim, field: ActorField) -> Option<i64> {
    match field {
        ActorField::ShipType => Some(victim.ship_type_id),
        ActorField::Character => victim.character_id,
        ActorField::Corporation => victim.corporation_id,
        ActorField::Alliance => victim.alliance_id,
    }
}

fn attacker_value(attacker: &Attacker, field: ActorField) -> Option<i64> {
    match field {
        ActorField::ShipType => attacker.ship_type_id,
        ActorField::Character => attacker.character_id,
        ActorField::Corporation => attacker.corporation_id,
        ActorField::Alliance => attacker.alliance_id,
    }
}

impl FilterStrategy for JoinStrategy {
    type Row = Killmail;

    fn mode(&self) -> QueryMode {
        QueryMode::Join
    }

    fn render(&self, plan: &FilterPlan, page: Page) -> SqlQuery {
        let mut b = SqlBuilder::new();
        let mut clauses: Vec<String> = plan
            .conditions
            .iter()
            .map(|c| Self::render_condition(c, &mut b))
            .collect();
        let (before, tail) = page_clause("k.killmail_id", page, &mut b);
        clauses.extend(before);

        let sql = format!(
            "SELECT k.killmail_id FROM killmails k \
             JOIN killmail_victims v ON v.killmail_id = k.killmail_id \
             WHERE {}{}",
            and_all(clauses),
            tail
        );
        b.finish(sql)
    }

    fn matches(&self, plan: &FilterPlan, km: &Killmail) -> bool {
        plan.conditions.iter().all(|c| match *c {
            Condition::Participant {
                field,
                scope,
                value,
            } => {
                (scope.includes_victim() && victim_value(&km.victim, field) == Some(value))
                    || (scope.includes_attacker()
                        && km
                            .attackers
                            .iter()
                            .any(|a| attacker_value(a, field) == Some(value)))
            }
            Condition::Location { field, value } => match field {
                LocationField::SolarSystem => km.solar_system_id == value,
                LocationField::Region => km.region_id == Some(value),
            },
            Condition::MinAttackers(n) => km.attacker_count() >= n,
            Condition::MaxAttackers(n) => km.attacker_count() <= n,
        })
    }
}
