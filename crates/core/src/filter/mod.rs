//! Dual-mode killmail filter compiler.
//!
//! A [`KillFilter`] is planned once into a [`FilterPlan`] (an AND of
//! per-field conditions) and then rendered by one of two strategies:
//!
//! - [`JoinStrategy`] over the normalized `killmails` / `killmail_victims` /
//!   `killmail_attackers` relation. Always current.
//! - [`ProjectionStrategy`] over the flattened `killmail_filters` projection
//!   with scalar victim columns and attacker arrays. Index friendly, may lag.
//!
//! Once the projection is fully refreshed both strategies select the same
//! killmail IDs. Each strategy can also evaluate a plan against its row type
//! in memory, which is what the equivalence tests and fake stores use.

pub mod join;
pub mod projection;
pub mod sql;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use validator::{Validate, ValidationError};

use crate::error::{Error, Result, ValidationErrorCode};

pub use join::JoinStrategy;
pub use projection::{FilterProjectionRow, ProjectionStrategy};
pub use sql::{SqlBuilder, SqlQuery};

/// Default page size for killmail listings.
pub const DEFAULT_LIMIT: i64 = 50;

/// Hard ceiling on page size.
pub const MAX_LIMIT: i64 = 500;

/// Structured filter request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
#[validate(schema(function = "validate_attacker_bounds"))]
pub struct KillFilter {
    #[validate(range(min = 1))]
    pub ship_type_id: Option<i64>,
    #[serde(default)]
    pub victim: bool,
    #[serde(default)]
    pub attacker: bool,
    #[validate(range(min = 1))]
    pub character_id: Option<i64>,
    #[validate(range(min = 1))]
    pub corporation_id: Option<i64>,
    #[validate(range(min = 1))]
    pub alliance_id: Option<i64>,
    #[validate(range(min = 1))]
    pub region_id: Option<i64>,
    #[validate(range(min = 1))]
    pub system_id: Option<i64>,
    #[validate(range(min = 1))]
    pub min_attackers: Option<i64>,
    #[validate(range(min = 1))]
    pub max_attackers: Option<i64>,
}

fn validate_attacker_bounds(filter: &KillFilter) -> std::result::Result<(), ValidationError> {
    match (filter.min_attackers, filter.max_attackers) {
        (Some(min), Some(max)) if min > max => {
            Err(ValidationError::new("min_attackers_exceeds_max_attackers"))
        }
        _ => Ok(()),
    }
}

impl KillFilter {
    /// Which side(s) of the killmail actor conditions apply to.
    ///
    /// Both flags or neither means victim-or-attacker.
    pub fn role_scope(&self) -> RoleScope {
        match (self.victim, self.attacker) {
            (true, false) => RoleScope::Victim,
            (false, true) => RoleScope::Attacker,
            _ => RoleScope::Either,
        }
    }

    /// Whether any actor (character/corporation/alliance) is pinned.
    pub fn has_actor(&self) -> bool {
        self.character_id.is_some() || self.corporation_id.is_some() || self.alliance_id.is_some()
    }

    /// Validate and lower into a plan.
    pub fn plan(&self) -> Result<FilterPlan> {
        self.validate().map_err(|e| {
            Error::validation_code(ValidationErrorCode::InvalidFilter, e.to_string())
        })?;

        let scope = self.role_scope();
        let mut conditions = Vec::new();

        let actors = [
            (ActorField::ShipType, self.ship_type_id),
            (ActorField::Character, self.character_id),
            (ActorField::Corporation, self.corporation_id),
            (ActorField::Alliance, self.alliance_id),
        ];
        for (field, value) in actors {
            if let Some(value) = value {
                conditions.push(Condition::Participant {
                    field,
                    scope,
                    value,
                });
            }
        }
        if let Some(value) = self.system_id {
            conditions.push(Condition::Location {
                field: LocationField::SolarSystem,
                value,
            });
        }
        if let Some(value) = self.region_id {
            conditions.push(Condition::Location {
                field: LocationField::Region,
                value,
            });
        }
        if let Some(value) = self.min_attackers {
            conditions.push(Condition::MinAttackers(value));
        }
        if let Some(value) = self.max_attackers {
            conditions.push(Condition::MaxAttackers(value));
        }

        Ok(FilterPlan { conditions })
    }

    /// Stable, human-readable identity of this filter for cache keys.
    pub fn fingerprint(&self) -> String {
        let mut parts = Vec::new();
        let mut push = |name: &str, value: Option<i64>| {
            if let Some(v) = value {
                parts.push(format!("{}={}", name, v));
            }
        };
        push("ship", self.ship_type_id);
        push("char", self.character_id);
        push("corp", self.corporation_id);
        push("alli", self.alliance_id);
        push("region", self.region_id);
        push("system", self.system_id);
        push("minatk", self.min_attackers);
        push("maxatk", self.max_attackers);
        parts.push(format!("role={}", self.role_scope()));
        parts.join(",")
    }
}

/// Which side of a killmail an actor condition is checked against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoleScope {
    Either,
    Victim,
    Attacker,
}

impl RoleScope {
    pub fn includes_victim(&self) -> bool {
        matches!(self, Self::Either | Self::Victim)
    }

    pub fn includes_attacker(&self) -> bool {
        matches!(self, Self::Either | Self::Attacker)
    }
}

impl fmt::Display for RoleScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Either => "any",
            Self::Victim => "victim",
            Self::Attacker => "attacker",
        })
    }
}

/// Actor attributes present on both victim and attackers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActorField {
    ShipType,
    Character,
    Corporation,
    Alliance,
}

impl ActorField {
    /// Column name on `killmail_victims` / `killmail_attackers`.
    pub fn column(&self) -> &'static str {
        match self {
            Self::ShipType => "ship_type_id",
            Self::Character => "character_id",
            Self::Corporation => "corporation_id",
            Self::Alliance => "alliance_id",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocationField {
    SolarSystem,
    Region,
}

impl LocationField {
    pub fn column(&self) -> &'static str {
        match self {
            Self::SolarSystem => "solar_system_id",
            Self::Region => "region_id",
        }
    }
}

/// One ANDed term of a plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Condition {
    /// Actor field matches on the victim and/or any attacker.
    Participant {
        field: ActorField,
        scope: RoleScope,
        value: i64,
    },
    Location {
        field: LocationField,
        value: i64,
    },
    MinAttackers(i64),
    MaxAttackers(i64),
}

/// AND of conditions. Empty means "every killmail".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterPlan {
    pub conditions: Vec<Condition>,
}

/// Listing window: newest first, keyset paginated on killmail id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub limit: i64,
    pub before_id: Option<i64>,
}

impl Page {
    pub fn new(limit: i64) -> Self {
        Self {
            limit: limit.clamp(1, MAX_LIMIT),
            before_id: None,
        }
    }

    pub fn before(mut self, killmail_id: i64) -> Self {
        self.before_id = Some(killmail_id);
        self
    }
}

impl Default for Page {
    fn default() -> Self {
        Self::new(DEFAULT_LIMIT)
    }
}

/// Which compilation target to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueryMode {
    /// Normalized relation; always current.
    Join,
    /// Flattened projection; low latency on large result sets, may lag.
    Projection,
}

impl QueryMode {
    /// Pick a mode from the expected result size.
    ///
    /// Pinning an actor narrows the candidate set enough for the live
    /// relation; broad filters (ship type, location, attacker counts)
    /// go to the projection.
    pub fn suggested(filter: &KillFilter) -> Self {
        if filter.has_actor() {
            Self::Join
        } else {
            Self::Projection
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Join => "join",
            Self::Projection => "projection",
        }
    }
}

impl FromStr for QueryMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "join" => Ok(Self::Join),
            "projection" => Ok(Self::Projection),
            other => Err(Error::config(format!("unknown query mode: {}", other))),
        }
    }
}

/// A compilation target for filter plans.
pub trait FilterStrategy {
    /// The row shape this strategy evaluates against.
    type Row;

    fn mode(&self) -> QueryMode;

    /// Render the plan as a killmail-id query.
    fn render(&self, plan: &FilterPlan, page: Page) -> SqlQuery;

    /// Evaluate the plan against one row.
    fn matches(&self, plan: &FilterPlan, row: &Self::Row) -> bool;
}

/// A filter query ready for a store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KillmailQuery {
    pub filter: KillFilter,
    pub mode: QueryMode,
    pub page: Page,
}

impl KillmailQuery {
    pub fn new(filter: KillFilter, mode: QueryMode) -> Self {
        Self {
            filter,
            mode,
            page: Page::default(),
        }
    }

    pub fn with_page(mut self, page: Page) -> Self {
        self.page = page;
        self
    }

    /// Plan and render with the strategy for `self.mode`.
    pub fn compile(&self) -> Result<SqlQuery> {
        let plan = self.filter.plan()?;
        Ok(match self.mode {
            QueryMode::Join => JoinStrategy.render(&plan, self.page),
            QueryMode::Projection => ProjectionStrategy.render(&plan, self.page),
        })
    }
}

/// Render the ORDER BY / LIMIT tail shared by both strategies.
pub(crate) fn page_clause(id_column: &str, page: Page, builder: &mut SqlBuilder) -> (Option<String>, String) {
    let before = page
        .before_id
        .map(|id| format!("{} < {}", id_column, builder.bind(id)));
    let tail = format!(
        " ORDER BY {} DESC LIMIT {}",
        id_column,
        builder.bind(page.limit)
    );
    (before, tail)
}
