//! Killmail (event) records.

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::LazyLock;

use crate::error::{Error, Result, ValidationErrorCode};

static KILLMAIL_HASH: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[0-9a-f]{40}$").expect("valid regex"));

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Victim {
    pub character_id: Option<i64>,
    pub corporation_id: Option<i64>,
    pub alliance_id: Option<i64>,
    pub ship_type_id: i64,
    pub damage_taken: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attacker {
    pub character_id: Option<i64>,
    pub corporation_id: Option<i64>,
    pub alliance_id: Option<i64>,
    pub ship_type_id: Option<i64>,
    pub weapon_type_id: Option<i64>,
    pub damage_done: i64,
    pub final_blow: bool,
    pub security_status: f64,
}

/// Dropped or destroyed item. Container contents are flattened with their
/// container's type recorded in `container_type_id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KillmailItem {
    pub item_type_id: i64,
    pub flag: i64,
    pub quantity_destroyed: i64,
    pub quantity_dropped: i64,
    pub singleton: i64,
    pub container_type_id: Option<i64>,
}

/// A fully resolved killmail with its sub-records.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Killmail {
    pub killmail_id: i64,
    pub killmail_hash: String,
    pub killmail_time: DateTime<Utc>,
    pub solar_system_id: i64,
    /// Resolved from local geography at write time.
    pub region_id: Option<i64>,
    pub victim: Victim,
    pub attackers: Vec<Attacker>,
    pub items: Vec<KillmailItem>,
}

impl Killmail {
    /// Write-time invariants. A killmail failing these is never persisted.
    pub fn validate(&self) -> Result<()> {
        if self.attackers.is_empty() {
            return Err(Error::validation_code(
                ValidationErrorCode::NoAttackers,
                format!("killmail {} has no attackers", self.killmail_id),
            ));
        }
        if self.victim.ship_type_id <= 0 {
            return Err(Error::validation_code(
                ValidationErrorCode::InvalidVictim,
                format!(
                    "killmail {} victim has no ship type",
                    self.killmail_id
                ),
            ));
        }
        if !KILLMAIL_HASH.is_match(&self.killmail_hash) {
            return Err(Error::validation_code(
                ValidationErrorCode::InvalidHash,
                format!(
                    "killmail {} has malformed hash {:?}",
                    self.killmail_id, self.killmail_hash
                ),
            ));
        }
        Ok(())
    }

    pub fn attacker_count(&self) -> i64 {
        self.attackers.len() as i64
    }

    /// Every character seen on the killmail, victim first.
    pub fn character_ids(&self) -> BTreeSet<i64> {
        self.victim
            .character_id
            .into_iter()
            .chain(self.attackers.iter().filter_map(|a| a.character_id))
            .collect()
    }

    /// Every corporation seen on the killmail.
    pub fn corporation_ids(&self) -> BTreeSet<i64> {
        self.victim
            .corporation_id
            .into_iter()
            .chain(self.attackers.iter().filter_map(|a| a.corporation_id))
            .collect()
    }
}
