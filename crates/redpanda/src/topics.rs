//! Queue (topic) names.

use sync_core::EntityKind;

use crate::queue::{QueueSpec, MAX_PRIORITY};

/// Entity sync queue for one kind, e.g. `killboard.entity.solar_system`.
pub fn entity_queue(prefix: &str, kind: EntityKind) -> String {
    format!("{}.entity.{}", prefix, kind.as_str())
}

/// Killmail reference queue.
pub fn killmail_queue(prefix: &str) -> String {
    format!("{}.killmails", prefix)
}

/// Dead-letter queue paired with `queue`.
pub fn dead_letter_queue(queue: &str) -> String {
    format!("{}.dead", queue)
}

/// Entity queues take priorities so refresh requests jump the backlog.
pub fn entity_queue_spec(prefix: &str, kind: EntityKind) -> QueueSpec {
    QueueSpec::durable(entity_queue(prefix, kind)).with_priority(MAX_PRIORITY)
}

pub fn killmail_queue_spec(prefix: &str) -> QueueSpec {
    QueueSpec::durable(killmail_queue(prefix))
}

/// Every queue this deployment uses.
pub fn all_queue_specs(prefix: &str) -> Vec<QueueSpec> {
    EntityKind::ALL
        .into_iter()
        .map(|kind| entity_queue_spec(prefix, kind))
        .chain(std::iter::once(killmail_queue_spec(prefix)))
        .collect()
}
