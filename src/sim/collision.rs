//! Player-vs-hazard collision
//!
//! Projectiles are tested box against box in pixel space. Lasers and traps are
//! grid hazards: they hit when the player's cell lies on the active row/column
//! or equals the active trap cell. Warning-phase hazards never hit.

use serde::{Deserialize, Serialize};

use super::geometry::{Aabb, GridPos};
use super::registry::{EntityId, EntityRegistry};

/// What ended the round
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Hit {
    Projectile(EntityId),
    Laser(EntityId),
    Trap(EntityId),
}

/// First hazard touching the player, checked projectiles → lasers → traps in
/// spawn order
pub fn first_hit(player_box: &Aabb, player_cell: GridPos, registry: &EntityRegistry) -> Option<Hit> {
    if let Some(p) = registry.projectiles().iter().find(|p| p.footprint().overlaps(player_box)) {
        return Some(Hit::Projectile(p.id));
    }
    if let Some(l) = registry
        .lasers()
        .iter()
        .find(|l| l.timer.is_active() && l.axis.covers(player_cell))
    {
        return Some(Hit::Laser(l.id));
    }
    registry
        .traps()
        .iter()
        .find(|t| t.timer.is_active() && t.cell == player_cell)
        .map(|t| Hit::Trap(t.id))
}
