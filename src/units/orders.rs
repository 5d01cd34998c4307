//! Outputs of the force AI
//!
//! Orders are fire-and-forget: the AI never reads back a result, only the
//! unit state on the next tick. Production requests and diplomacy changes
//! are handed to their owning systems the same way.

use serde::{Deserialize, Serialize};

use crate::core::types::{MapLayer, PlayerId, TilePos, UnitId, UnitTypeId};
use crate::player::Stance;

/// Types of orders that can be issued to a unit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderKind {
    /// Move, engaging anything met on the way
    AttackMove { pos: TilePos, layer: MapLayer },
    Move { pos: TilePos, layer: MapLayer },
    /// Escort another unit, fighting for it
    Defend(UnitId),
    Follow(UnitId),
    /// Walk to and embark in a transporter
    Board(UnitId),
    /// Carry passengers to a tile and drop them off
    Unload { pos: TilePos, layer: MapLayer },
    Stop,
}

/// An order for one unit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitOrder {
    pub unit: UnitId,
    pub kind: OrderKind,
    /// Ticks the command layer should wait before executing it
    pub delay: u32,
}

/// Request for the production system
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductionRequest {
    pub player: PlayerId,
    pub unit_type: UnitTypeId,
    pub count: u32,
}

/// Diplomatic stance change made by the AI
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StanceChange {
    pub player: PlayerId,
    pub towards: PlayerId,
    pub stance: Stance,
}

/// Everything the AI asked of the outside world during one tick
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Directives {
    pub orders: Vec<UnitOrder>,
    pub production: Vec<ProductionRequest>,
    pub stance_changes: Vec<StanceChange>,
}

impl Directives {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn order(&mut self, unit: UnitId, kind: OrderKind, delay: u32) {
        self.orders.push(UnitOrder { unit, kind, delay });
    }

    /// Add to an existing request for the same type or push a new one
    pub fn request_production(&mut self, player: PlayerId, unit_type: UnitTypeId, count: u32) {
        if count == 0 {
            return;
        }
        if let Some(existing) = self
            .production
            .iter_mut()
            .find(|r| r.player == player && r.unit_type == unit_type)
        {
            existing.count += count;
        } else {
            self.production.push(ProductionRequest { player, unit_type, count });
        }
    }

    /// Orders given to one unit, in issue order
    pub fn orders_for(&self, unit: UnitId) -> impl Iterator<Item = &UnitOrder> {
        self.orders.iter().filter(move |o| o.unit == unit)
    }

    /// Remove and return everything collected so far
    pub fn drain(&mut self) -> Directives {
        std::mem::take(self)
    }

    pub fn is_empty(&self) -> bool {
        self.orders.is_empty() && self.production.is_empty() && self.stance_changes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_production_requests_merge() {
        let mut directives = Directives::new();
        directives.request_production(PlayerId(0), UnitTypeId(3), 2);
        directives.request_production(PlayerId(0), UnitTypeId(3), 1);
        directives.request_production(PlayerId(0), UnitTypeId(4), 0);
        assert_eq!(directives.production.len(), 1);
        assert_eq!(directives.production[0].count, 3);
    }

    #[test]
    fn test_drain_empties() {
        let mut directives = Directives::new();
        directives.order(UnitId(1), OrderKind::Stop, 0);
        let taken = directives.drain();
        assert_eq!(taken.orders.len(), 1);
        assert!(directives.is_empty());
    }
}
