//! Unit-type equivalence classes
//!
//! Interchangeable types (an upgraded knight and a paladin, say) count
//! toward the same composition requirement. Each type maps to a canonical
//! representative, always the lowest id of its class.
//!
//! The table is advisory bookkeeping owned by the AI session. It is never
//! stored on forces or units, and it can be rebuilt from scratch at load time.

use serde::{Deserialize, Serialize};

use crate::core::types::UnitTypeId;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UnitTypeEquivalence {
    representative: Vec<UnitTypeId>,
}

impl UnitTypeEquivalence {
    /// Identity table for `type_count` types
    pub fn new(type_count: usize) -> Self {
        let mut table = Self::default();
        table.reset(type_count);
        table
    }

    /// Every type becomes its own representative again
    pub fn reset(&mut self, type_count: usize) {
        self.representative = (0..type_count).map(|i| UnitTypeId(i as u16)).collect();
    }

    /// Reset and replay a list of merge groups (load-time rebuild)
    pub fn rebuild(&mut self, type_count: usize, groups: &[Vec<UnitTypeId>]) {
        self.reset(type_count);
        for group in groups {
            for pair in group.windows(2) {
                self.merge(pair[0], pair[1]);
            }
        }
    }

    fn ensure(&mut self, id: UnitTypeId) {
        while self.representative.len() <= id.index() {
            let next = UnitTypeId(self.representative.len() as u16);
            self.representative.push(next);
        }
    }

    /// Canonical representative of a type
    pub fn representative(&self, id: UnitTypeId) -> UnitTypeId {
        self.representative.get(id.index()).copied().unwrap_or(id)
    }

    /// Put `a` and `b` in the same class
    ///
    /// The whole class collapses onto the lower of the two representatives.
    /// Merging types that already share a class changes nothing.
    pub fn merge(&mut self, a: UnitTypeId, b: UnitTypeId) {
        self.ensure(a);
        self.ensure(b);
        let ra = self.representative(a);
        let rb = self.representative(b);
        if ra == rb {
            return;
        }
        let (keep, replace) = if ra < rb { (ra, rb) } else { (rb, ra) };
        for rep in self.representative.iter_mut() {
            if *rep == replace {
                *rep = keep;
            }
        }
        tracing::debug!("Merged unit type class {:?} into {:?}", replace, keep);
    }

    /// Every type sharing a representative with `id`, including `id`
    pub fn equivalents(&self, id: UnitTypeId) -> Vec<UnitTypeId> {
        let rep = self.representative(id);
        let members: Vec<UnitTypeId> = self
            .representative
            .iter()
            .enumerate()
            .filter(|(_, r)| **r == rep)
            .map(|(i, _)| UnitTypeId(i as u16))
            .collect();
        if members.is_empty() {
            vec![id]
        } else {
            members
        }
    }

    pub fn are_equivalent(&self, a: UnitTypeId, b: UnitTypeId) -> bool {
        self.representative(a) == self.representative(b)
    }
}
