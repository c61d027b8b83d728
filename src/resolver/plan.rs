// src/resolver/plan.rs

//! Ordering result types

use serde::Serialize;

/// An edge removed to break a loop
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SeveredEdge {
    pub requirer: String,
    pub provider: String,
    pub dependency: String,
}

/// A dependency loop found while ordering
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DependencyLoop {
    /// NEVRs of the loop members, starting at the loop entry
    pub members: Vec<String>,
    /// The co-requisite edge that was cut, if any
    pub severed: Option<SeveredEdge>,
}

/// Where an element ended up
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Placement {
    pub nevra: String,
    pub depth: usize,
    pub tree: Option<usize>,
    pub parent: Option<String>,
    pub successors: usize,
}

/// Result of ordering a transaction
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct OrderOutcome {
    /// Elements that could not be ordered
    pub unresolved: usize,
    /// Edges severed to break loops
    pub zapped: usize,
    /// Graph rebuilds after severing
    pub rescans: u32,
    pub loops: Vec<DependencyLoop>,
    /// Placement of every element, in final order (empty on failure)
    pub placements: Vec<Placement>,
}

impl OrderOutcome {
    /// True when every element was ordered
    pub fn is_ordered(&self) -> bool {
        self.unresolved == 0
    }
}
