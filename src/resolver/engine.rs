// src/resolver/engine.rs

//! Install ordering
//!
//! A topological sort over transaction-internal requirements with loop
//! repair:
//!
//! 1. Record "p requires q" relations where q is another element. Scriptlet
//!    requirements (prereqs) are recorded first, ordinary ones second; each
//!    requirer gets at most one edge per provider.
//! 2. Emit elements whose predecessors are all emitted, fewest successors
//!    first (original position in presentation mode).
//! 3. If elements remain, follow predecessor chains to find each loop and
//!    sever one co-requisite edge per loop.
//! 4. Rebuild from scratch and retry, up to `max_order_rescans` times.
//!
//! On success the erase half of every upgrade is moved right behind the
//! install it belongs to.

use super::ResolverContext;
use super::builtin::never_orders;
use super::graph::{EdgeKind, OrderGraph};
use super::plan::{DependencyLoop, OrderOutcome, Placement, SeveredEdge};
use crate::config::ResolverConfig;
use crate::error::{Error, Result};
use crate::package::{Dependency, Sense};
use crate::transaction::available::{AddedKey, AvailableIndex};
use crate::transaction::element::TransactionElement;
use std::collections::{BTreeSet, HashMap, HashSet};
use tracing::{debug, info, warn};

/// How a requirement of an element constrains ordering
///
/// Installs care about `%pre`/`%post` requirements, erases about
/// `%preun`/`%postun`; requirements of the other phase are ignored.
fn classify(removed: bool, sense: Sense) -> Option<EdgeKind> {
    let (own_phase, other_phase) = if removed {
        (sense.is_erase_prereq(), sense.is_install_prereq())
    } else {
        (sense.is_install_prereq(), sense.is_erase_prereq())
    };
    if other_phase {
        None
    } else if own_phase || sense.is_legacy_prereq() {
        Some(EdgeKind::PreReq)
    } else {
        Some(EdgeKind::CoReq)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mark {
    Unseen,
    OnPath(usize),
    Done,
}

/// Orders the elements of a transaction
pub struct Orderer<'a> {
    config: &'a ResolverConfig,
    ctx: &'a ResolverContext,
}

impl<'a> Orderer<'a> {
    pub fn new(config: &'a ResolverConfig, ctx: &'a ResolverContext) -> Self {
        Self { config, ctx }
    }

    fn color_filtered(&self, dep: &Dependency) -> bool {
        let tscolor = self.config.transaction_color;
        tscolor != 0 && dep.color != 0 && tscolor & dep.color == 0
    }

    /// Sort `elements` in place
    ///
    /// When some elements cannot be ordered the outcome carries their count
    /// and `elements` is left untouched.
    pub fn order(
        &self,
        elements: &mut Vec<TransactionElement>,
        available: &AvailableIndex,
    ) -> Result<OrderOutcome> {
        let n = elements.len();
        info!("Ordering {} elements", n);

        let key_index: HashMap<AddedKey, usize> = elements
            .iter()
            .enumerate()
            .filter_map(|(i, e)| e.added_key().map(|k| (k, i)))
            .collect();

        let mut severed: HashSet<(usize, usize)> = HashSet::new();
        let mut outcome = OrderOutcome::default();

        loop {
            let mut graph = self.build_graph(elements, available, &key_index, &severed);
            debug!("order graph has {} edges", graph.edge_count());

            let emitted = self.emit(&mut graph);
            if emitted.len() == n {
                let order = self.splice(elements, &emitted, &key_index);
                outcome.placements = order
                    .iter()
                    .map(|&i| {
                        let node = graph.node(i);
                        Placement {
                            nevra: elements[i].nevra(),
                            depth: node.depth,
                            tree: node.tree,
                            parent: node.parent.map(|p| elements[p].nevra()),
                            successors: node.degree(),
                        }
                    })
                    .collect();
                permute(elements, &order)?;
                info!(
                    "Ordered {} elements ({} loops broken, {} rescans)",
                    n, outcome.zapped, outcome.rescans
                );
                return Ok(outcome);
            }

            let unresolved = n - emitted.len();
            let (loops, zapped) = self.break_loops(&graph, elements, &mut severed);
            outcome.loops.extend(loops);
            outcome.zapped += zapped;

            if zapped > 0 && outcome.rescans < self.config.max_order_rescans {
                outcome.rescans += 1;
                debug!("rescan {} after severing {} edges", outcome.rescans, zapped);
                continue;
            }

            warn!("{} elements could not be ordered", unresolved);
            outcome.unresolved = unresolved;
            return Ok(outcome);
        }
    }

    fn build_graph(
        &self,
        elements: &[TransactionElement],
        available: &AvailableIndex,
        key_index: &HashMap<AddedKey, usize>,
        severed: &HashSet<(usize, usize)>,
    ) -> OrderGraph {
        let n = elements.len();
        let mut graph = OrderGraph::new(n);

        for (p, element) in elements.iter().enumerate() {
            let mut selected = vec![false; n];

            for kind in [EdgeKind::PreReq, EdgeKind::CoReq] {
                for dep in element.requires() {
                    if classify(element.is_removed(), dep.sense) != Some(kind)
                        || self.color_filtered(dep)
                        || never_orders(&dep.name)
                    {
                        continue;
                    }

                    let Some(&q) = available
                        .satisfies(dep)
                        .and_then(|key| key_index.get(&key))
                    else {
                        continue;
                    };
                    if q == p || selected[q] {
                        continue;
                    }
                    if self.ctx.is_whiteout(element.name(), elements[q].name()) {
                        debug!(
                            "ignoring whited-out relation {} -> {}",
                            element.name(),
                            elements[q].name()
                        );
                        continue;
                    }

                    selected[q] = true;
                    if kind == EdgeKind::CoReq && severed.contains(&(q, p)) {
                        continue;
                    }
                    debug!(
                        "{} {} {} ({})",
                        element.nevr(),
                        if kind == EdgeKind::PreReq { "prereqs" } else { "requires" },
                        elements[q].nevr(),
                        dep
                    );
                    graph.add_edge(q, p, kind, dep.to_string());
                }
            }
        }

        graph
    }

    /// Emit every element whose predecessors are emitted
    fn emit(&self, graph: &mut OrderGraph) -> Vec<usize> {
        let presentation = self.config.presentation_order;
        let key = |g: &OrderGraph, i: usize| {
            if presentation {
                (0, i)
            } else {
                (g.node(i).degree(), i)
            }
        };

        let mut queue: BTreeSet<(usize, usize)> = BTreeSet::new();
        let mut roots = 0;
        for i in 0..graph.node_count() {
            if graph.node(i).npreds == 0 {
                graph.node_mut(i).tree = Some(roots);
                roots += 1;
                queue.insert(key(&*graph, i));
            }
        }

        let mut order = Vec::with_capacity(graph.node_count());
        while let Some((_, i)) = queue.pop_first() {
            graph.node_mut(i).emitted = true;
            order.push(i);

            let depth = graph.node(i).depth;
            let tree = graph.node(i).tree;
            let succs: Vec<usize> = graph.successors(i).map(|e| e.requirer).collect();
            for s in succs {
                let node = graph.node_mut(s);
                node.npreds = node.npreds.saturating_sub(1);
                node.depth = node.depth.max(depth + 1);
                node.parent = Some(i);
                if node.tree.is_none() {
                    node.tree = tree;
                }
                if node.npreds == 0 {
                    queue.insert(key(&*graph, s));
                }
            }
        }
        order
    }

    /// Find loops among the unemitted elements and sever one co-requisite
    /// edge in each
    fn break_loops(
        &self,
        graph: &OrderGraph,
        elements: &[TransactionElement],
        severed: &mut HashSet<(usize, usize)>,
    ) -> (Vec<DependencyLoop>, usize) {
        let n = graph.node_count();
        let remaining: Vec<usize> = graph.remaining().collect();

        let mut chain: Vec<Option<usize>> = vec![None; n];
        for &q in &remaining {
            chain[q] = graph
                .predecessors(q)
                .map(|e| e.provider)
                .find(|&p| !graph.node(p).emitted);
        }

        let mut marks = vec![Mark::Unseen; n];
        let mut loops = Vec::new();
        let mut zapped = 0;

        for (walk, &start) in remaining.iter().enumerate() {
            if marks[start] != Mark::Unseen {
                continue;
            }

            let mut path = Vec::new();
            let mut current = Some(start);
            let entry = loop {
                let Some(q) = current else { break None };
                match marks[q] {
                    Mark::OnPath(w) if w == walk => break Some(q),
                    Mark::Unseen => {
                        marks[q] = Mark::OnPath(walk);
                        path.push(q);
                        current = chain[q];
                    }
                    _ => break None,
                }
            };
            for &q in &path {
                marks[q] = Mark::Done;
            }

            let Some(entry) = entry else { continue };
            let Some(pos) = path.iter().position(|&q| q == entry) else {
                continue;
            };
            let members = &path[pos..];

            warn!(
                "dependency loop: {}",
                members
                    .iter()
                    .map(|&q| elements[q].nevr())
                    .collect::<Vec<_>>()
                    .join(" <- ")
            );

            let mut cut = None;
            for &requirer in members {
                let Some(provider) = chain[requirer] else { continue };
                let edge = graph.predecessors(requirer).find(|e| {
                    e.provider == provider && e.kind == EdgeKind::CoReq
                });
                if let Some(edge) = edge {
                    severed.insert((provider, requirer));
                    zapped += 1;
                    info!(
                        "removing {} \"Requires({})\" {} from tsort relations",
                        elements[requirer].nevr(),
                        edge.dependency,
                        elements[provider].nevr()
                    );
                    cut = Some(SeveredEdge {
                        requirer: elements[requirer].nevr(),
                        provider: elements[provider].nevr(),
                        dependency: edge.dependency.clone(),
                    });
                    break;
                }
            }
            if cut.is_none() {
                warn!("loop consists of prerequisites only and cannot be broken");
            }

            loops.push(DependencyLoop {
                members: members.iter().map(|&q| elements[q].nevr()).collect(),
                severed: cut,
            });
        }

        (loops, zapped)
    }

    /// Move upgrade erasures right behind their install
    fn splice(
        &self,
        elements: &[TransactionElement],
        emitted: &[usize],
        key_index: &HashMap<AddedKey, usize>,
    ) -> Vec<usize> {
        if self.config.presentation_order {
            return emitted.to_vec();
        }

        let mut erasures: HashMap<AddedKey, Vec<usize>> = HashMap::new();
        for &i in emitted {
            if let Some(key) = elements[i].depends_on()
                && key_index.contains_key(&key)
            {
                erasures.entry(key).or_default().push(i);
            }
        }

        let mut order = Vec::with_capacity(emitted.len());
        for &i in emitted {
            let element = &elements[i];
            if element
                .depends_on()
                .is_some_and(|key| key_index.contains_key(&key))
            {
                continue;
            }
            order.push(i);
            if let Some(followers) = element.added_key().and_then(|key| erasures.get(&key)) {
                order.extend(followers.iter().copied());
            }
        }
        order
    }
}

/// Reorder `elements` by index list
fn permute(elements: &mut Vec<TransactionElement>, order: &[usize]) -> Result<()> {
    let mut seen = vec![false; elements.len()];
    if order.len() != elements.len() {
        return Err(Error::InvariantViolation(format!(
            "ordering produced {} of {} elements",
            order.len(),
            elements.len()
        )));
    }
    for &i in order {
        match seen.get_mut(i) {
            Some(slot) if !*slot => *slot = true,
            _ => {
                return Err(Error::InvariantViolation(format!(
                    "element {} ordered twice or out of range",
                    i
                )));
            }
        }
    }

    let mut slots: Vec<Option<TransactionElement>> =
        std::mem::take(elements).into_iter().map(Some).collect();
    *elements = order.iter().filter_map(|&i| slots[i].take()).collect();
    Ok(())
}
