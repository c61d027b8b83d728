// src/transaction/mod.rs

//! Transaction sets
//!
//! A `TransactionSet` collects the packages to install and erase, then runs
//! the resolver stages over them:
//!
//! ```text
//! add_install / add_erase -> check_sanity -> check -> order -> resolve_file_overlaps
//! ```
//!
//! `prepare()` runs every stage under the database lock and returns a
//! `TransactionReport`. Problems are collected, never raised: the caller
//! decides which kinds block the transaction, usually through the
//! `ProblemFilter` in the config.

pub mod available;
pub mod element;
pub mod problems;
mod sanity;

pub use available::{AddedKey, AvailableIndex};
pub use element::{ElementKind, ElementType, TransactionElement};
pub use problems::{Problem, ProblemKind, ProblemSet};

use crate::config::ResolverConfig;
use crate::conflict::{ConflictResolver, FileAction, FileActions};
use crate::db::{DatabaseLock, DbTag, PackageDatabase};
use crate::error::{Error, Result};
use crate::filesystem::{DiskSpaceInfo, DiskSpaceTable, FilesystemInfo, FingerprintCache};
use crate::package::{PackageHeader, Relocation};
use crate::resolver::{DependencyChecker, OrderOutcome, Orderer, ResolverContext};
use serde::Serialize;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, info, info_span, warn};
use uuid::Uuid;

/// One file in a report
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReportFile {
    pub path: String,
    pub action: FileAction,
}

/// One element in a report, in final order
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReportElement {
    pub nevra: String,
    pub kind: ElementType,
    pub files: Vec<ReportFile>,
}

/// Everything a `prepare()` run decided
#[derive(Debug, Clone, Serialize)]
pub struct TransactionReport {
    pub run_id: Uuid,
    pub order: Vec<ReportElement>,
    pub disk: Vec<DiskSpaceInfo>,
    pub problems: ProblemSet,
    pub outcome: OrderOutcome,
}

impl TransactionReport {
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// True when nothing blocks the transaction
    pub fn is_clean(&self) -> bool {
        self.problems.is_empty() && self.outcome.is_ordered()
    }
}

/// Packages to install and erase, plus the resolver state for one run
pub struct TransactionSet<'a> {
    config: ResolverConfig,
    db: Option<&'a dyn PackageDatabase>,
    elements: Vec<TransactionElement>,
    available: AvailableIndex,
    universe: Option<&'a AvailableIndex>,
    /// Database offsets of every Removed element
    removed: BTreeSet<u32>,
    ctx: ResolverContext,
    actions: Vec<FileActions>,
    disk: Option<DiskSpaceTable>,
    outcome: OrderOutcome,
}

impl<'a> TransactionSet<'a> {
    /// Create an empty set; `db` is the installed package database, if any
    pub fn new(config: ResolverConfig, db: Option<&'a dyn PackageDatabase>) -> Result<Self> {
        config.validate()?;
        let ctx = ResolverContext::new(&config)?;
        Ok(Self {
            config,
            db,
            elements: Vec::new(),
            available: AvailableIndex::new(),
            universe: None,
            removed: BTreeSet::new(),
            ctx,
            actions: Vec::new(),
            disk: None,
            outcome: OrderOutcome::default(),
        })
    }

    pub fn config(&self) -> &ResolverConfig {
        &self.config
    }

    pub fn elements(&self) -> &[TransactionElement] {
        &self.elements
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    pub fn available(&self) -> &AvailableIndex {
        &self.available
    }

    /// Offsets of installed packages being erased
    pub fn removed(&self) -> &BTreeSet<u32> {
        &self.removed
    }

    pub fn context(&self) -> &ResolverContext {
        &self.ctx
    }

    /// File actions from the last conflict resolution, in element order
    pub fn file_actions(&self) -> &[FileActions] {
        &self.actions
    }

    pub fn disk_space(&self) -> Option<&DiskSpaceTable> {
        self.disk.as_ref()
    }

    pub fn order_outcome(&self) -> &OrderOutcome {
        &self.outcome
    }

    /// Index of packages offered as suggestions for unsatisfied requires
    pub fn set_universe(&mut self, universe: &'a AvailableIndex) {
        self.universe = Some(universe);
    }

    /// Queue a package for installation
    ///
    /// In upgrade mode the installed packages it replaces or obsoletes are
    /// queued for erasure as well.
    pub fn add_install(&mut self, header: PackageHeader, upgrade: bool) -> Result<AddedKey> {
        self.add_install_relocated(header, upgrade, Vec::new())
    }

    /// Queue a package for installation with relocations
    ///
    /// Relocations whose old prefix the package does not declare are kept
    /// aside and reported by the sanity check, unless forced.
    pub fn add_install_relocated(
        &mut self,
        header: PackageHeader,
        upgrade: bool,
        relocations: Vec<Relocation>,
    ) -> Result<AddedKey> {
        let header = Arc::new(header);

        let (good, bad): (Vec<Relocation>, Vec<Relocation>) =
            relocations.into_iter().partition(|r| {
                self.config.filter.force_relocate
                    || header
                        .prefixes
                        .iter()
                        .any(|p| p.trim_end_matches('/') == r.old_prefix.trim_end_matches('/'))
            });
        let mut files = header.files.clone();
        files.relocate(&good);
        let files = Arc::new(files);

        // Same name and arch replaces the earlier element in place
        let existing = self.elements.iter().position(|e| {
            e.is_added() && e.name() == header.name && e.arch() == header.arch
        });

        let key = self.available.add(Arc::clone(&header), Arc::clone(&files));
        let element =
            TransactionElement::added(Arc::clone(&header), files, key, upgrade, good, bad);

        match existing {
            Some(position) => {
                let old = &self.elements[position];
                debug!("{} replaces {} in transaction", header.nevra(), old.nevra());
                if let Some(old_key) = old.added_key() {
                    self.available.remove(old_key);
                    self.drop_dependent_removals(old_key);
                }
                // Dropping removals shifts positions
                let position = self
                    .elements
                    .iter()
                    .position(|e| {
                        e.is_added() && e.name() == header.name && e.arch() == header.arch
                    })
                    .ok_or_else(|| {
                        Error::InvariantViolation(format!(
                            "replaced element {} vanished",
                            header.nevra()
                        ))
                    })?;
                self.elements[position] = element;
            }
            None => self.elements.push(element),
        }
        info!("Added {} for install", header.nevra());

        if upgrade {
            self.add_upgrades(&header, key)?;
        }
        Ok(key)
    }

    fn drop_dependent_removals(&mut self, key: AddedKey) {
        let removed = &mut self.removed;
        self.elements.retain(|e| {
            if e.depends_on() == Some(key) {
                if let Some(offset) = e.db_offset() {
                    removed.remove(&offset);
                }
                false
            } else {
                true
            }
        });
    }

    /// Queue erasure of what an upgrade replaces
    fn add_upgrades(&mut self, header: &Arc<PackageHeader>, key: AddedKey) -> Result<()> {
        let Some(db) = self.db else {
            return Ok(());
        };
        let color = header.color;
        let colors_clash = |other: &PackageHeader| {
            color != 0 && other.color != 0 && color & other.color == 0
        };

        let mut replaced = Vec::new();
        for installed in db.iter(DbTag::Name, &header.name)? {
            if colors_clash(installed.as_ref()) {
                continue;
            }
            replaced.push(installed);
        }

        for obsolete in header.obsoletes.iter() {
            for installed in db.iter(DbTag::Name, &obsolete.name)? {
                if colors_clash(installed.as_ref()) {
                    continue;
                }
                if installed.self_provide().overlaps(obsolete) {
                    debug!("{} obsoletes {}", header.nevr(), installed.nevr());
                    replaced.push(installed);
                }
            }
        }

        for installed in replaced {
            let Some(offset) = installed.instance else {
                continue;
            };
            self.push_removal(installed, offset, Some(key));
        }
        Ok(())
    }

    fn push_removal(&mut self, header: Arc<PackageHeader>, offset: u32, depends_on: Option<AddedKey>) {
        if !self.removed.insert(offset) {
            return;
        }
        info!("Added {} for erase", header.nevra());
        self.elements
            .push(TransactionElement::removed(header, offset, depends_on));
    }

    /// Queue an installed package for erasure
    pub fn add_erase(&mut self, db_offset: u32) -> Result<()> {
        let db = self
            .db
            .ok_or_else(|| Error::LookupError("no package database to erase from".to_string()))?;
        let header = db.header(db_offset)?.ok_or_else(|| {
            Error::LookupError(format!("no installed package at offset {}", db_offset))
        })?;
        self.push_removal(header, db_offset, None);
        Ok(())
    }

    /// Architecture, OS, reinstall, downgrade and relocation checks
    pub fn check_sanity(&self) -> Result<ProblemSet> {
        let mut problems = ProblemSet::new();
        for element in &self.elements {
            sanity::check_element(element, &self.config, self.db, &mut problems)?;
        }
        Ok(problems)
    }

    /// Check requires and conflicts of every element
    pub fn check(&mut self) -> Result<ProblemSet> {
        let mut checker = DependencyChecker::new(
            &self.config,
            self.db,
            &self.available,
            &self.removed,
            &mut self.ctx,
        )
        .with_universe(self.universe);
        checker.check(&self.elements)
    }

    /// Sort the elements into install order
    pub fn order(&mut self) -> Result<OrderOutcome> {
        let outcome = Orderer::new(&self.config, &self.ctx).order(&mut self.elements, &self.available)?;
        if !outcome.is_ordered() {
            warn!("{} elements could not be ordered", outcome.unresolved);
        }
        self.outcome = outcome.clone();
        Ok(outcome)
    }

    /// Decide every file action and the disk space bill
    ///
    /// Meant to run after `order()`: overlaps are settled in element order.
    pub fn resolve_file_overlaps(&mut self, filesystems: &dyn FilesystemInfo) -> Result<ProblemSet> {
        let mut fpc = FingerprintCache::new(&self.config.root);
        let resolved = ConflictResolver::new(&self.config, self.db, &self.removed).resolve(
            &self.elements,
            &mut fpc,
            filesystems,
        )?;
        self.actions = resolved.actions;
        self.disk = Some(resolved.disk);
        Ok(resolved.problems)
    }

    /// Run every stage and report the result
    ///
    /// File overlaps are only resolved once the elements could be ordered.
    pub fn prepare(&mut self, filesystems: &dyn FilesystemInfo) -> Result<TransactionReport> {
        self.ctx = ResolverContext::new(&self.config)?;
        let run_id = self.ctx.run_id();
        let span = info_span!("prepare", run_id = %run_id);
        let _enter = span.enter();

        let _lock = match self.db.and_then(|db| db.path()) {
            Some(path) => Some(DatabaseLock::acquire(path)?),
            None => None,
        };

        info!("Preparing transaction of {} elements", self.elements.len());
        let mut problems = self.check_sanity()?;
        problems.extend(self.check()?);

        let outcome = self.order()?;
        if outcome.is_ordered() {
            problems.extend(self.resolve_file_overlaps(filesystems)?);
        } else {
            self.actions.clear();
            self.disk = None;
        }

        info!(
            "Prepared transaction: {} problems, {} unresolved, {} cache hits",
            problems.len(),
            outcome.unresolved,
            self.ctx.cache_hits()
        );
        Ok(self.report(run_id, problems, outcome))
    }

    fn report(&self, run_id: Uuid, problems: ProblemSet, outcome: OrderOutcome) -> TransactionReport {
        let order = self
            .elements
            .iter()
            .enumerate()
            .map(|(i, element)| {
                let files = element.files();
                let actions = self.actions.get(i);
                ReportElement {
                    nevra: element.nevra(),
                    kind: element.element_type(),
                    files: files
                        .iter()
                        .map(|(f, _)| ReportFile {
                            path: files.path(f),
                            action: actions.map(|a| a.get(f)).unwrap_or_default(),
                        })
                        .collect(),
                }
            })
            .collect();

        TransactionReport {
            run_id,
            order,
            disk: self
                .disk
                .as_ref()
                .map(|d| d.entries().to_vec())
                .unwrap_or_default(),
            problems,
            outcome,
        }
    }
}
