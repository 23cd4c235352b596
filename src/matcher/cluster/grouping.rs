use ahash::AHashSet;
use indexmap::IndexMap;
use indexmap::map::Entry;
use indicatif::ProgressBar;
use log::{debug, info, warn};
use serde::Serialize;
use std::time::Instant;

use crate::config::ClusterConfig;
use crate::config::subsystems::{GroupingConfig, GroupingVariant, ScanMode};
use crate::error::Result;
use crate::matcher::similarity::{ExactEquivalence, PairSlots};
use crate::types::{Group, Record, RecordId};
use super::{check_cancelled, CancellationToken};

/// Output of a grouping run, shaped by the variant that produced it.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum Grouping {
    List(Vec<Group>),
    Keyed(IndexMap<RecordId, Group>),
}

impl Grouping {
    pub fn groups(&self) -> Box<dyn Iterator<Item = &Group> + '_> {
        match self {
            Grouping::List(groups) => Box::new(groups.iter()),
            Grouping::Keyed(groups) => Box::new(groups.values()),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Grouping::List(groups) => groups.len(),
            Grouping::Keyed(groups) => groups.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Total number of records across all groups
    pub fn record_count(&self) -> usize {
        self.groups().map(Group::len).sum()
    }
}

/// Partitions records into groups of exactly equivalent headers.
///
/// Both variants pop anchors from the end of the input and scan candidates
/// from the end toward the `ScanMode` lower bound, removing every match so
/// that each record lands in exactly one group. Comparisons that come back
/// `Unknown` are treated as non-matches.
pub struct RecordGrouper {
    equivalence: ExactEquivalence,
    scan_mode: ScanMode,
    variant: GroupingVariant,
    cancellation: Option<CancellationToken>,
}

impl RecordGrouper {
    pub fn new(equivalence: ExactEquivalence, config: &GroupingConfig) -> Self {
        Self {
            equivalence,
            scan_mode: config.scan_mode,
            variant: config.variant,
            cancellation: None,
        }
    }

    pub fn from_config(config: &ClusterConfig) -> Result<Self> {
        Ok(Self::new(ExactEquivalence::from_config(config)?, &config.grouping))
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = Some(token);
        self
    }

    pub fn equivalence(&self) -> &ExactEquivalence {
        &self.equivalence
    }

    /// Run the configured variant
    pub fn group<R: Record>(&self, records: &[R], progress: Option<&ProgressBar>) -> Result<Grouping> {
        match self.variant {
            GroupingVariant::Removal => self.group_by_removal(records, progress).map(Grouping::List),
            GroupingVariant::Anchor => self.group_by_anchor(records, progress).map(Grouping::Keyed),
        }
    }

    /// Shrinking work-list pass: every match is removed before the next anchor is popped.
    pub fn group_by_removal<R: Record>(
        &self,
        records: &[R],
        progress: Option<&ProgressBar>,
    ) -> Result<Vec<Group>> {
        let start_time = Instant::now();
        info!("Grouping {} records by removal (scan mode: {})", records.len(), self.scan_mode.as_str());

        let lower_bound = self.scan_mode.lower_bound();
        let mut remaining: Vec<&R> = records.iter().collect();
        let mut groups = Vec::new();
        let mut slots = PairSlots::new();

        while let Some(anchor) = remaining.pop() {
            check_cancelled(self.cancellation.as_ref())?;

            slots.set_left(anchor);
            let mut group = Group::new(anchor.id());

            let mut j = remaining.len();
            while j > lower_bound {
                j -= 1;
                let candidate = remaining[j];
                slots.set_right(candidate);

                if slots.equivalence(&self.equivalence).is_equivalent() {
                    group.push(candidate.id());
                    remaining.remove(j);
                }
            }

            debug!("Group anchored at {} has {} members", group.anchor(), group.len());
            if let Some(pb) = progress {
                pb.inc(group.len() as u64);
            }
            groups.push(group);
        }

        info!("Formed {} groups from {} records in {:.2?}",
              groups.len(), records.len(), start_time.elapsed());
        Ok(groups)
    }

    /// Anchor-keyed accumulation: groups are keyed by the identity of their anchor.
    ///
    /// Anchors are popped from a copy of the input while candidates are taken
    /// from the source collection, which loses every matched record. A record
    /// already absorbed into an earlier group is never used as an anchor.
    pub fn group_by_anchor<R: Record>(
        &self,
        records: &[R],
        progress: Option<&ProgressBar>,
    ) -> Result<IndexMap<RecordId, Group>> {
        let start_time = Instant::now();
        info!("Grouping {} records by anchor (scan mode: {})", records.len(), self.scan_mode.as_str());

        let lower_bound = self.scan_mode.lower_bound();
        let mut remainers: Vec<usize> = (0..records.len()).collect();
        let mut source: Vec<usize> = remainers.clone();
        let mut absorbed: AHashSet<usize> = AHashSet::with_capacity(records.len());
        let mut groups: IndexMap<RecordId, Group> = IndexMap::new();
        let mut slots = PairSlots::new();

        while let Some(anchor_idx) = remainers.pop() {
            if absorbed.contains(&anchor_idx) {
                continue;
            }
            check_cancelled(self.cancellation.as_ref())?;

            let anchor = &records[anchor_idx];
            absorbed.insert(anchor_idx);
            if let Some(pos) = source.iter().rposition(|&idx| idx == anchor_idx) {
                source.remove(pos);
            }

            slots.set_left(anchor);
            let anchor_id = anchor.id();
            let mut matched = Vec::new();

            let mut j = source.len();
            while j > lower_bound {
                j -= 1;
                let candidate_idx = source[j];
                slots.set_right(&records[candidate_idx]);

                if slots.equivalence(&self.equivalence).is_equivalent() {
                    matched.push(candidate_idx);
                    absorbed.insert(candidate_idx);
                    source.remove(j);
                }
            }

            let group = match groups.entry(anchor_id.clone()) {
                Entry::Occupied(entry) => {
                    warn!("Duplicate record identity {}; merging its groups", anchor_id);
                    let existing = entry.into_mut();
                    existing.push(anchor_id.clone());
                    existing
                }
                Entry::Vacant(entry) => entry.insert(Group::new(anchor_id.clone())),
            };
            for idx in &matched {
                group.push(records[*idx].id());
            }

            debug!("Group anchored at {} has {} members", anchor_id, matched.len() + 1);
            if let Some(pb) = progress {
                pb.inc(matched.len() as u64 + 1);
            }
        }

        info!("Formed {} groups from {} records in {:.2?}",
              groups.len(), records.len(), start_time.elapsed());
        Ok(groups)
    }
}
