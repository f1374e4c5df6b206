pub mod forest;
pub mod statistics;

use super::change::{SymbolChange, validate_move};
use super::error::EngineError;
use super::updater::CeUpdater;
use crate::core::cluster::ClusterCatalog;
use crate::core::symbols::SymbolTable;
use crate::core::translation::TranslationMatrix;
use forest::UnionForest;
use serde::{Deserialize, Serialize};
use statistics::ClusterStatistics;
use std::collections::{BTreeMap, BTreeSet, HashSet, VecDeque};
use std::sync::Arc;
use tracing::{debug, info, warn};

fn default_check_invariants() -> bool {
    cfg!(debug_assertions)
}

/// Which clusters define adjacency and which species count as solute.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TrackerConfig {
    pub cluster_names: Vec<String>,
    pub elements: Vec<String>,
    /// Verify the forest invariants after every mutation.
    #[serde(default = "default_check_invariants")]
    pub check_invariants: bool,
}

impl TrackerConfig {
    pub fn new<S: Into<String>>(
        cluster_names: impl IntoIterator<Item = S>,
        elements: impl IntoIterator<Item = S>,
    ) -> Self {
        Self {
            cluster_names: cluster_names.into_iter().map(Into::into).collect(),
            elements: elements.into_iter().map(Into::into).collect(),
            check_invariants: default_check_invariants(),
        }
    }

    pub fn with_invariant_checks(mut self, enabled: bool) -> Self {
        self.check_invariants = enabled;
        self
    }
}

/// Parent links and shadow species touched by a speculative move.
struct ProbeSnapshot {
    parents: Vec<(usize, Option<usize>)>,
    symbols: Vec<(usize, String)>,
    solutes: BTreeSet<usize>,
}

/// Tracks how solute sites connect into clusters through the neighbour
/// offsets of one or more cluster geometries.
///
/// The tracker keeps its own copy of the species, taken from the updater at
/// construction and changed only through [`update_clusters`](Self::update_clusters).
/// Between mutations the forest is kept in minimal connectivity form: every
/// non-root site points at a lattice neighbour in the same cluster.
#[derive(Debug, Clone)]
pub struct ClusterTracker {
    catalog: Arc<ClusterCatalog>,
    translation: Arc<TranslationMatrix>,
    symbols: SymbolTable,
    cluster_names: Vec<String>,
    is_element: Vec<bool>,
    forest: UnionForest,
    solutes: BTreeSet<usize>,
    offsets: Vec<usize>,
    relevant_offset: Vec<bool>,
    surface_offsets: Vec<Vec<usize>>,
    check_invariants: bool,
}

impl ClusterTracker {
    pub fn new(updater: &CeUpdater, config: &TrackerConfig) -> Result<Self, EngineError> {
        if config.cluster_names.is_empty() {
            return Err(EngineError::InvalidArgument(
                "At least one cluster name is needed to define adjacency".to_string(),
            ));
        }

        let catalog = updater.catalog();
        let missing: Vec<String> = config
            .cluster_names
            .iter()
            .filter(|name| (0..catalog.num_groups()).any(|g| catalog.get(g, name).is_none()))
            .cloned()
            .collect();
        if !missing.is_empty() {
            return Err(EngineError::UnknownCluster {
                given: missing,
                available: catalog.names().into_iter().map(str::to_string).collect(),
            });
        }

        let translation = Arc::clone(updater.translation());
        let mut relevant_offset = vec![false; translation.num_offsets()];
        let mut surface_offsets = vec![Vec::new(); catalog.num_groups()];
        for (group, offsets) in surface_offsets.iter_mut().enumerate() {
            for name in &config.cluster_names {
                let Some(cluster) = catalog.get(group, name) else {
                    continue;
                };
                for tuple in cluster.members() {
                    let Some(&first) = tuple.first() else {
                        return Err(EngineError::InvalidArgument(format!(
                            "Cluster '{name}' has no neighbour sites and cannot define adjacency"
                        )));
                    };
                    relevant_offset[first] = true;
                    offsets.push(first);
                }
            }
        }
        let offsets: Vec<usize> = relevant_offset
            .iter()
            .enumerate()
            .filter_map(|(offset, &used)| used.then_some(offset))
            .collect();

        let symbols = updater.symbols().clone();
        let mut is_element = vec![false; symbols.unique_species().len()];
        for element in &config.elements {
            match symbols.id_of(element) {
                Some(id) => is_element[id as usize] = true,
                None => warn!(
                    "Cluster element '{}' is not a species of this model and is ignored",
                    element
                ),
            }
        }

        let mut tracker = Self {
            forest: UnionForest::new(symbols.len()),
            catalog: Arc::clone(catalog),
            translation,
            symbols,
            cluster_names: config.cluster_names.clone(),
            is_element,
            solutes: BTreeSet::new(),
            offsets,
            relevant_offset,
            surface_offsets,
            check_invariants: config.check_invariants,
        };
        tracker.full_scan()?;
        info!(
            "Cluster tracker initialized: {} solute sites, {} clusters over offsets {:?}",
            tracker.solutes.len(),
            tracker.cluster_sizes()?.len(),
            tracker.offsets
        );
        Ok(tracker)
    }

    /// Re-reads the species from `updater` and rebuilds the forest.
    pub fn resync(&mut self, updater: &CeUpdater) -> Result<(), EngineError> {
        if updater.num_sites() != self.symbols.len() {
            return Err(EngineError::InvalidArgument(format!(
                "Updater has {} sites, the tracker was built for {}",
                updater.num_sites(),
                self.symbols.len()
            )));
        }
        self.symbols = updater.symbols().clone();
        self.full_scan()
    }

    fn full_scan(&mut self) -> Result<(), EngineError> {
        self.forest.reset();
        self.solutes = (0..self.symbols.len())
            .filter(|&site| self.is_solute(site))
            .collect();
        let solutes: Vec<usize> = self.solutes.iter().copied().collect();
        for site in solutes {
            self.attach(site)?;
        }
        self.restore_minimal_connectivity()?;
        self.check_if_enabled()
    }

    #[inline]
    fn is_solute(&self, site: usize) -> bool {
        self.is_element[self.symbols.id(site) as usize]
    }

    fn is_element_name(&self, species: &str) -> bool {
        self.symbols
            .id_of(species)
            .is_some_and(|id| self.is_element[id as usize])
    }

    /// Merges the clusters of every solute neighbour of `site` into the
    /// cluster of `site`. The neighbour's root is re-pointed, never the
    /// other way round.
    fn attach(&mut self, site: usize) -> Result<(), EngineError> {
        if !self.is_solute(site) {
            return Ok(());
        }
        let root = self.forest.root(site)?;
        for &offset in &self.offsets {
            let neighbour = self.translation.get(site, offset);
            if !self.is_solute(neighbour) {
                continue;
            }
            let other = self.forest.root(neighbour)?;
            if other != root {
                self.forest.set_parent(other, Some(root));
            }
        }
        Ok(())
    }

    /// Sites adjacent to `site` through a relevant offset, in either direction.
    fn neighbours(&self, site: usize) -> Vec<usize> {
        let mut out: Vec<usize> = self
            .offsets
            .iter()
            .map(|&offset| self.translation.get(site, offset))
            .chain(
                self.translation
                    .anchors_reaching(site)
                    .iter()
                    .filter(|&&(_, offset)| self.relevant_offset[offset])
                    .map(|&(anchor, _)| anchor),
            )
            .filter(|&n| n != site)
            .collect();
        out.sort_unstable();
        out.dedup();
        out
    }

    fn is_neighbour(&self, a: usize, b: usize) -> bool {
        self.offsets.iter().any(|&offset| {
            self.translation.get(a, offset) == b || self.translation.get(b, offset) == a
        })
    }

    /// Re-links every cluster as a breadth-first tree from its current root,
    /// so each non-root site points at a genuine neighbour.
    fn restore_minimal_connectivity(&mut self) -> Result<(), EngineError> {
        let mut groups: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
        for &site in &self.solutes {
            groups.entry(self.forest.root(site)?).or_default().push(site);
        }

        for (root, members) in groups {
            if members.len() < 2 {
                continue;
            }
            let in_group: HashSet<usize> = members.iter().copied().collect();
            let mut visited = HashSet::with_capacity(members.len());
            visited.insert(root);
            let mut queue = VecDeque::from([root]);
            while let Some(site) = queue.pop_front() {
                for neighbour in self.neighbours(site) {
                    if in_group.contains(&neighbour) && visited.insert(neighbour) {
                        self.forest.set_parent(neighbour, Some(site));
                        queue.push_back(neighbour);
                    }
                }
            }
            if visited.len() != members.len() {
                return Err(EngineError::Consistency(format!(
                    "Cluster rooted at {} has {} members but only {} are reachable through neighbours",
                    root,
                    members.len(),
                    visited.len()
                )));
            }
        }
        Ok(())
    }

    fn check_if_enabled(&self) -> Result<(), EngineError> {
        if self.check_invariants {
            self.check_invariants()
        } else {
            Ok(())
        }
    }

    /// Verifies that the forest is acyclic, that every non-root site is a
    /// solute pointing at a neighbouring solute, and that the solute set
    /// matches the shadow species.
    pub fn check_invariants(&self) -> Result<(), EngineError> {
        self.forest.group_indices()?;
        for site in 0..self.forest.len() {
            if let Some(parent) = self.forest.parent(site) {
                if !self.is_solute(site) || !self.is_solute(parent) {
                    return Err(EngineError::Consistency(format!(
                        "Link {site} -> {parent} involves a non-solute site"
                    )));
                }
                if !self.is_neighbour(site, parent) {
                    return Err(EngineError::Consistency(format!(
                        "The cluster no longer has minimal connectivity: {site} -> {parent} is not a neighbour link"
                    )));
                }
            }
        }
        let expected: BTreeSet<usize> = (0..self.symbols.len())
            .filter(|&site| self.is_solute(site))
            .collect();
        if expected != self.solutes {
            return Err(EngineError::Consistency(format!(
                "Solute set has {} sites, the shadow species hold {}",
                self.solutes.len(),
                expected.len()
            )));
        }
        Ok(())
    }

    pub fn has_minimal_connectivity(&self) -> bool {
        (0..self.forest.len()).all(|site| {
            self.forest
                .parent(site)
                .is_none_or(|parent| self.is_neighbour(site, parent))
        })
    }

    /// Root -> number of sites in the cluster, root included, for every
    /// cluster with at least one attached member.
    pub fn cluster_sizes(&self) -> Result<BTreeMap<usize, usize>, EngineError> {
        let mut sizes = BTreeMap::new();
        for (site, root) in self.forest.group_indices()?.into_iter().enumerate() {
            if root != site {
                *sizes.entry(root).or_insert(1) += 1;
            }
        }
        Ok(sizes)
    }

    pub fn statistics(&self) -> Result<ClusterStatistics, EngineError> {
        Ok(ClusterStatistics::from_histogram(&self.cluster_sizes()?))
    }

    /// Sites of the largest cluster in ascending order; empty when no cluster
    /// has more than one site. Ties go to the smallest root.
    pub fn members_of_largest_cluster(&self) -> Result<Vec<usize>, EngineError> {
        let sizes = self.cluster_sizes()?;
        let mut largest: Option<(usize, usize)> = None;
        for (&root, &size) in &sizes {
            if largest.is_none_or(|(_, best)| size > best) {
                largest = Some((root, size));
            }
        }
        let Some((root, _)) = largest else {
            return Ok(Vec::new());
        };
        Ok(self
            .forest
            .group_indices()?
            .into_iter()
            .enumerate()
            .filter_map(|(site, r)| (r == root).then_some(site))
            .collect())
    }

    /// True if `target` lies on the root path of `site`.
    pub fn is_connected(&self, site: usize, target: usize) -> Result<bool, EngineError> {
        self.check_site(site)?;
        self.check_site(target)?;
        self.forest.is_connected(site, target)
    }

    /// Root -> number of non-solute neighbours seen from the cluster's sites,
    /// one count per tuple of the tracked clusters.
    pub fn surface(&self) -> Result<BTreeMap<usize, usize>, EngineError> {
        let groups = self.forest.group_indices()?;
        let sizes = self.cluster_sizes()?;
        let mut surface: BTreeMap<usize, usize> = sizes.keys().map(|&root| (root, 0)).collect();
        for (site, &root) in groups.iter().enumerate() {
            let Some(count) = surface.get_mut(&root) else {
                continue;
            };
            for &offset in &self.surface_offsets[self.catalog.site_group(site)] {
                if !self.is_solute(self.translation.get(site, offset)) {
                    *count += 1;
                }
            }
        }
        Ok(surface)
    }

    pub fn group_indices(&self) -> Result<Vec<usize>, EngineError> {
        self.forest.group_indices()
    }

    /// Number of solute sites that are roots, isolated atoms included.
    pub fn num_root_nodes(&self) -> usize {
        self.solutes
            .iter()
            .filter(|&&site| self.forest.is_root(site))
            .count()
    }

    pub fn solute_indices(&self) -> &BTreeSet<usize> {
        &self.solutes
    }

    pub fn parent(&self, site: usize) -> Option<usize> {
        self.forest.parent(site)
    }

    pub fn symbols(&self) -> &SymbolTable {
        &self.symbols
    }

    pub fn cluster_names(&self) -> &[String] {
        &self.cluster_names
    }

    fn check_site(&self, site: usize) -> Result<(), EngineError> {
        if site >= self.forest.len() {
            return Err(EngineError::InvalidArgument(format!(
                "Site {} is out of range for a lattice of {} sites",
                site,
                self.forest.len()
            )));
        }
        Ok(())
    }

    /// Checks the move against the shadow species and reports whether it
    /// moves a site across the solute boundary.
    fn prepare_move(&self, changes: &[SymbolChange]) -> Result<bool, EngineError> {
        validate_move(changes, self.symbols.len())?;
        for change in changes {
            let current = self.symbols.symbol(change.index);
            if current != change.old_symbol {
                return Err(EngineError::InvalidArgument(format!(
                    "Site {} holds '{}' in the tracker, but the change expects '{}'",
                    change.index, current, change.old_symbol
                )));
            }
            if self.symbols.id_of(&change.new_symbol).is_none() {
                return Err(EngineError::InvalidArgument(format!(
                    "Unknown species '{}'",
                    change.new_symbol
                )));
            }
        }
        Ok(changes
            .iter()
            .any(|c| self.is_element_name(&c.old_symbol) != self.is_element_name(&c.new_symbol)))
    }

    fn apply_forest_effects(&mut self, changes: &[SymbolChange]) -> Result<(), EngineError> {
        for change in changes {
            if self.is_element_name(&change.old_symbol) {
                self.forest.set_parent(change.index, None);
                self.solutes.remove(&change.index);
            }
            if self.is_element_name(&change.new_symbol) {
                self.solutes.insert(change.index);
            }
            self.symbols.set_symbol(change.index, &change.new_symbol)?;
        }

        for &site in &self.solutes {
            self.forest.set_parent(site, None);
        }
        let solutes: Vec<usize> = self.solutes.iter().copied().collect();
        for site in solutes {
            self.attach(site)?;
        }
        self.restore_minimal_connectivity()
    }

    /// Commits an accepted move. Moves that keep every site on the same side
    /// of the solute boundary only update the shadow species.
    ///
    /// A move across the boundary re-attaches every solute and rebuilds the
    /// minimal-connectivity form, so it costs O(number of solutes), not
    /// O(neighbourhood). The same holds for
    /// [`move_creates_new_cluster`](Self::move_creates_new_cluster).
    pub fn update_clusters(&mut self, changes: &[SymbolChange]) -> Result<(), EngineError> {
        if !self.prepare_move(changes)? {
            for change in changes {
                self.symbols.set_symbol(change.index, &change.new_symbol)?;
            }
            return Ok(());
        }
        self.apply_forest_effects(changes)?;
        debug!(
            "Clusters updated for {:?}: {} solute roots",
            changes,
            self.num_root_nodes()
        );
        self.check_if_enabled()
    }

    /// Reports whether the move would leave the solutes split over more than
    /// one root. The tracker is restored before returning, on every path.
    pub fn move_creates_new_cluster(
        &mut self,
        changes: &[SymbolChange],
    ) -> Result<bool, EngineError> {
        if !self.prepare_move(changes)? {
            return Ok(false);
        }

        let snapshot = self.snapshot(changes);
        let outcome = self
            .apply_forest_effects(changes)
            .map(|()| self.num_root_nodes());
        self.restore(snapshot)?;
        Ok(outcome? > 1)
    }

    fn snapshot(&self, changes: &[SymbolChange]) -> ProbeSnapshot {
        let parents = self
            .solutes
            .iter()
            .copied()
            .chain(changes.iter().map(|c| c.index))
            .map(|site| (site, self.forest.parent(site)))
            .collect();
        let symbols = changes
            .iter()
            .map(|c| (c.index, self.symbols.symbol(c.index).to_string()))
            .collect();
        ProbeSnapshot {
            parents,
            symbols,
            solutes: self.solutes.clone(),
        }
    }

    fn restore(&mut self, snapshot: ProbeSnapshot) -> Result<(), EngineError> {
        for &site in &self.solutes {
            self.forest.set_parent(site, None);
        }
        for (site, parent) in snapshot.parents {
            self.forest.set_parent(site, parent);
        }
        for (site, symbol) in snapshot.symbols {
            self.symbols.set_symbol(site, &symbol)?;
        }
        let expected = snapshot.solutes.len();
        self.solutes = snapshot.solutes;
        let actual = (0..self.symbols.len())
            .filter(|&site| self.is_solute(site))
            .count();
        if actual != expected {
            return Err(EngineError::Consistency(format!(
                "Number of solute atoms changed during a probe: {expected} before, {actual} after"
            )));
        }
        Ok(())
    }

    /// Re-links the solute neighbours hanging directly off `ref_site` to other
    /// solute neighbours, so `ref_site` can be vacated without splitting its
    /// cluster.
    ///
    /// A neighbour with no alternative becomes a new root when
    /// `allow_new_clusters` is set; otherwise the whole operation is rolled
    /// back and `false` is returned.
    pub fn detach_neighbours(
        &mut self,
        ref_site: usize,
        allow_new_clusters: bool,
        sites_in_change: &[usize],
    ) -> Result<bool, EngineError> {
        if !sites_in_change.contains(&ref_site) {
            return Err(EngineError::InvalidArgument(format!(
                "Site {ref_site} is not part of the change {sites_in_change:?}"
            )));
        }
        self.check_site(ref_site)?;
        if self.check_invariants && !self.has_minimal_connectivity() {
            return Err(EngineError::Consistency(
                "The cluster no longer has minimal connectivity".to_string(),
            ));
        }

        let mut journal: Vec<(usize, Option<usize>)> = Vec::new();
        let ref_was_root = self.forest.is_root(ref_site);
        let mut new_root_assigned = false;

        for site in self.neighbours(ref_site) {
            if !self.is_solute(site) || self.forest.parent(site) != Some(ref_site) {
                continue;
            }

            if ref_was_root && !new_root_assigned {
                self.relink(&mut journal, site, None);
                self.relink(&mut journal, ref_site, Some(site));
                new_root_assigned = true;
                continue;
            }

            let mut alternative = None;
            for candidate in self.neighbours(site) {
                if sites_in_change.contains(&candidate) || !self.is_solute(candidate) {
                    continue;
                }
                if self.forest.is_connected(candidate, site)?
                    || self.forest.is_connected(candidate, ref_site)?
                {
                    continue;
                }
                alternative = Some(candidate);
                break;
            }

            match alternative {
                Some(candidate) => self.relink(&mut journal, site, Some(candidate)),
                None if allow_new_clusters => self.relink(&mut journal, site, None),
                None => {
                    for (site, parent) in journal.into_iter().rev() {
                        self.forest.set_parent(site, parent);
                    }
                    return Ok(false);
                }
            }
        }

        self.check_if_enabled()?;
        Ok(true)
    }

    fn relink(&mut self, journal: &mut Vec<(usize, Option<usize>)>, site: usize, parent: Option<usize>) {
        journal.push((site, self.forest.parent(site)));
        self.forest.set_parent(site, parent);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::model::ModelDescription;
    use crate::engine::change::swap;
    use crate::engine::error::ErrorKind;
    use proptest::prelude::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    const PAIR: &str = "c2_d0000_0";

    fn model(symbols: Vec<String>, translation: Vec<Vec<usize>>, pair: Vec<Vec<usize>>) -> ModelDescription {
        let n = symbols.len();
        let mut clusters = BTreeMap::new();
        clusters.insert("c1".to_string(), vec![vec![]]);
        clusters.insert(PAIR.to_string(), pair);
        ModelDescription {
            symbols,
            symmetry_groups: vec![0; n],
            translation,
            clusters: vec![clusters],
            basis_functions: vec![BTreeMap::from([
                ("A".to_string(), 1.0),
                ("B".to_string(), -1.0),
                ("C".to_string(), 0.0),
            ])],
            correlation_functions: vec!["c0".into(), "c1_0".into(), "c2_d0000_0_0".into()],
            ecis: BTreeMap::from([("c2_d0000_0_0".to_string(), 0.1)]),
            permutations: BTreeMap::new(),
        }
    }

    fn ring(symbols: &[&str]) -> CeUpdater {
        let n = symbols.len();
        let translation = (0..n).map(|i| vec![(i + 1) % n, (i + n - 1) % n]).collect();
        let symbols = symbols.iter().map(|s| s.to_string()).collect();
        CeUpdater::new(&model(symbols, translation, vec![vec![0], vec![1]])).unwrap()
    }

    /// Periodic `l x l` square lattice; offsets are +x, -x, +y, -y.
    fn square(l: usize, symbols: Vec<String>) -> CeUpdater {
        let site = |x: usize, y: usize| (x % l) + l * (y % l);
        let translation = (0..l * l)
            .map(|s| {
                let (x, y) = (s % l, s / l);
                vec![
                    site(x + 1, y),
                    site(x + l - 1, y),
                    site(x, y + 1),
                    site(x, y + l - 1),
                ]
            })
            .collect();
        CeUpdater::new(&model(symbols, translation, vec![vec![0], vec![1], vec![2], vec![3]])).unwrap()
    }

    fn random_square(l: usize, seed: u64) -> CeUpdater {
        let mut rng = StdRng::seed_from_u64(seed);
        let symbols = (0..l * l)
            .map(|_| if rng.gen_bool(0.35) { "A" } else { "B" }.to_string())
            .collect();
        square(l, symbols)
    }

    fn config() -> TrackerConfig {
        TrackerConfig::new([PAIR], ["A"]).with_invariant_checks(true)
    }

    /// Connected-component label of every solute site, by plain BFS.
    fn components(tracker: &ClusterTracker) -> BTreeMap<usize, usize> {
        let mut labels = BTreeMap::new();
        for &start in tracker.solute_indices() {
            if labels.contains_key(&start) {
                continue;
            }
            let mut queue = VecDeque::from([start]);
            labels.insert(start, start);
            while let Some(site) = queue.pop_front() {
                for n in tracker.neighbours(site) {
                    if tracker.is_solute(n) && !labels.contains_key(&n) {
                        labels.insert(n, start);
                        queue.push_back(n);
                    }
                }
            }
        }
        labels
    }

    fn assert_partition_matches_components(tracker: &ClusterTracker) {
        let groups = tracker.group_indices().unwrap();
        let labels = components(tracker);
        for (&a, &la) in &labels {
            for (&b, &lb) in &labels {
                assert_eq!(groups[a] == groups[b], la == lb, "sites {a} and {b}");
            }
        }
    }

    fn parents(tracker: &ClusterTracker) -> Vec<Option<usize>> {
        (0..tracker.symbols().len()).map(|s| tracker.parent(s)).collect()
    }

    #[test]
    fn ring_scenario_counts_only_clusters_with_members() {
        let updater = ring(&["A", "B", "A", "B"]);
        let mut tracker = ClusterTracker::new(&updater, &config()).unwrap();
        assert_eq!(tracker.solute_indices().iter().copied().collect::<Vec<_>>(), vec![0, 2]);
        assert_eq!(tracker.statistics().unwrap().number_of_clusters, 0);
        assert!(tracker.members_of_largest_cluster().unwrap().is_empty());
        assert_eq!(tracker.num_root_nodes(), 2);

        tracker
            .update_clusters(&[SymbolChange::new(1, "B", "A")])
            .unwrap();
        let stats = tracker.statistics().unwrap();
        assert_eq!(stats.number_of_clusters, 1);
        assert_eq!(stats.cluster_sizes, vec![3]);
        assert_eq!(stats.max_size, 3);
        assert_eq!(tracker.cluster_sizes().unwrap().len(), 1);
        assert_eq!(tracker.members_of_largest_cluster().unwrap(), vec![0, 1, 2]);
        tracker.check_invariants().unwrap();
    }

    #[test]
    fn surface_counts_non_solute_neighbours_per_cluster() {
        let updater = ring(&["A", "A", "A", "B", "B", "B"]);
        let tracker = ClusterTracker::new(&updater, &config()).unwrap();
        let surface = tracker.surface().unwrap();
        assert_eq!(surface.len(), 1);
        assert_eq!(surface.values().copied().collect::<Vec<_>>(), vec![2]);
    }

    #[test]
    fn unknown_cluster_names_are_rejected_with_the_available_ones() {
        let updater = ring(&["A", "B", "A", "B"]);
        let err = ClusterTracker::new(&updater, &TrackerConfig::new(["c2_missing"], ["A"]))
            .unwrap_err();
        match err {
            EngineError::UnknownCluster { given, available } => {
                assert_eq!(given, vec!["c2_missing".to_string()]);
                assert_eq!(available, vec!["c1".to_string(), PAIR.to_string()]);
            }
            other => panic!("unexpected error {other:?}"),
        }

        let err = ClusterTracker::new(&updater, &TrackerConfig::new(["c1"], ["A"])).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    }

    #[test]
    fn initial_forest_has_minimal_connectivity() {
        let updater = random_square(8, 3);
        let tracker = ClusterTracker::new(&updater, &config()).unwrap();
        assert!(tracker.has_minimal_connectivity());
        tracker.check_invariants().unwrap();
        assert_partition_matches_components(&tracker);
    }

    #[test]
    fn probe_reports_splits_and_restores_state() {
        let updater = ring(&["A", "A", "B", "B", "B", "B"]);
        let mut tracker = ClusterTracker::new(&updater, &config()).unwrap();
        let before = parents(&tracker);

        assert!(tracker.move_creates_new_cluster(&swap(1, "A", 4, "B")).unwrap());
        assert!(!tracker.move_creates_new_cluster(&swap(0, "A", 2, "B")).unwrap());
        // Both sites are B: the move does not touch the solute boundary.
        assert!(!tracker.move_creates_new_cluster(&swap(3, "B", 4, "B")).unwrap());

        assert_eq!(parents(&tracker), before);
        assert_eq!(tracker.solute_indices().len(), 2);
        assert_eq!(tracker.symbols().symbol(1), "A");
        assert_eq!(tracker.symbols().symbol(4), "B");
    }

    #[test]
    fn committed_moves_track_brute_force_components() {
        let l = 6;
        let updater = random_square(l, 21);
        let mut tracker = ClusterTracker::new(&updater, &config()).unwrap();
        let mut rng = StdRng::seed_from_u64(5);

        for _ in 0..200 {
            let a = rng.gen_range(0..l * l);
            let b = rng.gen_range(0..l * l);
            let sa = tracker.symbols().symbol(a).to_string();
            let sb = tracker.symbols().symbol(b).to_string();
            if sa == sb {
                continue;
            }
            let changes = swap(a, &sa, b, &sb);

            let mut committed = tracker.clone();
            committed.update_clusters(&changes).unwrap();
            let roots = components(&committed)
                .iter()
                .filter(|(site, label)| site == label)
                .count();
            assert_eq!(tracker.move_creates_new_cluster(&changes).unwrap(), roots > 1);

            tracker.update_clusters(&changes).unwrap();
            tracker.check_invariants().unwrap();
            assert_partition_matches_components(&tracker);
        }
    }

    #[test]
    fn moves_within_one_side_of_the_boundary_only_update_species() {
        let updater = ring(&["A", "B", "A", "B"]);
        let mut tracker = ClusterTracker::new(&updater, &config()).unwrap();
        let before = parents(&tracker);
        tracker
            .update_clusters(&[SymbolChange::new(1, "B", "C")])
            .unwrap();
        assert_eq!(tracker.symbols().symbol(1), "C");
        assert_eq!(parents(&tracker), before);

        let err = tracker
            .update_clusters(&[SymbolChange::new(1, "B", "A")])
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
        let err = tracker
            .update_clusters(&[SymbolChange::new(1, "C", "Zr")])
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    }

    #[test]
    fn detach_relinks_children_to_an_alternative_neighbour() {
        // 2x2 solute block in the corner of a 4x4 lattice: 1 -> 0, 4 -> 0, 5 -> 1.
        let mut symbols = vec!["B".to_string(); 16];
        for site in [0, 1, 4, 5] {
            symbols[site] = "A".to_string();
        }
        let updater = square(4, symbols);
        let mut tracker = ClusterTracker::new(&updater, &config()).unwrap();
        assert_eq!(tracker.parent(5), Some(1));

        assert!(tracker.detach_neighbours(1, false, &[1, 7]).unwrap());
        assert_eq!(tracker.parent(5), Some(4));
        tracker.check_invariants().unwrap();
    }

    #[test]
    fn failed_detach_leaves_the_forest_untouched() {
        // Root 0 with children 1 and 5; 5 has no other solute neighbour.
        let updater = ring(&["A", "A", "B", "B", "B", "A"]);
        let mut tracker = ClusterTracker::new(&updater, &config()).unwrap();
        assert_eq!(tracker.parent(1), Some(0));
        assert_eq!(tracker.parent(5), Some(0));
        let before = parents(&tracker);

        assert!(!tracker.detach_neighbours(0, false, &[0, 3]).unwrap());
        assert_eq!(parents(&tracker), before);

        assert!(tracker.detach_neighbours(0, true, &[0, 3]).unwrap());
        assert_eq!(tracker.parent(1), None);
        assert_eq!(tracker.parent(0), Some(1));
        assert_eq!(tracker.parent(5), None);
    }

    #[test]
    fn detach_requires_the_reference_site_in_the_change() {
        let updater = ring(&["A", "A", "B", "B"]);
        let mut tracker = ClusterTracker::new(&updater, &config()).unwrap();
        let err = tracker.detach_neighbours(0, true, &[2, 3]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    }

    #[test]
    fn is_connected_follows_root_paths() {
        let updater = ring(&["A", "A", "A", "B", "B", "B"]);
        let tracker = ClusterTracker::new(&updater, &config()).unwrap();
        // Root 0, 1 -> 0, 2 -> 1.
        assert!(tracker.is_connected(2, 0).unwrap());
        assert!(!tracker.is_connected(0, 2).unwrap());
        assert!(tracker.is_connected(9, 0).is_err());
    }

    #[test]
    fn resync_picks_up_updater_configuration() {
        let mut updater = ring(&["A", "B", "A", "B"]);
        let mut tracker = ClusterTracker::new(&updater, &config()).unwrap();
        updater.set_symbols(&["A", "A", "A", "A"]).unwrap();
        tracker.resync(&updater).unwrap();
        assert_eq!(tracker.solute_indices().len(), 4);
        assert_eq!(tracker.statistics().unwrap().cluster_sizes, vec![4]);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(48))]
        #[test]
        fn probing_never_changes_the_tracker(
            seed in any::<u64>(),
            moves in prop::collection::vec((0usize..36, 0usize..36), 1..24)
        ) {
            let updater = random_square(6, seed);
            let mut tracker = ClusterTracker::new(&updater, &config()).unwrap();
            let before_parents = parents(&tracker);
            let before_solutes = tracker.solute_indices().clone();
            let before_symbols = tracker.symbols().clone();

            for (a, b) in moves {
                let sa = tracker.symbols().symbol(a).to_string();
                let sb = tracker.symbols().symbol(b).to_string();
                if a == b || sa == sb {
                    continue;
                }
                tracker.move_creates_new_cluster(&swap(a, &sa, b, &sb)).unwrap();
            }

            prop_assert_eq!(parents(&tracker), before_parents);
            prop_assert_eq!(tracker.solute_indices(), &before_solutes);
            prop_assert_eq!(tracker.symbols(), &before_symbols);
        }

        #[test]
        fn forest_stays_acyclic_under_commits(
            seed in any::<u64>(),
            moves in prop::collection::vec((0usize..36, 0usize..36), 1..24)
        ) {
            let updater = random_square(6, seed);
            let mut tracker = ClusterTracker::new(&updater, &config()).unwrap();
            for (a, b) in moves {
                let sa = tracker.symbols().symbol(a).to_string();
                let sb = tracker.symbols().symbol(b).to_string();
                if a == b || sa == sb {
                    continue;
                }
                tracker.update_clusters(&swap(a, &sa, b, &sb)).unwrap();
                prop_assert!(tracker.group_indices().is_ok());
                prop_assert!(tracker.has_minimal_connectivity());
            }
        }

        #[test]
        fn forest_stays_acyclic_under_detaches_and_commits(
            seed in any::<u64>(),
            steps in prop::collection::vec(
                (any::<bool>(), 0usize..36, 0usize..36, any::<bool>()),
                1..32
            )
        ) {
            let updater = random_square(6, seed);
            let mut tracker = ClusterTracker::new(&updater, &config()).unwrap();
            for (detach, a, b, allow_new_clusters) in steps {
                if a == b {
                    continue;
                }
                if detach {
                    let before = parents(&tracker);
                    let detached = tracker
                        .detach_neighbours(a, allow_new_clusters, &[a, b])
                        .unwrap();
                    if !detached {
                        prop_assert_eq!(parents(&tracker), before);
                    }
                } else {
                    let sa = tracker.symbols().symbol(a).to_string();
                    let sb = tracker.symbols().symbol(b).to_string();
                    if sa == sb {
                        continue;
                    }
                    tracker.update_clusters(&swap(a, &sa, b, &sb)).unwrap();
                }
                prop_assert!(tracker.group_indices().is_ok());
                prop_assert!(tracker.has_minimal_connectivity());
            }
        }
    }
}
