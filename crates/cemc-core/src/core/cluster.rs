use itertools::Itertools;
use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;

/// Name of the constant correlation function.
pub const CONSTANT_TERM: &str = "c0";

#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum CatalogError {
    #[error("Site {site} belongs to symmetry group {group}, but only {num_groups} groups are defined")]
    UnknownGroup {
        site: usize,
        group: usize,
        num_groups: usize,
    },
    #[error("Cluster name '{0}' does not start with an arity prefix such as 'c2'")]
    MissingArity(String),
    #[error(
        "Cluster '{name}' in symmetry group {group} declares arity {declared} but has a tuple of {found} members"
    )]
    ArityMismatch {
        name: String,
        group: usize,
        declared: usize,
        found: usize,
    },
    #[error("Cluster '{name}' in symmetry group {group} uses offset {offset}, the table has {num_offsets}")]
    OffsetOutOfRange {
        name: String,
        group: usize,
        offset: usize,
        num_offsets: usize,
    },
    #[error("Permutation {permutation:?} is not a permutation of 0..{arity}")]
    InvalidPermutation {
        arity: usize,
        permutation: Vec<usize>,
    },
    #[error("Permutation key '{0}' is not a cluster arity")]
    PermutationKey(String),
    #[error("Malformed correlation function name '{0}'")]
    MalformedName(String),
    #[error("Correlation function '{name}' has {found} decoration digits, cluster arity is {arity}")]
    DecorationLength {
        name: String,
        arity: usize,
        found: usize,
    },
    #[error("Cluster '{cluster}' is used with mixed decoration numbers {numbers:?}")]
    MixedDecoration {
        cluster: String,
        numbers: Vec<usize>,
    },
}

/// A cluster geometry as seen from one symmetry group.
///
/// `members` holds one offset tuple per distinct instance anchored at a site
/// of the group; the anchor itself is implicit. `by_offset[k]` lists the
/// tuples that contain offset `k`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cluster {
    name: String,
    arity: usize,
    members: Vec<Vec<usize>>,
    by_offset: Vec<Vec<usize>>,
}

impl Cluster {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of sites taking part in one occurrence, anchor included.
    pub fn arity(&self) -> usize {
        self.arity
    }

    pub fn members(&self) -> &[Vec<usize>] {
        &self.members
    }

    pub fn tuples_with_offset(&self, offset: usize) -> &[usize] {
        self.by_offset.get(offset).map_or(&[], Vec::as_slice)
    }
}

/// Read-only description of every cluster in every translation symmetry
/// group, plus the decoration permutations used to symmetrize basis
/// function products.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterCatalog {
    groups: Vec<BTreeMap<String, Cluster>>,
    site_groups: Vec<usize>,
    group_sizes: Vec<usize>,
    permutations: BTreeMap<usize, Vec<Vec<usize>>>,
}

impl ClusterCatalog {
    pub fn new(
        raw_groups: &[BTreeMap<String, Vec<Vec<usize>>>],
        site_groups: &[usize],
        permutations: &BTreeMap<usize, Vec<Vec<usize>>>,
        num_offsets: usize,
    ) -> Result<Self, CatalogError> {
        let num_groups = raw_groups.len();
        let mut group_sizes = vec![0; num_groups];
        for (site, &group) in site_groups.iter().enumerate() {
            if group >= num_groups {
                return Err(CatalogError::UnknownGroup {
                    site,
                    group,
                    num_groups,
                });
            }
            group_sizes[group] += 1;
        }

        let mut groups = Vec::with_capacity(num_groups);
        for (group, raw) in raw_groups.iter().enumerate() {
            let mut clusters = BTreeMap::new();
            for (name, members) in raw {
                let arity = parse_arity(name).ok_or_else(|| CatalogError::MissingArity(name.clone()))?;
                let mut by_offset = vec![Vec::new(); num_offsets];
                for (tuple_idx, tuple) in members.iter().enumerate() {
                    if tuple.len() + 1 != arity {
                        return Err(CatalogError::ArityMismatch {
                            name: name.clone(),
                            group,
                            declared: arity,
                            found: tuple.len() + 1,
                        });
                    }
                    for &offset in tuple {
                        if offset >= num_offsets {
                            return Err(CatalogError::OffsetOutOfRange {
                                name: name.clone(),
                                group,
                                offset,
                                num_offsets,
                            });
                        }
                        if by_offset[offset].last() != Some(&tuple_idx) {
                            by_offset[offset].push(tuple_idx);
                        }
                    }
                }
                clusters.insert(
                    name.clone(),
                    Cluster {
                        name: name.clone(),
                        arity,
                        members: members.clone(),
                        by_offset,
                    },
                );
            }
            groups.push(clusters);
        }

        for (&arity, perms) in permutations {
            for perm in perms {
                if !perm.iter().copied().sorted_unstable().eq(0..arity) {
                    return Err(CatalogError::InvalidPermutation {
                        arity,
                        permutation: perm.clone(),
                    });
                }
            }
        }

        Ok(Self {
            groups,
            site_groups: site_groups.to_vec(),
            group_sizes,
            permutations: permutations.clone(),
        })
    }

    pub fn num_groups(&self) -> usize {
        self.groups.len()
    }

    pub fn group(&self, group: usize) -> &BTreeMap<String, Cluster> {
        &self.groups[group]
    }

    pub fn groups(&self) -> &[BTreeMap<String, Cluster>] {
        &self.groups
    }

    pub fn get(&self, group: usize, name: &str) -> Option<&Cluster> {
        self.groups.get(group).and_then(|g| g.get(name))
    }

    #[inline]
    pub fn site_group(&self, site: usize) -> usize {
        self.site_groups[site]
    }

    pub fn num_sites(&self) -> usize {
        self.site_groups.len()
    }

    /// Every cluster name known to at least one symmetry group.
    pub fn names(&self) -> BTreeSet<&str> {
        self.groups
            .iter()
            .flat_map(|g| g.keys().map(String::as_str))
            .collect()
    }

    pub fn arity_of(&self, name: &str) -> Option<usize> {
        self.groups
            .iter()
            .find_map(|g| g.get(name))
            .map(Cluster::arity)
    }

    /// Number of occurrences of `name` over the whole lattice, counting one
    /// per (anchor site, member tuple) pair.
    pub fn occurrences(&self, name: &str) -> usize {
        self.groups
            .iter()
            .zip(&self.group_sizes)
            .filter_map(|(g, &sites)| g.get(name).map(|c| c.members.len() * sites))
            .sum()
    }

    /// Decoration permutations for clusters of `arity`; identity when none
    /// were configured.
    pub fn permutations(&self, arity: usize) -> Vec<Vec<usize>> {
        match self.permutations.get(&arity) {
            Some(perms) if !perms.is_empty() => perms.clone(),
            _ => vec![(0..arity).collect()],
        }
    }
}

/// Parses the arity prefix of a cluster name: `c2_d0000_0` -> 2, `c1` -> 1.
pub fn parse_arity(name: &str) -> Option<usize> {
    let rest = name.strip_prefix('c')?;
    let digits: String = rest.chars().take_while(|c| c.is_ascii_digit()).collect();
    if digits.is_empty() {
        return None;
    }
    match rest[digits.len()..].chars().next() {
        None | Some('_') => digits.parse().ok(),
        Some(_) => None,
    }
}

/// A parsed correlation function name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CorrelationTerm {
    Constant,
    Cluster {
        cluster: String,
        decoration: Vec<usize>,
    },
}

impl CorrelationTerm {
    pub fn parse(name: &str) -> Result<Self, CatalogError> {
        if name == CONSTANT_TERM {
            return Ok(Self::Constant);
        }
        let malformed = || CatalogError::MalformedName(name.to_string());
        let (cluster, digits) = name.rsplit_once('_').ok_or_else(malformed)?;
        if cluster.is_empty() || digits.is_empty() || parse_arity(cluster).is_none() {
            return Err(malformed());
        }
        let decoration = digits
            .chars()
            .map(|c| c.to_digit(10).map(|d| d as usize))
            .collect::<Option<Vec<_>>>()
            .ok_or_else(malformed)?;
        Ok(Self::Cluster {
            cluster: cluster.to_string(),
            decoration,
        })
    }

    /// Number of decoration digits carried by the name.
    pub fn decoration_number(&self) -> usize {
        match self {
            Self::Constant => 0,
            Self::Cluster { decoration, .. } => decoration.len(),
        }
    }
}

/// Expands a decoration to one basis function index per site. A single digit
/// on a larger cluster applies the same basis function to every site.
pub fn expand_decoration(
    name: &str,
    decoration: &[usize],
    arity: usize,
) -> Result<Vec<usize>, CatalogError> {
    match decoration.len() {
        n if n == arity => Ok(decoration.to_vec()),
        1 => Ok(vec![decoration[0]; arity]),
        found => Err(CatalogError::DecorationLength {
            name: name.to_string(),
            arity,
            found,
        }),
    }
}

/// All correlation functions that share a geometric cluster must use the
/// same decoration number.
pub fn validate_decoration_numbers<'a>(
    names: impl IntoIterator<Item = &'a str>,
) -> Result<(), CatalogError> {
    let mut seen: BTreeMap<String, BTreeSet<usize>> = BTreeMap::new();
    for name in names {
        if let CorrelationTerm::Cluster { cluster, decoration } = CorrelationTerm::parse(name)? {
            seen.entry(cluster).or_default().insert(decoration.len());
        }
    }
    match seen.into_iter().find(|(_, numbers)| numbers.len() > 1) {
        Some((cluster, numbers)) => Err(CatalogError::MixedDecoration {
            cluster,
            numbers: numbers.into_iter().collect(),
        }),
        None => Ok(()),
    }
}
