use crate::engine::error::EngineError;

/// Parent-pointer forest over lattice sites.
///
/// Unions are asymmetric and there is no path compression: the structure
/// stays invertible so single links can be moved around locally. Every walk
/// towards a root is capped at `len()` steps; hitting the cap means the
/// forest contains a cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnionForest {
    parent: Vec<Option<usize>>,
}

impl UnionForest {
    pub fn new(len: usize) -> Self {
        Self {
            parent: vec![None; len],
        }
    }

    pub fn len(&self) -> usize {
        self.parent.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parent.is_empty()
    }

    #[inline]
    pub fn parent(&self, site: usize) -> Option<usize> {
        self.parent[site]
    }

    #[inline]
    pub fn is_root(&self, site: usize) -> bool {
        self.parent[site].is_none()
    }

    #[inline]
    pub fn set_parent(&mut self, site: usize, parent: Option<usize>) {
        self.parent[site] = parent;
    }

    /// Makes every site a root.
    pub fn reset(&mut self) {
        self.parent.fill(None);
    }

    pub fn root(&self, site: usize) -> Result<usize, EngineError> {
        let mut current = site;
        let mut steps = 0;
        while let Some(next) = self.parent[current] {
            steps += 1;
            if steps > self.parent.len() {
                return Err(cycle_error(site));
            }
            current = next;
        }
        Ok(current)
    }

    /// True if `target` lies on the path from `site` to its root. The test is
    /// directional: a root is never connected to its descendants.
    pub fn is_connected(&self, site: usize, target: usize) -> Result<bool, EngineError> {
        let mut current = site;
        let mut steps = 0;
        while let Some(next) = self.parent[current] {
            steps += 1;
            if steps > self.parent.len() {
                return Err(cycle_error(site));
            }
            if next == target {
                return Ok(true);
            }
            current = next;
        }
        Ok(false)
    }

    /// Root of every site.
    pub fn group_indices(&self) -> Result<Vec<usize>, EngineError> {
        (0..self.parent.len()).map(|site| self.root(site)).collect()
    }
}

fn cycle_error(site: usize) -> EngineError {
    EngineError::Consistency(format!(
        "Circular connected clusters: the walk from site {site} does not reach a root"
    ))
}
