use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum TranslationError {
    #[error("Translation table is empty")]
    Empty,
    #[error("Row {row} has {found} offsets, expected {expected}")]
    Ragged {
        row: usize,
        expected: usize,
        found: usize,
    },
    #[error("Entry ({row}, {offset}) points at site {value}, but the lattice has {len} sites")]
    SiteOutOfRange {
        row: usize,
        offset: usize,
        value: usize,
        len: usize,
    },
}

/// Dense `(site, offset) -> site` table.
///
/// Besides the forward lookup the table keeps its inverse: for every site the
/// list of `(anchor, offset)` pairs with `get(anchor, offset) == site`. The
/// correlation updater needs it to find the occurrences a changed site takes
/// part in without being their anchor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranslationMatrix {
    num_sites: usize,
    num_offsets: usize,
    data: Vec<usize>,
    incidence: Vec<Vec<(usize, usize)>>,
}

impl TranslationMatrix {
    pub fn new(rows: &[Vec<usize>]) -> Result<Self, TranslationError> {
        let num_sites = rows.len();
        if num_sites == 0 {
            return Err(TranslationError::Empty);
        }
        let num_offsets = rows[0].len();

        let mut data = Vec::with_capacity(num_sites * num_offsets);
        let mut incidence = vec![Vec::new(); num_sites];
        for (row, entries) in rows.iter().enumerate() {
            if entries.len() != num_offsets {
                return Err(TranslationError::Ragged {
                    row,
                    expected: num_offsets,
                    found: entries.len(),
                });
            }
            for (offset, &value) in entries.iter().enumerate() {
                if value >= num_sites {
                    return Err(TranslationError::SiteOutOfRange {
                        row,
                        offset,
                        value,
                        len: num_sites,
                    });
                }
                data.push(value);
                incidence[value].push((row, offset));
            }
        }

        Ok(Self {
            num_sites,
            num_offsets,
            data,
            incidence,
        })
    }

    #[inline]
    pub fn get(&self, site: usize, offset: usize) -> usize {
        self.data[site * self.num_offsets + offset]
    }

    pub fn num_sites(&self) -> usize {
        self.num_sites
    }

    pub fn num_offsets(&self) -> usize {
        self.num_offsets
    }

    pub fn row(&self, site: usize) -> &[usize] {
        let start = site * self.num_offsets;
        &self.data[start..start + self.num_offsets]
    }

    /// All `(anchor, offset)` pairs that translate onto `site`.
    pub fn anchors_reaching(&self, site: usize) -> &[(usize, usize)] {
        &self.incidence[site]
    }
}
