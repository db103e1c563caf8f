//! Sparse stoichiometric matrices derived from a network
use indexmap::{IndexMap, IndexSet};
use nalgebra::DMatrix;
use nalgebra_sparse::{CooMatrix, CsrMatrix};

use crate::metabolic_model::reaction::Reaction;

/// A metabolite × column matrix of signed stoichiometric coefficients
///
/// Rows and columns are ordered by id, so two networks holding the same reactions produce
/// the same matrix regardless of insertion order.
#[derive(Debug, Clone, PartialEq)]
pub struct StoichiometricMatrix {
    metabolite_ids: IndexSet<String>,
    column_ids: IndexSet<String>,
    matrix: CsrMatrix<f64>,
}

impl StoichiometricMatrix {
    /// One column per reaction, substrates negative and products positive
    pub(crate) fn new<'a, M, R>(metabolite_ids: M, reactions: R) -> Self
    where
        M: IntoIterator<Item = &'a String>,
        R: IntoIterator<Item = &'a Reaction>,
    {
        let metabolite_ids = Self::sorted(metabolite_ids);
        let mut reactions: Vec<&Reaction> = reactions.into_iter().collect();
        reactions.sort_by(|a, b| a.id.cmp(&b.id));

        let mut coo = CooMatrix::new(metabolite_ids.len(), reactions.len());
        let mut column_ids = IndexSet::with_capacity(reactions.len());
        for (col, rxn) in reactions.iter().enumerate() {
            column_ids.insert(rxn.id.clone());
            for (met, coefficient) in rxn.participants() {
                if let Some(row) = metabolite_ids.get_index_of(met) {
                    coo.push(row, col, coefficient);
                }
            }
        }
        StoichiometricMatrix {
            metabolite_ids,
            column_ids,
            matrix: CsrMatrix::from(&coo),
        }
    }

    /// Two columns per reaction: `{id}_f` with the usual signs and `{id}_b` with the signs flipped
    pub(crate) fn new_split<'a, M, R>(metabolite_ids: M, reactions: R) -> Self
    where
        M: IntoIterator<Item = &'a String>,
        R: IntoIterator<Item = &'a Reaction>,
    {
        let metabolite_ids = Self::sorted(metabolite_ids);
        let mut reactions: Vec<&Reaction> = reactions.into_iter().collect();
        reactions.sort_by(|a, b| a.id.cmp(&b.id));

        let mut coo = CooMatrix::new(metabolite_ids.len(), 2 * reactions.len());
        let mut column_ids = IndexSet::with_capacity(2 * reactions.len());
        for (idx, rxn) in reactions.iter().enumerate() {
            column_ids.insert(format!("{}_f", rxn.id));
            column_ids.insert(format!("{}_b", rxn.id));
            for (met, coefficient) in rxn.participants() {
                if let Some(row) = metabolite_ids.get_index_of(met) {
                    coo.push(row, 2 * idx, coefficient);
                    coo.push(row, 2 * idx + 1, -coefficient);
                }
            }
        }
        StoichiometricMatrix {
            metabolite_ids,
            column_ids,
            matrix: CsrMatrix::from(&coo),
        }
    }

    fn sorted<'a, M: IntoIterator<Item = &'a String>>(ids: M) -> IndexSet<String> {
        let mut ids: Vec<String> = ids.into_iter().cloned().collect();
        ids.sort();
        ids.into_iter().collect()
    }

    pub fn nrows(&self) -> usize {
        self.matrix.nrows()
    }

    pub fn ncols(&self) -> usize {
        self.matrix.ncols()
    }

    /// Row labels, in row order
    pub fn metabolite_ids(&self) -> impl Iterator<Item = &str> {
        self.metabolite_ids.iter().map(String::as_str)
    }

    /// Column labels, in column order
    pub fn column_ids(&self) -> impl Iterator<Item = &str> {
        self.column_ids.iter().map(String::as_str)
    }

    /// Entry for a metabolite and column, 0 if either is unknown or they don't interact
    pub fn get(&self, metabolite_id: &str, column_id: &str) -> f64 {
        let (Some(row), Some(col)) = (
            self.metabolite_ids.get_index_of(metabolite_id),
            self.column_ids.get_index_of(column_id),
        ) else {
            return 0.;
        };
        self.row_entries(row)
            .find(|(c, _)| *c == col)
            .map(|(_, value)| value)
            .unwrap_or(0.)
    }

    /// Nonzero entries of a metabolite's row, keyed by column id
    pub fn row(&self, metabolite_id: &str) -> IndexMap<String, f64> {
        let Some(row) = self.metabolite_ids.get_index_of(metabolite_id) else {
            return IndexMap::new();
        };
        self.row_entries(row)
            .filter_map(|(col, value)| {
                self.column_ids
                    .get_index(col)
                    .map(|id| (id.clone(), value))
            })
            .collect()
    }

    /// Number of nonzero entries in a metabolite's row
    pub fn row_nnz(&self, metabolite_id: &str) -> usize {
        match self.metabolite_ids.get_index_of(metabolite_id) {
            Some(row) => self.row_entries(row).count(),
            None => 0,
        }
    }

    fn row_entries(&self, row: usize) -> impl Iterator<Item = (usize, f64)> + '_ {
        self.matrix
            .get_row(row)
            .into_iter()
            .flat_map(|r| {
                r.col_indices()
                    .iter()
                    .copied()
                    .zip(r.values().iter().copied())
                    .collect::<Vec<_>>()
            })
            .filter(|(_, value)| *value != 0.)
    }

    /// Dense copy of the matrix
    pub fn to_dense(&self) -> DMatrix<f64> {
        let mut dense = DMatrix::zeros(self.nrows(), self.ncols());
        for (row, col, value) in self.matrix.triplet_iter() {
            dense[(row, col)] += *value;
        }
        dense
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metabolic_model::reaction::ReactionBuilder;

    fn chain() -> Vec<Reaction> {
        vec![
            ReactionBuilder::default()
                .id("r2")
                .substrate("b", 1.)
                .product("c", 2.)
                .build()
                .unwrap(),
            ReactionBuilder::default()
                .id("r1")
                .substrate("a", 1.)
                .product("b", 1.)
                .build()
                .unwrap(),
        ]
    }

    #[test]
    fn columns_and_rows_are_sorted() {
        let reactions = chain();
        let mets = vec!["c".to_string(), "a".to_string(), "b".to_string()];
        let s = StoichiometricMatrix::new(&mets, &reactions);
        assert_eq!(s.metabolite_ids().collect::<Vec<_>>(), vec!["a", "b", "c"]);
        assert_eq!(s.column_ids().collect::<Vec<_>>(), vec!["r1", "r2"]);
        assert_eq!(s.get("b", "r1"), 1.);
        assert_eq!(s.get("b", "r2"), -1.);
        assert_eq!(s.get("c", "r2"), 2.);
        assert_eq!(s.get("a", "r2"), 0.);
        assert_eq!(s.row_nnz("b"), 2);
        assert_eq!(s.row_nnz("a"), 1);
    }

    #[test]
    fn split_columns_have_opposite_signs() {
        let reactions = chain();
        let mets = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        let s = StoichiometricMatrix::new_split(&mets, &reactions);
        assert_eq!(s.ncols(), 4);
        assert_eq!(
            s.column_ids().collect::<Vec<_>>(),
            vec!["r1_f", "r1_b", "r2_f", "r2_b"]
        );
        for met in ["a", "b", "c"] {
            for rxn in ["r1", "r2"] {
                assert_eq!(
                    s.get(met, &format!("{rxn}_f")),
                    -s.get(met, &format!("{rxn}_b"))
                );
            }
        }
    }

    #[test]
    fn dense_copy_matches_entries() {
        let reactions = chain();
        let mets = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        let s = StoichiometricMatrix::new(&mets, &reactions);
        let dense = s.to_dense();
        assert_eq!(dense.nrows(), 3);
        assert_eq!(dense[(0, 0)], -1.);
        assert_eq!(dense[(2, 1)], 2.);
        assert_eq!(s.row("b").len(), 2);
    }
}
