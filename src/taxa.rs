//! Taxon numbering shared by the reference tree and the evaluation trees.
//!
//! Leaf names of the reference tree are sorted alphabetically and numbered
//! `0..n`, so the same taxon always gets the same id no matter in which
//! order a tree lists its leaves.

use crate::error::{QuartetError, Result};
use crate::quartet::{MAX_TAXA, TaxonId};
use crate::tree::IndexedTree;
use std::collections::HashMap;

/// Placeholder id of inner nodes in [`TaxonMap::reference_taxa`].
pub const NO_TAXON: TaxonId = usize::MAX;

#[derive(Debug, Clone)]
pub struct TaxonMap {
    names: Vec<String>,
    ids: HashMap<String, TaxonId>,
}

impl TaxonMap {
    /// Number the leaves of the reference tree.
    ///
    /// # Errors
    /// `UnnamedLeaf`, `DuplicateTaxon`, or `TooManyTaxa` when the ids would
    /// not fit into a packed quartet key.
    pub fn from_reference(tree: &IndexedTree) -> Result<Self> {
        let mut names = tree
            .leaves()
            .iter()
            .map(|&v| tree.name(v).map(str::to_string).ok_or(QuartetError::UnnamedLeaf))
            .collect::<Result<Vec<_>>>()?;
        names.sort();

        if let Some(pair) = names.windows(2).find(|w| w[0] == w[1]) {
            return Err(QuartetError::DuplicateTaxon(pair[0].clone()));
        }
        if names.len() > MAX_TAXA {
            return Err(QuartetError::TooManyTaxa { count: names.len(), max: MAX_TAXA });
        }

        let ids = names.iter().enumerate().map(|(id, name)| (name.clone(), id)).collect();
        Ok(TaxonMap { names, ids })
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn name(&self, id: TaxonId) -> &str {
        &self.names[id]
    }

    pub fn id(&self, name: &str) -> Option<TaxonId> {
        self.ids.get(name).copied()
    }

    /// Taxon id of every node of `tree`; `None` for inner nodes.
    ///
    /// Leaf names are first passed through `translate` (a NEXUS TRANSLATE
    /// table), when one is given.
    ///
    /// # Errors
    /// `UnknownTaxon` for a leaf absent from the reference tree,
    /// `DuplicateTaxon` if a taxon labels two leaves.
    pub fn node_taxa(
        &self,
        tree: &IndexedTree,
        translate: Option<&HashMap<String, String>>,
    ) -> Result<Vec<Option<TaxonId>>> {
        let mut taxa = vec![None; tree.node_count()];
        let mut seen = vec![false; self.len()];
        for &leaf in tree.leaves() {
            let raw = tree.name(leaf).ok_or(QuartetError::UnnamedLeaf)?;
            let name = translate
                .and_then(|t| t.get(raw))
                .map_or(raw, String::as_str);
            let id = self.id(name).ok_or_else(|| QuartetError::UnknownTaxon(name.to_string()))?;
            if std::mem::replace(&mut seen[id], true) {
                return Err(QuartetError::DuplicateTaxon(name.to_string()));
            }
            taxa[leaf] = Some(id);
        }
        Ok(taxa)
    }

    /// Like [`TaxonMap::node_taxa`], flattened for the reference tree:
    /// inner nodes map to [`NO_TAXON`].
    pub fn reference_taxa(&self, tree: &IndexedTree) -> Result<Vec<TaxonId>> {
        let taxa = self.node_taxa(tree, None)?;
        Ok(taxa.into_iter().map(|t| t.unwrap_or(NO_TAXON)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_follow_alphabetical_order() {
        let t = IndexedTree::from_newick("((Human,Chimp),(Gorilla,Orang),Gibbon);").unwrap();
        let taxa = TaxonMap::from_reference(&t).unwrap();
        assert_eq!(taxa.len(), 5);
        assert_eq!(taxa.id("Chimp"), Some(0));
        assert_eq!(taxa.id("Gibbon"), Some(1));
        assert_eq!(taxa.id("Gorilla"), Some(2));
        assert_eq!(taxa.id("Human"), Some(3));
        assert_eq!(taxa.id("Orang"), Some(4));
        assert_eq!(taxa.name(3), "Human");
    }

    #[test]
    fn test_same_ids_across_trees() {
        let reference = IndexedTree::from_newick("((A,B),(C,D),E);").unwrap();
        let other = IndexedTree::from_newick("((E,C),(B,A),D);").unwrap();
        let taxa = TaxonMap::from_reference(&reference).unwrap();
        let mapped = taxa.node_taxa(&other, None).unwrap();
        for &leaf in other.leaves() {
            assert_eq!(mapped[leaf], taxa.id(other.name(leaf).unwrap()));
        }
        assert!(other.inner_nodes().iter().all(|&v| mapped[v].is_none()));
    }

    #[test]
    fn test_unknown_and_duplicate_taxa() {
        let reference = IndexedTree::from_newick("((A,B),(C,D),E);").unwrap();
        let taxa = TaxonMap::from_reference(&reference).unwrap();

        let unknown = IndexedTree::from_newick("((A,B),(C,X),E);").unwrap();
        assert!(matches!(taxa.node_taxa(&unknown, None), Err(QuartetError::UnknownTaxon(n)) if n == "X"));

        let duplicate = IndexedTree::from_newick("((A,B),(C,D),(E,A));").unwrap();
        assert!(matches!(TaxonMap::from_reference(&duplicate), Err(QuartetError::DuplicateTaxon(n)) if n == "A"));
    }

    #[test]
    fn test_translate_table() {
        let reference = IndexedTree::from_newick("((A,B),(C,D),E);").unwrap();
        let taxa = TaxonMap::from_reference(&reference).unwrap();
        let numbered = IndexedTree::from_newick("((1,2),(3,4),5);").unwrap();
        let translate: HashMap<String, String> =
            [("1", "A"), ("2", "B"), ("3", "C"), ("4", "D"), ("5", "E")]
                .into_iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect();
        let mapped = taxa.node_taxa(&numbered, Some(&translate)).unwrap();
        let one = numbered.find_leaf("1").unwrap();
        assert_eq!(mapped[one], Some(0));
    }
}
