//! Filter path trees.
//!
//! Every filter is a path: the segments of its field name followed by the
//! segments of its lookup (`author__name` + `icontains` gives
//! `author → name → icontains`). Grafting the paths of all filters of a filter
//! set together yields one tree per first segment, whose leaves correspond
//! one-to-one to filters. The schema builder turns these trees into nested
//! input types.

use indexmap::IndexMap;

use crate::filters::Filter;

/// A node of a filter path tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterTreeNode {
    /// The path segment.
    pub name: String,
    /// Child segments, in insertion order.
    pub children: Vec<FilterTreeNode>,
}

impl FilterTreeNode {
    /// Creates a node without children.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            children: Vec::new(),
        }
    }

    /// Returns `true` if the node has no children.
    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    /// The length of the longest path from this node down to a leaf.
    pub fn height(&self) -> usize {
        self.children.iter().map(|c| c.height() + 1).max().unwrap_or(0)
    }

    /// Returns a child by name.
    pub fn child(&self, name: &str) -> Option<&Self> {
        self.children.iter().find(|c| c.name == name)
    }

    /// Builds a linear tree from a sequence of segments.
    ///
    /// # Examples
    ///
    /// ```
    /// use django_rs_filters_engine::tree::FilterTreeNode;
    ///
    /// let tree = FilterTreeNode::sequence_to_tree(&["author", "name", "exact"]).unwrap();
    /// assert_eq!(tree.name, "author");
    /// assert_eq!(tree.height(), 2);
    /// assert!(FilterTreeNode::sequence_to_tree(&[]).is_none());
    /// ```
    pub fn sequence_to_tree(values: &[&str]) -> Option<Self> {
        let (first, rest) = values.split_first()?;
        let mut node = Self::new(*first);
        if let Some(child) = Self::sequence_to_tree(rest) {
            node.children.push(child);
        }
        Some(node)
    }

    /// Grafts a sequence onto this tree.
    ///
    /// Returns `false` if the first segment does not match this node's name.
    /// Missing nodes are appended after existing siblings; a sequence that is
    /// already present leaves the tree unchanged.
    pub fn try_add_sequence(&mut self, values: &[&str]) -> bool {
        let Some((first, rest)) = values.split_first() else {
            return false;
        };
        if self.name != *first {
            return false;
        }
        if rest.is_empty() {
            return true;
        }
        if self.children.iter_mut().any(|child| child.try_add_sequence(rest)) {
            return true;
        }
        if let Some(child) = Self::sequence_to_tree(rest) {
            self.children.push(child);
        }
        true
    }

    /// Returns every root-to-leaf path.
    pub fn leaf_paths(&self) -> Vec<Vec<&str>> {
        if self.is_leaf() {
            return vec![vec![self.name.as_str()]];
        }
        self.children
            .iter()
            .flat_map(|child| {
                child.leaf_paths().into_iter().map(|mut path| {
                    path.insert(0, self.name.as_str());
                    path
                })
            })
            .collect()
    }
}

/// Builds the path trees of a filter registry, in registry order.
pub fn filterset_to_trees(filters: &IndexMap<String, Filter>) -> Vec<FilterTreeNode> {
    let mut trees: Vec<FilterTreeNode> = Vec::new();
    for filter in filters.values() {
        let path = filter.path();
        if trees.iter_mut().any(|tree| tree.try_add_sequence(&path)) {
            continue;
        }
        if let Some(tree) = FilterTreeNode::sequence_to_tree(&path) {
            trees.push(tree);
        }
    }
    trees
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filters(specs: &[(&str, &str, &str)]) -> IndexMap<String, Filter> {
        specs
            .iter()
            .map(|(name, field, lookup)| ((*name).to_string(), Filter::new(*field, *lookup)))
            .collect()
    }

    #[test]
    fn test_try_add_sequence() {
        let mut tree = FilterTreeNode::sequence_to_tree(&["name", "exact"]).unwrap();
        assert!(tree.try_add_sequence(&["name", "icontains"]));
        assert!(tree.try_add_sequence(&["name", "exact"]));
        assert!(!tree.try_add_sequence(&["title", "exact"]));
        let names: Vec<&str> = tree.children.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["exact", "icontains"]);
    }

    #[test]
    fn test_filterset_to_trees() {
        let trees = filterset_to_trees(&filters(&[
            ("name", "name", "exact"),
            ("name__lower__icontains", "name", "lower__icontains"),
            ("manager__name", "manager__name", "exact"),
            ("name__icontains", "name", "icontains"),
            ("manager", "manager", "exact"),
        ]));
        assert_eq!(trees.len(), 2);

        let name = &trees[0];
        assert_eq!(name.height(), 2);
        let children: Vec<&str> = name.children.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(children, vec!["exact", "lower", "icontains"]);
        assert_eq!(name.child("lower").unwrap().children[0].name, "icontains");

        let manager = &trees[1];
        assert_eq!(
            manager.leaf_paths(),
            vec![vec!["manager", "name", "exact"], vec!["manager", "exact"]]
        );
    }

    #[test]
    fn test_leaves_match_filters() {
        let registry = filters(&[
            ("a", "a", "exact"),
            ("a__b__gt", "a__b", "gt"),
            ("c__in", "c", "in"),
        ]);
        let trees = filterset_to_trees(&registry);
        let leaf_count: usize = trees.iter().map(|t| t.leaf_paths().len()).sum();
        assert_eq!(leaf_count, registry.len());
    }
}
