use std::collections::HashSet;
use std::{fs, path::Path};

use thiserror::Error;

use super::node::{Node, NodeError};
use super::{EdgeLength, NodeId};

/// Errors that can occur when reading, writing and manipulating [`Tree`] structs.
#[derive(Error, Debug)]
pub enum TreeError {
    /// The tree is empty and we are trying to do something that requires at least one node
    #[error("This tree is empty.")]
    IsEmpty,
    /// No root node was found in the tree
    #[error("No root node found")]
    RootNotFound,
    /// Some of the leaves in the tree have no name
    #[error("All your leaf nodes must be named.")]
    UnnamedLeaves,
    /// Some of the leaves in the tree share the same name
    #[error("Your leaf names must be unique.")]
    DuplicateLeafNames,
    /// The requested node with index [`NodeId`] does not exist in the tree
    #[error("There is no node with index: {0}")]
    NodeNotFound(NodeId),
    /// The node with index [`NodeId`] could not be compressed
    #[error("Could not compress node {0}, it does not have exactly one parent and one child")]
    CouldNotCompressNode(NodeId),
    /// There was a [`std::io::Error`] when writing the tree to a file
    #[error("Error writing tree to file")]
    IoError(#[from] std::io::Error),
    /// There was a [`NodeError`] when operating on a node
    #[error("Could not operate on Node")]
    NodeError(#[from] NodeError),
}

/// Errors that can occur when parsing newick strings.
#[derive(Error, Debug)]
pub enum NewickParseError {
    /// There is an unclosed bracket in the newick string
    #[error("Missing a closing bracket.")]
    UnclosedBracket,
    /// The newick string is missing a final semi-colon
    #[error("The tree is missing a semi colon at the end.")]
    NoClosingSemicolon,
    /// We encountered a character we did not expect
    #[error("Unexpected character '{0}' at position {1}")]
    UnexpectedCharacter(char, usize),
    /// There was a [`TreeError`] when building a tree from the newick string
    #[error("Problem with building the tree.")]
    TreeError(#[from] TreeError),
    /// There was a [`std::num::ParseFloatError`] when parsing branch lengths
    #[error("Could not parse a branch length")]
    FloatError(#[from] std::num::ParseFloatError),
    /// There was a [`std::io::Error`] when reading a newick file
    #[error("Problem reading file")]
    IoError(#[from] std::io::Error),
}

/// A rooted phylogenetic tree.
///
/// Nodes are stored in a flat arena and refer to each other through
/// [`NodeId`] indices, so parent lookups are O(1) and subtrees can be
/// removed without chasing pointers. Deleted nodes leave holes in the
/// arena and are skipped by all accessors.
#[derive(Debug, Clone)]
pub struct Tree {
    nodes: Vec<Node>,
}

/// Base methods to add and get [`Node`] objects to and from the [`Tree`].
impl Tree {
    /// Create a new empty Tree object
    pub fn new() -> Self {
        Self { nodes: Vec::new() }
    }

    /// Add a new node to the tree.
    pub fn add(&mut self, node: Node) -> NodeId {
        let idx = self.nodes.len();
        let mut node = node;
        node.id = idx;
        self.nodes.push(node);

        idx
    }

    /// Add a child to one of the tree's nodes.
    ///
    /// # Example
    /// ```
    /// use supertree::tree::{Node, Tree};
    ///
    /// // Create the tree and add a root node
    /// let mut tree = Tree::new();
    /// let root_id = tree.add(Node::new());
    ///
    /// // Add children to the root
    /// let left = tree.add_child(Node::new(), root_id, None).unwrap();
    /// let right = tree.add_child(Node::new(), root_id, Some(0.1)).unwrap();
    ///
    /// assert_eq!(tree.get(&root_id).unwrap().children.len(), 2);
    ///
    /// // The depths of child nodes are derived from the parent node
    /// assert_eq!(tree.get(&left).unwrap().get_depth(), 1);
    /// assert_eq!(tree.get(&right).unwrap().parent_edge, Some(0.1));
    /// ```
    pub fn add_child(
        &mut self,
        node: Node,
        parent: NodeId,
        edge: Option<EdgeLength>,
    ) -> Result<NodeId, TreeError> {
        if parent >= self.nodes.len() {
            return Err(TreeError::NodeNotFound(parent));
        }

        let mut node = node;

        node.set_parent(parent, edge);
        node.set_depth(self.get(&parent)?.depth + 1);

        let id = self.add(node);

        self.get_mut(&id)?.set_id(id);
        self.get_mut(&parent)?.add_child(id);

        Ok(id)
    }

    /// Get a reference to a specific Node of the tree
    pub fn get(&self, id: &NodeId) -> Result<&Node, TreeError> {
        if *id >= self.nodes.len() {
            return Err(TreeError::NodeNotFound(*id));
        }
        let node = &self.nodes[*id];
        if node.deleted {
            return Err(TreeError::NodeNotFound(*id));
        }

        Ok(node)
    }

    /// Get a mutable reference to a specific Node of the tree
    pub fn get_mut(&mut self, id: &NodeId) -> Result<&mut Node, TreeError> {
        if *id >= self.nodes.len() {
            return Err(TreeError::NodeNotFound(*id));
        }
        let node = &mut self.nodes[*id];
        if node.deleted {
            return Err(TreeError::NodeNotFound(*id));
        }

        Ok(node)
    }

    /// Get a reference to a node in the tree by name.
    /// If several nodes match the name, the first match in the arena is returned.
    pub fn get_by_name(&self, name: &str) -> Option<&Node> {
        self.nodes
            .iter()
            .find(|node| !node.deleted && node.name.as_deref() == Some(name))
    }

    /// Gets the root node of the tree.
    pub fn get_root(&self) -> Result<NodeId, TreeError> {
        self.nodes
            .iter()
            .filter(|&node| !node.deleted && node.parent.is_none())
            .map(|node| node.id)
            .next()
            .ok_or(TreeError::RootNotFound)
    }

    /// Returns a [`Vec`] containing the Node IDs of leaf nodes of the tree
    pub fn get_leaves(&self) -> Vec<NodeId> {
        self.nodes
            .iter()
            .filter(|&node| !node.deleted && node.is_tip())
            .map(|node| node.id)
            .collect()
    }

    /// Returns the set of tip names of the tree.
    /// ```
    /// use supertree::tree::Tree;
    ///
    /// let tree = Tree::from_newick("((A,B),C);").unwrap();
    /// let names = tree.tip_names();
    ///
    /// assert_eq!(names.len(), 3);
    /// assert!(names.contains("A") && names.contains("B") && names.contains("C"));
    /// ```
    pub fn tip_names(&self) -> HashSet<String> {
        self.get_leaves()
            .iter()
            .filter_map(|id| self.nodes[*id].name.clone())
            .collect()
    }

    /// Gets the IDs of the sibling nodes of the specified node.
    pub fn siblings(&self, node: &NodeId) -> Result<Vec<NodeId>, TreeError> {
        match self.get(node)?.parent {
            None => Ok(vec![]),
            Some(parent) => Ok(self
                .get(&parent)?
                .children
                .iter()
                .copied()
                .filter(|id| id != node)
                .collect()),
        }
    }

    /// Gets the node ids of all the nodes in the subtree rooted at the specified node
    pub fn get_subtree(&self, root: &NodeId) -> Result<Vec<NodeId>, TreeError> {
        let mut indices = vec![*root];

        for child in self.get(root)?.children.iter() {
            indices.extend(self.get_subtree(child)?);
        }

        Ok(indices)
    }

    /// Gets the node ids of all the leaves in the subtree rooted at the specified node
    pub fn get_subtree_leaves(&self, root: &NodeId) -> Result<Vec<NodeId>, TreeError> {
        Ok(self
            .get_subtree(root)?
            .into_iter()
            .filter(|id| self.nodes[*id].is_tip())
            .collect())
    }

    /// Returns the tip names in the subtree rooted at the specified node.
    pub fn subtree_tip_names(&self, root: &NodeId) -> Result<HashSet<String>, TreeError> {
        Ok(self
            .get_subtree_leaves(root)?
            .iter()
            .filter_map(|id| self.nodes[*id].name.clone())
            .collect())
    }
}

/// Methods to traverse the [`Tree`]
impl Tree {
    /// Returns a vector containing node ids in the same order as the
    /// [preorder](https://en.wikipedia.org/wiki/Tree_traversal#Pre-order,_NLR) tree traversal
    pub fn preorder(&self, root: &NodeId) -> Result<Vec<NodeId>, TreeError> {
        let mut indices = vec![*root];
        for child in self.get(root)?.children.iter() {
            indices.extend(self.preorder(child)?)
        }

        Ok(indices)
    }

    /// Returns a vector containing node ids in the same order as the
    /// [postorder](https://en.wikipedia.org/wiki/Tree_traversal#Post-order,_LRN) tree traversal
    /// ```
    /// use supertree::tree::Tree;
    ///
    /// let tree = Tree::from_newick("((A,(C,E)D)B,G)F;").unwrap();
    /// let postorder: Vec<_> = tree.postorder(&tree.get_root().unwrap())
    ///     .unwrap()
    ///     .iter()
    ///     .filter_map(|id| tree.get(id).unwrap().name.clone())
    ///     .collect();
    ///
    /// assert_eq!(postorder, vec!["A", "C", "E", "D", "B", "G", "F"])
    /// ```
    pub fn postorder(&self, root: &NodeId) -> Result<Vec<NodeId>, TreeError> {
        let mut indices = vec![];
        for child in self.get(root)?.children.iter() {
            indices.extend(self.postorder(child)?)
        }
        indices.push(*root);

        Ok(indices)
    }

    /// Returns the ids of the internal nodes of the tree, excluding the root,
    /// in postorder. Each of these corresponds to one internal edge of the
    /// tree (between the node and its parent).
    pub fn internal_nodes(&self) -> Result<Vec<NodeId>, TreeError> {
        let root = self.get_root()?;
        Ok(self
            .postorder(&root)?
            .into_iter()
            .filter(|id| *id != root && !self.nodes[*id].is_tip())
            .collect())
    }
}

/// Methods that compute characteristics of the [`Tree`]
impl Tree {
    /// Returns the number of non-deleted nodes in the tree
    pub fn size(&self) -> usize {
        self.nodes.iter().filter(|node| !node.deleted).count()
    }

    /// Returns the number of leaves in the tree
    pub fn n_leaves(&self) -> usize {
        self.nodes
            .iter()
            .filter(|&node| !node.deleted && node.is_tip())
            .count()
    }

    /// Checks that all tips are named and that no two tips share a name.
    pub fn has_unique_tip_names(&self) -> Result<bool, TreeError> {
        let mut names = HashSet::new();
        for id in self.get_leaves() {
            match &self.nodes[id].name {
                Some(name) => {
                    names.insert(name.clone());
                }
                None => return Err(TreeError::UnnamedLeaves),
            }
        }

        Ok(names.len() == self.n_leaves())
    }
}

/// Methods to alter the structure of the [`Tree`]
impl Tree {
    /// Remove the subtree rooted at the specified node.
    pub fn prune(&mut self, root: &NodeId) -> Result<(), TreeError> {
        for child in self.get(root)?.children.clone() {
            self.prune(&child)?
        }

        if let Some(parent) = self.get(root)?.parent {
            self.get_mut(&parent)?.remove_child(root)?;
        }

        self.get_mut(root)?.delete();

        Ok(())
    }

    /// Remove a leaf node. Internal nodes left childless by the removal are
    /// removed as well, all the way up.
    fn remove_leaf(&mut self, id: &NodeId) -> Result<(), TreeError> {
        let parent = self.get(id)?.parent;
        self.get_mut(id)?.delete();

        if let Some(parent) = parent {
            self.get_mut(&parent)?.remove_child(id)?;
            if self.get(&parent)?.children.is_empty() {
                self.remove_leaf(&parent)?;
            }
        }

        Ok(())
    }

    // Splices out a node with exactly one parent and one child
    fn compress_node(&mut self, id: &NodeId) -> Result<(), TreeError> {
        let node = self.get(id)?;

        if node.parent.is_none() || node.children.len() != 1 {
            return Err(TreeError::CouldNotCompressNode(*id));
        }

        let parent = node.parent.unwrap();
        let child = node.children[0];
        let to_remove = node.id;

        let parent_edge = node.parent_edge;
        let child_edge = self.get(&child)?.parent_edge;

        // Fuse the two branches; a missing length on either side degrades
        // to the other one so topology-only trees stay valid
        let new_edge = match (parent_edge, child_edge) {
            (Some(p), Some(c)) => Some(p + c),
            (one, None) => one,
            (None, other) => other,
        };

        self.get_mut(&child)?.set_parent(parent, new_edge);
        self.get_mut(&parent)?.add_child(child);
        self.get_mut(&parent)?.remove_child(&to_remove)?;

        self.get_mut(&to_remove)?.delete();

        Ok(())
    }

    /// Compress the tree (i.e. remove nodes with exactly 1 parent and 1 child
    /// and fuse branches together)
    /// ```
    /// use supertree::tree::Tree;
    ///
    /// let mut tree = Tree::from_newick("((A,(C,E)D)B,((H)I)G)F;").unwrap();
    /// // Compress F->G->I->H to F->H
    /// tree.compress().unwrap();
    ///
    /// assert_eq!(tree.to_newick().unwrap(), "((A,(C,E)D)B,H)F;")
    /// ```
    pub fn compress(&mut self) -> Result<(), TreeError> {
        let to_compress: Vec<_> = self
            .nodes
            .iter()
            .filter(|node| !node.deleted && node.parent.is_some() && node.children.len() == 1)
            .map(|node| node.id)
            .collect();

        for id in to_compress {
            self.compress_node(&id)?;
        }

        Ok(())
    }

    /// Removes the names of all internal nodes, keeping only tip names.
    pub fn strip_internal_names(&mut self) {
        for node in self.nodes.iter_mut() {
            if !node.deleted && !node.is_tip() {
                node.name = None;
            }
        }
    }

    // recursive implementation of depth recomputation
    fn reset_depth_impl(&mut self, root: &NodeId, depth: usize) -> Result<(), TreeError> {
        self.get_mut(root)?.set_depth(depth);

        for child in self.get(root)?.children.clone() {
            self.reset_depth_impl(&child, depth + 1)?
        }

        Ok(())
    }

    /// Recompute node depths and set them correctly.
    pub fn reset_depths(&mut self) -> Result<(), TreeError> {
        let root = self.get_root()?;
        self.reset_depth_impl(&root, 0)
    }

    /// Returns the tree induced on a subset of its tips: tips outside the
    /// subset are removed, childless internal nodes are cleaned up and
    /// single-child chains are fused. Returns `None` when no tip of the tree
    /// belongs to the subset.
    /// ```
    /// use std::collections::HashSet;
    /// use supertree::tree::Tree;
    ///
    /// let tree = Tree::from_newick("((A,B),(C,(D,E)));").unwrap();
    /// let taxa: HashSet<String> = ["A", "D", "E"].iter().map(|s| s.to_string()).collect();
    ///
    /// let induced = tree.induced(&taxa).unwrap().unwrap();
    /// assert_eq!(induced.to_newick().unwrap(), "(A,(D,E));");
    /// ```
    pub fn induced(&self, taxa: &HashSet<String>) -> Result<Option<Tree>, TreeError> {
        let mut tree = self.clone();

        let to_remove: Vec<NodeId> = tree
            .get_leaves()
            .into_iter()
            .filter(|id| match &tree.nodes[*id].name {
                Some(name) => !taxa.contains(name),
                None => true,
            })
            .collect();

        if to_remove.len() == tree.n_leaves() {
            return Ok(None);
        }

        for id in to_remove {
            tree.remove_leaf(&id)?;
        }

        tree.compress()?;

        // The old root may be left with a single child, promote that child
        let mut root = tree.get_root()?;
        while tree.get(&root)?.children.len() == 1 {
            let child = tree.get(&root)?.children[0];
            let child_node = tree.get_mut(&child)?;
            child_node.parent = None;
            child_node.parent_edge = None;
            tree.get_mut(&root)?.delete();
            root = child;
        }

        tree.reset_depths()?;

        Ok(Some(tree))
    }

    /// Copies the subtree of `src` rooted at `src_node` into this tree,
    /// attached below `parent`. Node names and branch lengths are carried
    /// over, node ids are not.
    pub fn graft(
        &mut self,
        parent: NodeId,
        src: &Tree,
        src_node: &NodeId,
    ) -> Result<NodeId, TreeError> {
        let src_n = src.get(src_node)?;

        let mut node = Node::new();
        node.name = src_n.name.clone();

        let id = self.add_child(node, parent, src_n.parent_edge)?;
        for child in src_n.children.iter() {
            self.graft(id, src, child)?;
        }

        Ok(id)
    }
}

/// Methods to read and write [`Tree`] objects to and from strings and files.
impl Tree {
    /// Generate newick representation of tree
    fn to_newick_impl(&self, root: &NodeId) -> Result<String, TreeError> {
        let node = self.get(root)?;
        if node.children.is_empty() {
            Ok(node.to_newick())
        } else {
            let children: Result<Vec<_>, _> = node
                .children
                .iter()
                .map(|child| self.to_newick_impl(child))
                .collect();

            Ok("(".to_string() + &children?.join(",") + ")" + &node.to_newick())
        }
    }

    /// Writes the tree as a newick formatted string
    /// # Example
    /// ```
    /// use supertree::tree::Tree;
    ///
    /// let newick = "(A:0.1,B:0.2,(C:0.3,D:0.4)E:0.5)F;";
    /// let tree = Tree::from_newick(newick).unwrap();
    ///
    /// assert_eq!(tree.to_newick().unwrap(), newick);
    /// ```
    pub fn to_newick(&self) -> Result<String, TreeError> {
        let root = self.get_root()?;
        Ok(self.to_newick_impl(&root)? + ";")
    }

    /// Read a newick formatted string and build a [`Tree`] struct from it.
    /// # Example
    /// ```
    /// use supertree::tree::Tree;
    ///
    /// let newick = "(A:0.1,B:0.2,(C:0.3,D:0.4)E:0.5)F;";
    /// let tree = Tree::from_newick(newick).unwrap();
    ///
    /// assert_eq!(tree.size(), 6);
    /// assert_eq!(tree.n_leaves(), 4);
    /// ```
    pub fn from_newick(newick: &str) -> Result<Self, NewickParseError> {
        let chars: Vec<char> = newick.chars().collect();
        let mut tree = Tree::new();
        let mut pos = 0;

        Self::skip_separators(&chars, &mut pos);
        Self::parse_subtree(&chars, &mut pos, &mut tree, None)?;
        Self::skip_separators(&chars, &mut pos);

        if pos >= chars.len() || chars[pos] != ';' {
            return Err(NewickParseError::NoClosingSemicolon);
        }

        Ok(tree)
    }

    // Skips whitespace and bracketed comments
    fn skip_separators(chars: &[char], pos: &mut usize) {
        loop {
            while *pos < chars.len() && chars[*pos].is_whitespace() {
                *pos += 1;
            }
            if *pos < chars.len() && chars[*pos] == '[' {
                while *pos < chars.len() && chars[*pos] != ']' {
                    *pos += 1;
                }
                if *pos < chars.len() {
                    *pos += 1; // closing bracket
                }
                continue;
            }
            break;
        }
    }

    // Parses one subtree: an optional parenthesized child list followed by
    // an optional label and an optional branch length
    fn parse_subtree(
        chars: &[char],
        pos: &mut usize,
        tree: &mut Tree,
        parent: Option<NodeId>,
    ) -> Result<NodeId, NewickParseError> {
        let id = match parent {
            None => tree.add(Node::new()),
            Some(parent) => tree.add_child(Node::new(), parent, None)?,
        };

        Self::skip_separators(chars, pos);

        if *pos < chars.len() && chars[*pos] == '(' {
            *pos += 1;
            loop {
                Self::parse_subtree(chars, pos, tree, Some(id))?;
                Self::skip_separators(chars, pos);

                match chars.get(*pos) {
                    Some(',') => *pos += 1,
                    Some(')') => {
                        *pos += 1;
                        break;
                    }
                    Some(&c) => return Err(NewickParseError::UnexpectedCharacter(c, *pos)),
                    None => return Err(NewickParseError::UnclosedBracket),
                }
            }
        }

        Self::skip_separators(chars, pos);

        let name = Self::parse_label(chars, pos);
        if let Some(name) = name {
            tree.get_mut(&id)?.set_name(name);
        }

        Self::skip_separators(chars, pos);

        if *pos < chars.len() && chars[*pos] == ':' {
            *pos += 1;
            Self::skip_separators(chars, pos);
            let length = Self::parse_length(chars, pos)?;
            tree.get_mut(&id)?.parent_edge = Some(length);
        }

        Ok(id)
    }

    // Parses a node label, which may be quoted
    fn parse_label(chars: &[char], pos: &mut usize) -> Option<String> {
        let mut label = String::new();

        if matches!(chars.get(*pos), Some('\'' | '"')) {
            let quote = chars[*pos];
            *pos += 1;
            while *pos < chars.len() && chars[*pos] != quote {
                label.push(chars[*pos]);
                *pos += 1;
            }
            if *pos < chars.len() {
                *pos += 1; // closing quote
            }
        } else {
            while *pos < chars.len() && !matches!(chars[*pos], '(' | ')' | ',' | ':' | ';' | '[') {
                if chars[*pos].is_whitespace() {
                    break;
                }
                label.push(chars[*pos]);
                *pos += 1;
            }
        }

        if label.is_empty() {
            None
        } else {
            Some(label)
        }
    }

    // Parses a branch length
    fn parse_length(chars: &[char], pos: &mut usize) -> Result<EdgeLength, NewickParseError> {
        let mut repr = String::new();
        while *pos < chars.len() && !matches!(chars[*pos], '(' | ')' | ',' | ':' | ';' | '[') {
            if chars[*pos].is_whitespace() {
                break;
            }
            repr.push(chars[*pos]);
            *pos += 1;
        }

        Ok(repr.parse()?)
    }

    /// Writes the tree to a newick file
    pub fn to_file(&self, path: &Path) -> Result<(), TreeError> {
        fs::write(path, self.to_newick()?)?;
        Ok(())
    }

    /// Creates a tree from a newick file
    pub fn from_file(path: &Path) -> Result<Self, NewickParseError> {
        let newick_string = fs::read_to_string(path)?;
        Self::from_newick(&newick_string)
    }
}

impl Default for Tree {
    fn default() -> Self {
        Self::new()
    }
}
