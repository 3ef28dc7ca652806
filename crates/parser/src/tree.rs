//! Arena-backed expression tree built by priority insertion.
//!
//! Tokens arrive left to right. An operand attaches to the operator (or open
//! group) waiting for it. A binary operator climbs from the last completed
//! node while the parent binds at least as tightly, then takes that subtree
//! as its left child. Open groups stop the climb, so a parenthesis or a
//! function call acts as a barrier until it is closed.

use crate::error::ParseError;

pub type NodeId = usize;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeShape {
    Leaf,
    /// Higher priority binds tighter.
    Binary(u8),
    /// A node holding one child between parentheses. Removable groups are
    /// pure parentheses that disappear once the tree is complete.
    Group { removable: bool },
}

pub trait TreeNode {
    fn shape(&self) -> NodeShape;
}

#[derive(Debug, Clone)]
struct Slot<N> {
    node: N,
    parent: Option<NodeId>,
    left: Option<NodeId>,
    right: Option<NodeId>,
    open: bool,
    removed: bool,
}

#[derive(Debug, Clone)]
pub struct Tree<N> {
    slots: Vec<Slot<N>>,
    root: Option<NodeId>,
    last: Option<NodeId>,
}

impl<N> Default for Tree<N> {
    fn default() -> Self {
        Self {
            slots: Vec::new(),
            root: None,
            last: None,
        }
    }
}

impl<N: TreeNode> Tree<N> {
    pub fn new() -> Self {
        Self::default()
    }

    /// A tree holding only `node`.
    pub fn with_root(node: N) -> Self {
        let mut tree = Self::new();
        let open = matches!(node.shape(), NodeShape::Group { .. });
        let id = tree.alloc(node, None, open);
        tree.root = Some(id);
        tree.last = Some(id);
        tree
    }

    pub fn root(&self) -> Option<NodeId> {
        self.root
    }

    pub fn is_empty(&self) -> bool {
        self.root.is_none()
    }

    pub fn node(&self, id: NodeId) -> &N {
        &self.slots[id].node
    }

    pub fn node_mut(&mut self, id: NodeId) -> &mut N {
        &mut self.slots[id].node
    }

    pub fn left(&self, id: NodeId) -> Option<NodeId> {
        self.slots[id].left
    }

    pub fn right(&self, id: NodeId) -> Option<NodeId> {
        self.slots[id].right
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.slots[id].parent
    }

    /// Live node ids in insertion order.
    pub fn ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, slot)| !slot.removed)
            .map(|(id, _)| id)
    }

    pub fn len(&self) -> usize {
        self.ids().count()
    }

    /// True when the next token must be an operand.
    pub fn awaiting_operand(&self) -> bool {
        match self.last {
            None => true,
            Some(last) => {
                let slot = &self.slots[last];
                match slot.node.shape() {
                    NodeShape::Binary(_) => slot.right.is_none(),
                    NodeShape::Group { .. } => slot.open && slot.left.is_none(),
                    NodeShape::Leaf => false,
                }
            }
        }
    }

    /// The most recently pushed or closed node.
    pub fn last(&self) -> Option<NodeId> {
        self.last
    }

    pub fn push_operand(&mut self, node: N) -> Result<NodeId, ParseError> {
        if !self.awaiting_operand() {
            return Err(ParseError::MalformedTree("operand follows an operand"));
        }
        let open = matches!(node.shape(), NodeShape::Group { .. });
        let parent = self.last;
        let id = self.alloc(node, parent, open);
        match parent {
            None => self.root = Some(id),
            Some(parent) => match self.slots[parent].node.shape() {
                NodeShape::Binary(_) => self.slots[parent].right = Some(id),
                _ => self.slots[parent].left = Some(id),
            },
        }
        self.last = Some(id);
        Ok(id)
    }

    pub fn push_operator(&mut self, node: N) -> Result<NodeId, ParseError> {
        let NodeShape::Binary(priority) = node.shape() else {
            return Err(ParseError::MalformedTree("operator node is not binary"));
        };
        if self.awaiting_operand() {
            return Err(ParseError::MalformedTree("operator is missing its left operand"));
        }
        let Some(mut target) = self.last else {
            return Err(ParseError::MalformedTree("operator is missing its left operand"));
        };
        while let Some(parent) = self.slots[target].parent {
            match self.slots[parent].node.shape() {
                NodeShape::Binary(parent_priority) if priority <= parent_priority => target = parent,
                _ => break,
            }
        }

        let parent = self.slots[target].parent;
        let id = self.alloc(node, parent, false);
        self.slots[id].left = Some(target);
        self.slots[target].parent = Some(id);
        self.replace_child(parent, target, id);
        self.last = Some(id);
        Ok(id)
    }

    /// The innermost group that is still open.
    pub fn innermost_open_group(&self) -> Option<NodeId> {
        let mut cursor = self.last;
        while let Some(id) = cursor {
            if self.slots[id].open {
                return Some(id);
            }
            cursor = self.slots[id].parent;
        }
        None
    }

    /// Closes the innermost open group. An empty group is accepted only
    /// when `allow_empty` is set.
    pub fn close_group(&mut self, allow_empty: bool) -> Result<NodeId, ParseError> {
        let group = self
            .innermost_open_group()
            .ok_or(ParseError::UnbalancedParenthesis)?;
        if self.slots[group].left.is_none() {
            if !allow_empty {
                return Err(ParseError::MalformedTree("empty parenthesis"));
            }
        } else if self.awaiting_operand() {
            return Err(ParseError::MalformedTree("operator is missing its right operand"));
        }
        self.slots[group].open = false;
        self.last = Some(group);
        Ok(group)
    }

    /// Checks that every operator has both operands and every group is
    /// closed.
    pub fn finish(&self) -> Result<(), ParseError> {
        if self.root.is_none() {
            return Ok(());
        }
        if self.innermost_open_group().is_some() || self.slots.iter().any(|slot| slot.open) {
            return Err(ParseError::UnbalancedParenthesis);
        }
        if self.awaiting_operand() {
            return Err(ParseError::MalformedTree("operator is missing its right operand"));
        }
        Ok(())
    }

    /// Splices out removable groups, attaching their child to their parent.
    pub fn remove_parenthesis(&mut self) {
        for id in 0..self.slots.len() {
            let slot = &self.slots[id];
            if slot.removed || slot.node.shape() != (NodeShape::Group { removable: true }) {
                continue;
            }
            let Some(child) = slot.left else { continue };
            let parent = slot.parent;
            self.slots[child].parent = parent;
            self.replace_child(parent, id, child);
            if self.last == Some(id) {
                self.last = Some(child);
            }
            self.slots[id].removed = true;
        }
    }

    /// Turns `id` into a leaf holding `node`, dropping its subtree.
    pub fn replace_with_leaf(&mut self, id: NodeId, node: N) {
        let mut stack: Vec<NodeId> = [self.slots[id].left, self.slots[id].right]
            .into_iter()
            .flatten()
            .collect();
        while let Some(child) = stack.pop() {
            let slot = &mut self.slots[child];
            slot.removed = true;
            stack.extend([slot.left, slot.right].into_iter().flatten());
        }
        let slot = &mut self.slots[id];
        slot.node = node;
        slot.left = None;
        slot.right = None;
        slot.open = false;
    }

    fn alloc(&mut self, node: N, parent: Option<NodeId>, open: bool) -> NodeId {
        self.slots.push(Slot {
            node,
            parent,
            left: None,
            right: None,
            open,
            removed: false,
        });
        self.slots.len() - 1
    }

    fn replace_child(&mut self, parent: Option<NodeId>, old: NodeId, new: NodeId) {
        match parent {
            None => self.root = Some(new),
            Some(parent) => {
                let slot = &mut self.slots[parent];
                if slot.left == Some(old) {
                    slot.left = Some(new);
                } else if slot.right == Some(old) {
                    slot.right = Some(new);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    enum Node {
        Num(i32),
        Op(char, u8),
        Paren,
    }

    impl TreeNode for Node {
        fn shape(&self) -> NodeShape {
            match self {
                Node::Num(_) => NodeShape::Leaf,
                Node::Op(_, priority) => NodeShape::Binary(*priority),
                Node::Paren => NodeShape::Group { removable: true },
            }
        }
    }

    fn render(tree: &Tree<Node>, id: NodeId) -> String {
        match tree.node(id) {
            Node::Num(n) => n.to_string(),
            Node::Op(op, _) => format!(
                "({} {op} {})",
                render(tree, tree.left(id).unwrap()),
                render(tree, tree.right(id).unwrap())
            ),
            Node::Paren => format!("[{}]", render(tree, tree.left(id).unwrap())),
        }
    }

    fn plus() -> Node {
        Node::Op('+', 15)
    }

    fn times() -> Node {
        Node::Op('*', 20)
    }

    #[test]
    fn higher_priority_binds_tighter() {
        let mut tree = Tree::new();
        tree.push_operand(Node::Num(1)).unwrap();
        tree.push_operator(plus()).unwrap();
        tree.push_operand(Node::Num(2)).unwrap();
        tree.push_operator(times()).unwrap();
        tree.push_operand(Node::Num(3)).unwrap();
        tree.finish().unwrap();
        assert_eq!(render(&tree, tree.root().unwrap()), "(1 + (2 * 3))");
    }

    #[test]
    fn equal_priority_is_left_associative() {
        let mut tree = Tree::new();
        for (i, n) in [1, 2, 3].into_iter().enumerate() {
            if i > 0 {
                tree.push_operator(Node::Op('-', 15)).unwrap();
            }
            tree.push_operand(Node::Num(n)).unwrap();
        }
        assert_eq!(render(&tree, tree.root().unwrap()), "((1 - 2) - 3)");
    }

    #[test]
    fn groups_act_as_barriers_and_can_be_removed() {
        let mut tree = Tree::new();
        tree.push_operand(Node::Paren).unwrap();
        tree.push_operand(Node::Num(1)).unwrap();
        tree.push_operator(plus()).unwrap();
        tree.push_operand(Node::Num(2)).unwrap();
        tree.close_group(false).unwrap();
        tree.push_operator(times()).unwrap();
        tree.push_operand(Node::Num(3)).unwrap();
        tree.finish().unwrap();
        assert_eq!(render(&tree, tree.root().unwrap()), "([(1 + 2)] * 3)");

        tree.remove_parenthesis();
        assert_eq!(render(&tree, tree.root().unwrap()), "((1 + 2) * 3)");
        assert_eq!(tree.len(), 5);
    }

    #[test]
    fn misplaced_tokens_are_rejected() {
        let mut tree: Tree<Node> = Tree::new();
        assert!(tree.push_operator(plus()).is_err());
        tree.push_operand(Node::Num(1)).unwrap();
        assert!(tree.push_operand(Node::Num(2)).is_err());
        tree.push_operator(plus()).unwrap();
        assert!(tree.finish().is_err());
        assert_eq!(tree.close_group(false), Err(ParseError::UnbalancedParenthesis));
    }

    #[test]
    fn unclosed_and_empty_groups() {
        let mut tree = Tree::new();
        tree.push_operand(Node::Paren).unwrap();
        assert!(tree.close_group(false).is_err());
        assert_eq!(tree.close_group(true).unwrap(), 0);

        let mut open = Tree::new();
        open.push_operand(Node::Paren).unwrap();
        open.push_operand(Node::Num(1)).unwrap();
        assert_eq!(open.finish(), Err(ParseError::UnbalancedParenthesis));
    }

    #[test]
    fn replace_with_leaf_drops_subtree() {
        let mut tree = Tree::new();
        tree.push_operand(Node::Num(1)).unwrap();
        let op = tree.push_operator(plus()).unwrap();
        tree.push_operand(Node::Num(2)).unwrap();
        tree.replace_with_leaf(op, Node::Num(3));
        assert_eq!(render(&tree, tree.root().unwrap()), "3");
        assert_eq!(tree.len(), 1);
    }

    #[test]
    fn rooted_tree_accepts_an_operator() {
        let mut tree = Tree::with_root(Node::Num(7));
        assert!(!tree.awaiting_operand());
        tree.push_operator(plus()).unwrap();
        tree.push_operand(Node::Num(1)).unwrap();
        assert_eq!(render(&tree, tree.root().unwrap()), "(7 + 1)");
    }
}
