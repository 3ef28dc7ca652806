//! WHERE clause trees.
//!
//! [`WhereBuilder`] consumes clause tokens one at a time and inserts them
//! into a priority tree: comparisons and BETWEEN bind tightest (20), then
//! AND (10), then OR (5). Parentheses are kept while building and spliced
//! out when the clause ends.

use itemsql_storage::{ItemData, ItemDataPtr, ItemType, ITEM_ID_ANONY};

use crate::ast::{is_number, parse_number, ColumnBinding, ColumnLeaf, ColumnName, SelectStmt};
use crate::error::{EvalError, ParseError};
use crate::eval::{CompareOperator, ConstantContext, EvalContext, OptimizationResult};
use crate::lexer::{Punct, Token};
use crate::tree::{NodeId, NodeShape, Tree, TreeNode};
use tracing::trace;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WhereOperator {
    Compare(CompareOperator),
    Between,
    And,
    Or,
}

impl WhereOperator {
    pub fn priority(self) -> u8 {
        match self {
            WhereOperator::Compare(_) | WhereOperator::Between => 20,
            WhereOperator::And => 10,
            WhereOperator::Or => 5,
        }
    }

    pub fn symbol(self) -> &'static str {
        match self {
            WhereOperator::Compare(op) => op.symbol(),
            WhereOperator::Between => "BETWEEN",
            WhereOperator::And => "AND",
            WhereOperator::Or => "OR",
        }
    }
}

#[derive(Debug, Clone)]
pub enum WhereNode {
    Column(ColumnLeaf),
    Number(ItemDataPtr),
    String(ItemDataPtr),
    /// Lower and upper bound of a BETWEEN.
    PairedNumber(ItemDataPtr, ItemDataPtr),
    Element(WhereOperator),
    Exists {
        statement: Box<SelectStmt>,
        negated: bool,
    },
    Parenthesis,
}

impl TreeNode for WhereNode {
    fn shape(&self) -> NodeShape {
        match self {
            WhereNode::Element(op) => NodeShape::Binary(op.priority()),
            WhereNode::Parenthesis => NodeShape::Group { removable: true },
            _ => NodeShape::Leaf,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct WhereTree {
    tree: Tree<WhereNode>,
}

impl WhereTree {
    pub fn root(&self) -> Option<NodeId> {
        self.tree.root()
    }

    pub fn node(&self, id: NodeId) -> &WhereNode {
        self.tree.node(id)
    }

    pub fn left(&self, id: NodeId) -> Option<NodeId> {
        self.tree.left(id)
    }

    pub fn right(&self, id: NodeId) -> Option<NodeId> {
        self.tree.right(id)
    }

    /// Terms of the top-level AND chain. A tree without a top-level AND is
    /// a single term.
    pub fn and_terms(&self) -> Vec<NodeId> {
        let mut terms = Vec::new();
        let mut stack: Vec<NodeId> = self.root().into_iter().collect();
        while let Some(id) = stack.pop() {
            match self.node(id) {
                WhereNode::Element(WhereOperator::And) => {
                    stack.extend(self.right(id));
                    stack.extend(self.left(id));
                }
                _ => terms.push(id),
            }
        }
        terms
    }

    /// Column leaf of `id`, if it is one.
    pub fn column(&self, id: NodeId) -> Option<&ColumnLeaf> {
        match self.node(id) {
            WhereNode::Column(leaf) => Some(leaf),
            _ => None,
        }
    }

    /// Literal value of `id`, if it is one.
    pub fn literal(&self, id: NodeId) -> Option<&ItemDataPtr> {
        match self.node(id) {
            WhereNode::Number(value) | WhereNode::String(value) => Some(value),
            _ => None,
        }
    }

    /// EXISTS nodes with their statements, in tree order.
    pub fn exists_nodes(&self) -> impl Iterator<Item = (NodeId, &SelectStmt)> + '_ {
        self.tree.ids().filter_map(|id| match self.node(id) {
            WhereNode::Exists { statement, .. } => Some((id, statement.as_ref())),
            _ => None,
        })
    }

    pub fn columns(&self) -> impl Iterator<Item = &ColumnLeaf> + '_ {
        self.tree.ids().filter_map(|id| self.column(id))
    }

    /// Resolves every column leaf through `resolve`.
    pub fn bind_columns<E, F>(&mut self, mut resolve: F) -> Result<(), E>
    where
        F: FnMut(&ColumnName) -> Result<(ColumnBinding, ItemType), E>,
    {
        let ids: Vec<NodeId> = self.tree.ids().collect();
        for id in ids {
            if let WhereNode::Column(leaf) = self.tree.node_mut(id) {
                let (binding, item_type) = resolve(&leaf.name)?;
                leaf.bind(binding, item_type);
            }
        }
        Ok(())
    }

    /// Converts literals compared against a bound column to the column's
    /// item type, so `id = '5'` on an integer column compares numerically.
    /// A literal the column type cannot hold is left as written and the
    /// comparison decides it at evaluation time.
    pub fn coerce_literals(&mut self) {
        let ids: Vec<NodeId> = self.tree.ids().collect();
        for id in ids {
            let WhereNode::Element(op) = self.node(id) else { continue };
            if !matches!(op, WhereOperator::Compare(_) | WhereOperator::Between) {
                continue;
            }
            let (Some(left), Some(right)) = (self.left(id), self.right(id)) else { continue };
            let (column, literal) = match (self.column_type(left), self.column_type(right)) {
                (Some(item_type), None) => (item_type, right),
                (None, Some(item_type)) => (item_type, left),
                _ => continue,
            };
            let coerced = match self.node(literal) {
                WhereNode::Number(value) => WhereNode::Number(coerce_or_keep(value, column)),
                WhereNode::String(value) => WhereNode::String(coerce_or_keep(value, column)),
                WhereNode::PairedNumber(low, high) => {
                    WhereNode::PairedNumber(coerce_or_keep(low, column), coerce_or_keep(high, column))
                }
                _ => continue,
            };
            *self.tree.node_mut(literal) = coerced;
        }
    }

    fn column_type(&self, id: NodeId) -> Option<ItemType> {
        self.column(id).and_then(|leaf| leaf.item_type)
    }

    /// Decides the clause without reading rows where possible.
    pub fn optimize(&self) -> OptimizationResult {
        match self.root() {
            None => OptimizationResult::always(true),
            Some(root) => self.optimize_node(root),
        }
    }

    fn optimize_node(&self, id: NodeId) -> OptimizationResult {
        match self.node(id) {
            WhereNode::Element(WhereOperator::And) => {
                let (left, right) = self.optimize_children(id);
                if left.is_always_false() || right.is_always_false() {
                    OptimizationResult::always(false)
                } else if left.is_always_true() && right.is_always_true() {
                    OptimizationResult::always(true)
                } else {
                    OptimizationResult::unfixed()
                }
            }
            WhereNode::Element(WhereOperator::Or) => {
                let (left, right) = self.optimize_children(id);
                if left.is_always_true() || right.is_always_true() {
                    OptimizationResult::always(true)
                } else if left.is_always_false() && right.is_always_false() {
                    OptimizationResult::always(false)
                } else {
                    OptimizationResult::unfixed()
                }
            }
            WhereNode::Element(_) => {
                let constant_operands = [self.left(id), self.right(id)]
                    .into_iter()
                    .flatten()
                    .all(|child| {
                        matches!(
                            self.node(child),
                            WhereNode::Number(_) | WhereNode::String(_) | WhereNode::PairedNumber(..)
                        )
                    });
                if !constant_operands {
                    return OptimizationResult::unfixed();
                }
                match self.evaluate_node(id, &ConstantContext) {
                    Ok(outcome) => OptimizationResult::always(outcome),
                    Err(_) => OptimizationResult::unfixed(),
                }
            }
            WhereNode::Number(value) | WhereNode::String(value) => {
                OptimizationResult::constant(value.clone())
            }
            WhereNode::Parenthesis => match self.left(id) {
                Some(child) => self.optimize_node(child),
                None => OptimizationResult::unfixed(),
            },
            WhereNode::Column(_) | WhereNode::PairedNumber(..) | WhereNode::Exists { .. } => {
                OptimizationResult::unfixed()
            }
        }
    }

    fn optimize_children(&self, id: NodeId) -> (OptimizationResult, OptimizationResult) {
        let optimize = |child: Option<NodeId>| match child {
            Some(child) => self.optimize_node(child),
            None => OptimizationResult::unfixed(),
        };
        (optimize(self.left(id)), optimize(self.right(id)))
    }

    /// Evaluates the clause for the row exposed by `ctx`. An empty clause
    /// is true.
    pub fn evaluate(&self, ctx: &dyn EvalContext) -> Result<bool, EvalError> {
        match self.root() {
            None => Ok(true),
            Some(root) => self.evaluate_node(root, ctx),
        }
    }

    fn evaluate_node(&self, id: NodeId, ctx: &dyn EvalContext) -> Result<bool, EvalError> {
        match self.node(id) {
            WhereNode::Element(WhereOperator::And) => {
                Ok(self.evaluate_child(self.left(id), ctx)? && self.evaluate_child(self.right(id), ctx)?)
            }
            WhereNode::Element(WhereOperator::Or) => {
                Ok(self.evaluate_child(self.left(id), ctx)? || self.evaluate_child(self.right(id), ctx)?)
            }
            WhereNode::Element(WhereOperator::Between) => {
                let value = self.value_of(self.left(id), ctx)?;
                let Some(WhereNode::PairedNumber(low, high)) = self.right(id).map(|r| self.node(r)) else {
                    return Err(EvalError::NotPredicate);
                };
                Ok(CompareOperator::GreaterEqual.test(&value, low)?
                    && CompareOperator::LessEqual.test(&value, high)?)
            }
            WhereNode::Element(WhereOperator::Compare(op)) => {
                let left = self.value_of(self.left(id), ctx)?;
                let right = self.value_of(self.right(id), ctx)?;
                op.test(&left, &right)
            }
            WhereNode::Exists { negated, .. } => Ok(ctx.exists(id)? != *negated),
            WhereNode::Parenthesis => self.evaluate_child(self.left(id), ctx),
            _ => Err(EvalError::NotPredicate),
        }
    }

    fn evaluate_child(&self, child: Option<NodeId>, ctx: &dyn EvalContext) -> Result<bool, EvalError> {
        match child {
            Some(child) => self.evaluate_node(child, ctx),
            None => Err(EvalError::NotPredicate),
        }
    }

    fn value_of(&self, id: Option<NodeId>, ctx: &dyn EvalContext) -> Result<ItemDataPtr, EvalError> {
        let id = id.ok_or(EvalError::NotPredicate)?;
        match self.node(id) {
            WhereNode::Column(leaf) => {
                let binding = leaf
                    .binding
                    .ok_or_else(|| EvalError::UnboundColumn(leaf.name.to_string()))?;
                ctx.column(binding)
            }
            WhereNode::Number(value) | WhereNode::String(value) => Ok(value.clone()),
            _ => Err(EvalError::NotPredicate),
        }
    }

    fn check_predicate(&self, id: NodeId) -> Result<(), ParseError> {
        let value_operand = |child: Option<NodeId>| {
            matches!(
                child.map(|c| self.node(c)),
                Some(WhereNode::Column(_) | WhereNode::Number(_) | WhereNode::String(_))
            )
        };
        match self.node(id) {
            WhereNode::Element(WhereOperator::And | WhereOperator::Or) => {
                for child in [self.left(id), self.right(id)] {
                    let child = child.ok_or(ParseError::MalformedTree("missing operand"))?;
                    self.check_predicate(child)?;
                }
                Ok(())
            }
            WhereNode::Element(WhereOperator::Compare(_)) => {
                if value_operand(self.left(id)) && value_operand(self.right(id)) {
                    Ok(())
                } else {
                    Err(ParseError::MalformedTree("comparison operands must be values"))
                }
            }
            WhereNode::Element(WhereOperator::Between) => {
                let bounds = self.right(id).map(|r| self.node(r));
                if value_operand(self.left(id)) && matches!(bounds, Some(WhereNode::PairedNumber(..))) {
                    Ok(())
                } else {
                    Err(ParseError::MalformedBetween("operand must be a value".to_string()))
                }
            }
            WhereNode::Exists { .. } => Ok(()),
            _ => Err(ParseError::MalformedTree("expected a condition")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Operand,
    Operator,
    BetweenLow,
    BetweenAnd,
    BetweenHigh,
    AfterNot,
}

/// Streaming WHERE parser.
#[derive(Debug)]
pub struct WhereBuilder {
    tree: Tree<WhereNode>,
    state: State,
    negative: bool,
    between_low: Option<ItemDataPtr>,
}

impl Default for WhereBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl WhereBuilder {
    pub fn new() -> Self {
        Self {
            tree: Tree::new(),
            state: State::Operand,
            negative: false,
            between_low: None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.tree.is_empty() && self.state == State::Operand
    }

    /// True when an `EXISTS (...)` may come next.
    pub fn expects_subquery(&self) -> bool {
        matches!(self.state, State::Operand | State::AfterNot) && !self.negative
    }

    pub fn push_exists(&mut self, statement: SelectStmt) -> Result<(), ParseError> {
        let negated = self.state == State::AfterNot;
        self.tree.push_operand(WhereNode::Exists {
            statement: Box::new(statement),
            negated,
        })?;
        self.state = State::Operator;
        Ok(())
    }

    pub fn push(&mut self, token: Token) -> Result<(), ParseError> {
        match self.state {
            State::Operand => self.push_operand(token),
            State::Operator => self.push_operator(token),
            State::BetweenLow => {
                if let Some(low) = self.literal(&token)? {
                    self.between_low = Some(low);
                    self.state = State::BetweenAnd;
                }
                Ok(())
            }
            State::BetweenAnd => {
                if !token.is_keyword("and") {
                    return Err(ParseError::MalformedBetween(format!("expected AND, found '{token}'")));
                }
                self.state = State::BetweenHigh;
                Ok(())
            }
            State::BetweenHigh => {
                if let Some(high) = self.literal(&token)? {
                    let low = self
                        .between_low
                        .take()
                        .ok_or_else(|| ParseError::MalformedBetween("missing lower bound".to_string()))?;
                    self.tree.push_operand(WhereNode::PairedNumber(low, high))?;
                    self.state = State::Operator;
                }
                Ok(())
            }
            State::AfterNot => Err(ParseError::UnexpectedToken(format!("NOT {token}"))),
        }
    }

    fn push_operand(&mut self, token: Token) -> Result<(), ParseError> {
        match &token {
            Token::Punct(Punct::LeftParen) if !self.negative => {
                self.tree.push_operand(WhereNode::Parenthesis)?;
            }
            Token::Word(word) if word.eq_ignore_ascii_case("not") && !self.negative => {
                self.state = State::AfterNot;
            }
            Token::Word(word) if !is_number(word) && !self.negative => {
                let leaf = ColumnLeaf::new(ColumnName::parse(word)?);
                self.tree.push_operand(WhereNode::Column(leaf))?;
                self.state = State::Operator;
            }
            _ => {
                if let Some(value) = self.literal(&token)? {
                    let node = match token {
                        Token::Quoted(_) => WhereNode::String(value),
                        _ => WhereNode::Number(value),
                    };
                    self.tree.push_operand(node)?;
                    self.state = State::Operator;
                }
            }
        }
        Ok(())
    }

    fn push_operator(&mut self, token: Token) -> Result<(), ParseError> {
        let op = match &token {
            Token::Punct(Punct::Eq) => WhereOperator::Compare(CompareOperator::Equal),
            Token::Punct(Punct::NotEq) => WhereOperator::Compare(CompareOperator::NotEqual),
            Token::Punct(Punct::Lt) => WhereOperator::Compare(CompareOperator::Less),
            Token::Punct(Punct::LtEq) => WhereOperator::Compare(CompareOperator::LessEqual),
            Token::Punct(Punct::Gt) => WhereOperator::Compare(CompareOperator::Greater),
            Token::Punct(Punct::GtEq) => WhereOperator::Compare(CompareOperator::GreaterEqual),
            Token::Punct(Punct::RightParen) => {
                self.tree.close_group(false)?;
                return Ok(());
            }
            token if token.is_keyword("between") => WhereOperator::Between,
            token if token.is_keyword("and") => WhereOperator::And,
            token if token.is_keyword("or") => WhereOperator::Or,
            _ => return Err(ParseError::UnexpectedToken(token.to_string())),
        };
        self.tree.push_operator(WhereNode::Element(op))?;
        self.state = if op == WhereOperator::Between {
            State::BetweenLow
        } else {
            State::Operand
        };
        Ok(())
    }

    /// Reads a literal. A leading minus is remembered and yields `None`.
    fn literal(&mut self, token: &Token) -> Result<Option<ItemDataPtr>, ParseError> {
        let negative = std::mem::take(&mut self.negative);
        match token {
            Token::Punct(Punct::Minus) if !negative => {
                self.negative = true;
                Ok(None)
            }
            Token::Word(word) if is_number(word) => parse_number(word, negative).map(Some),
            Token::Quoted(text) if !negative => Ok(Some(ItemData::string(ITEM_ID_ANONY, text.as_str()))),
            _ if matches!(self.state, State::BetweenLow | State::BetweenHigh) => Err(
                ParseError::MalformedBetween(format!("expected a literal, found '{token}'")),
            ),
            _ => Err(ParseError::UnexpectedToken(token.to_string())),
        }
    }

    pub fn finish(self) -> Result<WhereTree, ParseError> {
        match self.state {
            State::Operand | State::AfterNot if self.tree.is_empty() => {
                return Err(ParseError::EmptyClause("WHERE"));
            }
            State::Operand | State::AfterNot => return Err(ParseError::UnexpectedEnd("WHERE")),
            State::BetweenLow | State::BetweenAnd | State::BetweenHigh => {
                return Err(ParseError::MalformedBetween("incomplete range".to_string()));
            }
            State::Operator => {}
        }
        self.tree.finish()?;
        let mut tree = self.tree;
        tree.remove_parenthesis();
        let where_tree = WhereTree { tree };
        if let Some(root) = where_tree.root() {
            where_tree.check_predicate(root)?;
        }
        Ok(where_tree)
    }
}

fn coerce_or_keep(value: &ItemDataPtr, target: ItemType) -> ItemDataPtr {
    match ItemData::coerce(value, target) {
        Ok(coerced) => coerced,
        Err(err) => {
            trace!(%value, ?target, error = %err, "literal kept uncoerced");
            ItemDataPtr::clone(value)
        }
    }
}
