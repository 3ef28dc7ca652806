//! SELECT-list formulas.
//!
//! A formula is a priority tree of literals, column variables, arithmetic
//! operators and aggregate functions. Aggregates keep running statistics
//! across `evaluate` calls; the executor resets them at every group
//! boundary so each group reports its own value.

use std::fmt;

use itemsql_storage::{ItemData, ItemDataPtr, ItemKey, ItemType, ITEM_ID_ANONY};
use rustc_hash::FxHashSet;

use crate::ast::{is_number, parse_number, ColumnBinding, ColumnLeaf, ColumnName};
use crate::error::{EvalError, ParseError};
use crate::eval::{ArithmeticOperator, EvalContext, OptimizationResult};
use crate::lexer::{Punct, Token};
use crate::tree::{NodeId, NodeShape, Tree, TreeNode};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregateFunction {
    Count,
    Sum,
    Max,
    Min,
}

impl AggregateFunction {
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "count" => Some(AggregateFunction::Count),
            "sum" => Some(AggregateFunction::Sum),
            "max" => Some(AggregateFunction::Max),
            "min" => Some(AggregateFunction::Min),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            AggregateFunction::Count => "count",
            AggregateFunction::Sum => "sum",
            AggregateFunction::Max => "max",
            AggregateFunction::Min => "min",
        }
    }
}

#[derive(Debug, Clone, Default)]
struct Statistics {
    count: u64,
    accumulated: Option<ItemDataPtr>,
    seen: FxHashSet<ItemKey>,
}

#[derive(Debug, Clone)]
pub struct FunctionCall {
    pub function: AggregateFunction,
    pub distinct: bool,
    /// `COUNT(*)`
    pub star: bool,
    stats: Statistics,
}

impl FunctionCall {
    pub fn new(function: AggregateFunction) -> Self {
        Self {
            function,
            distinct: false,
            star: false,
            stats: Statistics::default(),
        }
    }

    /// Folds the current row's argument into the statistics and returns
    /// the aggregate so far.
    fn accumulate(&mut self, argument: Option<ItemDataPtr>) -> Result<ItemDataPtr, EvalError> {
        let null_type = argument
            .as_ref()
            .map_or(ItemType::Int, |value| value.item_type());
        let value = argument.filter(|value| !value.is_null());
        let first_sighting = match &value {
            Some(value) if self.distinct => self.stats.seen.insert(value.key()),
            _ => true,
        };

        match self.function {
            AggregateFunction::Count => {
                if self.star || (value.is_some() && first_sighting) {
                    self.stats.count += 1;
                }
                Ok(ItemData::uint64(ITEM_ID_ANONY, self.stats.count))
            }
            AggregateFunction::Sum => {
                if let Some(value) = value.filter(|_| first_sighting) {
                    let sum = match self.stats.accumulated.take() {
                        None if value.item_type().is_numeric() => value,
                        None => {
                            return Err(EvalError::NonNumeric {
                                operator: "sum",
                                found: value.item_type(),
                            })
                        }
                        Some(sum) => ArithmeticOperator::Plus.apply(&sum, &value)?,
                    };
                    self.stats.accumulated = Some(sum);
                }
                Ok(self
                    .stats
                    .accumulated
                    .clone()
                    .unwrap_or_else(|| ItemData::null(ITEM_ID_ANONY, null_type)))
            }
            AggregateFunction::Max | AggregateFunction::Min => {
                if let Some(value) = value {
                    let wanted = if self.function == AggregateFunction::Max {
                        std::cmp::Ordering::Greater
                    } else {
                        std::cmp::Ordering::Less
                    };
                    let replace = match &self.stats.accumulated {
                        None => true,
                        Some(current) => value.compare(current)? == Some(wanted),
                    };
                    if replace {
                        self.stats.accumulated = Some(value);
                    }
                }
                Ok(self
                    .stats
                    .accumulated
                    .clone()
                    .unwrap_or_else(|| ItemData::null(ITEM_ID_ANONY, null_type)))
            }
        }
    }
}

#[derive(Debug, Clone)]
pub enum FormulaNode {
    Value(ItemDataPtr),
    Variable(ColumnLeaf),
    Operator(ArithmeticOperator),
    Function(FunctionCall),
    Parenthesis,
}

impl TreeNode for FormulaNode {
    fn shape(&self) -> NodeShape {
        match self {
            FormulaNode::Operator(op) => NodeShape::Binary(op.priority()),
            FormulaNode::Function(_) => NodeShape::Group { removable: false },
            FormulaNode::Parenthesis => NodeShape::Group { removable: true },
            FormulaNode::Value(_) | FormulaNode::Variable(_) => NodeShape::Leaf,
        }
    }
}

enum Step {
    Done(ItemDataPtr),
    Binary(ArithmeticOperator),
    Child,
    Aggregate,
}

#[derive(Debug, Clone, Default)]
pub struct FormulaTree {
    tree: Tree<FormulaNode>,
}

impl FormulaTree {
    /// A formula reading a single column.
    pub fn variable(leaf: ColumnLeaf) -> Self {
        Self {
            tree: Tree::with_root(FormulaNode::Variable(leaf)),
        }
    }

    pub fn root(&self) -> Option<NodeId> {
        self.tree.root()
    }

    pub fn node(&self, id: NodeId) -> &FormulaNode {
        self.tree.node(id)
    }

    /// The column leaf when the whole formula is a plain column reference.
    pub fn as_single_column(&self) -> Option<&ColumnLeaf> {
        match self.root().map(|root| self.node(root)) {
            Some(FormulaNode::Variable(leaf)) => Some(leaf),
            _ => None,
        }
    }

    pub fn has_statistics(&self) -> bool {
        self.tree
            .ids()
            .any(|id| matches!(self.node(id), FormulaNode::Function(_)))
    }

    pub fn reset_statistics(&mut self) {
        let ids: Vec<NodeId> = self.tree.ids().collect();
        for id in ids {
            if let FormulaNode::Function(call) = self.tree.node_mut(id) {
                call.stats = Statistics::default();
            }
        }
    }

    pub fn bind_columns<E, F>(&mut self, mut resolve: F) -> Result<(), E>
    where
        F: FnMut(&ColumnName) -> Result<(ColumnBinding, ItemType), E>,
    {
        let ids: Vec<NodeId> = self.tree.ids().collect();
        for id in ids {
            if let FormulaNode::Variable(leaf) = self.tree.node_mut(id) {
                let (binding, item_type) = resolve(&leaf.name)?;
                leaf.bind(binding, item_type);
            }
        }
        Ok(())
    }

    pub fn columns(&self) -> impl Iterator<Item = &ColumnLeaf> + '_ {
        self.tree.ids().filter_map(|id| match self.node(id) {
            FormulaNode::Variable(leaf) => Some(leaf),
            _ => None,
        })
    }

    /// Folds constant operator subtrees into values.
    pub fn optimize(&mut self) -> OptimizationResult {
        match self.root() {
            None => OptimizationResult::unfixed(),
            Some(root) => self.optimize_node(root),
        }
    }

    fn optimize_node(&mut self, id: NodeId) -> OptimizationResult {
        let op = match self.node(id) {
            FormulaNode::Value(value) => return OptimizationResult::constant(value.clone()),
            FormulaNode::Variable(_) => return OptimizationResult::unfixed(),
            FormulaNode::Function(_) => {
                if let Some(child) = self.tree.left(id) {
                    self.optimize_node(child);
                }
                return OptimizationResult::unfixed();
            }
            FormulaNode::Parenthesis => {
                return match self.tree.left(id) {
                    Some(child) => self.optimize_node(child),
                    None => OptimizationResult::unfixed(),
                };
            }
            FormulaNode::Operator(op) => *op,
        };

        let (Some(left), Some(right)) = (self.tree.left(id), self.tree.right(id)) else {
            return OptimizationResult::unfixed();
        };
        let left = self.optimize_node(left);
        let right = self.optimize_node(right);
        let (Some(a), Some(b)) = (left.value, right.value) else {
            return OptimizationResult::unfixed();
        };
        match op.apply(&a, &b) {
            Ok(folded) => {
                self.tree.replace_with_leaf(id, FormulaNode::Value(folded.clone()));
                OptimizationResult::constant(folded)
            }
            Err(_) => OptimizationResult::unfixed(),
        }
    }

    /// Evaluates the formula for the row exposed by `ctx`, feeding
    /// aggregate statistics. `None` means the formula is empty.
    pub fn evaluate(&mut self, ctx: &dyn EvalContext) -> Result<Option<ItemDataPtr>, EvalError> {
        match self.root() {
            None => Ok(None),
            Some(root) => self.evaluate_node(root, ctx).map(Some),
        }
    }

    fn evaluate_node(&mut self, id: NodeId, ctx: &dyn EvalContext) -> Result<ItemDataPtr, EvalError> {
        let step = match self.node(id) {
            FormulaNode::Value(value) => Step::Done(value.clone()),
            FormulaNode::Variable(leaf) => {
                let binding = leaf
                    .binding
                    .ok_or_else(|| EvalError::UnboundColumn(leaf.name.to_string()))?;
                Step::Done(ctx.column(binding)?)
            }
            FormulaNode::Operator(op) => Step::Binary(*op),
            FormulaNode::Parenthesis => Step::Child,
            FormulaNode::Function(_) => Step::Aggregate,
        };

        let missing = || EvalError::NoData("formula operand".to_string());
        match step {
            Step::Done(value) => Ok(value),
            Step::Binary(op) => {
                let left = self.tree.left(id).ok_or_else(missing)?;
                let right = self.tree.right(id).ok_or_else(missing)?;
                let left = self.evaluate_node(left, ctx)?;
                let right = self.evaluate_node(right, ctx)?;
                op.apply(&left, &right)
            }
            Step::Child => {
                let child = self.tree.left(id).ok_or_else(missing)?;
                self.evaluate_node(child, ctx)
            }
            Step::Aggregate => {
                let argument = match self.tree.left(id) {
                    Some(child) => Some(self.evaluate_node(child, ctx)?),
                    None => None,
                };
                match self.tree.node_mut(id) {
                    FormulaNode::Function(call) => call.accumulate(argument),
                    _ => Err(missing()),
                }
            }
        }
    }

    fn write_node(&self, id: NodeId, parent_priority: u8, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.node(id) {
            FormulaNode::Value(value) => match value.as_str() {
                Some(text) => write!(f, "'{text}'"),
                None => write!(f, "{value}"),
            },
            FormulaNode::Variable(leaf) => write!(f, "{}", leaf.name),
            FormulaNode::Operator(op) => {
                let wrap = op.priority() < parent_priority;
                if wrap {
                    f.write_str("(")?;
                }
                if let Some(left) = self.tree.left(id) {
                    self.write_node(left, op.priority(), f)?;
                }
                write!(f, " {} ", op.symbol())?;
                if let Some(right) = self.tree.right(id) {
                    self.write_node(right, op.priority() + 1, f)?;
                }
                if wrap {
                    f.write_str(")")?;
                }
                Ok(())
            }
            FormulaNode::Function(call) => {
                write!(f, "{}(", call.function.name())?;
                if call.distinct {
                    f.write_str("distinct ")?;
                }
                if call.star {
                    f.write_str("*")?;
                } else if let Some(child) = self.tree.left(id) {
                    self.write_node(child, 0, f)?;
                }
                f.write_str(")")
            }
            FormulaNode::Parenthesis => match self.tree.left(id) {
                Some(child) => self.write_node(child, parent_priority, f),
                None => Ok(()),
            },
        }
    }
}

impl fmt::Display for FormulaTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.root() {
            Some(root) => self.write_node(root, 0, f),
            None => Ok(()),
        }
    }
}

/// Streaming parser for one SELECT-list expression.
#[derive(Debug, Default)]
pub struct FormulaBuilder {
    tree: Tree<FormulaNode>,
    pending_ident: Option<String>,
    negative: bool,
    opened_function: Option<NodeId>,
    depth: usize,
    started: bool,
}

impl FormulaBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// True until the first token arrives.
    pub fn is_empty(&self) -> bool {
        !self.started
    }

    /// Open parentheses and function calls.
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// True when a complete operand ends the input so far, so a following
    /// bare word can only be an alias.
    pub fn accepts_alias(&self) -> bool {
        self.depth == 0
            && !self.negative
            && (self.pending_ident.is_some() || (self.started && !self.tree.awaiting_operand()))
    }

    pub fn push(&mut self, token: Token) -> Result<(), ParseError> {
        self.started = true;
        if let Some(ident) = self.pending_ident.take() {
            if token == Token::Punct(Punct::LeftParen) {
                let function = AggregateFunction::from_name(&ident)
                    .ok_or(ParseError::UnknownFunction(ident))?;
                let id = self.tree.push_operand(FormulaNode::Function(FunctionCall::new(function)))?;
                self.opened_function = Some(id);
                self.depth += 1;
                return Ok(());
            }
            self.push_variable(&ident)?;
        }

        if self.tree.awaiting_operand() {
            self.push_operand(token)
        } else {
            self.push_operator(token)
        }
    }

    fn push_variable(&mut self, ident: &str) -> Result<(), ParseError> {
        let leaf = ColumnLeaf::new(ColumnName::parse(ident)?);
        self.tree.push_operand(FormulaNode::Variable(leaf))?;
        Ok(())
    }

    fn push_operand(&mut self, token: Token) -> Result<(), ParseError> {
        let opened_function = self.opened_function.take();
        let negative = std::mem::take(&mut self.negative);
        let unexpected = |token: &Token| ParseError::UnexpectedToken(token.to_string());

        match &token {
            Token::Word(word) if is_number(word) => {
                let value = parse_number(word, negative)?;
                self.tree.push_operand(FormulaNode::Value(value))?;
                return Ok(());
            }
            _ if negative => return Err(unexpected(&token)),
            _ => {}
        }

        match token {
            Token::Punct(Punct::Minus) => self.negative = true,
            Token::Punct(Punct::LeftParen) => {
                self.tree.push_operand(FormulaNode::Parenthesis)?;
                self.depth += 1;
            }
            Token::Punct(Punct::Star) => {
                let id = opened_function.ok_or_else(|| unexpected(&token))?;
                match self.tree.node_mut(id) {
                    FormulaNode::Function(call) if call.function == AggregateFunction::Count && !call.distinct => {
                        call.star = true;
                    }
                    _ => return Err(unexpected(&token)),
                }
            }
            Token::Word(word) if opened_function.is_some() && word.eq_ignore_ascii_case("distinct") => {
                if let Some(FormulaNode::Function(call)) = opened_function.map(|id| self.tree.node_mut(id)) {
                    call.distinct = true;
                }
            }
            Token::Word(word) if word.eq_ignore_ascii_case("true") || word.eq_ignore_ascii_case("false") => {
                let value = ItemData::bool(ITEM_ID_ANONY, word.eq_ignore_ascii_case("true"));
                self.tree.push_operand(FormulaNode::Value(value))?;
            }
            Token::Word(word) if word.eq_ignore_ascii_case("null") => {
                let value = ItemData::null(ITEM_ID_ANONY, ItemType::String);
                self.tree.push_operand(FormulaNode::Value(value))?;
            }
            Token::Word(word) => self.pending_ident = Some(word),
            Token::Quoted(text) => {
                self.tree
                    .push_operand(FormulaNode::Value(ItemData::string(ITEM_ID_ANONY, text)))?;
            }
            Token::Punct(Punct::RightParen) => self.close(opened_function)?,
            _ => return Err(unexpected(&token)),
        }
        Ok(())
    }

    fn push_operator(&mut self, token: Token) -> Result<(), ParseError> {
        let op = match token {
            Token::Punct(Punct::Plus) => ArithmeticOperator::Plus,
            Token::Punct(Punct::Minus) => ArithmeticOperator::Minus,
            Token::Punct(Punct::Star) => ArithmeticOperator::Multiply,
            Token::Punct(Punct::Slash) => ArithmeticOperator::Divide,
            Token::Punct(Punct::RightParen) => return self.close(None),
            other => return Err(ParseError::UnexpectedToken(other.to_string())),
        };
        self.tree.push_operator(FormulaNode::Operator(op))?;
        Ok(())
    }

    fn close(&mut self, opened_function: Option<NodeId>) -> Result<(), ParseError> {
        let group = self
            .tree
            .innermost_open_group()
            .ok_or(ParseError::UnbalancedParenthesis)?;
        let star = matches!(self.tree.node(group), FormulaNode::Function(call) if call.star);
        if opened_function == Some(group) && !star {
            return Err(ParseError::MalformedTree("function call needs an argument"));
        }
        self.tree.close_group(star)?;
        self.depth -= 1;
        Ok(())
    }

    pub fn finish(mut self) -> Result<FormulaTree, ParseError> {
        if let Some(ident) = self.pending_ident.take() {
            self.push_variable(&ident)?;
        }
        if self.negative || (self.started && self.tree.is_empty()) {
            return Err(ParseError::UnexpectedEnd("expression"));
        }
        self.tree.finish()?;
        let mut tree = self.tree;
        tree.remove_parenthesis();
        Ok(FormulaTree { tree })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::eval::OptimizationKind;
    use crate::lexer::{LexMode, StatementLexer};
    use itemsql_storage::ItemValue;

    fn build(expr: &str) -> Result<FormulaTree, ParseError> {
        let mut lexer = StatementLexer::new(expr);
        let mut builder = FormulaBuilder::new();
        while let Some(token) = lexer.next_token(LexMode::Clause)? {
            builder.push(token)?;
        }
        builder.finish()
    }

    struct Row(Vec<ItemDataPtr>);

    impl EvalContext for Row {
        fn column(&self, binding: ColumnBinding) -> Result<ItemDataPtr, EvalError> {
            Ok(self.0[binding.slot].clone())
        }
    }

    fn bind_first_slot(formula: &mut FormulaTree) {
        formula
            .bind_columns(|_| -> Result<_, ParseError> {
                Ok((ColumnBinding { depth: 0, slot: 0 }, ItemType::Int))
            })
            .unwrap();
    }

    #[test]
    fn arithmetic_precedence_and_text() {
        let formula = build("a + b * 2").unwrap();
        assert_eq!(formula.to_string(), "a + b * 2");
        let grouped = build("(a + b) * 2").unwrap();
        assert_eq!(grouped.to_string(), "(a + b) * 2");
        assert_eq!(build("count(*)").unwrap().to_string(), "count(*)");
        assert_eq!(build("COUNT(DISTINCT h.name)").unwrap().to_string(), "count(distinct h.name)");
    }

    #[test]
    fn constants_fold() {
        let mut formula = build("(1 + 2) * 3").unwrap();
        let result = formula.optimize();
        assert_eq!(result.kind, OptimizationKind::AlwaysConst);
        assert_eq!(result.value.unwrap().value(), &ItemValue::Int(9));
        assert_eq!(formula.to_string(), "9");

        let mut with_column = build("a + 1 * 2").unwrap();
        assert!(!with_column.optimize().is_fixed());
        assert_eq!(with_column.to_string(), "a + 2");
    }

    #[test]
    fn single_column_detection() {
        assert_eq!(
            build("h.name").unwrap().as_single_column().map(|leaf| leaf.name.to_string()),
            Some("h.name".to_string())
        );
        assert!(build("a + 1").unwrap().as_single_column().is_none());
        let variable = FormulaTree::variable(ColumnLeaf::new(ColumnName::new(Some("t"), "id")));
        assert_eq!(variable.as_single_column().map(|leaf| leaf.name.to_string()), Some("t.id".to_string()));
        assert!(build("max(a)").unwrap().has_statistics());
        assert!(!build("a").unwrap().has_statistics());
    }

    #[test]
    fn aggregates_accumulate_until_reset() {
        let mut sum = build("sum(a)").unwrap();
        let mut count = build("count(distinct a)").unwrap();
        let mut max = build("max(a)").unwrap();
        bind_first_slot(&mut sum);
        bind_first_slot(&mut count);
        bind_first_slot(&mut max);

        let mut last = Vec::new();
        for v in [3, 5, 3] {
            let row = Row(vec![ItemData::int(1, v)]);
            last = vec![
                sum.evaluate(&row).unwrap().unwrap().to_string(),
                count.evaluate(&row).unwrap().unwrap().to_string(),
                max.evaluate(&row).unwrap().unwrap().to_string(),
            ];
        }
        assert_eq!(last, vec!["11", "2", "5"]);

        sum.reset_statistics();
        let row = Row(vec![ItemData::int(1, 4)]);
        assert_eq!(sum.evaluate(&row).unwrap().unwrap().to_string(), "4");
    }

    #[test]
    fn aggregates_skip_nulls() {
        let mut count = build("count(a)").unwrap();
        let mut star = build("count(*)").unwrap();
        let mut min = build("min(a)").unwrap();
        bind_first_slot(&mut count);
        let row = Row(vec![ItemData::null(1, ItemType::Int)]);
        assert_eq!(count.evaluate(&row).unwrap().unwrap().to_string(), "0");
        assert_eq!(star.evaluate(&row).unwrap().unwrap().to_string(), "1");
        bind_first_slot(&mut min);
        assert!(min.evaluate(&row).unwrap().unwrap().is_null());
    }

    #[test]
    fn malformed_expressions() {
        assert!(matches!(build("foo(a)"), Err(ParseError::UnknownFunction(_))));
        assert!(matches!(build("sum(*)"), Err(ParseError::UnexpectedToken(_))));
        assert!(matches!(build("count()"), Err(ParseError::MalformedTree(_))));
        assert!(matches!(build("a +"), Err(ParseError::MalformedTree(_))));
        assert!(matches!(build("(a"), Err(ParseError::UnbalancedParenthesis)));
        assert!(matches!(build("a)"), Err(ParseError::UnbalancedParenthesis)));
    }

    #[test]
    fn division_by_zero_surfaces_at_evaluation() {
        let mut formula = build("a / 0").unwrap();
        bind_first_slot(&mut formula);
        let row = Row(vec![ItemData::int(1, 1)]);
        assert_eq!(formula.evaluate(&row), Err(EvalError::DivisionByZero));
    }

    #[test]
    fn negative_literals() {
        let mut formula = build("-2 * 3").unwrap();
        assert_eq!(formula.optimize().value.unwrap().value(), &ItemValue::Int(-6));
    }
}
