/// Section-driven SELECT parser.
///
/// The statement is read one token at a time. Section keywords (`from`,
/// `where`, `group by`, `order by`, `limit`) switch the active section and
/// every other token goes to that section's builder. `group` and `order`
/// only switch when the next token is `by`; otherwise the lexer is rewound
/// and the word is ordinary content.
use crate::ast::*;
use crate::error::ParseError;
use crate::formula::FormulaBuilder;
use crate::lexer::{LexMode, Punct, StatementLexer, Token};
use crate::where_tree::WhereBuilder;
use tracing::trace;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Section {
    Select,
    From,
    Where,
    GroupBy,
    OrderBy,
    Limit,
}

impl Section {
    fn name(self) -> &'static str {
        match self {
            Section::Select => "SELECT",
            Section::From => "FROM",
            Section::Where => "WHERE",
            Section::GroupBy => "GROUP BY",
            Section::OrderBy => "ORDER BY",
            Section::Limit => "LIMIT",
        }
    }

    fn lex_mode(self) -> LexMode {
        match self {
            Section::Select | Section::From | Section::Where => LexMode::Clause,
            Section::GroupBy | Section::OrderBy | Section::Limit => LexMode::List,
        }
    }
}

pub struct SelectParser {
    lexer: StatementLexer,
    section: Section,
    select: SelectListBuilder,
    from: Option<FromBuilder>,
    where_clause: Option<WhereBuilder>,
    group_by: Option<ColumnListBuilder>,
    order_by: Option<OrderByBuilder>,
    limit: Option<LimitBuilder>,
}

impl SelectParser {
    pub fn new(statement: &str) -> Self {
        Self {
            lexer: StatementLexer::new(statement),
            section: Section::Select,
            select: SelectListBuilder::default(),
            from: None,
            where_clause: None,
            group_by: None,
            order_by: None,
            limit: None,
        }
    }

    pub fn parse(mut self) -> Result<SelectStmt, ParseError> {
        match self.lexer.next_token(LexMode::Clause)? {
            Some(token) if token.is_keyword("select") => {}
            _ => return Err(ParseError::MissingSelect),
        }

        while let Some(token) = self.lexer.next_token(self.section.lex_mode())? {
            if let Token::Word(word) = &token {
                if let Some(next) = self.section_keyword(word)? {
                    self.enter(next, &token)?;
                    continue;
                }
            }
            if token == Token::Punct(Punct::Semicolon) {
                if let Some(extra) = self.lexer.next_token(LexMode::Clause)? {
                    return Err(ParseError::UnexpectedToken(extra.to_string()));
                }
                break;
            }
            self.dispatch(token)?;
        }
        self.finish()
    }

    // ── Sections ─────────────────────────────────────────────────────────

    fn section_keyword(&mut self, word: &str) -> Result<Option<Section>, ParseError> {
        let section = match word.to_ascii_lowercase().as_str() {
            "from" => Section::From,
            "where" => Section::Where,
            "limit" => Section::Limit,
            "group" => Section::GroupBy,
            "order" => Section::OrderBy,
            _ => return Ok(None),
        };
        if matches!(section, Section::GroupBy | Section::OrderBy) {
            let saved = self.lexer.position();
            match self.lexer.next_token(self.section.lex_mode())? {
                Some(next) if next.is_keyword("by") => {}
                _ => {
                    self.lexer.restore(saved);
                    return Ok(None);
                }
            }
        }
        Ok(Some(section))
    }

    fn enter(&mut self, next: Section, keyword: &Token) -> Result<(), ParseError> {
        let already_seen = match next {
            Section::Select => true,
            Section::From => self.from.is_some(),
            Section::Where => self.where_clause.is_some(),
            Section::GroupBy => self.group_by.is_some(),
            Section::OrderBy => self.order_by.is_some(),
            Section::Limit => self.limit.is_some(),
        };
        if already_seen {
            return Err(ParseError::DuplicateClause(next.name()));
        }
        if next < self.section {
            return Err(ParseError::UnexpectedToken(keyword.to_string()));
        }
        match next {
            Section::Select => {}
            Section::From => self.from = Some(FromBuilder::default()),
            Section::Where => self.where_clause = Some(WhereBuilder::new()),
            Section::GroupBy => self.group_by = Some(ColumnListBuilder::default()),
            Section::OrderBy => self.order_by = Some(OrderByBuilder::default()),
            Section::Limit => self.limit = Some(LimitBuilder::default()),
        }
        trace!(section = next.name(), "entering section");
        self.section = next;
        Ok(())
    }

    fn dispatch(&mut self, token: Token) -> Result<(), ParseError> {
        let unexpected = || ParseError::UnexpectedToken(token.to_string());
        match self.section {
            Section::Select => self.select.push(token),
            Section::From => self.from.as_mut().ok_or_else(unexpected)?.push(token),
            Section::Where => {
                let exists = token.is_keyword("exists")
                    && self
                        .where_clause
                        .as_ref()
                        .is_some_and(WhereBuilder::expects_subquery);
                if exists {
                    let statement = self.read_subquery()?;
                    self.where_clause
                        .as_mut()
                        .ok_or_else(unexpected)?
                        .push_exists(statement)
                } else {
                    self.where_clause.as_mut().ok_or_else(unexpected)?.push(token)
                }
            }
            Section::GroupBy => self.group_by.as_mut().ok_or_else(unexpected)?.push(token),
            Section::OrderBy => self.order_by.as_mut().ok_or_else(unexpected)?.push(token),
            Section::Limit => self.limit.as_mut().ok_or_else(unexpected)?.push(token),
        }
    }

    fn read_subquery(&mut self) -> Result<SelectStmt, ParseError> {
        match self.lexer.next_token(LexMode::Clause)? {
            Some(Token::Punct(Punct::LeftParen)) => {}
            Some(other) => return Err(ParseError::UnexpectedToken(other.to_string())),
            None => return Err(ParseError::UnexpectedEnd("EXISTS")),
        }
        let inner = self.lexer.read_parenthesized()?;
        trace!(statement = %inner, "parsing EXISTS subquery");
        SelectParser::new(&inner).parse()
    }

    fn finish(self) -> Result<SelectStmt, ParseError> {
        let (distinct, columns) = self.select.finish()?;
        let from = self
            .from
            .ok_or(ParseError::EmptyClause("FROM"))?
            .finish()?;
        Ok(SelectStmt {
            distinct,
            columns,
            from,
            where_clause: self.where_clause.map(WhereBuilder::finish).transpose()?,
            group_by: self.group_by.map(ColumnListBuilder::finish).transpose()?.unwrap_or_default(),
            order_by: self.order_by.map(OrderByBuilder::finish).transpose()?.unwrap_or_default(),
            limit: self.limit.map(LimitBuilder::finish).transpose()?,
        })
    }
}

// ── SELECT list ──────────────────────────────────────────────────────────

#[derive(Debug, Default)]
struct SelectListBuilder {
    columns: Vec<SelectColumn>,
    distinct: bool,
    started: bool,
    current: FormulaBuilder,
    wildcard: Option<Option<String>>,
    table_prefix: Option<String>,
    expect_alias: bool,
    alias: Option<String>,
}

impl SelectListBuilder {
    fn push(&mut self, token: Token) -> Result<(), ParseError> {
        let unexpected = |token: &Token| ParseError::UnexpectedToken(token.to_string());
        if !self.started && token.is_keyword("distinct") {
            self.distinct = true;
            self.started = true;
            return Ok(());
        }
        self.started = true;

        if token == Token::Punct(Punct::Comma) && self.current.depth() == 0 {
            return self.end_column();
        }
        if self.expect_alias {
            return match token {
                Token::Word(alias) | Token::Quoted(alias) => {
                    self.alias = Some(alias);
                    self.expect_alias = false;
                    Ok(())
                }
                other => Err(unexpected(&other)),
            };
        }
        if self.alias.is_some() || self.wildcard.is_some() {
            return Err(unexpected(&token));
        }
        if let Some(table) = self.table_prefix.take() {
            return match token {
                Token::Punct(Punct::Star) => {
                    self.wildcard = Some(Some(table));
                    Ok(())
                }
                other => Err(unexpected(&other)),
            };
        }

        match token {
            Token::Punct(Punct::Star) if self.current.is_empty() => self.wildcard = Some(None),
            Token::Word(word) if self.current.is_empty() && word.len() > 1 && word.ends_with('.') => {
                self.table_prefix = Some(word[..word.len() - 1].to_string());
            }
            Token::Word(word) if self.current.accepts_alias() => {
                if word.eq_ignore_ascii_case("as") {
                    self.expect_alias = true;
                } else {
                    self.alias = Some(word);
                }
            }
            other => self.current.push(other)?,
        }
        Ok(())
    }

    fn in_progress(&self) -> bool {
        !self.current.is_empty()
            || self.wildcard.is_some()
            || self.table_prefix.is_some()
            || self.expect_alias
    }

    fn end_column(&mut self) -> Result<(), ParseError> {
        let column = if let Some(table) = self.wildcard.take() {
            match table {
                None => SelectColumn::AllColumns,
                Some(table) => SelectColumn::TableColumns(table),
            }
        } else if self.table_prefix.is_some() {
            return Err(ParseError::UnexpectedEnd("table wildcard"));
        } else if self.expect_alias {
            return Err(ParseError::UnexpectedEnd("column alias"));
        } else if self.current.is_empty() {
            return Err(ParseError::UnexpectedToken(",".to_string()));
        } else {
            SelectColumn::Expr {
                formula: std::mem::take(&mut self.current).finish()?,
                alias: self.alias.take(),
            }
        };
        self.columns.push(column);
        Ok(())
    }

    fn finish(mut self) -> Result<(bool, Vec<SelectColumn>), ParseError> {
        if self.in_progress() {
            self.end_column()?;
        } else if self.columns.is_empty() {
            return Err(ParseError::EmptyClause("SELECT"));
        } else {
            return Err(ParseError::UnexpectedEnd("SELECT"));
        }
        Ok((self.distinct, self.columns))
    }
}

// ── FROM ─────────────────────────────────────────────────────────────────

const JOIN_WORDS: [&str; 9] = ["as", "on", "join", "inner", "cross", "left", "right", "full", "outer"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum FromState {
    #[default]
    ExpectTable,
    AfterTable {
        alias_allowed: bool,
    },
    ExpectAlias,
    JoinKeyword {
        outer_allowed: bool,
    },
    ExpectJoinTable,
    OnLeft,
    OnEq,
    OnRight,
}

#[derive(Debug, Default)]
struct FromBuilder {
    items: Vec<FromItem>,
    state: FromState,
    join_kind: Option<JoinKind>,
    on_left: Option<ColumnName>,
}

impl FromBuilder {
    fn push(&mut self, token: Token) -> Result<(), ParseError> {
        let unexpected = || ParseError::UnexpectedToken(token.to_string());
        self.state = match (self.state, &token) {
            (FromState::ExpectTable, Token::Word(name)) if !is_join_word(name) => {
                self.items.push(FromItem {
                    table: table_ref(name)?,
                    joins: Vec::new(),
                });
                FromState::AfterTable { alias_allowed: true }
            }
            (FromState::AfterTable { .. }, Token::Punct(Punct::Comma)) => FromState::ExpectTable,
            (FromState::AfterTable { alias_allowed: true }, token) if token.is_keyword("as") => {
                FromState::ExpectAlias
            }
            (FromState::AfterTable { .. }, token) if token.is_keyword("join") => {
                self.join_kind = Some(JoinKind::Inner);
                FromState::ExpectJoinTable
            }
            (FromState::AfterTable { .. }, Token::Word(word)) if is_join_word(word) => {
                self.join_keyword(word).ok_or_else(unexpected)?
            }
            (FromState::AfterTable { alias_allowed: true }, Token::Word(alias)) => {
                self.set_alias(alias);
                FromState::AfterTable { alias_allowed: false }
            }
            (FromState::ExpectAlias, Token::Word(alias)) if !is_join_word(alias) => {
                self.set_alias(alias);
                FromState::AfterTable { alias_allowed: false }
            }
            (FromState::JoinKeyword { outer_allowed: true }, token) if token.is_keyword("outer") => {
                FromState::JoinKeyword { outer_allowed: false }
            }
            (FromState::JoinKeyword { .. }, token) if token.is_keyword("join") => FromState::ExpectJoinTable,
            (FromState::ExpectJoinTable, Token::Word(name)) if !is_join_word(name) => {
                let kind = self.join_kind.take().ok_or_else(unexpected)?;
                let join = JoinClause {
                    kind,
                    table: table_ref(name)?,
                    condition: None,
                };
                self.items.last_mut().ok_or_else(unexpected)?.joins.push(join);
                FromState::AfterTable { alias_allowed: true }
            }
            (FromState::OnLeft, Token::Word(column)) => {
                self.on_left = Some(ColumnName::parse(column)?);
                FromState::OnEq
            }
            (FromState::OnEq, Token::Punct(Punct::Eq)) => FromState::OnRight,
            (FromState::OnRight, Token::Word(column)) => {
                let left = self.on_left.take().ok_or_else(unexpected)?;
                let right = ColumnName::parse(column)?;
                let join = self.pending_join().ok_or_else(unexpected)?;
                join.condition = Some(JoinCondition { left, right });
                FromState::AfterTable { alias_allowed: false }
            }
            _ => return Err(unexpected()),
        };
        Ok(())
    }

    fn join_keyword(&mut self, word: &str) -> Option<FromState> {
        let (kind, outer_allowed) = match word.to_ascii_lowercase().as_str() {
            "inner" => (JoinKind::Inner, false),
            "cross" => (JoinKind::Cross, false),
            "left" => (JoinKind::LeftOuter, true),
            "right" => (JoinKind::RightOuter, true),
            "full" => (JoinKind::FullOuter, true),
            "on" => {
                return self.pending_join().map(|_| FromState::OnLeft);
            }
            _ => return None,
        };
        self.join_kind = Some(kind);
        Some(FromState::JoinKeyword { outer_allowed })
    }

    /// The last join when it still lacks an ON condition and takes one.
    fn pending_join(&mut self) -> Option<&mut JoinClause> {
        self.items
            .last_mut()?
            .joins
            .last_mut()
            .filter(|join| join.kind != JoinKind::Cross && join.condition.is_none())
    }

    fn set_alias(&mut self, alias: &str) {
        if let Some(item) = self.items.last_mut() {
            let table = match item.joins.last_mut() {
                Some(join) => &mut join.table,
                None => &mut item.table,
            };
            table.alias = Some(alias.to_string());
        }
    }

    fn finish(self) -> Result<Vec<FromItem>, ParseError> {
        match self.state {
            FromState::AfterTable { .. } => {}
            FromState::ExpectTable if self.items.is_empty() => return Err(ParseError::EmptyClause("FROM")),
            _ => return Err(ParseError::UnexpectedEnd("FROM")),
        }
        let missing_condition = self
            .items
            .iter()
            .flat_map(|item| &item.joins)
            .any(|join| join.kind != JoinKind::Cross && join.condition.is_none());
        if missing_condition {
            return Err(ParseError::UnexpectedEnd("JOIN ... ON"));
        }
        Ok(self.items)
    }
}

fn is_join_word(word: &str) -> bool {
    JOIN_WORDS.iter().any(|reserved| word.eq_ignore_ascii_case(reserved))
}

fn table_ref(name: &str) -> Result<TableRef, ParseError> {
    if name.is_empty() || !name.chars().all(is_identifier_char) {
        return Err(ParseError::UnexpectedToken(name.to_string()));
    }
    Ok(TableRef {
        name: name.to_string(),
        alias: None,
    })
}

// ── GROUP BY / ORDER BY / LIMIT ──────────────────────────────────────────

#[derive(Debug)]
struct ColumnListBuilder {
    columns: Vec<ColumnName>,
    expect_column: bool,
}

impl Default for ColumnListBuilder {
    fn default() -> Self {
        Self {
            columns: Vec::new(),
            expect_column: true,
        }
    }
}

impl ColumnListBuilder {
    fn push(&mut self, token: Token) -> Result<(), ParseError> {
        match token {
            Token::Word(word) if self.expect_column => {
                self.columns.push(ColumnName::parse(&word)?);
                self.expect_column = false;
            }
            Token::Punct(Punct::Comma) if !self.expect_column => self.expect_column = true,
            other => return Err(ParseError::UnexpectedToken(other.to_string())),
        }
        Ok(())
    }

    fn finish(self) -> Result<Vec<ColumnName>, ParseError> {
        if self.columns.is_empty() {
            return Err(ParseError::EmptyClause("GROUP BY"));
        }
        if self.expect_column {
            return Err(ParseError::UnexpectedEnd("GROUP BY"));
        }
        Ok(self.columns)
    }
}

#[derive(Debug)]
struct OrderByBuilder {
    items: Vec<OrderByItem>,
    expect_column: bool,
    direction_set: bool,
}

impl Default for OrderByBuilder {
    fn default() -> Self {
        Self {
            items: Vec::new(),
            expect_column: true,
            direction_set: false,
        }
    }
}

impl OrderByBuilder {
    fn push(&mut self, token: Token) -> Result<(), ParseError> {
        match token {
            Token::Word(word) if self.expect_column => {
                self.items.push(OrderByItem {
                    column: ColumnName::parse(&word)?,
                    descending: false,
                });
                self.expect_column = false;
                self.direction_set = false;
            }
            Token::Word(word) if !self.direction_set && (word.eq_ignore_ascii_case("asc") || word.eq_ignore_ascii_case("desc")) => {
                if let Some(item) = self.items.last_mut() {
                    item.descending = word.eq_ignore_ascii_case("desc");
                }
                self.direction_set = true;
            }
            Token::Punct(Punct::Comma) if !self.expect_column => self.expect_column = true,
            other => return Err(ParseError::UnexpectedToken(other.to_string())),
        }
        Ok(())
    }

    fn finish(self) -> Result<Vec<OrderByItem>, ParseError> {
        if self.items.is_empty() {
            return Err(ParseError::EmptyClause("ORDER BY"));
        }
        if self.expect_column {
            return Err(ParseError::UnexpectedEnd("ORDER BY"));
        }
        Ok(self.items)
    }
}

/// `LIMIT n`, `LIMIT n OFFSET m` or `LIMIT m, n`.
#[derive(Debug, Default)]
struct LimitBuilder {
    values: Vec<usize>,
    comma: bool,
    offset_keyword: bool,
}

impl LimitBuilder {
    fn push(&mut self, token: Token) -> Result<(), ParseError> {
        let separated = self.comma || self.offset_keyword;
        match token {
            Token::Word(word) if self.values.is_empty() || (self.values.len() == 1 && separated) => {
                let value = word.parse().map_err(|_| ParseError::InvalidNumber(word.clone()))?;
                self.values.push(value);
            }
            Token::Word(word) if self.values.len() == 1 && !separated && word.eq_ignore_ascii_case("offset") => {
                self.offset_keyword = true;
            }
            Token::Punct(Punct::Comma) if self.values.len() == 1 && !separated => self.comma = true,
            other => return Err(ParseError::UnexpectedToken(other.to_string())),
        }
        Ok(())
    }

    fn finish(self) -> Result<Limit, ParseError> {
        match (self.values.as_slice(), self.comma, self.offset_keyword) {
            ([], _, _) => Err(ParseError::EmptyClause("LIMIT")),
            ([count], false, false) => Ok(Limit {
                count: *count,
                offset: 0,
            }),
            ([offset, count], true, false) => Ok(Limit {
                count: *count,
                offset: *offset,
            }),
            ([count, offset], false, true) => Ok(Limit {
                count: *count,
                offset: *offset,
            }),
            _ => Err(ParseError::UnexpectedEnd("LIMIT")),
        }
    }
}
