//! Statement lexer on top of [`ParsableString`].
//!
//! Two reading modes exist. Clause mode (SELECT, FROM, WHERE) reads with a
//! callback checker that turns punctuation into tokens and switches to a
//! quote-only separator set inside string literals. List mode (GROUP BY,
//! ORDER BY, LIMIT) merges whitespace and derives comma tokens from the
//! separator counter.

use std::collections::VecDeque;
use std::fmt;

use crate::error::ParseError;
use crate::parsable_string::{ParsableString, ParsingPosition};
use crate::separator::{SeparatorCheckerWithCallback, SeparatorCheckerWithCounter, SeparatorSet};

const CLAUSE_SEPARATORS: &str = " \t\r\n,()=<>!+-*/;'";
const CLAUSE_PUNCTUATION: &str = ",()=<>!+-*/;";
const QUOTED_SEPARATORS: &str = "'\\";
const LIST_SEPARATORS: &str = " \t\r\n,;";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Punct {
    Comma,
    LeftParen,
    RightParen,
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    Plus,
    Minus,
    Star,
    Slash,
    Semicolon,
}

impl Punct {
    pub fn symbol(self) -> &'static str {
        match self {
            Punct::Comma => ",",
            Punct::LeftParen => "(",
            Punct::RightParen => ")",
            Punct::Eq => "=",
            Punct::NotEq => "<>",
            Punct::Lt => "<",
            Punct::LtEq => "<=",
            Punct::Gt => ">",
            Punct::GtEq => ">=",
            Punct::Plus => "+",
            Punct::Minus => "-",
            Punct::Star => "*",
            Punct::Slash => "/",
            Punct::Semicolon => ";",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Word(String),
    Quoted(String),
    Punct(Punct),
}

impl Token {
    /// True for a bare word equal to `keyword`, ignoring case.
    pub fn is_keyword(&self, keyword: &str) -> bool {
        matches!(self, Token::Word(word) if word.eq_ignore_ascii_case(keyword))
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Word(word) => f.write_str(word),
            Token::Quoted(text) => write!(f, "'{text}'"),
            Token::Punct(punct) => f.write_str(punct.symbol()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LexMode {
    Clause,
    List,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum QuoteState {
    #[default]
    Outside,
    Inside,
    Closed,
}

#[derive(Debug, Default)]
struct ClauseEvents {
    punctuation: VecDeque<char>,
    quote: QuoteState,
    escape: bool,
}

/// Snapshot of the lexer cursor, used for one-token lookahead.
#[derive(Debug, Clone)]
pub struct LexerPosition {
    position: ParsingPosition,
    pending: VecDeque<Token>,
}

pub struct StatementLexer {
    text: ParsableString,
    clause: SeparatorCheckerWithCallback<ClauseEvents>,
    list: SeparatorCheckerWithCounter,
    pending: VecDeque<Token>,
}

impl StatementLexer {
    pub fn new(statement: &str) -> Self {
        Self {
            text: ParsableString::new(statement),
            clause: clause_checker(),
            list: SeparatorCheckerWithCounter::new(LIST_SEPARATORS),
            pending: VecDeque::new(),
        }
    }

    pub fn next_token(&mut self, mode: LexMode) -> Result<Option<Token>, ParseError> {
        loop {
            if let Some(token) = self.pending.pop_front() {
                return Ok(Some(token));
            }
            if self.text.finished() {
                return Ok(None);
            }
            match mode {
                LexMode::Clause => self.lex_clause()?,
                LexMode::List => self.lex_list(),
            }
        }
    }

    pub fn position(&self) -> LexerPosition {
        LexerPosition {
            position: self.text.parsing_position(),
            pending: self.pending.clone(),
        }
    }

    pub fn restore(&mut self, saved: LexerPosition) {
        self.text.set_parsing_position(saved.position);
        self.pending = saved.pending;
    }

    /// Returns the raw text up to the parenthesis matching one that was
    /// just returned as a token, and moves past it.
    pub fn read_parenthesized(&mut self) -> Result<String, ParseError> {
        if let Some(token) = self.pending.pop_front() {
            return Err(ParseError::UnexpectedToken(token.to_string()));
        }
        let remaining = self.text.remaining();
        let mut depth = 0usize;
        let mut quoted = false;
        let mut chars = remaining.char_indices().peekable();
        while let Some((offset, c)) = chars.next() {
            match c {
                '\\' if quoted => {
                    chars.next();
                }
                '\'' if quoted => {
                    if matches!(chars.peek(), Some((_, '\''))) {
                        chars.next();
                    } else {
                        quoted = false;
                    }
                }
                '\'' => quoted = true,
                '(' if !quoted => depth += 1,
                ')' if !quoted => {
                    if depth == 0 {
                        let inner = remaining[..offset].to_string();
                        self.text.advance(offset + 1);
                        return Ok(inner);
                    }
                    depth -= 1;
                }
                _ => {}
            }
        }
        if quoted {
            return Err(ParseError::UnterminatedQuote);
        }
        Err(ParseError::UnbalancedParenthesis)
    }

    fn lex_clause(&mut self) -> Result<(), ParseError> {
        let word = self.text.read_word_with(&mut self.clause, false);
        if !word.is_empty() {
            self.pending.push_back(Token::Word(word));
        }
        if self.clause.context().quote == QuoteState::Inside {
            let literal = self.read_quoted()?;
            self.pending.push_back(Token::Quoted(literal));
            return Ok(());
        }
        while let Some(c) = self.clause.context_mut().punctuation.pop_front() {
            let punct = self.compose_punct(c)?;
            self.pending.push_back(Token::Punct(punct));
        }
        Ok(())
    }

    /// Reads the body of a string literal whose opening quote was consumed.
    /// `''` and a backslash both escape the next character.
    fn read_quoted(&mut self) -> Result<String, ParseError> {
        let mut literal = String::new();
        loop {
            if self.text.finished() {
                return Err(ParseError::UnterminatedQuote);
            }
            literal.push_str(&self.text.read_word_with(&mut self.clause, false));

            let events = self.clause.context_mut();
            if events.escape {
                events.escape = false;
                let escaped = self.text.next_char().ok_or(ParseError::UnterminatedQuote)?;
                literal.push(escaped);
                continue;
            }
            if events.quote != QuoteState::Closed {
                continue;
            }
            if self.text.peek_char() == Some('\'') {
                self.text.next_char();
                literal.push('\'');
                self.clause
                    .stack_mut()
                    .push_alternative(SeparatorSet::new(QUOTED_SEPARATORS));
                self.clause.context_mut().quote = QuoteState::Inside;
                continue;
            }
            self.clause.context_mut().quote = QuoteState::Outside;
            return Ok(literal);
        }
    }

    fn compose_punct(&mut self, c: char) -> Result<Punct, ParseError> {
        let punct = match c {
            ',' => Punct::Comma,
            '(' => Punct::LeftParen,
            ')' => Punct::RightParen,
            '=' => Punct::Eq,
            '+' => Punct::Plus,
            '-' => Punct::Minus,
            '*' => Punct::Star,
            '/' => Punct::Slash,
            ';' => Punct::Semicolon,
            '<' => match self.text.peek_char() {
                Some('=') => self.consume(Punct::LtEq),
                Some('>') => self.consume(Punct::NotEq),
                _ => Punct::Lt,
            },
            '>' => match self.text.peek_char() {
                Some('=') => self.consume(Punct::GtEq),
                _ => Punct::Gt,
            },
            '!' => match self.text.peek_char() {
                Some('=') => self.consume(Punct::NotEq),
                _ => return Err(ParseError::UnexpectedToken("!".to_string())),
            },
            other => return Err(ParseError::UnexpectedToken(other.to_string())),
        };
        Ok(punct)
    }

    fn consume(&mut self, punct: Punct) -> Punct {
        self.text.next_char();
        punct
    }

    fn lex_list(&mut self) {
        let commas_before = self.list.count(',');
        let word = self.text.read_word(&mut self.list);
        for _ in commas_before..self.list.count(',') {
            self.pending.push_back(Token::Punct(Punct::Comma));
        }
        if !word.is_empty() {
            self.pending.push_back(Token::Word(word));
        }
    }
}

fn clause_checker() -> SeparatorCheckerWithCallback<ClauseEvents> {
    let mut checker = SeparatorCheckerWithCallback::new(CLAUSE_SEPARATORS, ClauseEvents::default());
    for c in CLAUSE_PUNCTUATION.chars() {
        checker.add_callback(c, |c, events: &mut ClauseEvents, _| {
            events.punctuation.push_back(c);
        });
    }
    checker.add_callback('\'', |_, events: &mut ClauseEvents, stack| {
        if stack.in_alternative() {
            stack.pop_alternative();
            events.quote = QuoteState::Closed;
        } else {
            stack.push_alternative(SeparatorSet::new(QUOTED_SEPARATORS));
            events.quote = QuoteState::Inside;
        }
    });
    checker.add_callback('\\', |_, events: &mut ClauseEvents, _| {
        events.escape = true;
    });
    checker
}
