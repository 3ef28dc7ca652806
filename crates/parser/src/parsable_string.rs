//! A cursor over statement text that reads words delimited by a
//! [`SeparatorChecker`].

use crate::separator::{SeparatorChecker, SeparatorSet};

/// Saved cursor offset. Restoring it does not rewind separator counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ParsingPosition(usize);

impl ParsingPosition {
    pub fn offset(self) -> usize {
        self.0
    }
}

#[derive(Debug, Clone, Default)]
pub struct ParsableString {
    source: String,
    position: usize,
}

impl ParsableString {
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            position: 0,
        }
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Unread text.
    pub fn remaining(&self) -> &str {
        &self.source[self.position..]
    }

    pub fn finished(&self) -> bool {
        self.position >= self.source.len()
    }

    pub fn parsing_position(&self) -> ParsingPosition {
        ParsingPosition(self.position)
    }

    pub fn set_parsing_position(&mut self, position: ParsingPosition) {
        self.position = position.0.min(self.source.len());
    }

    pub fn peek_char(&self) -> Option<char> {
        self.remaining().chars().next()
    }

    pub fn next_char(&mut self) -> Option<char> {
        let c = self.peek_char()?;
        self.position += c.len_utf8();
        Some(c)
    }

    /// Moves the cursor `bytes` forward. Offsets must come from
    /// [`remaining`](Self::remaining) so they land on a char boundary.
    pub fn advance(&mut self, bytes: usize) {
        self.position = (self.position + bytes).min(self.source.len());
    }

    /// Reads a word in merge mode: leading separators are skipped (and
    /// reported to the checker) and the terminating separator is left
    /// unread.
    pub fn read_word<C>(&mut self, checker: &mut C) -> String
    where
        C: SeparatorChecker + ?Sized,
    {
        self.read_word_with(checker, true)
    }

    /// Reads a word. Without merge the word ends at the first separator,
    /// which is consumed, so consecutive separators yield empty words.
    /// Reading at the end returns an empty word.
    pub fn read_word_with<C>(&mut self, checker: &mut C, do_merge: bool) -> String
    where
        C: SeparatorChecker + ?Sized,
    {
        checker.read_started();
        if do_merge {
            while let Some(c) = self.peek_char() {
                if !checker.is_separator(c) {
                    break;
                }
                self.position += c.len_utf8();
                checker.separator_consumed(c);
            }
        }

        let start = self.position;
        while let Some(c) = self.peek_char() {
            if checker.is_separator(c) {
                let word = self.source[start..self.position].to_string();
                if !do_merge {
                    self.position += c.len_utf8();
                    checker.separator_consumed(c);
                }
                return word;
            }
            self.position += c.len_utf8();
        }
        self.source[start..].to_string()
    }
}

/// Splits `text` on any of `separators`. With `do_merge` runs of
/// separators count as one and no empty words are produced.
pub fn split(text: &str, separators: &str, do_merge: bool) -> Vec<String> {
    let mut string = ParsableString::new(text);
    let mut checker = SeparatorSet::new(separators);
    let mut words = Vec::new();
    while !string.finished() {
        let word = string.read_word_with(&mut checker, do_merge);
        if do_merge && word.is_empty() {
            break;
        }
        words.push(word);
    }
    words
}
