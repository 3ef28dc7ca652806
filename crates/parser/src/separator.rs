//! Separator checkers driving [`ParsableString`](crate::parsable_string::ParsableString).
//!
//! A checker decides which characters end a word and is told about every
//! separator the cursor moves past. Three flavors exist:
//! - [`SeparatorSet`]: a plain set of characters
//! - [`SeparatorCheckerWithCounter`]: also counts consumed separators
//! - [`SeparatorCheckerWithCallback`]: runs a closure per separator, which
//!   may push or pop alternative separator sets (used for quoting)

use rustc_hash::FxHashMap;

pub trait SeparatorChecker {
    fn is_separator(&self, c: char) -> bool;

    /// Called for every separator the cursor moves past.
    fn separator_consumed(&mut self, _c: char) {}

    /// Called at the start of every read.
    fn read_started(&mut self) {}
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SeparatorSet {
    chars: Vec<char>,
}

impl SeparatorSet {
    pub fn new(chars: &str) -> Self {
        let mut set = Self::default();
        for c in chars.chars() {
            set.add(c);
        }
        set
    }

    pub fn add(&mut self, c: char) {
        if !self.chars.contains(&c) {
            self.chars.push(c);
        }
    }

    pub fn contains(&self, c: char) -> bool {
        self.chars.contains(&c)
    }
}

impl SeparatorChecker for SeparatorSet {
    fn is_separator(&self, c: char) -> bool {
        self.contains(c)
    }
}

/// Counts consumed separators per character.
///
/// Counts survive [`ParsableString::set_parsing_position`]: moving the
/// cursor back and re-reading counts the same separators again. Only
/// [`reset_counter`](Self::reset_counter) clears them.
///
/// [`ParsableString::set_parsing_position`]: crate::parsable_string::ParsableString::set_parsing_position
#[derive(Debug, Clone, Default)]
pub struct SeparatorCheckerWithCounter {
    separators: SeparatorSet,
    counts: FxHashMap<char, usize>,
    forward: usize,
    last: Option<char>,
}

impl SeparatorCheckerWithCounter {
    pub fn new(chars: &str) -> Self {
        Self {
            separators: SeparatorSet::new(chars),
            ..Self::default()
        }
    }

    pub fn count(&self, c: char) -> usize {
        self.counts.get(&c).copied().unwrap_or(0)
    }

    pub fn reset_counter(&mut self) {
        self.counts.clear();
        self.forward = 0;
        self.last = None;
    }

    /// Separators consumed by the most recent read.
    pub fn forward_separator_count(&self) -> usize {
        self.forward
    }

    pub fn last_separator(&self) -> Option<char> {
        self.last
    }
}

impl SeparatorChecker for SeparatorCheckerWithCounter {
    fn is_separator(&self, c: char) -> bool {
        self.separators.contains(c)
    }

    fn separator_consumed(&mut self, c: char) {
        *self.counts.entry(c).or_insert(0) += 1;
        self.forward += 1;
        self.last = Some(c);
    }

    fn read_started(&mut self) {
        self.forward = 0;
    }
}

/// The active separator set: a base set plus a stack of alternatives.
/// While an alternative is pushed only its characters separate words.
#[derive(Debug, Clone, Default)]
pub struct SeparatorStack {
    base: SeparatorSet,
    alternatives: Vec<SeparatorSet>,
}

impl SeparatorStack {
    pub fn new(base: SeparatorSet) -> Self {
        Self {
            base,
            alternatives: Vec::new(),
        }
    }

    pub fn push_alternative(&mut self, set: SeparatorSet) {
        self.alternatives.push(set);
    }

    pub fn pop_alternative(&mut self) -> Option<SeparatorSet> {
        self.alternatives.pop()
    }

    pub fn in_alternative(&self) -> bool {
        !self.alternatives.is_empty()
    }

    pub fn current(&self) -> &SeparatorSet {
        self.alternatives.last().unwrap_or(&self.base)
    }
}

pub type SeparatorCallback<C> = Box<dyn FnMut(char, &mut C, &mut SeparatorStack)>;

/// Runs a per-character closure when a separator is consumed. The closure
/// gets the checker's typed context and its separator stack.
pub struct SeparatorCheckerWithCallback<C> {
    stack: SeparatorStack,
    callbacks: FxHashMap<char, SeparatorCallback<C>>,
    context: C,
}

impl<C> SeparatorCheckerWithCallback<C> {
    pub fn new(chars: &str, context: C) -> Self {
        Self {
            stack: SeparatorStack::new(SeparatorSet::new(chars)),
            callbacks: FxHashMap::default(),
            context,
        }
    }

    pub fn add_callback<F>(&mut self, c: char, callback: F)
    where
        F: FnMut(char, &mut C, &mut SeparatorStack) + 'static,
    {
        self.callbacks.insert(c, Box::new(callback));
    }

    pub fn context(&self) -> &C {
        &self.context
    }

    pub fn context_mut(&mut self) -> &mut C {
        &mut self.context
    }

    pub fn stack(&self) -> &SeparatorStack {
        &self.stack
    }

    pub fn stack_mut(&mut self) -> &mut SeparatorStack {
        &mut self.stack
    }
}

impl<C> SeparatorChecker for SeparatorCheckerWithCallback<C> {
    fn is_separator(&self, c: char) -> bool {
        self.stack.current().contains(c)
    }

    fn separator_consumed(&mut self, c: char) {
        if let Some(callback) = self.callbacks.get_mut(&c) {
            callback(c, &mut self.context, &mut self.stack);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_ignores_duplicates() {
        let set = SeparatorSet::new("  ,");
        assert!(set.contains(' '));
        assert!(set.contains(','));
        assert!(!set.contains('a'));
    }

    #[test]
    fn counter_tracks_last_and_forward() {
        let mut counter = SeparatorCheckerWithCounter::new(" ,");
        counter.read_started();
        counter.separator_consumed(',');
        counter.separator_consumed(' ');
        assert_eq!(counter.count(','), 1);
        assert_eq!(counter.forward_separator_count(), 2);
        assert_eq!(counter.last_separator(), Some(' '));
        counter.read_started();
        assert_eq!(counter.forward_separator_count(), 0);
        assert_eq!(counter.count(' '), 1);
        counter.reset_counter();
        assert_eq!(counter.count(','), 0);
    }

    #[test]
    fn callback_switches_to_alternative_set() {
        let mut checker = SeparatorCheckerWithCallback::new(" '", 0usize);
        checker.add_callback('\'', |_, quotes: &mut usize, stack| {
            *quotes += 1;
            if stack.in_alternative() {
                stack.pop_alternative();
            } else {
                stack.push_alternative(SeparatorSet::new("'"));
            }
        });
        assert!(checker.is_separator(' '));
        checker.separator_consumed('\'');
        assert!(!checker.is_separator(' '));
        assert!(checker.is_separator('\''));
        checker.separator_consumed('\'');
        assert!(checker.is_separator(' '));
        assert_eq!(*checker.context(), 2);
    }
}
