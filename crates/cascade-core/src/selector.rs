//! Typeahead selector state machine
//!
//! One selector holds the unfiltered candidate set, the live filter input,
//! the derived filtered projection, the highlighted (tentative) candidate,
//! and the committed selection. Every operation here is synchronous and
//! never blocks; retrieval lives in the cascade driver, which applies
//! results through [`Selector::replace_candidates`].
//!
//! Quiet-window behaviors are expressed with a generation counter: each
//! `(input, candidates)` change stamps a new [`FilterGen`], the owner
//! schedules a delayed [`Selector::auto_highlight`] carrying that stamp,
//! and a stale or diverged stamp is a no-op.

use crate::error::SelectError;
use crate::filter::FilterFn;

/// Monotonic stamp for one `(input, candidates)` combination.
pub type FilterGen = u64;

/// Logical keys handled by the selector. All other keys are the caller's
/// concern; free-text characters arrive through `set_input`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key {
    Enter,
    Escape,
    Up,
    Down,
}

/// What a keystroke did, so the owner knows which follow-up to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyOutcome {
    /// The highlighted candidate was committed
    Committed,
    /// Search interaction was dismissed; the selection is untouched
    Dismissed,
    /// The highlight moved
    Navigated,
    /// Nothing applicable
    Ignored,
}

enum Direction {
    Up,
    Down,
}

/// Generic incremental-search selection state machine.
pub struct Selector<T> {
    all: Vec<T>,
    input: String,
    filtered: Vec<T>,
    highlighted: Option<T>,
    selection: Option<T>,
    searching: bool,
    filter: FilterFn<T>,
    generation: FilterGen,
    navigated_in_generation: bool,
}

impl<T> Selector<T>
where
    T: Clone + PartialEq,
{
    #[must_use]
    pub fn new(filter: FilterFn<T>) -> Self {
        Self {
            all: Vec::new(),
            input: String::new(),
            filtered: Vec::new(),
            highlighted: None,
            selection: None,
            searching: false,
            filter,
            generation: 0,
            navigated_in_generation: false,
        }
    }

    /// The candidate universe, as last retrieved.
    #[must_use]
    pub fn candidates(&self) -> &[T] {
        &self.all
    }

    /// The live filter input.
    #[must_use]
    pub fn input(&self) -> &str {
        &self.input
    }

    /// The filtered projection; its order drives keyboard navigation.
    #[must_use]
    pub fn filtered(&self) -> &[T] {
        &self.filtered
    }

    /// The tentative, not yet committed candidate.
    #[must_use]
    pub fn highlighted(&self) -> Option<&T> {
        self.highlighted.as_ref()
    }

    /// The committed selection.
    #[must_use]
    pub fn selection(&self) -> Option<&T> {
        self.selection.as_ref()
    }

    /// True while the user is interacting with the filter/list UI.
    #[must_use]
    pub fn is_searching(&self) -> bool {
        self.searching
    }

    /// The current `(input, candidates)` generation.
    #[must_use]
    pub fn generation(&self) -> FilterGen {
        self.generation
    }

    /// Enters search mode. Retrieval is not gated on this; it only drives
    /// interaction affordances.
    pub fn begin_search(&mut self) {
        self.searching = true;
    }

    /// Updates the filter input and recomputes the filtered projection.
    ///
    /// Returns the new generation, for scheduling the auto-highlight quiet
    /// window.
    pub fn set_input(&mut self, text: impl Into<String>) -> FilterGen {
        self.input = text.into();
        self.refilter()
    }

    /// Applies a freshly retrieved candidate set.
    ///
    /// Always clears the committed selection: the candidate universe
    /// changed and identity is not presumed stable across a refresh, so
    /// re-selection must be explicit. The highlight is dropped for the same
    /// reason. Returns the new generation and whether a selection was in
    /// fact cleared.
    pub fn replace_candidates(&mut self, candidates: Vec<T>) -> (FilterGen, bool) {
        let cleared = self.selection.take().is_some();
        self.all = candidates;
        self.highlighted = None;
        let generation = self.refilter();
        (generation, cleared)
    }

    /// Resets to the empty state: no candidates, no input, no highlight, no
    /// selection. Returns true when a committed selection was dropped.
    pub fn clear(&mut self) -> bool {
        let cleared = self.selection.take().is_some();
        self.all.clear();
        self.filtered.clear();
        self.highlighted = None;
        self.input.clear();
        self.searching = false;
        self.generation += 1;
        self.navigated_in_generation = false;
        cleared
    }

    /// Drops only the committed selection, keeping candidates and input.
    /// Returns true when there was one.
    pub fn clear_selection(&mut self) -> bool {
        self.selection.take().is_some()
    }

    /// Applies the settled auto-highlight for `generation`.
    ///
    /// No-op when the state has moved on since the stamp was taken, when
    /// the user navigated within the quiet window, or when something is
    /// already highlighted. Returns true when the highlight was set.
    pub fn auto_highlight(&mut self, generation: FilterGen) -> bool {
        if generation != self.generation
            || self.navigated_in_generation
            || self.highlighted.is_some()
        {
            return false;
        }
        match self.filtered.first() {
            Some(first) => {
                self.highlighted = Some(first.clone());
                true
            }
            None => false,
        }
    }

    /// Handles one logical key.
    ///
    /// Enter commits the highlight (no-op without one), Escape dismisses
    /// search interaction, Up/Down move the highlight: Down from nothing
    /// lands on the first element, Up from nothing wraps to the last, and
    /// neither moves past its end of the list.
    pub fn handle_key(&mut self, key: Key) -> KeyOutcome {
        match key {
            Key::Enter => match self.validate() {
                Ok(_) => KeyOutcome::Committed,
                Err(_) => KeyOutcome::Ignored,
            },
            Key::Escape => {
                self.cancel_search();
                KeyOutcome::Dismissed
            }
            Key::Up => self.move_highlight(Direction::Up),
            Key::Down => self.move_highlight(Direction::Down),
        }
    }

    fn move_highlight(&mut self, direction: Direction) -> KeyOutcome {
        if self.filtered.is_empty() {
            return KeyOutcome::Ignored;
        }
        // Any navigation counts as divergence for the pending auto-highlight,
        // including a bump against either end of the list.
        self.navigated_in_generation = true;
        let current = self
            .highlighted
            .as_ref()
            .and_then(|h| self.filtered.iter().position(|c| c == h));
        let next = match (direction, current) {
            (Direction::Down, None) => 0,
            (Direction::Down, Some(i)) => (i + 1).min(self.filtered.len() - 1),
            (Direction::Up, None) => self.filtered.len() - 1,
            (Direction::Up, Some(i)) => i.saturating_sub(1),
        };
        if current == Some(next) {
            return KeyOutcome::Ignored;
        }
        self.highlighted = Some(self.filtered[next].clone());
        KeyOutcome::Navigated
    }

    /// Commits the highlighted candidate and leaves search mode.
    ///
    /// # Errors
    /// [`SelectError::NoHighlight`] when nothing is highlighted; callers
    /// are expected to disable the commit affordance in that state.
    pub fn validate(&mut self) -> Result<T, SelectError> {
        match self.highlighted.clone() {
            Some(value) => {
                self.selection = Some(value.clone());
                self.searching = false;
                Ok(value)
            }
            None => {
                tracing::debug!("validate invoked with no highlighted candidate");
                Err(SelectError::NoHighlight)
            }
        }
    }

    /// Commits `value` directly, the pointer path.
    ///
    /// # Errors
    /// [`SelectError::UnknownCandidate`] when `value` is not a member of
    /// the current candidate set; selections are never invented.
    pub fn select(&mut self, value: T) -> Result<(), SelectError> {
        if !self.all.contains(&value) {
            return Err(SelectError::UnknownCandidate);
        }
        self.selection = Some(value);
        self.searching = false;
        Ok(())
    }

    /// Leaves search mode without touching the committed selection.
    pub fn cancel_search(&mut self) {
        self.searching = false;
    }

    fn refilter(&mut self) -> FilterGen {
        self.filtered = (self.filter)(&self.all, &self.input);
        if let Some(h) = &self.highlighted {
            if !self.filtered.contains(h) {
                self.highlighted = None;
            }
        }
        self.generation += 1;
        self.navigated_in_generation = false;
        self.generation
    }
}
