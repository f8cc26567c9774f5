//! Scroll position over a flattened thread.

use std::ops::Range;

/// A fixed-height window sliding over `total_lines` lines.
///
/// Invariant: `0 <= top <= max(0, total_lines - window_size)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowedViewport {
    top: usize,
    window_size: usize,
    total_lines: usize,
}

impl WindowedViewport {
    #[must_use]
    pub fn new(window_size: usize, total_lines: usize) -> Self {
        Self {
            top: 0,
            window_size,
            total_lines,
        }
    }

    #[must_use]
    pub fn top_index(&self) -> usize {
        self.top
    }

    #[must_use]
    pub fn window_size(&self) -> usize {
        self.window_size
    }

    #[must_use]
    pub fn total_lines(&self) -> usize {
        self.total_lines
    }

    fn max_top(&self) -> usize {
        self.total_lines.saturating_sub(self.window_size)
    }

    /// Move one line up. Returns whether the position changed.
    pub fn scroll_up(&mut self) -> bool {
        let before = self.top;
        self.top = self.top.saturating_sub(1);
        self.top != before
    }

    /// Move one line down. Returns whether the position changed.
    pub fn scroll_down(&mut self) -> bool {
        let before = self.top;
        self.top = (self.top + 1).min(self.max_top());
        self.top != before
    }

    /// Indices of the lines currently visible.
    #[must_use]
    pub fn visible_range(&self) -> Range<usize> {
        self.top..self.top.saturating_add(self.window_size).min(self.total_lines)
    }

    #[must_use]
    pub fn at_top(&self) -> bool {
        self.top == 0
    }

    #[must_use]
    pub fn at_bottom(&self) -> bool {
        self.top == self.max_top()
    }
}
