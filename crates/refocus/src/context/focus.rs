//! The focus stack.
//!
//! Each open focus records the buffer length at the moment it was opened.
//! That anchor is where the compression engine starts looking for a safe
//! place to cut when the focus completes. Nesting is unbounded.

use crate::error::FocusError;
use serde::Serialize;

/// An open investigation, anchored to a buffer position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FocusMarker {
    pub description: String,
    pub goal: String,
    /// Buffer length when the focus was opened.
    pub anchor: usize,
}

/// LIFO stack of open focuses.
#[derive(Debug, Default, Clone)]
pub struct FocusStack {
    markers: Vec<FocusMarker>,
}

impl FocusStack {
    pub fn new() -> Self {
        Self::default()
    }

    /// Push a marker anchored at `anchor` and return it.
    pub fn open(
        &mut self,
        description: impl Into<String>,
        goal: impl Into<String>,
        anchor: usize,
    ) -> &FocusMarker {
        self.markers.push(FocusMarker {
            description: description.into(),
            goal: goal.into(),
            anchor,
        });
        let top = self.markers.len() - 1;
        &self.markers[top]
    }

    /// Pop the innermost focus.
    pub fn close(&mut self) -> Result<FocusMarker, FocusError> {
        self.markers.pop().ok_or(FocusError::EmptyStack)
    }

    pub fn top(&self) -> Option<&FocusMarker> {
        self.markers.last()
    }

    pub fn depth(&self) -> usize {
        self.markers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.markers.is_empty()
    }

    /// Open markers, outermost first.
    pub fn markers(&self) -> &[FocusMarker] {
        &self.markers
    }
}
