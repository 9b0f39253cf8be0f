//! Focus/blur tracking for free-text fields
//!
//! Typing updates the local store on every keystroke; the remote side only
//! sees the value once, when the field loses focus with a changed value.

/// Edit session state of one field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldState<V> {
    Unfocused,
    /// Editing; `baseline` is the value when focus was gained.
    Focused { baseline: V },
    /// A remote write of `value` is in flight.
    Committing { value: V },
}

/// What the caller must do after a blur.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlurAction<V> {
    /// Value did not change; nothing to write.
    Unchanged,
    /// Write `V` remotely, then call [`FieldTracker::finish_commit`].
    Commit(V),
    /// Sync is inactive; the change waits for the ordinary sync path.
    FallbackSync,
    /// Blur without a matching focus; ignored.
    NotFocused,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldTracker<V> {
    state: FieldState<V>,
}

impl<V: Clone + PartialEq> Default for FieldTracker<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V: Clone + PartialEq> FieldTracker<V> {
    pub const fn new() -> Self {
        Self {
            state: FieldState::Unfocused,
        }
    }

    pub const fn state(&self) -> &FieldState<V> {
        &self.state
    }

    /// Start an edit session with `current` as its baseline. Focusing a
    /// field that is still committing starts a new session right away.
    pub fn focus(&mut self, current: V) {
        self.state = FieldState::Focused { baseline: current };
    }

    /// Whether `live` differs from the baseline of the current session.
    pub fn is_dirty(&self, live: &V) -> bool {
        matches!(&self.state, FieldState::Focused { baseline } if baseline != live)
    }

    /// End the edit session.
    pub fn blur(&mut self, live: V, sync_active: bool) -> BlurAction<V> {
        match std::mem::replace(&mut self.state, FieldState::Unfocused) {
            FieldState::Focused { .. } if !sync_active => BlurAction::FallbackSync,
            FieldState::Focused { baseline } if baseline == live => BlurAction::Unchanged,
            FieldState::Focused { .. } => {
                self.state = FieldState::Committing {
                    value: live.clone(),
                };
                BlurAction::Commit(live)
            }
            state @ FieldState::Committing { .. } => {
                self.state = state;
                BlurAction::NotFocused
            }
            FieldState::Unfocused => BlurAction::NotFocused,
        }
    }

    /// The commit started by [`FieldTracker::blur`] finished, successfully
    /// or not.
    pub fn finish_commit(&mut self) {
        if matches!(self.state, FieldState::Committing { .. }) {
            self.state = FieldState::Unfocused;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unchanged_blur_writes_nothing() {
        let mut tracker = FieldTracker::new();
        tracker.focus("hello".to_string());
        assert_eq!(tracker.blur("hello".to_string(), true), BlurAction::Unchanged);
        assert_eq!(tracker.state(), &FieldState::Unfocused);
    }

    #[test]
    fn test_changed_blur_commits_once() {
        let mut tracker = FieldTracker::new();
        tracker.focus("draft".to_string());
        assert!(tracker.is_dirty(&"draft!".to_string()));

        let action = tracker.blur("draft!".to_string(), true);
        assert_eq!(action, BlurAction::Commit("draft!".to_string()));
        assert_eq!(
            tracker.state(),
            &FieldState::Committing {
                value: "draft!".to_string()
            }
        );

        assert_eq!(tracker.blur("draft!".to_string(), true), BlurAction::NotFocused);
        tracker.finish_commit();
        assert_eq!(tracker.state(), &FieldState::Unfocused);
    }

    #[test]
    fn test_inactive_sync_falls_back() {
        let mut tracker = FieldTracker::new();
        tracker.focus(1);
        assert_eq!(tracker.blur(2, false), BlurAction::FallbackSync);
        assert_eq!(tracker.state(), &FieldState::Unfocused);
    }

    #[test]
    fn test_blur_without_focus_is_ignored() {
        let mut tracker: FieldTracker<i32> = FieldTracker::new();
        assert_eq!(tracker.blur(1, true), BlurAction::NotFocused);
    }

    #[test]
    fn test_refocus_during_commit_starts_new_session() {
        let mut tracker = FieldTracker::new();
        tracker.focus(1);
        tracker.blur(2, true);
        tracker.focus(2);
        tracker.finish_commit();
        assert_eq!(tracker.state(), &FieldState::Focused { baseline: 2 });
    }
}
