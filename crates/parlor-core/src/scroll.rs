//! Scroll position tracking for the message list.
//!
//! The tracker is unit-agnostic: callers feed pixels or rows consistently
//! and pick a threshold in the same unit.

use parlor_protocol::Role;
use std::time::Duration;

/// Distance from the bottom still treated as "at the bottom".
pub const DEFAULT_NEAR_BOTTOM_THRESHOLD: u32 = 100;
/// Delay before following new content so layout can settle.
pub const DEFAULT_SETTLE_DELAY: Duration = Duration::from_millis(100);

/// Viewport geometry reported on every scroll.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ScrollMetrics {
    /// Total content height.
    pub scroll_height: u32,
    /// Offset of the viewport top.
    pub scroll_top: u32,
    /// Viewport height.
    pub client_height: u32,
}

impl ScrollMetrics {
    pub fn distance_from_bottom(&self) -> u32 {
        self.scroll_height
            .saturating_sub(self.scroll_top)
            .saturating_sub(self.client_height)
    }
}

/// What the view should do after the message list changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScrollDecision {
    /// Leave the viewport alone.
    Stay,
    /// Scroll to the bottom after the delay.
    Settle(Duration),
    /// Scroll to the bottom immediately.
    Force,
}

#[derive(Debug, Clone)]
pub struct ScrollTracker {
    threshold: u32,
    settle_delay: Duration,
    near_bottom: bool,
    show_jump_button: bool,
}

impl Default for ScrollTracker {
    fn default() -> Self {
        Self::new(DEFAULT_NEAR_BOTTOM_THRESHOLD, DEFAULT_SETTLE_DELAY)
    }
}

impl ScrollTracker {
    pub fn new(threshold: u32, settle_delay: Duration) -> Self {
        Self {
            threshold,
            settle_delay,
            near_bottom: true,
            show_jump_button: false,
        }
    }

    pub fn is_near_bottom(&self) -> bool {
        self.near_bottom
    }

    pub fn show_jump_button(&self) -> bool {
        self.show_jump_button
    }

    /// Record a scroll event.
    pub fn on_scroll(&mut self, metrics: ScrollMetrics, message_count: usize) {
        self.near_bottom = metrics.distance_from_bottom() <= self.threshold;
        self.show_jump_button = !self.near_bottom && message_count > 0;
    }

    /// Decide how to react to a change of the message list.
    pub fn on_messages_changed(
        &mut self,
        message_count: usize,
        last_role: Option<Role>,
    ) -> ScrollDecision {
        if last_role == Some(Role::User) {
            return ScrollDecision::Force;
        }
        if message_count <= 1 || self.near_bottom {
            return ScrollDecision::Settle(self.settle_delay);
        }
        self.show_jump_button = true;
        ScrollDecision::Stay
    }

    /// The view reached the bottom through a programmatic scroll.
    pub fn scrolled_to_bottom(&mut self) {
        self.near_bottom = true;
        self.show_jump_button = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn metrics(scroll_height: u32, scroll_top: u32, client_height: u32) -> ScrollMetrics {
        ScrollMetrics {
            scroll_height,
            scroll_top,
            client_height,
        }
    }

    #[test]
    fn starts_near_bottom_without_button() {
        let tracker = ScrollTracker::default();
        assert!(tracker.is_near_bottom());
        assert!(!tracker.show_jump_button());
    }

    #[test]
    fn threshold_is_inclusive() {
        let mut tracker = ScrollTracker::default();
        tracker.on_scroll(metrics(1000, 400, 500), 5);
        assert!(tracker.is_near_bottom());
        tracker.on_scroll(metrics(1000, 399, 500), 5);
        assert!(!tracker.is_near_bottom());
        assert!(tracker.show_jump_button());
    }

    #[test]
    fn button_hidden_for_empty_list() {
        let mut tracker = ScrollTracker::default();
        tracker.on_scroll(metrics(1000, 0, 200), 0);
        assert!(!tracker.is_near_bottom());
        assert!(!tracker.show_jump_button());
    }

    #[test]
    fn near_bottom_follows_new_assistant_message() {
        let mut tracker = ScrollTracker::default();
        tracker.on_scroll(metrics(1000, 480, 500), 4);
        assert_eq!(
            tracker.on_messages_changed(5, Some(Role::Assistant)),
            ScrollDecision::Settle(DEFAULT_SETTLE_DELAY)
        );
    }

    #[test]
    fn scrolled_up_keeps_position_and_shows_button() {
        let mut tracker = ScrollTracker::default();
        tracker.on_scroll(metrics(2000, 0, 500), 4);
        assert_eq!(
            tracker.on_messages_changed(5, Some(Role::Assistant)),
            ScrollDecision::Stay
        );
        assert!(tracker.show_jump_button());
    }

    #[test]
    fn user_message_forces_scroll_even_when_scrolled_up() {
        let mut tracker = ScrollTracker::default();
        tracker.on_scroll(metrics(2000, 0, 500), 4);
        assert_eq!(
            tracker.on_messages_changed(5, Some(Role::User)),
            ScrollDecision::Force
        );
    }

    #[test]
    fn first_message_always_settles() {
        let mut tracker = ScrollTracker::default();
        tracker.on_scroll(metrics(2000, 0, 500), 3);
        assert_eq!(
            tracker.on_messages_changed(1, Some(Role::Assistant)),
            ScrollDecision::Settle(DEFAULT_SETTLE_DELAY)
        );
        assert_eq!(
            tracker.on_messages_changed(0, None),
            ScrollDecision::Settle(DEFAULT_SETTLE_DELAY)
        );
    }

    #[test]
    fn programmatic_scroll_resets_state() {
        let mut tracker = ScrollTracker::default();
        tracker.on_scroll(metrics(2000, 0, 500), 4);
        tracker.scrolled_to_bottom();
        assert!(tracker.is_near_bottom());
        assert!(!tracker.show_jump_button());
    }
}
