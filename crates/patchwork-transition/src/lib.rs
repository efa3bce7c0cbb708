//! Transition group for Patchwork.
//!
//! [`TransitionGroup`] wraps keyed children in a single element and runs
//! enter and leave transitions as they come and go. Children that only
//! change position are animated with a FLIP move: their old positions are
//! recorded during render, a translation back to the old spot is applied
//! after the patch, and a move transition carries them to the new one.
//! Measuring and animating nodes is left to a [`TransitionDriver`].

mod driver;
mod group;

pub use driver::{Rect, TransitionDriver};
pub use group::{GroupProps, TransitionGroup};
