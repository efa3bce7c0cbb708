use patchwork_core::{Leave, NodeId};

/// Position and size of a realized node, in host units.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Rect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Rect {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }
}

/// Platform side of a transition group: measurement and animation.
///
/// `name` is the transition name the group was given (default `v`); a
/// driver typically derives class names such as `v-enter` from it.
pub trait TransitionDriver {
    /// Current layout of `elm`, or `None` if it is not laid out.
    fn rect(&self, elm: NodeId) -> Option<Rect>;

    fn enter(&self, _elm: NodeId, _name: &str) {}

    /// Starts the leave of `elm`. Returning [`Leave::Deferred`] keeps the
    /// node in the host until the app is told the leave has finished.
    fn leave(&self, _elm: NodeId, _name: &str) -> Leave {
        Leave::Now
    }

    /// Whether `move_class` puts a transform transition on `elm`.
    fn has_move_transition(&self, _elm: NodeId, _move_class: &str) -> bool {
        false
    }

    /// Finishes any move or enter still running on `elm`.
    fn settle_pending(&self, _elm: NodeId) {}

    /// Offsets `elm` by `(dx, dy)` without a transition.
    fn translate(&self, elm: NodeId, dx: f32, dy: f32);

    /// Clears the offset and animates `elm` to its laid-out position.
    fn start_move(&self, elm: NodeId, move_class: &str);
}
