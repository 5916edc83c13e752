/// Lifecycle of one evaluation.
///
/// `Idle → Rasterizing → Reducing → Converting → Delivered`; `Cancelled` is
/// reachable from any non-terminal state.
#[derive(Debug, Copy, Clone, Default, Eq, PartialEq, Hash)]
pub enum EvaluationState {
    #[default]
    Idle,
    Rasterizing,
    Reducing,
    Converting,
    Delivered,
    Cancelled,
}

impl EvaluationState {
    #[inline]
    pub fn is_terminal(self) -> bool {
        matches!(self, EvaluationState::Delivered | EvaluationState::Cancelled)
    }
}
