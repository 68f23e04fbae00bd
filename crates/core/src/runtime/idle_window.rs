/// Idle window state machine.
/// Tracks which background actions already fired since the last user
/// activity. Each action fires at most once per window.
///
/// Quiet -> ThoughtFired | DreamFired -> BothFired; `Touched` returns to Quiet.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum IdleWindow {
    #[default]
    Quiet,
    ThoughtFired,
    DreamFired,
    BothFired,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdleEvent {
    ThoughtSurfaced,
    DreamFormed,
    Touched,
}

impl IdleWindow {
    pub fn next(self, event: IdleEvent) -> Self {
        use IdleEvent::*;
        use IdleWindow::*;
        match (self, event) {
            (_, Touched) => Quiet,
            (Quiet | ThoughtFired, ThoughtSurfaced) => ThoughtFired,
            (DreamFired | BothFired, ThoughtSurfaced) => BothFired,
            (Quiet | DreamFired, DreamFormed) => DreamFired,
            (ThoughtFired | BothFired, DreamFormed) => BothFired,
        }
    }

    pub fn thought_fired(self) -> bool {
        matches!(self, Self::ThoughtFired | Self::BothFired)
    }

    pub fn dream_fired(self) -> bool {
        matches!(self, Self::DreamFired | Self::BothFired)
    }
}
