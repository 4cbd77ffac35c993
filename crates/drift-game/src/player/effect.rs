//! The effect currently overriding a player's control

use drift_net::Effect;

/// Called once when an effect ends, whether it expired, was replaced, or
/// was cancelled by input
pub type EffectEnd = Box<dyn FnOnce()>;

/// Holds the active effect and its end hook
#[derive(Default)]
pub struct EffectState {
    current: Option<Effect>,
    on_end: Option<EffectEnd>,
    /// Seconds left before a timed effect clears itself
    remaining: Option<f32>,
}

impl EffectState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the active effect. Returns false when `effect` is already
    /// active; otherwise the previous effect's end hook runs first.
    pub fn set(&mut self, effect: Option<Effect>, on_end: Option<EffectEnd>) -> bool {
        if self.current == effect {
            return false;
        }
        self.end();
        self.remaining = effect.as_ref().and_then(|e| e.duration);
        self.current = effect;
        self.on_end = on_end;
        true
    }

    /// Unconditionally replace the effect, for state applied from the
    /// network. The previous end hook still runs.
    pub fn replace(&mut self, effect: Option<Effect>) {
        self.end();
        self.remaining = effect.as_ref().and_then(|e| e.duration);
        self.current = effect;
    }

    /// Clear the effect, running its end hook
    pub fn end(&mut self) {
        self.current = None;
        self.remaining = None;
        if let Some(on_end) = self.on_end.take() {
            on_end();
        }
    }

    /// Count down a timed effect; true once it has run out
    pub fn tick(&mut self, dt: f32) -> bool {
        let Some(remaining) = self.remaining.as_mut() else {
            return false;
        };
        *remaining -= dt;
        *remaining <= 0.0
    }

    pub fn current(&self) -> Option<&Effect> {
        self.current.as_ref()
    }

    pub fn is_active(&self) -> bool {
        self.current.is_some()
    }

    pub fn anchor_id(&self) -> Option<&str> {
        self.current.as_ref().and_then(|e| e.anchor_id.as_deref())
    }

    pub fn freeze(&self) -> bool {
        self.current.as_ref().is_some_and(|e| e.freeze)
    }

    pub fn snare(&self) -> f32 {
        self.current.as_ref().map_or(0.0, |e| e.snare.clamp(0.0, 1.0))
    }

    pub fn turn(&self) -> bool {
        self.current.as_ref().is_some_and(|e| e.turn)
    }

    pub fn emote(&self) -> Option<&str> {
        self.current.as_ref().and_then(|e| e.emote.as_deref())
    }

    pub fn cancellable(&self) -> bool {
        self.current.as_ref().is_some_and(|e| e.cancellable)
    }
}

impl std::fmt::Debug for EffectState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EffectState")
            .field("current", &self.current)
            .field("remaining", &self.remaining)
            .field("on_end", &self.on_end.is_some())
            .finish()
    }
}
