//! Countdown clocks advanced together once per step.

/// Handle to one clock inside a [`Timers`] set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerId(usize);

/// Clocks counting up in seconds. A clock started at `-d` expires after `d` seconds.
#[derive(Debug, Clone, Default)]
pub struct Timers {
    values: Vec<f64>,
    free: Vec<usize>,
}

impl Timers {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a clock reading `value`, reusing released slots.
    pub fn start(&mut self, value: f64) -> TimerId {
        if let Some(slot) = self.free.pop() {
            self.values[slot] = value;
            TimerId(slot)
        } else {
            self.values.push(value);
            TimerId(self.values.len() - 1)
        }
    }

    /// Start a clock that expires after `seconds`.
    pub fn countdown(&mut self, seconds: f64) -> TimerId {
        self.start(-seconds)
    }

    #[must_use]
    pub fn get(&self, id: TimerId) -> f64 {
        self.values[id.0]
    }

    pub fn set(&mut self, id: TimerId, value: f64) {
        self.values[id.0] = value;
    }

    #[must_use]
    pub fn expired(&self, id: TimerId) -> bool {
        self.get(id) >= 0.0
    }

    /// Return a clock's slot for reuse. The id must not be read afterwards.
    pub fn release(&mut self, id: TimerId) {
        self.free.push(id.0);
    }

    /// Advance every clock by `dt`.
    pub fn advance(&mut self, dt: f64) {
        for value in &mut self.values {
            *value += dt;
        }
    }

    /// Clocks currently in use.
    #[must_use]
    pub fn live(&self) -> usize {
        self.values.len() - self.free.len()
    }
}
