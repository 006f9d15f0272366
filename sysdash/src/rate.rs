//! Derived values: per-tick byte rates from cumulative counters, and uptime text.

/// Byte deltas since the previous observation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Rates {
    pub rx: u64,
    pub tx: u64,
}

/// Turns cumulative rx/tx totals into per-interval deltas.
///
/// Owned by a single connection's event loop, so no locking. The first
/// observation only seeds the state and reports zero.
#[derive(Debug, Clone, Copy, Default)]
pub struct RateTracker {
    last: Option<(u64, u64)>,
}

impl RateTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn observe(&mut self, rx: u64, tx: u64) -> Rates {
        let rates = match self.last {
            // Counter reset or wrap reads as zero, not a huge spike.
            Some((last_rx, last_tx)) => Rates {
                rx: rx.saturating_sub(last_rx),
                tx: tx.saturating_sub(last_tx),
            },
            None => Rates::default(),
        };
        self.last = Some((rx, tx));
        rates
    }

    pub fn last(&self) -> Option<(u64, u64)> {
        self.last
    }
}

const MINUTE: u64 = 60;
const HOUR: u64 = 60 * MINUTE;
const DAY: u64 = 24 * HOUR;

/// Formats elapsed seconds as `"Xd Yh Zm"`. Minutes are always shown, hours
/// once at least an hour has passed, days once at least a day has passed.
pub fn format_uptime(secs: u64) -> String {
    let days = secs / DAY;
    let hours = (secs % DAY) / HOUR;
    let minutes = (secs % HOUR) / MINUTE;
    if days > 0 {
        format!("{days}d {hours}h {minutes}m")
    } else if hours > 0 {
        format!("{hours}h {minutes}m")
    } else {
        format!("{minutes}m")
    }
}
