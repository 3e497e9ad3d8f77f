//! Per-move time budgeting.
//!
//! The driver asks for a budget before each search and reports the elapsed
//! time back afterwards. Absolute main time is spread over an estimate of
//! the remaining moves; once it runs out, byo-yomi periods or Canadian
//! stone blocks take over. A lag buffer is always held back for the
//! transport, and a configured constant think time overrides everything.

use std::time::Duration;

use engine_core::Color;

use crate::params::SearchParams;

/// Clock settings as handed over by the front end.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimeControl {
    pub main_time: Duration,
    pub byo_time: Duration,
    /// Stones per byo-yomi block (Canadian); zero means per-move periods.
    pub byo_stones: u32,
    /// Number of byo-yomi periods (Japanese); zero disables.
    pub byo_periods: u32,
}

#[derive(Debug, Clone, Copy)]
struct Clock {
    main_left: Duration,
    byo_left: Duration,
    stones_left: u32,
    periods_left: u32,
}

impl Clock {
    fn new(control: &TimeControl) -> Self {
        Self {
            main_left: control.main_time,
            byo_left: control.byo_time,
            stones_left: control.byo_stones,
            periods_left: control.byo_periods,
        }
    }

    fn in_byo_yomi(&self) -> bool {
        self.main_left.is_zero()
    }
}

/// Tracks both players' clocks and turns them into per-move budgets.
#[derive(Debug, Default)]
pub struct TimeManager {
    control: Option<TimeControl>,
    clocks: [Option<Clock>; 2],
}

impl TimeManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install a time control, resetting both clocks.
    pub fn set_control(&mut self, control: TimeControl) {
        self.clocks = [Some(Clock::new(&control)), Some(Clock::new(&control))];
        self.control = Some(control);
    }

    /// Remove any time control; searches become playout-bounded only.
    pub fn clear_control(&mut self) {
        self.control = None;
        self.clocks = [None, None];
    }

    /// Sync one side's clock from the front end (`time_left` updates).
    /// `stones` is the Canadian stones-remaining count, zero in main time.
    pub fn update_left(&mut self, color: Color, time: Duration, stones: u32) {
        let Some(control) = self.control else {
            return;
        };
        let clock = &mut self.clocks[color.index()];
        let mut updated = Clock::new(&control);
        if stones == 0 {
            updated.main_left = time;
        } else {
            updated.main_left = Duration::ZERO;
            updated.byo_left = time;
            updated.stones_left = stones;
        }
        *clock = Some(updated);
    }

    /// Charge the elapsed search time against a side's clock.
    pub fn consume(&mut self, color: Color, elapsed: Duration) {
        let Some(clock) = self.clocks[color.index()].as_mut() else {
            return;
        };
        if elapsed <= clock.main_left {
            clock.main_left -= elapsed;
            return;
        }
        let overflow = elapsed - clock.main_left;
        clock.main_left = Duration::ZERO;
        if clock.stones_left > 0 {
            // Canadian block: the block clock keeps counting down until the
            // stones are played out.
            clock.byo_left = clock.byo_left.saturating_sub(overflow);
            clock.stones_left = clock.stones_left.saturating_sub(1);
            if clock.stones_left == 0 {
                if let Some(control) = &self.control {
                    clock.byo_left = control.byo_time;
                    clock.stones_left = control.byo_stones;
                }
            }
        } else if clock.periods_left > 0 && overflow > clock.byo_left {
            clock.periods_left -= 1;
        }
    }

    /// The thinking budget for the coming move, or `None` when the search
    /// is bounded by playouts alone.
    pub fn budget(
        &self,
        color: Color,
        num_intersections: usize,
        move_number: u32,
        params: &SearchParams,
    ) -> Option<Duration> {
        let lag = Duration::from_secs_f32(params.lag_buffer_secs.max(0.0));

        if params.const_time_secs > 0.0 {
            let budget = Duration::from_secs_f32(params.const_time_secs);
            return Some(floor_budget(budget.saturating_sub(lag)));
        }

        let clock = self.clocks[color.index()]?;

        let raw = if !clock.in_byo_yomi() {
            // Spread the remaining main time over an estimate of the moves
            // still to come; the estimate shrinks as the game progresses.
            let moves_left = ((num_intersections as u32 * 3 / 5).saturating_sub(move_number)).max(20);
            clock.main_left / moves_left
        } else if clock.stones_left > 0 {
            clock.byo_left / clock.stones_left
        } else if clock.periods_left > 1 {
            // Spare periods allow burning a whole one.
            clock.byo_left
        } else if clock.periods_left == 1 {
            // The last period must never be overrun.
            clock.byo_left.mul_f32(0.9)
        } else {
            Duration::ZERO
        };

        Some(floor_budget(raw.saturating_sub(lag)))
    }

    pub fn control(&self) -> Option<&TimeControl> {
        self.control.as_ref()
    }
}

/// Never report a zero budget; the driver always gets a beat to pick a
/// policy move.
fn floor_budget(budget: Duration) -> Duration {
    budget.max(Duration::from_millis(10))
}
