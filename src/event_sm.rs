//! The Event State Machine: tracks current/previous event kinds, drives
//! Header/Footer/Cancel/Reprint transitions, and decides when a Header
//! implies an hour rollover.

use tracing::{debug, info};

use crate::aggregator::{Aggregator, HourWindow};
use crate::config::Dialect;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Other,
    Header,
    Transaction,
    Footer,
}

/// What the caller (the `Engine`'s main loop) must do after feeding a chunk
/// through the state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Directive {
    Continue,
    FlushBeforeContinuing,
}

pub struct EventStateMachine {
    pub state: State,
    current_event_time: Option<String>,
    current_event_hour: Option<u32>,
    previous_event_time: Option<String>,
    /// True from the Header->Transaction transition until the 520 CHANGE
    /// line commits; while true, further Header(520) chunks are spurious
    /// polling artifacts and must be ignored rather than resetting state.
    mid_transaction_520: bool,
}

impl EventStateMachine {
    pub fn new() -> Self {
        EventStateMachine {
            state: State::Other,
            current_event_time: None,
            current_event_hour: None,
            previous_event_time: None,
            mid_transaction_520: false,
        }
    }

    pub fn last_event_time(&self) -> Option<&str> {
        self.current_event_time.as_deref()
    }

    /// `true` while a transaction is open and un-committed; the flush guard
    /// guard on the flush triggers must never fire while this holds.
    pub fn is_mid_transaction(&self) -> bool {
        self.state == State::Transaction
    }

    /// Processes a Header chunk. `hour`/`time` are already extracted by the
    /// caller (420: from the chunk; 520: from the system clock).
    pub fn on_header(
        &mut self,
        dialect: Dialect,
        hour: u32,
        time: String,
        agg: &mut Aggregator,
    ) -> Directive {
        if dialect == Dialect::D520 && self.mid_transaction_520 {
            debug!("ignoring spurious 520 header mid-transaction");
            return Directive::Continue;
        }

        let previous_state = self.state;
        let had_valid_snapshot = agg.has_snapshot();
        if previous_state == State::Transaction && had_valid_snapshot {
            if let Some(prev_time) = self.current_event_time.clone() {
                self.previous_event_time = Some(prev_time);
            }
        }

        let hour_changed = agg
            .current_hour()
            .map(|HourWindow(h)| h != hour)
            .unwrap_or(false);
        let need_flush = hour_changed && agg.current_hour().is_some();

        self.current_event_time = Some(time.clone());
        self.current_event_hour = Some(hour);
        agg.snapshot();

        if agg.row().is_fresh() {
            agg.row_mut().first_transaction = Some(time.clone());
            agg.row_mut().hour = Some(HourWindow(hour));
        }

        self.state = State::Header;
        self.mid_transaction_520 = false;

        if need_flush {
            info!(hour, "header observed hour rollover, flush required");
            Directive::FlushBeforeContinuing
        } else {
            Directive::Continue
        }
    }

    /// A transaction line that looks like a genuine transaction (carries the
    /// currency symbol, or opens with `AMOUNT`) transitions `Header` ->
    /// `Transaction`.
    pub fn note_transaction_line(&mut self, dialect: Dialect) {
        if self.state == State::Header {
            self.state = State::Transaction;
            if dialect == Dialect::D520 {
                self.mid_transaction_520 = true;
            }
        }
    }

    pub fn on_footer(&mut self) {
        if self.state == State::Transaction {
            self.state = State::Footer;
        }
    }

    pub fn on_cancel_or_reprint(&mut self, agg: &mut Aggregator) {
        agg.revert();
    }

    pub fn on_report_refund_or_diagnostic(&mut self) {
        self.state = State::Other;
    }

    pub fn on_no_sale(&mut self, agg: &mut Aggregator) {
        agg.increment_no_sale();
    }

    /// Called when a transaction line commits (TOTAL on 420, CHANGE on 520):
    /// discards the now-stale snapshot and, for 520, clears the
    /// mid-transaction flag so the next Header is accepted normally.
    pub fn on_commit(&mut self, agg: &mut Aggregator) {
        agg.discard_snapshot();
        self.mid_transaction_520 = false;
    }

    pub fn current_event_hour(&self) -> Option<u32> {
        self.current_event_hour
    }

    pub fn take_previous_event_time(&mut self) -> Option<String> {
        self.previous_event_time.take()
    }
}

impl Default for EventStateMachine {
    fn default() -> Self {
        Self::new()
    }
}
