//! Idle/Business-Hours Gate: closes output resources and clears ephemeral
//! state on closing, reopens on opening.

use chrono::Timelike;

#[derive(Debug, Clone, Copy)]
pub struct BusinessHoursGate {
    opening_hour: u32,
    closing_hour: u32,
}

impl BusinessHoursGate {
    pub fn new(opening_hour: u32, closing_hour: u32) -> Self {
        BusinessHoursGate {
            opening_hour,
            closing_hour,
        }
    }

    pub fn is_open_at(&self, hour: u32) -> bool {
        if self.opening_hour <= self.closing_hour {
            hour >= self.opening_hour && hour < self.closing_hour
        } else {
            // Wraps past midnight.
            hour >= self.opening_hour || hour < self.closing_hour
        }
    }

    pub fn is_open_now(&self) -> bool {
        self.is_open_at(chrono::Local::now().hour())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ordinary_daytime_window() {
        let gate = BusinessHoursGate::new(7, 22);
        assert!(!gate.is_open_at(6));
        assert!(gate.is_open_at(7));
        assert!(gate.is_open_at(21));
        assert!(!gate.is_open_at(22));
    }

    #[test]
    fn wrapping_window_past_midnight() {
        let gate = BusinessHoursGate::new(20, 2);
        assert!(gate.is_open_at(23));
        assert!(gate.is_open_at(1));
        assert!(!gate.is_open_at(10));
    }
}
