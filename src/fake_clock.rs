use std::cell::Cell;
use std::rc::Rc;
use std::time::{Duration, Instant};

use crate::Clock;

/// A manually driven clock. Clones share the same current instant, so a test can hand one
/// clone to a container and keep another to move time forward.
#[derive(Clone, Debug)]
pub struct FakeClock {
    cur: Rc<Cell<Instant>>,
}

impl Default for FakeClock {
    fn default() -> Self {
        FakeClock {
            cur: Rc::new(Cell::new(Instant::now())),
        }
    }
}

impl Clock for FakeClock {
    fn now(&self) -> Instant {
        self.cur.get()
    }
}

impl FakeClock {
    pub fn advance(&self, duration: Duration) {
        self.cur.set(self.cur.get() + duration);
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn clones_share_time() {
        let clock = FakeClock::default();
        let other = clock.clone();
        let start = clock.now();

        other.advance(Duration::from_millis(40));
        assert_eq!(clock.now() - start, Duration::from_millis(40));
        assert_eq!(clock.now(), other.now());
    }

    #[test]
    fn time_stands_still_without_advance() {
        let clock = FakeClock::default();
        assert_eq!(clock.now(), clock.now());
    }
}
