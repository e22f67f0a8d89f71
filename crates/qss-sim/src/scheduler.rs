//! The scheduler primitives the integrator consumes, and a reference
//! calendar implementing them.

use std::collections::BTreeSet;

use qss_core::{ActorId, SimTime};
use tracing::trace;

use crate::director::QssDirector;
use crate::error::{SimError, SimResult};

/// What an integrator needs from the discrete-event scheduler around it.
pub trait Scheduler {
    fn name(&self) -> &str;

    fn current_time(&self) -> SimTime;

    fn model_stop_time(&self) -> SimTime;

    /// Ask for `owner` to be fired at `t`.
    fn fire_at(&mut self, owner: ActorId, t: SimTime) -> SimResult<()>;

    /// Withdraw an earlier request. Unknown requests are ignored.
    fn cancel_fire_at(&mut self, owner: ActorId, t: SimTime);

    /// The QSS configuration, when this scheduler supports the protocol.
    fn qss_director(&self) -> Option<&QssDirector>;
}

/// Time-ordered set of pending (time, actor) firings.
///
/// Requests are unique by identity, so asking twice for the same firing
/// leaves one entry.
#[derive(Debug, Clone)]
pub struct EventCalendar {
    now: SimTime,
    stop_time: SimTime,
    director: Option<QssDirector>,
    pending: BTreeSet<(SimTime, ActorId)>,
}

impl EventCalendar {
    /// Calendar carrying a QSS director; the run window is the director's.
    pub fn with_director(director: QssDirector) -> Self {
        Self {
            now: director.start_time(),
            stop_time: director.stop_time(),
            director: Some(director),
            pending: BTreeSet::new(),
        }
    }

    /// Calendar without QSS support.
    pub fn plain(start: SimTime, stop_time: SimTime) -> Self {
        Self {
            now: start,
            stop_time,
            director: None,
            pending: BTreeSet::new(),
        }
    }

    pub fn director(&self) -> Option<&QssDirector> {
        self.director.as_ref()
    }

    pub fn next_time(&self) -> Option<SimTime> {
        self.pending.first().map(|(t, _)| *t)
    }

    /// Move to the earliest pending time and take every firing due then.
    ///
    /// Returns `None` when nothing is pending or the next firing is past the
    /// stop time.
    pub fn advance(&mut self) -> Option<(SimTime, Vec<ActorId>)> {
        let t = self.next_time()?;
        if t > self.stop_time {
            return None;
        }
        let mut due = Vec::new();
        while let Some((when, actor)) = self.pending.first().copied() {
            if when != t {
                break;
            }
            self.pending.pop_first();
            due.push(actor);
        }
        self.now = t;
        trace!(%t, count = due.len(), "calendar advanced");
        Some((t, due))
    }

    /// Pending firing times for one actor, earliest first.
    pub fn pending_for(&self, owner: ActorId) -> Vec<SimTime> {
        self.pending
            .iter()
            .filter(|(_, actor)| *actor == owner)
            .map(|(t, _)| *t)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

impl Scheduler for EventCalendar {
    fn name(&self) -> &str {
        if self.director.is_some() {
            "QSS event calendar"
        } else {
            "event calendar"
        }
    }

    fn current_time(&self) -> SimTime {
        self.now
    }

    fn model_stop_time(&self) -> SimTime {
        self.stop_time
    }

    fn fire_at(&mut self, owner: ActorId, t: SimTime) -> SimResult<()> {
        if t < self.now {
            return Err(SimError::FireInPast {
                actor: owner,
                requested: t,
                now: self.now,
            });
        }
        trace!(actor = %owner, %t, "fire_at");
        self.pending.insert((t, owner));
        Ok(())
    }

    fn cancel_fire_at(&mut self, owner: ActorId, t: SimTime) {
        if self.pending.remove(&(t, owner)) {
            trace!(actor = %owner, %t, "cancel_fire_at");
        }
    }

    fn qss_director(&self) -> Option<&QssDirector> {
        self.director.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use qss_core::ActorIdAllocator;

    use super::*;

    fn at(secs: f64) -> SimTime {
        SimTime::new(secs).unwrap()
    }

    #[test]
    fn advance_takes_all_firings_of_the_earliest_time() {
        let mut ids = ActorIdAllocator::new();
        let (a, b) = (ids.allocate(), ids.allocate());
        let mut calendar = EventCalendar::plain(at(0.0), at(10.0));
        calendar.fire_at(b, at(1.0)).unwrap();
        calendar.fire_at(a, at(1.0)).unwrap();
        calendar.fire_at(a, at(2.0)).unwrap();

        let (t, due) = calendar.advance().unwrap();
        assert_eq!(t, at(1.0));
        assert_eq!(due, vec![a, b]);
        assert_eq!(calendar.current_time(), at(1.0));
        assert_eq!(calendar.pending_for(a), vec![at(2.0)]);
    }

    #[test]
    fn cancel_is_exact_and_idempotent() {
        let mut ids = ActorIdAllocator::new();
        let a = ids.allocate();
        let mut calendar = EventCalendar::plain(at(0.0), at(10.0));
        calendar.fire_at(a, at(1.0)).unwrap();
        calendar.cancel_fire_at(a, at(1.5));
        assert_eq!(calendar.len(), 1);
        calendar.cancel_fire_at(a, at(1.0));
        calendar.cancel_fire_at(a, at(1.0));
        assert!(calendar.is_empty());
    }

    #[test]
    fn duplicate_requests_collapse() {
        let mut ids = ActorIdAllocator::new();
        let a = ids.allocate();
        let mut calendar = EventCalendar::plain(at(0.0), at(10.0));
        calendar.fire_at(a, at(3.0)).unwrap();
        calendar.fire_at(a, at(3.0)).unwrap();
        assert_eq!(calendar.pending_for(a).len(), 1);
    }

    #[test]
    fn past_requests_are_rejected() {
        let mut ids = ActorIdAllocator::new();
        let a = ids.allocate();
        let mut calendar = EventCalendar::plain(at(5.0), at(10.0));
        assert!(matches!(
            calendar.fire_at(a, at(4.0)),
            Err(SimError::FireInPast { .. })
        ));
    }

    #[test]
    fn firings_after_stop_are_not_delivered() {
        let mut ids = ActorIdAllocator::new();
        let a = ids.allocate();
        let mut calendar = EventCalendar::plain(at(0.0), at(1.0));
        calendar.fire_at(a, at(2.0)).unwrap();
        assert!(calendar.advance().is_none());
        assert_eq!(calendar.current_time(), at(0.0));
    }

    #[test]
    fn plain_calendar_has_no_director() {
        let calendar = EventCalendar::plain(at(0.0), at(1.0));
        assert!(calendar.qss_director().is_none());
        let calendar = EventCalendar::with_director(QssDirector::new());
        assert!(calendar.qss_director().is_some());
    }
}
