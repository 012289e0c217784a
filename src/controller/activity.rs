use std::time::{Duration, Instant};

/// Timed activity classes of the event loop.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub(crate) enum Activity {
    FrameTick,
    CountdownTick,
    CaptureTimeout,
    InitTimeout,
}

impl Activity {
    const ALL: [Activity; 4] = [
        Activity::FrameTick,
        Activity::CountdownTick,
        Activity::CaptureTimeout,
        Activity::InitTimeout,
    ];

    fn slot(self) -> usize {
        self as usize
    }
}

/// At most one pending deadline per activity class.
///
/// Scheduling a class again replaces its previous deadline.
#[derive(Debug, Default)]
pub(crate) struct Scheduler {
    deadlines: [Option<Instant>; 4],
}

impl Scheduler {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn schedule_at(&mut self, activity: Activity, at: Instant) {
        self.deadlines[activity.slot()] = Some(at);
    }

    pub(crate) fn schedule_in(&mut self, activity: Activity, delay: Duration) {
        self.schedule_at(activity, Instant::now() + delay);
    }

    pub(crate) fn cancel(&mut self, activity: Activity) {
        self.deadlines[activity.slot()] = None;
    }

    pub(crate) fn cancel_all(&mut self) {
        self.deadlines = [None; 4];
    }

    pub(crate) fn is_pending(&self, activity: Activity) -> bool {
        self.deadlines[activity.slot()].is_some()
    }

    pub(crate) fn next_deadline(&self) -> Option<Instant> {
        self.deadlines.iter().flatten().min().copied()
    }

    /// Remove and return the earliest activity due at `now`. Ties go to the
    /// class declared first.
    pub(crate) fn pop_due(&mut self, now: Instant) -> Option<Activity> {
        let (activity, _) = Activity::ALL
            .iter()
            .filter_map(|&a| self.deadlines[a.slot()].map(|at| (a, at)))
            .filter(|&(_, at)| at <= now)
            .min_by_key(|&(a, at)| (at, a.slot()))?;
        self.cancel(activity);
        Some(activity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn due_activities_pop_in_deadline_order() {
        let now = Instant::now();
        let mut scheduler = Scheduler::new();
        scheduler.schedule_at(Activity::CaptureTimeout, now);
        scheduler.schedule_at(Activity::FrameTick, now - Duration::from_millis(5));
        scheduler.schedule_at(Activity::InitTimeout, now + Duration::from_secs(1));

        assert_eq!(scheduler.pop_due(now), Some(Activity::FrameTick));
        assert_eq!(scheduler.pop_due(now), Some(Activity::CaptureTimeout));
        assert_eq!(scheduler.pop_due(now), None);
        assert!(scheduler.is_pending(Activity::InitTimeout));
    }

    #[test]
    fn rescheduling_replaces_the_deadline() {
        let now = Instant::now();
        let mut scheduler = Scheduler::new();
        scheduler.schedule_at(Activity::FrameTick, now);
        scheduler.schedule_at(Activity::FrameTick, now + Duration::from_secs(5));
        assert_eq!(scheduler.pop_due(now), None);
        assert_eq!(
            scheduler.next_deadline(),
            Some(now + Duration::from_secs(5))
        );
    }

    #[test]
    fn cancel_all_clears_everything() {
        let mut scheduler = Scheduler::new();
        scheduler.schedule_in(Activity::CountdownTick, Duration::ZERO);
        scheduler.schedule_in(Activity::InitTimeout, Duration::ZERO);
        scheduler.cancel_all();
        assert_eq!(scheduler.next_deadline(), None);
        assert_eq!(scheduler.pop_due(Instant::now()), None);
    }

    #[test]
    fn ties_follow_declaration_order() {
        let now = Instant::now();
        let mut scheduler = Scheduler::new();
        scheduler.schedule_at(Activity::CaptureTimeout, now);
        scheduler.schedule_at(Activity::FrameTick, now);
        assert_eq!(scheduler.pop_due(now), Some(Activity::FrameTick));
    }
}
