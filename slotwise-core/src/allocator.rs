//! SlotAllocator: deterministic assignment of `[start, end)` slots.
//!
//! Tasks are ordered by priority rank and placed one after another on a
//! cursor that only moves forward, inside business hours:
//! weekdays 09:00-18:00 local, with 12:00-13:00 kept free. Each placed slot
//! is followed by a 30 minute gap.
//!
//! The allocator performs no I/O; `now` and the timezone are passed in.

use chrono::{DateTime, Datelike, Duration, NaiveTime, Utc, Weekday};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::constants::{
    DAY_END_HOUR, DAY_START_HOUR, DEFAULT_DURATION_MINUTES, DEFAULT_EVENT_DURATION_HOURS,
    DO_DURATION_MINUTES, LUNCH_END_HOUR, LUNCH_START_HOUR, PLAN_DURATION_MINUTES,
    SLOT_GAP_MINUTES,
};
use crate::task::{Priority, Task, TaskKind};
use crate::time::{ceil_to_minute, local_at};

#[derive(Debug, Clone, Copy)]
pub struct AllocationOptions {
    pub now: DateTime<Utc>,
    /// Maximum number of tasks to place; the rest are left untouched.
    pub limit: Option<usize>,
    /// Recompute slots for every open task, discarding prior assignments.
    pub force_reschedule: bool,
}

impl AllocationOptions {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            now,
            limit: None,
            force_reschedule: false,
        }
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn forced(mut self) -> Self {
        self.force_reschedule = true;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduledSlot {
    pub id: String,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub reasoning: String,
}

/// Result summary returned to the caller of a scheduling request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleSummary {
    pub scheduled_count: usize,
    pub tasks: Vec<ScheduledSlot>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit_message: Option<String>,
}

impl ScheduleSummary {
    pub fn from_slots(slots: Vec<ScheduledSlot>) -> Self {
        Self {
            scheduled_count: slots.len(),
            tasks: slots,
            limit_message: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Allocation {
    /// Placed slots in placement order.
    pub slots: Vec<ScheduledSlot>,
    /// Tasks that were eligible for placement.
    pub eligible: usize,
    /// Eligible tasks left untouched because of the limit.
    pub deferred: usize,
}

#[derive(Debug, Clone, Copy)]
pub struct SlotAllocator {
    tz: Tz,
}

impl SlotAllocator {
    pub fn new(tz: Tz) -> Self {
        Self { tz }
    }

    pub fn timezone(&self) -> Tz {
        self.tz
    }

    /// Number of tasks a run with `force_reschedule` would consider.
    pub fn eligible_count(tasks: &[Task], force_reschedule: bool) -> usize {
        tasks.iter().filter(|t| is_candidate(t, force_reschedule)).count()
    }

    /// Assign slots in place. Returns the placed slots in order.
    pub fn allocate(&self, tasks: &mut [Task], opts: &AllocationOptions) -> Allocation {
        let mut order: Vec<usize> = tasks
            .iter()
            .enumerate()
            .filter(|(_, t)| is_candidate(t, opts.force_reschedule))
            .map(|(i, _)| i)
            .collect();
        let eligible = order.len();

        prioritize(tasks, &mut order);

        let take = opts.limit.map_or(eligible, |l| l.min(eligible));
        let mut cursor = initial_cursor(opts.now, self.tz);
        let mut slots = Vec::with_capacity(take);

        for &idx in order.iter().take(take) {
            let task = &mut tasks[idx];
            let minutes = duration_minutes(task);
            let start = normalize(cursor, minutes, self.tz);
            let end = start + Duration::minutes(minutes);

            let reasoning = format!(
                "'{}' priority {} scheduled for {:.1}h on {} at {}",
                task.priority.label(),
                kind_label(task.kind),
                minutes as f64 / 60.0,
                start.format("%a %Y-%m-%d"),
                start.format("%H:%M"),
            );

            task.start_date = Some(start.with_timezone(&Utc));
            task.end_date = Some(end.with_timezone(&Utc));
            task.scheduling_reasoning = Some(reasoning.clone());

            tracing::debug!(task_id = %task.id, start = %start, end = %end, "slot assigned");

            slots.push(ScheduledSlot {
                id: task.id.clone(),
                start_date: start.with_timezone(&Utc),
                end_date: end.with_timezone(&Utc),
                reasoning,
            });

            cursor = end + Duration::minutes(SLOT_GAP_MINUTES);
        }

        Allocation {
            slots,
            eligible,
            deferred: eligible - take,
        }
    }
}

fn is_candidate(task: &Task, force_reschedule: bool) -> bool {
    task.is_open() && (force_reschedule || !task.has_slot())
}

fn kind_label(kind: TaskKind) -> &'static str {
    match kind {
        TaskKind::Deadline => "deadline",
        TaskKind::Event => "event",
    }
}

/// Slot length in minutes. Events are fixed length regardless of priority.
pub fn duration_minutes(task: &Task) -> i64 {
    match (task.kind, task.priority) {
        (TaskKind::Event, _) => DEFAULT_EVENT_DURATION_HOURS * 60,
        (_, Priority::Do) => DO_DURATION_MINUTES,
        (_, Priority::Plan) => PLAN_DURATION_MINUTES,
        _ => DEFAULT_DURATION_MINUTES,
    }
}

/// Stable sort by rank. Within a rank, tasks carrying a `task_date` are
/// reordered by date among the positions they already occupy; undated tasks
/// keep their relative position.
fn prioritize(tasks: &[Task], order: &mut [usize]) {
    order.sort_by_key(|&i| tasks[i].priority.rank());

    let mut start = 0;
    while start < order.len() {
        let rank = tasks[order[start]].priority.rank();
        let mut end = start;
        while end < order.len() && tasks[order[end]].priority.rank() == rank {
            end += 1;
        }

        let group = &mut order[start..end];
        let positions: Vec<usize> = (0..group.len())
            .filter(|&p| tasks[group[p]].task_date.is_some())
            .collect();
        let mut dated: Vec<usize> = positions.iter().map(|&p| group[p]).collect();
        dated.sort_by_key(|&i| tasks[i].task_date);
        for (p, i) in positions.into_iter().zip(dated) {
            group[p] = i;
        }

        start = end;
    }
}

fn initial_cursor(now: DateTime<Utc>, tz: Tz) -> DateTime<Tz> {
    let local = ceil_to_minute(now.with_timezone(&tz));
    let today = local.date_naive();
    if local.time() >= hm(DAY_END_HOUR) {
        next_day_start(local, tz)
    } else if local.time() < hm(DAY_START_HOUR) {
        local_at(today, DAY_START_HOUR, 0, tz)
    } else {
        local
    }
}

/// Move the cursor forward until a slot of `minutes` fits in business hours.
fn normalize(mut cursor: DateTime<Tz>, minutes: i64, tz: Tz) -> DateTime<Tz> {
    loop {
        let date = cursor.date_naive();
        let time = cursor.time();

        if matches!(cursor.weekday(), Weekday::Sat | Weekday::Sun) || time >= hm(DAY_END_HOUR) {
            cursor = next_day_start(cursor, tz);
            continue;
        }
        if time < hm(DAY_START_HOUR) {
            cursor = local_at(date, DAY_START_HOUR, 0, tz);
            continue;
        }

        let lunch_start = local_at(date, LUNCH_START_HOUR, 0, tz);
        let lunch_end = local_at(date, LUNCH_END_HOUR, 0, tz);
        let end = cursor + Duration::minutes(minutes);

        if cursor >= lunch_start && cursor < lunch_end {
            cursor = lunch_end;
            continue;
        }
        // A slot may not straddle lunch or run past the end of the day.
        if cursor < lunch_start && end > lunch_start {
            cursor = lunch_end;
            continue;
        }
        if end > local_at(date, DAY_END_HOUR, 0, tz) {
            cursor = next_day_start(cursor, tz);
            continue;
        }

        return cursor;
    }
}

fn next_day_start(cursor: DateTime<Tz>, tz: Tz) -> DateTime<Tz> {
    let date = cursor.date_naive();
    let next = date.succ_opt().unwrap_or(date);
    local_at(next, DAY_START_HOUR, 0, tz)
}

fn hm(hour: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(hour, 0, 0).unwrap_or(NaiveTime::MIN)
}
