use chrono::{DateTime, Datelike, Days, NaiveDate, NaiveTime, Utc};
use hmon_common::types::{MaintenanceScope, MaintenanceWindow, Recurrence};
use std::collections::HashSet;

/// Active maintenance windows, queried per device.
#[derive(Debug, Clone, Default)]
pub struct MaintenanceCalendar {
    windows: Vec<MaintenanceWindow>,
}

impl MaintenanceCalendar {
    /// Keeps only windows flagged `active`.
    pub fn new(windows: Vec<MaintenanceWindow>) -> Self {
        Self {
            windows: windows.into_iter().filter(|w| w.active).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.windows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.windows.is_empty()
    }

    /// Whether the device, directly, through one of its groups, or through a
    /// global window, is under maintenance at `now`.
    pub fn is_in_maintenance(&self, device_id: &str, group_ids: &[String], now: DateTime<Utc>) -> bool {
        self.active_window_for(device_id, group_ids, now).is_some()
    }

    /// First window currently covering the device.
    pub fn active_window_for(
        &self,
        device_id: &str,
        group_ids: &[String],
        now: DateTime<Utc>,
    ) -> Option<&MaintenanceWindow> {
        self.windows
            .iter()
            .find(|w| covers(w, device_id, group_ids, now))
    }

    /// Metrics keep flowing unless a covering window turns collection off.
    pub fn should_collect_data(&self, device_id: &str, group_ids: &[String], now: DateTime<Utc>) -> bool {
        self.windows
            .iter()
            .filter(|w| covers(w, device_id, group_ids, now))
            .all(|w| w.collect_data)
    }

    /// Ids of every device under maintenance at `now`. Each entry pairs a
    /// device id with its host group ids.
    pub fn suppressed_devices<'a, I>(&self, devices: I, now: DateTime<Utc>) -> HashSet<String>
    where
        I: IntoIterator<Item = (&'a str, &'a [String])>,
    {
        devices
            .into_iter()
            .filter(|(device_id, groups)| self.is_in_maintenance(device_id, groups, now))
            .map(|(device_id, _)| device_id.to_string())
            .collect()
    }
}

fn covers(window: &MaintenanceWindow, device_id: &str, group_ids: &[String], now: DateTime<Utc>) -> bool {
    let in_scope = match &window.scope {
        MaintenanceScope::All => true,
        MaintenanceScope::Device(id) => id == device_id,
        MaintenanceScope::Hostgroup(id) => group_ids.iter().any(|g| g == id),
    };
    in_scope && is_open(window, now)
}

/// Whether `now` falls inside the window, honouring recurrence.
///
/// A recurring window repeats the time-of-day span of `start_time`..`end_time`
/// on every day (daily) or on `start_time`'s weekday (weekly), starting from
/// `start_time`'s date. A span whose end is before its start wraps midnight
/// and belongs to the day it started on.
pub fn is_open(window: &MaintenanceWindow, now: DateTime<Utc>) -> bool {
    if window.recurrence == Recurrence::None {
        return window.start_time <= now && now <= window.end_time;
    }

    let start = window.start_time.time();
    let end = window.end_time.time();
    let Some(day) = occurrence_day(start, end, now) else {
        return false;
    };
    if day < window.start_time.date_naive() {
        return false;
    }
    match window.recurrence {
        Recurrence::Weekly => day.weekday() == window.start_time.weekday(),
        _ => true,
    }
}

fn occurrence_day(start: NaiveTime, end: NaiveTime, now: DateTime<Utc>) -> Option<NaiveDate> {
    let time = now.time();
    let today = now.date_naive();
    if start <= end {
        return (start <= time && time <= end).then_some(today);
    }
    if time >= start {
        Some(today)
    } else if time <= end {
        today.checked_sub_days(Days::new(1))
    } else {
        None
    }
}
