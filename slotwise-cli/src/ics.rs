use chrono::{DateTime, Utc};
use slotwise_core::Task;

/// Emit a minimal ICS calendar with one VEVENT per scheduled task.
///
/// DTSTART/DTEND are UTC. UIDs derive from the task id so re-importing the
/// file updates events instead of duplicating them.
pub fn tasks_to_ics(tasks: &[Task], stamp: DateTime<Utc>) -> String {
    let mut s = String::new();
    s.push_str("BEGIN:VCALENDAR\r\nVERSION:2.0\r\nPRODID:-//Slotwise//EN\r\n");

    for t in tasks.iter().filter(|t| t.is_open()) {
        let (Some(start), Some(end)) = (t.start_date, t.end_date) else { continue };

        s.push_str("BEGIN:VEVENT\r\n");
        s.push_str(&format!("UID:{}@slotwise\r\n", escape_ics(&t.id)));
        s.push_str(&format!("DTSTAMP:{}\r\n", stamp.format("%Y%m%dT%H%M%SZ")));
        s.push_str(&format!("DTSTART:{}\r\n", start.format("%Y%m%dT%H%M%SZ")));
        s.push_str(&format!("DTEND:{}\r\n", end.format("%Y%m%dT%H%M%SZ")));
        s.push_str(&format!("SUMMARY:{}\r\n", escape_ics(&t.title)));
        if let Some(reason) = &t.scheduling_reasoning {
            s.push_str(&format!("DESCRIPTION:{}\r\n", escape_ics(reason)));
        }
        s.push_str("END:VEVENT\r\n");
    }

    s.push_str("END:VCALENDAR\r\n");
    s
}

fn escape_ics(s: &str) -> String {
    s.replace('\\', "\\\\")
        .replace('\n', "\\n")
        .replace(',', "\\,")
        .replace(';', "\\;")
}
