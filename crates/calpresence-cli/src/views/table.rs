use crate::timezone::format_in_zone;
use calpresence_core::recurrence::Occurrence;
use chrono::{DateTime, Utc};
use chrono_humanize::Humanize;
use chrono_tz::Tz;
use comfy_table::{Cell, Color, Row, Table};

pub fn display_occurrences(occurrences: &[Occurrence], now: DateTime<Utc>, tz: Tz) {
    if occurrences.is_empty() {
        println!("No upcoming occurrences.");
        return;
    }

    let mut table = Table::new();
    table.set_header(vec!["#", "Start", "End", "Minutes", "When", "Source"]);

    for (index, occurrence) in occurrences.iter().enumerate() {
        let mut row = Row::new();
        row.add_cell(Cell::new(index + 1));

        let start_cell = Cell::new(format_in_zone(occurrence.start, tz));
        let start_cell = if occurrence.start <= now && now < occurrence.end {
            start_cell.fg(Color::Green)
        } else {
            start_cell
        };
        row.add_cell(start_cell);
        row.add_cell(Cell::new(format_in_zone(occurrence.end, tz)));
        row.add_cell(Cell::new((occurrence.end - occurrence.start).num_minutes()));

        let when = if occurrence.start <= now && now < occurrence.end {
            "in progress".to_string()
        } else {
            (occurrence.start - now).humanize()
        };
        row.add_cell(Cell::new(when));

        row.add_cell(if occurrence.from_exception {
            Cell::new("exception").fg(Color::Yellow)
        } else {
            Cell::new("series")
        });
        table.add_row(row);
    }

    println!("{table}");
}

pub fn display_zone_map(entries: &[(&str, &str)]) {
    if entries.is_empty() {
        println!("No matching time zones.");
        return;
    }

    let mut table = Table::new();
    table.set_header(vec!["Windows name", "IANA zone"]);
    for (windows, iana) in entries {
        table.add_row(vec![Cell::new(windows), Cell::new(iana)]);
    }
    println!("{table}");
}

/// Presence transitions seen during a watch run.
pub fn display_transitions(transitions: &[(DateTime<Utc>, bool)], tz: Tz) {
    if transitions.is_empty() {
        println!("Presence never changed.");
        return;
    }

    let mut table = Table::new();
    table.set_header(vec!["Time", "In meeting"]);
    for (at, in_meeting) in transitions {
        let state = if *in_meeting {
            Cell::new("yes").fg(Color::Green)
        } else {
            Cell::new("no").fg(Color::DarkGrey)
        };
        table.add_row(vec![Cell::new(format_in_zone(*at, tz)), state]);
    }
    println!("{table}");
}
