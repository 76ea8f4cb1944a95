use ansi_term::{Colour, Style};
use anyhow::Result;
use chrono::{Local, NaiveDate, TimeDelta};
use clap::Parser;
use serde::Serialize;

use crate::{
    daemon::{
        config::load_config,
        storage::{
            activity_storage::{ActivityStorage, FileActivityStorage},
            entities::{
                ActivitySnapshot, DailyActivityData, Session, SessionKind, MAX_SECONDS_PER_HOUR,
                MINUTES_PER_HOUR,
            },
        },
    },
    utils::{
        dir::AppPaths,
        percentage::seconds_percentage,
        time::{date_to_key, format_duration, key_to_date},
    },
};

const BAR_WIDTH: usize = 30;

#[derive(Debug, Parser)]
pub struct DayCommand {
    #[arg(
        value_parser = parse_date,
        help = "Day to show as yyyy-mm-dd. Defaults to today"
    )]
    date: Option<NaiveDate>,
    #[arg(
        long,
        short = 'a',
        conflicts_with = "date",
        help = "Show the day this many days ago"
    )]
    days_ago: Option<u32>,
    #[arg(
        long,
        value_parser = clap::value_parser!(u32).range(0..24),
        help = "Show activity of a single hour minute by minute"
    )]
    hour: Option<u32>,
    #[arg(long, help = "Print the report as json")]
    json: bool,
}

impl DayCommand {
    pub fn today() -> Self {
        Self {
            date: None,
            days_ago: None,
            hour: None,
            json: false,
        }
    }
}

fn parse_date(value: &str) -> Result<NaiveDate, String> {
    key_to_date(value).ok_or_else(|| format!("{value} is not a yyyy-mm-dd date"))
}

fn resolve_date(date: Option<NaiveDate>, days_ago: Option<u32>, today: NaiveDate) -> NaiveDate {
    match (date, days_ago) {
        (Some(date), _) => date,
        (None, Some(days)) => today - TimeDelta::days(days.into()),
        (None, None) => today,
    }
}

/// Everything known about a day, including metrics derived from its record.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct DayReport {
    date: NaiveDate,
    total_active_seconds: u32,
    total_rest_seconds: u32,
    peak_hour: Option<u32>,
    peak_time: Option<String>,
    focus_rest_ratio: f64,
    focus_session_count: u32,
    rest_session_count: u32,
    hourly: Vec<u32>,
    sessions: Vec<Session>,
    /// Work time of the focus session in progress, only for the day the daemon is tracking.
    #[serde(skip_serializing_if = "Option::is_none")]
    current_work_time: Option<u32>,
}

impl DayReport {
    fn new(date: NaiveDate, day: Option<&DailyActivityData>, snapshot: Option<&ActivitySnapshot>) -> Self {
        let empty = DailyActivityData::new(date_to_key(date));
        let day = day.unwrap_or(&empty);
        let current_work_time = snapshot
            .filter(|s| s.last_tick_day.as_deref() == Some(day.date_key()))
            .map(|s| s.work_time);

        Self {
            date,
            total_active_seconds: day.cumulative_focus_seconds(),
            total_rest_seconds: day.cumulative_rest_seconds(),
            peak_hour: day.peak_hour(),
            peak_time: day.peak_time(),
            focus_rest_ratio: day.focus_rest_ratio(),
            focus_session_count: day.focus_session_count(),
            rest_session_count: day.rest_session_count(),
            hourly: day.hourly().to_vec(),
            sessions: day.sessions().to_vec(),
            current_work_time,
        }
    }
}

/// Minute activity of one hour. The hour the daemon is in is only present in the snapshot.
fn minutes_for_hour(
    day: Option<&DailyActivityData>,
    snapshot: Option<&ActivitySnapshot>,
    date_key: &str,
    hour: u32,
) -> Vec<u32> {
    let live = snapshot.filter(|s| {
        s.last_tick_day.as_deref() == Some(date_key) && s.last_tick_hour == Some(hour)
    });
    if let Some(snapshot) = live {
        return snapshot.minute_activity.clone();
    }
    day.and_then(|d| d.minute_history_for(hour))
        .map_or_else(|| vec![0; MINUTES_PER_HOUR], <[u32]>::to_vec)
}

fn bar(part: u32, whole: u32, width: usize) -> String {
    let filled = if whole == 0 {
        0
    } else {
        ((part.min(whole) as f64 / whole as f64) * width as f64).round() as usize
    };
    format!("{}{}", "█".repeat(filled), " ".repeat(width - filled))
}

/// Parses a `RRGGBB` theme color.
fn theme_colour(hex: &str) -> Option<Colour> {
    let hex = hex.trim_start_matches('#');
    if hex.len() != 6 {
        return None;
    }
    let value = u32::from_str_radix(hex, 16).ok()?;
    Some(Colour::RGB(
        (value >> 16) as u8,
        (value >> 8) as u8,
        value as u8,
    ))
}

/// Command to process `day` and `today` commands. Reads whatever the daemon has persisted, so the
/// hour in progress is at most one save interval old.
pub async fn process_day_command(
    DayCommand {
        date,
        days_ago,
        hour,
        json,
    }: DayCommand,
    paths: &AppPaths,
) -> Result<()> {
    let date = resolve_date(date, days_ago, Local::now().date_naive());
    let date_key = date_to_key(date);
    let storage = FileActivityStorage::new(paths.clone())?;
    let days = storage.load_daily().await;
    let snapshot = storage.load_snapshot().await;
    let day = days.get(&date_key);
    let config = load_config(&paths.config()).await;
    let accent = theme_colour(&config.theme_color).unwrap_or(Colour::Yellow);

    if let Some(hour) = hour {
        let minutes = minutes_for_hour(day, snapshot.as_ref(), &date_key, hour);
        if json {
            println!("{}", serde_json::to_string(&minutes)?);
        } else {
            print_hour(hour, &minutes, accent);
        }
        return Ok(());
    }

    let report = DayReport::new(date, day, snapshot.as_ref());
    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_day(&report, &config.user_name, accent);
    }
    Ok(())
}

fn print_day(report: &DayReport, user_name: &str, accent: Colour) {
    let bold = Style::new().bold();
    if user_name.is_empty() {
        println!("{}", bold.paint(report.date.format("%A, %-d %B %Y").to_string()));
    } else {
        println!(
            "{}",
            bold.paint(format!("{}, {user_name}", report.date.format("%A, %-d %B %Y")))
        );
    }

    if report.total_active_seconds == 0 && report.sessions.is_empty() {
        println!("No activity recorded");
        return;
    }

    println!(
        "Active\t{}\tpeak {}",
        format_duration(report.total_active_seconds),
        report.peak_time.as_deref().unwrap_or("-")
    );
    println!(
        "Rest\t{}\tratio {:.1}",
        format_duration(report.total_rest_seconds),
        report.focus_rest_ratio
    );
    println!(
        "Sessions\t{} focus, {} rest",
        report.focus_session_count, report.rest_session_count
    );
    if let Some(work_time) = report.current_work_time {
        println!("Current focus\t{}", format_duration(work_time));
    }
    println!();

    let active_hours = report
        .hourly
        .iter()
        .enumerate()
        .filter(|(_, seconds)| **seconds > 0)
        .map(|(hour, _)| hour);
    if let (Some(first), Some(last)) = (active_hours.clone().min(), active_hours.max()) {
        for hour in first..=last {
            let seconds = report.hourly[hour];
            let paint = if Some(hour as u32) == report.peak_hour {
                accent.bold()
            } else {
                accent.normal()
            };
            println!(
                "{hour:02}:00 |{}| {:>4} {}",
                paint.paint(bar(seconds, MAX_SECONDS_PER_HOUR, BAR_WIDTH)),
                seconds_percentage(seconds, MAX_SECONDS_PER_HOUR).to_string(),
                format_duration(seconds)
            );
        }
        println!();
    }

    for session in &report.sessions {
        let start = session.start_time.with_timezone(&Local);
        let kind = match session.kind {
            SessionKind::Focus => accent.paint("focus"),
            SessionKind::Rest => Colour::Green.paint("rest "),
        };
        println!(
            "{}\t{kind}\t{}",
            start.format("%H:%M"),
            format_duration(session.duration_sec)
        );
    }
}

fn print_hour(hour: u32, minutes: &[u32], accent: Colour) {
    for (minute, seconds) in minutes.iter().enumerate() {
        println!(
            "{hour:02}:{minute:02} |{}| {seconds}s",
            accent.paint(bar(*seconds, 60, BAR_WIDTH / 2))
        );
    }
}
