use std::io::Write as _;
use std::path::PathBuf;

use anyhow::Context as _;
use chrono::{NaiveDate, NaiveDateTime};
use clap::{Parser, Subcommand};
use serde::Serialize;

use telecast::epg::{Guide, hhmm};
use telecast::foundation::time::SECS_PER_DAY;
use telecast::{ResumePoint, Station, elapsed_since_start, resume};

#[derive(Parser, Debug)]
#[command(name = "telecast", version)]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the playlist for one day (dry run).
    Playlist(PlaylistArgs),
    /// Print the program guide for one or more days.
    Guide(GuideArgs),
    /// Find the item and offset that should be on air at a given time.
    Resume(ResumeArgs),
}

#[derive(Parser, Debug)]
struct ScheduleArgs {
    /// Schedule file.
    #[arg(long)]
    program: PathBuf,

    /// Media root; pool sources are resolved below it.
    #[arg(long)]
    sources: PathBuf,

    /// Duration table (`file,duration` CSV, paths relative to --sources).
    #[arg(long)]
    times: Option<PathBuf>,
}

#[derive(Parser, Debug)]
struct PlaylistArgs {
    #[command(flatten)]
    schedule: ScheduleArgs,

    /// Broadcast date (YYYY-MM-DD). Defaults to today.
    #[arg(long)]
    date: Option<NaiveDate>,

    /// Emit JSON instead of text.
    #[arg(long)]
    json: bool,
}

#[derive(Parser, Debug)]
struct GuideArgs {
    #[command(flatten)]
    schedule: ScheduleArgs,

    /// First date (YYYY-MM-DD). Defaults to today.
    #[arg(long)]
    date: Option<NaiveDate>,

    /// Number of consecutive days.
    #[arg(long, default_value_t = 1)]
    days: u32,

    /// Emit JSON instead of text.
    #[arg(long)]
    json: bool,
}

#[derive(Parser, Debug)]
struct ResumeArgs {
    #[command(flatten)]
    schedule: ScheduleArgs,

    /// Wall-clock time, "YYYY-MM-DD HH:MM:SS".
    #[arg(long, value_parser = parse_datetime)]
    at: NaiveDateTime,

    /// Emit JSON instead of text.
    #[arg(long)]
    json: bool,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.cmd {
        Command::Playlist(args) => cmd_playlist(args),
        Command::Guide(args) => cmd_guide(args),
        Command::Resume(args) => cmd_resume(args),
    }
}

fn parse_datetime(s: &str) -> Result<NaiveDateTime, String> {
    NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").map_err(|e| e.to_string())
}

fn today() -> NaiveDate {
    chrono::Local::now().date_naive()
}

fn open_station(args: &ScheduleArgs) -> anyhow::Result<Station> {
    Station::open(&args.program, &args.sources, args.times.as_deref())
        .with_context(|| format!("load schedule '{}'", args.program.display()))
}

fn write_json(value: &impl Serialize) -> anyhow::Result<()> {
    let mut out = std::io::stdout().lock();
    serde_json::to_writer_pretty(&mut out, value).context("write JSON")?;
    writeln!(out)?;
    Ok(())
}

fn cmd_playlist(args: PlaylistArgs) -> anyhow::Result<()> {
    let mut station = open_station(&args.schedule)?;
    let date = args.date.unwrap_or_else(today);
    let day = station
        .day(date)
        .with_context(|| format!("evaluate {date}"))?;

    if args.json {
        return write_json(&day);
    }
    let mut out = std::io::stdout().lock();
    for item in &day.playlist {
        writeln!(
            out,
            "{}  {:>6}s  {}",
            hhmm(day.start_offset_secs() + item.start_secs),
            item.duration_secs,
            item.path
        )?;
    }
    for line in &day.log {
        eprintln!("print: {line}");
    }
    eprintln!(
        "{} ({}): {} items, {}s",
        date,
        day.entry,
        day.playlist.len(),
        day.total_secs()
    );
    Ok(())
}

fn cmd_guide(args: GuideArgs) -> anyhow::Result<()> {
    let mut station = open_station(&args.schedule)?;
    let first = args.date.unwrap_or_else(today);

    let mut guide = Guide::new();
    for date in first.iter_days().take(args.days as usize) {
        let day = station
            .day(date)
            .with_context(|| format!("evaluate {date}"))?;
        guide.add_day(date, &day.epg);
    }

    if args.json {
        return write_json(&guide);
    }
    let mut out = std::io::stdout().lock();
    for (date, entries) in &guide.days {
        writeln!(out, "{date}")?;
        for e in entries {
            writeln!(out, "  {:>7}  {:<20}  {}", e.time_12h, e.group, e.title)?;
        }
    }
    Ok(())
}

#[derive(Serialize)]
struct ResumeReport<'a> {
    date: NaiveDate,
    #[serde(flatten)]
    point: ResumePoint,
    path: Option<&'a str>,
}

fn cmd_resume(args: ResumeArgs) -> anyhow::Result<()> {
    let mut station = open_station(&args.schedule)?;
    let start_hour = station.program().start_hour();
    let date = args.at.date();
    let elapsed = elapsed_since_start(args.at, start_hour);

    // Before the start hour the previous broadcast day may still be running.
    if elapsed < 0
        && let Some(prev) = date.pred_opt()
        && prev >= station.next_day()
    {
        let day = station
            .day(prev)
            .with_context(|| format!("evaluate {prev}"))?;
        let point = resume(&day.playlist, elapsed + SECS_PER_DAY as i64);
        if let ResumePoint::At { index, .. } = point {
            return report(&args, prev, point, Some(day.playlist[index].path.as_str()));
        }
    }

    let day = station
        .day(date)
        .with_context(|| format!("evaluate {date}"))?;
    let point = resume(&day.playlist, elapsed);
    let path = match point {
        ResumePoint::At { index, .. } => Some(day.playlist[index].path.as_str()),
        _ => None,
    };
    report(&args, date, point, path)
}

fn report(
    args: &ResumeArgs,
    date: NaiveDate,
    point: ResumePoint,
    path: Option<&str>,
) -> anyhow::Result<()> {
    if args.json {
        return write_json(&ResumeReport { date, point, path });
    }
    match (point, path) {
        (ResumePoint::At { index, offset_secs }, Some(path)) => {
            println!("{date} #{index} +{offset_secs}s {path}")
        }
        (ResumePoint::Finished, _) => println!("{date} finished"),
        _ => println!("{date} not started"),
    }
    Ok(())
}
