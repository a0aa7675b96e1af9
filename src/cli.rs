use std::{
    io,
    path::PathBuf,
    thread,
    time::Instant,
};

use chrono::{NaiveDate, Utc};
use clap::{CommandFactory, Parser, Subcommand, ValueEnum};
use clap_complete::Shell;
use log::{info, warn};

use crate::{
    calendar::SystemClock,
    category::Color,
    config::Settings,
    error::{Error, Result},
    logging,
    report::{ReportPeriod, export_csv, export_json, format_duration},
    storage::{self, FileStore},
    timesheet::Timesheet,
};

#[derive(Parser, Debug)]
#[command(name = "daytally")]
#[command(about = "Per-category, per-day time tracking", long_about = None)]
pub struct Cli {
    #[arg(long, global = true, help = "Directory holding categories.json and tracks.json")]
    pub data_dir: Option<PathBuf>,

    #[arg(long, global = true, help = "Log level (trace, debug, info, warn, error)")]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    #[command(subcommand, about = "Manage categories")]
    Category(CategoryCommand),

    #[command(about = "Start tracking a category, stopping any other")]
    Start {
        #[arg(help = "Category title")]
        category: String,
    },

    #[command(about = "Stop tracking")]
    Stop,

    #[command(about = "Show what is running and today's totals")]
    Status {
        #[arg(long, help = "Keep printing the running track every refresh interval")]
        watch: bool,
    },

    #[command(about = "Overwrite the recorded time of a category on a day")]
    Set {
        #[arg(help = "Category title")]
        category: String,

        #[arg(help = "Day as YYYY-MM-DD")]
        date: NaiveDate,

        #[arg(help = "Duration in seconds")]
        seconds: u32,
    },

    #[command(about = "Show a time report")]
    Report {
        #[arg(
            long,
            help = "Show today's time",
            conflicts_with_all = ["week", "month"]
        )]
        today: bool,

        #[arg(
            long,
            help = "Show last 7 days",
            conflicts_with_all = ["today", "month"]
        )]
        week: bool,

        #[arg(
            long,
            help = "Show last 30 days",
            conflicts_with_all = ["today", "week"]
        )]
        month: bool,
    },

    #[command(about = "Export categories and tracks")]
    Export {
        #[arg(long, value_enum, help = "Export format")]
        format: ExportFormat,

        #[arg(long, short, help = "Output path")]
        out: Option<PathBuf>,
    },

    #[command(about = "Generate shell completions")]
    Completions {
        #[arg(value_enum, help = "Shell type")]
        shell: Shell,
    },
}

#[derive(Subcommand, Debug)]
pub enum CategoryCommand {
    #[command(about = "Add a category")]
    Add {
        title: String,

        #[arg(long, help = "Color as #rrggbb; defaults to the next palette color")]
        color: Option<Color>,

        #[arg(long, help = "Position in the list; defaults to the end")]
        index: Option<usize>,
    },

    #[command(about = "Rename a category")]
    Rename { title: String, new_title: String },

    #[command(about = "Remove a category and all of its tracks")]
    Remove { title: String },

    #[command(about = "Move a category to another position")]
    Move { title: String, to: usize },

    #[command(about = "Change the color of a category")]
    Color { title: String, color: Color },

    #[command(about = "List categories in order")]
    List,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum ExportFormat {
    Json,
    Csv,
}

/// Defaults, then `config.json`, then command-line flags.
pub fn resolve_settings(cli: &Cli) -> Result<Settings> {
    let mut settings = Settings::load(&Settings::default_path())?;
    if let Some(data_dir) = &cli.data_dir {
        settings.data_dir = data_dir.clone();
    }
    if let Some(log_level) = &cli.log_level {
        settings.log_level = log_level.clone();
    }
    settings.validate()?;
    Ok(settings)
}

pub fn open_timesheet(settings: &Settings) -> Result<Timesheet> {
    let store = FileStore::open(&settings.data_dir)?;
    let timesheet = Timesheet::open(Box::new(store), settings.calendar()?, Box::new(SystemClock))?;
    Ok(timesheet.with_refresh_interval(settings.refresh_interval()))
}

fn category_command(timesheet: &mut Timesheet, command: CategoryCommand) -> Result<()> {
    match command {
        CategoryCommand::Add {
            title,
            color,
            index,
        } => {
            let category = timesheet.add_category(&title, color, index)?;
            println!("Added category '{}' ({})", category.title, category.color);
        }
        CategoryCommand::Rename { title, new_title } => {
            timesheet.rename_category(&title, &new_title)?;
            println!("Renamed '{}' to '{}'", title, new_title.trim());
        }
        CategoryCommand::Remove { title } => {
            let removed = timesheet.remove_category_named(&title)?;
            println!("Removed category '{}' and its tracks", removed.title);
        }
        CategoryCommand::Move { title, to } => {
            let id = timesheet.category_id(&title)?;
            let from = timesheet
                .registry()
                .position(id)
                .ok_or_else(|| Error::UnknownCategory(title.clone()))?;
            timesheet.move_category(from, to)?;
            println!("Moved '{}' to position {}", title, to);
        }
        CategoryCommand::Color { title, color } => {
            timesheet.recolor_category(&title, color)?;
            println!("Set color of '{}' to {}", title, color);
        }
        CategoryCommand::List => {
            if timesheet.registry().is_empty() {
                println!("No categories yet. Add one with `daytally category add <title>`.");
            }
            for (index, category) in timesheet.registry().iter().enumerate() {
                println!("{:>3}  {}  {}", index, category.color, category.title);
            }
        }
    }
    Ok(())
}

fn print_status(timesheet: &mut Timesheet) -> Result<()> {
    let today = timesheet.today();
    match (timesheet.running_category(), timesheet.running_track()?) {
        (Some(category), Some(track)) => println!(
            "Running: {} ({})",
            category.title,
            format_duration(track.duration().into())
        ),
        _ => println!("Nothing is running"),
    }

    let tracks = timesheet.tracks()?;
    println!("{}", "-".repeat(40));
    for category in timesheet.registry().iter() {
        let seconds = tracks
            .iter()
            .find(|track| track.category() == category.id && track.day() == today)
            .map(|track| track.duration())
            .unwrap_or(0);
        println!("{:28} {}", category.title, format_duration(seconds.into()));
    }
    Ok(())
}

fn watch_status(timesheet: &mut Timesheet) -> Result<()> {
    let Some(interval) = timesheet.refresh_timer().map(|timer| timer.interval()) else {
        println!("Nothing is running");
        return Ok(());
    };

    loop {
        thread::sleep(interval);
        if timesheet.refresh_timer().is_none() {
            return Ok(());
        }
        if let Some(track) = timesheet.poll_refresh(Instant::now())? {
            println!("{}  {}", track.day(), format_duration(track.duration().into()));
        }
    }
}

fn report(timesheet: &mut Timesheet, period: ReportPeriod) -> Result<()> {
    let summary = timesheet.report(period)?;

    println!(
        "{} ({} to {})",
        period.title(),
        summary.first_day,
        summary.last_day
    );
    println!("{}", "-".repeat(40));
    for entry in &summary.entries {
        println!(
            "{:28} {}",
            entry.category_name,
            format_duration(entry.elapsed_seconds)
        );
    }
    println!("{}", "-".repeat(40));
    println!("{:28} {}", "TOTAL", format_duration(summary.total_seconds));
    Ok(())
}

fn export_data(
    timesheet: &mut Timesheet,
    format: ExportFormat,
    out_path: Option<PathBuf>,
) -> Result<()> {
    let tracks = timesheet.tracks()?;
    let content = match format {
        ExportFormat::Json => export_json(&tracks, timesheet.registry(), Utc::now())?,
        ExportFormat::Csv => export_csv(&tracks, timesheet.registry())?,
    };

    match out_path {
        Some(path) => {
            storage::atomic_write(&path, content.as_bytes(), 0)?;
            info!(
                "event=export module=cli status=ok path={} tracks={}",
                path.display(),
                tracks.len()
            );
            println!("Exported to {}", path.display());
        }
        None => println!("{}", content),
    }
    Ok(())
}

pub fn run(cli: Cli) -> Result<()> {
    if let Command::Completions { shell } = cli.command {
        clap_complete::generate(shell, &mut Cli::command(), "daytally", &mut io::stdout());
        return Ok(());
    }

    let settings = resolve_settings(&cli)?;
    if let Err(err) = logging::init_logging(&settings.log_level, &settings.log_dir) {
        eprintln!("Warning: logging disabled: {}", err);
    }

    let mut timesheet = open_timesheet(&settings)?;
    match cli.command {
        Command::Category(command) => category_command(&mut timesheet, command),
        Command::Start { category } => {
            let track = timesheet.start(&category)?;
            println!(
                "Tracking '{}' (today so far: {})",
                category.trim(),
                format_duration(track.duration().into())
            );
            Ok(())
        }
        Command::Stop => {
            match timesheet.stop()? {
                Some(track) => println!(
                    "Stopped. Today's total: {}",
                    format_duration(track.duration().into())
                ),
                None => println!("Nothing is running"),
            }
            Ok(())
        }
        Command::Status { watch } => {
            print_status(&mut timesheet)?;
            if watch {
                watch_status(&mut timesheet)?;
            }
            Ok(())
        }
        Command::Set {
            category,
            date,
            seconds,
        } => {
            let track = timesheet.set_duration(&category, date, seconds)?;
            println!(
                "Set '{}' on {} to {}",
                category.trim(),
                track.day(),
                format_duration(track.duration().into())
            );
            Ok(())
        }
        Command::Report { week, month, .. } => {
            let period = if month {
                ReportPeriod::Month
            } else if week {
                ReportPeriod::Week
            } else {
                ReportPeriod::Today
            };
            report(&mut timesheet, period)
        }
        Command::Export { format, out } => export_data(&mut timesheet, format, out),
        Command::Completions { .. } => Ok(()),
    }
}

pub fn run_cli() {
    let cli = Cli::parse();
    if let Err(e) = run(cli) {
        warn!("event=cli_run module=cli status=error error={}", e);
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
