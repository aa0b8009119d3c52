// src/cli.rs

use crate::date::{parse_timezone_entry, Locale, TimezoneTable};
use chrono::FixedOffset;
use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// HTML file containing the conversation
    #[arg(short, long, value_name = "FILE")]
    pub filename: PathBuf,

    /// Locale the export was written in, used for month names
    #[arg(long, value_enum, default_value_t = Locale::EnUs)]
    pub src_locale: Locale,

    /// Locale for the chart and summary labels
    #[arg(long, value_enum, default_value_t = Locale::EnUs)]
    pub dst_locale: Locale,

    /// Where extracted conversations are cached [default: cache/ next to the executable]
    #[arg(long, value_name = "DIR")]
    pub cache_dir: Option<PathBuf>,

    /// Path of the rendered PNG chart
    #[arg(short, long, default_value = "message_analysis.png")]
    pub output: PathBuf,

    /// Width of the output image in pixels
    #[arg(long, default_value_t = 1280)]
    pub width: u32,

    /// Height of the output image in pixels
    #[arg(long, default_value_t = 720)]
    pub height: u32,

    /// Extra timezone label, e.g. `UTC+02=+02:00`. May be repeated
    #[arg(long = "timezone", value_name = "LABEL=OFFSET", value_parser = parse_timezone_entry)]
    pub timezones: Vec<(String, FixedOffset)>,

    /// Skip malformed messages instead of stopping at the first one
    #[arg(long)]
    pub skip_malformed: bool,
}

impl Args {
    /// The default `UTC`/`UTC+01` table plus any `--timezone` entries.
    pub fn timezone_table(&self) -> TimezoneTable {
        let mut table = TimezoneTable::default();
        for (label, offset) in &self.timezones {
            table.insert(label.clone(), *offset);
        }
        table
    }
}
