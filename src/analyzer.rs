// src/analyzer.rs

use crate::cache::CacheManager;
use crate::error::Result;
use crate::model::*;
use chrono::{Datelike, Timelike};
use indicatif::ProgressBar;
use std::collections::HashMap;
use std::path::Path;
use std::time::Instant;
use tracing::info;

/// Builds the per-user aggregates from a cache artifact.
pub fn analyze_cache(cache_path: &Path) -> Result<AnalysisResult> {
    info!("Starting analysis of {}", cache_path.display());
    let start = Instant::now();
    let result = aggregate(CacheManager::read(cache_path)?)?;
    info!(
        users = result.users.len(),
        messages = result.total_messages,
        "Finished in {:.2?}",
        start.elapsed()
    );
    Ok(result)
}

/// Folds messages into per-user weekday/month/hour sequences.
///
/// Stops at the first error. Users come out ordered by ascending message
/// count; users with equal counts keep the order they first appeared in.
pub fn aggregate<I>(messages: I) -> Result<AnalysisResult>
where
    I: IntoIterator<Item = Result<Message>>,
{
    let bar = ProgressBar::new_spinner();
    bar.set_message("Aggregating messages");

    // --- Analysis State ---
    let mut user_map: HashMap<String, usize> = HashMap::new();
    let mut users: Vec<(String, UserAggregate)> = Vec::new();
    let mut total_messages = 0;
    let mut first_message: Option<Timestamp> = None;
    let mut last_message: Option<Timestamp> = None;

    for message in messages {
        let Message { user, created, .. } = message?;

        let idx = match user_map.get(&user) {
            Some(&idx) => idx,
            None => {
                let idx = users.len();
                user_map.insert(user.clone(), idx);
                users.push((user, UserAggregate::default()));
                idx
            }
        };
        let agg = &mut users[idx].1;
        agg.weekdays.push(created.weekday().num_days_from_monday() as u8);
        agg.months.push(created.month() as u8);
        agg.hours.push(created.hour() as u8);

        total_messages += 1;
        first_message = Some(first_message.map_or(created, |ts| ts.min(created)));
        last_message = Some(last_message.map_or(created, |ts| ts.max(created)));
        bar.inc(1);
    }
    bar.finish_with_message("Aggregation complete");

    // Stable sort, so ties stay in order of first appearance.
    users.sort_by_key(|(_, agg)| agg.message_count());

    Ok(AnalysisResult { users, total_messages, first_message, last_message })
}
