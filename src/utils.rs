use crate::config::JobTemplate;
use crate::core::GroupId;
use anyhow::{anyhow, Context, Result};
use clap::builder::{
    styling::{AnsiColor, Effects},
    Styles,
};
use range_parser::parse;

/// Parse group ids from string inputs, supporting ranges like "0-3" or comma-separated "0,2,4".
///
/// # Examples
///
/// ```
/// use ocsim::utils::parse_group_ids;
///
/// assert_eq!(parse_group_ids("7").unwrap(), vec![7]);
/// assert_eq!(parse_group_ids("0,2,4").unwrap(), vec![0, 2, 4]);
/// assert_eq!(parse_group_ids("0-2").unwrap(), vec![0, 1, 2]);
/// assert_eq!(parse_group_ids("3,0-1").unwrap(), vec![0, 1, 3]);
/// ```
pub fn parse_group_ids(input: &str) -> Result<Vec<GroupId>> {
    let mut parsed: Vec<u32> =
        parse::<u32>(input.trim()).context(format!("Invalid group id or range: {}", input))?;

    parsed.sort_unstable();
    parsed.dedup();

    Ok(parsed.into_iter().map(|g| g as GroupId).collect())
}

/// Parse a job-size mix from `GPUS:DURATION[:WEIGHT]` entries separated by commas.
///
/// The weight defaults to 1.
///
/// # Examples
///
/// ```
/// use ocsim::utils::parse_job_mix;
///
/// let mix = parse_job_mix("512:1:3,4096:4").unwrap();
/// assert_eq!(mix.len(), 2);
/// assert_eq!((mix[0].gpus, mix[0].duration, mix[0].weight), (512, 1, 3));
/// assert_eq!((mix[1].gpus, mix[1].duration, mix[1].weight), (4096, 4, 1));
/// ```
pub fn parse_job_mix(input: &str) -> Result<Vec<JobTemplate>> {
    input
        .split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| {
            let parts: Vec<&str> = entry.split(':').collect();
            if !(2..=3).contains(&parts.len()) {
                return Err(anyhow!(
                    "Invalid job mix entry '{}'. Expected GPUS:DURATION[:WEIGHT]",
                    entry
                ));
            }
            let gpus = parts[0]
                .parse::<u32>()
                .context(format!("Invalid GPU count in '{}'", entry))?;
            let duration = parts[1]
                .parse::<u64>()
                .context(format!("Invalid duration in '{}'", entry))?;
            let weight = match parts.get(2) {
                Some(w) => w
                    .parse::<u32>()
                    .context(format!("Invalid weight in '{}'", entry))?,
                None => 1,
            };
            Ok(JobTemplate {
                gpus,
                duration,
                weight,
            })
        })
        .collect()
}

/// Format a ratio in `[0, 1]` as a percentage with one decimal.
///
/// # Examples
///
/// ```
/// use ocsim::utils::format_percent;
///
/// assert_eq!(format_percent(0.875), "87.5%");
/// assert_eq!(format_percent(1.0), "100.0%");
/// ```
pub fn format_percent(ratio: f64) -> String {
    format!("{:.1}%", ratio * 100.0)
}

pub const STYLES: Styles = Styles::styled()
    .header(AnsiColor::Green.on_default().effects(Effects::BOLD))
    .usage(AnsiColor::Green.on_default().effects(Effects::BOLD))
    .literal(AnsiColor::Cyan.on_default().effects(Effects::BOLD))
    .placeholder(AnsiColor::Cyan.on_default());
