use std::path::PathBuf;

use clap::Args;
use serde_json::json;
use vigil_core::level::{AlertLevelCalculator, CalendarContext};

#[derive(Args)]
pub struct LevelArgs {
    /// Silence duration in minutes
    #[arg(long)]
    minutes: f64,
    /// Apply the weekend multiplier
    #[arg(long)]
    weekend: bool,
    /// Apply the night multiplier
    #[arg(long)]
    night: bool,
    /// Apply the holiday multiplier
    #[arg(long)]
    holiday: bool,
    /// Configuration file to take thresholds and multipliers from
    #[arg(long)]
    config: Option<PathBuf>,
}

pub fn run(args: LevelArgs) -> Result<(), Box<dyn std::error::Error>> {
    let config = super::config::load(args.config)?;
    let ctx = CalendarContext {
        is_weekend: args.weekend,
        is_night: args.night,
        is_holiday: args.holiday,
    };

    let calculator = AlertLevelCalculator::new(config.multipliers);
    let level = calculator.classify(args.minutes, config.thresholds, ctx);
    let adjusted = config.thresholds.adjusted(ctx, &config.multipliers);

    let output = json!({
        "minutes_silent": args.minutes,
        "level": level,
        "adjusted_thresholds": {
            "warning": adjusted.warning,
            "danger": adjusted.danger,
            "emergency": adjusted.emergency,
        },
    });
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}
