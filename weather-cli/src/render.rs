//! Human-friendly output for reports and cache listings.

use chrono::{DateTime, Local, Utc};
use std::time::Duration;
use weather_core::{CacheEntry, FetchedReport, ReportOrigin, WeatherReport};

pub struct CacheStats {
    pub entries: usize,
    pub fresh: usize,
    pub unique_locations: usize,
    pub average_temp_c: Option<f64>,
    pub path: Option<String>,
    pub ttl: Duration,
}

fn local_time(ts: DateTime<Utc>, fmt: &str) -> String {
    ts.with_timezone(&Local).format(fmt).to_string()
}

fn title_case(text: &str) -> String {
    text.split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

pub fn print_detail(fetched: &FetchedReport) {
    match fetched.origin {
        ReportOrigin::Provider => println!("✓ Fetched fresh data"),
        ReportOrigin::Cache => println!("✓ Using cached data"),
        ReportOrigin::Stale => {
            println!("! Provider unreachable, showing STALE cached data")
        }
    }
    print!("{}", detail(&fetched.report));
}

pub fn print_cached(entry: &CacheEntry, fresh: bool) {
    let state = if fresh { "fresh" } else { "expired" };
    println!(
        "Cached at {} ({state})",
        local_time(entry.inserted_at, "%Y-%m-%d %H:%M:%S")
    );
    print!("{}", detail(&entry.report));
}

fn detail(report: &WeatherReport) -> String {
    let mut out = String::new();
    out.push_str(&format!("Location:     {}\n", report.display_name()));
    out.push_str(&format!(
        "Temperature:  {} (feels like {})\n",
        report.temperature, report.feels_like
    ));
    if let (Some(min), Some(max)) = (report.temp_min, report.temp_max) {
        out.push_str(&format!("Range:        {min} - {max}\n"));
    }
    out.push_str(&format!(
        "Conditions:   {} ({})\n",
        report.condition.main,
        title_case(&report.condition.description)
    ));
    out.push_str(&format!("Humidity:     {}%\n", report.humidity_pct));
    out.push_str(&format!("Pressure:     {:.0} hPa\n", report.pressure_hpa));
    out.push_str(&format!(
        "Wind:         {:.1} {} from {}°\n",
        report.wind.speed,
        report.wind.unit.symbol(),
        report.wind.direction_deg
    ));
    if let Some(clouds) = report.clouds_pct {
        out.push_str(&format!("Cloud cover:  {clouds}%\n"));
    }
    out.push_str(&format!(
        "Observed:     {}\n",
        local_time(report.observed_at, "%Y-%m-%d %H:%M:%S")
    ));
    out
}

pub fn print_table(entries: &[CacheEntry], is_fresh: impl Fn(&CacheEntry) -> bool) {
    if entries.is_empty() {
        println!("No cached weather reports found.");
        return;
    }

    println!(
        "{:<24} {:<8} {:>10} {:<22} {:>9} {:<16} {:<5}",
        "Location", "Country", "Temp", "Description", "Humidity", "Observed", "Fresh"
    );
    for entry in entries {
        let report = &entry.report;
        println!(
            "{:<24} {:<8} {:>10} {:<22} {:>8}% {:<16} {:<5}",
            report.location_name,
            report.country.as_deref().unwrap_or("-"),
            report.temperature.to_string(),
            title_case(&report.condition.description),
            report.humidity_pct,
            local_time(report.observed_at, "%Y-%m-%d %H:%M"),
            if is_fresh(entry) { "yes" } else { "no" },
        );
    }
}

pub fn print_info(stats: &CacheStats) {
    println!("Cached reports:      {} ({} fresh)", stats.entries, stats.fresh);
    println!("Unique locations:    {}", stats.unique_locations);
    match stats.average_temp_c {
        Some(avg) => println!("Average temperature: {avg:.1}°C"),
        None => println!("Average temperature: -"),
    }
    println!("Cache file:          {}", stats.path.as_deref().unwrap_or("(in memory only)"));
    println!("Cache TTL:           {} seconds", stats.ttl.as_secs());
}
