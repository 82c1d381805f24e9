//! Batch reporters: aggregate severity, table, JSON and sensu export.

use chrono::{DateTime, Utc};
use comfy_table::{Cell, Color, ContentArrangement, Table};
use serde::Serialize;

use crate::definition::{DefinitionSource, SensorDefinition};
use crate::result::SensorResult;
use crate::status::SensorStatus;

/// Worst status of a batch: CRITICAL > UNKNOWN > WARNING > OK/INFO.
/// The first CRITICAL ends the scan.
pub fn aggregate_status(results: &[SensorResult]) -> SensorStatus {
    let mut status = SensorStatus::Ok;
    for result in results {
        match result.status {
            SensorStatus::Critical => return SensorStatus::Critical,
            SensorStatus::Unknown => status = SensorStatus::Unknown,
            SensorStatus::Warning if status != SensorStatus::Unknown => {
                status = SensorStatus::Warning;
            }
            _ => {}
        }
    }
    status
}

/// Process exit code for a batch.
pub fn exit_code(results: &[SensorResult]) -> i32 {
    aggregate_status(results).code()
}

fn status_color(status: SensorStatus) -> Color {
    match status {
        SensorStatus::Ok => Color::Green,
        SensorStatus::Info => Color::Blue,
        SensorStatus::Warning => Color::Yellow,
        SensorStatus::Critical => Color::Red,
        SensorStatus::Unknown => Color::Magenta,
    }
}

/// Human readable age, e.g. `42 sec`, `3 min 5 sec`.
pub fn format_age(timestamp: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let secs = (now - timestamp).num_seconds().max(0);
    match secs {
        0..=59 => format!("{secs} sec"),
        60..=3599 => format!("{} min {} sec", secs / 60, secs % 60),
        3600..=86_399 => format!("{} hours {} min", secs / 3600, (secs % 3600) / 60),
        _ => format!("{} days {} hours", secs / 86_400, (secs % 86_400) / 3600),
    }
}

/// Result table for terminal output.
pub fn render_table(
    results: &[SensorResult],
    source: &dyn DefinitionSource,
    now: DateTime<Utc>,
) -> Table {
    let show_verbose = results.iter().any(|r| r.verbose.is_some());

    let mut table = Table::new();
    table.set_content_arrangement(ContentArrangement::Dynamic);

    let mut header = vec![
        Cell::new("ID").fg(Color::Cyan),
        Cell::new("Label").fg(Color::Cyan),
        Cell::new("Status").fg(Color::Cyan),
        Cell::new("Message").fg(Color::Cyan),
        Cell::new("Execution time").fg(Color::Cyan),
        Cell::new("Result age").fg(Color::Cyan),
    ];
    if show_verbose {
        header.push(Cell::new("Verbose").fg(Color::Cyan));
    }
    table.set_header(header);

    for result in results {
        let label = source
            .get(&result.sensor_id)
            .map_or_else(|| result.sensor_id.clone(), |d| d.label().to_string());

        let mut row = vec![
            Cell::new(&result.sensor_id),
            Cell::new(label),
            Cell::new(result.status).fg(status_color(result.status)),
            Cell::new(result.message()),
            Cell::new(format!("{} ms", result.execution_time_ms)),
            Cell::new(format_age(result.timestamp, now)),
        ];
        if show_verbose {
            row.push(Cell::new(result.verbose.as_deref().unwrap_or("")));
        }
        table.add_row(row);
    }

    table
}

/// Sensor catalog overview for `list`.
pub fn render_definitions(definitions: &[SensorDefinition]) -> Table {
    let mut table = Table::new();
    table.set_content_arrangement(ContentArrangement::Dynamic);

    table.set_header(vec![
        Cell::new("ID").fg(Color::Cyan),
        Cell::new("Label").fg(Color::Cyan),
        Cell::new("Category").fg(Color::Cyan),
        Cell::new("Kind").fg(Color::Cyan),
        Cell::new("Caching time").fg(Color::Cyan),
        Cell::new("Enabled").fg(Color::Cyan),
    ]);

    for definition in definitions {
        let caching = if definition.caching_time == 0 {
            "-".to_string()
        } else {
            format!("{} s", definition.caching_time)
        };
        let enabled = if definition.enabled {
            Cell::new("yes").fg(Color::Green)
        } else {
            Cell::new("no").fg(Color::DarkGrey)
        };

        table.add_row(vec![
            Cell::new(&definition.id),
            Cell::new(definition.label()),
            Cell::new(definition.category.as_deref().unwrap_or("-")),
            Cell::new(&definition.plugin_kind),
            Cell::new(caching),
            enabled,
        ]);
    }

    table
}

/// Results as a pretty-printed JSON array.
pub fn render_json(results: &[SensorResult]) -> serde_json::Result<String> {
    serde_json::to_string_pretty(results)
}

/// Options of the sensu export.
#[derive(Debug, Clone)]
pub struct SensuOptions {
    /// Source host, usually the site's host name.
    pub source: String,
    /// Time to live; 0 omits the field.
    pub ttl: u64,
    pub handlers: Vec<String>,
    /// Handlers for metric records; falls back to `handlers` when empty.
    pub metric_handlers: Vec<String>,
    /// Emit a companion metric record for numeric results.
    pub metrics: bool,
}

impl Default for SensuOptions {
    fn default() -> Self {
        Self {
            source: "localhost".to_string(),
            ttl: 0,
            handlers: Vec::new(),
            metric_handlers: Vec::new(),
            metrics: true,
        }
    }
}

#[derive(Debug, Serialize)]
struct SensuRecord<'a> {
    name: String,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    kind: Option<&'static str>,
    status: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    ttl: Option<u64>,
    #[serde(skip_serializing_if = "<[String]>::is_empty")]
    handlers: &'a [String],
    output: String,
    interval: u64,
    duration: f64,
    source: &'a str,
}

/// Sensu check results, one JSON object per line, with an extra metric
/// record after each numeric result when enabled.
pub fn sensu_lines(
    results: &[SensorResult],
    source: &dyn DefinitionSource,
    options: &SensuOptions,
) -> serde_json::Result<Vec<String>> {
    let reversed_source = options.source.split('.').rev().collect::<Vec<_>>().join(".");
    let metric_handlers = if options.metric_handlers.is_empty() {
        &options.handlers
    } else {
        &options.metric_handlers
    };

    let mut lines = Vec::with_capacity(results.len());
    for result in results {
        let check = SensuRecord {
            name: result.sensor_id.clone(),
            kind: None,
            status: result.status.code(),
            ttl: (options.ttl > 0).then_some(options.ttl),
            handlers: &options.handlers,
            output: result.message(),
            interval: source.get(&result.sensor_id).map_or(0, |d| d.caching_time),
            duration: result.execution_time_ms as f64 / 1000.0,
            source: &options.source,
        };
        lines.push(serde_json::to_string(&check)?);

        if !options.metrics {
            continue;
        }
        let Some(value) = result.value.as_ref().filter(|v| v.is_numeric()) else {
            continue;
        };
        let metric = SensuRecord {
            name: format!("{}_metric", result.sensor_id),
            kind: Some("metric"),
            handlers: metric_handlers,
            output: format!(
                "{reversed_source}.{} {value} {}",
                result.sensor_id,
                result.timestamp.timestamp()
            ),
            ..check
        };
        lines.push(serde_json::to_string(&metric)?);
    }
    Ok(lines)
}
