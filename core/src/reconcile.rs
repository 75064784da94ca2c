//! Reshaping of historical rows into one chartable series per sensor group.
//!
//! History comes from two endpoints that disagree on row shape: hourly aggregates carry
//! `avg_temp`/`avg_humidity`, raw rows carry `temperature`/`humidity`, and windowed rows carry
//! both groups side by side under prefixed names. Rows are resolved through the same field chains
//! the normaliser uses, scoped to the group being built.

use crate::reading::resolve_first;
use chrono::{DateTime, NaiveDateTime, Utc};
use cold_storage_protocol::{FieldChain, Layout, Record, SensorGroup};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, fmt, str::FromStr};
use strum::Display;

/// Fields that may name the group a row belongs to.
const DISCRIMINATOR: &[&str] = &["unit_type", "unit_name"];

/// Fields that may carry a row's timestamp.
const TIMESTAMP: FieldChain = FieldChain::new(&["time", "timestamp"]);

const LABEL_FORMAT: &str = "%d %b %H:%M";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeriesPoint {
    pub time_label: String,
    pub temperature: Option<f64>,
    pub humidity: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Series {
    pub group: SensorGroup,
    pub points: Vec<SeriesPoint>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Range {
    pub min: f64,
    pub max: f64,
}

impl Range {
    fn of(values: impl Iterator<Item = f64>) -> Option<Self> {
        values.fold(None, |range, v| match range {
            None => Some(Self { min: v, max: v }),
            Some(Self { min, max }) => Some(Self {
                min: min.min(v),
                max: max.max(v),
            }),
        })
    }
}

/// Min/max of a group's charted values. Survives refreshes that bring no numbers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    pub temperature: Option<Range>,
    pub humidity: Option<Range>,
}

impl Summary {
    pub fn update(&mut self, points: &[SeriesPoint]) {
        if let Some(range) = Range::of(points.iter().filter_map(|p| p.temperature)) {
            self.temperature = Some(range);
        }
        if let Some(range) = Range::of(points.iter().filter_map(|p| p.humidity)) {
            self.humidity = Some(range);
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
pub enum SourceKind {
    #[strum(to_string = "hourly aggregates")]
    Aggregated,
    #[strum(to_string = "raw readings")]
    Raw,
}

/// The row set one reconciliation is built from.
#[derive(Debug, Clone, PartialEq)]
pub struct SelectedRows {
    pub kind: SourceKind,
    pub rows: Vec<Record>,
}

/// Somewhere historical rows can be fetched from.
#[allow(async_fn_in_trait)]
pub trait HistorySource {
    type Error: fmt::Display;

    async fn aggregated(&self) -> Result<Vec<Record>, Self::Error>;

    async fn raw(&self) -> Result<Vec<Record>, Self::Error>;
}

/// Fetches aggregated rows, falling back to raw rows when there are none or the fetch failed.
///
/// The raw source is only queried when the fallback is taken.
pub async fn select_source<S: HistorySource>(source: &S) -> Result<SelectedRows, S::Error> {
    match source.aggregated().await {
        Ok(rows) if !rows.is_empty() => {
            return Ok(SelectedRows {
                kind: SourceKind::Aggregated,
                rows,
            })
        }
        Ok(_) => debug!("No aggregated history, falling back to raw readings"),
        Err(e) => warn!("Failed to fetch aggregated history, falling back to raw readings: {e}"),
    }

    let rows = source.raw().await?;
    Ok(SelectedRows {
        kind: SourceKind::Raw,
        rows,
    })
}

#[derive(Debug, Clone, PartialEq)]
pub struct Reconciled {
    pub source: SourceKind,
    pub row_count: usize,

    /// One series per layout group, in layout order. Series may differ in length and labels.
    pub series: Vec<Series>,
}

impl Reconciled {
    pub fn series(&self, group: SensorGroup) -> Option<&Series> {
        self.series.iter().find(|s| s.group == group)
    }
}

/// Builds per-group series and keeps each group's running summary.
#[derive(Debug, Clone)]
pub struct Reconciler {
    layout: Layout,
    summaries: BTreeMap<SensorGroup, Summary>,
}

impl Reconciler {
    pub fn new(layout: Layout) -> Self {
        Self {
            layout,
            summaries: BTreeMap::new(),
        }
    }

    pub fn summary(&self, group: SensorGroup) -> Summary {
        self.summaries.get(&group).copied().unwrap_or_default()
    }

    pub fn reconcile(&mut self, selected: SelectedRows) -> Reconciled {
        let groups = self.layout.groups();
        let mut pending: BTreeMap<SensorGroup, Vec<(Option<DateTime<Utc>>, SeriesPoint)>> =
            groups.iter().map(|g| (*g, Vec::new())).collect();

        for (idx, row) in selected.rows.iter().enumerate() {
            let targets = match classify(row) {
                Classification::Group(group) if groups.contains(&group) => vec![group],
                Classification::Group(group) => {
                    debug!("Skipping {group} row, not part of the {} layout", self.layout);
                    continue;
                }
                Classification::Unknown(name) => {
                    debug!("Skipping row for unknown unit \"{name}\"");
                    continue;
                }
                Classification::Ambiguous => groups.to_vec(),
            };

            let (timestamp, time_label) = time_label(row, idx);

            for group in targets {
                let point = SeriesPoint {
                    time_label: time_label.clone(),
                    temperature: resolve_first(&[
                        (row, group.temperature_fields()),
                        (row, FieldChain::TEMPERATURE),
                    ]),
                    humidity: resolve_first(&[
                        (row, group.humidity_fields()),
                        (row, FieldChain::HUMIDITY),
                    ]),
                };

                if let Some(points) = pending.get_mut(&group) {
                    points.push((timestamp, point));
                }
            }
        }

        let series = groups
            .iter()
            .map(|group| {
                let mut points = pending.remove(group).unwrap_or_default();

                if points.iter().all(|(ts, _)| ts.is_some()) {
                    points.sort_by_key(|(ts, _)| *ts);
                }

                let points: Vec<SeriesPoint> = points.into_iter().map(|(_, p)| p).collect();
                self.summaries.entry(*group).or_default().update(&points);

                Series {
                    group: *group,
                    points,
                }
            })
            .collect();

        info!(
            "Reconciled {} rows from {}",
            selected.rows.len(),
            selected.kind
        );

        Reconciled {
            source: selected.kind,
            row_count: selected.rows.len(),
            series,
        }
    }
}

enum Classification {
    Group(SensorGroup),
    Unknown(String),
    Ambiguous,
}

fn classify(row: &Record) -> Classification {
    match DISCRIMINATOR.iter().find_map(|key| row.text(key)) {
        Some(name) => match SensorGroup::from_str(name.trim()) {
            Ok(group) => Classification::Group(group),
            Err(_) => Classification::Unknown(name),
        },
        None => Classification::Ambiguous,
    }
}

/// Parses the timestamp formats the gateway emits.
pub fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();

    DateTime::parse_from_rfc3339(s)
        .map(|t| t.with_timezone(&Utc))
        .ok()
        .or_else(|| {
            NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
                .ok()
                .map(|t| t.and_utc())
        })
}

/// Label for the row at `idx` of the fetched set, along with its parsed timestamp if it has one.
fn time_label(row: &Record, idx: usize) -> (Option<DateTime<Utc>>, String) {
    let Some((key, _)) = row.first_present(&TIMESTAMP) else {
        return (None, format!("Reading {}", idx + 1));
    };

    match row.text(key) {
        Some(raw) => match parse_timestamp(&raw) {
            Some(t) => (Some(t), t.format(LABEL_FORMAT).to_string()),
            None => (None, raw),
        },
        None => (None, format!("Reading {}", idx + 1)),
    }
}
