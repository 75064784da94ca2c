use crate::{
    changed::{checked_set, replace_changed, Changed},
    reading::{normalize, CanonicalReading, Source},
    reconcile::{Reconciled, Reconciler, SelectedRows, Summary},
    thresholds::{evaluate_all, AlertEvent, AlertKind, Limits},
};
use chrono::{DateTime, Utc};
use cold_storage_protocol::{Layout, Record, SensorGroup};
use log::{debug, Level};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};
use strum::{Display, EnumString};

/// Entries kept in the message log, older ones are discarded.
pub const LOG_CAPACITY: usize = 50;

/// Which transports are allowed to feed the dashboard.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(ascii_case_insensitive)]
pub enum Mode {
    #[strum(serialize = "live", to_string = "live only")]
    Live,
    #[strum(serialize = "polled", to_string = "polled only")]
    Polled,
    #[default]
    #[strum(serialize = "both", to_string = "live + polled")]
    Both,
}

impl Mode {
    pub fn live_enabled(&self) -> bool {
        matches!(self, Self::Live | Self::Both)
    }

    pub fn polled_enabled(&self) -> bool {
        matches!(self, Self::Polled | Self::Both)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "lowercase")]
pub enum LiveStatus {
    Disabled,
    Connecting,
    Connected,
    Failed,
    Lost,
}

impl LiveStatus {
    fn level(&self) -> Level {
        match self {
            Self::Failed | Self::Lost => Level::Warn,
            _ => Level::Info,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "lowercase")]
pub enum PolledStatus {
    Disabled,
    Idle,
    Synced,
    Degraded,
}

impl PolledStatus {
    fn level(&self) -> Level {
        match self {
            Self::Degraded => Level::Warn,
            _ => Level::Info,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LogEntry {
    pub at: DateTime<Utc>,
    pub level: Level,
    pub message: String,
}

impl LogEntry {
    pub fn new(level: Level, message: impl Into<String>) -> Self {
        Self {
            at: Utc::now(),
            level,
            message: message.into(),
        }
    }
}

/// Everything that can change the dashboard, delivered to its owner over a channel.
#[derive(Debug, Clone)]
pub enum Event {
    Payload {
        source: Source,
        payload: Record,
        received_at: DateTime<Utc>,
    },
    LiveStatus(LiveStatus),
    PolledStatus(PolledStatus),
    History(Result<SelectedRows, String>),
    Log(LogEntry),
}

/// Alerts currently shown for one group.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct AlertSlot {
    pub temperature: Option<AlertEvent>,
    pub humidity: Option<AlertEvent>,
}

impl AlertSlot {
    pub fn is_empty(&self) -> bool {
        self.temperature.is_none() && self.humidity.is_none()
    }

    pub fn iter(&self) -> impl Iterator<Item = &AlertEvent> {
        self.temperature.iter().chain(self.humidity.iter())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Stats {
    pub live_messages: u64,
    pub polled_fetches: u64,

    /// Payloads that raised at least one alert.
    pub alerts: u64,

    /// Canonical readings accepted, across all groups.
    pub data_points: u64,
}

/// The dashboard's whole state, owned by a single sink and changed only through [`Self::apply`].
#[derive(Debug, Clone)]
pub struct DashboardState {
    pub layout: Layout,
    pub limits: Limits,
    pub mode: Mode,
    pub latest: BTreeMap<SensorGroup, CanonicalReading>,
    pub alerts: BTreeMap<SensorGroup, AlertSlot>,
    pub stats: Stats,
    pub live_status: LiveStatus,
    pub polled_status: PolledStatus,
    pub charts: Option<Reconciled>,
    pub log: VecDeque<LogEntry>,
    reconciler: Reconciler,

    /// Groups whose last payload held no complete reading.
    incomplete: BTreeMap<SensorGroup, bool>,
}

impl DashboardState {
    pub fn new(layout: Layout, limits: Limits, mode: Mode) -> Self {
        Self {
            layout,
            limits,
            mode,
            latest: BTreeMap::new(),
            alerts: BTreeMap::new(),
            stats: Stats::default(),
            live_status: if mode.live_enabled() {
                LiveStatus::Connecting
            } else {
                LiveStatus::Disabled
            },
            polled_status: if mode.polled_enabled() {
                PolledStatus::Idle
            } else {
                PolledStatus::Disabled
            },
            charts: None,
            log: VecDeque::with_capacity(LOG_CAPACITY),
            reconciler: Reconciler::new(layout),
            incomplete: BTreeMap::new(),
        }
    }

    pub fn summary(&self, group: SensorGroup) -> Summary {
        self.reconciler.summary(group)
    }

    pub fn alert_slot(&self, group: SensorGroup) -> AlertSlot {
        self.alerts.get(&group).copied().unwrap_or_default()
    }

    pub fn apply(&mut self, event: Event) {
        match event {
            Event::Payload {
                source,
                payload,
                received_at,
            } => self.apply_payload(source, &payload, received_at),
            Event::LiveStatus(status) => {
                if status != LiveStatus::Disabled && !self.mode.live_enabled() {
                    debug!("Ignoring live status {status}, live channel is disabled");
                    return;
                }
                if let Some(previous) = replace_changed(&mut self.live_status, status) {
                    self.push_log(
                        status.level(),
                        format!("Live channel {previous} -> {status}"),
                    );
                }
            }
            Event::PolledStatus(status) => {
                if status != PolledStatus::Disabled && !self.mode.polled_enabled() {
                    debug!("Ignoring polled status {status}, polling is disabled");
                    return;
                }
                if let Some(previous) = replace_changed(&mut self.polled_status, status) {
                    self.push_log(status.level(), format!("Polling {previous} -> {status}"));
                }
            }
            Event::History(result) => self.apply_history(result),
            Event::Log(entry) => self.push_entry(entry),
        }
    }

    /// Switches mode, returning whether anything changed.
    pub fn set_mode(&mut self, mode: Mode) -> Changed {
        if checked_set(&mut self.mode, mode) == Changed::No {
            return Changed::No;
        }

        self.push_log(Level::Info, format!("Mode set to {mode}"));

        if mode.live_enabled() {
            if self.live_status == LiveStatus::Disabled {
                self.live_status = LiveStatus::Connecting;
            }
        } else {
            self.live_status = LiveStatus::Disabled;
        }

        if mode.polled_enabled() {
            if self.polled_status == PolledStatus::Disabled {
                self.polled_status = PolledStatus::Idle;
            }
        } else {
            self.polled_status = PolledStatus::Disabled;
            self.charts = None;
        }

        Changed::Yes
    }

    pub fn push_log(&mut self, level: Level, message: impl Into<String>) {
        self.push_entry(LogEntry::new(level, message));
    }

    fn push_entry(&mut self, entry: LogEntry) {
        log::log!(entry.level, "{}", entry.message);

        self.log.push_front(entry);
        self.log.truncate(LOG_CAPACITY);
    }

    fn apply_payload(&mut self, source: Source, payload: &Record, received_at: DateTime<Utc>) {
        let enabled = match source {
            Source::Live => self.mode.live_enabled(),
            Source::Polled => self.mode.polled_enabled(),
        };
        if !enabled {
            debug!("Ignoring {source} payload in {} mode", self.mode);
            return;
        }

        match source {
            Source::Live => self.stats.live_messages += 1,
            Source::Polled => self.stats.polled_fetches += 1,
        }

        let normalized = normalize(payload, self.layout, source, received_at);

        for group in self.layout.groups() {
            let dropped = normalized.dropped.contains(group);
            let flag = self.incomplete.entry(*group).or_default();

            if checked_set(flag, dropped) == Changed::Yes && dropped {
                self.push_log(
                    Level::Warn,
                    format!("{source}: dropped incomplete {} reading", group.unit_name()),
                );
            }
        }

        if normalized.readings.is_empty() {
            return;
        }

        let mut raised = false;
        for evaluation in evaluate_all(&normalized.readings, &self.limits) {
            let slot = self.alerts.entry(evaluation.group).or_default();
            if evaluation.temperature_in_band {
                *slot = AlertSlot::default();
            }

            if !evaluation
                .alerts
                .iter()
                .any(|a| a.kind == AlertKind::HumidityHigh)
            {
                slot.humidity = None;
            }

            for alert in &evaluation.alerts {
                match alert.kind {
                    AlertKind::TempHigh | AlertKind::TempLow => slot.temperature = Some(*alert),
                    AlertKind::HumidityHigh => slot.humidity = Some(*alert),
                }
            }

            for alert in evaluation.alerts {
                raised = true;
                self.push_log(Level::Warn, format!("ALERT {alert}"));
            }
        }

        if raised {
            self.stats.alerts += 1;
        }

        let summary = normalized
            .readings
            .iter()
            .map(|r| {
                format!(
                    "{} {:.1}°C / {:.1}%",
                    r.group.unit_name(),
                    r.temperature,
                    r.humidity
                )
            })
            .collect::<Vec<_>>()
            .join(", ");
        self.push_log(Level::Info, format!("{source}: {summary}"));

        for reading in normalized.readings {
            self.stats.data_points += 1;
            self.latest.insert(reading.group, reading);
        }
    }

    fn apply_history(&mut self, result: Result<SelectedRows, String>) {
        if !self.mode.polled_enabled() {
            debug!("Ignoring history, polling is disabled");
            return;
        }

        match result {
            Ok(selected) => {
                let reconciled = self.reconciler.reconcile(selected);
                if reconciled.row_count == 0 {
                    self.push_log(Level::Info, "No history yet, waiting for data");
                } else {
                    self.push_log(
                        Level::Info,
                        format!(
                            "Charts updated from {} {}",
                            reconciled.row_count, reconciled.source
                        ),
                    );
                }

                // Release the previous charts before taking the new ones.
                drop(self.charts.take());
                self.charts = Some(reconciled);
            }
            Err(e) => self.push_log(Level::Warn, format!("Failed to load history: {e}")),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::reconcile::SourceKind;
    use serde_json::json;

    fn payload(value: serde_json::Value) -> Record {
        Record::try_from(value).unwrap()
    }

    fn polled(value: serde_json::Value) -> Event {
        Event::Payload {
            source: Source::Polled,
            payload: payload(value),
            received_at: Utc::now(),
        }
    }

    fn live(value: serde_json::Value) -> Event {
        Event::Payload {
            source: Source::Live,
            payload: payload(value),
            received_at: Utc::now(),
        }
    }

    fn dual() -> DashboardState {
        DashboardState::new(Layout::Dual, Limits::default(), Mode::Both)
    }

    #[test]
    fn polled_single_payload_raises_alerts() {
        let mut state = DashboardState::new(Layout::Single, Limits::default(), Mode::Both);

        state.apply(polled(json!({"temperature": "21.5", "humidity": "95"})));

        let slot = state.alert_slot(SensorGroup::Single);
        assert_eq!(slot.temperature.unwrap().kind, AlertKind::TempHigh);
        assert_eq!(slot.humidity.unwrap().kind, AlertKind::HumidityHigh);
        assert_eq!(
            state.stats,
            Stats {
                live_messages: 0,
                polled_fetches: 1,
                alerts: 1,
                data_points: 1,
            }
        );
        assert_eq!(state.latest[&SensorGroup::Single].temperature, 21.5);
    }

    #[test]
    fn dual_payload_updates_both_groups() {
        let mut state = dual();

        state.apply(live(json!({
            "milk": {"temperature": 4, "humidity": 80},
            "vegetables": {"temperature": 12, "humidity": 70}
        })));

        assert_eq!(state.latest.len(), 2);
        assert_eq!(state.stats.data_points, 2);
        assert_eq!(state.stats.live_messages, 1);
        assert_eq!(state.stats.alerts, 0);
    }

    #[test]
    fn mode_gate_ignores_disabled_transport() {
        let mut state = DashboardState::new(Layout::Dual, Limits::default(), Mode::Polled);

        state.apply(live(json!({"milk": {"temperature": 30, "humidity": 80}})));

        assert!(state.latest.is_empty());
        assert_eq!(state.stats, Stats::default());
        assert!(state.alert_slot(SensorGroup::Milk).is_empty());
    }

    #[test]
    fn temperature_back_in_band_clears_slot() {
        let mut state = dual();

        state.apply(live(json!({"milk": {"temperature": 25, "humidity": 95}})));
        assert_eq!(state.alert_slot(SensorGroup::Milk).iter().count(), 2);

        state.apply(live(json!({"milk": {"temperature": 5, "humidity": 60}})));
        assert!(state.alert_slot(SensorGroup::Milk).is_empty());
        assert_eq!(state.stats.alerts, 1);
    }

    #[test]
    fn temperature_alert_survives_while_out_of_band() {
        let mut state = dual();

        state.apply(live(json!({"milk": {"temperature": 25, "humidity": 95}})));
        state.apply(live(json!({"milk": {"temperature": 22, "humidity": 93}})));

        let slot = state.alert_slot(SensorGroup::Milk);
        assert_eq!(slot.temperature.unwrap().value, 22.0);
        assert_eq!(slot.humidity.unwrap().value, 93.0);
        assert_eq!(state.stats.alerts, 2);
    }

    #[test]
    fn humidity_alert_cleared_while_temperature_stays_high() {
        let mut state = dual();

        state.apply(live(json!({"milk": {"temperature": 25, "humidity": 95}})));
        state.apply(live(json!({"milk": {"temperature": 22, "humidity": 60}})));

        let slot = state.alert_slot(SensorGroup::Milk);
        assert_eq!(slot.temperature.unwrap().value, 22.0);
        assert_eq!(slot.humidity, None);
        assert_eq!(state.latest[&SensorGroup::Milk].humidity, 60.0);
    }

    #[test]
    fn incomplete_group_logged_and_dropped() {
        let mut state = dual();

        state.apply(live(json!({
            "milk": {"temperature": "error", "humidity": 80},
            "vegetables": {"temperature": 12, "humidity": 70}
        })));

        assert!(!state.latest.contains_key(&SensorGroup::Milk));
        assert!(state.latest.contains_key(&SensorGroup::Vegetables));
        assert!(state
            .log
            .iter()
            .any(|e| e.level == Level::Warn && e.message.contains("dropped incomplete Milk")));
    }

    #[test]
    fn missing_group_warned_once() {
        let mut state = dual();
        let only_milk = json!({"milk": {"temperature": 4, "humidity": 80}});
        let warnings = |state: &DashboardState| {
            state
                .log
                .iter()
                .filter(|e| e.message.contains("dropped incomplete Vegetables"))
                .count()
        };

        state.apply(polled(only_milk.clone()));
        state.apply(polled(only_milk.clone()));
        state.apply(polled(only_milk.clone()));
        assert_eq!(warnings(&state), 1);

        state.apply(polled(json!({
            "milk": {"temperature": 4, "humidity": 80},
            "vegetables": {"temperature": 9, "humidity": 70}
        })));
        state.apply(polled(only_milk));
        assert_eq!(warnings(&state), 2);
    }

    #[test]
    fn status_logged_only_on_change() {
        let mut state = dual();
        let before = state.log.len();

        state.apply(Event::PolledStatus(PolledStatus::Degraded));
        state.apply(Event::PolledStatus(PolledStatus::Degraded));
        state.apply(Event::LiveStatus(LiveStatus::Connected));

        assert_eq!(state.log.len(), before + 2);
        assert_eq!(state.log[1].message, "Polling idle -> degraded");
        assert_eq!(state.polled_status, PolledStatus::Degraded);
        assert_eq!(state.live_status, LiveStatus::Connected);
    }

    fn raw_rows() -> SelectedRows {
        SelectedRows {
            kind: SourceKind::Raw,
            rows: vec![payload(
                json!({"unit_type": "milk", "temperature": 5, "humidity": 80}),
            )],
        }
    }

    #[test]
    fn failed_history_keeps_previous_charts() {
        let mut state = dual();

        state.apply(Event::History(Ok(raw_rows())));
        let charts = state.charts.clone();
        assert!(charts.is_some());

        state.apply(Event::History(Err("timed out".to_string())));
        assert_eq!(state.charts, charts);
        assert!(state.log[0].message.contains("timed out"));
    }

    #[test]
    fn empty_history_waits_for_data() {
        let mut state = dual();

        state.apply(Event::History(Ok(SelectedRows {
            kind: SourceKind::Raw,
            rows: Vec::new(),
        })));

        assert_eq!(state.charts.as_ref().unwrap().row_count, 0);
        assert_eq!(state.log[0].message, "No history yet, waiting for data");
    }

    #[test]
    fn switching_mode_disables_adapters() {
        let mut state = dual();
        state.apply(Event::History(Ok(raw_rows())));

        assert_eq!(state.set_mode(Mode::Live), Changed::Yes);
        assert_eq!(state.polled_status, PolledStatus::Disabled);
        assert!(state.charts.is_none());

        assert_eq!(state.set_mode(Mode::Live), Changed::No);

        assert_eq!(state.set_mode(Mode::Polled), Changed::Yes);
        assert_eq!(state.live_status, LiveStatus::Disabled);
        assert_eq!(state.polled_status, PolledStatus::Idle);

        state.apply(Event::LiveStatus(LiveStatus::Connected));
        assert_eq!(state.live_status, LiveStatus::Disabled);
    }

    #[test]
    fn log_is_capped_newest_first() {
        let mut state = dual();

        for i in 0..(LOG_CAPACITY + 10) {
            state.push_log(Level::Info, format!("message {i}"));
        }

        assert_eq!(state.log.len(), LOG_CAPACITY);
        assert_eq!(
            state.log[0].message,
            format!("message {}", LOG_CAPACITY + 9)
        );
    }

    #[test]
    fn mode_from_str() {
        use std::str::FromStr;

        assert_eq!(Mode::from_str("live").unwrap(), Mode::Live);
        assert_eq!(Mode::from_str("Polled").unwrap(), Mode::Polled);
        assert_eq!(Mode::from_str("both").unwrap(), Mode::Both);
        assert!(Mode::from_str("neither").is_err());
    }
}
