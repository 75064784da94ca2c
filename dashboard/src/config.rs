use clap::Args;
use cold_storage_core::{state::Mode, thresholds::Limits};
use cold_storage_protocol::{Layout, DEFAULT_TOPIC};
use std::time::Duration;

#[derive(Debug, Clone, Args)]
pub(crate) struct Settings {
    /// MQTT broker host
    #[arg(long, default_value = "localhost")]
    pub broker_host: String,

    /// MQTT broker port
    #[arg(long, default_value_t = 1883)]
    pub broker_port: u16,

    /// Topic the sensor node publishes readings on
    #[arg(long, default_value = DEFAULT_TOPIC)]
    pub topic: String,

    /// Base URL of the gateway API
    #[arg(long, default_value = "http://localhost:3000/api")]
    pub api_url: String,

    /// Sensor layout of the node (dual or single)
    #[arg(long, default_value = "dual")]
    pub layout: Layout,

    /// Transports enabled at start (live, polled or both)
    #[arg(long, default_value = "both")]
    pub mode: Mode,

    /// Upper temperature limit in °C
    #[arg(long, default_value_t = 20.0, allow_negative_numbers = true)]
    pub temp_max: f64,

    /// Lower temperature limit in °C
    #[arg(long, default_value_t = 0.0, allow_negative_numbers = true)]
    pub temp_min: f64,

    /// Upper relative humidity limit in %
    #[arg(long, default_value_t = 90.0)]
    pub humidity_max: f64,

    /// Seconds between polls of the latest stored reading
    #[arg(long, default_value_t = 5)]
    pub poll_interval: u64,

    /// Seconds between chart reloads
    #[arg(long, default_value_t = 20)]
    pub chart_interval: u64,

    /// HTTP request timeout in seconds
    #[arg(long, default_value_t = 5)]
    pub request_timeout: u64,

    /// MQTT connect timeout in seconds
    #[arg(long, default_value_t = 10)]
    pub connect_timeout: u64,
}

impl Settings {
    pub(crate) fn limits(&self) -> Limits {
        Limits {
            temp_max: self.temp_max,
            temp_min: self.temp_min,
            humidity_max: self.humidity_max,
        }
    }

    pub(crate) fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval.max(1))
    }

    pub(crate) fn chart_interval(&self) -> Duration {
        Duration::from_secs(self.chart_interval.max(1))
    }

    pub(crate) fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout)
    }

    pub(crate) fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use clap::Parser;

    #[derive(Parser)]
    struct Cli {
        #[command(flatten)]
        settings: Settings,
    }

    #[test]
    fn defaults() {
        let settings = Cli::parse_from(["test"]).settings;

        assert_eq!(settings.layout, Layout::Dual);
        assert_eq!(settings.mode, Mode::Both);
        assert_eq!(settings.topic, "esp32/data");
        assert_eq!(settings.limits(), Limits::default());
        assert_eq!(settings.poll_interval(), Duration::from_secs(5));
        assert_eq!(settings.chart_interval(), Duration::from_secs(20));
    }

    #[test]
    fn overrides() {
        let settings = Cli::parse_from([
            "test",
            "--layout",
            "single",
            "--mode",
            "live",
            "--temp-min",
            "-2.5",
            "--temp-max",
            "8",
        ])
        .settings;

        assert_eq!(settings.layout, Layout::Single);
        assert_eq!(settings.mode, Mode::Live);
        assert_eq!(settings.limits().temp_min, -2.5);
        assert_eq!(settings.limits().temp_max, 8.0);
    }
}
