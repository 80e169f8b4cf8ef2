use std::path::PathBuf;
use std::time::Duration;

use ulid::Ulid;

/// Process settings, read once from `FLEETBOOK_*` environment variables.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub data_dir: PathBuf,
    /// Skip the WAL entirely; state lives only as long as the process.
    pub in_memory: bool,
    pub metrics_port: Option<u16>,
    /// Vehicles registered in the directory at startup.
    pub vehicles: Vec<Ulid>,
    /// `None` disables the background activator.
    pub activate_interval: Option<Duration>,
    pub compact_threshold: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            in_memory: false,
            metrics_port: None,
            vehicles: Vec::new(),
            activate_interval: Some(Duration::from_secs(30)),
            compact_threshold: 1000,
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Unparseable values fall back to the default with a warning.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let data_dir = lookup("FLEETBOOK_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or(defaults.data_dir);
        let in_memory = lookup("FLEETBOOK_IN_MEMORY")
            .map(|v| matches!(v.as_str(), "1" | "true" | "yes"))
            .unwrap_or(defaults.in_memory);
        let metrics_port = parsed(&lookup, "FLEETBOOK_METRICS_PORT");
        let vehicles = lookup("FLEETBOOK_VEHICLES")
            .map(|list| {
                list.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .filter_map(|s| match Ulid::from_string(s) {
                        Ok(id) => Some(id),
                        Err(e) => {
                            tracing::warn!("ignoring vehicle id {s:?}: {e}");
                            None
                        }
                    })
                    .collect()
            })
            .unwrap_or_default();
        let activate_interval = match parsed::<u64>(&lookup, "FLEETBOOK_ACTIVATE_INTERVAL_SECS") {
            Some(0) => None,
            Some(secs) => Some(Duration::from_secs(secs)),
            None => defaults.activate_interval,
        };
        let compact_threshold =
            parsed(&lookup, "FLEETBOOK_COMPACT_THRESHOLD").unwrap_or(defaults.compact_threshold);

        Self {
            data_dir,
            in_memory,
            metrics_port,
            vehicles,
            activate_interval,
            compact_threshold,
        }
    }

    pub fn wal_path(&self) -> PathBuf {
        self.data_dir.join("reservations.wal")
    }

    pub fn directory_path(&self) -> PathBuf {
        self.data_dir.join("vehicles.json")
    }
}

fn parsed<T: std::str::FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    let raw = lookup(key)?;
    match raw.trim().parse() {
        Ok(v) => Some(v),
        Err(_) => {
            tracing::warn!("ignoring {key}={raw:?}: not a valid value");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> Config {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn defaults_when_unset() {
        assert_eq!(config(&[]), Config::default());
    }

    #[test]
    fn reads_every_variable() {
        let v1 = Ulid::new();
        let v2 = Ulid::new();
        let vehicles = format!("{v1}, {v2},");
        let cfg = config(&[
            ("FLEETBOOK_DATA_DIR", "/var/lib/fleetbook"),
            ("FLEETBOOK_IN_MEMORY", "true"),
            ("FLEETBOOK_METRICS_PORT", "9100"),
            ("FLEETBOOK_VEHICLES", &vehicles),
            ("FLEETBOOK_ACTIVATE_INTERVAL_SECS", "5"),
            ("FLEETBOOK_COMPACT_THRESHOLD", "50"),
        ]);
        assert_eq!(cfg.data_dir, PathBuf::from("/var/lib/fleetbook"));
        assert!(cfg.in_memory);
        assert_eq!(cfg.metrics_port, Some(9100));
        assert_eq!(cfg.vehicles, vec![v1, v2]);
        assert_eq!(cfg.activate_interval, Some(Duration::from_secs(5)));
        assert_eq!(cfg.compact_threshold, 50);
        assert_eq!(cfg.wal_path(), PathBuf::from("/var/lib/fleetbook/reservations.wal"));
        assert_eq!(cfg.directory_path(), PathBuf::from("/var/lib/fleetbook/vehicles.json"));
    }

    #[test]
    fn zero_interval_disables_activator() {
        let cfg = config(&[("FLEETBOOK_ACTIVATE_INTERVAL_SECS", "0")]);
        assert_eq!(cfg.activate_interval, None);
    }

    #[test]
    fn garbage_falls_back() {
        let cfg = config(&[
            ("FLEETBOOK_METRICS_PORT", "not-a-port"),
            ("FLEETBOOK_VEHICLES", "nope"),
            ("FLEETBOOK_COMPACT_THRESHOLD", "-1"),
        ]);
        assert_eq!(cfg.metrics_port, None);
        assert!(cfg.vehicles.is_empty());
        assert_eq!(cfg.compact_threshold, 1000);
    }
}
