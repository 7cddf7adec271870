use serde::Deserialize;

use crate::misuse::types::{MisuseRule, RuleField, RuleOperator};

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub detection: DetectionConfig,
    #[serde(default)]
    pub distance: DistanceConfig,
    #[serde(default)]
    pub input: InputConfig,
    #[serde(default)]
    pub report: ReportConfig,
    #[serde(default)]
    pub api: ApiConfig,
}

// ============================================================
// Detection Config
// ============================================================

#[derive(Debug, Deserialize, Clone)]
pub struct DetectionConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_rules")]
    pub rules: Vec<MisuseRule>,
    #[serde(default = "default_window_hours")]
    pub count_window_hours: f64,
    #[serde(default = "default_window_hours")]
    pub travel_window_hours: f64,
    #[serde(default = "default_max_concurrent_cards")]
    pub max_concurrent_cards: usize,
    #[serde(default = "default_distance_timeout_ms")]
    pub distance_timeout_ms: u64,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            rules: default_rules(),
            count_window_hours: default_window_hours(),
            travel_window_hours: default_window_hours(),
            max_concurrent_cards: default_max_concurrent_cards(),
            distance_timeout_ms: default_distance_timeout_ms(),
        }
    }
}

fn default_true() -> bool {
    true
}

/// The dashboard's out-of-the-box rule set.
pub fn default_rules() -> Vec<MisuseRule> {
    vec![
        MisuseRule::new("1", RuleField::PayerMismatch, RuleOperator::Gt, "50"),
        MisuseRule::new("2", RuleField::TransactionCount, RuleOperator::Gt, "3"),
        MisuseRule::new("3", RuleField::StoresDistance, RuleOperator::Gt, "100"),
    ]
}

fn default_window_hours() -> f64 {
    24.0
}

fn default_max_concurrent_cards() -> usize {
    16
}

fn default_distance_timeout_ms() -> u64 {
    2000
}

// ============================================================
// Distance Config
// ============================================================

#[derive(Debug, Deserialize, Clone)]
pub struct DistanceConfig {
    #[serde(default = "default_routes")]
    pub routes: Vec<DistanceRouteConfig>,
}

impl Default for DistanceConfig {
    fn default() -> Self {
        Self {
            routes: default_routes(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct DistanceRouteConfig {
    pub from: String,
    pub to: String,
    pub km: f64,
}

fn default_routes() -> Vec<DistanceRouteConfig> {
    [
        ("london", "new york", 5567.0),
        ("london", "paris", 344.0),
        ("london", "manchester", 330.0),
        ("new york", "los angeles", 3936.0),
    ]
    .into_iter()
    .map(|(from, to, km)| DistanceRouteConfig {
        from: from.to_string(),
        to: to.to_string(),
        km,
    })
    .collect()
}

// ============================================================
// Input / Report Config
// ============================================================

#[derive(Debug, Deserialize, Clone, Default)]
pub struct InputConfig {
    pub cards_path: Option<String>,
    pub transactions_path: Option<String>,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ReportFormat {
    #[default]
    Csv,
    Json,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ReportConfig {
    #[serde(default = "default_report_path")]
    pub output_path: String,
    #[serde(default)]
    pub format: ReportFormat,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            output_path: default_report_path(),
            format: ReportFormat::default(),
        }
    }
}

fn default_report_path() -> String {
    "misuse-report.csv".to_string()
}

// ============================================================
// API Config
// ============================================================

#[derive(Debug, Deserialize, Clone)]
pub struct ApiConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_api_port")]
    pub port: u16,
    #[serde(default = "default_api_host")]
    pub host: String,
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            port: default_api_port(),
            host: default_api_host(),
            request_timeout_ms: default_request_timeout_ms(),
        }
    }
}

fn default_api_port() -> u16 {
    3000
}

fn default_api_host() -> String {
    "0.0.0.0".to_string()
}

fn default_request_timeout_ms() -> u64 {
    10_000
}

/// Longest accepted rule window, one hundred years.
const MAX_WINDOW_HOURS: f64 = 24.0 * 365.0 * 100.0;

impl Config {
    pub fn load(path: &str) -> eyre::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| eyre::eyre!("Failed to read config file '{}': {}", path, e))?;
        let config: Config = toml::from_str(&content)
            .map_err(|e| eyre::eyre!("Failed to parse config file '{}': {}", path, e))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> eyre::Result<()> {
        let detection = &self.detection;
        for (name, hours) in [
            ("count_window_hours", detection.count_window_hours),
            ("travel_window_hours", detection.travel_window_hours),
        ] {
            if !hours.is_finite() || hours <= 0.0 {
                return Err(eyre::eyre!(
                    "detection.{} must be a positive number of hours, got {}",
                    name,
                    hours
                ));
            }
            if hours > MAX_WINDOW_HOURS {
                return Err(eyre::eyre!(
                    "detection.{} must be at most {} hours, got {}",
                    name,
                    MAX_WINDOW_HOURS,
                    hours
                ));
            }
        }
        if detection.max_concurrent_cards == 0 {
            return Err(eyre::eyre!("detection.max_concurrent_cards must be at least 1"));
        }

        for route in &self.distance.routes {
            if route.from.trim().is_empty() || route.to.trim().is_empty() {
                return Err(eyre::eyre!(
                    "Distance route '{}' -> '{}' must name both places",
                    route.from,
                    route.to
                ));
            }
            if !route.km.is_finite() || route.km < 0.0 {
                return Err(eyre::eyre!(
                    "Invalid distance {} km for route '{}' -> '{}'",
                    route.km,
                    route.from,
                    route.to
                ));
            }
        }

        if self.input.cards_path.is_some() != self.input.transactions_path.is_some() {
            return Err(eyre::eyre!(
                "input.cards_path and input.transactions_path must be configured together"
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_config() {
        let toml_str = r#"
[detection]
count_window_hours = 12
max_concurrent_cards = 4

[[detection.rules]]
id = "a"
field = "transaction_amount"
operator = ">="
value = "250"

[[distance.routes]]
from = "leeds"
to = "york"
km = 40.0

[input]
cards_path = "cards.json"
transactions_path = "transactions.csv"

[report]
format = "json"
output_path = "out.json"

[api]
port = 8080
"#;

        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.detection.rules.len(), 1);
        assert_eq!(config.detection.rules[0].field, RuleField::TransactionAmount);
        assert_eq!(config.detection.rules[0].operator, RuleOperator::Ge);
        assert_eq!(config.detection.count_window_hours, 12.0);
        assert_eq!(config.detection.travel_window_hours, 24.0); // default
        assert_eq!(config.detection.distance_timeout_ms, 2000); // default
        assert_eq!(config.distance.routes.len(), 1);
        assert_eq!(config.report.format, ReportFormat::Json);
        assert_eq!(config.api.port, 8080);
        assert_eq!(config.api.host, "0.0.0.0"); // default
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_empty_config_uses_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert!(config.detection.enabled);
        assert_eq!(config.detection.rules.len(), 3);
        assert_eq!(config.distance.routes.len(), 4);
        assert_eq!(config.report.format, ReportFormat::Csv);
        assert!(config.input.cards_path.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_unknown_rule_tags_still_parse() {
        let toml_str = r#"
[[detection.rules]]
id = "x"
field = "merchant_category"
operator = "!="
value = "5"
"#;
        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(
            config.detection.rules[0].field,
            RuleField::Unknown("merchant_category".to_string())
        );
        assert_eq!(
            config.detection.rules[0].operator,
            RuleOperator::Unsupported("!=".to_string())
        );
        // Malformed rules are warnings at detection time, not config errors
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_numeric_rule_values_parse() {
        let toml_str = r#"
[[detection.rules]]
id = "amount"
field = "transaction_amount"
operator = ">"
value = 50

[[detection.rules]]
id = "distance"
field = "stores_distance"
operator = ">"
value = 120.5
"#;
        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.detection.rules.len(), 2);
        assert_eq!(config.detection.rules[0].threshold(), Some(50.0));
        assert_eq!(config.detection.rules[1].threshold(), Some(120.5));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_bad_window() {
        let mut config = Config::default();
        config.detection.travel_window_hours = 0.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_window_too_large() {
        let config: Config = toml::from_str("[detection]\ncount_window_hours = 1e12").unwrap();
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.detection.travel_window_hours = MAX_WINDOW_HOURS;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_bad_route() {
        let mut config = Config::default();
        config.distance.routes.push(DistanceRouteConfig {
            from: "london".to_string(),
            to: "paris".to_string(),
            km: -1.0,
        });
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_half_configured_input() {
        let mut config = Config::default();
        config.input.cards_path = Some("cards.json".to_string());
        assert!(config.validate().is_err());
    }
}
