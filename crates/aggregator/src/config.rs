use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

use crate::upstream::{FunctionKey, SourceEndpoints};

const DEFAULT_ENTITY_REGISTRY_URL: &str = "https://data.brreg.no/enhetsregisteret/api";
const DEFAULT_FUNCTION_KEY_NAME: &str = "code";

#[derive(Debug, Clone)]
pub struct AggregatorConfig {
    pub bind_addr: SocketAddr,
    pub endpoints: SourceEndpoints,
    pub entity_registry_url: String,
    pub function_key: Option<FunctionKey>,
    pub upstream_timeout: Duration,
    pub request_timeout: Option<Duration>,
    pub approval_number_threshold: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartupError {
    pub code: &'static str,
    pub message: String,
}

impl std::fmt::Display for StartupError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for StartupError {}

impl AggregatorConfig {
    pub fn load() -> Result<Self, StartupError> {
        let mut merged = HashMap::new();

        if let Ok(config_path) = std::env::var("EBEVIS_CONFIG_PATH") {
            let config_path = config_path.trim();
            if !config_path.is_empty() {
                let file_kv = parse_env_file(config_path)?;
                merged.extend(file_kv);
            }
        }

        merged.extend(std::env::vars());

        Self::from_kv(&merged)
    }

    pub fn from_kv(kv: &HashMap<String, String>) -> Result<Self, StartupError> {
        let bind_addr = parse_socket_addr(
            kv.get("EBEVIS_BIND_ADDR"),
            SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 7071),
            "EBEVIS_BIND_ADDR",
        )?;

        let endpoints = SourceEndpoints {
            central_unit_registry: require_url(kv, "EBEVIS_ES_BR_ENDPOINT_URL")?,
            labour_inspection: require_url(kv, "EBEVIS_ES_ARBT_ENDPOINT_URL")?,
            road_administration: require_url(kv, "EBEVIS_ES_SVV_ENDPOINT_URL")?,
        };

        let entity_registry_url = match nonempty(kv, "EBEVIS_ENTITY_REGISTRY_URL") {
            Some(url) => validate_url(url, "EBEVIS_ENTITY_REGISTRY_URL")?,
            None => DEFAULT_ENTITY_REGISTRY_URL.to_string(),
        };

        // Sources behind a function gateway want the key as a query parameter.
        let function_key = nonempty(kv, "EBEVIS_FUNCTION_KEY_VALUE").map(|value| FunctionKey {
            name: nonempty(kv, "EBEVIS_FUNCTION_KEY_NAME")
                .unwrap_or(DEFAULT_FUNCTION_KEY_NAME)
                .to_string(),
            value: value.to_string(),
        });

        let upstream_timeout_ms = parse_u64(
            kv.get("EBEVIS_UPSTREAM_TIMEOUT_MS"),
            30_000,
            "EBEVIS_UPSTREAM_TIMEOUT_MS",
        )?;
        if upstream_timeout_ms == 0 {
            return Err(StartupError {
                code: "ERR_INVALID_CONFIG",
                message: "EBEVIS_UPSTREAM_TIMEOUT_MS must be > 0".to_string(),
            });
        }

        let request_timeout_ms = parse_u64(
            kv.get("EBEVIS_REQUEST_TIMEOUT_MS"),
            60_000,
            "EBEVIS_REQUEST_TIMEOUT_MS",
        )?;
        let request_timeout = (request_timeout_ms > 0).then(|| Duration::from_millis(request_timeout_ms));

        let approval_number_threshold = parse_usize(
            kv.get("EBEVIS_APPROVAL_NUMBER_THRESHOLD"),
            0,
            "EBEVIS_APPROVAL_NUMBER_THRESHOLD",
        )?;

        Ok(Self {
            bind_addr,
            endpoints,
            entity_registry_url,
            function_key,
            upstream_timeout: Duration::from_millis(upstream_timeout_ms),
            request_timeout,
            approval_number_threshold,
        })
    }
}

fn parse_env_file(path: &str) -> Result<HashMap<String, String>, StartupError> {
    let contents = std::fs::read_to_string(path).map_err(|_| StartupError {
        code: "ERR_CONFIG_FILE_READ",
        message: format!("failed to read config file at {}", path),
    })?;

    let mut kv = HashMap::new();

    for (idx, raw_line) in contents.lines().enumerate() {
        let line = raw_line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let (key, value) = line.split_once('=').ok_or_else(|| StartupError {
            code: "ERR_CONFIG_FILE_PARSE",
            message: format!("invalid config line {} (expected KEY=VALUE)", idx + 1),
        })?;

        let key = key.trim();
        if key.is_empty() {
            return Err(StartupError {
                code: "ERR_CONFIG_FILE_PARSE",
                message: format!("invalid config line {} (empty key)", idx + 1),
            });
        }

        kv.insert(key.to_string(), strip_quotes(value.trim()));
    }

    Ok(kv)
}

fn strip_quotes(s: &str) -> String {
    let bytes = s.as_bytes();
    if bytes.len() >= 2 {
        let first = bytes[0];
        let last = bytes[bytes.len() - 1];
        if (first == b'"' && last == b'"') || (first == b'\'' && last == b'\'') {
            return s[1..bytes.len() - 1].to_string();
        }
    }
    s.to_string()
}

fn nonempty<'a>(kv: &'a HashMap<String, String>, key: &str) -> Option<&'a str> {
    kv.get(key).map(|v| v.trim()).filter(|v| !v.is_empty())
}

fn require_url(kv: &HashMap<String, String>, key: &'static str) -> Result<String, StartupError> {
    let Some(value) = nonempty(kv, key) else {
        return Err(StartupError {
            code: "ERR_MISSING_CONFIG",
            message: format!("missing required config key {}", key),
        });
    };
    validate_url(value, key)
}

fn validate_url(value: &str, key: &'static str) -> Result<String, StartupError> {
    let invalid = || StartupError {
        code: "ERR_INVALID_CONFIG",
        message: format!("{} must be an absolute http(s) URL", key),
    };

    let url = reqwest::Url::parse(value).map_err(|_| invalid())?;
    if !matches!(url.scheme(), "http" | "https") || url.host_str().is_none() {
        return Err(invalid());
    }

    Ok(value.to_string())
}

fn parse_socket_addr(
    value: Option<&String>,
    default: SocketAddr,
    key: &'static str,
) -> Result<SocketAddr, StartupError> {
    match value {
        None => Ok(default),
        Some(v) if v.trim().is_empty() => Ok(default),
        Some(v) => v.trim().parse::<SocketAddr>().map_err(|_| StartupError {
            code: "ERR_INVALID_CONFIG",
            message: format!("{} must be a valid host:port socket address", key),
        }),
    }
}

fn parse_u64(value: Option<&String>, default: u64, key: &'static str) -> Result<u64, StartupError> {
    match value {
        None => Ok(default),
        Some(v) if v.trim().is_empty() => Ok(default),
        Some(v) => v.trim().parse::<u64>().map_err(|_| StartupError {
            code: "ERR_INVALID_CONFIG",
            message: format!("{} must be an integer", key),
        }),
    }
}

fn parse_usize(
    value: Option<&String>,
    default: usize,
    key: &'static str,
) -> Result<usize, StartupError> {
    match value {
        None => Ok(default),
        Some(v) if v.trim().is_empty() => Ok(default),
        Some(v) => v.trim().parse::<usize>().map_err(|_| StartupError {
            code: "ERR_INVALID_CONFIG",
            message: format!("{} must be an integer", key),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal_ok_env() -> HashMap<String, String> {
        HashMap::from([
            (
                "EBEVIS_ES_BR_ENDPOINT_URL".to_string(),
                "http://127.0.0.1:7001/api/".to_string(),
            ),
            (
                "EBEVIS_ES_ARBT_ENDPOINT_URL".to_string(),
                "http://127.0.0.1:7002/api/".to_string(),
            ),
            (
                "EBEVIS_ES_SVV_ENDPOINT_URL".to_string(),
                "http://127.0.0.1:7003/api/".to_string(),
            ),
        ])
    }

    #[test]
    fn defaults_apply_when_only_endpoints_are_set() {
        let cfg = AggregatorConfig::from_kv(&minimal_ok_env()).expect("config should load");

        assert_eq!(cfg.bind_addr, "127.0.0.1:7071".parse().expect("addr"));
        assert_eq!(cfg.entity_registry_url, DEFAULT_ENTITY_REGISTRY_URL);
        assert_eq!(cfg.function_key, None);
        assert_eq!(cfg.upstream_timeout, Duration::from_secs(30));
        assert_eq!(cfg.request_timeout, Some(Duration::from_secs(60)));
        assert_eq!(cfg.approval_number_threshold, 0);
        assert_eq!(cfg.endpoints.labour_inspection, "http://127.0.0.1:7002/api/");
    }

    #[test]
    fn missing_endpoint_fails() {
        let mut env = minimal_ok_env();
        env.remove("EBEVIS_ES_SVV_ENDPOINT_URL");
        let err = AggregatorConfig::from_kv(&env).unwrap_err();
        assert_eq!(err.code, "ERR_MISSING_CONFIG");
        assert!(err.message.contains("EBEVIS_ES_SVV_ENDPOINT_URL"));

        env.insert("EBEVIS_ES_SVV_ENDPOINT_URL".to_string(), "  ".to_string());
        let err = AggregatorConfig::from_kv(&env).unwrap_err();
        assert_eq!(err.code, "ERR_MISSING_CONFIG");
    }

    #[test]
    fn relative_or_non_http_endpoint_fails() {
        for bad in ["/api/", "ftp://files.example/api", "not a url"] {
            let mut env = minimal_ok_env();
            env.insert("EBEVIS_ES_BR_ENDPOINT_URL".to_string(), bad.to_string());
            let err = AggregatorConfig::from_kv(&env).unwrap_err();
            assert_eq!(err.code, "ERR_INVALID_CONFIG", "{bad}");
        }
    }

    #[test]
    fn function_key_needs_a_value() {
        let mut env = minimal_ok_env();
        env.insert("EBEVIS_FUNCTION_KEY_NAME".to_string(), "x-key".to_string());
        let cfg = AggregatorConfig::from_kv(&env).expect("config should load");
        assert_eq!(cfg.function_key, None);

        env.insert("EBEVIS_FUNCTION_KEY_VALUE".to_string(), "secret".to_string());
        let cfg = AggregatorConfig::from_kv(&env).expect("config should load");
        assert_eq!(
            cfg.function_key,
            Some(FunctionKey {
                name: "x-key".to_string(),
                value: "secret".to_string(),
            })
        );

        env.remove("EBEVIS_FUNCTION_KEY_NAME");
        let cfg = AggregatorConfig::from_kv(&env).expect("config should load");
        assert_eq!(cfg.function_key.map(|k| k.name), Some("code".to_string()));
    }

    #[test]
    fn timeouts_and_threshold_parse_from_env() {
        let mut env = minimal_ok_env();
        env.insert("EBEVIS_UPSTREAM_TIMEOUT_MS".to_string(), "2500".to_string());
        env.insert("EBEVIS_REQUEST_TIMEOUT_MS".to_string(), "0".to_string());
        env.insert("EBEVIS_APPROVAL_NUMBER_THRESHOLD".to_string(), "2".to_string());

        let cfg = AggregatorConfig::from_kv(&env).expect("config should load");
        assert_eq!(cfg.upstream_timeout, Duration::from_millis(2500));
        assert_eq!(cfg.request_timeout, None);
        assert_eq!(cfg.approval_number_threshold, 2);
    }

    #[test]
    fn zero_upstream_timeout_fails() {
        let mut env = minimal_ok_env();
        env.insert("EBEVIS_UPSTREAM_TIMEOUT_MS".to_string(), "0".to_string());
        let err = AggregatorConfig::from_kv(&env).unwrap_err();
        assert_eq!(err.code, "ERR_INVALID_CONFIG");
    }

    #[test]
    fn non_numeric_values_fail() {
        let mut env = minimal_ok_env();
        env.insert("EBEVIS_APPROVAL_NUMBER_THRESHOLD".to_string(), "-1".to_string());
        let err = AggregatorConfig::from_kv(&env).unwrap_err();
        assert_eq!(err.code, "ERR_INVALID_CONFIG");

        let mut env = minimal_ok_env();
        env.insert("EBEVIS_BIND_ADDR".to_string(), "localhost".to_string());
        let err = AggregatorConfig::from_kv(&env).unwrap_err();
        assert_eq!(err.code, "ERR_INVALID_CONFIG");
    }

    #[test]
    fn env_file_lines_parse_with_quotes_and_comments() {
        let path = std::env::temp_dir().join(format!(
            "ebevis-config-{}-{}.env",
            std::process::id(),
            ulid::Ulid::new()
        ));
        std::fs::write(
            &path,
            "# sources\nEBEVIS_ES_BR_ENDPOINT_URL=\"http://br.local/api/\"\n\nEBEVIS_FUNCTION_KEY_VALUE='k1'\n",
        )
        .expect("write config file");

        let kv = parse_env_file(path.to_str().expect("utf-8 path")).expect("file should parse");
        let _ = std::fs::remove_file(&path);

        assert_eq!(
            kv.get("EBEVIS_ES_BR_ENDPOINT_URL").map(String::as_str),
            Some("http://br.local/api/")
        );
        assert_eq!(kv.get("EBEVIS_FUNCTION_KEY_VALUE").map(String::as_str), Some("k1"));
    }

    #[test]
    fn env_file_rejects_lines_without_separator() {
        let path = std::env::temp_dir().join(format!(
            "ebevis-config-bad-{}-{}.env",
            std::process::id(),
            ulid::Ulid::new()
        ));
        std::fs::write(&path, "EBEVIS_BIND_ADDR\n").expect("write config file");

        let err = parse_env_file(path.to_str().expect("utf-8 path")).unwrap_err();
        let _ = std::fs::remove_file(&path);

        assert_eq!(err.code, "ERR_CONFIG_FILE_PARSE");
    }
}
