use std::net::IpAddr;

use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;
use url::Url;

use crate::config::models::RuntimeConfig;
use crate::core::proxy_config::WS_ROUTES;
use crate::metrics::METRICS_ROUTE;

static DOMAIN_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[a-zA-Z0-9]([a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?(\.[a-zA-Z0-9]([a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?)*$")
        .expect("domain pattern is a valid regex")
});

#[derive(Error, Debug)]
pub enum ValidationError {
    #[error("Configuration validation failed: {message}")]
    ValidationFailed { message: String },

    #[error("Invalid field '{field}': {message}")]
    InvalidField { field: String, message: String },

    #[error("Invalid URL in field '{field}': {url} - {reason}")]
    InvalidUrl {
        field: String,
        url: String,
        reason: String,
    },

    #[error("Port conflict: {message}")]
    PortConflict { message: String },
}

pub type ValidationResult<T> = Result<T, ValidationError>;

/// Configuration validator with detailed error reporting
pub struct ConfigValidator;

impl ConfigValidator {
    /// Validate a complete runtime configuration, reporting every problem at once
    pub fn validate(config: &RuntimeConfig) -> ValidationResult<()> {
        let mut errors = Vec::new();

        // Doubles as the trojan password; the engine maps non-UUID ids itself.
        if config.uuid.is_empty() || config.uuid.chars().any(char::is_whitespace) {
            errors.push(ValidationError::InvalidField {
                field: "uuid".to_string(),
                message: "Identity token must be non-empty and contain no whitespace".to_string(),
            });
        }

        if config.listen_host.trim().parse::<IpAddr>().is_err() {
            errors.push(ValidationError::InvalidField {
                field: "listen_host".to_string(),
                message: format!("'{}' is not an IPv4 or IPv6 address", config.listen_host),
            });
        }

        if let Err(e) = Self::validate_sub_path(&config.sub_path) {
            errors.push(e);
        }

        errors.extend(Self::check_ports(config));

        if let Some(domain) = config.static_domain() {
            if !Self::is_valid_domain(domain) {
                errors.push(ValidationError::InvalidField {
                    field: "argo_domain".to_string(),
                    message: format!("'{domain}' is not a valid hostname"),
                });
            }
        }

        if config.cfip.trim().is_empty() {
            errors.push(ValidationError::InvalidField {
                field: "cfip".to_string(),
                message: "Front-end address cannot be empty".to_string(),
            });
        }

        let urls = [
            ("upload_url", config.upload_url()),
            ("project_url", config.project_url()),
            ("keepalive_url", Some(config.keepalive_url.as_str())),
            ("org_lookup_url", Some(config.org_lookup_url.as_str())),
        ];
        for (field, value) in urls {
            if let Some(url) = value {
                if let Err(e) = Self::validate_url(url, field) {
                    errors.push(e);
                }
            }
        }

        if let Some(port) = config.telemetry_port.as_deref().map(str::trim) {
            if !port.is_empty() && port.parse::<u16>().is_err() {
                errors.push(ValidationError::InvalidField {
                    field: "telemetry_port".to_string(),
                    message: format!("'{port}' is not a valid port number"),
                });
            }
        }

        if config.discovery_retry_secs == 0 {
            errors.push(ValidationError::InvalidField {
                field: "discovery_retry_secs".to_string(),
                message: "Retry delay must be greater than 0".to_string(),
            });
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ValidationError::ValidationFailed {
                message: Self::format_multiple_errors(errors),
            })
        }
    }

    /// The subscription suffix becomes a single route segment
    fn validate_sub_path(sub_path: &str) -> ValidationResult<()> {
        let invalid = |message: &str| ValidationError::InvalidField {
            field: "sub_path".to_string(),
            message: message.to_string(),
        };

        if sub_path.is_empty() {
            return Err(invalid("Subscription path cannot be empty"));
        }
        if sub_path.contains('/') {
            return Err(invalid("Subscription path must be a single segment without '/'"));
        }
        if !sub_path
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '~'))
        {
            return Err(invalid(
                "Subscription path may only contain letters, digits, '-', '_', '.' or '~'",
            ));
        }
        if sub_path == METRICS_ROUTE {
            return Err(invalid("Subscription path collides with the metrics route"));
        }
        Ok(())
    }

    fn check_ports(config: &RuntimeConfig) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        for (field, port) in [
            ("port", config.listen_port()),
            ("argo_port", config.argo_port),
            ("cfport", config.cfport),
        ] {
            if port == 0 {
                errors.push(ValidationError::InvalidField {
                    field: field.to_string(),
                    message: "Port must be greater than 0".to_string(),
                });
            }
        }

        if config.argo_port == config.listen_port() {
            errors.push(ValidationError::PortConflict {
                message: format!(
                    "Edge port {} is also the HTTP listen port",
                    config.argo_port
                ),
            });
        }

        for route in WS_ROUTES.iter() {
            for (field, port) in [("port", config.listen_port()), ("argo_port", config.argo_port)] {
                if port == route.port {
                    errors.push(ValidationError::PortConflict {
                        message: format!(
                            "{field} {port} is reserved for the loopback {} inbound",
                            route.protocol
                        ),
                    });
                }
            }
        }

        errors
    }

    /// Validate URL format
    fn validate_url(url_str: &str, context: &str) -> ValidationResult<()> {
        match Url::parse(url_str) {
            Ok(url) => {
                if url.scheme() != "http" && url.scheme() != "https" {
                    return Err(ValidationError::InvalidUrl {
                        field: context.to_string(),
                        url: url_str.to_string(),
                        reason: "URL must use http:// or https:// scheme".to_string(),
                    });
                }

                if url.host().is_none() {
                    return Err(ValidationError::InvalidUrl {
                        field: context.to_string(),
                        url: url_str.to_string(),
                        reason: "URL must have a valid host".to_string(),
                    });
                }

                Ok(())
            }
            Err(e) => Err(ValidationError::InvalidUrl {
                field: context.to_string(),
                url: url_str.to_string(),
                reason: format!("Invalid URL format: {e}"),
            }),
        }
    }

    /// Basic domain name validation
    fn is_valid_domain(domain: &str) -> bool {
        DOMAIN_PATTERN.is_match(domain) && domain.len() <= 253
    }

    /// Format multiple validation errors into a single message
    fn format_multiple_errors(errors: Vec<ValidationError>) -> String {
        let mut message = format!("Found {} validation error(s):\n", errors.len());
        for (i, error) in errors.iter().enumerate() {
            message.push_str(&format!("  {}. {}\n", i + 1, error));
        }
        message
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_valid_config() -> RuntimeConfig {
        RuntimeConfig::builder()
            .uuid("11111111-1111-1111-1111-111111111111")
            .build()
    }

    #[test]
    fn test_valid_config() {
        let config = create_valid_config();
        assert!(ConfigValidator::validate(&config).is_ok());
    }

    #[test]
    fn test_invalid_uuid() {
        for token in ["", "has space", "tab\there"] {
            let config = RuntimeConfig::builder().uuid(token).build();

            let result = ConfigValidator::validate(&config);
            assert!(result.unwrap_err().to_string().contains("Invalid field 'uuid'"));
        }
    }

    #[test]
    fn test_free_form_identity_token_accepted() {
        let config = RuntimeConfig::builder().uuid("my-trojan-password").build();
        assert!(ConfigValidator::validate(&config).is_ok());
    }

    #[test]
    fn test_listen_host_must_be_ip() {
        for host in ["0.0.0.0", "::", "127.0.0.1", "::1"] {
            let config = RuntimeConfig::builder()
                .uuid("11111111-1111-1111-1111-111111111111")
                .listen_host(host)
                .build();
            assert!(ConfigValidator::validate(&config).is_ok(), "{host} should be accepted");
        }

        let config = RuntimeConfig::builder()
            .uuid("11111111-1111-1111-1111-111111111111")
            .listen_host("localhost")
            .build();
        let message = ConfigValidator::validate(&config).unwrap_err().to_string();
        assert!(message.contains("Invalid field 'listen_host'"));
    }

    #[test]
    fn test_server_port_checked_for_conflicts() {
        let mut config = create_valid_config();
        config.server_port = Some(config.argo_port);

        let result = ConfigValidator::validate(&config);
        assert!(result.unwrap_err().to_string().contains("Port conflict"));
    }

    #[test]
    fn test_sub_path_rules() {
        assert!(ConfigValidator::validate_sub_path("sub").is_ok());
        assert!(ConfigValidator::validate_sub_path("my-sub_1").is_ok());
        assert!(ConfigValidator::validate_sub_path("").is_err());
        assert!(ConfigValidator::validate_sub_path("a/b").is_err());
        assert!(ConfigValidator::validate_sub_path("a b").is_err());
        assert!(ConfigValidator::validate_sub_path(METRICS_ROUTE).is_err());
    }

    #[test]
    fn test_edge_port_conflicts_with_listen_port() {
        let mut config = create_valid_config();
        config.argo_port = config.port;

        let result = ConfigValidator::validate(&config);
        assert!(result.unwrap_err().to_string().contains("Port conflict"));
    }

    #[test]
    fn test_loopback_ports_are_reserved() {
        let mut config = create_valid_config();
        config.port = WS_ROUTES[0].port;

        let result = ConfigValidator::validate(&config);
        assert!(result.unwrap_err().to_string().contains("reserved for the loopback"));
    }

    #[test]
    fn test_invalid_upload_url() {
        let config = RuntimeConfig::builder()
            .uuid("11111111-1111-1111-1111-111111111111")
            .upload_url("ftp://aggregator.example.com")
            .build();

        let result = ConfigValidator::validate(&config);
        assert!(result.unwrap_err().to_string().contains("Invalid URL"));
    }

    #[test]
    fn test_errors_are_aggregated() {
        let mut config = RuntimeConfig::builder().uuid("").sub_path("").build();
        config.telemetry_port = Some("https".to_string());

        let message = ConfigValidator::validate(&config).unwrap_err().to_string();
        assert!(message.contains("Found 3 validation error(s)"));
    }

    #[test]
    fn test_domain_validation() {
        assert!(ConfigValidator::is_valid_domain("example.com"));
        assert!(ConfigValidator::is_valid_domain("abc123.trycloudflare.com"));
        assert!(!ConfigValidator::is_valid_domain(""));
        assert!(!ConfigValidator::is_valid_domain(".example.com"));
        assert!(!ConfigValidator::is_valid_domain("https://example.com"));
    }
}
