//! API key authentication with IP and system allow-lists
//!
//! Every decision reachable from the ingest path emits exactly one audit
//! event: `api_key_used`, `api_key_ip_violation`, `api_key_system_violation`
//! or `invalid_api_key`. When no key material is configured at all,
//! authentication is disabled and requests pass with no key id.

use radiocall_core::config::IngestConfig;
use radiocall_core::error::{AuthKind, RateWindow};
use radiocall_core::types::{SecurityEvent, SecurityEventType};
use radiocall_core::utils::{api_key_id, truncate_api_key};
use radiocall_core::{Error, Result};
use radiocall_database::AuditLog;
use serde_json::json;
use std::sync::Arc;

/// Successful authentication outcome
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthOutcome {
    /// Provenance key id: `legacy`, the first 8 chars of the key, or
    /// `None` when authentication is disabled
    pub api_key_id: Option<String>,
}

/// Request context threaded through audit emissions
#[derive(Debug, Clone, Copy)]
pub struct RequestContext<'a> {
    /// Client IP the request arrived from
    pub client_ip: &'a str,

    /// Source system field, when present
    pub system_id: Option<&'a str>,

    /// User agent header, when present
    pub user_agent: Option<&'a str>,
}

/// Authenticator over the configured key material
#[derive(Debug, Clone)]
pub struct AuthService {
    config: IngestConfig,
    audit: Arc<AuditLog>,
}

impl AuthService {
    /// Create an authenticator emitting to the given audit log
    #[must_use]
    pub const fn new(config: IngestConfig, audit: Arc<AuditLog>) -> Self {
        Self { config, audit }
    }

    /// Whether any key material is configured
    #[must_use]
    pub fn enabled(&self) -> bool {
        self.config.auth_enabled()
    }

    /// Validate a presented key against the legacy key and the descriptor
    /// list, enforcing per-key IP and system allow-lists
    ///
    /// # Errors
    ///
    /// Returns an `Authentication` error with a client-facing reason on
    /// deny; the matching audit event has already been emitted.
    pub async fn validate(
        &self,
        presented: Option<&str>,
        ctx: RequestContext<'_>,
    ) -> Result<AuthOutcome> {
        if !self.enabled() {
            tracing::debug!(
                system = ctx.system_id,
                "No API authentication configured, accepting upload"
            );
            return Ok(AuthOutcome { api_key_id: None });
        }

        let Some(key) = presented.filter(|k| !k.is_empty()) else {
            return Err(Error::auth(
                AuthKind::MissingCredentials,
                "API key is required",
            ));
        };

        // Legacy single key first, for backward compatibility
        if let Some(legacy) = &self.config.api_key
            && key == legacy
        {
            self.emit(
                SecurityEvent::new(
                    SecurityEventType::ApiKeyUsed,
                    format!(
                        "Legacy API key used by system {}",
                        ctx.system_id.unwrap_or("unknown")
                    ),
                )
                .with_api_key("legacy"),
                ctx,
            )
            .await;
            return Ok(AuthOutcome {
                api_key_id: Some("legacy".to_string()),
            });
        }

        for descriptor in &self.config.api_keys {
            if descriptor.key != key {
                continue;
            }

            if let Some(allowed_ips) = &descriptor.allowed_ips
                && !allowed_ips.iter().any(|ip| ip == ctx.client_ip)
            {
                self.emit(
                    SecurityEvent::new(
                        SecurityEventType::ApiKeyIpViolation,
                        format!("API key used from unauthorized IP {}", ctx.client_ip),
                    )
                    .with_api_key(truncate_api_key(key))
                    .with_metadata(json!({
                        "allowed_ips": allowed_ips,
                        "actual_ip": ctx.client_ip,
                    })),
                    ctx,
                )
                .await;
                return Err(Error::auth(
                    AuthKind::IpForbidden,
                    format!("API key not authorized for IP {}", ctx.client_ip),
                ));
            }

            if let Some(allowed_systems) = &descriptor.allowed_systems
                && let Some(system) = ctx.system_id
                && !allowed_systems.iter().any(|s| s == system)
            {
                self.emit(
                    SecurityEvent::new(
                        SecurityEventType::ApiKeySystemViolation,
                        format!("API key used by unauthorized system {system}"),
                    )
                    .with_api_key(truncate_api_key(key))
                    .with_metadata(json!({
                        "allowed_systems": allowed_systems,
                        "actual_system": system,
                    })),
                    ctx,
                )
                .await;
                return Err(Error::auth(
                    AuthKind::SystemForbidden,
                    format!("API key not authorized for system {system}"),
                ));
            }

            self.emit(
                SecurityEvent::new(
                    SecurityEventType::ApiKeyUsed,
                    format!(
                        "Valid API key used by system {}",
                        ctx.system_id.unwrap_or("unknown")
                    ),
                )
                .with_api_key(truncate_api_key(key))
                .with_metadata(json!({ "key_description": descriptor.description })),
                ctx,
            )
            .await;
            return Ok(AuthOutcome {
                api_key_id: Some(api_key_id(key)),
            });
        }

        self.emit(
            SecurityEvent::new(
                SecurityEventType::InvalidApiKey,
                format!(
                    "Invalid API key attempted by system {}",
                    ctx.system_id.unwrap_or("unknown")
                ),
            )
            .with_api_key(truncate_api_key(key)),
            ctx,
        )
        .await;
        Err(Error::auth(
            AuthKind::InvalidKey,
            "Invalid or unauthorized API key",
        ))
    }

    /// Record an upload attempt outcome for the audit trail
    pub async fn log_upload_attempt(
        &self,
        ctx: RequestContext<'_>,
        api_key_id: Option<&str>,
        file_name: Option<&str>,
        success: bool,
        reason: Option<&str>,
    ) {
        let (event_type, mut description) = if success {
            (SecurityEventType::UploadSuccess, "File upload succeeded".to_string())
        } else {
            (SecurityEventType::UploadBlocked, "File upload blocked".to_string())
        };
        if let Some(reason) = reason {
            description.push_str(": ");
            description.push_str(reason);
        }

        let mut event = SecurityEvent::new(event_type, description).with_metadata(json!({
            "file_name": file_name,
            "reason": reason,
        }));
        if let Some(key_id) = api_key_id {
            event = event.with_api_key(key_id);
        }

        self.emit(event, ctx).await;
    }

    /// Record a sliding window rejection for the audit trail
    pub async fn log_rate_limit_violation(
        &self,
        ctx: RequestContext<'_>,
        window: RateWindow,
        current: usize,
        limit: usize,
    ) {
        self.emit(
            SecurityEvent::new(
                SecurityEventType::RateLimitExceeded,
                format!("Rate limit exceeded: per-{window} window"),
            )
            .with_metadata(json!({
                "limit_type": window.to_string(),
                "current_count": current,
                "limit": limit,
            })),
            ctx,
        )
        .await;
    }

    async fn emit(&self, event: SecurityEvent, ctx: RequestContext<'_>) {
        let mut event = event.with_source_ip(ctx.client_ip);
        if let Some(system) = ctx.system_id {
            event = event.with_source_system(system);
        }
        if let Some(user_agent) = ctx.user_agent {
            event = event.with_user_agent(user_agent);
        }
        self.audit.emit(event).await;
    }
}

#[cfg(test)]
#[allow(clippy::missing_panics_doc)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use radiocall_core::config::ApiKeyConfig;

    fn ctx<'a>() -> RequestContext<'a> {
        RequestContext {
            client_ip: "10.0.0.1",
            system_id: Some("123"),
            user_agent: Some("sdrtrunk"),
        }
    }

    fn service(config: IngestConfig) -> (AuthService, Arc<AuditLog>) {
        let audit = Arc::new(AuditLog::memory_backed(64));
        (AuthService::new(config, Arc::clone(&audit)), audit)
    }

    fn descriptor(
        key: &str,
        allowed_ips: Option<Vec<&str>>,
        allowed_systems: Option<Vec<&str>>,
    ) -> ApiKeyConfig {
        ApiKeyConfig {
            key: key.to_string(),
            description: Some("test key".to_string()),
            allowed_ips: allowed_ips.map(|v| v.into_iter().map(String::from).collect()),
            allowed_systems: allowed_systems.map(|v| v.into_iter().map(String::from).collect()),
        }
    }

    #[tokio::test]
    async fn test_disabled_auth_admits_without_key_id() {
        let (auth, audit) = service(IngestConfig::default());
        assert!(!auth.enabled());

        let outcome = auth.validate(None, ctx()).await.unwrap();
        assert_eq!(outcome.api_key_id, None);
        assert!(audit.buffered().is_empty());
    }

    #[tokio::test]
    async fn test_legacy_key_match() {
        let config = IngestConfig {
            api_key: Some("legacy-secret".to_string()),
            ..Default::default()
        };
        let (auth, audit) = service(config);

        let outcome = auth.validate(Some("legacy-secret"), ctx()).await.unwrap();
        assert_eq!(outcome.api_key_id.as_deref(), Some("legacy"));

        let events = audit.buffered();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type, SecurityEventType::ApiKeyUsed);
        assert_eq!(events[0].api_key_used.as_deref(), Some("legacy"));
    }

    #[tokio::test]
    async fn test_descriptor_match_returns_truncated_id() {
        let config = IngestConfig {
            api_keys: vec![descriptor("abcdef0123456789", None, None)],
            ..Default::default()
        };
        let (auth, audit) = service(config);

        let outcome = auth.validate(Some("abcdef0123456789"), ctx()).await.unwrap();
        assert_eq!(outcome.api_key_id.as_deref(), Some("abcdef01"));

        let events = audit.buffered();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type, SecurityEventType::ApiKeyUsed);
        assert_eq!(events[0].api_key_used.as_deref(), Some("abcdef01..."));
    }

    #[tokio::test]
    async fn test_ip_violation() {
        let config = IngestConfig {
            api_keys: vec![descriptor("k", Some(vec!["10.0.0.2"]), None)],
            ..Default::default()
        };
        let (auth, audit) = service(config);

        let err = auth.validate(Some("k"), ctx()).await.unwrap_err();
        assert!(err.to_string().contains("IP"));
        match err {
            Error::Authentication { kind, .. } => assert_eq!(kind, AuthKind::IpForbidden),
            other => panic!("expected Authentication, got {other}"),
        }

        let events = audit.buffered();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type, SecurityEventType::ApiKeyIpViolation);
        assert_eq!(
            events[0].severity,
            radiocall_core::types::Severity::High
        );
    }

    #[tokio::test]
    async fn test_system_violation() {
        let config = IngestConfig {
            api_keys: vec![descriptor("k", None, Some(vec!["999"]))],
            ..Default::default()
        };
        let (auth, audit) = service(config);

        let err = auth.validate(Some("k"), ctx()).await.unwrap_err();
        assert!(err.to_string().contains("system"));

        let events = audit.buffered();
        assert_eq!(events.len(), 1);
        assert_eq!(
            events[0].event_type,
            SecurityEventType::ApiKeySystemViolation
        );
    }

    #[tokio::test]
    async fn test_system_restriction_ignored_without_system_field() {
        let config = IngestConfig {
            api_keys: vec![descriptor("k", None, Some(vec!["999"]))],
            ..Default::default()
        };
        let (auth, _audit) = service(config);

        let no_system = RequestContext {
            client_ip: "10.0.0.1",
            system_id: None,
            user_agent: None,
        };
        assert!(auth.validate(Some("k"), no_system).await.is_ok());
    }

    #[tokio::test]
    async fn test_invalid_key() {
        let config = IngestConfig {
            api_keys: vec![descriptor("real", None, None)],
            ..Default::default()
        };
        let (auth, audit) = service(config);

        let err = auth.validate(Some("wrong"), ctx()).await.unwrap_err();
        assert!(matches!(
            err,
            Error::Authentication {
                kind: AuthKind::InvalidKey,
                ..
            }
        ));

        let events = audit.buffered();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type, SecurityEventType::InvalidApiKey);
    }

    #[tokio::test]
    async fn test_missing_key_when_required() {
        let config = IngestConfig {
            api_key: Some("legacy".to_string()),
            ..Default::default()
        };
        let (auth, audit) = service(config);

        let err = auth.validate(None, ctx()).await.unwrap_err();
        assert!(matches!(
            err,
            Error::Authentication {
                kind: AuthKind::MissingCredentials,
                ..
            }
        ));
        assert!(audit.buffered().is_empty());
    }

    #[tokio::test]
    async fn test_every_auth_decision_emits_exactly_one_event() {
        let config = IngestConfig {
            api_key: Some("legacy".to_string()),
            api_keys: vec![
                descriptor("restricted", Some(vec!["10.0.0.2"]), None),
                descriptor("scoped", None, Some(vec!["999"])),
                descriptor("open", None, None),
            ],
            ..Default::default()
        };
        let (auth, audit) = service(config);

        let _ = auth.validate(Some("legacy"), ctx()).await;
        let _ = auth.validate(Some("restricted"), ctx()).await;
        let _ = auth.validate(Some("scoped"), ctx()).await;
        let _ = auth.validate(Some("open"), ctx()).await;
        let _ = auth.validate(Some("bogus"), ctx()).await;

        let events = audit.buffered();
        assert_eq!(events.len(), 5);

        let used = events
            .iter()
            .filter(|e| e.event_type == SecurityEventType::ApiKeyUsed)
            .count();
        assert_eq!(used, 2);
    }

    #[tokio::test]
    async fn test_upload_attempt_logging() {
        let (auth, audit) = service(IngestConfig::default());

        auth.log_upload_attempt(ctx(), Some("abcd1234"), Some("a.mp3"), true, None)
            .await;
        auth.log_upload_attempt(
            ctx(),
            Some("abcd1234"),
            Some("b.mp3"),
            false,
            Some("Invalid MP3 file header"),
        )
        .await;

        let events = audit.buffered();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].event_type, SecurityEventType::UploadSuccess);
        assert_eq!(events[1].event_type, SecurityEventType::UploadBlocked);
        assert!(events[1].description.contains("Invalid MP3 file header"));
    }

    #[tokio::test]
    async fn test_rate_limit_violation_logging() {
        let (auth, audit) = service(IngestConfig::default());

        auth.log_rate_limit_violation(ctx(), RateWindow::Minute, 11, 10)
            .await;

        let events = audit.buffered();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type, SecurityEventType::RateLimitExceeded);
        assert_eq!(
            events[0].severity,
            radiocall_core::types::Severity::Medium
        );
    }
}
