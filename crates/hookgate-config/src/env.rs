//! `HOOKGATE_*` environment overrides.
//!
//! Applied after file layers and before CLI flags. Only variables that are
//! set and non-empty take effect.

use std::path::PathBuf;
use std::str::FromStr;

use crate::{ConfigError, ExecutionMode, HookgateConfig, Protocol, Result};

/// Apply overrides read from the process environment.
pub fn apply_process_env(config: &mut HookgateConfig) -> Result<()> {
    apply_env_overrides(config, |name| std::env::var(name).ok())
}

/// Apply overrides using `lookup` to resolve variable names.
pub fn apply_env_overrides<F>(config: &mut HookgateConfig, lookup: F) -> Result<()>
where
    F: Fn(&str) -> Option<String>,
{
    let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

    if let Some(v) = get("HOOKGATE_PROTOCOL") {
        config.server_mut().protocol = parse("HOOKGATE_PROTOCOL", &v, Protocol::from_str)?;
    }
    if let Some(v) = get("HOOKGATE_LISTEN_ADDRESS") {
        config.server_mut().listen_address = v;
    }
    if let Some(v) = get("HOOKGATE_PORT") {
        config.server_mut().port = parse("HOOKGATE_PORT", &v, u16::from_str)?;
    }
    if let Some(v) = get("HOOKGATE_SSL_KEY") {
        config.server_mut().ssl_key = Some(PathBuf::from(v));
    }
    if let Some(v) = get("HOOKGATE_SSL_CERT") {
        config.server_mut().ssl_cert = Some(PathBuf::from(v));
    }

    if let Some(v) = get("HOOKGATE_ENDPOINT_REST") {
        config.endpoints_mut().rest = v;
    }
    if let Some(v) = get("HOOKGATE_ENDPOINT_WEBHOOK") {
        config.endpoints_mut().webhook = v;
    }
    if let Some(v) = get("HOOKGATE_ENDPOINT_WEBHOOK_TEST") {
        config.endpoints_mut().webhook_test = v;
    }
    if let Some(v) = get("HOOKGATE_ENDPOINT_WEBHOOK_WAITING") {
        config.endpoints_mut().webhook_waiting = v;
    }

    if let Some(v) = get("HOOKGATE_EXECUTIONS_MODE") {
        config.executions_mut().mode =
            parse("HOOKGATE_EXECUTIONS_MODE", &v, ExecutionMode::from_str)?;
    }

    if let Some(v) = get("HOOKGATE_QUEUE_REDIS_HOST") {
        config.redis_mut().host = v;
    }
    if let Some(v) = get("HOOKGATE_QUEUE_REDIS_PORT") {
        config.redis_mut().port = parse("HOOKGATE_QUEUE_REDIS_PORT", &v, u16::from_str)?;
    }
    if let Some(v) = get("HOOKGATE_QUEUE_REDIS_DB") {
        config.redis_mut().db = parse("HOOKGATE_QUEUE_REDIS_DB", &v, u32::from_str)?;
    }
    if let Some(v) = get("HOOKGATE_QUEUE_REDIS_USERNAME") {
        config.redis_mut().username = Some(v);
    }
    if let Some(v) = get("HOOKGATE_QUEUE_REDIS_PASSWORD") {
        config.redis_mut().password = Some(v);
    }
    if let Some(v) = get("HOOKGATE_QUEUE_REDIS_CLUSTER_NODES") {
        config.redis_mut().cluster_nodes = v
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from)
            .collect();
    }
    if let Some(v) = get("HOOKGATE_QUEUE_REDIS_TIMEOUT_THRESHOLD") {
        config.redis_mut().timeout_threshold_ms =
            parse("HOOKGATE_QUEUE_REDIS_TIMEOUT_THRESHOLD", &v, u64::from_str)?;
    }

    Ok(())
}

fn parse<T, E, P>(var: &str, value: &str, parser: P) -> Result<T>
where
    P: Fn(&str) -> std::result::Result<T, E>,
    E: std::fmt::Display,
{
    parser(value.trim()).map_err(|e| ConfigError::InvalidEnv {
        var: var.to_string(),
        value: value.to_string(),
        reason: e.to_string(),
    })
}
