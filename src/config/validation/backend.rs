//! Backend validation
//!
//! Checks the payload of the active backend. The inactive backend cannot be
//! represented, so there is nothing to check for it.

use std::collections::HashSet;

use once_cell::sync::Lazy;
use regex::Regex;

use super::rules::{self, PortMapping, VolumeMapping};
use super::{ValidationResult, Validator};
use crate::config::types::{BackendSettings, Configuration, DockerSettings, WslSettings};

static IMAGE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^([A-Za-z0-9.-]+(:\d+)?/)?[a-z0-9]+([._/-][a-z0-9]+)*(:[A-Za-z0-9_][A-Za-z0-9_.-]{0,127})?(@sha256:[a-f0-9]{64})?$",
    )
    .expect("invalid regex")
});

static CONTAINER_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9][A-Za-z0-9_.-]*$").expect("invalid regex"));

/// Message shared with the orchestrator's container checks
pub(crate) const NO_VOLUMES: &str =
    "No volume mappings configured; data will not persist when the container is removed";

/// Validates WSL and Docker backend settings
#[derive(Debug, Default, Clone, Copy)]
pub struct BackendValidator;

impl Validator for BackendValidator {
    fn name(&self) -> &'static str {
        "backend"
    }

    fn validate(&self, config: &Configuration) -> ValidationResult {
        let mut result = ValidationResult::success();
        match &config.backend {
            BackendSettings::Wsl(wsl) => validate_wsl(wsl, &mut result),
            BackendSettings::Docker(docker) => validate_docker(docker, &mut result),
        }
        result
    }
}

fn validate_wsl(wsl: &WslSettings, result: &mut ValidationResult) {
    // Distribution
    if wsl.distribution.trim().is_empty() {
        result.error("backend.distribution", "WSL distribution is required");
    } else if wsl.distribution.chars().any(char::is_whitespace) {
        result.error("backend.distribution", "WSL distribution name must not contain whitespace");
    }

    // Paths inside the distribution
    for (path, value) in [
        ("backend.redisPath", &wsl.redis_path),
        ("backend.configPath", &wsl.config_path),
        ("backend.linuxDataPath", &wsl.linux_data_path),
    ] {
        if value.trim().is_empty() {
            result.error(path, "Path is required");
        } else if !rules::is_absolute_unix_path(value) {
            result.error(path, format!("'{}' must be an absolute Linux path", value));
        }
    }

    // Host side data directory
    if wsl.windows_data_path.trim().is_empty() {
        result.error("backend.windowsDataPath", "Path is required");
    } else if !rules::is_valid_path(&wsl.windows_data_path) {
        result.error(
            "backend.windowsDataPath",
            format!("'{}' is not a valid path", wsl.windows_data_path),
        );
    }
}

fn validate_docker(docker: &DockerSettings, result: &mut ValidationResult) {
    // Image and container
    if docker.image.trim().is_empty() {
        result.error("backend.image", "Docker image is required");
    } else if !IMAGE.is_match(&docker.image) {
        result.error("backend.image", format!("'{}' is not a valid image reference", docker.image));
    }

    if docker.container_name.trim().is_empty() {
        result.error("backend.containerName", "Container name is required");
    } else if !CONTAINER_NAME.is_match(&docker.container_name) {
        result.error(
            "backend.containerName",
            format!(
                "'{}' may only contain letters, digits, '_', '.' and '-' and must start with a letter or digit",
                docker.container_name
            ),
        );
    }

    // Port mappings
    if docker.port_mappings.is_empty() {
        result.error("backend.portMappings", "At least one port mapping is required");
    }

    let mut bound = HashSet::new();
    for (i, raw) in docker.port_mappings.iter().enumerate() {
        let path = format!("backend.portMappings[{i}]");
        match PortMapping::parse(raw) {
            Ok(mapping) => {
                if !bound.insert((mapping.host, mapping.protocol)) {
                    result.error(path, format!("Host port {} is mapped more than once", mapping.host));
                }
            }
            Err(reason) => result.error(path, format!("Invalid port mapping: {}", reason)),
        }
    }

    // Volume mappings
    if docker.volume_mappings.is_empty() {
        result.warning("backend.volumeMappings", NO_VOLUMES);
    }

    for (i, raw) in docker.volume_mappings.iter().enumerate() {
        if let Err(reason) = VolumeMapping::parse(raw) {
            result.error(
                format!("backend.volumeMappings[{i}]"),
                format!("Invalid volume mapping: {}", reason),
            );
        }
    }

    // Resource limits
    if let Some(memory) = &docker.resources.memory_limit {
        if rules::parse_memory(memory).is_none() {
            result.error(
                "backend.resources.memoryLimit",
                format!("'{}' is not a valid memory size", memory),
            );
        }
    }

    if let Some(cpu) = docker.resources.cpu_limit {
        if !cpu.is_finite() || cpu <= 0.0 {
            result.error("backend.resources.cpuLimit", "CPU limit must be a positive number");
        }
    }
}
