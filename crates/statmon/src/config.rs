// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Service configuration.
//!
//! Declarative XML document listing the devices to monitor, each with its
//! attributes and sampling settings, plus the service-level knobs
//! (persistent root, eviction thresholds, timeouts).
//!
//! ```xml
//! <statmon use-aliases="false">
//!   <service persistent-root="./statmon-data"
//!            persist-threshold="1000000"
//!            update-threshold="500000"
//!            read-timeout-ms="3000"
//!            light-poll-period-ms="10000"/>
//!   <devices>
//!     <device name="sim/lab/1">
//!       <attribute name="temperature" alias="lab1-temp" method="poll"
//!                  delay="200" interpolation="linear" precision="0.05"/>
//!       <attribute name="status" method="event" event-type="change"/>
//!     </device>
//!   </devices>
//! </statmon>
//! ```

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use bigdecimal::BigDecimal;
use roxmltree::{Document, Node};
use thiserror::Error;

use crate::attr::Method;
use crate::client::EventType;
use crate::interpolation::Interpolation;
use crate::storage::{PERSIST_THRESHOLD, UPDATE_THRESHOLD};

/// Configuration failure; fatal at startup.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("XML parse error: {0}")]
    Xml(#[from] roxmltree::Error),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Service-level settings with their defaults.
#[derive(Debug, Clone)]
pub struct ServiceSettings {
    /// Root of the persistent tier (directory or database location).
    pub persistent_root: PathBuf,
    pub persist_threshold: u64,
    pub update_threshold: u64,
    /// Per-call device read timeout.
    pub read_timeout: Duration,
    /// Shared sampling period in LIGHT_POLL mode.
    pub light_poll_period: Duration,
}

impl Default for ServiceSettings {
    fn default() -> Self {
        ServiceSettings {
            persistent_root: PathBuf::from("./statmon-data"),
            persist_threshold: PERSIST_THRESHOLD,
            update_threshold: UPDATE_THRESHOLD,
            read_timeout: Duration::from_millis(3000),
            light_poll_period: Duration::from_millis(10_000),
        }
    }
}

/// One attribute declaration.
#[derive(Debug, Clone)]
pub struct AttributeConfig {
    pub name: String,
    pub alias: Option<String>,
    pub method: Method,
    pub interpolation: Interpolation,
    /// Precision band for numeric attributes; `None` means store every
    /// change.
    pub precision: Option<BigDecimal>,
}

/// One device declaration.
#[derive(Debug, Clone)]
pub struct DeviceConfig {
    pub name: String,
    pub attributes: Vec<AttributeConfig>,
}

/// The whole parsed document.
#[derive(Debug, Clone)]
pub struct StatmonConfig {
    pub use_aliases: bool,
    pub service: ServiceSettings,
    pub devices: Vec<DeviceConfig>,
}

impl StatmonConfig {
    /// Load and validate a configuration file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::parse_xml(&content)
    }

    /// Parse and validate configuration XML.
    pub fn parse_xml(xml: &str) -> Result<Self, ConfigError> {
        let doc = Document::parse(xml)?;
        let root = doc.root_element();
        if root.tag_name().name() != "statmon" {
            return Err(ConfigError::Invalid(format!(
                "root element must be <statmon>, found <{}>",
                root.tag_name().name()
            )));
        }

        let use_aliases = root
            .attribute("use-aliases")
            .map(|v| v == "true")
            .unwrap_or(false);

        let service = match root.children().find(|n| n.has_tag_name("service")) {
            Some(node) => parse_service(&node)?,
            None => ServiceSettings::default(),
        };

        let devices = root
            .children()
            .find(|n| n.has_tag_name("devices"))
            .ok_or_else(|| ConfigError::Invalid("no <devices> element".to_string()))?;

        let devices = devices
            .children()
            .filter(|n| n.has_tag_name("device"))
            .map(|n| parse_device(&n))
            .collect::<Result<Vec<_>, _>>()?;

        let config = StatmonConfig {
            use_aliases,
            service,
            devices,
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.devices.is_empty() {
            return Err(ConfigError::Invalid("no devices configured".to_string()));
        }
        if self.service.persist_threshold == 0 || self.service.update_threshold == 0 {
            return Err(ConfigError::Invalid(
                "thresholds must be positive".to_string(),
            ));
        }
        for device in &self.devices {
            if device.attributes.is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "device {:?} declares no attributes",
                    device.name
                )));
            }
        }
        Ok(())
    }
}

fn req_attr<'a>(node: &'a Node, name: &str) -> Result<&'a str, ConfigError> {
    node.attribute(name).ok_or_else(|| {
        ConfigError::Invalid(format!(
            "<{}> is missing the {name:?} attribute",
            node.tag_name().name()
        ))
    })
}

fn parse_u64(node: &Node, name: &str, default: u64) -> Result<u64, ConfigError> {
    match node.attribute(name) {
        None => Ok(default),
        Some(text) => text
            .parse()
            .map_err(|_| ConfigError::Invalid(format!("bad {name}: {text:?}"))),
    }
}

fn parse_service(node: &Node) -> Result<ServiceSettings, ConfigError> {
    let defaults = ServiceSettings::default();
    Ok(ServiceSettings {
        persistent_root: node
            .attribute("persistent-root")
            .map(PathBuf::from)
            .unwrap_or(defaults.persistent_root),
        persist_threshold: parse_u64(node, "persist-threshold", defaults.persist_threshold)?,
        update_threshold: parse_u64(node, "update-threshold", defaults.update_threshold)?,
        read_timeout: Duration::from_millis(parse_u64(
            node,
            "read-timeout-ms",
            defaults.read_timeout.as_millis() as u64,
        )?),
        light_poll_period: Duration::from_millis(parse_u64(
            node,
            "light-poll-period-ms",
            defaults.light_poll_period.as_millis() as u64,
        )?),
    })
}

fn parse_device(node: &Node) -> Result<DeviceConfig, ConfigError> {
    let name = req_attr(node, "name")?.to_string();
    let attributes = node
        .children()
        .filter(|n| n.has_tag_name("attribute"))
        .map(|n| parse_attribute(&name, &n))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(DeviceConfig { name, attributes })
}

fn parse_attribute(device: &str, node: &Node) -> Result<AttributeConfig, ConfigError> {
    let name = req_attr(node, "name")?.to_string();
    let context = format!("{device}/{name}");

    let method = match req_attr(node, "method")? {
        "poll" => {
            let delay = req_attr(node, "delay").map_err(|_| {
                ConfigError::Invalid(format!("{context}: polled attributes need a delay"))
            })?;
            let delay: u64 = delay
                .parse()
                .map_err(|_| ConfigError::Invalid(format!("{context}: bad delay {delay:?}")))?;
            if delay == 0 {
                return Err(ConfigError::Invalid(format!(
                    "{context}: delay must be positive"
                )));
            }
            Method::Poll {
                delay: Duration::from_millis(delay),
            }
        }
        "event" => {
            let event_type = req_attr(node, "event-type").map_err(|_| {
                ConfigError::Invalid(format!(
                    "{context}: event-driven attributes need an event-type"
                ))
            })?;
            let event_type = EventType::from_str(event_type)
                .map_err(|e| ConfigError::Invalid(format!("{context}: {e}")))?;
            Method::Event { event_type }
        }
        other => {
            return Err(ConfigError::Invalid(format!(
                "{context}: method must be poll or event, found {other:?}"
            )))
        }
    };

    let interpolation = match node.attribute("interpolation") {
        None => Interpolation::default(),
        Some(text) => Interpolation::from_str(text)
            .map_err(|e| ConfigError::Invalid(format!("{context}: {e}")))?,
    };

    let precision = match node.attribute("precision") {
        None => None,
        Some(text) => {
            let precision = BigDecimal::from_str(text).map_err(|_| {
                ConfigError::Invalid(format!("{context}: bad precision {text:?}"))
            })?;
            if precision < BigDecimal::from(0) {
                return Err(ConfigError::Invalid(format!(
                    "{context}: precision must be non-negative"
                )));
            }
            Some(precision)
        }
    };

    Ok(AttributeConfig {
        name,
        alias: node.attribute("alias").map(str::to_string),
        method,
        interpolation,
        precision,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"<?xml version="1.0"?>
<statmon>
  <devices>
    <device name="sim/lab/1">
      <attribute name="temperature" method="poll" delay="200"/>
    </device>
  </devices>
</statmon>"#;

    #[test]
    fn test_parse_minimal_uses_defaults() {
        let config = StatmonConfig::parse_xml(MINIMAL).expect("minimal config should parse");
        assert!(!config.use_aliases);
        assert_eq!(config.service.persist_threshold, PERSIST_THRESHOLD);
        assert_eq!(config.service.update_threshold, UPDATE_THRESHOLD);
        assert_eq!(config.devices.len(), 1);

        let attr = &config.devices[0].attributes[0];
        assert_eq!(attr.name, "temperature");
        assert_eq!(attr.interpolation, Interpolation::Last);
        assert!(attr.alias.is_none());
        assert!(attr.precision.is_none());
        assert_eq!(
            attr.method,
            Method::Poll {
                delay: Duration::from_millis(200)
            }
        );
    }

    #[test]
    fn test_parse_full_document() {
        let xml = r#"<?xml version="1.0"?>
<statmon use-aliases="true">
  <service persistent-root="/var/lib/statmon"
           persist-threshold="1000"
           update-threshold="500"
           read-timeout-ms="250"
           light-poll-period-ms="5000"/>
  <devices>
    <device name="sim/lab/1">
      <attribute name="temperature" alias="t1" method="poll" delay="100"
                 interpolation="linear" precision="0.05"/>
      <attribute name="door" method="event" event-type="change"
                 interpolation="nearest"/>
    </device>
  </devices>
</statmon>"#;

        let config = StatmonConfig::parse_xml(xml).expect("full config should parse");
        assert!(config.use_aliases);
        assert_eq!(
            config.service.persistent_root,
            PathBuf::from("/var/lib/statmon")
        );
        assert_eq!(config.service.persist_threshold, 1000);
        assert_eq!(config.service.read_timeout, Duration::from_millis(250));
        assert_eq!(
            config.service.light_poll_period,
            Duration::from_millis(5000)
        );

        let attrs = &config.devices[0].attributes;
        assert_eq!(attrs[0].alias.as_deref(), Some("t1"));
        assert_eq!(attrs[0].interpolation, Interpolation::Linear);
        assert_eq!(
            attrs[0].precision,
            Some(BigDecimal::from_str("0.05").unwrap())
        );
        assert_eq!(
            attrs[1].method,
            Method::Event {
                event_type: EventType::Change
            }
        );
    }

    #[test]
    fn test_poll_without_delay_is_invalid() {
        let xml = r#"<statmon><devices><device name="d">
            <attribute name="a" method="poll"/>
        </device></devices></statmon>"#;
        assert!(matches!(
            StatmonConfig::parse_xml(xml),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn test_event_without_type_is_invalid() {
        let xml = r#"<statmon><devices><device name="d">
            <attribute name="a" method="event"/>
        </device></devices></statmon>"#;
        assert!(matches!(
            StatmonConfig::parse_xml(xml),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn test_negative_precision_is_invalid() {
        let xml = r#"<statmon><devices><device name="d">
            <attribute name="a" method="poll" delay="10" precision="-1"/>
        </device></devices></statmon>"#;
        assert!(matches!(
            StatmonConfig::parse_xml(xml),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn test_no_devices_is_invalid() {
        let xml = r#"<statmon><devices/></statmon>"#;
        assert!(matches!(
            StatmonConfig::parse_xml(xml),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn test_wrong_root_is_invalid() {
        let xml = r#"<monitor><devices/></monitor>"#;
        assert!(matches!(
            StatmonConfig::parse_xml(xml),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn test_zero_delay_is_invalid() {
        let xml = r#"<statmon><devices><device name="d">
            <attribute name="a" method="poll" delay="0"/>
        </device></devices></statmon>"#;
        assert!(matches!(
            StatmonConfig::parse_xml(xml),
            Err(ConfigError::Invalid(_))
        ));
    }
}
