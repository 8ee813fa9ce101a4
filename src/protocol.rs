//! Translation between the verification vocabulary and the low-level one.
//!
//! The low-level dataset knows protocols such as `grandtest` or `print`, groups
//! `train/devel/test` and classes `enroll/real/attack`. Verification callers speak
//! of `<protocol>-licit` and `<protocol>-spoof`, groups `world/dev/eval` and
//! purposes `enroll/probe`. Every rule mapping one onto the other lives here.

use anyhow::{anyhow, Result};
use std::fmt;

use crate::dataset::{Class, Filters, LowLevelProtocol, LowLevelQuery};
use crate::error::QueryError;

/// Protocol used when the caller does not pick one.
pub const DEFAULT_PROTOCOL: &str = "grandtest-licit";

/// Protocol value meaning "no protocol filter".
pub const NO_PROTOCOL: &str = ".";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ProtocolVariant {
    /// Genuine verification attempts; probes are real accesses.
    Licit,
    /// Presentation attacks; probes are attack videos.
    Spoof,
}

impl ProtocolVariant {
    pub const ALL: [ProtocolVariant; 2] = [ProtocolVariant::Licit, ProtocolVariant::Spoof];

    pub fn suffix(self) -> &'static str {
        match self {
            ProtocolVariant::Licit => "-licit",
            ProtocolVariant::Spoof => "-spoof",
        }
    }

    /// Low-level class that probes translate to.
    pub fn probe_class(self) -> Class {
        match self {
            ProtocolVariant::Licit => Class::Real,
            ProtocolVariant::Spoof => Class::Attack,
        }
    }
}

/// A `<base>-licit` or `<base>-spoof` protocol name split into its parts.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HighLevelProtocol {
    pub base: String,
    pub variant: ProtocolVariant,
}

impl HighLevelProtocol {
    pub fn parse(name: &str) -> Option<Self> {
        ProtocolVariant::ALL.into_iter().find_map(|variant| {
            name.strip_suffix(variant.suffix())
                .filter(|base| !base.is_empty())
                .map(|base| HighLevelProtocol {
                    base: base.to_string(),
                    variant,
                })
        })
    }
}

impl fmt::Display for HighLevelProtocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.base, self.variant.suffix())
    }
}

/// High-level sample purpose.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Purpose {
    Enroll,
    Probe,
}

impl Purpose {
    pub const ALL: [Purpose; 2] = [Purpose::Enroll, Purpose::Probe];

    pub fn as_str(self) -> &'static str {
        match self {
            Purpose::Enroll => "enroll",
            Purpose::Probe => "probe",
        }
    }

    fn from_name(name: &str) -> Option<Self> {
        Purpose::ALL.into_iter().find(|p| p.as_str() == name)
    }
}

/// Expands every low-level protocol into its licit and spoof variants.
///
/// All `-licit` names come first, then all `-spoof` names, each in catalogue order.
pub fn protocol_names(protocols: &[LowLevelProtocol]) -> Vec<String> {
    ProtocolVariant::ALL
        .into_iter()
        .flat_map(|variant| {
            protocols
                .iter()
                .map(move |p| format!("{}{}", p.name, variant.suffix()))
        })
        .collect()
}

/// Positional correspondence between high-level and low-level group names.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GroupMap {
    high_level: [String; 3],
    low_level: [String; 3],
}

impl GroupMap {
    pub fn new(high_level: [String; 3], low_level: [String; 3]) -> Result<Self> {
        for names in [&high_level, &low_level] {
            if names.iter().any(|n| n.trim().is_empty()) {
                return Err(anyhow!("group names must not be empty"));
            }
            if names[0] == names[1] || names[0] == names[2] || names[1] == names[2] {
                return Err(anyhow!("group names must be distinct: {:?}", names));
            }
        }
        Ok(Self {
            high_level,
            low_level,
        })
    }

    pub fn high_level(&self) -> &[String; 3] {
        &self.high_level
    }

    pub fn low_level(&self) -> &[String; 3] {
        &self.low_level
    }

    pub fn to_low_level(&self, high: &str) -> Option<&str> {
        self.high_level
            .iter()
            .position(|name| name == high)
            .map(|i| self.low_level[i].as_str())
    }

    pub fn to_high_level(&self, low: &str) -> Option<&str> {
        self.low_level
            .iter()
            .position(|name| name == low)
            .map(|i| self.high_level[i].as_str())
    }
}

impl Default for GroupMap {
    fn default() -> Self {
        Self {
            high_level: ["world".into(), "dev".into(), "eval".into()],
            low_level: ["train".into(), "devel".into(), "test".into()],
        }
    }
}

/// Validates a single value against its allowed set, falling back to `default`.
pub fn check_parameter(
    parameter: &'static str,
    value: Option<&str>,
    allowed: &[String],
    default: &str,
) -> Result<String, QueryError> {
    let value = value.unwrap_or(default);
    if allowed.iter().any(|a| a == value) {
        Ok(value.to_string())
    } else {
        Err(invalid(parameter, value, allowed))
    }
}

/// Validates every value against the allowed set; `None` or an empty list selects
/// all of them.
///
/// Duplicates are dropped, first occurrence wins.
pub fn check_parameters(
    parameter: &'static str,
    values: Option<&[String]>,
    allowed: &[String],
) -> Result<Vec<String>, QueryError> {
    let values = match values {
        Some(values) if !values.is_empty() => values,
        _ => return Ok(allowed.to_vec()),
    };
    let mut out: Vec<String> = Vec::with_capacity(values.len());
    for value in values {
        if !allowed.contains(value) {
            return Err(invalid(parameter, value, allowed));
        }
        if !out.contains(value) {
            out.push(value.clone());
        }
    }
    Ok(out)
}

/// Parses purpose names, defaulting to both purposes.
pub fn parse_purposes(values: Option<&[String]>) -> Result<Vec<Purpose>, QueryError> {
    let allowed: Vec<String> = Purpose::ALL.iter().map(|p| p.as_str().to_string()).collect();
    let names = check_parameters("purpose", values, &allowed)?;
    Ok(names
        .iter()
        .filter_map(|name| Purpose::from_name(name))
        .collect())
}

fn invalid(parameter: &'static str, value: &str, allowed: &[String]) -> QueryError {
    QueryError::InvalidParameter {
        parameter,
        value: value.to_string(),
        allowed: allowed.to_vec(),
    }
}

/// Rewrites purposes into low-level classes and settles the client filter.
///
/// `enroll` is kept as is; `probe` is replaced by the variant's probe class,
/// appended after the remaining purposes. A licit probe-only request drops the
/// client filter so impostor attempts from every client are returned. A licit
/// request for enrolment and probes of specific clients is rejected.
pub fn rewrite_purposes(
    variant: ProtocolVariant,
    purposes: &[Purpose],
    model_ids: Option<Vec<String>>,
) -> Result<(Vec<Class>, Option<Vec<String>>), QueryError> {
    let mut model_ids = model_ids.filter(|ids| !ids.is_empty());
    let mut classes: Vec<Class> = purposes
        .iter()
        .filter(|p| **p == Purpose::Enroll)
        .map(|_| Class::Enroll)
        .collect();

    if purposes.contains(&Purpose::Probe) {
        classes.push(variant.probe_class());
        if variant == ProtocolVariant::Licit {
            if classes == [Class::Real] {
                model_ids = None;
            } else if model_ids.is_some() {
                return Err(QueryError::UnsupportedConfiguration(
                    "returning both enroll and probe samples for specific clients \
                     in a licit protocol; request one purpose at a time",
                ));
            }
        }
    }

    Ok((classes, model_ids))
}

/// Builds the low-level query for an already validated high-level request.
pub fn translate(
    protocol: &HighLevelProtocol,
    low_level_groups: Vec<String>,
    purposes: &[Purpose],
    model_ids: Option<Vec<String>>,
    filters: Filters,
) -> Result<LowLevelQuery, QueryError> {
    let (classes, clients) = rewrite_purposes(protocol.variant, purposes, model_ids)?;
    log::debug!(
        "protocol {} -> {} with classes {:?}, clients {:?}",
        protocol,
        protocol.base,
        classes,
        clients
    );
    Ok(LowLevelQuery {
        groups: low_level_groups,
        protocol: protocol.base.clone(),
        classes,
        clients,
        filters,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn catalogue(names: &[&str]) -> Vec<LowLevelProtocol> {
        names
            .iter()
            .map(|n| LowLevelProtocol {
                name: n.to_string(),
            })
            .collect()
    }

    #[test]
    fn doubles_protocols_licit_first() {
        let names = protocol_names(&catalogue(&["grandtest", "print", "mattescreen"]));
        assert_eq!(
            names,
            vec![
                "grandtest-licit",
                "print-licit",
                "mattescreen-licit",
                "grandtest-spoof",
                "print-spoof",
                "mattescreen-spoof",
            ]
        );
    }

    #[test]
    fn parses_only_suffixed_names() {
        let licit = HighLevelProtocol::parse("grandtest-licit").unwrap();
        assert_eq!(licit.base, "grandtest");
        assert_eq!(licit.variant, ProtocolVariant::Licit);
        assert_eq!(licit.to_string(), "grandtest-licit");

        let spoof = HighLevelProtocol::parse("print-spoof").unwrap();
        assert_eq!(spoof.variant, ProtocolVariant::Spoof);

        assert!(HighLevelProtocol::parse("grandtest").is_none());
        assert!(HighLevelProtocol::parse("-licit").is_none());
    }

    #[test]
    fn group_map_is_positional() {
        let groups = GroupMap::default();
        assert_eq!(groups.to_low_level("world"), Some("train"));
        assert_eq!(groups.to_low_level("dev"), Some("devel"));
        assert_eq!(groups.to_low_level("eval"), Some("test"));
        assert_eq!(groups.to_high_level("devel"), Some("dev"));
        assert_eq!(groups.to_low_level("train"), None);
    }

    #[test]
    fn group_map_rejects_duplicates() {
        let err = GroupMap::new(
            ["a".into(), "a".into(), "b".into()],
            ["x".into(), "y".into(), "z".into()],
        );
        assert!(err.is_err());
    }

    #[test]
    fn licit_probe_only_drops_client_filter() {
        let (classes, clients) = rewrite_purposes(
            ProtocolVariant::Licit,
            &[Purpose::Probe],
            Some(vec!["A".to_string()]),
        )
        .unwrap();
        assert_eq!(classes, vec![Class::Real]);
        assert_eq!(clients, None);
    }

    #[test]
    fn licit_enroll_and_probe_for_clients_is_unsupported() {
        let err = rewrite_purposes(
            ProtocolVariant::Licit,
            &[Purpose::Enroll, Purpose::Probe],
            Some(vec!["A".to_string()]),
        )
        .unwrap_err();
        assert!(matches!(err, QueryError::UnsupportedConfiguration(_)));
    }

    #[test]
    fn licit_enroll_and_probe_without_clients_is_fine() {
        let (classes, clients) = rewrite_purposes(
            ProtocolVariant::Licit,
            &[Purpose::Enroll, Purpose::Probe],
            Some(vec![]),
        )
        .unwrap();
        assert_eq!(classes, vec![Class::Enroll, Class::Real]);
        assert_eq!(clients, None);
    }

    #[test]
    fn probe_class_is_appended_after_enroll() {
        let (classes, _) =
            rewrite_purposes(ProtocolVariant::Spoof, &[Purpose::Probe, Purpose::Enroll], None)
                .unwrap();
        assert_eq!(classes, vec![Class::Enroll, Class::Attack]);
    }

    #[test]
    fn spoof_keeps_client_filter() {
        let ids = Some(vec!["A".to_string()]);
        let (classes, clients) = rewrite_purposes(
            ProtocolVariant::Spoof,
            &[Purpose::Enroll, Purpose::Probe],
            ids.clone(),
        )
        .unwrap();
        assert_eq!(classes, vec![Class::Enroll, Class::Attack]);
        assert_eq!(clients, ids);
    }

    #[test]
    fn enroll_only_keeps_client_filter() {
        let ids = Some(vec!["B".to_string()]);
        let (classes, clients) =
            rewrite_purposes(ProtocolVariant::Licit, &[Purpose::Enroll], ids.clone()).unwrap();
        assert_eq!(classes, vec![Class::Enroll]);
        assert_eq!(clients, ids);
    }

    #[test]
    fn invalid_purpose_reports_allowed_set() {
        let err = parse_purposes(Some(&["attack".to_string()])).unwrap_err();
        match err {
            QueryError::InvalidParameter {
                parameter,
                value,
                allowed,
            } => {
                assert_eq!(parameter, "purpose");
                assert_eq!(value, "attack");
                assert_eq!(allowed, vec!["enroll", "probe"]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn empty_list_selects_everything() {
        let allowed = vec!["world".to_string(), "dev".to_string(), "eval".to_string()];
        assert_eq!(check_parameters("group", Some(&[]), &allowed).unwrap(), allowed);
        assert_eq!(
            parse_purposes(Some(&[])).unwrap(),
            vec![Purpose::Enroll, Purpose::Probe]
        );
    }

    #[test]
    fn check_parameter_uses_default() {
        let allowed = vec!["grandtest-licit".to_string()];
        assert_eq!(
            check_parameter("protocol", None, &allowed, DEFAULT_PROTOCOL).unwrap(),
            "grandtest-licit"
        );
        assert!(check_parameter("protocol", Some("grandtest"), &allowed, DEFAULT_PROTOCOL).is_err());
    }
}
