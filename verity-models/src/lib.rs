//! Shared vocabulary for the Verity bulk-operation engine: resource kinds,
//! verbs, operation status, diagnostics, and the apply-plan file format.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// HTTP verb of a buffered intent.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "UPPERCASE")]
pub enum Verb {
    Put,
    Patch,
    Delete,
}

impl Verb {
    pub fn as_str(&self) -> &'static str {
        match self {
            Verb::Put => "PUT",
            Verb::Patch => "PATCH",
            Verb::Delete => "DELETE",
        }
    }
}

impl fmt::Display for Verb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Terminal state of a single intent. `Pending` until its batch completes;
/// terminal states are absorbing.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum OperationStatus {
    Pending,
    Succeeded,
    Failed,
}

impl OperationStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, OperationStatus::Pending)
    }
}

/// Every resource kind the controller exposes for bulk configuration.
///
/// The wire name (`as_str`) doubles as the serde representation and the
/// kind tag used in apply plans and log lines.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    Tenant,
    Gateway,
    GatewayProfile,
    Service,
    EthPortProfile,
    EthPortSettings,
    Lag,
    Bundle,
    Acl,
    PacketBroker,
    PacketQueue,
    Badge,
    Switchpoint,
    DeviceController,
    AuthenticatedEthPort,
    DeviceVoiceSettings,
    VoicePortProfile,
    ServicePortProfile,
    AsPathAccessList,
    CommunityList,
    DeviceSettings,
    ExtendedCommunityList,
    Ipv4List,
    Ipv4PrefixList,
    Ipv6List,
    Ipv6PrefixList,
    RouteMapClause,
    RouteMap,
    SfpBreakout,
    Site,
    Pod,
    PortAcl,
    SflowCollector,
    DiagnosticsProfile,
    DiagnosticsPortProfile,
    PbRouting,
    PbRoutingAcl,
    SpinePlane,
    GroupingRule,
    Threshold,
    ThresholdGroup,
}

impl ResourceKind {
    /// All kinds, in registry declaration order.
    pub const ALL: &'static [ResourceKind] = &[
        ResourceKind::Tenant,
        ResourceKind::Gateway,
        ResourceKind::GatewayProfile,
        ResourceKind::Service,
        ResourceKind::EthPortProfile,
        ResourceKind::EthPortSettings,
        ResourceKind::Lag,
        ResourceKind::Bundle,
        ResourceKind::Acl,
        ResourceKind::PacketBroker,
        ResourceKind::PacketQueue,
        ResourceKind::Badge,
        ResourceKind::Switchpoint,
        ResourceKind::DeviceController,
        ResourceKind::AuthenticatedEthPort,
        ResourceKind::DeviceVoiceSettings,
        ResourceKind::VoicePortProfile,
        ResourceKind::ServicePortProfile,
        ResourceKind::AsPathAccessList,
        ResourceKind::CommunityList,
        ResourceKind::DeviceSettings,
        ResourceKind::ExtendedCommunityList,
        ResourceKind::Ipv4List,
        ResourceKind::Ipv4PrefixList,
        ResourceKind::Ipv6List,
        ResourceKind::Ipv6PrefixList,
        ResourceKind::RouteMapClause,
        ResourceKind::RouteMap,
        ResourceKind::SfpBreakout,
        ResourceKind::Site,
        ResourceKind::Pod,
        ResourceKind::PortAcl,
        ResourceKind::SflowCollector,
        ResourceKind::DiagnosticsProfile,
        ResourceKind::DiagnosticsPortProfile,
        ResourceKind::PbRouting,
        ResourceKind::PbRoutingAcl,
        ResourceKind::SpinePlane,
        ResourceKind::GroupingRule,
        ResourceKind::Threshold,
        ResourceKind::ThresholdGroup,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Tenant => "tenant",
            ResourceKind::Gateway => "gateway",
            ResourceKind::GatewayProfile => "gateway_profile",
            ResourceKind::Service => "service",
            ResourceKind::EthPortProfile => "eth_port_profile",
            ResourceKind::EthPortSettings => "eth_port_settings",
            ResourceKind::Lag => "lag",
            ResourceKind::Bundle => "bundle",
            ResourceKind::Acl => "acl",
            ResourceKind::PacketBroker => "packet_broker",
            ResourceKind::PacketQueue => "packet_queue",
            ResourceKind::Badge => "badge",
            ResourceKind::Switchpoint => "switchpoint",
            ResourceKind::DeviceController => "device_controller",
            ResourceKind::AuthenticatedEthPort => "authenticated_eth_port",
            ResourceKind::DeviceVoiceSettings => "device_voice_settings",
            ResourceKind::VoicePortProfile => "voice_port_profile",
            ResourceKind::ServicePortProfile => "service_port_profile",
            ResourceKind::AsPathAccessList => "as_path_access_list",
            ResourceKind::CommunityList => "community_list",
            ResourceKind::DeviceSettings => "device_settings",
            ResourceKind::ExtendedCommunityList => "extended_community_list",
            ResourceKind::Ipv4List => "ipv4_list",
            ResourceKind::Ipv4PrefixList => "ipv4_prefix_list",
            ResourceKind::Ipv6List => "ipv6_list",
            ResourceKind::Ipv6PrefixList => "ipv6_prefix_list",
            ResourceKind::RouteMapClause => "route_map_clause",
            ResourceKind::RouteMap => "route_map",
            ResourceKind::SfpBreakout => "sfp_breakout",
            ResourceKind::Site => "site",
            ResourceKind::Pod => "pod",
            ResourceKind::PortAcl => "port_acl",
            ResourceKind::SflowCollector => "sflow_collector",
            ResourceKind::DiagnosticsProfile => "diagnostics_profile",
            ResourceKind::DiagnosticsPortProfile => "diagnostics_port_profile",
            ResourceKind::PbRouting => "pb_routing",
            ResourceKind::PbRoutingAcl => "pb_routing_acl",
            ResourceKind::SpinePlane => "spine_plane",
            ResourceKind::GroupingRule => "grouping_rule",
            ResourceKind::Threshold => "threshold",
            ResourceKind::ThresholdGroup => "threshold_group",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, thiserror::Error)]
#[error("unknown resource kind: {0}")]
pub struct UnknownKind(pub String);

impl FromStr for ResourceKind {
    type Err = UnknownKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ResourceKind::ALL
            .iter()
            .copied()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| UnknownKind(s.to_string()))
    }
}

/// Severity of a single diagnostic entry.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
}

/// One human-readable problem report attached to a flush.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Diagnostic {
    pub severity: Severity,
    pub summary: String,
    pub detail: String,
}

/// Aggregate result of a flush: ordered diagnostics, errors first-class.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Diagnostics(Vec<Diagnostic>);

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_error(&mut self, summary: impl Into<String>, detail: impl Into<String>) {
        self.0.push(Diagnostic {
            severity: Severity::Error,
            summary: summary.into(),
            detail: detail.into(),
        });
    }

    pub fn add_warning(&mut self, summary: impl Into<String>, detail: impl Into<String>) {
        self.0.push(Diagnostic {
            severity: Severity::Warning,
            summary: summary.into(),
            detail: detail.into(),
        });
    }

    pub fn extend(&mut self, other: Diagnostics) {
        self.0.extend(other.0);
    }

    pub fn has_errors(&self) -> bool {
        self.0.iter().any(|d| d.severity == Severity::Error)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> {
        self.0.iter()
    }
}

/// One intent in an apply plan: create/update/delete a named resource.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanEntry {
    pub kind: ResourceKind,
    pub name: String,
    pub verb: Verb,
    /// Resource properties; absent for DELETE.
    #[serde(default)]
    pub payload: Option<Value>,
    /// Header parameters for kinds that split batches (e.g. ACL `ip_version`).
    #[serde(default)]
    pub header_params: Option<HashMap<String, String>>,
}

/// A batch of intents submitted together, typically loaded from a JSON file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplyPlan {
    pub entries: Vec<PlanEntry>,
}
