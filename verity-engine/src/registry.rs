//! Resource registry: one descriptor per controller resource kind, plus the
//! phase orderings the scheduler walks.
//!
//! A descriptor carries everything the generic pipeline needs to talk to a
//! kind's collection endpoint: the response key to unwrap, the endpoint path,
//! the DELETE query-parameter name, verb support, the auto-generated-fields
//! flag, and the optional header-split axis.

use std::collections::HashMap;

use once_cell::sync::Lazy;
use serde_json::Value;
use verity_models::{ResourceKind, Verb};

use verity_models::ResourceKind::*;

/// Extracts the name→props map from a raw GET body when the response key
/// depends on header values (the ACL case).
pub type ResponseExtractor = fn(&Value, &HashMap<String, String>) -> Value;

/// Static description of one resource kind's bulk API surface.
pub struct ResourceDescriptor {
    pub kind: ResourceKind,
    /// Field wrapping the name→props map in collection bodies.
    pub json_key: &'static str,
    pub endpoint: &'static str,
    /// Query-parameter name carrying DELETE targets; `None` → no DELETE.
    pub delete_param: Option<&'static str>,
    pub supports_put: bool,
    /// Controller assigns fields on create; triggers the post-PUT fetch.
    pub has_autogen: bool,
    /// Header parameter whose distinct values must go in separate batches.
    pub header_split_key: Option<&'static str>,
    pub response_extractor: Option<ResponseExtractor>,
}

impl ResourceDescriptor {
    pub fn supports(&self, verb: Verb) -> bool {
        match verb {
            Verb::Put => self.supports_put,
            Verb::Patch => true,
            Verb::Delete => self.delete_param.is_some(),
        }
    }

    /// Pulls the name→props map out of a collection GET body.
    pub fn extract_collection(&self, raw: &Value, headers: &HashMap<String, String>) -> Value {
        if let Some(extractor) = self.response_extractor {
            return extractor(raw, headers);
        }
        raw.get(self.json_key)
            .cloned()
            .unwrap_or_else(|| Value::Object(Default::default()))
    }
}

fn full(
    kind: ResourceKind,
    json_key: &'static str,
    endpoint: &'static str,
    delete_param: &'static str,
) -> ResourceDescriptor {
    ResourceDescriptor {
        kind,
        json_key,
        endpoint,
        delete_param: Some(delete_param),
        supports_put: true,
        has_autogen: false,
        header_split_key: None,
        response_extractor: None,
    }
}

fn patch_only(
    kind: ResourceKind,
    json_key: &'static str,
    endpoint: &'static str,
) -> ResourceDescriptor {
    ResourceDescriptor {
        kind,
        json_key,
        endpoint,
        delete_param: None,
        supports_put: false,
        has_autogen: false,
        header_split_key: None,
        response_extractor: None,
    }
}

/// ACL collection bodies key the filter map by IP version.
fn acl_extractor(raw: &Value, headers: &HashMap<String, String>) -> Value {
    let key = match headers.get("ip_version").map(String::as_str) {
        Some("6") => "ipv6_filter",
        _ => "ipv4_filter",
    };
    raw.get(key)
        .cloned()
        .unwrap_or_else(|| Value::Object(Default::default()))
}

static REGISTRY: Lazy<HashMap<ResourceKind, ResourceDescriptor>> = Lazy::new(|| {
    let descriptors = vec![
        ResourceDescriptor {
            has_autogen: true,
            ..full(Tenant, "tenant", "/tenants", "tenant_name")
        },
        full(Gateway, "gateway", "/gateways", "gateway_name"),
        full(GatewayProfile, "gateway_profile", "/gatewayprofiles", "profile_name"),
        ResourceDescriptor {
            has_autogen: true,
            ..full(Service, "service", "/services", "service_name")
        },
        full(EthPortProfile, "eth_port_profile_", "/ethportprofiles", "profile_name"),
        full(EthPortSettings, "eth_port_settings", "/ethportsettings", "port_name"),
        full(Lag, "lag", "/lags", "lag_name"),
        // Bundles are controller-managed; only PATCH flows through the engine.
        patch_only(Bundle, "endpoint_bundle", "/bundles"),
        ResourceDescriptor {
            header_split_key: Some("ip_version"),
            response_extractor: Some(acl_extractor),
            ..full(Acl, "ip_filter", "/acls", "ip_filter_name")
        },
        full(PacketBroker, "pb_egress_profile", "/packetbroker", "pb_egress_profile_name"),
        full(PacketQueue, "packet_queue", "/packetqueues", "packet_queue_name"),
        full(Badge, "badge", "/badges", "badge_name"),
        ResourceDescriptor {
            has_autogen: true,
            ..full(Switchpoint, "switchpoint", "/switchpoints", "switchpoint_name")
        },
        full(DeviceController, "device_controller", "/devicecontrollers", "device_controller_name"),
        full(
            AuthenticatedEthPort,
            "authenticated_eth_port",
            "/authenticatedethports",
            "authenticated_eth_port_name",
        ),
        full(
            DeviceVoiceSettings,
            "device_voice_settings",
            "/devicevoicesettings",
            "device_voice_settings_name",
        ),
        full(
            VoicePortProfile,
            "voice_port_profiles",
            "/voiceportprofiles",
            "voice_port_profile_name",
        ),
        full(
            ServicePortProfile,
            "service_port_profile",
            "/serviceportprofiles",
            "service_port_profile_name",
        ),
        full(
            AsPathAccessList,
            "as_path_access_list",
            "/aspathaccesslists",
            "as_path_access_list_name",
        ),
        full(CommunityList, "community_list", "/communitylists", "community_list_name"),
        full(DeviceSettings, "eth_device_profiles", "/devicesettings", "eth_device_profiles_name"),
        full(
            ExtendedCommunityList,
            "extended_community_list",
            "/extendedcommunitylists",
            "extended_community_list_name",
        ),
        full(Ipv4List, "ipv4_list_filter", "/ipv4lists", "ipv4_list_filter_name"),
        full(Ipv4PrefixList, "ipv4_prefix_list", "/ipv4prefixlists", "ipv4_prefix_list_name"),
        full(Ipv6List, "ipv6_list_filter", "/ipv6lists", "ipv6_list_filter_name"),
        full(Ipv6PrefixList, "ipv6_prefix_list", "/ipv6prefixlists", "ipv6_prefix_list_name"),
        full(RouteMapClause, "route_map_clause", "/routemapclauses", "route_map_clause_name"),
        full(RouteMap, "route_map", "/routemaps", "route_map_name"),
        patch_only(SfpBreakout, "sfp_breakouts", "/sfpbreakouts"),
        patch_only(Site, "site", "/sites"),
        full(Pod, "pod", "/pods", "pod_name"),
        full(PortAcl, "port_acl", "/portacls", "port_acl_name"),
        full(SflowCollector, "sflow_collector", "/sflowcollectors", "sflow_collector_name"),
        full(
            DiagnosticsProfile,
            "diagnostics_profile",
            "/diagnosticsprofiles",
            "diagnostics_profile_name",
        ),
        full(
            DiagnosticsPortProfile,
            "diagnostics_port_profile",
            "/diagnosticsportprofiles",
            "diagnostics_port_profile_name",
        ),
        full(PbRouting, "pb_routing", "/policybasedrouting", "pb_routing_name"),
        full(PbRoutingAcl, "pb_routing_acl", "/policybasedroutingacl", "pb_routing_acl_name"),
        full(SpinePlane, "spine_plane", "/spineplanes", "spine_plane_name"),
        full(GroupingRule, "grouping_rules", "/groupingrules", "grouping_rules_name"),
        full(Threshold, "threshold", "/thresholds", "threshold_name"),
        full(ThresholdGroup, "threshold_group", "/thresholdgroups", "threshold_group_name"),
    ];

    descriptors.into_iter().map(|d| (d.kind, d)).collect()
});

/// Descriptor lookup. Every `ResourceKind` variant is registered.
pub fn descriptor(kind: ResourceKind) -> &'static ResourceDescriptor {
    &REGISTRY[&kind]
}

/// PUT dispatch order: containers before containees, profiles before
/// consumers. The first seven kinds are the controller's documented
/// dependency chain; the rest follow the same principle.
pub static PUT_ORDER: &[ResourceKind] = &[
    Tenant,
    Gateway,
    GatewayProfile,
    Service,
    EthPortProfile,
    EthPortSettings,
    Lag,
    // fabric topology
    Pod,
    SpinePlane,
    Switchpoint,
    DeviceController,
    DeviceSettings,
    // port-level profiles
    AuthenticatedEthPort,
    DeviceVoiceSettings,
    VoicePortProfile,
    ServicePortProfile,
    PacketQueue,
    PacketBroker,
    // filters and routing policy: members before the policies that reference them
    Acl,
    Ipv4List,
    Ipv4PrefixList,
    Ipv6List,
    Ipv6PrefixList,
    AsPathAccessList,
    CommunityList,
    ExtendedCommunityList,
    RouteMapClause,
    RouteMap,
    PbRoutingAcl,
    PbRouting,
    PortAcl,
    // monitoring and classification
    SflowCollector,
    DiagnosticsProfile,
    DiagnosticsPortProfile,
    Badge,
    GroupingRule,
    Threshold,
    ThresholdGroup,
];

/// PATCH dispatch order: PUT order, then the PATCH-only kinds, with Bundle
/// last.
pub static PATCH_ORDER: Lazy<Vec<ResourceKind>> = Lazy::new(|| {
    let mut order = PUT_ORDER.to_vec();
    order.push(SfpBreakout);
    order.push(Site);
    order.push(Bundle);
    order
});

/// DELETE dispatch order: containees before containers, the reverse of PUT.
pub static DELETE_ORDER: Lazy<Vec<ResourceKind>> = Lazy::new(|| {
    let mut order = PUT_ORDER.to_vec();
    order.reverse();
    order
});

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_kind_is_registered() {
        for kind in ResourceKind::ALL {
            let desc = descriptor(*kind);
            assert_eq!(desc.kind, *kind);
            assert!(!desc.json_key.is_empty());
            assert!(desc.endpoint.starts_with('/'));
        }
    }

    #[test]
    fn test_orders_cover_supported_verbs_exactly_once() {
        for kind in ResourceKind::ALL {
            let desc = descriptor(*kind);
            let puts = PUT_ORDER.iter().filter(|k| **k == *kind).count();
            assert_eq!(puts, usize::from(desc.supports(Verb::Put)), "{kind} in PUT_ORDER");

            let patches = PATCH_ORDER.iter().filter(|k| **k == *kind).count();
            assert_eq!(patches, 1, "{kind} in PATCH_ORDER");

            let deletes = DELETE_ORDER.iter().filter(|k| **k == *kind).count();
            assert_eq!(deletes, usize::from(desc.supports(Verb::Delete)), "{kind} in DELETE_ORDER");
        }
    }

    #[test]
    fn test_delete_order_is_reverse_of_put_order() {
        let mut reversed = DELETE_ORDER.clone();
        reversed.reverse();
        assert_eq!(reversed, PUT_ORDER.to_vec());
    }

    #[test]
    fn test_bundle_is_patch_only_and_last() {
        let desc = descriptor(Bundle);
        assert!(!desc.supports(Verb::Put));
        assert!(!desc.supports(Verb::Delete));
        assert!(desc.supports(Verb::Patch));
        assert_eq!(*PATCH_ORDER.last().unwrap(), Bundle);
    }

    #[test]
    fn test_autogen_kinds() {
        let autogen: Vec<_> = ResourceKind::ALL
            .iter()
            .copied()
            .filter(|k| descriptor(*k).has_autogen)
            .collect();
        assert_eq!(autogen, vec![Tenant, Service, Switchpoint]);
    }

    #[test]
    fn test_acl_extractor_selects_filter_by_ip_version() {
        let raw: Value = serde_json::json!({
            "ipv4_filter": {"a1": {"enable": true}},
            "ipv6_filter": {"b1": {"enable": false}},
        });

        let mut headers = HashMap::new();
        headers.insert("ip_version".to_string(), "4".to_string());
        let v4 = descriptor(Acl).extract_collection(&raw, &headers);
        assert!(v4.get("a1").is_some());
        assert!(v4.get("b1").is_none());

        headers.insert("ip_version".to_string(), "6".to_string());
        let v6 = descriptor(Acl).extract_collection(&raw, &headers);
        assert!(v6.get("b1").is_some());
    }

    #[test]
    fn test_plain_extraction_unwraps_json_key() {
        let raw: Value = serde_json::json!({"tenant": {"t1": {"vrf": "red"}}});
        let map = descriptor(Tenant).extract_collection(&raw, &HashMap::new());
        assert!(map.get("t1").is_some());
    }
}
