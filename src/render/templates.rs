use crate::models::DeviceRole;

/// BuiltinTemplate is a vendor template shipped with the renderer
pub struct BuiltinTemplate {
    pub role: DeviceRole,
    pub platform: &'static str,
    pub name: &'static str,
    pub content: &'static str,
}

/// Name the containerlab topology template is registered under
pub const LAB_TOPOLOGY: &str = "lab/containerlab.yml";

pub const LAB_TOPOLOGY_TEMPLATE: &str = r#"name: {{ name }}
topology:
  nodes:
{% for node in nodes %}    {{ node.name }}:
      kind: {{ node.kind }}
      image: {{ node.image }}
      startup-config: configs/{{ node.name }}.cfg
{% endfor %}  links:
{% for link in links %}{% set a = link.a_device ~ ":" ~ link.a_interface %}
{%- set b = link.b_device ~ ":" ~ link.b_interface %}    - endpoints: ["{{ a }}", "{{ b }}"]
{% endfor %}"#;

const ARISTA_EOS_LEAF: &str = r#"! {{ hostname }}{% if description %} - {{ description }}{% endif %}
hostname {{ hostname }}
!
service routing protocols model multi-agent
!
{% for vlan in vlans %}vlan {{ vlan.vlan_id }}
   name {{ vlan.name }}
!
{% endfor %}{% for iface in interface_roles.loopback %}interface {{ iface.name }}
{% if iface.description %}   description {{ iface.description }}
{% endif %}{% if iface.ip_address %}   ip address {{ iface.ip_address }}
{% endif %}!
{% endfor %}{% for iface in interface_roles.uplink %}interface {{ iface.name }}
{% if iface.description %}   description {{ iface.description }}
{% endif %}   no switchport
{% if iface.mtu %}   mtu {{ iface.mtu }}
{% endif %}{% if iface.ip_address %}   ip address {{ iface.ip_address }}
{% endif %}{% if iface.ospf_area %}   ip ospf network point-to-point
   ip ospf area {{ iface.ospf_area }}
{% endif %}   no shutdown
!
{% endfor %}{% for iface in interface_roles.peering %}interface {{ iface.name }}
{% if iface.description %}   description {{ iface.description }}
{% endif %}   no switchport
{% if iface.mtu %}   mtu {{ iface.mtu }}
{% endif %}{% if iface.ip_address %}   ip address {{ iface.ip_address }}
{% endif %}   no shutdown
!
{% endfor %}{% for iface in interface_roles.all_downlink %}interface {{ iface.name }}
{% if iface.description %}   description {{ iface.description }}
{% endif %}   switchport mode access
{% for vlan in iface.vlans %}   switchport access vlan {{ vlan }}
{% endfor %}   no shutdown
!
{% endfor %}{% for iface in interface_roles.other %}interface {{ iface.name }}
{% if iface.description %}   description {{ iface.description }}
{% endif %}{% if iface.ip_address %}   ip address {{ iface.ip_address }}
{% endif %}!
{% endfor %}ip routing
!
{% if ospf %}router ospf {{ ospf.process_id }}
{% if ospf.router_id %}   router-id {{ ospf.router_id }}
{% endif %}   auto-cost reference-bandwidth {{ ospf.reference_bandwidth }}
   passive-interface default
{% for name in ospf.interfaces %}   no passive-interface {{ name }}
{% endfor %}!
{% endif %}{% if bgp %}router bgp {{ bgp.local_as }}
{% if bgp.router_id %}   router-id {{ bgp.router_id }}
{% endif %}   maximum-paths 4 ecmp 4
{% for profile in bgp_profiles %}{% set p = profile.profile %}   neighbor {{ p }} peer group
{% if profile.local_as %}{% if profile.local_as.asn != bgp.local_as %}
{%- set asn = profile.local_as.asn %}   neighbor {{ p }} local-as {{ asn }} no-prepend replace-as
{% endif %}{% endif %}
{%- if profile.update_source %}   neighbor {{ p }} update-source {{ profile.update_source }}
{% endif %}
{%- if profile.ebgp_multihop %}   neighbor {{ p }} ebgp-multihop {{ profile.ebgp_multihop }}
{% endif %}{% if profile.bfd %}   neighbor {{ p }} bfd
{% endif %}{% if profile.send_community_extended %}   neighbor {{ p }} send-community extended
{% endif %}{% if profile.route_reflector_client %}   neighbor {{ p }} route-reflector-client
{% endif %}{% for s in profile.sessions %}
{%- if s.remote_ip %}   neighbor {{ s.remote_ip }} peer group {{ p }}
   neighbor {{ s.remote_ip }} remote-as {{ s.remote_as }}
{% elif s.interface %}{% set i = s.interface %}
{%- set ras = s.remote_as %}   neighbor interface {{ i }} peer-group {{ p }} remote-as {{ ras }}
{% endif %}{% endfor %}{% endfor %}{% for vlan in vlans %}   vlan {{ vlan.vlan_id }}
      rd {{ bgp.router_id }}:{{ vlan.rd }}
      route-target both {{ vlan.vni }}:{{ vlan.vni }}
      redistribute learned
{% endfor %}{% for profile in bgp_profiles %}{% if profile.address_family %}
{%- if profile.address_family == "evpn" %}   address-family evpn
      neighbor {{ profile.profile }} activate
{% endif %}{% endif %}{% endfor %}!
{% endif %}end
"#;

const ARISTA_EOS_SPINE: &str =
    r#"! {{ hostname }}{% if description %} - {{ description }}{% endif %}
hostname {{ hostname }}
!
service routing protocols model multi-agent
spanning-tree mode none
!
{% for iface in interface_roles.loopback %}interface {{ iface.name }}
{% if iface.description %}   description {{ iface.description }}
{% endif %}   ip address {{ iface.ip_address }}
!
{% endfor %}{% for iface in interface_roles.all_physical %}interface {{ iface.name }}
{% if iface.description %}   description {{ iface.description }}
{% endif %}   no switchport
{% if iface.mtu %}   mtu {{ iface.mtu }}
{% endif %}{% if iface.ip_address %}   ip address {{ iface.ip_address }}
{% else %}   ip address unnumbered {{ interface_roles.loopback.0.name }}
{% endif %}{% if iface.ospf_area %}   ip ospf network point-to-point
   ip ospf area {{ iface.ospf_area }}
{% endif %}   no shutdown
!
{% endfor %}ip routing
!
{% if ospf %}router ospf {{ ospf.process_id }}
{% if ospf.router_id %}   router-id {{ ospf.router_id }}
{% endif %}   auto-cost reference-bandwidth {{ ospf.reference_bandwidth }}
   passive-interface default
{% for name in ospf.interfaces %}   no passive-interface {{ name }}
{% endfor %}!
{% endif %}{% if bgp %}router bgp {{ bgp.local_as }}
{% if bgp.router_id %}   router-id {{ bgp.router_id }}
{% endif %}   maximum-paths 4 ecmp 4
{% for profile in bgp_profiles %}{% set p = profile.profile %}   neighbor {{ p }} peer group
{% if profile.local_as %}{% if profile.local_as.asn != bgp.local_as %}
{%- set asn = profile.local_as.asn %}   neighbor {{ p }} local-as {{ asn }} no-prepend replace-as
{% endif %}{% endif %}
{%- if profile.update_source %}   neighbor {{ p }} update-source {{ profile.update_source }}
{% endif %}
{%- if profile.ebgp_multihop %}   neighbor {{ p }} ebgp-multihop {{ profile.ebgp_multihop }}
{% endif %}{% if profile.bfd %}   neighbor {{ p }} bfd
{% endif %}{% if profile.send_community_extended %}   neighbor {{ p }} send-community extended
{% endif %}{% if profile.route_reflector_client %}   neighbor {{ p }} route-reflector-client
{% endif %}{% for s in profile.sessions %}
{%- if s.remote_ip %}   neighbor {{ s.remote_ip }} peer group {{ p }}
   neighbor {{ s.remote_ip }} remote-as {{ s.remote_as }}
{% elif s.interface %}{% set i = s.interface %}
{%- set ras = s.remote_as %}   neighbor interface {{ i }} peer-group {{ p }} remote-as {{ ras }}
{% endif %}{% endfor %}{% endfor %}{% for profile in bgp_profiles %}{% if profile.address_family %}
{%- if profile.address_family == "evpn" %}   address-family evpn
      neighbor {{ profile.profile }} activate
{% endif %}{% endif %}{% endfor %}!
{% endif %}end
"#;

const ARISTA_EOS_EDGE: &str = r#"! {{ hostname }}{% if description %} - {{ description }}{% endif %}
hostname {{ hostname }}
!
{% for iface in interface_roles.loopback %}interface {{ iface.name }}
   ip address {{ iface.ip_address }}
!
{% endfor %}{% for iface in interface_roles.peering %}interface {{ iface.name }}
{% if iface.description %}   description {{ iface.description }}
{% endif %}   no switchport
{% if iface.ip_address %}   ip address {{ iface.ip_address }}
{% endif %}   no shutdown
!
{% endfor %}{% for iface in interface_roles.uplink %}interface {{ iface.name }}
{% if iface.description %}   description {{ iface.description }}
{% endif %}   no switchport
{% if iface.ip_address %}   ip address {{ iface.ip_address }}
{% endif %}   no shutdown
!
{% endfor %}ip routing
!
{% if bgp %}router bgp {{ bgp.local_as }}
{% if bgp.router_id %}   router-id {{ bgp.router_id }}
{% endif %}{% for profile in bgp_profiles %}   neighbor {{ profile.profile }} peer group
{% for session in profile.sessions %}{% if session.remote_ip %}
{%- set ip = session.remote_ip %}   neighbor {{ ip }} peer group {{ profile.profile }}
   neighbor {{ ip }} remote-as {{ session.remote_as }}
{% endif %}{% endfor %}{% endfor %}!
{% endif %}end
"#;

const CISCO_NXOS_FABRIC: &str = r#"!Command: show running-config
!{{ hostname }}{% if description %} - {{ description }}{% endif %}
hostname {{ hostname }}
{% if ospf %}feature ospf
{% endif %}{% if bgp %}feature bgp
{% endif %}{% if vlans %}feature interface-vlan
{% endif %}
{% for vlan in vlans %}vlan {{ vlan.vlan_id }}
  name {{ vlan.name }}
{% endfor %}
{% for iface in interface_roles.loopback %}interface {{ iface.name | lower }}
{% if iface.description %}  description {{ iface.description }}
{% endif %}  ip address {{ iface.ip_address }}
{% if ospf %}  ip router ospf {{ ospf.process_id }} area {{ ospf.area }}
{% endif %}
{% endfor %}{% for iface in interface_roles.uplink %}interface {{ iface.name }}
{% if iface.description %}  description {{ iface.description }}
{% endif %}  no switchport
{% if iface.mtu %}  mtu {{ iface.mtu }}
{% endif %}{% if iface.ip_address %}  ip address {{ iface.ip_address }}
{% endif %}{% if iface.ospf_area %}  ip ospf network point-to-point
  ip router ospf {{ ospf.process_id }} area {{ iface.ospf_area }}
{% endif %}  no shutdown
{% endfor %}{% for iface in interface_roles.peering %}interface {{ iface.name }}
{% if iface.description %}  description {{ iface.description }}
{% endif %}  no switchport
{% if iface.ip_address %}  ip address {{ iface.ip_address }}
{% endif %}  no shutdown
{% endfor %}{% for iface in interface_roles.all_downlink %}interface {{ iface.name }}
{% if iface.description %}  description {{ iface.description }}
{% endif %}{% if iface.role == "downlink" %}  no switchport
{% if iface.ip_address %}  ip address {{ iface.ip_address }}
{% endif %}{% if iface.ospf_area %}  ip ospf network point-to-point
  ip router ospf {{ ospf.process_id }} area {{ iface.ospf_area }}
{% endif %}{% else %}  switchport
  switchport mode access
{% for vlan in iface.vlans %}  switchport access vlan {{ vlan }}
{% endfor %}{% endif %}  no shutdown
{% endfor %}
{% if ospf %}router ospf {{ ospf.process_id }}
{% if ospf.router_id %}  router-id {{ ospf.router_id }}
{% endif %}  auto-cost reference-bandwidth {{ ospf.reference_bandwidth }} Mbps
{% endif %}{% if bgp %}router bgp {{ bgp.local_as }}
{% if bgp.router_id %}  router-id {{ bgp.router_id }}
{% endif %}{% for profile in bgp_profiles %}  template peer {{ profile.profile }}
{% if profile.update_source %}    update-source {{ profile.update_source | lower }}
{% endif %}{% if profile.ebgp_multihop %}    ebgp-multihop {{ profile.ebgp_multihop }}
{% endif %}{% if profile.bfd %}    bfd
{% endif %}{% if profile.address_family %}    address-family l2vpn evpn
      send-community extended
{% if profile.route_reflector_client %}      route-reflector-client
{% endif %}{% else %}    address-family ipv4 unicast
{% endif %}{% for session in profile.sessions %}
{%- if session.remote_ip %}  neighbor {{ session.remote_ip }}
    inherit peer {{ profile.profile }}
    remote-as {{ session.remote_as }}
{% endif %}{% endfor %}{% endfor %}{% endif %}"#;

const JUNIPER_JUNOS_FABRIC: &str =
    r#"/* {{ hostname }}{% if description %} - {{ description }}{% endif %} */
system {
    host-name {{ hostname }};
}
interfaces {
{% for iface in interface_roles.all_physical %}    {{ iface.name }} {
{% if iface.description %}        description "{{ iface.description }}";
{% endif %}{% if iface.mtu %}        mtu {{ iface.mtu }};
{% endif %}        unit 0 {
{% if iface.vlans %}            family ethernet-switching {
                interface-mode access;
                vlan {
                    members [ {% for vlan in iface.vlans %}{{ vlan }} {% endfor %}];
                }
            }
{% else %}            family inet {
{% if iface.ip_address %}                address {{ iface.ip_address }};
{% endif %}            }
{% endif %}        }
    }
{% endfor %}{% if interface_roles.loopback %}    lo0 {
{% for iface in interface_roles.loopback %}        unit {{ loop.index0 }} {
            family inet {
                address {{ iface.ip_address }};
            }
        }
{% endfor %}    }
{% endif %}}
{% if vlans %}vlans {
{% for vlan in vlans %}    {{ vlan.name }} {
        vlan-id {{ vlan.vlan_id }};
        vxlan {
            vni {{ vlan.vni }};
        }
    }
{% endfor %}}
{% endif %}routing-options {
{% if bgp %}    autonomous-system {{ bgp.local_as }};
{% endif %}{% if bgp and bgp.router_id %}    router-id {{ bgp.router_id }};
{% elif ospf and ospf.router_id %}    router-id {{ ospf.router_id }};
{% endif %}}
protocols {
{% if ospf %}    ospf {
        reference-bandwidth {{ ospf.reference_bandwidth }}m;
{% for area, names in ospf_areas %}        area {{ area }} {
{% for name in names %}            interface {{ name }};
{% endfor %}        }
{% endfor %}    }
{% endif %}{% if bgp %}    bgp {
{% for profile in bgp_profiles %}        group {{ profile.profile }} {
{% if profile.address_family %}            type internal;
{% if profile.route_reflector_client %}            cluster {{ bgp.router_id }};
{% endif %}            family evpn {
                signaling;
            }
{% else %}            type external;
{% endif %}{% for session in profile.sessions %}
{%- if session.remote_ip %}            neighbor {{ session.remote_ip }} {
                peer-as {{ session.remote_as }};
            }
{% endif %}{% endfor %}        }
{% endfor %}    }
{% endif %}}
"#;

const JUNIPER_JUNOS_FIREWALL: &str =
    r#"/* {{ hostname }}{% if description %} - {{ description }}{% endif %} */
system {
    host-name {{ hostname }};
}
interfaces {
{% for iface in interfaces %}    {{ iface.name }} {
{% if iface.description %}        description "{{ iface.description }}";
{% endif %}        unit 0 {
            family inet {
{% for address in iface.ip_addresses %}                address {{ address }};
{% endfor %}            }
        }
    }
{% endfor %}}
security {
    zones {
{% for iface in interfaces %}
{%- set z = iface.role | default(value="untrust") %}        security-zone {{ z }}-{{ loop.index }} {
            interfaces {
                {{ iface.name }}.0;
            }
        }
{% endfor %}    }
}
"#;

const LINUX_HAPROXY: &str =
    r#"# haproxy.cfg for {{ hostname }}{% if description %} - {{ description }}{% endif %}
global
    log /dev/log local0
    maxconn 4096

defaults
    mode tcp
    timeout connect 5s
    timeout client 30s
    timeout server 30s
{% for iface in interfaces %}{% if iface.ip_address %}
# {{ iface.name }}{% if iface.description %}: {{ iface.description }}{% endif %}
frontend fe_{{ iface.name | lower | replace(from="/", to="_") }}
    bind {{ iface.ip_address | split(pat="/") | first }}:443
    default_backend be_{{ hostname }}
{% endif %}{% endfor %}
backend be_{{ hostname }}
    balance roundrobin
{% for service in services %}    # {{ service.typename }} {{ service.name }}
{% endfor %}"#;

/// All vendor templates the renderer registers at construction
pub fn builtin_templates() -> Vec<BuiltinTemplate> {
    let mut templates = Vec::new();

    for role in [DeviceRole::Leaf, DeviceRole::BorderLeaf] {
        templates.push(BuiltinTemplate {
            role,
            platform: "arista_eos",
            name: "arista_eos/leaf",
            content: ARISTA_EOS_LEAF,
        });
    }
    templates.push(BuiltinTemplate {
        role: DeviceRole::Spine,
        platform: "arista_eos",
        name: "arista_eos/spine",
        content: ARISTA_EOS_SPINE,
    });
    templates.push(BuiltinTemplate {
        role: DeviceRole::Edge,
        platform: "arista_eos",
        name: "arista_eos/edge",
        content: ARISTA_EOS_EDGE,
    });

    for role in [DeviceRole::Leaf, DeviceRole::BorderLeaf, DeviceRole::Spine] {
        templates.push(BuiltinTemplate {
            role,
            platform: "cisco_nxos",
            name: "cisco_nxos/fabric",
            content: CISCO_NXOS_FABRIC,
        });
    }

    for role in [DeviceRole::Leaf, DeviceRole::BorderLeaf, DeviceRole::Spine, DeviceRole::Edge] {
        templates.push(BuiltinTemplate {
            role,
            platform: "juniper_junos",
            name: "juniper_junos/fabric",
            content: JUNIPER_JUNOS_FABRIC,
        });
    }
    templates.push(BuiltinTemplate {
        role: DeviceRole::Firewall,
        platform: "juniper_junos",
        name: "juniper_junos/firewall",
        content: JUNIPER_JUNOS_FIREWALL,
    });

    templates.push(BuiltinTemplate {
        role: DeviceRole::Loadbalancer,
        platform: "linux_haproxy",
        name: "linux_haproxy/loadbalancer",
        content: LINUX_HAPROXY,
    });

    templates
}
