//! VPN adapter detection.
//!
//! An [`AdapterSource`] enumerates the host's adapters (on Windows by parsing
//! `ipconfig /all`, elsewhere through `sysinfo`), an [`AdapterClassifier`]
//! decides which of them are VPN/virtual, and [`VpnDetector`] collects the
//! IPv4 addresses of the flagged ones. Detection never fails: any error
//! degrades to an empty set.

use std::collections::BTreeSet;
use std::net::Ipv4Addr;

use regex::Regex;

use crate::config::{PHYSICAL_ADAPTER_MARKERS, VPN_ADAPTER_MARKERS};
use crate::error::EngineError;

/// One network adapter as reported by the OS.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Adapter {
    /// Display name, e.g. `Ethernet adapter Ethernet 2` or `utun3`.
    pub name: String,
    /// Driver description when the OS reports one.
    pub description: Option<String>,
    pub ipv4: Vec<Ipv4Addr>,
}

impl Adapter {
    pub fn new(name: impl Into<String>, ipv4: impl IntoIterator<Item = Ipv4Addr>) -> Self {
        Self {
            name: name.into(),
            description: None,
            ipv4: ipv4.into_iter().collect(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// The OS adapter-enumeration boundary.
pub trait AdapterSource: Send + Sync {
    fn adapters(&self) -> Result<Vec<Adapter>, EngineError>;
}

impl<F> AdapterSource for F
where
    F: Fn() -> Result<Vec<Adapter>, EngineError> + Send + Sync,
{
    fn adapters(&self) -> Result<Vec<Adapter>, EngineError> {
        self()
    }
}

/// Decides whether an adapter belongs to a VPN or tunnel.
pub trait AdapterClassifier: Send + Sync {
    fn classify(&self, adapter: &Adapter) -> bool;
}

impl<F> AdapterClassifier for F
where
    F: Fn(&Adapter) -> bool + Send + Sync,
{
    fn classify(&self, adapter: &Adapter) -> bool {
        self(adapter)
    }
}

/// Substring heuristics over the adapter name and description.
///
/// Adapters whose name looks like a physical NIC are skipped outright;
/// the rest are flagged when a VPN marker appears in the name or description.
#[derive(Debug, Clone)]
pub struct KeywordClassifier {
    physical: Vec<String>,
    vpn: Vec<String>,
}

impl KeywordClassifier {
    pub fn new<P, V>(physical: P, vpn: V) -> Self
    where
        P: IntoIterator,
        P::Item: AsRef<str>,
        V: IntoIterator,
        V::Item: AsRef<str>,
    {
        Self {
            physical: physical.into_iter().map(|m| m.as_ref().to_lowercase()).collect(),
            vpn: vpn.into_iter().map(|m| m.as_ref().to_lowercase()).collect(),
        }
    }
}

impl Default for KeywordClassifier {
    fn default() -> Self {
        Self::new(PHYSICAL_ADAPTER_MARKERS, VPN_ADAPTER_MARKERS)
    }
}

impl AdapterClassifier for KeywordClassifier {
    fn classify(&self, adapter: &Adapter) -> bool {
        let name = adapter.name.to_lowercase();
        if self.physical.iter().any(|m| name.contains(m.as_str())) {
            return false;
        }
        let description = adapter
            .description
            .as_deref()
            .map(str::to_lowercase)
            .unwrap_or_default();
        self.vpn
            .iter()
            .any(|m| name.contains(m.as_str()) || description.contains(m.as_str()))
    }
}

/// IPv4 addresses of every adapter the classifier flags.
pub fn classify_adapters(
    adapters: &[Adapter],
    classifier: &dyn AdapterClassifier,
) -> BTreeSet<Ipv4Addr> {
    adapters
        .iter()
        .filter(|a| classifier.classify(a))
        .flat_map(|a| a.ipv4.iter().copied())
        .collect()
}

/// Classifier plus the source it reads from.
pub struct VpnDetector {
    source: Box<dyn AdapterSource>,
    classifier: Box<dyn AdapterClassifier>,
}

impl VpnDetector {
    pub fn new(
        source: impl AdapterSource + 'static,
        classifier: impl AdapterClassifier + 'static,
    ) -> Self {
        Self {
            source: Box::new(source),
            classifier: Box::new(classifier),
        }
    }

    /// Platform adapter source with the default keyword heuristics.
    pub fn platform_default() -> Self {
        Self {
            source: platform_source(),
            classifier: Box::new(KeywordClassifier::default()),
        }
    }

    /// Addresses of VPN/virtual adapters. Empty on any enumeration failure.
    pub fn detect_vpn_addresses(&self) -> BTreeSet<Ipv4Addr> {
        match self.source.adapters() {
            Ok(adapters) => classify_adapters(&adapters, self.classifier.as_ref()),
            Err(e) => {
                tracing::debug!("Adapter query failed, assuming no VPN: {e}");
                BTreeSet::new()
            }
        }
    }
}

/// Source used when the platform offers no adapter enumeration.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopSource;

impl AdapterSource for NoopSource {
    fn adapters(&self) -> Result<Vec<Adapter>, EngineError> {
        Ok(Vec::new())
    }
}

#[cfg(target_os = "windows")]
pub fn platform_source() -> Box<dyn AdapterSource> {
    Box::new(IpconfigSource)
}

#[cfg(not(target_os = "windows"))]
pub fn platform_source() -> Box<dyn AdapterSource> {
    Box::new(SysinfoSource)
}

/// Runs `ipconfig /all` and parses its adapter sections.
#[cfg(target_os = "windows")]
#[derive(Debug, Clone, Copy, Default)]
pub struct IpconfigSource;

#[cfg(target_os = "windows")]
impl AdapterSource for IpconfigSource {
    fn adapters(&self) -> Result<Vec<Adapter>, EngineError> {
        use std::os::windows::process::CommandExt;
        const CREATE_NO_WINDOW: u32 = 0x0800_0000;

        let output = std::process::Command::new("ipconfig")
            .arg("/all")
            .creation_flags(CREATE_NO_WINDOW)
            .output()
            .map_err(|e| EngineError::AdapterQuery(format!("failed to run ipconfig: {e}")))?;
        if !output.status.success() {
            return Err(EngineError::AdapterQuery(format!(
                "ipconfig exited with {}",
                output.status
            )));
        }
        let text = String::from_utf8_lossy(&output.stdout);
        Ok(IpconfigParser::new()?.parse(&text))
    }
}

/// Interface enumeration through `sysinfo`. No descriptions are available,
/// so classification relies on interface names (`tun0`, `utun3`, `wg0`...).
#[cfg(not(target_os = "windows"))]
#[derive(Debug, Clone, Copy, Default)]
pub struct SysinfoSource;

#[cfg(not(target_os = "windows"))]
impl AdapterSource for SysinfoSource {
    fn adapters(&self) -> Result<Vec<Adapter>, EngineError> {
        let networks = sysinfo::Networks::new_with_refreshed_list();
        let mut adapters: Vec<Adapter> = networks
            .list()
            .iter()
            .map(|(name, data)| {
                let ipv4 = data.ip_networks().iter().filter_map(|net| match net.addr {
                    std::net::IpAddr::V4(v4) => Some(v4),
                    std::net::IpAddr::V6(_) => None,
                });
                Adapter::new(name.clone(), ipv4)
            })
            .collect();
        adapters.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(adapters)
    }
}

/// Parser for `ipconfig` / `ipconfig /all` output (English locale).
pub struct IpconfigParser {
    header: Regex,
    description: Regex,
    ipv4: Regex,
}

impl IpconfigParser {
    pub fn new() -> Result<Self, EngineError> {
        let compile = |pattern: &str| {
            Regex::new(pattern)
                .map_err(|e| EngineError::AdapterQuery(format!("bad ipconfig pattern: {e}")))
        };
        Ok(Self {
            header: compile(r"^(?P<name>\S.*\badapter\b.*?)\s*:\s*$")?,
            description: compile(r"^\s+Description[ .]*:\s*(?P<value>.*?)\s*$")?,
            ipv4: compile(r"(?:IPv4 Address|IP Address)[^:\r\n]*:\s*(?P<ip>[0-9]+(?:\.[0-9]+){3})")?,
        })
    }

    /// Split the output into adapter sections. Lines before the first
    /// adapter header (the global "Windows IP Configuration" block) are ignored.
    pub fn parse(&self, output: &str) -> Vec<Adapter> {
        let mut adapters = Vec::new();
        let mut current: Option<Adapter> = None;

        for line in output.lines() {
            if let Some(caps) = self.header.captures(line) {
                if let Some(done) = current.take() {
                    adapters.push(done);
                }
                current = Some(Adapter::new(&caps["name"], Vec::new()));
                continue;
            }
            let Some(adapter) = current.as_mut() else {
                continue;
            };
            if let Some(caps) = self.description.captures(line) {
                if !caps["value"].is_empty() {
                    adapter.description = Some(caps["value"].to_string());
                }
            } else if let Some(caps) = self.ipv4.captures(line) {
                if let Ok(ip) = caps["ip"].parse::<Ipv4Addr>() {
                    if !adapter.ipv4.contains(&ip) {
                        adapter.ipv4.push(ip);
                    }
                }
            }
        }
        adapters.extend(current);
        adapters
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const IPCONFIG_ALL: &str = "\r
Windows IP Configuration\r
\r
   Host Name . . . . . . . . . . . . : DESKTOP-01\r
   Primary Dns Suffix  . . . . . . . : \r
\r
Ethernet adapter Ethernet:\r
\r
   Connection-specific DNS Suffix  . : lan\r
   Description . . . . . . . . . . . : Intel(R) Ethernet Connection (7) I219-V\r
   IPv4 Address. . . . . . . . . . . : 192.168.1.5(Preferred) \r
   Subnet Mask . . . . . . . . . . . : 255.255.255.0\r
   Default Gateway . . . . . . . . . : 192.168.1.1\r
\r
Unknown adapter Surfshark:\r
\r
   Description . . . . . . . . . . . : Surfshark WireGuard Driver\r
   IPv4 Address. . . . . . . . . . . : 10.14.0.2(Preferred) \r
\r
Wireless LAN adapter Wi-Fi:\r
\r
   Media State . . . . . . . . . . . : Media disconnected\r
   Description . . . . . . . . . . . : Intel(R) Wi-Fi 6 AX201 160MHz\r
\r
PPP adapter Office:\r
\r
   Description . . . . . . . . . . . : WAN Miniport (IKEv2)\r
   IP Address. . . . . . . . . . . . : 172.20.1.9\r
";

    fn sample_adapters() -> Vec<Adapter> {
        vec![
            Adapter::new(
                "Ethernet adapter Local Area Connection",
                [Ipv4Addr::new(192, 168, 1, 5)],
            ),
            Adapter::new("TAP-Windows Adapter V9", [Ipv4Addr::new(10, 8, 0, 2)]),
        ]
    }

    #[test]
    fn test_detects_tap_adapter_and_skips_physical() {
        let adapters = sample_adapters();
        let detector = VpnDetector::new(
            move || -> Result<Vec<Adapter>, EngineError> { Ok(adapters.clone()) },
            KeywordClassifier::default(),
        );
        let found = detector.detect_vpn_addresses();
        assert_eq!(found, BTreeSet::from([Ipv4Addr::new(10, 8, 0, 2)]));
    }

    #[test]
    fn test_detection_is_deterministic() {
        let adapters = sample_adapters();
        let classifier = KeywordClassifier::default();
        let first = classify_adapters(&adapters, &classifier);
        for _ in 0..5 {
            assert_eq!(classify_adapters(&adapters, &classifier), first);
        }
    }

    #[test]
    fn test_source_failure_degrades_to_empty_set() {
        let detector = VpnDetector::new(
            || -> Result<Vec<Adapter>, EngineError> {
                Err(EngineError::AdapterQuery("ipconfig not found".into()))
            },
            KeywordClassifier::default(),
        );
        assert!(detector.detect_vpn_addresses().is_empty());
    }

    #[test]
    fn test_noop_source_yields_empty_set() {
        let detector = VpnDetector::new(NoopSource, KeywordClassifier::default());
        assert!(detector.detect_vpn_addresses().is_empty());
    }

    #[test]
    fn test_classifier_is_pluggable() {
        let adapters = sample_adapters();
        let only_lan = |a: &Adapter| a.name.contains("Local Area");
        let found = classify_adapters(&adapters, &only_lan);
        assert_eq!(found, BTreeSet::from([Ipv4Addr::new(192, 168, 1, 5)]));
    }

    #[test]
    fn test_description_marks_vpn_when_name_is_generic() {
        let classifier = KeywordClassifier::default();
        let adapter = Adapter::new("Unknown adapter Office", [Ipv4Addr::new(10, 1, 1, 1)])
            .with_description("Wintun Userspace Tunnel");
        assert!(classifier.classify(&adapter));

        let plain = Adapter::new("Bluetooth Network Connection", Vec::new());
        assert!(!classifier.classify(&plain));
    }

    #[test]
    fn test_parse_ipconfig_sections() {
        let adapters = IpconfigParser::new().unwrap().parse(IPCONFIG_ALL);
        let names: Vec<&str> = adapters.iter().map(|a| a.name.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "Ethernet adapter Ethernet",
                "Unknown adapter Surfshark",
                "Wireless LAN adapter Wi-Fi",
                "PPP adapter Office",
            ]
        );
        assert_eq!(adapters[0].ipv4, vec![Ipv4Addr::new(192, 168, 1, 5)]);
        assert_eq!(
            adapters[1].description.as_deref(),
            Some("Surfshark WireGuard Driver")
        );
        assert!(adapters[2].ipv4.is_empty());
        assert_eq!(adapters[3].ipv4, vec![Ipv4Addr::new(172, 20, 1, 9)]);
    }

    #[test]
    fn test_parsed_ipconfig_classifies_vpn_adapters() {
        let adapters = IpconfigParser::new().unwrap().parse(IPCONFIG_ALL);
        let found = classify_adapters(&adapters, &KeywordClassifier::default());
        assert_eq!(
            found,
            BTreeSet::from([Ipv4Addr::new(10, 14, 0, 2), Ipv4Addr::new(172, 20, 1, 9)])
        );
    }

    #[test]
    fn test_parse_ignores_global_block_and_bad_addresses() {
        let text = "Windows IP Configuration\n   IPv4 Address. . : 1.2.3.4\n\nUnknown adapter vpn0:\n   IPv4 Address. . : 999.1.1.1\n";
        let adapters = IpconfigParser::new().unwrap().parse(text);
        assert_eq!(adapters.len(), 1);
        assert!(adapters[0].ipv4.is_empty());
    }
}
