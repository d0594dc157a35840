//! Best-effort collection of durable machine identity
//!
//! Reads stable identifiers the machine already has (firmware serial,
//! hardware MAC addresses, bluetooth controller addresses) so derived client
//! ids survive process restarts. Everything here degrades silently: a
//! missing source is skipped, never an error.

use std::fs;
use std::path::Path;

/// Kind of network link an address was read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LinkKind {
    Mac,
    Bluetooth,
}

/// A normalized hardware address with its link kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkFact {
    pub kind: LinkKind,
    pub address: String,
}

/// Durable facts collected from the running machine.
#[derive(Debug, Clone, Default)]
pub struct DeviceFacts {
    pub serial: Option<String>,
    pub links: Vec<LinkFact>,
}

/// Collect durable device facts from the running machine.
pub fn collect_device_facts() -> DeviceFacts {
    DeviceFacts {
        serial: read_serial(),
        links: read_links(),
    }
}

/// Best-effort hostname, used as the last fingerprint fallback.
pub fn hostname() -> Option<String> {
    if let Some(host) = read_trimmed("/proc/sys/kernel/hostname") {
        return Some(host.to_lowercase());
    }
    if let Some(host) = read_trimmed("/etc/hostname") {
        return Some(host.to_lowercase());
    }
    for var in ["HOSTNAME", "COMPUTERNAME"] {
        if let Ok(host) = std::env::var(var) {
            let host = host.trim().to_lowercase();
            if !host.is_empty() {
                return Some(host);
            }
        }
    }
    None
}

fn read_serial() -> Option<String> {
    for path in [
        "/sys/class/dmi/id/product_serial",
        "/sys/firmware/devicetree/base/serial-number",
        "/proc/device-tree/serial-number",
    ] {
        if let Some(value) = read_trimmed(path) {
            return Some(value);
        }
    }

    // Raspberry-Pi style: "Serial : 0000000012345678" in /proc/cpuinfo
    if let Ok(cpuinfo) = fs::read_to_string("/proc/cpuinfo") {
        for line in cpuinfo.lines() {
            if line.to_lowercase().starts_with("serial") {
                if let Some((_, value)) = line.split_once(':') {
                    let value = value.trim();
                    if !value.is_empty() {
                        return Some(value.to_string());
                    }
                }
            }
        }
    }
    None
}

fn read_links() -> Vec<LinkFact> {
    let mut links = Vec::new();
    collect_addresses("/sys/class/net", LinkKind::Mac, &mut links);
    collect_addresses("/sys/class/bluetooth", LinkKind::Bluetooth, &mut links);
    links.sort_by(|a, b| (a.kind, &a.address).cmp(&(b.kind, &b.address)));
    links.dedup();
    links
}

fn collect_addresses(root: &str, kind: LinkKind, out: &mut Vec<LinkFact>) {
    let Ok(entries) = fs::read_dir(root) else {
        return;
    };
    for entry in entries.flatten() {
        let Some(raw) = read_trimmed(entry.path().join("address")) else {
            continue;
        };
        let Some(mac) = normalize_mac(&raw) else {
            continue;
        };
        // Locally-administered MACs are virtual (bridges, containers) and
        // not stable machine identity.
        if kind == LinkKind::Mac && !is_global_mac(&mac) {
            continue;
        }
        out.push(LinkFact { kind, address: mac });
    }
}

fn read_trimmed<P: AsRef<Path>>(path: P) -> Option<String> {
    let raw = fs::read(path).ok()?;
    let text = String::from_utf8_lossy(&raw);
    let trimmed = text.trim().trim_matches('\0').trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// Normalize any common MAC spelling to `aa:bb:cc:dd:ee:ff`.
pub(crate) fn normalize_mac(raw: &str) -> Option<String> {
    let hex: String = raw
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .collect::<String>()
        .to_lowercase();
    if hex.len() != 12 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }
    if hex == "000000000000" || hex == "ffffffffffff" {
        return None;
    }
    let grouped: Vec<&str> = (0..12).step_by(2).map(|i| &hex[i..i + 2]).collect();
    Some(grouped.join(":"))
}

pub(crate) fn is_global_mac(mac: &str) -> bool {
    let Some(first) = mac.split(':').next() else {
        return false;
    };
    match u8::from_str_radix(first, 16) {
        Ok(byte) => byte & 0x01 == 0 && byte & 0x02 == 0,
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_common_mac_spellings() {
        assert_eq!(
            normalize_mac("AA:BB:CC:DD:EE:FF").as_deref(),
            Some("aa:bb:cc:dd:ee:ff")
        );
        assert_eq!(
            normalize_mac("aa-bb-cc-dd-ee-0f").as_deref(),
            Some("aa:bb:cc:dd:ee:0f")
        );
        assert_eq!(
            normalize_mac("aabbccddee0f").as_deref(),
            Some("aa:bb:cc:dd:ee:0f")
        );
    }

    #[test]
    fn rejects_placeholder_and_malformed_macs() {
        assert_eq!(normalize_mac("00:00:00:00:00:00"), None);
        assert_eq!(normalize_mac("ff:ff:ff:ff:ff:ff"), None);
        assert_eq!(normalize_mac("aa:bb"), None);
        assert_eq!(normalize_mac("zz:bb:cc:dd:ee:ff"), None);
    }

    #[test]
    fn global_mac_detection() {
        // 0x02 bit set = locally administered, 0x01 = multicast
        assert!(is_global_mac("a8:bb:cc:dd:ee:ff"));
        assert!(!is_global_mac("02:bb:cc:dd:ee:ff"));
        assert!(!is_global_mac("01:bb:cc:dd:ee:ff"));
    }

    #[test]
    fn collect_never_panics() {
        // Whatever the host looks like, collection must degrade gracefully.
        let facts = collect_device_facts();
        for link in &facts.links {
            assert_eq!(link.address.len(), 17);
        }
    }
}
