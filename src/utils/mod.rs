use std::cmp::Ordering;
use std::sync::OnceLock;

use regex_lite::{Captures, Regex};

/// Parse an IPv4 address in dotted-decimal form into its integer value
pub fn ipv4_to_u32(ip: &str) -> Option<u32> {
    let parts: Vec<&str> = ip.split('.').collect();
    if parts.len() != 4 {
        return None;
    }
    let mut value: u32 = 0;
    for part in parts {
        let octet = part.parse::<u8>().ok()?;
        value = (value << 8) | octet as u32;
    }
    Some(value)
}

/// Format an integer IPv4 address as dotted-decimal
pub fn u32_to_ipv4(value: u32) -> String {
    format!(
        "{}.{}.{}.{}",
        (value >> 24) & 0xff,
        (value >> 16) & 0xff,
        (value >> 8) & 0xff,
        value & 0xff
    )
}

/// Parse a CIDR string (e.g., "10.0.0.0/24") into (network, broadcast, prefix_length).
/// Host bits in the address are masked off, so "10.0.0.7/24" yields the 10.0.0.0 network.
pub fn parse_cidr(cidr: &str) -> Result<(u32, u32, u8), String> {
    let (addr, len) = cidr
        .split_once('/')
        .ok_or_else(|| format!("Invalid CIDR (missing prefix length): {}", cidr))?;
    let addr_int = ipv4_to_u32(addr).ok_or_else(|| format!("Invalid IPv4 address: {}", addr))?;
    let prefix_len: u8 = len
        .parse()
        .map_err(|_| format!("Invalid prefix length: {}", len))?;
    if prefix_len > 32 {
        return Err(format!("Invalid prefix length: {}", prefix_len));
    }
    let mask = prefix_mask(prefix_len);
    let network = addr_int & mask;
    let broadcast = network | !mask;
    Ok((network, broadcast, prefix_len))
}

/// Format a network address and prefix length as CIDR
pub fn format_cidr(network: u32, prefix_len: u8) -> String {
    format!("{}/{}", u32_to_ipv4(network), prefix_len)
}

fn prefix_mask(prefix_len: u8) -> u32 {
    if prefix_len == 0 {
        0
    } else {
        u32::MAX << (32 - prefix_len as u32)
    }
}

/// Number of addresses covered by a prefix of the given length
pub fn block_size(prefix_len: u8) -> u64 {
    1u64 << (32 - prefix_len.min(32) as u32)
}

/// Strip the mask from an address ("10.0.0.1/32" -> "10.0.0.1")
pub fn strip_mask(address: &str) -> &str {
    address.split('/').next().unwrap_or(address)
}

/// The two host addresses of a point-to-point block. A /31 uses both of its addresses;
/// larger blocks skip their network address.
pub fn link_hosts(network: u32, prefix_len: u8) -> (u32, u32) {
    if prefix_len >= 31 {
        (network, network.saturating_add(1))
    } else {
        (network + 1, network + 2)
    }
}

/// Whether a bare address lies inside a CIDR block
pub fn cidr_contains(cidr: &str, address: &str) -> bool {
    match (parse_cidr(cidr), ipv4_to_u32(strip_mask(address))) {
        (Ok((network, broadcast, _)), Some(ip)) => ip >= network && ip <= broadcast,
        _ => false,
    }
}

/// Find the lowest aligned block of `size` values within [start, end] that overlaps
/// none of the allocated (inclusive) ranges. `allocated` must be sorted by start.
pub fn first_fit(
    start: u64,
    end: u64,
    size: u64,
    align: u64,
    allocated: &[(u64, u64)],
) -> Option<u64> {
    if size == 0 || align == 0 || end < start {
        return None;
    }
    let align_up = |v: u64| v.div_ceil(align) * align;

    let mut cursor = align_up(start);
    for &(a_start, a_end) in allocated {
        if a_end < cursor {
            continue;
        }
        if cursor + size - 1 < a_start {
            break;
        }
        cursor = align_up(a_end + 1);
    }

    if cursor + size - 1 <= end {
        Some(cursor)
    } else {
        None
    }
}

/// Validate a hostname.
/// Allows alphanumeric, hyphens, dots, and underscores. No path separators or shell metacharacters.
pub fn is_valid_hostname(hostname: &str) -> bool {
    if hostname.is_empty() || hostname.len() > 253 {
        return false;
    }
    hostname.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '.' || c == '_')
}

/// Deterministic device name: `{site}-{role}-{NN}`, e.g. "dc1-leaf-01"
pub fn device_name(site: &str, role: &str, index: usize) -> String {
    format!("{}-{}-{:02}", site.to_lowercase(), role, index)
}

/// Compare two interface names with numeric awareness, so "eth2" sorts before "eth10".
/// Text runs compare case-insensitively; full byte order breaks ties.
pub fn natural_cmp(a: &str, b: &str) -> Ordering {
    let a_chunks = chunk_name(a);
    let b_chunks = chunk_name(b);

    for (x, y) in a_chunks.iter().zip(b_chunks.iter()) {
        let ord = match (x, y) {
            (Chunk::Num(x), Chunk::Num(y)) => {
                let x = x.trim_start_matches('0');
                let y = y.trim_start_matches('0');
                x.len().cmp(&y.len()).then_with(|| x.cmp(y))
            }
            (Chunk::Text(x), Chunk::Text(y)) => x.to_lowercase().cmp(&y.to_lowercase()),
            (Chunk::Num(_), Chunk::Text(_)) => Ordering::Less,
            (Chunk::Text(_), Chunk::Num(_)) => Ordering::Greater,
        };
        if ord != Ordering::Equal {
            return ord;
        }
    }

    a_chunks.len().cmp(&b_chunks.len()).then_with(|| a.cmp(b))
}

enum Chunk<'a> {
    Num(&'a str),
    Text(&'a str),
}

fn chunk_name(name: &str) -> Vec<Chunk<'_>> {
    let mut chunks = Vec::new();
    let mut start = 0;
    let mut in_digits: Option<bool> = None;

    for (i, c) in name.char_indices() {
        let digit = c.is_ascii_digit();
        match in_digits {
            Some(prev) if prev != digit => {
                chunks.push(make_chunk(&name[start..i], prev));
                start = i;
            }
            _ => {}
        }
        in_digits = Some(digit);
    }
    if let Some(digit) = in_digits {
        chunks.push(make_chunk(&name[start..], digit));
    }
    chunks
}

fn make_chunk(s: &str, digit: bool) -> Chunk<'_> {
    if digit {
        Chunk::Num(s)
    } else {
        Chunk::Text(s)
    }
}

/// Sort interface names in natural order
pub fn sort_interface_names(names: &mut [String]) {
    names.sort_by(|a, b| natural_cmp(a, b));
}

fn entity_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"&(#[0-9]{1,7}|#[xX][0-9a-fA-F]{1,6}|[A-Za-z][A-Za-z0-9]{1,7});")
            .expect("entity pattern is valid")
    })
}

/// Decode markup entities (`&gt;`, `&amp;`, `&#39;`, `&#x3C;`, ...) back to literal characters.
/// Single pass: "&amp;gt;" decodes to "&gt;", not ">". Unknown entities are left as-is.
pub fn decode_entities(text: &str) -> String {
    if !text.contains('&') {
        return text.to_string();
    }

    entity_regex()
        .replace_all(text, |caps: &Captures<'_>| {
            let body = &caps[1];
            decode_entity(body).unwrap_or_else(|| caps[0].to_string())
        })
        .into_owned()
}

fn decode_entity(body: &str) -> Option<String> {
    if let Some(num) = body.strip_prefix('#') {
        let code = match num.strip_prefix(['x', 'X']) {
            Some(hex) => u32::from_str_radix(hex, 16).ok()?,
            None => num.parse::<u32>().ok()?,
        };
        return char::from_u32(code).map(|c| c.to_string());
    }

    let decoded = match body {
        "amp" => "&",
        "lt" => "<",
        "gt" => ">",
        "quot" => "\"",
        "apos" => "'",
        "nbsp" => "\u{a0}",
        _ => return None,
    };
    Some(decoded.to_string())
}

fn range_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\[[\w,-]*[-,][\w,-]*\]").expect("range pattern is valid"))
}

/// Upper bound on the names one range expression may expand to
pub const MAX_RANGE_MEMBERS: usize = 1024;

/// Expand bracket range notation into individual interface names.
/// "Ethernet[1-3]" -> ["Ethernet1", "Ethernet2", "Ethernet3"],
/// "Ethernet[1,5]" -> ["Ethernet1", "Ethernet5"].
/// Names without a parseable range are returned unchanged. Ranges that would yield more than
/// [`MAX_RANGE_MEMBERS`] names are rejected.
pub fn expand_interface_range(name: &str) -> Result<Vec<String>, String> {
    let Some(m) = range_regex().find(name) else {
        return Ok(vec![name.to_string()]);
    };

    let prefix = &name[..m.start()];
    let suffix = &name[m.end()..];
    let body = &name[m.start() + 1..m.end() - 1];
    let too_many = || {
        format!(
            "Interface range {} expands to more than {} names",
            name, MAX_RANGE_MEMBERS
        )
    };

    let mut expanded = Vec::new();
    for part in body.split(',') {
        if let Some((start, end)) = part.split_once('-') {
            match (start.parse::<u32>(), end.parse::<u32>()) {
                (Ok(start), Ok(end)) => {
                    let members = (end as u64 + 1).saturating_sub(start as u64);
                    if expanded.len() as u64 + members > MAX_RANGE_MEMBERS as u64 {
                        return Err(too_many());
                    }
                    for i in start..=end {
                        expanded.push(format!("{}{}{}", prefix, i, suffix));
                    }
                }
                _ => return Ok(vec![name.to_string()]),
            }
        } else if let Ok(n) = part.parse::<u32>() {
            if expanded.len() >= MAX_RANGE_MEMBERS {
                return Err(too_many());
            }
            expanded.push(format!("{}{}{}", prefix, n, suffix));
        } else {
            return Ok(vec![name.to_string()]);
        }
    }

    if expanded.is_empty() {
        Ok(vec![name.to_string()])
    } else {
        Ok(expanded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_cidr() {
        let (net, bcast, len) = parse_cidr("10.255.0.0/24").unwrap();
        assert_eq!(u32_to_ipv4(net), "10.255.0.0");
        assert_eq!(u32_to_ipv4(bcast), "10.255.0.255");
        assert_eq!(len, 24);

        let (net, _, _) = parse_cidr("10.1.2.7/31").unwrap();
        assert_eq!(u32_to_ipv4(net), "10.1.2.6");

        assert!(parse_cidr("10.0.0.0").is_err());
        assert!(parse_cidr("10.0.0.0/33").is_err());
        assert!(parse_cidr("300.0.0.0/8").is_err());
    }

    #[test]
    fn test_format_cidr() {
        assert_eq!(format_cidr(ipv4_to_u32("192.168.1.0").unwrap(), 24), "192.168.1.0/24");
    }

    #[test]
    fn test_strip_mask() {
        assert_eq!(strip_mask("10.0.0.1/32"), "10.0.0.1");
        assert_eq!(strip_mask("10.0.0.1"), "10.0.0.1");
    }

    #[test]
    fn test_link_hosts() {
        let net = ipv4_to_u32("10.1.0.4").unwrap();
        let (a, b) = link_hosts(net, 31);
        assert_eq!((u32_to_ipv4(a), u32_to_ipv4(b)), ("10.1.0.4".into(), "10.1.0.5".into()));
        let (a, b) = link_hosts(net, 30);
        assert_eq!((u32_to_ipv4(a), u32_to_ipv4(b)), ("10.1.0.5".into(), "10.1.0.6".into()));
    }

    #[test]
    fn test_cidr_contains() {
        assert!(cidr_contains("10.1.0.0/31", "10.1.0.1"));
        assert!(cidr_contains("10.1.0.1/31", "10.1.0.0/31"));
        assert!(!cidr_contains("10.1.0.0/31", "10.1.0.2"));
        assert!(!cidr_contains("10.1.0.0", "10.1.0.0"));
    }

    fn span(cidr: &str) -> (u64, u64) {
        let (net, bcast, _) = parse_cidr(cidr).unwrap();
        (net as u64, bcast as u64)
    }

    #[test]
    fn test_first_fit_skips_allocated() {
        let (start, end) = span("10.1.0.0/24");
        let next = first_fit(start, end, 2, 2, &[span("10.1.0.0/31")]).unwrap();
        assert_eq!(format_cidr(next as u32, 31), "10.1.0.2/31");
        assert_eq!(u32_to_ipv4(next as u32 + 1), "10.1.0.3");
    }

    #[test]
    fn test_first_fit_respects_alignment() {
        let (start, end) = span("10.1.0.0/24");
        let next = first_fit(start, end, 4, 4, &[(start, start)]).unwrap();
        assert_eq!(format_cidr(next as u32, 30), "10.1.0.4/30");
    }

    #[test]
    fn test_first_fit_fills_gaps() {
        let (start, end) = span("10.1.0.0/24");
        let taken = [span("10.1.0.0/31"), span("10.1.0.4/31")];
        let next = first_fit(start, end, 2, 2, &taken).unwrap();
        assert_eq!(format_cidr(next as u32, 31), "10.1.0.2/31");
    }

    #[test]
    fn test_first_fit_exhausted() {
        let (start, end) = span("10.1.0.0/31");
        assert!(first_fit(start, end, 2, 2, &[(start, end)]).is_none());
        assert!(first_fit(start, end, 4, 4, &[]).is_none());
    }

    #[test]
    fn test_natural_ordering() {
        let mut names = vec!["eth10".to_string(), "eth2".to_string(), "eth1".to_string()];
        sort_interface_names(&mut names);
        assert_eq!(names, vec!["eth1", "eth2", "eth10"]);

        let mut names = vec![
            "Ethernet1/10".to_string(),
            "Ethernet1/2".to_string(),
            "Ethernet2/1".to_string(),
        ];
        sort_interface_names(&mut names);
        assert_eq!(names, vec!["Ethernet1/2", "Ethernet1/10", "Ethernet2/1"]);
    }

    #[test]
    fn test_natural_cmp_is_total() {
        assert_eq!(natural_cmp("eth01", "eth1"), "eth01".cmp("eth1"));
        assert_ne!(natural_cmp("Eth1", "eth1"), Ordering::Equal);
        assert_eq!(natural_cmp("lo0", "lo0"), Ordering::Equal);
    }

    #[test]
    fn test_decode_entities() {
        assert_eq!(decode_entities("a &gt; b"), "a > b");
        assert_eq!(decode_entities("&lt;uplink&gt; &amp; more"), "<uplink> & more");
        assert_eq!(decode_entities("it&#39;s &#x41;"), "it's A");
        assert_eq!(decode_entities("&amp;gt;"), "&gt;");
    }

    #[test]
    fn test_decode_entities_plain_text_unchanged() {
        assert_eq!(decode_entities("uplink to spine-01"), "uplink to spine-01");
        assert_eq!(decode_entities("R&D lab"), "R&D lab");
        assert_eq!(decode_entities("&bogus;"), "&bogus;");
    }

    #[test]
    fn test_expand_interface_range() {
        assert_eq!(
            expand_interface_range("Ethernet[1-3]").unwrap(),
            vec!["Ethernet1", "Ethernet2", "Ethernet3"]
        );
        assert_eq!(
            expand_interface_range("Ethernet[1,5]/1").unwrap(),
            vec!["Ethernet1/1", "Ethernet5/1"]
        );
        assert_eq!(expand_interface_range("Ethernet5").unwrap(), vec!["Ethernet5"]);
        assert_eq!(expand_interface_range("Ethernet[a-c]").unwrap(), vec!["Ethernet[a-c]"]);
    }

    #[test]
    fn test_expand_interface_range_is_bounded() {
        assert!(expand_interface_range("Ethernet[1-4000000000]").is_err());
        assert!(expand_interface_range("Ethernet[1-1000,2000-2100]").is_err());
        assert_eq!(expand_interface_range("Ethernet[1-1024]").unwrap().len(), MAX_RANGE_MEMBERS);
        assert_eq!(expand_interface_range("Ethernet[5-1]").unwrap(), vec!["Ethernet[5-1]"]);
    }

    #[test]
    fn test_device_name() {
        assert_eq!(device_name("DC1", "leaf", 1), "dc1-leaf-01");
        assert_eq!(device_name("dc1", "spine", 12), "dc1-spine-12");
    }

    #[test]
    fn test_is_valid_hostname() {
        assert!(is_valid_hostname("dc1"));
        assert!(is_valid_hostname("fra-pop.lab"));
        assert!(!is_valid_hostname(""));
        assert!(!is_valid_hostname("dc 1"));
        assert!(!is_valid_hostname("../etc"));
    }
}
