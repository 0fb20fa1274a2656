//! Advertised-name topology parsing.
//!
//! Scales encode their topology in the advertised name so it is known
//! before the first protocol read.  Tokens are split on `-`, `_` or
//! space and matched case-insensitively:
//!
//! | Token      | Meaning                                                  |
//! |------------|----------------------------------------------------------|
//! | `<n>P`     | platform count (aggregator) or platform number (pad)     |
//! | `F<digits>`| firmware version, only directly after the `<n>P` token   |
//! | `N<c>`     | network identifier, `c` from the ordered table `0-9A-Z`  |
//!
//! A network token marks a per-platform device.  Examples:
//! `VISOR-4P-F62` (aggregator, 4 platforms, firmware 62) and
//! `PAD-NB-2P-F48` (pad 2 on network 11, firmware 48).

use core::fmt;

use crate::config::MAX_PLATFORMS;

/// Ordered network identifier table; the index is the network number.
pub const NETWORK_CHARS: &[u8; 36] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ";

/// Device topology derived from the advertised name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Topology {
    /// Visor/receiver relaying `platform_count` platforms.  `0` means the
    /// count was not advertised and the first general frame decides.
    Aggregator { platform_count: u8 },
    /// One scale pad inside a numbered network.
    PerPlatform { network: u8, platform_number: u8 },
}

/// Parsed advertised name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdvertisedName {
    pub raw: String,
    pub topology: Topology,
    pub firmware: Option<u16>,
}

impl fmt::Display for AdvertisedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

/// Map a network identifier character to its number.
pub fn network_number(c: char) -> Option<u8> {
    let upper = c.to_ascii_uppercase();
    NETWORK_CHARS
        .iter()
        .position(|&n| n as char == upper)
        .map(|i| i as u8)
}

/// Map a network number back to its identifier character.
pub fn network_char(number: u8) -> Option<char> {
    NETWORK_CHARS.get(number as usize).map(|&b| b as char)
}

impl AdvertisedName {
    /// Parse a name.  Unknown tokens are ignored; a name with no
    /// recognizable tokens is an aggregator of unknown size.
    pub fn parse(name: &str) -> Self {
        let tokens: Vec<&str> = name
            .split(['-', '_', ' '])
            .filter(|t| !t.is_empty())
            .collect();

        let mut network = None;
        let mut platform_token = None;
        let mut firmware = None;

        for (i, token) in tokens.iter().enumerate() {
            if let Some(n) = parse_network_token(token) {
                network = Some(n);
            } else if let Some(p) = parse_platform_token(token) {
                platform_token = Some(p);
                firmware = tokens.get(i + 1).and_then(|next| parse_firmware_token(next));
            }
        }

        let topology = match network {
            Some(network) => Topology::PerPlatform {
                network,
                platform_number: platform_token.unwrap_or(1),
            },
            None => Topology::Aggregator {
                platform_count: platform_token
                    .filter(|&n| n as usize <= MAX_PLATFORMS)
                    .unwrap_or(0),
            },
        };

        Self {
            raw: name.to_string(),
            topology,
            firmware,
        }
    }

    pub fn is_aggregator(&self) -> bool {
        matches!(self.topology, Topology::Aggregator { .. })
    }
}

/// `<digits>P`
fn parse_platform_token(token: &str) -> Option<u8> {
    let digits = token
        .strip_suffix('P')
        .or_else(|| token.strip_suffix('p'))?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

/// `F<digits>`
fn parse_firmware_token(token: &str) -> Option<u16> {
    let digits = token
        .strip_prefix('F')
        .or_else(|| token.strip_prefix('f'))?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

/// `N<c>` with exactly one identifier character.
fn parse_network_token(token: &str) -> Option<u8> {
    let rest = token
        .strip_prefix('N')
        .or_else(|| token.strip_prefix('n'))?;
    let mut chars = rest.chars();
    let c = chars.next()?;
    if chars.next().is_some() {
        return None;
    }
    network_number(c)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aggregator_name() {
        let n = AdvertisedName::parse("VISOR-4P-F62");
        assert_eq!(n.topology, Topology::Aggregator { platform_count: 4 });
        assert_eq!(n.firmware, Some(62));
        assert!(n.is_aggregator());
    }

    #[test]
    fn per_platform_name_with_letter_network() {
        let n = AdvertisedName::parse("pad_nB_2p_f48");
        assert_eq!(
            n.topology,
            Topology::PerPlatform {
                network: 11,
                platform_number: 2
            }
        );
        assert_eq!(n.firmware, Some(48));
    }

    #[test]
    fn firmware_only_counts_after_platform_token() {
        let n = AdvertisedName::parse("VISOR F62 4P");
        assert_eq!(n.firmware, None);
        assert_eq!(n.topology, Topology::Aggregator { platform_count: 4 });
    }

    #[test]
    fn unknown_name_is_unsized_aggregator() {
        let n = AdvertisedName::parse("Scale");
        assert_eq!(n.topology, Topology::Aggregator { platform_count: 0 });
        assert_eq!(n.firmware, None);
    }

    #[test]
    fn oversized_count_ignored() {
        let n = AdvertisedName::parse("VISOR-40P-F62");
        assert_eq!(n.topology, Topology::Aggregator { platform_count: 0 });
    }

    #[test]
    fn network_table_extends_past_nine() {
        assert_eq!(network_number('0'), Some(0));
        assert_eq!(network_number('9'), Some(9));
        assert_eq!(network_number('A'), Some(10));
        assert_eq!(network_number('z'), Some(35));
        assert_eq!(network_number('#'), None);
        assert_eq!(network_char(10), Some('A'));
        assert_eq!(network_char(36), None);
    }

    #[test]
    fn multi_char_network_token_is_not_a_network() {
        let n = AdvertisedName::parse("NORTH-2P");
        assert!(n.is_aggregator());
    }
}
