//! Strict IPv4 grammar: `d.d.d.d`, each `d` in `0..=255`, no redundant
//! leading zeros, nothing before or after.

/// Number of components in an IPv4 address.
pub const IPV4_LEN: usize = 4;

/// Digit accumulation stops once the value reaches this cap.
///
/// Far above any valid component, far below `u32::MAX / 10`.
const DTOI_CAP: u32 = 0x00FF_FFFF;

/// Parse a maximal run of ASCII digits at the start of `s`.
///
/// Returns `(value, digits_consumed)`, or `None` when no digit was consumed
/// or the running value hit [`DTOI_CAP`].
fn dtoi(s: &[u8]) -> Option<(u32, usize)> {
    let mut n: u32 = 0;
    let mut consumed = 0;
    for &b in s.iter().take_while(|b| b.is_ascii_digit()) {
        n = n * 10 + u32::from(b - b'0');
        if n >= DTOI_CAP {
            return None;
        }
        consumed += 1;
    }
    if consumed == 0 {
        return None;
    }
    Some((n, consumed))
}

/// Parse `s` as a strict dotted-decimal IPv4 address.
///
/// Returns the four octets, or `None` if `s` is not exactly four `.`-separated
/// decimal components in `0..=255` without redundant leading zeros.
#[must_use]
pub fn parse_strict_ipv4(s: &str) -> Option<[u8; IPV4_LEN]> {
    let mut rest = s.as_bytes();
    let mut octets = [0_u8; IPV4_LEN];

    for (i, octet) in octets.iter_mut().enumerate() {
        if rest.is_empty() {
            // Missing octets.
            return None;
        }
        if i > 0 {
            rest = rest.strip_prefix(b".")?;
        }
        let (n, consumed) = dtoi(rest)?;
        if consumed > 1 && rest[0] == b'0' {
            return None;
        }
        *octet = u8::try_from(n).ok()?;
        rest = &rest[consumed..];
    }

    if !rest.is_empty() {
        return None;
    }
    Some(octets)
}

/// Whether `s` is a valid strict IPv4 address.
#[must_use]
pub fn is_strict_ipv4(s: &str) -> bool {
    parse_strict_ipv4(s).is_some()
}
