//! Advertisement data parsing for the peer scan.

use heapless::String;

/// AD types carrying 128-bit service UUID lists (incomplete / complete).
const AD_UUID128_INCOMPLETE: u8 = 0x06;
const AD_UUID128_COMPLETE: u8 = 0x07;

/// Iterate `(ad_type, payload)` pairs, stopping at the first malformed entry.
fn ad_structures(data: &[u8]) -> impl Iterator<Item = (u8, &[u8])> {
    let mut i = 0;
    core::iter::from_fn(move || {
        let len = *data.get(i)? as usize;
        if len == 0 || i + len >= data.len() {
            return None;
        }
        let item = (data[i + 1], &data[i + 2..i + 1 + len]);
        i += len + 1;
        Some(item)
    })
}

/// Check if raw advertisement data lists `uuid` (little-endian) among its
/// 128-bit service UUIDs.
pub fn contains_service_uuid128(data: &[u8], uuid: &[u8; 16]) -> bool {
    ad_structures(data)
        .filter(|(ty, _)| *ty == AD_UUID128_INCOMPLETE || *ty == AD_UUID128_COMPLETE)
        .any(|(_, list)| list.chunks_exact(16).any(|c| c == uuid))
}

/// Extract complete/shortened local name from advertisement data.
pub fn extract_device_name(data: &[u8]) -> String<32> {
    let mut name = String::new();
    match ad_structures(data).find(|(ty, _)| *ty == 0x08 || *ty == 0x09) {
        Some((_, bytes)) => {
            for &b in bytes {
                if name.push(b as char).is_err() {
                    break;
                }
            }
        }
        None => {
            let _ = name.push_str("Unknown");
        }
    }
    name
}

/// Full 128-bit UUID (little-endian) for a 16-bit alias on `base`.
pub const fn uuid128_from_base(base: &[u8; 16], alias: u16) -> [u8; 16] {
    let mut out = *base;
    let le = alias.to_le_bytes();
    out[12] = le[0];
    out[13] = le[1];
    out
}
