//! ## Separates engine.io v3 text payloads from out-of-band data
//!
//! Some proxies and servers prepend or interleave data that is not part of the payload,
//! typically an `ok` acknowledgement. The framer looks for `<digits>:<digit>` frame
//! boundaries, resolves the length of each frame and keeps everything else aside.
//!
//! When the response (without a leading `ok`) is already a well-formed payload it is used as is,
//! so that packets containing `<digit>:<digit>` are never split.
//!
//! The heuristic works on UTF-16 code units with floating point arithmetic,
//! matching the servers and clients it interoperates with, including the `NaN`
//! lengths produced when a boundary cannot be resolved.
use engineioxide_core::Str;

/// A text payload split into its clean part and the out-of-band data
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Framed {
    /// The frames to decode, empty if there is none
    pub clean: Str,
    /// Data surrounding the frames, if any
    pub out_of_band: Option<String>,
}

/// Split a v3 text response into its payload and out-of-band data
pub(crate) fn separate(data: Str) -> Framed {
    let data = if data.starts_with("ok") {
        data.slice(2..)
    } else {
        data
    };
    if is_framed(&data) {
        return Framed {
            clean: data,
            out_of_band: None,
        };
    }

    #[cfg(feature = "tracing")]
    tracing::debug!(len = data.len(), "payload is not well framed, separating out-of-band data");

    let mut data: Vec<u16> = data.encode_utf16().collect();
    let (clean, out_of_band) = heuristic(&mut data);
    Framed {
        clean: String::from_utf16_lossy(&clean).into(),
        out_of_band: (!out_of_band.is_empty()).then(|| String::from_utf16_lossy(&out_of_band)),
    }
}

/// Check that `data` is a sequence of `<length>:<frame>` records, the length counting UTF-16 units.
fn is_framed(data: &str) -> bool {
    let mut rest = data;
    while !rest.is_empty() {
        let Some(sep) = rest.find(':') else {
            return false;
        };
        let Ok(len) = rest[..sep].parse::<usize>() else {
            return false;
        };
        if !rest[..sep].bytes().all(|c| c.is_ascii_digit()) {
            return false;
        }
        rest = &rest[sep + 1..];
        let mut units = 0;
        let mut end = rest.len();
        for (i, c) in rest.char_indices() {
            if units == len {
                end = i;
                break;
            }
            units += c.len_utf16();
        }
        if units != len {
            return false;
        }
        rest = &rest[end..];
    }
    true
}

fn is_digit(data: &[u16], i: f64) -> bool {
    i >= 0.0
        && (i as usize) < data.len()
        && (u16::from(b'0')..=u16::from(b'9')).contains(&data[i as usize])
}

/// Clamp an index like `String.prototype.substring`, `NaN` being 0
fn clamp(data: &[u16], i: f64) -> usize {
    if i.is_nan() {
        0
    } else {
        i.clamp(0.0, data.len() as f64) as usize
    }
}

fn substring(data: &[u16], a: f64, b: f64) -> &[u16] {
    let (a, b) = (clamp(data, a), clamp(data, b));
    if a <= b { &data[a..b] } else { &data[b..a] }
}

/// The value of the leading decimal digits, `NaN` if there is none
fn parse_int(data: &[u16]) -> f64 {
    let digits = data
        .iter()
        .take_while(|&&c| (u16::from(b'0')..=u16::from(b'9')).contains(&c));
    let mut value = None;
    for &c in digits {
        value = Some(value.unwrap_or(0.0) * 10.0 + f64::from(c - u16::from(b'0')));
    }
    value.unwrap_or(f64::NAN)
}

/// Returns the clean frames and the out-of-band data. `ok` markers preceding a frame are removed from `data`.
fn heuristic(data: &mut Vec<u16>) -> (Vec<u16>, Vec<u16>) {
    let candidates: Vec<f64> = {
        let data: &[u16] = data;
        (1..data.len().saturating_sub(1))
            .filter(|&p| {
                data[p] == u16::from(b':')
                    && is_digit(data, (p - 1) as f64)
                    && is_digit(data, (p + 1) as f64)
            })
            .map(|p| p as f64)
            .collect()
    };

    let ok: [u16; 2] = [u16::from(b'o'), u16::from(b'k')];
    let mut clean = Vec::new();
    let mut out_of_band = Vec::new();
    let mut prev = 0.0;
    let mut del = 0.0;

    for (m, &pos) in candidates.iter().enumerate() {
        let mut start = pos - del - 1.0;
        let end = start + 1.0;
        // Walk back over the length digits, ignoring the ones that would overflow the next frame
        while is_digit(data, start) {
            let len = parse_int(substring(data, start, end));
            let bound = candidates
                .get(m + 1)
                .map_or(data.len() as f64, |next| next - del - 1.0);
            if end + len >= bound {
                break;
            }
            start -= 1.0;
        }
        start += 1.0;

        if start >= 2.0 && substring(data, start - 2.0, start) == ok {
            let at = start as usize;
            data.drain(at - 2..at);
            del += 2.0;
            start -= 2.0;
        }

        let end = pos - del;
        let len = parse_int(substring(data, start, end));
        clean.extend_from_slice(substring(data, start, end + len + 1.0));
        out_of_band.extend_from_slice(substring(data, prev, start));
        prev = end + len + 1.0;
    }
    if prev < data.len() as f64 {
        out_of_band.extend_from_slice(substring(data, prev, data.len() as f64));
    }
    (clean, out_of_band)
}
