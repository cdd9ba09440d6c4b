//! Message framing for the single TCP connection the coordinator owns.
//!
//! A big-endian `u32` length prefix followed by a null-delimited sequence
//! of fields. quantdesk's wire format is its own; the actual upstream
//! protocol is assumed and out of scope for this crate.

/// Build one length-prefixed, null-delimited frame from `fields`.
macro_rules! make_frame {
    ( $( $field:expr ),+ $(,)? ) => {{
        let mut body = String::new();
        $(
            body.push_str(&$field.to_string());
            body.push('\0');
        )+
        let len = u32::try_from(body.len()).expect("frame too long").to_be_bytes();
        let mut out = Vec::with_capacity(4 + body.len());
        out.extend_from_slice(&len);
        out.extend_from_slice(body.as_bytes());
        out
    }};
}

pub(crate) use make_frame;

/// Split a decoded frame body into its null-delimited fields, dropping the
/// trailing empty field produced by the final terminator.
pub fn split_fields(body: &[u8]) -> Vec<String> {
    let mut fields: Vec<String> = body
        .split(|b| *b == 0)
        .map(|s| String::from_utf8_lossy(s).into_owned())
        .collect();
    if fields.last().is_some_and(String::is_empty) {
        fields.pop();
    }
    fields
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_round_trips_fields() {
        let frame = make_frame!("FETCH_BARS", 42, "AAPL");
        let len = u32::from_be_bytes(frame[..4].try_into().unwrap()) as usize;
        let fields = split_fields(&frame[4..4 + len]);
        assert_eq!(fields, vec!["FETCH_BARS", "42", "AAPL"]);
    }
}
