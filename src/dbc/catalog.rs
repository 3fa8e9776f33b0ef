//! Descriptors produced by [`super::parser`] and consulted by
//! [`super::codec`]. Mirrors the subset of a DBC file this system's
//! signal-name conventions actually use (§6): one message per frame id,
//! each with a flat or multiplexed signal list.

use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ByteOrder {
    LittleEndian,
    BigEndian,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Multiplexing {
    /// Not part of any multiplexed group.
    None,
    /// The selector signal itself (DBC `M`).
    Selector,
    /// A signal only present when the selector equals this value (DBC `mN`).
    Value(u32),
}

/// One signal's bit layout and engineering-unit scaling.
#[derive(Debug, Clone)]
pub struct Signal {
    pub name: String,
    pub start_bit: u16,
    pub length: u16,
    pub byte_order: ByteOrder,
    pub signed: bool,
    pub factor: f64,
    pub offset: f64,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub initial: Option<f64>,
    pub multiplexing: Multiplexing,
}

impl Signal {
    /// The default applied when a caller omits this signal from an
    /// encode call: the declared initial value, else zero clamped into
    /// `[min, max]` if a range is declared (§4.3).
    pub fn default_value(&self) -> f64 {
        if let Some(initial) = self.initial {
            return initial;
        }
        let mut v = 0.0;
        if let Some(min) = self.min {
            v = v.max(min);
        }
        if let Some(max) = self.max {
            v = v.min(max);
        }
        v
    }
}

/// One message: its frame id, byte length, and signal list.
#[derive(Debug, Clone)]
pub struct Message {
    pub id: u32,
    pub name: String,
    pub dlc: u8,
    pub signals: Vec<Signal>,
}

impl Message {
    pub fn signal(&self, name: &str) -> Option<&Signal> {
        self.signals.iter().find(|s| s.name == name)
    }

    fn selector_value(&self, signals: &HashMap<String, f64>) -> Option<u32> {
        let selector = self.signals.iter().find(|s| s.multiplexing == Multiplexing::Selector)?;
        signals.get(&selector.name).map(|v| *v as u32)
    }

    /// Signals that apply given the caller's input: all non-multiplexed
    /// signals, plus only the multiplexed-value signals matching the
    /// selector's value (if any is present in `signals`, else the
    /// selector's own default).
    pub fn applicable_signals(&self, signals: &HashMap<String, f64>) -> Vec<&Signal> {
        let selector_value = self.selector_value(signals).or_else(|| {
            self.signals
                .iter()
                .find(|s| s.multiplexing == Multiplexing::Selector)
                .map(|s| s.default_value() as u32)
        });
        self.signals
            .iter()
            .filter(|s| match s.multiplexing {
                Multiplexing::None | Multiplexing::Selector => true,
                Multiplexing::Value(v) => Some(v) == selector_value,
            })
            .collect()
    }
}

/// The loaded signal catalog, indexed both by frame id and by message
/// name (encode looks up by name to resolve PGN collisions per
/// DESIGN.md; decode looks up by normalized id).
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    by_id: HashMap<u32, Vec<Message>>,
    by_name: HashMap<String, Message>,
}

impl Catalog {
    pub fn insert(&mut self, message: Message) {
        self.by_name.insert(message.name.clone(), message.clone());
        self.by_id.entry(message.id).or_default().push(message);
    }

    pub fn message_by_name(&self, name: &str) -> Option<&Message> {
        self.by_name.get(name)
    }

    /// All messages sharing a frame id, in insertion order. More than
    /// one entry means the PGN is shared (e.g. UIO/ELoad voltage-out);
    /// the decode path uses the first whose signal set is a superset
    /// match, falling back to the first entry.
    pub fn messages_by_id(&self, id: u32) -> &[Message] {
        self.by_id.get(&id).map(Vec::as_slice).unwrap_or(&[])
    }
}
