//! Splitting normalized HL7 text into segments and fields.
//!
//! Field numbering follows HL7: `field(0)` is the segment name and `field(n)` is `SEG-n`.
//! For MSH, `field(1)` is the field separator itself and `field(2)` the encoding characters, so
//! `MSH-7` is `field(7)` like every other segment.

use crate::validation::RawMessage;

/// Separator characters declared by a message's MSH segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Delimiters {
    pub field: char,
    pub component: char,
    pub repetition: char,
    pub escape: char,
    pub subcomponent: char,
}

impl Default for Delimiters {
    fn default() -> Self {
        Self {
            field: '|',
            component: '^',
            repetition: '~',
            escape: '\\',
            subcomponent: '&',
        }
    }
}

impl Delimiters {
    /// Reads separators from an MSH line: the character after `MSH` is the field separator and
    /// the following run up to the next field separator holds the encoding characters.
    ///
    /// Anything missing falls back to the standard `|^~\&`.
    pub fn from_header(msh_line: &str) -> Self {
        let defaults = Self::default();
        let mut chars = msh_line.chars().skip(3);

        let Some(field) = chars.next() else {
            return defaults;
        };

        let encoding: Vec<char> = chars.take_while(|c| *c != field).collect();
        Self {
            field,
            component: encoding.first().copied().unwrap_or(defaults.component),
            repetition: encoding.get(1).copied().unwrap_or(defaults.repetition),
            escape: encoding.get(2).copied().unwrap_or(defaults.escape),
            subcomponent: encoding.get(3).copied().unwrap_or(defaults.subcomponent),
        }
    }
}

/// One HL7 segment, split into positional fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    fields: Vec<String>,
    delimiters: Delimiters,
}

impl Segment {
    /// Splits one segment line on the field separator.
    pub fn parse(line: &str, delimiters: Delimiters) -> Self {
        let mut fields: Vec<String> = line
            .split(delimiters.field)
            .map(str::to_string)
            .collect();

        if fields.first().map(|name| name.trim()) == Some("MSH") {
            fields.insert(1, delimiters.field.to_string());
        }

        Self { fields, delimiters }
    }

    /// Segment type, e.g. `OBX`.
    pub fn name(&self) -> &str {
        self.fields.first().map(|s| s.trim()).unwrap_or("")
    }

    /// Raw field `n`, or `""` when the segment is shorter.
    pub fn field(&self, n: usize) -> &str {
        self.fields.get(n).map(String::as_str).unwrap_or("")
    }

    /// Repetitions of field `n`, split on `~`.
    pub fn repetitions(&self, n: usize) -> Vec<&str> {
        self.field(n).split(self.delimiters.repetition).collect()
    }

    /// Components of `value`, split on `^`.
    pub fn components<'a>(&self, value: &'a str) -> Vec<&'a str> {
        value.split(self.delimiters.component).collect()
    }

    /// Component `c` (1-based) of the first repetition of field `n`, or `""`.
    pub fn component(&self, n: usize, c: usize) -> &str {
        let first = self
            .field(n)
            .split(self.delimiters.repetition)
            .next()
            .unwrap_or("");
        first
            .split(self.delimiters.component)
            .nth(c.saturating_sub(1))
            .unwrap_or("")
    }

    /// Every atomic value in field `n` after splitting on all separators. Empty pieces are
    /// dropped.
    pub fn flattened(&self, n: usize) -> Vec<&str> {
        let d = self.delimiters;
        self.field(n)
            .split(|c| c == d.repetition || c == d.component || c == d.subcomponent)
            .filter(|s| !s.trim().is_empty())
            .collect()
    }
}

/// A message split into segments, in wire order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentedMessage {
    segments: Vec<Segment>,
}

impl SegmentedMessage {
    /// Splits a validated message on `\r`. Blank lines are skipped.
    pub fn split(raw: &RawMessage) -> Self {
        let text = raw.as_str();
        let delimiters = text
            .split('\r')
            .next()
            .map(Delimiters::from_header)
            .unwrap_or_default();

        let segments = text
            .split('\r')
            .filter(|line| !line.trim().is_empty())
            .map(|line| Segment::parse(line, delimiters))
            .collect();

        Self { segments }
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// First segment named `name`.
    pub fn first(&self, name: &str) -> Option<&Segment> {
        self.segments.iter().find(|s| s.name() == name)
    }
}
