//! BER identifier and length octets
//!
//! The identifier octet layout is:
//! - bits 8-7: tag class
//! - bit 6: constructed flag (0 = primitive, 1 = constructed)
//! - bits 5-1: tag number, with all-ones (0x1F) escaping to multi-byte form
//!   (continuation octets carry 7 bits each, top bit set on all but the last)
//!
//! Length octets are short form (single octet <= 0x7F), long form (top bit
//! set, low bits counting the big-endian length octets that follow), or the
//! bare 0x80 sentinel announcing an indefinite-length value closed by an
//! end-of-content marker.

/// The four BER tag classes, taken from bits 8-7 of the identifier octet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagClass {
    /// 00: types native to ASN.1
    Universal,
    /// 01: application-wide types
    Application,
    /// 10: context-specific types
    Context,
    /// 11: privately defined types
    Private,
}

impl TagClass {
    /// Classify from the top two bits of the identifier octet.
    pub fn from_identifier_octet(octet: u8) -> Self {
        match octet >> 6 {
            0b00 => TagClass::Universal,
            0b01 => TagClass::Application,
            0b10 => TagClass::Context,
            _ => TagClass::Private,
        }
    }

    /// The two class bits, positioned for the identifier octet.
    pub fn as_bits(&self) -> u8 {
        match self {
            TagClass::Universal => 0b00 << 6,
            TagClass::Application => 0b01 << 6,
            TagClass::Context => 0b10 << 6,
            TagClass::Private => 0b11 << 6,
        }
    }
}

/// A decoded BER tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tag {
    /// Tag class
    pub class: TagClass,
    /// True when the value holds nested tag/length/value triples
    pub constructed: bool,
    /// Tag number
    pub number: u32,
}

impl Tag {
    /// Create a primitive tag.
    pub fn primitive(class: TagClass, number: u32) -> Self {
        Self {
            class,
            constructed: false,
            number,
        }
    }

    /// Create a constructed tag.
    pub fn constructed(class: TagClass, number: u32) -> Self {
        Self {
            class,
            constructed: true,
            number,
        }
    }

    /// Append the identifier octets for this tag.
    ///
    /// Numbers below 31 use the single-octet form; larger numbers use the
    /// 0x1F escape followed by base-128 continuation octets.
    pub fn encode_into(&self, out: &mut Vec<u8>) {
        let leading = self.class.as_bits() | if self.constructed { 0x20 } else { 0 };
        if self.number < 0x1F {
            out.push(leading | self.number as u8);
            return;
        }
        out.push(leading | 0x1F);
        // Base-128, big-endian, high bit set on every octet but the last.
        let mut groups = [0u8; 5];
        let mut count = 0;
        let mut rest = self.number;
        loop {
            groups[count] = (rest & 0x7F) as u8;
            count += 1;
            rest >>= 7;
            if rest == 0 {
                break;
            }
        }
        for i in (1..count).rev() {
            out.push(groups[i] | 0x80);
        }
        out.push(groups[0]);
    }
}

/// A decoded BER length.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Length {
    /// The value occupies exactly this many bytes
    Definite(u32),
    /// The value runs until an end-of-content marker
    Indefinite,
}

impl Length {
    /// True for the indefinite-length sentinel.
    pub fn is_indefinite(&self) -> bool {
        matches!(self, Length::Indefinite)
    }

    /// The definite byte count, if known.
    pub fn definite(&self) -> Option<u32> {
        match self {
            Length::Definite(n) => Some(*n),
            Length::Indefinite => None,
        }
    }

    /// Append the length octets for this length.
    ///
    /// Definite lengths use the shortest form; indefinite is the bare 0x80.
    pub fn encode_into(&self, out: &mut Vec<u8>) {
        match self {
            Length::Indefinite => out.push(0x80),
            Length::Definite(n) if *n <= 0x7F => out.push(*n as u8),
            Length::Definite(n) => {
                let bytes = n.to_be_bytes();
                let skip = bytes.iter().take_while(|b| **b == 0).count();
                out.push(0x80 | (bytes.len() - skip) as u8);
                out.extend_from_slice(&bytes[skip..]);
            }
        }
    }
}
