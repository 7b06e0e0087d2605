//! Define [`Nibbles`] and how to convert bytes, hex prefix encodings and
//! strings into nibbles.
use std::{
    fmt::{self, Debug, Display, LowerHex},
    str::FromStr,
};

use bytes::{BufMut, Bytes, BytesMut};
use thiserror::Error;

// Use a whole byte for a Nibble just for convenience
/// A Nibble has 4 bits and is stored as `u8`.
pub type Nibble = u8;

#[derive(Clone, Debug, Eq, Error, PartialEq, Hash)]
/// Errors encountered when converting from `Bytes` to `Nibbles`.
pub enum BytesToNibblesError {
    #[error("Tried constructing `Nibbles` from a zero byte slice")]
    /// The size is zero.
    ZeroSizedKey,
}

#[derive(Clone, Debug, Eq, Error, PartialEq, Hash)]
/// Errors encountered when converting to hex prefix encoding to nibbles.
pub enum FromHexPrefixError {
    #[error("Tried to convert a hex prefix byte string into `Nibbles` with invalid flags at the start: {0:#04b}")]
    /// The hex prefix encoding flag is invalid.
    InvalidFlags(Nibble),

    #[error("Hex prefix encoding of an even path has a non-zero padding nibble: {0:#x}")]
    /// The padding nibble of an even length path is not zero.
    InvalidPadding(Nibble),

    #[error("Tried to convert an empty hex prefix byte string into `Nibbles`")]
    /// There is not even a flag byte.
    Empty,
}

/// Errors when parsing a hex string into [`Nibbles`].
#[derive(Clone, Debug, Eq, Error, PartialEq, Hash)]
#[error("Invalid hex character {0:?} in nibble string")]
pub struct StrToNibblesError(pub char);

#[derive(Clone, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
/// A sequence of nibbles which is used as the key type into
/// [`MerklePatriciaTrie`][`crate::trie::MerklePatriciaTrie`].
///
/// Keys handed to the trie are byte strings, so a key always starts out with
/// an even number of nibbles. Odd lengths only show up for the partial paths
/// stored inside `Leaf` and `Extension` nodes.
///
/// Leading `0` nibbles are part of a key:
/// ```rust
/// # use mpt_trie::nibbles::Nibbles;
/// # use std::str::FromStr;
/// let n1 = Nibbles::from_str("0x123").unwrap();
/// let n2 = Nibbles::from_str("0x0123").unwrap();
///
/// assert_ne!(n1, n2); // These are different keys
/// ```
pub struct Nibbles {
    nibbles: Vec<Nibble>,
}

impl Display for Nibbles {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // By default, just use lower hex.
        <Self as LowerHex>::fmt(self, f)
    }
}

impl Debug for Nibbles {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Nibbles")
            .field("count", &self.count())
            .field("nibbles", &format!("{self:x}"))
            .finish()
    }
}

impl LowerHex for Nibbles {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x")?;
        for nib in self.nibbles.iter() {
            write!(f, "{:x}", nib)?;
        }

        Ok(())
    }
}

impl FromStr for Nibbles {
    type Err = StrToNibblesError;

    /// Parses a hex string with or without a preceding "0x". Every character
    /// becomes one nibble, so leading zeros are kept.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let stripped_str = s.strip_prefix("0x").unwrap_or(s);

        let nibbles = stripped_str
            .chars()
            .map(|c| {
                c.to_digit(16)
                    .map(|d| d as Nibble)
                    .ok_or(StrToNibblesError(c))
            })
            .collect::<Result<_, _>>()?;

        Ok(Self { nibbles })
    }
}

impl Nibbles {
    /// Creates `Nibbles` from big endian bytes.
    ///
    /// Returns an error if the byte slice is empty.
    pub fn from_bytes_be(bytes: &[u8]) -> Result<Self, BytesToNibblesError> {
        if bytes.is_empty() {
            return Err(BytesToNibblesError::ZeroSizedKey);
        }

        let nibbles = bytes.iter().flat_map(|b| [b >> 4, b & 0x0f]).collect();

        Ok(Self { nibbles })
    }

    /// The number of nibbles in this sequence.
    pub fn count(&self) -> usize {
        self.nibbles.len()
    }

    /// Returns `true` if there are no nibbles left.
    pub fn is_empty(&self) -> bool {
        self.nibbles.is_empty()
    }

    /// The nibbles as a slice, front first.
    pub fn as_slice(&self) -> &[Nibble] {
        &self.nibbles
    }

    /// Pops the nibble at the front (the next nibble).
    ///
    /// # Panics
    /// Panics if there are no nibbles left.
    pub fn pop_next_nibble_front(&mut self) -> Nibble {
        self.nibbles.remove(0)
    }

    /// Gets the next `n` proceeding nibbles without mutating.
    pub fn get_next_nibbles(&self, n: usize) -> Nibbles {
        Self {
            nibbles: self.nibbles[..n.min(self.count())].to_vec(),
        }
    }

    /// Drops the next `n` proceeding nibbles without mutation. Truncating more
    /// nibbles than exist yields empty `Nibbles`.
    pub fn truncate_n_nibbles_front(&self, n: usize) -> Nibbles {
        Self {
            nibbles: self.nibbles[n.min(self.count())..].to_vec(),
        }
    }

    /// Drops the next `n` proceeding nibbles in place.
    pub fn truncate_n_nibbles_front_mut(&mut self, n: usize) {
        self.nibbles.drain(..n.min(self.count()));
    }

    /// Returns `true` if `prefix` is a prefix of `self`.
    pub fn starts_with(&self, prefix: &Nibbles) -> bool {
        self.nibbles.starts_with(&prefix.nibbles)
    }

    /// Finds the nibble idx that differs between two nibbles. If there is no
    /// difference up to the shorter of the two, returns its length.
    pub fn find_nibble_idx_that_differs_between_nibbles_different_lengths(
        n1: &Nibbles,
        n2: &Nibbles,
    ) -> usize {
        n1.nibbles
            .iter()
            .zip(n2.nibbles.iter())
            .position(|(a, b)| a != b)
            .unwrap_or_else(|| n1.count().min(n2.count()))
    }

    /// Converts [`Nibbles`] to hex-prefix encoding (AKA "compact").
    /// The first nibble of the output carries two flags: whether the path has
    /// an odd length and whether it belongs to a leaf (terminator).
    pub fn to_hex_prefix_encoding(&self, is_leaf: bool) -> Bytes {
        let odd_bit = (self.count() % 2) as u8;
        let term_bit = is_leaf as u8;
        let flags: u8 = (odd_bit | (term_bit << 1)) << 4;

        let mut bytes = BytesMut::with_capacity(self.count() / 2 + 1);
        let rest = match odd_bit {
            1 => {
                bytes.put_u8(flags | self.nibbles[0]);
                &self.nibbles[1..]
            }
            _ => {
                bytes.put_u8(flags);
                &self.nibbles[..]
            }
        };

        for pair in rest.chunks(2) {
            bytes.put_u8((pair[0] << 4) | pair[1]);
        }

        bytes.freeze()
    }

    /// Converts a hex prefix byte string (AKA "compact") into `Nibbles`, also
    /// returning whether the terminator (leaf) flag was set.
    pub fn from_hex_prefix_encoding(
        hex_prefix_bytes: &[u8],
    ) -> Result<(Self, bool), FromHexPrefixError> {
        let first = *hex_prefix_bytes.first().ok_or(FromHexPrefixError::Empty)?;
        let flag_bits = first >> 4;

        // is_odd --> 0b01
        // is_leaf --> 0b10
        let (is_leaf, is_odd) = match flag_bits {
            0b00 => (false, false),
            0b01 => (false, true),
            0b10 => (true, false),
            0b11 => (true, true),
            _ => return Err(FromHexPrefixError::InvalidFlags(flag_bits)),
        };

        let mut nibbles = Vec::with_capacity(hex_prefix_bytes.len() * 2);
        match is_odd {
            true => nibbles.push(first & 0x0f),
            false if first & 0x0f != 0 => {
                return Err(FromHexPrefixError::InvalidPadding(first & 0x0f))
            }
            false => (),
        }

        nibbles.extend(
            hex_prefix_bytes[1..]
                .iter()
                .flat_map(|b| [b >> 4, b & 0x0f]),
        );

        Ok((Self { nibbles }, is_leaf))
    }
}
