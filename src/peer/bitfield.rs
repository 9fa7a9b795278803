use bytes::Bytes;

/// Which pieces a peer has. Bit 0 is the high bit of the first byte.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bitfield {
    bits: Vec<u8>,
    piece_count: u32,
}

impl Bitfield {
    pub fn new(piece_count: u32) -> Self {
        Self {
            bits: vec![0; Self::byte_len(piece_count)],
            piece_count,
        }
    }

    /// Builds a bitfield from a wire `bitfield` payload. Short payloads are
    /// zero-padded and spare trailing bits are cleared.
    pub fn from_bytes(bytes: &[u8], piece_count: u32) -> Self {
        let mut bits = bytes.to_vec();
        bits.resize(Self::byte_len(piece_count), 0);

        let mut bitfield = Self { bits, piece_count };
        bitfield.clear_spare_bits();
        bitfield
    }

    pub fn full(piece_count: u32) -> Self {
        let mut bitfield = Self {
            bits: vec![0xFF; Self::byte_len(piece_count)],
            piece_count,
        };
        bitfield.clear_spare_bits();
        bitfield
    }

    pub fn has_piece(&self, index: u32) -> bool {
        match self.locate(index) {
            Some((byte, mask)) => self.bits[byte] & mask != 0,
            None => false,
        }
    }

    /// Returns false when `index` is out of range.
    pub fn set_piece(&mut self, index: u32) -> bool {
        match self.locate(index) {
            Some((byte, mask)) => {
                self.bits[byte] |= mask;
                true
            }
            None => false,
        }
    }

    /// Returns false when `index` is out of range.
    pub fn clear_piece(&mut self, index: u32) -> bool {
        match self.locate(index) {
            Some((byte, mask)) => {
                self.bits[byte] &= !mask;
                true
            }
            None => false,
        }
    }

    pub fn count(&self) -> u32 {
        self.bits.iter().map(|b| b.count_ones()).sum()
    }

    pub fn is_complete(&self) -> bool {
        self.count() == self.piece_count
    }

    pub fn is_empty(&self) -> bool {
        self.bits.iter().all(|&b| b == 0)
    }

    pub fn piece_count(&self) -> u32 {
        self.piece_count
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bits
    }

    pub fn to_bytes(&self) -> Bytes {
        Bytes::copy_from_slice(&self.bits)
    }

    fn locate(&self, index: u32) -> Option<(usize, u8)> {
        if index >= self.piece_count {
            return None;
        }
        let index = index as usize;
        Some((index / 8, 0x80 >> (index % 8)))
    }

    fn byte_len(piece_count: u32) -> usize {
        (piece_count as usize).div_ceil(8)
    }

    fn clear_spare_bits(&mut self) {
        let spare = self.bits.len() * 8 - self.piece_count as usize;
        if let Some(last) = self.bits.last_mut() {
            if spare > 0 {
                *last &= 0xFF << spare;
            }
        }
    }
}
