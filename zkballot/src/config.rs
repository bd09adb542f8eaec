use crate::*;

/// Ballot width used when the embedding caller does not configure one.
pub const DEFAULT_OPTIONS: usize = 7;

/// Election-wide parameters, fixed at setup and shared by every phase.
///
/// Constructed once at the program entry point and passed by reference;
/// phases never consult global state for these.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ElectionConfig {
    /// Depth of the census Merkle tree; capacity is `2^tree_depth` voters.
    pub tree_depth: usize,

    /// Length of the session id in bits.
    pub eid_bits: usize,

    /// Number of ballot options; ballots are one-hot vectors of this width.
    pub options: usize,
}

impl ElectionConfig {
    pub fn new(tree_depth: usize, eid_bits: usize, options: usize) -> Result<Self, Error> {
        if tree_depth == 0 || tree_depth > 24 {
            return Err(Error::Config("tree depth must be between 1 and 24"));
        }
        if eid_bits == 0 || eid_bits > MAX_EID_BITS {
            return Err(Error::Config("unsupported session id length"));
        }
        if options < 2 {
            return Err(Error::Config("an election needs at least two options"));
        }
        Ok(ElectionConfig {
            tree_depth,
            eid_bits,
            options,
        })
    }

    /// Number of registered voters the census tree holds; exact, not a maximum.
    pub fn participants(&self) -> usize {
        1 << self.tree_depth
    }

    /// Length of the full primary input: ballot, eid bits, serial number, root.
    pub fn primary_input_len(&self) -> usize {
        self.options + self.eid_bits + 2
    }

    /// Offset of the session id block inside the primary input.
    pub fn eid_offset(&self) -> usize {
        self.options
    }

    /// Offset of the serial number inside the primary input.
    pub fn sn_offset(&self) -> usize {
        self.options + self.eid_bits
    }

    /// Offset of the census root inside the primary input.
    pub fn rt_offset(&self) -> usize {
        self.sn_offset() + 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_degenerate_parameters() {
        assert!(ElectionConfig::new(0, 64, 7).is_err());
        assert!(ElectionConfig::new(2, 0, 7).is_err());
        assert!(ElectionConfig::new(2, 64, 1).is_err());
        assert!(ElectionConfig::new(2, MAX_EID_BITS + 1, 7).is_err());
    }

    #[test]
    fn offsets_partition_the_primary_input() {
        let config = ElectionConfig::new(2, 64, 7).unwrap();
        assert_eq!(config.participants(), 4);
        assert_eq!(config.eid_offset(), 7);
        assert_eq!(config.sn_offset(), 71);
        assert_eq!(config.rt_offset(), 72);
        assert_eq!(config.primary_input_len(), 73);
    }
}
