//! Canonical 64-bit keys for quartet topologies.
//!
//! # Overview
//! A quartet is an unordered set of four distinct taxa `{a, b, c, d}`. An
//! unrooted tree displays exactly one of three topologies on it. With the
//! taxa sorted as `s0 < s1 < s2 < s3`, the three topologies are named by
//! how the two cherries sit in that order:
//!
//! ```text
//! Separated   s0 s1 | s2 s3     tag 0
//! Crossing    s0 s2 | s1 s3     tag 1
//! Nested      s0 s3 | s1 s2     tag 2
//! ```
//!
//! # Key layout
//! The four taxa are stored in descending order in four 15-bit slots, the
//! largest in the most significant slot, followed by the topology tag:
//!
//! ```text
//! bit 63   49       34       19        4     0
//!     | t1 | t2     | t3     | t4     |  tag |
//! ```
//!
//! Taxon ids must be below 2^15. Larger ids overflow into the neighbouring
//! slot; this is a precondition of [`pack`] and is not checked here.

/// Index of a taxon, shared between the reference tree and the lookup tables.
pub type TaxonId = usize;

/// Bits per taxon slot in a packed key.
pub const TAXON_BITS: u32 = 15;

/// Largest number of taxa a packed key can address.
pub const MAX_TAXA: usize = (1 << TAXON_BITS) - 1;

const SLOT_MASK: u64 = (1 << TAXON_BITS) - 1;
const SLOT_SHIFTS: [u32; 4] = [49, 34, 19, 4];
const TAG_MASK: u64 = 0b11;

/// One of the three unrooted topologies of a quartet, named by the position
/// of its cherries in the sorted taxon order.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub enum Topology {
    Separated = 0,
    Crossing = 1,
    Nested = 2,
}

impl Topology {
    pub const ALL: [Topology; 3] = [Topology::Separated, Topology::Crossing, Topology::Nested];

    /// Classify the topology `ab|cd` purely from the order of the four ids.
    ///
    /// # Panics
    /// Panics if the comparisons describe both a separated and a nested
    /// arrangement. This cannot happen for distinct ids and signals a bug.
    pub fn classify(a: TaxonId, b: TaxonId, c: TaxonId, d: TaxonId) -> Topology {
        let ac = a < c;
        let ad = a < d;
        let bc = b < c;
        let bd = b < d;

        // {a,b} entirely below or entirely above {c,d}
        let separated = (ac && ad && bc && bd) || (!ac && !ad && !bc && !bd);
        // one cherry strictly inside the other
        let ab_in_cd = (!ac && ad && !bc && bd) || (ac && !ad && bc && !bd);
        let cd_in_ab = (ac && !bc && ad && !bd) || (!ac && bc && !ad && bd);
        let nested = ab_in_cd || cd_in_ab;

        match (separated, nested) {
            (true, false) => Topology::Separated,
            (false, false) => Topology::Crossing,
            (false, true) => Topology::Nested,
            (true, true) => panic!(
                "quartet topology {a}{b}|{c}{d} classified as both separated and nested"
            ),
        }
    }

    /// The tag stored in the low bits of a packed key.
    #[inline]
    pub fn tag(self) -> usize {
        self as usize
    }

    pub fn from_tag(tag: u64) -> Option<Topology> {
        match tag {
            0 => Some(Topology::Separated),
            1 => Some(Topology::Crossing),
            2 => Some(Topology::Nested),
            _ => None,
        }
    }

    /// The topology written as `(x, y, z, w)` meaning `xy|zw`, given the
    /// taxon set sorted ascending. The pair holding the smallest taxon
    /// comes first and each pair is ascending.
    pub fn arrange(self, sorted: [TaxonId; 4]) -> [TaxonId; 4] {
        let [s0, s1, s2, s3] = sorted;
        match self {
            Topology::Separated => [s0, s1, s2, s3],
            Topology::Crossing => [s0, s2, s1, s3],
            Topology::Nested => [s0, s3, s1, s2],
        }
    }
}

/// Sort four distinct ids in descending order.
///
/// Sorts the pairs `(a, b)` and `(c, d)` individually, then merges them:
/// the outer extremes come from one comparison each, the two middle values
/// need a third.
#[inline]
pub fn descending(a: TaxonId, b: TaxonId, c: TaxonId, d: TaxonId) -> [TaxonId; 4] {
    let (low1, high1) = if a < b { (a, b) } else { (b, a) };
    let (low2, high2) = if c < d { (c, d) } else { (d, c) };

    let (smallest, middle1) = if low1 < low2 { (low1, low2) } else { (low2, low1) };
    let (largest, middle2) = if high1 > high2 { (high1, high2) } else { (high2, high1) };
    let (third, second) = if middle1 < middle2 { (middle1, middle2) } else { (middle2, middle1) };

    [largest, second, third, smallest]
}

/// Pack the topology `ab|cd` into its canonical key.
///
/// Any presentation of the same topology (swapping within a cherry or
/// swapping the cherries) yields the same key.
pub fn pack(a: TaxonId, b: TaxonId, c: TaxonId, d: TaxonId) -> u64 {
    let slots = descending(a, b, c, d);
    let topology = Topology::classify(a, b, c, d);

    let mut key = 0u64;
    for (taxon, shift) in slots.iter().zip(SLOT_SHIFTS) {
        key += (*taxon as u64) << shift;
    }
    key + topology.tag() as u64
}

/// Recover the four taxa of a key, largest first.
///
/// The original argument order of [`pack`] is not recoverable.
pub fn unpack(key: u64) -> [TaxonId; 4] {
    SLOT_SHIFTS.map(|shift| ((key >> shift) & SLOT_MASK) as TaxonId)
}

/// Topology stored in a key.
pub fn topology_of(key: u64) -> Topology {
    match Topology::from_tag(key & TAG_MASK) {
        Some(topology) => topology,
        None => panic!("packed quartet key {key:#x} carries invalid topology tag"),
    }
}
