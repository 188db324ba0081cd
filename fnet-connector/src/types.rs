//! Identifier and key types shared by the connector modules

use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! id_type {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub i64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

id_type!(
    /// Row id of a conduit
    ConduitId
);
id_type!(
    /// Row id of a tube record
    TubeId
);
id_type!(
    /// Row id of a node (real or virtual)
    NodeId
);
id_type!(
    /// Row id of a connection status
    StatusId
);
id_type!(
    /// Row id of a conduit subtype (governs tube layout and colors)
    SubtypeId
);

/// Which of the two conduits of a pairing session a tube belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Left,
    Right,
}

impl Side {
    pub const BOTH: [Side; 2] = [Side::Left, Side::Right];

    pub fn index(self) -> usize {
        match self {
            Side::Left => 0,
            Side::Right => 1,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Left => write!(f, "left"),
            Side::Right => write!(f, "right"),
        }
    }
}

/// Order-independent key for a pair of ids
///
/// `low <= high` always holds, so clicking A then B yields the same key as
/// clicking B then A.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OrderedPair<T> {
    pub low: T,
    pub high: T,
}

impl<T: Ord + Copy> OrderedPair<T> {
    pub fn new(a: T, b: T) -> Self {
        if a <= b {
            Self { low: a, high: b }
        } else {
            Self { low: b, high: a }
        }
    }
}

/// Key of a tube-to-tube connection
pub type PairKey = OrderedPair<TubeId>;

/// Key of the conduit-level aggregate
pub type ConduitPairKey = OrderedPair<ConduitId>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ordered_pair_is_click_order_independent() {
        let ab = PairKey::new(TubeId(7), TubeId(3));
        let ba = PairKey::new(TubeId(3), TubeId(7));
        assert_eq!(ab, ba);
        assert_eq!(ab.low, TubeId(3));
        assert_eq!(ab.high, TubeId(7));
    }
}
