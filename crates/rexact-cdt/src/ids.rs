//! Stable index handles into [`crate::Arrangement`]'s pools.
//!
//! The source's `SymEdge` is a cyclic pointer graph (`next`/`rot` pointing
//! back into the same pool); per the design notes this maps to an arena of
//! `Vec<T>` plus 32-bit index handles, so growing a pool never invalidates a
//! cross-reference the way reallocating a `Vec<SymEdge>` storing the structs
//! inline would.

use core::fmt;

macro_rules! id_type {
    ($name:ident) => {
        #[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(pub u32);

        impl $name {
            pub const INVALID: Self = $name(u32::MAX);

            #[inline]
            pub fn is_valid(self) -> bool {
                self != Self::INVALID
            }

            #[inline]
            pub fn to_usize(self) -> usize {
                self.0 as usize
            }

            #[inline]
            pub fn from_usize(v: usize) -> Self {
                $name(v as u32)
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
                if self.is_valid() {
                    write!(f, concat!(stringify!($name), "#{}"), self.0)
                } else {
                    write!(f, concat!(stringify!($name), "#INVALID"))
                }
            }
        }
    };
}

id_type!(SymEdgeId);
id_type!(CdtVertId);
id_type!(CdtEdgeId);
id_type!(CdtFaceId);
