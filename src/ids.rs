//! Dense integer handles standing in for the shared/weak pointer graph of
//! the original implementation (spec §9 "Cyclic references"). Every
//! collection in `Platform` is indexed by one of these; back-edges are
//! plain id lookups, never ownership.

use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! dense_id {
    ($name:ident) => {
        #[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        pub struct $name(pub u32);

        impl $name {
            pub fn index(self) -> usize {
                self.0 as usize
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self.0)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

dense_id!(ProcessorTypeId);
dense_id!(ClockDomainId);
dense_id!(PowerDomainId);
dense_id!(ProcessorId);
dense_id!(TaskId);
dense_id!(ServerId);
dense_id!(ClusterId);
