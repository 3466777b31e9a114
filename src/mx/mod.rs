//! DNS side of a visit: MX resolution and host address lookup.
//!
//! [`MxFinder`] is the capability the analyzer depends on; [`DnsMxFinder`]
//! implements it on top of the system resolver.

mod error;
mod finder;
mod resolver;
mod types;

pub use error::MxError as Error;
pub use finder::{DnsMxFinder, DnsOptions, MxFinder};
pub use types::{MxLookupFailure, MxLookupResult, MxRecord};
