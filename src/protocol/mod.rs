//! Scale wire protocol: frame codecs, identifier tables, name grammar
//! and the aggregator decoder.

pub mod aggregator;
pub mod characteristics;
pub mod fields;
pub mod frame;
pub mod name;
