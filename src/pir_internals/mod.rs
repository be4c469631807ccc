pub mod branch_opt_util;
pub mod error;
pub mod expand;
pub mod indexing;
pub mod packing;
pub mod params;
pub mod serialization;
