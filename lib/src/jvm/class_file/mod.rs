//! Binary representation of class files
//!
//! Everything here maps directly onto a structure of the class file format and can be written
//! out (and read back in) with [`crate::jvm::Serialize`] and [`crate::jvm::Deserialize`].

mod attribute;
mod class;
mod constants;
mod field;
mod method;
mod version;

pub use attribute::*;
pub use class::*;
pub use constants::*;
pub use field::*;
pub use method::*;
pub use version::*;
