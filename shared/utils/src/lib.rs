pub mod amounts;
pub mod checksum;
pub mod currency;
pub mod dates;
pub mod validation;

pub use amounts::*;
pub use checksum::*;
pub use currency::*;
pub use dates::*;
pub use validation::*;
