pub mod columns;
pub mod error;
pub mod series;
pub mod traits;
pub mod types;

pub use error::*;
pub use series::*;
pub use traits::*;
pub use types::*;
