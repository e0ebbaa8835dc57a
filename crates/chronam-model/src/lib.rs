pub mod corpus;
pub mod format;
pub mod page;

pub use corpus::*;
pub use format::*;
pub use page::*;
