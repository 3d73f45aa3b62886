pub mod batch;
pub mod cursor;
pub mod finding;
pub mod session;

pub use batch::*;
pub use cursor::*;
pub use finding::*;
pub use session::*;
