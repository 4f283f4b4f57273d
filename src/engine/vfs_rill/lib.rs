mod path;
pub use path::*;

mod mount;
pub use mount::*;
