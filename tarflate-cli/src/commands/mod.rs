//! Command implementations for Tarflate CLI.

pub mod compress;
pub mod expand;
pub mod list;
pub mod test;

pub use compress::cmd_compress;
pub use expand::cmd_expand;
pub use list::{ListOptions, cmd_list};
pub use test::cmd_test;
