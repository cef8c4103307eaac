pub mod list;
pub mod show;
pub mod validate;

pub use list::run as list;
pub use show::run as show;
pub use validate::run as validate;
