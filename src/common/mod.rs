pub mod encoding;
pub mod io;

pub use encoding::Encoding;
