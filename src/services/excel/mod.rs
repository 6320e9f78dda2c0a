pub mod loader;
pub mod preview;
pub mod utils;
pub mod writer;

pub use loader::ExcelLoader;
pub use preview::preview;
pub use writer::ExcelWriter;
