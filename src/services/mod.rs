pub mod cleaner;
pub mod db_loader;
pub mod excel;
pub mod pipeline;
