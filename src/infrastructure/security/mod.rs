pub mod filename;
pub mod keyring;

pub use filename::sanitize_filename;
