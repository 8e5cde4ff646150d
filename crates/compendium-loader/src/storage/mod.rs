pub mod filesystem;

pub use filesystem::{remove_dir_if_exists, remove_file_if_exists, MoveOutcome, PayloadStore};
