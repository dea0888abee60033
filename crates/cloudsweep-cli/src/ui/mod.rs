//! Terminal output: the progress board and the result tables.

pub mod board;
pub mod prompt;
pub mod table;

pub use board::{Board, Warning};
