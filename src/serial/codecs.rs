/// Delimiter based line framing.
pub mod lines;
