//! esmgen
//!
//! Command-line workflow around the ESM3 client: load the model, complete a
//! seed sequence, predict its structure, and write a PDB file.
pub mod cli;
pub mod commands;
