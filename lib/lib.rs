//! Tools for simulating noisy quantum circuits on registers of qubits and
//! general qudits.
//!
//! Channels are modeled as [`Operation`][operation::Operation]s holding
//! either a Kraus operator stack or a Pauli transfer matrix (PTM), with
//! conversion between operator bases handled by [`algebra`] over the
//! [`bases::PauliBasis`] family. Operations can be composed, pruned to the
//! smallest sufficient subbases, and compiled into dense numeric kernels,
//! which the [`state`] backend applies to a flat Pauli-vector density
//! matrix.

pub mod error;
pub mod bases;
pub mod algebra;
pub mod operation;
pub mod qubits;
pub mod state;

pub use error::{ Error, Result };
