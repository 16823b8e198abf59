//! Storage proofs
//!
//! Lets a node check that a remote peer still holds the exact bytes of a
//! block without downloading it again.

pub mod evidence;
mod ledger;

pub use evidence::{Evidence, EvidencePair};
pub use ledger::{answer_challenge, BlockRecord, ProofError, ProofLedger};
