//! Network-facing collaborators
//!
//! Message types for storage peers, the transport seam the orchestrator
//! sends them through, and the upload debounce.

pub mod protocol;
pub mod transport;
pub mod trigger;

pub use protocol::{EvidenceKind, EvidenceMessage, PeerMessage, PeerReply};
pub use transport::{audit_block, AuditOutcome, PeerTransport, TransportError};
pub use trigger::UploadTrigger;
