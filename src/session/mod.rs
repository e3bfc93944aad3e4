// ABOUTME: SMSC session contract consumed by the dispatch core
// ABOUTME: Exports the session trait, its value types and the session error type

//! Session module
//!
//! The dispatch core never speaks SMPP on the wire itself. It drives an
//! [`SmscSession`] implementation:
//!
//! * **Submits** - [`SmscSession::submit`] sends one [`SubmitUnit`] and returns
//!   the command_status plus the SMSC message id used for receipt correlation.
//! * **Events** - received deliver_sm PDUs and connectivity changes arrive as
//!   [`SessionEvent`] values on an mpsc channel handed over at start.
//! * **Health** - [`SmscSession::endpoints`] exposes per-endpoint connectivity
//!   for the periodic status sampler.

pub mod error;
pub mod loopback;
pub mod traits;
pub mod types;

pub use error::{SmppError, SmppResult};
pub use loopback::LoopbackSession;
pub use traits::SmscSession;
pub use types::{EndpointState, SessionEvent, SubmitOutcome, SubmitUnit};
