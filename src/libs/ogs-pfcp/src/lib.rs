//! NextGCore PFCP Protocol Library
//!
//! PFCP (Packet Forwarding Control Protocol, 3GPP TS 29.244) machinery
//! shared by the control and user plane functions:
//!
//! - header encoding/decoding and the Version Not Supported reply
//! - generic IE framing and node-level message bodies
//! - the peer node registry with association and heartbeat timers
//! - the transaction manager (sequence allocation, retransmission,
//!   response matching, duplicate request handling)
//!
//! # Example
//!
//! ```rust
//! use ogs_pfcp::header::{build_message, PfcpHeader, PfcpMessageType};
//!
//! let h = PfcpHeader::new_with_seid(PfcpMessageType::SessionReportRequest, 42, 7);
//! let buf = build_message(&h, &[]);
//! assert_eq!(buf.len(), 16);
//! ```

pub mod context;
pub mod error;
pub mod header;
pub mod ie;
pub mod message;
pub mod node;
pub mod path;
pub mod types;
pub mod xact;

#[cfg(test)]
mod property_tests;

pub use context::{PfcpContext, PfcpTimer};
pub use error::{PfcpError, PfcpResult};
pub use header::{
    build_message, check_version, peek_sequence_number, version_not_supported_response,
    PfcpHeader, PfcpMessageType,
    PFCP_HEADER_LEN, PFCP_HEADER_LEN_WITH_SEID,
};
pub use node::{NodeRegistry, NodeTimer, PfcpNode, PfcpState};
pub use path::PfcpSend;
pub use types::{PFCP_UDP_PORT, PFCP_VERSION};
pub use xact::{RequestDisposition, XactConfig, XactId, XactManager, XactTimeout};
