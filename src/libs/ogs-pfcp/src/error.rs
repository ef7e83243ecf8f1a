//! PFCP Error Types
//!
//! One taxonomy covers the wire codec, the transaction manager and the node
//! registry. None of these are fatal to the process; every failure is scoped
//! to the one datagram, transaction or session being handled.

use std::io;
use std::net::SocketAddr;

use thiserror::Error;

/// PFCP Error type
#[derive(Debug, Error)]
pub enum PfcpError {
    /// Datagram too short for the header it declares
    #[error("Malformed header: needed {needed} bytes, available {available}")]
    MalformedHeader { needed: usize, available: usize },

    /// Peer speaks a PFCP version other than ours
    #[error("PFCP version not supported: {0}")]
    UnsupportedVersion(u8),

    /// Sequence namespace, transaction table or session table is full
    #[error("Resource exhausted: {0}")]
    ResourceExhausted(&'static str),

    /// Body builder produced no payload
    #[error("Build failed: {0}")]
    BuildFailed(&'static str),

    /// Response whose sequence number matches no outstanding request
    #[error("Stray response from {addr}: type {message_type} sqn {sequence_number}")]
    StrayResponse {
        addr: SocketAddr,
        message_type: u8,
        sequence_number: u32,
    },

    /// Socket send failed, the transaction stays uncommitted
    #[error("Transmit error: {0}")]
    TransmitError(#[from] io::Error),

    /// Operation not allowed in the transaction's current state
    #[error("Invalid state: {0}")]
    InvalidState(&'static str),

    /// Retransmissions exhausted
    #[error("Transaction timeout: type {message_type} sqn {sequence_number}")]
    TransactionTimeout { message_type: u8, sequence_number: u32 },

    /// No transaction with this handle
    #[error("Transaction not found")]
    XactNotFound,

    /// No node registered for this address
    #[error("Node not found: {0}")]
    NodeNotFound(SocketAddr),

    /// Buffer too short while reading an IE
    #[error("Buffer too short: needed {needed} bytes, available {available}")]
    BufferTooShort { needed: usize, available: usize },

    #[error("Invalid IE type: {0}")]
    InvalidIeType(u16),

    #[error("Decoding error: {0}")]
    DecodingError(String),

    #[error("Missing mandatory IE: {0}")]
    MissingMandatoryIe(&'static str),
}

/// PFCP Result type
pub type PfcpResult<T> = Result<T, PfcpError>;
