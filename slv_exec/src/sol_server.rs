//! # Solution Server
//!
//! Publishes the solutions of the solver loop on the output channel.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use std::sync::{Mutex, PoisonError};
use log::warn;

use comms_if::{
    net::{zmq, MonitoredSocket, MonitoredSocketError, SocketOptions},
    slv::SolutionMsg
};

use crate::output::SolutionSink;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

pub struct SolServer {
    socket: Mutex<MonitoredSocket>
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum SolServerError {
    #[error("Socket error: {0}")]
    SocketError(MonitoredSocketError),

    #[error("Could not send the solution: {0}")]
    SendError(zmq::Error),

    #[error("Could not serialize the solution: {0}")]
    SerializationError(serde_json::Error),
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl SolServer {
    /// Create a new instance of the solution server.
    ///
    /// This function will not block until a subscriber connects.
    pub fn new(ctx: &zmq::Context, endpoint: &str) -> Result<Self, SolServerError> {
        let socket_options = SocketOptions {
            bind: true,
            connect_timeout: 1000,
            heartbeat_ivl: 500,
            heartbeat_ttl: 1000,
            heartbeat_timeout: 1000,
            linger: 1,
            recv_timeout: 10,
            send_timeout: 10,
            ..Default::default()
        };

        let socket = MonitoredSocket::new(
            ctx,
            zmq::PUB,
            socket_options,
            endpoint
        ).map_err(SolServerError::SocketError)?;

        Ok(Self {
            socket: Mutex::new(socket)
        })
    }

    pub fn send(&self, sol: &SolutionMsg) -> Result<(), SolServerError> {
        let sol_string = serde_json::to_string(sol)
            .map_err(SolServerError::SerializationError)?;

        self.socket.lock()
            .unwrap_or_else(PoisonError::into_inner)
            .send(&sol_string, 0)
            .map_err(SolServerError::SendError)
    }
}

impl SolutionSink for SolServer {
    fn publish(&self, sol: &SolutionMsg) {
        if let Err(e) = self.send(sol) {
            warn!("Could not publish solution: {}", e);
        }
    }
}
