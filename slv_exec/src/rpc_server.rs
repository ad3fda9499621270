//! # RPC Server
//!
//! Serves the solver's control protocol. Requests and replies are bottles sent as JSON arrays.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use comms_if::{
    net::{zmq, MonitoredSocket, SocketOptions, MonitoredSocketError},
    slv::{Reply, Value}
};

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Control protocol server
pub struct RpcServer {
    socket: MonitoredSocket
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum RpcServerError {
    #[error("Socket error: {0}")]
    SocketError(MonitoredSocketError),

    #[error("Could not send the reply: {0}")]
    SendError(zmq::Error),

    #[error("Could not recieve a request: {0}")]
    RecvError(zmq::Error),

    #[error("Could not serialize the reply: {0}")]
    SerializationError(serde_json::Error),

    #[error("Could not parse the recieved request: {0}")]
    RequestParseError(serde_json::Error),

    #[error("The client sent a message which was not valid UTF-8")]
    NonUtf8Request
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl RpcServer {

    /// Create a new instance of the RPC server.
    ///
    /// This function will not block until a client connects.
    pub fn new(ctx: &zmq::Context, endpoint: &str) -> Result<Self, RpcServerError> {
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
            zmq::REP,
            socket_options,
            endpoint
        ).map_err(RpcServerError::SocketError)?;

        Ok(Self {
            socket
        })
    }

    /// Recieve a single request.
    ///
    /// Returns `Ok(None)` if no request arrived within the recieve timeout. After a valid request
    /// a reply must be sent with `.send_reply()` before recieving again. Invalid requests are
    /// answered with `nack` by this function.
    pub fn recieve_request(&self) -> Result<Option<Vec<Value>>, RpcServerError> {
        let req_str = match self.socket.recv_string(0) {
            Ok(Ok(s)) => s,
            Ok(Err(_)) => {
                self.send_reply(&[Reply::Nack.as_str().into()])?;
                return Err(RpcServerError::NonUtf8Request)
            },
            Err(zmq::Error::EAGAIN) => return Ok(None),
            Err(e) => return Err(RpcServerError::RecvError(e))
        };

        match serde_json::from_str::<Vec<Value>>(&req_str) {
            Ok(req) => Ok(Some(req)),
            Err(e) => {
                self.send_reply(&[Reply::Nack.as_str().into()])?;
                Err(RpcServerError::RequestParseError(e))
            }
        }
    }

    /// Send the reply to the last request.
    pub fn send_reply(&self, reply: &[Value]) -> Result<(), RpcServerError> {
        let reply_str = serde_json::to_string(reply)
            .map_err(RpcServerError::SerializationError)?;

        self.socket.send(&reply_str, 0)
            .map_err(RpcServerError::SendError)
    }
}
