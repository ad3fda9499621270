//! # Input Server
//!
//! Subscribes to the solver's input channel. Messages are received on a background thread and
//! applied to the solver as soon as they arrive, independently of the solver loop.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use std::{sync::{Arc, atomic::{AtomicBool, Ordering}}, thread::{self, JoinHandle}};
use log::{error, warn};

use comms_if::{
    net::{MonitoredSocket, MonitoredSocketError, SocketOptions, zmq},
    slv::InputMsg
};

use crate::solver::CartesianSolver;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

pub struct InputServer {
    bg_jh: Option<JoinHandle<()>>,
    bg_run: Arc<AtomicBool>,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum InputServerError {
    #[error("Socket error: {0}")]
    SocketError(MonitoredSocketError),

    #[error("Could not subscribe to the input channel: {0}")]
    SubscribeError(zmq::Error),
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl InputServer {
    /// Connect to the input channel and start the background thread.
    pub fn new(
        ctx: &zmq::Context,
        endpoint: &str,
        solver: Arc<CartesianSolver>
    ) -> Result<Self, InputServerError> {
        let socket_options = SocketOptions {
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
            zmq::SUB,
            socket_options,
            endpoint
        ).map_err(InputServerError::SocketError)?;

        socket.set_subscribe(b"")
            .map_err(InputServerError::SubscribeError)?;

        let bg_run = Arc::new(AtomicBool::new(true));
        let bg_run_clone = bg_run.clone();

        let bg_jh = Some(thread::spawn(move || {
            bg_thread(socket, bg_run_clone, solver)
        }));

        Ok(Self {
            bg_jh,
            bg_run
        })
    }

    /// Stop the background thread and wait for it to finish.
    pub fn stop(&mut self) {
        self.bg_run.store(false, Ordering::Relaxed);

        if let Some(jh) = self.bg_jh.take() {
            if jh.join().is_err() {
                error!("Input server background thread panicked");
            }
        }
    }
}

impl Drop for InputServer {
    fn drop(&mut self) {
        self.stop();
    }
}

// ------------------------------------------------------------------------------------------------
// FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Background thread, applies input messages to the solver as they arrive.
fn bg_thread(socket: MonitoredSocket, run: Arc<AtomicBool>, solver: Arc<CartesianSolver>) {

    while run.load(Ordering::Relaxed) {
        let msg_str = match socket.recv_string(0) {
            Ok(Ok(s)) => s,
            Ok(Err(_)) => {
                warn!("Non UTF-8 message on the input channel");
                continue
            },
            Err(zmq::Error::EAGAIN) => continue,
            Err(e) => {
                error!("Could not recieve from the input channel: {}", e);
                break
            }
        };

        match serde_json::from_str::<InputMsg>(&msg_str) {
            Ok(msg) => solver.apply_input(&msg),
            Err(e) => warn!("Could not parse input message: {}", e)
        }
    }
}
