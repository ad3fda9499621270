//! Main Cartesian solver executable entry point.
//!
//! # Architecture
//!
//! The executable hosts a single solver:
//!
//!     - Initialise the session, logging and parameters
//!     - Create the output channel publisher and the device context
//!     - Create the solver, configuring it straight away if the parameters carry options
//!     - Subscribe to the input channel, handled on a background thread
//!     - Main loop:
//!         - Recieve a protocol command and send back its reply
//!         - Exit once a `quit` command has closed the solver
//!
//! The solver loop itself runs on its own periodic thread once configured.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use log::{debug, info, warn};
use std::env;
use std::sync::Arc;
use color_eyre::{Report, eyre::WrapErr};

// Internal
use comms_if::net::zmq;
use slv_lib::{
    cmd::CommandProcessor,
    device::sim::SimContext,
    input_server::InputServer,
    params::SlvExecParams,
    rpc_server::RpcServer,
    sol_server::SolServer,
    solver::CartesianSolver,
};
use util::{
    logger::{logger_init, LevelFilter},
    session::Session,
};

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Parameter file used if none is given on the command line.
const DEFAULT_PARAMS_FILE: &str = "slv_exec.toml";

// ---------------------------------------------------------------------------
// FUNCTIONS
// ---------------------------------------------------------------------------

/// Executable main function, entry point.
fn main() -> Result<(), Report> {

    // ---- EARLY INITIALISATION ----

    // Initialise session
    let session = Session::new(
        "slv_exec",
        "sessions"
    ).wrap_err("Failed to create the session")?;

    // Initialise logger
    logger_init(LevelFilter::Debug, &session)
        .wrap_err("Failed to initialise logging")?;

    info!("Cartesian Solver Executable\n");
    info!("Session directory: {:?}\n", session.session_root);

    // ---- LOAD PARAMETERS ----

    let args: Vec<String> = env::args().collect();
    debug!("CLI arguments: {:?}", args);

    let params_file = args.get(1).map(|s| s.as_str()).unwrap_or(DEFAULT_PARAMS_FILE);

    let params: SlvExecParams = util::params::load(params_file)
        .wrap_err("Could not load solver exec params")?;

    info!("Exec parameters loaded from \"{}\"", params_file);

    // ---- INITIALISE NETWORK AND DEVICES ----

    let zmq_ctx = zmq::Context::new();

    let sol_server = Arc::new(
        SolServer::new(&zmq_ctx, &params.output_endpoint)
            .wrap_err("Failed to initialise the solution server")?
    );
    info!("Solution server initialised on {}", params.output_endpoint);

    let dev_ctx = Arc::new(SimContext::icub(&params.robot));
    info!("Simulated devices of \"{}\" available", params.robot);

    // ---- INITIALISE SOLVER ----

    let solver = Arc::new(CartesianSolver::new(
        &params.name,
        params.limb.clone(),
        dev_ctx,
        sol_server
    ));

    match params.solver {
        Some(ref options) => {
            solver.open(options)
                .wrap_err("Failed to configure the solver")?;
            info!("Solver configured from the parameters");
        },
        None => info!("Solver waiting for a configure command")
    }

    let mut input_server = InputServer::new(&zmq_ctx, &params.input_endpoint, solver.clone())
        .wrap_err("Failed to initialise the input server")?;
    info!("Input server connected to {}", params.input_endpoint);

    let rpc_server = RpcServer::new(&zmq_ctx, &params.rpc_endpoint)
        .wrap_err("Failed to initialise the RPC server")?;
    info!("RPC server initialised on {}", params.rpc_endpoint);

    let processor = CommandProcessor::new(solver.clone());

    info!("Initialisation complete\n");

    // ---- MAIN LOOP ----

    while !solver.is_closed() {
        // Blocks for at most the recieve timeout
        let request = match rpc_server.recieve_request() {
            Ok(Some(r)) => r,
            Ok(None) => continue,
            Err(e) => {
                warn!("Error recieving a request: {}", e);
                continue
            }
        };

        let reply = processor.respond(&request);

        if let Err(e) = rpc_server.send_reply(&reply) {
            warn!("Error sending the reply: {}", e);
        }
    }

    // ---- SHUTDOWN ----

    input_server.stop();

    info!("End of execution");

    Ok(())
}
