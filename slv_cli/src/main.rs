//! Interactive command line client for the Cartesian solver.
//!
//! Each line is parsed as a bottle, e.g. `set dof (1 1 1 1 1 1 1)`, sent to the solver's RPC
//! server and the reply is printed back in the same textual form.

use std::time::Duration;
use color_eyre::{Report, eyre::{eyre, WrapErr}};
use rustyline::{error::ReadlineError, Editor};
use structopt::StructOpt;

use comms_if::{
    net::{zmq, MonitoredSocket, SocketOptions},
    slv::{format_bottle, parse_bottle, Value}
};

const PROMPT: &str = "slv $ ";
const HISTORY_PATH: &str = "data/slv_history.txt";

/// Time to wait for the reply to a command. Configuring the solver may take a while if the robot
/// is slow to answer.
const REPLY_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, StructOpt)]
#[structopt(name = "slv_cli", about = "Sends commands to a Cartesian solver")]
struct Opt {
    /// Endpoint of the solver's RPC server
    #[structopt(short, long, default_value = "tcp://localhost:5030")]
    endpoint: String,

    /// Send this single command and exit
    #[structopt(short, long)]
    command: Option<String>,
}

fn main() -> Result<(), Report> {
    color_eyre::install()?;

    let opt = Opt::from_args();

    let ctx = zmq::Context::new();
    let socket = MonitoredSocket::new(
        &ctx,
        zmq::REQ,
        SocketOptions {
            connect_timeout: 1000,
            linger: 1,
            recv_timeout: REPLY_TIMEOUT.as_millis() as i32,
            send_timeout: 1000,
            req_correlate: true,
            req_relaxed: true,
            ..Default::default()
        },
        &opt.endpoint
    ).wrap_err("Could not create the client socket")?;

    if let Some(cmd) = opt.command {
        if let Some(req) = to_request(&cmd)? {
            println!("{}", format_bottle(&send(&socket, &req)?));
        }
        return Ok(());
    }

    let mut rl = Editor::<(), rustyline::history::DefaultHistory>::new()?;
    if rl.load_history(HISTORY_PATH).is_err() {
        println!("No history detected");
    }

    loop {
        let line = match rl.readline(PROMPT) {
            Ok(l) => l,
            Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => break,
            Err(e) => return Err(e.into())
        };

        let _ = rl.add_history_entry(line.as_str());

        let req = match to_request(&line) {
            Ok(Some(r)) => r,
            Ok(None) => continue,
            Err(e) => {
                println!("{}", e);
                continue
            }
        };

        match send(&socket, &req) {
            Ok(reply) => println!("{}", format_bottle(&reply)),
            Err(e) => println!("{:?}", e)
        }

        if req.first().and_then(Value::as_str) == Some("quit") {
            break;
        }
    }

    if let Err(e) = rl.save_history(HISTORY_PATH) {
        println!("Could not save history: {}", e);
    }

    Ok(())
}

/// Parse a command line into a request, `None` for a blank line.
fn to_request(line: &str) -> Result<Option<Vec<Value>>, Report> {
    let req = parse_bottle(line).wrap_err("Invalid command")?;

    if req.is_empty() {
        Ok(None)
    } else {
        Ok(Some(req))
    }
}

/// Send a request and wait for its reply.
fn send(socket: &MonitoredSocket, req: &[Value]) -> Result<Vec<Value>, Report> {
    let req_str = serde_json::to_string(req)?;

    socket.send(&req_str, 0)
        .wrap_err("Could not send the command")?;

    let reply_str = match socket.recv_string(0) {
        Ok(Ok(s)) => s,
        Ok(Err(_)) => return Err(eyre!("The solver sent a reply which was not valid UTF-8")),
        Err(zmq::Error::EAGAIN) if !socket.connected() => {
            return Err(eyre!("The solver is not reachable"))
        },
        Err(zmq::Error::EAGAIN) => return Err(eyre!("No reply from the solver")),
        Err(e) => return Err(e).wrap_err("Could not recieve the reply")
    };

    serde_json::from_str(&reply_str)
        .wrap_err("Could not parse the reply")
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_to_request() {
        assert!(to_request("   ").unwrap().is_none());
        assert!(to_request("set dof (1 1").is_err());

        let req = to_request("set dof (1 1 1)").unwrap().unwrap();
        assert_eq!(serde_json::to_string(&req).unwrap(), r#"["set","dof",[1,1,1]]"#);
    }
}
